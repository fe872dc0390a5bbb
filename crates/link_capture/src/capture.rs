// SPDX-FileCopyrightText: 2023 Jade Lovelace
//
// SPDX-License-Identifier: MPL-2.0

//! The capture loop.
//!
//! A capture goes through `Capture` (configured) to [`RunningCapture`] (socket
//! bound) and is consumed by [`RunningCapture::run`], which ends either in a
//! clean stop or a fatal error. There is no way back to an earlier state; a
//! new capture has to be started instead.
//!
//! Stopping is done from outside through a [`StopHandle`]. A receive that is
//! pending when the handle fires comes back as [`RecvError::Closed`], which
//! the loop treats as the normal end of the capture.

use std::{fmt, future::Future, io};

use nix::{cmsg_space, libc, sys::socket::ControlMessageOwned, sys::time::TimeSpec};
use tokio_util::sync::CancellationToken;

use crate::{pcap_writer::PcapWriter, timestamp::extract_timestamp, Error};
#[cfg(target_os = "linux")]
use crate::{pcap_format::FrameEncoder, socket::CaptureSocket, CaptureConfig, InterfaceSelector};

/// One frame's worth of `recvmsg` results.
#[derive(Debug)]
pub struct Received {
    /// Length of the frame on the wire. May be larger than the receive
    /// buffer, in which case only the start of the frame is in it.
    pub len: usize,
    /// First control message delivered with the frame, if any.
    pub control: Option<ControlMessageOwned>,
}

#[derive(Debug, thiserror::Error)]
pub enum RecvError {
    /// The capture was stopped. Not a failure.
    #[error("capture socket closed")]
    Closed,
    #[error("recvmsg: {0}")]
    Io(io::Error),
}

impl From<io::Error> for RecvError {
    fn from(e: io::Error) -> Self {
        match e.raw_os_error() {
            Some(libc::EBADF) => RecvError::Closed,
            _ => RecvError::Io(e),
        }
    }
}

/// Something frames can be received from.
pub trait FrameSource {
    /// Receives one frame into `frame` and its control messages into
    /// `control`. Both buffers are reused across calls.
    fn recv_frame(
        &mut self,
        frame: &mut [u8],
        control: &mut Vec<u8>,
    ) -> impl Future<Output = Result<Received, RecvError>>;
}

/// Stops a capture from another task or thread. Stopping more than once is
/// fine.
#[derive(Clone, Debug, Default)]
pub struct StopHandle {
    token: CancellationToken,
}

impl StopHandle {
    pub fn new() -> StopHandle {
        Self::default()
    }

    pub fn stop(&self) {
        self.token.cancel();
    }

    pub async fn stopped(&self) {
        self.token.cancelled().await
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureSummary {
    /// Records written.
    pub frames: u64,
    /// Records whose data was cut off at the snapshot length.
    pub truncated: u64,
    /// Frames dropped for lack of a usable timestamp.
    pub skipped: u64,
    /// Frame bytes written, not counting headers.
    pub bytes: u64,
}

impl fmt::Display for CaptureSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames ({} truncated, {} bytes of frame data), {} skipped",
            self.frames, self.truncated, self.bytes, self.skipped
        )
    }
}

/// Receives frames from `source` into `writer` until stopped or something
/// fatal happens.
///
/// Frames whose timestamp can't be decoded are skipped without writing
/// anything. Write errors and receive errors other than
/// [`RecvError::Closed`] end the capture.
pub async fn capture_frames<S, W>(
    source: &mut S,
    writer: &mut PcapWriter<W>,
    stop: &StopHandle,
) -> Result<CaptureSummary, Error>
where
    S: FrameSource,
    W: io::Write,
{
    let mut summary = CaptureSummary::default();
    let mut frame_buf = vec![0u8; writer.encoder().snaplen() as usize];
    let mut cmsg_buf = cmsg_space!(TimeSpec);

    loop {
        let received = tokio::select! {
            biased;
            _ = stop.stopped() => Err(RecvError::Closed),
            r = source.recv_frame(&mut frame_buf, &mut cmsg_buf) => r,
        };

        let received = match received {
            Ok(r) => r,
            Err(RecvError::Closed) => {
                tracing::info!("capture stopped: {summary}");
                return Ok(summary);
            }
            Err(RecvError::Io(e)) => return Err(Error::IoError("recvmsg", e)),
        };

        let ts = match extract_timestamp(received.control.as_ref()) {
            Ok(ts) => ts,
            Err(e) => {
                tracing::warn!("skipping {} byte frame: {e}", received.len);
                summary.skipped += 1;
                continue;
            }
        };

        let frame = &frame_buf[..received.len.min(frame_buf.len())];
        let hdr = writer.write_frame(ts, frame, received.len)?;
        tracing::trace!(
            "frame at {}.{:06}: {} of {} bytes",
            ts.secs,
            ts.micros,
            hdr.caplen,
            hdr.origlen
        );

        summary.frames += 1;
        summary.bytes += hdr.caplen as u64;
        if hdr.caplen < hdr.origlen {
            summary.truncated += 1;
        }
    }
}

/// A capture that has been configured but not started.
#[cfg(target_os = "linux")]
pub struct Capture;

#[cfg(target_os = "linux")]
impl Capture {
    /// Opens and binds the capture socket. Nothing is partially set up if
    /// this fails.
    pub fn start(config: &CaptureConfig) -> Result<RunningCapture, Error> {
        let encoder = FrameEncoder::new(config.snaplen(), pcap_parser::Linktype::ETHERNET)?;
        let socket = CaptureSocket::open(config.interface())?;

        match config.interface() {
            InterfaceSelector::Any => tracing::info!("Capturing from all interfaces"),
            InterfaceSelector::Named(name) => {
                tracing::info!("Capturing interface #{} ({name})", socket.ifindex())
            }
        }

        Ok(RunningCapture {
            socket,
            encoder,
            stop: StopHandle::new(),
        })
    }
}

/// A capture with its socket bound, ready to [`run`](RunningCapture::run).
#[cfg(target_os = "linux")]
pub struct RunningCapture {
    socket: CaptureSocket,
    encoder: FrameEncoder,
    stop: StopHandle,
}

#[cfg(target_os = "linux")]
impl RunningCapture {
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Writes the pcap global header to `sink` and captures into it until
    /// stopped. The socket is closed when this returns.
    ///
    /// The sink is flushed on the way out, even after a failure, so whatever
    /// was written stays readable.
    pub async fn run<W: io::Write>(mut self, sink: W) -> Result<(W, CaptureSummary), Error> {
        let mut writer = PcapWriter::new(sink, self.encoder)?;

        let result = capture_frames(&mut self.socket, &mut writer, &self.stop).await;
        drop(self.socket);

        match result {
            Ok(summary) => {
                writer.flush()?;
                Ok((writer.into_inner(), summary))
            }
            Err(e) => {
                if let Err(flush_err) = writer.flush() {
                    tracing::debug!("flush after failed capture: {flush_err}");
                }
                Err(e)
            }
        }
    }
}
