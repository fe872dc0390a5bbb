// SPDX-FileCopyrightText: 2023 Jade Lovelace
//
// SPDX-License-Identifier: MPL-2.0

//! Writing of pcap files.
//!
//! A [`PcapWriter`] exists only once the global header has made it into the
//! sink, so records can never precede it.

use std::io;

use crate::{
    error::AddContext,
    pcap_format::{FrameEncoder, RecordHeader},
    Error, Timestamp,
};

pub struct PcapWriter<W> {
    sink: W,
    encoder: FrameEncoder,
}

impl<W: io::Write> PcapWriter<W> {
    pub fn new(mut sink: W, encoder: FrameEncoder) -> Result<Self, Error> {
        sink.write_all(&encoder.global_header()?)
            .context("write pcap global header")?;
        Ok(PcapWriter { sink, encoder })
    }

    pub fn encoder(&self) -> &FrameEncoder {
        &self.encoder
    }

    /// Writes one record: the header, then at most `caplen` bytes of `frame`.
    ///
    /// `frame` is what actually landed in the receive buffer, `original_len`
    /// is the length the kernel reported for the frame on the wire.
    pub fn write_frame(
        &mut self,
        ts: Timestamp,
        frame: &[u8],
        original_len: usize,
    ) -> Result<RecordHeader, Error> {
        let hdr = self.encoder.record_header(ts, frame.len(), original_len);
        let hdr_bytes = hdr.to_bytes()?;

        self.sink
            .write_all(&hdr_bytes)
            .context("write record header")?;
        self.sink
            .write_all(&frame[..hdr.caplen as usize])
            .context("write frame data")?;

        Ok(hdr)
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        self.sink.flush().context("flush capture output")
    }

    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

#[cfg(test)]
mod test {
    use pcap_parser::Linktype;

    use super::*;
    use crate::pcap_format::{GLOBAL_HEADER_LEN, RECORD_HEADER_LEN};

    /// Accepts a fixed number of bytes and then fails every write.
    struct ShortSink {
        written: Vec<u8>,
        capacity: usize,
    }

    impl io::Write for ShortSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let room = self.capacity - self.written.len();
            if room == 0 {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "sink full"));
            }
            let n = room.min(buf.len());
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn encoder(snaplen: usize) -> FrameEncoder {
        FrameEncoder::new(snaplen, Linktype::ETHERNET).unwrap()
    }

    #[test]
    fn test_header_written_once() {
        let mut w = PcapWriter::new(Vec::new(), encoder(100)).unwrap();
        assert_eq!(w.get_ref().len(), GLOBAL_HEADER_LEN);

        let ts = Timestamp { secs: 1, micros: 2 };
        w.write_frame(ts, &[0xaa; 10], 10).unwrap();
        w.write_frame(ts, &[0xbb; 20], 20).unwrap();

        let out = w.into_inner();
        assert_eq!(out.len(), GLOBAL_HEADER_LEN + 2 * RECORD_HEADER_LEN + 30);
        assert_eq!(&out[..GLOBAL_HEADER_LEN], &encoder(100).global_header().unwrap()[..]);
    }

    #[test]
    fn test_truncates_frame_data() {
        let mut w = PcapWriter::new(Vec::new(), encoder(8)).unwrap();
        let frame: Vec<u8> = (0..12).collect();

        let hdr = w
            .write_frame(Timestamp { secs: 3, micros: 4 }, &frame, 12)
            .unwrap();
        assert_eq!((hdr.caplen, hdr.origlen), (8, 12));

        let out = w.into_inner();
        assert_eq!(out.len(), GLOBAL_HEADER_LEN + RECORD_HEADER_LEN + 8);
        assert_eq!(&out[GLOBAL_HEADER_LEN + RECORD_HEADER_LEN..], &frame[..8]);
    }

    #[test]
    fn test_write_failure_keeps_prefix() {
        let sink = ShortSink {
            written: Vec::new(),
            capacity: GLOBAL_HEADER_LEN + RECORD_HEADER_LEN + 4,
        };
        let mut w = PcapWriter::new(sink, encoder(100)).unwrap();

        let err = w
            .write_frame(Timestamp::default(), &[1u8; 10], 10)
            .unwrap_err();
        assert!(matches!(err, Error::IoError("write frame data", _)));
        assert_eq!(
            w.get_ref().written.len(),
            GLOBAL_HEADER_LEN + RECORD_HEADER_LEN + 4
        );
    }

    #[test]
    fn test_header_write_failure() {
        let sink = ShortSink {
            written: Vec::new(),
            capacity: 0,
        };
        assert!(matches!(
            PcapWriter::new(sink, encoder(100)),
            Err(Error::IoError("write pcap global header", _))
        ));
    }
}
