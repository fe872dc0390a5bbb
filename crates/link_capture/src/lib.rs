// SPDX-FileCopyrightText: 2023 Jade Lovelace
//
// SPDX-License-Identifier: MPL-2.0

//! Link-layer capture into classic pcap files.
//!
//! A raw `AF_PACKET` socket hands us frames along with a kernel receive
//! timestamp; each one is written out as a pcap record behind a single
//! global header.

pub mod capture;
pub mod config;
pub mod error;
pub mod pcap_format;
pub mod pcap_writer;
#[cfg(target_os = "linux")]
pub mod socket;
pub mod timestamp;

pub use capture::{capture_frames, CaptureSummary, FrameSource, Received, RecvError, StopHandle};
#[cfg(target_os = "linux")]
pub use capture::{Capture, RunningCapture};
pub use config::{CaptureConfig, InterfaceSelector};
pub use error::Error;
pub use timestamp::Timestamp;
