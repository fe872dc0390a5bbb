// SPDX-FileCopyrightText: 2023 Jade Lovelace
//
// SPDX-License-Identifier: MPL-2.0

//! Decoding of kernel receive timestamps.
//!
//! The capture socket has `SO_TIMESTAMPNS` set, so every frame arrives with
//! one `SCM_TIMESTAMPNS` control message carrying a `timespec`. pcap only
//! has microsecond resolution, so the nanoseconds get floored away.

use nix::sys::{socket::ControlMessageOwned, time::TimeSpec};

const NANOS_PER_SEC: i64 = 1_000_000_000;
const NANOS_PER_MICRO: i64 = 1_000;

/// Wall clock receive time, as it goes into a pcap record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    pub secs: u32,
    /// Always within `0..=999_999`.
    pub micros: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimestampError {
    #[error("no receive timestamp control message")]
    Missing,
    #[error("unexpected control message: {0}")]
    UnexpectedKind(String),
    #[error("timestamp out of range: {secs}s {nanos}ns")]
    OutOfRange { secs: i64, nanos: i64 },
}

impl Timestamp {
    pub fn from_timespec(ts: TimeSpec) -> Result<Timestamp, TimestampError> {
        let secs = ts.tv_sec() as i64;
        let nanos = ts.tv_nsec() as i64;
        let out_of_range = || TimestampError::OutOfRange { secs, nanos };

        if !(0..NANOS_PER_SEC).contains(&nanos) {
            return Err(out_of_range());
        }

        Ok(Timestamp {
            secs: u32::try_from(secs).map_err(|_| out_of_range())?,
            micros: (nanos / NANOS_PER_MICRO) as u32,
        })
    }
}

/// Pulls the receive time out of the control message that came along with a
/// frame.
pub fn extract_timestamp(cmsg: Option<&ControlMessageOwned>) -> Result<Timestamp, TimestampError> {
    match cmsg.ok_or(TimestampError::Missing)? {
        ControlMessageOwned::ScmTimestampns(ts) => Timestamp::from_timespec(*ts),
        other => Err(TimestampError::UnexpectedKind(format!("{other:?}"))),
    }
}
