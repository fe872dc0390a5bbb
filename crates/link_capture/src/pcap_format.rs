// SPDX-FileCopyrightText: 2023 Jade Lovelace
//
// SPDX-License-Identifier: MPL-2.0

//! Byte layout of classic (non-ng) pcap files.
//!
//! Everything is little-endian: the magic is written as `d4 c3 b2 a1`, which
//! tells readers both the byte order and that timestamps are in
//! microseconds.

use pcap_parser::{LegacyPcapBlock, Linktype, PcapHeader, ToVec};

use crate::{Error, Timestamp};

/// Magic for microsecond resolution files.
pub const PCAP_MAGIC: u32 = 0xa1b2_c3d4;
pub const VERSION_MAJOR: u16 = 2;
pub const VERSION_MINOR: u16 = 4;

pub const GLOBAL_HEADER_LEN: usize = 24;
pub const RECORD_HEADER_LEN: usize = 16;

/// Produces the header bytes for one capture file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameEncoder {
    snaplen: u32,
    linktype: Linktype,
}

/// Per frame header. `caplen` bytes of frame data follow it in the file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordHeader {
    pub ts: Timestamp,
    pub caplen: u32,
    pub origlen: u32,
}

impl FrameEncoder {
    /// Only Ethernet captures are produced: `AF_PACKET` sockets hand us
    /// frames with their link-layer header intact.
    pub fn new(snaplen: usize, linktype: Linktype) -> Result<FrameEncoder, Error> {
        if linktype != Linktype::ETHERNET {
            return Err(Error::Config(format!("unsupported link type {}", linktype.0)));
        }
        let snaplen = u32::try_from(snaplen)
            .ok()
            .filter(|&s| s > 0)
            .ok_or_else(|| Error::Config(format!("bad snapshot length {snaplen}")))?;

        Ok(FrameEncoder { snaplen, linktype })
    }

    pub fn snaplen(&self) -> u32 {
        self.snaplen
    }

    pub fn global_header(&self) -> Result<Vec<u8>, Error> {
        let hdr = PcapHeader {
            magic_number: PCAP_MAGIC,
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            // UTC
            thiszone: 0,
            sigfigs: 0,
            snaplen: self.snaplen,
            network: self.linktype,
        };

        hdr.to_vec_raw()
            .map_err(|e| Error::Encode("global header", format!("{e:?}")))
    }

    /// Builds the record header for a frame. This is the one place truncation
    /// happens: `captured_len` is cut down to the snapshot length, while
    /// `original_len` is passed through as the length seen on the wire.
    pub fn record_header(
        &self,
        ts: Timestamp,
        captured_len: usize,
        original_len: usize,
    ) -> RecordHeader {
        let origlen = u32::try_from(original_len).unwrap_or(u32::MAX);
        let caplen = u32::try_from(captured_len)
            .unwrap_or(u32::MAX)
            .min(self.snaplen)
            .min(origlen);

        RecordHeader {
            ts,
            caplen,
            origlen,
        }
    }
}

impl RecordHeader {
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        // The frame data is written separately, so serialize a block with no
        // data but the real lengths.
        let block = LegacyPcapBlock {
            ts_sec: self.ts.secs,
            ts_usec: self.ts.micros,
            caplen: self.caplen,
            origlen: self.origlen,
            data: &[],
        };

        block
            .to_vec_raw()
            .map_err(|e| Error::Encode("record header", format!("{e:?}")))
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn ts(secs: u32, micros: u32) -> Timestamp {
        Timestamp { secs, micros }
    }

    #[test]
    fn test_global_header_layout() {
        let enc = FrameEncoder::new(65536, Linktype::ETHERNET).unwrap();
        let bytes = enc.global_header().unwrap();

        #[rustfmt::skip]
        let expected: &[u8] = &[
            0xd4, 0xc3, 0xb2, 0xa1,
            0x02, 0x00,
            0x04, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x01, 0x00,
            0x01, 0x00, 0x00, 0x00,
        ];
        assert_eq!(bytes.len(), GLOBAL_HEADER_LEN);
        assert_eq!(&bytes[..], expected);

        // no timestamps or anything else that changes between runs
        assert_eq!(enc.global_header().unwrap(), bytes);
        assert_eq!(
            FrameEncoder::new(65536, Linktype::ETHERNET)
                .unwrap()
                .global_header()
                .unwrap(),
            bytes
        );
    }

    #[test]
    fn test_record_header_layout() {
        let enc = FrameEncoder::new(1500, Linktype::ETHERNET).unwrap();
        let hdr = enc.record_header(ts(0x0102_0304, 999_999), 2000, 2000);
        assert_eq!(hdr.caplen, 1500);
        assert_eq!(hdr.origlen, 2000);

        #[rustfmt::skip]
        let expected: &[u8] = &[
            0x04, 0x03, 0x02, 0x01,
            0x3f, 0x42, 0x0f, 0x00,
            0xdc, 0x05, 0x00, 0x00,
            0xd0, 0x07, 0x00, 0x00,
        ];
        let bytes = hdr.to_bytes().unwrap();
        assert_eq!(bytes.len(), RECORD_HEADER_LEN);
        assert_eq!(&bytes[..], expected);
    }

    #[test]
    fn test_rejects_bad_config() {
        assert!(matches!(
            FrameEncoder::new(65536, Linktype::RAW),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            FrameEncoder::new(0, Linktype::ETHERNET),
            Err(Error::Config(_))
        ));
        #[cfg(target_pointer_width = "64")]
        assert!(matches!(
            FrameEncoder::new(u32::MAX as usize + 1, Linktype::ETHERNET),
            Err(Error::Config(_))
        ));
    }

    proptest! {
        #[test]
        fn caplen_is_clamped_origlen_is_not(snaplen in 1..200_000usize, len in 0..200_000usize) {
            let enc = FrameEncoder::new(snaplen, Linktype::ETHERNET).unwrap();
            let hdr = enc.record_header(ts(1, 2), len, len);
            prop_assert_eq!(hdr.caplen as usize, len.min(snaplen));
            prop_assert_eq!(hdr.origlen as usize, len);
        }
    }
}
