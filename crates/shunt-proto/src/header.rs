//! The fixed 12-byte message header.

use crate::error::{Error, Result};
use crate::types::{OpCode, Rcode};
use bitflags::bitflags;
use bytes::BytesMut;
use std::fmt;

/// Size of the DNS header in bytes.
pub const HEADER_SIZE: usize = 12;

bitflags! {
    /// Header flag bits, excluding opcode and rcode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags: u16 {
        /// Query (0) / response (1).
        const QR = 0x8000;
        /// Authoritative answer.
        const AA = 0x0400;
        /// Truncated.
        const TC = 0x0200;
        /// Recursion desired.
        const RD = 0x0100;
        /// Recursion available.
        const RA = 0x0080;
        /// Authentic data (DNSSEC).
        const AD = 0x0020;
        /// Checking disabled (DNSSEC).
        const CD = 0x0010;
    }
}

/// Parsed DNS header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub id: u16,
    pub flags: Flags,
    pub opcode: OpCode,
    /// Header rcode; extended bits are merged in from EDNS at message level.
    pub rcode: Rcode,
    pub qd_count: u16,
    pub an_count: u16,
    pub ns_count: u16,
    pub ar_count: u16,
}

impl Header {
    pub fn new(id: u16) -> Self {
        Self {
            id,
            flags: Flags::empty(),
            opcode: OpCode::QUERY,
            rcode: Rcode::NOERROR,
            qd_count: 0,
            an_count: 0,
            ns_count: 0,
            ar_count: 0,
        }
    }

    /// A recursion-desired query header with a random id.
    pub fn query() -> Self {
        Self {
            id: rand::random(),
            flags: Flags::RD,
            ..Self::new(0)
        }
    }

    #[inline]
    pub fn is_response(&self) -> bool {
        self.flags.contains(Flags::QR)
    }

    #[inline]
    pub fn is_truncated(&self) -> bool {
        self.flags.contains(Flags::TC)
    }

    #[inline]
    pub fn recursion_desired(&self) -> bool {
        self.flags.contains(Flags::RD)
    }

    #[inline]
    pub fn checking_disabled(&self) -> bool {
        self.flags.contains(Flags::CD)
    }

    pub fn set_flag(&mut self, flag: Flags, on: bool) {
        self.flags.set(flag, on);
    }

    /// Parses a header from the front of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::MalformedHeader {
                expected: HEADER_SIZE,
                actual: data.len(),
            });
        }

        let word = |i: usize| u16::from_be_bytes([data[i], data[i + 1]]);
        let raw_flags = word(2);

        Ok(Self {
            id: word(0),
            flags: Flags::from_bits_truncate(raw_flags),
            opcode: OpCode(((raw_flags >> 11) & 0x0F) as u8),
            rcode: Rcode(raw_flags & 0x0F),
            qd_count: word(4),
            an_count: word(6),
            ns_count: word(8),
            ar_count: word(10),
        })
    }

    /// Appends the header in wire format.
    pub fn write_to(&self, buf: &mut BytesMut) {
        let raw_flags = self.flags.bits()
            | ((self.opcode.0 as u16) << 11)
            | self.rcode.header_bits() as u16;

        buf.extend_from_slice(&self.id.to_be_bytes());
        buf.extend_from_slice(&raw_flags.to_be_bytes());
        buf.extend_from_slice(&self.qd_count.to_be_bytes());
        buf.extend_from_slice(&self.an_count.to_be_bytes());
        buf.extend_from_slice(&self.ns_count.to_be_bytes());
        buf.extend_from_slice(&self.ar_count.to_be_bytes());
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new(0)
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id {:04x} {} {} qd {} an {} ns {} ar {}",
            self.id,
            self.opcode,
            self.rcode,
            self.qd_count,
            self.an_count,
            self.ns_count,
            self.ar_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let mut header = Header::query();
        header.id = 0x1234;
        header.qd_count = 1;
        header.set_flag(Flags::CD, true);

        let mut buf = BytesMut::new();
        header.write_to(&mut buf);
        assert_eq!(buf.len(), HEADER_SIZE);

        let parsed = Header::parse(&buf).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn short_buffer_rejected() {
        assert!(matches!(
            Header::parse(&[0u8; 11]),
            Err(Error::MalformedHeader { .. })
        ));
    }

    #[test]
    fn opcode_and_rcode_packing() {
        let mut header = Header::new(1);
        header.opcode = OpCode::NOTIFY;
        header.rcode = Rcode::REFUSED;

        let mut buf = BytesMut::new();
        header.write_to(&mut buf);

        let parsed = Header::parse(&buf).unwrap();
        assert_eq!(parsed.opcode, OpCode::NOTIFY);
        assert_eq!(parsed.rcode, Rcode::REFUSED);
    }
}
