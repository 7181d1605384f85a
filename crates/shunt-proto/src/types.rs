//! Record types, classes, opcodes and response codes.
//!
//! All four are thin newtypes over their wire values. Unknown values pass
//! through untouched, which a forwarder needs: it must relay records of
//! types it has never heard of.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A DNS record type (the 16-bit TYPE/QTYPE field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordType(pub u16);

impl RecordType {
    pub const A: Self = Self(1);
    pub const NS: Self = Self(2);
    pub const CNAME: Self = Self(5);
    pub const SOA: Self = Self(6);
    pub const PTR: Self = Self(12);
    pub const MX: Self = Self(15);
    pub const TXT: Self = Self(16);
    pub const AAAA: Self = Self(28);
    pub const SRV: Self = Self(33);
    pub const OPT: Self = Self(41);
    pub const ANY: Self = Self(255);

    /// Returns true for the EDNS(0) OPT pseudo-type.
    #[inline]
    pub const fn is_opt(self) -> bool {
        self.0 == Self::OPT.0
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::A => write!(f, "A"),
            Self::NS => write!(f, "NS"),
            Self::CNAME => write!(f, "CNAME"),
            Self::SOA => write!(f, "SOA"),
            Self::PTR => write!(f, "PTR"),
            Self::MX => write!(f, "MX"),
            Self::TXT => write!(f, "TXT"),
            Self::AAAA => write!(f, "AAAA"),
            Self::SRV => write!(f, "SRV"),
            Self::OPT => write!(f, "OPT"),
            Self::ANY => write!(f, "ANY"),
            Self(v) => write!(f, "TYPE{}", v),
        }
    }
}

/// A DNS record class (the 16-bit CLASS/QCLASS field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordClass(pub u16);

impl RecordClass {
    pub const IN: Self = Self(1);
    pub const CH: Self = Self(3);
    pub const HS: Self = Self(4);
    pub const ANY: Self = Self(255);
}

impl fmt::Display for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::IN => write!(f, "IN"),
            Self::CH => write!(f, "CH"),
            Self::HS => write!(f, "HS"),
            Self::ANY => write!(f, "ANY"),
            Self(v) => write!(f, "CLASS{}", v),
        }
    }
}

/// A DNS opcode (4-bit field in the header flags word).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpCode(pub u8);

impl OpCode {
    pub const QUERY: Self = Self(0);
    pub const IQUERY: Self = Self(1);
    pub const STATUS: Self = Self(2);
    pub const NOTIFY: Self = Self(4);
    pub const UPDATE: Self = Self(5);
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::QUERY => write!(f, "QUERY"),
            Self::IQUERY => write!(f, "IQUERY"),
            Self::STATUS => write!(f, "STATUS"),
            Self::NOTIFY => write!(f, "NOTIFY"),
            Self::UPDATE => write!(f, "UPDATE"),
            Self(v) => write!(f, "OPCODE{}", v),
        }
    }
}

/// A DNS response code.
///
/// Stored as the full 12-bit value: the low 4 bits live in the header, the
/// upper 8 in the EDNS(0) OPT TTL field when present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rcode(pub u16);

impl Rcode {
    pub const NOERROR: Self = Self(0);
    pub const FORMERR: Self = Self(1);
    pub const SERVFAIL: Self = Self(2);
    pub const NXDOMAIN: Self = Self(3);
    pub const NOTIMP: Self = Self(4);
    pub const REFUSED: Self = Self(5);

    /// The low 4 bits carried in the header flags word.
    #[inline]
    pub const fn header_bits(self) -> u8 {
        (self.0 & 0x0F) as u8
    }

    /// The upper 8 bits carried in the EDNS(0) extended-rcode field.
    #[inline]
    pub const fn extended_bits(self) -> u8 {
        ((self.0 >> 4) & 0xFF) as u8
    }

    /// Reassembles the full rcode from its header and EDNS parts.
    #[inline]
    pub const fn from_parts(header: u8, extended: u8) -> Self {
        Self(((extended as u16) << 4) | (header & 0x0F) as u16)
    }

    #[inline]
    pub const fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NOERROR => write!(f, "NOERROR"),
            Self::FORMERR => write!(f, "FORMERR"),
            Self::SERVFAIL => write!(f, "SERVFAIL"),
            Self::NXDOMAIN => write!(f, "NXDOMAIN"),
            Self::NOTIMP => write!(f, "NOTIMP"),
            Self::REFUSED => write!(f, "REFUSED"),
            Self(v) => write!(f, "RCODE{}", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rcode_split_and_join() {
        let rc = Rcode(0x123);
        assert_eq!(rc.header_bits(), 0x3);
        assert_eq!(rc.extended_bits(), 0x12);
        assert_eq!(Rcode::from_parts(rc.header_bits(), rc.extended_bits()), rc);
    }

    #[test]
    fn display_known_and_unknown() {
        assert_eq!(RecordType::AAAA.to_string(), "AAAA");
        assert_eq!(RecordType(999).to_string(), "TYPE999");
        assert_eq!(Rcode::SERVFAIL.to_string(), "SERVFAIL");
    }
}
