//! EDNS(0) OPT pseudo-record handling (RFC 6891).
//!
//! The OPT record abuses the class field for the advertised UDP payload size
//! and the TTL field for extended rcode, version and flags. Options are
//! carried opaquely; the forwarder relays them but never interprets one.

use bytes::{Bytes, BytesMut};
use std::fmt;

/// DNSSEC-OK bit in the OPT flags word.
const DO_BIT: u16 = 0x8000;

/// EDNS(0) parameters lifted out of the OPT pseudo-record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edns {
    /// Advertised UDP payload size (the OPT class field).
    pub udp_size: u16,
    /// Upper 8 bits of the extended rcode.
    pub extended_rcode: u8,
    /// EDNS version; only 0 is defined.
    pub version: u8,
    /// Flags word; bit 15 is DO.
    pub flags: u16,
    /// Raw options, relayed untouched.
    pub options: Bytes,
}

impl Edns {
    pub fn new() -> Self {
        Self {
            udp_size: crate::MAX_UDP_PAYLOAD as u16,
            extended_rcode: 0,
            version: 0,
            flags: 0,
            options: Bytes::new(),
        }
    }

    /// Rebuilds EDNS state from the OPT record's class, ttl and rdata.
    pub fn from_opt(class: u16, ttl: u32, options: Bytes) -> Self {
        Self {
            udp_size: class,
            extended_rcode: ((ttl >> 24) & 0xFF) as u8,
            version: ((ttl >> 16) & 0xFF) as u8,
            flags: (ttl & 0xFFFF) as u16,
            options,
        }
    }

    #[inline]
    pub fn dnssec_ok(&self) -> bool {
        self.flags & DO_BIT != 0
    }

    pub fn set_dnssec_ok(&mut self, on: bool) {
        if on {
            self.flags |= DO_BIT;
        } else {
            self.flags &= !DO_BIT;
        }
    }

    pub fn set_extended_rcode(&mut self, bits: u8) {
        self.extended_rcode = bits;
    }

    /// Writes the OPT pseudo-record (root owner name, no compression).
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.extend_from_slice(&[0]); // root owner
        buf.extend_from_slice(&crate::RecordType::OPT.0.to_be_bytes());
        buf.extend_from_slice(&self.udp_size.to_be_bytes());

        let ttl = ((self.extended_rcode as u32) << 24)
            | ((self.version as u32) << 16)
            | self.flags as u32;
        buf.extend_from_slice(&ttl.to_be_bytes());

        buf.extend_from_slice(&(self.options.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.options);
    }
}

impl Default for Edns {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Edns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EDNS0 version {} udp {} {}",
            self.version,
            self.udp_size,
            if self.dnssec_ok() { "do" } else { "-" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn do_bit_round_trip() {
        let mut edns = Edns::new();
        assert!(!edns.dnssec_ok());
        edns.set_dnssec_ok(true);
        assert!(edns.dnssec_ok());

        let ttl = ((edns.extended_rcode as u32) << 24)
            | ((edns.version as u32) << 16)
            | edns.flags as u32;
        let rebuilt = Edns::from_opt(edns.udp_size, ttl, Bytes::new());
        assert!(rebuilt.dnssec_ok());
    }

    #[test]
    fn opt_wire_shape() {
        let edns = Edns::new();
        let mut buf = BytesMut::new();
        edns.write_to(&mut buf);

        // root + type + class + ttl + rdlength
        assert_eq!(buf.len(), 1 + 2 + 2 + 4 + 2);
        assert_eq!(&buf[1..3], &crate::RecordType::OPT.0.to_be_bytes());
    }
}
