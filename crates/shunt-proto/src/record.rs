//! Resource records and RDATA.
//!
//! A forwarder relays records of any type, so RDATA it does not understand
//! is carried as opaque bytes. The name-bearing types (NS, CNAME, SOA, PTR,
//! MX, SRV) get typed variants because their embedded names may arrive
//! compressed against the upstream message and must be expanded before the
//! record can be re-serialized into a different message.

use crate::error::{Error, Result};
use crate::name::{Name, NameCompressor};
use crate::question::{read_u16, read_u32};
use crate::types::{RecordClass, RecordType};
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// SOA RDATA.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Soa {
    pub mname: Name,
    pub rname: Name,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

/// Record data, typed where the wire format embeds names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Ns(Name),
    Cname(Name),
    Ptr(Name),
    Soa(Soa),
    Mx { preference: u16, exchange: Name },
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: Name,
    },
    /// Any other type, carried verbatim.
    Opaque(Bytes),
}

impl RData {
    /// Parses RDATA of `rtype` from `message[offset..offset+rdlength]`.
    ///
    /// `message` is the whole DNS message so compression pointers inside the
    /// RDATA can be resolved.
    pub fn parse(
        rtype: RecordType,
        message: &[u8],
        offset: usize,
        rdlength: usize,
    ) -> Result<Self> {
        let end = offset + rdlength;
        if end > message.len() {
            return Err(Error::eof(end));
        }
        let raw = &message[offset..end];

        let rdata = match rtype {
            RecordType::A => {
                let bytes: [u8; 4] = raw.try_into().map_err(|_| Error::BadRData {
                    rtype: "A",
                    message: format!("rdlength {} (want 4)", rdlength),
                })?;
                Self::A(Ipv4Addr::from(bytes))
            }
            RecordType::AAAA => {
                let bytes: [u8; 16] = raw.try_into().map_err(|_| Error::BadRData {
                    rtype: "AAAA",
                    message: format!("rdlength {} (want 16)", rdlength),
                })?;
                Self::Aaaa(Ipv6Addr::from(bytes))
            }
            RecordType::NS => Self::Ns(Name::parse(message, offset)?.0),
            RecordType::CNAME => Self::Cname(Name::parse(message, offset)?.0),
            RecordType::PTR => Self::Ptr(Name::parse(message, offset)?.0),
            RecordType::SOA => {
                let (mname, mlen) = Name::parse(message, offset)?;
                let (rname, rlen) = Name::parse(message, offset + mlen)?;
                let fixed = offset + mlen + rlen;
                if fixed + 20 > message.len() {
                    return Err(Error::eof(fixed + 20));
                }
                Self::Soa(Soa {
                    mname,
                    rname,
                    serial: read_u32(message, fixed)?,
                    refresh: read_u32(message, fixed + 4)?,
                    retry: read_u32(message, fixed + 8)?,
                    expire: read_u32(message, fixed + 12)?,
                    minimum: read_u32(message, fixed + 16)?,
                })
            }
            RecordType::MX => {
                let preference = read_u16(message, offset)?;
                let (exchange, _) = Name::parse(message, offset + 2)?;
                Self::Mx {
                    preference,
                    exchange,
                }
            }
            RecordType::SRV => {
                let priority = read_u16(message, offset)?;
                let weight = read_u16(message, offset + 2)?;
                let port = read_u16(message, offset + 4)?;
                let (target, _) = Name::parse(message, offset + 6)?;
                Self::Srv {
                    priority,
                    weight,
                    port,
                    target,
                }
            }
            _ => Self::Opaque(Bytes::copy_from_slice(raw)),
        };

        Ok(rdata)
    }

    /// Writes the RDATA body (without the RDLENGTH prefix).
    ///
    /// Names in NS/CNAME/SOA/PTR/MX are compressed; SRV targets are written
    /// verbatim per RFC 2782.
    fn write_to(&self, buf: &mut BytesMut, compressor: &mut NameCompressor) {
        match self {
            Self::A(addr) => buf.extend_from_slice(&addr.octets()),
            Self::Aaaa(addr) => buf.extend_from_slice(&addr.octets()),
            Self::Ns(name) | Self::Cname(name) | Self::Ptr(name) => {
                compressor.write_name(buf, name)
            }
            Self::Soa(soa) => {
                compressor.write_name(buf, &soa.mname);
                compressor.write_name(buf, &soa.rname);
                buf.extend_from_slice(&soa.serial.to_be_bytes());
                buf.extend_from_slice(&soa.refresh.to_be_bytes());
                buf.extend_from_slice(&soa.retry.to_be_bytes());
                buf.extend_from_slice(&soa.expire.to_be_bytes());
                buf.extend_from_slice(&soa.minimum.to_be_bytes());
            }
            Self::Mx {
                preference,
                exchange,
            } => {
                buf.extend_from_slice(&preference.to_be_bytes());
                compressor.write_name(buf, exchange);
            }
            Self::Srv {
                priority,
                weight,
                port,
                target,
            } => {
                buf.extend_from_slice(&priority.to_be_bytes());
                buf.extend_from_slice(&weight.to_be_bytes());
                buf.extend_from_slice(&port.to_be_bytes());
                target.write_uncompressed(buf);
            }
            Self::Opaque(raw) => buf.extend_from_slice(raw),
        }
    }

    /// The CNAME target, when this is a CNAME.
    pub fn as_cname(&self) -> Option<&Name> {
        match self {
            Self::Cname(name) => Some(name),
            _ => None,
        }
    }

    /// The address, when this is an A record.
    pub fn as_a(&self) -> Option<Ipv4Addr> {
        match self {
            Self::A(addr) => Some(*addr),
            _ => None,
        }
    }
}

/// A resource record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRecord {
    name: Name,
    rtype: RecordType,
    rclass: RecordClass,
    ttl: u32,
    rdata: RData,
}

impl ResourceRecord {
    pub fn new(name: Name, rtype: RecordType, rclass: RecordClass, ttl: u32, rdata: RData) -> Self {
        Self {
            name,
            rtype,
            rclass,
            ttl,
            rdata,
        }
    }

    /// An `IN A` record.
    pub fn a(name: Name, ttl: u32, addr: Ipv4Addr) -> Self {
        Self::new(name, RecordType::A, RecordClass::IN, ttl, RData::A(addr))
    }

    /// An `IN SOA` record.
    pub fn soa(name: Name, ttl: u32, soa: Soa) -> Self {
        Self::new(name, RecordType::SOA, RecordClass::IN, ttl, RData::Soa(soa))
    }

    #[inline]
    pub fn name(&self) -> &Name {
        &self.name
    }

    #[inline]
    pub fn rtype(&self) -> RecordType {
        self.rtype
    }

    #[inline]
    pub fn rclass(&self) -> RecordClass {
        self.rclass
    }

    #[inline]
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    #[inline]
    pub fn set_ttl(&mut self, ttl: u32) {
        self.ttl = ttl;
    }

    #[inline]
    pub fn rdata(&self) -> &RData {
        &self.rdata
    }

    /// Parses a record at `offset`; returns it and the bytes consumed.
    ///
    /// OPT pseudo-records are returned like any other record; the message
    /// parser lifts them into [`crate::Edns`].
    pub fn parse(message: &[u8], offset: usize) -> Result<(Self, usize)> {
        let (name, name_len) = Name::parse(message, offset)?;
        let fixed = offset + name_len;

        let rtype = RecordType(read_u16(message, fixed)?);
        let rclass = RecordClass(read_u16(message, fixed + 2)?);
        let ttl = read_u32(message, fixed + 4)?;
        let rdlength = read_u16(message, fixed + 8)? as usize;

        let rdata_start = fixed + 10;
        let rdata = RData::parse(rtype, message, rdata_start, rdlength)?;

        Ok((
            Self {
                name,
                rtype,
                rclass,
                ttl,
                rdata,
            },
            name_len + 10 + rdlength,
        ))
    }

    /// Raw access for OPT lifting: class, ttl and opaque rdata.
    pub(crate) fn into_opt_parts(self) -> (u16, u32, Bytes) {
        let raw = match self.rdata {
            RData::Opaque(raw) => raw,
            other => {
                // OPT always parses as opaque; anything else is a bug in the
                // message parser, not reachable from wire input.
                let mut buf = BytesMut::new();
                let mut comp = NameCompressor::new();
                other.write_to(&mut buf, &mut comp);
                buf.freeze()
            }
        };
        (self.rclass.0, self.ttl, raw)
    }

    /// Writes the record with compression, backpatching RDLENGTH.
    pub fn write_to(&self, buf: &mut BytesMut, compressor: &mut NameCompressor) {
        compressor.write_name(buf, &self.name);
        buf.extend_from_slice(&self.rtype.0.to_be_bytes());
        buf.extend_from_slice(&self.rclass.0.to_be_bytes());
        buf.extend_from_slice(&self.ttl.to_be_bytes());

        let len_at = buf.len();
        buf.extend_from_slice(&[0, 0]);
        self.rdata.write_to(buf, compressor);

        let rdlength = (buf.len() - len_at - 2) as u16;
        buf[len_at..len_at + 2].copy_from_slice(&rdlength.to_be_bytes());
    }
}

impl fmt::Display for ResourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.name, self.ttl, self.rclass, self.rtype
        )
    }
}
