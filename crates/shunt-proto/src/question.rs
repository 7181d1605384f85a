//! The question section.

use crate::error::Result;
use crate::name::{Name, NameCompressor};
use crate::types::{RecordClass, RecordType};
use bytes::BytesMut;
use std::fmt;

/// A single question: name, type, class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Question {
    pub qname: Name,
    pub qtype: RecordType,
    pub qclass: RecordClass,
}

impl Question {
    pub fn new(qname: Name, qtype: RecordType, qclass: RecordClass) -> Self {
        Self {
            qname,
            qtype,
            qclass,
        }
    }

    /// An `IN A` question, the common case in tests.
    pub fn a(qname: Name) -> Self {
        Self::new(qname, RecordType::A, RecordClass::IN)
    }

    /// Parses a question at `offset`; returns it and the bytes consumed.
    pub fn parse(message: &[u8], offset: usize) -> Result<(Self, usize)> {
        let (qname, name_len) = Name::parse(message, offset)?;
        let fixed = offset + name_len;

        let qtype = read_u16(message, fixed)?;
        let qclass = read_u16(message, fixed + 2)?;

        Ok((
            Self {
                qname,
                qtype: RecordType(qtype),
                qclass: RecordClass(qclass),
            },
            name_len + 4,
        ))
    }

    /// Writes the question, compressing the name.
    pub fn write_to(&self, buf: &mut BytesMut, compressor: &mut NameCompressor) {
        compressor.write_name(buf, &self.qname);
        buf.extend_from_slice(&self.qtype.0.to_be_bytes());
        buf.extend_from_slice(&self.qclass.0.to_be_bytes());
    }
}

pub(crate) fn read_u16(data: &[u8], offset: usize) -> Result<u16> {
    let bytes = data
        .get(offset..offset + 2)
        .ok_or(crate::error::Error::eof(offset + 2))?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

pub(crate) fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    let bytes = data
        .get(offset..offset + 4)
        .ok_or(crate::error::Error::eof(offset + 4))?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.qname, self.qclass, self.qtype)
    }
}
