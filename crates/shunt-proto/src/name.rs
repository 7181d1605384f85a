//! Domain names: storage, parsing with compression, compressed output.
//!
//! Names are stored as uncompressed wire format (length-prefixed labels,
//! terminated by the root label) in a [`SmallVec`], so typical names never
//! touch the heap. Comparison and hashing are case-insensitive per RFC 1035.

use crate::error::{Error, Result};
use crate::{MAX_LABEL_LENGTH, MAX_NAME_LENGTH};
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Upper bound on compression-pointer jumps while parsing one name.
const MAX_COMPRESSION_JUMPS: usize = 128;

/// A fully-qualified DNS domain name.
#[derive(Clone)]
pub struct Name {
    /// Uncompressed wire format, including the terminating root label.
    wire: SmallVec<[u8; 64]>,
}

impl Name {
    /// The root name `.`.
    pub fn root() -> Self {
        Self {
            wire: SmallVec::from_slice(&[0]),
        }
    }

    /// Returns the uncompressed wire form.
    #[inline]
    pub fn as_wire(&self) -> &[u8] {
        &self.wire
    }

    /// Wire-format length, including the root label.
    #[inline]
    pub fn wire_len(&self) -> usize {
        self.wire.len()
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.wire.len() == 1
    }

    /// Parses a name from `message` starting at `offset`, following
    /// compression pointers.
    ///
    /// Returns the name and the number of bytes consumed at the original
    /// position (a pointer consumes two bytes regardless of what it
    /// references). Pointers must target earlier offsets; forward and
    /// self-references are rejected, which also bounds pointer loops.
    pub fn parse(message: &[u8], offset: usize) -> Result<(Self, usize)> {
        let mut wire = SmallVec::<[u8; 64]>::new();
        let mut pos = offset;
        let mut consumed = 0usize;
        let mut followed_pointer = false;
        let mut jumps = 0usize;

        loop {
            let len_byte = *message.get(pos).ok_or(Error::eof(pos))?;

            if len_byte >= 0xC0 {
                let low = *message.get(pos + 1).ok_or(Error::eof(pos + 1))?;
                let target = (((len_byte & 0x3F) as usize) << 8) | low as usize;

                if target >= pos {
                    return Err(Error::InvalidCompressionPointer {
                        offset: pos,
                        target,
                    });
                }
                if !followed_pointer {
                    consumed = pos - offset + 2;
                    followed_pointer = true;
                }
                jumps += 1;
                if jumps > MAX_COMPRESSION_JUMPS {
                    return Err(Error::TooManyCompressionJumps {
                        limit: MAX_COMPRESSION_JUMPS,
                    });
                }
                pos = target;
                continue;
            }

            if len_byte >= 0x40 {
                return Err(Error::InvalidLabelType {
                    value: len_byte,
                    offset: pos,
                });
            }

            let len = len_byte as usize;
            if len == 0 {
                wire.push(0);
                if !followed_pointer {
                    consumed = pos - offset + 1;
                }
                break;
            }

            let end = pos + 1 + len;
            if end > message.len() {
                return Err(Error::eof(end));
            }
            if wire.len() + 1 + len + 1 > MAX_NAME_LENGTH {
                return Err(Error::NameTooLong {
                    length: wire.len() + 1 + len + 1,
                });
            }

            wire.push(len_byte);
            wire.extend_from_slice(&message[pos + 1..end]);
            pos = end;
        }

        Ok((Self { wire }, consumed))
    }

    /// Iterates over the labels, excluding the root.
    pub fn labels(&self) -> impl Iterator<Item = &[u8]> {
        LabelIter {
            wire: &self.wire,
            pos: 0,
        }
    }

    /// Number of labels, excluding the root.
    pub fn label_count(&self) -> usize {
        self.labels().count()
    }

    /// The canonical presentation form: lowercase, trailing dot.
    ///
    /// This is the form used for cache fingerprints and router keys.
    pub fn to_canonical(&self) -> String {
        let mut out = String::with_capacity(self.wire.len() + 1);
        for label in self.labels() {
            for &b in label {
                out.push(b.to_ascii_lowercase() as char);
            }
            out.push('.');
        }
        if out.is_empty() {
            out.push('.');
        }
        out
    }

    /// Writes the name uncompressed.
    pub fn write_uncompressed(&self, buf: &mut BytesMut) {
        buf.extend_from_slice(&self.wire);
    }
}

struct LabelIter<'a> {
    wire: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for LabelIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        let len = *self.wire.get(self.pos)? as usize;
        if len == 0 {
            return None;
        }
        let start = self.pos + 1;
        self.pos = start + len;
        self.wire.get(start..start + len)
    }
}

impl FromStr for Name {
    type Err = Error;

    /// Parses the dotted presentation form. A trailing dot is optional.
    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || s == "." {
            return Ok(Self::root());
        }

        let s = s.strip_suffix('.').unwrap_or(s);
        let mut wire = SmallVec::<[u8; 64]>::new();

        for label in s.split('.') {
            if label.len() > MAX_LABEL_LENGTH {
                return Err(Error::LabelTooLong {
                    length: label.len(),
                });
            }
            for c in label.chars() {
                if !c.is_ascii_alphanumeric() && c != '-' && c != '_' && c != '*' {
                    return Err(Error::InvalidLabelChar { character: c });
                }
            }
            wire.push(label.len() as u8);
            wire.extend_from_slice(label.as_bytes());
        }
        wire.push(0);

        if wire.len() > MAX_NAME_LENGTH {
            return Err(Error::NameTooLong { length: wire.len() });
        }
        Ok(Self { wire })
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return write!(f, ".");
        }
        for label in self.labels() {
            for &b in label {
                if b.is_ascii_graphic() && b != b'.' {
                    write!(f, "{}", b as char)?;
                } else {
                    write!(f, "\\{:03}", b)?;
                }
            }
            write!(f, ".")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self)
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.wire.len() == other.wire.len()
            && self
                .wire
                .iter()
                .zip(other.wire.iter())
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for &b in self.wire.iter() {
            state.write_u8(b.to_ascii_lowercase());
        }
    }
}

impl Default for Name {
    fn default() -> Self {
        Self::root()
    }
}

impl Serialize for Name {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Emits names with RFC 1035 §4.1.4 compression.
///
/// One compressor instance lives for the duration of a message serialization;
/// it remembers where each name suffix landed and points later occurrences at
/// the earlier bytes. Matching is case-insensitive.
pub struct NameCompressor {
    suffixes: hashbrown::HashMap<SmallVec<[u8; 64]>, u16>,
}

impl NameCompressor {
    pub fn new() -> Self {
        Self {
            suffixes: hashbrown::HashMap::new(),
        }
    }

    /// Writes `name` to `buf`, compressing against previously written names.
    pub fn write_name(&mut self, buf: &mut BytesMut, name: &Name) {
        let wire = name.as_wire();
        let mut pos = 0usize;

        while pos < wire.len() {
            let len = wire[pos] as usize;
            if len == 0 {
                buf.extend_from_slice(&[0]);
                return;
            }

            let suffix: SmallVec<[u8; 64]> = wire[pos..]
                .iter()
                .map(|b| b.to_ascii_lowercase())
                .collect();

            if let Some(&offset) = self.suffixes.get(&suffix) {
                buf.extend_from_slice(&(0xC000u16 | offset).to_be_bytes());
                return;
            }

            let here = buf.len();
            if here <= 0x3FFF {
                self.suffixes.insert(suffix, here as u16);
            }

            buf.extend_from_slice(&wire[pos..pos + 1 + len]);
            pos += 1 + len;
        }

        buf.extend_from_slice(&[0]);
    }
}

impl Default for NameCompressor {
    fn default() -> Self {
        Self::new()
    }
}
