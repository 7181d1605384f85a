//! # shunt-proto
//!
//! DNS wire-format codec for the shunt forwarder.
//!
//! The codec parses complete messages (header, question, answer, authority,
//! additional) with full support for name compression on input, and emits
//! compressed messages on output. EDNS(0) OPT pseudo-records are lifted out
//! of the additional section into an [`Edns`] value at parse time and
//! re-emitted on serialization.
//!
//! Besides the codec itself, this crate carries the small set of message
//! helpers the forwarding pipeline is built on: minimum-TTL computation,
//! TTL rewriting, NXDOMAIN/NODATA classification and SERVFAIL synthesis.

pub mod edns;
pub mod error;
pub mod header;
pub mod message;
pub mod name;
pub mod question;
pub mod record;
pub mod types;

pub use edns::Edns;
pub use error::{Error, Result};
pub use header::{Flags, Header, HEADER_SIZE};
pub use message::Message;
pub use name::Name;
pub use question::Question;
pub use record::{RData, ResourceRecord, Soa};
pub use types::{OpCode, RecordClass, RecordType, Rcode};

use std::time::Duration;

/// Maximum length of a single label in bytes.
pub const MAX_LABEL_LENGTH: usize = 63;

/// Maximum length of a domain name in wire format.
pub const MAX_NAME_LENGTH: usize = 255;

/// Maximum UDP payload this forwarder reads or advertises, EDNS(0) included.
pub const MAX_UDP_PAYLOAD: usize = 4096;

/// Floor applied to cached TTLs and used when a message has no records.
pub const MIN_TTL: Duration = Duration::from_secs(5);

/// Ceiling applied to cached TTLs.
pub const CAP_TTL: Duration = Duration::from_secs(3600);

/// Clips a TTL into the `[MIN_TTL, CAP_TTL]` admission window.
pub fn clamp_ttl(ttl: Duration) -> Duration {
    ttl.clamp(MIN_TTL, CAP_TTL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_ttl_clips_both_ends() {
        assert_eq!(clamp_ttl(Duration::from_secs(1)), MIN_TTL);
        assert_eq!(clamp_ttl(Duration::from_secs(60)), Duration::from_secs(60));
        assert_eq!(clamp_ttl(Duration::from_secs(86_400)), CAP_TTL);
    }
}
