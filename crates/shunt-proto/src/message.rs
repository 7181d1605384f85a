//! Complete DNS messages and the helpers the forwarding pipeline uses.

use crate::edns::Edns;
use crate::error::{Error, Result};
use crate::header::{Flags, Header, HEADER_SIZE};
use crate::name::NameCompressor;
use crate::question::Question;
use crate::record::ResourceRecord;
use crate::types::{Rcode, RecordType};
use crate::{CAP_TTL, MIN_TTL};
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::time::Duration;

/// A parsed DNS message.
///
/// Sections are immutable in spirit once parsed; the one sanctioned mutation
/// is TTL rewriting on cache retrieval, exposed through [`Message::set_ttl`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    header: Header,
    questions: Vec<Question>,
    answers: Vec<ResourceRecord>,
    authority: Vec<ResourceRecord>,
    additional: Vec<ResourceRecord>,
    edns: Option<Edns>,
}

impl Message {
    pub fn new(header: Header) -> Self {
        Self {
            header,
            questions: Vec::new(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
            edns: None,
        }
    }

    /// A recursion-desired query for one question, with EDNS(0) attached.
    pub fn query(question: Question) -> Self {
        let mut header = Header::query();
        header.qd_count = 1;
        header.ar_count = 1; // the OPT pseudo-record
        Self {
            header,
            questions: vec![question],
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
            edns: Some(Edns::new()),
        }
    }

    /// An empty response to `query`, mirroring id, opcode, RD and question.
    pub fn response_to(query: &Message) -> Self {
        let mut msg = Self::new(Header::new(query.id()));
        msg.set_reply(query);
        msg
    }

    /// Synthesizes the SERVFAIL answer for a query that could not be served.
    pub fn servfail_for(query: &Message) -> Self {
        let mut msg = Self::response_to(query);
        msg.set_rcode(Rcode::SERVFAIL);
        msg
    }

    // ------------------------------------------------------------------
    // Header access
    // ------------------------------------------------------------------

    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[inline]
    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    #[inline]
    pub fn id(&self) -> u16 {
        self.header.id
    }

    #[inline]
    pub fn set_id(&mut self, id: u16) {
        self.header.id = id;
    }

    #[inline]
    pub fn rcode(&self) -> Rcode {
        self.header.rcode
    }

    pub fn set_rcode(&mut self, rcode: Rcode) {
        self.header.rcode = rcode;
        if rcode.extended_bits() != 0 {
            if let Some(edns) = &mut self.edns {
                edns.set_extended_rcode(rcode.extended_bits());
            }
        }
    }

    #[inline]
    pub fn is_response(&self) -> bool {
        self.header.is_response()
    }

    #[inline]
    pub fn is_truncated(&self) -> bool {
        self.header.is_truncated()
    }

    // ------------------------------------------------------------------
    // Sections
    // ------------------------------------------------------------------

    #[inline]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// The first question, if any.
    #[inline]
    pub fn question(&self) -> Option<&Question> {
        self.questions.first()
    }

    #[inline]
    pub fn answers(&self) -> &[ResourceRecord] {
        &self.answers
    }

    #[inline]
    pub fn authority(&self) -> &[ResourceRecord] {
        &self.authority
    }

    #[inline]
    pub fn additional(&self) -> &[ResourceRecord] {
        &self.additional
    }

    #[inline]
    pub fn edns(&self) -> Option<&Edns> {
        self.edns.as_ref()
    }

    pub fn set_edns(&mut self, edns: Option<Edns>) {
        self.edns = edns;
        self.sync_ar_count();
    }

    /// True when EDNS is present with the DO bit set.
    pub fn dnssec_ok(&self) -> bool {
        self.edns.as_ref().is_some_and(|e| e.dnssec_ok())
    }

    pub fn add_question(&mut self, question: Question) {
        self.questions.push(question);
        self.header.qd_count = self.questions.len() as u16;
    }

    pub fn add_answer(&mut self, record: ResourceRecord) {
        self.answers.push(record);
        self.header.an_count = self.answers.len() as u16;
    }

    pub fn add_authority(&mut self, record: ResourceRecord) {
        self.authority.push(record);
        self.header.ns_count = self.authority.len() as u16;
    }

    pub fn add_additional(&mut self, record: ResourceRecord) {
        self.additional.push(record);
        self.sync_ar_count();
    }

    fn sync_ar_count(&mut self) {
        self.header.ar_count =
            self.additional.len() as u16 + if self.edns.is_some() { 1 } else { 0 };
    }

    // ------------------------------------------------------------------
    // Pipeline helpers
    // ------------------------------------------------------------------

    /// Restamps this message as a reply to `query`.
    ///
    /// Copies id, opcode and RD, sets QR, and replaces the question section
    /// with the query's. Everything else is left alone, so a cached response
    /// keeps its records while picking up the new client's transaction id.
    pub fn set_reply(&mut self, query: &Message) {
        self.header.id = query.header.id;
        self.header.opcode = query.header.opcode;
        self.header.set_flag(Flags::QR, true);
        self.header
            .set_flag(Flags::RD, query.header.recursion_desired());
        self.questions = query.questions.clone();
        self.header.qd_count = self.questions.len() as u16;
    }

    /// The minimum TTL across answer, authority and additional sections.
    ///
    /// An all-empty message yields the 5-second floor; otherwise the scan
    /// starts from the 1-hour cap, so a populated message never reports more.
    pub fn min_ttl(&self) -> Duration {
        if self.answers.is_empty() && self.authority.is_empty() && self.additional.is_empty() {
            return MIN_TTL;
        }

        let mut ttl = CAP_TTL;
        for record in self
            .answers
            .iter()
            .chain(&self.authority)
            .chain(&self.additional)
        {
            ttl = ttl.min(Duration::from_secs(record.ttl() as u64));
        }
        ttl
    }

    /// Rewrites every record TTL to `ttl`. The OPT pseudo-record is not a
    /// real record and is unaffected.
    pub fn set_ttl(&mut self, ttl: Duration) {
        let secs = ttl.as_secs().min(u32::MAX as u64) as u32;
        for record in self
            .answers
            .iter_mut()
            .chain(&mut self.authority)
            .chain(&mut self.additional)
        {
            record.set_ttl(secs);
        }
    }

    /// True when the authority section carries an SOA record.
    pub fn contains_soa(&self) -> bool {
        self.authority
            .iter()
            .any(|r| r.rtype() == RecordType::SOA)
    }

    /// True when the authority section carries an NS record.
    pub fn contains_ns(&self) -> bool {
        self.authority.iter().any(|r| r.rtype() == RecordType::NS)
    }

    /// Cacheable negative answer: NXDOMAIN with an SOA to take the TTL from.
    pub fn is_nxdomain(&self) -> bool {
        self.rcode() == Rcode::NXDOMAIN && self.contains_soa()
    }

    /// Cacheable empty answer: NOERROR, nothing in the answer section, SOA
    /// present.
    pub fn is_nodata(&self) -> bool {
        self.rcode().is_success() && self.answers.is_empty() && self.contains_soa()
    }

    // ------------------------------------------------------------------
    // Wire format
    // ------------------------------------------------------------------

    /// Parses a message from wire format.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = Header::parse(data)?;
        let mut offset = HEADER_SIZE;

        let mut questions = Vec::with_capacity(header.qd_count as usize);
        for _ in 0..header.qd_count {
            let (q, used) = Question::parse(data, offset).map_err(|e| match e {
                Error::UnexpectedEof { .. } => Error::SectionCountMismatch {
                    section: "question",
                    expected: header.qd_count,
                },
                other => other,
            })?;
            questions.push(q);
            offset += used;
        }

        let mut parse_section = |count: u16, section: &'static str| -> Result<Vec<ResourceRecord>> {
            let mut records = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let (r, used) = ResourceRecord::parse(data, offset).map_err(|e| match e {
                    Error::UnexpectedEof { .. } => Error::SectionCountMismatch {
                        section,
                        expected: count,
                    },
                    other => other,
                })?;
                records.push(r);
                offset += used;
            }
            Ok(records)
        };

        let answers = parse_section(header.an_count, "answer")?;
        let authority = parse_section(header.ns_count, "authority")?;
        let raw_additional = parse_section(header.ar_count, "additional")?;

        let mut additional = Vec::with_capacity(raw_additional.len());
        let mut edns = None;
        for record in raw_additional {
            if record.rtype().is_opt() {
                if edns.is_some() {
                    return Err(Error::MultipleOptRecords);
                }
                let (class, ttl, options) = record.into_opt_parts();
                edns = Some(Edns::from_opt(class, ttl, options));
            } else {
                additional.push(record);
            }
        }

        let mut header = header;
        if let Some(e) = &edns {
            header.rcode = Rcode::from_parts(header.rcode.header_bits(), e.extended_rcode);
        }

        Ok(Self {
            header,
            questions,
            answers,
            authority,
            additional,
            edns,
        })
    }

    /// Appends the message in wire format, compressing names.
    pub fn write_to(&self, buf: &mut BytesMut) {
        let mut header = self.header.clone();
        header.qd_count = self.questions.len() as u16;
        header.an_count = self.answers.len() as u16;
        header.ns_count = self.authority.len() as u16;
        header.ar_count =
            self.additional.len() as u16 + if self.edns.is_some() { 1 } else { 0 };
        header.write_to(buf);

        let mut compressor = NameCompressor::new();
        for q in &self.questions {
            q.write_to(buf, &mut compressor);
        }
        for r in &self.answers {
            r.write_to(buf, &mut compressor);
        }
        for r in &self.authority {
            r.write_to(buf, &mut compressor);
        }
        for r in &self.additional {
            r.write_to(buf, &mut compressor);
        }
        if let Some(edns) = &self.edns {
            edns.write_to(buf);
        }
    }

    /// Serializes to a fresh buffer.
    pub fn to_wire(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(512);
        self.write_to(&mut buf);
        buf.freeze()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ";; {}", self.header)?;
        for q in &self.questions {
            write!(f, "\n;; question: {}", q)?;
        }
        for r in &self.answers {
            write!(f, "\n;; answer: {}", r)?;
        }
        for r in &self.authority {
            write!(f, "\n;; authority: {}", r)?;
        }
        for r in &self.additional {
            write!(f, "\n;; additional: {}", r)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::Name;
    use crate::record::Soa;
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    fn a_query(name: &str) -> Message {
        Message::query(Question::a(Name::from_str(name).unwrap()))
    }

    fn soa_record(zone: &str, minimum: u32) -> ResourceRecord {
        ResourceRecord::soa(
            Name::from_str(zone).unwrap(),
            minimum,
            Soa {
                mname: Name::from_str("ns1.example.com").unwrap(),
                rname: Name::from_str("hostmaster.example.com").unwrap(),
                serial: 1,
                refresh: 7200,
                retry: 3600,
                expire: 86400,
                minimum,
            },
        )
    }

    #[test]
    fn parse_serialize_round_trip() {
        let mut msg = a_query("www.example.com");
        msg.set_id(0x4242);

        let wire = msg.to_wire();
        let parsed = Message::parse(&wire).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn response_round_trip_with_answers() {
        let query = a_query("example.com");
        let mut resp = Message::response_to(&query);
        resp.add_answer(ResourceRecord::a(
            Name::from_str("example.com").unwrap(),
            300,
            Ipv4Addr::new(192, 0, 2, 7),
        ));
        resp.add_authority(soa_record("example.com", 600));

        let parsed = Message::parse(&resp.to_wire()).unwrap();
        assert_eq!(parsed, resp);
        assert_eq!(parsed.id(), query.id());
    }

    #[test]
    fn min_ttl_empty_message_floors() {
        let query = a_query("example.com");
        let resp = Message::response_to(&query);
        // Response carries no records at all (EDNS is not a record).
        assert_eq!(resp.min_ttl(), MIN_TTL);
    }

    #[test]
    fn min_ttl_takes_section_minimum() {
        let query = a_query("example.com");
        let mut resp = Message::response_to(&query);
        resp.add_answer(ResourceRecord::a(
            Name::from_str("example.com").unwrap(),
            300,
            Ipv4Addr::new(192, 0, 2, 1),
        ));
        resp.add_authority(soa_record("example.com", 60));
        assert_eq!(resp.min_ttl(), Duration::from_secs(60));
    }

    #[test]
    fn min_ttl_caps_at_one_hour() {
        let query = a_query("example.com");
        let mut resp = Message::response_to(&query);
        resp.add_answer(ResourceRecord::a(
            Name::from_str("example.com").unwrap(),
            86_400,
            Ipv4Addr::new(192, 0, 2, 1),
        ));
        assert_eq!(resp.min_ttl(), CAP_TTL);
    }

    #[test]
    fn set_ttl_rewrites_every_section() {
        let query = a_query("example.com");
        let mut resp = Message::response_to(&query);
        resp.add_answer(ResourceRecord::a(
            Name::from_str("example.com").unwrap(),
            300,
            Ipv4Addr::new(192, 0, 2, 1),
        ));
        resp.add_authority(soa_record("example.com", 600));

        resp.set_ttl(Duration::from_secs(42));
        assert!(resp.answers().iter().all(|r| r.ttl() == 42));
        assert!(resp.authority().iter().all(|r| r.ttl() == 42));
    }

    #[test]
    fn negative_classification() {
        let query = a_query("nope.example.com");

        let mut nx = Message::response_to(&query);
        nx.set_rcode(Rcode::NXDOMAIN);
        assert!(!nx.is_nxdomain()); // no SOA yet
        nx.add_authority(soa_record("example.com", 300));
        assert!(nx.is_nxdomain());
        assert!(!nx.is_nodata());

        let mut nodata = Message::response_to(&query);
        nodata.add_authority(soa_record("example.com", 300));
        assert!(nodata.is_nodata());
        assert!(!nodata.is_nxdomain());
    }

    #[test]
    fn servfail_synthesis_mirrors_query() {
        let query = a_query("example.com");
        let servfail = Message::servfail_for(&query);

        assert_eq!(servfail.id(), query.id());
        assert_eq!(servfail.rcode(), Rcode::SERVFAIL);
        assert!(servfail.is_response());
        assert_eq!(servfail.questions(), query.questions());
        assert!(servfail.answers().is_empty());
    }

    #[test]
    fn set_reply_restamps_id_and_question() {
        let mut cached = Message::response_to(&a_query("example.com"));
        cached.add_answer(ResourceRecord::a(
            Name::from_str("example.com").unwrap(),
            300,
            Ipv4Addr::new(192, 0, 2, 1),
        ));

        let mut new_query = a_query("example.com");
        new_query.set_id(0xBEEF);
        cached.set_reply(&new_query);

        assert_eq!(cached.id(), 0xBEEF);
        assert!(cached.is_response());
        assert_eq!(cached.answers().len(), 1);
    }

    #[test]
    fn edns_survives_round_trip() {
        let mut msg = a_query("example.com");
        if let Some(edns) = msg.edns().cloned().map(|mut e| {
            e.set_dnssec_ok(true);
            e
        }) {
            msg.set_edns(Some(edns));
        }

        let parsed = Message::parse(&msg.to_wire()).unwrap();
        assert!(parsed.dnssec_ok());
        assert_eq!(parsed.edns().unwrap().udp_size, 4096);
    }

    #[test]
    fn truncated_message_rejected() {
        let wire = a_query("example.com").to_wire();
        assert!(Message::parse(&wire[..wire.len() - 4]).is_err());
    }

    #[test]
    fn header_count_mismatch_rejected() {
        let mut wire = BytesMut::from(&a_query("example.com").to_wire()[..]);
        // Claim two questions while the body has one.
        wire[4..6].copy_from_slice(&2u16.to_be_bytes());
        assert!(matches!(
            Message::parse(&wire),
            Err(Error::SectionCountMismatch { .. })
        ));
    }
}
