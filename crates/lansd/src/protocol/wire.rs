// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DNS wire format encode/decode (RFC 1035 Section 4, RFC 6762 Section 18).
//!
//! # Message layout
//!
//! ```text
//! 0                   1
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! |                      ID                       |
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! |QR|   Opcode  |AA|TC|RD|RA|   Z    |   RCODE   |
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! |                    QDCOUNT                    |
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! |                    ANCOUNT                    |
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! |                    NSCOUNT                    |
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! |                    ARCOUNT                    |
//! +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! ```
//!
//! Names are length-prefixed label runs terminated by a zero octet; a
//! length octet with the top two bits set is a compression pointer into
//! the packet. The encoder compresses repeated name suffixes; the decoder
//! follows pointers with a jump cap so crafted loops terminate.
//!
//! The top bit of a question class carries QU, the top bit of a record
//! class carries cache-flush. Both are stripped into booleans here so the
//! layers above never see them in the class field.

use crate::protocol::message::{Flags, Message, Question};
use crate::protocol::name::DomainName;
use crate::protocol::record::{
    RData, RecordType, ResourceRecord, CLASS_CACHE_FLUSH_BIT, CLASS_IN, CLASS_QU_BIT,
};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Compression pointers can only address the first 0x3FFF bytes.
const POINTER_LIMIT: usize = 0x3FFF;

/// Cap on pointer jumps while decoding one name.
const MAX_POINTER_JUMPS: usize = 16;

/// Errors raised while decoding a datagram. Never surfaced to user
/// handlers; the pump logs at debug and drops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Buffer ended before the structure it should contain.
    Truncated { expected: usize, actual: usize },
    /// Compression pointer out of range or looping.
    BadPointer(usize),
    /// A decoded name violates the label/name length limits.
    BadName,
    /// TXT/label bytes that are not valid UTF-8.
    BadUtf8,
    /// A record's rdata did not end where RDLENGTH said it would.
    RdataLength { expected: usize, actual: usize },
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { expected, actual } => {
                write!(f, "truncated packet: need {} bytes, have {}", expected, actual)
            }
            Self::BadPointer(offset) => write!(f, "bad compression pointer at {}", offset),
            Self::BadName => write!(f, "name exceeds wire limits"),
            Self::BadUtf8 => write!(f, "invalid utf-8 in name or txt"),
            Self::RdataLength { expected, actual } => {
                write!(f, "rdata length mismatch: declared {}, consumed {}", expected, actual)
            }
        }
    }
}

impl std::error::Error for WireError {}

// ============================================================================
// Encoding
// ============================================================================

struct Writer {
    buf: Vec<u8>,
    /// Lowercased dotted suffix -> offset of its first occurrence.
    name_offsets: HashMap<String, u16>,
}

impl Writer {
    fn new() -> Self {
        Self {
            buf: Vec::with_capacity(512),
            name_offsets: HashMap::new(),
        }
    }

    #[inline]
    fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    #[inline]
    fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a name, emitting a pointer for any suffix already present in
    /// the packet.
    fn put_name(&mut self, name: &DomainName) {
        let labels = name.labels();
        for start in 0..labels.len() {
            let key = labels[start..].join(".").to_ascii_lowercase();
            if let Some(&offset) = self.name_offsets.get(&key) {
                self.put_u16(0xC000 | offset);
                return;
            }
            if self.buf.len() <= POINTER_LIMIT {
                self.name_offsets.insert(key, self.buf.len() as u16);
            }
            let label = labels[start].as_bytes();
            self.buf.push(label.len() as u8);
            self.buf.extend_from_slice(label);
        }
        self.buf.push(0);
    }

    fn put_question(&mut self, question: &Question) {
        self.put_name(&question.name);
        self.put_u16(question.qtype.code());
        let mut class = question.class;
        if question.unicast_response {
            class |= CLASS_QU_BIT;
        }
        self.put_u16(class);
    }

    fn put_record(&mut self, record: &ResourceRecord) {
        self.put_name(&record.name);
        self.put_u16(record.record_type().code());
        let mut class = CLASS_IN;
        if record.cache_flush {
            class |= CLASS_CACHE_FLUSH_BIT;
        }
        self.put_u16(class);
        let ttl = u32::try_from(record.ttl.as_secs()).unwrap_or(u32::MAX);
        self.put_u32(ttl);

        // RDLENGTH is back-patched once the rdata is written.
        let len_at = self.buf.len();
        self.put_u16(0);
        let rdata_start = self.buf.len();
        self.put_rdata(&record.rdata);
        let rdata_len = (self.buf.len() - rdata_start) as u16;
        self.buf[len_at..len_at + 2].copy_from_slice(&rdata_len.to_be_bytes());
    }

    fn put_rdata(&mut self, rdata: &RData) {
        match rdata {
            RData::A(addr) => self.buf.extend_from_slice(&addr.octets()),
            RData::Aaaa(addr) => self.buf.extend_from_slice(&addr.octets()),
            RData::Ptr(target) => self.put_name(target),
            RData::Srv {
                priority,
                weight,
                port,
                target,
            } => {
                self.put_u16(*priority);
                self.put_u16(*weight);
                self.put_u16(*port);
                self.put_name(target);
            }
            RData::Txt(strings) => {
                if strings.is_empty() {
                    // One empty string; zero-length rdata is malformed.
                    self.buf.push(0);
                } else {
                    for s in strings {
                        let bytes = s.as_bytes();
                        let len = bytes.len().min(255);
                        self.buf.push(len as u8);
                        self.buf.extend_from_slice(&bytes[..len]);
                    }
                }
            }
            RData::Nsec { next, types } => {
                self.put_name(next);
                self.put_type_bitmap(types);
            }
        }
    }

    /// NSEC type bitmap: per 256-type window, a window number, a byte
    /// count, and a big-endian bit per present type.
    fn put_type_bitmap(&mut self, types: &[u16]) {
        let mut windows: HashMap<u8, [u8; 32]> = HashMap::new();
        for &code in types {
            let window = (code >> 8) as u8;
            let bit = (code & 0xFF) as usize;
            let bitmap = windows.entry(window).or_insert([0u8; 32]);
            bitmap[bit / 8] |= 0x80 >> (bit % 8);
        }
        let mut ordered: Vec<_> = windows.into_iter().collect();
        ordered.sort_by_key(|(window, _)| *window);
        for (window, bitmap) in ordered {
            let used = bitmap.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
            if used == 0 {
                continue;
            }
            self.buf.push(window);
            self.buf.push(used as u8);
            self.buf.extend_from_slice(&bitmap[..used]);
        }
    }
}

/// Encode a message without a size bound.
#[must_use]
pub fn encode(message: &Message) -> Vec<u8> {
    let mut w = Writer::new();
    w.put_u16(message.id);
    w.put_u16(message.flags.to_wire());
    w.put_u16(message.questions.len() as u16);
    w.put_u16(message.answers.len() as u16);
    w.put_u16(message.authority.len() as u16);
    w.put_u16(message.additionals.len() as u16);
    for question in &message.questions {
        w.put_question(question);
    }
    for record in &message.answers {
        w.put_record(record);
    }
    for record in &message.authority {
        w.put_record(record);
    }
    for record in &message.additionals {
        w.put_record(record);
    }
    w.buf
}

/// Encode with a datagram size cap.
///
/// Oversized messages shed additional records first; if the message still
/// does not fit, TC is set and answers are dropped from the tail until it
/// does.
#[must_use]
pub fn encode_bounded(message: &Message, mtu: usize) -> Vec<u8> {
    let bytes = encode(message);
    if bytes.len() <= mtu {
        return bytes;
    }

    let mut trimmed = message.clone();
    while !trimmed.additionals.is_empty() {
        trimmed.additionals.pop();
        let bytes = encode(&trimmed);
        if bytes.len() <= mtu {
            return bytes;
        }
    }

    trimmed.flags.truncated = true;
    loop {
        let bytes = encode(&trimmed);
        if bytes.len() <= mtu || trimmed.answers.is_empty() {
            return bytes;
        }
        trimmed.answers.pop();
    }
}

// ============================================================================
// Decoding
// ============================================================================

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn need(&self, count: usize) -> Result<(), WireError> {
        if self.pos + count > self.buf.len() {
            return Err(WireError::Truncated {
                expected: self.pos + count,
                actual: self.buf.len(),
            });
        }
        Ok(())
    }

    fn take_u8(&mut self) -> Result<u8, WireError> {
        self.need(1)?;
        let value = self.buf[self.pos];
        self.pos += 1;
        Ok(value)
    }

    fn take_u16(&mut self) -> Result<u16, WireError> {
        self.need(2)?;
        let value = u16::from_be_bytes([self.buf[self.pos], self.buf[self.pos + 1]]);
        self.pos += 2;
        Ok(value)
    }

    fn take_u32(&mut self) -> Result<u32, WireError> {
        self.need(4)?;
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.buf[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(u32::from_be_bytes(bytes))
    }

    fn take_bytes(&mut self, count: usize) -> Result<&'a [u8], WireError> {
        self.need(count)?;
        let slice = &self.buf[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    /// Decode a possibly-compressed name. `self.pos` ends just past the
    /// name's first pointer or terminator, regardless of where pointers
    /// jumped.
    fn take_name(&mut self) -> Result<DomainName, WireError> {
        let mut labels = Vec::new();
        let mut cursor = self.pos;
        let mut jumped = false;
        let mut jumps = 0;

        loop {
            let len = *self
                .buf
                .get(cursor)
                .ok_or(WireError::Truncated {
                    expected: cursor + 1,
                    actual: self.buf.len(),
                })? as usize;

            if len == 0 {
                if !jumped {
                    self.pos = cursor + 1;
                }
                break;
            }

            if len & 0xC0 == 0xC0 {
                let low = *self.buf.get(cursor + 1).ok_or(WireError::BadPointer(cursor))?;
                jumps += 1;
                if jumps > MAX_POINTER_JUMPS {
                    return Err(WireError::BadPointer(cursor));
                }
                let target = ((len & 0x3F) << 8) | low as usize;
                if target >= cursor {
                    // Forward pointers never terminate; reject them.
                    return Err(WireError::BadPointer(cursor));
                }
                if !jumped {
                    self.pos = cursor + 2;
                }
                jumped = true;
                cursor = target;
                continue;
            }

            if len & 0xC0 != 0 {
                return Err(WireError::BadPointer(cursor));
            }

            let start = cursor + 1;
            let end = start + len;
            if end > self.buf.len() {
                return Err(WireError::Truncated {
                    expected: end,
                    actual: self.buf.len(),
                });
            }
            let label =
                std::str::from_utf8(&self.buf[start..end]).map_err(|_| WireError::BadUtf8)?;
            labels.push(label.to_string());
            cursor = end;
        }

        DomainName::from_labels(labels).map_err(|_| WireError::BadName)
    }

    fn take_question(&mut self) -> Result<Question, WireError> {
        let name = self.take_name()?;
        let qtype = RecordType::from_code(self.take_u16()?);
        let class_word = self.take_u16()?;
        Ok(Question {
            name,
            qtype,
            class: class_word & !CLASS_QU_BIT,
            unicast_response: class_word & CLASS_QU_BIT != 0,
        })
    }

    /// Decode one record. Types the engine does not model are consumed and
    /// returned as `None`; a malformed packet is an error, an unknown type
    /// is not.
    fn take_record(&mut self) -> Result<Option<ResourceRecord>, WireError> {
        let name = self.take_name()?;
        let rtype = RecordType::from_code(self.take_u16()?);
        let class_word = self.take_u16()?;
        let ttl = Duration::from_secs(u64::from(self.take_u32()?));
        let rdlength = self.take_u16()? as usize;
        self.need(rdlength)?;
        let rdata_end = self.pos + rdlength;

        let rdata = match rtype {
            RecordType::A => {
                let bytes = self.take_bytes(4)?;
                Some(RData::A([bytes[0], bytes[1], bytes[2], bytes[3]].into()))
            }
            RecordType::Aaaa => {
                let bytes = self.take_bytes(16)?;
                let mut octets = [0u8; 16];
                octets.copy_from_slice(bytes);
                Some(RData::Aaaa(octets.into()))
            }
            RecordType::Ptr => Some(RData::Ptr(self.take_name()?)),
            RecordType::Srv => {
                let priority = self.take_u16()?;
                let weight = self.take_u16()?;
                let port = self.take_u16()?;
                let target = self.take_name()?;
                Some(RData::Srv {
                    priority,
                    weight,
                    port,
                    target,
                })
            }
            RecordType::Txt => {
                let mut strings = Vec::new();
                while self.pos < rdata_end {
                    let len = self.take_u8()? as usize;
                    if self.pos + len > rdata_end {
                        return Err(WireError::RdataLength {
                            expected: rdlength,
                            actual: self.pos + len - (rdata_end - rdlength),
                        });
                    }
                    let bytes = self.take_bytes(len)?;
                    let text =
                        std::str::from_utf8(bytes).map_err(|_| WireError::BadUtf8)?;
                    if !text.is_empty() {
                        strings.push(text.to_string());
                    }
                }
                Some(RData::Txt(strings))
            }
            RecordType::Nsec => {
                let next = self.take_name()?;
                let mut types = Vec::new();
                while self.pos < rdata_end {
                    let window = self.take_u8()?;
                    let count = self.take_u8()? as usize;
                    let bitmap = self.take_bytes(count)?;
                    for (byte_idx, &byte) in bitmap.iter().enumerate() {
                        for bit in 0..8 {
                            if byte & (0x80 >> bit) != 0 {
                                types.push(u16::from(window) << 8 | (byte_idx * 8 + bit) as u16);
                            }
                        }
                    }
                }
                Some(RData::Nsec { next, types })
            }
            RecordType::Any | RecordType::Other(_) => {
                self.pos = rdata_end;
                None
            }
        };

        if self.pos != rdata_end {
            return Err(WireError::RdataLength {
                expected: rdlength,
                actual: self.pos - (rdata_end - rdlength),
            });
        }

        Ok(rdata.map(|rdata| ResourceRecord {
            name,
            cache_flush: class_word & CLASS_CACHE_FLUSH_BIT != 0,
            ttl,
            rdata,
        }))
    }
}

/// Decode a datagram into a [`Message`]. Records of unmodeled types are
/// skipped; structural damage is an error.
pub fn decode(buf: &[u8]) -> Result<Message, WireError> {
    let mut r = Reader::new(buf);
    let id = r.take_u16()?;
    let flags = Flags::from_wire(r.take_u16()?);
    let qdcount = r.take_u16()?;
    let ancount = r.take_u16()?;
    let nscount = r.take_u16()?;
    let arcount = r.take_u16()?;

    let mut message = Message {
        id,
        flags,
        ..Message::default()
    };

    for _ in 0..qdcount {
        message.questions.push(r.take_question()?);
    }
    for _ in 0..ancount {
        if let Some(record) = r.take_record()? {
            message.answers.push(record);
        }
    }
    for _ in 0..nscount {
        if let Some(record) = r.take_record()? {
            message.authority.push(record);
        }
    }
    for _ in 0..arcount {
        if let Some(record) = r.take_record()? {
            message.additionals.push(record);
        }
    }

    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::Question;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn name(s: &str) -> DomainName {
        s.parse().expect("valid test name")
    }

    fn sample_message() -> Message {
        let mut msg = Message::response();
        msg.answers.push(ResourceRecord::new(
            name("_foo._tcp.local"),
            Duration::from_secs(4500),
            RData::Ptr(name("x._foo._tcp.local")),
        ));
        msg.additionals.push(
            ResourceRecord::new(
                name("x._foo._tcp.local"),
                Duration::from_secs(4500),
                RData::Srv {
                    priority: 0,
                    weight: 0,
                    port: 1024,
                    target: name("x.local"),
                },
            )
            .unique(),
        );
        msg.additionals.push(
            ResourceRecord::new(
                name("x.local"),
                Duration::from_secs(120),
                RData::A(Ipv4Addr::new(192, 0, 2, 5)),
            )
            .unique(),
        );
        msg
    }

    #[test]
    fn test_round_trip_response() {
        let msg = sample_message();
        let decoded = decode(&encode(&msg)).expect("decode");
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_round_trip_all_rdata_kinds() {
        let mut msg = Message::response();
        msg.answers.push(ResourceRecord::new(
            name("x.local"),
            Duration::from_secs(120),
            RData::Aaaa(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1)),
        ));
        msg.answers.push(ResourceRecord::new(
            name("x._foo._tcp.local"),
            Duration::from_secs(4500),
            RData::Txt(vec!["path=/".into(), "v=1".into()]),
        ));
        msg.answers.push(ResourceRecord::new(
            name("x.local"),
            Duration::from_secs(120),
            RData::Nsec {
                next: name("x.local"),
                types: vec![1, 28],
            },
        ));
        let decoded = decode(&encode(&msg)).expect("decode");
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_empty_txt_encodes_single_zero_string() {
        let mut msg = Message::response();
        msg.answers.push(ResourceRecord::new(
            name("x._foo._tcp.local"),
            Duration::from_secs(4500),
            RData::Txt(Vec::new()),
        ));
        let bytes = encode(&msg);
        let decoded = decode(&bytes).expect("decode");
        assert_eq!(decoded.answers[0].rdata, RData::Txt(Vec::new()));
        // RDLENGTH 1, rdata 0x00 at the tail.
        assert_eq!(&bytes[bytes.len() - 3..], &[0, 1, 0]);
    }

    #[test]
    fn test_encode_compresses_repeated_suffixes() {
        let msg = sample_message();
        let bytes = encode(&msg);
        let mut uncompressed = 0usize;
        uncompressed += name("_foo._tcp.local").encoded_len();
        uncompressed += name("x._foo._tcp.local").encoded_len();
        uncompressed += name("x.local").encoded_len() * 2;
        // The three answer/additional owner names plus the SRV target share
        // suffixes; the packet must be well under the uncompressed total.
        assert!(bytes.len() < 12 + uncompressed + 3 * 10 + 10);
        let decoded = decode(&bytes).expect("decode");
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_qu_bit_stripped_into_flag() {
        let mut msg = Message::query();
        msg.questions
            .push(Question::new(name("x.local"), RecordType::Any).unicast());
        let decoded = decode(&encode(&msg)).expect("decode");
        let q = &decoded.questions[0];
        assert!(q.unicast_response);
        assert_eq!(q.class, CLASS_IN);
    }

    #[test]
    fn test_cache_flush_bit_round_trip() {
        let mut msg = Message::response();
        msg.answers.push(
            ResourceRecord::new(
                name("x.local"),
                Duration::from_secs(120),
                RData::A(Ipv4Addr::new(192, 0, 2, 5)),
            )
            .unique(),
        );
        let decoded = decode(&encode(&msg)).expect("decode");
        assert!(decoded.answers[0].cache_flush);
    }

    #[test]
    fn test_unknown_record_type_skipped() {
        // Header with ANCOUNT=1, then a CNAME (type 5) record.
        let mut packet = vec![0, 0, 0x84, 0, 0, 0, 0, 1, 0, 0, 0, 0];
        packet.extend_from_slice(&[1, b'x', 5, b'l', b'o', b'c', b'a', b'l', 0]); // x.local
        packet.extend_from_slice(&5u16.to_be_bytes()); // TYPE = CNAME
        packet.extend_from_slice(&CLASS_IN.to_be_bytes());
        packet.extend_from_slice(&120u32.to_be_bytes());
        packet.extend_from_slice(&2u16.to_be_bytes()); // RDLENGTH
        packet.extend_from_slice(&[0xC0, 0x0C]); // arbitrary rdata
        let decoded = decode(&packet).expect("decode");
        assert!(decoded.answers.is_empty());
    }

    #[test]
    fn test_pointer_decode() {
        // Question name written via a pointer back into the packet.
        let mut packet = vec![0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0];
        let anchor = packet.len();
        packet.extend_from_slice(&[5, b'l', b'o', b'c', b'a', b'l', 0]);
        // "x" + pointer to "local" -- but the question starts after the
        // bare name, so pad counts say one question at this offset.
        packet.extend_from_slice(&[1, b'x', 0xC0, anchor as u8]);
        packet.extend_from_slice(&RecordType::Any.code().to_be_bytes());
        packet.extend_from_slice(&CLASS_IN.to_be_bytes());
        // The first name (offset 12) is dangling bytes in a real packet;
        // build a reader directly to exercise the pointer path.
        let mut r = Reader::new(&packet);
        r.pos = anchor + 7;
        let parsed = r.take_name().expect("pointer name");
        assert_eq!(parsed, name("x.local"));
        assert_eq!(r.pos, anchor + 7 + 4);
    }

    #[test]
    fn test_pointer_loop_rejected() {
        // Self-referential pointer.
        let packet = [0xC0u8, 0x00];
        let mut r = Reader::new(&packet);
        assert!(matches!(r.take_name(), Err(WireError::BadPointer(_))));
    }

    #[test]
    fn test_truncated_header_rejected() {
        assert!(matches!(
            decode(&[0, 1, 2]),
            Err(WireError::Truncated { .. })
        ));
    }

    #[test]
    fn test_encode_bounded_sheds_additionals_first() {
        let mut msg = sample_message();
        for i in 0..40 {
            msg.additionals.push(ResourceRecord::new(
                name(&format!("filler-{}.local", i)),
                Duration::from_secs(120),
                RData::Txt(vec!["padding-padding-padding".into()]),
            ));
        }
        let full = encode(&msg);
        assert!(full.len() > 600);
        let bounded = encode_bounded(&msg, 600);
        assert!(bounded.len() <= 600);
        let decoded = decode(&bounded).expect("decode");
        // Answers survive; additionals were shed; TC stays clear.
        assert_eq!(decoded.answers, msg.answers);
        assert!(decoded.additionals.len() < msg.additionals.len());
        assert!(!decoded.flags.truncated);
    }

    #[test]
    fn test_encode_bounded_sets_tc_when_answers_dropped() {
        let mut msg = Message::response();
        for i in 0..40 {
            msg.answers.push(ResourceRecord::new(
                name(&format!("answer-{}.local", i)),
                Duration::from_secs(120),
                RData::Txt(vec!["padding-padding-padding".into()]),
            ));
        }
        let bounded = encode_bounded(&msg, 400);
        assert!(bounded.len() <= 400);
        let decoded = decode(&bounded).expect("decode");
        assert!(decoded.flags.truncated);
        assert!(decoded.answers.len() < 40);
    }
}
