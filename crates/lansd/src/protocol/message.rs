// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DNS message model: header flags, questions, and the four record
//! sections.

use crate::protocol::name::DomainName;
use crate::protocol::record::{RecordType, ResourceRecord, CLASS_IN};

/// Header flag word masks (RFC 1035 Section 4.1.1).
pub const FLAG_QR: u16 = 0x8000;
pub const FLAG_OPCODE_MASK: u16 = 0x7800;
pub const FLAG_AA: u16 = 0x0400;
pub const FLAG_TC: u16 = 0x0200;
pub const FLAG_RD: u16 = 0x0100;
pub const FLAG_RA: u16 = 0x0080;
pub const FLAG_RCODE_MASK: u16 = 0x000F;

/// Decoded header flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags {
    /// false = query, true = response.
    pub qr: bool,
    pub opcode: u8,
    pub authoritative: bool,
    pub truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    pub rcode: u8,
}

impl Flags {
    #[must_use]
    pub fn from_wire(word: u16) -> Self {
        Self {
            qr: word & FLAG_QR != 0,
            opcode: ((word & FLAG_OPCODE_MASK) >> 11) as u8,
            authoritative: word & FLAG_AA != 0,
            truncated: word & FLAG_TC != 0,
            recursion_desired: word & FLAG_RD != 0,
            recursion_available: word & FLAG_RA != 0,
            rcode: (word & FLAG_RCODE_MASK) as u8,
        }
    }

    #[must_use]
    pub fn to_wire(self) -> u16 {
        let mut word = 0u16;
        if self.qr {
            word |= FLAG_QR;
        }
        word |= (u16::from(self.opcode) << 11) & FLAG_OPCODE_MASK;
        if self.authoritative {
            word |= FLAG_AA;
        }
        if self.truncated {
            word |= FLAG_TC;
        }
        if self.recursion_desired {
            word |= FLAG_RD;
        }
        if self.recursion_available {
            word |= FLAG_RA;
        }
        word |= u16::from(self.rcode) & FLAG_RCODE_MASK;
        word
    }
}

/// A question: name, type, class, and the QU bit stripped out of the
/// class on receive.
///
/// The stored class is always normalized; the resolver never sees QU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub name: DomainName,
    pub qtype: RecordType,
    pub class: u16,
    /// True when the querier asked for a unicast response (QU).
    pub unicast_response: bool,
}

impl Question {
    #[must_use]
    pub fn new(name: DomainName, qtype: RecordType) -> Self {
        Self {
            name,
            qtype,
            class: CLASS_IN,
            unicast_response: false,
        }
    }

    /// Same question with the QU bit requested.
    #[must_use]
    pub fn unicast(mut self) -> Self {
        self.unicast_response = true;
        self
    }
}

/// A DNS message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    pub id: u16,
    pub flags: Flags,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authority: Vec<ResourceRecord>,
    pub additionals: Vec<ResourceRecord>,
}

impl Message {
    /// An empty query (QR=0). mDNS multicast queries carry id 0.
    #[must_use]
    pub fn query() -> Self {
        Self::default()
    }

    /// An empty authoritative response (QR=1, AA=1).
    #[must_use]
    pub fn response() -> Self {
        Self {
            flags: Flags {
                qr: true,
                authoritative: true,
                ..Flags::default()
            },
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_question(mut self, question: Question) -> Self {
        self.questions.push(question);
        self
    }

    /// True when any question carries the QU bit.
    #[must_use]
    pub fn wants_unicast_response(&self) -> bool {
        self.questions.iter().any(|q| q.unicast_response)
    }

    /// Total record count across the three record sections.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.answers.len() + self.authority.len() + self.additionals.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_round_trip() {
        let flags = Flags {
            qr: true,
            opcode: 0,
            authoritative: true,
            truncated: false,
            recursion_desired: false,
            recursion_available: false,
            rcode: 0,
        };
        assert_eq!(Flags::from_wire(flags.to_wire()), flags);
        // The classic mDNS response word: QR=1, AA=1.
        assert_eq!(flags.to_wire(), 0x8400);
    }

    #[test]
    fn test_flags_rcode_and_opcode() {
        let word = Flags {
            qr: false,
            opcode: 2,
            rcode: 3,
            ..Flags::default()
        }
        .to_wire();
        let back = Flags::from_wire(word);
        assert_eq!(back.opcode, 2);
        assert_eq!(back.rcode, 3);
    }

    #[test]
    fn test_wants_unicast_response() {
        let name: DomainName = "x.local".parse().unwrap();
        let qm = Message::query().with_question(Question::new(name.clone(), RecordType::Any));
        assert!(!qm.wants_unicast_response());
        let qu = Message::query().with_question(Question::new(name, RecordType::Any).unicast());
        assert!(qu.wants_unicast_response());
    }
}
