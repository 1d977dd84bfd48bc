// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Resource records and their typed rdata.

use crate::protocol::name::DomainName;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

/// DNS class IN. The only class mDNS traffic uses.
pub const CLASS_IN: u16 = 1;

/// Top bit of a question's class: unicast response requested (QU).
pub const CLASS_QU_BIT: u16 = 0x8000;

/// Top bit of a record's class in a response: cache-flush, set on unique
/// records so peers drop stale copies.
pub const CLASS_CACHE_FLUSH_BIT: u16 = 0x8000;

/// Record type codes handled by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    Aaaa,
    Ptr,
    Srv,
    Txt,
    Nsec,
    /// Query-only wildcard.
    Any,
    /// Anything else on the wire; carried by code so decode never fails on
    /// types the engine does not model.
    Other(u16),
}

impl RecordType {
    #[must_use]
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => Self::A,
            28 => Self::Aaaa,
            12 => Self::Ptr,
            33 => Self::Srv,
            16 => Self::Txt,
            47 => Self::Nsec,
            255 => Self::Any,
            other => Self::Other(other),
        }
    }

    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Self::A => 1,
            Self::Aaaa => 28,
            Self::Ptr => 12,
            Self::Srv => 33,
            Self::Txt => 16,
            Self::Nsec => 47,
            Self::Any => 255,
            Self::Other(code) => code,
        }
    }
}

/// Typed rdata for the supported record kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Ptr(DomainName),
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: DomainName,
    },
    /// TXT attribute strings, each <= 255 bytes on the wire. An empty set
    /// still encodes as one zero-length string.
    Txt(Vec<String>),
    /// Negative-response record: next owner name plus the type codes
    /// present at this name.
    Nsec {
        next: DomainName,
        types: Vec<u16>,
    },
}

impl RData {
    #[must_use]
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::A(_) => RecordType::A,
            Self::Aaaa(_) => RecordType::Aaaa,
            Self::Ptr(_) => RecordType::Ptr,
            Self::Srv { .. } => RecordType::Srv,
            Self::Txt(_) => RecordType::Txt,
            Self::Nsec { .. } => RecordType::Nsec,
        }
    }
}

/// A resource record: owner name, class metadata, TTL, typed rdata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub name: DomainName,
    /// Cache-flush bit as observed/emitted on the wire class field. Set on
    /// unique (single-owner) records, clear on shared ones.
    pub cache_flush: bool,
    pub ttl: Duration,
    pub rdata: RData,
}

impl ResourceRecord {
    #[must_use]
    pub fn new(name: DomainName, ttl: Duration, rdata: RData) -> Self {
        Self {
            name,
            cache_flush: false,
            ttl,
            rdata,
        }
    }

    /// Same record with the cache-flush bit set.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.cache_flush = true;
        self
    }

    #[must_use]
    #[inline]
    pub fn record_type(&self) -> RecordType {
        self.rdata.record_type()
    }

    /// Convenience constructor for an address record of either family.
    #[must_use]
    pub fn address(name: DomainName, ttl: Duration, addr: IpAddr) -> Self {
        let rdata = match addr {
            IpAddr::V4(v4) => RData::A(v4),
            IpAddr::V6(v6) => RData::Aaaa(v6),
        };
        Self::new(name, ttl, rdata)
    }

    /// TTL zero marks a goodbye record.
    #[must_use]
    #[inline]
    pub fn is_goodbye(&self) -> bool {
        self.ttl.is_zero()
    }

    /// Same record with TTL forced to zero.
    #[must_use]
    pub fn into_goodbye(mut self) -> Self {
        self.ttl = Duration::ZERO;
        self
    }
}

/// Reverse-lookup owner name for an address: `4.3.2.1.in-addr.arpa` or the
/// nibble-expanded `ip6.arpa` form.
#[must_use]
pub fn reverse_lookup_name(addr: IpAddr) -> DomainName {
    let text = match addr {
        IpAddr::V4(v4) => {
            let [a, b, c, d] = v4.octets();
            format!("{}.{}.{}.{}.in-addr.arpa", d, c, b, a)
        }
        IpAddr::V6(v6) => {
            let mut nibbles = Vec::with_capacity(32);
            for byte in v6.octets().iter().rev() {
                nibbles.push(format!("{:x}", byte & 0x0f));
                nibbles.push(format!("{:x}", byte >> 4));
            }
            format!("{}.ip6.arpa", nibbles.join("."))
        }
    };
    text.parse().expect("reverse name labels are within limits")
}
