// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Authoritative record catalog.
//!
//! Name-keyed store of the records this host will answer for. Readers
//! (the resolver, on every inbound query) take cloned snapshots under a
//! read lock; writers (advertise/unadvertise) replace entries whole. A
//! record is never mutated after insertion.

mod resolver;

pub use resolver::{strip_meta_additionals, NameServer, ResolveStatus};

use crate::protocol::{reverse_lookup_name, DomainName, RData, ResourceRecord};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::IpAddr;

/// Records stored at one name, with ownership marking.
#[derive(Debug, Clone, Default)]
pub struct CatalogNode {
    records: Vec<ResourceRecord>,
    /// True when this host owns the name and answers with AA set.
    authoritative: bool,
}

impl CatalogNode {
    #[must_use]
    pub fn records(&self) -> &[ResourceRecord] {
        &self.records
    }

    #[must_use]
    pub fn is_authoritative(&self) -> bool {
        self.authoritative
    }
}

/// The catalog: `DomainName -> CatalogNode`.
pub struct Catalog {
    nodes: RwLock<HashMap<DomainName, CatalogNode>>,
    reverse_lookups: RwLock<bool>,
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            reverse_lookups: RwLock::new(false),
        }
    }

    /// Insert a shared record (multiple responders may own copies, e.g.
    /// service PTRs). The cache-flush bit stays clear.
    pub fn add_shared(&self, record: ResourceRecord, authoritative: bool) {
        let mut record = record;
        record.cache_flush = false;
        self.add(record, authoritative);
    }

    /// Insert a unique record (single owner; announced with cache-flush
    /// and defended by probing).
    pub fn add_unique(&self, record: ResourceRecord, authoritative: bool) {
        self.add(record.unique(), authoritative);
    }

    /// Insert a record as-is. An existing record with the same type and
    /// rdata at the same name is replaced, which makes repeated identical
    /// insertions idempotent.
    pub fn add(&self, record: ResourceRecord, authoritative: bool) {
        let derived = self.derive_reverse(&record);

        {
            let mut nodes = self.nodes.write();
            let node = nodes.entry(record.name.clone()).or_default();
            node.authoritative |= authoritative;
            if let Some(existing) = node.records.iter_mut().find(|r| {
                r.record_type() == record.record_type() && r.rdata == record.rdata
            }) {
                *existing = record;
            } else {
                node.records.push(record);
            }
        }

        if let Some(reverse) = derived {
            log::debug!("[catalog] derived reverse PTR {}", reverse.name);
            self.add(reverse, authoritative);
        }
    }

    /// Remove every record at `name`. Returns false when the name was not
    /// present.
    pub fn try_remove(&self, name: &DomainName) -> bool {
        self.nodes.write().remove(name).is_some()
    }

    /// Remove records at `name` matching the predicate; the node itself is
    /// dropped once empty. Returns how many records were removed.
    pub fn remove_matching<F>(&self, name: &DomainName, predicate: F) -> usize
    where
        F: Fn(&ResourceRecord) -> bool,
    {
        let mut nodes = self.nodes.write();
        let Some(node) = nodes.get_mut(name) else {
            return 0;
        };
        let before = node.records.len();
        node.records.retain(|r| !predicate(r));
        let removed = before - node.records.len();
        if node.records.is_empty() {
            nodes.remove(name);
        }
        removed
    }

    /// Start deriving reverse PTR records (IP -> hostname) for address
    /// records, and backfill them for addresses already present.
    pub fn include_reverse_lookup_records(&self) {
        *self.reverse_lookups.write() = true;

        let existing: Vec<ResourceRecord> = {
            let nodes = self.nodes.read();
            nodes
                .values()
                .flat_map(|node| node.records.iter().cloned())
                .filter(|r| matches!(r.rdata, RData::A(_) | RData::Aaaa(_)))
                .collect()
        };
        for record in existing {
            if let Some(reverse) = self.derive_reverse(&record) {
                self.add(reverse, true);
            }
        }
    }

    fn derive_reverse(&self, record: &ResourceRecord) -> Option<ResourceRecord> {
        if !*self.reverse_lookups.read() {
            return None;
        }
        let addr: IpAddr = match &record.rdata {
            RData::A(v4) => IpAddr::V4(*v4),
            RData::Aaaa(v6) => IpAddr::V6(*v6),
            _ => return None,
        };
        Some(ResourceRecord::new(
            reverse_lookup_name(addr),
            record.ttl,
            RData::Ptr(record.name.clone()),
        ))
    }

    /// Snapshot of the node at `name`.
    #[must_use]
    pub fn node(&self, name: &DomainName) -> Option<CatalogNode> {
        self.nodes.read().get(name).cloned()
    }

    /// Snapshot of the records at `name` (empty when absent).
    #[must_use]
    pub fn records_at(&self, name: &DomainName) -> Vec<ResourceRecord> {
        self.nodes
            .read()
            .get(name)
            .map(|node| node.records.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn contains(&self, name: &DomainName) -> bool {
        self.nodes.read().contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}
