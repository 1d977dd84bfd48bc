// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Name server: resolves questions against the catalog.

use crate::catalog::Catalog;
use crate::config::META_QUERY_NAME;
use crate::protocol::{DomainName, Message, RData, RecordType, ResourceRecord};
use std::collections::HashSet;
use std::sync::Arc;

/// Resolution outcome. Anything but `NoError` makes the responder drop
/// the response rather than send a negative answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStatus {
    NoError,
    /// No question's name exists in the catalog.
    NameError,
    /// A name exists but this host does not own it.
    Refused,
}

/// Authoritative resolver over a [`Catalog`].
pub struct NameServer {
    catalog: Arc<Catalog>,
    /// Attempt every question even after the first has answers. Required
    /// for mDNS, where one datagram batches unrelated questions.
    answer_all_questions: bool,
}

impl NameServer {
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            answer_all_questions: true,
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Resolve a request into an authoritative response.
    ///
    /// Answers come from catalog nodes this host owns (AA=1). For every
    /// answer, chained context records are placed in the additional
    /// section: a PTR pulls the SRV/TXT at its target, an SRV pulls the
    /// address records of its target.
    #[must_use]
    pub fn resolve(&self, request: &Message) -> (Message, ResolveStatus) {
        let mut response = Message::response();
        response.id = request.id;

        let mut answered = false;
        let mut refused = false;

        for question in &request.questions {
            if answered && !self.answer_all_questions {
                break;
            }
            let Some(node) = self.catalog.node(&question.name) else {
                continue;
            };
            if !node.is_authoritative() {
                log::debug!("[resolver] refusing non-owned name {}", question.name);
                refused = true;
                continue;
            }
            let matched: Vec<ResourceRecord> = node
                .records()
                .iter()
                .filter(|r| {
                    question.qtype == RecordType::Any || r.record_type() == question.qtype
                })
                .cloned()
                .collect();
            if !matched.is_empty() {
                answered = true;
                response.answers.extend(matched);
            }
        }

        if answered {
            self.chain_additionals(&mut response);
            strip_meta_additionals(&mut response);
            return (response, ResolveStatus::NoError);
        }
        if refused {
            return (response, ResolveStatus::Refused);
        }
        (response, ResolveStatus::NameError)
    }

    /// Fill the additional section with the records a client needs next:
    /// PTR answer -> SRV/TXT at the instance name; SRV -> A/AAAA of the
    /// target host.
    fn chain_additionals(&self, response: &mut Message) {
        let mut seen: HashSet<(String, u16)> = response
            .answers
            .iter()
            .map(|r| (r.name.key(), r.record_type().code()))
            .collect();
        let mut additionals = Vec::new();

        let mut frontier: Vec<ResourceRecord> = response.answers.clone();
        while let Some(record) = frontier.pop() {
            match &record.rdata {
                RData::Ptr(target) => {
                    for next in self.catalog.records_at(target) {
                        if matches!(next.rdata, RData::Srv { .. } | RData::Txt(_))
                            && seen.insert((next.name.key(), next.record_type().code()))
                        {
                            frontier.push(next.clone());
                            additionals.push(next);
                        }
                    }
                }
                RData::Srv { target, .. } => {
                    for next in self.catalog.records_at(target) {
                        if matches!(next.rdata, RData::A(_) | RData::Aaaa(_))
                            && seen.insert((next.name.key(), next.record_type().code()))
                        {
                            additionals.push(next);
                        }
                    }
                    for next in self.catalog.records_at(&record.name) {
                        if matches!(next.rdata, RData::Txt(_))
                            && seen.insert((next.name.key(), next.record_type().code()))
                        {
                            additionals.push(next);
                        }
                    }
                }
                _ => {}
            }
        }

        response.additionals.extend(additionals);
    }
}

/// Empty the additional section of a response that answers the DNS-SD
/// service-enumeration meta-query; some clients choke on extras there.
pub fn strip_meta_additionals(response: &mut Message) {
    let meta: DomainName = META_QUERY_NAME.parse().expect("meta name is valid");
    if response.answers.iter().any(|r| r.name == meta) {
        response.additionals.clear();
    }
}
