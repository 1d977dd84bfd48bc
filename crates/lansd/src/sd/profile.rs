// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Service advertisement profiles.
//!
//! Naming, per DNS-SD convention: the *qualified service name* is
//! `<service>.local` (e.g. `_foo._tcp.local`) and the *fully qualified
//! name* is `<instance>.<service>.local` (e.g. `x._foo._tcp.local`).

use crate::config::{DEFAULT_TTL, HOST_TTL, LOCAL_DOMAIN};
use crate::protocol::{DomainName, RData, ResourceRecord};
use std::net::IpAddr;

/// Everything needed to advertise one service instance.
#[derive(Debug, Clone)]
pub struct ServiceProfile {
    /// Instance label, e.g. "Living Room Printer".
    pub instance: String,
    /// Service type, e.g. "_foo._tcp".
    pub service: String,
    pub port: u16,
    /// Subtype labels, advertised as `<subtype>._sub.<service>.local`.
    pub subtypes: Vec<String>,
    /// Target host name, e.g. `x.local`.
    pub host: DomainName,
    /// TXT attributes, rendered as `key=value` strings.
    pub txt: Vec<(String, String)>,
    /// Host addresses, one A/AAAA record each.
    pub addresses: Vec<IpAddr>,
}

impl ServiceProfile {
    #[must_use]
    pub fn new(instance: &str, service: &str, port: u16, host: DomainName) -> Self {
        Self {
            instance: instance.to_string(),
            service: service.to_string(),
            port,
            subtypes: Vec::new(),
            host,
            txt: Vec::new(),
            addresses: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_address(mut self, addr: IpAddr) -> Self {
        self.addresses.push(addr);
        self
    }

    #[must_use]
    pub fn with_subtype(mut self, subtype: &str) -> Self {
        self.subtypes.push(subtype.to_string());
        self
    }

    #[must_use]
    pub fn with_txt(mut self, key: &str, value: &str) -> Self {
        self.txt.push((key.to_string(), value.to_string()));
        self
    }

    /// `<service>.local`
    #[must_use]
    pub fn qualified_service_name(&self) -> DomainName {
        format!("{}.{}", self.service, LOCAL_DOMAIN)
            .parse()
            .expect("service type within name limits")
    }

    /// `<instance>.<service>.local`
    #[must_use]
    pub fn fully_qualified_name(&self) -> DomainName {
        let instance: DomainName = DomainName::from_labels(vec![self.instance.clone()])
            .expect("instance label within limits");
        instance
            .join(&self.qualified_service_name())
            .expect("instance name within limits")
    }

    /// `<subtype>._sub.<service>.local`
    #[must_use]
    pub fn subtype_name(&self, subtype: &str) -> DomainName {
        format!("{}._sub.{}.{}", subtype, self.service, LOCAL_DOMAIN)
            .parse()
            .expect("subtype within name limits")
    }

    /// The unique records this instance owns: SRV + TXT at the fully
    /// qualified name, A/AAAA at the host name.
    #[must_use]
    pub fn resources(&self) -> Vec<ResourceRecord> {
        let full_name = self.fully_qualified_name();
        let mut records = vec![
            ResourceRecord::new(
                full_name.clone(),
                DEFAULT_TTL,
                RData::Srv {
                    priority: 0,
                    weight: 0,
                    port: self.port,
                    target: self.host.clone(),
                },
            )
            .unique(),
            ResourceRecord::new(full_name, DEFAULT_TTL, RData::Txt(self.txt_strings())).unique(),
        ];
        for addr in &self.addresses {
            records.push(ResourceRecord::address(self.host.clone(), HOST_TTL, *addr).unique());
        }
        records
    }

    fn txt_strings(&self) -> Vec<String> {
        self.txt
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect()
    }

    /// Conflict-rename policy: "x" -> "x (2)" -> "x (3)" -> ...
    ///
    /// Callers apply this after a probe reports a conflict and then probe
    /// again; the engine never renames on its own.
    #[must_use]
    pub fn renamed(&self) -> Self {
        let instance = match self
            .instance
            .rsplit_once(" (")
            .and_then(|(base, rest)| rest.strip_suffix(')').map(|n| (base, n)))
            .and_then(|(base, n)| n.parse::<u32>().ok().map(|n| (base, n)))
        {
            Some((base, n)) => format!("{} ({})", base, n + 1),
            None => format!("{} (2)", self.instance),
        };
        Self {
            instance,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn profile() -> ServiceProfile {
        ServiceProfile::new("x", "_foo._tcp", 1024, "x.local".parse().unwrap())
            .with_address(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 5)))
            .with_txt("path", "/")
    }

    #[test]
    fn test_derived_names() {
        let p = profile();
        assert_eq!(p.qualified_service_name().to_string(), "_foo._tcp.local");
        assert_eq!(p.fully_qualified_name().to_string(), "x._foo._tcp.local");
        assert_eq!(
            p.subtype_name("_printer").to_string(),
            "_printer._sub._foo._tcp.local"
        );
    }

    #[test]
    fn test_instance_label_with_dots_stays_one_label() {
        let p = ServiceProfile::new("unit 5.1", "_foo._tcp", 1, "h.local".parse().unwrap());
        let full = p.fully_qualified_name();
        assert_eq!(full.labels()[0], "unit 5.1");
        assert_eq!(full.label_count(), 4);
    }

    #[test]
    fn test_resources() {
        let p = profile();
        let resources = p.resources();
        assert_eq!(resources.len(), 3); // SRV + TXT + A
        assert!(resources.iter().all(|r| r.cache_flush));

        let srv = &resources[0];
        assert_eq!(srv.name.to_string(), "x._foo._tcp.local");
        assert!(matches!(
            srv.rdata,
            RData::Srv { port: 1024, priority: 0, weight: 0, .. }
        ));

        let txt = &resources[1];
        assert_eq!(txt.rdata, RData::Txt(vec!["path=/".to_string()]));

        let a = &resources[2];
        assert_eq!(a.name.to_string(), "x.local");
        assert_eq!(a.rdata, RData::A(Ipv4Addr::new(192, 0, 2, 5)));
    }

    #[test]
    fn test_renamed_sequence() {
        let p = profile();
        let second = p.renamed();
        assert_eq!(second.instance, "x (2)");
        let third = second.renamed();
        assert_eq!(third.instance, "x (3)");
        // Parenthetical text that is not a counter starts a fresh one.
        let odd = ServiceProfile::new("x (beta)", "_foo._tcp", 1, "h.local".parse().unwrap());
        assert_eq!(odd.renamed().instance, "x (beta) (2)");
    }
}
