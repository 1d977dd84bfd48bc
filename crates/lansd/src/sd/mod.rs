// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DNS-SD service layer.
//!
//! Owns the authoritative catalog and drives the per-profile lifecycle:
//!
//! ```text
//! NEW --probe()--> PROBING --no conflict--> READY --announce()--> ANNOUNCED
//!                     |                                               |
//!                     +--conflict--> CONFLICT (caller renames)        v
//!                                                             unadvertise()
//!                                                                     |
//!                                                                     v
//!                                                                    GONE
//! ```
//!
//! Inbound queries are answered from the catalog; inbound responses are
//! interpreted into discovery events and probe-conflict observations.

pub mod probe;
pub mod profile;

use crate::catalog::{strip_meta_additionals, Catalog, NameServer, ResolveStatus};
use crate::config::{
    ANNOUNCE_REPEAT_DELAY, DEFAULT_TTL, EngineConfig, LOCAL_DOMAIN, MDNS_PORT, META_QUERY_NAME,
    PROBE_JITTER_MAX, PROBE_STEP,
};
use crate::engine::{MessagePump, PumpHandler};
use crate::protocol::{DomainName, Message, Question, RData, RecordType, ResourceRecord};
use crate::transport::netwatch::IfaceAddr;
use parking_lot::{Mutex, RwLock};
use probe::{PendingProbe, ProbeTable};
use profile::ServiceProfile;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Weak};

/// Discovery event callbacks. Implementations may be invoked from any
/// worker; a panic in one handler never reaches the others.
pub trait DiscoveryHandler: Send + Sync {
    /// A `_services._dns-sd._udp.local` PTR was observed: a peer
    /// advertises this service type.
    fn service_discovered(&self, _service: &DomainName) {}
    /// An instance PTR with TTL > 0 was observed.
    fn service_instance_discovered(&self, _instance: &DomainName, _message: &Message) {}
    /// An instance PTR with TTL = 0 (goodbye) was observed.
    fn service_instance_shutdown(&self, _instance: &DomainName, _message: &Message) {}
    /// The usable interface set changed.
    fn network_interface_discovered(&self, _addrs: &[IfaceAddr]) {}
}

/// The DNS-SD service layer.
pub struct ServiceDiscovery {
    config: EngineConfig,
    pump: Arc<MessagePump>,
    catalog: Arc<Catalog>,
    server: NameServer,
    /// Advertised profiles in registration order.
    profiles: Mutex<Vec<ServiceProfile>>,
    probes: ProbeTable,
    handlers: RwLock<Vec<Arc<dyn DiscoveryHandler>>>,
    rng: Mutex<StdRng>,
}

impl ServiceDiscovery {
    /// Build the layer and register it with the pump.
    ///
    /// `seed` pins the probe RNG for reproducible runs; `None` seeds from
    /// OS entropy.
    #[must_use]
    pub fn new(config: EngineConfig, pump: Arc<MessagePump>, seed: Option<u64>) -> Arc<Self> {
        let catalog = Arc::new(Catalog::new());
        catalog.include_reverse_lookup_records();
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let sd = Arc::new(Self {
            config,
            pump: Arc::clone(&pump),
            server: NameServer::new(Arc::clone(&catalog)),
            catalog,
            profiles: Mutex::new(Vec::new()),
            probes: ProbeTable::new(),
            handlers: RwLock::new(Vec::new()),
            rng: Mutex::new(rng),
        });
        pump.register_handler(Arc::new(SdPumpHandler {
            sd: Arc::downgrade(&sd),
        }));
        sd
    }

    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn register_handler(&self, handler: Arc<dyn DiscoveryHandler>) {
        self.handlers.write().push(handler);
    }

    // =======================================================================
    // Advertisement lifecycle
    // =======================================================================

    /// Insert a profile's records into the catalog. Sends no traffic;
    /// callers drive announcements via [`probe`](Self::probe) +
    /// [`announce`](Self::announce).
    pub fn advertise(&self, profile: &ServiceProfile) {
        let qualified = profile.qualified_service_name();
        let full = profile.fully_qualified_name();

        self.catalog.add_shared(
            ResourceRecord::new(
                meta_name(),
                DEFAULT_TTL,
                RData::Ptr(qualified.clone()),
            ),
            true,
        );
        self.catalog.add_shared(
            ResourceRecord::new(qualified, DEFAULT_TTL, RData::Ptr(full.clone())),
            true,
        );
        for subtype in &profile.subtypes {
            self.catalog.add_shared(
                ResourceRecord::new(
                    profile.subtype_name(subtype),
                    DEFAULT_TTL,
                    RData::Ptr(full.clone()),
                ),
                true,
            );
        }
        for record in profile.resources() {
            self.catalog.add(record, true);
        }

        let mut profiles = self.profiles.lock();
        if let Some(existing) = profiles
            .iter_mut()
            .find(|p| p.fully_qualified_name() == full)
        {
            *existing = profile.clone();
        } else {
            profiles.push(profile.clone());
        }
        log::debug!("[sd] advertised {}", full);
    }

    /// Verify name ownership before announcing (RFC 6762 Section 8.1).
    ///
    /// Sends three ANY queries for the profile's host name, 250 ms apart
    /// after an initial jitter in [0, 250) ms. Returns true when a peer
    /// answered any of them with at least one record: the caller must
    /// rename (see [`ServiceProfile::renamed`]) and retry.
    pub async fn probe(&self, profile: &ServiceProfile) -> bool {
        let (txid, jitter_ms) = {
            let mut rng = self.rng.lock();
            (rng.gen::<u16>().max(1), rng.gen_range(0..PROBE_JITTER_MAX.as_millis() as u64))
        };
        let pending = PendingProbe::new(txid);
        self.probes.register(Arc::clone(&pending));
        log::debug!(
            "[sd] probing {} txid={:#06x} jitter={}ms",
            profile.host,
            txid,
            jitter_ms
        );

        tokio::time::sleep(std::time::Duration::from_millis(jitter_ms)).await;
        for round in 0..3 {
            if round > 0 {
                tokio::time::sleep(PROBE_STEP).await;
            }
            let mut query = Message::query()
                .with_question(Question::new(profile.host.clone(), RecordType::Any));
            query.id = txid;
            self.pump.send_message(query, true);
        }
        tokio::time::sleep(PROBE_STEP).await;

        let conflicted = pending.conflicted();
        self.probes.unregister(txid);
        conflicted
    }

    /// Announce an advertised profile: an unsolicited response carrying
    /// the service PTR and the profile's resources, sent twice one second
    /// apart for loss robustness.
    pub async fn announce(&self, profile: &ServiceProfile) {
        let message = self.announcement(profile);
        self.pump.send_answer(message.clone(), None, true);
        tokio::time::sleep(ANNOUNCE_REPEAT_DELAY).await;
        self.pump.send_answer(message, None, true);
        log::debug!("[sd] announced {}", profile.fully_qualified_name());
    }

    /// Send a goodbye for the profile and remove its catalog entries.
    pub fn unadvertise(&self, profile: &ServiceProfile) {
        self.pump.send_answer(self.goodbye(profile), None, true);

        let qualified = profile.qualified_service_name();
        let full = profile.fully_qualified_name();

        self.catalog.try_remove(&full);
        self.catalog.remove_matching(&qualified, |r| r.rdata == RData::Ptr(full.clone()));
        for subtype in &profile.subtypes {
            self.catalog.remove_matching(&profile.subtype_name(subtype), |r| {
                r.rdata == RData::Ptr(full.clone())
            });
        }

        let mut profiles = self.profiles.lock();
        profiles.retain(|p| p.fully_qualified_name() != full);

        // The meta PTR and host addresses may be shared with other
        // profiles; drop them only when the last user goes away.
        if !profiles.iter().any(|p| p.qualified_service_name() == qualified) {
            self.catalog
                .remove_matching(&meta_name(), |r| r.rdata == RData::Ptr(qualified.clone()));
        }
        if !profiles.iter().any(|p| p.host == profile.host) {
            self.catalog.remove_matching(&profile.host, |r| {
                matches!(r.rdata, RData::A(_) | RData::Aaaa(_))
            });
            for addr in &profile.addresses {
                let host = profile.host.clone();
                self.catalog
                    .remove_matching(&crate::protocol::reverse_lookup_name(*addr), move |r| {
                        r.rdata == RData::Ptr(host.clone())
                    });
            }
        }
        log::debug!("[sd] unadvertised {}", full);
    }

    /// Goodbye every profile in registration order. Safe on shutdown.
    pub fn unadvertise_all(&self) {
        let profiles = self.profiles.lock().clone();
        for profile in &profiles {
            self.unadvertise(profile);
        }
    }

    fn announcement(&self, profile: &ServiceProfile) -> Message {
        let mut message = Message::response();
        message.answers.push(ResourceRecord::new(
            profile.qualified_service_name(),
            DEFAULT_TTL,
            RData::Ptr(profile.fully_qualified_name()),
        ));
        message.answers.extend(profile.resources());
        message
    }

    fn goodbye(&self, profile: &ServiceProfile) -> Message {
        let mut message = Message::response();
        message.answers.push(
            ResourceRecord::new(
                profile.qualified_service_name(),
                DEFAULT_TTL,
                RData::Ptr(profile.fully_qualified_name()),
            )
            .into_goodbye(),
        );
        message.additionals.extend(
            profile
                .resources()
                .into_iter()
                .map(ResourceRecord::into_goodbye),
        );
        message
    }

    // =======================================================================
    // Browse queries
    // =======================================================================

    /// PTR query enumerating every advertised service type on the link.
    pub fn query_all_services(&self) {
        self.pump.send_query(meta_name(), RecordType::Ptr);
    }

    /// [`query_all_services`](Self::query_all_services) with QU set.
    pub fn query_all_services_unicast(&self) {
        self.pump.send_unicast_query(meta_name(), RecordType::Ptr);
    }

    /// PTR query for instances of `service` (e.g. `_foo._tcp`), optionally
    /// narrowed to a subtype.
    pub fn query_service_instances(&self, service: &str, subtype: Option<&str>) {
        self.pump
            .send_query(instance_query_name(service, subtype), RecordType::Ptr);
    }

    /// [`query_service_instances`](Self::query_service_instances) with QU.
    pub fn query_service_instances_unicast(&self, service: &str, subtype: Option<&str>) {
        self.pump
            .send_unicast_query(instance_query_name(service, subtype), RecordType::Ptr);
    }

    // =======================================================================
    // Inbound traffic
    // =======================================================================

    fn handle_query(&self, message: &Message, remote: SocketAddr, local: IpAddr) {
        let (mut response, status) = self.server.resolve(message);
        if status != ResolveStatus::NoError {
            log::debug!(
                "[sd] dropping {:?} response for query from {}",
                status,
                remote
            );
            return;
        }

        if self.config.answers_contain_additional_records {
            let extras: Vec<ResourceRecord> = response.additionals.drain(..).collect();
            response.answers.extend(extras);
        }
        strip_meta_additionals(&mut response);

        // Legacy unicast: a querier not bound to 5353 cannot receive
        // multicast responses, so it gets a directed reply with its
        // question echoed.
        let legacy = remote.port() != MDNS_PORT;
        if legacy {
            response.questions = message.questions.clone();
        }

        if message.wants_unicast_response() || legacy {
            self.pump.send_answer(response, Some((remote, local)), false);
        } else {
            self.pump.send_answer(response, None, false);
        }
    }

    fn handle_answer(&self, message: &Message, _remote: SocketAddr, _local: IpAddr) {
        self.probes.observe_answer(message.id, message.answers.len());

        let local_domain: DomainName = LOCAL_DOMAIN.parse().expect("valid constant");
        let meta = meta_name();
        for answer in &message.answers {
            let RData::Ptr(target) = &answer.rdata else {
                continue;
            };
            if !answer.name.is_subdomain_of(&local_domain) {
                continue;
            }
            let handlers = self.handlers.read().clone();
            for handler in &handlers {
                if answer.name == meta {
                    deliver(|| handler.service_discovered(target));
                } else if answer.is_goodbye() {
                    deliver(|| handler.service_instance_shutdown(target, message));
                } else {
                    deliver(|| handler.service_instance_discovered(target, message));
                }
            }
        }
    }

    fn handle_interfaces(&self, addrs: &[IfaceAddr]) {
        let handlers = self.handlers.read().clone();
        for handler in &handlers {
            deliver(|| handler.network_interface_discovered(addrs));
        }
    }
}

/// Adapter registering the layer with the pump without creating an Arc
/// cycle (pump -> handler -> sd -> pump).
struct SdPumpHandler {
    sd: Weak<ServiceDiscovery>,
}

impl PumpHandler for SdPumpHandler {
    fn on_query(&self, message: &Message, remote: SocketAddr, local: IpAddr) {
        if let Some(sd) = self.sd.upgrade() {
            sd.handle_query(message, remote, local);
        }
    }

    fn on_answer(&self, message: &Message, remote: SocketAddr, local: IpAddr) {
        if let Some(sd) = self.sd.upgrade() {
            sd.handle_answer(message, remote, local);
        }
    }

    fn on_interfaces_changed(&self, addrs: &[IfaceAddr]) {
        if let Some(sd) = self.sd.upgrade() {
            sd.handle_interfaces(addrs);
        }
    }
}

fn meta_name() -> DomainName {
    META_QUERY_NAME.parse().expect("meta name is valid")
}

fn instance_query_name(service: &str, subtype: Option<&str>) -> DomainName {
    let text = match subtype {
        Some(subtype) => format!("{}._sub.{}.{}", subtype, service, LOCAL_DOMAIN),
        None => format!("{}.{}", service, LOCAL_DOMAIN),
    };
    text.parse().expect("service type within name limits")
}

/// Handler invocation with panic isolation.
fn deliver<F: FnOnce()>(f: F) {
    if std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)).is_err() {
        log::debug!("[sd] discovery handler panicked during delivery");
    }
}
