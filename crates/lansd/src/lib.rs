// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # LANSD - Link-local Service Discovery
//!
//! A pure Rust engine for Multicast DNS (RFC 6762) and DNS-Based Service
//! Discovery (RFC 6763): advertise named services on the local link,
//! browse for services advertised by peers, and answer queries
//! authoritatively from a local record catalog.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lansd::{EngineConfig, ServiceDaemon, ServiceProfile};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let daemon = ServiceDaemon::spawn(EngineConfig::default())?;
//!     let sd = daemon.discovery();
//!
//!     // Claim a name, then advertise and announce it.
//!     let mut profile = ServiceProfile::new("web", "_http._tcp", 8080, "host.local".parse().unwrap())
//!         .with_address("192.0.2.5".parse().unwrap());
//!     while sd.probe(&profile).await {
//!         profile = profile.renamed();
//!     }
//!     sd.advertise(&profile);
//!     sd.announce(&profile).await;
//!
//!     // Browse for peers.
//!     sd.query_all_services();
//!
//!     daemon.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                       Service Discovery (sd)                       |
//! |  Advertise / Probe / Announce / Goodbye | discovery events         |
//! +--------------------------------------------------------------------+
//! |              Catalog + Name Server (catalog)                       |
//! |  authoritative records | question resolution | additionals         |
//! +--------------------------------------------------------------------+
//! |                      Message Pump (engine)                         |
//! |  wire codec boundary | duplicate suppression | classification      |
//! +--------------------------------------------------------------------+
//! |                  Multicast Transport (transport)                   |
//! |  per-family receivers | per-address senders | group membership     |
//! +--------------------------------------------------------------------+
//! ```
//!
//! Inbound datagrams enter at the transport, are decoded and classified
//! by the pump, and either raise discovery events or are resolved against
//! the catalog and answered. The interface watcher feeds address changes
//! into the transport (rebind) and the pump (events).
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ServiceDaemon`] | Entry point; owns sockets and tasks |
//! | [`ServiceDiscovery`] | Advertise/probe/announce/browse API |
//! | [`ServiceProfile`] | One service advertisement |
//! | [`Catalog`] | Authoritative record store |
//! | [`Message`] | DNS message (questions + record sections) |
//! | [`EngineConfig`] | Runtime knobs (families, MTU, compat) |
//!
//! mDNS is best-effort by design: per-interface send failures are logged
//! and swallowed, malformed datagrams are dropped, and nothing persists
//! across restarts.

/// Protocol constants and runtime configuration.
pub mod config;
/// Authoritative record catalog and the name server over it.
pub mod catalog;
/// Engine assembly (sockets + tasks).
pub mod daemon;
/// Message pump: codec boundary, suppression, dispatch.
pub mod engine;
/// DNS message model and wire codec.
pub mod protocol;
/// DNS-SD layer: advertisement lifecycle and browse events.
pub mod sd;
/// Multicast UDP transport and interface watching.
pub mod transport;

pub use catalog::{Catalog, NameServer, ResolveStatus};
pub use config::EngineConfig;
pub use daemon::ServiceDaemon;
pub use engine::{MessagePump, PumpHandler};
pub use protocol::{
    DomainName, Flags, Message, Question, RData, RecordType, ResourceRecord, WireError,
};
pub use sd::profile::ServiceProfile;
pub use sd::{DiscoveryHandler, ServiceDiscovery};
pub use transport::netwatch::IfaceAddr;
pub use transport::MulticastTransport;

/// LANSD version string.
pub const VERSION: &str = "0.2.0";
