// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! LANSD Global Configuration - Single Source of Truth
//!
//! This module centralizes the mDNS protocol constants and the runtime
//! configuration. **NEVER hardcode elsewhere!**
//!
//! # Architecture
//!
//! - **Level 1 (Static)**: Compile-time constants (RFC 6762 groups, port,
//!   timing)
//! - **Level 2 (Dynamic)**: [`EngineConfig`] carried explicitly through
//!   construction (no process-wide state)

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::time::Duration;

// =======================================================================
// mDNS wire endpoints (RFC 6762 Section 3)
// =======================================================================

/// mDNS UDP port. Queries and responses both use it on send and receive.
pub const MDNS_PORT: u16 = 5353;

/// IPv4 link-local multicast group (224.0.0.251).
pub const GROUP_V4: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);

/// IPv6 link-local multicast group (ff02::fb).
pub const GROUP_V6: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0xfb);

/// Full IPv4 group endpoint used as the destination of multicast sends.
pub const GROUP_ENDPOINT_V4: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(GROUP_V4, MDNS_PORT));

/// Full IPv6 group endpoint used as the destination of multicast sends.
pub const GROUP_ENDPOINT_V6: SocketAddr =
    SocketAddr::V6(SocketAddrV6::new(GROUP_V6, MDNS_PORT, 0, 0));

// =======================================================================
// DNS-SD well-known names (RFC 6763)
// =======================================================================

/// Service-enumeration meta-query name. A PTR query for this name returns
/// one PTR per advertised service type.
pub const META_QUERY_NAME: &str = "_services._dns-sd._udp.local";

/// Parent domain for all link-local names.
pub const LOCAL_DOMAIN: &str = "local";

// =======================================================================
// Timing (RFC 6762 Sections 8.1, 8.3)
// =======================================================================

/// Spacing between the three probe queries.
pub const PROBE_STEP: Duration = Duration::from_millis(250);

/// Upper bound (exclusive) of the random delay before the first probe query.
pub const PROBE_JITTER_MAX: Duration = Duration::from_millis(250);

/// Delay between the two announcement transmissions.
pub const ANNOUNCE_REPEAT_DELAY: Duration = Duration::from_secs(1);

/// Window inside which an identical outbound message is suppressed.
pub const RECENT_SEND_TTL: Duration = Duration::from_secs(1);

/// Bound on the recent-send table so a chatty peer cannot grow it forever.
pub const RECENT_SEND_MAX_ENTRIES: usize = 512;

/// Default interface polling interval for the watcher. Anything >= 1 s is
/// acceptable; 2 s keeps rebinds prompt without burning cycles.
pub const NETWATCH_INTERVAL: Duration = Duration::from_secs(2);

// =======================================================================
// Record TTLs (RFC 6762 Section 10)
// =======================================================================

/// TTL for records whose rdata names a host (SRV, PTR, TXT, NSEC).
pub const DEFAULT_TTL: Duration = Duration::from_secs(4500);

/// TTL for host address records (A/AAAA). Shorter because addresses churn.
pub const HOST_TTL: Duration = Duration::from_secs(120);

// =======================================================================
// Datagram sizing
// =======================================================================

/// Default cap on an outbound datagram (typical Ethernet payload).
pub const DEFAULT_MTU: usize = 1500;

/// Hard ceiling for jumbo-frame LANs.
pub const MAX_MTU: usize = 9000;

/// Receive buffer size. Sized for the ceiling so oversized peers never
/// truncate on our side.
pub const RECV_BUFFER_LEN: usize = MAX_MTU;

// =======================================================================
// Runtime configuration
// =======================================================================

/// Runtime knobs carried explicitly through engine construction.
///
/// No hidden globals: every component that needs a knob receives this
/// struct (or a copy of the field) when it is built.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bind and join the IPv4 group.
    pub use_ipv4: bool,
    /// Bind and join the IPv6 group.
    pub use_ipv6: bool,
    /// Compat toggle: fold additional records into the answer section for
    /// peers that ignore additionals.
    pub answers_contain_additional_records: bool,
    /// Cap on outbound datagram size, clamped to [`MAX_MTU`].
    pub mtu: usize,
    /// Interface watcher polling interval.
    pub netwatch_interval: Duration,
}

impl EngineConfig {
    /// Effective MTU after clamping.
    #[must_use]
    pub fn effective_mtu(&self) -> usize {
        self.mtu.min(MAX_MTU)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            use_ipv4: true,
            use_ipv6: true,
            answers_contain_additional_records: false,
            mtu: DEFAULT_MTU,
            netwatch_interval: NETWATCH_INTERVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.use_ipv4);
        assert!(config.use_ipv6);
        assert!(!config.answers_contain_additional_records);
        assert_eq!(config.mtu, 1500);
    }

    #[test]
    fn test_mtu_clamped_to_ceiling() {
        let config = EngineConfig {
            mtu: 65_000,
            ..EngineConfig::default()
        };
        assert_eq!(config.effective_mtu(), MAX_MTU);
    }

    #[test]
    fn test_group_endpoints() {
        assert_eq!(GROUP_ENDPOINT_V4.to_string(), "224.0.0.251:5353");
        assert_eq!(GROUP_ENDPOINT_V6.to_string(), "[ff02::fb]:5353");
    }
}
