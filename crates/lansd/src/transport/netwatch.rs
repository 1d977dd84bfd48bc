// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Network interface enumeration and change watching.
//!
//! mDNS is link-scoped, so only addresses that keep traffic on-link are
//! usable: loopback is skipped, and IPv6 addresses must be link-local
//! (a globally routable v6 source would leak queries off-link).

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv6Addr};
use std::time::Duration;
use tokio::task::JoinHandle;

/// One usable (interface, address) pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IfaceAddr {
    /// OS interface name (e.g. "eth0").
    pub name: String,
    /// OS interface index, used for IPv6 group joins. Zero when the
    /// provider cannot report one.
    pub index: u32,
    pub addr: IpAddr,
}

/// Callback invoked with the full usable set whenever it changes.
pub type ChangeCallback = std::sync::Arc<dyn Fn(&[IfaceAddr]) + Send + Sync>;

fn is_link_local_v6(addr: &Ipv6Addr) -> bool {
    addr.segments()[0] & 0xffc0 == 0xfe80
}

/// Enumerate usable (interface, address) pairs, sorted for stable diffs.
#[must_use]
pub fn list_usable() -> Vec<IfaceAddr> {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(err) => {
            log::warn!("[netwatch] interface enumeration failed: {}", err);
            return Vec::new();
        }
    };

    let mut usable = BTreeSet::new();
    for iface in interfaces {
        if iface.is_loopback() {
            continue;
        }
        let addr = iface.ip();
        if let IpAddr::V6(v6) = addr {
            if !is_link_local_v6(&v6) {
                continue;
            }
        }
        usable.insert(IfaceAddr {
            name: iface.name.clone(),
            index: iface.index.unwrap_or(0),
            addr,
        });
    }
    usable.into_iter().collect()
}

/// Polling watcher over the usable set.
///
/// Invokes the callback with the initial set, then re-enumerates every
/// `interval` and fires again whenever the set differs from the last
/// observation.
pub struct InterfaceWatcher {
    handle: JoinHandle<()>,
}

impl InterfaceWatcher {
    pub fn spawn(interval: Duration, callback: ChangeCallback) -> Self {
        let handle = tokio::spawn(async move {
            let mut last = list_usable();
            log::debug!("[netwatch] initial set: {} address(es)", last.len());
            callback(&last);
            loop {
                tokio::time::sleep(interval).await;
                let current = list_usable();
                if current != last {
                    log::debug!(
                        "[netwatch] interface set changed: {} -> {} address(es)",
                        last.len(),
                        current.len()
                    );
                    callback(&current);
                    last = current;
                }
            }
        });
        Self { handle }
    }

    /// Stop polling. Dropping the watcher does the same.
    pub fn shutdown(self) {
        self.handle.abort();
    }
}

impl Drop for InterfaceWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_link_local_detection() {
        assert!(is_link_local_v6(&"fe80::1".parse().unwrap()));
        assert!(is_link_local_v6(&"febf::1".parse().unwrap()));
        assert!(!is_link_local_v6(&"fec0::1".parse().unwrap()));
        assert!(!is_link_local_v6(&"2001:db8::1".parse().unwrap()));
        assert!(!is_link_local_v6(&"::1".parse().unwrap()));
    }

    #[test]
    fn test_list_usable_filters_loopback_and_global_v6() {
        for iface in list_usable() {
            assert!(!iface.addr.is_loopback());
            if let IpAddr::V6(v6) = iface.addr {
                assert!(is_link_local_v6(&v6));
            }
        }
    }

    #[test]
    fn test_list_usable_is_sorted_and_deduped() {
        let listed = list_usable();
        let set: BTreeSet<_> = listed.iter().cloned().collect();
        assert_eq!(set.into_iter().collect::<Vec<_>>(), listed);
    }

    #[tokio::test]
    async fn test_watcher_fires_initial_callback() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);
        let watcher = InterfaceWatcher::spawn(
            Duration::from_secs(60),
            Arc::new(move |_set| {
                fired_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        watcher.shutdown();
    }
}
