// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Engine assembly: wires the watcher, transport, pump, and service
//! layer together and owns their tasks.

use crate::config::EngineConfig;
use crate::engine::MessagePump;
use crate::sd::ServiceDiscovery;
use crate::transport::netwatch::InterfaceWatcher;
use crate::transport::MulticastTransport;
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A running mDNS / DNS-SD engine.
///
/// ```rust,no_run
/// use lansd::{EngineConfig, ServiceDaemon, ServiceProfile};
///
/// #[tokio::main]
/// async fn main() -> std::io::Result<()> {
///     let daemon = ServiceDaemon::spawn(EngineConfig::default())?;
///
///     let profile = ServiceProfile::new("x", "_foo._tcp", 1024, "x.local".parse().unwrap())
///         .with_address("192.0.2.5".parse().unwrap());
///     if !daemon.discovery().probe(&profile).await {
///         daemon.discovery().advertise(&profile);
///         daemon.discovery().announce(&profile).await;
///     }
///
///     daemon.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct ServiceDaemon {
    discovery: Arc<ServiceDiscovery>,
    transport: Arc<MulticastTransport>,
    watcher: InterfaceWatcher,
    pump_task: JoinHandle<()>,
    send_task: JoinHandle<()>,
}

impl ServiceDaemon {
    /// Bind sockets and start every task. Must run on the tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails when a receiver cannot bind port 5353 for an enabled family.
    pub fn spawn(config: EngineConfig) -> io::Result<Self> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let transport = Arc::new(MulticastTransport::new(&config, inbound_tx)?);
        let pump = MessagePump::new(outbound_tx, config.effective_mtu());
        let discovery = ServiceDiscovery::new(config.clone(), Arc::clone(&pump), None);

        let pump_task = pump.start(inbound_rx);
        let send_task = transport.spawn_send_task(outbound_rx);

        let watcher = {
            let transport = Arc::clone(&transport);
            let pump = Arc::clone(&pump);
            InterfaceWatcher::spawn(
                config.netwatch_interval,
                Arc::new(move |addrs| {
                    transport.apply_interfaces(addrs);
                    pump.notify_interfaces(addrs);
                }),
            )
        };

        log::debug!("[daemon] engine started");
        Ok(Self {
            discovery,
            transport,
            watcher,
            pump_task,
            send_task,
        })
    }

    /// The DNS-SD layer: advertise, probe, announce, browse.
    #[must_use]
    pub fn discovery(&self) -> &Arc<ServiceDiscovery> {
        &self.discovery
    }

    /// Goodbye every advertised profile, then close every socket. The
    /// closing sockets end the receive loops.
    pub async fn shutdown(self) {
        self.discovery.unadvertise_all();
        // Give the send task a moment to flush the goodbyes before the
        // sockets go away.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        self.watcher.shutdown();
        self.transport.shutdown();
        self.pump_task.abort();
        self.send_task.abort();
        log::debug!("[daemon] engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_daemon_spawn_and_shutdown() {
        let config = EngineConfig {
            use_ipv6: false,
            ..EngineConfig::default()
        };
        let daemon = ServiceDaemon::spawn(config).expect("spawn");
        assert!(daemon.discovery().catalog().is_empty());
        daemon.shutdown().await;
    }
}
