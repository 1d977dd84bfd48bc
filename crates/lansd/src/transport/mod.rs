// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Multicast UDP transport.
//!
//! One receiver socket per IP family, bound to the family wildcard on
//! port 5353 with address reuse so multiple responders coexist on one
//! host. One sender socket per usable local address, joined to the group
//! on that address, loopback enabled; outbound datagrams fan out across
//! every sender so each NIC carries the traffic.
//!
//! ```text
//! recv:  [wildcard :5353 v4]--+
//!        [wildcard :5353 v6]--+--> inbound channel --> pump
//!        [per-address senders]+    (loopback + unicast replies)
//!
//! send:  pump --> outbound channel --> fan-out over senders map
//! ```
//!
//! Shutdown closes every socket; receive loops exit on the socket error.
//! There is no separate cancellation token.

pub mod netwatch;

use crate::config::{EngineConfig, GROUP_ENDPOINT_V4, GROUP_ENDPOINT_V6, GROUP_V4, GROUP_V6,
    MDNS_PORT, RECV_BUFFER_LEN};
use arc_swap::ArcSwap;
use netwatch::IfaceAddr;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::{HashMap, HashSet};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// mDNS datagrams stay on-link but cross bridges; RFC 6762 uses TTL 255.
const MULTICAST_TTL: u32 = 255;

/// A datagram delivered to the pump.
#[derive(Debug)]
pub struct Inbound {
    pub data: Vec<u8>,
    pub remote: SocketAddr,
    /// Address of the local socket that observed the datagram. For the
    /// wildcard receivers this is the family wildcard; for per-address
    /// senders it names the interface address.
    pub local: IpAddr,
}

/// A datagram queued by the pump.
#[derive(Debug)]
pub struct Outbound {
    pub data: Vec<u8>,
    /// None = multicast fan-out; Some = unicast to this endpoint.
    pub unicast: Option<SocketAddr>,
    /// Preferred egress interface address for unicast replies (the one
    /// the original query was observed on).
    pub via: Option<IpAddr>,
}

/// One sender socket bound to a local interface address. Dropping it
/// aborts its receive task, which closes the socket.
struct SenderSocket {
    socket: Arc<UdpSocket>,
    addr: IpAddr,
    recv_task: JoinHandle<()>,
}

impl Drop for SenderSocket {
    fn drop(&mut self) {
        self.recv_task.abort();
    }
}

/// The multicast transport. Owns every socket; dropping it closes them.
pub struct MulticastTransport {
    receiver_v4: Option<Arc<UdpSocket>>,
    receiver_v6: Option<Arc<UdpSocket>>,
    /// Address-keyed senders, swapped whole on interface change so the
    /// send path iterates a stable snapshot without locking.
    senders: ArcSwap<HashMap<IpAddr, Arc<SenderSocket>>>,
    /// Interfaces the receivers already joined the group on.
    joined_v4: Mutex<HashSet<Ipv4Addr>>,
    joined_v6: Mutex<HashSet<u32>>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MulticastTransport {
    /// Bind the per-family receivers and start their receive loops.
    ///
    /// Senders are created later, when [`apply_interfaces`] delivers the
    /// usable address set. Must run on the tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails when a receiver cannot bind port 5353 for an enabled family.
    ///
    /// [`apply_interfaces`]: MulticastTransport::apply_interfaces
    pub fn new(
        config: &EngineConfig,
        inbound_tx: mpsc::UnboundedSender<Inbound>,
    ) -> io::Result<Self> {
        let receiver_v4 = if config.use_ipv4 {
            Some(Arc::new(bind_receiver(Domain::IPV4)?))
        } else {
            None
        };
        let receiver_v6 = if config.use_ipv6 {
            Some(Arc::new(bind_receiver(Domain::IPV6)?))
        } else {
            None
        };

        let transport = Self {
            receiver_v4,
            receiver_v6,
            senders: ArcSwap::from_pointee(HashMap::new()),
            joined_v4: Mutex::new(HashSet::new()),
            joined_v6: Mutex::new(HashSet::new()),
            inbound_tx,
            tasks: Mutex::new(Vec::new()),
        };

        if let Some(receiver) = &transport.receiver_v4 {
            let task = spawn_recv_loop(
                Arc::clone(receiver),
                IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                transport.inbound_tx.clone(),
            );
            transport.tasks.lock().push(task);
            log::debug!("[udp] v4 receiver bound to 0.0.0.0:{}", MDNS_PORT);
        }
        if let Some(receiver) = &transport.receiver_v6 {
            let task = spawn_recv_loop(
                Arc::clone(receiver),
                IpAddr::V6(Ipv6Addr::UNSPECIFIED),
                transport.inbound_tx.clone(),
            );
            transport.tasks.lock().push(task);
            log::debug!("[udp] v6 receiver bound to [::]:{}", MDNS_PORT);
        }

        Ok(transport)
    }

    /// Reconcile sockets with a new usable address set: open senders and
    /// group joins for arrivals, close senders for departures.
    ///
    /// Only the interface-change task calls this; concurrent sends keep
    /// using the previous snapshot until the swap.
    pub fn apply_interfaces(&self, ifaces: &[IfaceAddr]) {
        let current = self.senders.load_full();
        let mut next: HashMap<IpAddr, Arc<SenderSocket>> = HashMap::new();
        let wanted: HashSet<IpAddr> = ifaces
            .iter()
            .filter(|i| self.family_enabled(i.addr))
            .map(|i| i.addr)
            .collect();

        for (addr, sender) in current.iter() {
            if wanted.contains(addr) {
                next.insert(*addr, Arc::clone(sender));
            } else {
                log::debug!("[udp] closing sender for departed address {}", addr);
            }
        }

        for iface in ifaces {
            if !self.family_enabled(iface.addr) || next.contains_key(&iface.addr) {
                continue;
            }
            self.join_receiver_group(iface);
            match self.create_sender(iface) {
                Ok(sender) => {
                    log::debug!(
                        "[udp] sender bound on {} ({} idx {})",
                        iface.addr,
                        iface.name,
                        iface.index
                    );
                    next.insert(iface.addr, Arc::new(sender));
                }
                Err(err) => {
                    log::warn!("[udp] sender setup failed on {}: {}", iface.addr, err);
                }
            }
        }

        self.senders.store(Arc::new(next));
    }

    fn family_enabled(&self, addr: IpAddr) -> bool {
        match addr {
            IpAddr::V4(_) => self.receiver_v4.is_some(),
            IpAddr::V6(_) => self.receiver_v6.is_some(),
        }
    }

    /// Join the group on the family receiver from this interface so
    /// traffic arriving via any NIC reaches the wildcard socket.
    fn join_receiver_group(&self, iface: &IfaceAddr) {
        match iface.addr {
            IpAddr::V4(v4) => {
                if !self.joined_v4.lock().insert(v4) {
                    return;
                }
                if let Some(receiver) = &self.receiver_v4 {
                    match receiver.join_multicast_v4(GROUP_V4, v4) {
                        Ok(()) => log::debug!("[udp] receiver joined {} on {}", GROUP_V4, v4),
                        // EADDRINUSE: already joined via another address on
                        // the same physical NIC.
                        Err(err) if err.raw_os_error() == Some(98) => {}
                        Err(err) => {
                            log::warn!("[udp] receiver join on {} failed: {}", v4, err);
                        }
                    }
                }
            }
            IpAddr::V6(_) => {
                if !self.joined_v6.lock().insert(iface.index) {
                    return;
                }
                if let Some(receiver) = &self.receiver_v6 {
                    match receiver.join_multicast_v6(&GROUP_V6, iface.index) {
                        Ok(()) => {
                            log::debug!("[udp] receiver joined {} on idx {}", GROUP_V6, iface.index);
                        }
                        Err(err) if err.raw_os_error() == Some(98) => {}
                        Err(err) => {
                            log::warn!(
                                "[udp] receiver join on idx {} failed: {}",
                                iface.index,
                                err
                            );
                        }
                    }
                }
            }
        }
    }

    fn create_sender(&self, iface: &IfaceAddr) -> io::Result<SenderSocket> {
        let socket = match iface.addr {
            IpAddr::V4(v4) => {
                let raw = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
                raw.set_reuse_address(true)?;
                raw.bind(&SocketAddr::V4(SocketAddrV4::new(v4, 0)).into())?;
                raw.join_multicast_v4(&GROUP_V4, &v4)?;
                raw.set_multicast_if_v4(&v4)?;
                raw.set_multicast_loop_v4(true)?;
                raw.set_multicast_ttl_v4(MULTICAST_TTL)?;
                raw.set_nonblocking(true)?;
                UdpSocket::from_std(raw.into())?
            }
            IpAddr::V6(v6) => {
                let raw = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
                raw.set_reuse_address(true)?;
                raw.set_only_v6(true)?;
                raw.bind(&SocketAddr::V6(SocketAddrV6::new(v6, 0, 0, iface.index)).into())?;
                raw.join_multicast_v6(&GROUP_V6, iface.index)?;
                raw.set_multicast_if_v6(iface.index)?;
                raw.set_multicast_loop_v6(true)?;
                raw.set_multicast_hops_v6(MULTICAST_TTL)?;
                raw.set_nonblocking(true)?;
                UdpSocket::from_std(raw.into())?
            }
        };
        let socket = Arc::new(socket);
        let recv_task = spawn_recv_loop(
            Arc::clone(&socket),
            iface.addr,
            self.inbound_tx.clone(),
        );
        Ok(SenderSocket {
            socket,
            addr: iface.addr,
            recv_task,
        })
    }

    /// Consume the outbound channel, fanning each datagram out.
    pub fn spawn_send_task(
        self: &Arc<Self>,
        mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    ) -> JoinHandle<()> {
        let transport = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(out) = outbound_rx.recv().await {
                match out.unicast {
                    Some(to) => transport.send_unicast(&out.data, to, out.via).await,
                    None => transport.send_multicast(&out.data).await,
                }
            }
            log::debug!("[udp] outbound channel closed, send task exiting");
        })
    }

    /// Transmit to the group on every sender. Per-sender failures are
    /// logged and swallowed; one NIC must not stop the others.
    pub async fn send_multicast(&self, data: &[u8]) {
        let senders = self.senders.load();
        if senders.is_empty() {
            log::debug!("[udp] multicast send with no senders (interface change in progress?)");
            return;
        }
        for sender in senders.values() {
            let dest = match sender.addr {
                IpAddr::V4(_) => GROUP_ENDPOINT_V4,
                IpAddr::V6(_) => GROUP_ENDPOINT_V6,
            };
            if let Err(err) = sender.socket.send_to(data, dest).await {
                log::warn!("[udp] multicast send on {} failed: {}", sender.addr, err);
            }
        }
    }

    /// Transmit unicast, preferring the sender bound to `via` (the
    /// interface the correlated query arrived on).
    pub async fn send_unicast(&self, data: &[u8], to: SocketAddr, via: Option<IpAddr>) {
        let senders = self.senders.load();
        let sender = via
            .and_then(|addr| senders.get(&addr))
            .or_else(|| {
                senders
                    .values()
                    .find(|s| s.addr.is_ipv4() == to.is_ipv4())
            });
        let Some(sender) = sender else {
            log::warn!("[udp] no sender for unicast reply to {}", to);
            return;
        };
        if let Err(err) = sender.socket.send_to(data, to).await {
            log::warn!("[udp] unicast send to {} failed: {}", to, err);
        }
    }

    /// Current sender addresses (snapshot), mostly for diagnostics.
    #[must_use]
    pub fn sender_addrs(&self) -> Vec<IpAddr> {
        self.senders.load().keys().copied().collect()
    }

    /// Close every socket. Receive loops observe the closed sockets and
    /// exit; queued sends are dropped.
    pub fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.senders.store(Arc::new(HashMap::new()));
        log::debug!("[udp] transport shut down");
    }
}

impl Drop for MulticastTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Build a wildcard receiver for one family with address reuse, so other
/// mDNS responders on the host keep working.
fn bind_receiver(domain: Domain) -> io::Result<UdpSocket> {
    let raw = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    raw.set_reuse_address(true)?;
    #[cfg(unix)]
    raw.set_reuse_port(true)?;
    let wildcard: SocketAddr = if domain == Domain::IPV6 {
        raw.set_only_v6(true)?;
        SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, MDNS_PORT, 0, 0))
    } else {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, MDNS_PORT))
    };
    raw.bind(&wildcard.into())?;
    raw.set_nonblocking(true)?;
    UdpSocket::from_std(raw.into())
}

/// One long-running receive loop per socket. Exits when the socket
/// errors (closed on shutdown) or the pump side of the channel is gone.
fn spawn_recv_loop(
    socket: Arc<UdpSocket>,
    local: IpAddr,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; RECV_BUFFER_LEN];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, remote)) => {
                    let delivered = inbound_tx.send(Inbound {
                        data: buf[..len].to_vec(),
                        remote,
                        local,
                    });
                    if delivered.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    log::debug!("[udp] receive loop on {} exiting: {}", local, err);
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn v4_only() -> EngineConfig {
        EngineConfig {
            use_ipv6: false,
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_transport_binds_v4_receiver() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let transport = MulticastTransport::new(&v4_only(), tx);
        assert!(transport.is_ok(), "v4 receiver should bind with reuse");
    }

    #[tokio::test]
    async fn test_two_transports_coexist_on_5353() {
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, _rx_b) = mpsc::unbounded_channel();
        let a = MulticastTransport::new(&v4_only(), tx_a);
        let b = MulticastTransport::new(&v4_only(), tx_b);
        assert!(a.is_ok());
        assert!(b.is_ok(), "SO_REUSEADDR/SO_REUSEPORT must allow a second bind");
    }

    #[tokio::test]
    async fn test_multicast_send_with_no_senders_is_silent() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let transport = MulticastTransport::new(&v4_only(), tx).expect("bind");
        // No interfaces applied yet: must neither panic nor error out.
        transport.send_multicast(b"probe").await;
    }

    #[tokio::test]
    async fn test_apply_interfaces_adds_and_removes_senders() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let transport = MulticastTransport::new(&v4_only(), tx).expect("bind");
        let usable: Vec<IfaceAddr> = netwatch::list_usable()
            .into_iter()
            .filter(|i| i.addr.is_ipv4())
            .collect();
        if usable.is_empty() {
            // No multicast-capable interface in this environment.
            return;
        }
        transport.apply_interfaces(&usable);
        // Some environments refuse multicast joins on a subset of
        // interfaces; those senders are skipped, never fatal.
        assert!(transport.sender_addrs().len() <= usable.len());

        transport.apply_interfaces(&[]);
        assert!(transport.sender_addrs().is_empty());
    }

    #[tokio::test]
    async fn test_ipv6_disabled_filters_v6_addresses() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let transport = MulticastTransport::new(&v4_only(), tx).expect("bind");
        let v6_iface = IfaceAddr {
            name: "test0".into(),
            index: 1,
            addr: "fe80::1".parse().unwrap(),
        };
        transport.apply_interfaces(std::slice::from_ref(&v6_iface));
        assert!(transport.sender_addrs().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_stops_receive_tasks() {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = MulticastTransport::new(&v4_only(), tx).expect("bind");
        transport.shutdown();
        drop(transport);
        // Channel sender side dropped with the transport; receiver drains.
        let mut rx = rx;
        assert!(rx.recv().await.is_none());
    }
}
