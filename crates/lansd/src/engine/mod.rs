// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message pump: the wire encode/decode boundary.
//!
//! Inbound datagrams are decoded, classified (QR=0 query / QR=1 answer),
//! and delivered to registered handlers. Outbound messages are
//! duplicate-suppressed, encoded under the MTU cap, and queued to the
//! transport.
//!
//! ```text
//! inbound channel -> decode -> classify -> handlers (panic-isolated)
//! send_*()        -> recent-send check -> encode_bounded -> outbound channel
//! ```
//!
//! QU normalization happens below this layer, in the codec: by the time a
//! handler sees a [`Question`] the class is clean and the QU request is a
//! boolean.

pub mod recent;

use crate::protocol::{decode, encode_bounded, Message, Question, RecordType};
use crate::transport::netwatch::IfaceAddr;
use crate::transport::{Inbound, Outbound};
use parking_lot::{Mutex, RwLock};
use recent::{RecentSends, SendKey};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Handler for pump events. Implementations must tolerate being invoked
/// from any worker; delivery order is per-socket arrival order.
pub trait PumpHandler: Send + Sync {
    /// A query (QR=0) arrived.
    fn on_query(&self, _message: &Message, _remote: SocketAddr, _local: IpAddr) {}
    /// A response (QR=1) arrived.
    fn on_answer(&self, _message: &Message, _remote: SocketAddr, _local: IpAddr) {}
    /// The usable interface set changed.
    fn on_interfaces_changed(&self, _addrs: &[IfaceAddr]) {}
}

/// Pump counters for diagnostics.
#[derive(Debug, Default)]
pub struct PumpMetrics {
    pub datagrams_received: AtomicU64,
    pub decode_failures: AtomicU64,
    pub sends_suppressed: AtomicU64,
    pub handler_panics: AtomicU64,
}

/// The message pump.
pub struct MessagePump {
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    handlers: RwLock<Vec<Arc<dyn PumpHandler>>>,
    recent: Mutex<RecentSends>,
    mtu: usize,
    pub metrics: PumpMetrics,
}

impl MessagePump {
    #[must_use]
    pub fn new(outbound_tx: mpsc::UnboundedSender<Outbound>, mtu: usize) -> Arc<Self> {
        Arc::new(Self {
            outbound_tx,
            handlers: RwLock::new(Vec::new()),
            recent: Mutex::new(RecentSends::new()),
            mtu,
            metrics: PumpMetrics::default(),
        })
    }

    pub fn register_handler(&self, handler: Arc<dyn PumpHandler>) {
        self.handlers.write().push(handler);
    }

    /// Begin consuming inbound datagrams. One task; per-socket arrival
    /// order is preserved by the channel.
    pub fn start(
        self: &Arc<Self>,
        mut inbound_rx: mpsc::UnboundedReceiver<Inbound>,
    ) -> JoinHandle<()> {
        let pump = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(inbound) = inbound_rx.recv().await {
                pump.dispatch(inbound);
            }
            log::debug!("[pump] inbound channel closed, pump exiting");
        })
    }

    /// Send a QM (multicast-response) query for `name`.
    pub fn send_query(&self, name: crate::protocol::DomainName, qtype: RecordType) -> bool {
        let message = Message::query().with_question(Question::new(name, qtype));
        self.send_message(message, false)
    }

    /// Send a query with the QU bit set on every question.
    pub fn send_unicast_query(
        &self,
        name: crate::protocol::DomainName,
        qtype: RecordType,
    ) -> bool {
        let message = Message::query().with_question(Question::new(name, qtype).unicast());
        self.send_message(message, false)
    }

    /// Queue an arbitrary outbound message to the multicast group.
    /// `force` bypasses duplicate suppression (probe and goodbye need
    /// exact retransmission timing).
    pub fn send_message(&self, message: Message, force: bool) -> bool {
        self.transmit(message, None, force)
    }

    /// Queue a response. Sets QR; multicast responses (no endpoint) have
    /// their question section cleared, unicast replies keep whatever the
    /// caller built (legacy queriers expect their question echoed).
    pub fn send_answer(
        &self,
        mut message: Message,
        to: Option<(SocketAddr, IpAddr)>,
        force: bool,
    ) -> bool {
        message.flags.qr = true;
        if to.is_none() {
            message.questions.clear();
        }
        self.transmit(message, to, force)
    }

    fn transmit(&self, message: Message, to: Option<(SocketAddr, IpAddr)>, force: bool) -> bool {
        if !force {
            if let Some(key) = fingerprint(&message) {
                if !self.recent.lock().should_send(key, Instant::now()) {
                    self.metrics.sends_suppressed.fetch_add(1, Ordering::Relaxed);
                    log::debug!("[pump] suppressed duplicate send (within 1s window)");
                    return false;
                }
            }
        }

        let data = encode_bounded(&message, self.mtu);
        let (unicast, via) = match to {
            Some((endpoint, local)) => (Some(endpoint), Some(local)),
            None => (None, None),
        };
        if self.outbound_tx.send(Outbound { data, unicast, via }).is_err() {
            log::debug!("[pump] outbound channel closed, send dropped");
            return false;
        }
        true
    }

    /// Fan an interface-change notification out to handlers.
    pub fn notify_interfaces(&self, addrs: &[IfaceAddr]) {
        let handlers = self.handlers.read().clone();
        for handler in &handlers {
            self.deliver(|| handler.on_interfaces_changed(addrs));
        }
    }

    fn dispatch(&self, inbound: Inbound) {
        self.metrics.datagrams_received.fetch_add(1, Ordering::Relaxed);
        let message = match decode(&inbound.data) {
            Ok(message) => message,
            Err(err) => {
                self.metrics.decode_failures.fetch_add(1, Ordering::Relaxed);
                log::debug!(
                    "[pump] dropping malformed datagram from {}: {}",
                    inbound.remote,
                    err
                );
                return;
            }
        };

        if !message.flags.qr && message.flags.opcode != 0 {
            log::debug!(
                "[pump] ignoring opcode {} query from {}",
                message.flags.opcode,
                inbound.remote
            );
            return;
        }

        let handlers = self.handlers.read().clone();
        for handler in &handlers {
            if message.flags.qr {
                self.deliver(|| handler.on_answer(&message, inbound.remote, inbound.local));
            } else {
                self.deliver(|| handler.on_query(&message, inbound.remote, inbound.local));
            }
        }
    }

    /// Invoke one handler with panic isolation so a bad subscriber cannot
    /// poison the pump.
    fn deliver<F: FnOnce()>(&self, f: F) {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));
        if result.is_err() {
            self.metrics.handler_panics.fetch_add(1, Ordering::Relaxed);
            log::debug!("[pump] handler panicked during delivery");
        }
    }
}

/// Message fingerprint for the recent-send table: the first question for
/// queries, the first answer for responses.
fn fingerprint(message: &Message) -> Option<SendKey> {
    if message.flags.qr {
        message.answers.first().map(|record| SendKey {
            name: record.name.key(),
            rtype: record.record_type().code(),
            class: crate::protocol::CLASS_IN,
            qr: true,
        })
    } else {
        message.questions.first().map(|question| SendKey {
            name: question.name.key(),
            rtype: question.qtype.code(),
            class: question.class,
            qr: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{DomainName, RData, ResourceRecord};
    use std::net::Ipv4Addr;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn name(s: &str) -> DomainName {
        s.parse().expect("valid test name")
    }

    fn test_pump() -> (Arc<MessagePump>, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (MessagePump::new(tx, 1500), rx)
    }

    struct CountingHandler {
        queries: AtomicUsize,
        answers: AtomicUsize,
    }

    impl CountingHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                queries: AtomicUsize::new(0),
                answers: AtomicUsize::new(0),
            })
        }
    }

    impl PumpHandler for CountingHandler {
        fn on_query(&self, _m: &Message, _r: SocketAddr, _l: IpAddr) {
            self.queries.fetch_add(1, Ordering::SeqCst);
        }
        fn on_answer(&self, _m: &Message, _r: SocketAddr, _l: IpAddr) {
            self.answers.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn inbound(message: &Message) -> Inbound {
        Inbound {
            data: crate::protocol::encode(message),
            remote: "198.51.100.7:5353".parse().unwrap(),
            local: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }

    #[test]
    fn test_classification_query_vs_answer() {
        let (pump, _rx) = test_pump();
        let handler = CountingHandler::new();
        pump.register_handler(handler.clone());

        let query = Message::query()
            .with_question(Question::new(name("x.local"), RecordType::Any));
        pump.dispatch(inbound(&query));

        let mut answer = Message::response();
        answer.answers.push(ResourceRecord::new(
            name("x.local"),
            Duration::from_secs(120),
            RData::A(Ipv4Addr::new(192, 0, 2, 5)),
        ));
        pump.dispatch(inbound(&answer));

        assert_eq!(handler.queries.load(Ordering::SeqCst), 1);
        assert_eq!(handler.answers.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_malformed_datagram_dropped_silently() {
        let (pump, _rx) = test_pump();
        let handler = CountingHandler::new();
        pump.register_handler(handler.clone());
        pump.dispatch(Inbound {
            data: vec![0xFF, 0x01, 0x02],
            remote: "198.51.100.7:5353".parse().unwrap(),
            local: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        });
        assert_eq!(handler.queries.load(Ordering::SeqCst), 0);
        assert_eq!(pump.metrics.decode_failures.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_non_zero_opcode_query_ignored() {
        let (pump, _rx) = test_pump();
        let handler = CountingHandler::new();
        pump.register_handler(handler.clone());
        let mut query = Message::query()
            .with_question(Question::new(name("x.local"), RecordType::Any));
        query.flags.opcode = 4;
        pump.dispatch(inbound(&query));
        assert_eq!(handler.queries.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_duplicate_query_suppressed() {
        let (pump, mut rx) = test_pump();
        assert!(pump.send_query(name("x.local"), RecordType::Ptr));
        assert!(!pump.send_query(name("x.local"), RecordType::Ptr));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
        assert_eq!(pump.metrics.sends_suppressed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_force_bypasses_suppression() {
        let (pump, mut rx) = test_pump();
        let message = Message::query()
            .with_question(Question::new(name("x.local"), RecordType::Any));
        assert!(pump.send_message(message.clone(), true));
        assert!(pump.send_message(message, true));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_unicast_query_sets_qu_bit() {
        let (pump, mut rx) = test_pump();
        assert!(pump.send_unicast_query(name("x.local"), RecordType::Ptr));
        let out = rx.try_recv().expect("queued");
        let decoded = decode(&out.data).expect("decode");
        assert!(decoded.questions[0].unicast_response);
    }

    #[test]
    fn test_send_answer_multicast_clears_questions() {
        let (pump, mut rx) = test_pump();
        let mut response = Message::response()
            .with_question(Question::new(name("x.local"), RecordType::A));
        response.answers.push(ResourceRecord::new(
            name("x.local"),
            Duration::from_secs(120),
            RData::A(Ipv4Addr::new(192, 0, 2, 5)),
        ));
        pump.send_answer(response, None, false);
        let out = rx.try_recv().expect("queued");
        assert!(out.unicast.is_none());
        let decoded = decode(&out.data).expect("decode");
        assert!(decoded.flags.qr);
        assert!(decoded.questions.is_empty());
    }

    #[test]
    fn test_send_answer_unicast_keeps_destination() {
        let (pump, mut rx) = test_pump();
        let mut response = Message::response();
        response.answers.push(ResourceRecord::new(
            name("x.local"),
            Duration::from_secs(120),
            RData::A(Ipv4Addr::new(192, 0, 2, 5)),
        ));
        let endpoint: SocketAddr = "198.51.100.7:54321".parse().unwrap();
        let local = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
        pump.send_answer(response, Some((endpoint, local)), false);
        let out = rx.try_recv().expect("queued");
        assert_eq!(out.unicast, Some(endpoint));
        assert_eq!(out.via, Some(local));
    }

    #[test]
    fn test_handler_panic_isolated() {
        struct PanickingHandler;
        impl PumpHandler for PanickingHandler {
            fn on_query(&self, _m: &Message, _r: SocketAddr, _l: IpAddr) {
                panic!("bad subscriber");
            }
        }

        let (pump, _rx) = test_pump();
        pump.register_handler(Arc::new(PanickingHandler));
        let counting = CountingHandler::new();
        pump.register_handler(counting.clone());

        let query = Message::query()
            .with_question(Question::new(name("x.local"), RecordType::Any));
        pump.dispatch(inbound(&query));

        // The panic was contained and the next handler still ran.
        assert_eq!(pump.metrics.handler_panics.load(Ordering::Relaxed), 1);
        assert_eq!(counting.queries.load(Ordering::SeqCst), 1);
    }
}
