//! Message origination on the seed node
//!
//! After a warm-up delay the seed emits one synthetic sensor reading per
//! cycle, unless the loss simulator drops the cycle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, error, info, instrument};

use floodmesh_core::{DatagramTransport, Message, MessageId, SensorPayload};

use crate::fanout::{Delivery, FanOut, deliver};
use crate::loss::LossSimulator;
use crate::state::{NodeState, NodeStats};

/// Origination cycle parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OriginatorConfig {
    /// TTL of each new message
    pub initial_ttl: i32,
    /// Pause between cycles
    pub interval: Duration,
    /// Delay before the first cycle, so neighbors are listening
    pub warmup: Duration,
    pub fanout: FanOut,
}

impl Default for OriginatorConfig {
    fn default() -> Self {
        Self {
            initial_ttl: 10,
            interval: Duration::from_secs(10),
            warmup: Duration::from_secs(3),
            fanout: FanOut::All,
        }
    }
}

/// Outcome of one origination cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cycle {
    /// The loss simulator skipped this cycle; no message was created
    Dropped,
    /// A new message was sent
    Sent { id: MessageId, delivery: Delivery },
}

/// Periodic message source
pub struct MessageOriginator {
    state: Arc<NodeState>,
    transport: Arc<dyn DatagramTransport>,
    loss: LossSimulator,
    config: OriginatorConfig,
}

impl MessageOriginator {
    pub fn new(
        state: Arc<NodeState>,
        transport: Arc<dyn DatagramTransport>,
        loss: LossSimulator,
        config: OriginatorConfig,
    ) -> Self {
        Self {
            state,
            transport,
            loss,
            config,
        }
    }

    /// Warm up, then originate every interval, forever
    #[instrument(name = "originator", skip_all)]
    pub async fn run(self) {
        info!(
            warmup_ms = self.config.warmup.as_millis() as u64,
            interval_ms = self.config.interval.as_millis() as u64,
            ttl = self.config.initial_ttl,
            "Originator starting"
        );
        tokio::time::sleep(self.config.warmup).await;

        loop {
            self.originate_once().await;
            tokio::time::sleep(self.config.interval).await;
        }
    }

    /// Run a single origination cycle
    pub async fn originate_once(&self) -> Cycle {
        let stats = &self.state.stats;
        self.state.peers.refresh_if_due(Instant::now()).await;

        if self.loss.should_drop() {
            debug!("Simulated source loss, skipping cycle");
            NodeStats::incr(&stats.loss_drops);
            return Cycle::Dropped;
        }

        let message = Message::originate(
            &self.state.node_id,
            sample_reading(),
            self.config.initial_ttl,
        );
        // Copies flooding back to us are duplicates
        self.state.dedup.test_and_insert(&message.id);
        NodeStats::incr(&stats.originated);

        let data = match message.encode() {
            Ok(data) => data,
            Err(e) => {
                error!(msg_id = %message.id, error = %e, "Failed to encode message");
                return Cycle::Sent {
                    id: message.id,
                    delivery: Delivery::default(),
                };
            }
        };

        let candidates = self.state.peers.snapshot().endpoints().cloned().collect();
        let targets = self.config.fanout.select(candidates);
        let delivery = deliver(self.transport.as_ref(), &data, &targets).await;
        NodeStats::add(&stats.send_failures, delivery.failed);

        info!(
            msg_id = %message.id,
            ttl = message.ttl,
            sent = delivery.sent,
            failed = delivery.failed,
            "Originated message"
        );
        Cycle::Sent {
            id: message.id,
            delivery,
        }
    }
}

/// A synthetic temperature/humidity reading, rounded to two decimals
pub fn sample_reading() -> SensorPayload {
    let mut rng = rand::rng();
    let round2 = |v: f64| (v * 100.0).round() / 100.0;

    SensorPayload::new()
        .with("temperature", round2(rng.random_range(20.0..=30.0)))
        .with("humidity", round2(rng.random_range(40.0..=60.0)))
}
