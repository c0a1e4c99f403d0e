/// Per-notification processing: decode, throttle, persist
use log::{error, info, warn};
use tokio::sync::{mpsc, watch};

use crate::bluetooth::decoder::decode;
use crate::database::RecordSink;
use crate::models::{Notification, PersistedRecord};
use crate::pipeline::throttle::ThrottleGate;
use crate::utils::format_datetime;

/// What happened to a single notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Malformed,
    Throttled,
    Forwarded,
    WriteFailed,
}

/// Counters for one session, logged when it ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub received: u64,
    pub malformed: u64,
    pub throttled: u64,
    pub forwarded: u64,
    pub write_failures: u64,
    /// Still queued when the session was cancelled
    pub discarded: u64,
}

/// Owns the throttle state for one session.
///
/// `handle` takes `&mut self`, so the gate decision, the store write and the
/// record step for one notification never interleave with another.
pub struct NotificationPipeline<'a, S> {
    sink: &'a S,
    gate: ThrottleGate,
    stats: PipelineStats,
}

impl<'a, S: RecordSink> NotificationPipeline<'a, S> {
    pub fn new(sink: &'a S, gate: ThrottleGate) -> Self {
        NotificationPipeline {
            sink,
            gate,
            stats: PipelineStats::default(),
        }
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn gate(&self) -> &ThrottleGate {
        &self.gate
    }

    /// Drain the queue in delivery order until every sender is gone.
    ///
    /// Once `cancelled` is set the write in progress finishes and whatever is
    /// still queued is discarded unprocessed.
    pub async fn run(
        &mut self,
        mut queue: mpsc::Receiver<Notification>,
        cancelled: watch::Receiver<bool>,
    ) {
        while let Some(notification) = queue.recv().await {
            if *cancelled.borrow() {
                self.stats.discarded += 1;
                continue;
            }
            self.handle(notification).await;
        }
        if self.stats.discarded > 0 {
            warn!(
                "Discarded {} queued notifications on shutdown",
                self.stats.discarded
            );
        }
    }

    /// Process one notification.
    ///
    /// The throttle clock only advances after a successful write, so a store
    /// outage keeps the gate open and the next reading is tried again.
    pub async fn handle(&mut self, notification: Notification) -> Disposition {
        self.stats.received += 1;

        let reading = match decode(&notification.payload, notification.received_at) {
            Ok(reading) => reading,
            Err(e) => {
                warn!("Dropping notification {:02x?}: {}", notification.payload, e);
                self.stats.malformed += 1;
                return Disposition::Malformed;
            }
        };

        info!(
            "Temperature / Rel. Humidity: {:.2} °C / {:.2} %",
            reading.temperature_celsius, reading.relative_humidity_percent
        );

        if !self.gate.should_forward(reading.observed_at) {
            self.stats.throttled += 1;
            return Disposition::Throttled;
        }

        let record = PersistedRecord::from(&reading);
        match self.sink.store(&record).await {
            Ok(()) => {
                self.gate.record(reading.observed_at);
                self.stats.forwarded += 1;
                info!(
                    "Pushed reading to database: time={}, temp={}, rh={}",
                    format_datetime(&record.time),
                    record.temp,
                    record.rh
                );
                Disposition::Forwarded
            }
            Err(e) => {
                error!(
                    "Failed to store reading from {}: {}",
                    format_datetime(&record.time),
                    e
                );
                self.stats.write_failures += 1;
                Disposition::WriteFailed
            }
        }
    }
}
