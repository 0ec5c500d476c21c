//! Timer-driven refresh loop.
//!
//! Every refresh runs in its own task and reports back tagged with a
//! generation number, so a slow refresh can finish after a newer one. The
//! consumer runs results through a [`GenerationGate`] to drop those.
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::data::{GasAggregator, Snapshot};
use crate::rpc::{ClientFactory, PriceFeed};

#[derive(Debug)]
pub struct Refreshed {
    pub generation: u64,
    pub snapshot: Snapshot,
}

/// Admits only results newer than the last one admitted.
#[derive(Debug, Default)]
pub struct GenerationGate {
    applied: u64,
}

impl GenerationGate {
    pub fn accept(&mut self, generation: u64) -> bool {
        if generation <= self.applied {
            tracing::debug!(generation, applied = self.applied, "discarding superseded refresh");
            return false;
        }
        self.applied = generation;
        true
    }
}

/// Handle to the background refresh loop. Dropping it stops the loop and
/// aborts any refresh still in flight.
pub struct Poller {
    handle: JoinHandle<()>,
    selection: watch::Sender<Vec<u64>>,
    refresh_now: Arc<Notify>,
}

impl Poller {
    pub fn spawn<F, O>(
        aggregator: Arc<GasAggregator<F, O>>,
        selection: Vec<u64>,
        interval: Duration,
    ) -> (Self, mpsc::Receiver<Refreshed>)
    where
        F: ClientFactory + 'static,
        O: PriceFeed + 'static,
    {
        let (tx, rx) = mpsc::channel(16);
        let (selection_tx, selection_rx) = watch::channel(selection);
        let refresh_now = Arc::new(Notify::new());

        let handle = tokio::spawn(run(aggregator, selection_rx, Arc::clone(&refresh_now), interval, tx));

        let poller = Self {
            handle,
            selection: selection_tx,
            refresh_now,
        };
        (poller, rx)
    }

    /// Replaces the tracked chains and refreshes right away.
    pub fn set_selection(&self, ids: Vec<u64>) {
        self.selection.send_replace(ids);
    }

    pub fn refresh_now(&self) {
        self.refresh_now.notify_one();
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run<F, O>(
    aggregator: Arc<GasAggregator<F, O>>,
    mut selection: watch::Receiver<Vec<u64>>,
    refresh_now: Arc<Notify>,
    interval: Duration,
    tx: mpsc::Sender<Refreshed>,
) where
    F: ClientFactory + 'static,
    O: PriceFeed + 'static,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut in_flight = JoinSet::new();
    let mut generation = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = selection.changed() => {
                if changed.is_err() {
                    break;
                }
                ticker.reset();
            }
            _ = refresh_now.notified() => {
                ticker.reset();
            }
            Some(done) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = done {
                    tracing::error!(error = %e, "refresh task failed");
                }
                continue;
            }
        }

        generation += 1;
        let ids = selection.borrow_and_update().clone();
        let aggregator = Arc::clone(&aggregator);
        let tx = tx.clone();
        tracing::debug!(generation, chains = ids.len(), in_flight = in_flight.len(), "starting refresh");

        in_flight.spawn(async move {
            let snapshot = aggregator.refresh(&ids).await;
            // The receiver is gone once the dashboard shuts down.
            let _ = tx.send(Refreshed { generation, snapshot }).await;
        });
    }
}
