//! Input sampling and debounce
//!
//! Samples every INPUT-class pin on a fixed interval and forwards only
//! debounced edge transitions to the router: a raw reading that differs
//! from the stable value must hold for the full debounce window before it
//! counts. Unchanged readings emit nothing, so retained state traffic only
//! happens on real transitions. OUTPUT-class zones are never sampled; a
//! zone reclassified to an output simply drops out of the next sample set.

use crate::domain::RouterEvent;
use crate::services::registry::ZoneRegistry;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

struct Debounce {
    stable: bool,
    pending: Option<(bool, Instant)>,
}

pub struct PollLoop {
    registry: Arc<Mutex<ZoneRegistry>>,
    event_tx: mpsc::Sender<RouterEvent>,
    interval: Duration,
    debounce: Duration,
}

impl PollLoop {
    pub fn new(
        registry: Arc<Mutex<ZoneRegistry>>,
        event_tx: mpsc::Sender<RouterEvent>,
        interval: Duration,
        debounce: Duration,
    ) -> Self {
        Self { registry, event_tx, interval, debounce }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            debounce_ms = self.debounce.as_millis() as u64,
            "poll_loop_started"
        );

        let mut tick = tokio::time::interval(self.interval);
        let mut states: FxHashMap<String, Debounce> = FxHashMap::default();

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("poll_loop_shutdown");
                        return;
                    }
                }
                _ = tick.tick() => {
                    let samples = self.registry.lock().sample_inputs();
                    self.apply_samples(&samples, &mut states);
                }
            }
        }
    }

    /// Run one debounce pass over a sample set, emitting edges
    fn apply_samples(&self, samples: &[(String, bool)], states: &mut FxHashMap<String, Debounce>) {
        for (key, raw) in samples {
            let state = states
                .entry(key.clone())
                // First sighting seeds the stable value without an edge
                .or_insert_with(|| Debounce { stable: *raw, pending: None });

            if *raw == state.stable {
                state.pending = None;
                continue;
            }

            match state.pending {
                Some((level, since)) if level == *raw => {
                    if since.elapsed() >= self.debounce {
                        state.stable = *raw;
                        state.pending = None;
                        debug!(zone = %key, open = raw, "input_edge_debounced");
                        if self
                            .event_tx
                            .try_send(RouterEvent::InputEdge { zone: key.clone(), open: *raw })
                            .is_err()
                        {
                            warn!(zone = %key, "input_edge_dropped: channel full or closed");
                        }
                    }
                }
                _ => {
                    state.pending = Some((*raw, Instant::now()));
                }
            }
        }

        // Zones reclassified to outputs leave the sample set; dropping
        // their state means a later reclassification back reseeds cleanly.
        let sampled: FxHashSet<&str> = samples.iter().map(|(k, _)| k.as_str()).collect();
        states.retain(|key, _| sampled.contains(key.as_str()));
    }
}
