//! Momentary-output pulse timing
//!
//! Each `output_tap` ON command arms one auto-off deadline for that zone.
//! Arming bumps a per-zone generation counter and spawns a sleep task that
//! reports back through the router channel; because only the latest
//! generation is live, re-arming replaces the pending deadline instead of
//! stacking timers, and cancellation is a counter bump with no task
//! bookkeeping. The router decides what an expiry means (the zone may have
//! been reclassified since arming), so the timer itself never touches pins.

use crate::domain::RouterEvent;
use rustc_hash::FxHashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

pub struct PulseController {
    duration: Duration,
    generations: FxHashMap<String, u64>,
    event_tx: mpsc::Sender<RouterEvent>,
}

impl PulseController {
    pub fn new(duration: Duration, event_tx: mpsc::Sender<RouterEvent>) -> Self {
        Self { duration, generations: FxHashMap::default(), event_tx }
    }

    /// Arm (or re-arm) the auto-off deadline for a zone
    pub fn arm(&mut self, zone: &str) -> u64 {
        let generation = self.bump(zone);
        let tx = self.event_tx.clone();
        let zone = zone.to_string();
        let duration = self.duration;
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            // Router gone means shutdown; the pulse is moot
            let _ = tx.send(RouterEvent::PulseExpired { zone, generation }).await;
        });
        debug!(generation, "pulse_armed");
        generation
    }

    /// Invalidate any pending deadline for a zone
    pub fn cancel(&mut self, zone: &str) {
        self.bump(zone);
    }

    /// True if `generation` is still the latest armed deadline for the zone
    pub fn is_live(&self, zone: &str, generation: u64) -> bool {
        self.generations.get(zone) == Some(&generation)
    }

    fn bump(&mut self, zone: &str) -> u64 {
        let counter = self.generations.entry(zone.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_pulse_fires_after_duration() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut pulse = PulseController::new(Duration::from_millis(500), tx);

        let generation = pulse.arm("zone3");
        tokio::time::advance(Duration::from_millis(500)).await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event, RouterEvent::PulseExpired { zone: "zone3".to_string(), generation });
        assert!(pulse.is_live("zone3", generation));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_invalidates_previous_deadline() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut pulse = PulseController::new(Duration::from_millis(500), tx);

        let first = pulse.arm("zone3");
        tokio::time::advance(Duration::from_millis(300)).await;
        let second = pulse.arm("zone3");

        // First deadline fires but is stale; second is the live one
        tokio::time::advance(Duration::from_millis(200)).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event, RouterEvent::PulseExpired { zone: "zone3".to_string(), generation: first });
        assert!(!pulse.is_live("zone3", first));

        tokio::time::advance(Duration::from_millis(300)).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            RouterEvent::PulseExpired { zone: "zone3".to_string(), generation: second }
        );
        assert!(pulse.is_live("zone3", second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_kills_pending_deadline() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut pulse = PulseController::new(Duration::from_millis(500), tx);

        let generation = pulse.arm("zone3");
        tokio::time::advance(Duration::from_millis(10)).await;
        pulse.cancel("zone3");

        tokio::time::advance(Duration::from_millis(490)).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event, RouterEvent::PulseExpired { zone: "zone3".to_string(), generation });
        assert!(!pulse.is_live("zone3", generation), "cancelled deadline must be stale");
    }

    #[tokio::test(start_paused = true)]
    async fn test_zones_are_independent() {
        let (tx, _rx) = mpsc::channel(8);
        let mut pulse = PulseController::new(Duration::from_millis(500), tx);

        let a = pulse.arm("zone3");
        let b = pulse.arm("zone4");
        pulse.cancel("zone3");

        assert!(!pulse.is_live("zone3", a));
        assert!(pulse.is_live("zone4", b));
    }
}
