//! Command routing and state publication
//!
//! The router is the single writer: every inbound command, poll edge, and
//! pulse expiry funnels through one task, so a class change can never
//! interleave with a value update on the same zone and a discovery
//! retract/publish pair is never split by an intervening command.
//!
//! Validation happens at application time, not enqueue time: a command for
//! a zone reclassified a moment earlier is judged against the current
//! class and rejected or dropped accordingly. One bad command never
//! affects other zones and never terminates the loop.

use crate::domain::{RouterEvent, ZoneClass, ZoneError};
use crate::infra::persist::PersistenceStore;
use crate::services::discovery::DiscoverySynchronizer;
use crate::services::pulse::PulseController;
use crate::services::registry::{Zone, ZoneRegistry};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub struct CommandRouter {
    registry: Arc<Mutex<ZoneRegistry>>,
    discovery: DiscoverySynchronizer,
    pulse: PulseController,
    store: PersistenceStore,
    /// Transient UI selection; not persisted
    selected_zone: Option<String>,
}

impl CommandRouter {
    pub fn new(
        registry: Arc<Mutex<ZoneRegistry>>,
        discovery: DiscoverySynchronizer,
        pulse: PulseController,
        store: PersistenceStore,
    ) -> Self {
        Self { registry, discovery, pulse, store, selected_zone: None }
    }

    /// Consume events until shutdown or channel close
    pub async fn run(
        &mut self,
        mut event_rx: mpsc::Receiver<RouterEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("router_started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("router_shutdown");
                        return;
                    }
                }
                event = event_rx.recv() => {
                    match event {
                        Some(e) => self.handle_event(e),
                        None => return,
                    }
                }
            }
        }
    }

    pub fn handle_event(&mut self, event: RouterEvent) {
        match event {
            RouterEvent::SwitchCommand { zone, on } => self.handle_switch_command(&zone, on),
            RouterEvent::ZoneSelect(key) => self.handle_zone_select(&key),
            RouterEvent::ClassSelect(name) => self.handle_class_select(&name),
            RouterEvent::InputEdge { zone, open } => self.handle_input_edge(&zone, open),
            RouterEvent::PulseExpired { zone, generation } => {
                self.handle_pulse_expired(&zone, generation)
            }
        }
    }

    fn handle_switch_command(&mut self, zone_key: &str, on: bool) {
        let class = {
            let registry = self.registry.lock();
            match registry.get(zone_key) {
                Ok(zone) => zone.class,
                Err(e) => {
                    warn!(zone = %zone_key, error = %e, "switch_command_rejected");
                    return;
                }
            }
        };

        if !class.is_output() {
            let err = ZoneError::WrongDirection { zone: zone_key.to_string(), class };
            warn!(zone = %zone_key, error = %err, "switch_command_rejected");
            return;
        }

        if class == ZoneClass::OutputTap {
            if on {
                if let Some(zone) = self.drive_output(zone_key, true) {
                    self.discovery.publish_state(&zone);
                    let generation = self.pulse.arm(zone_key);
                    info!(zone = %zone_key, generation, "output_tap_pulse_started");
                }
            } else {
                // Explicit OFF always wins over a pending timer
                self.pulse.cancel(zone_key);
                if let Some(zone) = self.drive_output(zone_key, false) {
                    self.discovery.publish_state(&zone);
                    info!(zone = %zone_key, "output_tap_forced_off");
                }
            }
        } else if let Some(zone) = self.drive_output(zone_key, on) {
            self.discovery.publish_state(&zone);
            info!(zone = %zone_key, on, "output_toggle");
        }
    }

    fn handle_zone_select(&mut self, key: &str) {
        let key = key.trim();
        let class = {
            let registry = self.registry.lock();
            match registry.get(key) {
                Ok(zone) => zone.class,
                Err(e) => {
                    warn!(zone = %key, error = %e, "zone_select_rejected");
                    return;
                }
            }
        };

        self.selected_zone = Some(key.to_string());
        self.discovery.publish_selection(key, class);
        info!(zone = %key, class = %class, "zone_selected");
    }

    fn handle_class_select(&mut self, name: &str) {
        let new_class: ZoneClass = match name.parse() {
            Ok(c) => c,
            Err(e) => {
                warn!(class = %name, error = %e, "class_select_rejected");
                return;
            }
        };

        let Some(zone_key) = self.selected_zone.clone() else {
            info!(class = %new_class, "class_select_ignored: no zone selected");
            return;
        };

        // Registry first, discovery second, persistence last: live behavior
        // and the external view change together; persistence is best-effort.
        let (previous, zone) = {
            let mut registry = self.registry.lock();
            let previous = match registry.set_class(&zone_key, new_class) {
                Ok(p) => p,
                Err(e) => {
                    warn!(zone = %zone_key, error = %e, "class_select_rejected");
                    return;
                }
            };
            match registry.get(&zone_key) {
                Ok(z) => (previous, z.clone()),
                Err(e) => {
                    warn!(zone = %zone_key, error = %e, "class_select_rejected");
                    return;
                }
            }
        };

        if previous == new_class {
            debug!(zone = %zone_key, class = %new_class, "class_select_noop");
            self.discovery.publish_class_state(new_class);
            return;
        }

        // A pending tap deadline belongs to the previous class; invalidate
        // it so a later round-trip back to output_tap cannot revive it
        self.pulse.cancel(&zone_key);

        self.discovery.reclassify(&zone, previous);
        self.discovery.publish_class_state(new_class);

        let mapping = self.registry.lock().class_mapping();
        if let Err(e) = self.store.save(&mapping) {
            // In-memory state stays authoritative; the override is lost at
            // the next restart unless a later save succeeds.
            error!(zone = %zone_key, error = %e, "class_persist_failed");
        }
    }

    fn handle_input_edge(&mut self, zone_key: &str, open: bool) {
        let zone = {
            let mut registry = self.registry.lock();
            match registry.record_input(zone_key, open) {
                Ok(()) => registry.get(zone_key).ok().cloned(),
                Err(e @ ZoneError::WrongDirection { .. }) => {
                    // Edge raced a reclassification to the output group
                    debug!(zone = %zone_key, error = %e, "input_edge_stale_dropped");
                    return;
                }
                Err(e) => {
                    warn!(zone = %zone_key, error = %e, "input_edge_rejected");
                    return;
                }
            }
        };
        if let Some(zone) = zone {
            self.discovery.publish_state(&zone);
            info!(zone = %zone_key, open, "input_changed");
        }
    }

    fn handle_pulse_expired(&mut self, zone_key: &str, generation: u64) {
        if !self.pulse.is_live(zone_key, generation) {
            debug!(zone = %zone_key, generation, "pulse_expired_stale");
            return;
        }

        // Judged against the current class, not the class at arm time
        let class = {
            let registry = self.registry.lock();
            match registry.get(zone_key) {
                Ok(zone) => zone.class,
                Err(e) => {
                    warn!(zone = %zone_key, error = %e, "pulse_expired_unknown_zone");
                    return;
                }
            }
        };
        if class != ZoneClass::OutputTap {
            debug!(zone = %zone_key, class = %class, "pulse_expired_after_reclassify");
            return;
        }

        if let Some(zone) = self.drive_output(zone_key, false) {
            self.discovery.publish_state(&zone);
            info!(zone = %zone_key, "output_tap_auto_off");
        }
    }

    /// Write an output pin and return the updated zone for publication
    fn drive_output(&self, zone_key: &str, on: bool) -> Option<Zone> {
        let mut registry = self.registry.lock();
        match registry.write_output(zone_key, on) {
            Ok(()) => registry.get(zone_key).ok().cloned(),
            Err(e) => {
                warn!(zone = %zone_key, error = %e, "output_write_rejected");
                None
            }
        }
    }
}
