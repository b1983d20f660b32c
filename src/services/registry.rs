//! In-memory source of truth for all zones
//!
//! Holds each zone's identity, class, pin, and current value, and owns
//! every pin access for classification and output writes. Pin assignment
//! is fixed at provisioning; reclassification changes only the electrical
//! direction and the interpretation of the pin. All mutation happens on
//! the command router task; the poll loop reads through the shared mutex.

use crate::domain::{BehaviorGroup, ZoneClass, ZoneError};
use crate::infra::config::ZoneSpec;
use crate::io::gpio::{GpioDriver, PinDirection};
use rustc_hash::FxHashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One physical contact or relay position
#[derive(Debug, Clone)]
pub struct Zone {
    pub key: String,
    pub name: String,
    pub pin: u8,
    pub class: ZoneClass,
    /// Inputs: true = open. Outputs: true = on.
    pub value: bool,
}

pub struct ZoneRegistry {
    zones: Vec<Zone>,
    index: FxHashMap<String, usize>,
    gpio: Arc<dyn GpioDriver>,
}

impl ZoneRegistry {
    /// Build the registry from provisioning specs plus persisted class
    /// overrides, configuring every pin for its effective class.
    ///
    /// Fails only on broken provisioning (duplicate keys or pins) or a pin
    /// driver that cannot configure a pin at all.
    pub fn new(
        specs: &[ZoneSpec],
        overrides: &HashMap<String, ZoneClass>,
        gpio: Arc<dyn GpioDriver>,
    ) -> anyhow::Result<Self> {
        let mut zones = Vec::with_capacity(specs.len());
        let mut index = FxHashMap::default();
        let mut seen_pins = FxHashMap::default();

        for spec in specs {
            if index.contains_key(&spec.key) {
                anyhow::bail!("duplicate zone key '{}'", spec.key);
            }
            if let Some(other) = seen_pins.insert(spec.pin, spec.key.clone()) {
                anyhow::bail!("pin {} assigned to both '{}' and '{}'", spec.pin, other, spec.key);
            }

            let class = overrides.get(&spec.key).copied().unwrap_or(spec.class);
            if class != spec.class {
                info!(zone = %spec.key, default = %spec.class, class = %class, "zone_class_override");
            }

            let value = configure_pin(gpio.as_ref(), spec.pin, class)?;

            index.insert(spec.key.clone(), zones.len());
            zones.push(Zone {
                key: spec.key.clone(),
                name: spec.name.clone(),
                pin: spec.pin,
                class,
                value,
            });
        }

        // Overrides for keys that are no longer provisioned are stale
        for key in overrides.keys() {
            if !index.contains_key(key) {
                warn!(zone = %key, "persisted_override_for_unknown_zone");
            }
        }

        Ok(Self { zones, index, gpio })
    }

    pub fn get(&self, key: &str) -> Result<&Zone, ZoneError> {
        self.index
            .get(key)
            .map(|&i| &self.zones[i])
            .ok_or_else(|| ZoneError::NotFound(key.to_string()))
    }

    /// Change a zone's class, reconfiguring the pin direction
    ///
    /// Returns the previous class; callers compare it against the new one
    /// to detect a no-op. The cached value resets with the direction:
    /// outputs come up OFF, inputs re-read immediately. A pin
    /// reconfiguration failure is logged and the class change stands, so
    /// live behavior and the discovery view stay consistent.
    pub fn set_class(&mut self, key: &str, new_class: ZoneClass) -> Result<ZoneClass, ZoneError> {
        let idx = *self.index.get(key).ok_or_else(|| ZoneError::NotFound(key.to_string()))?;
        let zone = &mut self.zones[idx];
        let previous = zone.class;
        if previous == new_class {
            return Ok(previous);
        }

        zone.class = new_class;
        match configure_pin(self.gpio.as_ref(), zone.pin, new_class) {
            Ok(value) => zone.value = value,
            Err(e) => {
                warn!(zone = %key, pin = zone.pin, error = %e, "pin_reconfigure_failed");
                zone.value = false;
            }
        }

        info!(zone = %key, previous = %previous, class = %new_class, "zone_reclassified");
        Ok(previous)
    }

    /// Drive an output zone's pin and update its cached value
    pub fn write_output(&mut self, key: &str, on: bool) -> Result<(), ZoneError> {
        let idx = *self.index.get(key).ok_or_else(|| ZoneError::NotFound(key.to_string()))?;
        let zone = &mut self.zones[idx];
        if zone.class.group() != BehaviorGroup::Output {
            return Err(ZoneError::WrongDirection { zone: key.to_string(), class: zone.class });
        }

        if let Err(e) = self.gpio.write(zone.pin, on) {
            warn!(zone = %key, pin = zone.pin, error = %e, "pin_write_failed");
        }
        zone.value = on;
        Ok(())
    }

    /// Record a debounced input transition (the poll loop owns the read)
    pub fn record_input(&mut self, key: &str, open: bool) -> Result<(), ZoneError> {
        let idx = *self.index.get(key).ok_or_else(|| ZoneError::NotFound(key.to_string()))?;
        let zone = &mut self.zones[idx];
        if zone.class.group() != BehaviorGroup::Input {
            return Err(ZoneError::WrongDirection { zone: key.to_string(), class: zone.class });
        }
        zone.value = open;
        Ok(())
    }

    /// Raw reads of every INPUT-class pin, in provisioning order
    ///
    /// HIGH means open (pull-up wiring). Unreadable pins are skipped.
    pub fn sample_inputs(&self) -> Vec<(String, bool)> {
        let mut samples = Vec::new();
        for zone in &self.zones {
            if zone.class.group() != BehaviorGroup::Input {
                continue;
            }
            match self.gpio.read(zone.pin) {
                Ok(high) => samples.push((zone.key.clone(), high)),
                Err(e) => debug!(zone = %zone.key, pin = zone.pin, error = %e, "pin_read_failed"),
            }
        }
        samples
    }

    /// Full snapshot in provisioning order, for discovery republication
    pub fn snapshot(&self) -> Vec<Zone> {
        self.zones.clone()
    }

    /// Current class of every zone, for persistence write-back
    pub fn class_mapping(&self) -> HashMap<String, ZoneClass> {
        self.zones.iter().map(|z| (z.key.clone(), z.class)).collect()
    }

    pub fn zone_keys(&self) -> Vec<String> {
        self.zones.iter().map(|z| z.key.clone()).collect()
    }
}

/// Set a pin's direction for a class and return the initial cached value
fn configure_pin(gpio: &dyn GpioDriver, pin: u8, class: ZoneClass) -> anyhow::Result<bool> {
    match class.group() {
        BehaviorGroup::Input => {
            gpio.set_direction(pin, PinDirection::Input)?;
            gpio.read(pin)
        }
        BehaviorGroup::Output => {
            gpio.set_direction(pin, PinDirection::Output)?;
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::gpio::MemoryGpio;

    fn specs() -> Vec<ZoneSpec> {
        vec![
            ZoneSpec { key: "zone1".into(), name: "Zone 1".into(), pin: 22, class: ZoneClass::Opening },
            ZoneSpec { key: "zone2".into(), name: "Zone 2".into(), pin: 25, class: ZoneClass::Door },
            ZoneSpec {
                key: "zone3".into(),
                name: "Zone 3".into(),
                pin: 17,
                class: ZoneClass::OutputTap,
            },
        ]
    }

    fn registry() -> (ZoneRegistry, Arc<MemoryGpio>) {
        let gpio = Arc::new(MemoryGpio::new());
        let registry = ZoneRegistry::new(&specs(), &HashMap::new(), gpio.clone()).unwrap();
        (registry, gpio)
    }

    #[test]
    fn test_startup_configures_directions() {
        let (_registry, gpio) = registry();
        assert_eq!(gpio.direction(22), Some(PinDirection::Input));
        assert_eq!(gpio.direction(25), Some(PinDirection::Input));
        assert_eq!(gpio.direction(17), Some(PinDirection::Output));
        assert_eq!(gpio.level(17), Some(false), "outputs come up OFF");
    }

    #[test]
    fn test_persisted_override_applies() {
        let gpio = Arc::new(MemoryGpio::new());
        let overrides = HashMap::from([("zone2".to_string(), ZoneClass::OutputToggle)]);
        let registry = ZoneRegistry::new(&specs(), &overrides, gpio.clone()).unwrap();

        assert_eq!(registry.get("zone2").unwrap().class, ZoneClass::OutputToggle);
        assert_eq!(gpio.direction(25), Some(PinDirection::Output));
    }

    #[test]
    fn test_get_unknown_zone() {
        let (registry, _) = registry();
        assert_eq!(registry.get("zone99").unwrap_err(), ZoneError::NotFound("zone99".into()));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let gpio = Arc::new(MemoryGpio::new());
        let mut bad = specs();
        bad[1].key = "zone1".into();
        assert!(ZoneRegistry::new(&bad, &HashMap::new(), gpio).is_err());
    }

    #[test]
    fn test_duplicate_pin_rejected() {
        let gpio = Arc::new(MemoryGpio::new());
        let mut bad = specs();
        bad[1].pin = 22;
        assert!(ZoneRegistry::new(&bad, &HashMap::new(), gpio).is_err());
    }

    #[test]
    fn test_set_class_flips_direction_keeps_pin() {
        let (mut registry, gpio) = registry();

        let previous = registry.set_class("zone1", ZoneClass::OutputToggle).unwrap();
        assert_eq!(previous, ZoneClass::Opening);

        let zone = registry.get("zone1").unwrap();
        assert_eq!(zone.pin, 22, "pin assignment survives reclassification");
        assert_eq!(zone.class, ZoneClass::OutputToggle);
        assert!(!zone.value, "reclassified output starts OFF");
        assert_eq!(gpio.direction(22), Some(PinDirection::Output));
    }

    #[test]
    fn test_set_class_same_class_is_noop() {
        let (mut registry, _) = registry();
        let previous = registry.set_class("zone2", ZoneClass::Door).unwrap();
        assert_eq!(previous, ZoneClass::Door);
    }

    #[test]
    fn test_write_output_rejected_for_input_zone() {
        let (mut registry, _) = registry();
        let err = registry.write_output("zone2", true).unwrap_err();
        assert_eq!(err, ZoneError::WrongDirection { zone: "zone2".into(), class: ZoneClass::Door });
        assert!(registry.get("zone2").unwrap().value, "value unchanged by rejected write");
    }

    #[test]
    fn test_write_output_drives_pin() {
        let (mut registry, gpio) = registry();
        registry.write_output("zone3", true).unwrap();
        assert_eq!(gpio.level(17), Some(true));
        assert!(registry.get("zone3").unwrap().value);
    }

    #[test]
    fn test_record_input_rejected_for_output_zone() {
        let (mut registry, _) = registry();
        let err = registry.record_input("zone3", true).unwrap_err();
        assert_eq!(
            err,
            ZoneError::WrongDirection { zone: "zone3".into(), class: ZoneClass::OutputTap }
        );
    }

    #[test]
    fn test_sample_inputs_skips_outputs() {
        let (registry, gpio) = registry();
        gpio.set_input_level(25, false);

        let samples = registry.sample_inputs();
        assert_eq!(
            samples,
            vec![("zone1".to_string(), true), ("zone2".to_string(), false)],
            "only input zones, in provisioning order"
        );
    }

    #[test]
    fn test_snapshot_order_and_class_mapping() {
        let (registry, _) = registry();
        let keys: Vec<_> = registry.snapshot().iter().map(|z| z.key.clone()).collect();
        assert_eq!(keys, vec!["zone1", "zone2", "zone3"]);

        let mapping = registry.class_mapping();
        assert_eq!(mapping.get("zone3"), Some(&ZoneClass::OutputTap));
        assert_eq!(mapping.len(), 3);
    }
}
