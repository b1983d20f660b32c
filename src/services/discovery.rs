//! Home Assistant discovery synchronization
//!
//! Derives the external entity shape for every zone class and drives the
//! retract/publish sequences that keep exactly one live discovery record
//! per zone. Topic and shape derivation is pure and total: every class
//! maps to one entity kind, one config topic, and one state payload
//! vocabulary.
//!
//! Topics (bit-exact):
//! - config: `<prefix>/<component>/<host>/<zoneKey>/config`, retained JSON;
//!   empty retained payload retracts
//! - input state: `<host>_<zoneKey>/state`, `OPEN`/`CLOSED`
//! - output state: `<host>_<zoneKey>/switch/state`, `ON`/`OFF`
//! - output command: `<host>_<zoneKey>/switch/set`
//! - selectors: `<host>/zone_select|class_select/set|state`
//! - availability: `<host>/availability`, `online`/`offline`

use crate::domain::{EntityKind, ZoneClass};
use crate::infra::config::Config;
use crate::io::publish::PublishSender;
use crate::services::registry::Zone;
use serde::Serialize;
use tracing::{info, warn};

const PAYLOAD_AVAILABLE: &str = "online";
const PAYLOAD_NOT_AVAILABLE: &str = "offline";

/// Device block shared by every discovery payload
#[derive(Debug, Clone, Serialize)]
struct DeviceBlock {
    name: String,
    identifiers: Vec<String>,
    manufacturer: &'static str,
    model: String,
}

/// Discovery payload for an input zone (binary sensor)
#[derive(Debug, Serialize)]
struct BinarySensorConfig {
    name: String,
    unique_id: String,
    state_topic: String,
    availability_topic: String,
    payload_available: &'static str,
    payload_not_available: &'static str,
    payload_on: &'static str,
    payload_off: &'static str,
    device_class: &'static str,
    device: DeviceBlock,
}

/// Discovery payload for an output zone (switch)
#[derive(Debug, Serialize)]
struct SwitchConfig {
    name: String,
    unique_id: String,
    state_topic: String,
    command_topic: String,
    availability_topic: String,
    payload_available: &'static str,
    payload_not_available: &'static str,
    payload_on: &'static str,
    payload_off: &'static str,
    state_on: &'static str,
    state_off: &'static str,
    icon: &'static str,
    device: DeviceBlock,
}

/// Discovery payload for the zone/class selector dropdowns
#[derive(Debug, Serialize)]
struct SelectConfig {
    name: String,
    unique_id: String,
    command_topic: String,
    state_topic: String,
    options: Vec<String>,
    availability_topic: String,
    payload_available: &'static str,
    payload_not_available: &'static str,
    icon: &'static str,
    device: DeviceBlock,
}

/// Computes and emits the add/retract sequences of discovery records
#[derive(Clone)]
pub struct DiscoverySynchronizer {
    publisher: PublishSender,
    prefix: String,
    host: String,
}

impl DiscoverySynchronizer {
    pub fn new(config: &Config, publisher: PublishSender) -> Self {
        Self {
            publisher,
            prefix: config.discovery_prefix().to_string(),
            host: config.device_id().to_string(),
        }
    }

    // ---- topic derivation (pure) ----

    pub fn config_topic(&self, kind: EntityKind, zone_key: &str) -> String {
        format!("{}/{}/{}/{}/config", self.prefix, kind.component(), self.host, zone_key)
    }

    pub fn input_state_topic(&self, zone_key: &str) -> String {
        format!("{}_{}/state", self.host, zone_key)
    }

    pub fn switch_state_topic(&self, zone_key: &str) -> String {
        format!("{}_{}/switch/state", self.host, zone_key)
    }

    pub fn switch_command_topic(&self, zone_key: &str) -> String {
        format!("{}_{}/switch/set", self.host, zone_key)
    }

    pub fn state_topic(&self, zone: &Zone) -> String {
        match zone.class.entity_kind() {
            EntityKind::BinarySensor => self.input_state_topic(&zone.key),
            EntityKind::Switch => self.switch_state_topic(&zone.key),
        }
    }

    pub fn zone_select_state_topic(&self) -> String {
        format!("{}/zone_select/state", self.host)
    }

    pub fn class_select_state_topic(&self) -> String {
        format!("{}/class_select/state", self.host)
    }

    fn zone_select_config_topic(&self) -> String {
        format!("{}/select/{}/zone_select/config", self.prefix, self.host)
    }

    fn class_select_config_topic(&self) -> String {
        format!("{}/select/{}/class_select/config", self.prefix, self.host)
    }

    pub fn availability_topic(&self) -> String {
        format!("{}/availability", self.host)
    }

    /// State payload vocabulary for a zone's current value
    pub fn state_payload(zone: &Zone) -> &'static str {
        match (zone.class.entity_kind(), zone.value) {
            (EntityKind::BinarySensor, true) => "OPEN",
            (EntityKind::BinarySensor, false) => "CLOSED",
            (EntityKind::Switch, true) => "ON",
            (EntityKind::Switch, false) => "OFF",
        }
    }

    // ---- publish sequences ----

    fn device_block(&self) -> DeviceBlock {
        DeviceBlock {
            name: self.host.clone(),
            identifiers: vec![self.host.clone()],
            manufacturer: "Raspberry Pi",
            model: format!("GPIO IO ({})", self.host),
        }
    }

    /// Publish the discovery config for a zone's current class, retained
    pub fn publish_discovery(&self, zone: &Zone) {
        let topic = self.config_topic(zone.class.entity_kind(), &zone.key);
        let payload = match zone.class.entity_kind() {
            EntityKind::BinarySensor => serde_json::to_string(&BinarySensorConfig {
                name: zone.name.clone(),
                unique_id: format!("{}_{}_bin", self.host, zone.key),
                state_topic: self.input_state_topic(&zone.key),
                availability_topic: self.availability_topic(),
                payload_available: PAYLOAD_AVAILABLE,
                payload_not_available: PAYLOAD_NOT_AVAILABLE,
                payload_on: "OPEN",
                payload_off: "CLOSED",
                device_class: zone.class.as_str(),
                device: self.device_block(),
            }),
            EntityKind::Switch => serde_json::to_string(&SwitchConfig {
                name: zone.name.clone(),
                unique_id: format!("{}_{}_sw", self.host, zone.key),
                state_topic: self.switch_state_topic(&zone.key),
                command_topic: self.switch_command_topic(&zone.key),
                availability_topic: self.availability_topic(),
                payload_available: PAYLOAD_AVAILABLE,
                payload_not_available: PAYLOAD_NOT_AVAILABLE,
                payload_on: "ON",
                payload_off: "OFF",
                state_on: "ON",
                state_off: "OFF",
                icon: zone.class.icon().unwrap_or("mdi:toggle-switch"),
                device: self.device_block(),
            }),
        };

        match payload {
            Ok(json) => self.publisher.publish(topic, json, true),
            Err(e) => warn!(zone = %zone.key, error = %e, "discovery_payload_serialize_failed"),
        }
    }

    /// Publish a zone's current state, retained
    pub fn publish_state(&self, zone: &Zone) {
        self.publisher.publish(self.state_topic(zone), Self::state_payload(zone), true);
    }

    /// Retract a discovery record: empty retained payload to its config topic
    fn retract(&self, kind: EntityKind, zone_key: &str) {
        self.publisher.publish(self.config_topic(kind, zone_key), "", true);
    }

    /// Full republication at startup
    ///
    /// Retracting the opposite entity-kind config first converges any stale
    /// record left by a crash mid-reclassification or by an offline edit of
    /// the persisted mapping (at-least-once, never two live records).
    pub fn publish_all(&self, zones: &[Zone]) {
        for zone in zones {
            let kind = zone.class.entity_kind();
            let opposite = match kind {
                EntityKind::BinarySensor => EntityKind::Switch,
                EntityKind::Switch => EntityKind::BinarySensor,
            };
            self.retract(opposite, &zone.key);
            self.publish_discovery(zone);
            self.publish_state(zone);
        }
        info!(zones = zones.len(), "discovery_published_all");
    }

    /// Transition a zone between entity shapes after a class change
    ///
    /// Retract-then-publish, never the reverse. The retract happens even
    /// when old and new classes share an entity kind, forcing the external
    /// system to refresh metadata instead of caching the stale record.
    pub fn reclassify(&self, zone: &Zone, old_class: ZoneClass) {
        self.retract(old_class.entity_kind(), &zone.key);
        self.publish_discovery(zone);
        self.publish_state(zone);
        info!(zone = %zone.key, old = %old_class, new = %zone.class, "discovery_reclassified");
    }

    /// Publish the two selector entities and clear any stale selection
    pub fn publish_selectors(&self, zone_keys: &[String]) {
        let zone_payload = SelectConfig {
            name: format!("{} Zone Select", self.host),
            unique_id: format!("{}_zone_select", self.host),
            command_topic: format!("{}/zone_select/set", self.host),
            state_topic: self.zone_select_state_topic(),
            options: zone_keys.to_vec(),
            availability_topic: self.availability_topic(),
            payload_available: PAYLOAD_AVAILABLE,
            payload_not_available: PAYLOAD_NOT_AVAILABLE,
            icon: "mdi:format-list-bulleted",
            device: self.device_block(),
        };
        let class_payload = SelectConfig {
            name: format!("{} Class Select", self.host),
            unique_id: format!("{}_class_select", self.host),
            command_topic: format!("{}/class_select/set", self.host),
            state_topic: self.class_select_state_topic(),
            options: ZoneClass::ALL.iter().map(|c| c.as_str().to_string()).collect(),
            availability_topic: self.availability_topic(),
            payload_available: PAYLOAD_AVAILABLE,
            payload_not_available: PAYLOAD_NOT_AVAILABLE,
            icon: "mdi:tag-outline",
            device: self.device_block(),
        };

        for (topic, payload) in [
            (self.zone_select_config_topic(), serde_json::to_string(&zone_payload)),
            (self.class_select_config_topic(), serde_json::to_string(&class_payload)),
        ] {
            match payload {
                Ok(json) => self.publisher.publish(topic, json, true),
                Err(e) => warn!(error = %e, "selector_payload_serialize_failed"),
            }
        }

        // Selection is transient; clear retained states from a previous run
        self.publisher.publish(self.zone_select_state_topic(), "", true);
        self.publisher.publish(self.class_select_state_topic(), "", true);
    }

    /// Reflect a zone selection: the key and that zone's current class
    pub fn publish_selection(&self, zone_key: &str, class: ZoneClass) {
        self.publisher.publish(self.zone_select_state_topic(), zone_key, true);
        self.publisher.publish(self.class_select_state_topic(), class.as_str(), true);
    }

    /// Reflect the class selector after a reclassification
    pub fn publish_class_state(&self, class: ZoneClass) {
        self.publisher.publish(self.class_select_state_topic(), class.as_str(), true);
    }

    pub fn publish_availability(&self, online: bool) {
        let payload = if online { PAYLOAD_AVAILABLE } else { PAYLOAD_NOT_AVAILABLE };
        self.publisher.publish(self.availability_topic(), payload, true);
    }

    /// Cleanup mode: retract every known config topic (both entity kinds
    /// per zone, plus the two selectors) so an uninstall leaves no orphans.
    pub fn retract_all(&self, zone_keys: &[String]) {
        for key in zone_keys {
            self.retract(EntityKind::BinarySensor, key);
            self.retract(EntityKind::Switch, key);
        }
        self.publisher.publish(self.zone_select_config_topic(), "", true);
        self.publisher.publish(self.class_select_config_topic(), "", true);
        info!(zones = zone_keys.len(), "discovery_retracted_all");
    }
}
