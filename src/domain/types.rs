//! Shared types for the zone bridge

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Behavioral group of a zone class
///
/// INPUT zones are polled contacts; OUTPUT zones are commanded relays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BehaviorGroup {
    Input,
    Output,
}

/// Home Assistant entity kind a zone class maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    BinarySensor,
    Switch,
}

impl EntityKind {
    /// MQTT discovery component name
    pub fn component(&self) -> &'static str {
        match self {
            EntityKind::BinarySensor => "binary_sensor",
            EntityKind::Switch => "switch",
        }
    }
}

/// Closed set of zone classes
///
/// The three input classes are behaviorally identical contacts and differ
/// only in the `device_class` metadata shown by Home Assistant. The two
/// output classes differ in tap-vs-toggle semantics and icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneClass {
    Door,
    Window,
    Opening,
    OutputToggle,
    OutputTap,
}

impl ZoneClass {
    /// All classes, in selector display order
    pub const ALL: [ZoneClass; 5] = [
        ZoneClass::Door,
        ZoneClass::Window,
        ZoneClass::Opening,
        ZoneClass::OutputToggle,
        ZoneClass::OutputTap,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneClass::Door => "door",
            ZoneClass::Window => "window",
            ZoneClass::Opening => "opening",
            ZoneClass::OutputToggle => "output_toggle",
            ZoneClass::OutputTap => "output_tap",
        }
    }

    pub fn group(&self) -> BehaviorGroup {
        match self {
            ZoneClass::Door | ZoneClass::Window | ZoneClass::Opening => BehaviorGroup::Input,
            ZoneClass::OutputToggle | ZoneClass::OutputTap => BehaviorGroup::Output,
        }
    }

    pub fn is_output(&self) -> bool {
        self.group() == BehaviorGroup::Output
    }

    pub fn entity_kind(&self) -> EntityKind {
        match self.group() {
            BehaviorGroup::Input => EntityKind::BinarySensor,
            BehaviorGroup::Output => EntityKind::Switch,
        }
    }

    /// Icon metadata for switch entities; input entities carry a
    /// `device_class` instead and no icon.
    pub fn icon(&self) -> Option<&'static str> {
        match self {
            ZoneClass::OutputToggle => Some("mdi:toggle-switch"),
            ZoneClass::OutputTap => Some("mdi:gesture-tap-button"),
            _ => None,
        }
    }
}

impl std::fmt::Display for ZoneClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ZoneClass {
    type Err = ZoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "door" => Ok(ZoneClass::Door),
            "window" => Ok(ZoneClass::Window),
            "opening" => Ok(ZoneClass::Opening),
            "output_toggle" => Ok(ZoneClass::OutputToggle),
            "output_tap" => Ok(ZoneClass::OutputTap),
            other => Err(ZoneError::InvalidClass(other.to_string())),
        }
    }
}

/// Errors raised by zone operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ZoneError {
    #[error("unknown zone '{0}'")]
    NotFound(String),
    #[error("'{0}' is not a valid zone class")]
    InvalidClass(String),
    #[error("zone '{zone}' is classed {class} and does not accept this operation")]
    WrongDirection { zone: String, class: ZoneClass },
}

/// Events consumed by the command router
///
/// All mutation paths (MQTT commands, poll edges, pulse expiries) converge
/// on one bounded channel of these, so the router is the single writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterEvent {
    /// Per-zone switch command (`<host>_<zone>/switch/set`)
    SwitchCommand { zone: String, on: bool },
    /// Zone selector command (`<host>/zone_select/set`)
    ZoneSelect(String),
    /// Class selector command (`<host>/class_select/set`)
    ClassSelect(String),
    /// Debounced input transition from the poll loop
    InputEdge { zone: String, open: bool },
    /// A tap pulse deadline fired; stale generations are dropped
    PulseExpired { zone: String, generation: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_round_trip() {
        for class in ZoneClass::ALL {
            assert_eq!(class.as_str().parse::<ZoneClass>().unwrap(), class);
        }
    }

    #[test]
    fn test_class_parse_normalizes() {
        assert_eq!(" Door ".parse::<ZoneClass>().unwrap(), ZoneClass::Door);
        assert_eq!("OUTPUT_TAP".parse::<ZoneClass>().unwrap(), ZoneClass::OutputTap);
    }

    #[test]
    fn test_class_parse_rejects_unknown() {
        let err = "dimmer".parse::<ZoneClass>().unwrap_err();
        assert_eq!(err, ZoneError::InvalidClass("dimmer".to_string()));
    }

    #[test]
    fn test_group_partition() {
        assert_eq!(ZoneClass::Door.group(), BehaviorGroup::Input);
        assert_eq!(ZoneClass::Window.group(), BehaviorGroup::Input);
        assert_eq!(ZoneClass::Opening.group(), BehaviorGroup::Input);
        assert_eq!(ZoneClass::OutputToggle.group(), BehaviorGroup::Output);
        assert_eq!(ZoneClass::OutputTap.group(), BehaviorGroup::Output);
    }

    #[test]
    fn test_entity_kind_total() {
        // Every class maps to exactly one entity kind; only switch entities
        // carry icon metadata.
        for class in ZoneClass::ALL {
            match class.entity_kind() {
                EntityKind::BinarySensor => assert!(class.icon().is_none()),
                EntityKind::Switch => assert!(class.icon().is_some()),
            }
        }
    }

    #[test]
    fn test_serde_names_match_as_str() {
        for class in ZoneClass::ALL {
            let json = serde_json::to_string(&class).unwrap();
            assert_eq!(json, format!("\"{}\"", class.as_str()));
        }
    }
}
