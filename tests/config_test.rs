//! Integration tests for configuration loading

use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;
use zone_bridge::domain::ZoneClass;
use zone_bridge::infra::Config;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[device]
id = "test-monitor"

[mqtt]
host = "test-host"
port = 1884
username = "bridge"
password = "secret"

[discovery]
prefix = "ha"

[poll]
interval_ms = 25
debounce_ms = 80

[outputs]
tap_ms = 750

[persistence]
dirs = ["/tmp/zone-bridge-test"]

[[zone]]
key = "front_door"
name = "Front Door"
pin = 22
class = "door"

[[zone]]
key = "garage_relay"
name = "Garage Relay"
pin = 17
class = "output_tap"
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.device_id(), "test_monitor");
    assert_eq!(config.mqtt_host(), "test-host");
    assert_eq!(config.mqtt_port(), 1884);
    assert_eq!(config.mqtt_username(), Some("bridge"));
    assert_eq!(config.mqtt_password(), Some("secret"));
    assert_eq!(config.discovery_prefix(), "ha");
    assert_eq!(config.poll_interval(), Duration::from_millis(25));
    assert_eq!(config.debounce(), Duration::from_millis(80));
    assert_eq!(config.tap_duration(), Duration::from_millis(750));

    assert_eq!(config.zones().len(), 2);
    assert_eq!(config.zones()[0].key, "front_door");
    assert_eq!(config.zones()[0].pin, 22);
    assert_eq!(config.zones()[0].class, ZoneClass::Door);
    assert_eq!(config.zones()[1].class, ZoneClass::OutputTap);
}

#[test]
fn test_zone_class_defaults_to_opening() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[[zone]]
key = "hall"
name = "Hallway"
pin = 5
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(config.zones().len(), 1);
    assert_eq!(config.zones()[0].class, ZoneClass::Opening);
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.mqtt_host(), "localhost");
    assert_eq!(config.mqtt_port(), 1883);
    assert_eq!(config.discovery_prefix(), "homeassistant");
    assert_eq!(config.poll_interval(), Duration::from_millis(50));
    assert_eq!(config.debounce(), Duration::from_millis(120));
    assert_eq!(config.tap_duration(), Duration::from_millis(500));

    // Default zone table: ten zones on fixed pins, all openings
    let zones = config.zones();
    assert_eq!(zones.len(), 10);
    assert_eq!(zones[0].key, "zone1");
    assert_eq!(zones[0].pin, 22);
    assert_eq!(zones[8].pin, 17);
    assert!(zones.iter().all(|z| z.class == ZoneClass::Opening));
}

#[test]
fn test_invalid_zone_class_is_a_parse_error() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file
        .write_all(b"[[zone]]\nkey = \"x\"\nname = \"X\"\npin = 4\nclass = \"dimmer\"\n")
        .unwrap();
    temp_file.flush().unwrap();

    assert!(Config::from_file(temp_file.path()).is_err());
}
