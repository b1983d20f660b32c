//! MQTT client for receiving inbound commands
//!
//! Subscribes to the per-zone switch command topics and the two selector
//! command topics, translates payloads into [`RouterEvent`]s, and feeds
//! them to the router channel. Events are sent via `try_send` so the MQTT
//! eventloop never blocks on a slow router.

use crate::domain::RouterEvent;
use crate::infra::config::Config;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Start the command listener and forward parsed events to the channel
pub async fn start_command_listener(
    config: &Config,
    event_tx: mpsc::Sender<RouterEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let host = config.device_id().to_string();
    let client_id = format!("{}-cmd-{}", host, std::process::id());
    let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    // Set credentials if configured
    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
    client.subscribe(format!("{}/zone_select/set", host), QoS::AtLeastOnce).await?;
    client.subscribe(format!("{}/class_select/set", host), QoS::AtLeastOnce).await?;
    // One wildcard covers every zone's switch/set topic, so zones
    // reclassified to outputs at runtime need no extra subscription.
    client.subscribe("+/switch/set", QoS::AtLeastOnce).await?;

    info!(host = %host, mqtt_host = %config.mqtt_host(), mqtt_port = %config.mqtt_port(), "command_listener_subscribed");

    // Rate-limit drop warnings to 1 per second
    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("command_listener_shutdown");
                    return Ok(());
                }
            }
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let topic = &publish.topic;
                        let payload = match std::str::from_utf8(&publish.payload) {
                            Ok(p) => p,
                            Err(e) => {
                                warn!(topic = %topic, error = %e, "invalid_utf8_command_payload");
                                continue;
                            }
                        };

                        let Some(event) = parse_command(&host, topic, payload) else {
                            debug!(topic = %topic, payload = %payload, "command_ignored");
                            continue;
                        };

                        debug!(topic = %topic, event = ?event, "command_received");
                        if let Err(e) = event_tx.try_send(event) {
                            match e {
                                TrySendError::Full(_) => {
                                    if last_drop_warn.elapsed() > Duration::from_secs(1) {
                                        warn!("command_dropped: channel full");
                                        last_drop_warn = Instant::now();
                                    }
                                }
                                TrySendError::Closed(_) => {
                                    warn!("command_channel_closed");
                                    return Ok(());
                                }
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("command_listener_connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "command_listener_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}

/// Translate an inbound topic/payload pair into a router event
///
/// Returns `None` for topics outside this device's namespace and for
/// payloads that are not commands; the router performs zone/class
/// validation itself so validity checks stay in one place.
pub fn parse_command(host: &str, topic: &str, payload: &str) -> Option<RouterEvent> {
    let payload = payload.trim();

    if topic == format!("{}/zone_select/set", host) {
        return Some(RouterEvent::ZoneSelect(payload.to_string()));
    }
    if topic == format!("{}/class_select/set", host) {
        return Some(RouterEvent::ClassSelect(payload.to_string()));
    }

    if let Some(head) = topic.strip_suffix("/switch/set") {
        let zone = head.strip_prefix(host)?.strip_prefix('_')?;
        if zone.is_empty() || zone.contains('/') {
            return None;
        }
        let on = match payload.to_ascii_uppercase().as_str() {
            "ON" => true,
            "OFF" => false,
            _ => return None,
        };
        return Some(RouterEvent::SwitchCommand { zone: zone.to_string(), on });
    }

    None
}
