//! Typed channel and MQTT actor for outbound publishes
//!
//! Every state, discovery, and availability publish flows through one
//! bounded channel into a single publisher actor. `try_send` keeps a stuck
//! broker from blocking the router or the poll loop; overflow is counted
//! against the log, not the process.

use crate::infra::config::Config;
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// One outbound MQTT message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub topic: String,
    pub payload: String,
    pub retained: bool,
}

/// Cloneable sending half of the publish channel
#[derive(Clone)]
pub struct PublishSender {
    tx: mpsc::Sender<Publication>,
}

impl PublishSender {
    /// Enqueue a publish without blocking
    ///
    /// A full channel drops the message with a warning; the retained flag
    /// means the broker's last good value stays visible to consumers.
    pub fn publish(&self, topic: impl Into<String>, payload: impl Into<String>, retained: bool) {
        let publication =
            Publication { topic: topic.into(), payload: payload.into(), retained };
        if let Err(e) = self.tx.try_send(publication) {
            match e {
                TrySendError::Full(p) => {
                    warn!(topic = %p.topic, "publish_dropped: channel full");
                }
                TrySendError::Closed(_) => {
                    debug!("publish_channel_closed");
                }
            }
        }
    }
}

/// Create the publish channel
///
/// Returns the sender (for the router, discovery, and poll paths) and the
/// receiver (for the publisher actor).
pub fn create_publish_channel(buffer: usize) -> (PublishSender, mpsc::Receiver<Publication>) {
    let (tx, rx) = mpsc::channel(buffer);
    (PublishSender { tx }, rx)
}

/// MQTT publisher actor
///
/// Owns the outbound broker session and its eventloop. Carries a last-will
/// on the availability topic so the broker marks the device offline if the
/// process dies without a clean shutdown.
pub struct MqttPublisher {
    client: AsyncClient,
    eventloop: EventLoop,
    rx: mpsc::Receiver<Publication>,
}

impl MqttPublisher {
    pub fn new(config: &Config, rx: mpsc::Receiver<Publication>) -> Self {
        let client_id = format!("{}-pub-{}", config.device_id(), std::process::id());
        let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
        mqttoptions.set_keep_alive(Duration::from_secs(30));
        mqttoptions.set_clean_session(true);
        mqttoptions.set_last_will(LastWill::new(
            format!("{}/availability", config.device_id()),
            "offline",
            QoS::AtLeastOnce,
            true,
        ));

        // Set credentials if configured
        if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password())
        {
            mqttoptions.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(mqttoptions, 100);
        Self { client, eventloop, rx }
    }

    /// Run the publisher loop until shutdown, then flush to the broker
    ///
    /// The eventloop is polled in the same loop as the channel: enqueuing a
    /// publish only hands it to rumqttc, the poll is what performs the
    /// network writes. At shutdown the remaining messages are drained and
    /// the session is disconnected, and polling continues until the
    /// disconnect goes out, so availability/offline and cleanup retractions
    /// actually reach the broker before the process exits.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("mqtt_publisher_started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        self.flush().await;
                        info!("mqtt_publisher_shutdown");
                        return;
                    }
                }
                event = self.eventloop.poll() => {
                    match event {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            info!("mqtt_publisher_connected");
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(error = %e, "mqtt_publisher_error");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
                Some(p) = self.rx.recv() => {
                    self.publish_one(p);
                }
            }
        }
    }

    /// Drain the channel, then disconnect and poll until the session ends
    async fn flush(&mut self) {
        while let Ok(p) = self.rx.try_recv() {
            self.publish_one(p);
        }
        if let Err(e) = self.client.disconnect().await {
            warn!(error = %e, "mqtt_disconnect_failed");
            return;
        }

        // Queued publishes are written ahead of the disconnect packet;
        // seeing the disconnect go out means the flush is complete. A dead
        // broker connection errors out instead of stalling the exit.
        let deadline = tokio::time::sleep(Duration::from_secs(5));
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => {
                    warn!("mqtt_flush_timed_out");
                    return;
                }
                event = self.eventloop.poll() => {
                    match event {
                        Ok(Event::Outgoing(Outgoing::Disconnect)) => return,
                        Ok(_) => {}
                        Err(e) => {
                            warn!(error = %e, "mqtt_flush_aborted");
                            return;
                        }
                    }
                }
            }
        }
    }

    fn publish_one(&self, p: Publication) {
        if let Err(e) =
            self.client.try_publish(&p.topic, QoS::AtLeastOnce, p.retained, p.payload.as_bytes())
        {
            warn!(topic = %p.topic, error = %e, "mqtt_publish_failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_delivers_to_receiver() {
        let (sender, mut rx) = create_publish_channel(8);
        sender.publish("host_zone1/state", "OPEN", true);

        let p = rx.recv().await.unwrap();
        assert_eq!(p.topic, "host_zone1/state");
        assert_eq!(p.payload, "OPEN");
        assert!(p.retained);
    }

    #[tokio::test]
    async fn test_full_channel_drops_without_blocking() {
        let (sender, mut rx) = create_publish_channel(1);
        sender.publish("t", "a", false);
        sender.publish("t", "b", false);

        assert_eq!(rx.recv().await.unwrap().payload, "a");
        assert!(rx.try_recv().is_err(), "overflow message must be dropped");
    }

    #[tokio::test]
    async fn test_run_flushes_pending_messages_and_returns() {
        // Shutdown with messages still queued must hand them to the session
        // and terminate, whether or not a broker is reachable.
        let config = Config::default().with_device_id("pubtest");
        let (sender, rx) = create_publish_channel(8);
        let publisher = MqttPublisher::new(&config, rx);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        sender.publish("pubtest/availability", "offline", true);
        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(30), publisher.run(shutdown_rx))
            .await
            .expect("publisher must flush and return after shutdown");
    }
}
