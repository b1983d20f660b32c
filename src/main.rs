//! Zone Bridge - GPIO zone to MQTT discovery bridge
//!
//! Publishes Home Assistant discovery records for a table of GPIO-backed
//! zones, mirrors debounced input edges and output states over MQTT, and
//! accepts switch and reclassification commands back from the broker.
//!
//! Module structure:
//! - `domain/` - Core business types (ZoneClass, RouterEvent, errors)
//! - `io/` - External interfaces (GPIO driver, MQTT listener, publisher)
//! - `services/` - Business logic (Registry, Discovery, Router, Poll, Pulse)
//! - `infra/` - Infrastructure (Config, Persistence)

use clap::Parser;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use zone_bridge::infra::{Config, PersistenceStore};
use zone_bridge::io::{create_publish_channel, MemoryGpio, MqttPublisher};
use zone_bridge::services::{
    CommandRouter, DiscoverySynchronizer, PollLoop, PulseController, ZoneRegistry,
};

/// Zone Bridge - GPIO zone to MQTT discovery bridge
#[derive(Parser, Debug)]
#[command(name = "zone-bridge", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// Retract all retained discovery records and exit
    #[arg(long)]
    cleanup: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("zone-bridge starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        device_id = %config.device_id(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        discovery_prefix = %config.discovery_prefix(),
        poll_interval_ms = %config.poll_interval().as_millis(),
        debounce_ms = %config.debounce().as_millis(),
        tap_ms = %config.tap_duration().as_millis(),
        zones = config.zones().len(),
        "config_loaded"
    );

    // Publisher runs on its own shutdown channel so shutdown-time messages
    // (offline availability, cleanup retractions) are still drained after
    // the rest of the tasks have stopped.
    let (publish_tx, publish_rx) = create_publish_channel(256);
    let publisher = MqttPublisher::new(&config, publish_rx);
    let (publisher_shutdown_tx, publisher_shutdown_rx) = watch::channel(false);
    let publisher_handle = tokio::spawn(async move {
        publisher.run(publisher_shutdown_rx).await;
    });

    let discovery = DiscoverySynchronizer::new(&config, publish_tx);

    if args.cleanup {
        let zone_keys: Vec<String> = config.zones().iter().map(|z| z.key.clone()).collect();
        discovery.retract_all(&zone_keys);
        discovery.publish_availability(false);
        info!(zones = zone_keys.len(), "cleanup_complete");
        let _ = publisher_shutdown_tx.send(true);
        let _ = publisher_handle.await;
        return Ok(());
    }

    // Persisted class overrides survive restarts; the config table is the
    // base and the saved mapping wins per zone.
    let store = PersistenceStore::from_config(&config);
    let overrides = store.load();

    let gpio = Arc::new(MemoryGpio::new());
    let registry = ZoneRegistry::new(config.zones(), &overrides, gpio)?;

    // Startup publication: discovery configs (retracting any record of the
    // opposite entity kind left over from a pre-reclassify crash), current
    // states, selector entities, then availability last.
    discovery.publish_all(&registry.snapshot());
    discovery.publish_selectors(&registry.zone_keys());
    discovery.publish_availability(true);

    let registry = Arc::new(Mutex::new(registry));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (event_tx, event_rx) = mpsc::channel(256);

    // Inbound MQTT commands (switch set, zone/class selection)
    let listener_config = config.clone();
    let listener_tx = event_tx.clone();
    let listener_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) =
            zone_bridge::io::mqtt::start_command_listener(&listener_config, listener_tx, listener_shutdown)
                .await
        {
            tracing::error!(error = %e, "command listener error");
        }
    });

    // Debounced input polling
    let poll = PollLoop::new(
        registry.clone(),
        event_tx.clone(),
        config.poll_interval(),
        config.debounce(),
    );
    let poll_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        poll.run(poll_shutdown).await;
    });

    let pulse = PulseController::new(config.tap_duration(), event_tx);
    let mut router = CommandRouter::new(registry, discovery.clone(), pulse, store);

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Run router - consumes events until shutdown
    router.run(event_rx, shutdown_rx).await;

    // Mark the device offline, then let the publisher drain
    discovery.publish_availability(false);
    let _ = publisher_shutdown_tx.send(true);
    let _ = publisher_handle.await;

    info!("zone-bridge shutdown complete");
    Ok(())
}
