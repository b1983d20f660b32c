//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `gpio` - pin driver interface and in-memory backend
//! - `mqtt` - MQTT client for receiving inbound commands
//! - `publish` - Typed channel and MQTT actor for outbound publishes

pub mod gpio;
pub mod mqtt;
pub mod publish;

// Re-export commonly used types
pub use gpio::{GpioDriver, MemoryGpio, PinDirection};
pub use publish::{create_publish_channel, MqttPublisher, Publication, PublishSender};
