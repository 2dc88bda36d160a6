//! Camera feed transport.
//!
//! Frames arrive as MQTT publishes whose payload is a compressed-image
//! message (`{"format": "jpeg", "data": "<base64>"}`). This module owns the
//! broker connection and hands payloads to a `FrameFeed`.

mod feed;
mod tls;

pub use feed::{FeedSubscriber, RECONNECT_DELAY};
pub use tls::{parse_mqtt_endpoint, MqttEndpoint, TlsMaterials};
