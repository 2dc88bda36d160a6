use anyhow::Result;
use rumqttc::{Client, Connection, Event, Incoming, MqttOptions, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::tls::{parse_mqtt_endpoint, MqttEndpoint, TlsMaterials};
use crate::config::FeedSettings;
use crate::frame::FrameFeed;

/// Pause between reconnect attempts after the broker connection drops.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const MAX_INCOMING_PACKET_BYTES: usize = 8 * 1024 * 1024;
const MAX_OUTGOING_PACKET_BYTES: usize = 64 * 1024;

/// Background subscriber that forwards camera messages to a `FrameFeed`.
///
/// Dropping the subscriber stops the loop at the next broker event.
pub struct FeedSubscriber {
    shutdown: Arc<AtomicBool>,
}

impl FeedSubscriber {
    /// Resolve the broker settings and start the subscription thread.
    pub fn spawn(settings: &FeedSettings, feed: FrameFeed) -> Result<Self> {
        let endpoint = parse_mqtt_endpoint(&settings.broker_addr, settings.use_tls)?;
        let tls = TlsMaterials::load(
            settings.tls_ca_path.as_ref(),
            settings.tls_client_cert_path.as_ref(),
            settings.tls_client_key_path.as_ref(),
        )?;
        // Fail on bad TLS settings here rather than in the loop.
        tls.build_transport(&endpoint)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let settings = settings.clone();
        std::thread::Builder::new()
            .name("camera-feed".into())
            .spawn(move || run_feed(&endpoint, &tls, &settings, &feed, &shutdown_thread))?;

        Ok(Self { shutdown })
    }

    /// Ask the subscription loop to stop. It exits at the next broker event.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

impl Drop for FeedSubscriber {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_feed(
    endpoint: &MqttEndpoint,
    tls: &TlsMaterials,
    settings: &FeedSettings,
    feed: &FrameFeed,
    shutdown: &AtomicBool,
) {
    log::info!(
        "camera feed: {}:{} topic {} (TLS: {})",
        endpoint.host,
        endpoint.port,
        settings.topic,
        endpoint.use_tls
    );
    while !shutdown.load(Ordering::SeqCst) {
        match connect_and_consume(endpoint, tls, settings, feed, shutdown) {
            Ok(()) if shutdown.load(Ordering::SeqCst) => break,
            Ok(()) => log::warn!("camera feed connection closed. Reconnecting..."),
            Err(e) => log::error!("camera feed error: {}. Reconnecting...", e),
        }
        std::thread::sleep(RECONNECT_DELAY);
    }
    log::info!("camera feed stopped");
}

fn connect_and_consume(
    endpoint: &MqttEndpoint,
    tls: &TlsMaterials,
    settings: &FeedSettings,
    feed: &FrameFeed,
    shutdown: &AtomicBool,
) -> Result<()> {
    let (client, mut connection) = connect_mqtt(endpoint, tls, settings)?;
    client.subscribe(&settings.topic, QoS::AtMostOnce)?;
    log::info!("subscribed to {}", settings.topic);

    for event in connection.iter() {
        if shutdown.load(Ordering::SeqCst) {
            let _ = client.disconnect();
            return Ok(());
        }
        match event {
            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                log::trace!("{} byte frame on {}", publish.payload.len(), publish.topic);
                feed.on_feed_payload(&publish.payload);
            }
            Ok(_) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn connect_mqtt(
    endpoint: &MqttEndpoint,
    tls: &TlsMaterials,
    settings: &FeedSettings,
) -> Result<(Client, Connection)> {
    let mut options = MqttOptions::new(&settings.client_id, &endpoint.host, endpoint.port);
    options.set_keep_alive(Duration::from_secs(30));
    options.set_clean_session(true);
    options.set_max_packet_size(MAX_INCOMING_PACKET_BYTES, MAX_OUTGOING_PACKET_BYTES);
    if let Some(user) = settings.username.as_deref() {
        options.set_credentials(user, settings.password.clone().unwrap_or_default());
    }
    options.set_transport(tls.build_transport(endpoint)?);

    let (client, connection) = Client::new(options, 10);
    log::info!(
        "connecting to MQTT broker (TLS: {}, auth: {})",
        endpoint.use_tls,
        settings.username.is_some()
    );
    Ok((client, connection))
}
