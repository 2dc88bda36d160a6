//! Broker address parsing and TLS transport selection for the feed connection.
//!
//! - CA verification: custom CA path or the bundled webpki roots
//! - Client certificates: mutual TLS when both cert and key are given

use anyhow::{anyhow, Context, Result};
use rumqttc::Transport;
use std::path::PathBuf;

/// TLS certificate materials for the broker connection.
#[derive(Clone, Debug, Default)]
pub struct TlsMaterials {
    /// PEM-encoded CA certificate bytes. `None` uses default roots.
    pub ca: Option<Vec<u8>>,

    /// Client certificate and key for mutual TLS, provided together.
    pub client_auth: Option<(Vec<u8>, Vec<u8>)>,
}

impl TlsMaterials {
    /// Load TLS materials from file paths.
    pub fn load(
        ca_path: Option<&PathBuf>,
        client_cert_path: Option<&PathBuf>,
        client_key_path: Option<&PathBuf>,
    ) -> Result<Self> {
        let ca = match ca_path {
            Some(path) => Some(
                std::fs::read(path)
                    .with_context(|| format!("failed to read MQTT TLS CA '{}'", path.display()))?,
            ),
            None => None,
        };

        let client_auth = match (client_cert_path, client_key_path) {
            (Some(cert_path), Some(key_path)) => {
                let cert = std::fs::read(cert_path).with_context(|| {
                    format!(
                        "failed to read MQTT TLS client cert '{}'",
                        cert_path.display()
                    )
                })?;
                let key = std::fs::read(key_path).with_context(|| {
                    format!("failed to read MQTT TLS client key '{}'", key_path.display())
                })?;
                Some((cert, key))
            }
            (None, None) => None,
            (Some(_), None) => {
                return Err(anyhow!("MQTT TLS client certificate provided without key"))
            }
            (None, Some(_)) => {
                return Err(anyhow!("MQTT TLS client key provided without certificate"))
            }
        };

        Ok(Self { ca, client_auth })
    }

    pub fn is_configured(&self) -> bool {
        self.ca.is_some() || self.client_auth.is_some()
    }

    /// Build a rumqttc transport for `endpoint`.
    pub fn build_transport(&self, endpoint: &MqttEndpoint) -> Result<Transport> {
        if !endpoint.use_tls {
            if self.is_configured() {
                return Err(anyhow!(
                    "MQTT TLS materials provided but TLS is disabled; \
                     set feed.use_tls or use an mqtts:// broker address"
                ));
            }
            return Ok(Transport::tcp());
        }

        if !self.is_configured() {
            return Ok(Transport::tls_with_default_config());
        }

        let ca = self.ca.clone().ok_or_else(|| {
            anyhow!("MQTT TLS CA certificate is required when providing client certificates")
        })?;
        Ok(Transport::tls(ca, self.client_auth.clone(), None))
    }
}

/// Broker endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttEndpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

/// Parse a broker address.
///
/// Supports `host:port`, `mqtt://`, `tcp://`, `mqtts://`, `ssl://` and
/// bracketed IPv6 such as `[::1]:1883`. `tls_override` forces TLS on.
pub fn parse_mqtt_endpoint(addr: &str, tls_override: bool) -> Result<MqttEndpoint> {
    let mut use_tls = tls_override;
    let mut remainder = addr.trim();

    if let Some((scheme, rest)) = remainder.split_once("://") {
        match scheme {
            "mqtt" | "tcp" => {}
            "mqtts" | "ssl" => use_tls = true,
            other => return Err(anyhow!("unsupported MQTT scheme: {}", other)),
        }
        remainder = rest;
    }

    let (host, port) = split_host_port(remainder)?;
    if host.is_empty() {
        return Err(anyhow!("missing MQTT host in {}", addr));
    }
    Ok(MqttEndpoint {
        host,
        port,
        use_tls,
    })
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
        let port: u16 = port
            .parse()
            .with_context(|| format!("invalid MQTT port in {}", addr))?;
        return Ok((host.to_string(), port));
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
    let port: u16 = port
        .parse()
        .with_context(|| format!("invalid MQTT port in {}", addr))?;
    Ok((host.to_string(), port))
}
