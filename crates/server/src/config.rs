//! Server configuration file: a second, small configuration distinct
//! from the pipeline configuration, carrying TLS material references and the
//! control API's listening port.

use std::{fs::File, io::BufReader, path::Path};

use serde::Deserialize;

use crate::Error;

fn default_server_port() -> u16 {
    4900
}

/// The metrics backends the control API may expose. Closed set: only
/// Prometheus text exposition is wired up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum MetricsRegistryKind {
    /// Prometheus text exposition at `/metrics/prometheus` and `/metrics/sys`.
    Prometheus,
}

/// The control server's configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Whether the control API should be served over TLS. TLS material is
    /// accepted as an already-resolved `rustls::ServerConfig`; this crate
    /// does not parse the keystore itself.
    #[serde(default)]
    pub ssl: bool,
    /// Path to the keystore file, when `ssl` is set.
    #[serde(default)]
    pub key_store_file_path: Option<String>,
    /// Keystore password, when `ssl` is set.
    #[serde(default)]
    pub key_store_password: Option<String>,
    /// Private key password, when `ssl` is set and it differs from the
    /// keystore password.
    #[serde(default)]
    pub private_key_password: Option<String>,
    /// The control API's listening port.
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    /// Which metrics backends to expose. Empty means `/metrics/*` always
    /// 404s.
    #[serde(default)]
    pub metrics_registries: Vec<MetricsRegistryKind>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ssl: false,
            key_store_file_path: None,
            key_store_password: None,
            private_key_password: None,
            server_port: default_server_port(),
            metrics_registries: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// True if any configured metrics backend should be exposed.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_registries.contains(&MetricsRegistryKind::Prometheus)
    }

    /// Loads a server configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|error| Error::InvalidConfig {
            file: path.display().to_string(),
            message: error.to_string(),
        })?;
        serde_yaml::from_reader(BufReader::new(file)).map_err(|error| Error::InvalidConfig {
            file: path.display().to_string(),
            message: error.to_string(),
        })
    }
}
