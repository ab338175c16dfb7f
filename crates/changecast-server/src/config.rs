//! Dispatcher and relay configuration.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::error::Error;

/// Default application data directory.
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Default broker directory under the data directory.
pub const DEFAULT_BROKER_DIR: &str = "broker-data";

/// Name of the marker file that disables the dispatcher.
pub const DISABLED_MARKER: &str = "disabled";

/// Default relay ingest address.
pub const DEFAULT_INGEST_ADDRESS: &str = "tcp://0.0.0.0:61616";

/// Default relay fan-out address.
pub const DEFAULT_FANOUT_ADDRESS: &str = "tcp://0.0.0.0:61617";

/// Default maximum message size (4 MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Default send timeout for remote publishing in seconds.
pub const DEFAULT_SEND_TIMEOUT_SECS: u64 = 5;

/// Where the dispatcher sends and receives messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerUrl {
    /// In-process broker.
    Embedded,
    /// A `changecast-broker` relay.
    Remote {
        /// Relay ingest address, dialed by publishers.
        publish: String,
        /// Relay fan-out address, dialed by subscribers.
        subscribe: String,
    },
}

impl BrokerUrl {
    /// Resolve a configured external address.
    ///
    /// `None` or a blank address selects the embedded broker. A bare
    /// `host:port` is read as `tcp://host:port`. Without an explicit fan-out
    /// address, the relay is expected to fan out on the ingest port + 1.
    pub fn resolve(external: Option<&str>, fanout: Option<&str>) -> Result<Self, Error> {
        let external = match external.map(str::trim) {
            Some(url) if !url.is_empty() => url,
            _ => return Ok(BrokerUrl::Embedded),
        };

        let publish = normalize(external);
        let subscribe = match fanout.map(str::trim) {
            Some(url) if !url.is_empty() => normalize(url),
            _ => next_port(&publish)?,
        };

        Ok(BrokerUrl::Remote { publish, subscribe })
    }

    /// Check if this is the embedded broker.
    pub fn is_embedded(&self) -> bool {
        matches!(self, BrokerUrl::Embedded)
    }
}

impl fmt::Display for BrokerUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerUrl::Embedded => write!(f, "embedded"),
            BrokerUrl::Remote { publish, subscribe } => write!(f, "{} -> {}", publish, subscribe),
        }
    }
}

fn normalize(url: &str) -> String {
    if url.contains("://") {
        url.to_string()
    } else {
        format!("tcp://{}", url)
    }
}

fn next_port(url: &str) -> Result<String, Error> {
    let (head, port) = url
        .rsplit_once(':')
        .ok_or_else(|| Error::Config(format!("no port in broker address {}", url)))?;

    let port: u16 = port
        .parse()
        .map_err(|_| Error::Config(format!("cannot derive fan-out address from {}", url)))?;
    let next = port
        .checked_add(1)
        .ok_or_else(|| Error::Config(format!("no port above {} for fan-out", port)))?;

    Ok(format!("{}:{}", head, next))
}

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Application data directory.
    pub data_dir: PathBuf,

    /// Broker directory name, relative to `data_dir`.
    pub broker_dir: String,

    /// Remote relay address. `None` selects the embedded broker.
    pub external_url: Option<String>,

    /// Explicit relay fan-out address.
    pub fanout_url: Option<String>,

    /// Maximum message size in bytes for remote frames.
    pub max_message_size: usize,

    /// Remote publish timeout.
    pub send_timeout: Duration,

    /// Worker threads of the embedded broker.
    pub embedded_workers: usize,
}

impl DispatcherConfig {
    /// Create a new configuration rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            broker_dir: DEFAULT_BROKER_DIR.to_string(),
            external_url: None,
            fanout_url: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            send_timeout: Duration::from_secs(DEFAULT_SEND_TIMEOUT_SECS),
            embedded_workers: 2,
        }
    }

    /// Set the broker directory name.
    pub fn with_broker_dir(mut self, dir: impl Into<String>) -> Self {
        self.broker_dir = dir.into();
        self
    }

    /// Use a remote relay.
    pub fn with_external_url(mut self, url: impl Into<String>) -> Self {
        self.external_url = Some(url.into());
        self
    }

    /// Set the relay fan-out address explicitly.
    pub fn with_fanout_url(mut self, url: impl Into<String>) -> Self {
        self.fanout_url = Some(url.into());
        self
    }

    /// Set the maximum message size.
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the remote publish timeout.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set the embedded broker worker threads.
    pub fn with_embedded_workers(mut self, workers: usize) -> Self {
        self.embedded_workers = workers.max(1);
        self
    }

    /// Broker directory.
    pub fn broker_path(&self) -> PathBuf {
        self.data_dir.join(&self.broker_dir)
    }

    /// Marker file whose presence disables the dispatcher.
    pub fn disabled_marker(&self) -> PathBuf {
        self.broker_path().join(DISABLED_MARKER)
    }

    /// Resolve the broker to connect to.
    pub fn broker_url(&self) -> Result<BrokerUrl, Error> {
        BrokerUrl::resolve(self.external_url.as_deref(), self.fanout_url.as_deref())
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_DIR)
    }
}

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address publishers push to.
    pub ingest_address: String,

    /// Address subscribers dial.
    pub fanout_address: String,

    /// Maximum message size in bytes.
    pub max_message_size: usize,
}

impl RelayConfig {
    /// Create a relay configuration.
    pub fn new(ingest_address: impl Into<String>, fanout_address: impl Into<String>) -> Self {
        Self {
            ingest_address: ingest_address.into(),
            fanout_address: fanout_address.into(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Set the maximum message size.
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::new(DEFAULT_INGEST_ADDRESS, DEFAULT_FANOUT_ADDRESS)
    }
}

/// Command-line arguments for the relay.
#[derive(Parser, Debug)]
#[command(name = "changecast-broker")]
#[command(version, about = "changecast message relay", long_about = None)]
pub struct BrokerArgs {
    /// Address publishers push messages to.
    #[arg(long, default_value = DEFAULT_INGEST_ADDRESS)]
    pub ingest: String,

    /// Address subscribers dial.
    #[arg(long, default_value = DEFAULT_FANOUT_ADDRESS)]
    pub fanout: String,

    /// Maximum message size in megabytes.
    #[arg(long, default_value_t = 4)]
    pub max_message_mb: usize,
}

impl BrokerArgs {
    /// Convert command-line arguments to relay configuration.
    pub fn into_config(self) -> RelayConfig {
        RelayConfig {
            ingest_address: normalize(&self.ingest),
            fanout_address: normalize(&self.fanout),
            max_message_size: self.max_message_mb.max(1) * 1024 * 1024,
        }
    }
}
