use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use locus_broker::{validate_topic, DEFAULT_QUERY_TOPIC, DEFAULT_REPLY_TOPIC};
use locus_cluster::LocateConfig;

use crate::error::{ServerError, ServerResult};

/// Which role a node plays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeMode {
    #[default]
    Gateway,
    Provider,
    Broker,
}

impl FromStr for NodeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gateway" => Ok(Self::Gateway),
            "provider" => Ok(Self::Provider),
            "broker" => Ok(Self::Broker),
            other => Err(format!("unknown mode {other:?}, expected gateway, provider or broker")),
        }
    }
}

impl fmt::Display for NodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Gateway => "gateway",
            Self::Provider => "provider",
            Self::Broker => "broker",
        })
    }
}

/// How the gateway finds the provider for a read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadPath {
    /// Broadcast a location query and wait for the holder to answer.
    #[default]
    Discover,
    /// Read from a randomly placed provider without asking. Only correct with
    /// a single provider.
    Direct,
}

impl FromStr for ReadPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "discover" => Ok(Self::Discover),
            "direct" => Ok(Self::Direct),
            other => Err(format!("unknown read path {other:?}, expected discover or direct")),
        }
    }
}

/// Node configuration, loaded from TOML and overridden from the command line.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub mode: NodeMode,
    pub listen_addr: SocketAddr,
    /// Provider storage root; objects live under `<root>/objects/`.
    pub storage_root: PathBuf,
    /// Provider addresses known to a gateway.
    pub peers: Vec<String>,
    /// Address a provider publishes in location replies. Defaults to the
    /// bound listen address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advertise_addr: Option<String>,
    /// Base URL of a broker node. Without one the node uses an in-process
    /// broker, which only reaches nodes in the same process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broker: Option<String>,
    pub query_topic: String,
    pub reply_topic: String,
    pub locate_timeout_ms: u64,
    pub read_path: ReadPath,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            mode: NodeMode::default(),
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8030)),
            storage_root: PathBuf::from("/data"),
            peers: Vec::new(),
            advertise_addr: None,
            broker: None,
            query_topic: DEFAULT_QUERY_TOPIC.into(),
            reply_topic: DEFAULT_REPLY_TOPIC.into(),
            locate_timeout_ms: 5_000,
            read_path: ReadPath::default(),
        }
    }
}

impl NodeConfig {
    pub fn from_toml_str(s: &str) -> ServerResult<Self> {
        toml::from_str(s).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Reject settings no node could run with.
    pub fn validate(&self) -> ServerResult<()> {
        validate_topic(&self.query_topic).map_err(|e| ServerError::Config(e.to_string()))?;
        validate_topic(&self.reply_topic).map_err(|e| ServerError::Config(e.to_string()))?;
        if self.query_topic == self.reply_topic {
            return Err(ServerError::Config("query and reply topics must differ".into()));
        }
        if self.locate_timeout_ms == 0 {
            return Err(ServerError::Config("locate_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn locate_timeout(&self) -> Duration {
        Duration::from_millis(self.locate_timeout_ms)
    }

    pub fn locate_config(&self) -> LocateConfig {
        LocateConfig {
            query_topic: self.query_topic.clone(),
            reply_topic: self.reply_topic.clone(),
            timeout: self.locate_timeout(),
            ..LocateConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = NodeConfig::default();
        assert_eq!(c.mode, NodeMode::Gateway);
        assert_eq!(c.listen_addr, "0.0.0.0:8030".parse::<SocketAddr>().unwrap());
        assert_eq!(c.storage_root, PathBuf::from("/data"));
        assert_eq!(c.locate_timeout(), Duration::from_secs(5));
        assert_eq!(c.read_path, ReadPath::Discover);
        assert!(c.broker.is_none());
        c.validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = NodeConfig::from_toml_str(
            r#"
            mode = "provider"
            storage_root = "/srv/locus"
            broker = "http://broker:8040"
            "#,
        )
        .unwrap();
        assert_eq!(c.mode, NodeMode::Provider);
        assert_eq!(c.storage_root, PathBuf::from("/srv/locus"));
        assert_eq!(c.broker.as_deref(), Some("http://broker:8040"));
        assert_eq!(c.query_topic, DEFAULT_QUERY_TOPIC);
    }

    #[test]
    fn gateway_toml() {
        let c = NodeConfig::from_toml_str(
            r#"
            listen_addr = "127.0.0.1:9000"
            peers = ["10.0.0.1:8030", "10.0.0.2:8030"]
            locate_timeout_ms = 1500
            read_path = "direct"
            "#,
        )
        .unwrap();
        assert_eq!(c.peers.len(), 2);
        assert_eq!(c.locate_config().timeout, Duration::from_millis(1500));
        assert_eq!(c.read_path, ReadPath::Direct);
    }

    #[test]
    fn serialised_config_reads_back() {
        let mut c = NodeConfig::default();
        c.peers = vec!["a:1".into()];
        let text = toml::to_string_pretty(&c).unwrap();
        let back = NodeConfig::from_toml_str(&text).unwrap();
        assert_eq!(back.peers, c.peers);
        assert!(back.broker.is_none());
    }

    #[test]
    fn bad_toml_is_config_error() {
        assert!(matches!(NodeConfig::from_toml_str("mode = \"oracle\""), Err(ServerError::Config(_))));
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(&path, "mode = \"broker\"\n").unwrap();
        assert_eq!(NodeConfig::from_file(&path).unwrap().mode, NodeMode::Broker);
        assert!(NodeConfig::from_file(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn validation() {
        let mut c = NodeConfig::default();
        c.reply_topic = c.query_topic.clone();
        assert!(c.validate().is_err());

        let mut c = NodeConfig::default();
        c.query_topic = "bad topic".into();
        assert!(c.validate().is_err());

        let mut c = NodeConfig::default();
        c.locate_timeout_ms = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn modes_parse_case_insensitively() {
        assert_eq!("Provider".parse::<NodeMode>().unwrap(), NodeMode::Provider);
        assert_eq!("direct".parse::<ReadPath>().unwrap(), ReadPath::Direct);
        assert!("edge".parse::<NodeMode>().is_err());
        assert_eq!(NodeMode::Broker.to_string(), "broker");
    }
}
