use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use locus_server::{NodeConfig, NodeMode, ReadPath};
use locus_types::parse_peer_list;

#[derive(Parser)]
#[command(
    name = "locus",
    about = "Locus: distributed object store with broker-based discovery",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a gateway, provider or broker node
    Serve(NodeArgs),
    /// Print the effective node configuration as TOML
    Config(NodeArgs),
    /// Query a running node's status
    Status(StatusArgs),
}

/// Node settings. Flags and environment variables override the config file.
#[derive(Args, Debug, Default)]
pub struct NodeArgs {
    /// TOML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// gateway, provider or broker
    #[arg(long, env = "LOCUS_MODE")]
    pub mode: Option<NodeMode>,
    /// Listen address, `host:port` or `:port`
    #[arg(long, env = "LOCUS_ADDR", value_parser = parse_listen_addr)]
    pub listen: Option<SocketAddr>,
    /// Provider storage root
    #[arg(long, env = "LOCUS_STORAGE")]
    pub storage: Option<PathBuf>,
    /// Comma-separated provider addresses (gateway)
    #[arg(long, env = "LOCUS_PEERS")]
    pub peers: Option<String>,
    /// Broker node base URL
    #[arg(long, env = "LOCUS_BROKER")]
    pub broker: Option<String>,
    /// Address providers publish in location replies
    #[arg(long)]
    pub advertise: Option<String>,
    /// Location query timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,
    /// discover or direct
    #[arg(long)]
    pub read_path: Option<ReadPath>,
    #[arg(long)]
    pub query_topic: Option<String>,
    #[arg(long)]
    pub reply_topic: Option<String>,
}

impl NodeArgs {
    /// Config file (or defaults) with every given flag applied on top.
    pub fn resolve(&self) -> anyhow::Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::from_file(path)?,
            None => NodeConfig::default(),
        };
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(listen) = self.listen {
            config.listen_addr = listen;
        }
        if let Some(storage) = &self.storage {
            config.storage_root = storage.clone();
        }
        if let Some(peers) = &self.peers {
            config.peers = parse_peer_list(peers);
        }
        if let Some(broker) = &self.broker {
            config.broker = Some(broker.clone());
        }
        if let Some(advertise) = &self.advertise {
            config.advertise_addr = Some(advertise.clone());
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.locate_timeout_ms = timeout_ms;
        }
        if let Some(read_path) = self.read_path {
            config.read_path = read_path;
        }
        if let Some(topic) = &self.query_topic {
            config.query_topic = topic.clone();
        }
        if let Some(topic) = &self.reply_topic {
            config.reply_topic = topic.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Args)]
pub struct StatusArgs {
    /// Node address, `host:port`
    #[arg(default_value = "127.0.0.1:8030")]
    pub addr: String,
}

/// `:8030` listens on every interface.
pub fn parse_listen_addr(s: &str) -> Result<SocketAddr, String> {
    let full = if s.starts_with(':') { format!("0.0.0.0{s}") } else { s.to_string() };
    full.parse().map_err(|e| format!("invalid listen address {s:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("locus").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn serve_flags_override_defaults() {
        let cli = parse(&[
            "serve",
            "--mode",
            "gateway",
            "--listen",
            ":9000",
            "--peers",
            "10.0.0.1:8030, 10.0.0.2:8030",
            "--timeout-ms",
            "1500",
            "--read-path",
            "direct",
        ]);
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.mode, NodeMode::Gateway);
        assert_eq!(config.listen_addr, "0.0.0.0:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.peers, ["10.0.0.1:8030", "10.0.0.2:8030"]);
        assert_eq!(config.locate_timeout_ms, 1500);
        assert_eq!(config.read_path, ReadPath::Direct);
    }

    #[test]
    fn flags_win_over_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(&path, "mode = \"provider\"\nstorage_root = \"/srv/a\"\n").unwrap();

        let cli = parse(&["serve", "--config", path.to_str().unwrap(), "--storage", "/srv/b"]);
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.mode, NodeMode::Provider);
        assert_eq!(config.storage_root, PathBuf::from("/srv/b"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let argv = ["locus", "serve", "--mode", "oracle"];
        assert!(Cli::try_parse_from(argv).is_err());
        assert!(parse_listen_addr("nowhere").is_err());

        let args = NodeArgs {
            timeout_ms: Some(0),
            ..NodeArgs::default()
        };
        assert!(args.resolve().is_err());
    }

    #[test]
    fn status_defaults_to_local_node() {
        let cli = parse(&["status", "--format", "json"]);
        assert!(matches!(cli.format, OutputFormat::Json));
        let Command::Status(args) = cli.command else {
            panic!("expected status");
        };
        assert_eq!(args.addr, "127.0.0.1:8030");
    }
}
