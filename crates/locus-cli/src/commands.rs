use colored::Colorize;
use tracing::info;

use locus_server::{LocusServer, NodeConfig, NodeMode};
use locus_types::{NodeInfo, ServerStatus};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args.resolve()?).await,
        Command::Config(args) => cmd_config(args.resolve()?, cli.format),
        Command::Status(args) => cmd_status(args, cli.format).await,
    }
}

async fn cmd_serve(config: NodeConfig) -> anyhow::Result<()> {
    print_banner(&config);
    let server = LocusServer::new(config);
    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            shutdown.cancel();
        }
    });
    server.serve().await?;
    Ok(())
}

fn print_banner(config: &NodeConfig) {
    println!("{} {} node on {}", "Locus".bold(), config.mode.to_string().cyan(), config.listen_addr.to_string().bold());
    match config.mode {
        NodeMode::Gateway => {
            println!("  providers: {}", config.peers.len().to_string().yellow());
            println!("  read path: {:?}, locate timeout {} ms", config.read_path, config.locate_timeout_ms);
        }
        NodeMode::Provider => println!("  storage:   {}", config.storage_root.display()),
        NodeMode::Broker => {}
    }
    if config.mode != NodeMode::Broker {
        let broker = config.broker.as_deref().unwrap_or("in-process");
        println!("  broker:    {broker} ({} / {})", config.query_topic, config.reply_topic);
    }
}

fn cmd_config(config: NodeConfig, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => print!("{}", toml::to_string_pretty(&config)?),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
    }
    Ok(())
}

async fn cmd_status(args: StatusArgs, format: OutputFormat) -> anyhow::Result<()> {
    let url = if args.addr.starts_with("http://") || args.addr.starts_with("https://") {
        args.addr.clone()
    } else {
        format!("http://{}", args.addr)
    };
    let info: NodeInfo = reqwest::get(&url).await?.error_for_status()?.json().await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&info)?),
        OutputFormat::Text => {
            let status = match info.status {
                ServerStatus::Running => "running".green().bold(),
            };
            println!("{} {} (version {})", args.addr.bold(), status, info.version);
        }
    }
    Ok(())
}
