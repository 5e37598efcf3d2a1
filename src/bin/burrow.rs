//! Burrow CLI binary.
//!
//! Connects to an AMQP 0-8 broker and exercises the session.
//!
//! # Commands
//!
//! - `check` - Connect, report the negotiated session, close
//! - `qos` - Connect and set prefetch limits
//! - `heartbeat` - Connect and send heartbeats at an interval

use std::path::PathBuf;
use std::time::Duration;

use burrow::{logging, Config, QosOptions, Session, VERSION};
use clap::{Args, Parser, Subcommand};
use serde_json::json;

#[derive(Parser)]
#[command(name = "burrow")]
#[command(version = VERSION)]
#[command(about = "Burrow - AMQP 0-8 client session", long_about = None)]
struct Cli {
    #[command(flatten)]
    conn: ConnArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConnArgs {
    /// Config file (default: <config dir>/burrow/config.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Broker host
    #[arg(long, global = true)]
    host: Option<String>,

    /// Broker port
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Virtual host
    #[arg(long, global = true)]
    vhost: Option<String>,

    /// Login user (password comes from config or BURROW_PASS)
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Refuse broker redirects
    #[arg(long, global = true)]
    insist: bool,

    /// Log every frame sent and received
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, print the session summary and close
    Check {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Connect and set quality of service on the session channel
    Qos {
        /// Prefetch window in octets (0 = no limit)
        #[arg(long, default_value = "0")]
        prefetch_size: u32,

        /// Prefetch window in messages
        #[arg(long, default_value = "1")]
        prefetch_count: u16,

        /// Apply to the whole connection
        #[arg(long)]
        global: bool,
    },

    /// Connect and send heartbeats
    Heartbeat {
        /// Number of heartbeats
        #[arg(short = 'n', long, default_value = "3")]
        count: u32,

        /// Seconds between heartbeats
        #[arg(short, long, default_value = "1")]
        interval: u64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.conn)?;
    logging::init(&config.logging)?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        match cli.command {
            Commands::Check { json } => cmd_check(config, json).await,
            Commands::Qos {
                prefetch_size,
                prefetch_count,
                global,
            } => {
                let options = QosOptions {
                    prefetch_size,
                    prefetch_count,
                    global,
                };
                cmd_qos(config, options).await
            },
            Commands::Heartbeat { count, interval } => {
                cmd_heartbeat(config, count, Duration::from_secs(interval)).await
            },
        }
    })
}

fn load_config(args: &ConnArgs) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => match Config::default_path().filter(|p| p.exists()) {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        },
    };
    config.apply_env();

    let conn = &mut config.connection;
    if let Some(host) = &args.host {
        conn.host = host.clone();
    }
    if let Some(port) = args.port {
        conn.port = port;
    }
    if let Some(vhost) = &args.vhost {
        conn.vhost = vhost.clone();
    }
    if let Some(user) = &args.user {
        conn.user = user.clone();
    }
    if args.insist {
        conn.insist = true;
    }
    if args.verbose {
        config.logging.enabled = true;
    }

    Ok(config)
}

async fn cmd_check(config: Config, json: bool) -> anyhow::Result<()> {
    let mut session = Session::new(config);
    session.connect().await?;

    let tuning = session.tuning().unwrap_or_default();
    let product = session
        .server_properties()
        .get("product")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    if json {
        let report = json!({
            "session": session.id(),
            "broker": session.endpoint().to_string(),
            "product": product,
            "state": session.state(),
            "ticket": session.ticket(),
            "channel": session.active_channel(),
            "channel_max": tuning.channel_max,
            "frame_max": tuning.frame_max,
            "heartbeat": tuning.heartbeat,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Connected to {} ({product})", session.endpoint());
        println!("  Session:     {}", session.id());
        println!("  Ticket:      {:?}", session.ticket());
        println!("  Channel:     {}", session.active_channel());
        println!("  Channel max: {}", tuning.channel_max);
        println!("  Frame max:   {}", tuning.frame_max);
        println!("  Heartbeat:   {}s", tuning.heartbeat);
    }

    session.close().await?;
    Ok(())
}

async fn cmd_qos(config: Config, options: QosOptions) -> anyhow::Result<()> {
    let mut session = Session::new(config);
    session.connect().await?;

    let confirmation = session.qos(options).await?;
    println!(
        "{confirmation}: prefetch_size={} prefetch_count={} global={}",
        options.prefetch_size, options.prefetch_count, options.global
    );

    session.close().await?;
    Ok(())
}

async fn cmd_heartbeat(config: Config, count: u32, interval: Duration) -> anyhow::Result<()> {
    let mut session = Session::new(config);
    session.connect().await?;

    for n in 1..=count {
        session.heartbeat().await?;
        eprintln!("heartbeat {n}/{count}");
        if n < count {
            tokio::time::sleep(interval).await;
        }
    }

    session.close().await?;
    Ok(())
}
