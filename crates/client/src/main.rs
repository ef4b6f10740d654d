use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;

use goldsrc::{
    Client, ClientConfig, ClientEvent, DEFAULT_PORT, DirectoryAssets, NoHooks, UdpTransport,
};

const POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "Headless GoldSrc protocol client")]
struct Args {
    #[arg(help = "Server address to connect to (e.g., 127.0.0.1:27015)")]
    server: String,

    #[arg(short, long, help = "Player name")]
    name: Option<String>,

    #[arg(long, help = "Connect as a spectating relay")]
    hltv: bool,

    #[arg(short, long, default_value = ".", help = "Directory holding game assets")]
    assets: PathBuf,

    #[arg(short, long, help = "TOML file with client settings")]
    config: Option<PathBuf>,

    #[arg(long, default_value = "0.0.0.0:0", help = "Local address to bind")]
    bind: String,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let server = resolve(&args.server)?;

    let mut transport = UdpTransport::bind(&args.bind)?;
    log::info!("Bound to {}", transport.local_addr());

    let mut client = Client::new(
        config,
        Box::new(NoHooks),
        Box::new(DirectoryAssets::new(&args.assets)),
    );
    client.connect(server, Instant::now())?;

    loop {
        let now = Instant::now();

        for (from, data) in transport.poll()? {
            client.receive(from, &data, now);
        }

        client.update(now);
        client.flush(&mut transport)?;

        for event in client.drain_events() {
            if !report(event) {
                let stats = transport.stats();
                log::info!(
                    "Sent {} packets ({} bytes), received {} packets ({} bytes)",
                    stats.packets_sent,
                    stats.bytes_sent,
                    stats.packets_received,
                    stats.bytes_received
                );
                return Ok(());
            }
        }

        std::thread::sleep(POLL_INTERVAL);
    }
}

fn load_config(args: &Args) -> anyhow::Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None if args.hltv => ClientConfig::hltv(),
        None => ClientConfig::default(),
    };

    if args.hltv && !config.hltv {
        let preset = ClientConfig::hltv();
        config.hltv = true;
        config.user_info.extend(preset.user_info);
        config.prot_info.extend(preset.prot_info);
    }

    if let Some(name) = &args.name {
        config.set_user_info("name", name.as_str());
    }

    Ok(config)
}

fn resolve(server: &str) -> anyhow::Result<SocketAddr> {
    let target = if server.contains(':') {
        server.to_string()
    } else {
        format!("{}:{}", server, DEFAULT_PORT)
    };

    target
        .to_socket_addrs()?
        .next()
        .with_context(|| format!("no address for {}", server))
}

/// Logs `event`. Returns `false` once the session is over.
fn report(event: ClientEvent) -> bool {
    match event {
        ClientEvent::Disconnected { reason } => {
            log::info!("Disconnected: {}", reason);
            return false;
        }
        ClientEvent::GameInitialized => log::info!("Loading level"),
        ClientEvent::GameStarted => log::info!("Spawned"),
        ClientEvent::Print { text } => println!("{}", text.trim_end()),
        ClientEvent::CenterPrint { text } => println!("[center] {}", text.trim_end()),
        ClientEvent::FileReceived { name, size } => {
            log::info!("Downloaded {} ({} bytes)", name, size)
        }
        ClientEvent::FileTransferFailed { name } => log::warn!("Download failed: {}", name),
        ClientEvent::GameMessage { name, data } => {
            log::trace!("Game message {} ({} bytes)", name, data.len())
        }
        other => log::trace!("{:?}", other),
    }
    true
}
