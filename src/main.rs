use anyhow::{Context, Result};
use clap::Parser;
use etherparse::Ipv4HeaderSlice;
use std::net::Ipv4Addr;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tunwire::config::{DEFAULT_MTU, DEFAULT_PREFIX, DIAGNOSTIC_ROUTE};
use tunwire::{Channel, Config, OpenError, Route};

/// Exit code used when the interface subsystem is unusable
const EXIT_FATAL: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "tunwire")]
#[command(about = "Open a tun interface, dump what arrives, close it cleanly", long_about = None)]
struct Cli {
    /// Interface name; empty lets the kernel choose
    #[arg(long, default_value = "tun0")]
    name: String,

    /// Local address assigned to the interface
    #[arg(long, default_value = "10.0.0.2")]
    address: Ipv4Addr,

    /// Peer address; the stop marker is sent here
    #[arg(long, default_value = "10.0.0.1")]
    gateway: Ipv4Addr,

    /// Prefix length of the interface address
    #[arg(long, default_value_t = DEFAULT_PREFIX)]
    prefix: u8,

    #[arg(long, default_value_t = DEFAULT_MTU)]
    mtu: u32,

    /// Diagnostic host route installed via the gateway
    #[arg(long, default_value_t = DIAGNOSTIC_ROUTE)]
    route: Route,

    /// Skip the diagnostic route
    #[arg(long)]
    no_route: bool,

    /// Wrap an already configured tun descriptor instead of creating one
    #[arg(long)]
    fd: Option<RawFd>,

    /// Close after this many seconds (default: on Enter)
    #[arg(long)]
    seconds: Option<u64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let channel = match open(&cli) {
        Ok(channel) => Arc::new(channel),
        Err(OpenError::Fatal(e)) => {
            tracing::error!(error = %e, "virtual networking unusable, exiting");
            std::process::exit(EXIT_FATAL);
        }
        Err(OpenError::Channel(e)) => return Err(e).context("failed to open channel"),
    };
    println!("Listening on {} …", channel.name().unwrap_or("?"));

    let reader = Arc::clone(&channel);
    let handle = thread::spawn(move || -> Result<u64> {
        let mut buf = [0u8; 1504]; // MTU + 4 bytes for headroom
        let mut frames = 0;
        loop {
            let n = match reader.read(&mut buf) {
                Ok(n) => n,
                Err(e) if e.is_terminal() => return Ok(frames),
                Err(e) => return Err(e.into()),
            };
            frames += 1;
            match Ipv4HeaderSlice::from_slice(&buf[..n]) {
                Ok(ip) => println!(
                    "📡 {} → {} proto={} len={}",
                    ip.source_addr(),
                    ip.destination_addr(),
                    ip.protocol().0,
                    n
                ),
                Err(_) => println!("📡 non-IPv4 frame len={}", n),
            }
        }
    });

    wait_for_shutdown(cli.seconds);
    channel.close().context("failed to release tunnel device")?;

    let frames = handle
        .join()
        .map_err(|_| anyhow::anyhow!("reader thread panicked"))??;
    println!("🔚 Closed after {} frames", frames);
    Ok(())
}

fn open(cli: &Cli) -> Result<Channel, OpenError> {
    if let Some(fd) = cli.fd {
        // the descriptor is ours from here on
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        return Ok(Channel::from_fd(fd, &cli.name, cli.address, cli.gateway)?);
    }

    let config = Config::new(&cli.name, cli.address, cli.gateway)
        .prefix(cli.prefix)
        .mtu(cli.mtu)
        .diagnostic_route((!cli.no_route).then_some(cli.route));
    Channel::open(&config)
}

fn wait_for_shutdown(seconds: Option<u64>) {
    match seconds {
        Some(secs) => thread::sleep(Duration::from_secs(secs)),
        None => {
            let (tx, rx) = mpsc::channel();
            thread::spawn(move || {
                let mut line = String::new();
                let _ = std::io::stdin().read_line(&mut line);
                let _ = tx.send(());
            });
            println!("Press Enter to close");
            let _ = rx.recv();
        }
    }
}
