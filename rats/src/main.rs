//! Entry point for `rats`.
//!
//! Parses CLI arguments and dispatches into either **serve** or **get** mode.
//! All protocol work is delegated to the library; `main.rs` owns only process
//! setup (logging, signal handling, argument parsing).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};

use rats::config::{CHUNK_SIZE, WINDOW_SIZE};
use rats::server::MAX_SESSIONS;
use rats::simulator::{Simulator, SimulatorConfig};
use rats::socket::{Socket, UdpLink};
use rats::timer::{TimerConfig, MAX_RETRIES, NOT_FOUND_RETRIES};
use rats::{ProtocolConfig, ReceiveOutcome, ReceiveSession, Server, ServerConfig};

/// Reliable file transfer over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Serve files from a directory.
    Serve {
        /// Local address to bind.
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        bind: SocketAddr,
        /// Directory requested paths are resolved against.
        #[arg(short, long, default_value = ".")]
        root: PathBuf,
        /// Maximum concurrent transfers.
        #[arg(long, default_value_t = MAX_SESSIONS)]
        max_sessions: usize,
        #[command(flatten)]
        tuning: Tuning,
    },
    /// Download one file from a server.
    Get {
        /// Remote server address (e.g. 127.0.0.1:9000).
        #[arg(short, long)]
        server: String,
        /// Path of the file on the server.
        path: String,
        /// Local file to write (defaults to the remote file name).
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Local address to bind.
        #[arg(short, long, default_value = "0.0.0.0:0")]
        bind: SocketAddr,
        #[command(flatten)]
        tuning: Tuning,
    },
}

/// Protocol and fault-injection knobs shared by both modes.
#[derive(Args)]
struct Tuning {
    /// Packets in flight per window.
    #[arg(long, default_value_t = WINDOW_SIZE)]
    window: u32,
    /// Bytes of file data per packet.
    #[arg(long, default_value_t = CHUNK_SIZE)]
    chunk_size: usize,
    /// Wait for ACKs, data batches and closing handshakes.
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,
    /// Wait for the first response to a request.
    #[arg(long, default_value_t = 2000)]
    request_timeout_ms: u64,
    /// Wait for further datagrams within a receive batch.
    #[arg(long, default_value_t = 200)]
    linger_ms: u64,
    /// Consecutive timeouts tolerated before giving up.
    #[arg(long, default_value_t = MAX_RETRIES)]
    max_retries: u32,
    /// Probability of dropping an outbound datagram.
    #[arg(long, default_value_t = 0.0)]
    drop_rate: f64,
    /// Probability of flipping a bit in an outbound datagram.
    #[arg(long, default_value_t = 0.0)]
    corrupt_rate: f64,
    /// Probability of sending an outbound datagram twice.
    #[arg(long, default_value_t = 0.0)]
    duplicate_rate: f64,
    /// Seed for reproducible fault injection.
    #[arg(long)]
    seed: Option<u64>,
}

impl Tuning {
    fn protocol(&self) -> ProtocolConfig {
        ProtocolConfig {
            window_size: self.window,
            chunk_size: self.chunk_size,
            timer: TimerConfig {
                request_timeout: Duration::from_millis(self.request_timeout_ms),
                exchange_timeout: Duration::from_millis(self.timeout_ms),
                batch_linger: Duration::from_millis(self.linger_ms),
                max_retries: self.max_retries,
                not_found_retries: NOT_FOUND_RETRIES,
            },
        }
    }

    fn simulator(&self) -> SimulatorConfig {
        SimulatorConfig {
            loss_rate: self.drop_rate,
            corrupt_rate: self.corrupt_rate,
            duplicate_rate: self.duplicate_rate,
            seed: self.seed,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG controls verbosity; progress is shown at info by default.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Serve {
            bind,
            root,
            max_sessions,
            tuning,
        } => {
            let config = ServerConfig {
                bind,
                root,
                max_sessions,
                protocol: tuning.protocol(),
                simulator: tuning.simulator(),
            };
            let server = Server::bind(config).await.context("starting server")?;
            server
                .run_until(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        log::error!("cannot listen for Ctrl-C: {e}");
                        std::future::pending::<()>().await;
                    }
                })
                .await?;
        }
        Mode::Get {
            server,
            path,
            output,
            bind,
            tuning,
        } => {
            let peer = tokio::net::lookup_host(&server)
                .await
                .with_context(|| format!("resolving {server}"))?
                .next()
                .with_context(|| format!("{server} resolved to no address"))?;
            let output = output.unwrap_or_else(|| rats::store::default_output(&path));

            let socket = Socket::bind(bind).await.context("binding client socket")?;
            let link = Simulator::new(UdpLink::new(socket, peer), tuning.simulator())?;
            let mut session = ReceiveSession::new(link, tuning.protocol());

            log::info!("requesting {path:?} from {peer}");
            match session.fetch(&path, &output).await? {
                ReceiveOutcome::Complete { chunks, bytes } => {
                    log::info!(
                        "saved {bytes} bytes ({chunks} chunks) to {}",
                        output.display()
                    );
                }
                ReceiveOutcome::NotFound => bail!("server has no file {path:?}"),
            }
        }
    }
    Ok(())
}
