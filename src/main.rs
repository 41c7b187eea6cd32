//! TCP bridge binary: runs the controller against the simulated board
//! and serves the text protocol to one peer at a time over a
//! newline-delimited socket.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use pinhost::config::{self, HostConfig};
use pinhost::controller::Controller;
use pinhost::sim::{RamNvMem, SimBoard, SystemClock};
use pinhost::store::IMAGE_LEN;
use pinhost::transport::{ChannelConnection, ChannelRemote, Connection, TransportKind};

#[derive(Parser, Debug)]
#[command(name = "pinhost", about = "Remote GPIO / counter-timer command host")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, default_value = "pinhost.toml")]
    config: PathBuf,

    /// Override the listen address from the config file
    #[arg(short, long)]
    listen: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    tracing::info!("starting pinhost {}", pinhost::controller::VERSION);

    let config: HostConfig = if cli.config.exists() {
        config::load_config(&cli.config).map_err(|err| {
            tracing::error!("failed to load config from '{}': {err}", cli.config.display());
            Box::new(err) as Box<dyn std::error::Error + Send + Sync + 'static>
        })?
    } else {
        tracing::warn!(
            "config file '{}' not found, using built-in defaults",
            cli.config.display()
        );
        HostConfig::default()
    };

    let listen = cli.listen.unwrap_or_else(|| config.host.listen.clone());
    tracing::info!(
        "board: {} pins, interrupts on {:?}",
        config.board.pin_count,
        config.board.interrupt_pins
    );

    let board = Arc::new(SimBoard::new(config.board.pin_count).with_noise(config.board.analog_noise));
    let clock = Arc::new(SystemClock::new());
    let mem: Arc<RamNvMem> = match &config.host.nvmem_image {
        Some(path) => {
            tracing::info!("nvmem image: {path}");
            Arc::new(RamNvMem::with_image(path, IMAGE_LEN)?)
        }
        None => Arc::new(RamNvMem::new(IMAGE_LEN)),
    };

    let mut controller = Controller::new(&config, board.clone(), board, clock, mem, Vec::new());
    controller.init();
    let (kind, params) = controller.transport_record();
    tracing::info!("transport record: type {} params '{params}'", kind.code());

    let (mut conn, remote) =
        ChannelConnection::endpoints(TransportKind::Ethernet, &listen);
    conn.open();

    let poll_interval = tokio::time::Duration::from_millis(config.host.poll_interval_ms.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            controller.poll(&mut conn);
        }
    });

    serve(&listen, remote).await
}

/// Accept one peer at a time and bridge its lines to the controller
/// channel; replies flow back on the same socket.
async fn serve(
    listen: &str,
    remote: ChannelRemote,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let ChannelRemote { line_tx, mut frame_rx } = remote;
    let listener = TcpListener::bind(listen).await?;
    tracing::info!("listening on {listen}");

    loop {
        let (socket, peer) = listener.accept().await?;
        tracing::info!("peer connected: {peer}");
        let (reader, mut writer) = socket.into_split();
        let mut lines = BufReader::new(reader).lines();
        loop {
            tokio::select! {
                inbound = lines.next_line() => {
                    match inbound {
                        Ok(Some(line)) => {
                            if line_tx.send(line).is_err() {
                                tracing::error!("controller task gone; shutting down");
                                return Ok(());
                            }
                        }
                        Ok(None) => break,
                        Err(err) => {
                            tracing::warn!("read error from {peer}: {err}");
                            break;
                        }
                    }
                }
                frame = frame_rx.recv() => {
                    match frame {
                        Some(frame) => {
                            if writer.write_all(format!("{frame}\n").as_bytes()).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            tracing::error!("controller task gone; shutting down");
                            return Ok(());
                        }
                    }
                }
            }
        }
        tracing::info!("peer disconnected: {peer}");
    }
}
