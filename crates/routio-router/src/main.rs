// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! routio message router daemon.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default socket (/tmp/routio.sock)
//! routio-router
//!
//! # Custom socket, config file, verbose logging
//! routio-router --socket /run/routio.sock --config router.json --log-level debug
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use routio_router::{Router, RouterConfig};

/// routio message router - local-host publish/subscribe over a Unix socket
#[derive(Parser, Debug)]
#[command(name = "routio-router")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Unix socket path to listen on
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Configuration file (JSON format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Soft limit on connected peers
    #[arg(long)]
    max_peers: Option<usize>,

    /// Seconds between statistics summaries in the log
    #[arg(long)]
    stats_interval: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_sig: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

fn install_signal_handlers() {
    // Only an atomic store happens in the handler; the poll loop notices
    // the flag within one timeout.
    let handler = on_signal as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = if let Some(path) = &args.config {
        info!("loading config from {}", path.display());
        RouterConfig::from_file(path)?
    } else {
        RouterConfig::default()
    };
    if let Some(socket) = args.socket {
        config.socket_path = socket;
    }
    if let Some(max_peers) = args.max_peers {
        config.max_peers = max_peers;
    }
    if let Some(stats_interval) = args.stats_interval {
        config.stats_interval_secs = stats_interval;
    }

    info!(
        socket = %config.socket_path.display(),
        max_peers = config.max_peers,
        "starting routio router v{}",
        env!("CARGO_PKG_VERSION")
    );

    let mut router = Router::bind(config)?;

    install_signal_handlers();
    let handle = router.handle();
    std::thread::spawn(move || {
        while !SHUTDOWN.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(50));
        }
        info!("shutdown signal received, draining peers");
        handle.shutdown();
    });

    router.run()?;
    Ok(())
}
