mod cli;
mod config;
mod progress;
mod serial;

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser};
use satcart_lib::progress::no_op_progress_callback;
use satcart_lib::{Client, SerialLink};
use std::io;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::cli::{Cli, Transfer, merge_config};
use crate::config::SatcartConfig;
use crate::progress::create_progress_callback;
use crate::serial::{check_port_available, normalize_port_name};

fn main() {
    // Log level can be controlled by setting the RUST_LOG environment variable, e.g.:
    // RUST_LOG=debug, RUST_LOG=satcart_lib=trace, RUST_LOG=info
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    let args = Cli::parse();

    if let Err(e) = run(&args) {
        eprintln!("Error: {:?}", e);
        process::exit(1);
    }
}

fn run(args: &Cli) -> Result<()> {
    let config = args
        .config
        .as_deref()
        .map(SatcartConfig::from_file)
        .transpose()?;
    let merged = merge_config(args, config, |key| std::env::var(key).ok())?;
    let transfer = args.transfer()?;
    tracing::debug!("config: {:?}, transfer: {:?}", merged, transfer);

    if transfer.is_none() && !merged.console {
        Cli::command().print_help()?;
        bail!("No command specified");
    }

    let mut link_config = merged.link.clone();
    if let Some(port) = &link_config.port {
        let port = normalize_port_name(port);
        check_port_available(&port)?;
        link_config.port = Some(port);
    }

    let link = SerialLink::open(&link_config).with_context(|| {
        format!(
            "Failed to open cartridge (VID {:04X}, PID {:04X})",
            link_config.vid, link_config.pid
        )
    })?;

    let progress = if merged.quiet {
        no_op_progress_callback()
    } else {
        create_progress_callback()
    };
    // Ctrl-C unwinds through the client so the link is purged on close
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        tracing::warn!("failed to install Ctrl-C handler: {}", e);
    }
    let mut client = Client::new(link)
        .with_progress(progress)
        .with_interrupt(interrupted);

    match transfer {
        Some(Transfer::Download {
            path,
            address,
            size,
        }) => {
            client
                .download_to_file(&path, address, size)
                .with_context(|| format!("Download to {} failed", path.display()))?;
        }
        Some(Transfer::Upload { path, address }) => {
            client
                .upload_file(&path, address)
                .with_context(|| format!("Upload of {} failed", path.display()))?;
        }
        Some(Transfer::Execute { path, address }) => {
            client
                .execute_file(&path, address)
                .with_context(|| format!("Execute of {} failed", path.display()))?;
        }
        None => {}
    }

    if merged.console {
        client
            .console(io::stdout().lock())
            .context("Console closed")?;
    }

    Ok(())
}
