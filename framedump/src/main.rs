// SPDX-FileCopyrightText: 2023 Jade Lovelace
//
// SPDX-License-Identifier: MPL-2.0

//! The framedump CLI: captures link-layer frames into a pcap file.
use clap::{CommandFactory, Parser};
use tracing::metadata::LevelFilter;

use std::{path::PathBuf, process::ExitCode};

use link_capture::{config::DEFAULT_SNAPLEN, CaptureConfig, InterfaceSelector};
use tracing_subscriber::prelude::*;

mod output;

type Error = Box<dyn std::error::Error + Send + Sync>;

/// Captures raw frames from a network interface into a pcap file.
#[derive(clap::Parser, Debug)]
#[command(disable_help_flag = true)]
struct Args {
    /// Interface to read packets from, or "any" for all of them.
    #[arg(short = 'i', long, default_value = "any")]
    interface: String,

    /// Path to output file in pcap format. Defaults to a new directory in the
    /// system temp dir.
    #[arg(short = 'o', long = "out")]
    out: Option<PathBuf>,

    /// Max packet length.
    #[arg(
        long = "len",
        default_value_t = DEFAULT_SNAPLEN as u64,
        value_parser = clap::value_parser!(u64).range(1..),
    )]
    len: u64,

    /// Compress output with gzip compression.
    #[arg(long)]
    gzip: bool,

    /// Print usage.
    #[arg(short = 'h', long = "help")]
    help: bool,
}

#[cfg(target_os = "linux")]
async fn do_capture(config: CaptureConfig, out: Option<PathBuf>, gzip: bool) -> Result<(), Error> {
    use link_capture::Capture;
    use tokio::signal::unix::{signal, SignalKind};

    // before anything else, so that an early ^C is not lost
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    let out = match out {
        Some(out) => out,
        None => {
            let out = output::default_output_path(gzip)?;
            tracing::info!("Saving capture to: {}", out.display());
            out
        }
    };
    let sink = output::OutputSink::create(&out, gzip)
        .map_err(|e| format!("creating {}: {e}", out.display()))?;

    let capture = Capture::start(&config)?;

    let stop = capture.stop_handle();
    tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
        }
        tracing::info!("Stopping...");
        stop.stop();
    });

    let (sink, summary) = capture.run(sink).await?;
    sink.finish()
        .map_err(|e| format!("finishing {}: {e}", out.display()))?;

    tracing::info!("Wrote {summary} to {}", out.display());
    Ok(())
}

#[cfg(not(target_os = "linux"))]
async fn do_capture(
    _config: CaptureConfig,
    _out: Option<PathBuf>,
    _gzip: bool,
) -> Result<(), Error> {
    Err("capture is only supported on Linux".into())
}

fn main() -> Result<ExitCode, Error> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::Layer::new().without_time())
        .with(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();

    if args.help {
        eprintln!("{}", Args::command().render_help());
        return Ok(ExitCode::FAILURE);
    }

    let config = CaptureConfig::new(
        InterfaceSelector::from(args.interface.as_str()),
        usize::try_from(args.len)?,
    )?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(do_capture(config, args.out, args.gzip))?;
    Ok(ExitCode::SUCCESS)
}
