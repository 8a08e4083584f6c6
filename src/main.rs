// src/main.rs
//! GPS Relay - publish GPGLL fixes from a serial GPS receiver

use clap::Parser;
use gps_relay::{
    config::RelayConfig,
    display::terminal::TerminalDisplay,
    source::{self, FileLineSource, StdinLineSource},
    ConsoleSink, FixSink, LineSource, Pipeline, SerialLineSource, TcpPublisher,
};
use log::{error, info};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Config file (default: ~/.config/gps-relay/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial device to try; repeat to give fallbacks in order
    #[arg(short = 'd', long = "device")]
    devices: Vec<String>,

    /// Serial baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Address subscribers connect to (e.g. 0.0.0.0:11205)
    #[arg(long)]
    bind: Option<String>,

    /// Replay sentences from a file ("-" for stdin) instead of a serial port
    #[arg(long)]
    input: Option<PathBuf>,

    /// Print fixes on stdout instead of publishing them
    #[arg(long, conflicts_with = "display")]
    stdout: bool,

    /// Show a live status screen
    #[arg(long)]
    display: bool,

    /// Consecutive read errors before giving up (0 = never)
    #[arg(long)]
    max_read_errors: Option<u32>,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Store the effective settings in the config file
    #[arg(long)]
    save_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Keep the status screen readable
    let default_level = if args.display { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    if args.list_ports {
        source::list_serial_ports()?;
        return Ok(());
    }

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => RelayConfig::get_config_path()?,
    };
    let mut config = RelayConfig::load_from(&config_path)?;

    let baud = args.baud.unwrap_or(config.serial_baudrate);
    config.update_serial(args.devices.clone(), baud);
    if let Some(bind) = &args.bind {
        config.update_publish(bind.clone());
    }
    if let Some(max) = args.max_read_errors {
        config.max_read_errors = max;
    }
    // Only check what the chosen source and sink will use
    if args.input.is_none() {
        config.validate_serial()?;
    }
    if !args.stdout {
        config.validate_publish()?;
    }

    if args.save_config {
        config.save_to(&config_path)?;
        info!("Saved configuration to {}", config_path.display());
    }

    let source: Box<dyn LineSource> = match &args.input {
        Some(path) if path.as_os_str() == "-" => Box::new(StdinLineSource::stdin()),
        Some(path) => Box::new(FileLineSource::open_file(path).await?),
        None => Box::new(SerialLineSource::open(
            &config.serial_devices,
            config.serial_baudrate,
            config.read_timeout(),
        )?),
    };

    let sink: Box<dyn FixSink> = if args.stdout {
        Box::new(ConsoleSink::new())
    } else {
        Box::new(TcpPublisher::bind(&config.publish_bind).await?)
    };

    let mut pipeline = Pipeline::new(source, sink).with_max_read_errors(config.max_read_errors);

    let running = Arc::new(AtomicBool::new(true));
    let display_task = if args.display {
        let (tx, rx) = mpsc::unbounded_channel();
        pipeline = pipeline.with_events(tx);
        let running = Arc::clone(&running);
        Some(tokio::spawn(async move { TerminalDisplay::new().run(rx, running).await }))
    } else {
        None
    };

    let result = tokio::select! {
        result = pipeline.run() => result.map(Some),
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            Ok(None)
        }
    };

    running.store(false, Ordering::Relaxed);
    // Closes the event channel so the display stops
    drop(pipeline);

    if let Some(task) = display_task {
        match task.await {
            Ok(Err(e)) => error!("Display error: {}", e),
            Err(e) => error!("Display task failed: {}", e),
            Ok(Ok(())) => {}
        }
    }

    match result {
        Ok(Some(stats)) => info!("Finished: {}", stats),
        Ok(None) => {}
        Err(e) => return Err(anyhow::Error::new(e).context("ingest stopped")),
    }

    Ok(())
}
