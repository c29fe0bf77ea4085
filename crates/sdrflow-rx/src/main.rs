//! sdrflow-rx - headless multi-channel AM receiver
//!
//! Wires one source, any number of channels and the shared audio output
//! from a YAML config (see `sdrflow_core::config`) plus command line
//! overrides, then prints engine reports until the stream ends, the
//! duration elapses or Ctrl+C is pressed.
//!
//! ```text
//! sdrflow-rx --wav airband.wav --center-frequency 124000000 --channel -25000 --channel 50000
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;

use sdrflow_core::config::{self, ChannelConfig, RxConfig, CONFIG_FILE_NAME};
use sdrflow_core::engine::{DspContext, EngineState};
use sdrflow_core::message::Report;
use sdrflow_core::sink::WavRecorder;
use sdrflow_core::source::{create_source, SourceConfig};

#[derive(Parser, Debug)]
#[command(name = "sdrflow-rx", version, about = "Multi-channel AM receiver", long_about = None)]
struct Args {
    /// Configuration file (default: the per-user sdrflow config)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Play a stereo 16-bit I/Q WAV file instead of the configured source
    #[arg(long, conflicts_with = "tone")]
    wav: Option<PathBuf>,

    /// Restart the WAV file at its end
    #[arg(long = "loop", requires = "wav")]
    looping: bool,

    /// Use a synthetic tone at this offset in Hz instead of the configured source
    #[arg(long, allow_hyphen_values = true)]
    tone: Option<f64>,

    /// Sample rate of the synthetic tone
    #[arg(long, default_value_t = 240_000)]
    tone_rate: u32,

    /// Center frequency reported for the source in Hz
    #[arg(short = 'f', long)]
    center_frequency: Option<u64>,

    /// Add an AM channel at this offset in Hz (repeatable)
    #[arg(long = "channel", allow_hyphen_values = true)]
    channels: Vec<i64>,

    /// Record the raw source stream to this WAV file
    #[arg(long)]
    record: Option<PathBuf>,

    /// Stop after this many seconds
    #[arg(short, long)]
    duration: Option<f64>,

    /// Write the effective configuration to the config path and exit
    #[arg(long)]
    save_config: bool,
}

fn main() -> Result<()> {
    // RUST_LOG=debug for per-configuration details
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config::default_config_path(CONFIG_FILE_NAME));
    let mut rx: RxConfig = if args.config.is_some() {
        config::try_load_config(&config_path)?
    } else {
        config::load_config(&config_path)
    };
    apply_overrides(&mut rx, &args);
    rx.validate().context("Invalid receiver configuration")?;

    if args.save_config {
        config::save_config(&rx, &config_path)?;
        println!("Configuration written to {}", config_path.display());
        return Ok(());
    }

    run(&rx, &args)
}

fn apply_overrides(rx: &mut RxConfig, args: &Args) {
    if let Some(path) = &args.wav {
        rx.source = SourceConfig::Wav {
            path: path.clone(),
            center_frequency: args.center_frequency.unwrap_or(0),
            looping: args.looping,
            paced: true,
        };
    } else if let Some(frequency) = args.tone {
        rx.source = SourceConfig::Tone {
            sample_rate: args.tone_rate,
            center_frequency: args.center_frequency.unwrap_or(0),
            frequency,
            amplitude: 0.5,
            paced: true,
            limit: None,
        };
    } else if let Some(f) = args.center_frequency {
        match &mut rx.source {
            SourceConfig::Tone { center_frequency, .. } | SourceConfig::Wav { center_frequency, .. } => {
                *center_frequency = f
            }
        }
    }

    let first = rx.channels.len();
    rx.channels.extend(
        args.channels
            .iter()
            .enumerate()
            .map(|(i, offset)| ChannelConfig::new(format!("ch{}", first + i), *offset)),
    );
}

fn run(rx: &RxConfig, args: &Args) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst)).context("Failed to set Ctrl+C handler")?;

    let mut ctx = DspContext::from_config(&rx.audio);
    let index = ctx.add_engine()?;
    let uid = {
        let engine = ctx.engine(index).context("engine vanished")?;
        engine.set_source(create_source(&rx.source, rx.engine.buffer_len))?;
        engine.configure_corrections(rx.engine.dc_offset, rx.engine.iq_imbalance);
        if let Some(path) = &args.record {
            engine.add_sink(WavRecorder::new("recorder", path))?;
        }
        engine.uid()
    };

    let mut channels = Vec::with_capacity(rx.channels.len());
    for channel in &rx.channels {
        channels.push(
            ctx.attach_channel(uid, channel)
                .with_context(|| format!("Failed to attach channel {}", channel.name))?,
        );
    }
    if channels.is_empty() {
        log::warn!("No channels configured, audio output stays closed");
    }

    let engine = ctx.engine(index).context("engine vanished")?;
    if let Some(description) = engine.source_description() {
        println!("Source: {}", description);
    }
    if !engine.init_acquisition() || !engine.start_acquisition() {
        bail!("Failed to start acquisition: {}", engine.error_message());
    }

    let deadline = args
        .duration
        .map(|secs| Instant::now() + Duration::from_secs_f64(secs.max(0.0)));
    let reports = engine.output_message_queue();
    while running.load(Ordering::SeqCst) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            log::info!("Duration elapsed");
            break;
        }
        let Some(envelope) = reports.pop_timeout(Duration::from_millis(100)) else {
            continue;
        };
        println!("[{:>6}] {}", envelope.seq, describe(&envelope.payload));
        if let Report::StateChanged {
            state: EngineState::Idle | EngineState::Error,
            ..
        } = envelope.payload
        {
            break;
        }
    }

    engine.stop_acquisition();
    for envelope in reports.drain() {
        println!("[{:>6}] {}", envelope.seq, describe(&envelope.payload));
    }
    for channel in channels {
        ctx.detach_channel(channel)?;
    }
    ctx.shutdown();
    Ok(())
}

fn describe(report: &Report) -> String {
    match report {
        Report::StateChanged { engine, state } => format!("engine {} is {}", engine, state),
        Report::Acquisition { engine, running } => {
            format!("engine {} acquisition {}", engine, if *running { "started" } else { "stopped" })
        }
        Report::StreamData {
            engine,
            sample_rate,
            center_frequency,
            start_timestamp,
        } => format!(
            "engine {} streaming {}S/s at {}Hz since {}",
            engine,
            sample_rate,
            center_frequency,
            start_timestamp.to_rfc3339()
        ),
        Report::ChannelConfigured {
            sink,
            center_offset,
            output_rate,
            decimation,
        } => format!(
            "channel {} at {:+}Hz, {}S/s (decimation {})",
            sink, center_offset, output_rate, decimation
        ),
        Report::Error { engine, kind, message } => format!("engine {} {} error: {}", engine, kind, message),
        Report::SinkError { sink, kind, message } => format!("sink {} {} error: {}", sink, kind, message),
    }
}
