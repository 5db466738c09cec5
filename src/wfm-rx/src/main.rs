// SPDX-FileCopyrightText: 2026 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod config;
mod iq_source;
mod sink;

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};

use wfm_app::{init_logging, ConfigFile};
use wfm_core::{Demodulator, DynResult};

use config::{ResamplerKind, RxConfig};
use iq_source::{IqSource, ReaderIqSource};
use sink::PcmSink;

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - wide-band FM receiver");

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Raw unsigned 8-bit IQ input ("-" for stdin)
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    input: Option<String>,
    /// Raw s16le PCM output ("-" for stdout)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<String>,
    /// IQ sample rate in Hz
    #[arg(short = 's', long = "rate")]
    rate: Option<u32>,
    /// Audio sample rate in Hz
    #[arg(short = 'r', long = "audio-rate")]
    audio_rate: Option<u32>,
    /// Digital gain applied before 16-bit saturation
    #[arg(short = 'g', long = "gain")]
    gain: Option<f32>,
    /// Audio resampling method
    #[arg(long = "resampler", value_enum)]
    resampler: Option<ResamplerKind>,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log-level")]
    log_level: Option<String>,
}

impl Cli {
    /// CLI values take precedence over the file.
    fn apply(&self, cfg: &mut RxConfig) {
        if let Some(ref input) = self.input {
            cfg.input.path = input.clone();
        }
        if let Some(ref output) = self.output {
            cfg.audio.path = output.clone();
        }
        if let Some(rate) = self.rate {
            cfg.input.sample_rate = rate;
        }
        if let Some(audio_rate) = self.audio_rate {
            cfg.audio.sample_rate = audio_rate;
        }
        if let Some(gain) = self.gain {
            cfg.audio.digital_gain = gain;
        }
        if let Some(resampler) = self.resampler {
            cfg.audio.resampler = resampler;
        }
        if let Some(ref level) = self.log_level {
            cfg.general.log_level = Some(level.clone());
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct InputTotals {
    chunks: u64,
    bytes: u64,
}

fn open_input(path: &str) -> DynResult<Box<dyn IqSource>> {
    if path == "-" {
        return Ok(Box::new(ReaderIqSource::new(io::stdin())));
    }
    let file = File::open(path).map_err(|e| format!("Failed to open input {}: {}", path, e))?;
    Ok(Box::new(ReaderIqSource::new(file)))
}

fn open_output(path: &str) -> DynResult<Box<dyn Write + Send>> {
    if path == "-" {
        return Ok(Box::new(io::stdout()));
    }
    let file =
        File::create(path).map_err(|e| format!("Failed to create output {}: {}", path, e))?;
    Ok(Box::new(file))
}

/// Feed `source` to the demodulator in `chunk_bytes` blocks until EOF.
fn pump(
    source: &mut dyn IqSource,
    demod: &Demodulator,
    chunk_bytes: usize,
) -> DynResult<InputTotals> {
    let mut totals = InputTotals::default();
    loop {
        let mut chunk = vec![0u8; chunk_bytes];
        let n = source
            .read_into(&mut chunk)
            .map_err(|e| format!("Failed to read IQ input: {}", e))?;
        if n == 0 {
            break;
        }
        if n < chunk_bytes {
            warn!("short final chunk of {} bytes", n);
            chunk.truncate(n);
        }
        demod.demodulate_owned(chunk)?;
        totals.chunks += 1;
        totals.bytes += n as u64;
    }
    Ok(totals)
}

fn main() -> DynResult<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", RxConfig::example_combined_toml());
        return Ok(());
    }

    let (mut cfg, config_path) = if let Some(ref path) = cli.config {
        let cfg = RxConfig::load_from_file(path)?;
        (cfg, Some(path.clone()))
    } else {
        RxConfig::load_from_default_paths()?
    };
    cli.apply(&mut cfg);
    cfg.validate()
        .map_err(|e| format!("Invalid receiver configuration: {}", e))?;

    init_logging(cfg.general.log_level.as_deref());

    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let mut source = open_input(&cfg.input.path)?;
    let mut sink = PcmSink::new(open_output(&cfg.audio.path)?);
    let counters = sink.counters();

    info!(
        "Starting wfm-rx (input: {} @ {} Hz, output: {} @ {} Hz)",
        cfg.input.path, cfg.input.sample_rate, cfg.audio.path, cfg.audio.sample_rate
    );

    let demod = Demodulator::new(cfg.demod_config(), move |audio: &[i16]| {
        sink.write_block(audio)
    })?;
    let totals = pump(source.as_mut(), &demod, cfg.input.chunk_bytes)?;
    let audio_rate = demod.audio_sample_rate();
    let stats = demod.shutdown();

    info!(
        "End of input: {} chunk(s), {} bytes read; {} audio block(s), {} samples ({:.1} s) written",
        totals.chunks,
        totals.bytes,
        counters.blocks(),
        counters.samples(),
        counters.samples() as f64 / audio_rate as f64
    );
    let dropped = stats.transform.dropped + stats.filter.dropped + stats.discriminate.dropped;
    if dropped > 0 {
        warn!("{} block(s) dropped on queue overflow", dropped);
    }
    if counters.errors() > 0 {
        return Err(format!("{} audio output error(s)", counters.errors()).into());
    }
    Ok(())
}
