// SPDX-FileCopyrightText: 2026 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for wfm-rx.
//!
//! Config is loaded from the `[wfm-rx]` section of `wfm-rs.toml`.
//! Default search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./wfm-rs.toml`
//! 3. `~/.config/wfm-rs/wfm-rs.toml`
//! 4. `/etc/wfm-rs/wfm-rs.toml`

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use wfm_app::ConfigFile;
use wfm_core::demod::INTERMEDIATE_RATE;
use wfm_core::{AudioResampler, DemodConfig, OverflowPolicy};

/// Receiver configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RxConfig {
    pub general: GeneralConfig,
    pub input: InputConfig,
    pub audio: AudioConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

/// Raw 8-bit IQ input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// File path, or "-" for stdin
    pub path: String,
    /// IQ sample rate in Hz
    pub sample_rate: u32,
    /// Bytes handed to the demodulator per block
    pub chunk_bytes: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            path: "-".to_string(),
            sample_rate: 2_400_000,
            chunk_bytes: 16_384,
        }
    }
}

/// 16-bit PCM output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// File path, or "-" for stdout
    pub path: String,
    pub sample_rate: u32,
    /// Linear gain applied before i16 saturation
    pub digital_gain: f32,
    pub resampler: ResamplerKind,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            path: "-".to_string(),
            sample_rate: 44_100,
            digital_gain: 1.0,
            resampler: ResamplerKind::Decimate,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Blocks each stage may queue
    pub queue_capacity: usize,
    pub overflow: OverflowKind,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: wfm_core::stage::DEFAULT_QUEUE_CAPACITY,
            overflow: OverflowKind::DropOldest,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ResamplerKind {
    #[default]
    Decimate,
    Nearest,
}

impl From<ResamplerKind> for AudioResampler {
    fn from(kind: ResamplerKind) -> Self {
        match kind {
            ResamplerKind::Decimate => AudioResampler::Decimate,
            ResamplerKind::Nearest => AudioResampler::Nearest,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowKind {
    #[default]
    DropOldest,
    Block,
}

impl From<OverflowKind> for OverflowPolicy {
    fn from(kind: OverflowKind) -> Self {
        match kind {
            OverflowKind::DropOldest => OverflowPolicy::DropOldest,
            OverflowKind::Block => OverflowPolicy::Block,
        }
    }
}

impl RxConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_log_level(self.general.log_level.as_deref())?;

        if self.input.path.trim().is_empty() {
            return Err("[input].path must not be empty".to_string());
        }
        if self.input.sample_rate < INTERMEDIATE_RATE {
            return Err(format!(
                "[input].sample_rate must be >= {}",
                INTERMEDIATE_RATE
            ));
        }
        if self.input.chunk_bytes == 0 || self.input.chunk_bytes % 2 != 0 {
            return Err("[input].chunk_bytes must be a positive even number".to_string());
        }

        if self.audio.path.trim().is_empty() {
            return Err("[audio].path must not be empty".to_string());
        }
        if !(1..=INTERMEDIATE_RATE).contains(&self.audio.sample_rate) {
            return Err(format!(
                "[audio].sample_rate must be in range 1..={}",
                INTERMEDIATE_RATE
            ));
        }
        if !self.audio.digital_gain.is_finite() {
            return Err("[audio].digital_gain must be finite".to_string());
        }

        if self.pipeline.queue_capacity == 0 {
            return Err("[pipeline].queue_capacity must be > 0".to_string());
        }
        Ok(())
    }

    pub fn demod_config(&self) -> DemodConfig {
        DemodConfig::new(self.input.sample_rate, self.audio.sample_rate)
            .with_gain(self.audio.digital_gain)
            .with_resampler(self.audio.resampler.into())
            .with_queue(self.pipeline.queue_capacity, self.pipeline.overflow.into())
    }

    /// Example configuration wrapped under the `[wfm-rx]` header.
    pub fn example_combined_toml() -> String {
        #[derive(serde::Serialize)]
        struct Wrapper {
            #[serde(rename = "wfm-rx")]
            inner: RxConfig,
        }
        let example = RxConfig {
            general: GeneralConfig {
                log_level: Some("info".to_string()),
            },
            input: InputConfig {
                path: "capture.u8".to_string(),
                ..InputConfig::default()
            },
            audio: AudioConfig::default(),
            pipeline: PipelineConfig::default(),
        };
        toml::to_string_pretty(&Wrapper { inner: example }).unwrap_or_default()
    }
}

fn validate_log_level(level: Option<&str>) -> Result<(), String> {
    if let Some(level) = level {
        match level {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(format!(
                    "[general].log_level '{}' is invalid (expected one of: trace, debug, info, warn, error)",
                    level
                ))
            }
        }
    }
    Ok(())
}

impl ConfigFile for RxConfig {
    fn section_key() -> &'static str {
        "wfm-rx"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RxConfig::default();
        assert!(config.general.log_level.is_none());
        assert_eq!(config.input.path, "-");
        assert_eq!(config.input.sample_rate, 2_400_000);
        assert_eq!(config.input.chunk_bytes, 16_384);
        assert_eq!(config.audio.path, "-");
        assert_eq!(config.audio.sample_rate, 44_100);
        assert_eq!(config.audio.digital_gain, 1.0);
        assert_eq!(config.audio.resampler, ResamplerKind::Decimate);
        assert_eq!(config.pipeline.queue_capacity, 25);
        assert_eq!(config.pipeline.overflow, OverflowKind::DropOldest);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml_str = r#"
[input]
path = "fm.u8"
sample_rate = 1024000

[audio]
resampler = "nearest"
sample_rate = 48000

[pipeline]
overflow = "block"
"#;
        let config: RxConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.input.path, "fm.u8");
        assert_eq!(config.input.sample_rate, 1_024_000);
        assert_eq!(config.input.chunk_bytes, 16_384);
        assert_eq!(config.audio.resampler, ResamplerKind::Nearest);
        assert_eq!(config.audio.sample_rate, 48_000);
        assert_eq!(config.pipeline.overflow, OverflowKind::Block);
        assert_eq!(config.pipeline.queue_capacity, 25);

        let demod = config.demod_config();
        assert_eq!(demod.sample_rate, 1_024_000);
        assert_eq!(demod.audio_resampler, AudioResampler::Nearest);
        assert_eq!(demod.overflow, OverflowPolicy::Block);
    }

    #[test]
    fn test_unknown_resampler_rejected() {
        let toml_str = "[audio]\nresampler = \"cubic\"\n";
        assert!(toml::from_str::<RxConfig>(toml_str).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RxConfig::default();
        config.input.sample_rate = 200_000;
        assert!(config.validate().unwrap_err().contains("[input].sample_rate"));

        let mut config = RxConfig::default();
        config.input.chunk_bytes = 1001;
        assert!(config.validate().unwrap_err().contains("[input].chunk_bytes"));

        let mut config = RxConfig::default();
        config.audio.sample_rate = 0;
        assert!(config.validate().unwrap_err().contains("[audio].sample_rate"));

        let mut config = RxConfig::default();
        config.audio.digital_gain = f32::NAN;
        assert!(config.validate().unwrap_err().contains("[audio].digital_gain"));

        let mut config = RxConfig::default();
        config.pipeline.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = RxConfig::default();
        config.general.log_level = Some("verbose".to_string());
        assert!(config.validate().unwrap_err().contains("[general].log_level"));
    }

    #[test]
    fn test_example_combined_toml_parses() {
        let example = RxConfig::example_combined_toml();
        let table: toml::Table = toml::from_str(&example).unwrap();
        assert!(table.contains_key("wfm-rx"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wfm-rs.toml");
        std::fs::write(&path, &example).unwrap();
        let config = RxConfig::load_from_file(&path).unwrap();
        assert_eq!(config.input.path, "capture.u8");
        assert_eq!(config.general.log_level.as_deref(), Some("info"));
        assert!(config.validate().is_ok());
    }
}
