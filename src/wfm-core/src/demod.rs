// SPDX-FileCopyrightText: 2026 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Wide-band FM demodulator: three single-worker stages chained into one
//! push pipeline.
//!
//! ```text
//! raw u8 IQ ──► transform ──► filter (100 kHz) ──► discriminate ──► callback
//!               (-128 DC)     8192-bin blocks      decimate to 220.5 kHz,
//!                                                  discriminator, 20 kHz
//!                                                  low-pass, audio rate,
//!                                                  gain + i16 saturation
//! ```
//!
//! Blocks move by value from stage to stage. The filter stage takes one
//! settings snapshot per block and the block carries it to the
//! discriminator, so a block is always filtered and decimated for the same
//! rate. The audio callback runs on the discriminate worker thread, one block
//! at a time.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::complex::{Complex, ComplexExt};
use crate::error::DemodError;
use crate::lowpass::{LowPass, SharedPlanner};
use crate::stage::{OverflowPolicy, Stage, StageConfig, StageStats, DEFAULT_QUEUE_CAPACITY};
use crate::view::{Downsampled, IndexMap, Interpolated, Nearest, Stride};

/// Fixed rate the filtered baseband is decimated to before discrimination.
pub const INTERMEDIATE_RATE: u32 = 220_500;
pub const IQ_CUTOFF_HZ: u32 = 100_000;
pub const IQ_BLOCK_LEN: usize = 8192;
pub const AUDIO_CUTOFF_HZ: u32 = 20_000;
pub const AUDIO_BLOCK_LEN: usize = 4096;
/// Mid-scale of an unsigned 8-bit ADC sample.
const ADC_OFFSET: f64 = 128.0;

/// How the 220.5 kHz discriminator output is brought to the audio rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AudioResampler {
    /// Keep every `floor(220500 / audio_rate)`-th sample.
    #[default]
    Decimate,
    /// Nearest-neighbour selection hitting the exact audio rate.
    Nearest,
}

/// Runtime configuration snapshot. Replaced whole on every change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    pub sample_rate: u32,
    pub digital_gain: f32,
}

#[derive(Debug, Clone)]
pub struct DemodConfig {
    /// Input IQ sample rate (Hz).
    pub sample_rate: u32,
    /// Output PCM rate (Hz).
    pub audio_sample_rate: u32,
    pub digital_gain: f32,
    pub audio_resampler: AudioResampler,
    /// Per-stage queue capacity.
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
}

impl DemodConfig {
    pub fn new(sample_rate: u32, audio_sample_rate: u32) -> Self {
        Self {
            sample_rate,
            audio_sample_rate,
            digital_gain: 1.0,
            audio_resampler: AudioResampler::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow: OverflowPolicy::default(),
        }
    }

    pub fn with_gain(mut self, digital_gain: f32) -> Self {
        self.digital_gain = digital_gain;
        self
    }

    pub fn with_resampler(mut self, audio_resampler: AudioResampler) -> Self {
        self.audio_resampler = audio_resampler;
        self
    }

    pub fn with_queue(mut self, capacity: usize, overflow: OverflowPolicy) -> Self {
        self.queue_capacity = capacity;
        self.overflow = overflow;
        self
    }

    fn stage(&self, name: &str) -> StageConfig {
        StageConfig::new(name)
            .with_capacity(self.queue_capacity)
            .with_overflow(self.overflow)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemodStats {
    pub transform: StageStats,
    pub filter: StageStats,
    pub discriminate: StageStats,
}

type AudioCallback = Box<dyn FnMut(&[i16]) + Send>;

fn validate_sample_rate(rate: u32) -> Result<(), DemodError> {
    if rate < INTERMEDIATE_RATE {
        return Err(DemodError::SampleRate {
            rate,
            min: INTERMEDIATE_RATE,
        });
    }
    Ok(())
}

fn validate_audio_rate(rate: u32) -> Result<(), DemodError> {
    if rate == 0 || rate > INTERMEDIATE_RATE {
        return Err(DemodError::AudioRate {
            rate,
            max: INTERMEDIATE_RATE,
        });
    }
    Ok(())
}

/// Interleaved unsigned 8-bit I/Q pairs to complex baseband. An odd
/// trailing byte is ignored.
pub fn to_baseband(raw: &[u8]) -> Vec<Complex> {
    raw.chunks_exact(2)
        .map(|pair| Complex::new(pair[0] as f64 - ADC_OFFSET, pair[1] as f64 - ADC_OFFSET))
        .collect()
}

/// Instantaneous-frequency discriminator over consecutive sample pairs:
///
/// `(cur.re * (cur.im - prev.im) - cur.im * (cur.re - prev.re)) / |cur|²`
///
/// which is `Im(cur * conj(prev)) / |cur|²`, i.e. `sin(Δφ)` for a constant
/// envelope. Returns one value fewer than the input. A sample at the origin
/// yields 0.0 rather than NaN.
pub fn discriminate<'a, I>(samples: I) -> Vec<f64>
where
    I: IntoIterator<Item = &'a Complex>,
{
    let mut iter = samples.into_iter();
    let Some(&first) = iter.next() else {
        return Vec::new();
    };
    let mut output = Vec::with_capacity(iter.size_hint().0);
    let mut prev = first;
    for &cur in iter {
        let denom = cur.magnitude_squared();
        let value = if denom == 0.0 {
            0.0
        } else {
            (cur.re * (cur.im - prev.im) - cur.im * (cur.re - prev.re)) / denom
        };
        output.push(value);
        prev = cur;
    }
    output
}

/// Apply gain and saturate to the i16 range. NaN maps to 0.
#[inline]
pub fn to_pcm(sample: f64, gain: f64) -> i16 {
    (sample * gain).clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

/// Audio samples produced from one raw block of `raw_len` bytes.
///
/// `((raw_len / 2) / (rate / 220500) - 1) / (220500 / audio_rate)` for
/// [`AudioResampler::Decimate`], all divisions truncating.
pub fn audio_len(
    raw_len: usize,
    sample_rate: u32,
    audio_sample_rate: u32,
    resampler: AudioResampler,
) -> usize {
    let decimated = Stride::from_rates(raw_len / 2, sample_rate, INTERMEDIATE_RATE).len();
    let demodulated = decimated.saturating_sub(1);
    match resampler {
        AudioResampler::Decimate => {
            Stride::from_rates(demodulated, INTERMEDIATE_RATE, audio_sample_rate).len()
        }
        AudioResampler::Nearest => {
            Nearest::from_rates(demodulated, INTERMEDIATE_RATE, audio_sample_rate).len()
        }
    }
}

fn quantize<'a>(samples: impl Iterator<Item = &'a f64>, gain: f64) -> Vec<i16> {
    samples.map(|&sample| to_pcm(sample, gain)).collect()
}

/// Settings and the IQ filter built for their sample rate. Replaced as one.
struct Snapshot {
    settings: Settings,
    iq_filter: Arc<LowPass<Complex>>,
}

/// Baseband block after the IQ filter, tagged with the snapshot used.
struct Filtered {
    snapshot: Arc<Snapshot>,
    samples: Vec<Complex>,
}

/// State shared by the stage workers.
struct Context {
    audio_sample_rate: u32,
    audio_resampler: AudioResampler,
    planner: SharedPlanner,
    snapshot: RwLock<Arc<Snapshot>>,
    audio_filter: LowPass<f64>,
    callback: Mutex<AudioCallback>,
}

impl Context {
    fn snapshot(&self) -> Arc<Snapshot> {
        let guard = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Derive the next snapshot from the current one under the write lock.
    fn swap_snapshot(&self, next: impl FnOnce(&Snapshot) -> Snapshot) {
        let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        let replacement = Arc::new(next(&guard));
        *guard = replacement;
    }

    fn filter_block(&self, mut samples: Vec<Complex>) -> Filtered {
        let snapshot = self.snapshot();
        snapshot.iq_filter.filter(&mut samples);
        Filtered { snapshot, samples }
    }

    fn discriminate_block(&self, block: &Filtered) {
        let settings = block.snapshot.settings;
        let gain = settings.digital_gain as f64;

        let decimated =
            Downsampled::from_rates(&block.samples, settings.sample_rate, INTERMEDIATE_RATE);
        let mut demodulated = discriminate(decimated);
        self.audio_filter.filter(&mut demodulated);

        let audio = match self.audio_resampler {
            AudioResampler::Decimate => quantize(
                Downsampled::from_rates(&demodulated, INTERMEDIATE_RATE, self.audio_sample_rate)
                    .iter(),
                gain,
            ),
            AudioResampler::Nearest => quantize(
                Interpolated::from_rates(&demodulated, INTERMEDIATE_RATE, self.audio_sample_rate)
                    .iter(),
                gain,
            ),
        };

        if audio.is_empty() {
            tracing::trace!("block of {} samples produced no audio", block.samples.len());
            return;
        }

        let mut callback = self.callback.lock().unwrap_or_else(PoisonError::into_inner);
        (callback)(&audio);
    }
}

pub struct Demodulator {
    // Closed in this order so every accepted block drains downstream.
    transform: Stage<Vec<u8>>,
    filter: Stage<Vec<Complex>>,
    discriminate: Stage<Filtered>,
    context: Arc<Context>,
}

impl Demodulator {
    /// Start the pipeline. `callback` receives each finished audio block on
    /// the discriminate worker thread and must not block for long.
    pub fn new<F>(config: DemodConfig, callback: F) -> Result<Self, DemodError>
    where
        F: FnMut(&[i16]) + Send + 'static,
    {
        validate_sample_rate(config.sample_rate)?;
        validate_audio_rate(config.audio_sample_rate)?;

        let planner = SharedPlanner::new();
        let iq_filter = LowPass::new(
            planner.clone(),
            IQ_CUTOFF_HZ,
            IQ_BLOCK_LEN,
            config.sample_rate,
        )?;
        let audio_filter = LowPass::new(
            planner.clone(),
            AUDIO_CUTOFF_HZ,
            AUDIO_BLOCK_LEN,
            INTERMEDIATE_RATE,
        )?;

        let context = Arc::new(Context {
            audio_sample_rate: config.audio_sample_rate,
            audio_resampler: config.audio_resampler,
            planner,
            snapshot: RwLock::new(Arc::new(Snapshot {
                settings: Settings {
                    sample_rate: config.sample_rate,
                    digital_gain: config.digital_gain,
                },
                iq_filter: Arc::new(iq_filter),
            })),
            audio_filter,
            callback: Mutex::new(Box::new(callback)),
        });

        let discriminate = {
            let context = Arc::clone(&context);
            Stage::spawn(config.stage("discriminate"), move |block: Filtered| {
                context.discriminate_block(&block);
            })?
        };

        let filter = {
            let context = Arc::clone(&context);
            let next = discriminate.sender();
            Stage::spawn(config.stage("filter"), move |block: Vec<Complex>| {
                if let Err(e) = next.submit(context.filter_block(block)) {
                    tracing::debug!("filtered block discarded: {}", e);
                }
            })?
        };

        let transform = {
            let next = filter.sender();
            Stage::spawn(config.stage("transform"), move |raw: Vec<u8>| {
                if let Err(e) = next.submit(to_baseband(&raw)) {
                    tracing::debug!("baseband block discarded: {}", e);
                }
            })?
        };

        tracing::info!(
            "FM demodulator started (input {} Hz, audio {} Hz, gain {}, {:?} resampling)",
            config.sample_rate,
            config.audio_sample_rate,
            config.digital_gain,
            config.audio_resampler
        );

        Ok(Self {
            transform,
            filter,
            discriminate,
            context,
        })
    }

    /// Copy `raw` into the pipeline.
    pub fn demodulate(&self, raw: &[u8]) -> Result<(), DemodError> {
        self.transform.submit(raw.to_vec())
    }

    /// Move an owned block into the pipeline.
    pub fn demodulate_owned(&self, raw: Vec<u8>) -> Result<(), DemodError> {
        self.transform.submit(raw)
    }

    /// Change the input sample rate.
    ///
    /// Blocks waiting for the discriminator are dropped. The rate and an IQ
    /// filter rebuilt for it are swapped in together, so concurrent callers
    /// always leave a matching pair.
    pub fn set_sample_rate(&self, sample_rate: u32) -> Result<(), DemodError> {
        validate_sample_rate(sample_rate)?;
        let iq_filter = LowPass::new(
            self.context.planner.clone(),
            IQ_CUTOFF_HZ,
            IQ_BLOCK_LEN,
            sample_rate,
        )?;

        let flushed = self.discriminate.clear();
        self.context.swap_snapshot(|current| Snapshot {
            settings: Settings {
                sample_rate,
                ..current.settings
            },
            iq_filter: Arc::new(iq_filter),
        });

        tracing::info!(
            "input sample rate set to {} Hz ({} queued block(s) flushed)",
            sample_rate,
            flushed
        );
        Ok(())
    }

    /// Change the digital gain. Applies from the next block to be filtered.
    pub fn set_digital_gain(&self, digital_gain: f32) {
        self.context.swap_snapshot(|current| Snapshot {
            settings: Settings {
                digital_gain,
                ..current.settings
            },
            iq_filter: Arc::clone(&current.iq_filter),
        });
        tracing::info!("digital gain set to {}", digital_gain);
    }

    pub fn sample_rate(&self) -> u32 {
        self.context.snapshot().settings.sample_rate
    }

    pub fn digital_gain(&self) -> f32 {
        self.context.snapshot().settings.digital_gain
    }

    pub fn settings(&self) -> Settings {
        self.context.snapshot().settings
    }

    pub fn audio_sample_rate(&self) -> u32 {
        self.context.audio_sample_rate
    }

    pub fn stats(&self) -> DemodStats {
        DemodStats {
            transform: self.transform.stats(),
            filter: self.filter.stats(),
            discriminate: self.discriminate.stats(),
        }
    }

    /// Stop accepting input and wait until every accepted block has been
    /// delivered.
    pub fn close(&mut self) {
        self.transform.close();
        self.filter.close();
        self.discriminate.close();
    }

    pub fn shutdown(mut self) -> DemodStats {
        self.close();
        let stats = self.stats();
        tracing::info!(
            "FM demodulator stopped ({} block(s) in, {} delivered, {} dropped)",
            stats.transform.submitted,
            stats.discriminate.processed,
            stats.transform.dropped + stats.filter.dropped + stats.discriminate.dropped
        );
        stats
    }
}

impl Drop for Demodulator {
    fn drop(&mut self) {
        self.close();
    }
}
