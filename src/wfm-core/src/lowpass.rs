// SPDX-FileCopyrightText: 2026 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Frequency-domain block low-pass filter.
//!
//! Each non-overlapping block of `N` samples is transformed, scaled bin by
//! bin with a logistic soft-cutoff response and transformed back. A trailing
//! remainder shorter than `N` is left untouched.
//!
//! Planning goes through a [`SharedPlanner`]; every filter built on the same
//! handle serialises its plan + execute sequence on one lock.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use realfft::RealFftPlanner;
use rustfft::FftPlanner;

use crate::complex::Complex;
use crate::error::DemodError;

/// Forward/inverse transform planners for complex and real signals.
pub struct TransformPlanner {
    complex: FftPlanner<f64>,
    real: RealFftPlanner<f64>,
}

impl TransformPlanner {
    pub fn new() -> Self {
        Self {
            complex: FftPlanner::new(),
            real: RealFftPlanner::new(),
        }
    }
}

impl Default for TransformPlanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Lock-guarded planner handle injected into every [`LowPass`].
#[derive(Clone, Default)]
pub struct SharedPlanner(Arc<Mutex<TransformPlanner>>);

impl SharedPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TransformPlanner> {
        // The planner only caches plans, so a panic elsewhere leaves it usable.
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for crate::complex::Complex {}
    impl Sealed for f64 {}
}

/// Sample types the low-pass filter can process.
pub trait FilterSample: sealed::Sealed + Copy + Send + Sync + 'static {
    /// Fill the upper half of a response whose lower half is computed.
    fn complete_response(coefficients: &mut [f64]);

    /// Filter every full block of `coefficients.len()` samples in `data`.
    fn filter_blocks(planner: &mut TransformPlanner, data: &mut [Self], coefficients: &[f64]);
}

impl FilterSample for Complex {
    /// Complex spectra carry negative frequencies in the upper half, so the
    /// response is mirrored.
    fn complete_response(coefficients: &mut [f64]) {
        let n = coefficients.len();
        for i in n / 2..n {
            coefficients[i] = coefficients[n - i - 1];
        }
    }

    fn filter_blocks(planner: &mut TransformPlanner, data: &mut [Self], coefficients: &[f64]) {
        let n = coefficients.len();
        let fft = planner.complex.plan_fft_forward(n);
        let ifft = planner.complex.plan_fft_inverse(n);
        let scale = n as f64;

        for block in data.chunks_exact_mut(n) {
            fft.process(block);
            for (bin, &coeff) in block.iter_mut().zip(coefficients) {
                *bin *= coeff;
            }
            ifft.process(block);
            for sample in block.iter_mut() {
                *sample /= scale;
            }
        }
    }
}

impl FilterSample for f64 {
    /// Upper half stays zero. The half spectrum only reaches bin `N/2`, so
    /// the Nyquist bin is the one upper-half coefficient that gets used.
    fn complete_response(_coefficients: &mut [f64]) {}

    fn filter_blocks(planner: &mut TransformPlanner, data: &mut [Self], coefficients: &[f64]) {
        let n = coefficients.len();
        let r2c = planner.real.plan_fft_forward(n);
        let c2r = planner.real.plan_fft_inverse(n);
        let mut spectrum = r2c.make_output_vec();
        let scale = n as f64;

        for block in data.chunks_exact_mut(n) {
            if let Err(e) = r2c.process(block, &mut spectrum) {
                tracing::warn!("forward transform failed: {}; block left unfiltered", e);
                continue;
            }
            for (bin, &coeff) in spectrum.iter_mut().zip(coefficients) {
                *bin *= coeff;
            }
            // DC and Nyquist bins of a real signal are purely real.
            spectrum[0].im = 0.0;
            if let Some(last) = spectrum.last_mut() {
                last.im = 0.0;
            }
            if let Err(e) = c2r.process(&mut spectrum, block) {
                tracing::warn!("inverse transform failed: {}; block left unfiltered", e);
                continue;
            }
            for sample in block.iter_mut() {
                *sample /= scale;
            }
        }
    }
}

/// Logistic soft cutoff: `1 / (1 + e^(k * (f - f0)))`.
fn logistic(f: f64, k: f64, f0: f64) -> f64 {
    1.0 / (1.0 + (k * (f - f0)).exp())
}

pub struct LowPass<T> {
    planner: SharedPlanner,
    cutoff_hz: u32,
    sample_rate: u32,
    coefficients: Vec<f64>,
    _sample: PhantomData<fn(T)>,
}

impl<T: FilterSample> LowPass<T> {
    /// Build a filter with `block_len`-bin soft cutoff at `cutoff_hz`.
    ///
    /// `block_len` must be a non-zero power of two.
    pub fn new(
        planner: SharedPlanner,
        cutoff_hz: u32,
        block_len: usize,
        sample_rate: u32,
    ) -> Result<Self, DemodError> {
        if !block_len.is_power_of_two() {
            return Err(DemodError::BlockLength(block_len));
        }
        if sample_rate == 0 {
            return Err(DemodError::SampleRate { rate: 0, min: 1 });
        }

        let cutoff_bin = cutoff_hz as f64 * block_len as f64 / sample_rate as f64;
        let mut coefficients = vec![0.0; block_len];
        for (i, coeff) in coefficients.iter_mut().take(block_len / 2).enumerate() {
            *coeff = logistic(i as f64, 1.0, cutoff_bin);
        }
        T::complete_response(&mut coefficients);

        Ok(Self {
            planner,
            cutoff_hz,
            sample_rate,
            coefficients,
            _sample: PhantomData,
        })
    }

    /// Filter `data` in place. Returns the number of blocks processed.
    pub fn filter(&self, data: &mut [T]) -> usize {
        let blocks = data.len() / self.block_len();
        if blocks == 0 {
            return 0;
        }
        let mut planner = self.planner.lock();
        T::filter_blocks(&mut planner, data, &self.coefficients);
        blocks
    }

    pub fn block_len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn cutoff_hz(&self) -> u32 {
        self.cutoff_hz
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }
}
