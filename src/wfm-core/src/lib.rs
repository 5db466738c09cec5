// SPDX-FileCopyrightText: 2026 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Real-time wide-band FM demodulation of 8-bit IQ into 16-bit PCM.

pub mod complex;
pub mod demod;
pub mod error;
pub mod lowpass;
pub mod stage;
pub mod view;

pub use complex::{Complex, ComplexExt};
pub use demod::{AudioResampler, DemodConfig, DemodStats, Demodulator, Settings};
pub use error::DemodError;
pub use lowpass::{LowPass, SharedPlanner};
pub use stage::{OverflowPolicy, Stage, StageConfig, StageSender, StageStats};

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;
