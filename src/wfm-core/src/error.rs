// SPDX-FileCopyrightText: 2026 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DemodError {
    #[error("block length {0} must be a non-zero power of two")]
    BlockLength(usize),

    #[error("input sample rate {rate} Hz is invalid (must be at least {min} Hz)")]
    SampleRate { rate: u32, min: u32 },

    #[error("audio sample rate {rate} Hz is invalid (expected 1..={max})")]
    AudioRate { rate: u32, max: u32 },

    #[error("stage '{0}' is closed")]
    Closed(String),

    #[error("failed to spawn worker thread for stage '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}
