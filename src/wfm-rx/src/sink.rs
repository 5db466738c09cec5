// SPDX-FileCopyrightText: 2026 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::io::{BufWriter, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::warn;

#[derive(Debug, Default)]
pub struct SinkCounters {
    blocks: AtomicU64,
    samples: AtomicU64,
    errors: AtomicU64,
}

impl SinkCounters {
    pub fn blocks(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }

    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    fn record_error(&self, what: &str, err: &std::io::Error) {
        if self.errors.fetch_add(1, Ordering::Relaxed) == 0 {
            warn!("audio {} failed: {} (further errors counted silently)", what, err);
        }
    }
}

/// Raw little-endian 16-bit mono PCM writer.
pub struct PcmSink {
    writer: BufWriter<Box<dyn Write + Send>>,
    scratch: Vec<u8>,
    counters: Arc<SinkCounters>,
}

impl PcmSink {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: BufWriter::new(writer),
            scratch: Vec::new(),
            counters: Arc::new(SinkCounters::default()),
        }
    }

    pub fn counters(&self) -> Arc<SinkCounters> {
        Arc::clone(&self.counters)
    }

    pub fn write_block(&mut self, audio: &[i16]) {
        self.scratch.clear();
        self.scratch.reserve(audio.len() * 2);
        for sample in audio {
            self.scratch.extend_from_slice(&sample.to_le_bytes());
        }
        match self.writer.write_all(&self.scratch) {
            Ok(()) => {
                self.counters.blocks.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .samples
                    .fetch_add(audio.len() as u64, Ordering::Relaxed);
            }
            Err(e) => self.counters.record_error("write", &e),
        }
    }
}

impl Drop for PcmSink {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            self.counters.record_error("flush", &e);
        }
    }
}
