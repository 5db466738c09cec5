// SPDX-FileCopyrightText: 2026 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::io::{self, Read};

/// Producer of raw interleaved unsigned 8-bit I/Q bytes.
pub trait IqSource: Send {
    /// Fill `buf` as far as the source allows. Returns the number of bytes
    /// written; 0 means end of input.
    fn read_into(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// IQ bytes from a file, pipe or stdin.
pub struct ReaderIqSource<R> {
    reader: R,
}

impl<R: Read + Send> ReaderIqSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: Read + Send> IqSource for ReaderIqSource<R> {
    fn read_into(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // Short reads from pipes are stitched into one chunk.
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

/// Source that yields `remaining` bytes of silence (mid-scale 128).
#[cfg(test)]
pub struct MockIqSource {
    remaining: usize,
}

#[cfg(test)]
impl MockIqSource {
    pub fn new(total_bytes: usize) -> Self {
        Self {
            remaining: total_bytes,
        }
    }
}

#[cfg(test)]
impl IqSource for MockIqSource {
    fn read_into(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.remaining);
        buf[..n].fill(128);
        self.remaining -= n;
        Ok(n)
    }
}
