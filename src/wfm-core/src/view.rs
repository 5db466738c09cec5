// SPDX-FileCopyrightText: 2026 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Non-owning resampling views over sample buffers.
//!
//! A view presents a shorter (or longer) logical sequence over a borrowed
//! buffer by remapping indices, so decimation never copies samples:
//!
//! - [`Stride`] keeps every `step`-th sample (`view[i] = buf[i * step]`).
//!   It does not anti-alias; low-pass the buffer first.
//! - [`Nearest`] maps `view[i] = buf[round(i * scale)]`, which hits an
//!   arbitrary target length using nearest-neighbour selection.

use std::ops::{Index, IndexMut};

/// Mapping from logical view indices to physical buffer indices.
pub trait IndexMap: Copy {
    /// Logical length of the view.
    fn len(&self) -> usize;

    /// Physical index for logical `index`. Only called with `index < len()`.
    fn source_index(&self, index: usize) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stride {
    step: usize,
    len: usize,
}

impl Stride {
    /// Stride for a buffer of `source_len` samples.
    /// A zero step is clamped to 1.
    pub fn with_step(source_len: usize, step: usize) -> Self {
        let step = step.max(1);
        Self {
            step,
            len: source_len / step,
        }
    }

    /// `step = source_len / target_len`.
    pub fn to_len(source_len: usize, target_len: usize) -> Self {
        Self::with_step(source_len, source_len / target_len.max(1))
    }

    /// `step = original_rate / target_rate`.
    pub fn from_rates(source_len: usize, original_rate: u32, target_rate: u32) -> Self {
        Self::with_step(source_len, (original_rate / target_rate.max(1)) as usize)
    }

    pub fn step(&self) -> usize {
        self.step
    }
}

impl IndexMap for Stride {
    #[inline]
    fn len(&self) -> usize {
        self.len
    }

    #[inline]
    fn source_index(&self, index: usize) -> usize {
        index * self.step
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nearest {
    scale: f64,
    len: usize,
    source_len: usize,
}

impl Nearest {
    /// `scale = source_len / target_len`.
    pub fn to_len(source_len: usize, target_len: usize) -> Self {
        if source_len == 0 || target_len == 0 {
            return Self {
                scale: 1.0,
                len: 0,
                source_len,
            };
        }
        Self {
            scale: source_len as f64 / target_len as f64,
            len: target_len,
            source_len,
        }
    }

    /// Target length `round(target_rate * source_len / original_rate)`.
    pub fn from_rates(source_len: usize, original_rate: u32, target_rate: u32) -> Self {
        if original_rate == 0 {
            return Self::to_len(source_len, 0);
        }
        let target_len =
            (target_rate as f64 * source_len as f64 / original_rate as f64).round() as usize;
        Self::to_len(source_len, target_len)
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }
}

impl IndexMap for Nearest {
    #[inline]
    fn len(&self) -> usize {
        self.len
    }

    #[inline]
    fn source_index(&self, index: usize) -> usize {
        // Upsampling can round the last index past the end.
        ((index as f64 * self.scale).round() as usize).min(self.source_len - 1)
    }
}

/// Read-only view over `&[T]`.
#[derive(Debug)]
pub struct View<'a, T, M> {
    data: &'a [T],
    map: M,
}

/// Read/write view over `&mut [T]`; writes land in the underlying buffer.
#[derive(Debug)]
pub struct ViewMut<'a, T, M> {
    data: &'a mut [T],
    map: M,
}

pub type Downsampled<'a, T> = View<'a, T, Stride>;
pub type DownsampledMut<'a, T> = ViewMut<'a, T, Stride>;
pub type Interpolated<'a, T> = View<'a, T, Nearest>;
pub type InterpolatedMut<'a, T> = ViewMut<'a, T, Nearest>;

impl<T, M: IndexMap> Clone for View<'_, T, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, M: IndexMap> Copy for View<'_, T, M> {}

impl<'a, T, M: IndexMap> View<'a, T, M> {
    pub fn new(data: &'a [T], map: M) -> Self {
        Self { data, map }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn map(&self) -> M {
        self.map
    }

    pub fn get(&self, index: usize) -> Option<&'a T> {
        if index < self.map.len() {
            self.data.get(self.map.source_index(index))
        } else {
            None
        }
    }

    pub fn iter(&self) -> Iter<'a, T, M> {
        Iter::new(self.data, self.map)
    }
}

impl<'a, T> View<'a, T, Stride> {
    pub fn to_len(data: &'a [T], target_len: usize) -> Self {
        Self::new(data, Stride::to_len(data.len(), target_len))
    }

    pub fn from_rates(data: &'a [T], original_rate: u32, target_rate: u32) -> Self {
        Self::new(data, Stride::from_rates(data.len(), original_rate, target_rate))
    }
}

impl<'a, T> View<'a, T, Nearest> {
    pub fn to_len(data: &'a [T], target_len: usize) -> Self {
        Self::new(data, Nearest::to_len(data.len(), target_len))
    }

    pub fn from_rates(data: &'a [T], original_rate: u32, target_rate: u32) -> Self {
        Self::new(data, Nearest::from_rates(data.len(), original_rate, target_rate))
    }
}

impl<'a, T, M: IndexMap> ViewMut<'a, T, M> {
    pub fn new(data: &'a mut [T], map: M) -> Self {
        Self { data, map }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn map(&self) -> M {
        self.map
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        if index < self.map.len() {
            self.data.get(self.map.source_index(index))
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if index < self.map.len() {
            self.data.get_mut(self.map.source_index(index))
        } else {
            None
        }
    }

    pub fn as_view(&self) -> View<'_, T, M> {
        View::new(&*self.data, self.map)
    }

    pub fn iter(&self) -> Iter<'_, T, M> {
        Iter::new(&*self.data, self.map)
    }
}

impl<'a, T> ViewMut<'a, T, Stride> {
    pub fn to_len(data: &'a mut [T], target_len: usize) -> Self {
        let map = Stride::to_len(data.len(), target_len);
        Self::new(data, map)
    }

    pub fn from_rates(data: &'a mut [T], original_rate: u32, target_rate: u32) -> Self {
        let map = Stride::from_rates(data.len(), original_rate, target_rate);
        Self::new(data, map)
    }
}

impl<'a, T> ViewMut<'a, T, Nearest> {
    pub fn to_len(data: &'a mut [T], target_len: usize) -> Self {
        let map = Nearest::to_len(data.len(), target_len);
        Self::new(data, map)
    }

    pub fn from_rates(data: &'a mut [T], original_rate: u32, target_rate: u32) -> Self {
        let map = Nearest::from_rates(data.len(), original_rate, target_rate);
        Self::new(data, map)
    }
}

#[inline]
#[track_caller]
fn check_index(index: usize, len: usize) {
    if index >= len {
        panic!("index {} out of range for view of length {}", index, len);
    }
}

impl<T, M: IndexMap> Index<usize> for View<'_, T, M> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        check_index(index, self.map.len());
        &self.data[self.map.source_index(index)]
    }
}

impl<T, M: IndexMap> Index<usize> for ViewMut<'_, T, M> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        check_index(index, self.map.len());
        &self.data[self.map.source_index(index)]
    }
}

impl<T, M: IndexMap> IndexMut<usize> for ViewMut<'_, T, M> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        check_index(index, self.map.len());
        &mut self.data[self.map.source_index(index)]
    }
}

/// Random-access iterator over a view. `nth`/`nth_back` jump directly.
#[derive(Debug)]
pub struct Iter<'a, T, M> {
    data: &'a [T],
    map: M,
    front: usize,
    back: usize,
}

impl<'a, T, M: IndexMap> Iter<'a, T, M> {
    fn new(data: &'a [T], map: M) -> Self {
        Self {
            data,
            map,
            front: 0,
            back: map.len(),
        }
    }
}

impl<T, M: IndexMap> Clone for Iter<'_, T, M> {
    fn clone(&self) -> Self {
        Self {
            data: self.data,
            map: self.map,
            front: self.front,
            back: self.back,
        }
    }
}

impl<'a, T, M: IndexMap> Iterator for Iter<'a, T, M> {
    type Item = &'a T;

    #[inline]
    fn next(&mut self) -> Option<&'a T> {
        if self.front >= self.back {
            return None;
        }
        let item = &self.data[self.map.source_index(self.front)];
        self.front += 1;
        Some(item)
    }

    fn nth(&mut self, n: usize) -> Option<&'a T> {
        self.front = self.front.saturating_add(n).min(self.back);
        self.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }
}

impl<'a, T, M: IndexMap> DoubleEndedIterator for Iter<'a, T, M> {
    #[inline]
    fn next_back(&mut self) -> Option<&'a T> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        Some(&self.data[self.map.source_index(self.back)])
    }

    fn nth_back(&mut self, n: usize) -> Option<&'a T> {
        self.back = self.back.saturating_sub(n).max(self.front);
        self.next_back()
    }
}

impl<T, M: IndexMap> ExactSizeIterator for Iter<'_, T, M> {}

impl<'a, T, M: IndexMap> IntoIterator for View<'a, T, M> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T, M>;

    fn into_iter(self) -> Self::IntoIter {
        Iter::new(self.data, self.map)
    }
}

impl<'a, T, M: IndexMap> IntoIterator for &View<'a, T, M> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T, M>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
