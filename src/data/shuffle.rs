//! Bounded shuffle buffer
//!
//! Streams elements through a fixed-size buffer: once full, each incoming
//! element evicts a uniformly chosen resident. Draining empties the buffer
//! in random order.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub struct ShuffleBuffer<T> {
    buffer: Vec<T>,
    capacity: usize,
    rng: StdRng,
}

impl<T> ShuffleBuffer<T> {
    /// Create a buffer holding at most `capacity` elements
    pub fn new(capacity: usize, seed: u64) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity.min(1 << 16)),
            capacity,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Feed one element; returns an evicted element once the buffer is full
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.capacity <= 1 {
            return Some(item);
        }
        if self.buffer.len() < self.capacity {
            self.buffer.push(item);
            return None;
        }
        let idx = self.rng.gen_range(0..self.buffer.len());
        Some(std::mem::replace(&mut self.buffer[idx], item))
    }

    /// Remove one remaining element at random
    pub fn pop(&mut self) -> Option<T> {
        if self.buffer.is_empty() {
            return None;
        }
        let idx = self.rng.gen_range(0..self.buffer.len());
        Some(self.buffer.swap_remove(idx))
    }

    /// Elements currently held
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
