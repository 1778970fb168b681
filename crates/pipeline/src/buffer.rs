//! Per-session decode buffer
//!
//! Bytes accumulate until the decoder consumes a complete value. Capacity
//! only grows during a session; consumed bytes are compacted away but the
//! allocation is kept.

use crate::error::BufferError;

/// Buffer growth policy
///
/// When `delta` more bytes do not fit, the new capacity is
/// `max(allocated * factor, allocated + delta)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrowthPolicy {
    /// Capacity of the first allocation
    pub initial: usize,
    /// Geometric growth factor
    pub factor: usize,
    /// Hard ceiling; growth past it faults the session
    pub max: usize,
}

impl GrowthPolicy {
    /// Create a policy
    pub const fn new(initial: usize, factor: usize, max: usize) -> Self {
        Self {
            initial,
            factor,
            max,
        }
    }

    /// Capacity to grow to from `allocated` when `delta` more bytes are needed
    #[inline]
    pub fn next_capacity(&self, allocated: usize, delta: usize) -> usize {
        if allocated == 0 {
            return self.initial.max(delta);
        }
        allocated
            .saturating_mul(self.factor)
            .max(allocated.saturating_add(delta))
    }
}

impl Default for GrowthPolicy {
    fn default() -> Self {
        Self::new(2048, 2, 16 * 1024 * 1024)
    }
}

/// Growable byte storage with a scan cursor
#[derive(Debug)]
pub struct DecodeBuffer {
    data: Vec<u8>,
    allocated: usize,
    cursor: usize,
    policy: GrowthPolicy,
}

impl DecodeBuffer {
    /// Create an empty buffer. Nothing is allocated until the first append.
    pub fn new(policy: GrowthPolicy) -> Self {
        Self {
            data: Vec::new(),
            allocated: 0,
            cursor: 0,
            policy,
        }
    }

    /// Append bytes, growing per the policy when needed
    ///
    /// # Errors
    ///
    /// Returns an error, leaving the buffer unchanged, when the growth would
    /// exceed the policy ceiling or the allocation fails.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        if self.data.len() + bytes.len() > self.allocated {
            self.grow(bytes.len())?;
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    fn grow(&mut self, delta: usize) -> Result<(), BufferError> {
        let required = self.data.len() + delta;
        if required > self.policy.max {
            return Err(BufferError::LimitExceeded {
                required,
                limit: self.policy.max,
            });
        }

        let target = self
            .policy
            .next_capacity(self.allocated, delta)
            .min(self.policy.max)
            .max(required);

        self.data
            .try_reserve_exact(target - self.data.len())
            .map_err(|source| BufferError::Alloc {
                requested: target,
                source,
            })?;
        self.allocated = target;
        Ok(())
    }

    /// Bytes not yet consumed by the decoder
    #[inline]
    pub fn pending(&self) -> &[u8] {
        &self.data[self.cursor..]
    }

    /// Mark `n` pending bytes as consumed
    #[inline]
    pub fn advance(&mut self, n: usize) {
        debug_assert!(self.cursor + n <= self.data.len());
        self.cursor = (self.cursor + n).min(self.data.len());
    }

    /// Drop consumed bytes, moving the pending region to the front
    pub fn compact(&mut self) {
        if self.cursor > 0 {
            self.data.drain(..self.cursor);
            self.cursor = 0;
        }
    }

    /// Forget every buffered byte, keeping the allocation
    pub fn clear(&mut self) {
        self.data.clear();
        self.cursor = 0;
    }

    /// Free the allocation
    pub fn release(&mut self) {
        self.data = Vec::new();
        self.allocated = 0;
        self.cursor = 0;
    }

    /// Bytes currently stored, consumed or not
    #[inline]
    pub fn used(&self) -> usize {
        self.data.len()
    }

    /// Capacity granted by the growth policy
    #[inline]
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Offset of the first unconsumed byte
    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The growth policy in effect
    pub fn policy(&self) -> GrowthPolicy {
        self.policy
    }
}

#[cfg(test)]
#[path = "buffer_test.rs"]
mod buffer_test;
