//! Fixed-capacity circular buffer.
//!
//! Storage is allocated once at construction. Pushing into a full ring
//! overwrites the oldest sample, so memory per player stays constant no
//! matter how long the session runs.

/// Circular buffer of `T` with a write cursor and a fill count.
#[derive(Debug, Clone)]
pub struct Ring<T> {
    slots: Box<[T]>,
    cursor: usize,
    count: usize,
}

impl<T: Copy + Default> Ring<T> {
    /// Create an empty ring holding at most `capacity` samples.
    ///
    /// A zero capacity is bumped to one so pushes never divide by zero.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![T::default(); capacity.max(1)].into_boxed_slice(),
            cursor: 0,
            count: 0,
        }
    }

    /// Write a sample, overwriting the oldest one when full.
    pub fn push(&mut self, value: T) {
        self.slots[self.cursor] = value;
        self.cursor = (self.cursor + 1) % self.slots.len();
        if self.count < self.slots.len() {
            self.count += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_full(&self) -> bool {
        self.count == self.slots.len()
    }

    /// Samples from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        let cap = self.slots.len();
        let start = (self.cursor + cap - self.count) % cap;
        (0..self.count).map(move |i| self.slots[(start + i) % cap])
    }

    /// Samples from oldest to newest, copied out.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }

    pub fn clear(&mut self) {
        self.cursor = 0;
        self.count = 0;
    }
}
