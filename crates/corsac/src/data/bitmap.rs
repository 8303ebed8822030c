//! Fixed-capacity validity bitmap.
//!
//! One bit per row index; a set bit means a non-null value was written for
//! that row. The backing bytes are laid out exactly as they are framed on
//! disk inside value pages: bit `r % 8` of byte `r / 8`.

/// A fixed-capacity null/validity bitmap over row indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    bits: Vec<u8>,
    capacity: usize,
}

impl Bitmap {
    /// Creates a bitmap covering `capacity` rows, all unset.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bits: vec![0u8; capacity.div_ceil(8)],
            capacity,
        }
    }

    /// Reconstructs a bitmap covering `capacity` rows from raw bytes.
    ///
    /// Bytes beyond `ceil(capacity / 8)` are ignored; missing bytes read
    /// as unset rows.
    pub fn from_bytes(bytes: &[u8], capacity: usize) -> Self {
        let len = capacity.div_ceil(8);
        let mut bits = vec![0u8; len];
        let copy = len.min(bytes.len());
        bits[..copy].copy_from_slice(&bytes[..copy]);
        Self { bits, capacity }
    }

    /// Number of rows this bitmap covers.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Marks row `row` as non-null.
    pub fn set(&mut self, row: usize) {
        debug_assert!(row < self.capacity);
        self.bits[row / 8] |= 1u8 << (row % 8);
    }

    /// Returns true if row `row` holds a non-null value.
    ///
    /// Rows at or beyond the capacity read as unset.
    pub fn is_set(&self, row: usize) -> bool {
        if row >= self.capacity {
            return false;
        }
        self.bits[row / 8] & (1u8 << (row % 8)) != 0
    }

    /// Clears every bit, keeping the backing storage.
    pub fn clear_all(&mut self) {
        self.bits.fill(0);
    }

    /// Counts set bits among the first `rows` rows.
    pub fn count_set(&self, rows: usize) -> usize {
        let rows = rows.min(self.capacity);
        (0..rows).filter(|&r| self.is_set(r)).count()
    }

    /// The raw bytes covering the first `rows` rows.
    pub fn bytes_for(&self, rows: usize) -> &[u8] {
        let rows = rows.min(self.capacity);
        &self.bits[..rows.div_ceil(8)]
    }
}
