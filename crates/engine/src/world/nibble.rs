use crate::error::LightError;

/// A sequence of 4-bit values packed two per byte.
///
/// Even indices live in the high nibble, odd indices in the low nibble, so
/// `[0x01, 0x23]` reads back as `0, 1, 2, 3`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NibbleArray {
    data: Box<[u8]>,
}

impl NibbleArray {
    /// An all-zero array holding `len` values. `len` must be even.
    pub fn new(len: usize) -> Result<Self, LightError> {
        if len % 2 != 0 {
            return Err(LightError::OddNibbleCount(len));
        }
        Ok(Self {
            data: vec![0u8; len / 2].into_boxed_slice(),
        })
    }

    /// Wrap an existing packed buffer (`2 * bytes.len()` values).
    pub fn from_bytes(bytes: impl Into<Box<[u8]>>) -> Self {
        Self { data: bytes.into() }
    }

    /// Number of values (not bytes).
    pub fn len(&self) -> usize {
        self.data.len() * 2
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read the value at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    #[inline]
    pub fn get(&self, index: usize) -> u8 {
        let byte = self.data[index >> 1];
        if index & 1 == 0 {
            (byte >> 4) & 0x0F
        } else {
            byte & 0x0F
        }
    }

    /// Write `value` at `index`. Values outside 0..=15 are rejected.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    #[inline]
    pub fn set(&mut self, index: usize, value: i32) -> Result<(), LightError> {
        if !(0..=15).contains(&value) {
            return Err(LightError::NibbleOutOfRange(value));
        }
        let value = value as u8;
        let byte = &mut self.data[index >> 1];
        if index & 1 == 0 {
            *byte = (*byte & 0x0F) | (value << 4);
        } else {
            *byte = (*byte & 0xF0) | value;
        }
        Ok(())
    }

    /// True if every value is zero.
    pub fn is_zero(&self) -> bool {
        self.data.iter().all(|b| *b == 0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Box<[u8]> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PACKED: [u8; 8] = [0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF];

    #[test]
    fn odd_length_is_rejected() {
        assert_eq!(NibbleArray::new(3), Err(LightError::OddNibbleCount(3)));
    }

    #[test]
    fn out_of_range_writes_fail() {
        let mut nibbles = NibbleArray::new(2).unwrap();
        assert_eq!(nibbles.set(0, -1), Err(LightError::NibbleOutOfRange(-1)));
        assert_eq!(nibbles.set(0, 16), Err(LightError::NibbleOutOfRange(16)));
        assert!(nibbles.is_zero());
    }

    #[test]
    fn get_reads_high_nibble_first() {
        let nibbles = NibbleArray::from_bytes(PACKED.to_vec());
        assert_eq!(nibbles.len(), 16);
        for i in 0..16 {
            assert_eq!(nibbles.get(i), i as u8);
        }
    }

    #[test]
    fn set_packs_like_get_reads() {
        let mut nibbles = NibbleArray::new(16).unwrap();
        for i in 0..16 {
            nibbles.set(i, i as i32).unwrap();
        }
        for i in 0..16 {
            assert_eq!(nibbles.get(i), i as u8);
        }
        assert_eq!(nibbles.as_bytes(), &PACKED);
    }

    #[test]
    fn set_leaves_neighbour_untouched() {
        let mut nibbles = NibbleArray::new(4).unwrap();
        for value in 0..=15 {
            nibbles.set(1, 9).unwrap();
            nibbles.set(0, value).unwrap();
            assert_eq!(nibbles.get(0), value as u8);
            assert_eq!(nibbles.get(1), 9);
        }
        nibbles.set(0, 0).unwrap();
        nibbles.set(1, 0).unwrap();
        assert!(nibbles.is_zero());
    }
}
