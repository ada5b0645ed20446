//! Errors raised by the in-memory light structures.

/// Misuse of a nibble array or chunk light grid.
///
/// Every variant is an invalid-argument failure: the caller passed a value the
/// structure cannot represent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LightError {
    /// Nibble arrays pack two values per byte, so the value count must be even.
    #[error("nibble array length must be even, got {0}")]
    OddNibbleCount(usize),

    /// A nibble holds 0..=15.
    #[error("nibble value {0} out of range 0..=15")]
    NibbleOutOfRange(i32),

    /// The vertical section index (`y >> 4`) is outside 0..16.
    #[error("section index {0} out of range 0..16")]
    SectionOutOfRange(i32),
}
