/// A contiguous range of bits inside a 32-bit register word.
///
/// Register layouts are described as a list of `BitField` constants, one per
/// hardware field, so that packing and unpacking share the same definition.
///
/// # Examples
///
/// ```
/// use ispiq_hw::BitField;
///
/// const NUM_MESHGAIN_H: BitField = BitField::new(0, 6);
/// const NUM_MESHGAIN_V: BitField = BitField::new(8, 6);
///
/// let mut word = 0;
/// NUM_MESHGAIN_H.set(&mut word, 15);
/// NUM_MESHGAIN_V.set(&mut word, 11);
///
/// assert_eq!(word, 0x0b0f);
/// assert_eq!(NUM_MESHGAIN_V.get(word), 11);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitField {
    /// Position of the least significant bit of the field.
    pub offset: u32,
    /// Number of bits of the field.
    pub width: u32,
}

impl BitField {
    /// Creates a new bit-field.
    ///
    /// Panics at compile time when used in a `const` and the field does not fit in 32 bits.
    pub const fn new(offset: u32, width: u32) -> Self {
        assert!(width > 0 && width <= 32 && offset + width <= 32);
        Self { offset, width }
    }

    /// Returns the unshifted mask of the field.
    #[inline]
    pub const fn mask(&self) -> u32 {
        if self.width == 32 {
            u32::MAX
        } else {
            (1 << self.width) - 1
        }
    }

    /// Returns the largest value the field can hold.
    #[inline]
    pub const fn max_value(&self) -> u32 {
        self.mask()
    }

    /// Returns `word` with the field replaced by `value`.
    ///
    /// Bits of `value` above the field width are discarded.
    #[inline]
    pub const fn insert(&self, word: u32, value: u32) -> u32 {
        let shifted_mask = self.mask() << self.offset;
        (word & !shifted_mask) | ((value & self.mask()) << self.offset)
    }

    /// Writes `value` into the field of `word`.
    #[inline]
    pub fn set(&self, word: &mut u32, value: u32) {
        *word = self.insert(*word, value);
    }

    /// Reads the field out of `word`.
    #[inline]
    pub const fn get(&self, word: u32) -> u32 {
        (word >> self.offset) & self.mask()
    }

    /// Saturates `value` to the range of the field.
    #[inline]
    pub fn saturate(&self, value: u32) -> u32 {
        value.min(self.mask())
    }
}

#[cfg(test)]
mod tests {
    use super::BitField;

    #[test]
    fn insert_keeps_neighbours() {
        let field = BitField::new(4, 4);
        let word = field.insert(0xffff_ffff, 0x5);
        assert_eq!(word, 0xffff_ff5f);
        assert_eq!(field.get(word), 0x5);
    }

    #[test]
    fn insert_truncates_wide_values() {
        let field = BitField::new(0, 3);
        assert_eq!(field.insert(0, 0b1111), 0b111);
    }

    #[test]
    fn full_word_field() {
        let field = BitField::new(0, 32);
        assert_eq!(field.mask(), u32::MAX);
        assert_eq!(field.get(field.insert(0, 0xdead_beef)), 0xdead_beef);
    }

    #[test]
    fn saturate() {
        let field = BitField::new(12, 10);
        assert_eq!(field.saturate(5000), 1023);
        assert_eq!(field.saturate(17), 17);
    }
}
