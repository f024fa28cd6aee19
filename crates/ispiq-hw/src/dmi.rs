use crate::{bitfield::BitField, error::HwError};

/// Bit layout of one 32-bit DMI entry made of two sub-fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmiEntryLayout {
    /// Sub-field stored in the low bits.
    pub low: BitField,
    /// Sub-field stored above `low`.
    pub high: BitField,
}

impl DmiEntryLayout {
    /// Two correlated 13-bit channel gains (e.g. R and Gr) in one word.
    pub const CHANNEL_PAIR: Self = Self::new(BitField::new(0, 13), BitField::new(13, 13));

    /// A 12-bit grid gain with a 14-bit grid mean above it.
    pub const GAIN_MEAN: Self = Self::new(BitField::new(0, 12), BitField::new(12, 14));

    /// Creates a new entry layout.
    pub const fn new(low: BitField, high: BitField) -> Self {
        assert!(low.offset + low.width <= high.offset);
        Self { low, high }
    }

    /// Packs two sub-field values into one DMI word.
    #[inline]
    pub const fn pack(&self, low: u32, high: u32) -> u32 {
        self.high.insert(self.low.insert(0, low), high)
    }

    /// Splits a DMI word into its two sub-field values.
    #[inline]
    pub const fn unpack(&self, word: u32) -> (u32, u32) {
        (self.low.get(word), self.high.get(word))
    }
}

/// Number of entries of a mesh table with the given mesh gain counts.
///
/// The hardware counts mesh gains as the number of blocks minus one, so the table holds
/// `(mesh_gain_h + 2) * (mesh_gain_v + 2)` grid points.
#[inline]
pub const fn mesh_table_length(mesh_gain_h: u32, mesh_gain_v: u32) -> usize {
    (mesh_gain_h as usize + 2) * (mesh_gain_v as usize + 2)
}

/// Encodes two parallel sub-field tables into DMI words.
///
/// # Arguments
///
/// * `layout` - The bit layout of one entry.
/// * `low` - Values stored in the low sub-field, in row-major order.
/// * `high` - Values stored in the high sub-field, in row-major order.
/// * `dst` - Destination words; only the first `low.len()` are written.
///
/// # Returns
///
/// The number of words written.
///
/// # Errors
///
/// Fails without writing anything if the tables differ in length or `dst` is too short.
pub fn encode_table(
    layout: &DmiEntryLayout,
    low: &[u16],
    high: &[u16],
    dst: &mut [u32],
) -> Result<usize, HwError> {
    if low.len() != high.len() {
        return Err(HwError::TableLengthMismatch(low.len(), high.len()));
    }
    if dst.len() < low.len() {
        return Err(HwError::PackingOverflow {
            required: low.len(),
            available: dst.len(),
        });
    }

    dst.iter_mut()
        .zip(low.iter().zip(high.iter()))
        .for_each(|(word, (&lo, &hi))| *word = layout.pack(lo as u32, hi as u32));

    Ok(low.len())
}

/// A caller-owned DMI backing buffer.
///
/// Modules write their LUTs into a region of the buffer and reference it from the command
/// stream through the buffer handle and a byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmiBuffer {
    handle: u32,
    words: Vec<u32>,
}

impl DmiBuffer {
    /// Creates a zeroed buffer of `capacity_dwords` dwords.
    pub fn new(handle: u32, capacity_dwords: usize) -> Self {
        Self {
            handle,
            words: vec![0; capacity_dwords],
        }
    }

    /// The handle the command stream uses to reference this buffer.
    #[inline]
    pub fn handle(&self) -> u32 {
        self.handle
    }

    /// Capacity in dwords.
    #[inline]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Returns true if the buffer has no capacity.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// The buffer content.
    #[inline]
    pub fn as_slice(&self) -> &[u32] {
        &self.words
    }

    /// Checks that `len` dwords starting at `offset` are inside the buffer.
    ///
    /// An offset past the end is rejected even for an empty region.
    pub fn ensure_region(&self, offset: usize, len: usize) -> Result<(), HwError> {
        let available = self.words.len().saturating_sub(offset);
        if offset > self.words.len() || len > available {
            return Err(HwError::PackingOverflow {
                required: len,
                available,
            });
        }
        Ok(())
    }

    /// Borrows `len` dwords starting at `offset`.
    pub fn region(&self, offset: usize, len: usize) -> Result<&[u32], HwError> {
        self.ensure_region(offset, len)?;
        Ok(&self.words[offset..offset + len])
    }

    /// Mutably borrows `len` dwords starting at `offset`.
    pub fn region_mut(&mut self, offset: usize, len: usize) -> Result<&mut [u32], HwError> {
        self.ensure_region(offset, len)?;
        Ok(&mut self.words[offset..offset + len])
    }
}
