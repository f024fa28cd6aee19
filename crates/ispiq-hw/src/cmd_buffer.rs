use crate::error::HwError;

/// Opcode of a register range write.
pub const CMD_OPCODE_REG_RANGE: u32 = 0x01;

/// Opcode of a DMI table write.
pub const CMD_OPCODE_DMI: u32 = 0x02;

const OPCODE_SHIFT: u32 = 24;
const PAYLOAD_MASK: u32 = 0x00ff_ffff;
const MAX_RANGE_DWORDS: usize = 0xffff;
const DMI_WRITE_DWORDS: usize = 5;

/// Number of command dwords needed to write `count` consecutive registers.
#[inline]
pub const fn required_write_reg_range_size_in_dwords(count: usize) -> usize {
    count + 2
}

/// Number of command dwords needed to issue one DMI table write.
#[inline]
pub const fn required_write_dmi_size_in_dwords() -> usize {
    DMI_WRITE_DWORDS
}

/// A DMI table write, pointing the hardware at a table stored in a DMI buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmiWrite {
    /// Register used to configure the DMI transfer.
    pub dmi_cfg_register: u32,
    /// Selector of the LUT inside the hardware block.
    pub selector: u32,
    /// Handle of the DMI backing buffer.
    pub buffer: u32,
    /// Byte offset of the table inside the DMI buffer.
    pub offset_bytes: u32,
    /// Byte length of the table.
    pub length_bytes: u32,
}

/// One decoded command of a command stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Consecutive register writes starting at `register`.
    RegRange {
        /// Address of the first register.
        register: u32,
        /// Register values.
        values: Vec<u32>,
    },
    /// A DMI table write.
    Dmi(DmiWrite),
}

/// A hardware command stream with a declared capacity.
///
/// The buffer never grows past the capacity given at construction: every write checks the
/// remaining space first and fails with [`HwError::PackingOverflow`] without touching the
/// stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdBuffer {
    words: Vec<u32>,
    capacity: usize,
}

impl CmdBuffer {
    /// Creates an empty command buffer able to hold `capacity_dwords` dwords.
    pub fn new(capacity_dwords: usize) -> Self {
        Self {
            words: Vec::with_capacity(capacity_dwords),
            capacity: capacity_dwords,
        }
    }

    /// Declared capacity in dwords.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of dwords written so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Returns true if nothing was written.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Dwords still available.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity - self.words.len()
    }

    /// The command stream written so far.
    #[inline]
    pub fn as_slice(&self) -> &[u32] {
        &self.words
    }

    /// Drops every command, keeping the capacity.
    pub fn reset(&mut self) {
        self.words.clear();
    }

    /// Checks that `required` more dwords fit in the buffer.
    pub fn ensure_capacity(&self, required: usize) -> Result<(), HwError> {
        if required > self.remaining() {
            log::trace!(
                "Command buffer full: {required} dwords required, {} of {} left",
                self.remaining(),
                self.capacity()
            );
            return Err(HwError::PackingOverflow {
                required,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    /// Appends a write of `values` to consecutive registers starting at `register`.
    pub fn write_reg_range(&mut self, register: u32, values: &[u32]) -> Result<(), HwError> {
        if values.len() > MAX_RANGE_DWORDS {
            return Err(HwError::RegisterRangeTooLong(values.len()));
        }
        self.ensure_capacity(required_write_reg_range_size_in_dwords(values.len()))?;

        self.words
            .push((CMD_OPCODE_REG_RANGE << OPCODE_SHIFT) | values.len() as u32);
        self.words.push(register);
        self.words.extend_from_slice(values);

        Ok(())
    }

    /// Appends a DMI table write.
    pub fn write_dmi(&mut self, dmi: &DmiWrite) -> Result<(), HwError> {
        self.ensure_capacity(required_write_dmi_size_in_dwords())?;

        self.words
            .push((CMD_OPCODE_DMI << OPCODE_SHIFT) | (dmi.selector & PAYLOAD_MASK));
        self.words.push(dmi.dmi_cfg_register);
        self.words.push(dmi.buffer);
        self.words.push(dmi.offset_bytes);
        self.words.push(dmi.length_bytes);

        Ok(())
    }

    /// Decodes the command stream written so far.
    pub fn commands(&self) -> Result<Vec<Command>, HwError> {
        parse_commands(&self.words)
    }
}

/// Decodes a command stream into its commands.
///
/// # Arguments
///
/// * `words` - The raw command stream.
///
/// # Errors
///
/// Returns [`HwError::MalformedCommand`] with the dword index of the offending header if an
/// opcode is unknown or a command is truncated.
pub fn parse_commands(words: &[u32]) -> Result<Vec<Command>, HwError> {
    let mut commands = Vec::new();
    let mut pos = 0;

    while pos < words.len() {
        let header = words[pos];
        let payload = header & PAYLOAD_MASK;

        match header >> OPCODE_SHIFT {
            CMD_OPCODE_REG_RANGE => {
                let count = payload as usize;
                let end = pos + required_write_reg_range_size_in_dwords(count);
                if end > words.len() {
                    return Err(HwError::MalformedCommand(pos));
                }
                commands.push(Command::RegRange {
                    register: words[pos + 1],
                    values: words[pos + 2..end].to_vec(),
                });
                pos = end;
            }
            CMD_OPCODE_DMI => {
                let end = pos + DMI_WRITE_DWORDS;
                if end > words.len() {
                    return Err(HwError::MalformedCommand(pos));
                }
                commands.push(Command::Dmi(DmiWrite {
                    selector: payload,
                    dmi_cfg_register: words[pos + 1],
                    buffer: words[pos + 2],
                    offset_bytes: words[pos + 3],
                    length_bytes: words[pos + 4],
                }));
                pos = end;
            }
            _ => return Err(HwError::MalformedCommand(pos)),
        }
    }

    Ok(commands)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reg_range_roundtrip() -> Result<(), HwError> {
        let mut cmd = CmdBuffer::new(16);
        cmd.write_reg_range(0x6a4, &[1, 2, 3])?;
        assert_eq!(cmd.len(), required_write_reg_range_size_in_dwords(3));

        let commands = cmd.commands()?;
        assert_eq!(
            commands,
            vec![Command::RegRange {
                register: 0x6a4,
                values: vec![1, 2, 3]
            }]
        );
        Ok(())
    }

    #[test]
    fn dmi_write_layout() -> Result<(), HwError> {
        let dmi = DmiWrite {
            dmi_cfg_register: 0xc24,
            selector: 0x1a,
            buffer: 7,
            offset_bytes: 128,
            length_bytes: 884,
        };
        let mut cmd = CmdBuffer::new(required_write_dmi_size_in_dwords());
        cmd.write_dmi(&dmi)?;
        assert_eq!(cmd.as_slice(), &[0x0200_001a, 0xc24, 7, 128, 884]);
        assert_eq!(cmd.commands()?, vec![Command::Dmi(dmi)]);
        Ok(())
    }

    #[test]
    fn overflow_leaves_stream_untouched() {
        let mut cmd = CmdBuffer::new(4);
        let err = cmd.write_reg_range(0x10, &[1, 2, 3]).unwrap_err();
        assert_eq!(
            err,
            HwError::PackingOverflow {
                required: 5,
                available: 4
            }
        );
        assert!(cmd.is_empty());
    }

    #[test]
    fn truncated_stream_is_rejected() {
        let words = [(CMD_OPCODE_REG_RANGE << 24) | 4, 0x10, 1];
        assert_eq!(parse_commands(&words), Err(HwError::MalformedCommand(0)));
        assert_eq!(parse_commands(&[0xff00_0000]), Err(HwError::MalformedCommand(0)));
    }
}
