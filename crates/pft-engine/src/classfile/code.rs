//! Instruction stream decoding
//!
//! Decodes a method body into [`Instruction`]s with absolute offsets. Branch
//! targets are resolved to absolute offsets so analyses never deal with the
//! relative encoding.

use super::encoder::{BytecodeReader, DecodeError};
use super::opcode::{OperandLayout, Opcode};

/// Decoded operand of a single instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// No operand
    None,
    /// Immediate value (`bipush`, `sipush`, `newarray` type code)
    Immediate(i32),
    /// Local variable slot
    Local(u16),
    /// Constant pool index
    Constant(u16),
    /// `iinc` slot and delta
    Iinc {
        /// Local variable slot
        index: u16,
        /// Signed increment
        delta: i16,
    },
    /// Absolute branch target
    Branch(usize),
    /// `invokeinterface` constant and argument count byte
    Interface {
        /// InterfaceMethodref index
        index: u16,
        /// Argument slot count including the receiver
        count: u8,
    },
    /// `multianewarray` constant and dimensions
    MultiArray {
        /// Class index
        index: u16,
        /// Number of dimensions
        dimensions: u8,
    },
    /// `tableswitch` targets
    Table {
        /// Default target
        default: usize,
        /// Lowest key
        low: i32,
        /// Targets for `low..=high`
        targets: Vec<usize>,
    },
    /// `lookupswitch` targets
    Lookup {
        /// Default target
        default: usize,
        /// `(key, target)` pairs
        pairs: Vec<(i32, usize)>,
    },
}

/// One decoded instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Offset of the opcode byte (of the `wide` prefix for widened forms)
    pub offset: usize,
    /// Opcode (the modified opcode for widened forms)
    pub opcode: Opcode,
    /// Decoded operand
    pub operand: Operand,
    /// Encoded length in bytes
    pub length: usize,
    /// Whether the instruction carries a `wide` prefix
    pub wide: bool,
}

impl Instruction {
    /// Constant pool index referenced by the instruction, if any
    pub fn constant_index(&self) -> Option<u16> {
        match self.operand {
            Operand::Constant(index)
            | Operand::Interface { index, .. }
            | Operand::MultiArray { index, .. } => Some(index),
            _ => None,
        }
    }

    /// Absolute offsets this instruction may jump to
    pub fn branch_targets(&self) -> Vec<usize> {
        match &self.operand {
            Operand::Branch(target) => vec![*target],
            Operand::Table {
                default, targets, ..
            } => std::iter::once(*default).chain(targets.iter().copied()).collect(),
            Operand::Lookup { default, pairs } => std::iter::once(*default)
                .chain(pairs.iter().map(|(_, t)| *t))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Local slot read or written by the instruction
    pub fn local_index(&self) -> Option<u16> {
        match self.operand {
            Operand::Local(index) | Operand::Iinc { index, .. } => Some(index),
            _ => self.opcode.implicit_local(),
        }
    }

    /// Offset where the two-byte constant index operand starts
    pub fn constant_operand_offset(&self) -> usize {
        self.offset + 1
    }
}

fn branch(base: usize, delta: i64, offset: usize) -> Result<usize, DecodeError> {
    let target = base as i64 + delta;
    if target < 0 {
        return Err(DecodeError::Malformed {
            what: "branch target",
            offset,
        });
    }
    Ok(target as usize)
}

/// Decode every instruction of a method body
pub fn decode_instructions(code: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
    let mut instructions = Vec::new();
    let mut reader = BytecodeReader::new(code);

    while reader.has_more() {
        let offset = reader.position();
        let byte = reader.read_u8()?;
        let opcode = Opcode::from_u8(byte).ok_or(DecodeError::InvalidOpcode(byte, offset))?;

        let (opcode, operand, wide) = match opcode.operand_layout() {
            OperandLayout::None => (opcode, Operand::None, false),
            OperandLayout::Byte => (opcode, Operand::Immediate(reader.read_i8()? as i32), false),
            OperandLayout::Short => (opcode, Operand::Immediate(reader.read_i16()? as i32), false),
            OperandLayout::Local => (opcode, Operand::Local(reader.read_u8()? as u16), false),
            OperandLayout::ConstU8 => (opcode, Operand::Constant(reader.read_u8()? as u16), false),
            OperandLayout::ConstU16 => (opcode, Operand::Constant(reader.read_u16()?), false),
            OperandLayout::Iinc => (
                opcode,
                Operand::Iinc {
                    index: reader.read_u8()? as u16,
                    delta: reader.read_i8()? as i16,
                },
                false,
            ),
            OperandLayout::Branch16 => {
                let delta = reader.read_i16()? as i64;
                (opcode, Operand::Branch(branch(offset, delta, offset)?), false)
            }
            OperandLayout::Branch32 => {
                let delta = reader.read_i32()? as i64;
                (opcode, Operand::Branch(branch(offset, delta, offset)?), false)
            }
            OperandLayout::Interface => {
                let index = reader.read_u16()?;
                let count = reader.read_u8()?;
                reader.skip(1)?;
                (opcode, Operand::Interface { index, count }, false)
            }
            OperandLayout::Dynamic => {
                let index = reader.read_u16()?;
                reader.skip(2)?;
                (opcode, Operand::Constant(index), false)
            }
            OperandLayout::MultiArray => {
                let index = reader.read_u16()?;
                let dimensions = reader.read_u8()?;
                (opcode, Operand::MultiArray { index, dimensions }, false)
            }
            OperandLayout::TableSwitch => {
                skip_padding(&mut reader)?;
                let default = branch(offset, reader.read_i32()? as i64, offset)?;
                let low = reader.read_i32()?;
                let high = reader.read_i32()?;
                if high < low {
                    return Err(DecodeError::Malformed {
                        what: "tableswitch bounds",
                        offset,
                    });
                }
                let count = (high as i64 - low as i64 + 1) as usize;
                if count > reader.remaining() / 4 {
                    return Err(DecodeError::UnexpectedEof {
                        offset: reader.position(),
                        needed: count * 4,
                    });
                }
                let mut targets = Vec::with_capacity(count);
                for _ in 0..count {
                    targets.push(branch(offset, reader.read_i32()? as i64, offset)?);
                }
                (opcode, Operand::Table { default, low, targets }, false)
            }
            OperandLayout::LookupSwitch => {
                skip_padding(&mut reader)?;
                let default = branch(offset, reader.read_i32()? as i64, offset)?;
                let npairs = reader.read_i32()?;
                if npairs < 0 || npairs as usize > reader.remaining() / 8 {
                    return Err(DecodeError::Malformed {
                        what: "lookupswitch pair count",
                        offset,
                    });
                }
                let mut pairs = Vec::with_capacity(npairs as usize);
                for _ in 0..npairs {
                    let key = reader.read_i32()?;
                    pairs.push((key, branch(offset, reader.read_i32()? as i64, offset)?));
                }
                (opcode, Operand::Lookup { default, pairs }, false)
            }
            OperandLayout::Wide => {
                let inner_byte = reader.read_u8()?;
                let inner = Opcode::from_u8(inner_byte)
                    .filter(|op| matches!(op.operand_layout(), OperandLayout::Local | OperandLayout::Iinc))
                    .ok_or(DecodeError::InvalidOpcode(inner_byte, offset + 1))?;
                let index = reader.read_u16()?;
                let operand = if inner == Opcode::Iinc {
                    Operand::Iinc {
                        index,
                        delta: reader.read_i16()?,
                    }
                } else {
                    Operand::Local(index)
                };
                (inner, operand, true)
            }
        };

        instructions.push(Instruction {
            offset,
            opcode,
            operand,
            length: reader.position() - offset,
            wide,
        });
    }

    Ok(instructions)
}

/// Switch operands are aligned to a multiple of four from the start of the code
fn skip_padding(reader: &mut BytecodeReader<'_>) -> Result<(), DecodeError> {
    let padding = (4 - reader.position() % 4) % 4;
    reader.skip(padding)
}
