//! StackMapTable frames (JVMS 4.7.4)
//!
//! Frames are kept in the exact compressed form they were read in so an
//! untouched table re-encodes byte for byte.

use super::encoder::{BytecodeReader, BytecodeWriter, DecodeError};

/// Verification type of a local or stack slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationType {
    /// `Top`
    Top,
    /// `Integer`
    Integer,
    /// `Float`
    Float,
    /// `Double`
    Double,
    /// `Long`
    Long,
    /// `Null`
    Null,
    /// `UninitializedThis`
    UninitializedThis,
    /// Reference to the class at this constant pool index
    Object(u16),
    /// Result of the `new` instruction at this offset
    Uninitialized(u16),
}

impl VerificationType {
    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let offset = reader.position();
        Ok(match reader.read_u8()? {
            0 => Self::Top,
            1 => Self::Integer,
            2 => Self::Float,
            3 => Self::Double,
            4 => Self::Long,
            5 => Self::Null,
            6 => Self::UninitializedThis,
            7 => Self::Object(reader.read_u16()?),
            8 => Self::Uninitialized(reader.read_u16()?),
            _ => {
                return Err(DecodeError::Malformed {
                    what: "verification type",
                    offset,
                })
            }
        })
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        match *self {
            Self::Top => writer.emit_u8(0),
            Self::Integer => writer.emit_u8(1),
            Self::Float => writer.emit_u8(2),
            Self::Double => writer.emit_u8(3),
            Self::Long => writer.emit_u8(4),
            Self::Null => writer.emit_u8(5),
            Self::UninitializedThis => writer.emit_u8(6),
            Self::Object(index) => {
                writer.emit_u8(7);
                writer.emit_u16(index);
            }
            Self::Uninitialized(offset) => {
                writer.emit_u8(8);
                writer.emit_u16(offset);
            }
        }
    }
}

/// One stack map frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackMapFrame {
    /// `same_frame` (types 0-63)
    Same {
        /// Offset delta
        offset_delta: u8,
    },
    /// `same_locals_1_stack_item_frame` (types 64-127)
    SameLocals1StackItem {
        /// Offset delta
        offset_delta: u8,
        /// The single stack entry
        stack: VerificationType,
    },
    /// `same_locals_1_stack_item_frame_extended` (type 247)
    SameLocals1StackItemExtended {
        /// Offset delta
        offset_delta: u16,
        /// The single stack entry
        stack: VerificationType,
    },
    /// `chop_frame` (types 248-250)
    Chop {
        /// Number of chopped locals (1-3)
        chopped: u8,
        /// Offset delta
        offset_delta: u16,
    },
    /// `same_frame_extended` (type 251)
    SameExtended {
        /// Offset delta
        offset_delta: u16,
    },
    /// `append_frame` (types 252-254)
    Append {
        /// Offset delta
        offset_delta: u16,
        /// Appended locals (1-3)
        locals: Vec<VerificationType>,
    },
    /// `full_frame` (type 255)
    Full {
        /// Offset delta
        offset_delta: u16,
        /// All locals
        locals: Vec<VerificationType>,
        /// All stack entries
        stack: Vec<VerificationType>,
    },
}

impl StackMapFrame {
    /// Every verification type carried by the frame
    pub fn types_mut(&mut self) -> Vec<&mut VerificationType> {
        match self {
            Self::Same { .. } | Self::Chop { .. } | Self::SameExtended { .. } => Vec::new(),
            Self::SameLocals1StackItem { stack, .. }
            | Self::SameLocals1StackItemExtended { stack, .. } => vec![stack],
            Self::Append { locals, .. } => locals.iter_mut().collect(),
            Self::Full { locals, stack, .. } => locals.iter_mut().chain(stack.iter_mut()).collect(),
        }
    }

    /// Every verification type carried by the frame
    pub fn types(&self) -> Vec<&VerificationType> {
        match self {
            Self::Same { .. } | Self::Chop { .. } | Self::SameExtended { .. } => Vec::new(),
            Self::SameLocals1StackItem { stack, .. }
            | Self::SameLocals1StackItemExtended { stack, .. } => vec![stack],
            Self::Append { locals, .. } => locals.iter().collect(),
            Self::Full { locals, stack, .. } => locals.iter().chain(stack.iter()).collect(),
        }
    }
}

fn decode_types(reader: &mut BytecodeReader<'_>, count: usize) -> Result<Vec<VerificationType>, DecodeError> {
    (0..count).map(|_| VerificationType::decode(reader)).collect()
}

fn encode_types(writer: &mut BytecodeWriter, types: &[VerificationType]) {
    for ty in types {
        ty.encode(writer);
    }
}

/// Decode the body of a StackMapTable attribute
pub fn decode_frames(reader: &mut BytecodeReader<'_>) -> Result<Vec<StackMapFrame>, DecodeError> {
    let count = reader.read_u16()? as usize;
    let mut frames = Vec::with_capacity(count);
    for _ in 0..count {
        let offset = reader.position();
        let frame_type = reader.read_u8()?;
        let frame = match frame_type {
            0..=63 => StackMapFrame::Same {
                offset_delta: frame_type,
            },
            64..=127 => StackMapFrame::SameLocals1StackItem {
                offset_delta: frame_type - 64,
                stack: VerificationType::decode(reader)?,
            },
            247 => StackMapFrame::SameLocals1StackItemExtended {
                offset_delta: reader.read_u16()?,
                stack: VerificationType::decode(reader)?,
            },
            248..=250 => StackMapFrame::Chop {
                chopped: 251 - frame_type,
                offset_delta: reader.read_u16()?,
            },
            251 => StackMapFrame::SameExtended {
                offset_delta: reader.read_u16()?,
            },
            252..=254 => {
                let offset_delta = reader.read_u16()?;
                let locals = decode_types(reader, (frame_type - 251) as usize)?;
                StackMapFrame::Append {
                    offset_delta,
                    locals,
                }
            }
            255 => {
                let offset_delta = reader.read_u16()?;
                let local_count = reader.read_u16()? as usize;
                let locals = decode_types(reader, local_count)?;
                let stack_count = reader.read_u16()? as usize;
                let stack = decode_types(reader, stack_count)?;
                StackMapFrame::Full {
                    offset_delta,
                    locals,
                    stack,
                }
            }
            _ => {
                return Err(DecodeError::Malformed {
                    what: "stack map frame type",
                    offset,
                })
            }
        };
        frames.push(frame);
    }
    Ok(frames)
}

/// Encode the body of a StackMapTable attribute
pub fn encode_frames(writer: &mut BytecodeWriter, frames: &[StackMapFrame]) {
    writer.emit_u16(frames.len() as u16);
    for frame in frames {
        match frame {
            StackMapFrame::Same { offset_delta } => writer.emit_u8(*offset_delta),
            StackMapFrame::SameLocals1StackItem {
                offset_delta,
                stack,
            } => {
                writer.emit_u8(64 + offset_delta);
                stack.encode(writer);
            }
            StackMapFrame::SameLocals1StackItemExtended {
                offset_delta,
                stack,
            } => {
                writer.emit_u8(247);
                writer.emit_u16(*offset_delta);
                stack.encode(writer);
            }
            StackMapFrame::Chop {
                chopped,
                offset_delta,
            } => {
                writer.emit_u8(251 - chopped);
                writer.emit_u16(*offset_delta);
            }
            StackMapFrame::SameExtended { offset_delta } => {
                writer.emit_u8(251);
                writer.emit_u16(*offset_delta);
            }
            StackMapFrame::Append {
                offset_delta,
                locals,
            } => {
                writer.emit_u8(251 + locals.len() as u8);
                writer.emit_u16(*offset_delta);
                encode_types(writer, locals);
            }
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            } => {
                writer.emit_u8(255);
                writer.emit_u16(*offset_delta);
                writer.emit_u16(locals.len() as u16);
                encode_types(writer, locals);
                writer.emit_u16(stack.len() as u16);
                encode_types(writer, stack);
            }
        }
    }
}

/// Replace `Object(from)` with `Object(to)` in every frame, returning the count
pub fn retarget_object_types(frames: &mut [StackMapFrame], from: u16, to: u16) -> usize {
    let mut replaced = 0;
    for frame in frames.iter_mut() {
        for ty in frame.types_mut() {
            if *ty == VerificationType::Object(from) {
                *ty = VerificationType::Object(to);
                replaced += 1;
            }
        }
    }
    replaced
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames() -> Vec<StackMapFrame> {
        vec![
            StackMapFrame::Same { offset_delta: 3 },
            StackMapFrame::SameLocals1StackItem {
                offset_delta: 2,
                stack: VerificationType::Object(9),
            },
            StackMapFrame::Append {
                offset_delta: 10,
                locals: vec![VerificationType::Integer, VerificationType::Long],
            },
            StackMapFrame::Chop {
                chopped: 2,
                offset_delta: 4,
            },
            StackMapFrame::Full {
                offset_delta: 300,
                locals: vec![VerificationType::Object(9), VerificationType::Top],
                stack: vec![VerificationType::Uninitialized(12), VerificationType::Object(4)],
            },
        ]
    }

    #[test]
    fn test_frames_keep_compressed_form() {
        let frames = frames();
        let mut writer = BytecodeWriter::new();
        encode_frames(&mut writer, &frames);
        let bytes = writer.into_bytes();
        // count, same(3), same_locals_1(66) ...
        assert_eq!(&bytes[..4], &[0, 5, 3, 66]);

        let decoded = decode_frames(&mut BytecodeReader::new(&bytes)).unwrap();
        assert_eq!(decoded, frames);
    }

    #[test]
    fn test_retarget_object_types() {
        let mut frames = frames();
        assert_eq!(retarget_object_types(&mut frames, 9, 20), 2);
        let objects: Vec<_> = frames
            .iter()
            .flat_map(|f| f.types())
            .filter_map(|t| match t {
                VerificationType::Object(i) => Some(*i),
                _ => None,
            })
            .collect();
        assert_eq!(objects, vec![20, 20, 4]);
    }

    #[test]
    fn test_reserved_frame_type() {
        let bytes = [0, 1, 200];
        assert!(matches!(
            decode_frames(&mut BytecodeReader::new(&bytes)),
            Err(DecodeError::Malformed { .. })
        ));
    }
}
