//! Runtime-visible annotations (JVMS 4.7.16)

use super::constants::ConstantPool;
use super::encoder::{BytecodeReader, BytecodeWriter, DecodeError};

/// One annotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Utf8 index of the annotation type descriptor
    pub type_index: u16,
    /// `(element name index, value)` pairs
    pub elements: Vec<(u16, ElementValue)>,
}

/// Annotation element value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementValue {
    /// Primitive or string constant (`B C D F I J S Z s`)
    Const {
        /// Tag character
        tag: u8,
        /// Constant pool index of the value
        index: u16,
    },
    /// Enum constant
    Enum {
        /// Utf8 index of the enum type descriptor
        type_name_index: u16,
        /// Utf8 index of the constant name
        const_name_index: u16,
    },
    /// Class literal (Utf8 index of the return descriptor)
    Class(u16),
    /// Nested annotation
    Annotation(Box<Annotation>),
    /// Array of values
    Array(Vec<ElementValue>),
}

impl Annotation {
    /// Descriptor of the annotation type, e.g. `Lpft/PublicForTests;`
    pub fn type_descriptor<'a>(&self, pool: &'a ConstantPool) -> Option<&'a str> {
        pool.utf8(self.type_index).ok()
    }

    /// Value of a string-valued element
    pub fn string_element<'a>(&self, pool: &'a ConstantPool, name: &str) -> Option<&'a str> {
        self.elements.iter().find_map(|(name_index, value)| {
            if pool.utf8(*name_index).ok() != Some(name) {
                return None;
            }
            match value {
                ElementValue::Const { tag: b's', index } => pool.utf8(*index).ok(),
                _ => None,
            }
        })
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let type_index = reader.read_u16()?;
        let count = reader.read_u16()? as usize;
        let mut elements = Vec::with_capacity(count);
        for _ in 0..count {
            let name_index = reader.read_u16()?;
            elements.push((name_index, ElementValue::decode(reader)?));
        }
        Ok(Self {
            type_index,
            elements,
        })
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u16(self.type_index);
        writer.emit_u16(self.elements.len() as u16);
        for (name_index, value) in &self.elements {
            writer.emit_u16(*name_index);
            value.encode(writer);
        }
    }
}

impl ElementValue {
    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let offset = reader.position();
        let tag = reader.read_u8()?;
        Ok(match tag {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => ElementValue::Const {
                tag,
                index: reader.read_u16()?,
            },
            b'e' => ElementValue::Enum {
                type_name_index: reader.read_u16()?,
                const_name_index: reader.read_u16()?,
            },
            b'c' => ElementValue::Class(reader.read_u16()?),
            b'@' => ElementValue::Annotation(Box::new(Annotation::decode(reader)?)),
            b'[' => {
                let count = reader.read_u16()? as usize;
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    values.push(ElementValue::decode(reader)?);
                }
                ElementValue::Array(values)
            }
            _ => {
                return Err(DecodeError::Malformed {
                    what: "element value tag",
                    offset,
                })
            }
        })
    }

    fn encode(&self, writer: &mut BytecodeWriter) {
        match self {
            ElementValue::Const { tag, index } => {
                writer.emit_u8(*tag);
                writer.emit_u16(*index);
            }
            ElementValue::Enum {
                type_name_index,
                const_name_index,
            } => {
                writer.emit_u8(b'e');
                writer.emit_u16(*type_name_index);
                writer.emit_u16(*const_name_index);
            }
            ElementValue::Class(index) => {
                writer.emit_u8(b'c');
                writer.emit_u16(*index);
            }
            ElementValue::Annotation(annotation) => {
                writer.emit_u8(b'@');
                annotation.encode(writer);
            }
            ElementValue::Array(values) => {
                writer.emit_u8(b'[');
                writer.emit_u16(values.len() as u16);
                for value in values {
                    value.encode(writer);
                }
            }
        }
    }
}

/// Decode a `RuntimeVisibleAnnotations` body
pub fn decode_annotations(body: &[u8]) -> Result<Vec<Annotation>, DecodeError> {
    let mut reader = BytecodeReader::new(body);
    let count = reader.read_u16()? as usize;
    let mut annotations = Vec::with_capacity(count);
    for _ in 0..count {
        annotations.push(Annotation::decode(&mut reader)?);
    }
    if reader.has_more() {
        return Err(DecodeError::Malformed {
            what: "annotations length",
            offset: reader.position(),
        });
    }
    Ok(annotations)
}

/// Encode a `RuntimeVisibleAnnotations` body
pub fn encode_annotations(annotations: &[Annotation]) -> Vec<u8> {
    let mut writer = BytecodeWriter::new();
    writer.emit_u16(annotations.len() as u16);
    for annotation in annotations {
        annotation.encode(&mut writer);
    }
    writer.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_element_lookup() {
        let mut pool = ConstantPool::new();
        let type_index = pool.add_utf8("Lpft/PublicForTests;").unwrap();
        let value_name = pool.add_utf8("value").unwrap();
        let other_name = pool.add_utf8("other").unwrap();
        let iface = pool.add_utf8("pkg.Iface").unwrap();
        let enum_type = pool.add_utf8("Lpkg/Level;").unwrap();
        let enum_const = pool.add_utf8("HIGH").unwrap();

        let annotation = Annotation {
            type_index,
            elements: vec![
                (
                    other_name,
                    ElementValue::Array(vec![
                        ElementValue::Enum {
                            type_name_index: enum_type,
                            const_name_index: enum_const,
                        },
                        ElementValue::Class(enum_type),
                    ]),
                ),
                (
                    value_name,
                    ElementValue::Const {
                        tag: b's',
                        index: iface,
                    },
                ),
            ],
        };

        let body = encode_annotations(std::slice::from_ref(&annotation));
        let decoded = decode_annotations(&body).unwrap();
        assert_eq!(decoded, vec![annotation]);
        assert_eq!(decoded[0].type_descriptor(&pool), Some("Lpft/PublicForTests;"));
        assert_eq!(decoded[0].string_element(&pool, "value"), Some("pkg.Iface"));
        assert_eq!(decoded[0].string_element(&pool, "other"), None);
        assert_eq!(decoded[0].string_element(&pool, "missing"), None);
    }

    #[test]
    fn test_nested_annotation() {
        let nested = Annotation {
            type_index: 1,
            elements: vec![(2, ElementValue::Const { tag: b'I', index: 3 })],
        };
        let outer = Annotation {
            type_index: 4,
            elements: vec![(5, ElementValue::Annotation(Box::new(nested)))],
        };
        let body = encode_annotations(std::slice::from_ref(&outer));
        assert_eq!(decode_annotations(&body).unwrap(), vec![outer]);
    }

    #[test]
    fn test_bad_element_tag() {
        let body = [0, 1, 0, 1, 0, 1, 0, 2, b'x', 0, 0];
        assert!(matches!(
            decode_annotations(&body),
            Err(DecodeError::Malformed { what: "element value tag", .. })
        ));
    }
}
