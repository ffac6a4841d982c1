//! Constant pool for class files

use super::class::ClassFileError;
use super::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use rustc_hash::FxHashMap;

/// Constant pool tags (JVMS 4.4)
#[allow(missing_docs)]
pub mod tag {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELDREF: u8 = 9;
    pub const METHODREF: u8 = 10;
    pub const INTERFACE_METHODREF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
    pub const METHOD_HANDLE: u8 = 15;
    pub const METHOD_TYPE: u8 = 16;
    pub const DYNAMIC: u8 = 17;
    pub const INVOKE_DYNAMIC: u8 = 18;
    pub const MODULE: u8 = 19;
    pub const PACKAGE: u8 = 20;
}

/// A single constant pool entry
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Placeholder for index 0 and the second slot of long/double entries
    Unusable,
    /// Modified UTF-8 string
    Utf8(String),
    /// 32-bit integer
    Integer(i32),
    /// 32-bit float
    Float(f32),
    /// 64-bit integer (occupies two slots)
    Long(i64),
    /// 64-bit float (occupies two slots)
    Double(f64),
    /// Class reference
    Class {
        /// Utf8 index of the internal name
        name_index: u16,
    },
    /// String literal
    String {
        /// Utf8 index of the contents
        string_index: u16,
    },
    /// Field reference
    Fieldref {
        /// Class index of the owner
        class_index: u16,
        /// NameAndType index
        name_and_type_index: u16,
    },
    /// Class method reference
    Methodref {
        /// Class index of the owner
        class_index: u16,
        /// NameAndType index
        name_and_type_index: u16,
    },
    /// Interface method reference
    InterfaceMethodref {
        /// Class index of the owner
        class_index: u16,
        /// NameAndType index
        name_and_type_index: u16,
    },
    /// Name and descriptor pair
    NameAndType {
        /// Utf8 index of the name
        name_index: u16,
        /// Utf8 index of the descriptor
        descriptor_index: u16,
    },
    /// Method handle
    MethodHandle {
        /// Reference kind (1-9)
        reference_kind: u8,
        /// Index of the referenced field/method constant
        reference_index: u16,
    },
    /// Method type
    MethodType {
        /// Utf8 index of the method descriptor
        descriptor_index: u16,
    },
    /// Dynamically computed constant
    Dynamic {
        /// Index into the BootstrapMethods attribute
        bootstrap_method_attr_index: u16,
        /// NameAndType index
        name_and_type_index: u16,
    },
    /// Dynamically computed call site
    InvokeDynamic {
        /// Index into the BootstrapMethods attribute
        bootstrap_method_attr_index: u16,
        /// NameAndType index
        name_and_type_index: u16,
    },
    /// Module name
    Module {
        /// Utf8 index of the module name
        name_index: u16,
    },
    /// Package name
    Package {
        /// Utf8 index of the package name
        name_index: u16,
    },
}

impl Constant {
    /// Number of pool slots the entry occupies
    pub fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }

    /// Encode the tag and payload; unusable slots encode to nothing
    pub fn encode(&self, writer: &mut BytecodeWriter) {
        match self {
            Constant::Unusable => {}
            Constant::Utf8(s) => {
                writer.emit_u8(tag::UTF8);
                writer.emit_utf8(s);
            }
            Constant::Integer(v) => {
                writer.emit_u8(tag::INTEGER);
                writer.emit_i32(*v);
            }
            Constant::Float(v) => {
                writer.emit_u8(tag::FLOAT);
                writer.emit_u32(v.to_bits());
            }
            Constant::Long(v) => {
                writer.emit_u8(tag::LONG);
                writer.emit_i64(*v);
            }
            Constant::Double(v) => {
                writer.emit_u8(tag::DOUBLE);
                writer.emit_i64(v.to_bits() as i64);
            }
            Constant::Class { name_index } => {
                writer.emit_u8(tag::CLASS);
                writer.emit_u16(*name_index);
            }
            Constant::String { string_index } => {
                writer.emit_u8(tag::STRING);
                writer.emit_u16(*string_index);
            }
            Constant::Fieldref {
                class_index,
                name_and_type_index,
            } => {
                writer.emit_u8(tag::FIELDREF);
                writer.emit_u16(*class_index);
                writer.emit_u16(*name_and_type_index);
            }
            Constant::Methodref {
                class_index,
                name_and_type_index,
            } => {
                writer.emit_u8(tag::METHODREF);
                writer.emit_u16(*class_index);
                writer.emit_u16(*name_and_type_index);
            }
            Constant::InterfaceMethodref {
                class_index,
                name_and_type_index,
            } => {
                writer.emit_u8(tag::INTERFACE_METHODREF);
                writer.emit_u16(*class_index);
                writer.emit_u16(*name_and_type_index);
            }
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => {
                writer.emit_u8(tag::NAME_AND_TYPE);
                writer.emit_u16(*name_index);
                writer.emit_u16(*descriptor_index);
            }
            Constant::MethodHandle {
                reference_kind,
                reference_index,
            } => {
                writer.emit_u8(tag::METHOD_HANDLE);
                writer.emit_u8(*reference_kind);
                writer.emit_u16(*reference_index);
            }
            Constant::MethodType { descriptor_index } => {
                writer.emit_u8(tag::METHOD_TYPE);
                writer.emit_u16(*descriptor_index);
            }
            Constant::Dynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            } => {
                writer.emit_u8(tag::DYNAMIC);
                writer.emit_u16(*bootstrap_method_attr_index);
                writer.emit_u16(*name_and_type_index);
            }
            Constant::InvokeDynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            } => {
                writer.emit_u8(tag::INVOKE_DYNAMIC);
                writer.emit_u16(*bootstrap_method_attr_index);
                writer.emit_u16(*name_and_type_index);
            }
            Constant::Module { name_index } => {
                writer.emit_u8(tag::MODULE);
                writer.emit_u16(*name_index);
            }
            Constant::Package { name_index } => {
                writer.emit_u8(tag::PACKAGE);
                writer.emit_u16(*name_index);
            }
        }
    }

    /// Short human-readable kind name
    pub fn kind_name(&self) -> &'static str {
        match self {
            Constant::Unusable => "unusable",
            Constant::Utf8(_) => "Utf8",
            Constant::Integer(_) => "Integer",
            Constant::Float(_) => "Float",
            Constant::Long(_) => "Long",
            Constant::Double(_) => "Double",
            Constant::Class { .. } => "Class",
            Constant::String { .. } => "String",
            Constant::Fieldref { .. } => "Fieldref",
            Constant::Methodref { .. } => "Methodref",
            Constant::InterfaceMethodref { .. } => "InterfaceMethodref",
            Constant::NameAndType { .. } => "NameAndType",
            Constant::MethodHandle { .. } => "MethodHandle",
            Constant::MethodType { .. } => "MethodType",
            Constant::Dynamic { .. } => "Dynamic",
            Constant::InvokeDynamic { .. } => "InvokeDynamic",
            Constant::Module { .. } => "Module",
            Constant::Package { .. } => "Package",
        }
    }
}

/// Method handle reference kinds (JVMS 5.4.3.5)
#[allow(missing_docs)]
pub mod ref_kind {
    pub const GET_FIELD: u8 = 1;
    pub const GET_STATIC: u8 = 2;
    pub const PUT_FIELD: u8 = 3;
    pub const PUT_STATIC: u8 = 4;
    pub const INVOKE_VIRTUAL: u8 = 5;
    pub const INVOKE_STATIC: u8 = 6;
    pub const INVOKE_SPECIAL: u8 = 7;
    pub const NEW_INVOKE_SPECIAL: u8 = 8;
    pub const INVOKE_INTERFACE: u8 = 9;
}

/// Which of the three member reference constants a reference uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    /// `CONSTANT_Fieldref`
    Field,
    /// `CONSTANT_Methodref`
    Method,
    /// `CONSTANT_InterfaceMethodref`
    InterfaceMethod,
}

/// A resolved field or method reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    /// Constant kind
    pub kind: RefKind,
    /// Internal name of the declaring type
    pub owner: String,
    /// Member name
    pub name: String,
    /// Member descriptor
    pub descriptor: String,
}

/// A resolved method handle constant
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandleRef {
    /// Reference kind (`REF_getField` = 1 .. `REF_invokeInterface` = 9)
    pub kind: u8,
    /// Referenced member
    pub member: MemberRef,
}

/// A resolved invokedynamic constant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicRef {
    /// Index into the BootstrapMethods attribute
    pub bootstrap_index: u16,
    /// Call site name
    pub name: String,
    /// Call site descriptor
    pub descriptor: String,
}

/// Constant pool: entry 0 is unusable, long/double take two slots
#[derive(Debug, Clone)]
pub struct ConstantPool {
    entries: Vec<Constant>,
    /// Encoded entry to the first index holding it
    interned: FxHashMap<Vec<u8>, u16>,
}

impl PartialEq for ConstantPool {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    /// Create a new empty constant pool
    pub fn new() -> Self {
        Self {
            entries: vec![Constant::Unusable],
            interned: FxHashMap::default(),
        }
    }

    /// Value of the `constant_pool_count` field
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Iterate over `(index, constant)` pairs, skipping unusable slots
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, c)| !matches!(c, Constant::Unusable))
            .map(|(i, c)| (i as u16, c))
    }

    /// Get an entry by index
    pub fn get(&self, index: u16) -> Option<&Constant> {
        match self.entries.get(index as usize) {
            Some(Constant::Unusable) | None => None,
            Some(c) => Some(c),
        }
    }

    fn entry(&self, index: u16, expected: &'static str) -> Result<&Constant, ClassFileError> {
        self.get(index)
            .ok_or(ClassFileError::BadConstant { index, expected })
    }

    /// Append or reuse an equal entry, returning its index
    ///
    /// Fails once the entry count would no longer fit the two-byte pool count.
    pub fn add(&mut self, constant: Constant) -> Result<u16, ClassFileError> {
        let key = interning_key(&constant);
        if let Some(&index) = self.interned.get(&key) {
            return Ok(index);
        }
        let index = self.entries.len();
        if index + constant.width() > u16::MAX as usize {
            return Err(ClassFileError::PoolOverflow(index));
        }
        Ok(self.push(constant, key))
    }

    fn push(&mut self, constant: Constant, key: Vec<u8>) -> u16 {
        let index = self.entries.len() as u16;
        let wide = constant.width() == 2;
        if !key.is_empty() {
            self.interned.entry(key).or_insert(index);
        }
        self.entries.push(constant);
        if wide {
            self.entries.push(Constant::Unusable);
        }
        index
    }

    /// Add a Utf8 entry
    pub fn add_utf8(&mut self, value: &str) -> Result<u16, ClassFileError> {
        self.add(Constant::Utf8(value.to_string()))
    }

    /// Add a Class entry for an internal name
    pub fn add_class(&mut self, name: &str) -> Result<u16, ClassFileError> {
        let name_index = self.add_utf8(name)?;
        self.add(Constant::Class { name_index })
    }

    /// Add a String literal entry
    pub fn add_string(&mut self, value: &str) -> Result<u16, ClassFileError> {
        let string_index = self.add_utf8(value)?;
        self.add(Constant::String { string_index })
    }

    /// Add an Integer entry
    pub fn add_integer(&mut self, value: i32) -> Result<u16, ClassFileError> {
        self.add(Constant::Integer(value))
    }

    /// Add a NameAndType entry
    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16, ClassFileError> {
        let name_index = self.add_utf8(name)?;
        let descriptor_index = self.add_utf8(descriptor)?;
        self.add(Constant::NameAndType {
            name_index,
            descriptor_index,
        })
    }

    /// Add a MethodType entry
    pub fn add_method_type(&mut self, descriptor: &str) -> Result<u16, ClassFileError> {
        let descriptor_index = self.add_utf8(descriptor)?;
        self.add(Constant::MethodType { descriptor_index })
    }

    /// Add a Fieldref / Methodref / InterfaceMethodref entry
    pub fn add_member_ref(&mut self, member: &MemberRef) -> Result<u16, ClassFileError> {
        let class_index = self.add_class(&member.owner)?;
        let name_and_type_index = self.add_name_and_type(&member.name, &member.descriptor)?;
        self.add(match member.kind {
            RefKind::Field => Constant::Fieldref {
                class_index,
                name_and_type_index,
            },
            RefKind::Method => Constant::Methodref {
                class_index,
                name_and_type_index,
            },
            RefKind::InterfaceMethod => Constant::InterfaceMethodref {
                class_index,
                name_and_type_index,
            },
        })
    }

    /// Add a MethodHandle entry
    pub fn add_method_handle(&mut self, handle: &HandleRef) -> Result<u16, ClassFileError> {
        let reference_index = self.add_member_ref(&handle.member)?;
        self.add(Constant::MethodHandle {
            reference_kind: handle.kind,
            reference_index,
        })
    }

    /// Add an InvokeDynamic entry
    pub fn add_invoke_dynamic(&mut self, bootstrap_index: u16, name: &str, descriptor: &str) -> Result<u16, ClassFileError> {
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.add(Constant::InvokeDynamic {
            bootstrap_method_attr_index: bootstrap_index,
            name_and_type_index,
        })
    }

    /// Get a Utf8 entry
    pub fn utf8(&self, index: u16) -> Result<&str, ClassFileError> {
        match self.entry(index, "Utf8")? {
            Constant::Utf8(s) => Ok(s),
            _ => Err(ClassFileError::BadConstant {
                index,
                expected: "Utf8",
            }),
        }
    }

    /// Get the internal name of a Class entry
    pub fn class_name(&self, index: u16) -> Result<&str, ClassFileError> {
        match self.entry(index, "Class")? {
            Constant::Class { name_index } => self.utf8(*name_index),
            _ => Err(ClassFileError::BadConstant {
                index,
                expected: "Class",
            }),
        }
    }

    /// Get the contents of a String entry
    pub fn string(&self, index: u16) -> Result<&str, ClassFileError> {
        match self.entry(index, "String")? {
            Constant::String { string_index } => self.utf8(*string_index),
            _ => Err(ClassFileError::BadConstant {
                index,
                expected: "String",
            }),
        }
    }

    /// Get a NameAndType entry as `(name, descriptor)`
    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str), ClassFileError> {
        match self.entry(index, "NameAndType")? {
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            _ => Err(ClassFileError::BadConstant {
                index,
                expected: "NameAndType",
            }),
        }
    }

    /// Resolve a Fieldref / Methodref / InterfaceMethodref entry
    pub fn member_ref(&self, index: u16) -> Result<MemberRef, ClassFileError> {
        let (kind, class_index, nat_index) = match self.entry(index, "member reference")? {
            Constant::Fieldref {
                class_index,
                name_and_type_index,
            } => (RefKind::Field, *class_index, *name_and_type_index),
            Constant::Methodref {
                class_index,
                name_and_type_index,
            } => (RefKind::Method, *class_index, *name_and_type_index),
            Constant::InterfaceMethodref {
                class_index,
                name_and_type_index,
            } => (RefKind::InterfaceMethod, *class_index, *name_and_type_index),
            _ => {
                return Err(ClassFileError::BadConstant {
                    index,
                    expected: "member reference",
                })
            }
        };
        let (name, descriptor) = self.name_and_type(nat_index)?;
        Ok(MemberRef {
            kind,
            owner: self.class_name(class_index)?.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        })
    }

    /// Resolve a MethodHandle entry
    pub fn method_handle(&self, index: u16) -> Result<HandleRef, ClassFileError> {
        match self.entry(index, "MethodHandle")? {
            Constant::MethodHandle {
                reference_kind,
                reference_index,
            } => Ok(HandleRef {
                kind: *reference_kind,
                member: self.member_ref(*reference_index)?,
            }),
            _ => Err(ClassFileError::BadConstant {
                index,
                expected: "MethodHandle",
            }),
        }
    }

    /// Resolve an InvokeDynamic entry
    pub fn invoke_dynamic(&self, index: u16) -> Result<DynamicRef, ClassFileError> {
        match self.entry(index, "InvokeDynamic")? {
            Constant::InvokeDynamic {
                bootstrap_method_attr_index,
                name_and_type_index,
            } => {
                let (name, descriptor) = self.name_and_type(*name_and_type_index)?;
                Ok(DynamicRef {
                    bootstrap_index: *bootstrap_method_attr_index,
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                })
            }
            _ => Err(ClassFileError::BadConstant {
                index,
                expected: "InvokeDynamic",
            }),
        }
    }

    /// Find the index of an existing Class entry for `name`
    pub fn find_class(&self, name: &str) -> Option<u16> {
        self.iter().find_map(|(i, c)| match c {
            Constant::Class { name_index } if self.utf8(*name_index).ok() == Some(name) => Some(i),
            _ => None,
        })
    }

    /// Encode the pool (count followed by entries)
    pub fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u16(self.entries.len() as u16);
        for constant in &self.entries {
            constant.encode(writer);
        }
    }

    /// Decode the pool (count followed by entries)
    pub fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let count = reader.read_u16()? as usize;
        if count == 0 {
            return Err(DecodeError::Malformed {
                what: "constant pool count",
                offset: reader.position(),
            });
        }

        let mut pool = Self::new();
        pool.entries.reserve(count);
        while pool.entries.len() < count {
            let offset = reader.position();
            let constant = match reader.read_u8()? {
                tag::UTF8 => Constant::Utf8(reader.read_utf8()?),
                tag::INTEGER => Constant::Integer(reader.read_i32()?),
                tag::FLOAT => Constant::Float(f32::from_bits(reader.read_u32()?)),
                tag::LONG => Constant::Long(reader.read_i64()?),
                tag::DOUBLE => Constant::Double(f64::from_bits(reader.read_i64()? as u64)),
                tag::CLASS => Constant::Class {
                    name_index: reader.read_u16()?,
                },
                tag::STRING => Constant::String {
                    string_index: reader.read_u16()?,
                },
                tag::FIELDREF => Constant::Fieldref {
                    class_index: reader.read_u16()?,
                    name_and_type_index: reader.read_u16()?,
                },
                tag::METHODREF => Constant::Methodref {
                    class_index: reader.read_u16()?,
                    name_and_type_index: reader.read_u16()?,
                },
                tag::INTERFACE_METHODREF => Constant::InterfaceMethodref {
                    class_index: reader.read_u16()?,
                    name_and_type_index: reader.read_u16()?,
                },
                tag::NAME_AND_TYPE => Constant::NameAndType {
                    name_index: reader.read_u16()?,
                    descriptor_index: reader.read_u16()?,
                },
                tag::METHOD_HANDLE => Constant::MethodHandle {
                    reference_kind: reader.read_u8()?,
                    reference_index: reader.read_u16()?,
                },
                tag::METHOD_TYPE => Constant::MethodType {
                    descriptor_index: reader.read_u16()?,
                },
                tag::DYNAMIC => Constant::Dynamic {
                    bootstrap_method_attr_index: reader.read_u16()?,
                    name_and_type_index: reader.read_u16()?,
                },
                tag::INVOKE_DYNAMIC => Constant::InvokeDynamic {
                    bootstrap_method_attr_index: reader.read_u16()?,
                    name_and_type_index: reader.read_u16()?,
                },
                tag::MODULE => Constant::Module {
                    name_index: reader.read_u16()?,
                },
                tag::PACKAGE => Constant::Package {
                    name_index: reader.read_u16()?,
                },
                other => return Err(DecodeError::InvalidConstantTag(other, offset)),
            };
            let key = interning_key(&constant);
            pool.push(constant, key);
        }

        if pool.entries.len() != count {
            return Err(DecodeError::Malformed {
                what: "constant pool (wide entry in last slot)",
                offset: reader.position(),
            });
        }

        Ok(pool)
    }
}

/// Interning compares encoded bytes, so floats match bit for bit
fn interning_key(constant: &Constant) -> Vec<u8> {
    let mut writer = BytecodeWriter::new();
    constant.encode(&mut writer);
    writer.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_reuses_entries() {
        let mut pool = ConstantPool::new();
        let a = pool.add_class("a/B").unwrap();
        let b = pool.add_class("a/B").unwrap();
        assert_eq!(a, b);
        // Utf8 + Class
        assert_eq!(pool.count(), 3);
    }

    #[test]
    fn test_wide_entries_take_two_slots() {
        let mut pool = ConstantPool::new();
        let long = pool.add(Constant::Long(7)).unwrap();
        let next = pool.add_utf8("after").unwrap();
        assert_eq!(long, 1);
        assert_eq!(next, 3);
        assert!(pool.get(2).is_none());
    }

    #[test]
    fn test_member_ref_resolution() {
        let mut pool = ConstantPool::new();
        let member = MemberRef {
            kind: RefKind::Method,
            owner: "pkg/Owner".to_string(),
            name: "run".to_string(),
            descriptor: "()V".to_string(),
        };
        let index = pool.add_member_ref(&member).unwrap();
        assert_eq!(pool.member_ref(index).unwrap(), member);
        assert!(matches!(
            pool.class_name(index),
            Err(ClassFileError::BadConstant { expected: "Class", .. })
        ));
    }

    #[test]
    fn test_pool_encoding() {
        let mut pool = ConstantPool::new();
        pool.add_string("hello").unwrap();
        pool.add(Constant::Double(2.5)).unwrap();
        pool.add_integer(-3).unwrap();
        let handle = HandleRef {
            kind: 6,
            member: MemberRef {
                kind: RefKind::Method,
                owner: "pkg/Owner".to_string(),
                name: "lambda$0".to_string(),
                descriptor: "()Ljava/lang/String;".to_string(),
            },
        };
        let handle_index = pool.add_method_handle(&handle).unwrap();

        let mut writer = BytecodeWriter::new();
        pool.encode(&mut writer);
        let bytes = writer.into_bytes();
        let decoded = ConstantPool::decode(&mut BytecodeReader::new(&bytes)).unwrap();

        assert_eq!(decoded, pool);
        assert_eq!(decoded.method_handle(handle_index).unwrap(), handle);
    }

    #[test]
    fn test_invalid_tag() {
        let bytes = [0x00, 0x02, 0x02];
        let result = ConstantPool::decode(&mut BytecodeReader::new(&bytes));
        assert!(matches!(result, Err(DecodeError::InvalidConstantTag(2, 2))));
    }

    #[test]
    fn test_pool_overflow() {
        let mut pool = ConstantPool::new();
        for i in 1..u16::MAX {
            pool.add_utf8(&format!("s{}", i)).unwrap();
        }
        assert_eq!(pool.count(), u16::MAX as usize);

        // interning still finds existing entries in a full pool
        assert_eq!(pool.add_utf8("s7").unwrap(), 7);
        assert!(matches!(pool.add_utf8("fresh"), Err(ClassFileError::PoolOverflow(65535))));
        assert!(matches!(pool.add_class("s9"), Err(ClassFileError::PoolOverflow(_))));
        assert_eq!(pool.count(), u16::MAX as usize);
    }

    #[test]
    fn test_wide_entry_needs_two_free_slots() {
        let mut pool = ConstantPool::new();
        for i in 1..u16::MAX - 1 {
            pool.add_integer(i as i32).unwrap();
        }
        assert!(matches!(pool.add(Constant::Long(1)), Err(ClassFileError::PoolOverflow(_))));
        assert_eq!(pool.add(Constant::Float(1.0)).unwrap(), u16::MAX - 1);
    }

    #[test]
    fn test_find_class() {
        let mut pool = ConstantPool::new();
        pool.add_utf8("x").unwrap();
        let idx = pool.add_class("pkg/Self").unwrap();
        assert_eq!(pool.find_class("pkg/Self"), Some(idx));
        assert_eq!(pool.find_class("pkg/Other"), None);
    }
}
