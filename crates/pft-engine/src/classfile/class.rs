//! Class file format
//!
//! A [`ClassFile`] is decoded eagerly into its constant pool, members and
//! attributes. `Code`, `StackMapTable` and `BootstrapMethods` are decoded into
//! structured form because the rewriter edits them; every other attribute is
//! kept as raw bytes and written back verbatim.

use super::constants::ConstantPool;
use super::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use super::stackmap::{self, StackMapFrame};
use thiserror::Error;

/// Magic number for class files
pub const MAGIC: u32 = 0xCAFE_BABE;

/// Newest major version accepted by the decoder (Java 25)
pub const MAX_MAJOR_VERSION: u16 = 69;

/// Access flags shared by classes, fields and methods (JVMS 4.1, 4.5, 4.6)
#[allow(missing_docs)]
pub mod access {
    pub const PUBLIC: u16 = 0x0001;
    pub const PRIVATE: u16 = 0x0002;
    pub const PROTECTED: u16 = 0x0004;
    pub const STATIC: u16 = 0x0008;
    pub const FINAL: u16 = 0x0010;
    pub const SUPER: u16 = 0x0020;
    pub const SYNCHRONIZED: u16 = 0x0020;
    pub const BRIDGE: u16 = 0x0040;
    pub const VARARGS: u16 = 0x0080;
    pub const NATIVE: u16 = 0x0100;
    pub const INTERFACE: u16 = 0x0200;
    pub const ABSTRACT: u16 = 0x0400;
    pub const STRICT: u16 = 0x0800;
    pub const SYNTHETIC: u16 = 0x1000;
    pub const ANNOTATION: u16 = 0x2000;
    pub const ENUM: u16 = 0x4000;

    /// Flags that keep a member from being called through an interface
    pub const RESTRICTED: u16 = PRIVATE | PROTECTED;
}

/// Attribute names the codec knows about
#[allow(missing_docs)]
pub mod attr {
    pub const CODE: &str = "Code";
    pub const STACK_MAP_TABLE: &str = "StackMapTable";
    pub const BOOTSTRAP_METHODS: &str = "BootstrapMethods";
    pub const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
    pub const SOURCE_FILE: &str = "SourceFile";
    pub const SOURCE_DEBUG_EXTENSION: &str = "SourceDebugExtension";
    pub const LINE_NUMBER_TABLE: &str = "LineNumberTable";
    pub const LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";
    pub const LOCAL_VARIABLE_TYPE_TABLE: &str = "LocalVariableTypeTable";
    pub const METHOD_PARAMETERS: &str = "MethodParameters";

    /// Attributes that only carry debugging information
    pub const DEBUG: &[&str] = &[
        SOURCE_FILE,
        SOURCE_DEBUG_EXTENSION,
        LINE_NUMBER_TABLE,
        LOCAL_VARIABLE_TABLE,
        LOCAL_VARIABLE_TYPE_TABLE,
        METHOD_PARAMETERS,
    ];
}

/// Class file decoding and lookup errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassFileError {
    /// Decode error
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Invalid magic number
    #[error("Invalid magic number: expected 0xCAFEBABE, got {0:#x}")]
    InvalidMagic(u32),

    /// Unsupported version
    #[error("Unsupported class file version {major}.{minor} (newest supported: {MAX_MAJOR_VERSION})")]
    UnsupportedVersion {
        /// Major version
        major: u16,
        /// Minor version
        minor: u16,
    },

    /// Constant pool entry missing or of the wrong kind
    #[error("Constant pool index {index} is not a {expected} entry")]
    BadConstant {
        /// Offending index
        index: u16,
        /// Expected entry kind
        expected: &'static str,
    },

    /// Malformed field or method descriptor
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// No room left in the constant pool for another entry
    #[error("Constant pool is full ({0} slots)")]
    PoolOverflow(usize),

    /// Too many entries in the `BootstrapMethods` attribute
    #[error("Bootstrap method index {0} does not fit in two bytes")]
    BootstrapOverflow(usize),

    /// Bytes left over after the last attribute
    #[error("Trailing data after class file: {0} bytes")]
    TrailingBytes(usize),
}

/// An attribute with its name index
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// Utf8 index of the attribute name
    pub name_index: u16,
    /// Decoded body
    pub info: AttributeInfo,
}

/// Attribute body
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeInfo {
    /// Method body
    Code(Code),
    /// Verification frames (inside `Code`)
    StackMapTable(Vec<StackMapFrame>),
    /// Bootstrap method table (class level)
    BootstrapMethods(Vec<BootstrapMethod>),
    /// Anything else, kept verbatim
    Raw(Vec<u8>),
}

/// `Code` attribute
#[derive(Debug, Clone, PartialEq)]
pub struct Code {
    /// Maximum operand stack depth in slots
    pub max_stack: u16,
    /// Number of local variable slots
    pub max_locals: u16,
    /// Instruction bytes
    pub code: Vec<u8>,
    /// Exception handlers
    pub exception_table: Vec<ExceptionHandler>,
    /// Nested attributes (`StackMapTable`, `LineNumberTable`, ...)
    pub attributes: Vec<Attribute>,
}

impl Code {
    /// Decoded StackMapTable frames, if present
    pub fn stack_map_mut(&mut self) -> Option<&mut Vec<StackMapFrame>> {
        self.attributes.iter_mut().find_map(|a| match &mut a.info {
            AttributeInfo::StackMapTable(frames) => Some(frames),
            _ => None,
        })
    }
}

/// Entry of a `Code` exception table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of the protected range (inclusive)
    pub start_pc: u16,
    /// End of the protected range (exclusive)
    pub end_pc: u16,
    /// Handler entry point
    pub handler_pc: u16,
    /// Class index of the caught type, 0 for any
    pub catch_type: u16,
}

/// Entry of the `BootstrapMethods` attribute
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BootstrapMethod {
    /// MethodHandle index of the bootstrap method
    pub method_ref: u16,
    /// Loadable constant indices passed as static arguments
    pub arguments: Vec<u16>,
}

/// A field or method
#[derive(Debug, Clone, PartialEq)]
pub struct MemberInfo {
    /// Access flags
    pub access_flags: u16,
    /// Utf8 index of the name
    pub name_index: u16,
    /// Utf8 index of the descriptor
    pub descriptor_index: u16,
    /// Attributes
    pub attributes: Vec<Attribute>,
}

impl MemberInfo {
    /// Member name
    pub fn name<'a>(&self, pool: &'a ConstantPool) -> Result<&'a str, ClassFileError> {
        pool.utf8(self.name_index)
    }

    /// Member descriptor
    pub fn descriptor<'a>(&self, pool: &'a ConstantPool) -> Result<&'a str, ClassFileError> {
        pool.utf8(self.descriptor_index)
    }

    /// Check for `ACC_STATIC`
    pub fn is_static(&self) -> bool {
        self.access_flags & access::STATIC != 0
    }

    /// The method body, if any
    pub fn code(&self) -> Option<&Code> {
        self.attributes.iter().find_map(|a| match &a.info {
            AttributeInfo::Code(code) => Some(code),
            _ => None,
        })
    }

    /// The method body, mutably
    pub fn code_mut(&mut self) -> Option<&mut Code> {
        self.attributes.iter_mut().find_map(|a| match &mut a.info {
            AttributeInfo::Code(code) => Some(code),
            _ => None,
        })
    }

    /// Raw body of the named attribute
    pub fn raw_attribute<'a>(&'a self, pool: &ConstantPool, name: &str) -> Option<&'a [u8]> {
        self.attributes.iter().find_map(|a| match &a.info {
            AttributeInfo::Raw(bytes) if pool.utf8(a.name_index).ok() == Some(name) => {
                Some(bytes.as_slice())
            }
            _ => None,
        })
    }
}

/// A decoded class file
#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    /// Minor version
    pub minor_version: u16,
    /// Major version
    pub major_version: u16,
    /// Constant pool
    pub constant_pool: ConstantPool,
    /// Class access flags
    pub access_flags: u16,
    /// Class index of this class
    pub this_class: u16,
    /// Class index of the superclass (0 for `java/lang/Object`)
    pub super_class: u16,
    /// Class indices of directly implemented interfaces
    pub interfaces: Vec<u16>,
    /// Fields
    pub fields: Vec<MemberInfo>,
    /// Methods
    pub methods: Vec<MemberInfo>,
    /// Class attributes
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Decode a class file
    pub fn decode(data: &[u8]) -> Result<Self, ClassFileError> {
        let mut reader = BytecodeReader::new(data);

        let magic = reader.read_u32()?;
        if magic != MAGIC {
            return Err(ClassFileError::InvalidMagic(magic));
        }

        let minor_version = reader.read_u16()?;
        let major_version = reader.read_u16()?;
        if major_version > MAX_MAJOR_VERSION {
            return Err(ClassFileError::UnsupportedVersion {
                major: major_version,
                minor: minor_version,
            });
        }

        let constant_pool = ConstantPool::decode(&mut reader)?;
        let access_flags = reader.read_u16()?;
        let this_class = reader.read_u16()?;
        let super_class = reader.read_u16()?;

        let interface_count = reader.read_u16()? as usize;
        let mut interfaces = Vec::with_capacity(interface_count);
        for _ in 0..interface_count {
            interfaces.push(reader.read_u16()?);
        }

        let fields = decode_members(&mut reader, &constant_pool)?;
        let methods = decode_members(&mut reader, &constant_pool)?;
        let attributes = decode_attributes(&mut reader, &constant_pool)?;

        if reader.has_more() {
            return Err(ClassFileError::TrailingBytes(reader.remaining()));
        }

        Ok(Self {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    /// Encode the class file to bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = BytecodeWriter::new();
        writer.emit_u32(MAGIC);
        writer.emit_u16(self.minor_version);
        writer.emit_u16(self.major_version);
        self.constant_pool.encode(&mut writer);
        writer.emit_u16(self.access_flags);
        writer.emit_u16(self.this_class);
        writer.emit_u16(self.super_class);

        writer.emit_u16(self.interfaces.len() as u16);
        for &interface in &self.interfaces {
            writer.emit_u16(interface);
        }

        encode_members(&mut writer, &self.fields);
        encode_members(&mut writer, &self.methods);
        encode_attributes(&mut writer, &self.attributes);

        writer.into_bytes()
    }

    /// Internal name of this class
    pub fn this_class_name(&self) -> Result<&str, ClassFileError> {
        self.constant_pool.class_name(self.this_class)
    }

    /// Internal name of the superclass
    pub fn super_class_name(&self) -> Result<Option<&str>, ClassFileError> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.constant_pool.class_name(self.super_class).map(Some)
    }

    /// Internal names of the declared interfaces, in declaration order
    pub fn interface_names(&self) -> Result<Vec<&str>, ClassFileError> {
        self.interfaces
            .iter()
            .map(|&i| self.constant_pool.class_name(i))
            .collect()
    }

    /// Check for `ACC_INTERFACE`
    pub fn is_interface(&self) -> bool {
        self.access_flags & access::INTERFACE != 0
    }

    /// Find a method by name and descriptor
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&MemberInfo> {
        find_member(&self.methods, &self.constant_pool, name, descriptor)
    }

    /// Find a field by name and descriptor
    pub fn find_field(&self, name: &str, descriptor: &str) -> Option<&MemberInfo> {
        find_member(&self.fields, &self.constant_pool, name, descriptor)
    }

    /// Bootstrap method table, if the class has one
    pub fn bootstrap_methods(&self) -> Option<&[BootstrapMethod]> {
        self.attributes.iter().find_map(|a| match &a.info {
            AttributeInfo::BootstrapMethods(methods) => Some(methods.as_slice()),
            _ => None,
        })
    }

    /// Bootstrap method table, created empty when absent
    pub fn bootstrap_methods_mut(&mut self) -> Result<&mut Vec<BootstrapMethod>, ClassFileError> {
        if self.bootstrap_methods().is_none() {
            let name_index = self.constant_pool.add_utf8(attr::BOOTSTRAP_METHODS)?;
            self.attributes.push(Attribute {
                name_index,
                info: AttributeInfo::BootstrapMethods(Vec::new()),
            });
        }
        let attribute = self
            .attributes
            .iter_mut()
            .find(|a| matches!(a.info, AttributeInfo::BootstrapMethods(_)));
        match attribute.map(|a| &mut a.info) {
            Some(AttributeInfo::BootstrapMethods(methods)) => Ok(methods),
            _ => unreachable!("BootstrapMethods attribute is present"),
        }
    }

    /// Raw body of the named class attribute
    pub fn raw_attribute(&self, name: &str) -> Option<&[u8]> {
        self.attributes.iter().find_map(|a| match &a.info {
            AttributeInfo::Raw(bytes) if self.constant_pool.utf8(a.name_index).ok() == Some(name) => {
                Some(bytes.as_slice())
            }
            _ => None,
        })
    }
}

fn find_member<'a>(
    members: &'a [MemberInfo],
    pool: &ConstantPool,
    name: &str,
    descriptor: &str,
) -> Option<&'a MemberInfo> {
    members.iter().find(|m| {
        m.name(pool).ok() == Some(name) && m.descriptor(pool).ok() == Some(descriptor)
    })
}

fn decode_members(
    reader: &mut BytecodeReader<'_>,
    pool: &ConstantPool,
) -> Result<Vec<MemberInfo>, ClassFileError> {
    let count = reader.read_u16()? as usize;
    let mut members = Vec::with_capacity(count);
    for _ in 0..count {
        let access_flags = reader.read_u16()?;
        let name_index = reader.read_u16()?;
        let descriptor_index = reader.read_u16()?;
        let attributes = decode_attributes(reader, pool)?;
        members.push(MemberInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        });
    }
    Ok(members)
}

fn encode_members(writer: &mut BytecodeWriter, members: &[MemberInfo]) {
    writer.emit_u16(members.len() as u16);
    for member in members {
        writer.emit_u16(member.access_flags);
        writer.emit_u16(member.name_index);
        writer.emit_u16(member.descriptor_index);
        encode_attributes(writer, &member.attributes);
    }
}

fn decode_attributes(
    reader: &mut BytecodeReader<'_>,
    pool: &ConstantPool,
) -> Result<Vec<Attribute>, ClassFileError> {
    let count = reader.read_u16()? as usize;
    let mut attributes = Vec::with_capacity(count);
    for _ in 0..count {
        let name_index = reader.read_u16()?;
        let length = reader.read_u32()? as usize;
        let start = reader.position();
        let body = reader.read_bytes(length)?;
        let name = pool.utf8(name_index)?;

        if !matches!(name, attr::CODE | attr::STACK_MAP_TABLE | attr::BOOTSTRAP_METHODS) {
            attributes.push(Attribute {
                name_index,
                info: AttributeInfo::Raw(body),
            });
            continue;
        }

        let mut inner = BytecodeReader::new(&body);
        let info = match name {
            attr::CODE => AttributeInfo::Code(decode_code(&mut inner, pool)?),
            attr::STACK_MAP_TABLE => AttributeInfo::StackMapTable(stackmap::decode_frames(&mut inner)?),
            _ => AttributeInfo::BootstrapMethods(decode_bootstrap_methods(&mut inner)?),
        };
        if inner.has_more() {
            return Err(DecodeError::Malformed {
                what: "attribute length",
                offset: start,
            }
            .into());
        }
        attributes.push(Attribute { name_index, info });
    }
    Ok(attributes)
}

fn encode_attributes(writer: &mut BytecodeWriter, attributes: &[Attribute]) {
    writer.emit_u16(attributes.len() as u16);
    for attribute in attributes {
        writer.emit_u16(attribute.name_index);
        let length_at = writer.offset();
        writer.emit_u32(0);
        let start = writer.offset();
        match &attribute.info {
            AttributeInfo::Code(code) => encode_code(writer, code),
            AttributeInfo::StackMapTable(frames) => stackmap::encode_frames(writer, frames),
            AttributeInfo::BootstrapMethods(methods) => encode_bootstrap_methods(writer, methods),
            AttributeInfo::Raw(bytes) => writer.emit_bytes(bytes),
        }
        let length = (writer.offset() - start) as u32;
        writer.patch_u32(length_at, length);
    }
}

fn decode_code(reader: &mut BytecodeReader<'_>, pool: &ConstantPool) -> Result<Code, ClassFileError> {
    let max_stack = reader.read_u16()?;
    let max_locals = reader.read_u16()?;
    let code_length = reader.read_u32()? as usize;
    let code = reader.read_bytes(code_length)?;

    let handler_count = reader.read_u16()? as usize;
    let mut exception_table = Vec::with_capacity(handler_count);
    for _ in 0..handler_count {
        exception_table.push(ExceptionHandler {
            start_pc: reader.read_u16()?,
            end_pc: reader.read_u16()?,
            handler_pc: reader.read_u16()?,
            catch_type: reader.read_u16()?,
        });
    }

    let attributes = decode_attributes(reader, pool)?;
    Ok(Code {
        max_stack,
        max_locals,
        code,
        exception_table,
        attributes,
    })
}

fn encode_code(writer: &mut BytecodeWriter, code: &Code) {
    writer.emit_u16(code.max_stack);
    writer.emit_u16(code.max_locals);
    writer.emit_u32(code.code.len() as u32);
    writer.emit_bytes(&code.code);
    writer.emit_u16(code.exception_table.len() as u16);
    for handler in &code.exception_table {
        writer.emit_u16(handler.start_pc);
        writer.emit_u16(handler.end_pc);
        writer.emit_u16(handler.handler_pc);
        writer.emit_u16(handler.catch_type);
    }
    encode_attributes(writer, &code.attributes);
}

fn decode_bootstrap_methods(reader: &mut BytecodeReader<'_>) -> Result<Vec<BootstrapMethod>, DecodeError> {
    let count = reader.read_u16()? as usize;
    let mut methods = Vec::with_capacity(count);
    for _ in 0..count {
        let method_ref = reader.read_u16()?;
        let argument_count = reader.read_u16()? as usize;
        let mut arguments = Vec::with_capacity(argument_count);
        for _ in 0..argument_count {
            arguments.push(reader.read_u16()?);
        }
        methods.push(BootstrapMethod {
            method_ref,
            arguments,
        });
    }
    Ok(methods)
}

fn encode_bootstrap_methods(writer: &mut BytecodeWriter, methods: &[BootstrapMethod]) {
    writer.emit_u16(methods.len() as u16);
    for method in methods {
        writer.emit_u16(method.method_ref);
        writer.emit_u16(method.arguments.len() as u16);
        for &argument in &method.arguments {
            writer.emit_u16(argument);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_class() -> ClassFile {
        let mut pool = ConstantPool::new();
        let this_class = pool.add_class("pkg/Sample").unwrap();
        let super_class = pool.add_class("java/lang/Object").unwrap();
        let runnable = pool.add_class("java/lang/Runnable").unwrap();
        let code_name = pool.add_utf8(attr::CODE).unwrap();
        let source_name = pool.add_utf8(attr::SOURCE_FILE).unwrap();
        let source_value = pool.add_utf8("Sample.java").unwrap();
        let method_name = pool.add_utf8("run").unwrap();
        let method_desc = pool.add_utf8("()V").unwrap();
        let field_name = pool.add_utf8("count").unwrap();
        let field_desc = pool.add_utf8("I").unwrap();

        ClassFile {
            minor_version: 0,
            major_version: 52,
            constant_pool: pool,
            access_flags: access::PUBLIC | access::SUPER,
            this_class,
            super_class,
            interfaces: vec![runnable],
            fields: vec![MemberInfo {
                access_flags: access::PRIVATE,
                name_index: field_name,
                descriptor_index: field_desc,
                attributes: Vec::new(),
            }],
            methods: vec![MemberInfo {
                access_flags: access::PUBLIC,
                name_index: method_name,
                descriptor_index: method_desc,
                attributes: vec![Attribute {
                    name_index: code_name,
                    info: AttributeInfo::Code(Code {
                        max_stack: 0,
                        max_locals: 1,
                        code: vec![0xB1],
                        exception_table: Vec::new(),
                        attributes: Vec::new(),
                    }),
                }],
            }],
            attributes: vec![Attribute {
                name_index: source_name,
                info: AttributeInfo::Raw(source_value.to_be_bytes().to_vec()),
            }],
        }
    }

    #[test]
    fn test_encode_decode() {
        let class = sample_class();
        let bytes = class.encode();
        assert_eq!(&bytes[0..4], &[0xCA, 0xFE, 0xBA, 0xBE]);

        let decoded = ClassFile::decode(&bytes).unwrap();
        assert_eq!(decoded, class);
        assert_eq!(decoded.this_class_name().unwrap(), "pkg/Sample");
        assert_eq!(decoded.super_class_name().unwrap(), Some("java/lang/Object"));
        assert_eq!(decoded.interface_names().unwrap(), vec!["java/lang/Runnable"]);
        assert!(decoded.find_method("run", "()V").unwrap().code().is_some());
        assert!(decoded.find_field("count", "I").is_some());
        assert_eq!(decoded.raw_attribute(attr::SOURCE_FILE).map(|b| b.len()), Some(2));
    }

    #[test]
    fn test_invalid_magic() {
        let mut bytes = sample_class().encode();
        bytes[0] = 0xDE;
        assert!(matches!(
            ClassFile::decode(&bytes),
            Err(ClassFileError::InvalidMagic(_))
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let mut class = sample_class();
        class.major_version = MAX_MAJOR_VERSION + 1;
        let bytes = class.encode();
        assert!(matches!(
            ClassFile::decode(&bytes),
            Err(ClassFileError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_truncated_input() {
        let bytes = sample_class().encode();
        let result = ClassFile::decode(&bytes[..bytes.len() - 3]);
        assert!(matches!(result, Err(ClassFileError::Decode(_))));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = sample_class().encode();
        bytes.push(0);
        assert_eq!(ClassFile::decode(&bytes), Err(ClassFileError::TrailingBytes(1)));
    }

    #[test]
    fn test_bootstrap_methods_created_on_demand() {
        let mut class = sample_class();
        assert!(class.bootstrap_methods().is_none());
        class.bootstrap_methods_mut().unwrap().push(BootstrapMethod {
            method_ref: 1,
            arguments: vec![2, 3],
        });
        let decoded = ClassFile::decode(&class.encode()).unwrap();
        assert_eq!(decoded.bootstrap_methods().unwrap().len(), 1);
        assert_eq!(decoded.bootstrap_methods().unwrap()[0].arguments, vec![2, 3]);
    }
}
