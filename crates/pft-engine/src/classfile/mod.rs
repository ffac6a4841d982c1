//! JVM class file definitions
//!
//! This module provides the class file codec, the instruction set, constant
//! pool structures, a structural verifier and a builder for assembling class
//! files programmatically.

pub mod annotations;
pub mod builder;
pub mod class;
pub mod code;
pub mod constants;
pub mod descriptor;
pub mod disasm;
pub mod encoder;
pub mod opcode;
pub mod stackmap;
pub mod verify;

pub use annotations::{decode_annotations, Annotation, ElementValue};
pub use builder::{BootstrapArg, BuildError, ClassBuilder, CodeBuilder, Label};
pub use class::{
    access, attr, Attribute, AttributeInfo, BootstrapMethod, ClassFile, ClassFileError, Code,
    ExceptionHandler, MemberInfo,
};
pub use code::{decode_instructions, Instruction, Operand};
pub use constants::{ref_kind, Constant, ConstantPool, DynamicRef, HandleRef, MemberRef, RefKind};
pub use descriptor::{external_name, internal_name, package_of, FieldType, MethodDescriptor};
pub use disasm::disassemble;
pub use encoder::{BytecodeReader, BytecodeWriter, DecodeError};
pub use opcode::Opcode;
pub use stackmap::{StackMapFrame, VerificationType};
pub use verify::{compute_limits, verify_class, VerifyError};
