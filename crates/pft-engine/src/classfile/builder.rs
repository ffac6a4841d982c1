//! Programmatic class file construction
//!
//! Assembles class files with interned constants, label-resolved branches and
//! LambdaMetafactory call sites. `max_stack` and `max_locals` are computed on
//! [`ClassBuilder::build`], so callers never state them.

use super::annotations::{decode_annotations, encode_annotations, Annotation, ElementValue};
use super::class::{access, attr, Attribute, AttributeInfo, BootstrapMethod, ClassFile, ClassFileError, Code, ExceptionHandler, MemberInfo};
use super::constants::{ref_kind, ConstantPool, HandleRef, MemberRef, RefKind};
use super::descriptor::MethodDescriptor;
use super::encoder::BytecodeWriter;
use super::opcode::Opcode;
use super::verify::{compute_limits, VerifyError};
use thiserror::Error;

/// Internal name of the lambda bootstrap class
pub const LAMBDA_METAFACTORY: &str = "java/lang/invoke/LambdaMetafactory";

/// Name of the standard lambda bootstrap method
pub const METAFACTORY_NAME: &str = "metafactory";

/// Descriptor of `LambdaMetafactory.metafactory`
pub const METAFACTORY_DESCRIPTOR: &str = "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;";

/// Class file version written by the builder (Java 8)
pub const DEFAULT_MAJOR_VERSION: u16 = 52;

/// Errors raised while building
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A branch names a label that was never bound
    #[error("Label {0} is used but never bound")]
    UnboundLabel(usize),

    /// Branch distance does not fit the 16-bit encoding
    #[error("Branch at offset {0} is out of range")]
    BranchOutOfRange(usize),

    /// Bad descriptor or constant
    #[error("{0}")]
    ClassFile(#[from] ClassFileError),

    /// Limit computation failed
    #[error("Method {method}: {error}")]
    Limits {
        /// `name` + `descriptor`
        method: String,
        /// Underlying error
        error: VerifyError,
    },
}

/// Keep the first failure and carry on with a placeholder index
fn sticky(error: &mut Option<BuildError>, index: Result<u16, ClassFileError>) -> u16 {
    index.unwrap_or_else(|e| {
        error.get_or_insert(e.into());
        0
    })
}

/// A branch target within one method body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label {
    /// Label ID within the method
    pub id: usize,
}

/// Branch whose offset is patched once labels are bound
#[derive(Debug, Clone)]
struct UnresolvedJump {
    /// Offset of the branch opcode
    instruction: usize,
    /// Offset of the two-byte operand
    operand: usize,
    /// Target label
    target: Label,
}

/// Static argument of a bootstrap method
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapArg {
    /// `CONSTANT_MethodType`
    MethodType(String),
    /// `CONSTANT_MethodHandle`
    Handle(HandleRef),
    /// `CONSTANT_String`
    String(String),
    /// `CONSTANT_Integer`
    Integer(i32),
    /// `CONSTANT_Class`
    Class(String),
}

/// Emits the body of one method
#[derive(Debug)]
pub struct CodeBuilder<'a> {
    pool: &'a mut ConstantPool,
    bootstrap_methods: &'a mut Vec<BootstrapMethod>,
    writer: BytecodeWriter,
    labels: Vec<Option<usize>>,
    jumps: Vec<UnresolvedJump>,
    handlers: Vec<(Label, Label, Label, u16)>,
    error: Option<BuildError>,
}

impl<'a> CodeBuilder<'a> {
    fn new(pool: &'a mut ConstantPool, bootstrap_methods: &'a mut Vec<BootstrapMethod>) -> Self {
        Self {
            pool,
            bootstrap_methods,
            writer: BytecodeWriter::new(),
            labels: Vec::new(),
            jumps: Vec::new(),
            handlers: Vec::new(),
            error: None,
        }
    }

    /// The constant pool being built
    pub fn pool(&mut self) -> &mut ConstantPool {
        &mut *self.pool
    }

    /// Emit an instruction without operands
    pub fn op(&mut self, opcode: Opcode) -> &mut Self {
        self.writer.emit_u8(opcode.to_u8());
        self
    }

    /// Emit an opcode followed by a two-byte constant index
    pub fn op_u16(&mut self, opcode: Opcode, index: u16) -> &mut Self {
        self.writer.emit_u8(opcode.to_u8());
        self.writer.emit_u16(index);
        self
    }

    /// Push an int constant using the shortest encoding
    pub fn iconst(&mut self, value: i32) -> &mut Self {
        match value {
            -1..=5 => self.writer.emit_u8((Opcode::Iconst0.to_u8() as i32 + value) as u8),
            -128..=127 => {
                self.writer.emit_u8(Opcode::Bipush.to_u8());
                self.writer.emit_u8(value as i8 as u8);
            }
            -32768..=32767 => {
                self.writer.emit_u8(Opcode::Sipush.to_u8());
                self.writer.emit_u16(value as i16 as u16);
            }
            _ => {
                let index = sticky(&mut self.error, self.pool.add_integer(value));
                self.ldc(index);
            }
        }
        self
    }

    /// Push a string literal
    pub fn ldc_string(&mut self, value: &str) -> &mut Self {
        let index = sticky(&mut self.error, self.pool.add_string(value));
        self.ldc(index)
    }

    /// Push a single-slot constant by pool index
    pub fn ldc(&mut self, index: u16) -> &mut Self {
        if index <= u8::MAX as u16 {
            self.writer.emit_u8(Opcode::Ldc.to_u8());
            self.writer.emit_u8(index as u8);
        } else {
            self.op_u16(Opcode::LdcW, index);
        }
        self
    }

    fn local(&mut self, long_form: Opcode, short_base: Opcode, slot: u16) -> &mut Self {
        if slot <= 3 {
            self.writer.emit_u8(short_base.to_u8() + slot as u8);
        } else if slot <= u8::MAX as u16 {
            self.writer.emit_u8(long_form.to_u8());
            self.writer.emit_u8(slot as u8);
        } else {
            self.writer.emit_u8(Opcode::Wide.to_u8());
            self.writer.emit_u8(long_form.to_u8());
            self.writer.emit_u16(slot);
        }
        self
    }

    /// Load an int local
    pub fn iload(&mut self, slot: u16) -> &mut Self {
        self.local(Opcode::Iload, Opcode::Iload0, slot)
    }

    /// Load a long local
    pub fn lload(&mut self, slot: u16) -> &mut Self {
        self.local(Opcode::Lload, Opcode::Lload0, slot)
    }

    /// Load a reference local
    pub fn aload(&mut self, slot: u16) -> &mut Self {
        self.local(Opcode::Aload, Opcode::Aload0, slot)
    }

    /// Store an int local
    pub fn istore(&mut self, slot: u16) -> &mut Self {
        self.local(Opcode::Istore, Opcode::Istore0, slot)
    }

    /// Store a reference local
    pub fn astore(&mut self, slot: u16) -> &mut Self {
        self.local(Opcode::Astore, Opcode::Astore0, slot)
    }

    /// Create an unbound label
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label {
            id: self.labels.len() - 1,
        }
    }

    /// Bind a label to the current offset
    pub fn bind(&mut self, label: Label) -> &mut Self {
        self.labels[label.id] = Some(self.writer.offset());
        self
    }

    /// Emit a 16-bit branch to a label
    pub fn branch(&mut self, opcode: Opcode, target: Label) -> &mut Self {
        let instruction = self.writer.offset();
        self.writer.emit_u8(opcode.to_u8());
        let operand = self.writer.offset();
        self.writer.emit_u16(0);
        self.jumps.push(UnresolvedJump {
            instruction,
            operand,
            target,
        });
        self
    }

    /// `goto`
    pub fn goto(&mut self, target: Label) -> &mut Self {
        self.branch(Opcode::Goto, target)
    }

    /// `ifeq`
    pub fn ifeq(&mut self, target: Label) -> &mut Self {
        self.branch(Opcode::Ifeq, target)
    }

    /// `ifne`
    pub fn ifne(&mut self, target: Label) -> &mut Self {
        self.branch(Opcode::Ifne, target)
    }

    /// Protect `start..end` with a handler; `None` catches everything
    pub fn try_catch(&mut self, start: Label, end: Label, handler: Label, catch_type: Option<&str>) -> &mut Self {
        let catch_type = match catch_type {
            Some(name) => sticky(&mut self.error, self.pool.add_class(name)),
            None => 0,
        };
        self.handlers.push((start, end, handler, catch_type));
        self
    }

    fn member(&mut self, opcode: Opcode, kind: RefKind, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let index = self.pool.add_member_ref(&MemberRef {
            kind,
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        });
        let index = sticky(&mut self.error, index);
        self.op_u16(opcode, index)
    }

    /// `getfield`
    pub fn getfield(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.member(Opcode::Getfield, RefKind::Field, owner, name, descriptor)
    }

    /// `putfield`
    pub fn putfield(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.member(Opcode::Putfield, RefKind::Field, owner, name, descriptor)
    }

    /// `getstatic`
    pub fn getstatic(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.member(Opcode::Getstatic, RefKind::Field, owner, name, descriptor)
    }

    /// `putstatic`
    pub fn putstatic(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.member(Opcode::Putstatic, RefKind::Field, owner, name, descriptor)
    }

    /// `invokevirtual`
    pub fn invokevirtual(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.member(Opcode::Invokevirtual, RefKind::Method, owner, name, descriptor)
    }

    /// `invokespecial`
    pub fn invokespecial(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.member(Opcode::Invokespecial, RefKind::Method, owner, name, descriptor)
    }

    /// `invokestatic`
    pub fn invokestatic(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.member(Opcode::Invokestatic, RefKind::Method, owner, name, descriptor)
    }

    /// `invokeinterface` with the argument count derived from the descriptor
    pub fn invokeinterface(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        let count = match MethodDescriptor::parse(descriptor) {
            Ok(desc) => desc.param_slots() + 1,
            Err(e) => {
                self.error.get_or_insert(e.into());
                1
            }
        };
        let index = self.pool.add_member_ref(&MemberRef {
            kind: RefKind::InterfaceMethod,
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        });
        let index = sticky(&mut self.error, index);
        self.writer.emit_u8(Opcode::Invokeinterface.to_u8());
        self.writer.emit_u16(index);
        self.writer.emit_u8(count as u8);
        self.writer.emit_u8(0);
        self
    }

    /// `new` for a class
    pub fn new_object(&mut self, class: &str) -> &mut Self {
        let index = sticky(&mut self.error, self.pool.add_class(class));
        self.op_u16(Opcode::New, index)
    }

    /// `checkcast`
    pub fn checkcast(&mut self, class: &str) -> &mut Self {
        let index = sticky(&mut self.error, self.pool.add_class(class));
        self.op_u16(Opcode::Checkcast, index)
    }

    /// `invokedynamic` against an arbitrary bootstrap method
    pub fn invokedynamic(&mut self, bootstrap: &HandleRef, arguments: &[BootstrapArg], name: &str, descriptor: &str) -> &mut Self {
        let method_ref = sticky(&mut self.error, self.pool.add_method_handle(bootstrap));
        let mut indices = Vec::with_capacity(arguments.len());
        for arg in arguments {
            let index = match arg {
                BootstrapArg::MethodType(desc) => self.pool.add_method_type(desc),
                BootstrapArg::Handle(handle) => self.pool.add_method_handle(handle),
                BootstrapArg::String(value) => self.pool.add_string(value),
                BootstrapArg::Integer(value) => self.pool.add_integer(*value),
                BootstrapArg::Class(name) => self.pool.add_class(name),
            };
            indices.push(sticky(&mut self.error, index));
        }
        let entry = BootstrapMethod {
            method_ref,
            arguments: indices,
        };
        let bootstrap_index = match self.bootstrap_methods.iter().position(|m| *m == entry) {
            Some(i) => i,
            None => {
                self.bootstrap_methods.push(entry);
                self.bootstrap_methods.len() - 1
            }
        };
        let index = u16::try_from(bootstrap_index)
            .map_err(|_| ClassFileError::BootstrapOverflow(bootstrap_index))
            .and_then(|bootstrap_index| self.pool.add_invoke_dynamic(bootstrap_index, name, descriptor));
        let index = sticky(&mut self.error, index);
        self.writer.emit_u8(Opcode::Invokedynamic.to_u8());
        self.writer.emit_u16(index);
        self.writer.emit_u16(0);
        self
    }

    /// Lambda call site: creates an `interface` instance whose `method` runs `implementation`
    ///
    /// `factory` is the call site descriptor (captured values to the
    /// interface type), `erased` the interface method descriptor and
    /// `instantiated` its specialization.
    pub fn lambda(
        &mut self,
        method: &str,
        factory: &str,
        erased: &str,
        implementation: HandleRef,
        instantiated: &str,
    ) -> &mut Self {
        let bootstrap = HandleRef {
            kind: ref_kind::INVOKE_STATIC,
            member: MemberRef {
                kind: RefKind::Method,
                owner: LAMBDA_METAFACTORY.to_string(),
                name: METAFACTORY_NAME.to_string(),
                descriptor: METAFACTORY_DESCRIPTOR.to_string(),
            },
        };
        let arguments = [
            BootstrapArg::MethodType(erased.to_string()),
            BootstrapArg::Handle(implementation),
            BootstrapArg::MethodType(instantiated.to_string()),
        ];
        self.invokedynamic(&bootstrap, &arguments, method, factory)
    }

    fn finish(mut self) -> Result<Code, BuildError> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }

        for jump in &self.jumps {
            let target = self.labels[jump.target.id].ok_or(BuildError::UnboundLabel(jump.target.id))?;
            let delta = target as i64 - jump.instruction as i64;
            let delta = i16::try_from(delta).map_err(|_| BuildError::BranchOutOfRange(jump.instruction))?;
            self.writer.patch_u16(jump.operand, delta as u16);
        }

        let mut exception_table = Vec::with_capacity(self.handlers.len());
        for &(start, end, handler, catch_type) in &self.handlers {
            let pc = |label: Label| {
                self.labels[label.id]
                    .map(|offset| offset as u16)
                    .ok_or(BuildError::UnboundLabel(label.id))
            };
            exception_table.push(ExceptionHandler {
                start_pc: pc(start)?,
                end_pc: pc(end)?,
                handler_pc: pc(handler)?,
                catch_type,
            });
        }

        Ok(Code {
            max_stack: 0,
            max_locals: 0,
            code: self.writer.into_bytes(),
            exception_table,
            attributes: Vec::new(),
        })
    }
}

/// Builds a [`ClassFile`]
#[derive(Debug)]
pub struct ClassBuilder {
    pool: ConstantPool,
    access_flags: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<MemberInfo>,
    methods: Vec<MemberInfo>,
    attributes: Vec<Attribute>,
    bootstrap_methods: Vec<BootstrapMethod>,
    line_numbers: bool,
    error: Option<BuildError>,
}

impl ClassBuilder {
    /// Start a public class with the given internal name and superclass
    pub fn new(name: &str, super_class: &str) -> Self {
        let mut pool = ConstantPool::new();
        let mut error = None;
        let this_class = sticky(&mut error, pool.add_class(name));
        let super_class = sticky(&mut error, pool.add_class(super_class));
        Self {
            pool,
            access_flags: access::PUBLIC | access::SUPER,
            this_class,
            super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
            bootstrap_methods: Vec::new(),
            line_numbers: false,
            error,
        }
    }

    /// Start an interface with the given internal name
    pub fn new_interface(name: &str) -> Self {
        let mut builder = Self::new(name, "java/lang/Object");
        builder.access_flags = access::PUBLIC | access::INTERFACE | access::ABSTRACT;
        builder
    }

    /// Replace the class access flags
    pub fn access(&mut self, flags: u16) -> &mut Self {
        self.access_flags = flags;
        self
    }

    /// Add a direct superinterface
    pub fn interface(&mut self, name: &str) -> &mut Self {
        let index = sticky(&mut self.error, self.pool.add_class(name));
        self.interfaces.push(index);
        self
    }

    /// Emit a one-entry `LineNumberTable` in every method body
    pub fn with_line_numbers(&mut self) -> &mut Self {
        self.line_numbers = true;
        self
    }

    /// Add a `SourceFile` attribute
    pub fn source_file(&mut self, file: &str) -> &mut Self {
        let name_index = sticky(&mut self.error, self.pool.add_utf8(attr::SOURCE_FILE));
        let value = sticky(&mut self.error, self.pool.add_utf8(file));
        self.attributes.push(Attribute {
            name_index,
            info: AttributeInfo::Raw(value.to_be_bytes().to_vec()),
        });
        self
    }

    /// Add a field
    pub fn field(&mut self, flags: u16, name: &str, descriptor: &str) -> &mut Self {
        let name_index = sticky(&mut self.error, self.pool.add_utf8(name));
        let descriptor_index = sticky(&mut self.error, self.pool.add_utf8(descriptor));
        self.fields.push(MemberInfo {
            access_flags: flags,
            name_index,
            descriptor_index,
            attributes: Vec::new(),
        });
        self
    }

    /// Add a method whose body is emitted by `body`
    pub fn method<F>(&mut self, flags: u16, name: &str, descriptor: &str, body: F) -> &mut Self
    where
        F: FnOnce(&mut CodeBuilder<'_>),
    {
        let mut code = CodeBuilder::new(&mut self.pool, &mut self.bootstrap_methods);
        body(&mut code);
        let mut code = match code.finish() {
            Ok(code) => code,
            Err(error) => {
                self.error.get_or_insert(error);
                return self;
            }
        };

        if self.line_numbers {
            let name_index = sticky(&mut self.error, self.pool.add_utf8(attr::LINE_NUMBER_TABLE));
            // one entry: pc 0 -> line 1
            code.attributes.push(Attribute {
                name_index,
                info: AttributeInfo::Raw(vec![0, 1, 0, 0, 0, 1]),
            });
        }

        let code_name = sticky(&mut self.error, self.pool.add_utf8(attr::CODE));
        let name_index = sticky(&mut self.error, self.pool.add_utf8(name));
        let descriptor_index = sticky(&mut self.error, self.pool.add_utf8(descriptor));
        self.methods.push(MemberInfo {
            access_flags: flags,
            name_index,
            descriptor_index,
            attributes: vec![Attribute {
                name_index: code_name,
                info: AttributeInfo::Code(code),
            }],
        });
        self
    }

    /// Add an abstract method
    pub fn abstract_method(&mut self, flags: u16, name: &str, descriptor: &str) -> &mut Self {
        let name_index = sticky(&mut self.error, self.pool.add_utf8(name));
        let descriptor_index = sticky(&mut self.error, self.pool.add_utf8(descriptor));
        self.methods.push(MemberInfo {
            access_flags: flags | access::ABSTRACT,
            name_index,
            descriptor_index,
            attributes: Vec::new(),
        });
        self
    }

    /// Public no-argument constructor calling the superclass constructor
    pub fn default_constructor(&mut self) -> &mut Self {
        let super_name = match self.pool.class_name(self.super_class) {
            Ok(name) => name.to_string(),
            Err(error) => {
                self.error.get_or_insert(error.into());
                return self;
            }
        };
        self.method(access::PUBLIC, "<init>", "()V", |c| {
            c.aload(0)
                .invokespecial(&super_name, "<init>", "()V")
                .op(Opcode::Return);
        })
    }

    /// Attach a runtime-visible annotation to the most recently added method
    ///
    /// `value` becomes the annotation's `value` string element.
    pub fn annotate(&mut self, descriptor: &str, value: Option<&str>) -> &mut Self {
        let type_index = sticky(&mut self.error, self.pool.add_utf8(descriptor));
        let elements = match value {
            Some(value) => {
                let name = sticky(&mut self.error, self.pool.add_utf8("value"));
                let index = sticky(&mut self.error, self.pool.add_utf8(value));
                vec![(name, ElementValue::Const { tag: b's', index })]
            }
            None => Vec::new(),
        };
        let annotation = Annotation { type_index, elements };
        let attr_name = sticky(&mut self.error, self.pool.add_utf8(attr::RUNTIME_VISIBLE_ANNOTATIONS));

        let Some(method) = self.methods.last_mut() else {
            return self;
        };
        let existing = method
            .attributes
            .iter_mut()
            .find(|a| a.name_index == attr_name);
        match existing {
            Some(Attribute {
                info: AttributeInfo::Raw(body),
                ..
            }) => {
                let mut annotations = decode_annotations(body).unwrap_or_default();
                annotations.push(annotation);
                *body = encode_annotations(&annotations);
            }
            _ => method.attributes.push(Attribute {
                name_index: attr_name,
                info: AttributeInfo::Raw(encode_annotations(&[annotation])),
            }),
        }
        self
    }

    fn assemble(&mut self) -> Result<ClassFile, BuildError> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        let mut attributes = std::mem::take(&mut self.attributes);
        if !self.bootstrap_methods.is_empty() {
            attributes.push(Attribute {
                name_index: self.pool.add_utf8(attr::BOOTSTRAP_METHODS)?,
                info: AttributeInfo::BootstrapMethods(std::mem::take(&mut self.bootstrap_methods)),
            });
        }
        Ok(ClassFile {
            minor_version: 0,
            major_version: DEFAULT_MAJOR_VERSION,
            constant_pool: std::mem::take(&mut self.pool),
            access_flags: self.access_flags,
            this_class: self.this_class,
            super_class: self.super_class,
            interfaces: std::mem::take(&mut self.interfaces),
            fields: std::mem::take(&mut self.fields),
            methods: std::mem::take(&mut self.methods),
            attributes,
        })
    }

    /// Finish the class, computing `max_stack` and `max_locals` for every body
    pub fn build(&mut self) -> Result<ClassFile, BuildError> {
        let mut class = self.assemble()?;
        for method in &mut class.methods {
            let key = format!(
                "{}{}",
                method.name(&class.constant_pool)?,
                method.descriptor(&class.constant_pool)?
            );
            let limits = match method.code() {
                Some(code) => compute_limits(method, code, &class.constant_pool)
                    .map_err(|error| BuildError::Limits { method: key, error })?,
                None => continue,
            };
            if let Some(code) = method.code_mut() {
                (code.max_stack, code.max_locals) = limits;
            }
        }
        Ok(class)
    }

    /// Finish the class without computing limits (both stay 0)
    pub fn build_unchecked(&mut self) -> Result<ClassFile, BuildError> {
        self.assemble()
    }

    /// Finish and encode to bytes
    pub fn build_bytes(&mut self) -> Result<Vec<u8>, BuildError> {
        Ok(self.build()?.encode())
    }
}
