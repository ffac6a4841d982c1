//! Bytecode interpreter
//!
//! Runs method bodies of installed classes one frame at a time. Method
//! resolution, selection and access checks follow the JVM rules closely
//! enough that a class which only works because of a rewrite (a widened
//! member, a retargeted lambda handle) fails here without it:
//! - private members are accessible only from their declaring class
//! - interface dispatch selects only public implementations
//! - field and method owners must be supertypes of the receiver
//!
//! Long and double values take one operand stack entry and two local slots.

use crate::class::RuntimeClass;
use crate::defaults::LAMBDA_METAFACTORY;
use crate::error::{RuntimeError, RuntimeResult};
use crate::host;
use crate::registry::{is_host_type, ClassRegistry};
use crate::value::{Lambda, Object, Value};
use pft_engine::classfile::{
    access, decode_instructions, ref_kind, ClassFileError, Code, Constant, FieldType, HandleRef, Instruction,
    MemberRef, MethodDescriptor, Opcode, Operand, RefKind, VerifyError,
};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tracing::trace;

const STRING_CONCAT_FACTORY: &str = "java/lang/invoke/StringConcatFactory";

/// Caller used for access checks; `None` is code outside every installed class
pub type Caller<'a> = Option<&'a Arc<RuntimeClass>>;

/// Interpreter over one registry
pub struct Interpreter {
    registry: ClassRegistry,
    depth: usize,
}

/// Operand stack and locals of one activation
struct Frame {
    stack: Vec<Value>,
    locals: Vec<Value>,
    offset: usize,
}

impl Frame {
    fn new(max_locals: u16, args: Vec<Value>) -> Self {
        let needed: usize = args.iter().map(|v| if v.is_category2() { 2 } else { 1 }).sum();
        let mut locals = vec![Value::Null; needed.max(max_locals as usize)];
        let mut slot = 0;
        for value in args {
            let width = if value.is_category2() { 2 } else { 1 };
            locals[slot] = value;
            slot += width;
        }
        Self {
            stack: Vec::new(),
            locals,
            offset: 0,
        }
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> RuntimeResult<Value> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow(self.offset))
    }

    fn peek(&self) -> RuntimeResult<&Value> {
        self.stack.last().ok_or(RuntimeError::StackUnderflow(self.offset))
    }

    fn pop_int(&mut self) -> RuntimeResult<i32> {
        self.pop()?.as_int()
    }

    fn pop_long(&mut self) -> RuntimeResult<i64> {
        self.pop()?.as_long()
    }

    fn pop_float(&mut self) -> RuntimeResult<f32> {
        self.pop()?.as_float()
    }

    fn pop_double(&mut self) -> RuntimeResult<f64> {
        self.pop()?.as_double()
    }

    /// Pop `count` values, first-pushed first
    fn pop_n(&mut self, count: usize) -> RuntimeResult<Vec<Value>> {
        let at = self
            .stack
            .len()
            .checked_sub(count)
            .ok_or(RuntimeError::StackUnderflow(self.offset))?;
        Ok(self.stack.split_off(at))
    }

    fn load(&self, slot: u16) -> RuntimeResult<Value> {
        self.locals
            .get(slot as usize)
            .cloned()
            .ok_or_else(|| RuntimeError::TypeError(format!("local {} out of range", slot)))
    }

    fn store(&mut self, slot: u16, value: Value) -> RuntimeResult<()> {
        let slot = slot as usize;
        let width = if value.is_category2() { 2 } else { 1 };
        if slot + width > self.locals.len() {
            self.locals.resize(slot + width, Value::Null);
        }
        self.locals[slot] = value;
        Ok(())
    }
}

macro_rules! binary {
    ($frame:ident, $pop:ident, $variant:ident, |$a:ident, $b:ident| $body:expr) => {{
        let $b = $frame.$pop()?;
        let $a = $frame.$pop()?;
        $frame.push(Value::$variant($body));
    }};
}

macro_rules! unary {
    ($frame:ident, $pop:ident, $variant:ident, |$a:ident| $body:expr) => {{
        let $a = $frame.$pop()?;
        $frame.push(Value::$variant($body));
    }};
}

fn float_compare(a: f64, b: f64, nan: i32) -> i32 {
    match a.partial_cmp(&b) {
        Some(std::cmp::Ordering::Less) => -1,
        Some(std::cmp::Ordering::Equal) => 0,
        Some(std::cmp::Ordering::Greater) => 1,
        None => nan,
    }
}

fn division_by_zero() -> RuntimeError {
    RuntimeError::Arithmetic("/ by zero".into())
}

fn member_name(member: &MemberRef) -> String {
    format!("{}.{}{}", member.owner, member.name, member.descriptor)
}

fn method_index(class: &RuntimeClass, name: &str, descriptor: &str) -> Option<usize> {
    let pool = &class.file().constant_pool;
    class
        .file()
        .methods
        .iter()
        .position(|m| m.name(pool).ok() == Some(name) && m.descriptor(pool).ok() == Some(descriptor))
}

fn method_flags(class: &RuntimeClass, index: usize) -> u16 {
    class.file().methods[index].access_flags
}

fn with_receiver(receiver: Value, args: Vec<Value>) -> Vec<Value> {
    let mut all = Vec::with_capacity(args.len() + 1);
    all.push(receiver);
    all.extend(args);
    all
}

impl Interpreter {
    /// Create an interpreter over `registry`
    pub fn new(registry: &ClassRegistry) -> Self {
        Self {
            registry: registry.clone(),
            depth: 0,
        }
    }

    /// Current call depth
    pub fn depth(&self) -> usize {
        self.depth
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Resolve a method against `owner`: its superclass chain, then its superinterfaces
    pub(crate) fn resolve_method(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> RuntimeResult<Option<(Arc<RuntimeClass>, usize)>> {
        let start = self.registry.class(owner)?;
        if name == "<init>" || name == "<clinit>" {
            return Ok(method_index(&start, name, descriptor).map(|i| (start, i)));
        }

        let mut chain = Vec::new();
        let mut current = Some(start);
        while let Some(class) = current {
            if let Some(index) = method_index(&class, name, descriptor) {
                return Ok(Some((class, index)));
            }
            current = match class.super_name() {
                Some(parent) if !is_host_type(parent) => Some(self.registry.class(parent)?),
                _ => None,
            };
            chain.push(class);
        }

        for class in &chain {
            if let Some(found) = self.interface_method(class, name, descriptor, false)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Search the superinterfaces of `class`, optionally only for default methods
    fn interface_method(
        &self,
        class: &RuntimeClass,
        name: &str,
        descriptor: &str,
        defaults_only: bool,
    ) -> RuntimeResult<Option<(Arc<RuntimeClass>, usize)>> {
        let mut pending: Vec<String> = class.interfaces().to_vec();
        let mut seen = FxHashSet::default();
        while let Some(interface) = pending.pop() {
            if is_host_type(&interface) || !seen.insert(interface.clone()) {
                continue;
            }
            let interface = self.registry.class(&interface)?;
            if let Some(index) = method_index(&interface, name, descriptor) {
                let flags = method_flags(&interface, index);
                let usable = flags & access::STATIC == 0 && flags & access::PRIVATE == 0;
                if usable && (!defaults_only || flags & access::ABSTRACT == 0) {
                    return Ok(Some((interface, index)));
                }
            }
            pending.extend(interface.interfaces().iter().cloned());
        }
        Ok(None)
    }

    /// Select the implementation run for a receiver of class `class`
    ///
    /// Static methods never participate; private ones only for interface
    /// dispatch, where the caller rejects them as inaccessible.
    fn select_method(
        &self,
        class: &Arc<RuntimeClass>,
        name: &str,
        descriptor: &str,
        include_private: bool,
    ) -> RuntimeResult<Option<(Arc<RuntimeClass>, usize)>> {
        let mut current = Some(Arc::clone(class));
        while let Some(candidate) = current {
            if let Some(index) = method_index(&candidate, name, descriptor) {
                let flags = method_flags(&candidate, index);
                let private = flags & access::PRIVATE != 0;
                if flags & access::STATIC == 0 && (include_private || !private) {
                    return Ok(Some((candidate, index)));
                }
            }
            current = match candidate.super_name() {
                Some(parent) if !is_host_type(parent) => Some(self.registry.class(parent)?),
                _ => None,
            };
        }

        let mut current = Some(Arc::clone(class));
        while let Some(candidate) = current {
            if let Some(found) = self.interface_method(&candidate, name, descriptor, true)? {
                return Ok(Some(found));
            }
            current = match candidate.super_name() {
                Some(parent) if !is_host_type(parent) => Some(self.registry.class(parent)?),
                _ => None,
            };
        }
        Ok(None)
    }

    /// Resolve a field against `owner`, its superclasses and superinterfaces
    fn resolve_field(&self, member: &MemberRef) -> RuntimeResult<(Arc<RuntimeClass>, u16)> {
        let not_found = || RuntimeError::NoSuchField(format!("{}.{}", member.owner, member.name));
        if is_host_type(&member.owner) {
            return Err(not_found());
        }
        let mut current = Some(self.registry.class(&member.owner)?);
        let mut chain = Vec::new();
        while let Some(class) = current {
            if let Some(field) = class.field(&member.name, &member.descriptor) {
                let flags = field.access_flags;
                return Ok((class, flags));
            }
            current = match class.super_name() {
                Some(parent) if !is_host_type(parent) => Some(self.registry.class(parent)?),
                _ => None,
            };
            chain.push(class);
        }
        for class in &chain {
            for interface in class.interfaces() {
                if is_host_type(interface) {
                    continue;
                }
                let interface = self.registry.class(interface)?;
                if let Some(field) = interface.field(&member.name, &member.descriptor) {
                    let flags = field.access_flags;
                    return Ok((interface, flags));
                }
            }
        }
        Err(not_found())
    }

    /// Check that `caller` may use a member of `declaring` with `flags`
    fn check_access(&self, caller: Caller<'_>, declaring: &RuntimeClass, flags: u16, what: &str) -> RuntimeResult<()> {
        if flags & access::PUBLIC != 0 {
            return Ok(());
        }
        let denied = |from: &str| {
            RuntimeError::IllegalAccess(format!("{} is not accessible from {}", what, from))
        };
        let Some(caller) = caller else {
            return Err(denied("outside code"));
        };
        if caller.name() == declaring.name() {
            return Ok(());
        }
        if flags & access::PRIVATE != 0 {
            return Err(denied(caller.name()));
        }
        if caller.package() == declaring.package() {
            return Ok(());
        }
        if flags & access::PROTECTED != 0 && self.registry.is_assignable(caller.name(), declaring.name()) {
            return Ok(());
        }
        Err(denied(caller.name()))
    }

    fn check_receiver(&self, receiver: &RuntimeClass, owner: &str, what: &str) -> RuntimeResult<()> {
        if self.registry.is_assignable(receiver.name(), owner) {
            Ok(())
        } else {
            Err(RuntimeError::IncompatibleClassChange(format!(
                "{} used on {}, which is not a subtype of {}",
                what,
                receiver.name(),
                owner
            )))
        }
    }

    // ========================================================================
    // Invocation
    // ========================================================================

    /// Run `<clinit>` of `class` (and its superclasses) once
    ///
    /// A class whose initializer is already running, on this thread or
    /// another, is used as is.
    pub fn initialize(&mut self, class: &Arc<RuntimeClass>) -> RuntimeResult<()> {
        if !class.begin_init() {
            return Ok(());
        }
        let result = self.run_initializers(class);
        class.finish_init();
        result
    }

    fn run_initializers(&mut self, class: &Arc<RuntimeClass>) -> RuntimeResult<()> {
        if let Some(parent) = class.super_name().filter(|p| !is_host_type(p)) {
            let parent = self.registry.class(parent)?;
            self.initialize(&parent)?;
        }
        if let Some(index) = method_index(class, "<clinit>", "()V") {
            self.call(class, index, Vec::new())?;
        }
        Ok(())
    }

    /// Allocate an instance with every instance field at its default value
    fn allocate(&self, class: &Arc<RuntimeClass>) -> RuntimeResult<Arc<Object>> {
        if class.is_interface() || class.access_flags() & access::ABSTRACT != 0 {
            return Err(RuntimeError::IncompatibleClassChange(format!(
                "cannot instantiate {}",
                class.name()
            )));
        }
        let mut fields = FxHashMap::default();
        let mut current = Some(Arc::clone(class));
        while let Some(c) = current {
            for (name, descriptor) in c.instance_fields()? {
                fields.entry(name.to_string()).or_insert_with(|| Value::default_for(descriptor));
            }
            current = match c.super_name() {
                Some(parent) if !is_host_type(parent) => Some(self.registry.class(parent)?),
                _ => None,
            };
        }
        Ok(Arc::new(Object::new(Arc::clone(class), fields)))
    }

    /// Create an instance of `class` through the constructor with `descriptor`
    pub fn new_instance(
        &mut self,
        caller: Caller<'_>,
        class: &Arc<RuntimeClass>,
        descriptor: &str,
        args: Vec<Value>,
    ) -> RuntimeResult<Value> {
        self.initialize(class)?;
        let object = Value::Object(self.allocate(class)?);
        let constructor = MemberRef {
            kind: RefKind::Method,
            owner: class.name().to_string(),
            name: "<init>".to_string(),
            descriptor: descriptor.to_string(),
        };
        self.invoke_special(caller, &constructor, object.clone(), args)?;
        Ok(object)
    }

    /// `invokestatic`
    pub fn invoke_static(&mut self, caller: Caller<'_>, member: &MemberRef, args: Vec<Value>) -> RuntimeResult<Option<Value>> {
        if is_host_type(&member.owner) {
            return host::static_method(&member.owner, &member.name, &member.descriptor, &args);
        }
        let (declaring, index) = self
            .resolve_method(&member.owner, &member.name, &member.descriptor)?
            .ok_or_else(|| RuntimeError::NoSuchMethod(member_name(member)))?;
        let flags = method_flags(&declaring, index);
        if flags & access::STATIC == 0 {
            return Err(RuntimeError::IncompatibleClassChange(format!(
                "expected static method {}",
                member_name(member)
            )));
        }
        self.check_access(caller, &declaring, flags, &member_name(member))?;
        self.initialize(&declaring)?;
        self.call(&declaring, index, args)
    }

    /// `invokespecial`: constructors, private methods and super calls
    pub fn invoke_special(
        &mut self,
        caller: Caller<'_>,
        member: &MemberRef,
        receiver: Value,
        args: Vec<Value>,
    ) -> RuntimeResult<Option<Value>> {
        if is_host_type(&member.owner) {
            host::constructor(&member.owner, &member.descriptor, &receiver)?;
            return Ok(None);
        }
        let object = match &receiver {
            Value::Object(object) => Arc::clone(object),
            Value::Null => return Err(RuntimeError::NullPointer(format!("cannot invoke {} on null", member_name(member)))),
            other => return Err(RuntimeError::TypeError(format!("{:?} is not an instance", other))),
        };
        self.check_receiver(object.class(), &member.owner, &member_name(member))?;
        let (declaring, index) = self
            .resolve_method(&member.owner, &member.name, &member.descriptor)?
            .ok_or_else(|| RuntimeError::NoSuchMethod(member_name(member)))?;
        let flags = method_flags(&declaring, index);
        self.check_access(caller, &declaring, flags, &member_name(member))?;
        self.call(&declaring, index, with_receiver(receiver, args))
    }

    /// `invokevirtual`, or `invokeinterface` when `member` is an interface method
    pub fn invoke_virtual(
        &mut self,
        caller: Caller<'_>,
        member: &MemberRef,
        receiver: Value,
        args: Vec<Value>,
    ) -> RuntimeResult<Option<Value>> {
        let interface = member.kind == RefKind::InterfaceMethod;
        match &receiver {
            Value::Null => Err(RuntimeError::NullPointer(format!(
                "cannot invoke {} on null",
                member_name(member)
            ))),
            Value::Str(s) => host::string_method(s, &member.name, &member.descriptor, &args),
            Value::Int(_) | Value::Long(_) | Value::Float(_) | Value::Double(_) => {
                host::primitive_method(&receiver, &member.owner, &member.name, &member.descriptor)
            }
            Value::Lambda(lambda) => {
                if member.name == lambda.method {
                    let lambda = Arc::clone(lambda);
                    self.call_lambda(&lambda, args)
                } else {
                    host::object_method(&receiver, &member.name, &member.descriptor, &args)
                }
            }
            Value::Object(object) => {
                let class = Arc::clone(object.class());
                self.check_receiver(&class, &member.owner, &member_name(member))?;

                if !is_host_type(&member.owner) {
                    let resolved = self.resolve_method(&member.owner, &member.name, &member.descriptor)?;
                    match resolved {
                        Some((declaring, index)) => {
                            let flags = method_flags(&declaring, index);
                            if flags & access::STATIC != 0 {
                                return Err(RuntimeError::IncompatibleClassChange(format!(
                                    "expected instance method {}",
                                    member_name(member)
                                )));
                            }
                            self.check_access(caller, &declaring, flags, &member_name(member))?;
                            if flags & access::PRIVATE != 0 && !interface {
                                return self.call(&declaring, index, with_receiver(receiver, args));
                            }
                        }
                        None if member.name == "hashCode" || member.name == "equals" || member.name == "toString" => {}
                        None => return Err(RuntimeError::NoSuchMethod(member_name(member))),
                    }
                }

                match self.select_method(&class, &member.name, &member.descriptor, interface)? {
                    Some((selected, index)) => {
                        let flags = method_flags(&selected, index);
                        if interface && flags & access::PUBLIC == 0 {
                            return Err(RuntimeError::IllegalAccess(format!(
                                "{}.{}{} implements {} but is not public",
                                selected.name(),
                                member.name,
                                member.descriptor,
                                member.owner
                            )));
                        }
                        if flags & access::ABSTRACT != 0 {
                            return Err(RuntimeError::AbstractMethod(member_name(member)));
                        }
                        self.call(&selected, index, with_receiver(receiver, args))
                    }
                    None => host::object_method(&receiver, &member.name, &member.descriptor, &args)
                        .map_err(|_| RuntimeError::AbstractMethod(format!("{}.{}{}", class.name(), member.name, member.descriptor))),
                }
            }
        }
    }

    /// Invoke the interface method of a lambda
    fn call_lambda(&mut self, lambda: &Arc<Lambda>, args: Vec<Value>) -> RuntimeResult<Option<Value>> {
        let mut all = lambda.captured.clone();
        all.extend(args);
        let target = &lambda.implementation;
        let caller = Some(&lambda.caller);
        match target.kind {
            ref_kind::INVOKE_STATIC => self.invoke_static(caller, &target.member, all),
            ref_kind::INVOKE_VIRTUAL | ref_kind::INVOKE_INTERFACE | ref_kind::INVOKE_SPECIAL => {
                if all.is_empty() {
                    return Err(RuntimeError::TypeError(format!(
                        "lambda for {} has no receiver",
                        member_name(&target.member)
                    )));
                }
                let receiver = all.remove(0);
                if target.kind == ref_kind::INVOKE_SPECIAL {
                    self.invoke_special(caller, &target.member, receiver, all)
                } else {
                    self.invoke_virtual(caller, &target.member, receiver, all)
                }
            }
            ref_kind::NEW_INVOKE_SPECIAL => {
                let class = self.registry.class(&target.member.owner)?;
                self.new_instance(caller, &class, &target.member.descriptor, all).map(Some)
            }
            kind => Err(RuntimeError::UnsupportedBootstrap(format!(
                "method handle kind {} for {}",
                kind,
                member_name(&target.member)
            ))),
        }
    }

    /// Run a method body; `args` include the receiver for instance methods
    pub fn call(&mut self, class: &Arc<RuntimeClass>, index: usize, args: Vec<Value>) -> RuntimeResult<Option<Value>> {
        let method = &class.file().methods[index];
        let pool = &class.file().constant_pool;
        let name = method.name(pool)?;
        let descriptor = method.descriptor(pool)?;
        if method.access_flags & access::ABSTRACT != 0 {
            return Err(RuntimeError::AbstractMethod(format!("{}.{}{}", class.name(), name, descriptor)));
        }
        let code = method.code().ok_or_else(|| {
            RuntimeError::UnsupportedOpcode(format!("native method {}.{}{}", class.name(), name, descriptor))
        })?;
        if self.depth >= self.registry.options().max_call_depth {
            return Err(RuntimeError::StackOverflow(self.depth));
        }

        trace!(class = %class.name(), method = %name, depth = self.depth, "call");
        self.depth += 1;
        let result = self.execute(class, code, args);
        self.depth -= 1;
        result
    }

    // ========================================================================
    // Execution
    // ========================================================================

    fn execute(&mut self, class: &Arc<RuntimeClass>, code: &Code, args: Vec<Value>) -> RuntimeResult<Option<Value>> {
        let instructions = decode_instructions(&code.code).map_err(ClassFileError::from)?;
        let positions: FxHashMap<usize, usize> = instructions
            .iter()
            .enumerate()
            .map(|(i, insn)| (insn.offset, i))
            .collect();
        let jump = |target: usize| {
            positions.get(&target).copied().ok_or_else(|| {
                RuntimeError::TypeError(format!("branch to {} is not an instruction boundary", target))
            })
        };

        let mut frame = Frame::new(code.max_locals, args);
        let mut pc = 0;
        loop {
            let insn = instructions
                .get(pc)
                .ok_or(VerifyError::FallOffEnd(code.code.len()))?;
            frame.offset = insn.offset;
            pc += 1;

            match self.step(class, &mut frame, insn)? {
                Flow::Next => {}
                Flow::Jump(target) => pc = jump(target)?,
                Flow::Return(value) => return Ok(value),
            }
        }
    }

    fn step(&mut self, class: &Arc<RuntimeClass>, frame: &mut Frame, insn: &Instruction) -> RuntimeResult<Flow> {
        use Opcode::*;

        let pool = &class.file().constant_pool;
        let branch = |taken: bool| -> RuntimeResult<Flow> {
            match (&insn.operand, taken) {
                (Operand::Branch(target), true) => Ok(Flow::Jump(*target)),
                (Operand::Branch(_), false) => Ok(Flow::Next),
                _ => Err(RuntimeError::TypeError(format!("{} without branch target", insn.opcode.name()))),
            }
        };
        let constant_index = || {
            insn.constant_index()
                .ok_or_else(|| RuntimeError::TypeError(format!("{} without constant operand", insn.opcode.name())))
        };
        let local = || {
            insn.local_index()
                .ok_or_else(|| RuntimeError::TypeError(format!("{} without local operand", insn.opcode.name())))
        };

        match insn.opcode {
            Nop => {}

            // Constants
            AconstNull => frame.push(Value::Null),
            IconstM1 => frame.push(Value::Int(-1)),
            Iconst0 => frame.push(Value::Int(0)),
            Iconst1 => frame.push(Value::Int(1)),
            Iconst2 => frame.push(Value::Int(2)),
            Iconst3 => frame.push(Value::Int(3)),
            Iconst4 => frame.push(Value::Int(4)),
            Iconst5 => frame.push(Value::Int(5)),
            Lconst0 => frame.push(Value::Long(0)),
            Lconst1 => frame.push(Value::Long(1)),
            Fconst0 => frame.push(Value::Float(0.0)),
            Fconst1 => frame.push(Value::Float(1.0)),
            Fconst2 => frame.push(Value::Float(2.0)),
            Dconst0 => frame.push(Value::Double(0.0)),
            Dconst1 => frame.push(Value::Double(1.0)),
            Bipush | Sipush => match insn.operand {
                Operand::Immediate(value) => frame.push(Value::Int(value)),
                _ => return Err(RuntimeError::TypeError("push without immediate".into())),
            },
            Ldc | LdcW | Ldc2W => {
                let index = constant_index()?;
                let value = match pool.get(index) {
                    Some(Constant::Integer(v)) => Value::Int(*v),
                    Some(Constant::Float(v)) => Value::Float(*v),
                    Some(Constant::Long(v)) => Value::Long(*v),
                    Some(Constant::Double(v)) => Value::Double(*v),
                    Some(Constant::String { .. }) => Value::from(pool.string(index)?),
                    Some(other) => {
                        return Err(RuntimeError::UnsupportedOpcode(format!("ldc of {}", other.kind_name())))
                    }
                    None => return Err(RuntimeError::TypeError(format!("invalid constant #{}", index))),
                };
                frame.push(value);
            }

            // Locals
            Iload | Lload | Fload | Dload | Aload | Iload0 | Iload1 | Iload2 | Iload3 | Lload0 | Lload1
            | Lload2 | Lload3 | Fload0 | Fload1 | Fload2 | Fload3 | Dload0 | Dload1 | Dload2 | Dload3
            | Aload0 | Aload1 | Aload2 | Aload3 => {
                let value = frame.load(local()?)?;
                frame.push(value);
            }
            Istore | Lstore | Fstore | Dstore | Astore | Istore0 | Istore1 | Istore2 | Istore3 | Lstore0
            | Lstore1 | Lstore2 | Lstore3 | Fstore0 | Fstore1 | Fstore2 | Fstore3 | Dstore0 | Dstore1
            | Dstore2 | Dstore3 | Astore0 | Astore1 | Astore2 | Astore3 => {
                let value = frame.pop()?;
                frame.store(local()?, value)?;
            }
            Iinc => match insn.operand {
                Operand::Iinc { index, delta } => {
                    let value = frame.load(index)?.as_int()?;
                    frame.store(index, Value::Int(value.wrapping_add(delta as i32)))?;
                }
                _ => return Err(RuntimeError::TypeError("iinc without operand".into())),
            },

            // Stack
            Pop => {
                frame.pop()?;
            }
            Pop2 => {
                if !frame.pop()?.is_category2() {
                    frame.pop()?;
                }
            }
            Dup => {
                let value = frame.peek()?.clone();
                frame.push(value);
            }
            DupX1 => {
                let v1 = frame.pop()?;
                let v2 = frame.pop()?;
                frame.push(v1.clone());
                frame.push(v2);
                frame.push(v1);
            }
            DupX2 => {
                let v1 = frame.pop()?;
                let v2 = frame.pop()?;
                if v2.is_category2() {
                    frame.push(v1.clone());
                    frame.push(v2);
                } else {
                    let v3 = frame.pop()?;
                    frame.push(v1.clone());
                    frame.push(v3);
                    frame.push(v2);
                }
                frame.push(v1);
            }
            Dup2 => {
                let v1 = frame.pop()?;
                if v1.is_category2() {
                    frame.push(v1.clone());
                    frame.push(v1);
                } else {
                    let v2 = frame.pop()?;
                    frame.push(v2.clone());
                    frame.push(v1.clone());
                    frame.push(v2);
                    frame.push(v1);
                }
            }
            Swap => {
                let v1 = frame.pop()?;
                let v2 = frame.pop()?;
                frame.push(v1);
                frame.push(v2);
            }

            // Integer arithmetic
            Iadd => binary!(frame, pop_int, Int, |a, b| a.wrapping_add(b)),
            Isub => binary!(frame, pop_int, Int, |a, b| a.wrapping_sub(b)),
            Imul => binary!(frame, pop_int, Int, |a, b| a.wrapping_mul(b)),
            Idiv | Irem => {
                let b = frame.pop_int()?;
                let a = frame.pop_int()?;
                if b == 0 {
                    return Err(division_by_zero());
                }
                let value = if insn.opcode == Idiv { a.wrapping_div(b) } else { a.wrapping_rem(b) };
                frame.push(Value::Int(value));
            }
            Ineg => unary!(frame, pop_int, Int, |a| a.wrapping_neg()),
            Iand => binary!(frame, pop_int, Int, |a, b| a & b),
            Ior => binary!(frame, pop_int, Int, |a, b| a | b),
            Ixor => binary!(frame, pop_int, Int, |a, b| a ^ b),
            Ishl => binary!(frame, pop_int, Int, |a, b| a.wrapping_shl(b as u32)),
            Ishr => binary!(frame, pop_int, Int, |a, b| a.wrapping_shr(b as u32)),
            Iushr => binary!(frame, pop_int, Int, |a, b| ((a as u32).wrapping_shr(b as u32)) as i32),

            // Long arithmetic
            Ladd => binary!(frame, pop_long, Long, |a, b| a.wrapping_add(b)),
            Lsub => binary!(frame, pop_long, Long, |a, b| a.wrapping_sub(b)),
            Lmul => binary!(frame, pop_long, Long, |a, b| a.wrapping_mul(b)),
            Ldiv | Lrem => {
                let b = frame.pop_long()?;
                let a = frame.pop_long()?;
                if b == 0 {
                    return Err(division_by_zero());
                }
                let value = if insn.opcode == Ldiv { a.wrapping_div(b) } else { a.wrapping_rem(b) };
                frame.push(Value::Long(value));
            }
            Lneg => unary!(frame, pop_long, Long, |a| a.wrapping_neg()),
            Land => binary!(frame, pop_long, Long, |a, b| a & b),
            Lor => binary!(frame, pop_long, Long, |a, b| a | b),
            Lxor => binary!(frame, pop_long, Long, |a, b| a ^ b),
            Lshl | Lshr | Lushr => {
                let shift = frame.pop_int()? as u32;
                let a = frame.pop_long()?;
                let value = match insn.opcode {
                    Lshl => a.wrapping_shl(shift),
                    Lshr => a.wrapping_shr(shift),
                    _ => ((a as u64).wrapping_shr(shift)) as i64,
                };
                frame.push(Value::Long(value));
            }
            Lcmp => binary!(frame, pop_long, Int, |a, b| a.cmp(&b) as i32),

            // Floating point
            Fadd => binary!(frame, pop_float, Float, |a, b| a + b),
            Fsub => binary!(frame, pop_float, Float, |a, b| a - b),
            Fmul => binary!(frame, pop_float, Float, |a, b| a * b),
            Fdiv => binary!(frame, pop_float, Float, |a, b| a / b),
            Frem => binary!(frame, pop_float, Float, |a, b| a % b),
            Fneg => unary!(frame, pop_float, Float, |a| -a),
            Dadd => binary!(frame, pop_double, Double, |a, b| a + b),
            Dsub => binary!(frame, pop_double, Double, |a, b| a - b),
            Dmul => binary!(frame, pop_double, Double, |a, b| a * b),
            Ddiv => binary!(frame, pop_double, Double, |a, b| a / b),
            Drem => binary!(frame, pop_double, Double, |a, b| a % b),
            Dneg => unary!(frame, pop_double, Double, |a| -a),
            Fcmpl => binary!(frame, pop_float, Int, |a, b| float_compare(a as f64, b as f64, -1)),
            Fcmpg => binary!(frame, pop_float, Int, |a, b| float_compare(a as f64, b as f64, 1)),
            Dcmpl => binary!(frame, pop_double, Int, |a, b| float_compare(a, b, -1)),
            Dcmpg => binary!(frame, pop_double, Int, |a, b| float_compare(a, b, 1)),

            // Conversions
            I2l => unary!(frame, pop_int, Long, |a| a as i64),
            I2f => unary!(frame, pop_int, Float, |a| a as f32),
            I2d => unary!(frame, pop_int, Double, |a| a as f64),
            L2i => unary!(frame, pop_long, Int, |a| a as i32),
            L2f => unary!(frame, pop_long, Float, |a| a as f32),
            L2d => unary!(frame, pop_long, Double, |a| a as f64),
            F2i => unary!(frame, pop_float, Int, |a| a as i32),
            F2l => unary!(frame, pop_float, Long, |a| a as i64),
            F2d => unary!(frame, pop_float, Double, |a| a as f64),
            D2i => unary!(frame, pop_double, Int, |a| a as i32),
            D2l => unary!(frame, pop_double, Long, |a| a as i64),
            D2f => unary!(frame, pop_double, Float, |a| a as f32),
            I2b => unary!(frame, pop_int, Int, |a| a as i8 as i32),
            I2c => unary!(frame, pop_int, Int, |a| a as u16 as i32),
            I2s => unary!(frame, pop_int, Int, |a| a as i16 as i32),

            // Branches
            Ifeq => return branch(frame.pop_int()? == 0),
            Ifne => return branch(frame.pop_int()? != 0),
            Iflt => return branch(frame.pop_int()? < 0),
            Ifge => return branch(frame.pop_int()? >= 0),
            Ifgt => return branch(frame.pop_int()? > 0),
            Ifle => return branch(frame.pop_int()? <= 0),
            IfIcmpeq | IfIcmpne | IfIcmplt | IfIcmpge | IfIcmpgt | IfIcmple => {
                let b = frame.pop_int()?;
                let a = frame.pop_int()?;
                let taken = match insn.opcode {
                    IfIcmpeq => a == b,
                    IfIcmpne => a != b,
                    IfIcmplt => a < b,
                    IfIcmpge => a >= b,
                    IfIcmpgt => a > b,
                    _ => a <= b,
                };
                return branch(taken);
            }
            IfAcmpeq | IfAcmpne => {
                let b = frame.pop()?;
                let a = frame.pop()?;
                let same = a.same_reference(&b);
                return branch(if insn.opcode == IfAcmpeq { same } else { !same });
            }
            Ifnull => return branch(frame.pop()?.is_null()),
            Ifnonnull => return branch(!frame.pop()?.is_null()),
            Goto | GotoW => return branch(true),
            Tableswitch => {
                let key = frame.pop_int()?;
                if let Operand::Table { default, low, targets } = &insn.operand {
                    let target = key
                        .checked_sub(*low)
                        .and_then(|i| usize::try_from(i).ok())
                        .and_then(|i| targets.get(i))
                        .unwrap_or(default);
                    return Ok(Flow::Jump(*target));
                }
                return Err(RuntimeError::TypeError("tableswitch without table".into()));
            }
            Lookupswitch => {
                let key = frame.pop_int()?;
                if let Operand::Lookup { default, pairs } = &insn.operand {
                    let target = pairs
                        .iter()
                        .find(|(k, _)| *k == key)
                        .map_or(*default, |(_, t)| *t);
                    return Ok(Flow::Jump(target));
                }
                return Err(RuntimeError::TypeError("lookupswitch without table".into()));
            }

            // Returns
            Ireturn | Lreturn | Freturn | Dreturn | Areturn => return Ok(Flow::Return(Some(frame.pop()?))),
            Return => return Ok(Flow::Return(None)),

            // Fields
            Getstatic | Putstatic => {
                let member = pool.member_ref(constant_index()?)?;
                let (declaring, flags) = self.resolve_field(&member)?;
                let what = format!("{}.{}", member.owner, member.name);
                if flags & access::STATIC == 0 {
                    return Err(RuntimeError::IncompatibleClassChange(format!("expected static field {}", what)));
                }
                self.check_access(Some(class), &declaring, flags, &what)?;
                self.initialize(&declaring)?;
                if insn.opcode == Getstatic {
                    let value = declaring
                        .get_static(&member.name)
                        .unwrap_or_else(|| Value::default_for(&member.descriptor));
                    frame.push(value);
                } else {
                    let value = frame.pop()?;
                    declaring.set_static(&member.name, value);
                }
            }
            Getfield | Putfield => {
                let member = pool.member_ref(constant_index()?)?;
                let what = format!("{}.{}", member.owner, member.name);
                let value = if insn.opcode == Putfield { Some(frame.pop()?) } else { None };
                let object = match frame.pop()? {
                    Value::Object(object) => object,
                    Value::Null => return Err(RuntimeError::NullPointer(format!("field {} of null", what))),
                    other => return Err(RuntimeError::TypeError(format!("field {} of {:?}", what, other))),
                };
                let (declaring, flags) = self.resolve_field(&member)?;
                if flags & access::STATIC != 0 {
                    return Err(RuntimeError::IncompatibleClassChange(format!("expected instance field {}", what)));
                }
                self.check_receiver(object.class(), &member.owner, &what)?;
                self.check_access(Some(class), &declaring, flags, &what)?;
                match value {
                    Some(value) => object.set_field(&member.name, value),
                    None => frame.push(
                        object
                            .get_field(&member.name)
                            .unwrap_or_else(|| Value::default_for(&member.descriptor)),
                    ),
                }
            }

            // Invocation
            Invokestatic | Invokespecial | Invokevirtual | Invokeinterface => {
                let member = pool.member_ref(constant_index()?)?;
                let descriptor = MethodDescriptor::parse(&member.descriptor)?;
                let args = frame.pop_n(descriptor.params.len())?;
                let result = if insn.opcode == Invokestatic {
                    self.invoke_static(Some(class), &member, args)?
                } else {
                    let receiver = frame.pop()?;
                    if insn.opcode == Invokespecial {
                        self.invoke_special(Some(class), &member, receiver, args)?
                    } else {
                        self.invoke_virtual(Some(class), &member, receiver, args)?
                    }
                };
                if let Some(value) = result {
                    frame.push(value);
                }
            }
            Invokedynamic => {
                let value = self.link_call_site(class, frame, constant_index()?)?;
                frame.push(value);
            }

            // Objects
            New => {
                let name = pool.class_name(constant_index()?)?;
                if is_host_type(name) {
                    return Err(RuntimeError::UnsupportedOpcode(format!("new {}", name)));
                }
                let target = self.registry.class(name)?;
                self.initialize(&target)?;
                let object = self.allocate(&target)?;
                frame.push(Value::Object(object));
            }
            Checkcast | Instanceof => {
                let target = pool.class_name(constant_index()?)?;
                let value = frame.pop()?;
                let matches = match &value {
                    Value::Null => None,
                    Value::Lambda(lambda) => Some(lambda.implements(target)),
                    other => Some(other.class_name().is_some_and(|from| self.registry.is_assignable(from, target))),
                };
                if insn.opcode == Instanceof {
                    frame.push(Value::from(matches.unwrap_or(false)));
                } else if matches == Some(false) {
                    return Err(RuntimeError::ClassCast {
                        from: value.class_name().unwrap_or("?").to_string(),
                        to: target.to_string(),
                    });
                } else {
                    frame.push(value);
                }
            }
            Monitorenter | Monitorexit => {
                if frame.pop()?.is_null() {
                    return Err(RuntimeError::NullPointer("monitor on null".into()));
                }
            }

            other => return Err(RuntimeError::UnsupportedOpcode(other.name().to_string())),
        }
        Ok(Flow::Next)
    }

    // ========================================================================
    // Call sites
    // ========================================================================

    fn link_call_site(&mut self, class: &Arc<RuntimeClass>, frame: &mut Frame, index: u16) -> RuntimeResult<Value> {
        let pool = &class.file().constant_pool;
        let site = pool.invoke_dynamic(index)?;
        let bootstrap = class
            .file()
            .bootstrap_methods()
            .and_then(|methods| methods.get(site.bootstrap_index as usize))
            .ok_or_else(|| {
                RuntimeError::UnsupportedBootstrap(format!("missing bootstrap method #{}", site.bootstrap_index))
            })?;
        let handle = pool.method_handle(bootstrap.method_ref)?;
        let descriptor = MethodDescriptor::parse(&site.descriptor)?;
        let captured = frame.pop_n(descriptor.params.len())?;

        match (handle.member.owner.as_str(), handle.member.name.as_str()) {
            (LAMBDA_METAFACTORY, "metafactory" | "altMetafactory") => {
                let (erased, implementation) = match bootstrap.arguments.as_slice() {
                    [erased, implementation, _, ..] => (*erased, *implementation),
                    _ => {
                        return Err(RuntimeError::UnsupportedBootstrap(
                            "metafactory expects three static arguments".into(),
                        ))
                    }
                };
                let erased = match pool.get(erased) {
                    Some(Constant::MethodType { descriptor_index }) => pool.utf8(*descriptor_index)?.to_string(),
                    _ => return Err(RuntimeError::UnsupportedBootstrap("metafactory argument 0 is not a MethodType".into())),
                };
                let implementation = pool.method_handle(implementation)?;
                self.check_handle_access(class, &implementation)?;
                let interface = match descriptor.ret {
                    Some(FieldType::Object(name)) => name,
                    _ => {
                        return Err(RuntimeError::TypeError(format!(
                            "lambda call site {} does not return an interface",
                            site.descriptor
                        )))
                    }
                };
                Ok(Value::Lambda(Arc::new(Lambda {
                    interface,
                    method: site.name,
                    erased,
                    implementation,
                    captured,
                    caller: Arc::clone(class),
                })))
            }
            (STRING_CONCAT_FACTORY, "makeConcatWithConstants") => {
                let mut arguments = bootstrap.arguments.iter();
                let recipe = arguments
                    .next()
                    .map(|&i| pool.string(i))
                    .transpose()?
                    .ok_or_else(|| RuntimeError::UnsupportedBootstrap("concat without recipe".into()))?;
                let constants = arguments
                    .map(|&i| match pool.get(i) {
                        Some(Constant::Integer(v)) => Ok(v.to_string()),
                        _ => Ok(pool.string(i)?.to_string()),
                    })
                    .collect::<RuntimeResult<Vec<String>>>()?;
                host::concat(recipe, &constants, &descriptor, &captured)
            }
            (owner, name) => Err(RuntimeError::UnsupportedBootstrap(format!("{}.{}", owner, name))),
        }
    }

    /// A lambda may only target members its linking class can access
    fn check_handle_access(&self, caller: &Arc<RuntimeClass>, handle: &HandleRef) -> RuntimeResult<()> {
        let member = &handle.member;
        if is_host_type(&member.owner) {
            return Ok(());
        }
        let (declaring, index) = self
            .resolve_method(&member.owner, &member.name, &member.descriptor)?
            .ok_or_else(|| RuntimeError::NoSuchMethod(member_name(member)))?;
        self.check_access(Some(caller), &declaring, method_flags(&declaring, index), &member_name(member))
    }
}

/// Outcome of one instruction
enum Flow {
    Next,
    Jump(usize),
    Return(Option<Value>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::RuntimeOptions;
    use pft_engine::classfile::ClassBuilder;

    fn math_registry() -> (ClassRegistry, Arc<RuntimeClass>) {
        let mut builder = ClassBuilder::new("demo/Math", "java/lang/Object");
        builder
            .method(access::PUBLIC | access::STATIC, "sum", "(I)I", |c| {
                // sum of 1..=n
                let head = c.new_label();
                let done = c.new_label();
                c.iconst(0).istore(1);
                c.bind(head).iload(0).ifeq(done);
                c.iload(1).iload(0).op(Opcode::Iadd).istore(1);
                c.iload(0).iconst(1).op(Opcode::Isub).istore(0);
                c.goto(head);
                c.bind(done).iload(1).op(Opcode::Ireturn);
            })
            .method(access::PUBLIC | access::STATIC, "recurse", "()V", |c| {
                c.invokestatic("demo/Math", "recurse", "()V").op(Opcode::Return);
            })
            .method(access::PUBLIC | access::STATIC, "divide", "(II)I", |c| {
                c.iload(0).iload(1).op(Opcode::Idiv).op(Opcode::Ireturn);
            });
        let registry = ClassRegistry::with_options(RuntimeOptions::default().with_max_call_depth(32));
        registry.define_class(&builder.build_bytes().unwrap()).unwrap();
        let class = registry.class("demo/Math").unwrap();
        (registry, class)
    }

    fn static_ref(name: &str, descriptor: &str) -> MemberRef {
        MemberRef {
            kind: RefKind::Method,
            owner: "demo/Math".into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    #[test]
    fn test_loop_and_arithmetic() {
        let (registry, _) = math_registry();
        let mut interpreter = Interpreter::new(&registry);
        let result = interpreter
            .invoke_static(None, &static_ref("sum", "(I)I"), vec![Value::Int(10)])
            .unwrap();
        assert_eq!(result, Some(Value::Int(55)));
        assert_eq!(interpreter.depth(), 0);
    }

    #[test]
    fn test_call_depth_limit() {
        let (registry, _) = math_registry();
        let mut interpreter = Interpreter::new(&registry);
        let err = interpreter
            .invoke_static(None, &static_ref("recurse", "()V"), Vec::new())
            .unwrap_err();
        assert_eq!(err, RuntimeError::StackOverflow(32));
    }

    #[test]
    fn test_division_by_zero() {
        let (registry, _) = math_registry();
        let mut interpreter = Interpreter::new(&registry);
        let err = interpreter
            .invoke_static(None, &static_ref("divide", "(II)I"), vec![Value::Int(1), Value::Int(0)])
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Arithmetic(_)));
    }

    #[test]
    fn test_missing_method() {
        let (registry, _) = math_registry();
        let mut interpreter = Interpreter::new(&registry);
        let err = interpreter
            .invoke_static(None, &static_ref("absent", "()V"), Vec::new())
            .unwrap_err();
        assert_eq!(err, RuntimeError::NoSuchMethod("demo/Math.absent()V".into()));
    }

    #[test]
    fn test_private_static_inaccessible_from_outside() {
        let mut builder = ClassBuilder::new("demo/Secret", "java/lang/Object");
        builder.method(access::PRIVATE | access::STATIC, "code", "()I", |c| {
            c.iconst(7).op(Opcode::Ireturn);
        });
        let registry = ClassRegistry::new();
        registry.define_class(&builder.build_bytes().unwrap()).unwrap();

        let member = MemberRef {
            kind: RefKind::Method,
            owner: "demo/Secret".into(),
            name: "code".into(),
            descriptor: "()I".into(),
        };
        let err = Interpreter::new(&registry).invoke_static(None, &member, Vec::new()).unwrap_err();
        assert!(matches!(err, RuntimeError::IllegalAccess(_)));
    }
}
