//! Structural verification and limit computation
//!
//! This is not a type-checking verifier. It checks what the rewriter can get
//! wrong: constant kinds at every instruction, branch targets, exception
//! ranges, stack consistency across control flow, and the declared
//! `max_stack` / `max_locals` against what the code actually needs.

use super::class::{access, ClassFile, ClassFileError, Code, MemberInfo};
use super::code::{decode_instructions, Instruction, Operand};
use super::constants::{Constant, ConstantPool};
use super::descriptor::{FieldType, MethodDescriptor};
use super::encoder::DecodeError;
use super::opcode::Opcode;
use rustc_hash::{FxHashMap, FxHashSet};

/// Verification errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// Instruction stream could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Constant pool or descriptor problem
    #[error("{0}")]
    ClassFile(#[from] ClassFileError),

    /// Stack underflow
    #[error("Stack underflow at offset {0}")]
    StackUnderflow(usize),

    /// Two paths reach an instruction with different stack depths
    #[error("Inconsistent stack depth at offset {offset}: {expected} vs {found}")]
    InconsistentStack {
        /// Offset of the join point
        offset: usize,
        /// Depth recorded first
        expected: i32,
        /// Depth on the new path
        found: i32,
    },

    /// Depth no longer fits `max_stack`, e.g. a subroutine that calls itself
    #[error("Stack depth exceeds 65535 at offset {0}")]
    StackTooDeep(usize),

    /// Invalid jump target
    #[error("Invalid jump target {target} at offset {offset}")]
    InvalidJumpTarget {
        /// The invalid jump target
        target: usize,
        /// Offset in bytecode
        offset: usize,
    },

    /// Constant pool entry of the wrong kind for the instruction
    #[error("Invalid constant pool reference: index {index} at offset {offset} (expected {expected})")]
    InvalidConstantRef {
        /// The constant index
        index: u16,
        /// Offset in bytecode
        offset: usize,
        /// Expected entry kind
        expected: &'static str,
    },

    /// Execution falls off end
    #[error("Execution falls off end of method at offset {0}")]
    FallOffEnd(usize),

    /// Empty or oversized code array
    #[error("Invalid code length {0}")]
    InvalidCodeLength(usize),

    /// Exception table entry out of range
    #[error("Invalid exception handler #{0}")]
    InvalidExceptionHandler(usize),

    /// Declared max_stack too small
    #[error("max_stack {declared} is below required {required}")]
    MaxStackExceeded {
        /// Declared value
        declared: u16,
        /// Computed value
        required: u16,
    },

    /// Declared max_locals too small
    #[error("max_locals {declared} is below required {required}")]
    MaxLocalsExceeded {
        /// Declared value
        declared: u16,
        /// Computed value
        required: u16,
    },

    /// Interface listed twice
    #[error("Duplicate interface {0}")]
    DuplicateInterface(String),

    /// Two members with the same name and descriptor
    #[error("Duplicate member {0}")]
    DuplicateMember(String),

    /// Concrete method without code, or abstract method with code
    #[error("Method {0} has inconsistent code and access flags")]
    CodePresence(String),

    /// Bootstrap method entry is malformed
    #[error("Invalid bootstrap method #{0}")]
    InvalidBootstrapMethod(usize),

    /// Error inside a specific method
    #[error("In method {method}: {error}")]
    InMethod {
        /// `name` + `descriptor`
        method: String,
        /// Underlying error
        error: Box<VerifyError>,
    },
}

/// Stack slots consumed and produced by one instruction
fn stack_effect(insn: &Instruction, pool: &ConstantPool) -> Result<(i32, i32), VerifyError> {
    use Opcode::*;
    let effect = match insn.opcode {
        Nop | Iinc | Goto | GotoW | Ret | Return | Wide => (0, 0),
        AconstNull | IconstM1 | Iconst0 | Iconst1 | Iconst2 | Iconst3 | Iconst4 | Iconst5
        | Fconst0 | Fconst1 | Fconst2 | Bipush | Sipush | Iload | Fload | Aload | Iload0
        | Iload1 | Iload2 | Iload3 | Fload0 | Fload1 | Fload2 | Fload3 | Aload0 | Aload1
        | Aload2 | Aload3 | New | Jsr | JsrW => (0, 1),
        Lconst0 | Lconst1 | Dconst0 | Dconst1 | Lload | Dload | Lload0 | Lload1 | Lload2
        | Lload3 | Dload0 | Dload1 | Dload2 | Dload3 => (0, 2),
        Ldc | LdcW => (0, 1),
        Ldc2W => (0, 2),
        Iaload | Faload | Aaload | Baload | Caload | Saload => (2, 1),
        Laload | Daload => (2, 2),
        Istore | Fstore | Astore | Istore0 | Istore1 | Istore2 | Istore3 | Fstore0 | Fstore1
        | Fstore2 | Fstore3 | Astore0 | Astore1 | Astore2 | Astore3 => (1, 0),
        Lstore | Dstore | Lstore0 | Lstore1 | Lstore2 | Lstore3 | Dstore0 | Dstore1 | Dstore2
        | Dstore3 => (2, 0),
        Iastore | Fastore | Aastore | Bastore | Castore | Sastore => (3, 0),
        Lastore | Dastore => (4, 0),
        Pop => (1, 0),
        Pop2 => (2, 0),
        Dup => (1, 2),
        DupX1 => (2, 3),
        DupX2 => (3, 4),
        Dup2 => (2, 4),
        Dup2X1 => (3, 5),
        Dup2X2 => (4, 6),
        Swap => (2, 2),
        Iadd | Fadd | Isub | Fsub | Imul | Fmul | Idiv | Fdiv | Irem | Frem | Ishl | Ishr
        | Iushr | Iand | Ior | Ixor => (2, 1),
        Ladd | Dadd | Lsub | Dsub | Lmul | Dmul | Ldiv | Ddiv | Lrem | Drem | Land | Lor
        | Lxor => (4, 2),
        Lshl | Lshr | Lushr => (3, 2),
        Ineg | Fneg => (1, 1),
        Lneg | Dneg => (2, 2),
        I2f | F2i | I2b | I2c | I2s => (1, 1),
        I2l | I2d | F2l | F2d => (1, 2),
        L2i | L2f | D2i | D2f => (2, 1),
        L2d | D2l => (2, 2),
        Lcmp | Dcmpl | Dcmpg => (4, 1),
        Fcmpl | Fcmpg => (2, 1),
        Ifeq | Ifne | Iflt | Ifge | Ifgt | Ifle | Ifnull | Ifnonnull => (1, 0),
        IfIcmpeq | IfIcmpne | IfIcmplt | IfIcmpge | IfIcmpgt | IfIcmple | IfAcmpeq
        | IfAcmpne => (2, 0),
        Tableswitch | Lookupswitch => (1, 0),
        Ireturn | Freturn | Areturn => (1, 0),
        Lreturn | Dreturn => (2, 0),
        Getstatic | Putstatic | Getfield | Putfield => {
            let index = constant_operand(insn)?;
            let member = pool.member_ref(index)?;
            let size = FieldType::parse(&member.descriptor)?.slots() as i32;
            match insn.opcode {
                Getstatic => (0, size),
                Putstatic => (size, 0),
                Getfield => (1, size),
                _ => (1 + size, 0),
            }
        }
        Invokevirtual | Invokespecial | Invokestatic | Invokeinterface => {
            let index = constant_operand(insn)?;
            let member = pool.member_ref(index)?;
            let desc = MethodDescriptor::parse(&member.descriptor)?;
            let receiver = if insn.opcode == Invokestatic { 0 } else { 1 };
            (desc.param_slots() as i32 + receiver, desc.return_slots() as i32)
        }
        Invokedynamic => {
            let index = constant_operand(insn)?;
            let site = pool.invoke_dynamic(index)?;
            let desc = MethodDescriptor::parse(&site.descriptor)?;
            (desc.param_slots() as i32, desc.return_slots() as i32)
        }
        Newarray | Anewarray | Arraylength | Checkcast | Instanceof => (1, 1),
        Athrow | Monitorenter | Monitorexit => (1, 0),
        Multianewarray => match insn.operand {
            Operand::MultiArray { dimensions, .. } => (dimensions as i32, 1),
            _ => (1, 1),
        },
    };
    Ok(effect)
}

fn constant_operand(insn: &Instruction) -> Result<u16, VerifyError> {
    insn.constant_index().ok_or(VerifyError::InvalidConstantRef {
        index: 0,
        offset: insn.offset,
        expected: "constant operand",
    })
}

/// Maximum operand stack depth of a method body, in slots
pub fn compute_max_stack(code: &Code, pool: &ConstantPool) -> Result<u16, VerifyError> {
    let instructions = decode_instructions(&code.code)?;
    compute_max_stack_of(&instructions, code, pool)
}

fn index_by_offset(instructions: &[Instruction], code_len: usize) -> Vec<Option<usize>> {
    let mut by_offset = vec![None; code_len + 1];
    for (i, insn) in instructions.iter().enumerate() {
        by_offset[insn.offset] = Some(i);
    }
    by_offset
}

fn compute_max_stack_of(
    instructions: &[Instruction],
    code: &Code,
    pool: &ConstantPool,
) -> Result<u16, VerifyError> {
    if instructions.is_empty() {
        return Ok(0);
    }

    let by_offset = index_by_offset(instructions, code.code.len());
    let lookup = |target: usize, from: usize| -> Result<usize, VerifyError> {
        by_offset
            .get(target)
            .copied()
            .flatten()
            .ok_or(VerifyError::InvalidJumpTarget {
                target,
                offset: from,
            })
    };

    // Depths are keyed by instruction and the entry depth of the enclosing
    // subroutine, so a `jsr` target may be called at different depths.
    let mut depths: FxHashMap<(usize, Option<i32>), i32> = FxHashMap::default();
    let mut worklist: Vec<(usize, i32, Option<i32>)> = vec![(0, 0, None)];
    for handler in &code.exception_table {
        let entry = lookup(handler.handler_pc as usize, handler.handler_pc as usize)?;
        worklist.push((entry, 1, None));
    }

    let mut max_depth = 0i32;
    while let Some((index, depth, subroutine)) = worklist.pop() {
        let insn = &instructions[index];
        if depth > i32::from(u16::MAX) {
            return Err(VerifyError::StackTooDeep(insn.offset));
        }
        match depths.get(&(index, subroutine)) {
            Some(&known) if known == depth => continue,
            Some(&known) => {
                return Err(VerifyError::InconsistentStack {
                    offset: insn.offset,
                    expected: known,
                    found: depth,
                })
            }
            None => {
                depths.insert((index, subroutine), depth);
            }
        }
        max_depth = max_depth.max(depth);

        let (pop, push) = stack_effect(insn, pool)?;
        if depth < pop {
            return Err(VerifyError::StackUnderflow(insn.offset));
        }
        let after = depth - pop + push;
        max_depth = max_depth.max(after);

        let calls = matches!(insn.opcode, Opcode::Jsr | Opcode::JsrW);
        for target in insn.branch_targets() {
            let context = if calls { Some(after) } else { subroutine };
            worklist.push((lookup(target, insn.offset)?, after, context));
        }

        if !insn.opcode.is_terminator() {
            if index + 1 >= instructions.len() {
                return Err(VerifyError::FallOffEnd(insn.offset));
            }
            // A subroutine returns with the caller's depth
            let fall_through = if calls { depth } else { after };
            worklist.push((index + 1, fall_through, subroutine));
        }
    }

    Ok(max_depth.min(u16::MAX as i32) as u16)
}

/// Local variable slots a method needs: receiver, parameters and every slot touched
pub fn compute_max_locals(method: &MemberInfo, code: &Code, pool: &ConstantPool) -> Result<u16, VerifyError> {
    let instructions = decode_instructions(&code.code)?;
    compute_max_locals_of(&instructions, method, pool)
}

fn compute_max_locals_of(
    instructions: &[Instruction],
    method: &MemberInfo,
    pool: &ConstantPool,
) -> Result<u16, VerifyError> {
    let desc = MethodDescriptor::parse(method.descriptor(pool)?)?;
    let receiver = if method.is_static() { 0 } else { 1 };
    let mut max = desc.param_slots() as u32 + receiver;

    for insn in instructions {
        if let Some(slot) = insn.local_index() {
            let width = if insn.opcode.is_wide_local() { 2 } else { 1 };
            max = max.max(slot as u32 + width);
        }
    }

    Ok(max.min(u16::MAX as u32) as u16)
}

/// `(max_stack, max_locals)` for a method body
pub fn compute_limits(method: &MemberInfo, code: &Code, pool: &ConstantPool) -> Result<(u16, u16), VerifyError> {
    let instructions = decode_instructions(&code.code)?;
    Ok((
        compute_max_stack_of(&instructions, code, pool)?,
        compute_max_locals_of(&instructions, method, pool)?,
    ))
}

fn expect_constant(
    pool: &ConstantPool,
    index: u16,
    offset: usize,
    expected: &'static str,
    accept: impl Fn(&Constant) -> bool,
) -> Result<(), VerifyError> {
    match pool.get(index) {
        Some(constant) if accept(constant) => Ok(()),
        _ => Err(VerifyError::InvalidConstantRef {
            index,
            offset,
            expected,
        }),
    }
}

fn is_loadable(constant: &Constant) -> bool {
    matches!(
        constant,
        Constant::Integer(_)
            | Constant::Float(_)
            | Constant::String { .. }
            | Constant::Class { .. }
            | Constant::MethodType { .. }
            | Constant::MethodHandle { .. }
            | Constant::Dynamic { .. }
    )
}

fn verify_constant_refs(
    instructions: &[Instruction],
    pool: &ConstantPool,
    bootstrap_count: usize,
) -> Result<(), VerifyError> {
    use Opcode::*;
    for insn in instructions {
        let Some(index) = insn.constant_index() else {
            continue;
        };
        let offset = insn.offset;
        match insn.opcode {
            Ldc | LdcW => expect_constant(pool, index, offset, "loadable constant", is_loadable)?,
            Ldc2W => expect_constant(pool, index, offset, "Long or Double", |c| {
                matches!(c, Constant::Long(_) | Constant::Double(_))
            })?,
            Getstatic | Putstatic | Getfield | Putfield => {
                expect_constant(pool, index, offset, "Fieldref", |c| {
                    matches!(c, Constant::Fieldref { .. })
                })?
            }
            Invokevirtual => expect_constant(pool, index, offset, "Methodref", |c| {
                matches!(c, Constant::Methodref { .. })
            })?,
            Invokespecial | Invokestatic => expect_constant(pool, index, offset, "method reference", |c| {
                matches!(c, Constant::Methodref { .. } | Constant::InterfaceMethodref { .. })
            })?,
            Invokeinterface => expect_constant(pool, index, offset, "InterfaceMethodref", |c| {
                matches!(c, Constant::InterfaceMethodref { .. })
            })?,
            Invokedynamic => expect_constant(pool, index, offset, "InvokeDynamic", |c| {
                matches!(c, Constant::InvokeDynamic { bootstrap_method_attr_index, .. }
                    if (*bootstrap_method_attr_index as usize) < bootstrap_count)
            })?,
            _ => expect_constant(pool, index, offset, "Class", |c| matches!(c, Constant::Class { .. }))?,
        }
        // Resolve the whole chain so dangling name/type indices are caught here
        if insn.opcode == Invokedynamic {
            pool.invoke_dynamic(index)?;
        } else if insn.opcode.is_invoke() || insn.opcode.is_field_access() {
            pool.member_ref(index)?;
        }
    }
    Ok(())
}

fn verify_code(method: &MemberInfo, code: &Code, pool: &ConstantPool, bootstrap_count: usize) -> Result<(), VerifyError> {
    if code.code.is_empty() || code.code.len() > u16::MAX as usize {
        return Err(VerifyError::InvalidCodeLength(code.code.len()));
    }

    let instructions = decode_instructions(&code.code)?;
    let by_offset = index_by_offset(&instructions, code.code.len());

    for insn in &instructions {
        for target in insn.branch_targets() {
            if by_offset.get(target).copied().flatten().is_none() {
                return Err(VerifyError::InvalidJumpTarget {
                    target,
                    offset: insn.offset,
                });
            }
        }
    }

    let code_len = code.code.len();
    for (i, handler) in code.exception_table.iter().enumerate() {
        let start = handler.start_pc as usize;
        let end = handler.end_pc as usize;
        let target = handler.handler_pc as usize;
        let on_boundary = |pc: usize| by_offset.get(pc).copied().flatten().is_some();
        let catch_ok = handler.catch_type == 0 || pool.class_name(handler.catch_type).is_ok();
        if start >= end
            || end > code_len
            || !on_boundary(start)
            || !(end == code_len || on_boundary(end))
            || !on_boundary(target)
            || !catch_ok
        {
            return Err(VerifyError::InvalidExceptionHandler(i));
        }
    }

    verify_constant_refs(&instructions, pool, bootstrap_count)?;

    let required_stack = compute_max_stack_of(&instructions, code, pool)?;
    if required_stack > code.max_stack {
        return Err(VerifyError::MaxStackExceeded {
            declared: code.max_stack,
            required: required_stack,
        });
    }
    let required_locals = compute_max_locals_of(&instructions, method, pool)?;
    if required_locals > code.max_locals {
        return Err(VerifyError::MaxLocalsExceeded {
            declared: code.max_locals,
            required: required_locals,
        });
    }

    Ok(())
}

/// Verify a class file's structure and every method body
pub fn verify_class(class: &ClassFile) -> Result<(), VerifyError> {
    let pool = &class.constant_pool;
    class.this_class_name()?;
    class.super_class_name()?;

    let mut seen = FxHashSet::default();
    for name in class.interface_names()? {
        if !seen.insert(name) {
            return Err(VerifyError::DuplicateInterface(name.to_string()));
        }
    }

    let mut keys = FxHashSet::default();
    for field in &class.fields {
        let name = field.name(pool)?;
        let descriptor = field.descriptor(pool)?;
        FieldType::parse(descriptor)?;
        if !keys.insert((name, descriptor)) {
            return Err(VerifyError::DuplicateMember(format!("{}{}", name, descriptor)));
        }
    }

    let bootstrap_methods = class.bootstrap_methods().unwrap_or(&[]);
    for (i, bootstrap) in bootstrap_methods.iter().enumerate() {
        let handle_ok = pool.method_handle(bootstrap.method_ref).is_ok();
        let args_ok = bootstrap
            .arguments
            .iter()
            .all(|&a| pool.get(a).is_some_and(|c| is_loadable(c) || matches!(c, Constant::Long(_) | Constant::Double(_))));
        if !handle_ok || !args_ok {
            return Err(VerifyError::InvalidBootstrapMethod(i));
        }
    }

    let mut keys = FxHashSet::default();
    for method in &class.methods {
        let name = method.name(pool)?;
        let descriptor = method.descriptor(pool)?;
        MethodDescriptor::parse(descriptor)?;
        let key = format!("{}{}", name, descriptor);
        if !keys.insert((name, descriptor)) {
            return Err(VerifyError::DuplicateMember(key));
        }

        let bodiless = method.access_flags & (access::ABSTRACT | access::NATIVE) != 0;
        match method.code() {
            Some(_) if bodiless => return Err(VerifyError::CodePresence(key)),
            None if !bodiless => return Err(VerifyError::CodePresence(key)),
            None => {}
            Some(code) => verify_code(method, code, pool, bootstrap_methods.len()).map_err(|error| {
                VerifyError::InMethod {
                    method: key,
                    error: Box::new(error),
                }
            })?,
        }
    }

    Ok(())
}
