//! Human-readable class file listing

use super::class::{access, AttributeInfo, ClassFile, MemberInfo};
use super::code::{decode_instructions, Instruction, Operand};
use super::constants::{Constant, ConstantPool};
use super::descriptor::external_name;
use std::io::{self, Write};

fn flags_to_string(flags: u16, method: bool) -> String {
    let mut words = Vec::new();
    if flags & access::PUBLIC != 0 {
        words.push("public");
    }
    if flags & access::PRIVATE != 0 {
        words.push("private");
    }
    if flags & access::PROTECTED != 0 {
        words.push("protected");
    }
    if flags & access::STATIC != 0 {
        words.push("static");
    }
    if flags & access::FINAL != 0 {
        words.push("final");
    }
    if method && flags & access::SYNCHRONIZED != 0 {
        words.push("synchronized");
    }
    if method && flags & access::NATIVE != 0 {
        words.push("native");
    }
    if flags & access::ABSTRACT != 0 {
        words.push("abstract");
    }
    if flags & access::SYNTHETIC != 0 {
        words.push("synthetic");
    }
    words.join(" ")
}

fn describe_constant(pool: &ConstantPool, index: u16) -> String {
    let describe = || -> Option<String> {
        Some(match pool.get(index)? {
            Constant::Utf8(s) => s.clone(),
            Constant::Integer(v) => v.to_string(),
            Constant::Float(v) => format!("{}f", v),
            Constant::Long(v) => format!("{}l", v),
            Constant::Double(v) => format!("{}d", v),
            Constant::Class { .. } => pool.class_name(index).ok()?.to_string(),
            Constant::String { .. } => format!("{:?}", pool.string(index).ok()?),
            Constant::Fieldref { .. } | Constant::Methodref { .. } | Constant::InterfaceMethodref { .. } => {
                let member = pool.member_ref(index).ok()?;
                format!("{}.{}:{}", member.owner, member.name, member.descriptor)
            }
            Constant::NameAndType { .. } => {
                let (name, desc) = pool.name_and_type(index).ok()?;
                format!("{}:{}", name, desc)
            }
            Constant::MethodHandle { .. } => {
                let handle = pool.method_handle(index).ok()?;
                format!(
                    "REF_{} {}.{}:{}",
                    handle.kind, handle.member.owner, handle.member.name, handle.member.descriptor
                )
            }
            Constant::MethodType { descriptor_index } => pool.utf8(*descriptor_index).ok()?.to_string(),
            Constant::InvokeDynamic { .. } => {
                let site = pool.invoke_dynamic(index).ok()?;
                format!("#{}:{}:{}", site.bootstrap_index, site.name, site.descriptor)
            }
            other => other.kind_name().to_string(),
        })
    };
    describe().unwrap_or_else(|| "<invalid>".to_string())
}

fn write_instruction(out: &mut dyn Write, pool: &ConstantPool, insn: &Instruction) -> io::Result<()> {
    write!(out, "{:>8}: {}", insn.offset, insn.opcode.name())?;
    match &insn.operand {
        Operand::None => {}
        Operand::Immediate(v) => write!(out, " {}", v)?,
        Operand::Local(slot) => write!(out, " {}", slot)?,
        Operand::Constant(index) => write!(out, " #{} // {}", index, describe_constant(pool, *index))?,
        Operand::Iinc { index, delta } => write!(out, " {}, {}", index, delta)?,
        Operand::Branch(target) => write!(out, " {}", target)?,
        Operand::Interface { index, count } => {
            write!(out, " #{}, {} // {}", index, count, describe_constant(pool, *index))?
        }
        Operand::MultiArray { index, dimensions } => {
            write!(out, " #{}, {} // {}", index, dimensions, describe_constant(pool, *index))?
        }
        Operand::Table { default, low, targets } => {
            write!(out, " {{ low {}, default {}, targets {:?} }}", low, default, targets)?
        }
        Operand::Lookup { default, pairs } => write!(out, " {{ default {}, pairs {:?} }}", default, pairs)?,
    }
    writeln!(out)
}

fn write_method(out: &mut dyn Write, class: &ClassFile, method: &MemberInfo) -> io::Result<()> {
    let pool = &class.constant_pool;
    let name = method.name(pool).unwrap_or("<invalid>");
    let descriptor = method.descriptor(pool).unwrap_or("<invalid>");
    writeln!(
        out,
        "  {} {}{}",
        flags_to_string(method.access_flags, true),
        name,
        descriptor
    )?;

    let Some(code) = method.code() else {
        return Ok(());
    };
    writeln!(out, "    Code: stack={}, locals={}", code.max_stack, code.max_locals)?;
    match decode_instructions(&code.code) {
        Ok(instructions) => {
            for insn in &instructions {
                write_instruction(out, pool, insn)?;
            }
        }
        Err(e) => writeln!(out, "    <undecodable: {}>", e)?,
    }
    for handler in &code.exception_table {
        let catch = if handler.catch_type == 0 {
            "any".to_string()
        } else {
            describe_constant(pool, handler.catch_type)
        };
        writeln!(
            out,
            "    catch {} [{}, {}) -> {}",
            catch, handler.start_pc, handler.end_pc, handler.handler_pc
        )?;
    }
    for attribute in &code.attributes {
        if let AttributeInfo::StackMapTable(frames) = &attribute.info {
            writeln!(out, "    StackMapTable: {} frames", frames.len())?;
        }
    }
    Ok(())
}

/// Write a javap-style listing of the class to `out`
pub fn disassemble(class: &ClassFile, out: &mut dyn Write) -> io::Result<()> {
    let pool = &class.constant_pool;
    let name = class.this_class_name().map(external_name).unwrap_or_default();
    let kind = if class.is_interface() { "interface" } else { "class" };
    write!(out, "{} {} {}", flags_to_string(class.access_flags, false), kind, name)?;
    if let Ok(Some(super_name)) = class.super_class_name() {
        write!(out, " extends {}", external_name(super_name))?;
    }
    if let Ok(interfaces) = class.interface_names() {
        if !interfaces.is_empty() {
            let names: Vec<_> = interfaces.into_iter().map(external_name).collect();
            write!(out, " implements {}", names.join(", "))?;
        }
    }
    writeln!(out)?;
    writeln!(out, "  version {}.{}", class.major_version, class.minor_version)?;

    for field in &class.fields {
        writeln!(
            out,
            "  {} {}:{}",
            flags_to_string(field.access_flags, false),
            field.name(pool).unwrap_or("<invalid>"),
            field.descriptor(pool).unwrap_or("<invalid>")
        )?;
    }
    for method in &class.methods {
        write_method(out, class, method)?;
    }

    if let Some(bootstrap_methods) = class.bootstrap_methods() {
        writeln!(out, "  BootstrapMethods:")?;
        for (i, bootstrap) in bootstrap_methods.iter().enumerate() {
            writeln!(out, "    {}: {}", i, describe_constant(pool, bootstrap.method_ref))?;
            for &argument in &bootstrap.arguments {
                writeln!(out, "        {}", describe_constant(pool, argument))?;
            }
        }
    }
    Ok(())
}
