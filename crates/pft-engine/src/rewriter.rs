//! Structural rewrite of a unit into its testing type
//!
//! The rewrite works on the parsed [`ClassFile`]: the unit gets a fresh name,
//! selected methods become public, capability interfaces are appended and
//! every symbolic reference owned by the old name is retargeted to the new
//! one. Retargeting interns new constants at the end of the pool and patches
//! the two-byte operand in place, so no instruction moves and branch offsets,
//! exception ranges and stack map deltas stay valid.

use crate::classfile::{
    access, attr, decode_instructions, external_name, Attribute, AttributeInfo, BootstrapMethod,
    ClassFile, ClassFileError, Constant, ConstantPool, Opcode,
};
use crate::identity;
use crate::options::GenOptions;
use crate::selection::{MemberKey, SelectionSet};
use rustc_hash::FxHashMap;
use tracing::debug;

/// A rewritten unit ready for materialization
#[derive(Debug, Clone)]
pub struct TransformedUnit {
    /// The rewritten class
    pub class: ClassFile,
    /// Internal name of the source unit
    pub source_name: String,
    /// Internal name of the generated unit
    pub new_name: String,
    /// Interfaces appended to the original list (internal names)
    pub added_interfaces: Vec<String>,
    /// Methods whose access was widened
    pub widened: Vec<MemberKey>,
    /// Number of instructions whose operand was retargeted
    pub retargeted: usize,
}

impl TransformedUnit {
    /// Generated name with `.` separators, as handed to loaders
    pub fn external_name(&self) -> String {
        external_name(&self.new_name)
    }
}

/// Rewrite `unit` under a freshly generated name
pub fn rewrite(
    unit: &ClassFile,
    selection: &SelectionSet,
    options: &GenOptions,
) -> Result<TransformedUnit, ClassFileError> {
    let new_name = identity::generate(unit.this_class_name()?, &options.class_prefix);
    rewrite_as(unit, selection, &new_name, options)
}

/// Rewrite `unit` under the internal name `new_name`
///
/// The source is left untouched; on error nothing is produced.
#[tracing::instrument(level = "debug", skip(unit, selection, options))]
pub fn rewrite_as(
    unit: &ClassFile,
    selection: &SelectionSet,
    new_name: &str,
    options: &GenOptions,
) -> Result<TransformedUnit, ClassFileError> {
    let source_name = unit.this_class_name()?.to_string();
    let mut class = unit.clone();

    class.this_class = class.constant_pool.add_class(new_name)?;
    let added_interfaces = add_interfaces(&mut class, selection)?;
    let widened = widen_members(&mut class, selection)?;

    let mut retargeter = Retargeter::new(
        &source_name,
        new_name,
        class.bootstrap_methods().map(<[_]>::to_vec).unwrap_or_default(),
    );
    for method in &mut class.methods {
        if let Some(code) = method.code_mut() {
            retargeter.retarget_body(&mut class.constant_pool, &mut code.code)?;
        }
    }
    let retargeted = retargeter.count;
    if retargeter.bootstraps_changed {
        *class.bootstrap_methods_mut()? = retargeter.bootstraps;
    }

    if options.strip_debug {
        strip_debug_attributes(&mut class);
    }

    debug!(
        source = %source_name,
        interfaces = added_interfaces.len(),
        widened = widened.len(),
        retargeted,
        "rewrote unit"
    );
    Ok(TransformedUnit {
        class,
        source_name,
        new_name: new_name.to_string(),
        added_interfaces,
        widened,
        retargeted,
    })
}

/// Originals first, then selection interfaces in discovery order
fn add_interfaces(class: &mut ClassFile, selection: &SelectionSet) -> Result<Vec<String>, ClassFileError> {
    let existing: Vec<String> = class
        .interface_names()?
        .into_iter()
        .map(str::to_string)
        .collect();
    let mut added = Vec::new();
    for interface in selection.interfaces() {
        if existing.contains(&interface) {
            continue;
        }
        let index = class.constant_pool.add_class(&interface)?;
        class.interfaces.push(index);
        added.push(interface);
    }
    Ok(added)
}

fn widen_members(class: &mut ClassFile, selection: &SelectionSet) -> Result<Vec<MemberKey>, ClassFileError> {
    let mut widened = Vec::new();
    for method in &mut class.methods {
        let name = method.name(&class.constant_pool)?;
        let descriptor = method.descriptor(&class.constant_pool)?;
        if selection.contains_member(name, descriptor) {
            method.access_flags = (method.access_flags & !access::RESTRICTED) | access::PUBLIC;
            widened.push(MemberKey::new(name, descriptor));
        }
    }
    Ok(widened)
}

/// Maps constant indices owned by the source name onto the new name
///
/// Every lookup is memoized per source index, so a reference used by many
/// instructions is interned once.
struct Retargeter<'a> {
    source: &'a str,
    target: &'a str,
    members: FxHashMap<u16, u16>,
    handles: FxHashMap<u16, u16>,
    call_sites: FxHashMap<u16, u16>,
    bootstraps: Vec<BootstrapMethod>,
    bootstraps_changed: bool,
    count: usize,
}

impl<'a> Retargeter<'a> {
    fn new(source: &'a str, target: &'a str, bootstraps: Vec<BootstrapMethod>) -> Self {
        Retargeter {
            source,
            target,
            members: FxHashMap::default(),
            handles: FxHashMap::default(),
            call_sites: FxHashMap::default(),
            bootstraps,
            bootstraps_changed: false,
            count: 0,
        }
    }

    fn retarget_body(&mut self, pool: &mut ConstantPool, code: &mut [u8]) -> Result<(), ClassFileError> {
        for insn in decode_instructions(code)? {
            let Some(index) = insn.constant_index() else {
                continue;
            };
            let mapped = match insn.opcode {
                Opcode::Getfield
                | Opcode::Putfield
                | Opcode::Getstatic
                | Opcode::Putstatic
                | Opcode::Invokevirtual
                | Opcode::Invokespecial
                | Opcode::Invokestatic
                | Opcode::Invokeinterface => self.member(pool, index)?,
                Opcode::Invokedynamic => self.call_site(pool, index)?,
                _ => continue,
            };
            if mapped != index {
                let at = insn.constant_operand_offset();
                code[at..at + 2].copy_from_slice(&mapped.to_be_bytes());
                self.count += 1;
            }
        }
        Ok(())
    }

    fn member(&mut self, pool: &mut ConstantPool, index: u16) -> Result<u16, ClassFileError> {
        if let Some(&mapped) = self.members.get(&index) {
            return Ok(mapped);
        }
        let mut member = pool.member_ref(index)?;
        let mapped = if member.owner == self.source {
            member.owner = self.target.to_string();
            pool.add_member_ref(&member)?
        } else {
            index
        };
        self.members.insert(index, mapped);
        Ok(mapped)
    }

    fn handle(&mut self, pool: &mut ConstantPool, index: u16) -> Result<u16, ClassFileError> {
        if let Some(&mapped) = self.handles.get(&index) {
            return Ok(mapped);
        }
        let mut handle = pool.method_handle(index)?;
        let mapped = if handle.member.owner == self.source {
            handle.member.owner = self.target.to_string();
            pool.add_method_handle(&handle)?
        } else {
            index
        };
        self.handles.insert(index, mapped);
        Ok(mapped)
    }

    /// Retarget the bootstrap handle and handle arguments of a call site
    ///
    /// A changed bootstrap entry is appended (or reused if an equal one
    /// exists) and a new `InvokeDynamic` constant is interned for it.
    fn call_site(&mut self, pool: &mut ConstantPool, index: u16) -> Result<u16, ClassFileError> {
        if let Some(&mapped) = self.call_sites.get(&index) {
            return Ok(mapped);
        }
        let site = pool.invoke_dynamic(index)?;
        let entry = self
            .bootstraps
            .get(site.bootstrap_index as usize)
            .cloned()
            .ok_or(ClassFileError::BadConstant {
                index,
                expected: "InvokeDynamic with a bootstrap method",
            })?;

        let method_ref = self.handle(pool, entry.method_ref)?;
        let mut arguments = Vec::with_capacity(entry.arguments.len());
        for &argument in &entry.arguments {
            let mapped = match pool.get(argument) {
                Some(Constant::MethodHandle { .. }) => self.handle(pool, argument)?,
                _ => argument,
            };
            arguments.push(mapped);
        }

        let mapped = if method_ref == entry.method_ref && arguments == entry.arguments {
            index
        } else {
            let retargeted = BootstrapMethod {
                method_ref,
                arguments,
            };
            let bootstrap_index = match self.bootstraps.iter().position(|b| *b == retargeted) {
                Some(position) => position,
                None => {
                    self.bootstraps.push(retargeted);
                    self.bootstraps_changed = true;
                    self.bootstraps.len() - 1
                }
            };
            let bootstrap_index =
                u16::try_from(bootstrap_index).map_err(|_| ClassFileError::BootstrapOverflow(bootstrap_index))?;
            pool.add_invoke_dynamic(bootstrap_index, &site.name, &site.descriptor)?
        };
        self.call_sites.insert(index, mapped);
        Ok(mapped)
    }
}

fn strip_debug_attributes(class: &mut ClassFile) {
    let pool = &class.constant_pool;
    let keep = |attribute: &Attribute| {
        pool.utf8(attribute.name_index)
            .map_or(true, |name| !attr::DEBUG.contains(&name))
    };

    class.attributes.retain(keep);
    for member in class.fields.iter_mut().chain(class.methods.iter_mut()) {
        member.attributes.retain(keep);
        for attribute in &mut member.attributes {
            if let AttributeInfo::Code(code) = &mut attribute.info {
                code.attributes.retain(keep);
            }
        }
    }
}
