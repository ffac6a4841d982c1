//! Class registry
//!
//! The loading context generated types are installed into. Definition is
//! all-or-nothing: bytes are decoded and verified before the registry lock
//! is taken, and the duplicate check, linkage checks and insertion happen
//! under a single write lock so concurrent definitions of one name cannot
//! both succeed.

use crate::class::RuntimeClass;
use crate::defaults::{OBJECT_CLASS, STRING_CLASS, STRING_INTERFACES};
use crate::error::{RuntimeError, RuntimeResult};
use crate::handle::TypeHandle;
use crate::options::RuntimeOptions;
use parking_lot::RwLock;
use pft_engine::classfile::{internal_name, verify_class, ClassFile};
use pft_engine::{EngineError, Loader, TypeResolver, UnitSource};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tracing::debug;

/// Check whether a name belongs to the host platform rather than the registry
pub fn is_host_type(internal: &str) -> bool {
    internal.starts_with("java/") || internal.starts_with("javax/")
}

/// Registry of installed classes, shared by clones
#[derive(Clone, Default)]
pub struct ClassRegistry {
    classes: Arc<RwLock<FxHashMap<String, Arc<RuntimeClass>>>>,
    options: RuntimeOptions,
}

impl ClassRegistry {
    /// Create an empty registry with default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry
    pub fn with_options(options: RuntimeOptions) -> Self {
        Self {
            classes: Arc::default(),
            options,
        }
    }

    /// Registry options
    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    /// Install a class under the name it declares
    pub fn define_class(&self, bytes: &[u8]) -> RuntimeResult<TypeHandle> {
        let file = ClassFile::decode(bytes)?;
        let name = file.this_class_name()?.to_string();
        self.install(&name, file, bytes)
    }

    /// Install a class, checking it declares `name` (binary or internal form)
    pub fn define_named(&self, name: &str, bytes: &[u8]) -> RuntimeResult<TypeHandle> {
        let file = ClassFile::decode(bytes)?;
        let expected = internal_name(name);
        let found = file.this_class_name()?;
        if found != expected {
            return Err(RuntimeError::NameMismatch {
                expected,
                found: found.to_string(),
            });
        }
        self.install(&expected, file, bytes)
    }

    fn install(&self, name: &str, file: ClassFile, bytes: &[u8]) -> RuntimeResult<TypeHandle> {
        if self.options.verify_on_define {
            verify_class(&file)?;
        }
        let class = Arc::new(RuntimeClass::new(file, Arc::from(bytes))?);

        let mut classes = self.classes.write();
        if classes.contains_key(name) || is_host_type(name) {
            return Err(RuntimeError::DuplicateClass(name.to_string()));
        }
        link(&classes, &class)?;
        classes.insert(name.to_string(), Arc::clone(&class));
        drop(classes);

        debug!(class = %name, interfaces = class.interfaces().len(), "installed class");
        Ok(TypeHandle::new(class, self.clone()))
    }

    /// Installed class by binary or internal name
    pub fn get(&self, name: &str) -> Option<Arc<RuntimeClass>> {
        self.classes.read().get(&internal_name(name)).cloned()
    }

    /// Installed class, or `NoClassDefFound`
    pub fn class(&self, name: &str) -> RuntimeResult<Arc<RuntimeClass>> {
        self.get(name)
            .ok_or_else(|| RuntimeError::NoClassDefFound(internal_name(name)))
    }

    /// Handle to an installed class
    pub fn handle(&self, name: &str) -> RuntimeResult<TypeHandle> {
        Ok(TypeHandle::new(self.class(name)?, self.clone()))
    }

    /// Check whether a class is installed
    pub fn contains(&self, name: &str) -> bool {
        self.classes.read().contains_key(&internal_name(name))
    }

    /// Number of installed classes
    pub fn len(&self) -> usize {
        self.classes.read().len()
    }

    /// Check whether nothing is installed
    pub fn is_empty(&self) -> bool {
        self.classes.read().is_empty()
    }

    /// Internal names of every installed class, sorted
    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.classes.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Check whether a value of type `from` can be used as a `to`
    ///
    /// Both names are internal names. Host types other than strings are only
    /// assignable to themselves and `java/lang/Object`.
    pub fn is_assignable(&self, from: &str, to: &str) -> bool {
        if from == to || to == OBJECT_CLASS {
            return true;
        }
        if from == STRING_CLASS {
            return STRING_INTERFACES.contains(&to);
        }
        let classes = self.classes.read();
        let mut seen = FxHashSet::default();
        supertypes_contain(&classes, from, to, &mut seen)
    }
}

fn supertypes_contain(
    classes: &FxHashMap<String, Arc<RuntimeClass>>,
    from: &str,
    to: &str,
    seen: &mut FxHashSet<String>,
) -> bool {
    if from == to {
        return true;
    }
    if !seen.insert(from.to_string()) {
        return false;
    }
    let Some(class) = classes.get(from) else {
        return false;
    };
    class
        .super_name()
        .into_iter()
        .chain(class.interfaces().iter().map(String::as_str))
        .any(|parent| supertypes_contain(classes, parent, to, seen))
}

/// Resolve the superclass and interfaces of a class being installed
fn link(classes: &FxHashMap<String, Arc<RuntimeClass>>, class: &RuntimeClass) -> RuntimeResult<()> {
    if let Some(super_name) = class.super_name() {
        if !is_host_type(super_name) {
            let parent = classes
                .get(super_name)
                .ok_or_else(|| RuntimeError::NoClassDefFound(super_name.to_string()))?;
            if parent.is_interface() {
                return Err(RuntimeError::IncompatibleClassChange(format!(
                    "class {} has interface {} as super class",
                    class.name(),
                    super_name
                )));
            }
        } else if super_name != OBJECT_CLASS {
            return Err(RuntimeError::NoClassDefFound(super_name.to_string()));
        }
    }

    for interface in class.interfaces() {
        if is_host_type(interface) {
            continue;
        }
        let parent = classes
            .get(interface)
            .ok_or_else(|| RuntimeError::NoClassDefFound(interface.clone()))?;
        if !parent.is_interface() {
            return Err(RuntimeError::IncompatibleClassChange(format!(
                "class {} can not implement {}, because it is not an interface",
                class.name(),
                interface
            )));
        }
    }
    Ok(())
}

impl Loader for ClassRegistry {
    type Handle = TypeHandle;
    type Error = RuntimeError;

    fn define(&self, name: &str, bytes: &[u8]) -> Result<TypeHandle, RuntimeError> {
        self.define_named(name, bytes)
    }
}

impl TypeResolver for ClassRegistry {
    fn resolve(&self, binary_name: &str) -> Option<String> {
        let internal = internal_name(binary_name);
        self.classes.read().contains_key(&internal).then_some(internal)
    }
}

impl UnitSource for ClassRegistry {
    fn read_unit(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        self.get(name)
            .map(|class| class.bytes().to_vec())
            .ok_or_else(|| EngineError::SourceNotFound(internal_name(name)))
    }
}

impl std::fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassRegistry")
            .field("classes", &self.class_names())
            .field("options", &self.options)
            .finish()
    }
}
