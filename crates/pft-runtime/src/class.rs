//! Installed classes
//!
//! A [`RuntimeClass`] is a decoded class file plus the state the interpreter
//! attaches to it: static field values and the lazy initialization flag.

use crate::error::{RuntimeError, RuntimeResult};
use crate::value::Value;
use parking_lot::Mutex;
use pft_engine::classfile::{external_name, package_of, ClassFile, Constant, MemberInfo};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const INIT_PENDING: u8 = 0;
const INIT_RUNNING: u8 = 1;
const INIT_DONE: u8 = 2;

/// Class installed in a [`ClassRegistry`](crate::ClassRegistry)
pub struct RuntimeClass {
    name: String,
    super_name: Option<String>,
    interfaces: Vec<String>,
    file: ClassFile,
    bytes: Arc<[u8]>,
    statics: Mutex<FxHashMap<String, Value>>,
    init_state: AtomicU8,
}

impl RuntimeClass {
    /// Wrap a decoded class and the bytes it was decoded from
    pub fn new(file: ClassFile, bytes: Arc<[u8]>) -> RuntimeResult<Self> {
        let name = file.this_class_name()?.to_string();
        let super_name = file.super_class_name()?.map(str::to_string);
        let interfaces = file
            .interface_names()?
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut statics = FxHashMap::default();
        for field in file.fields.iter().filter(|f| f.is_static()) {
            let field_name = field.name(&file.constant_pool)?;
            let descriptor = field.descriptor(&file.constant_pool)?;
            let value = constant_value(&file, field)?.unwrap_or_else(|| Value::default_for(descriptor));
            statics.insert(field_name.to_string(), value);
        }

        Ok(Self {
            name,
            super_name,
            interfaces,
            file,
            bytes,
            statics: Mutex::new(statics),
            init_state: AtomicU8::new(INIT_PENDING),
        })
    }

    /// Internal name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Binary name
    pub fn external_name(&self) -> String {
        external_name(&self.name)
    }

    /// Internal name of the package, empty for the default package
    pub fn package(&self) -> &str {
        package_of(&self.name)
    }

    /// Internal name of the superclass
    pub fn super_name(&self) -> Option<&str> {
        self.super_name.as_deref()
    }

    /// Internal names of the directly implemented interfaces
    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    /// Decoded class file
    pub fn file(&self) -> &ClassFile {
        &self.file
    }

    /// Bytes the class was defined from
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Class access flags
    pub fn access_flags(&self) -> u16 {
        self.file.access_flags
    }

    /// Check for `ACC_INTERFACE`
    pub fn is_interface(&self) -> bool {
        self.file.is_interface()
    }

    /// Method declared directly by this class
    pub fn method(&self, name: &str, descriptor: &str) -> Option<&MemberInfo> {
        self.file.find_method(name, descriptor)
    }

    /// Field declared directly by this class
    pub fn field(&self, name: &str, descriptor: &str) -> Option<&MemberInfo> {
        self.file.find_field(name, descriptor)
    }

    /// `(name, descriptor)` of every instance field declared by this class
    pub fn instance_fields(&self) -> RuntimeResult<Vec<(&str, &str)>> {
        let pool = &self.file.constant_pool;
        self.file
            .fields
            .iter()
            .filter(|f| !f.is_static())
            .map(|f| Ok((f.name(pool)?, f.descriptor(pool)?)))
            .collect()
    }

    /// Current value of a static field
    pub fn get_static(&self, name: &str) -> Option<Value> {
        self.statics.lock().get(name).cloned()
    }

    /// Store a static field
    pub fn set_static(&self, name: &str, value: Value) {
        self.statics.lock().insert(name.to_string(), value);
    }

    /// Claim the right to run `<clinit>`
    ///
    /// Returns false when initialization has finished or is already running,
    /// on this thread (recursive use during `<clinit>`) or another.
    pub(crate) fn begin_init(&self) -> bool {
        self.init_state
            .compare_exchange(INIT_PENDING, INIT_RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn finish_init(&self) {
        self.init_state.store(INIT_DONE, Ordering::Release);
    }

    /// Check whether `<clinit>` has completed
    pub fn is_initialized(&self) -> bool {
        self.init_state.load(Ordering::Acquire) == INIT_DONE
    }
}

impl fmt::Debug for RuntimeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeClass")
            .field("name", &self.name)
            .field("super_name", &self.super_name)
            .field("interfaces", &self.interfaces)
            .finish_non_exhaustive()
    }
}

/// Initial value from a `ConstantValue` attribute
fn constant_value(file: &ClassFile, field: &MemberInfo) -> RuntimeResult<Option<Value>> {
    let pool = &file.constant_pool;
    let Some(body) = field.raw_attribute(pool, "ConstantValue") else {
        return Ok(None);
    };
    let &[hi, lo] = body else {
        return Err(RuntimeError::TypeError("ConstantValue attribute must be 2 bytes".into()));
    };
    let index = u16::from_be_bytes([hi, lo]);
    let value = match pool.get(index) {
        Some(Constant::Integer(v)) => Value::Int(*v),
        Some(Constant::Long(v)) => Value::Long(*v),
        Some(Constant::Float(v)) => Value::Float(*v),
        Some(Constant::Double(v)) => Value::Double(*v),
        Some(Constant::String { .. }) => Value::from(pool.string(index)?),
        _ => {
            return Err(RuntimeError::TypeError(format!(
                "ConstantValue #{} is not a loadable constant",
                index
            )))
        }
    };
    Ok(Some(value))
}
