//! Interpreter values
//!
//! Primitive values are stored inline; references are `Arc`-shared. Long and
//! double values occupy a single operand stack entry but two local slots,
//! matching the slot numbering of the class files being run.

use crate::class::RuntimeClass;
use crate::defaults::{OBJECT_CLASS, STRING_CLASS};
use crate::error::{RuntimeError, RuntimeResult};
use parking_lot::Mutex;
use pft_engine::classfile::HandleRef;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// A value on the operand stack, in a local, or in a field
#[derive(Clone)]
pub enum Value {
    /// `int`, `short`, `char`, `byte` and `boolean`
    Int(i32),
    /// `long`
    Long(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// The null reference
    Null,
    /// Host string
    Str(Arc<str>),
    /// Instance of an installed class
    Object(Arc<Object>),
    /// Lambda created by a linked call site
    Lambda(Arc<Lambda>),
}

impl Value {
    /// Default value of a field with the given descriptor
    pub fn default_for(descriptor: &str) -> Value {
        match descriptor.as_bytes().first() {
            Some(b'I' | b'S' | b'C' | b'B' | b'Z') => Value::Int(0),
            Some(b'J') => Value::Long(0),
            Some(b'F') => Value::Float(0.0),
            Some(b'D') => Value::Double(0.0),
            _ => Value::Null,
        }
    }

    /// True for long and double values
    pub fn is_category2(&self) -> bool {
        matches!(self, Value::Long(_) | Value::Double(_))
    }

    /// Check for the null reference
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer payload
    pub fn as_int(&self) -> RuntimeResult<i32> {
        match self {
            Value::Int(v) => Ok(*v),
            other => Err(RuntimeError::TypeError(format!("expected int, found {}", other.kind()))),
        }
    }

    /// Long payload
    pub fn as_long(&self) -> RuntimeResult<i64> {
        match self {
            Value::Long(v) => Ok(*v),
            other => Err(RuntimeError::TypeError(format!("expected long, found {}", other.kind()))),
        }
    }

    /// Float payload
    pub fn as_float(&self) -> RuntimeResult<f32> {
        match self {
            Value::Float(v) => Ok(*v),
            other => Err(RuntimeError::TypeError(format!("expected float, found {}", other.kind()))),
        }
    }

    /// Double payload
    pub fn as_double(&self) -> RuntimeResult<f64> {
        match self {
            Value::Double(v) => Ok(*v),
            other => Err(RuntimeError::TypeError(format!("expected double, found {}", other.kind()))),
        }
    }

    /// Interpret an int as a boolean
    pub fn as_bool(&self) -> RuntimeResult<bool> {
        Ok(self.as_int()? != 0)
    }

    /// String contents, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Instance payload, if this is an installed-class instance
    pub fn as_object(&self) -> Option<&Arc<Object>> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Internal name of the runtime class of a reference
    pub fn class_name(&self) -> Option<&str> {
        match self {
            Value::Str(_) => Some(STRING_CLASS),
            Value::Object(object) => Some(object.class.name()),
            Value::Lambda(lambda) => Some(&lambda.interface),
            _ => None,
        }
    }

    /// Reference identity (`if_acmpeq`)
    pub fn same_reference(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Str(a), Value::Str(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Lambda(a), Value::Lambda(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Null => "null",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
            Value::Lambda(_) => "lambda",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => self.same_reference(other),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "Int({})", v),
            Value::Long(v) => write!(f, "Long({})", v),
            Value::Float(v) => write!(f, "Float({})", v),
            Value::Double(v) => write!(f, "Double({})", v),
            Value::Null => write!(f, "Null"),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Object(object) => write!(f, "Object({})", object.class.name()),
            Value::Lambda(lambda) => write!(f, "Lambda({}.{})", lambda.interface, lambda.method),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Int(v as i32)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

/// Instance of an installed class
pub struct Object {
    class: Arc<RuntimeClass>,
    fields: Mutex<FxHashMap<String, Value>>,
}

impl Object {
    /// New instance with every instance field of `class` and its supers at its default
    pub fn new(class: Arc<RuntimeClass>, fields: FxHashMap<String, Value>) -> Self {
        Object {
            class,
            fields: Mutex::new(fields),
        }
    }

    /// Runtime class
    pub fn class(&self) -> &Arc<RuntimeClass> {
        &self.class
    }

    /// Read a field by name
    pub fn get_field(&self, name: &str) -> Option<Value> {
        self.fields.lock().get(name).cloned()
    }

    /// Write a field by name
    pub fn set_field(&self, name: &str, value: Value) {
        self.fields.lock().insert(name.to_string(), value);
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("class", &self.class.name())
            .finish_non_exhaustive()
    }
}

/// Functional-interface instance produced by `LambdaMetafactory`
pub struct Lambda {
    /// Internal name of the implemented interface
    pub interface: String,
    /// Name of the interface method
    pub method: String,
    /// Erased descriptor of the interface method
    pub erased: String,
    /// Method the lambda forwards to
    pub implementation: HandleRef,
    /// Values captured at the call site, prepended to every call
    pub captured: Vec<Value>,
    /// Class that linked the call site
    pub caller: Arc<RuntimeClass>,
}

impl Lambda {
    /// True for the interface type and `java/lang/Object`
    pub fn implements(&self, ty: &str) -> bool {
        ty == self.interface || ty == OBJECT_CLASS
    }
}

impl fmt::Debug for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lambda")
            .field("interface", &self.interface)
            .field("method", &self.method)
            .field("implementation", &self.implementation.member.name)
            .finish_non_exhaustive()
    }
}
