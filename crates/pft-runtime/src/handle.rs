//! Handles to installed types
//!
//! [`TypeHandle`] is what the loader returns for a generated type. Code
//! outside the registry reaches members only through public entry points:
//! `new_instance` runs a public constructor and [`Capability::invoke`]
//! dispatches an interface method the way `invokeinterface` would.

use crate::class::RuntimeClass;
use crate::error::{RuntimeError, RuntimeResult};
use crate::interpreter::Interpreter;
use crate::registry::ClassRegistry;
use crate::value::{Object, Value};
use pft_engine::classfile::{external_name, internal_name, MemberRef, RefKind};
use std::fmt;
use std::sync::Arc;

/// Live handle to an installed class
#[derive(Clone)]
pub struct TypeHandle {
    class: Arc<RuntimeClass>,
    registry: ClassRegistry,
}

impl TypeHandle {
    pub(crate) fn new(class: Arc<RuntimeClass>, registry: ClassRegistry) -> Self {
        Self { class, registry }
    }

    /// Binary name (`a.b.C`)
    pub fn name(&self) -> String {
        self.class.external_name()
    }

    /// Internal name (`a/b/C`)
    pub fn internal_name(&self) -> &str {
        self.class.name()
    }

    /// Binary name of the superclass
    pub fn super_name(&self) -> Option<String> {
        self.class.super_name().map(external_name)
    }

    /// Binary names of the directly implemented interfaces, in declaration order
    pub fn interfaces(&self) -> Vec<String> {
        self.class.interfaces().iter().map(|i| external_name(i)).collect()
    }

    /// Check whether instances can be used as `ty` (binary or internal name)
    pub fn is_assignable_to(&self, ty: &str) -> bool {
        self.registry.is_assignable(self.class.name(), &internal_name(ty))
    }

    /// Access flags of a declared method
    pub fn method_flags(&self, name: &str, descriptor: &str) -> Option<u16> {
        self.class.method(name, descriptor).map(|m| m.access_flags)
    }

    /// Installed class
    pub fn class(&self) -> &Arc<RuntimeClass> {
        &self.class
    }

    /// Bytes the class was defined from
    pub fn bytes(&self) -> &[u8] {
        self.class.bytes()
    }

    /// Registry the class is installed in
    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    /// Instantiate through the public no-argument constructor
    pub fn new_instance(&self) -> RuntimeResult<Instance> {
        self.new_instance_with("()V", Vec::new())
    }

    /// Instantiate through the public constructor with `descriptor`
    pub fn new_instance_with(&self, descriptor: &str, args: Vec<Value>) -> RuntimeResult<Instance> {
        let mut interpreter = Interpreter::new(&self.registry);
        match interpreter.new_instance(None, &self.class, descriptor, args)? {
            Value::Object(object) => Ok(Instance {
                object,
                registry: self.registry.clone(),
            }),
            other => Err(RuntimeError::TypeError(format!("constructor produced {:?}", other))),
        }
    }

    /// Call a public static method
    pub fn invoke_static(&self, name: &str, descriptor: &str, args: Vec<Value>) -> RuntimeResult<Option<Value>> {
        let member = MemberRef {
            kind: RefKind::Method,
            owner: self.class.name().to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        };
        Interpreter::new(&self.registry).invoke_static(None, &member, args)
    }

    /// Current value of a static field, initializing the class first
    pub fn get_static(&self, name: &str) -> RuntimeResult<Option<Value>> {
        Interpreter::new(&self.registry).initialize(&self.class)?;
        Ok(self.class.get_static(name))
    }
}

impl PartialEq for TypeHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.class, &other.class)
    }
}

impl fmt::Debug for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeHandle")
            .field("name", &self.class.name())
            .field("interfaces", &self.class.interfaces())
            .finish()
    }
}

/// An instance of an installed class
#[derive(Clone)]
pub struct Instance {
    object: Arc<Object>,
    registry: ClassRegistry,
}

impl Instance {
    /// Binary name of the runtime class
    pub fn class_name(&self) -> String {
        self.object.class().external_name()
    }

    /// The instance as an interpreter value
    pub fn value(&self) -> Value {
        Value::Object(Arc::clone(&self.object))
    }

    /// Check whether the instance can be used as `ty`
    pub fn is_instance_of(&self, ty: &str) -> bool {
        self.registry.is_assignable(self.object.class().name(), &internal_name(ty))
    }

    /// Current value of an instance field
    pub fn get_field(&self, name: &str) -> Option<Value> {
        self.object.get_field(name)
    }

    /// View the instance through an installed interface
    pub fn cast(&self, interface: &str) -> RuntimeResult<Capability> {
        let target = self.registry.class(interface)?;
        if !target.is_interface() {
            return Err(RuntimeError::IncompatibleClassChange(format!(
                "{} is not an interface",
                target.external_name()
            )));
        }
        if !self.registry.is_assignable(self.object.class().name(), target.name()) {
            return Err(RuntimeError::ClassCast {
                from: self.class_name(),
                to: target.external_name(),
            });
        }
        Ok(Capability {
            instance: self.clone(),
            interface: target,
        })
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.object.class().name())
            .finish()
    }
}

/// An instance viewed through one of its interfaces
#[derive(Debug, Clone)]
pub struct Capability {
    instance: Instance,
    interface: Arc<RuntimeClass>,
}

impl Capability {
    /// Binary name of the interface
    pub fn interface_name(&self) -> String {
        self.interface.external_name()
    }

    /// The underlying instance
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Invoke an interface method on the instance
    ///
    /// The method must be declared by the interface (or a superinterface).
    /// Selection finds the implementation in the instance's class, which must
    /// be public.
    pub fn invoke(&self, name: &str, descriptor: &str, args: Vec<Value>) -> RuntimeResult<Option<Value>> {
        let member = MemberRef {
            kind: RefKind::InterfaceMethod,
            owner: self.interface.name().to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        };
        let mut interpreter = Interpreter::new(&self.instance.registry);
        if interpreter.resolve_method(&member.owner, name, descriptor)?.is_none() {
            return Err(RuntimeError::NoSuchMethod(format!(
                "{}.{}{}",
                self.interface_name(),
                name,
                descriptor
            )));
        }
        interpreter.invoke_virtual(None, &member, self.instance.value(), args)
    }
}
