//! Member selection
//!
//! Combines member tags with caller-supplied extras into a [`SelectionSet`].
//! A tag whose interface cannot be resolved drops its member with a warning
//! instead of failing the whole generation.

use crate::classfile::{
    attr, decode_annotations, external_name, ClassFile, ClassFileError, ElementValue, FieldType,
    MemberInfo,
};
use crate::options::GenOptions;
use crate::selection::{Extras, MemberKey, SelectionSet, UnresolvedTag};
use rustc_hash::FxHashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Discovers the tag on a method
///
/// A tag names one capability interface in binary form (`a.b.Iface`).
pub trait TagSource {
    /// The interface named by the method's tag, if it carries one
    fn tag(&self, unit: &ClassFile, method: &MemberInfo) -> Option<String>;
}

/// Resolves interface names against the live type registry
pub trait TypeResolver {
    /// Map a binary name (`a.b.C`) to an internal name (`a/b/C`), or `None`
    /// if the type is unknown
    fn resolve(&self, binary_name: &str) -> Option<String>;
}

impl<T: TagSource + ?Sized> TagSource for &T {
    fn tag(&self, unit: &ClassFile, method: &MemberInfo) -> Option<String> {
        (**self).tag(unit, method)
    }
}

impl<T: TypeResolver + ?Sized> TypeResolver for &T {
    fn resolve(&self, binary_name: &str) -> Option<String> {
        (**self).resolve(binary_name)
    }
}

impl<T: TypeResolver + ?Sized> TypeResolver for Arc<T> {
    fn resolve(&self, binary_name: &str) -> Option<String> {
        (**self).resolve(binary_name)
    }
}

/// Tag source reading a runtime-visible annotation
///
/// The annotation's element may be a string holding a binary name or a class
/// literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationTags {
    descriptor: String,
    element: String,
}

impl AnnotationTags {
    /// Read `descriptor` annotations, taking the interface from `element`
    pub fn new(descriptor: impl Into<String>, element: impl Into<String>) -> Self {
        AnnotationTags {
            descriptor: descriptor.into(),
            element: element.into(),
        }
    }

    /// Tag source configured by generator options
    pub fn from_options(options: &GenOptions) -> Self {
        Self::new(options.tag_annotation.clone(), options.tag_element.clone())
    }
}

impl Default for AnnotationTags {
    fn default() -> Self {
        Self::from_options(&GenOptions::default())
    }
}

impl TagSource for AnnotationTags {
    fn tag(&self, unit: &ClassFile, method: &MemberInfo) -> Option<String> {
        let pool = &unit.constant_pool;
        let body = method.raw_attribute(pool, attr::RUNTIME_VISIBLE_ANNOTATIONS)?;
        let annotations = match decode_annotations(body) {
            Ok(annotations) => annotations,
            Err(e) => {
                debug!(error = %e, "skipping unreadable annotations");
                return None;
            }
        };
        let annotation = annotations
            .iter()
            .find(|a| a.type_descriptor(pool) == Some(self.descriptor.as_str()))?;

        if let Some(value) = annotation.string_element(pool, &self.element) {
            return Some(value.to_string());
        }
        // Class literal form: `@Tag(Iface.class)`
        annotation.elements.iter().find_map(|(name_index, value)| {
            match value {
                ElementValue::Class(index) if pool.utf8(*name_index).ok() == Some(self.element.as_str()) => {
                    match FieldType::parse(pool.utf8(*index).ok()?).ok()? {
                        FieldType::Object(name) => Some(external_name(&name)),
                        _ => None,
                    }
                }
                _ => None,
            }
        })
    }
}

/// Resolver over a fixed set of known type names
#[derive(Debug, Clone, Default)]
pub struct KnownTypes {
    names: FxHashSet<String>,
}

impl KnownTypes {
    /// Empty resolver; every lookup fails
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a type by binary or internal name
    pub fn with(mut self, name: &str) -> Self {
        self.insert(name);
        self
    }

    /// Add a type by binary or internal name
    pub fn insert(&mut self, name: &str) {
        self.names.insert(crate::classfile::internal_name(name));
    }
}

impl TypeResolver for KnownTypes {
    fn resolve(&self, binary_name: &str) -> Option<String> {
        let internal = crate::classfile::internal_name(binary_name);
        self.names.contains(&internal).then_some(internal)
    }
}

/// Build the selection for `unit`
///
/// Tagged methods whose interface resolves are mapped to it. Unresolved tags
/// are logged, recorded on the result, and leave their method untouched.
/// Extras are merged without resolution.
#[tracing::instrument(level = "debug", skip_all, fields(unit = unit.this_class_name().unwrap_or("<invalid>")))]
pub fn select(
    unit: &ClassFile,
    tags: &dyn TagSource,
    resolver: &dyn TypeResolver,
    extras: &Extras,
) -> Result<SelectionSet, ClassFileError> {
    let pool = &unit.constant_pool;
    let mut selection = SelectionSet::new();

    for method in &unit.methods {
        let Some(tag) = tags.tag(unit, method) else {
            continue;
        };
        let key = MemberKey::new(method.name(pool)?, method.descriptor(pool)?);
        match resolver.resolve(&tag) {
            Some(interface) => {
                debug!(member = %key, interface = %interface, "selected tagged member");
                selection.add_pair(key, interface);
            }
            None => {
                let unresolved = UnresolvedTag {
                    member: key,
                    interface: tag,
                };
                warn!("{}", unresolved);
                warn!("    This method will not be made public; casts to the interface may fail");
                selection.record_unresolved(unresolved);
            }
        }
    }

    let warn_if_missing = |key: &MemberKey| {
        if unit.find_method(&key.name, &key.descriptor).is_none() {
            warn!(member = %key, "explicit member is not declared by the unit");
        }
    };
    for key in extras.members() {
        warn_if_missing(key);
        selection.add_member(key.clone());
    }
    for (key, interface) in extras.pairs() {
        warn_if_missing(key);
        selection.add_pair(key.clone(), interface.clone());
    }
    for interface in extras.interfaces() {
        selection.add_interface(interface.clone());
    }

    Ok(selection)
}
