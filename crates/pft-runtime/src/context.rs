//! Default loading context and convenience entry points
//!
//! The runtime's entry points fix the loader to a [`ClassRegistry`]. The
//! source unit is read from the same registry, which is the host's storage of
//! installed units, so a class must be installed before its testing type can
//! be built.

use crate::handle::TypeHandle;
use crate::registry::ClassRegistry;
use once_cell::sync::Lazy;
use pft_engine::{EngineError, Extras, Generator};
use std::io::Write;

static DEFAULT_CONTEXT: Lazy<ClassRegistry> = Lazy::new(ClassRegistry::new);

/// Process-wide registry used by [`testing_type`] and [`testing_type_with`]
pub fn default_context() -> &'static ClassRegistry {
    &DEFAULT_CONTEXT
}

/// Generator installing into and resolving against `context`
pub fn generator(context: &ClassRegistry) -> Generator<&ClassRegistry, &ClassRegistry> {
    Generator::new(context, context)
}

/// Build the testing type of the installed unit `source` in the default context
pub fn testing_type(source: &str) -> Result<TypeHandle, EngineError> {
    testing_type_with(source, &Extras::new(), None)
}

/// Like [`testing_type`] with explicit extras and an optional disassembly sink
pub fn testing_type_with(
    source: &str,
    extras: &Extras,
    sink: Option<&mut dyn Write>,
) -> Result<TypeHandle, EngineError> {
    testing_type_in(default_context(), source, extras, sink)
}

/// Build the testing type of the unit `source` installed in `context`
pub fn testing_type_in(
    context: &ClassRegistry,
    source: &str,
    extras: &Extras,
    sink: Option<&mut dyn Write>,
) -> Result<TypeHandle, EngineError> {
    generator(context).testing_type_from(context, source, extras, sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_context_is_shared() {
        assert!(std::ptr::eq(default_context(), default_context()));
    }

    #[test]
    fn test_missing_source() {
        let context = ClassRegistry::new();
        let err = testing_type_in(&context, "demo.Absent", &Extras::new(), None).unwrap_err();
        assert!(matches!(err, EngineError::SourceNotFound(ref name) if name == "demo/Absent"));
    }
}
