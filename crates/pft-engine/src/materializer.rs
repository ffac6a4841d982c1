//! Serialization and loading of transformed units

use crate::classfile::{compute_limits, disassemble, stackmap, verify_class, ClassFile, VerifyError};
use crate::error::{EngineError, LoaderCause};
use crate::options::GenOptions;
use crate::rewriter::TransformedUnit;
use std::io::Write;
use std::sync::Arc;
use tracing::debug;

/// Installs finished class bytes into a loading context
pub trait Loader {
    /// Live handle to an installed type
    type Handle;
    /// Loader-specific failure
    type Error: Into<LoaderCause>;

    /// Install `bytes` under the binary name `name` (`a.b.C`)
    fn define(&self, name: &str, bytes: &[u8]) -> Result<Self::Handle, Self::Error>;
}

impl<T: Loader + ?Sized> Loader for &T {
    type Handle = T::Handle;
    type Error = T::Error;

    fn define(&self, name: &str, bytes: &[u8]) -> Result<Self::Handle, Self::Error> {
        (**self).define(name, bytes)
    }
}

impl<T: Loader + ?Sized> Loader for Arc<T> {
    type Handle = T::Handle;
    type Error = T::Error;

    fn define(&self, name: &str, bytes: &[u8]) -> Result<Self::Handle, Self::Error> {
        (**self).define(name, bytes)
    }
}

/// Recompute data derived from the edited bodies
///
/// `max_stack` and `max_locals` are computed from scratch for every body, and
/// stack map entries typed as the source class are retyped as the generated
/// class. Returns the number of retyped stack map entries.
pub fn recompute_derived(unit: &mut TransformedUnit) -> Result<usize, VerifyError> {
    let class = &mut unit.class;
    let source_index = class.constant_pool.find_class(&unit.source_name);
    let target_index = class.this_class;
    let mut retyped = 0;

    for method in &mut class.methods {
        let limits = match method.code() {
            Some(code) => compute_limits(method, code, &class.constant_pool).map_err(|error| {
                VerifyError::InMethod {
                    method: format!(
                        "{}{}",
                        method.name(&class.constant_pool).unwrap_or("<invalid>"),
                        method.descriptor(&class.constant_pool).unwrap_or("")
                    ),
                    error: Box::new(error),
                }
            })?,
            None => continue,
        };
        let Some(code) = method.code_mut() else {
            continue;
        };
        (code.max_stack, code.max_locals) = limits;
        if let (Some(source_index), Some(frames)) = (source_index, code.stack_map_mut()) {
            retyped += stackmap::retarget_object_types(frames, source_index, target_index);
        }
    }
    Ok(retyped)
}

/// Encode the unit after recomputing derived data and, if enabled, verifying it
pub fn serialize(unit: &mut TransformedUnit, options: &GenOptions) -> Result<Vec<u8>, EngineError> {
    let retyped = recompute_derived(unit)?;
    if options.verify_output {
        verify_class(&unit.class)?;
    }
    let bytes = unit.class.encode();
    debug!(bytes = bytes.len(), retyped, "serialized unit");
    Ok(bytes)
}

/// Serialize `unit` and install it through `loader`
///
/// When `sink` is given, a disassembly of the exact bytes handed to the
/// loader is written to it first.
#[tracing::instrument(level = "debug", skip_all, fields(name = %unit.new_name))]
pub fn materialize<L: Loader + ?Sized>(
    mut unit: TransformedUnit,
    loader: &L,
    sink: Option<&mut dyn Write>,
    options: &GenOptions,
) -> Result<L::Handle, EngineError> {
    let bytes = serialize(&mut unit, options)?;

    if let Some(sink) = sink {
        disassemble(&ClassFile::decode(&bytes)?, sink)?;
        sink.flush()?;
    }

    let name = unit.external_name();
    let handle = loader.define(&name, &bytes).map_err(|e| EngineError::LoaderInstall {
        name: name.clone(),
        cause: e.into(),
    })?;
    debug!(name = %name, "installed generated unit");
    Ok(handle)
}
