//! Default loading context for generated testing types
//!
//! This crate provides the context `pft-engine` installs testing types into:
//! - **Registry**: installed classes, linkage, assignability (`registry` module)
//! - **Interpreter**: runs installed code with JVM access rules (`interpreter`)
//! - **Handles**: `TypeHandle`, `Instance` and `Capability` for callers (`handle`)
//! - **Context**: the process-wide default registry and entry points (`context`)
//!
//! # Example
//!
//! ```rust,ignore
//! use pft_runtime::{default_context, testing_type, Value};
//!
//! default_context().define_class(&widget_bytes)?;
//! let handle = testing_type("com.example.Widget")?;
//! let widget = handle.new_instance()?.cast("com.example.WidgetTesting")?;
//! let size = widget.invoke("size", "()I", vec![])?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// ============================================================================
// Loading
// ============================================================================

/// Installed class model
pub mod class;

/// Default configuration constants
pub mod defaults;

/// Runtime error type
pub mod error;

/// Runtime options
pub mod options;

/// Class registry (the loader)
pub mod registry;

// ============================================================================
// Execution
// ============================================================================

mod host;

/// Bytecode interpreter
pub mod interpreter;

/// Interpreter values
pub mod value;

// ============================================================================
// Entry points
// ============================================================================

/// Default context and convenience functions
pub mod context;

/// Handles to installed types and instances
pub mod handle;

// ============================================================================
// Re-exports
// ============================================================================

pub use class::RuntimeClass;
pub use context::{default_context, generator, testing_type, testing_type_in, testing_type_with};
pub use error::{RuntimeError, RuntimeResult};
pub use handle::{Capability, Instance, TypeHandle};
pub use interpreter::Interpreter;
pub use options::RuntimeOptions;
pub use registry::ClassRegistry;
pub use value::Value;
