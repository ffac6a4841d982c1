//! Testing-type generator engine
//!
//! This crate rewrites a compiled JVM class so that members hidden from
//! external callers become reachable through capability interfaces:
//! - **Class files**: codec, instruction set, verifier, builder (`classfile` module)
//! - **Selector**: which members to expose, via tags or explicit extras (`selector`)
//! - **Rewriter**: fresh identity, access widening, interface addition and
//!   self-reference retargeting (`rewriter`)
//! - **Materializer**: recompute derived data, serialize, hand to a loader (`materializer`)
//!
//! # Example
//!
//! ```rust,ignore
//! use pft_engine::{build_testing_type, Extras};
//!
//! let bytes = class_path.read_unit("com.example.Widget")?;
//! let handle = build_testing_type(&context, &bytes, &Extras::new(), None)?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// ============================================================================
// Format
// ============================================================================

/// Class file format: codec, instructions, verifier and builder
pub mod classfile;

// ============================================================================
// Pipeline
// ============================================================================

/// Default configuration constants
pub mod defaults;

/// Engine error type
pub mod error;

/// Entry points
pub mod generator;

/// Fresh identities for generated units
pub mod identity;

/// Serialization and loading
pub mod materializer;

/// Generator options
pub mod options;

/// Structural rewrite
pub mod rewriter;

/// Selection data model
pub mod selection;

/// Member selection
pub mod selector;

/// Reading units from storage
pub mod source;

// ============================================================================
// Re-exports
// ============================================================================

pub use classfile::{ClassBuilder, ClassFile, ClassFileError, VerifyError};
pub use error::{EngineError, LoaderCause};
pub use generator::{build_testing_type, Generator};
pub use materializer::{materialize, recompute_derived, serialize, Loader};
pub use options::GenOptions;
pub use rewriter::{rewrite, rewrite_as, TransformedUnit};
pub use selection::{Extras, MemberKey, SelectionSet, UnresolvedTag};
pub use selector::{select, AnnotationTags, KnownTypes, TagSource, TypeResolver};
pub use source::{ClassPath, UnitSource};
