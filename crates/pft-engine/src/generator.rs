//! Entry points tying selection, rewriting and materialization together

use crate::classfile::ClassFile;
use crate::error::EngineError;
use crate::materializer::{materialize, Loader};
use crate::options::GenOptions;
use crate::rewriter::{rewrite, TransformedUnit};
use crate::selection::{Extras, SelectionSet};
use crate::selector::{select, AnnotationTags, TagSource, TypeResolver};
use crate::source::UnitSource;
use std::io::Write;
use tracing::info;

/// Testing-type generator bound to a loader, a resolver and a tag source
///
/// Every call reads the source afresh and produces an independent unit with
/// its own identity; the generator itself holds no per-call state.
#[derive(Debug, Clone)]
pub struct Generator<L, R, T = AnnotationTags> {
    loader: L,
    resolver: R,
    tags: T,
    options: GenOptions,
}

impl<L: Loader, R: TypeResolver> Generator<L, R> {
    /// Generator with default options and annotation tags
    pub fn new(loader: L, resolver: R) -> Self {
        Generator {
            loader,
            resolver,
            tags: AnnotationTags::default(),
            options: GenOptions::default(),
        }
    }

    /// Replace the options; the annotation tag source follows them
    pub fn with_options(mut self, options: GenOptions) -> Self {
        self.tags = AnnotationTags::from_options(&options);
        self.options = options;
        self
    }
}

impl<L: Loader, R: TypeResolver, T: TagSource> Generator<L, R, T> {
    /// Use a different tag source
    pub fn with_tags<U: TagSource>(self, tags: U) -> Generator<L, R, U> {
        Generator {
            loader: self.loader,
            resolver: self.resolver,
            tags,
            options: self.options,
        }
    }

    /// Current options
    pub fn options(&self) -> &GenOptions {
        &self.options
    }

    /// The loader generated units are installed into
    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Select members of a parsed unit
    pub fn select(&self, unit: &ClassFile, extras: &Extras) -> Result<SelectionSet, EngineError> {
        Ok(select(unit, &self.tags, &self.resolver, extras)?)
    }

    /// Parse, select and rewrite without loading
    pub fn transform(&self, source: &[u8], extras: &Extras) -> Result<TransformedUnit, EngineError> {
        let unit = ClassFile::decode(source)?;
        let selection = self.select(&unit, extras)?;
        Ok(rewrite(&unit, &selection, &self.options)?)
    }

    /// Build and install the testing type of `source` (class file bytes)
    pub fn testing_type(&self, source: &[u8]) -> Result<L::Handle, EngineError> {
        self.testing_type_with(source, &Extras::new(), None)
    }

    /// Like [`testing_type`](Self::testing_type) with explicit extras and an
    /// optional disassembly sink
    pub fn testing_type_with(
        &self,
        source: &[u8],
        extras: &Extras,
        sink: Option<&mut dyn Write>,
    ) -> Result<L::Handle, EngineError> {
        let unit = self.transform(source, extras)?;
        info!(
            source = %unit.source_name,
            generated = %unit.new_name,
            "building testing type"
        );
        materialize(unit, &self.loader, sink, &self.options)
    }

    /// Read the unit `name` from `storage` and build its testing type
    pub fn testing_type_from(
        &self,
        storage: &dyn UnitSource,
        name: &str,
        extras: &Extras,
        sink: Option<&mut dyn Write>,
    ) -> Result<L::Handle, EngineError> {
        let bytes = storage.read_unit(name)?;
        self.testing_type_with(&bytes, extras, sink)
    }
}

/// Build a testing type in a context that is both loader and resolver
pub fn build_testing_type<C>(
    context: &C,
    source: &[u8],
    extras: &Extras,
    sink: Option<&mut dyn Write>,
) -> Result<C::Handle, EngineError>
where
    C: Loader + TypeResolver + ?Sized,
{
    Generator::new(context, context).testing_type_with(source, extras, sink)
}
