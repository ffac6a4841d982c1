//! Generator configuration

use crate::defaults::{DEFAULT_CLASS_PREFIX, DEFAULT_TAG_ANNOTATION, DEFAULT_TAG_ELEMENT};

/// Options controlling selection, rewriting and materialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenOptions {
    /// Descriptor of the tag annotation (default: `Lpft/PublicForTests;`)
    pub tag_annotation: String,
    /// Element of the tag annotation naming the interface (default: `value`)
    pub tag_element: String,
    /// Prefix of the generated simple name (default: `GeneratedClass`)
    pub class_prefix: String,
    /// Drop debug-only attributes from the output (default: true)
    pub strip_debug: bool,
    /// Verify the serialized output before loading (default: true)
    pub verify_output: bool,
}

impl Default for GenOptions {
    fn default() -> Self {
        GenOptions {
            tag_annotation: DEFAULT_TAG_ANNOTATION.to_string(),
            tag_element: DEFAULT_TAG_ELEMENT.to_string(),
            class_prefix: DEFAULT_CLASS_PREFIX.to_string(),
            strip_debug: true,
            verify_output: true,
        }
    }
}

impl GenOptions {
    /// Keep debug attributes such as `LineNumberTable` in the output
    pub fn keep_debug_info(mut self) -> Self {
        self.strip_debug = false;
        self
    }

    /// Use a different tag annotation descriptor
    pub fn with_tag_annotation(mut self, descriptor: impl Into<String>) -> Self {
        self.tag_annotation = descriptor.into();
        self
    }

    /// Use a different generated-name prefix
    pub fn with_class_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.class_prefix = prefix.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = GenOptions::default();
        assert_eq!(options.tag_annotation, "Lpft/PublicForTests;");
        assert_eq!(options.class_prefix, "GeneratedClass");
        assert!(options.strip_debug);
        assert!(options.verify_output);
    }

    #[test]
    fn test_builders() {
        let options = GenOptions::default()
            .keep_debug_info()
            .with_class_prefix("Fixture")
            .with_tag_annotation("Lx/Expose;");
        assert!(!options.strip_debug);
        assert_eq!(options.class_prefix, "Fixture");
        assert_eq!(options.tag_annotation, "Lx/Expose;");
    }
}
