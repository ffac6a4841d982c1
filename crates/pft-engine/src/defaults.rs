//! Default constants for generator configuration.

/// Descriptor of the annotation that tags a method for exposure.
pub const DEFAULT_TAG_ANNOTATION: &str = "Lpft/PublicForTests;";

/// Annotation element holding the target interface's binary name.
pub const DEFAULT_TAG_ELEMENT: &str = "value";

/// Simple-name prefix of generated classes, followed by a random token.
pub const DEFAULT_CLASS_PREFIX: &str = "GeneratedClass";
