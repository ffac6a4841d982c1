//! Default constants for runtime configuration.

/// Default maximum interpreter call depth before reporting a stack overflow.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 512;

/// Host root class every installed class ultimately extends.
pub const OBJECT_CLASS: &str = "java/lang/Object";

/// Host string class backing `String` values.
pub const STRING_CLASS: &str = "java/lang/String";

/// Interfaces implemented by host strings.
pub const STRING_INTERFACES: &[&str] = &[
    "java/io/Serializable",
    "java/lang/CharSequence",
    "java/lang/Comparable",
];

/// Bootstrap class whose `metafactory` links lambda call sites.
pub const LAMBDA_METAFACTORY: &str = "java/lang/invoke/LambdaMetafactory";
