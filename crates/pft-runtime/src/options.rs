//! Runtime configuration

use crate::defaults::DEFAULT_MAX_CALL_DEPTH;

/// Options for a [`ClassRegistry`](crate::ClassRegistry)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeOptions {
    /// Maximum nested interpreter calls (default: 512)
    pub max_call_depth: usize,
    /// Verify class structure when a class is defined (default: true)
    pub verify_on_define: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            verify_on_define: true,
        }
    }
}

impl RuntimeOptions {
    /// Accept classes without structural verification
    pub fn trusting() -> Self {
        Self {
            verify_on_define: false,
            ..Self::default()
        }
    }

    /// Use a different call depth limit
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }
}
