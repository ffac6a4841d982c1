//! Engine error type

use crate::classfile::{ClassFileError, VerifyError};
use std::error::Error as StdError;
use std::io;
use thiserror::Error;

/// Boxed cause reported by a loader
pub type LoaderCause = Box<dyn StdError + Send + Sync + 'static>;

/// Hard failures of the generation pipeline
///
/// Soft failures (a tag naming an unknown interface, an explicit member the
/// unit does not declare) never surface here; they are logged and recorded
/// on the [`SelectionSet`](crate::SelectionSet).
#[derive(Debug, Error)]
pub enum EngineError {
    /// The source unit could not be parsed
    #[error("Cannot read source unit: {0}")]
    SourceRead(#[from] ClassFileError),

    /// The source unit's bytes could not be read from storage
    #[error("Cannot read source unit {name}: {source}")]
    SourceIo {
        /// Internal name of the unit
        name: String,
        /// Underlying I/O error
        source: io::Error,
    },

    /// No class path entry holds the unit
    #[error("Source unit {0} not found")]
    SourceNotFound(String),

    /// The rewritten unit failed structural verification
    #[error("Generated unit failed verification: {0}")]
    Verify(#[from] VerifyError),

    /// Writing to the diagnostic sink failed
    #[error("Diagnostic sink error: {0}")]
    Io(#[from] io::Error),

    /// The loader rejected the generated unit
    #[error("Loader rejected {name}: {cause}")]
    LoaderInstall {
        /// External name of the generated unit
        name: String,
        /// Loader's own error
        #[source]
        cause: LoaderCause,
    },
}

impl EngineError {
    /// Check whether the failure happened while reading the source unit
    pub fn is_source_failure(&self) -> bool {
        matches!(
            self,
            EngineError::SourceRead(_) | EngineError::SourceIo { .. } | EngineError::SourceNotFound(_)
        )
    }

    /// The loader's cause, if this is a loader failure
    pub fn loader_cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            EngineError::LoaderInstall { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::DecodeError;

    #[test]
    fn test_source_failures() {
        let err: EngineError = ClassFileError::InvalidMagic(0).into();
        assert!(err.is_source_failure());
        assert!(err.to_string().contains("Cannot read source unit"));

        let err: EngineError = VerifyError::FallOffEnd(3).into();
        assert!(!err.is_source_failure());
        assert!(err.loader_cause().is_none());
    }

    #[test]
    fn test_loader_cause_is_kept() {
        let cause: LoaderCause = Box::new(DecodeError::InvalidUtf8(4));
        let err = EngineError::LoaderInstall {
            name: "pkg.GeneratedClassX".to_string(),
            cause,
        };
        assert_eq!(
            err.loader_cause().map(|c| c.to_string()),
            Some("Invalid modified UTF-8 at offset 4".to_string())
        );
        assert!(err.source().is_some());
    }
}
