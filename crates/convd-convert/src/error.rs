// SPDX-License-Identifier: MIT OR Apache-2.0
use convd_cache::CacheError;
use std::io;
use std::path::PathBuf;

/// Argument-level errors from the recognized-option table.
///
/// These surface to users with explanatory text (CLI exit, HTTP 400); they
/// are never swallowed into quiet misses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OptionsError {
    /// The option key is not in the recognized table.
    #[error("unrecognized option: {0}")]
    UnknownOption(String),

    /// The option key is known but the value does not parse.
    #[error("invalid value '{value}' for {option}: expected {expected}")]
    InvalidValue {
        /// Offending option name.
        option: String,
        /// Offending raw value.
        value: String,
        /// What a valid value looks like.
        expected: String,
    },
}

/// Errors from the conversion façade and converters.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error(transparent)]
    Options(#[from] OptionsError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("zip {path}: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// The engine reported success but left no artifact behind.
    #[error("engine produced no artifact at {0}")]
    MissingArtifact(PathBuf),
}

impl ConvertError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }
}
