use std::{io, path::PathBuf};
use thiserror::Error;

use crate::services::RunError;

/// Errors that abort a build run. Nothing is retried or skipped.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot resolve service {service:?}: {reason}")]
    Resolution { service: String, reason: String },

    #[error("cannot read build file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{operation} {target} failed: {source}")]
    Build {
        operation: &'static str,
        target: String,
        #[source]
        source: RunError,
    },

    #[error("cannot inspect local image {image}: {source}")]
    Inspection {
        image: String,
        #[source]
        source: RunError,
    },
}
