use anyhow::Result;
use std::{io, io::Write, path::Path};
use thiserror::Error;

use crate::models::Manifest;

pub trait ComposerFrontend {
    fn manifest(&mut self, compose_file_path: &Path) -> Result<Manifest>;
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("could not start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{}` exited with {}", .args.join(" "), exit_status(.code))]
    Exited { args: Vec<String>, code: Option<i32> },

    #[error("could not forward output: {0}")]
    Output(#[from] io::Error),
}

fn exit_status(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".into(),
    }
}

/// Executes the container engine. Implementations block until the
/// invocation has finished.
pub trait CommandRunner {
    /// Runs the engine with `args`, forwarding its output to `output`.
    fn run(&mut self, output: &mut dyn Write, args: &[String]) -> Result<(), RunError>;

    /// Runs the engine with `args` and returns what it wrote to stdout.
    fn output(&mut self, args: &[String]) -> Result<Vec<u8>, RunError>;
}
