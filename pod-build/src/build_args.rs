//! Line based scan for `ARG` declarations in a Dockerfile.
//!
//! This is not a Dockerfile parser. Each line is split on whitespace and only
//! lines starting with `ARG` are looked at. Continuations and comments are
//! not understood.

use log::debug;
use std::{fs, path::Path};

use crate::error::Error;

const ARG_KEYWORD: &str = "ARG";

#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    Arg(&'a str),
    MissingName,
    Other,
}

fn tokenize(line: &str) -> Line<'_> {
    let mut tokens = line.split_whitespace();

    match tokens.next() {
        Some(ARG_KEYWORD) => match tokens.next() {
            Some(declaration) => {
                let name = declaration.splitn(2, '=').next().unwrap_or(declaration);
                Line::Arg(name)
            }
            None => Line::MissingName,
        },
        _ => Line::Other,
    }
}

/// Names declared with `ARG`, in order of first declaration.
pub fn declared_args(contents: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();

    for (number, line) in contents.lines().enumerate() {
        match tokenize(line) {
            Line::Arg(name) => {
                if !names.iter().any(|known| known == name) {
                    names.push(name.to_owned());
                }
            }
            Line::MissingName => debug!("skipping ARG without a name on line {}", number + 1),
            Line::Other => (),
        }
    }

    names
}

/// Reads `dockerfile` as bytes. Invalid UTF-8, in a comment say, is
/// replaced rather than rejected since declared names are ASCII.
pub fn read_declared_args(dockerfile: &Path) -> Result<Vec<String>, Error> {
    let contents = fs::read(dockerfile).map_err(|source| Error::Io {
        path: dockerfile.to_owned(),
        source,
    })?;

    Ok(declared_args(&String::from_utf8_lossy(&contents)))
}
