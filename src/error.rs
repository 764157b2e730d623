// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2025 William Bro-Jørgensen
//
// See LICENSE at the project root for full text.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MError {
    #[error("no filename was given")]
    NoFilename,
    #[error("no such file: `{0}`")]
    NotFound(PathBuf),
    #[error("`{0}` is not open")]
    NotOpen(PathBuf),
    #[error("invalid {format} document at line {line}: {reason}")]
    InvalidFormat {
        format: String,
        line: usize,
        reason: String,
    },
    #[error("could not write `{path}`: {source}")]
    IoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unsupported file format: `{0}`")]
    UnsupportedFileFormat(String),
    #[error("{0}")]
    IoError(#[from] std::io::Error),
}

impl MError {
    pub(crate) fn invalid(format: &str, line: usize, reason: impl Into<String>) -> Self {
        MError::InvalidFormat {
            format: format.to_string(),
            line,
            reason: reason.into(),
        }
    }
}
