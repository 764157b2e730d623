// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2025 William Bro-Jørgensen
//
// See LICENSE at the project root for full text.

use crate::error::MError;
use log::debug;
use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};

/// A named input file and its open/closed state.
#[derive(Debug, Default)]
pub struct Resource {
    path: Option<PathBuf>,
    reader: Option<BufReader<File>>,
}

impl Resource {
    /// A resource without a filename. It can never be opened.
    pub fn new() -> Self {
        Resource {
            path: None,
            reader: None,
        }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Resource {
            path: Some(path.into()),
            reader: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// Opens the file for reading. Opening an already open resource starts
    /// over with a fresh handle.
    ///
    /// # Errors
    ///
    /// Returns [`MError::NoFilename`] if no filename was given,
    /// [`MError::NotFound`] if the file does not exist and
    /// [`MError::IoError`] for any other failure.
    pub fn open(&mut self) -> Result<&mut BufReader<File>, MError> {
        let path = self.path.as_deref().ok_or(MError::NoFilename)?;
        let file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => MError::NotFound(path.to_path_buf()),
            _ => MError::IoError(e),
        })?;
        debug!("opened {}", path.display());

        Ok(self.reader.insert(BufReader::new(file)))
    }

    /// The open handle.
    ///
    /// # Errors
    ///
    /// Returns [`MError::NotOpen`] if [`Resource::open`] was not called or
    /// the resource was closed since.
    pub fn reader(&mut self) -> Result<&mut BufReader<File>, MError> {
        match self.reader.as_mut() {
            Some(reader) => Ok(reader),
            None => Err(MError::NotOpen(self.path.clone().unwrap_or_default())),
        }
    }

    /// Releases the handle. Does nothing if the resource is not open.
    pub fn close(&mut self) {
        if self.reader.take().is_some() {
            if let Some(path) = &self.path {
                debug!("closed {}", path.display());
            }
        }
    }
}
