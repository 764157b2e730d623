// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2025 William Bro-Jørgensen
//
// See LICENSE at the project root for full text.

use crate::error::MError;
use crate::format::FileFormat;
use crate::formats::txt::TXTFormat;
use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

/// In-memory representation of one magazine document: its name and the
/// ordered content lines found in its body.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MagazineData {
    pub name: String,
    pub content: Vec<String>,
}

impl MagazineData {
    pub fn new() -> Self {
        MagazineData {
            name: String::new(),
            content: Vec::new(),
        }
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        MagazineData {
            name: name.into(),
            content: Vec::new(),
        }
    }

    /// Number of content lines
    pub fn size(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.content.is_empty()
    }

    pub fn add_line(&mut self, line: impl Into<String>) {
        self.content.push(line.into())
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.content.iter().map(String::as_str)
    }
}

/// Trims `text` and collapses every run of whitespace into a single space.
///
/// Parsed names and lines go through this, so they never contain a tab or a
/// newline and the outline rendering can always be read back.
pub(crate) fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Renders the outline form: the name, then one tab-indented line per
/// content entry.
impl fmt::Display for MagazineData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        for line in &self.content {
            writeln!(f, "\t{line}")?;
        }
        Ok(())
    }
}

impl FromStr for MagazineData {
    type Err = MError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut reader = s.as_bytes();
        TXTFormat.read_next(&mut reader)
    }
}

impl Index<usize> for MagazineData {
    type Output = String;

    fn index(&self, index: usize) -> &Self::Output {
        &self.content[index]
    }
}

impl IndexMut<usize> for MagazineData {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.content[index]
    }
}
