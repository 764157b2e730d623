// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2025 William Bro-Jørgensen
//
// See LICENSE at the project root for full text.

use crate::error::MError;
use crate::formats::txt::TXTFormat;
use crate::formats::xml::XMLFormat;
use crate::magazine_data::MagazineData;
use std::io::{BufRead, Write};
use std::path::Path;

/// Supported text-based magazine file formats for reading and writing.
///
/// - `XML`: tag-delimited magazine document.
/// - `TXT`: tab-indented outline, as produced by `Magazine::to_string`.
/// - `Guess`: autodetect format from file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextFormat {
    /// XML file format.
    XML,
    /// Outline file format.
    TXT,
    /// Automatically detect format from file extension.
    Guess,
}

/// Concrete file format strategy for reading and writing magazine data.
#[derive(Debug)]
pub enum Format {
    /// Handler for the XML format.
    XML(XMLFormat),
    /// Handler for the outline format.
    TXT(TXTFormat),
}

impl Format {
    /// Creates a new [`Format`] by inferring the format from the provided file `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file extension is unrecognized.
    pub fn new(path: &Path) -> Result<Self, MError> {
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        match ext.to_lowercase().as_str() {
            "xml" => Ok(Format::XML(XMLFormat)),
            "txt" => Ok(Format::TXT(TXTFormat)),
            _ => Err(MError::UnsupportedFileFormat(ext.to_string())),
        }
    }

    /// Creates a new `Format` using the specified `TextFormat` and file `path`.
    ///
    /// `TextFormat::Guess` delegates to [`Format::new`].
    ///
    /// # Errors
    ///
    /// Returns an error if guessing cannot detect the format.
    pub fn new_from_format(fmt: TextFormat, path: &Path) -> Result<Self, MError> {
        match fmt {
            TextFormat::XML => Ok(Format::XML(XMLFormat)),
            TextFormat::TXT => Ok(Format::TXT(TXTFormat)),
            TextFormat::Guess => Self::new(path),
        }
    }
}

/// Common interface for reading and writing magazine file formats.
pub trait FileFormat {
    /// Reads the next [`MagazineData`] from `reader`.
    ///
    /// # Errors
    /// Returns an error if reading or parsing the document fails.
    fn read_next<R: BufRead>(&mut self, reader: &mut R) -> Result<MagazineData, MError>;

    /// Reads a single [`MagazineData`], returning `None` at end-of-file.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O or parsing error occurs.
    fn read<R: BufRead>(&mut self, reader: &mut R) -> Result<Option<MagazineData>, MError> {
        // TODO: replace with has_data_left when stabilized
        if reader.fill_buf()?.is_empty() {
            Ok(None)
        } else {
            self.read_next(reader).map(Some)
        }
    }

    /// Checks that `reader` holds a well-formed document without building it.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or cannot be read.
    fn validate<R: BufRead>(&self, reader: &mut R) -> Result<(), MError>;

    /// Writes the next [`MagazineData`] to `writer`.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_next<W: Write>(&mut self, writer: &mut W, data: &MagazineData)
        -> Result<(), MError>;

    /// Finalizes the file output, performing any necessary cleanup.
    /// This should be called when done writing to a file to ensure it's properly closed
    ///
    /// # Errors
    ///
    /// Returns an error if finalization fails.
    fn finalize<W: Write>(&self, writer: &mut W) -> Result<(), MError>;
}

impl FileFormat for Format {
    fn read_next<R: BufRead>(&mut self, reader: &mut R) -> Result<MagazineData, MError> {
        match self {
            Format::XML(format) => format.read_next(reader),
            Format::TXT(format) => format.read_next(reader),
        }
    }

    fn validate<R: BufRead>(&self, reader: &mut R) -> Result<(), MError> {
        match self {
            Format::XML(format) => format.validate(reader),
            Format::TXT(format) => format.validate(reader),
        }
    }

    fn write_next<W: Write>(
        &mut self,
        writer: &mut W,
        data: &MagazineData,
    ) -> Result<(), MError> {
        match self {
            Format::XML(format) => format.write_next(writer, data),
            Format::TXT(format) => format.write_next(writer, data),
        }
    }

    fn finalize<W: Write>(&self, writer: &mut W) -> Result<(), MError> {
        match self {
            Format::XML(format) => format.finalize(writer),
            Format::TXT(format) => format.finalize(writer),
        }
    }
}
