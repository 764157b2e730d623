// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2025 William Bro-Jørgensen
//
// See LICENSE at the project root for full text.

use crate::error::MError;
use crate::format::FileFormat;
use crate::format::Format;
use crate::format::TextFormat;
use crate::formats::xml::XMLFormat;
use crate::magazine_data::MagazineData;
use crate::resource::Resource;
use log::{debug, error, info};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

/// A magazine document on disk and its in-memory contents.
///
/// ```no_run
/// use magio::magazine::Magazine;
///
/// let mut magazine = Magazine::new("in.xml")?;
/// magazine.open()?;
/// magazine.load()?;
/// magazine.write_data("out.txt")?;
/// magazine.close();
/// # Ok::<(), magio::error::MError>(())
/// ```
#[derive(Debug)]
pub struct Magazine {
    pub magazine_data: MagazineData,

    resource: Resource,
    strategy: Format,
}

impl Default for Magazine {
    /// A magazine without a filename, reading XML if it is ever given one.
    fn default() -> Self {
        Magazine {
            magazine_data: MagazineData::new(),
            resource: Resource::new(),
            strategy: Format::XML(XMLFormat),
        }
    }
}

impl Magazine {
    /// Constructs a `Magazine` that will guess the format.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, MError> {
        Self::with_format(path, TextFormat::Guess)
    }

    /// Constructs a `Magazine` with an explicitly provided format.
    pub fn with_format(path: impl Into<PathBuf>, fmt: TextFormat) -> Result<Self, MError> {
        let path = path.into();
        let strategy = Format::new_from_format(fmt, &path)?;

        Ok(Magazine {
            magazine_data: MagazineData::new(),
            resource: Resource::with_path(path),
            strategy,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.resource.path()
    }

    pub fn is_open(&self) -> bool {
        self.resource.is_open()
    }

    pub fn data(&self) -> &MagazineData {
        &self.magazine_data
    }

    pub fn data_mut(&mut self) -> &mut MagazineData {
        &mut self.magazine_data
    }

    /// Opens the input file and checks that it holds a well-formed document.
    /// The file is released again if the check fails.
    pub fn open(&mut self) -> Result<(), MError> {
        let reader = self.resource.open()?;
        if let Err(e) = self.strategy.validate(reader) {
            self.resource.close();
            return Err(e);
        }
        reader.rewind()?;
        Ok(())
    }

    /// Parses the open file into [`Magazine::magazine_data`]. Every call
    /// parses from the start of the file again and replaces the previous
    /// contents.
    pub fn load(&mut self) -> Result<&MagazineData, MError> {
        self.parse_data()?;
        info!(
            "loaded magazine '{}' with {} lines",
            self.magazine_data.name,
            self.magazine_data.size()
        );
        Ok(&self.magazine_data)
    }

    /// Releases the input file. Safe to call at any time.
    pub fn close(&mut self) {
        self.resource.close()
    }

    fn parse_data(&mut self) -> Result<(), MError> {
        let reader = self.resource.reader()?;
        reader.rewind()?;
        debug!("parsing from the start of the file");

        let data = self
            .strategy
            .read(reader)?
            .ok_or_else(|| MError::invalid(self.format_name(), 1, "empty document"))?;
        self.magazine_data = data;
        Ok(())
    }

    fn format_name(&self) -> &'static str {
        match self.strategy {
            Format::XML(_) => "XML",
            Format::TXT(_) => "TXT",
        }
    }

    fn format_data(&self) -> String {
        self.magazine_data.to_string()
    }

    /// Writes the outline of the magazine (exactly [`Magazine::to_string`])
    /// to `output`, replacing any previous content.
    ///
    /// Nothing is created at `output` unless the whole content could be
    /// written.
    ///
    /// # Errors
    ///
    /// Returns [`MError::IoFailure`] if the output cannot be created, written
    /// or moved into place.
    pub fn write_data(&self, output: impl AsRef<Path>) -> Result<(), MError> {
        let output = output.as_ref();
        let outline = self.format_data();
        write_atomically(output, |writer| {
            writer.write_all(outline.as_bytes())?;
            Ok(())
        })
        .inspect_err(|e| error!("could not write magazine data: {e}"))?;

        info!("wrote {} bytes to {}", outline.len(), output.display());
        Ok(())
    }

    /// Writes the magazine to `output` in the given format. `TextFormat::Guess`
    /// picks the format from the extension of `output`.
    ///
    /// # Errors
    ///
    /// Returns [`MError::UnsupportedFileFormat`] if the format cannot be
    /// guessed, and [`MError::IoFailure`] like [`Magazine::write_data`].
    pub fn write_as(&self, output: impl AsRef<Path>, fmt: TextFormat) -> Result<(), MError> {
        let output = output.as_ref();
        let mut format = Format::new_from_format(fmt, output)?;
        write_atomically(output, |writer| {
            format.write_next(writer, &self.magazine_data)?;
            format.finalize(writer)
        })
        .inspect_err(|e| error!("could not write magazine data: {e}"))?;

        info!("wrote magazine '{}' to {}", self.magazine_data.name, output.display());
        Ok(())
    }
}

impl fmt::Display for Magazine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_data())
    }
}

/// Runs `write` against a temporary file next to `path`, then moves the
/// temporary file over `path`. On failure the temporary file is removed and
/// `path` is left untouched.
///
/// A symbolic link at `path` is written through, and an existing file keeps
/// its permissions. New files get the usual `0o666` minus umask.
fn write_atomically<F>(path: &Path, write: F) -> Result<(), MError>
where
    F: FnOnce(&mut BufWriter<&File>) -> Result<(), MError>,
{
    let io_failure = |source: io::Error| MError::IoFailure {
        path: path.to_path_buf(),
        source,
    };
    let target = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut builder = tempfile::Builder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    let temp = builder.tempfile_in(dir).map_err(io_failure)?;
    if let Ok(metadata) = fs::metadata(&target) {
        temp.as_file()
            .set_permissions(metadata.permissions())
            .map_err(io_failure)?;
    }
    {
        let mut writer = BufWriter::new(temp.as_file());
        write(&mut writer).map_err(|e| match e {
            MError::IoError(source) => io_failure(source),
            other => other,
        })?;
        writer.flush().map_err(io_failure)?;
    }
    temp.persist(&target).map_err(|e| io_failure(e.error))?;
    debug!("persisted {}", target.display());
    Ok(())
}
