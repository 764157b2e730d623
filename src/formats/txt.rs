// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2025 William Bro-Jørgensen
//
// See LICENSE at the project root for full text.

use crate::error::MError;
use crate::format::FileFormat;
use crate::magazine_data::MagazineData;
use std::io::{BufRead, ErrorKind, Write};

const FORMAT: &str = "TXT";

/// The outline rendering of a magazine: the name on the first line, then one
/// tab-indented line per content entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct TXTFormat;

impl TXTFormat {
    fn strip_line_ending(line: &str) -> &str {
        let line = line.strip_suffix('\n').unwrap_or(line);
        line.strip_suffix('\r').unwrap_or(line)
    }

    /// Reads the next line into `line`, returning the number of bytes read.
    fn read_line<R: BufRead>(
        reader: &mut R,
        line: &mut String,
        line_number: usize,
    ) -> Result<usize, MError> {
        line.clear();
        reader.read_line(line).map_err(|e| match e.kind() {
            ErrorKind::InvalidData => MError::invalid(FORMAT, line_number, "invalid UTF-8"),
            _ => MError::IoError(e),
        })
    }
}

impl FileFormat for TXTFormat {
    fn read_next<R: BufRead>(&mut self, reader: &mut R) -> Result<MagazineData, MError> {
        let mut line = String::new();
        if Self::read_line(reader, &mut line, 1)? == 0 {
            return Err(MError::invalid(FORMAT, 1, "empty document"));
        }
        let mut data = MagazineData::with_name(Self::strip_line_ending(&line));

        let mut line_number = 1;
        loop {
            line_number += 1;
            if Self::read_line(reader, &mut line, line_number)? == 0 {
                break;
            }

            let content = Self::strip_line_ending(&line)
                .strip_prefix('\t')
                .ok_or_else(|| {
                    MError::invalid(
                        FORMAT,
                        line_number,
                        "content lines must start with a tab",
                    )
                })?;
            data.add_line(content);
        }

        Ok(data)
    }

    fn validate<R: BufRead>(&self, reader: &mut R) -> Result<(), MError> {
        TXTFormat.read_next(reader).map(|_| ())
    }

    fn write_next<W: Write>(&mut self, writer: &mut W, data: &MagazineData) -> Result<(), MError> {
        write!(writer, "{data}")?;
        Ok(())
    }

    fn finalize<W: Write>(&self, writer: &mut W) -> Result<(), MError> {
        writer.flush()?;
        Ok(())
    }
}
