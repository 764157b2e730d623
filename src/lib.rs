// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2025 William Bro-Jørgensen
//
// See LICENSE at the project root for full text.

pub mod error;
pub mod format;
pub mod formats;
pub mod magazine;
pub mod magazine_data;
pub mod resource;

use error::MError;
use magazine::Magazine;
use magazine_data::MagazineData;
use std::path::Path;

/// Read a magazine file and return its contents
pub fn read_magazine(path: &Path) -> Result<MagazineData, MError> {
    let mut magazine = Magazine::new(path)?;
    magazine.open()?;
    magazine.load()?;
    magazine.close();
    Ok(magazine.magazine_data)
}
