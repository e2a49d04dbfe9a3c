// SPDX-License-Identifier: GPL-3.0-or-later

use image::error::ImageError;
use oracore::paint::Document;
use std::{fmt, io};
use zip::result::ZipError;

pub mod conv;
mod ora;

pub use ora::reader::{load_openraster, load_openraster_bytes, load_openraster_file};

#[derive(Debug)]
pub enum OraError {
    IoError(io::Error),
    CodecError(ImageError),
    /// The container is not a readable OpenRaster archive: the zip is
    /// broken, or stack.xml is missing or does not parse.
    MalformedArchive,
}

impl fmt::Display for OraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OraError::IoError(e) => e.fmt(f),
            OraError::CodecError(e) => e.fmt(f),
            OraError::MalformedArchive => write!(f, "malformed OpenRaster archive"),
        }
    }
}

impl std::error::Error for OraError {
    fn cause(&self) -> Option<&dyn std::error::Error> {
        match self {
            OraError::IoError(e) => Some(e),
            OraError::CodecError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for OraError {
    fn from(err: io::Error) -> Self {
        Self::IoError(err)
    }
}

impl From<ImageError> for OraError {
    fn from(err: ImageError) -> Self {
        Self::CodecError(err)
    }
}

impl From<ZipError> for OraError {
    fn from(err: ZipError) -> Self {
        match err {
            ZipError::Io(io) => Self::IoError(io),
            _ => Self::MalformedArchive,
        }
    }
}

pub type OraLoadResult = Result<Document, OraError>;
