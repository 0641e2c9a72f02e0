//! ASCII SDDS codec.
//!
//! [`AsciiReader`] and [`AsciiWriter`] implement the [`PageReader`]/[`PageWriter`] traits
//! for the `SDDS1` text format: a namelist header followed by one block per page.

#![forbid(unsafe_code)]

mod header;
mod reader;
mod token;
mod writer;

use std::io::{self, BufWriter, Write};
use std::path::Path;

use sdds_model::{CodecError, PageReader, PageWriter};

pub use crate::reader::{AsciiReader, StdinReader};
pub use crate::token::{quote, split_tokens};
pub use crate::writer::AsciiWriter;

/// Open `path` for reading; `None` or `-` reads standard input.
pub fn open_input(path: Option<&Path>) -> Result<Box<dyn PageReader>, CodecError> {
    match path {
        Some(path) if path.as_os_str() != "-" => Ok(Box::new(AsciiReader::open(path)?)),
        _ => Ok(Box::new(reader::stdin_reader()?)),
    }
}

/// Create `path` for writing; `None` or `-` writes standard output.
pub fn open_output(path: Option<&Path>) -> Result<Box<dyn PageWriter>, CodecError> {
    match path {
        Some(path) if path.as_os_str() != "-" => Ok(Box::new(AsciiWriter::create(path)?)),
        _ => Ok(Box::new(AsciiWriter::from_writer(BufWriter::new(io::stdout())))),
    }
}

/// A writer over any byte sink, boxed for use where the sink type is not known statically.
pub fn writer_for<'a, W: Write + 'a>(out: W) -> Box<dyn PageWriter + 'a> {
    Box::new(AsciiWriter::from_writer(out))
}
