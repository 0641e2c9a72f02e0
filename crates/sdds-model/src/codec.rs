use std::path::PathBuf;

use sdds_columnar::{ColumnData, ConvertError, Value};
use thiserror::Error;

use crate::error::{PageError, SchemaError};
use crate::layout::Layout;
use crate::page::{ArrayValue, Page};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to open `{path}`: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("malformed SDDS data at line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("unsupported SDDS feature: {0}")]
    Unsupported(String),
    #[error("invalid value at line {line}")]
    Value {
        line: usize,
        #[source]
        source: ConvertError,
    },
    #[error("writer used out of order: {0}")]
    State(&'static str),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Page(#[from] PageError),
}

/// A source of pages sharing one layout.
pub trait PageReader {
    fn layout(&self) -> &Layout;

    /// The next page, or `None` at end of input.
    fn read_page(&mut self) -> Result<Option<Page>, CodecError>;

    fn close(&mut self) -> Result<(), CodecError> {
        Ok(())
    }
}

/// A sink of pages. The layout is written once, before the first page.
pub trait PageWriter {
    fn write_layout(&mut self, layout: &Layout) -> Result<(), CodecError>;

    /// Begin a page that will hold up to `capacity` rows.
    fn start_page(&mut self, capacity: usize) -> Result<(), CodecError>;

    fn set_parameter(&mut self, name: &str, value: &Value) -> Result<(), CodecError>;

    fn set_array(&mut self, name: &str, value: &ArrayValue) -> Result<(), CodecError>;

    fn set_column(&mut self, name: &str, data: &ColumnData) -> Result<(), CodecError>;

    fn write_page(&mut self) -> Result<(), CodecError>;

    fn close(&mut self) -> Result<(), CodecError>;

    /// Write every item of `page` as one page.
    fn write_full_page(&mut self, page: &Page) -> Result<(), CodecError> {
        let layout = page.layout();
        self.start_page(page.rows())?;
        for (def, value) in layout.parameters.iter().zip(page.parameters()) {
            if def.fixed_value.is_none() {
                self.set_parameter(&def.name, value)?;
            }
        }
        for (def, value) in layout.arrays.iter().zip(page.arrays()) {
            self.set_array(&def.name, value)?;
        }
        for (def, data) in layout.columns.iter().zip(page.columns()) {
            self.set_column(&def.name, data)?;
        }
        self.write_page()
    }
}

impl<R: PageReader + ?Sized> PageReader for Box<R> {
    fn layout(&self) -> &Layout {
        (**self).layout()
    }

    fn read_page(&mut self) -> Result<Option<Page>, CodecError> {
        (**self).read_page()
    }

    fn close(&mut self) -> Result<(), CodecError> {
        (**self).close()
    }
}

impl<W: PageWriter + ?Sized> PageWriter for Box<W> {
    fn write_layout(&mut self, layout: &Layout) -> Result<(), CodecError> {
        (**self).write_layout(layout)
    }

    fn start_page(&mut self, capacity: usize) -> Result<(), CodecError> {
        (**self).start_page(capacity)
    }

    fn set_parameter(&mut self, name: &str, value: &Value) -> Result<(), CodecError> {
        (**self).set_parameter(name, value)
    }

    fn set_array(&mut self, name: &str, value: &ArrayValue) -> Result<(), CodecError> {
        (**self).set_array(name, value)
    }

    fn set_column(&mut self, name: &str, data: &ColumnData) -> Result<(), CodecError> {
        (**self).set_column(name, data)
    }

    fn write_page(&mut self) -> Result<(), CodecError> {
        (**self).write_page()
    }

    fn close(&mut self) -> Result<(), CodecError> {
        (**self).close()
    }
}
