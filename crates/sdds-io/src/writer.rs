use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use sdds_model::{ArrayValue, CodecError, ColumnData, Layout, Page, PageWriter, Value};

use crate::header::write_header;
use crate::token::quote;

/// Writes ASCII SDDS: the header once, then one block per page.
pub struct AsciiWriter<W: Write> {
    out: W,
    layout: Option<Arc<Layout>>,
    page: Option<Page>,
    pages_written: usize,
}

impl AsciiWriter<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, CodecError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| CodecError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_writer(BufWriter::new(file)))
    }
}

impl<W: Write> AsciiWriter<W> {
    pub fn from_writer(out: W) -> Self {
        Self {
            out,
            layout: None,
            page: None,
            pages_written: 0,
        }
    }

    pub fn pages_written(&self) -> usize {
        self.pages_written
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn current_page(&mut self) -> Result<&mut Page, CodecError> {
        self.page
            .as_mut()
            .ok_or(CodecError::State("no page started"))
    }
}

fn text_of(value: &Value) -> String {
    quote(&value.to_text()).into_owned()
}

fn write_values(out: &mut impl Write, data: &ColumnData, per_line: usize) -> io::Result<()> {
    let texts = data.to_strings();
    for chunk in texts.chunks(per_line.max(1)) {
        let line: Vec<_> = chunk.iter().map(|t| quote(t)).collect();
        writeln!(out, "{}", line.join(" "))?;
    }
    Ok(())
}

impl<W: Write> PageWriter for AsciiWriter<W> {
    fn write_layout(&mut self, layout: &Layout) -> Result<(), CodecError> {
        if self.layout.is_some() {
            return Err(CodecError::State("layout already written"));
        }
        write_header(&mut self.out, layout)?;
        self.layout = Some(Arc::new(layout.clone()));
        Ok(())
    }

    fn start_page(&mut self, capacity: usize) -> Result<(), CodecError> {
        let layout = self
            .layout
            .clone()
            .ok_or(CodecError::State("layout not written"))?;
        self.page = Some(Page::new(layout, capacity));
        Ok(())
    }

    fn set_parameter(&mut self, name: &str, value: &Value) -> Result<(), CodecError> {
        self.current_page()?.set_parameter(name, value)?;
        Ok(())
    }

    fn set_array(&mut self, name: &str, value: &ArrayValue) -> Result<(), CodecError> {
        self.current_page()?.set_array(name, value.clone())?;
        Ok(())
    }

    fn set_column(&mut self, name: &str, data: &ColumnData) -> Result<(), CodecError> {
        self.current_page()?.set_column(name, data.clone())?;
        Ok(())
    }

    fn write_page(&mut self) -> Result<(), CodecError> {
        let page = self.page.take().ok_or(CodecError::State("no page started"))?;
        let layout = Arc::clone(page.layout());
        let out = &mut self.out;

        for (def, value) in layout.parameters.iter().zip(page.parameters()) {
            if def.fixed_value.is_none() {
                writeln!(out, "{}", text_of(value))?;
            }
        }
        for array in page.arrays() {
            let dims: Vec<String> = array.dims.iter().map(usize::to_string).collect();
            writeln!(out, "{}", dims.join(" "))?;
            write_values(out, &array.data, 10)?;
        }
        writeln!(out, "{}", page.rows())?;
        let texts: Vec<Vec<String>> = page.columns().iter().map(ColumnData::to_strings).collect();
        for row in 0..page.rows() {
            let line: Vec<_> = texts.iter().map(|column| quote(&column[row])).collect();
            writeln!(out, "{}", line.join(" "))?;
        }
        self.pages_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), CodecError> {
        if self.page.is_some() {
            log::warn!("closing SDDS output with an unwritten page");
            self.page = None;
        }
        self.out.flush()?;
        Ok(())
    }
}
