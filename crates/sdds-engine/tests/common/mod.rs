#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::Arc;

use sdds_engine::{run, Operator, Pipeline, PipelineOptions, RunSummary};
use sdds_io::{AsciiReader, AsciiWriter};
use sdds_model::{
    CodecError, ColumnData, Definition, ItemClass, Layout, Page, PageReader, Value,
};

/// Pages held in memory.
pub struct MemoryReader {
    layout: Layout,
    pages: VecDeque<Page>,
    read: usize,
}

impl MemoryReader {
    pub fn new(layout: Layout, pages: Vec<Page>) -> Self {
        Self {
            layout,
            pages: pages.into(),
            read: 0,
        }
    }
}

impl PageReader for MemoryReader {
    fn layout(&self) -> &Layout {
        &self.layout
    }

    fn read_page(&mut self) -> Result<Option<Page>, CodecError> {
        let Some(mut page) = self.pages.pop_front() else {
            return Ok(None);
        };
        self.read += 1;
        page.set_index(self.read);
        Ok(Some(page))
    }
}

/// A one-page dataset of the given columns (all the same length) and parameters.
pub fn dataset(columns: &[(&str, ColumnData)], parameters: &[(&str, Value)]) -> (Layout, Page) {
    let mut layout = Layout::new();
    for (name, value) in parameters {
        layout
            .define(ItemClass::Parameter, Definition::new(*name, value.kind()))
            .expect("parameter");
    }
    for (name, data) in columns {
        layout
            .define(ItemClass::Column, Definition::new(*name, data.kind()))
            .expect("column");
    }
    let rows = columns.first().map_or(0, |(_, data)| data.len());
    let mut page = Page::new(Arc::new(layout.clone()), rows);
    for (name, value) in parameters {
        page.set_parameter(name, value).expect("parameter value");
    }
    for (name, data) in columns {
        page.set_column(name, data.clone()).expect("column data");
    }
    (layout, page)
}

pub fn doubles(values: impl IntoIterator<Item = f64>) -> ColumnData {
    ColumnData::Double(values.into_iter().collect())
}

pub fn strings(values: &[&str]) -> ColumnData {
    ColumnData::String(values.iter().map(|s| s.to_string()).collect())
}

pub fn seeded() -> PipelineOptions {
    PipelineOptions {
        seed: Some(7),
        ..PipelineOptions::default()
    }
}

/// Run `ops` over `pages` and return the pages that were written, as written.
pub fn process(
    layout: &Layout,
    pages: Vec<Page>,
    ops: Vec<Operator>,
) -> (Vec<Page>, RunSummary) {
    let (bytes, summary) = process_to_bytes(layout, pages, ops);
    (read_back(&bytes), summary)
}

/// Run `ops` and return the encoded output.
pub fn process_to_bytes(
    layout: &Layout,
    pages: Vec<Page>,
    ops: Vec<Operator>,
) -> (Vec<u8>, RunSummary) {
    let mut reader = MemoryReader::new(layout.clone(), pages);
    let mut pipeline = Pipeline::new(layout, ops, seeded()).expect("pipeline");
    let mut writer = AsciiWriter::from_writer(Vec::new());
    let summary = run(&mut reader, &mut writer, &mut pipeline).expect("run");
    (writer.into_inner(), summary)
}

pub fn read_back(bytes: &[u8]) -> Vec<Page> {
    let mut reader = AsciiReader::from_reader(Cursor::new(bytes.to_vec())).expect("header");
    let mut pages = Vec::new();
    while let Some(page) = reader.read_page().expect("page") {
        pages.push(page);
    }
    pages
}

pub fn column_f64(page: &Page, name: &str) -> Vec<f64> {
    page.column(name).expect("column").to_f64_vec()
}

pub fn parameter_f64(page: &Page, name: &str) -> f64 {
    page.parameter(name)
        .expect("parameter")
        .to_f64()
        .expect("numeric parameter")
}
