use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use sdds_model::{
    ArrayValue, CodecError, ColumnData, Kind, Layout, Page, PageReader, Value,
};

use crate::header::{layout_from_namelists, parse_namelists};
use crate::token::split_tokens;

/// Reads ASCII SDDS pages from any buffered source.
pub struct AsciiReader<R> {
    input: R,
    line: usize,
    layout: Arc<Layout>,
    pending: VecDeque<String>,
    pages_read: usize,
}

impl AsciiReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CodecError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| CodecError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: BufRead> AsciiReader<R> {
    /// Read the header from `input`, leaving it positioned at the first page.
    pub fn from_reader(mut input: R) -> Result<Self, CodecError> {
        let mut first = String::new();
        input.read_line(&mut first)?;
        let version = first.trim();
        if !version.starts_with("SDDS") || !version[4..].chars().all(|c| c.is_ascii_digit()) {
            return Err(CodecError::Syntax {
                line: 1,
                message: format!("expected an SDDS version line, found `{version}`"),
            });
        }

        let mut line = 1;
        let mut header = String::new();
        let namelists = loop {
            let mut next = String::new();
            if input.read_line(&mut next)? == 0 {
                return Err(CodecError::Syntax {
                    line,
                    message: "end of input inside the header".into(),
                });
            }
            line += 1;
            if next.trim_start().starts_with('!') {
                header.push('\n');
                continue;
            }
            header.push_str(&next);
            if !header.ends_with('\n') {
                header.push('\n');
            }
            if let Some(namelists) = parse_namelists(&header, 2)? {
                if namelists.last().is_some_and(|n| n.group == "data") {
                    break namelists;
                }
            }
        };
        let (layout, _mode) = layout_from_namelists(&namelists)?;
        Ok(Self {
            input,
            line,
            layout: Arc::new(layout),
            pending: VecDeque::new(),
            pages_read: 0,
        })
    }

    /// The next non-blank, non-comment line, or `None` at end of input.
    fn next_line(&mut self) -> Result<Option<String>, CodecError> {
        loop {
            let mut text = String::new();
            if self.input.read_line(&mut text)? == 0 {
                return Ok(None);
            }
            self.line += 1;
            let trimmed = text.trim_end_matches(&['\n', '\r'][..]);
            if trimmed.trim().is_empty() || trimmed.starts_with('!') {
                continue;
            }
            return Ok(Some(trimmed.to_string()));
        }
    }

    fn syntax(&self, message: impl Into<String>) -> CodecError {
        CodecError::Syntax {
            line: self.line,
            message: message.into(),
        }
    }

    fn next_token(&mut self, what: &str) -> Result<String, CodecError> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Ok(token);
            }
            let line = self
                .next_line()?
                .ok_or_else(|| self.syntax(format!("end of input while reading {what}")))?;
            let tokens = split_tokens(&line).map_err(|message| self.syntax(message))?;
            self.pending.extend(tokens);
        }
    }

    fn parse(&self, kind: Kind, token: &str) -> Result<Value, CodecError> {
        if kind == Kind::Character {
            let code = token.chars().next().map_or(0, |c| c as u32);
            return Ok(Value::Character(u8::try_from(code).unwrap_or(b'?')));
        }
        Value::parse(kind, token).map_err(|source| CodecError::Value {
            line: self.line,
            source,
        })
    }

    fn read_parameter(&mut self, kind: Kind, first: Option<String>) -> Result<Value, CodecError> {
        let line = match first {
            Some(line) => line,
            None => self
                .next_line()?
                .ok_or_else(|| self.syntax("end of input while reading a parameter"))?,
        };
        let tokens = split_tokens(&line).map_err(|message| self.syntax(message))?;
        let text = match (kind, tokens.as_slice()) {
            (Kind::String, [single]) if line.trim_start().starts_with('"') => single.clone(),
            (Kind::String, _) => line.trim().to_string(),
            (_, [first, ..]) => first.clone(),
            (_, []) => return Err(self.syntax("missing parameter value")),
        };
        self.parse(kind, &text)
    }

    fn read_array(&mut self, kind: Kind, dimensions: usize) -> Result<ArrayValue, CodecError> {
        let mut dims = Vec::with_capacity(dimensions);
        for _ in 0..dimensions.max(1) {
            let token = self.next_token("array dimensions")?;
            let d = token
                .parse::<usize>()
                .map_err(|_| self.syntax(format!("bad array dimension `{token}`")))?;
            dims.push(d);
        }
        let count: usize = dims.iter().product();
        let mut data = ColumnData::with_len(kind, count);
        for i in 0..count {
            let token = self.next_token("array elements")?;
            let value = self.parse(kind, &token)?;
            data.set(i, &value).map_err(|source| CodecError::Value {
                line: self.line,
                source,
            })?;
        }
        Ok(ArrayValue { dims, data })
    }
}

impl<R: BufRead> PageReader for AsciiReader<R> {
    fn layout(&self) -> &Layout {
        &self.layout
    }

    fn read_page(&mut self) -> Result<Option<Page>, CodecError> {
        self.pending.clear();
        let Some(first_line) = self.next_line()? else {
            return Ok(None);
        };
        let layout = Arc::clone(&self.layout);
        let mut first = Some(first_line);

        let mut parameters = Vec::with_capacity(layout.parameters.len());
        for def in &layout.parameters {
            if def.fixed_value.is_some() {
                parameters.push(None);
                continue;
            }
            parameters.push(Some(self.read_parameter(def.kind, first.take())?));
        }
        if let Some(line) = first.take() {
            let tokens = split_tokens(&line).map_err(|message| self.syntax(message))?;
            self.pending.extend(tokens);
        }

        let mut arrays = Vec::with_capacity(layout.arrays.len());
        for def in &layout.arrays {
            arrays.push(self.read_array(def.kind, def.dimensions)?);
        }

        let token = self.next_token("the row count")?;
        let rows = token
            .parse::<usize>()
            .map_err(|_| self.syntax(format!("bad row count `{token}`")))?;

        let mut page = Page::new(Arc::clone(&layout), rows);
        self.pages_read += 1;
        page.set_index(self.pages_read);
        for (def, value) in layout.parameters.iter().zip(parameters) {
            if let Some(value) = value {
                page.set_parameter(&def.name, &value)?;
            }
        }
        for (def, array) in layout.arrays.iter().zip(arrays) {
            page.set_array(&def.name, array)?;
        }

        let mut columns: Vec<ColumnData> = layout
            .columns
            .iter()
            .map(|def| ColumnData::with_len(def.kind, rows))
            .collect();
        for row in 0..rows {
            for (def, column) in layout.columns.iter().zip(columns.iter_mut()) {
                let token = self.next_token("row data")?;
                let value = self.parse(def.kind, &token)?;
                column.set(row, &value).map_err(|source| CodecError::Value {
                    line: self.line,
                    source,
                })?;
            }
        }
        if !self.pending.is_empty() {
            log::debug!(
                "page {}: {} extra tokens after the last row",
                self.pages_read,
                self.pending.len()
            );
            self.pending.clear();
        }
        for (def, column) in layout.columns.iter().zip(columns) {
            page.set_column(&def.name, column)?;
        }
        Ok(Some(page))
    }
}

/// Reader over standard input.
pub type StdinReader = AsciiReader<BufReader<io::Stdin>>;

pub(crate) fn stdin_reader() -> Result<StdinReader, CodecError> {
    AsciiReader::from_reader(BufReader::new(io::stdin()))
}
