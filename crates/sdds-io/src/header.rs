use std::io::Write;

use sdds_model::{CodecError, Definition, Description, ItemClass, Kind, Layout, MajorOrder};

use crate::token::quote;

/// One `&group field=value, ... &end` namelist.
#[derive(Debug, PartialEq)]
pub(crate) struct Namelist {
    pub group: String,
    pub fields: Vec<(String, String)>,
    pub line: usize,
}

impl Namelist {
    fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(field))
            .map(|(_, value)| value.as_str())
    }

    fn syntax(&self, message: impl Into<String>) -> CodecError {
        CodecError::Syntax {
            line: self.line,
            message: message.into(),
        }
    }
}

/// Data-section settings from `&data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DataMode {
    pub major_order: MajorOrder,
}

/// Parse every complete namelist in `text`.
///
/// Returns `Ok(None)` when the text ends inside a namelist (more header lines are needed).
pub(crate) fn parse_namelists(
    text: &str,
    first_line: usize,
) -> Result<Option<Vec<Namelist>>, CodecError> {
    let chars: Vec<char> = text.chars().collect();
    let mut pos = 0;
    let mut line = first_line;
    let mut out = Vec::new();

    let skip_ws = |pos: &mut usize, line: &mut usize| {
        while *pos < chars.len() && (chars[*pos].is_whitespace() || chars[*pos] == ',') {
            if chars[*pos] == '\n' {
                *line += 1;
            }
            *pos += 1;
        }
    };

    loop {
        skip_ws(&mut pos, &mut line);
        if pos >= chars.len() {
            return Ok(Some(out));
        }
        if chars[pos] != '&' {
            return Err(CodecError::Syntax {
                line,
                message: format!("expected `&` to start a namelist, found `{}`", chars[pos]),
            });
        }
        let start_line = line;
        pos += 1;
        let group: String = chars[pos..]
            .iter()
            .take_while(|c| c.is_alphanumeric() || **c == '_')
            .collect();
        pos += group.chars().count();
        let mut fields = Vec::new();
        loop {
            skip_ws(&mut pos, &mut line);
            if pos >= chars.len() {
                return Ok(None);
            }
            if chars[pos] == '&' {
                let word: String = chars[pos + 1..]
                    .iter()
                    .take_while(|c| c.is_alphanumeric())
                    .collect();
                if word.eq_ignore_ascii_case("end") {
                    pos += 4;
                    break;
                }
                return Err(CodecError::Syntax {
                    line,
                    message: format!("unterminated &{group} namelist"),
                });
            }
            let name: String = chars[pos..]
                .iter()
                .take_while(|c| !c.is_whitespace() && **c != '=' && **c != '&')
                .collect();
            pos += name.chars().count();
            skip_ws(&mut pos, &mut line);
            if pos >= chars.len() {
                return Ok(None);
            }
            if chars[pos] != '=' {
                return Err(CodecError::Syntax {
                    line,
                    message: format!("expected `=` after `{name}` in &{group}"),
                });
            }
            pos += 1;
            while pos < chars.len() && matches!(chars[pos], ' ' | '\t') {
                pos += 1;
            }
            let mut value = String::new();
            if chars.get(pos) == Some(&'"') {
                pos += 1;
                loop {
                    match chars.get(pos) {
                        None => return Ok(None),
                        Some('"') => {
                            pos += 1;
                            break;
                        }
                        Some('\\') if pos + 1 < chars.len() => {
                            value.push(chars[pos + 1]);
                            pos += 2;
                        }
                        Some(&c) => {
                            if c == '\n' {
                                line += 1;
                            }
                            value.push(c);
                            pos += 1;
                        }
                    }
                }
            } else {
                while pos < chars.len() && !chars[pos].is_whitespace() && !matches!(chars[pos], ',' | '&') {
                    value.push(chars[pos]);
                    pos += 1;
                }
            }
            fields.push((name.to_ascii_lowercase(), value));
        }
        out.push(Namelist {
            group: group.to_ascii_lowercase(),
            fields,
            line: start_line,
        });
    }
}

fn definition(namelist: &Namelist, class: ItemClass) -> Result<Definition, CodecError> {
    let name = namelist
        .get("name")
        .filter(|n| !n.is_empty())
        .ok_or_else(|| namelist.syntax(format!("&{} without a name", namelist.group)))?;
    let kind: Kind = namelist
        .get("type")
        .ok_or_else(|| namelist.syntax(format!("{class} `{name}` has no type")))?
        .parse()
        .map_err(|source| CodecError::Value {
            line: namelist.line,
            source,
        })?;
    let mut def = Definition::new(name, kind);
    let text = |field: &str| namelist.get(field).filter(|v| !v.is_empty()).map(str::to_string);
    def.units = text("units");
    def.symbol = text("symbol");
    def.description = text("description");
    def.format_string = text("format_string");
    if class == ItemClass::Parameter {
        def.fixed_value = namelist.get("fixed_value").map(str::to_string);
    }
    if class == ItemClass::Array {
        def.dimensions = match namelist.get("dimensions") {
            Some(d) => d
                .parse()
                .map_err(|_| namelist.syntax(format!("bad dimensions `{d}` for array `{name}`")))?,
            None => 1,
        };
    }
    Ok(def)
}

/// Build a layout from header namelists. The last namelist must be `&data`.
pub(crate) fn layout_from_namelists(
    namelists: &[Namelist],
) -> Result<(Layout, DataMode), CodecError> {
    let mut layout = Layout::new();
    let mut mode = None;
    for namelist in namelists {
        match namelist.group.as_str() {
            "description" => {
                layout.description = Some(Description {
                    text: namelist.get("text").map(str::to_string),
                    contents: namelist.get("contents").map(str::to_string),
                });
            }
            "parameter" => {
                layout.define(ItemClass::Parameter, definition(namelist, ItemClass::Parameter)?)?;
            }
            "array" => {
                layout.define(ItemClass::Array, definition(namelist, ItemClass::Array)?)?;
            }
            "column" => {
                layout.define(ItemClass::Column, definition(namelist, ItemClass::Column)?)?;
            }
            "data" => {
                let data_mode = namelist.get("mode").unwrap_or("binary");
                if !data_mode.eq_ignore_ascii_case("ascii") {
                    return Err(CodecError::Unsupported(format!("data mode `{data_mode}`")));
                }
                if namelist.get("no_row_counts").is_some_and(|v| v != "0") {
                    return Err(CodecError::Unsupported("no_row_counts=1".into()));
                }
                if namelist
                    .get("additional_header_lines")
                    .is_some_and(|v| v != "0")
                {
                    return Err(CodecError::Unsupported("additional_header_lines".into()));
                }
                let major_order = if namelist.get("column_major_order").is_some_and(|v| v != "0") {
                    MajorOrder::Column
                } else {
                    MajorOrder::Row
                };
                layout.major_order = major_order;
                mode = Some(DataMode { major_order });
            }
            "include" | "associate" => {
                return Err(CodecError::Unsupported(format!("&{}", namelist.group)));
            }
            other => log::warn!("ignoring unknown header namelist &{other}"),
        }
    }
    let mode = mode.ok_or(CodecError::Syntax {
        line: namelists.last().map_or(1, |n| n.line),
        message: "header has no &data namelist".into(),
    })?;
    Ok((layout, mode))
}

fn field(out: &mut impl Write, name: &str, value: Option<&str>) -> std::io::Result<()> {
    match value {
        Some(value) => write!(out, " {name}={},", quote_header(value)),
        None => Ok(()),
    }
}

fn quote_header(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '-' | '+' | '/' | '%' | ':'));
    if plain {
        return value.to_string();
    }
    let mut out = String::from("\"");
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Write the `SDDS1` line and header namelists for `layout`.
pub(crate) fn write_header(out: &mut impl Write, layout: &Layout) -> std::io::Result<()> {
    writeln!(out, "SDDS1")?;
    if let Some(description) = &layout.description {
        write!(out, "&description")?;
        field(out, "text", description.text.as_deref())?;
        field(out, "contents", description.contents.as_deref())?;
        writeln!(out, " &end")?;
    }
    for (group, class) in [
        ("parameter", ItemClass::Parameter),
        ("array", ItemClass::Array),
        ("column", ItemClass::Column),
    ] {
        for def in layout.items(class) {
            write!(out, "&{group}")?;
            field(out, "name", Some(&def.name))?;
            field(out, "symbol", def.symbol.as_deref())?;
            field(out, "units", def.units.as_deref())?;
            field(out, "description", def.description.as_deref())?;
            field(out, "format_string", def.format_string.as_deref())?;
            field(out, "type", Some(def.kind.keyword()))?;
            if class == ItemClass::Parameter {
                field(out, "fixed_value", def.fixed_value.as_deref())?;
            }
            if class == ItemClass::Array {
                field(out, "dimensions", Some(&def.dimensions.to_string()))?;
            }
            writeln!(out, " &end")?;
        }
    }
    let order = match layout.major_order {
        MajorOrder::Row => "",
        MajorOrder::Column => " column_major_order=1,",
    };
    writeln!(out, "&data mode=ascii,{order} &end")
}
