//! Text and conversion operators: edit, print, format, system, scan, cast and convertUnits.

use std::process::Command;

use log::debug;
use sdds_format::{edit_string, reformat_tokens, sprintf, sscanf_first, Arg};
use sdds_model::{ColumnData, Definition, ItemClass, Kind, Layout, Page, Value};

use crate::context::Context;
use crate::error::ProcessError;
use crate::operator::{DefinitionSpec, FormatSpec, Scope};
use crate::select::ABORT_CHECK_INTERVAL;

fn require_string(layout: &Layout, class: ItemClass, name: &str) -> Result<(), ProcessError> {
    if layout.require(class, name)?.kind != Kind::String {
        return Err(ProcessError::wrong_kind(class, name, "a string"));
    }
    Ok(())
}

/// Declare a string-producing target: new, or existing (and string) when `replace` is set.
fn declare_text_target(
    layout: &mut Layout,
    class: ItemClass,
    target: &str,
    replace: bool,
    definition: &DefinitionSpec,
) -> Result<(), ProcessError> {
    match layout.find_mut(class, target) {
        Some(existing) if replace => {
            definition.apply_to(existing);
            if existing.kind != Kind::String {
                return Err(ProcessError::wrong_kind(class, target, "a string"));
            }
            Ok(())
        }
        Some(_) => Err(sdds_model::SchemaError::Duplicate {
            class,
            name: target.to_string(),
        }
        .into()),
        None => {
            layout.define(class, definition.build(target, Kind::String))?;
            Ok(())
        }
    }
}

/// The source values as text: every row of a column, or the one parameter value.
fn source_texts(page: &Page, scope: Scope, name: &str) -> Result<Vec<String>, ProcessError> {
    Ok(match scope {
        Scope::Column => page.require_column(name)?.to_strings(),
        Scope::Parameter => vec![page.require_parameter(name)?.to_text()],
    })
}

/// Store one value per row (column scope) or the single value (parameter scope).
fn store(page: &mut Page, scope: Scope, name: &str, values: Vec<Value>) -> Result<(), ProcessError> {
    match scope {
        Scope::Column => {
            let kind = page.layout().require(ItemClass::Column, name)?.kind;
            page.set_column(name, ColumnData::from_values(kind, &values)?)?;
        }
        Scope::Parameter => {
            if let Some(value) = values.first() {
                page.set_parameter(name, value)?;
            }
        }
    }
    Ok(())
}

pub(crate) fn declare_edit(
    layout: &mut Layout,
    scope: Scope,
    target: &str,
    source: &str,
    script: &str,
    reedit: bool,
    definition: &DefinitionSpec,
) -> Result<(), ProcessError> {
    edit_string("", script)?;
    layout.require(scope.class(), source)?;
    declare_text_target(layout, scope.class(), target, reedit, definition)
}

pub(crate) fn run_edit(
    ctx: &Context,
    page: &mut Page,
    scope: Scope,
    target: &str,
    source: &str,
    script: &str,
) -> Result<(), ProcessError> {
    let mut values = Vec::new();
    for (row, text) in source_texts(page, scope, source)?.iter().enumerate() {
        if row % ABORT_CHECK_INTERVAL == 0 {
            ctx.check_abort()?;
        }
        values.push(Value::String(edit_string(text, script)?));
    }
    store(page, scope, target, values)
}

/// Where a `print` argument comes from.
#[derive(Clone, Debug, PartialEq)]
enum PrintSource {
    Column(String),
    Parameter(String),
    /// `name.field` metadata, fixed for the run.
    Text(String),
}

fn resolve_print_source(
    layout: &Layout,
    scope: Scope,
    name: &str,
) -> Result<PrintSource, ProcessError> {
    if scope == Scope::Column && layout.column(name).is_some() {
        return Ok(PrintSource::Column(name.to_string()));
    }
    if layout.parameter(name).is_some() {
        return Ok(PrintSource::Parameter(name.to_string()));
    }
    if let Some((item, field)) = name.rsplit_once('.') {
        let classes: &[ItemClass] = match scope {
            Scope::Column => &[ItemClass::Column, ItemClass::Parameter, ItemClass::Array],
            Scope::Parameter => &[ItemClass::Parameter, ItemClass::Array, ItemClass::Column],
        };
        for class in classes {
            if let Some(text) = layout.find(*class, item).and_then(|d| d.field(field)) {
                return Ok(PrintSource::Text(text));
            }
        }
    }
    Err(ProcessError::missing(scope.class(), name))
}

fn print_arg(value: &Value) -> Arg<'_> {
    match value {
        Value::Byte(v) => Arg::Int(i64::from(*v)),
        Value::Short(v) => Arg::Int(i64::from(*v)),
        Value::Long(v) => Arg::Int(i64::from(*v)),
        Value::Long64(v) => Arg::Int(*v),
        Value::UShort(v) => Arg::UInt(u64::from(*v)),
        Value::ULong(v) => Arg::UInt(u64::from(*v)),
        Value::ULong64(v) => Arg::UInt(*v),
        Value::Float(v) => Arg::Float(f64::from(*v)),
        Value::Double(v) | Value::LongDouble(v) => Arg::Float(*v),
        Value::String(s) => Arg::Str(s),
        Value::Character(c) => Arg::Char(*c),
    }
}

pub(crate) fn declare_print(
    layout: &mut Layout,
    scope: Scope,
    target: &str,
    sources: &[String],
    reprint: bool,
    definition: &DefinitionSpec,
) -> Result<(), ProcessError> {
    for source in sources {
        resolve_print_source(layout, scope, source)?;
    }
    declare_text_target(layout, scope.class(), target, reprint, definition)
}

pub(crate) fn run_print(
    ctx: &Context,
    page: &mut Page,
    scope: Scope,
    target: &str,
    format: &str,
    sources: &[String],
) -> Result<(), ProcessError> {
    let layout = std::sync::Arc::clone(page.layout());
    let resolved = sources
        .iter()
        .map(|name| resolve_print_source(&layout, scope, name))
        .collect::<Result<Vec<_>, _>>()?;
    let rows = match scope {
        Scope::Column => page.rows(),
        Scope::Parameter => 1,
    };
    let mut values = Vec::with_capacity(rows);
    for row in 0..rows {
        if row % ABORT_CHECK_INTERVAL == 0 {
            ctx.check_abort()?;
        }
        let mut cells = Vec::with_capacity(resolved.len());
        for source in &resolved {
            let cell = match source {
                PrintSource::Column(name) => page
                    .require_column(name)?
                    .get(row)
                    .ok_or_else(|| ProcessError::missing(ItemClass::Column, name))?,
                PrintSource::Parameter(name) => page.require_parameter(name)?.clone(),
                PrintSource::Text(text) => Value::String(text.clone()),
            };
            cells.push(cell);
        }
        let args: Vec<Arg<'_>> = cells.iter().map(print_arg).collect();
        values.push(Value::String(sprintf(format, &args)?));
    }
    store(page, scope, target, values)
}

pub(crate) fn declare_format(layout: &mut Layout, spec: &FormatSpec) -> Result<(), ProcessError> {
    let class = spec.scope.class();
    require_string(layout, class, &spec.source)?;
    if spec.target != spec.source {
        let mut def = layout.require(class, &spec.source)?.clone();
        def.name.clone_from(&spec.target);
        layout.define(class, def)?;
    }
    Ok(())
}

pub(crate) fn run_format(ctx: &Context, page: &mut Page, spec: &FormatSpec) -> Result<(), ProcessError> {
    let mut values = Vec::new();
    for (row, text) in source_texts(page, spec.scope, &spec.source)?.iter().enumerate() {
        if row % ABORT_CHECK_INTERVAL == 0 {
            ctx.check_abort()?;
        }
        let formatted = reformat_tokens(
            text,
            spec.string_format.as_deref(),
            spec.double_format.as_deref(),
            spec.long_format.as_deref(),
        )?;
        values.push(Value::String(formatted));
    }
    store(page, spec.scope, &spec.target, values)
}

pub(crate) fn declare_system(
    layout: &mut Layout,
    scope: Scope,
    target: &str,
    source: &str,
    definition: &DefinitionSpec,
) -> Result<(), ProcessError> {
    require_string(layout, scope.class(), source)?;
    declare_text_target(layout, scope.class(), target, false, definition)
}

/// Run `command` with `sh -c` and return the first line it prints.
fn first_output_line(command: &str) -> Result<String, ProcessError> {
    debug!("running `{command}`");
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .output()
        .map_err(|err| ProcessError::Exec {
            command: command.to_string(),
            message: err.to_string(),
        })?;
    if !output.status.success() {
        return Err(ProcessError::Exec {
            command: command.to_string(),
            message: format!("exited with {}", output.status),
        });
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().next().unwrap_or_default().to_string())
}

pub(crate) fn run_system(
    ctx: &Context,
    page: &mut Page,
    scope: Scope,
    target: &str,
    source: &str,
) -> Result<(), ProcessError> {
    let mut values = Vec::new();
    for command in source_texts(page, scope, source)? {
        ctx.check_abort()?;
        values.push(Value::String(first_output_line(&command)?));
    }
    store(page, scope, target, values)
}

pub(crate) fn declare_scan(
    layout: &mut Layout,
    scope: Scope,
    target: &str,
    source: &str,
    edit: Option<&str>,
    definition: &DefinitionSpec,
) -> Result<(), ProcessError> {
    if let Some(script) = edit {
        edit_string("", script)?;
    }
    require_string(layout, scope.class(), source)?;
    layout.define(scope.class(), definition.build(target, Kind::Double))?;
    Ok(())
}

pub(crate) fn run_scan(
    ctx: &Context,
    page: &mut Page,
    scope: Scope,
    target: &str,
    source: &str,
    format: &str,
    edit: Option<&str>,
) -> Result<(), ProcessError> {
    let kind = page.layout().require(scope.class(), target)?.kind;
    let mut values = Vec::new();
    for (row, text) in source_texts(page, scope, source)?.into_iter().enumerate() {
        if row % ABORT_CHECK_INTERVAL == 0 {
            ctx.check_abort()?;
        }
        let text = match edit {
            Some(script) => edit_string(&text, script)?,
            None => text,
        };
        let scanned = sscanf_first(&text, format)?;
        let value = if kind == Kind::String {
            Value::String(scanned.into_text())
        } else {
            let number = scanned.as_f64().ok_or_else(|| {
                ProcessError::type_error(
                    "PARSE_ERROR",
                    format!("`{text}` does not scan as a number with `{format}`"),
                )
            })?;
            Value::from_f64(kind, number)?
        };
        values.push(value);
    }
    store(page, scope, target, values)
}

pub(crate) fn declare_cast(
    layout: &mut Layout,
    scope: Scope,
    target: &str,
    source: &str,
    kind: Kind,
) -> Result<(), ProcessError> {
    let class = scope.class();
    let def = layout.require(class, source)?;
    if !def.kind.is_numeric() || !kind.is_numeric() {
        return Err(ProcessError::type_error(
            "TYPE_ERROR",
            format!("cast of {class} `{source}` to {kind}: only numeric types can be cast"),
        ));
    }
    let mut def: Definition = def.clone();
    def.name = target.to_string();
    def.kind = kind;
    def.format_string = None;
    layout.define(class, def)?;
    Ok(())
}

pub(crate) fn run_cast(
    ctx: &Context,
    page: &mut Page,
    scope: Scope,
    target: &str,
    source: &str,
    kind: Kind,
) -> Result<(), ProcessError> {
    match scope {
        Scope::Column => {
            let column = page.require_column(source)?;
            let mut values = Vec::with_capacity(column.len());
            for row in 0..column.len() {
                if row % ABORT_CHECK_INTERVAL == 0 {
                    ctx.check_abort()?;
                }
                let Some(value) = column.get(row) else {
                    continue;
                };
                let what = format!("cast {source} to {kind} on page {}", page.index());
                let cast = value
                    .cast(kind)
                    .map_err(|err| ProcessError::row_conversion(err, &what, row))?;
                values.push(cast);
            }
            page.set_column(target, ColumnData::from_values(kind, &values)?)?;
        }
        Scope::Parameter => {
            let value = page.require_parameter(source)?.cast(kind)?;
            page.set_parameter(target, &value)?;
        }
    }
    Ok(())
}

pub(crate) fn declare_convert_units(
    layout: &mut Layout,
    scope: Scope,
    name: &str,
    new_units: &str,
    old_units: &str,
) -> Result<(), ProcessError> {
    let class = scope.class();
    let def = layout
        .find_mut(class, name)
        .ok_or_else(|| ProcessError::missing(class, name))?;
    if !def.kind.is_numeric() {
        return Err(ProcessError::wrong_kind(class, name, "numeric"));
    }
    if def.units_or_empty() != old_units {
        return Err(ProcessError::type_error(
            "UNIT_MISMATCH",
            format!(
                "{class} `{name}` has units `{}`, not `{old_units}`",
                def.units_or_empty()
            ),
        ));
    }
    def.units = (!new_units.is_empty()).then(|| new_units.to_string());
    Ok(())
}

pub(crate) fn run_convert_units(
    page: &mut Page,
    scope: Scope,
    name: &str,
    factor: f64,
) -> Result<(), ProcessError> {
    match scope {
        Scope::Column => {
            let column = page.require_column(name)?;
            let kind = column.kind();
            let scaled: Vec<f64> = column.to_f64_vec().into_iter().map(|v| v * factor).collect();
            page.set_column(name, ColumnData::from_f64s(kind, &scaled)?)?;
        }
        Scope::Parameter => {
            let value = page.require_parameter(name)?.to_f64()? * factor;
            page.set_parameter(name, &Value::Double(value))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn layout() -> Layout {
        let mut layout = Layout::new();
        layout
            .define(ItemClass::Column, Definition::new("x", Kind::Double).with_units("mm"))
            .expect("x");
        layout
            .define(ItemClass::Column, Definition::new("name", Kind::String))
            .expect("name");
        layout
            .define(ItemClass::Parameter, Definition::new("run", Kind::Long))
            .expect("run");
        layout
    }

    #[test]
    fn print_sources_resolve_items_and_metadata() {
        let layout = layout();
        assert_eq!(
            resolve_print_source(&layout, Scope::Column, "x").expect("x"),
            PrintSource::Column("x".into())
        );
        assert_eq!(
            resolve_print_source(&layout, Scope::Column, "run").expect("run"),
            PrintSource::Parameter("run".into())
        );
        assert_eq!(
            resolve_print_source(&layout, Scope::Column, "x.units").expect("x.units"),
            PrintSource::Text("mm".into())
        );
        assert!(resolve_print_source(&layout, Scope::Parameter, "x").is_err());
        assert!(resolve_print_source(&layout, Scope::Column, "x.colour").is_err());
    }

    #[test]
    fn print_args_keep_signedness() {
        assert_eq!(print_arg(&Value::Short(-3)), Arg::Int(-3));
        assert_eq!(print_arg(&Value::ULong64(u64::MAX)), Arg::UInt(u64::MAX));
        assert_eq!(print_arg(&Value::from("a")), Arg::Str("a"));
    }

    #[test]
    fn convert_units_checks_the_old_units() {
        let mut layout = layout();
        let err = declare_convert_units(&mut layout, Scope::Column, "x", "m", "cm")
            .expect_err("mismatch");
        assert!(matches!(err, ProcessError::Type { label: "UNIT_MISMATCH", .. }));
        declare_convert_units(&mut layout, Scope::Column, "x", "m", "mm").expect("convert");
        assert_eq!(layout.column("x").and_then(|d| d.units.as_deref()), Some("m"));
        declare_convert_units(&mut layout, Scope::Parameter, "run", "count", "").expect("empty");
    }

    #[test]
    fn cast_is_numeric_only() {
        let mut layout = layout();
        assert!(declare_cast(&mut layout, Scope::Column, "n2", "name", Kind::Long).is_err());
        declare_cast(&mut layout, Scope::Column, "xi", "x", Kind::Long).expect("cast");
        let xi = layout.column("xi").expect("xi");
        assert_eq!((xi.kind, xi.units.as_deref()), (Kind::Long, Some("mm")));
    }

    #[test]
    fn format_copies_the_source_definition() {
        let mut layout = layout();
        let spec = FormatSpec {
            scope: Scope::Column,
            target: "pretty".into(),
            source: "name".into(),
            string_format: None,
            double_format: Some("%.2f".into()),
            long_format: None,
        };
        declare_format(&mut layout, &spec).expect("format");
        assert_eq!(layout.column("pretty").map(|d| d.kind), Some(Kind::String));
    }

    #[cfg(unix)]
    #[test]
    fn system_captures_the_first_line() {
        assert_eq!(first_output_line("printf 'a\\nb\\n'").expect("sh"), "a");
        assert!(matches!(first_output_line("exit 3"), Err(ProcessError::Exec { .. })));
    }
}
