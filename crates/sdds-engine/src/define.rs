//! `define`, `redefine`, `evaluate` and `rpnExpression`.

use std::collections::HashMap;

use log::{debug, warn};
use sdds_model::{ColumnData, ItemClass, Kind, Layout, Page, Value};
use sdds_rpn::{EvalError, Program};

use crate::context::Context;
use crate::error::ProcessError;
use crate::operator::{DefinitionSpec, Scope};
use crate::select::ABORT_CHECK_INTERVAL;

/// Declare the target of `define` (must be new) or `redefine` (created when missing).
pub(crate) fn declare_define(
    layout: &mut Layout,
    scope: Scope,
    name: &str,
    redefine: bool,
    definition: &DefinitionSpec,
) -> Result<(), ProcessError> {
    let class = scope.class();
    match layout.find_mut(class, name) {
        Some(existing) if redefine => {
            definition.apply_to(existing);
            Ok(())
        }
        Some(_) => Err(sdds_model::SchemaError::Duplicate {
            class,
            name: name.to_string(),
        }
        .into()),
        None => {
            layout.define(class, definition.build(name, Kind::Double))?;
            Ok(())
        }
    }
}

pub(crate) fn declare_evaluate(
    layout: &mut Layout,
    scope: Scope,
    name: &str,
    source: &str,
    definition: &DefinitionSpec,
) -> Result<(), ProcessError> {
    let class = scope.class();
    let def = layout.require(class, source)?;
    if def.kind != Kind::String {
        return Err(ProcessError::wrong_kind(class, source, "a string"));
    }
    layout.define(class, definition.build(name, Kind::Double))?;
    Ok(())
}

/// Per-row results of one column evaluation, with the count of failed rows.
struct RowResults {
    kind: Kind,
    values: Vec<Value>,
    failures: usize,
}

impl RowResults {
    fn new(kind: Kind, rows: usize) -> Self {
        Self {
            kind,
            values: Vec::with_capacity(rows),
            failures: 0,
        }
    }

    /// Store a row result. A value that does not fit the target kind is a `Range` failure.
    fn push(
        &mut self,
        row: usize,
        result: Result<Value, EvalError>,
        label: &str,
    ) -> Result<(), ProcessError> {
        match result {
            Ok(value) => {
                let value = value
                    .cast(self.kind)
                    .map_err(|err| ProcessError::row_conversion(err, label, row))?;
                self.values.push(value);
            }
            Err(err) => self.fail(row, &err, label),
        }
        Ok(())
    }

    /// Record a failed row: NaN, the empty string for string targets, zero for integer targets.
    fn fail(&mut self, row: usize, reason: &dyn std::fmt::Display, label: &str) {
        if self.failures == 0 {
            debug!("{label}: row {row} failed: {reason}");
        }
        self.failures += 1;
        let value = if self.kind == Kind::String {
            Value::String(String::new())
        } else {
            Value::Double(f64::NAN)
                .cast(self.kind)
                .unwrap_or_else(|_| Value::zero(self.kind))
        };
        self.values.push(value);
    }

    fn finish(self, ctx: &Context, page: &Page, label: &str) -> Result<ColumnData, ProcessError> {
        if ctx.options.warnings && self.failures > 0 {
            warn!(
                "{label}: evaluation failed for {} row(s) of page {}",
                self.failures,
                page.index()
            );
        }
        Ok(ColumnData::from_values(self.kind, &self.values)?)
    }
}

fn target_kind(page: &Page, scope: Scope, name: &str) -> Result<Kind, ProcessError> {
    Ok(page.layout().require(scope.class(), name)?.kind)
}

/// Evaluate `program` into the target: once per row for columns, once for parameters.
pub(crate) fn run_define(
    ctx: &mut Context,
    page: &mut Page,
    scope: Scope,
    name: &str,
    program: &Program,
    expression: &str,
) -> Result<(), ProcessError> {
    let kind = target_kind(page, scope, name)?;
    let label = format!("define {name}");
    match scope {
        Scope::Column => {
            let rows = page.rows();
            let mut results = RowResults::new(kind, rows);
            {
                let sources = ctx.row_sources(page);
                for row in 0..rows {
                    if row % ABORT_CHECK_INTERVAL == 0 {
                        ctx.check_abort()?;
                    }
                    ctx.bind_row(&sources, row);
                    results.push(row, ctx.eval_value(program, kind), &label)?;
                }
            }
            let data = results.finish(ctx, page, &label)?;
            page.set_column(name, data)?;
        }
        Scope::Parameter => {
            let value = ctx
                .eval_value(program, kind)
                .map_err(|err| ProcessError::eval(expression, err))?;
            page.set_parameter(name, &value)?;
        }
    }
    Ok(())
}

/// Evaluate the expression text held in `source` into `name`.
pub(crate) fn run_evaluate(
    ctx: &mut Context,
    page: &mut Page,
    scope: Scope,
    name: &str,
    source: &str,
) -> Result<(), ProcessError> {
    let kind = target_kind(page, scope, name)?;
    let label = format!("evaluate {name}");
    match scope {
        Scope::Column => {
            let rows = page.rows();
            let texts = page.require_column(source)?.to_strings();
            // Compile failures are remembered per distinct text.
            let mut programs: HashMap<String, Result<Program, String>> = HashMap::new();
            let mut results = RowResults::new(kind, rows);
            {
                let sources = ctx.row_sources(page);
                for (row, text) in texts.iter().enumerate() {
                    if row % ABORT_CHECK_INTERVAL == 0 {
                        ctx.check_abort()?;
                    }
                    if !programs.contains_key(text) {
                        let compiled = ctx.rpn.compile(text).map_err(|err| err.to_string());
                        programs.insert(text.clone(), compiled);
                    }
                    ctx.bind_row(&sources, row);
                    match &programs[text] {
                        Ok(program) => results.push(row, ctx.eval_value(program, kind), &label)?,
                        Err(reason) => results.fail(row, reason, &label),
                    }
                }
            }
            let data = results.finish(ctx, page, &label)?;
            page.set_column(name, data)?;
        }
        Scope::Parameter => {
            let text = page
                .require_parameter(source)?
                .as_str()
                .ok_or_else(|| ProcessError::wrong_kind(ItemClass::Parameter, source, "a string"))?
                .to_string();
            let program = ctx
                .rpn
                .compile(&text)
                .map_err(|err| ProcessError::eval(&text, err))?;
            let value = ctx
                .eval_value(&program, kind)
                .map_err(|err| ProcessError::eval(&text, err))?;
            page.set_parameter(name, &value)?;
        }
    }
    Ok(())
}

/// Run an expression for its side effects on memories, UDFs and files.
pub(crate) fn run_rpn_expression(
    ctx: &mut Context,
    program: &Program,
    expression: &str,
) -> Result<(), ProcessError> {
    ctx.rpn.clear_stacks();
    let result = ctx.rpn.execute(program);
    ctx.rpn.clear_stacks();
    result.map_err(|err| ProcessError::eval(expression, err))
}
