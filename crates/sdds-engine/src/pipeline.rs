//! The page loop: declaration-time validation, then each page through every operator in
//! command-line order.

use std::sync::Arc;

use log::{debug, info, warn};
use sdds_model::{
    Layout, NameOptions, Page, PageReader, PageWriter, SchemaMapping, SchemaOptions,
    WildcardPattern,
};
use sdds_rpn::{Program, Rpn};

use crate::context::{CompiledExpression, Context};
use crate::define;
use crate::error::ProcessError;
use crate::operator::{Expression, ItemRef, NameAction, Operator};
use crate::options::PipelineOptions;
use crate::select;
use crate::text;

/// What an operator did to the page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    /// Row flags may have changed; compact before the next operator.
    RowsChanged,
    SkipPage,
    /// Stop reading input (autostop).
    Stop,
}

/// Result of running one page through the pipeline.
#[derive(Debug)]
pub enum PageOutcome {
    Emit(Page),
    Skip,
    Stop,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub pages_read: usize,
    pub pages_written: usize,
    pub stopped_by_autostop: bool,
}

/// An operator with its per-run state.
struct Step {
    op: Operator,
    expression: Option<CompiledExpression>,
    ran: bool,
}

impl Step {
    fn expression(op: &Operator) -> Option<&Expression> {
        match op {
            Operator::Test { expression, .. }
            | Operator::Define { expression, .. }
            | Operator::RpnExpression { expression, .. } => Some(expression),
            _ => None,
        }
    }

    fn run(&mut self, ctx: &mut Context, page: &mut Page) -> Result<Flow, ProcessError> {
        let Step {
            op,
            expression: compiled,
            ran,
        } = self;
        let mut program_for = |ctx: &mut Context,
                               page: &Page,
                               expression: &Expression|
         -> Result<Program, ProcessError> {
            match compiled.as_mut() {
                Some(compiled) => compiled.program(ctx, expression, page),
                None => Err(ProcessError::Usage(format!("{expression} was not compiled"))),
            }
        };
        let flow = match &*op {
            Operator::Require { .. } | Operator::Names { .. } => Flow::Continue,
            Operator::Match { scope, terms } => select::run_match(page, *scope, terms)?,
            Operator::Filter { scope, terms } => select::run_filter(page, *scope, terms)?,
            Operator::TimeFilter(spec) => select::run_time_filter(page, spec)?,
            Operator::Test {
                scope,
                expression,
                autostop,
            } => {
                let program = program_for(&mut *ctx, &*page, expression)?;
                let text = expression.to_string();
                select::run_test(ctx, page, *scope, &program, &text, *autostop)?
            }
            Operator::NumberTest {
                scope,
                name,
                invert,
            } => select::run_number_test(page, *scope, name, *invert)?,
            Operator::Clip { head, tail, invert } => select::run_clip(page, *head, *tail, *invert),
            Operator::FClip { head, tail, invert } => {
                select::run_fclip(page, *head, *tail, *invert)
            }
            Operator::Sparse { interval, offset } => select::run_sparse(page, *interval, *offset),
            Operator::Sample { fraction } => select::run_sample(ctx, page, *fraction),
            Operator::Define {
                scope,
                name,
                expression,
                ..
            } => {
                let program = program_for(&mut *ctx, &*page, expression)?;
                define::run_define(ctx, page, *scope, name, &program, &expression.to_string())?;
                Flow::Continue
            }
            Operator::Evaluate {
                scope,
                name,
                source,
                ..
            } => {
                define::run_evaluate(ctx, page, *scope, name, source)?;
                Flow::Continue
            }
            Operator::RpnExpression { expression, repeat } => {
                if *repeat || !*ran {
                    let program = program_for(&mut *ctx, &*page, expression)?;
                    define::run_rpn_expression(ctx, &program, &expression.to_string())?;
                }
                Flow::Continue
            }
            Operator::ConvertUnits {
                scope,
                name,
                factor,
                ..
            } => {
                text::run_convert_units(page, *scope, name, *factor)?;
                Flow::Continue
            }
            Operator::Cast {
                scope,
                target,
                source,
                kind,
            } => {
                text::run_cast(ctx, page, *scope, target, source, *kind)?;
                Flow::Continue
            }
            Operator::Scan {
                scope,
                target,
                source,
                format,
                edit,
                ..
            } => {
                text::run_scan(ctx, page, *scope, target, source, format, edit.as_deref())?;
                Flow::Continue
            }
            Operator::Edit {
                scope,
                target,
                source,
                script,
                ..
            } => {
                text::run_edit(ctx, page, *scope, target, source, script)?;
                Flow::Continue
            }
            Operator::Print {
                scope,
                target,
                format,
                sources,
                ..
            } => {
                text::run_print(ctx, page, *scope, target, format, sources)?;
                Flow::Continue
            }
            Operator::Format(spec) => {
                text::run_format(ctx, page, spec)?;
                Flow::Continue
            }
            Operator::System {
                scope,
                target,
                source,
                ..
            } => {
                text::run_system(ctx, page, *scope, target, source)?;
                Flow::Continue
            }
            Operator::Process(spec) => {
                spec.run(ctx, page)?;
                Flow::Continue
            }
        };
        *ran = true;
        Ok(flow)
    }
}

/// Validate `op` against the output layout as it stands and add the items it creates.
fn declare(layout: &mut Layout, op: &mut Operator) -> Result<(), ProcessError> {
    match op {
        Operator::Require { .. } | Operator::Names { .. } => Ok(()),
        Operator::Match { scope, terms } => select::declare_match(layout, *scope, terms),
        Operator::Filter { scope, terms } => select::declare_filter(layout, *scope, terms),
        Operator::TimeFilter(spec) => select::declare_time_filter(layout, spec),
        Operator::Test { .. } => Ok(()),
        Operator::NumberTest { scope, name, .. } => {
            select::declare_number_test(layout, *scope, name)
        }
        Operator::Clip { .. } => Ok(()),
        Operator::FClip { head, tail, .. } => {
            if !(0.0..=1.0).contains(head) || !(0.0..=1.0).contains(tail) {
                return Err(ProcessError::Usage(format!(
                    "fclip fractions {head},{tail} must be within [0, 1]"
                )));
            }
            Ok(())
        }
        Operator::Sparse { interval, .. } => select::declare_trim(*interval, None),
        Operator::Sample { fraction } => select::declare_trim(1, Some(*fraction)),
        Operator::Define {
            scope,
            name,
            redefine,
            definition,
            ..
        } => define::declare_define(layout, *scope, name, *redefine, definition),
        Operator::Evaluate {
            scope,
            name,
            source,
            definition,
        } => define::declare_evaluate(layout, *scope, name, source, definition),
        Operator::RpnExpression { .. } => Ok(()),
        Operator::ConvertUnits {
            scope,
            name,
            new_units,
            old_units,
            ..
        } => text::declare_convert_units(layout, *scope, name, new_units, old_units),
        Operator::Cast {
            scope,
            target,
            source,
            kind,
        } => text::declare_cast(layout, *scope, target, source, *kind),
        Operator::Scan {
            scope,
            target,
            source,
            edit,
            definition,
            ..
        } => text::declare_scan(layout, *scope, target, source, edit.as_deref(), definition),
        Operator::Edit {
            scope,
            target,
            source,
            script,
            reedit,
            definition,
        } => text::declare_edit(layout, *scope, target, source, script, *reedit, definition),
        Operator::Print {
            scope,
            target,
            sources,
            reprint,
            definition,
            ..
        } => text::declare_print(layout, *scope, target, sources, *reprint, definition),
        Operator::Format(spec) => text::declare_format(layout, spec),
        Operator::System {
            scope,
            target,
            source,
            definition,
        } => text::declare_system(layout, *scope, target, source, definition),
        Operator::Process(spec) => spec.declare(layout),
    }
}

fn requirement_met(layout: &Layout, present: bool, items: &[ItemRef]) -> bool {
    items
        .iter()
        .all(|item| layout.find(item.class, &item.name).is_some() == present)
}

fn patterns(texts: &[String]) -> Result<Vec<WildcardPattern>, ProcessError> {
    texts
        .iter()
        .map(|text| WildcardPattern::new(text).map_err(ProcessError::from))
        .collect()
}

fn schema_options(operators: &[Operator]) -> Result<SchemaOptions, ProcessError> {
    let mut options = SchemaOptions::default();
    for op in operators {
        let Operator::Names { class, action } = op else {
            continue;
        };
        let names: &mut NameOptions = options.for_class_mut(*class);
        match action {
            NameAction::Delete(texts) => names.deletes.extend(patterns(texts)?),
            NameAction::Retain(texts) => names.retains.extend(patterns(texts)?),
            NameAction::Rename(pairs) => names.renames.extend(pairs.iter().cloned()),
            NameAction::Edit { pattern, script } => names
                .edits
                .push((WildcardPattern::new(pattern)?, script.clone())),
        }
    }
    Ok(options)
}

/// A validated operator list bound to one input layout.
pub struct Pipeline {
    layout: Arc<Layout>,
    mapping: SchemaMapping,
    steps: Vec<Step>,
    ctx: Context,
    preconditions_met: bool,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("layout", &self.layout)
            .field("steps", &self.steps.len())
            .field("preconditions_met", &self.preconditions_met)
            .finish()
    }
}

impl Pipeline {
    pub fn new(
        input: &Layout,
        operators: Vec<Operator>,
        options: PipelineOptions,
    ) -> Result<Self, ProcessError> {
        let rpn = Rpn::with_seed(options.seed);
        Self::with_evaluator(input, operators, options, rpn)
    }

    /// Build on a caller-prepared evaluator (definitions files already loaded).
    pub fn with_evaluator(
        input: &Layout,
        operators: Vec<Operator>,
        options: PipelineOptions,
        rpn: Rpn,
    ) -> Result<Self, ProcessError> {
        let preconditions_met = operators.iter().all(|op| match op {
            Operator::Require { present, items } => requirement_met(input, *present, items),
            _ => true,
        });
        if !preconditions_met {
            info!("ifis/ifnot requirements not met; no output");
            return Ok(Self {
                layout: Arc::new(input.clone()),
                mapping: SchemaMapping::identity(input),
                steps: Vec::new(),
                ctx: Context::new(rpn, options),
                preconditions_met,
            });
        }

        let (mut layout, mapping) = schema_options(&operators)?.apply(input)?;
        for def in &mut layout.parameters {
            def.fixed_value = None;
        }
        if let Some(description) = &options.description {
            layout.description = Some(description.clone());
        }
        if let Some(order) = options.major_order {
            layout.major_order = order;
        }

        let mut operators = operators;
        for op in operators.iter_mut().filter(|op| !op.is_declarative()) {
            declare(&mut layout, op)?;
            debug!("declared: {op}");
        }

        let mut ctx = Context::new(rpn, options);
        ctx.bind_layout(&layout);
        let steps = operators
            .into_iter()
            .filter(|op| !op.is_declarative())
            .map(|op| {
                let expression = match Step::expression(&op) {
                    Some(expression) => Some(CompiledExpression::prepare(&mut ctx, expression)?),
                    None => None,
                };
                Ok(Step {
                    op,
                    expression,
                    ran: false,
                })
            })
            .collect::<Result<Vec<_>, ProcessError>>()?;

        Ok(Self {
            layout: Arc::new(layout),
            mapping,
            steps,
            ctx,
            preconditions_met,
        })
    }

    /// The output layout.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// False when an `ifis`/`ifnot` requirement failed: nothing should be written.
    pub fn preconditions_met(&self) -> bool {
        self.preconditions_met
    }

    pub fn evaluator(&self) -> &Rpn {
        &self.ctx.rpn
    }

    /// Run every operator on one input page.
    pub fn process_page(&mut self, input: &Page) -> Result<PageOutcome, ProcessError> {
        self.ctx.check_abort()?;
        let mut page = Page::conform(Arc::clone(&self.layout), input, &self.mapping);
        page.set_all_flags(true);
        let index = page.index();
        let warnings = self.ctx.options.warnings;
        if warnings && page.rows() == 0 && !self.layout.columns.is_empty() {
            warn!("no rows selected for page {index}");
        }
        self.ctx.begin_page(&page);

        let mut compact_pending = false;
        for step in &mut self.steps {
            if compact_pending {
                page.compact();
                compact_pending = false;
            }
            self.ctx.set_row_count(page.rows());
            self.ctx.bind_parameters(&page);
            if page.rows() == 0 && step.op.selects_rows() {
                continue;
            }
            match step.run(&mut self.ctx, &mut page)? {
                Flow::Continue => {}
                Flow::RowsChanged => {
                    compact_pending = true;
                    if warnings && page.count_selected() == 0 {
                        warn!("no rows selected for page {index}");
                    }
                }
                Flow::SkipPage => {
                    debug!("page {index} skipped by {}", step.op);
                    return Ok(PageOutcome::Skip);
                }
                Flow::Stop => {
                    info!("page {index} stopped processing ({})", step.op);
                    return Ok(PageOutcome::Stop);
                }
            }
        }
        page.compact();
        Ok(PageOutcome::Emit(page))
    }

    /// Flush files the evaluator opened.
    pub fn finish(&mut self) -> Result<(), ProcessError> {
        self.ctx
            .rpn
            .flush_files()
            .map_err(|err| ProcessError::eval("file flush", err))
    }
}

/// Stream every page of `reader` through `pipeline` into `writer`.
///
/// Writes nothing when the pipeline's `ifis`/`ifnot` requirements failed.
pub fn run<R, W>(
    reader: &mut R,
    writer: &mut W,
    pipeline: &mut Pipeline,
) -> Result<RunSummary, ProcessError>
where
    R: PageReader + ?Sized,
    W: PageWriter + ?Sized,
{
    let mut summary = RunSummary::default();
    if !pipeline.preconditions_met() {
        reader.close()?;
        return Ok(summary);
    }
    writer.write_layout(pipeline.layout())?;
    while let Some(page) = reader.read_page()? {
        pipeline.ctx.check_abort()?;
        summary.pages_read += 1;
        match pipeline.process_page(&page)? {
            PageOutcome::Emit(out) => {
                writer.write_full_page(&out)?;
                summary.pages_written += 1;
                info!("page {} written with {} row(s)", out.index(), out.rows());
            }
            PageOutcome::Skip => {}
            PageOutcome::Stop => {
                summary.stopped_by_autostop = true;
                break;
            }
        }
    }
    writer.close()?;
    reader.close()?;
    pipeline.finish()?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::{Scope, TimeFilter};
    use pretty_assertions::assert_eq;
    use sdds_model::{ColumnData, Definition, ItemClass, Kind};

    fn input() -> Layout {
        let mut layout = Layout::new();
        layout
            .define(ItemClass::Column, Definition::new("t", Kind::Double))
            .expect("t");
        layout
            .define(ItemClass::Parameter, Definition::new("run", Kind::Long))
            .expect("run");
        layout
    }

    #[test]
    fn failed_requirement_disables_the_pipeline() {
        let ops = vec![Operator::Require {
            present: true,
            items: vec![ItemRef {
                class: ItemClass::Column,
                name: "missing".into(),
            }],
        }];
        let pipeline = Pipeline::new(&input(), ops, PipelineOptions::default()).expect("build");
        assert!(!pipeline.preconditions_met());

        let ops = vec![Operator::Require {
            present: false,
            items: vec![ItemRef {
                class: ItemClass::Column,
                name: "missing".into(),
            }],
        }];
        let pipeline = Pipeline::new(&input(), ops, PipelineOptions::default()).expect("build");
        assert!(pipeline.preconditions_met());
    }

    #[test]
    fn renames_apply_before_other_operators_declare() {
        let ops = vec![
            Operator::Define {
                scope: Scope::Column,
                name: "t2".into(),
                expression: Expression::rpn("time 2 *"),
                redefine: false,
                definition: Default::default(),
            },
            Operator::Names {
                class: ItemClass::Column,
                action: NameAction::Rename(vec![("t".into(), "time".into())]),
            },
        ];
        let pipeline = Pipeline::new(&input(), ops, PipelineOptions::default()).expect("build");
        assert_eq!(pipeline.layout().names(ItemClass::Column), ["time", "t2"]);
    }

    #[test]
    fn declaration_errors_surface_before_any_page() {
        let ops = vec![Operator::TimeFilter(TimeFilter {
            scope: Scope::Column,
            name: "nope".into(),
            before: None,
            after: None,
            invert: false,
        })];
        let err = Pipeline::new(&input(), ops, PipelineOptions::default()).expect_err("missing");
        assert_eq!(err.category(), "SchemaError");
    }

    #[test]
    fn selection_compacts_before_the_next_operator() {
        let ops = vec![
            Operator::Sparse {
                interval: 2,
                offset: 0,
            },
            Operator::Define {
                scope: Scope::Column,
                name: "row".into(),
                expression: Expression::rpn("i_row"),
                redefine: false,
                definition: Default::default(),
            },
        ];
        let mut pipeline =
            Pipeline::new(&input(), ops, PipelineOptions::default()).expect("build");
        let mut page = Page::new(Arc::new(input()), 5);
        page.set_column("t", ColumnData::Double(vec![0.0, 1.0, 2.0, 3.0, 4.0]))
            .expect("t");
        let PageOutcome::Emit(out) = pipeline.process_page(&page).expect("page") else {
            panic!("page not emitted");
        };
        assert_eq!(out.column("t"), Some(&ColumnData::Double(vec![0.0, 2.0, 4.0])));
        assert_eq!(out.column("row"), Some(&ColumnData::Double(vec![0.0, 1.0, 2.0])));
    }
}
