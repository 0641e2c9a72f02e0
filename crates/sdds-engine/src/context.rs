use std::collections::HashMap;

use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sdds_model::{ColumnData, Kind, Layout, Page, Value};
use sdds_rpn::{infix_to_postfix, EvalError, Program, Rpn};

use crate::error::ProcessError;
use crate::operator::{Expression, ExpressionSource};
use crate::options::PipelineOptions;
use crate::process::Reducer;

/// A memory cell bound to one layout item.
#[derive(Clone, Copy, Debug)]
struct Binding {
    item: usize,
    memory: usize,
    is_string: bool,
}

#[derive(Clone, Copy, Debug)]
struct Implicit {
    i_page: usize,
    table_number: usize,
    n_rows: usize,
    i_row: usize,
}

/// One column's values, prepared once per operator for row-by-row binding.
pub(crate) enum RowSource<'a> {
    Num(Vec<f64>),
    Str(&'a [String]),
    Chars(Vec<String>),
}

/// Evaluator state and shared services for the lifetime of a pipeline.
pub(crate) struct Context {
    pub rpn: Rpn,
    pub rng: StdRng,
    pub reducer: Reducer,
    pub options: PipelineOptions,
    implicit: Implicit,
    parameters: Vec<Binding>,
    columns: Vec<Binding>,
}

impl Context {
    pub fn new(mut rpn: Rpn, options: PipelineOptions) -> Self {
        let rng = match options.seed {
            Some(seed) => {
                rpn.reseed(seed);
                StdRng::seed_from_u64(seed)
            }
            None => StdRng::from_entropy(),
        };
        let implicit = Implicit {
            i_page: Self::implicit_index(&mut rpn, "i_page"),
            table_number: Self::implicit_index(&mut rpn, "table_number"),
            n_rows: Self::implicit_index(&mut rpn, "n_rows"),
            i_row: Self::implicit_index(&mut rpn, "i_row"),
        };
        let reducer = Reducer::new(options.threads);
        Self {
            rpn,
            rng,
            reducer,
            options,
            implicit,
            parameters: Vec::new(),
            columns: Vec::new(),
        }
    }

    fn implicit_index(rpn: &mut Rpn, name: &str) -> usize {
        match rpn.memory_index(name) {
            Some(index) => index,
            // Always present in a fresh evaluator; recreate if a caller replaced it.
            None => rpn.set_memory(name, 0.0).unwrap_or_default(),
        }
    }

    /// Create a memory for every parameter and column of `layout`.
    ///
    /// Items whose names collide with builtins, UDFs or a memory of the other type are not
    /// bound; expressions cannot address them by name.
    pub fn bind_layout(&mut self, layout: &Layout) {
        self.parameters = Self::bindings(&mut self.rpn, &layout.parameters, "parameter");
        self.columns = Self::bindings(&mut self.rpn, &layout.columns, "column");
    }

    fn bindings(rpn: &mut Rpn, defs: &[sdds_model::Definition], class: &str) -> Vec<Binding> {
        defs.iter()
            .enumerate()
            .filter_map(|(item, def)| {
                let is_string = def.kind == Kind::String;
                match rpn.create_memory(&def.name, is_string) {
                    Ok(memory) => Some(Binding {
                        item,
                        memory,
                        is_string,
                    }),
                    Err(err) => {
                        debug!("{class} `{}` not bound to a memory: {err}", def.name);
                        None
                    }
                }
            })
            .collect()
    }

    /// Refresh the page-level memories: page number, row count and every parameter.
    pub fn begin_page(&mut self, page: &Page) {
        let number = page.index() as f64;
        self.rpn.store_at(self.implicit.i_page, number);
        self.rpn.store_at(self.implicit.table_number, number);
        self.set_row_count(page.rows());
        self.bind_parameters(page);
    }

    pub fn set_row_count(&mut self, rows: usize) {
        self.rpn.store_at(self.implicit.n_rows, rows as f64);
    }

    pub fn bind_parameters(&mut self, page: &Page) {
        let values = page.parameters();
        for binding in &self.parameters {
            let Some(value) = values.get(binding.item) else {
                continue;
            };
            if binding.is_string {
                self.rpn
                    .store_str_at(binding.memory, value.as_str().unwrap_or_default());
            } else {
                self.rpn
                    .store_at(binding.memory, value.to_f64().unwrap_or(f64::NAN));
            }
        }
    }

    /// Column values in the form [`Context::bind_row`] consumes.
    pub fn row_sources<'a>(&self, page: &'a Page) -> Vec<RowSource<'a>> {
        let columns = page.columns();
        self.columns
            .iter()
            .map(|binding| match &columns[binding.item] {
                ColumnData::String(values) => RowSource::Str(values),
                data if binding.is_string => RowSource::Chars(data.to_strings()),
                data => RowSource::Num(data.to_f64_vec()),
            })
            .collect()
    }

    pub fn bind_row(&mut self, sources: &[RowSource<'_>], row: usize) {
        for (binding, source) in self.columns.iter().zip(sources) {
            match source {
                RowSource::Num(values) => self.rpn.store_at(binding.memory, values[row]),
                RowSource::Str(values) => self.rpn.store_str_at(binding.memory, &values[row]),
                RowSource::Chars(values) => self.rpn.store_str_at(binding.memory, &values[row]),
            }
        }
        self.rpn.store_at(self.implicit.i_row, row as f64);
    }

    pub fn check_abort(&self) -> Result<(), ProcessError> {
        if self.options.aborted() {
            return Err(ProcessError::Aborted("abort requested".into()));
        }
        Ok(())
    }

    /// Run `program` on cleared stacks and pop a numeric result.
    pub fn eval_numeric(&mut self, program: &Program) -> Result<f64, EvalError> {
        self.rpn.clear_stacks();
        self.rpn.execute(program)?;
        self.rpn.pop_numeric()
    }

    pub fn eval_logical(&mut self, program: &Program) -> Result<bool, EvalError> {
        self.rpn.clear_stacks();
        self.rpn.execute(program)?;
        self.rpn.pop_logical()
    }

    /// Run `program` and pop a result of `kind` from the matching stack.
    pub fn eval_value(&mut self, program: &Program, kind: Kind) -> Result<Value, EvalError> {
        self.rpn.clear_stacks();
        self.rpn.execute(program)?;
        if kind == Kind::String {
            Ok(Value::String(self.rpn.pop_string()?))
        } else {
            Ok(Value::Double(self.rpn.pop_numeric()?))
        }
    }

    /// Compile expression text, translating infix first when asked.
    pub fn compile(&mut self, text: &str, algebraic: bool) -> Result<Program, ProcessError> {
        let postfix = if algebraic {
            infix_to_postfix(text).map_err(|err| ProcessError::eval(text, err))?
        } else {
            text.to_string()
        };
        self.rpn
            .compile(&postfix)
            .map_err(|err| ProcessError::eval(text, err))
    }
}

/// An expression prepared for repeated execution.
///
/// Literal text is compiled once. Text taken from a parameter is compiled per page, or once
/// per distinct text when re-parsing is off.
#[derive(Debug, Default)]
pub(crate) struct CompiledExpression {
    literal: Option<Program>,
    cache: HashMap<String, Program>,
}

impl CompiledExpression {
    pub fn prepare(ctx: &mut Context, expression: &Expression) -> Result<Self, ProcessError> {
        let literal = match &expression.source {
            ExpressionSource::Literal(text) => Some(ctx.compile(text, expression.algebraic)?),
            ExpressionSource::Parameter(_) => None,
        };
        Ok(Self {
            literal,
            cache: HashMap::new(),
        })
    }

    /// The program to run on `page`.
    pub fn program(
        &mut self,
        ctx: &mut Context,
        expression: &Expression,
        page: &Page,
    ) -> Result<Program, ProcessError> {
        if let Some(program) = &self.literal {
            return Ok(program.clone());
        }
        let ExpressionSource::Parameter(name) = &expression.source else {
            return Err(ProcessError::Usage("expression was not prepared".into()));
        };
        let text = page
            .require_parameter(name)?
            .as_str()
            .ok_or_else(|| {
                ProcessError::wrong_kind(sdds_model::ItemClass::Parameter, name, "a string")
            })?
            .to_string();
        if !ctx.options.reparse_indirect_expressions {
            if let Some(program) = self.cache.get(&text) {
                return Ok(program.clone());
            }
        }
        let program = ctx.compile(&text, expression.algebraic)?;
        if !ctx.options.reparse_indirect_expressions {
            self.cache.insert(text, program.clone());
        }
        Ok(program)
    }
}
