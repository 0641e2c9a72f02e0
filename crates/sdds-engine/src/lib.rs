//! Page-at-a-time processing of SDDS datasets.
//!
//! A [`Pipeline`] is built from the input [`Layout`](sdds_model::Layout) and an ordered list
//! of [`Operator`]s. Building it validates every operator against the evolving output
//! layout; [`Pipeline::process_page`] then runs one page through the operators and
//! [`run`] streams a whole reader into a writer.
//!
//! Row-selecting operators only narrow the page's row flags. The pipeline compacts the
//! page before the next operator and before emission, so every operator sees contiguous
//! rows.

#![forbid(unsafe_code)]

mod context;
mod define;
mod error;
mod operator;
mod options;
mod pipeline;
pub mod process;
mod select;
mod text;

pub use crate::error::ProcessError;
pub use crate::operator::{
    Bound, DefinitionSpec, Expression, ExpressionSource, FilterTerm, FormatSpec, ItemRef,
    MatchTerm, NameAction, Operator, Scope, TimeFilter,
};
pub use crate::options::PipelineOptions;
pub use crate::pipeline::{run, PageOutcome, Pipeline, RunSummary};
pub use crate::process::{Analysis, ProcessSpec, UnitsRule};
pub use crate::select::parse_time;
