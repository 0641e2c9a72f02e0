//! Postfix expression evaluator.
//!
//! An [`Rpn`] context owns four stacks (numeric, logical, string, file), named memories,
//! user-defined functions and the files opened by the `open` builtin. Text is compiled to a
//! [`Program`] once and executed many times; `?`/`:`/`$` conditionals are resolved to jumps
//! at compile time.

#![forbid(unsafe_code)]

mod builtins;
mod compiler;
mod error;
mod files;
mod infix;
mod lexer;
mod memory;
mod program;
mod udf;
mod vm;

pub use crate::builtins::{is_reserved, Builtin, RESERVED};
pub use crate::error::{EvalError, StackKind};
pub use crate::files::{
    find_in_search_path, search_path_from_env, FileRegistry, FILE_CAPACITY, SEARCH_PATH_ENV,
};
pub use crate::infix::infix_to_postfix;
pub use crate::lexer::{tokenize, Token};
pub use crate::memory::{Memories, MemoryValue};
pub use crate::program::{Op, Program};
pub use crate::udf::{Udf, UdfTable};
pub use crate::vm::{
    lambert_w0, lambert_wm1, Rpn, IMPLICIT_MEMORIES, LOGICAL_STACK_CAPACITY,
    NUMERIC_STACK_CAPACITY, STRING_STACK_CAPACITY, FILE_STACK_CAPACITY,
};

/// Environment variable naming the default definitions file.
pub const DEFINITIONS_ENV: &str = "RPN_DEFNS";
