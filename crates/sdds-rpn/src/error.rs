use std::fmt;
use std::path::PathBuf;

use sdds_format::FormatError;
use thiserror::Error;

/// The four value stacks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StackKind {
    Numeric,
    Logical,
    String,
    File,
}

impl fmt::Display for StackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StackKind::Numeric => "numeric",
            StackKind::Logical => "logical",
            StackKind::String => "string",
            StackKind::File => "file",
        })
    }
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("too few items on {stack} stack ({op})")]
    StackUnderflow { stack: StackKind, op: String },
    #[error("{stack} stack overflow (capacity {capacity})")]
    StackOverflow { stack: StackKind, capacity: usize },
    #[error("unknown token `{0}`")]
    UnknownToken(String),
    #[error("unterminated string literal in `{0}`")]
    UnterminatedString(String),
    #[error("unbalanced conditional in `{0}` (each `?` needs a matching `$`, with at most one `:`)")]
    UnbalancedConditional(String),
    #[error("`{0}` requires a memory name")]
    MissingMemoryName(&'static str),
    #[error("division by zero ({0})")]
    DivisionByZero(&'static str),
    #[error("argument {value} out of range for {op}")]
    Domain { op: &'static str, value: f64 },
    #[error("`{0}` is already a function or user-defined function name")]
    NameConflict(String),
    #[error("memory `{0}` holds a different type")]
    MemoryType(String),
    #[error("user-defined function `{0}` calls itself")]
    UdfCycle(String),
    #[error("invalid infix expression `{expression}`: {message}")]
    Infix { expression: String, message: String },
    #[error("file number {0} is not open")]
    BadFileNumber(i64),
    #[error("file registry is full")]
    TooManyFiles,
    #[error("cannot open `{path}`")]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("file number {number} is not open for {mode}")]
    FileMode { number: i64, mode: &'static str },
    #[error("command `{command}` failed")]
    Exec {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("command `{command}` produced no output")]
    ExecNoOutput { command: String },
    #[error("cannot read definitions file `{path}`")]
    Definitions {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}:{line}: definition failed")]
    DefinitionLine {
        path: PathBuf,
        line: usize,
        #[source]
        source: Box<EvalError>,
    },
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
