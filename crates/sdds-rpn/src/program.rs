use std::sync::Arc;

use crate::builtins::Builtin;

/// One compiled instruction.
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    PushNum(f64),
    PushStr(Arc<str>),
    Builtin(Builtin),
    /// Push the numeric memory with this index.
    Recall(usize),
    /// Push the string memory with this index.
    RecallStr(usize),
    /// Store the numeric top (without popping) into a memory.
    Store(usize),
    /// Store the string top (without popping) into a memory.
    StoreStr(usize),
    CallUdf(usize),
    /// A name that was neither a memory nor a UDF at compile time.
    Unknown(Arc<str>),
    /// `?`: pop a condition and jump to `target` when it is false.
    Branch { target: usize },
    /// `:`: jump to `target` (the matching `$`).
    Jump { target: usize },
    /// `$`
    EndIf,
}

/// Compiled RPN text.
#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub(crate) ops: Vec<Op>,
    pub(crate) source: Arc<str>,
}

impl Program {
    pub(crate) fn new(source: &str) -> Self {
        Self {
            ops: Vec::new(),
            source: Arc::from(source),
        }
    }

    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[inline]
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
