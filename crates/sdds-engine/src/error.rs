use sdds_format::{EditError, FormatError, ScanError};
use sdds_model::{CodecError, ConvertError, ItemClass, PageError, SchemaError};
use sdds_rpn::EvalError;
use thiserror::Error;

/// Every failure the engine surfaces.
///
/// Per-row evaluator failures are not represented here: they produce NaN (or an empty string)
/// for the row and are counted instead.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("{label}: {message}")]
    Type { label: &'static str, message: String },
    #[error("{0}")]
    Range(String),
    #[error("evaluating `{expression}`: {source}")]
    Eval {
        expression: String,
        #[source]
        source: EvalError,
    },
    #[error(transparent)]
    Io(#[from] CodecError),
    #[error("command `{command}` failed: {message}")]
    Exec { command: String, message: String },
    #[error("{analysis} of column `{column}` has no samples and no default")]
    EmptyResult { analysis: String, column: String },
    #[error("processing aborted: {0}")]
    Aborted(String),
}

impl ProcessError {
    /// The taxonomy name of this error.
    pub fn category(&self) -> &'static str {
        match self {
            ProcessError::Usage(_) => "UsageError",
            ProcessError::Schema(_) => "SchemaError",
            ProcessError::Type { .. } => "TypeError",
            ProcessError::Range(_) => "RangeError",
            ProcessError::Eval { .. } => "EvalError",
            ProcessError::Io(_) => "IOError",
            ProcessError::Exec { .. } => "ExecError",
            ProcessError::EmptyResult { .. } => "EmptyResult",
            ProcessError::Aborted(_) => "Aborted",
        }
    }

    pub(crate) fn type_error(label: &'static str, message: impl Into<String>) -> Self {
        ProcessError::Type {
            label,
            message: message.into(),
        }
    }

    pub(crate) fn eval(expression: &str, source: EvalError) -> Self {
        ProcessError::Eval {
            expression: expression.to_string(),
            source,
        }
    }

    pub(crate) fn missing(class: ItemClass, name: &str) -> Self {
        ProcessError::Schema(SchemaError::Missing {
            class,
            name: name.to_string(),
        })
    }

    /// A conversion failure while storing row `row` (0-based) of `what`.
    pub(crate) fn row_conversion(err: ConvertError, what: &str, row: usize) -> Self {
        match ProcessError::from(err) {
            ProcessError::Range(message) => {
                ProcessError::Range(format!("{what}: row {}: {message}", row + 1))
            }
            other => other,
        }
    }

    pub(crate) fn wrong_kind(class: ItemClass, name: &str, expected: &str) -> Self {
        Self::type_error("TYPE_ERROR", format!("{class} `{name}` must be {expected}"))
    }
}

impl From<PageError> for ProcessError {
    fn from(err: PageError) -> Self {
        match err {
            PageError::Missing { class, name } => ProcessError::missing(class, &name),
            PageError::Convert { .. } => ProcessError::Range(err.to_string()),
            PageError::Length { .. } => ProcessError::type_error("TYPE_ERROR", err.to_string()),
        }
    }
}

impl From<ConvertError> for ProcessError {
    fn from(err: ConvertError) -> Self {
        match err {
            ConvertError::Parse { .. } => ProcessError::type_error("PARSE_ERROR", err.to_string()),
            ConvertError::Incompatible { .. } | ConvertError::UnknownKind(_) => {
                ProcessError::type_error("TYPE_ERROR", err.to_string())
            }
            ConvertError::OutOfRange { .. } => ProcessError::Range(err.to_string()),
        }
    }
}

impl From<FormatError> for ProcessError {
    fn from(err: FormatError) -> Self {
        ProcessError::type_error("FORMAT_ERROR", err.to_string())
    }
}

impl From<ScanError> for ProcessError {
    fn from(err: ScanError) -> Self {
        ProcessError::type_error("PARSE_ERROR", err.to_string())
    }
}

impl From<EditError> for ProcessError {
    fn from(err: EditError) -> Self {
        ProcessError::type_error("EDIT_ERROR", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdds_model::Kind;

    #[test]
    fn categories_follow_the_source_error() {
        let missing: ProcessError = PageError::Missing {
            class: ItemClass::Column,
            name: "x".into(),
        }
        .into();
        assert_eq!(missing.category(), "SchemaError");

        let range: ProcessError = ConvertError::OutOfRange {
            value: "1e40".into(),
            kind: Kind::Float,
        }
        .into();
        assert_eq!(range.category(), "RangeError");

        let parse: ProcessError = ConvertError::Parse {
            text: "x".into(),
            kind: Kind::Long,
        }
        .into();
        assert!(matches!(parse, ProcessError::Type { label: "PARSE_ERROR", .. }));
    }
}
