use sdds_columnar::ConvertError;
use sdds_format::EditError;
use thiserror::Error;

use crate::definition::ItemClass;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("{class} `{name}` is already defined")]
    Duplicate { class: ItemClass, name: String },
    #[error("{class} `{name}` does not exist")]
    Missing { class: ItemClass, name: String },
    #[error("name management maps more than one {class} onto `{name}`")]
    Conflict { class: ItemClass, name: String },
    #[error("invalid name pattern `{pattern}`")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
    #[error("cannot edit {class} name `{name}`")]
    Edit {
        class: ItemClass,
        name: String,
        #[source]
        source: EditError,
    },
    #[error("unknown item class `{0}` (expected column, parameter or array)")]
    UnknownClass(String),
    #[error("unknown major order `{0}` (expected row or column)")]
    UnknownMajorOrder(String),
}

#[derive(Debug, Error)]
pub enum PageError {
    #[error("{class} `{name}` does not exist")]
    Missing { class: ItemClass, name: String },
    #[error("cannot store value in {class} `{name}`")]
    Convert {
        class: ItemClass,
        name: String,
        #[source]
        source: ConvertError,
    },
    #[error("{class} `{name}` has {found} element(s); expected {expected}")]
    Length {
        class: ItemClass,
        name: String,
        expected: usize,
        found: usize,
    },
}
