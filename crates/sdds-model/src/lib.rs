//! Dataset structure for SDDS files.
//!
//! - [`Definition`] / [`Layout`]: the schema (parameters, arrays, columns)
//! - [`Page`]: one page of data plus its row-selection flags
//! - [`WildcardPattern`]: name matching for every operator that takes name patterns
//! - [`SchemaOptions`]: delete/retain/rename/edit name management
//! - [`PageReader`] / [`PageWriter`]: the codec boundary

#![forbid(unsafe_code)]

mod codec;
mod definition;
mod error;
mod layout;
mod names;
mod page;
mod wildcard;

pub use crate::codec::{CodecError, PageReader, PageWriter};
pub use crate::definition::{Definition, Description, ItemClass, MajorOrder};
pub use crate::error::{PageError, SchemaError};
pub use crate::layout::Layout;
pub use crate::names::{NameOptions, SchemaMapping, SchemaOptions};
pub use crate::page::{ArrayValue, Logic, LogicOp, Page};
pub use crate::wildcard::{has_wildcards, WildcardPattern};

pub use sdds_columnar::{BitVec, ColumnData, ConvertError, Kind, Value};
