//! Typed storage for SDDS data.
//!
//! This crate covers the value model shared by every other crate in the workspace:
//! - [`Kind`]: the closed set of SDDS primitive kinds and their keywords
//! - [`Value`]: a tagged scalar with value-preserving conversions
//! - [`ColumnData`]: a typed vector (one variant per kind)
//! - [`BitVec`]: the row-flag bitmap used for row selection and compaction

#![forbid(unsafe_code)]

mod bitmap;
mod column;
mod types;

pub use crate::bitmap::BitVec;
pub use crate::column::ColumnData;
pub use crate::types::{parse_number, ConvertError, Kind, Value};
