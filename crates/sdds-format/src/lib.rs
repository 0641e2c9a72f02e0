//! Text conversions shared by the SDDS operators and the expression evaluator.
//!
//! - [`sprintf`]: C-style formatted output over typed [`Arg`]s
//! - [`sscanf`] / [`sscanf_first`]: C-style scanning
//! - [`reformat_tokens`]: per-token reformatting used by the `format` operator
//! - [`edit_string`]: the cursor-based edit-script language

#![forbid(unsafe_code)]

mod edit;
mod printf;
mod reformat;
mod scanf;

pub use crate::edit::{edit_string, EditError};
pub use crate::printf::{sprintf, Arg, FormatError};
pub use crate::reformat::reformat_tokens;
pub use crate::scanf::{sscanf, sscanf_first, ScanError, Scanned};
