use std::fmt;
use std::str::FromStr;

use sdds_columnar::Kind;

use crate::error::SchemaError;

/// The three kinds of named items a layout holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ItemClass {
    Column,
    Parameter,
    Array,
}

impl ItemClass {
    pub const ALL: [ItemClass; 3] = [ItemClass::Column, ItemClass::Parameter, ItemClass::Array];

    pub fn keyword(self) -> &'static str {
        match self {
            ItemClass::Column => "column",
            ItemClass::Parameter => "parameter",
            ItemClass::Array => "array",
        }
    }
}

impl fmt::Display for ItemClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for ItemClass {
    type Err = SchemaError;

    /// Accepts any unique prefix, case-insensitively (`col`, `param`, `a`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if !lower.is_empty() {
            for class in ItemClass::ALL {
                if class.keyword().starts_with(&lower) {
                    return Ok(class);
                }
            }
        }
        Err(SchemaError::UnknownClass(s.to_string()))
    }
}

/// Row-major or column-major hint passed to the codec.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MajorOrder {
    #[default]
    Row,
    Column,
}

impl FromStr for MajorOrder {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if !lower.is_empty() && "row".starts_with(&lower) {
            Ok(MajorOrder::Row)
        } else if !lower.is_empty() && "column".starts_with(&lower) {
            Ok(MajorOrder::Column)
        } else {
            Err(SchemaError::UnknownMajorOrder(s.to_string()))
        }
    }
}

/// Dataset-level description text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Description {
    pub text: Option<String>,
    pub contents: Option<String>,
}

/// The definition of one parameter, array or column.
#[derive(Clone, Debug, PartialEq)]
pub struct Definition {
    pub name: String,
    pub kind: Kind,
    pub symbol: Option<String>,
    pub units: Option<String>,
    pub description: Option<String>,
    pub format_string: Option<String>,
    /// Parameters only: a value fixed in the header instead of stored per page.
    pub fixed_value: Option<String>,
    /// Arrays only.
    pub dimensions: usize,
}

impl Definition {
    pub fn new(name: impl Into<String>, kind: Kind) -> Self {
        Self {
            name: name.into(),
            kind,
            symbol: None,
            units: None,
            description: None,
            format_string: None,
            fixed_value: None,
            dimensions: 1,
        }
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn with_format_string(mut self, format_string: impl Into<String>) -> Self {
        self.format_string = Some(format_string.into());
        self
    }

    pub fn units_or_empty(&self) -> &str {
        self.units.as_deref().unwrap_or("")
    }

    /// Look up a metadata field by its SDDS field name.
    ///
    /// Returns `None` for unknown field names; known fields that are unset render as "".
    pub fn field(&self, field: &str) -> Option<String> {
        let value = match field {
            "name" => Some(self.name.clone()),
            "symbol" => self.symbol.clone(),
            "units" => self.units.clone(),
            "description" => self.description.clone(),
            "format_string" => self.format_string.clone(),
            "type" => Some(self.kind.keyword().to_string()),
            "fixed_value" => self.fixed_value.clone(),
            _ => return None,
        };
        Some(value.unwrap_or_default())
    }
}
