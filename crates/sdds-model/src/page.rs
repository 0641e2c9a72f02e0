use std::ops::Range;
use std::sync::Arc;

use sdds_columnar::{BitVec, ColumnData, Kind, Value};

use crate::definition::{Definition, ItemClass};
use crate::error::PageError;
use crate::layout::Layout;
use crate::names::SchemaMapping;

/// The value of one array on one page.
#[derive(Clone, Debug, PartialEq)]
pub struct ArrayValue {
    pub dims: Vec<usize>,
    pub data: ColumnData,
}

impl ArrayValue {
    pub fn empty(kind: Kind, dimensions: usize) -> Self {
        Self {
            dims: vec![0; dimensions.max(1)],
            data: ColumnData::with_len(kind, 0),
        }
    }

    pub fn element_count(&self) -> usize {
        self.dims.iter().product()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
}

/// How a selection term combines with the flags already accumulated.
///
/// `negate_term` inverts the term before combining; `negate_result` inverts the combined
/// flag afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Logic {
    pub op: LogicOp,
    pub negate_term: bool,
    pub negate_result: bool,
}

impl Logic {
    pub const AND: Logic = Logic {
        op: LogicOp::And,
        negate_term: false,
        negate_result: false,
    };
    pub const OR: Logic = Logic {
        op: LogicOp::Or,
        negate_term: false,
        negate_result: false,
    };

    pub fn apply(self, acc: bool, term: bool) -> bool {
        let term = term != self.negate_term;
        let combined = match self.op {
            LogicOp::And => acc && term,
            LogicOp::Or => acc || term,
        };
        combined != self.negate_result
    }
}

/// One page: parameter values, arrays, columns and the row-selection flags.
///
/// Item storage follows the order of the page's [`Layout`].
#[derive(Clone, Debug)]
pub struct Page {
    layout: Arc<Layout>,
    parameters: Vec<Value>,
    arrays: Vec<ArrayValue>,
    columns: Vec<ColumnData>,
    rows: usize,
    row_flags: BitVec,
    index: usize,
}

fn default_parameter(def: &Definition) -> Value {
    def.fixed_value
        .as_deref()
        .and_then(|text| Value::parse(def.kind, text).ok())
        .unwrap_or_else(|| Value::zero(def.kind))
}

impl Page {
    /// A page with `rows` rows of default values, all rows selected.
    pub fn new(layout: Arc<Layout>, rows: usize) -> Self {
        let parameters = layout.parameters.iter().map(default_parameter).collect();
        let arrays = layout
            .arrays
            .iter()
            .map(|d| ArrayValue::empty(d.kind, d.dimensions))
            .collect();
        let columns = layout
            .columns
            .iter()
            .map(|d| ColumnData::with_len(d.kind, rows))
            .collect();
        Self {
            layout,
            parameters,
            arrays,
            columns,
            rows,
            row_flags: BitVec::with_len_all_true(rows),
            index: 1,
        }
    }

    /// Build a page of `layout` from `source`, carrying every item `mapping` traces back
    /// to the source. Items with no source get default values; values that cannot be
    /// converted to a changed kind are defaulted as well.
    pub fn conform(layout: Arc<Layout>, source: &Page, mapping: &SchemaMapping) -> Self {
        let mut page = Page::new(layout, source.rows);
        page.index = source.index;
        page.row_flags = source.row_flags.clone();

        let layout = Arc::clone(&page.layout);
        for (i, def) in layout.parameters.iter().enumerate() {
            if def.fixed_value.is_some() {
                continue;
            }
            let Some(from) = mapping.source_of(ItemClass::Parameter, &def.name) else {
                continue;
            };
            if let Some(value) = source.parameter(from) {
                if let Ok(v) = value.cast(def.kind) {
                    page.parameters[i] = v;
                }
            }
        }
        for (i, def) in layout.arrays.iter().enumerate() {
            let Some(from) = mapping.source_of(ItemClass::Array, &def.name) else {
                continue;
            };
            if let Some(array) = source.array(from) {
                if let Ok(data) = array.data.cast(def.kind) {
                    page.arrays[i] = ArrayValue {
                        dims: array.dims.clone(),
                        data,
                    };
                }
            }
        }
        for (i, def) in layout.columns.iter().enumerate() {
            let Some(from) = mapping.source_of(ItemClass::Column, &def.name) else {
                continue;
            };
            if let Some(column) = source.column(from) {
                if let Ok(data) = column.cast(def.kind) {
                    page.columns[i] = data;
                }
            }
        }
        page
    }

    pub fn layout(&self) -> &Arc<Layout> {
        &self.layout
    }

    /// 1-based page number within the stream.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    fn missing(class: ItemClass, name: &str) -> PageError {
        PageError::Missing {
            class,
            name: name.to_string(),
        }
    }

    pub fn parameters(&self) -> &[Value] {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        let i = self.layout.index_of(ItemClass::Parameter, name)?;
        self.parameters.get(i)
    }

    pub fn require_parameter(&self, name: &str) -> Result<&Value, PageError> {
        self.parameter(name)
            .ok_or_else(|| Self::missing(ItemClass::Parameter, name))
    }

    /// Store a parameter value, converting it to the declared kind.
    pub fn set_parameter(&mut self, name: &str, value: &Value) -> Result<(), PageError> {
        let i = self
            .layout
            .index_of(ItemClass::Parameter, name)
            .ok_or_else(|| Self::missing(ItemClass::Parameter, name))?;
        let kind = self.layout.parameters[i].kind;
        self.parameters[i] = value.cast(kind).map_err(|source| PageError::Convert {
            class: ItemClass::Parameter,
            name: name.to_string(),
            source,
        })?;
        Ok(())
    }

    pub fn columns(&self) -> &[ColumnData] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        let i = self.layout.index_of(ItemClass::Column, name)?;
        self.columns.get(i)
    }

    pub fn require_column(&self, name: &str) -> Result<&ColumnData, PageError> {
        self.column(name)
            .ok_or_else(|| Self::missing(ItemClass::Column, name))
    }

    /// Replace a column's data, converting it to the declared kind.
    pub fn set_column(&mut self, name: &str, data: ColumnData) -> Result<(), PageError> {
        let i = self
            .layout
            .index_of(ItemClass::Column, name)
            .ok_or_else(|| Self::missing(ItemClass::Column, name))?;
        if data.len() != self.rows {
            return Err(PageError::Length {
                class: ItemClass::Column,
                name: name.to_string(),
                expected: self.rows,
                found: data.len(),
            });
        }
        let kind = self.layout.columns[i].kind;
        self.columns[i] = data.cast(kind).map_err(|source| PageError::Convert {
            class: ItemClass::Column,
            name: name.to_string(),
            source,
        })?;
        Ok(())
    }

    pub fn set_column_value(
        &mut self,
        name: &str,
        row: usize,
        value: &Value,
    ) -> Result<(), PageError> {
        let i = self
            .layout
            .index_of(ItemClass::Column, name)
            .ok_or_else(|| Self::missing(ItemClass::Column, name))?;
        if row >= self.rows {
            return Err(PageError::Length {
                class: ItemClass::Column,
                name: name.to_string(),
                expected: self.rows,
                found: row + 1,
            });
        }
        self.columns[i]
            .set(row, value)
            .map_err(|source| PageError::Convert {
                class: ItemClass::Column,
                name: name.to_string(),
                source,
            })
    }

    pub fn array(&self, name: &str) -> Option<&ArrayValue> {
        let i = self.layout.index_of(ItemClass::Array, name)?;
        self.arrays.get(i)
    }

    pub fn arrays(&self) -> &[ArrayValue] {
        &self.arrays
    }

    pub fn set_array(&mut self, name: &str, value: ArrayValue) -> Result<(), PageError> {
        let i = self
            .layout
            .index_of(ItemClass::Array, name)
            .ok_or_else(|| Self::missing(ItemClass::Array, name))?;
        if value.element_count() != value.data.len() {
            return Err(PageError::Length {
                class: ItemClass::Array,
                name: name.to_string(),
                expected: value.element_count(),
                found: value.data.len(),
            });
        }
        let kind = self.layout.arrays[i].kind;
        let data = value.data.cast(kind).map_err(|source| PageError::Convert {
            class: ItemClass::Array,
            name: name.to_string(),
            source,
        })?;
        self.arrays[i] = ArrayValue {
            dims: value.dims,
            data,
        };
        Ok(())
    }

    pub fn row_flags(&self) -> &BitVec {
        &self.row_flags
    }

    pub fn set_all_flags(&mut self, value: bool) {
        self.row_flags.fill(value);
    }

    pub fn set_flag_range(&mut self, range: Range<usize>, value: bool) {
        self.row_flags.set_range(range, value);
    }

    /// Deselect every row whose bit in `mask` is clear.
    pub fn assert_flags(&mut self, mask: &BitVec) {
        self.row_flags.and_inplace(mask);
    }

    /// Combine `mask` into the current flags row by row.
    pub fn combine_flags(&mut self, mask: &BitVec, logic: Logic) {
        let combined: BitVec = self
            .row_flags
            .iter()
            .zip(mask.iter())
            .map(|(acc, term)| logic.apply(acc, term))
            .collect();
        self.row_flags = combined;
    }

    pub fn count_selected(&self) -> usize {
        self.row_flags.count_ones()
    }

    /// Physically remove deselected rows and reselect everything that remains.
    pub fn compact(&mut self) {
        if self.row_flags.all_true() {
            return;
        }
        for column in &mut self.columns {
            column.compact(&self.row_flags);
        }
        self.rows = self.row_flags.count_ones();
        self.row_flags = BitVec::with_len_all_true(self.rows);
    }
}
