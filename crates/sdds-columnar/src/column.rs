use crate::bitmap::BitVec;
use crate::types::{ConvertError, Kind, Value};

/// A typed column vector. Every variant stores one value per row.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnData {
    Byte(Vec<i8>),
    Short(Vec<i16>),
    UShort(Vec<u16>),
    Long(Vec<i32>),
    ULong(Vec<u32>),
    Long64(Vec<i64>),
    ULong64(Vec<u64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    LongDouble(Vec<f64>),
    String(Vec<String>),
    Character(Vec<u8>),
}

macro_rules! each_variant {
    ($self:expr, $v:ident => $body:expr) => {
        match $self {
            ColumnData::Byte($v) => $body,
            ColumnData::Short($v) => $body,
            ColumnData::UShort($v) => $body,
            ColumnData::Long($v) => $body,
            ColumnData::ULong($v) => $body,
            ColumnData::Long64($v) => $body,
            ColumnData::ULong64($v) => $body,
            ColumnData::Float($v) => $body,
            ColumnData::Double($v) => $body,
            ColumnData::LongDouble($v) => $body,
            ColumnData::String($v) => $body,
            ColumnData::Character($v) => $body,
        }
    };
}

impl ColumnData {
    /// A column of `rows` default values (zero, empty string or NUL).
    pub fn with_len(kind: Kind, rows: usize) -> Self {
        match kind {
            Kind::Byte => ColumnData::Byte(vec![0; rows]),
            Kind::Short => ColumnData::Short(vec![0; rows]),
            Kind::UShort => ColumnData::UShort(vec![0; rows]),
            Kind::Long => ColumnData::Long(vec![0; rows]),
            Kind::ULong => ColumnData::ULong(vec![0; rows]),
            Kind::Long64 => ColumnData::Long64(vec![0; rows]),
            Kind::ULong64 => ColumnData::ULong64(vec![0; rows]),
            Kind::Float => ColumnData::Float(vec![0.0; rows]),
            Kind::Double => ColumnData::Double(vec![0.0; rows]),
            Kind::LongDouble => ColumnData::LongDouble(vec![0.0; rows]),
            Kind::String => ColumnData::String(vec![String::new(); rows]),
            Kind::Character => ColumnData::Character(vec![0; rows]),
        }
    }

    pub fn kind(&self) -> Kind {
        match self {
            ColumnData::Byte(_) => Kind::Byte,
            ColumnData::Short(_) => Kind::Short,
            ColumnData::UShort(_) => Kind::UShort,
            ColumnData::Long(_) => Kind::Long,
            ColumnData::ULong(_) => Kind::ULong,
            ColumnData::Long64(_) => Kind::Long64,
            ColumnData::ULong64(_) => Kind::ULong64,
            ColumnData::Float(_) => Kind::Float,
            ColumnData::Double(_) => Kind::Double,
            ColumnData::LongDouble(_) => Kind::LongDouble,
            ColumnData::String(_) => Kind::String,
            ColumnData::Character(_) => Kind::Character,
        }
    }

    pub fn len(&self) -> usize {
        each_variant!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, row: usize) -> Option<Value> {
        Some(match self {
            ColumnData::Byte(v) => Value::Byte(*v.get(row)?),
            ColumnData::Short(v) => Value::Short(*v.get(row)?),
            ColumnData::UShort(v) => Value::UShort(*v.get(row)?),
            ColumnData::Long(v) => Value::Long(*v.get(row)?),
            ColumnData::ULong(v) => Value::ULong(*v.get(row)?),
            ColumnData::Long64(v) => Value::Long64(*v.get(row)?),
            ColumnData::ULong64(v) => Value::ULong64(*v.get(row)?),
            ColumnData::Float(v) => Value::Float(*v.get(row)?),
            ColumnData::Double(v) => Value::Double(*v.get(row)?),
            ColumnData::LongDouble(v) => Value::LongDouble(*v.get(row)?),
            ColumnData::String(v) => Value::String(v.get(row)?.clone()),
            ColumnData::Character(v) => Value::Character(*v.get(row)?),
        })
    }

    /// Store `value` at `row`, converting it to the column's kind.
    ///
    /// Panics in debug builds if `row` is out of bounds; callers size columns from the
    /// page row count.
    pub fn set(&mut self, row: usize, value: &Value) -> Result<(), ConvertError> {
        let value = value.cast(self.kind())?;
        match (self, value) {
            (ColumnData::Byte(v), Value::Byte(x)) => v[row] = x,
            (ColumnData::Short(v), Value::Short(x)) => v[row] = x,
            (ColumnData::UShort(v), Value::UShort(x)) => v[row] = x,
            (ColumnData::Long(v), Value::Long(x)) => v[row] = x,
            (ColumnData::ULong(v), Value::ULong(x)) => v[row] = x,
            (ColumnData::Long64(v), Value::Long64(x)) => v[row] = x,
            (ColumnData::ULong64(v), Value::ULong64(x)) => v[row] = x,
            (ColumnData::Float(v), Value::Float(x)) => v[row] = x,
            (ColumnData::Double(v), Value::Double(x)) => v[row] = x,
            (ColumnData::LongDouble(v), Value::LongDouble(x)) => v[row] = x,
            (ColumnData::String(v), Value::String(x)) => v[row] = x,
            (ColumnData::Character(v), Value::Character(x)) => v[row] = x,
            (col, value) => {
                return Err(ConvertError::Incompatible {
                    from: value.kind(),
                    to: col.kind(),
                })
            }
        }
        Ok(())
    }

    pub fn push(&mut self, value: &Value) -> Result<(), ConvertError> {
        let row = self.len();
        self.resize(row + 1);
        self.set(row, value)
    }

    /// Grow or shrink to `rows`, filling with default values.
    pub fn resize(&mut self, rows: usize) {
        match self {
            ColumnData::Byte(v) => v.resize(rows, 0),
            ColumnData::Short(v) => v.resize(rows, 0),
            ColumnData::UShort(v) => v.resize(rows, 0),
            ColumnData::Long(v) => v.resize(rows, 0),
            ColumnData::ULong(v) => v.resize(rows, 0),
            ColumnData::Long64(v) => v.resize(rows, 0),
            ColumnData::ULong64(v) => v.resize(rows, 0),
            ColumnData::Float(v) => v.resize(rows, 0.0),
            ColumnData::Double(v) => v.resize(rows, 0.0),
            ColumnData::LongDouble(v) => v.resize(rows, 0.0),
            ColumnData::String(v) => v.resize(rows, String::new()),
            ColumnData::Character(v) => v.resize(rows, 0),
        }
    }

    /// Values as doubles. Strings that do not parse become NaN.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            ColumnData::Double(v) | ColumnData::LongDouble(v) => v.clone(),
            ColumnData::String(v) => v
                .iter()
                .map(|s| crate::types::parse_number(s).unwrap_or(f64::NAN))
                .collect(),
            other => (0..other.len())
                .map(|i| {
                    other
                        .get(i)
                        .and_then(|v| v.to_f64().ok())
                        .unwrap_or(f64::NAN)
                })
                .collect(),
        }
    }

    /// Values in canonical text form.
    pub fn to_strings(&self) -> Vec<String> {
        match self {
            ColumnData::String(v) => v.clone(),
            other => (0..other.len())
                .filter_map(|i| other.get(i).map(|v| v.to_text()))
                .collect(),
        }
    }

    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            ColumnData::String(v) => Some(v),
            _ => None,
        }
    }

    /// Build a column of `kind` from doubles, converting each value.
    pub fn from_f64s(kind: Kind, values: &[f64]) -> Result<Self, ConvertError> {
        if kind == Kind::Double {
            return Ok(ColumnData::Double(values.to_vec()));
        }
        let mut out = ColumnData::with_len(kind, values.len());
        for (i, v) in values.iter().enumerate() {
            out.set(i, &Value::from_f64(kind, *v)?)?;
        }
        Ok(out)
    }

    pub fn from_values(kind: Kind, values: &[Value]) -> Result<Self, ConvertError> {
        let mut out = ColumnData::with_len(kind, values.len());
        for (i, v) in values.iter().enumerate() {
            out.set(i, v)?;
        }
        Ok(out)
    }

    /// Convert every element to `kind`.
    pub fn cast(&self, kind: Kind) -> Result<Self, ConvertError> {
        if self.kind() == kind {
            return Ok(self.clone());
        }
        let mut out = ColumnData::with_len(kind, self.len());
        for i in 0..self.len() {
            if let Some(v) = self.get(i) {
                out.set(i, &v)?;
            }
        }
        Ok(out)
    }

    /// Keep only the rows whose flag is set.
    pub fn compact(&mut self, keep: &BitVec) {
        debug_assert_eq!(keep.len(), self.len(), "row flag length mismatch");
        each_variant!(self, v => {
            let mut row = 0usize;
            v.retain(|_| {
                let k = keep.get(row);
                row += 1;
                k
            });
        })
    }

    /// Rows `start..start+len`, clamped.
    pub fn slice(&self, start: usize, len: usize) -> Self {
        let end = start.saturating_add(len).min(self.len());
        let start = start.min(end);
        let mut out = self.clone();
        each_variant!(&mut out, v => *v = v[start..end].to_vec());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn compact_keeps_flagged_rows_in_order() {
        let mut col = ColumnData::Double(vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        col.compact(&BitVec::from_bools([true, false, true, false, true]));
        assert_eq!(col, ColumnData::Double(vec![0.0, 2.0, 4.0]));

        let mut names = ColumnData::String(vec!["a".into(), "b".into(), "c".into()]);
        names.compact(&BitVec::from_bools([false, true, false]));
        assert_eq!(names, ColumnData::String(vec!["b".into()]));
    }

    #[test]
    fn set_converts_to_column_kind() {
        let mut col = ColumnData::with_len(Kind::Long, 2);
        col.set(1, &Value::Double(7.9)).expect("set");
        assert_eq!(col.get(1), Some(Value::Long(7)));
        assert!(col.set(0, &Value::Double(1e12)).is_err());
    }

    #[test]
    fn string_columns_expose_doubles() {
        let col = ColumnData::String(vec!["1".into(), "x".into(), "2.5".into()]);
        let values = col.to_f64_vec();
        assert_eq!(values[0], 1.0);
        assert!(values[1].is_nan());
        assert_eq!(values[2], 2.5);
    }

    #[test]
    fn slice_is_clamped() {
        let col = ColumnData::Short(vec![1, 2, 3, 4]);
        assert_eq!(col.slice(1, 2), ColumnData::Short(vec![2, 3]));
        assert_eq!(col.slice(3, 10), ColumnData::Short(vec![4]));
        assert_eq!(col.slice(9, 1), ColumnData::Short(vec![]));
    }
}
