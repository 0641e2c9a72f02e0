use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// The closed set of SDDS primitive kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Byte,
    Short,
    UShort,
    Long,
    ULong,
    Long64,
    ULong64,
    Float,
    Double,
    /// Extended precision; held as `f64` in memory.
    LongDouble,
    String,
    Character,
}

impl Kind {
    pub const ALL: [Kind; 12] = [
        Kind::Byte,
        Kind::Short,
        Kind::UShort,
        Kind::Long,
        Kind::ULong,
        Kind::Long64,
        Kind::ULong64,
        Kind::Float,
        Kind::Double,
        Kind::LongDouble,
        Kind::String,
        Kind::Character,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            Kind::Byte => "byte",
            Kind::Short => "short",
            Kind::UShort => "ushort",
            Kind::Long => "long",
            Kind::ULong => "ulong",
            Kind::Long64 => "long64",
            Kind::ULong64 => "ulong64",
            Kind::Float => "float",
            Kind::Double => "double",
            Kind::LongDouble => "longdouble",
            Kind::String => "string",
            Kind::Character => "character",
        }
    }

    pub fn is_numeric(self) -> bool {
        !matches!(self, Kind::String | Kind::Character)
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Kind::Byte
                | Kind::Short
                | Kind::UShort
                | Kind::Long
                | Kind::ULong
                | Kind::Long64
                | Kind::ULong64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, Kind::Float | Kind::Double | Kind::LongDouble)
    }

    /// Canonical storage size in bytes.
    pub fn size(self) -> usize {
        match self {
            Kind::Byte | Kind::Character => 1,
            Kind::Short | Kind::UShort => 2,
            Kind::Long | Kind::ULong | Kind::Float => 4,
            Kind::Long64 | Kind::ULong64 | Kind::Double => 8,
            Kind::LongDouble => 16,
            Kind::String => std::mem::size_of::<String>(),
        }
    }

    /// Inclusive integer bounds, as `f64`, for range checks.
    fn integer_bounds(self) -> Option<(f64, f64)> {
        Some(match self {
            Kind::Byte => (i8::MIN as f64, i8::MAX as f64),
            Kind::Short => (i16::MIN as f64, i16::MAX as f64),
            Kind::UShort => (0.0, u16::MAX as f64),
            Kind::Long => (i32::MIN as f64, i32::MAX as f64),
            Kind::ULong => (0.0, u32::MAX as f64),
            Kind::Long64 => (i64::MIN as f64, i64::MAX as f64),
            Kind::ULong64 => (0.0, u64::MAX as f64),
            _ => return None,
        })
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for Kind {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Kind::ALL
            .into_iter()
            .find(|k| k.keyword() == lower)
            .ok_or(ConvertError::UnknownKind(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConvertError {
    #[error("unknown data type `{0}`")]
    UnknownKind(String),
    #[error("value {value} is out of range for type {kind}")]
    OutOfRange { value: String, kind: Kind },
    #[error("cannot parse `{text}` as {kind}")]
    Parse { text: String, kind: Kind },
    #[error("cannot convert {from} to {to}")]
    Incompatible { from: Kind, to: Kind },
}

/// A tagged scalar holding exactly one SDDS primitive.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Byte(i8),
    Short(i16),
    UShort(u16),
    Long(i32),
    ULong(u32),
    Long64(i64),
    ULong64(u64),
    Float(f32),
    Double(f64),
    LongDouble(f64),
    String(String),
    Character(u8),
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Byte(_) => Kind::Byte,
            Value::Short(_) => Kind::Short,
            Value::UShort(_) => Kind::UShort,
            Value::Long(_) => Kind::Long,
            Value::ULong(_) => Kind::ULong,
            Value::Long64(_) => Kind::Long64,
            Value::ULong64(_) => Kind::ULong64,
            Value::Float(_) => Kind::Float,
            Value::Double(_) => Kind::Double,
            Value::LongDouble(_) => Kind::LongDouble,
            Value::String(_) => Kind::String,
            Value::Character(_) => Kind::Character,
        }
    }

    /// Default value of a kind: zero, the empty string or NUL.
    pub fn zero(kind: Kind) -> Value {
        match kind {
            Kind::String => Value::String(String::new()),
            Kind::Character => Value::Character(0),
            other => Value::from_f64_truncating(other, 0.0),
        }
    }

    /// Numeric view. Characters convert to their byte code; strings must parse.
    pub fn to_f64(&self) -> Result<f64, ConvertError> {
        Ok(match self {
            Value::Byte(v) => *v as f64,
            Value::Short(v) => *v as f64,
            Value::UShort(v) => *v as f64,
            Value::Long(v) => *v as f64,
            Value::ULong(v) => *v as f64,
            Value::Long64(v) => *v as f64,
            Value::ULong64(v) => *v as f64,
            Value::Float(v) => *v as f64,
            Value::Double(v) | Value::LongDouble(v) => *v,
            Value::Character(c) => *c as f64,
            Value::String(s) => parse_number(s).ok_or_else(|| ConvertError::Parse {
                text: s.clone(),
                kind: Kind::Double,
            })?,
        })
    }

    /// Build a value of `kind` from a float, checking integer ranges.
    ///
    /// Floating to integer conversion truncates toward zero; NaN and values outside the
    /// target range are rejected.
    pub fn from_f64(kind: Kind, value: f64) -> Result<Value, ConvertError> {
        if let Some((lo, hi)) = kind.integer_bounds() {
            let t = value.trunc();
            if !t.is_finite() || t < lo || t > hi {
                return Err(ConvertError::OutOfRange {
                    value: format_f64(value),
                    kind,
                });
            }
        }
        match kind {
            Kind::String => Ok(Value::String(format_f64(value))),
            Kind::Character => {
                let t = value.trunc();
                if !(0.0..=255.0).contains(&t) {
                    return Err(ConvertError::OutOfRange {
                        value: format_f64(value),
                        kind,
                    });
                }
                Ok(Value::Character(t as u8))
            }
            other => Ok(Value::from_f64_truncating(other, value)),
        }
    }

    fn from_f64_truncating(kind: Kind, value: f64) -> Value {
        match kind {
            Kind::Byte => Value::Byte(value as i8),
            Kind::Short => Value::Short(value as i16),
            Kind::UShort => Value::UShort(value as u16),
            Kind::Long => Value::Long(value as i32),
            Kind::ULong => Value::ULong(value as u32),
            Kind::Long64 => Value::Long64(value as i64),
            Kind::ULong64 => Value::ULong64(value as u64),
            Kind::Float => Value::Float(value as f32),
            Kind::Double => Value::Double(value),
            Kind::LongDouble => Value::LongDouble(value),
            Kind::String => Value::String(format_f64(value)),
            Kind::Character => Value::Character(value as u8),
        }
    }

    /// Convert to another kind using the value-preserving rules.
    pub fn cast(&self, kind: Kind) -> Result<Value, ConvertError> {
        if self.kind() == kind {
            return Ok(self.clone());
        }
        match (self, kind) {
            (Value::String(s), k) => Value::parse(k, s),
            (v, Kind::String) => Ok(Value::String(v.to_text())),
            // 64-bit integers do not survive a trip through f64; convert directly.
            (Value::Long64(v), k) if k.is_integer() => int_to_kind(*v as i128, k),
            (Value::ULong64(v), k) if k.is_integer() => int_to_kind(*v as i128, k),
            (v, k) => Value::from_f64(k, v.to_f64()?),
        }
    }

    /// Parse text into a value of `kind`.
    pub fn parse(kind: Kind, text: &str) -> Result<Value, ConvertError> {
        let parse_err = || ConvertError::Parse {
            text: text.to_string(),
            kind,
        };
        match kind {
            Kind::String => Ok(Value::String(text.to_string())),
            Kind::Character => Ok(Value::Character(text.bytes().next().unwrap_or(0))),
            k if k.is_integer() => {
                let trimmed = text.trim();
                if let Some(v) = parse_integer(trimmed) {
                    return int_to_kind(v, k);
                }
                let f = parse_number(trimmed).ok_or_else(parse_err)?;
                Value::from_f64(k, f)
            }
            k => {
                let f = parse_number(text).ok_or_else(parse_err)?;
                Value::from_f64(k, f)
            }
        }
    }

    /// Canonical textual form.
    pub fn to_text(&self) -> String {
        match self {
            Value::Byte(v) => v.to_string(),
            Value::Short(v) => v.to_string(),
            Value::UShort(v) => v.to_string(),
            Value::Long(v) => v.to_string(),
            Value::ULong(v) => v.to_string(),
            Value::Long64(v) => v.to_string(),
            Value::ULong64(v) => v.to_string(),
            Value::Float(v) => format_f32(*v),
            Value::Double(v) | Value::LongDouble(v) => format_f64(*v),
            Value::String(s) => s.clone(),
            Value::Character(c) => (*c as char).to_string(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

fn int_to_kind(v: i128, kind: Kind) -> Result<Value, ConvertError> {
    let out_of_range = || ConvertError::OutOfRange {
        value: v.to_string(),
        kind,
    };
    Ok(match kind {
        Kind::Byte => Value::Byte(i8::try_from(v).map_err(|_| out_of_range())?),
        Kind::Short => Value::Short(i16::try_from(v).map_err(|_| out_of_range())?),
        Kind::UShort => Value::UShort(u16::try_from(v).map_err(|_| out_of_range())?),
        Kind::Long => Value::Long(i32::try_from(v).map_err(|_| out_of_range())?),
        Kind::ULong => Value::ULong(u32::try_from(v).map_err(|_| out_of_range())?),
        Kind::Long64 => Value::Long64(i64::try_from(v).map_err(|_| out_of_range())?),
        Kind::ULong64 => Value::ULong64(u64::try_from(v).map_err(|_| out_of_range())?),
        other => Value::from_f64(other, v as f64)?,
    })
}

fn parse_integer(text: &str) -> Option<i128> {
    let (neg, body) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    if body.is_empty() {
        return None;
    }
    let magnitude = if let Some(hex) = body
        .strip_prefix("0x")
        .or_else(|| body.strip_prefix("0X"))
    {
        i128::from_str_radix(hex, 16).ok()?
    } else if body.bytes().all(|b| b.is_ascii_digit()) {
        body.parse::<i128>().ok()?
    } else {
        return None;
    };
    Some(if neg { -magnitude } else { magnitude })
}

/// Parse the canonical numeric forms: an optional sign, decimal or exponent notation,
/// `0x` hexadecimal integers and case-insensitive `nan`/`inf`/`infinity`.
///
/// Surrounding whitespace is ignored; anything else makes the text non-numeric.
pub fn parse_number(text: &str) -> Option<f64> {
    let t = text.trim();
    if t.is_empty() {
        return None;
    }
    if let Some(v) = parse_integer(t) {
        // Keep the sign of "-0".
        return Some(if v == 0 && t.starts_with('-') { -0.0 } else { v as f64 });
    }
    let (sign, body) = match t.as_bytes()[0] {
        b'-' => (-1.0, &t[1..]),
        b'+' => (1.0, &t[1..]),
        _ => (1.0, t),
    };
    let lower = body.to_ascii_lowercase();
    match lower.as_str() {
        "nan" => return Some(f64::NAN),
        "inf" | "infinity" => return Some(sign * f64::INFINITY),
        _ => {}
    }
    // Only digits, the decimal point and an exponent may remain.
    if !body
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
    {
        return None;
    }
    if !body.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return None;
    }
    body.parse::<f64>().ok().map(|v| sign * v)
}

/// Shortest round-trip text for a double.
pub(crate) fn format_f64(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let a = v.abs();
    if a != 0.0 && !(1e-5..1e16).contains(&a) {
        format!("{v:e}")
    } else {
        format!("{v}")
    }
}

fn format_f32(v: f32) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let a = v.abs();
    if a != 0.0 && !(1e-5..1e16).contains(&a) {
        format!("{v:e}")
    } else {
        format!("{v}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn kind_keywords_round_trip() {
        for kind in Kind::ALL {
            assert_eq!(kind.keyword().parse::<Kind>().expect("parse kind"), kind);
        }
        assert_eq!("DOUBLE".parse::<Kind>().expect("case-insensitive"), Kind::Double);
        assert!("quad".parse::<Kind>().is_err());
    }

    #[test]
    fn parse_number_accepts_canonical_forms() {
        assert_eq!(parse_number("42"), Some(42.0));
        assert_eq!(parse_number(" -1.5e3 "), Some(-1500.0));
        assert_eq!(parse_number("+.5"), Some(0.5));
        assert_eq!(parse_number("0x1F"), Some(31.0));
        assert_eq!(parse_number("-INF"), Some(f64::NEG_INFINITY));
        assert!(parse_number("NaN").expect("nan").is_nan());
        assert_eq!(parse_number("4x"), None);
        assert_eq!(parse_number("two"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("1e"), None);
    }

    #[test]
    fn float_to_integer_truncates_toward_zero() {
        assert_eq!(Value::Double(-2.7).cast(Kind::Long), Ok(Value::Long(-2)));
        assert_eq!(Value::Double(2.7).cast(Kind::Short), Ok(Value::Short(2)));
    }

    #[test]
    fn out_of_range_coercions_fail() {
        assert!(matches!(
            Value::Double(70000.0).cast(Kind::Short),
            Err(ConvertError::OutOfRange { .. })
        ));
        assert!(matches!(
            Value::Double(f64::NAN).cast(Kind::Long),
            Err(ConvertError::OutOfRange { .. })
        ));
        assert!(matches!(
            Value::Long(-1).cast(Kind::UShort),
            Err(ConvertError::OutOfRange { .. })
        ));
    }

    #[test]
    fn sixty_four_bit_integers_convert_exactly() {
        let big = Value::Long64(i64::MAX);
        assert_eq!(big.cast(Kind::ULong64), Ok(Value::ULong64(i64::MAX as u64)));
        assert_eq!(
            Value::parse(Kind::Long64, "9223372036854775807"),
            Ok(Value::Long64(i64::MAX))
        );
    }

    #[test]
    fn text_forms() {
        assert_eq!(Value::Double(1.0).to_text(), "1");
        assert_eq!(Value::Double(0.1).to_text(), "0.1");
        assert_eq!(Value::Double(1e300).to_text(), "1e300");
        assert_eq!(Value::Double(f64::NAN).to_text(), "nan");
        assert_eq!(Value::Character(b'A').to_text(), "A");
        assert_eq!(Value::Character(b'A').to_f64(), Ok(65.0));
    }
}
