use pretty_assertions::assert_eq;
use proptest::prelude::*;
use sdds_columnar::{ColumnData, ConvertError, Kind, Value};

#[test]
fn every_numeric_kind_accepts_small_integers() {
    for kind in Kind::ALL.into_iter().filter(|k| k.is_numeric()) {
        let v = Value::from_f64(kind, 42.0).expect("42 fits every numeric kind");
        assert_eq!(v.kind(), kind);
        assert_eq!(v.to_f64().expect("numeric"), 42.0);
    }
}

#[test]
fn strings_cast_through_parsing() {
    assert_eq!(
        Value::from("  12 ").cast(Kind::Long).expect("parse"),
        Value::Long(12)
    );
    assert_eq!(
        Value::from("1.5e1").cast(Kind::Float).expect("parse"),
        Value::Float(15.0)
    );
    let err = Value::from("abc").cast(Kind::Double).expect_err("not a number");
    assert!(matches!(err, ConvertError::Parse { .. }), "{err}");
}

#[test]
fn numbers_cast_to_canonical_strings() {
    assert_eq!(
        Value::Short(-3).cast(Kind::String).expect("to string"),
        Value::from("-3")
    );
    assert_eq!(
        Value::Double(2.5).cast(Kind::String).expect("to string"),
        Value::from("2.5")
    );
}

#[test]
fn column_cast_reports_first_out_of_range_value() {
    let col = ColumnData::Double(vec![1.0, 300.0]);
    let err = col.cast(Kind::Byte).expect_err("300 does not fit i8");
    assert_eq!(
        err,
        ConvertError::OutOfRange {
            value: "300".into(),
            kind: Kind::Byte
        }
    );
}

proptest! {
    #[test]
    fn integer_to_double_is_exact(v in any::<i32>()) {
        let d = Value::Long(v).cast(Kind::Double).expect("cast");
        prop_assert_eq!(d, Value::Double(v as f64));
        let back = Value::Double(v as f64).cast(Kind::Long).expect("cast back");
        prop_assert_eq!(back, Value::Long(v));
    }

    #[test]
    fn double_text_round_trips(v in any::<f64>().prop_filter("finite", |v| v.is_finite())) {
        let text = Value::Double(v).to_text();
        let parsed = Value::parse(Kind::Double, &text).expect("parse canonical text");
        prop_assert_eq!(parsed, Value::Double(v));
    }
}
