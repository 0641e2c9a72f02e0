mod common;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use sdds_engine::{
    Bound, Expression, FilterTerm, Operator, PageOutcome, Pipeline, PipelineOptions, Scope,
};
use sdds_model::{Layout, Logic, Page};

use common::{column_f64, dataset, doubles, process, process_to_bytes, read_back};

fn filter(name: &str, lower: f64, upper: f64) -> Operator {
    Operator::Filter {
        scope: Scope::Column,
        terms: vec![FilterTerm {
            name: name.into(),
            lower: Bound::Value(lower),
            upper: Bound::Value(upper),
            logic: Logic::AND,
        }],
    }
}

fn define(name: &str, rpn: &str, redefine: bool) -> Operator {
    Operator::Define {
        scope: Scope::Column,
        name: name.into(),
        expression: Expression::rpn(rpn),
        redefine,
        definition: Default::default(),
    }
}

fn run_one(layout: &Layout, page: &Page, ops: Vec<Operator>) -> Page {
    let mut pipeline = Pipeline::new(layout, ops, PipelineOptions::default()).expect("pipeline");
    match pipeline.process_page(page).expect("page") {
        PageOutcome::Emit(page) => page,
        other => panic!("page not emitted: {other:?}"),
    }
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

proptest! {
    #[test]
    fn filters_only_ever_remove_rows(
        values in prop::collection::vec(-100.0f64..100.0, 0..60),
        a in -100.0f64..100.0,
        b in -100.0f64..100.0,
        c in -100.0f64..100.0,
        d in -100.0f64..100.0,
    ) {
        let (lo1, hi1) = ordered(a, b);
        let (lo2, hi2) = ordered(c, d);
        let (layout, page) = dataset(&[("x", doubles(values.iter().copied()))], &[]);

        let once = run_one(&layout, &page, vec![filter("x", lo1, hi1)]);
        let twice = run_one(&layout, &page, vec![filter("x", lo1, hi1), filter("x", lo2, hi2)]);

        let expected: Vec<f64> = values.iter().copied().filter(|v| lo1 <= *v && *v <= hi1).collect();
        let kept = column_f64(&once, "x");
        prop_assert_eq!(&kept, &expected);
        prop_assert!(twice.rows() <= once.rows());
        for v in column_f64(&twice, "x") {
            prop_assert!(lo1 <= v && v <= hi1 && lo2 <= v && v <= hi2);
        }
    }

    #[test]
    fn sparse_keeps_every_nth_row(
        rows in 0usize..80,
        interval in 1usize..7,
        offset in 0usize..7,
    ) {
        let (layout, page) = dataset(&[("i", doubles((0..rows).map(|i| i as f64)))], &[]);
        let out = run_one(&layout, &page, vec![Operator::Sparse { interval, offset }]);
        let expected: Vec<f64> = (offset..rows).step_by(interval).map(|i| i as f64).collect();
        prop_assert_eq!(column_f64(&out, "i"), expected);
    }
}

#[test]
fn filter_and_redefine_do_not_commute() {
    let (layout, page) = dataset(&[("x", doubles([1.0, 3.0, 5.0, 7.0]))], &[]);
    let filter_first = run_one(
        &layout,
        &page,
        vec![filter("x", 0.0, 5.0), define("x", "x 10 *", true)],
    );
    let redefine_first = run_one(
        &layout,
        &page,
        vec![define("x", "x 10 *", true), filter("x", 0.0, 5.0)],
    );
    assert_eq!(column_f64(&filter_first, "x"), [10.0, 30.0, 50.0]);
    assert_eq!(redefine_first.rows(), 0);
}

#[test]
fn independent_defines_commute() {
    let (layout, page) = dataset(&[("x", doubles([1.0, 2.0, 4.0]))], &[]);
    let ab = run_one(
        &layout,
        &page,
        vec![define("a", "x 2 *", false), define("b", "x 3 +", false)],
    );
    let ba = run_one(
        &layout,
        &page,
        vec![define("b", "x 3 +", false), define("a", "x 2 *", false)],
    );
    for name in ["a", "b"] {
        assert_eq!(column_f64(&ab, name), column_f64(&ba, name));
    }
    assert_eq!(column_f64(&ab, "a"), [2.0, 4.0, 8.0]);
}

#[test]
fn passing_through_is_idempotent() {
    let (layout, first) = dataset(
        &[("x", doubles([0.5, -1.25, 1e-12])), ("y", doubles([1.0, 2.0, 3.0]))],
        &[],
    );
    let (_, second) = dataset(
        &[("x", doubles([4.0])), ("y", doubles([f64::MAX]))],
        &[],
    );
    let (bytes, summary) = process_to_bytes(&layout, vec![first, second], Vec::new());
    assert_eq!((summary.pages_read, summary.pages_written), (2, 2));

    let pages = read_back(&bytes);
    let layout_again = pages[0].layout().as_ref().clone();
    let (again, _) = process_to_bytes(&layout_again, pages, Vec::new());
    assert_eq!(String::from_utf8_lossy(&again), String::from_utf8_lossy(&bytes));
}

#[test]
fn row_order_survives_selection() {
    let (layout, page) = dataset(&[("x", doubles([9.0, 1.0, 8.0, 2.0, 7.0]))], &[]);
    let (pages, _) = process(&layout, vec![page], vec![filter("x", 2.0, 8.0)]);
    assert_eq!(column_f64(&pages[0], "x"), [8.0, 2.0, 7.0]);
}
