//! Row and page selection: match, filter, timeFilter, test, numberTest, clip, fclip,
//! sparse and sample.
//!
//! Column-scope selectors narrow the page's row flags and report
//! [`Flow::RowsChanged`]; parameter-scope selectors keep or skip the whole page.

use chrono::{Local, NaiveDate, TimeZone};
use log::debug;
use rand::Rng;
use sdds_columnar::parse_number;
use sdds_model::{BitVec, ItemClass, Layout, Logic, LogicOp, Page, WildcardPattern};
use sdds_rpn::Program;
use smallvec::SmallVec;

use crate::context::Context;
use crate::error::ProcessError;
use crate::operator::{Bound, FilterTerm, MatchTerm, Scope, TimeFilter};
use crate::pipeline::Flow;

/// Rows between abort-flag checks in row loops.
pub(crate) const ABORT_CHECK_INTERVAL: usize = 1024;

/// The first term of a list always ANDs with the flags already accumulated.
fn term_logic(index: usize, logic: Logic) -> Logic {
    if index == 0 {
        Logic {
            op: LogicOp::And,
            ..logic
        }
    } else {
        logic
    }
}

fn require_string_parameter<'p>(page: &'p Page, name: &str) -> Result<&'p str, ProcessError> {
    page.require_parameter(name)?
        .as_str()
        .ok_or_else(|| ProcessError::wrong_kind(ItemClass::Parameter, name, "a string"))
}

pub(crate) fn declare_match(
    layout: &Layout,
    scope: Scope,
    terms: &[MatchTerm],
) -> Result<(), ProcessError> {
    if terms.is_empty() {
        return Err(ProcessError::Usage("match needs at least one term".into()));
    }
    for term in terms {
        layout.require(scope.class(), &term.name)?;
        if term.indirect {
            let def = layout.require(ItemClass::Parameter, &term.pattern)?;
            if def.kind != sdds_model::Kind::String {
                return Err(ProcessError::wrong_kind(
                    ItemClass::Parameter,
                    &term.pattern,
                    "a string",
                ));
            }
        } else {
            WildcardPattern::new(&term.pattern)?;
        }
    }
    Ok(())
}

fn pattern_for(page: &Page, term: &MatchTerm) -> Result<WildcardPattern, ProcessError> {
    let text = if term.indirect {
        require_string_parameter(page, &term.pattern)?
    } else {
        term.pattern.as_str()
    };
    let pattern = if term.case_insensitive {
        WildcardPattern::case_insensitive(text)?
    } else {
        WildcardPattern::new(text)?
    };
    Ok(pattern)
}

pub(crate) fn run_match(
    page: &mut Page,
    scope: Scope,
    terms: &[MatchTerm],
) -> Result<Flow, ProcessError> {
    match scope {
        Scope::Column => {
            for (i, term) in terms.iter().enumerate() {
                let pattern = pattern_for(page, term)?;
                let mask: BitVec = page
                    .require_column(&term.name)?
                    .to_strings()
                    .iter()
                    .map(|text| pattern.is_match(text))
                    .collect();
                page.combine_flags(&mask, term_logic(i, term.logic));
            }
            Ok(Flow::RowsChanged)
        }
        Scope::Parameter => {
            let mut accept = true;
            for (i, term) in terms.iter().enumerate() {
                let pattern = pattern_for(page, term)?;
                let text = page.require_parameter(&term.name)?.to_text();
                accept = term_logic(i, term.logic).apply(accept, pattern.is_match(&text));
            }
            Ok(if accept { Flow::Continue } else { Flow::SkipPage })
        }
    }
}

pub(crate) fn declare_filter(
    layout: &Layout,
    scope: Scope,
    terms: &[FilterTerm],
) -> Result<(), ProcessError> {
    if terms.is_empty() {
        return Err(ProcessError::Usage("filter needs at least one term".into()));
    }
    for term in terms {
        let def = layout.require(scope.class(), &term.name)?;
        if !def.kind.is_numeric() {
            return Err(ProcessError::wrong_kind(scope.class(), &term.name, "numeric"));
        }
        for bound in [&term.lower, &term.upper] {
            if let Bound::Parameter(name) = bound {
                let def = layout.require(ItemClass::Parameter, name)?;
                if !def.kind.is_numeric() {
                    return Err(ProcessError::wrong_kind(ItemClass::Parameter, name, "numeric"));
                }
            }
        }
        if let (Bound::Value(lo), Bound::Value(hi)) = (&term.lower, &term.upper) {
            if hi < lo {
                return Err(ProcessError::Usage(format!(
                    "filter on {}: upper bound {hi} is below lower bound {lo}",
                    term.name
                )));
            }
        }
    }
    Ok(())
}

pub(crate) fn bound_value(page: &Page, bound: &Bound) -> Result<f64, ProcessError> {
    match bound {
        Bound::Value(v) => Ok(*v),
        Bound::Parameter(name) => Ok(page.require_parameter(name)?.to_f64()?),
    }
}

pub(crate) fn run_filter(
    page: &mut Page,
    scope: Scope,
    terms: &[FilterTerm],
) -> Result<Flow, ProcessError> {
    let bounds = terms
        .iter()
        .map(|term| Ok((bound_value(page, &term.lower)?, bound_value(page, &term.upper)?)))
        .collect::<Result<SmallVec<[(f64, f64); 4]>, ProcessError>>()?;
    match scope {
        Scope::Column => {
            for (i, (term, (lo, hi))) in terms.iter().zip(bounds).enumerate() {
                let mask: BitVec = page
                    .require_column(&term.name)?
                    .to_f64_vec()
                    .into_iter()
                    .map(|v| lo <= v && v <= hi)
                    .collect();
                page.combine_flags(&mask, term_logic(i, term.logic));
            }
            Ok(Flow::RowsChanged)
        }
        Scope::Parameter => {
            let mut accept = true;
            for (i, (term, (lo, hi))) in terms.iter().zip(bounds).enumerate() {
                let v = page.require_parameter(&term.name)?.to_f64()?;
                accept = term_logic(i, term.logic).apply(accept, lo <= v && v <= hi);
            }
            Ok(if accept { Flow::Continue } else { Flow::SkipPage })
        }
    }
}

/// Parse `YYYY/MM/DD[@HH[:MM[:SS]]]` in local time to epoch seconds.
///
/// Seconds may carry a fraction.
pub fn parse_time(text: &str) -> Result<f64, ProcessError> {
    let invalid = || ProcessError::Usage(format!("invalid time `{text}` (expected YYYY/MM/DD@HH:MM:SS)"));
    let (date, time) = match text.split_once('@') {
        Some((date, time)) => (date, Some(time)),
        None => (text, None),
    };
    let mut date_parts = date.trim().split('/').map(|p| p.trim().parse::<u32>());
    let (Some(Ok(year)), Some(Ok(month)), Some(Ok(day)), None) = (
        date_parts.next(),
        date_parts.next(),
        date_parts.next(),
        date_parts.next(),
    ) else {
        return Err(invalid());
    };
    let (mut hour, mut minute, mut seconds) = (0u32, 0u32, 0f64);
    if let Some(time) = time {
        let parts: Vec<&str> = time.trim().split(':').collect();
        if parts.len() > 3 {
            return Err(invalid());
        }
        hour = parts[0].trim().parse().map_err(|_| invalid())?;
        if let Some(m) = parts.get(1) {
            minute = m.trim().parse().map_err(|_| invalid())?;
        }
        if let Some(s) = parts.get(2) {
            seconds = s.trim().parse().map_err(|_| invalid())?;
        }
    }
    if !(0.0..60.0).contains(&seconds) {
        return Err(invalid());
    }
    let whole = seconds.trunc();
    let naive = NaiveDate::from_ymd_opt(year as i32, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, whole as u32))
        .ok_or_else(invalid)?;
    let local = Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(invalid)?;
    Ok(local.timestamp() as f64 + (seconds - whole))
}

pub(crate) fn declare_time_filter(layout: &Layout, spec: &TimeFilter) -> Result<(), ProcessError> {
    let def = layout.require(spec.scope.class(), &spec.name)?;
    if !def.kind.is_numeric() {
        return Err(ProcessError::wrong_kind(spec.scope.class(), &spec.name, "numeric"));
    }
    if let (Some(before), Some(after)) = (spec.before, spec.after) {
        if before < after {
            return Err(ProcessError::Usage(format!(
                "timeFilter on {}: `before` precedes `after`",
                spec.name
            )));
        }
    }
    Ok(())
}

fn in_time_window(spec: &TimeFilter, t: f64) -> bool {
    let inside =
        spec.after.map_or(true, |after| t >= after) && spec.before.map_or(true, |before| t <= before);
    inside != spec.invert
}

pub(crate) fn run_time_filter(page: &mut Page, spec: &TimeFilter) -> Result<Flow, ProcessError> {
    match spec.scope {
        Scope::Column => {
            let mask: BitVec = page
                .require_column(&spec.name)?
                .to_f64_vec()
                .into_iter()
                .map(|t| in_time_window(spec, t))
                .collect();
            page.assert_flags(&mask);
            Ok(Flow::RowsChanged)
        }
        Scope::Parameter => {
            let t = page.require_parameter(&spec.name)?.to_f64()?;
            Ok(if in_time_window(spec, t) {
                Flow::Continue
            } else {
                Flow::SkipPage
            })
        }
    }
}

pub(crate) fn run_test(
    ctx: &mut Context,
    page: &mut Page,
    scope: Scope,
    program: &Program,
    expression: &str,
    autostop: bool,
) -> Result<Flow, ProcessError> {
    match scope {
        Scope::Column => {
            let rows = page.rows();
            let mut failures = 0usize;
            let mask = {
                let sources = ctx.row_sources(page);
                let mut mask = BitVec::with_len_all_false(rows);
                for row in 0..rows {
                    if row % ABORT_CHECK_INTERVAL == 0 {
                        ctx.check_abort()?;
                    }
                    ctx.bind_row(&sources, row);
                    match ctx.eval_logical(program) {
                        Ok(keep) => mask.set(row, keep),
                        Err(err) => {
                            if failures == 0 {
                                debug!("test `{expression}` failed on row {row}: {err}");
                            }
                            failures += 1;
                        }
                    }
                }
                mask
            };
            if failures > 0 && ctx.options.warnings {
                log::warn!(
                    "test `{expression}` could not be evaluated for {failures} row(s) of page {}",
                    page.index()
                );
            }
            page.assert_flags(&mask);
            Ok(Flow::RowsChanged)
        }
        Scope::Parameter => {
            let keep = ctx
                .eval_logical(program)
                .map_err(|err| ProcessError::eval(expression, err))?;
            Ok(match (keep, autostop) {
                (true, _) => Flow::Continue,
                (false, true) => Flow::Stop,
                (false, false) => Flow::SkipPage,
            })
        }
    }
}

pub(crate) fn declare_number_test(
    layout: &Layout,
    scope: Scope,
    name: &str,
) -> Result<(), ProcessError> {
    layout.require(scope.class(), name)?;
    Ok(())
}

fn looks_numeric(text: &str) -> bool {
    parse_number(text.trim()).is_some()
}

pub(crate) fn run_number_test(
    page: &mut Page,
    scope: Scope,
    name: &str,
    invert: bool,
) -> Result<Flow, ProcessError> {
    match scope {
        Scope::Column => {
            let column = page.require_column(name)?;
            let mask: BitVec = match column.as_strings() {
                Some(values) => values.iter().map(|v| looks_numeric(v) != invert).collect(),
                None if column.kind().is_numeric() => {
                    std::iter::repeat(!invert).take(column.len()).collect()
                }
                None => column
                    .to_strings()
                    .iter()
                    .map(|v| looks_numeric(v) != invert)
                    .collect(),
            };
            page.assert_flags(&mask);
            Ok(Flow::RowsChanged)
        }
        Scope::Parameter => {
            let value = page.require_parameter(name)?;
            let numeric = value.kind().is_numeric() || looks_numeric(&value.to_text());
            Ok(if numeric != invert {
                Flow::Continue
            } else {
                Flow::SkipPage
            })
        }
    }
}

/// Keep (or with `invert`, drop) everything but the first `head` and last `tail` rows.
pub(crate) fn run_clip(page: &mut Page, head: usize, tail: usize, invert: bool) -> Flow {
    let rows = page.rows();
    let mut mask = if invert {
        BitVec::with_len_all_false(rows)
    } else {
        BitVec::with_len_all_true(rows)
    };
    mask.set_range(0..head.min(rows), invert);
    mask.set_range(rows.saturating_sub(tail)..rows, invert);
    page.assert_flags(&mask);
    Flow::RowsChanged
}

pub(crate) fn run_fclip(page: &mut Page, head: f64, tail: f64, invert: bool) -> Flow {
    let rows = page.rows() as f64;
    let count = |fraction: f64| (fraction * rows).trunc().max(0.0) as usize;
    run_clip(page, count(head), count(tail), invert)
}

pub(crate) fn declare_trim(interval: usize, fraction: Option<f64>) -> Result<(), ProcessError> {
    if interval == 0 {
        return Err(ProcessError::Usage("sparse interval must be at least 1".into()));
    }
    if let Some(fraction) = fraction {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(ProcessError::Usage(format!(
                "sample fraction {fraction} is outside [0, 1]"
            )));
        }
    }
    Ok(())
}

pub(crate) fn run_sparse(page: &mut Page, interval: usize, offset: usize) -> Flow {
    let mask: BitVec = (0..page.rows())
        .map(|row| row >= offset && (row - offset) % interval == 0)
        .collect();
    page.assert_flags(&mask);
    Flow::RowsChanged
}

pub(crate) fn run_sample(ctx: &mut Context, page: &mut Page, fraction: f64) -> Flow {
    let mask: BitVec = (0..page.rows())
        .map(|_| ctx.rng.gen::<f64>() < fraction)
        .collect();
    page.assert_flags(&mask);
    Flow::RowsChanged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};
    use pretty_assertions::assert_eq;
    use sdds_model::{ColumnData, Definition, Kind, Value};
    use std::sync::Arc;

    fn page_with(columns: &[(&str, ColumnData)]) -> Page {
        let mut layout = Layout::new();
        for (name, data) in columns {
            layout
                .define(ItemClass::Column, Definition::new(*name, data.kind()))
                .expect("define");
        }
        let rows = columns.first().map_or(0, |(_, d)| d.len());
        let mut page = Page::new(Arc::new(layout), rows);
        for (name, data) in columns {
            page.set_column(name, data.clone()).expect("column");
        }
        page
    }

    fn kept(page: &Page) -> Vec<usize> {
        page.row_flags().iter_ones().collect()
    }

    #[test]
    fn match_terms_combine_left_to_right() {
        let names = ColumnData::String(vec!["alpha".into(), "beta".into(), "ALPHA2".into()]);
        let mut page = page_with(&[("n", names)]);
        let alpha = MatchTerm {
            name: "n".into(),
            pattern: "alpha*".into(),
            case_insensitive: true,
            indirect: false,
            logic: Logic::AND,
        };
        let beta = MatchTerm {
            pattern: "beta".into(),
            case_insensitive: false,
            logic: Logic::OR,
            ..alpha.clone()
        };
        run_match(&mut page, Scope::Column, &[alpha, beta]).expect("match");
        assert_eq!(kept(&page), [0, 1, 2]);

        page.set_all_flags(true);
        let negated = MatchTerm {
            name: "n".into(),
            pattern: "beta".into(),
            case_insensitive: false,
            indirect: false,
            logic: Logic {
                negate_term: true,
                ..Logic::AND
            },
        };
        run_match(&mut page, Scope::Column, &[negated]).expect("match");
        assert_eq!(kept(&page), [0, 2]);
    }

    #[test]
    fn filter_bounds_are_inclusive_and_reject_nan() {
        let t = ColumnData::Double(vec![1.0, 2.0, f64::NAN, 7.0, 8.0]);
        let mut page = page_with(&[("t", t)]);
        let term = FilterTerm {
            name: "t".into(),
            lower: Bound::Value(2.0),
            upper: Bound::Value(7.0),
            logic: Logic::AND,
        };
        run_filter(&mut page, Scope::Column, &[term]).expect("filter");
        assert_eq!(kept(&page), [1, 3]);
    }

    #[test]
    fn filter_rejects_inverted_literal_bounds() {
        let mut layout = Layout::new();
        layout
            .define(ItemClass::Column, Definition::new("t", Kind::Double))
            .expect("t");
        let term = FilterTerm {
            name: "t".into(),
            lower: Bound::Value(5.0),
            upper: Bound::Value(1.0),
            logic: Logic::AND,
        };
        assert!(matches!(
            declare_filter(&layout, Scope::Column, &[term]),
            Err(ProcessError::Usage(_))
        ));
    }

    #[test]
    fn number_test_on_strings() {
        let s = ColumnData::String(
            ["1", "two", " 3 ", "4x", "5e2"].iter().map(|s| s.to_string()).collect(),
        );
        let mut page = page_with(&[("s", s.clone())]);
        run_number_test(&mut page, Scope::Column, "s", false).expect("numberTest");
        assert_eq!(kept(&page), [0, 2, 4]);

        let mut page = page_with(&[("s", s)]);
        run_number_test(&mut page, Scope::Column, "s", true).expect("numberTest");
        assert_eq!(kept(&page), [1, 3]);
    }

    #[test]
    fn clip_and_sparse() {
        let x = ColumnData::Double((0..10).map(f64::from).collect());
        let mut page = page_with(&[("x", x.clone())]);
        run_clip(&mut page, 2, 3, false);
        assert_eq!(kept(&page), [2, 3, 4, 5, 6]);

        let mut page = page_with(&[("x", x.clone())]);
        run_clip(&mut page, 2, 3, true);
        assert_eq!(kept(&page), [0, 1, 7, 8, 9]);

        let mut page = page_with(&[("x", x.clone())]);
        run_fclip(&mut page, 0.25, 0.0, false);
        assert_eq!(kept(&page), [2, 3, 4, 5, 6, 7, 8, 9]);

        let mut page = page_with(&[("x", x)]);
        run_sparse(&mut page, 3, 1);
        assert_eq!(kept(&page), [1, 4, 7]);
    }

    #[test]
    fn parameter_scope_match_skips_pages() {
        let mut layout = Layout::new();
        layout
            .define(ItemClass::Parameter, Definition::new("tag", Kind::String))
            .expect("tag");
        let mut page = Page::new(Arc::new(layout), 0);
        page.set_parameter("tag", &Value::from("run7")).expect("tag");
        let term = |pattern: &str| MatchTerm {
            name: "tag".into(),
            pattern: pattern.into(),
            case_insensitive: false,
            indirect: false,
            logic: Logic::AND,
        };
        assert_eq!(
            run_match(&mut page, Scope::Parameter, &[term("run*")]).expect("match"),
            Flow::Continue
        );
        assert_eq!(
            run_match(&mut page, Scope::Parameter, &[term("cal*")]).expect("match"),
            Flow::SkipPage
        );
    }

    #[test]
    fn times_parse_as_local() {
        let t = parse_time("2024/03/05@06:07:08.5").expect("time");
        let local = Local
            .timestamp_opt(t.trunc() as i64, 0)
            .single()
            .expect("representable");
        assert_eq!((local.year(), local.month(), local.day()), (2024, 3, 5));
        assert_eq!((local.hour(), local.minute(), local.second()), (6, 7, 8));
        assert_eq!(t.fract(), 0.5);

        let midnight = parse_time("2024/03/05").expect("date only");
        assert_eq!(t - midnight, 6.0 * 3600.0 + 7.0 * 60.0 + 8.5);
        assert!(parse_time("2024-03-05").is_err());
        assert!(parse_time("2024/13/05").is_err());
    }
}
