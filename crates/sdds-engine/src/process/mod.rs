//! The `process` operator: reduce a column to a parameter.
//!
//! Rows go through the selection qualifiers in a fixed order (match, functionOf limits,
//! top/bottom limits, head/fhead, tail/ftail), the surviving values are offset and scaled,
//! and the analysis runs on what is left.

mod analysis;
mod parallel;
pub mod stats;

use std::fmt;

use log::{debug, warn};
use sdds_model::{ColumnData, ItemClass, Kind, Layout, Page, Value, WildcardPattern};

use crate::context::Context;
use crate::error::ProcessError;
use crate::operator::Bound;

pub use self::analysis::{Analysis, UnitsRule};
pub use self::parallel::Reducer;
use self::stats::Direction;

/// Placeholder replaced by the processed column's name in result names, descriptions and
/// `offset`/`factor` parameter names.
const COLUMN_PLACEHOLDER: &str = "%s";

#[derive(Clone, Debug, PartialEq)]
pub struct ProcessSpec {
    pub column: String,
    pub analysis: Analysis,
    /// Result parameter name; `%s` is replaced by the column name.
    pub result: String,
    pub description: Option<String>,
    pub symbol: Option<String>,
    pub weight_by: Option<String>,
    pub function_of: Option<String>,
    pub lower_limit: Option<Bound>,
    pub upper_limit: Option<Bound>,
    /// Report the `functionOf` value at the extremum instead of the extremum.
    pub position: bool,
    pub head: Option<Bound>,
    pub tail: Option<Bound>,
    pub fhead: Option<Bound>,
    pub ftail: Option<Bound>,
    pub top_limit: Option<f64>,
    pub bottom_limit: Option<f64>,
    pub offset: Option<Bound>,
    pub factor: Option<Bound>,
    /// Subtract the offset instead of adding it.
    pub invert_offset: bool,
    /// Divide by the factor instead of multiplying.
    pub invert_factor: bool,
    pub match_column: Option<String>,
    pub match_value: Option<String>,
    pub overwrite: bool,
    pub default: Option<f64>,
    pub percentile_level: Option<f64>,
    pub bin_size: Option<f64>,
}

impl ProcessSpec {
    pub fn new(column: impl Into<String>, analysis: Analysis, result: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            analysis,
            result: result.into(),
            description: None,
            symbol: None,
            weight_by: None,
            function_of: None,
            lower_limit: None,
            upper_limit: None,
            position: false,
            head: None,
            tail: None,
            fhead: None,
            ftail: None,
            top_limit: None,
            bottom_limit: None,
            offset: None,
            factor: None,
            invert_offset: false,
            invert_factor: false,
            match_column: None,
            match_value: None,
            overwrite: false,
            default: None,
            percentile_level: None,
            bin_size: None,
        }
    }

    /// Checks that do not depend on the layout.
    pub fn validate(&self) -> Result<(), ProcessError> {
        let usage = |message: &str| Err(ProcessError::Usage(format!("invalid -process: {message}")));
        let analysis = self.analysis;
        if self.bin_size.is_some_and(|size| size <= 0.0) {
            return usage("binSize must be positive");
        }
        if self.factor == Some(Bound::Value(0.0)) {
            return usage("factor is zero");
        }
        if analysis.requires_function_of() && self.function_of.is_none() {
            return usage(&format!("{analysis} requires functionOf"));
        }
        if self.weight_by.is_some() && !analysis.accepts_weights() {
            return usage(&format!("weightBy is not available for {analysis}"));
        }
        if self.position {
            if self.function_of.is_none() {
                return usage("position requires functionOf");
            }
            if !analysis.accepts_position() {
                return usage(&format!("position is not permitted for {analysis}"));
            }
        }
        if let (Some(Bound::Value(lo)), Some(Bound::Value(hi))) =
            (&self.lower_limit, &self.upper_limit)
        {
            if lo > hi {
                return usage("lowerLimit > upperLimit");
            }
        }
        if let (Some(top), Some(bottom)) = (self.top_limit, self.bottom_limit) {
            if top < bottom {
                return usage("bottomLimit > topLimit");
            }
        }
        for (label, bound) in [
            ("head", &self.head),
            ("fhead", &self.fhead),
            ("tail", &self.tail),
            ("ftail", &self.ftail),
        ] {
            if *bound == Some(Bound::Value(0.0)) {
                return usage(&format!("{label}=0"));
            }
        }
        if (self.lower_limit.is_some() || self.upper_limit.is_some()) && self.function_of.is_none()
        {
            return usage("lowerLimit and upperLimit require functionOf");
        }
        if matches!(analysis, Analysis::Percentile | Analysis::PRange) {
            match self.percentile_level {
                None => return usage(&format!("{analysis} requires percentLevel")),
                Some(level) if !(0.0..=100.0).contains(&level) => {
                    return Err(ProcessError::Range(format!(
                        "percentile level {level} is outside [0, 100]"
                    )))
                }
                Some(_) => {}
            }
        }
        if self.match_column.is_some() != self.match_value.is_some() {
            return usage("match and value must be given together");
        }
        Ok(())
    }

    /// Check the referenced columns and declare the result parameter.
    ///
    /// Resolves `%s` in the result name and description.
    pub fn declare(&mut self, layout: &mut Layout) -> Result<(), ProcessError> {
        self.validate()?;
        let column = layout.require(ItemClass::Column, &self.column)?.clone();
        if column.kind == Kind::String && !self.analysis.accepts_strings() {
            return Err(ProcessError::wrong_kind(
                ItemClass::Column,
                &self.column,
                &format!("numeric for {}", self.analysis),
            ));
        }
        if let Some(weight) = &self.weight_by {
            let def = layout.require(ItemClass::Column, weight)?;
            if !def.kind.is_numeric() {
                return Err(ProcessError::wrong_kind(ItemClass::Column, weight, "numeric"));
            }
        }
        if let Some(name) = &self.match_column {
            layout.require(ItemClass::Column, name)?;
        }
        let function_of = match &self.function_of {
            Some(name) => Some(layout.require(ItemClass::Column, name)?.clone()),
            None => None,
        };
        let string_abscissa = function_of.as_ref().is_some_and(|d| d.kind == Kind::String);
        let string_result = string_abscissa
            && (self.position || self.analysis == Analysis::ZeroCrossing);
        if string_abscissa && !string_result && self.analysis.requires_function_of() {
            return Err(ProcessError::wrong_kind(
                ItemClass::Column,
                self.function_of.as_deref().unwrap_or_default(),
                "numeric",
            ));
        }

        self.result = self.result.replace(COLUMN_PLACEHOLDER, &self.column);
        let description = match &self.description {
            Some(text) => text.replace(COLUMN_PLACEHOLDER, &self.column),
            None => format!("{}{}", self.analysis.description_prefix(), self.column),
        };
        self.description = Some(description.clone());

        let kind = if string_result
            || (column.kind == Kind::String && self.analysis != Analysis::Count)
        {
            Kind::String
        } else {
            Kind::Double
        };
        let y_units = column.units_or_empty();
        let x_units = function_of.as_ref().map_or("", |d| d.units_or_empty());
        let units = if self.position && function_of.is_some() {
            x_units.to_string()
        } else {
            derived_units(self.analysis.units_rule(), y_units, x_units)
        };

        let mut def = sdds_model::Definition::new(&self.result, kind).with_description(description);
        if !units.is_empty() {
            def.units = Some(units);
        }
        def.symbol.clone_from(&self.symbol);
        if layout.parameter(&self.result).is_some() {
            if !self.overwrite {
                return Err(sdds_model::SchemaError::Duplicate {
                    class: ItemClass::Parameter,
                    name: self.result.clone(),
                }
                .into());
            }
            layout.define_or_replace(ItemClass::Parameter, def);
        } else {
            layout.define(ItemClass::Parameter, def)?;
        }
        Ok(())
    }
}

fn derived_units(rule: UnitsRule, y: &str, x: &str) -> String {
    match rule {
        UnitsRule::Column => y.to_string(),
        UnitsRule::FunctionOf => x.to_string(),
        UnitsRule::None => String::new(),
        UnitsRule::Ratio => match (y.is_empty(), x.is_empty()) {
            (false, false) => format!("({y})/({x})"),
            (false, true) => y.to_string(),
            (true, false) => format!("1/({x})"),
            (true, true) => String::new(),
        },
        UnitsRule::Product => match (y.is_empty(), x.is_empty()) {
            (false, false) => format!("{y}*{x}"),
            (false, true) => y.to_string(),
            (true, false) => x.to_string(),
            (true, true) => String::new(),
        },
    }
}

impl fmt::Display for ProcessSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "process {} of column {} into {}", self.analysis, self.column, self.result)?;
        if let Some(x) = &self.function_of {
            write!(f, " as a function of {x}")?;
        }
        if let Some(w) = &self.weight_by {
            write!(f, " weighted by {w}")?;
        }
        if self.position {
            f.write_str(" (position)")?;
        }
        if let Some(level) = self.percentile_level {
            write!(f, " level {level}")?;
        }
        Ok(())
    }
}

/// A computed result before it is stored.
#[derive(Clone, Debug, PartialEq)]
enum Outcome {
    Num(f64),
    Str(String),
}

fn resolve(page: &Page, bound: &Bound, column: &str) -> Result<f64, ProcessError> {
    match bound {
        Bound::Value(v) => Ok(*v),
        Bound::Parameter(name) => {
            let name = name.replace(COLUMN_PLACEHOLDER, column);
            Ok(page.require_parameter(&name)?.to_f64()?)
        }
    }
}

/// Keep the first `count` kept rows (`count > 0`) or drop the first `|count|` kept rows.
fn trim_front(keep: &mut [bool], count: i64) {
    let mut seen = 0i64;
    if count > 0 {
        let mut i = 0;
        while i < keep.len() && seen < count {
            if keep[i] {
                seen += 1;
            }
            i += 1;
        }
        keep[i..].iter_mut().for_each(|k| *k = false);
    } else {
        for k in keep.iter_mut() {
            if seen >= -count {
                break;
            }
            if *k {
                *k = false;
                seen += 1;
            }
        }
    }
}

fn trim_back(keep: &mut [bool], count: i64) {
    keep.reverse();
    trim_front(keep, count);
    keep.reverse();
}

fn compact<T: Clone>(values: &[T], keep: &[bool]) -> Vec<T> {
    values
        .iter()
        .zip(keep)
        .filter(|(_, k)| **k)
        .map(|(v, _)| v.clone())
        .collect()
}

/// Selected samples and their companions.
struct Samples {
    data: Vec<f64>,
    x: Option<Vec<f64>>,
    x_strings: Option<Vec<String>>,
    weights: Option<Vec<f64>>,
}

impl ProcessSpec {
    fn selection(&self, page: &Page, data: &[f64]) -> Result<Vec<bool>, ProcessError> {
        let n = data.len();
        let mut keep: Vec<bool> = page.row_flags().iter().collect();
        keep.resize(n, true);

        if let (Some(name), Some(value)) = (&self.match_column, &self.match_value) {
            let pattern = WildcardPattern::new(value)?;
            let texts = page.require_column(name)?.to_strings();
            for (k, text) in keep.iter_mut().zip(&texts) {
                if !pattern.is_match(text) {
                    *k = false;
                }
            }
        }
        if let Some(name) = &self.function_of {
            let x = page.require_column(name)?.to_f64_vec();
            if let Some(bound) = &self.lower_limit {
                let lower = resolve(page, bound, &self.column)?;
                for (k, v) in keep.iter_mut().zip(&x) {
                    if lower > *v {
                        *k = false;
                    }
                }
            }
            if let Some(bound) = &self.upper_limit {
                let upper = resolve(page, bound, &self.column)?;
                for (k, v) in keep.iter_mut().zip(&x) {
                    if upper < *v || !v.is_finite() {
                        *k = false;
                    }
                }
            }
        }
        if let Some(top) = self.top_limit {
            for (k, v) in keep.iter_mut().zip(data) {
                if top < *v || !v.is_finite() {
                    *k = false;
                }
            }
        }
        if let Some(bottom) = self.bottom_limit {
            for (k, v) in keep.iter_mut().zip(data) {
                if bottom > *v {
                    *k = false;
                }
            }
        }
        let fraction_count = |f: f64| -> i64 {
            let count = (n as f64 * f + 0.5).abs().trunc() as i64;
            if f > 0.0 {
                count
            } else {
                -count
            }
        };
        if let Some(bound) = &self.head {
            trim_front(&mut keep, resolve(page, bound, &self.column)?.trunc() as i64);
        }
        if let Some(bound) = &self.fhead {
            trim_front(&mut keep, fraction_count(resolve(page, bound, &self.column)?));
        }
        if let Some(bound) = &self.tail {
            trim_back(&mut keep, resolve(page, bound, &self.column)?.trunc() as i64);
        }
        if let Some(bound) = &self.ftail {
            trim_back(&mut keep, fraction_count(resolve(page, bound, &self.column)?));
        }
        Ok(keep)
    }

    fn samples(&self, page: &Page, data: Vec<f64>, keep: &[bool]) -> Result<Samples, ProcessError> {
        let mut x = None;
        let mut x_strings = None;
        if let Some(name) = &self.function_of {
            let column = page.require_column(name)?;
            match column {
                ColumnData::String(values) => x_strings = Some(compact(values, keep)),
                other => x = Some(compact(&other.to_f64_vec(), keep)),
            }
        }
        let weights = match &self.weight_by {
            Some(name) => Some(compact(&page.require_column(name)?.to_f64_vec(), keep)),
            None => None,
        };
        Ok(Samples {
            data: compact(&data, keep),
            x,
            x_strings,
            weights,
        })
    }

    /// Value for a page with nothing to analyze.
    fn empty(&self) -> Result<Outcome, ProcessError> {
        if self.analysis == Analysis::Count {
            return Ok(Outcome::Num(0.0));
        }
        match self.default {
            Some(v) => Ok(Outcome::Num(v)),
            None => Err(ProcessError::EmptyResult {
                analysis: self.analysis.to_string(),
                column: self.column.clone(),
            }),
        }
    }

    pub(crate) fn run(&self, ctx: &mut Context, page: &mut Page) -> Result<(), ProcessError> {
        ctx.check_abort()?;
        let column = page.require_column(&self.column)?;
        let outcome = if let ColumnData::String(values) = column {
            let values = values.clone();
            self.run_strings(page, &values)?
        } else {
            let data = column.to_f64_vec();
            let keep = self.selection(page, &data)?;
            let mut samples = self.samples(page, data, &keep)?;
            if samples.data.is_empty() {
                if ctx.options.warnings && self.analysis != Analysis::Count {
                    warn!(
                        "no rows selected for {} of {} on page {}",
                        self.analysis,
                        self.column,
                        page.index()
                    );
                }
                self.empty()?
            } else {
                self.scale(page, &mut samples.data)?;
                self.check_mode_bins(&samples.data)?;
                match self.analyze(&ctx.reducer, &samples) {
                    Some(outcome) => outcome,
                    None => {
                        if ctx.options.warnings {
                            warn!(
                                "{} of {} could not be computed on page {}",
                                self.analysis,
                                self.column,
                                page.index()
                            );
                        }
                        Outcome::Num(self.default.unwrap_or(f64::NAN))
                    }
                }
            }
        };
        ctx.check_abort()?;
        debug!("{} of {} = {:?}", self.analysis, self.column, outcome);
        let stored = match outcome {
            Outcome::Num(v) => {
                if let Err(err) = ctx.rpn.set_memory(&self.result, v) {
                    debug!("result {} not stored in a memory: {err}", self.result);
                }
                Value::Double(v)
            }
            Outcome::Str(s) => {
                if let Err(err) = ctx.rpn.set_string_memory(&self.result, &s) {
                    debug!("result {} not stored in a memory: {err}", self.result);
                }
                Value::String(s)
            }
        };
        page.set_parameter(&self.result, &stored)?;
        Ok(())
    }

    fn scale(&self, page: &Page, data: &mut [f64]) -> Result<(), ProcessError> {
        if let Some(bound) = &self.offset {
            let mut offset = resolve(page, bound, &self.column)?;
            if self.invert_offset {
                offset = -offset;
            }
            data.iter_mut().for_each(|v| *v += offset);
        }
        if let Some(bound) = &self.factor {
            let mut factor = resolve(page, bound, &self.column)?;
            if self.invert_factor {
                factor = 1.0 / factor;
            }
            data.iter_mut().for_each(|v| *v *= factor);
        }
        Ok(())
    }

    fn run_strings(&self, page: &Page, values: &[String]) -> Result<Outcome, ProcessError> {
        let mut keep: Vec<bool> = page.row_flags().iter().collect();
        keep.resize(values.len(), true);
        if let (Some(name), Some(value)) = (&self.match_column, &self.match_value) {
            let pattern = WildcardPattern::new(value)?;
            let texts = page.require_column(name)?.to_strings();
            for (k, text) in keep.iter_mut().zip(&texts) {
                if !pattern.is_match(text) {
                    *k = false;
                }
            }
        }
        if let Some(bound) = &self.head {
            trim_front(&mut keep, resolve(page, bound, &self.column)?.trunc() as i64);
        }
        if let Some(bound) = &self.tail {
            trim_back(&mut keep, resolve(page, bound, &self.column)?.trunc() as i64);
        }
        let kept = compact(values, &keep);
        let outcome = match self.analysis {
            Analysis::Count => Some(Outcome::Num(kept.len() as f64)),
            Analysis::First => kept.first().cloned().map(Outcome::Str),
            Analysis::Last => kept.last().cloned().map(Outcome::Str),
            _ => None,
        };
        match outcome {
            Some(outcome) => Ok(outcome),
            None => match self.default {
                Some(v) => Ok(Outcome::Str(Value::Double(v).to_text())),
                None => Err(ProcessError::EmptyResult {
                    analysis: self.analysis.to_string(),
                    column: self.column.clone(),
                }),
            },
        }
    }

    /// The value at sample `i`, or the abscissa there when `position` is set.
    fn at(&self, samples: &Samples, i: usize, value: f64) -> Outcome {
        if !self.position {
            return Outcome::Num(value);
        }
        if let Some(strings) = &samples.x_strings {
            return Outcome::Str(strings[i].clone());
        }
        match &samples.x {
            Some(x) => Outcome::Num(x[i]),
            None => Outcome::Num(value),
        }
    }

    /// Reject a `binSize` so small that the `mode` histogram would not fit in memory.
    fn check_mode_bins(&self, data: &[f64]) -> Result<(), ProcessError> {
        let (Analysis::Mode, Some(size)) = (self.analysis, self.bin_size) else {
            return Ok(());
        };
        let Some((lo, hi)) = stats::index_min_max(data) else {
            return Ok(());
        };
        let span = data[hi] - data[lo];
        if span > 0.0 && stats::mode_bins(span, size).is_none() {
            return Err(ProcessError::Range(format!(
                "mode of {}: binSize {size} needs more than {} bins to cover {span}",
                self.column,
                stats::MAX_MODE_BINS
            )));
        }
        Ok(())
    }

    fn analyze(&self, reducer: &Reducer, samples: &Samples) -> Option<Outcome> {
        let data = samples.data.as_slice();
        let weights = samples.weights.as_deref();
        let x = samples.x.as_deref();
        let n = data.len();
        let num = |v: f64| Some(Outcome::Num(v));
        let level = self.percentile_level.unwrap_or(50.0);

        match self.analysis {
            Analysis::Average => match weights {
                Some(w) => num(stats::weighted_mean(reducer, data, w)?),
                None => num(stats::mean(reducer, data)?),
            },
            Analysis::Rms => num(stats::rms(reducer, data, weights)?),
            Analysis::Sum => num(stats::sum(reducer, data, weights)),
            Analysis::StandardDeviation => num(stats::standard_deviation(reducer, data, weights)?),
            Analysis::Mad => num(stats::mean_absolute_deviation(reducer, data, weights)?),
            Analysis::Sigma => {
                num(stats::standard_deviation(reducer, data, weights)? / (n as f64).sqrt())
            }
            Analysis::Product => num(stats::product(data, weights)),
            Analysis::Minimum | Analysis::Maximum | Analysis::Spread => {
                let (lo, hi) = stats::index_min_max(data)?;
                match self.analysis {
                    Analysis::Minimum => Some(self.at(samples, lo, data[lo])),
                    Analysis::Maximum => Some(self.at(samples, hi, data[hi])),
                    _ => num(data[hi] - data[lo]),
                }
            }
            Analysis::Smallest
            | Analysis::Largest
            | Analysis::SignedSmallest
            | Analysis::SignedLargest => {
                let magnitudes: Vec<f64> = data.iter().map(|v| v.abs()).collect();
                let (lo, hi) = stats::index_min_max(&magnitudes)?;
                let (i, value) = match self.analysis {
                    Analysis::Smallest => (lo, magnitudes[lo]),
                    Analysis::Largest => (hi, magnitudes[hi]),
                    Analysis::SignedSmallest => (lo, data[lo]),
                    _ => (hi, data[hi]),
                };
                Some(self.at(samples, i, value))
            }
            Analysis::First => num(data[0]),
            Analysis::Last => num(data[n - 1]),
            Analysis::Count => num(n as f64),
            Analysis::Median
            | Analysis::Percentile
            | Analysis::QRange
            | Analysis::DRange
            | Analysis::PRange => {
                let sorted = stats::sorted_copy(data);
                let p = |q: f64| stats::percentile_sorted(&sorted, q);
                match self.analysis {
                    Analysis::Median => num(p(50.0)?),
                    Analysis::Percentile => num(p(level)?),
                    Analysis::QRange => num(p(75.0)? - p(25.0)?),
                    Analysis::DRange => num(p(90.0)? - p(10.0)?),
                    _ => num(p(50.0 + level / 2.0)? - p(50.0 - level / 2.0)?),
                }
            }
            Analysis::Mode => num(stats::mode(data, self.bin_size)?),
            Analysis::BaseLevel | Analysis::TopLevel | Analysis::Amplitude => {
                let (top, base) = stats::top_base_levels(data)?;
                match self.analysis {
                    Analysis::BaseLevel => num(base),
                    Analysis::TopLevel => num(top),
                    _ => num(top - base),
                }
            }
            Analysis::RiseTime | Analysis::FallTime => {
                let x = x?;
                let (top, base) = stats::top_base_levels(data)?;
                let amplitude = top - base;
                let (low, high) = (base + 0.1 * amplitude, base + 0.9 * amplitude);
                let time = if self.analysis == Analysis::RiseTime {
                    stats::transition_time(data, x, low, high, Direction::Rising)?
                } else {
                    stats::transition_time(data, x, high, low, Direction::Falling)?
                };
                num(time)
            }
            Analysis::Fwha | Analysis::Fwta | Analysis::Center => {
                let x = x?;
                let (top, base) = stats::top_base_levels(data)?;
                let amplitude = top - base;
                let fraction = if self.analysis == Analysis::Fwta { 0.1 } else { 0.5 };
                let (p1, p2) = stats::pulse_edges(
                    data,
                    x,
                    base + fraction * amplitude,
                    base + 0.9 * amplitude,
                )?;
                if self.analysis == Analysis::Center {
                    num((p1 + p2) / 2.0)
                } else {
                    num(p2 - p1)
                }
            }
            Analysis::Fwhm | Analysis::Fwtm => {
                let x = x?;
                let (top, _) = stats::top_base_levels(data)?;
                let fraction = if self.analysis == Analysis::Fwtm { 0.1 } else { 0.5 };
                let (p1, p2) = stats::pulse_edges(data, x, fraction * top, 0.9 * top)?;
                num(p2 - p1)
            }
            Analysis::ZeroCrossing => {
                let i = stats::zero_crossing_index(data)?;
                if let Some(strings) = &samples.x_strings {
                    return Some(Outcome::Str(strings[i].clone()));
                }
                num(stats::zero_crossing_location(data, x?, i))
            }
            Analysis::Slope | Analysis::Intercept | Analysis::Lfsd => {
                let fit = stats::linear_fit(x?, data)?;
                match self.analysis {
                    Analysis::Slope => num(fit.slope),
                    Analysis::Intercept => num(fit.intercept),
                    _ => num(fit.variance.sqrt()),
                }
            }
            Analysis::Integral => num(stats::trapezoid(x?, data)),
            Analysis::GmIntegral => num(stats::gill_miller(x?, data)),
            Analysis::Correlation => num(stats::correlation(x?, data)?),
        }
    }
}
