//! Numeric kernels behind the `process` analyses.
//!
//! Functions return `None` when the analysis is undefined for the data (too few points, no
//! crossing, degenerate abscissa); the caller decides between `default` and NaN.

use super::parallel::Reducer;

/// Compensated summation.
#[derive(Debug, Default, Clone, Copy)]
pub struct KahanSum {
    sum: f64,
    c: f64,
}

impl KahanSum {
    pub fn add(&mut self, x: f64) {
        let y = x - self.c;
        let t = self.sum + y;
        self.c = (t - self.sum) - y;
        self.sum = t;
    }

    pub fn value(self) -> f64 {
        self.sum
    }
}

pub fn mean(reducer: &Reducer, data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(reducer.sum_by(data.len(), |i| data[i]) / data.len() as f64)
}

pub fn weighted_mean(reducer: &Reducer, data: &[f64], weights: &[f64]) -> Option<f64> {
    let sum_w = reducer.sum_by(weights.len(), |i| weights[i]);
    if data.is_empty() || sum_w == 0.0 {
        return None;
    }
    Some(reducer.sum_by(data.len(), |i| data[i] * weights[i]) / sum_w)
}

pub fn sum(reducer: &Reducer, data: &[f64], weights: Option<&[f64]>) -> f64 {
    match weights {
        Some(w) => reducer.sum_by(data.len(), |i| data[i] * w[i]),
        None => reducer.sum_by(data.len(), |i| data[i]),
    }
}

pub fn rms(reducer: &Reducer, data: &[f64], weights: Option<&[f64]>) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    let mean_square = match weights {
        Some(w) => {
            let sum_w = reducer.sum_by(w.len(), |i| w[i]);
            if sum_w == 0.0 {
                return None;
            }
            reducer.sum_by(data.len(), |i| w[i] * data[i] * data[i]) / sum_w
        }
        None => reducer.sum_by(data.len(), |i| data[i] * data[i]) / data.len() as f64,
    };
    Some(mean_square.sqrt())
}

/// Sample standard deviation (n - 1 denominator).
///
/// The weighted form is `sqrt(n Σw(x-m)² / ((n-1) Σw))` with `m` the weighted mean.
pub fn standard_deviation(
    reducer: &Reducer,
    data: &[f64],
    weights: Option<&[f64]>,
) -> Option<f64> {
    let n = data.len();
    if n < 2 {
        return None;
    }
    let value = match weights {
        Some(w) => {
            let m = weighted_mean(reducer, data, w)?;
            let sum_w = reducer.sum_by(n, |i| w[i]);
            let ss = reducer.sum_by(n, |i| w[i] * (data[i] - m) * (data[i] - m));
            (ss * n as f64 / ((n - 1) as f64 * sum_w)).sqrt()
        }
        None => {
            let m = mean(reducer, data)?;
            let ss = reducer.sum_by(n, |i| (data[i] - m) * (data[i] - m));
            (ss / (n - 1) as f64).sqrt()
        }
    };
    Some(value)
}

/// Mean absolute deviation from the (weighted) mean.
pub fn mean_absolute_deviation(
    reducer: &Reducer,
    data: &[f64],
    weights: Option<&[f64]>,
) -> Option<f64> {
    match weights {
        Some(w) => {
            let m = weighted_mean(reducer, data, w)?;
            let sum_w = reducer.sum_by(w.len(), |i| w[i]);
            Some(reducer.sum_by(data.len(), |i| w[i] * (data[i] - m).abs()) / sum_w)
        }
        None => {
            let m = mean(reducer, data)?;
            Some(reducer.sum_by(data.len(), |i| (data[i] - m).abs()) / data.len() as f64)
        }
    }
}

pub fn product(data: &[f64], weights: Option<&[f64]>) -> f64 {
    match weights {
        Some(w) => data.iter().zip(w).map(|(x, w)| x * w).product(),
        None => data.iter().product(),
    }
}

/// Indices of the first minimum and first maximum. NaNs are ignored.
pub fn index_min_max(data: &[f64]) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    for (i, &v) in data.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        best = Some(match best {
            None => (i, i),
            Some((lo, hi)) => (
                if v < data[lo] { i } else { lo },
                if v > data[hi] { i } else { hi },
            ),
        });
    }
    best
}

/// `p` in percent over sorted data, linearly interpolated at rank `p/100·(n−1)`.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 || p.is_nan() {
        return None;
    }
    if p <= 0.0 {
        return Some(sorted[0]);
    }
    if p >= 100.0 {
        return Some(sorted[n - 1]);
    }
    let rank = p / 100.0 * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return Some(sorted[lo]);
    }
    let weight = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * weight)
}

pub fn sorted_copy(data: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = data.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Sample counts over `bins` equal bins spanning `[min, max]`.
fn histogram(data: &[f64], min: f64, max: f64, bins: usize) -> Vec<usize> {
    let mut counts = vec![0usize; bins.max(1)];
    if max <= min {
        counts[0] = data.len();
        return counts;
    }
    let width = (max - min) / bins as f64;
    for &v in data {
        if v.is_nan() {
            continue;
        }
        let idx = ((v - min) / width).floor();
        let idx = if idx < 0.0 {
            0
        } else {
            (idx as usize).min(counts.len() - 1)
        };
        counts[idx] += 1;
    }
    counts
}

fn first_argmax(counts: &[usize]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, &c) in counts.iter().enumerate() {
        if best.map_or(true, |b| c > counts[b]) {
            best = Some(i);
        }
    }
    best
}

/// Largest histogram `mode` will build.
pub const MAX_MODE_BINS: usize = 1 << 20;

/// Number of `size`-wide bins needed to cover `span`, or `None` past [`MAX_MODE_BINS`].
pub fn mode_bins(span: f64, size: f64) -> Option<usize> {
    let bins = (span / size).floor() + 1.0;
    (bins.is_finite() && bins <= MAX_MODE_BINS as f64).then_some(bins as usize)
}

/// Center of the most populated bin.
///
/// Bins are `bin_size` wide starting at the minimum when given, otherwise 100 bins span
/// the data.
pub fn mode(data: &[f64], bin_size: Option<f64>) -> Option<f64> {
    let (lo, hi) = index_min_max(data)?;
    let (min, max) = (data[lo], data[hi]);
    if max == min {
        return Some(min);
    }
    let (bins, width) = match bin_size {
        Some(size) if size > 0.0 => (mode_bins(max - min, size)?, size),
        _ => (100, (max - min) / 100.0),
    };
    let span_max = min + width * bins as f64;
    let counts = histogram(data, min, span_max, bins);
    let best = first_argmax(&counts)?;
    Some(min + (best as f64 + 0.5) * width)
}

/// Top and base levels of a pulse-like signal.
///
/// A 50-bin histogram is split into lower and upper halves; each level is the mean of the
/// samples in the most populated bin of its half. When the top so found is less than 3/4 of
/// the way from the base to the maximum, the maximum is used instead.
pub fn top_base_levels(data: &[f64]) -> Option<(f64, f64)> {
    const BINS: usize = 50;
    let (lo, hi) = index_min_max(data)?;
    let (min, max) = (data[lo], data[hi]);
    if max == min {
        return Some((max, min));
    }
    let counts = histogram(data, min, max, BINS);
    let width = (max - min) / BINS as f64;
    let level_of = |bin: usize| {
        let start = min + bin as f64 * width;
        let end = if bin + 1 == BINS { max } else { start + width };
        let mut total = KahanSum::default();
        let mut n = 0usize;
        for &v in data {
            let inside = v >= start && (v < end || (bin + 1 == BINS && v <= end));
            if inside {
                total.add(v);
                n += 1;
            }
        }
        if n == 0 {
            start + width / 2.0
        } else {
            total.value() / n as f64
        }
    };
    let base_bin = first_argmax(&counts[..BINS / 2])?;
    let top_bin = BINS / 2 + first_argmax(&counts[BINS / 2..])?;
    let base = level_of(base_bin);
    let mut top = level_of(top_bin);
    if top - base < 0.75 * (max - base) {
        top = max;
    }
    Some((top, base))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Rising,
    Falling,
}

/// First crossing of `level` in `direction` between consecutive samples `(i-1, i)` with
/// `i >= max(start, 1)`.
///
/// Returns `i` and the crossing point linearly interpolated on `x` (or on the sample
/// index when there is no abscissa).
pub fn crossing(
    data: &[f64],
    x: Option<&[f64]>,
    start: usize,
    level: f64,
    direction: Direction,
) -> Option<(usize, f64)> {
    let sign = match direction {
        Direction::Rising => 1.0,
        Direction::Falling => -1.0,
    };
    let side = |i: usize| sign * (data[i] - level);
    let position = |i: usize| x.map_or(i as f64, |x| x[i]);
    for i in start.max(1)..data.len() {
        let (before, after) = (side(i - 1), side(i));
        if before < 0.0 && after >= 0.0 {
            let (x0, x1) = (position(i - 1), position(i));
            let location = x0 + (level - data[i - 1]) * (x1 - x0) / (data[i] - data[i - 1]);
            return Some((i, location));
        }
    }
    None
}

/// Width of the pulse at `level` from the first rising crossing to the falling crossing
/// that follows the peak region (marked by `peak_level`).
///
/// Returns the two crossing points.
pub fn pulse_edges(data: &[f64], x: &[f64], level: f64, peak_level: f64) -> Option<(f64, f64)> {
    let (i1, p1) = crossing(data, Some(x), 0, level, Direction::Rising)?;
    for middle in [Direction::Falling, Direction::Rising] {
        let Some((i2, _)) = crossing(data, Some(x), i1, peak_level, middle) else {
            continue;
        };
        if let Some((_, p2)) = crossing(data, Some(x), i2, level, Direction::Falling) {
            return Some((p1, p2));
        }
    }
    None
}

/// Interval between the crossings of `first` and then `second` in `direction`.
pub fn transition_time(
    data: &[f64],
    x: &[f64],
    first: f64,
    second: f64,
    direction: Direction,
) -> Option<f64> {
    let (i1, p1) = crossing(data, Some(x), 0, first, direction)?;
    let (_, p2) = crossing(data, Some(x), i1, second, direction)?;
    Some(p2 - p1)
}

/// Index of the first sample at zero or where the sign changes before the next sample.
pub fn zero_crossing_index(data: &[f64]) -> Option<usize> {
    let n = data.len();
    (0..n.saturating_sub(1))
        .find(|&i| data[i] == 0.0 || data[i] * data[i + 1] < 0.0)
        .or_else(|| n.checked_sub(1).filter(|&last| data[last] == 0.0))
}

/// Abscissa of the zero crossing found at `i`.
pub fn zero_crossing_location(data: &[f64], x: &[f64], i: usize) -> f64 {
    if data[i] == 0.0 {
        return x[i];
    }
    x[i] + (x[i + 1] - x[i]) / (data[i + 1] - data[i]) * (-data[i])
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// Residual variance with n − 2 degrees of freedom; 0 for two points.
    pub variance: f64,
}

/// Unweighted least-squares line `y = intercept + slope·x`.
pub fn linear_fit(x: &[f64], y: &[f64]) -> Option<LinearFit> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let mut sx = KahanSum::default();
    let mut sy = KahanSum::default();
    for i in 0..n {
        sx.add(x[i]);
        sy.add(y[i]);
    }
    let (mx, my) = (sx.value() / n as f64, sy.value() / n as f64);
    let mut sxx = KahanSum::default();
    let mut sxy = KahanSum::default();
    for i in 0..n {
        let dx = x[i] - mx;
        sxx.add(dx * dx);
        sxy.add(dx * (y[i] - my));
    }
    if sxx.value() == 0.0 {
        return None;
    }
    let slope = sxy.value() / sxx.value();
    let intercept = my - slope * mx;
    let variance = if n > 2 {
        let mut ss = KahanSum::default();
        for i in 0..n {
            let r = y[i] - (intercept + slope * x[i]);
            ss.add(r * r);
        }
        ss.value() / (n - 2) as f64
    } else {
        0.0
    };
    Some(LinearFit {
        slope,
        intercept,
        variance,
    })
}

/// Pearson's r.
pub fn correlation(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let mx = x[..n].iter().sum::<f64>() / n as f64;
    let my = y[..n].iter().sum::<f64>() / n as f64;
    let mut sxy = KahanSum::default();
    let mut sxx = KahanSum::default();
    let mut syy = KahanSum::default();
    for i in 0..n {
        let (dx, dy) = (x[i] - mx, y[i] - my);
        sxy.add(dx * dy);
        sxx.add(dx * dx);
        syy.add(dy * dy);
    }
    let denominator = (sxx.value() * syy.value()).sqrt();
    if denominator == 0.0 {
        return None;
    }
    Some(sxy.value() / denominator)
}

pub fn trapezoid(x: &[f64], y: &[f64]) -> f64 {
    let mut total = KahanSum::default();
    for i in 1..x.len().min(y.len()) {
        total.add((x[i] - x[i - 1]) * (y[i] + y[i - 1]) / 2.0);
    }
    total.value()
}

/// Integral over `[x[k], x[k+1]]` of the cubic through the four points starting at `j`.
fn cubic_segment(x: &[f64], y: &[f64], j: usize, k: usize) -> f64 {
    // Newton divided differences in local coordinate t = x - x[k].
    let t: [f64; 4] = std::array::from_fn(|m| x[j + m] - x[k]);
    let mut c: [f64; 4] = std::array::from_fn(|m| y[j + m]);
    for level in 1..4 {
        for m in (level..4).rev() {
            c[m] = (c[m] - c[m - 1]) / (t[m] - t[m - level]);
        }
    }
    // Expand p(t) = c0 + c1(t-t0) + c2(t-t0)(t-t1) + c3(t-t0)(t-t1)(t-t2) into monomials.
    let mut poly = [0.0f64; 4];
    let mut basis = [1.0f64, 0.0, 0.0, 0.0];
    for m in 0..4 {
        for (p, b) in poly.iter_mut().zip(basis.iter()) {
            *p += c[m] * b;
        }
        if m < 3 {
            let mut next = [0.0f64; 4];
            for d in 0..3 {
                next[d + 1] += basis[d];
                next[d] -= t[m] * basis[d];
            }
            basis = next;
        }
    }
    let h = x[k + 1] - x[k];
    poly.iter()
        .enumerate()
        .map(|(d, a)| a * h.powi(d as i32 + 1) / (d + 1) as f64)
        .sum()
}

/// Gill–Miller integration: each interval integrates the cubic through the four nearest
/// points. Falls back to the trapezoid rule below four points.
pub fn gill_miller(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 4 {
        return trapezoid(&x[..n], &y[..n]);
    }
    let mut total = KahanSum::default();
    for k in 0..n - 1 {
        let j = k.saturating_sub(1).min(n - 4);
        total.add(cubic_segment(x, y, j, k));
    }
    total.value()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn seq() -> Reducer {
        Reducer::new(1)
    }

    #[test]
    fn moments() {
        let data = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let r = seq();
        assert_eq!(mean(&r, &data), Some(5.0));
        assert_eq!(sum(&r, &data, None), 40.0);
        let sd = standard_deviation(&r, &data, None).expect("sd");
        assert!((sd - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
        assert_eq!(mean_absolute_deviation(&r, &data, None), Some(1.5));
        assert_eq!(standard_deviation(&r, &[1.0], None), None);
    }

    #[test]
    fn unit_weights_match_unweighted() {
        let data = [1.0, 3.0, 8.0, -2.0, 5.5];
        let w = [1.0; 5];
        let r = seq();
        let a = standard_deviation(&r, &data, None).expect("sd");
        let b = standard_deviation(&r, &data, Some(&w)).expect("weighted sd");
        assert!((a - b).abs() < 1e-12);
        assert_eq!(rms(&r, &data, None), rms(&r, &data, Some(&w)));
    }

    #[test]
    fn percentiles_interpolate() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile_sorted(&sorted, 50.0), Some(2.5));
        assert_eq!(percentile_sorted(&sorted, 0.0), Some(1.0));
        assert_eq!(percentile_sorted(&sorted, 100.0), Some(4.0));
        assert_eq!(percentile_sorted(&sorted, 25.0), Some(1.75));
        assert_eq!(percentile_sorted(&[], 50.0), None);
    }

    #[test]
    fn mode_picks_the_busiest_bin() {
        let data = [0.0, 1.0, 1.0, 1.0, 2.0, 10.0];
        let m = mode(&data, Some(1.0)).expect("mode");
        assert_eq!(m, 1.5);
        assert_eq!(mode(&[3.0, 3.0], None), Some(3.0));
    }

    #[test]
    fn mode_refuses_an_oversized_histogram() {
        assert_eq!(mode(&[0.0, 1.0, 1.0], Some(1e-300)), None);
        assert_eq!(mode_bins(1.0, 1e-300), None);
        assert_eq!(mode_bins(1.0, 0.25), Some(5));
        assert_eq!(mode_bins(0.0, 1e-300), Some(1));
    }

    #[test]
    fn square_pulse_levels_and_width() {
        let x: Vec<f64> = (0..20).map(f64::from).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|&t| if (5.0..=12.0).contains(&t) { 10.0 } else { 0.0 })
            .collect();
        let (top, base) = top_base_levels(&y).expect("levels");
        assert_eq!((top, base), (10.0, 0.0));
        let (p1, p2) = pulse_edges(&y, &x, 5.0, 9.0).expect("edges");
        assert_eq!((p1, p2), (4.5, 12.5));
    }

    #[test]
    fn ramp_rise_time() {
        let x: Vec<f64> = (0..11).map(f64::from).collect();
        let y = x.clone();
        let rise = transition_time(&y, &x, 1.0, 9.0, Direction::Rising).expect("rise");
        assert_eq!(rise, 8.0);
        assert_eq!(transition_time(&y, &x, 9.0, 1.0, Direction::Falling), None);
    }

    #[test]
    fn zero_crossings() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [-2.0, -1.0, 1.0, 2.0];
        let i = zero_crossing_index(&y).expect("crossing");
        assert_eq!(i, 1);
        assert_eq!(zero_crossing_location(&y, &x, i), 1.5);
        assert_eq!(zero_crossing_index(&[1.0, 2.0, 3.0]), None);
        assert_eq!(zero_crossing_index(&[]), None);
    }

    #[test]
    fn zero_in_the_last_sample_is_a_crossing() {
        let x = [0.0, 1.0, 2.0];
        let y = [3.0, 1.0, 0.0];
        let i = zero_crossing_index(&y).expect("crossing");
        assert_eq!(i, 2);
        assert_eq!(zero_crossing_location(&y, &x, i), 2.0);
        assert_eq!(zero_crossing_index(&[0.0]), Some(0));
    }

    #[test]
    fn line_fit_and_correlation() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 3.0, 5.0, 7.0];
        let fit = linear_fit(&x, &y).expect("fit");
        assert_eq!((fit.slope, fit.intercept, fit.variance), (2.0, 1.0, 0.0));
        let r = correlation(&x, &y).expect("r");
        assert!((r - 1.0).abs() < 1e-15);
        assert_eq!(linear_fit(&[1.0, 1.0], &[2.0, 3.0]), None);
    }

    #[test]
    fn integrals_are_exact_for_low_order_polynomials() {
        let x: Vec<f64> = (0..=10).map(|i| i as f64 * 0.3).collect();
        let line: Vec<f64> = x.iter().map(|t| 2.0 * t + 1.0).collect();
        let end = 3.0f64;
        assert!((trapezoid(&x, &line) - (end * end + end)).abs() < 1e-12);
        let cubic: Vec<f64> = x.iter().map(|t| t * t * t - t).collect();
        let exact = end.powi(4) / 4.0 - end * end / 2.0;
        assert!((gill_miller(&x, &cubic) - exact).abs() < 1e-9);
        assert_eq!(gill_miller(&[0.0, 1.0], &[1.0, 1.0]), 1.0);
    }
}
