mod common;

use sdds_engine::{
    Analysis, Operator, PageOutcome, Pipeline, PipelineOptions, ProcessSpec,
};
use sdds_model::{Layout, Page};

use common::{dataset, doubles};

const SIZES: [usize; 4] = [1, 2, 5, 1000];

fn signal(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let t = i as f64;
            (t * 0.37).sin() * 4.0 + t * 0.01 - 1.5
        })
        .collect()
}

fn weights(n: usize) -> Vec<f64> {
    (0..n).map(|i| 1.0 + (i % 3) as f64).collect()
}

fn close(actual: f64, expected: f64) -> bool {
    if expected.is_nan() {
        return actual.is_nan();
    }
    (actual - expected).abs() <= 1e-9 * expected.abs().max(1.0)
}

fn results(layout: &Layout, page: &Page, specs: Vec<ProcessSpec>, threads: usize) -> Vec<f64> {
    let names: Vec<String> = specs.iter().map(|s| s.result.clone()).collect();
    let ops = specs
        .into_iter()
        .map(|spec| Operator::Process(Box::new(spec)))
        .collect();
    let options = PipelineOptions {
        threads,
        warnings: false,
        ..PipelineOptions::default()
    };
    let mut pipeline = Pipeline::new(layout, ops, options).expect("pipeline");
    let PageOutcome::Emit(out) = pipeline.process_page(page).expect("page") else {
        panic!("page not emitted");
    };
    names
        .iter()
        .map(|name| {
            out.parameter(name)
                .and_then(|v| v.to_f64().ok())
                .expect("numeric result")
        })
        .collect()
}

struct Direct {
    mean: f64,
    weighted_mean: f64,
    sum: f64,
    rms: f64,
    stdev: f64,
    mad: f64,
    min: f64,
    max: f64,
    median: f64,
}

fn direct(data: &[f64], w: &[f64]) -> Direct {
    let n = data.len() as f64;
    let sum: f64 = data.iter().sum();
    let mean = sum / n;
    let sum_w: f64 = w.iter().sum();
    let weighted_mean = data.iter().zip(w).map(|(x, w)| x * w).sum::<f64>() / sum_w;
    let rms = (data.iter().map(|x| x * x).sum::<f64>() / n).sqrt();
    let stdev = if data.len() < 2 {
        f64::NAN
    } else {
        (data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    };
    let mad = data.iter().map(|x| (x - mean).abs()).sum::<f64>() / n;
    let mut sorted = data.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = (sorted.len() - 1) as f64 / 2.0;
    let median = (sorted[mid.floor() as usize] + sorted[mid.ceil() as usize]) / 2.0;
    Direct {
        mean,
        weighted_mean,
        sum,
        rms,
        stdev,
        mad,
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        median,
    }
}

fn specs() -> Vec<ProcessSpec> {
    let mut weighted = ProcessSpec::new("y", Analysis::Average, "wAvg");
    weighted.weight_by = Some("w".into());
    vec![
        ProcessSpec::new("y", Analysis::Average, "avg"),
        weighted,
        ProcessSpec::new("y", Analysis::Sum, "sum"),
        ProcessSpec::new("y", Analysis::Rms, "rms"),
        ProcessSpec::new("y", Analysis::StandardDeviation, "sd"),
        ProcessSpec::new("y", Analysis::Mad, "mad"),
        ProcessSpec::new("y", Analysis::Minimum, "min"),
        ProcessSpec::new("y", Analysis::Maximum, "max"),
        ProcessSpec::new("y", Analysis::Spread, "spread"),
        ProcessSpec::new("y", Analysis::Median, "median"),
        ProcessSpec::new("y", Analysis::Count, "count"),
        ProcessSpec::new("y", Analysis::First, "first"),
        ProcessSpec::new("y", Analysis::Last, "last"),
    ]
}

#[test]
fn analyses_match_direct_computation() {
    for n in SIZES {
        let y = signal(n);
        let w = weights(n);
        let (layout, page) = dataset(
            &[("y", doubles(y.iter().copied())), ("w", doubles(w.iter().copied()))],
            &[],
        );
        let got = results(&layout, &page, specs(), 1);
        let d = direct(&y, &w);
        let expected = [
            d.mean,
            d.weighted_mean,
            d.sum,
            d.rms,
            d.stdev,
            d.mad,
            d.min,
            d.max,
            d.max - d.min,
            d.median,
            n as f64,
            y[0],
            y[n - 1],
        ];
        for ((spec, actual), expected) in specs().iter().zip(&got).zip(expected) {
            assert!(
                close(*actual, expected),
                "{} with {n} rows: got {actual}, expected {expected}",
                spec.result
            );
        }
    }
}

#[test]
fn worker_threads_do_not_change_results() {
    let n = 100_000;
    let y = signal(n);
    let w = weights(n);
    let (layout, page) = dataset(&[("y", doubles(y)), ("w", doubles(w))], &[]);
    let serial = results(&layout, &page, specs(), 1);
    let parallel = results(&layout, &page, specs(), 4);
    for ((spec, a), b) in specs().iter().zip(&serial).zip(&parallel) {
        assert!(close(*a, *b), "{}: {a} vs {b}", spec.result);
    }
}

#[test]
fn line_fit_recovers_slope_and_intercept() {
    for n in [2, 5, 1000] {
        let x: Vec<f64> = (0..n).map(|i| i as f64 * 0.5).collect();
        let y: Vec<f64> = x.iter().map(|x| 3.0 * x - 2.0).collect();
        let (layout, page) = dataset(&[("x", doubles(x)), ("y", doubles(y))], &[]);
        let mut slope = ProcessSpec::new("y", Analysis::Slope, "slope");
        slope.function_of = Some("x".into());
        let mut intercept = ProcessSpec::new("y", Analysis::Intercept, "intercept");
        intercept.function_of = Some("x".into());
        let mut integral = ProcessSpec::new("y", Analysis::Integral, "integral");
        integral.function_of = Some("x".into());
        let got = results(&layout, &page, vec![slope, intercept, integral], 1);

        let end = (n - 1) as f64 * 0.5;
        assert!(close(got[0], 3.0), "slope {}", got[0]);
        assert!(close(got[1], -2.0), "intercept {}", got[1]);
        assert!(close(got[2], 1.5 * end * end - 2.0 * end), "integral {}", got[2]);
    }
}

#[test]
fn single_sample_deviation_uses_the_default() {
    let (layout, page) = dataset(&[("y", doubles([4.0]))], &[]);
    let mut sd = ProcessSpec::new("y", Analysis::StandardDeviation, "sd");
    sd.default = Some(0.0);
    let got = results(&layout, &page, vec![sd], 1);
    assert_eq!(got, [0.0]);
}
