#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
use rayon::prelude::*;
#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
use rayon::ThreadPool;

use super::stats::KahanSum;

/// Chunked compensated sums, spread over a thread pool owned by one pipeline run.
///
/// The data is split into `threads` contiguous chunks; each chunk is Kahan-summed and the
/// partial sums are combined in chunk order, so the result for a given thread count does
/// not depend on scheduling.
pub struct Reducer {
    threads: usize,
    #[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
    pool: Option<ThreadPool>,
}

impl std::fmt::Debug for Reducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reducer")
            .field("threads", &self.threads)
            .finish()
    }
}

#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
fn build_pool(threads: usize) -> Option<ThreadPool> {
    if threads <= 1 {
        return None;
    }
    let try_build = |n| rayon::ThreadPoolBuilder::new().num_threads(n).build();
    match try_build(threads) {
        Ok(pool) => Some(pool),
        Err(err) => {
            log::debug!("could not start {threads} reduction threads: {err}");
            None
        }
    }
}

/// Below this many samples a single chunk is used regardless of the thread count.
const MIN_PARALLEL_LEN: usize = 4096;

impl Reducer {
    pub fn new(threads: usize) -> Self {
        let threads = threads.max(1);
        Self {
            threads,
            #[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
            pool: build_pool(threads),
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    fn chunks(&self, len: usize) -> Vec<std::ops::Range<usize>> {
        let count = if len < MIN_PARALLEL_LEN { 1 } else { self.threads };
        let size = len.div_ceil(count).max(1);
        (0..len)
            .step_by(size)
            .map(|start| start..(start + size).min(len))
            .collect()
    }

    /// `Σ term(i)` for `i` in `0..len`.
    pub fn sum_by<F>(&self, len: usize, term: F) -> f64
    where
        F: Fn(usize) -> f64 + Sync,
    {
        let chunks = self.chunks(len);
        let partial = |range: &std::ops::Range<usize>| {
            let mut sum = KahanSum::default();
            for i in range.clone() {
                sum.add(term(i));
            }
            sum.value()
        };

        #[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
        let partials: Vec<f64> = match &self.pool {
            Some(pool) if chunks.len() > 1 => pool.install(|| chunks.par_iter().map(partial).collect()),
            _ => chunks.iter().map(partial).collect(),
        };
        #[cfg(not(all(feature = "parallel", not(target_arch = "wasm32"))))]
        let partials: Vec<f64> = chunks.iter().map(partial).collect();

        let mut total = KahanSum::default();
        for p in partials {
            total.add(p);
        }
        total.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_covers_every_index_once() {
        let reducer = Reducer::new(3);
        let chunks = reducer.chunks(10_000);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.first().map(|r| r.start), Some(0));
        assert_eq!(chunks.last().map(|r| r.end), Some(10_000));
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(reducer.chunks(10).len(), 1);
        assert!(Reducer::new(4).chunks(0).is_empty());
    }

    #[test]
    fn thread_count_does_not_change_exact_sums() {
        let data: Vec<f64> = (0..20_000).map(|i| (i % 97) as f64).collect();
        let expected: f64 = data.iter().sum();
        for threads in [1, 2, 4] {
            let reducer = Reducer::new(threads);
            assert_eq!(reducer.sum_by(data.len(), |i| data[i]), expected);
        }
    }
}
