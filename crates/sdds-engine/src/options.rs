use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sdds_model::{Description, MajorOrder};

/// Run-wide settings for a [`crate::Pipeline`].
#[derive(Clone, Debug)]
pub struct PipelineOptions {
    /// Emit warning diagnostics (no rows selected, failed rows, failed analyses).
    pub warnings: bool,
    /// Worker threads for chunked reductions; 0 or 1 runs them on the calling thread.
    pub threads: usize,
    /// Seed for `sample` and the evaluator's random builtins; entropy when `None`.
    pub seed: Option<u64>,
    /// Recompile `@parameter` expressions on every page instead of only the first time a
    /// given expression text is seen.
    pub reparse_indirect_expressions: bool,
    /// Replaces the output description when set.
    pub description: Option<Description>,
    /// Replaces the output major order when set.
    pub major_order: Option<MajorOrder>,
    /// Cooperative cancellation, checked between pages and inside row loops.
    pub abort: Arc<AtomicBool>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            warnings: true,
            threads: 1,
            seed: None,
            reparse_indirect_expressions: true,
            description: None,
            major_order: None,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl PipelineOptions {
    pub fn aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }
}
