//! Configuration for the scanning passes and the angle optimiser.

/// Parameters controlling the parallel candidate-scanning passes.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Number of consecutive rows handed to one worker at a time.
    /// Worker results are merged in chunk order, so this has no effect on
    /// the contents of the result, only on how the work is split.
    /// Default 10 000.
    pub rows_per_chunk: usize,
    /// If true, a pair scan keeps only the best-scoring partner row for each
    /// scanned row; otherwise every matching partner is kept.
    pub best_only: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            rows_per_chunk: 10_000,
            best_only: false,
        }
    }
}

impl ScanConfig {
    /// Chunk size to actually use (never zero).
    pub(crate) fn chunk_len(&self) -> usize {
        self.rows_per_chunk.max(1)
    }
}

/// Parameters for [`AngleOptimiser`](crate::AngleOptimiser).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimiserConfig {
    /// Convergence tolerance on the Newton step, in radians.
    pub tolerance: f64,
    /// Maximum number of Newton iterations for a single start angle.
    pub max_iterations: usize,
    /// Number of evenly spaced start angles tried around the circle.
    pub restarts: usize,
}

impl Default for OptimiserConfig {
    /// The settings used for ellipse orientation: 1e-8 rad, 40 iterations,
    /// 4 restarts.
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            max_iterations: 40,
            restarts: 4,
        }
    }
}
