//! Course progress.

/// Share of a course's lessons the learner has completed, in percent.
///
/// A course without lessons is at 0.
pub fn percentage(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    completed.min(total) as f64 / total as f64 * 100.0
}

/// Whether a course counts as finished at `progress`.
pub fn is_complete(progress: f64) -> bool {
    progress >= 100.0
}
