//! Per-update performance metrics for the experiment scheduler.
//!
//! [`UpdateMetrics`] captures timing and work counts for a single
//! [`Experiment::update()`](crate::Experiment::update) call.

/// Timing and work counters collected during one `update()` call.
///
/// Durations are in microseconds. The experiment replaces these after
/// every successful call; read them via
/// [`last_metrics()`](crate::Experiment::last_metrics).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateMetrics {
    /// Wall-clock time for the whole call, in microseconds.
    pub total_us: u64,
    /// Time spent inside `next_update()` of regular processes, in microseconds.
    pub process_us: u64,
    /// Time spent applying batches and deriver updates, in microseconds.
    pub apply_us: u64,
    /// Number of scheduler iterations (one history emission each).
    pub batches: u32,
    /// Number of regular `next_update()` calls.
    pub process_calls: u32,
    /// Number of deriver runs.
    pub deriver_runs: u32,
    /// Processes added plus subtrees removed by structural updates.
    pub structural_events: u32,
    /// Live store nodes after the call.
    pub node_count: usize,
}
