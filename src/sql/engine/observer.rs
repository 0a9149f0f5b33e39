use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// A pipeline phase. Each scope (the main query or one CTE) moves through
/// the phases in this order, skipping the ones its tree has no stage for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    Begin,
    From,
    Where,
    Select,
    End,
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Begin => "begin",
            Self::From => "from",
            Self::Where => "where",
            Self::Select => "select",
            Self::End => "end",
        })
    }
}

/// Receives progress notifications from a running query. Called from
/// worker threads when CTEs run in parallel.
pub trait QueryObserver: Send + Sync {
    /// The given scope entered a new pipeline phase.
    fn phase_changed(&self, scope: &str, phase: Phase);

    /// A table scan has read `rows` rows so far. Reported every
    /// `progress_interval` rows and once when the scan completes.
    fn source_progress(&self, table: &str, rows: usize);
}

/// An observer that ignores every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl QueryObserver for NoopObserver {
    fn phase_changed(&self, _: &str, _: Phase) {}

    fn source_progress(&self, _: &str, _: usize) {}
}
