//! The content pipeline: document processing, lesson card generation and
//! learner scoring, each driving its entity's status state machine.

pub mod completion;
pub mod extraction;
pub mod processor;
pub mod segmentation;
pub mod trigger;

use chrono::{DateTime, Utc};
use std::time::Duration;

pub use completion::{complete_lesson, score_attempt, ScoredAttempt, PASSING_SCORE};
pub use processor::{DocumentProcessor, ProcessOutcome};
pub use segmentation::{compute_chunk_ranges, ChunkRange, LessonOutline};
pub use trigger::{LessonGenerationTrigger, TriggerOutcome};

/// Rows whose in-progress status was last touched before this instant are
/// considered abandoned and may be claimed again.
pub(crate) fn stale_cutoff(stale_after: Duration) -> DateTime<Utc> {
    let age = chrono::Duration::from_std(stale_after).unwrap_or_else(|_| chrono::Duration::weeks(52));
    Utc::now() - age
}
