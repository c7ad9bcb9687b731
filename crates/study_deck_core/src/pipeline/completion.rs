//! Learner scoring for a finished lesson attempt.

use tracing::info;
use uuid::Uuid;

use crate::domain::{LessonProgressUpdate, LessonStatus};
use crate::ports::{DatabaseService, PortError, PortResult};

/// Minimum percentage that counts as passing.
pub const PASSING_SCORE: f64 = 70.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredAttempt {
    pub passed: bool,
    pub score: f64,
    pub new_best_score: bool,
    pub update: LessonProgressUpdate,
}

/// Applies the scoring rules to one attempt. `score` is a percentage.
pub fn score_attempt(score: f64, best_score: Option<i32>) -> PortResult<ScoredAttempt> {
    if !score.is_finite() || !(0.0..=100.0).contains(&score) {
        return Err(PortError::InvalidInput(
            "Invalid score. Must be a number between 0 and 100.".to_string(),
        ));
    }

    let passed = score >= PASSING_SCORE;
    let rounded = score.round() as i32;
    let new_best_score = best_score.map_or(true, |best| rounded > best);

    Ok(ScoredAttempt {
        passed,
        score,
        new_best_score,
        update: LessonProgressUpdate {
            is_completed: passed.then_some(true),
            best_score: new_best_score.then_some(rounded),
        },
    })
}

/// Records an attempt on a `ready` lesson.
pub async fn complete_lesson(
    db: &dyn DatabaseService,
    lesson_id: Uuid,
    score: f64,
) -> PortResult<ScoredAttempt> {
    let lesson = db.get_lesson(lesson_id).await?;
    if lesson.status != LessonStatus::Ready {
        return Err(PortError::InvalidInput(format!(
            "Lesson is {}, cards must be generated before it can be completed",
            lesson.status
        )));
    }

    let attempt = score_attempt(score, lesson.best_score)?;
    if !attempt.update.is_empty() {
        db.update_lesson_progress(lesson_id, attempt.update.clone())
            .await?;
    }
    info!(
        "[Complete] Lesson {}: {} with {}%",
        lesson_id,
        if attempt.passed { "PASSED" } else { "FAILED" },
        score
    );
    Ok(attempt)
}
