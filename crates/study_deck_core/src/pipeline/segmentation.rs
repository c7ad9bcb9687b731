//! Lesson segmentation: lesson titles from the model, chunk ranges from
//! arithmetic.

use serde::Deserialize;
use tracing::{info, warn};

use crate::json::{excerpt, parse_model_json};
use crate::ports::{PortResult, TextGenerationService};

const SEGMENTATION_CONTENT_CHARS: usize = 15_000;
const PAGE_BREAK: &str = "\n\n---PAGE BREAK---\n\n";

/// Title and description of one lesson, before it is placed on chunks.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LessonOutline {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl LessonOutline {
    fn new(title: &str, description: &str) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
        }
    }
}

/// Inclusive chunk index range covered by one lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub start: i32,
    pub end: i32,
}

pub fn fallback_outlines() -> Vec<LessonOutline> {
    vec![
        LessonOutline::new("Getting Started", "Introduction to the topic"),
        LessonOutline::new("Core Concepts", "Understanding the fundamentals"),
        LessonOutline::new("Practice & Application", "Apply what you've learned"),
    ]
}

pub fn segmentation_prompt(pages: &[String]) -> String {
    let all_content = pages.join(PAGE_BREAK);
    format!(
        "Based on the following educational content, create 5-8 lesson titles for a bite-sized learning path.\n\
         Each lesson should focus on a specific concept or topic from the material.\n\
         The lessons should be ordered from foundational concepts to more advanced ones.\n\n\
         Content:\n{}\n\n\
         Return ONLY a JSON array of objects with \"title\" and \"description\" fields.\n\
         Example: [{{\"title\": \"Introduction to Variables\", \"description\": \"Learn the basics of variable declaration and usage\"}}]\n\n\
         Important: Return ONLY valid JSON, no markdown formatting or code blocks.",
        excerpt(&all_content, SEGMENTATION_CONTENT_CHARS)
    )
}

/// Parses the model's lesson list; anything unusable yields the three
/// fallback lessons.
pub fn parse_outlines(raw: &str) -> Vec<LessonOutline> {
    match parse_model_json::<Vec<LessonOutline>>(raw) {
        Ok(outlines) => {
            let outlines: Vec<LessonOutline> = outlines
                .into_iter()
                .filter(|o| !o.title.trim().is_empty())
                .collect();
            if outlines.is_empty() {
                warn!("[Lessons] Model returned no lessons, using fallback");
                fallback_outlines()
            } else {
                outlines
            }
        }
        Err(e) => {
            warn!("[Lessons] Failed to parse lessons JSON, using fallback: {}", e);
            fallback_outlines()
        }
    }
}

/// Asks the model for the lesson outline of a document.
pub async fn segment_lessons(
    text: &dyn TextGenerationService,
    pages: &[String],
) -> PortResult<Vec<LessonOutline>> {
    let raw = text.generate_text(&segmentation_prompt(pages)).await?;
    let outlines = parse_outlines(&raw);
    info!("[Lessons] Segmented into {} lessons", outlines.len());
    Ok(outlines)
}

/// Splits `total_chunks` into contiguous, balanced ranges: every lesson gets
/// `total / lessons` chunks and the first `total % lessons` get one more.
///
/// Only when there are fewer chunks than lessons is the result shorter than
/// `lesson_count`, one chunk per lesson.
pub fn compute_chunk_ranges(total_chunks: usize, lesson_count: usize) -> Vec<ChunkRange> {
    if total_chunks == 0 || lesson_count == 0 {
        return Vec::new();
    }
    let lessons = lesson_count.min(total_chunks);
    let base = total_chunks / lessons;
    let extra = total_chunks % lessons;

    let mut start = 0;
    (0..lessons)
        .map(|i| {
            let len = base + usize::from(i < extra);
            let range = ChunkRange {
                start: start as i32,
                end: (start + len - 1) as i32,
            };
            start += len;
            range
        })
        .collect()
}
