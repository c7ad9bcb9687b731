//! Built-in card kinds.

pub mod fill_in_blank;
pub mod infographic;
pub mod interactive_visual;
pub mod mc_question;
pub mod oral_exam;
pub mod text;

pub use fill_in_blank::{BlankOption, FillInBlankCard, FillInBlankContent};
pub use infographic::{InfographicCard, InfographicContent};
pub use interactive_visual::{InteractiveVisualCard, InteractiveVisualContent};
pub use mc_question::{McQuestionCard, McQuestionContent};
pub use oral_exam::{OralExamCard, OralExamContent};
pub use text::{TextCard, TextContent};
