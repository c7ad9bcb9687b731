//! Interactive visual card: a self-contained HTML document with inline CSS
//! and JS that demonstrates the concept.

use async_trait::async_trait;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{info, warn};

use crate::cards::{CardDescriptor, CardKind, GeneratedCard, GeneratorContext};
use crate::json::{clean_json_response, excerpt};
use crate::ports::PortResult;

pub const KIND: &str = "interactive_visual";
const DOCTYPE: &str = "<!DOCTYPE html>";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractiveVisualContent {
    pub title: String,
    /// Complete HTML document.
    pub html: String,
    #[serde(default)]
    pub description: String,
}

pub struct InteractiveVisualCard;

#[async_trait]
impl CardKind for InteractiveVisualCard {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn descriptor(&self) -> CardDescriptor {
        CardDescriptor {
            kind: KIND,
            name: "Interactive Visual",
            description: "A dynamic, interactive visualization created with HTML, CSS, and JavaScript. Complete browser code demonstrates the concept through animation and interactivity.",
            best_used_for: "Demonstrating processes, algorithms, physics concepts, mathematical relationships, state machines, or anything that benefits from dynamic visualization.",
            default_focus: "interactively explore the concept",
            example_output: serde_json::json!({
                "title": "Bubble Sort Visualization",
                "html": "<!DOCTYPE html><html>...</html>",
                "description": "An interactive animation showing how bubble sort compares and swaps adjacent elements"
            }),
        }
    }

    async fn generate(&self, ctx: &GeneratorContext<'_>) -> PortResult<GeneratedCard> {
        let prompt = format!(
            "You are creating an interactive visualization for an educational learning app.\n\n\
             Lesson: {title}\n{description}\n\n\
             Content to visualize:\n{content}\n\n\
             Your task: Create an interactive visualization that {focus}\n\n\
             Create a COMPLETE, self-contained HTML document that:\n\
             1. Demonstrates the concept through animation or interactivity\n\
             2. Works in a 400x300px viewport but is responsive\n\
             3. Uses NO external dependencies (no CDN links, no imports)\n\
             4. Keeps ALL CSS in a <style> tag and ALL JavaScript in a <script> tag before </body>\n\
             5. Uses a dark background with vibrant accents and clear labels\n\n\
             Return ONLY a JSON object with \"title\", \"html\" (starting with {doctype}) and \
             \"description\". Escape quotes in the HTML properly for JSON.\n\
             No markdown code blocks, just the raw JSON.",
            title = ctx.lesson.title,
            description = ctx.lesson.description_line(),
            content = excerpt(&ctx.lesson.content, 8_000),
            focus = ctx.focus,
            doctype = DOCTYPE,
        );

        let raw = ctx.services.text.generate_text(&prompt).await?;
        let content = parse_visual(&raw).unwrap_or_else(|| {
            warn!("[InteractiveVisual] Failed to parse response, using placeholder");
            fallback(ctx)
        });
        GeneratedCard::new(KIND, &content)
    }
}

/// Parses the model output, retrying once with raw control characters in
/// the `html` value escaped.
fn parse_visual(raw: &str) -> Option<InteractiveVisualContent> {
    let cleaned = clean_json_response(raw);
    let parsed = match serde_json::from_str::<InteractiveVisualContent>(&cleaned) {
        Ok(content) => content,
        Err(_) => {
            let content =
                serde_json::from_str::<InteractiveVisualContent>(&escape_html_value(&cleaned)).ok()?;
            info!("[InteractiveVisual] Parsed after fixing escaping");
            content
        }
    };

    if parsed.title.trim().is_empty() || parsed.html.trim().is_empty() {
        return None;
    }
    Some(InteractiveVisualContent {
        html: ensure_document(parsed.html),
        ..parsed
    })
}

/// Wraps an HTML fragment in a minimal document shell.
fn ensure_document(html: String) -> String {
    if html.contains(DOCTYPE) {
        return html;
    }
    format!(
        "{DOCTYPE}<html><head><meta charset=\"UTF-8\"><meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\
         <style>body{{margin:0;padding:20px;font-family:system-ui,sans-serif;background:#1a1a2e;color:#fff;min-height:100vh;box-sizing:border-box;}}</style>\
         </head><body>{html}</body></html>"
    )
}

/// Matches the `"html"` string value, which ends at the first quote followed
/// by either `, "description"` or `}`.
static HTML_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""html"\s*:\s*"([\s\S]*?)(?:"\s*,\s*"description"|"\s*\})"#)
        .expect("html value pattern is valid")
});

/// Escapes literal tabs and newlines inside the `"html"` string value.
///
/// Models often emit the document with real line breaks, which is invalid
/// JSON.
fn escape_html_value(json: &str) -> String {
    HTML_VALUE
        .replace(json, |caps: &Captures<'_>| {
            let (Some(whole), Some(value)) = (caps.get(0), caps.get(1)) else {
                return caps[0].to_string();
            };
            let head = &json[whole.start()..value.start()];
            let tail = &json[value.end()..whole.end()];
            format!("{}{}{}", head, escape_control_chars(value.as_str()), tail)
        })
        .into_owned()
}

/// Escapes raw tabs and line breaks that are not already preceded by a
/// backslash.
fn escape_control_chars(value: &str) -> String {
    let mut fixed = String::with_capacity(value.len() + 64);
    let mut prev = '\0';
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\t' if prev != '\\' => fixed.push_str("\\t"),
            '\r' if chars.peek() == Some(&'\n') => {
                chars.next();
                fixed.push_str("\\n");
            }
            '\r' | '\n' if prev != '\\' => fixed.push_str("\\n"),
            other => fixed.push(other),
        }
        prev = c;
    }
    fixed
}

fn fallback(ctx: &GeneratorContext<'_>) -> InteractiveVisualContent {
    let html = format!(
        "{DOCTYPE}\n<html>\n<head>\n<meta charset=\"UTF-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
         <style>\n\
         body {{ margin: 0; padding: 20px; font-family: system-ui, -apple-system, sans-serif; \
         background: linear-gradient(135deg, #1a1a2e 0%, #16213e 100%); color: #fff; \
         min-height: 100vh; box-sizing: border-box; display: flex; flex-direction: column; \
         align-items: center; justify-content: center; }}\n\
         h1 {{ font-size: 1.5rem; margin-bottom: 1rem; text-align: center; }}\n\
         p {{ color: #a0a0a0; text-align: center; max-width: 300px; }}\n\
         </style>\n</head>\n<body>\n\
         <h1>{title}</h1>\n\
         <p>Interactive visualization about: {focus}</p>\n\
         </body>\n</html>",
        title = ctx.lesson.title,
        focus = ctx.focus,
    );
    InteractiveVisualContent {
        title: ctx.lesson.title.clone(),
        html,
        description: format!("Visualization about {}", ctx.focus),
    }
}
