//! Markdown text extraction.

use crate::strategy::Extracted;
use pulldown_cmark::{Event, HeadingLevel, Parser, Tag};

pub(super) fn is_markdown(ext: &str) -> bool {
    matches!(ext, "md" | "markdown" | "mdown" | "mkd")
}

/// Flatten markdown to text, collecting the first H1 and all link targets.
pub(super) fn extract(markdown: &str, preserve_code_blocks: bool) -> Extracted {
    let mut text = String::new();
    let mut title: Option<String> = None;
    let mut links = Vec::new();
    let mut headings = 0usize;
    let mut heading_level: Option<HeadingLevel> = None;
    let mut current_heading = String::new();

    for event in Parser::new(markdown) {
        match event {
            Event::Start(Tag::Heading(level, _, _)) => {
                heading_level = Some(level);
                current_heading.clear();
            }
            Event::End(Tag::Heading(_, _, _)) => {
                if heading_level == Some(HeadingLevel::H1) && title.is_none() {
                    title = Some(current_heading.trim().to_string());
                }
                headings += 1;
                text.push_str(&current_heading);
                text.push_str("\n\n");
                heading_level = None;
            }
            Event::Start(Tag::CodeBlock(_)) if preserve_code_blocks => text.push_str("\n```\n"),
            Event::End(Tag::CodeBlock(_)) if preserve_code_blocks => text.push_str("```\n\n"),
            Event::Start(Tag::Link(_, dest, _)) => links.push(dest.to_string()),
            Event::End(Tag::Paragraph) => text.push_str("\n\n"),
            Event::End(Tag::List(_)) => text.push('\n'),
            Event::Start(Tag::Item) => text.push_str("- "),
            Event::End(Tag::Item) => text.push('\n'),
            Event::Text(t) => {
                if heading_level.is_some() {
                    current_heading.push_str(&t);
                } else {
                    text.push_str(&t);
                }
            }
            Event::Code(code) => {
                text.push('`');
                text.push_str(&code);
                text.push('`');
            }
            Event::SoftBreak | Event::HardBreak => text.push('\n'),
            _ => {}
        }
    }

    let text = text.trim().to_string();
    let mut extracted = Extracted::new(text)
        .with_metadata("format", serde_json::json!("markdown"))
        .with_metadata("links", serde_json::json!(links))
        .with_metadata("headings", serde_json::json!(headings))
        .with_metadata("original_length", serde_json::json!(markdown.len()));
    extracted.title_hint = title;
    extracted
}
