//! Plain text and source code extraction.

use crate::strategy::Extracted;

/// Detect programming language from extension.
fn detect_language(extension: &str) -> Option<&'static str> {
    match extension.to_lowercase().as_str() {
        "rs" => Some("rust"),
        "py" => Some("python"),
        "js" | "jsx" => Some("javascript"),
        "ts" | "tsx" => Some("typescript"),
        "go" => Some("go"),
        "c" => Some("c"),
        "cpp" | "cc" | "cxx" | "h" | "hpp" => Some("cpp"),
        "java" => Some("java"),
        "rb" => Some("ruby"),
        "sh" | "bash" | "zsh" => Some("shell"),
        "json" => Some("json"),
        "yaml" | "yml" => Some("yaml"),
        "toml" => Some("toml"),
        "html" | "htm" => Some("html"),
        "css" => Some("css"),
        "sql" => Some("sql"),
        _ => None,
    }
}

pub(super) fn extract(content: &str, extension: &str) -> Extracted {
    let language = detect_language(extension);

    let mut extracted = Extracted::new(content)
        .with_metadata(
            "format",
            serde_json::json!(if language.is_some() { "code" } else { "text" }),
        )
        .with_metadata("length", serde_json::json!(content.len()))
        .with_metadata("lines", serde_json::json!(content.lines().count()));

    if let Some(lang) = language {
        extracted = extracted.with_metadata("language", serde_json::json!(lang));
    }
    extracted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text() {
        let doc = extract("This is a plain text file.\nWith multiple lines.\n", "txt");
        assert!(doc.text.contains("plain text file"));
        assert_eq!(doc.metadata["format"], "text");
        assert_eq!(doc.metadata["lines"], 2);
        assert!(doc.metadata.get("language").is_none());
    }

    #[test]
    fn test_code() {
        let doc = extract("fn main() {\n    println!(\"Hello, world!\");\n}\n", "rs");
        assert_eq!(doc.metadata["format"], "code");
        assert_eq!(doc.metadata["language"], "rust");
    }

    #[test]
    fn test_language_detection() {
        assert_eq!(detect_language("rs"), Some("rust"));
        assert_eq!(detect_language("py"), Some("python"));
        assert_eq!(detect_language("JS"), Some("javascript"));
        assert_eq!(detect_language("xyz"), None);
    }
}
