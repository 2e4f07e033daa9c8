//! Trailing metadata ("bottom matter") appended to every emitted document.
//!
//! Layout: `<body>\n\n---\n<yaml mapping>---\n`. The trailer is part of the
//! hashed content, so a human edit to it counts as an edit.

use serde::{Deserialize, Serialize};

use crate::constants::layout::GENERATOR;
use crate::types::Result;

const FENCE: &str = "\n---\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trailer {
    pub id: String,
    pub repo_url: String,
    pub repo_name: String,
    pub doc_type: String,
    #[serde(default)]
    pub collection: String,
    /// Revision marker the body was generated against
    pub revision: String,
    pub generated_at: String,
    #[serde(default = "default_generator")]
    pub generator: String,
}

fn default_generator() -> String {
    GENERATOR.to_string()
}

impl Trailer {
    /// Full persisted content: body followed by this trailer.
    pub fn render(&self, body: &str) -> Result<String> {
        let yaml = serde_yaml::to_string(self)?;
        Ok(format!("{}\n{}{}---\n", body.trim_end(), FENCE, yaml))
    }
}

/// Split persisted content into body and trailer.
///
/// Returns `None` when the content carries no parsable trailer.
pub fn parse_trailer(content: &str) -> Option<(&str, Trailer)> {
    let without_close = content.strip_suffix("---\n")?;
    let open = without_close.rfind(FENCE)?;
    let yaml = &without_close[open + FENCE.len()..];
    let trailer = serde_yaml::from_str(yaml).ok()?;
    Some((without_close[..open].trim_end(), trailer))
}

/// Body of persisted content, or the whole content if it has no trailer.
pub fn strip_trailer(content: &str) -> &str {
    parse_trailer(content)
        .map(|(body, _)| body)
        .unwrap_or(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trailer() -> Trailer {
        Trailer {
            id: "widgets/overview".to_string(),
            repo_url: "https://github.com/acme/widgets".to_string(),
            repo_name: "acme/widgets".to_string(),
            doc_type: "overview".to_string(),
            collection: "widgets".to_string(),
            revision: "r1".to_string(),
            generated_at: "2026-01-01T00:00:00Z".to_string(),
            generator: GENERATOR.to_string(),
        }
    }

    #[test]
    fn test_render_layout() {
        let content = trailer().render("# Overview\n\nText.\n\n").unwrap();
        assert!(content.starts_with("# Overview\n\nText.\n\n---\nid: widgets/overview\n"));
        assert!(content.ends_with("---\n"));
        assert!(content.contains("revision: r1\n"));
    }

    #[test]
    fn test_parse_recovers_body_and_metadata() {
        let body = "# Overview\n\nA horizontal rule:\n\n---\n\nmore text";
        let content = trailer().render(body).unwrap();

        let (parsed_body, parsed) = parse_trailer(&content).unwrap();
        assert_eq!(parsed_body, body);
        assert_eq!(parsed, trailer());
    }

    #[test]
    fn test_missing_trailer() {
        assert!(parse_trailer("# Hand written\n").is_none());
        assert_eq!(strip_trailer("# Hand written\n"), "# Hand written\n");
    }
}
