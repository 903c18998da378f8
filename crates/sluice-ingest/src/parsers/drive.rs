//! Google Drive document parser.

use super::{locator_identity, require_locator, Parser};
use crate::error::{IdentityError, IdentityResult};
use crate::identity::{web_url, RawInput, SourceIdentity};
use sluice_core::SourceKind;
use url::Url;

/// Parser for Google Docs, Sheets, Slides and Drive file URLs.
pub struct DriveParser;

fn is_drive_host(host: &str) -> bool {
    matches!(host, "docs.google.com" | "drive.google.com")
}

fn document(url: &Url) -> Option<(&'static str, String)> {
    if !is_drive_host(url.host_str()?) {
        return None;
    }
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    let (class, rest) = match segments.as_slice() {
        ["document", rest @ ..] => ("doc", rest),
        ["spreadsheets", rest @ ..] => ("sheet", rest),
        ["presentation", rest @ ..] => ("slide", rest),
        ["file", rest @ ..] => ("file", rest),
        ["open"] => {
            let id = url.query_pairs().find(|(n, _)| n == "id")?.1.into_owned();
            return (!id.is_empty()).then_some(("file", id));
        }
        _ => return None,
    };

    // Skip the `/u/<n>` account selector
    let rest = match rest {
        ["u", _, tail @ ..] => tail,
        other => other,
    };
    match rest {
        ["d", id, ..] if !id.is_empty() => Some((class, id.to_string())),
        _ => None,
    }
}

impl Parser for DriveParser {
    fn kind(&self) -> SourceKind {
        SourceKind::Drive
    }

    fn identify(&self, input: &RawInput) -> bool {
        input
            .as_locator()
            .and_then(web_url)
            .as_ref()
            .and_then(document)
            .is_some()
    }

    fn canonicalize(&self, input: &RawInput) -> IdentityResult<SourceIdentity> {
        let locator = require_locator(self.scheme(), input)?;
        let (class, id) = web_url(locator)
            .as_ref()
            .and_then(document)
            .ok_or_else(|| IdentityError::malformed(self.scheme(), locator, "no document id"))?;
        locator_identity(self.kind(), &format!("{}/{}", class, id), locator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(input: &str) -> String {
        DriveParser
            .canonicalize(&RawInput::from(input))
            .unwrap()
            .key
            .to_string()
    }

    #[test]
    fn test_document_classes() {
        assert_eq!(
            key("https://docs.google.com/document/d/1AbC_dEf/edit#heading=h.1"),
            "drive:///doc/1AbC_dEf"
        );
        assert_eq!(
            key("https://docs.google.com/spreadsheets/u/1/d/1xyz/edit?gid=0"),
            "drive:///sheet/1xyz"
        );
        assert_eq!(
            key("https://docs.google.com/presentation/d/1slides/view"),
            "drive:///slide/1slides"
        );
        assert_eq!(key("https://drive.google.com/file/d/1file/view"), "drive:///file/1file");
        assert_eq!(key("https://drive.google.com/open?id=1file"), "drive:///file/1file");
    }

    #[test]
    fn test_non_documents_are_not_claimed() {
        for input in [
            "https://drive.google.com/drive/folders/abc",
            "https://docs.google.com/forms",
            "https://example.com/document/d/abc",
        ] {
            assert!(!DriveParser.identify(&RawInput::from(input)), "{}", input);
            assert!(DriveParser.canonicalize(&RawInput::from(input)).is_err());
        }
    }
}
