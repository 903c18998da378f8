//! YouTube video parser.

use super::{locator_identity, require_locator, Parser};
use crate::error::{IdentityError, IdentityResult};
use crate::identity::{web_url, RawInput, SourceIdentity};
use sluice_core::SourceKind;
use url::Url;

const VIDEO_ID_LEN: usize = 11;

/// Parser for YouTube video URLs in all their shapes.
pub struct YouTubeParser;

fn is_youtube_host(host: &str) -> bool {
    matches!(host, "youtube.com" | "music.youtube.com" | "youtu.be" | "youtube-nocookie.com")
}

fn valid_id(id: &str) -> bool {
    id.len() == VIDEO_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn video_id(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    if !is_youtube_host(host) {
        return None;
    }
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    let id = if host == "youtu.be" {
        segments.first().map(|s| s.to_string())
    } else {
        match segments.as_slice() {
            ["watch", ..] => url
                .query_pairs()
                .find(|(name, _)| name == "v")
                .map(|(_, value)| value.into_owned()),
            ["shorts" | "embed" | "live" | "v", id, ..] => Some(id.to_string()),
            _ => None,
        }
    }?;

    valid_id(&id).then_some(id)
}

impl Parser for YouTubeParser {
    fn kind(&self) -> SourceKind {
        SourceKind::YouTube
    }

    fn identify(&self, input: &RawInput) -> bool {
        input
            .as_locator()
            .and_then(web_url)
            .as_ref()
            .and_then(video_id)
            .is_some()
    }

    fn canonicalize(&self, input: &RawInput) -> IdentityResult<SourceIdentity> {
        let locator = require_locator(self.scheme(), input)?;
        let id = web_url(locator)
            .as_ref()
            .and_then(video_id)
            .ok_or_else(|| IdentityError::malformed(self.scheme(), locator, "no video id"))?;
        locator_identity(self.kind(), &id, locator)
    }
}
