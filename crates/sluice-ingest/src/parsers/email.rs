//! Gmail message parser.

use super::{locator_identity, require_locator, Parser};
use crate::error::{IdentityError, IdentityResult};
use crate::identity::{web_url, RawInput, SourceIdentity};
use sluice_core::SourceKind;

const MESSAGE_ID_LEN: usize = 16;

/// Parser for Gmail message URLs and bare message ids.
pub struct EmailParser;

fn is_message_id(s: &str) -> bool {
    s.len() == MESSAGE_ID_LEN && s.chars().all(|c| c.is_ascii_hexdigit())
}

fn message_id(locator: &str) -> Option<String> {
    if is_message_id(locator) {
        return Some(locator.to_lowercase());
    }

    let url = web_url(locator)?;
    if url.host_str()? != "mail.google.com" {
        return None;
    }
    // The id lives in the fragment: #inbox/<id>, #label/Foo/<id>
    let fragment = url.fragment()?;
    let id = fragment.rsplit('/').next()?;
    is_message_id(id).then(|| id.to_lowercase())
}

impl Parser for EmailParser {
    fn kind(&self) -> SourceKind {
        SourceKind::Email
    }

    fn identify(&self, input: &RawInput) -> bool {
        input
            .as_locator()
            .is_some_and(|locator| message_id(locator).is_some())
    }

    fn canonicalize(&self, input: &RawInput) -> IdentityResult<SourceIdentity> {
        let locator = require_locator(self.scheme(), input)?;
        let id = message_id(locator)
            .ok_or_else(|| IdentityError::malformed(self.scheme(), locator, "no message id"))?;
        locator_identity(self.kind(), &format!("gmail/{}", id), locator)
    }
}
