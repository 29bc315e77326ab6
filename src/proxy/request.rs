use crate::error::ProxyError;
use crate::proxy::origin_guard::parse_target;
use std::collections::BTreeMap;
use tracing::{debug, warn};
use url::{Url, form_urlencoded};

/// A decoded inbound proxy request
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyRequest {
    /// Absolute origin URL to fetch
    pub target: Url,
    /// Caller-supplied header overrides, if the `headers` parameter parsed
    pub header_overrides: Option<BTreeMap<String, String>>,
    /// The `headers` parameter exactly as received. Forwarded unchanged into
    /// every rewritten reference, even when it did not parse.
    pub raw_headers: Option<String>,
}

impl ProxyRequest {
    /// Decode a raw (still percent-encoded) query string.
    ///
    /// `url` is required; `headers` is optional and best-effort: a value that
    /// is not a flat JSON object of strings is logged and ignored.
    ///
    /// # Errors
    /// - [`ProxyError::MissingTarget`] when `url` is absent or empty
    /// - [`ProxyError::InvalidTarget`] when `url` is not a fetchable absolute URL
    pub fn from_query(query: Option<&str>, block_private: bool) -> Result<Self, ProxyError> {
        let mut url_param: Option<String> = None;
        let mut headers_param: Option<String> = None;

        for (key, value) in form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
            match key.as_ref() {
                "url" if url_param.is_none() => url_param = Some(value.into_owned()),
                "headers" if headers_param.is_none() => headers_param = Some(value.into_owned()),
                _ => {}
            }
        }

        let raw_target = url_param
            .filter(|u| !u.is_empty())
            .ok_or(ProxyError::MissingTarget)?;
        let target = parse_target(&raw_target, block_private)?;

        let raw_headers = headers_param.filter(|h| !h.is_empty());
        let header_overrides = raw_headers.as_deref().and_then(parse_overrides);

        debug!(
            "Decoded proxy request for {} ({} header overrides)",
            target,
            header_overrides.as_ref().map_or(0, BTreeMap::len)
        );

        Ok(Self {
            target,
            header_overrides,
            raw_headers,
        })
    }
}

/// Parse the `headers` parameter, falling back to `None` on anything that is
/// not a flat string-to-string JSON object.
fn parse_overrides(raw: &str) -> Option<BTreeMap<String, String>> {
    match serde_json::from_str::<BTreeMap<String, String>>(raw) {
        Ok(map) => Some(map),
        Err(e) => {
            warn!(
                "Malformed headers parameter, using default headers only: {}",
                e
            );
            None
        }
    }
}
