/// Content-type fragments that mark a response as an HLS playlist.
///
/// Matched as substrings of the lower-cased `Content-Type`. Origins are
/// inconsistent here, which is why the path suffix is checked as well.
pub const PLAYLIST_CONTENT_TYPES: &[&str] = &[
    "application/vnd.apple.mpegurl",
    "application/vnd.apple.mpegurl.audio",
    "application/vnd.apple.mpegurl.video",
    "application/x-mpegurl",
    "application/mpegurl",
    "audio/mpegurl",
    "audio/x-mpegurl",
    "video/x-mpegurl",
];

/// Some origins label playlists with the transport-stream type
pub const MPEG_TS_CONTENT_TYPE: &str = "video/mp2t";

/// How a fetched response should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Stream the body through untouched
    Passthrough,
    /// Buffer and rewrite
    Manifest,
    /// Only the transport-stream content type matched. Buffered, rewritten
    /// if it turns out to be a playlist, otherwise returned byte-for-byte.
    MaybeManifest,
}

impl Classification {
    pub fn is_manifest(self) -> bool {
        !matches!(self, Classification::Passthrough)
    }
}

/// Classify a response from its target path and `Content-Type` header.
///
/// `content_type` is expected lower-cased (see `OriginResponse::content_type`).
pub fn classify(path: &str, content_type: Option<&str>) -> Classification {
    if path.ends_with(".m3u8") {
        return Classification::Manifest;
    }

    let Some(content_type) = content_type else {
        return Classification::Passthrough;
    };

    if PLAYLIST_CONTENT_TYPES
        .iter()
        .any(|alias| content_type.contains(alias))
    {
        Classification::Manifest
    } else if content_type.contains(MPEG_TS_CONTENT_TYPE) {
        Classification::MaybeManifest
    } else {
        Classification::Passthrough
    }
}
