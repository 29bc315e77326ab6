use url::{ParseError, Url};

/// Directory containing the manifest: `scheme://host[:port]` plus the target
/// path up to and including its last `/`. Query and fragment are dropped.
pub fn manifest_base(target: &Url) -> String {
    let path = target.path();
    let dir = &path[..path.rfind('/').map_or(0, |i| i + 1)];
    format!("{}{}", target.origin().ascii_serialization(), dir)
}

/// Resolve `reference` against `base` the way a browser would.
///
/// Absolute URLs come back as-is (normalised), `//host/path` takes the
/// base's scheme, `/path` is rooted at the base's origin and anything else
/// is relative to the base's directory. Pure; no I/O.
pub fn resolve(reference: &str, base: &Url) -> Result<Url, ParseError> {
    base.join(reference.trim())
}
