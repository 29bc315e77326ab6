//! `/proxy` endpoint: fetch the target and stream it back, rewriting
//! playlists so every reference they contain routes through this service.

use crate::{
    error::{ProxyError, Result},
    hls::{Classification, ManifestRewriter, classify},
    metrics,
    proxy::{OriginResponse, ProxyRequest},
    server::state::AppState,
};
use axum::{
    body::{Body, Bytes},
    extract::{RawQuery, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures_util::{StreamExt, stream};
use std::time::Instant;
use tracing::{debug, info};

/// Never copied from the origin response
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
    "proxy-connection",
];

pub const ALLOW_METHODS: &str = "GET, HEAD, POST, PUT, DELETE, OPTIONS";
pub const ALLOW_HEADERS: &str = "Content-Type, Range";

const PLAYLIST_SIGNATURE: &[u8] = b"#EXTM3U";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const SNIFF_LEN: usize = UTF8_BOM.len() + PLAYLIST_SIGNATURE.len();

/// Relay one request to its origin
///
/// Origin statuses are mirrored. Only a bad `url` parameter, a transport
/// failure or an undecodable playlist produce a relay-level error.
pub async fn serve_proxy(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response> {
    let start = Instant::now();

    let result = relay(&state, query.as_deref(), &headers).await;

    let status = match &result {
        Ok(response) => response.status(),
        Err(e) => e.status(),
    };
    metrics::record_request("proxy", status.as_u16());
    metrics::record_duration("proxy", start);

    result
}

/// `OPTIONS /proxy`
pub async fn preflight() -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    apply_cors(response.headers_mut());
    response
}

async fn relay(state: &AppState, query: Option<&str>, inbound: &HeaderMap) -> Result<Response> {
    let request = ProxyRequest::from_query(query, state.config.block_private_origins)?;

    let origin = state
        .fetcher
        .fetch(&request, inbound.get(header::RANGE))
        .await
        .inspect_err(|_| metrics::record_origin_error())?;

    let content_type = origin.content_type();
    let classification = classify(request.target.path(), content_type.as_deref());
    debug!(
        "Origin answered {} for {} ({:?}, {:?})",
        origin.status, request.target, content_type, classification
    );

    // Error bodies are forwarded as-is, whatever they claim to be
    if !origin.status.is_success() {
        return Ok(stream_through(origin));
    }

    match classification {
        Classification::Passthrough => Ok(stream_through(origin)),
        Classification::Manifest => {
            let status = origin.status;
            let origin_headers = origin.headers.clone();
            let body = origin
                .bytes()
                .await
                .inspect_err(|_| metrics::record_origin_error())?;
            rewrite_manifest(state, &request, status, &origin_headers, &body)
        }
        Classification::MaybeManifest => sniff_transport_stream(state, &request, origin).await,
    }
}

/// Pass the origin body through chunk by chunk, without buffering
fn stream_through(origin: OriginResponse) -> Response {
    let status = origin.status;
    let headers = response_headers(&origin.headers, false);
    assemble(status, headers, Body::from_stream(origin.into_stream()))
}

/// `video/mp2t` bodies are usually segments. Only the first bytes are read
/// to check for a playlist signature; a segment is then streamed with those
/// chunks put back in front, so it is never held in memory.
async fn sniff_transport_stream(
    state: &AppState,
    request: &ProxyRequest,
    origin: OriginResponse,
) -> Result<Response> {
    let status = origin.status;
    let origin_headers = origin.headers.clone();
    let mut stream = Box::pin(origin.into_stream());

    let mut head: Vec<Bytes> = Vec::new();
    let mut prefix: Vec<u8> = Vec::with_capacity(SNIFF_LEN);
    let is_playlist = loop {
        if let Some(verdict) = sniff_playlist(&prefix) {
            break verdict;
        }
        match stream.next().await {
            Some(chunk) => {
                let chunk = chunk.inspect_err(|_| metrics::record_origin_error())?;
                let take = chunk.len().min(SNIFF_LEN - prefix.len());
                prefix.extend_from_slice(&chunk[..take]);
                head.push(chunk);
            }
            // Body ended before a verdict
            None => break looks_like_playlist(&prefix),
        }
    };

    if !is_playlist {
        debug!("{} is a transport stream, not a playlist", request.target);
        let replayed = stream::iter(head.into_iter().map(Ok::<_, reqwest::Error>)).chain(stream);
        return Ok(assemble(
            status,
            response_headers(&origin_headers, false),
            Body::from_stream(replayed),
        ));
    }

    let mut body: Vec<u8> = Vec::new();
    for chunk in head {
        body.extend_from_slice(&chunk);
    }
    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk.inspect_err(|_| metrics::record_origin_error())?);
    }

    rewrite_manifest(state, request, status, &origin_headers, &body)
}

fn rewrite_manifest(
    state: &AppState,
    request: &ProxyRequest,
    status: StatusCode,
    origin_headers: &HeaderMap,
    body: &[u8],
) -> Result<Response> {
    let text = std::str::from_utf8(body)
        .map_err(|e| ProxyError::ManifestDecode(format!("{}: {}", request.target, e)))?;

    let rewriter = ManifestRewriter::new(
        &request.target,
        &state.config.base_url,
        request.raw_headers.as_deref(),
    )?;
    let (rewritten, stats) = rewriter.rewrite(text);

    metrics::record_manifest_rewritten();
    info!(
        "Rewrote playlist {} ({} references)",
        request.target,
        stats.rewritten_references()
    );

    // Body changed; the server sets Content-Length from the new body
    Ok(assemble(
        status,
        response_headers(origin_headers, true),
        Body::from(rewritten),
    ))
}

/// `Some(verdict)` once `prefix` decides whether the body is a playlist,
/// `None` while more bytes are needed.
fn sniff_playlist(prefix: &[u8]) -> Option<bool> {
    let body = match prefix.strip_prefix(UTF8_BOM) {
        Some(rest) => rest,
        None if UTF8_BOM.starts_with(prefix) => return None,
        None => prefix,
    };

    if body.len() >= PLAYLIST_SIGNATURE.len() {
        Some(body.starts_with(PLAYLIST_SIGNATURE))
    } else if PLAYLIST_SIGNATURE.starts_with(body) {
        None
    } else {
        Some(false)
    }
}

fn looks_like_playlist(body: &[u8]) -> bool {
    body.strip_prefix(UTF8_BOM)
        .unwrap_or(body)
        .starts_with(PLAYLIST_SIGNATURE)
}

/// Origin headers minus hop-by-hop ones, with CORS forced. For a rewritten
/// body the length and byte-range headers no longer apply and are dropped.
fn response_headers(origin: &HeaderMap, rewritten: bool) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(origin.len() + 3);

    for (name, value) in origin {
        if HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
            continue;
        }
        if rewritten && (*name == header::CONTENT_LENGTH || *name == header::CONTENT_RANGE) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    apply_cors(&mut headers);
    headers
}

/// Replaces whatever the origin sent for these three
pub fn apply_cors(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
}

fn assemble(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
