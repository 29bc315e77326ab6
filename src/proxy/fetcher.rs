//! Outbound request to the origin.
//!
//! Exactly one request is made per inbound proxy request. The origin's
//! status and headers are surfaced untouched; error statuses are not treated
//! as failures here.

use crate::error::{ProxyError, Result};
use crate::proxy::request::ProxyRequest;
use axum::body::Bytes;
use futures_util::{Stream, TryStreamExt};
use reqwest::{
    Client, StatusCode,
    header::{self, HeaderMap, HeaderName, HeaderValue},
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Headers the caller may not override: they describe the connection to the
/// origin, which the HTTP client owns.
const RESERVED_HEADERS: &[&str] = &["host", "connection", "content-length", "transfer-encoding"];

/// Issues origin requests with the layered header bundle
#[derive(Clone, Debug)]
pub struct OriginFetcher {
    client: Client,
    defaults: Arc<BTreeMap<String, String>>,
}

/// Origin status and headers, with the body not yet consumed
#[derive(Debug)]
pub struct OriginResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    inner: reqwest::Response,
}

impl OriginFetcher {
    pub fn new(client: Client, defaults: Arc<BTreeMap<String, String>>) -> Self {
        Self { client, defaults }
    }

    /// Build the shared HTTP client used for every origin request.
    ///
    /// Only a connect timeout is applied; request duration is unbounded so
    /// long segment downloads are never cut off.
    pub fn build_client(connect_timeout: Duration) -> Result<Client> {
        Client::builder()
            .connect_timeout(connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| ProxyError::Internal(format!("Failed to create HTTP client: {e}")))
    }

    /// Layer default headers, caller overrides and the inbound `Range`
    /// header, later sources winning on name collision.
    pub fn build_headers(
        &self,
        overrides: Option<&BTreeMap<String, String>>,
        range: Option<&HeaderValue>,
    ) -> HeaderMap {
        let mut headers = HeaderMap::new();

        let layers = std::iter::once(self.defaults.as_ref()).chain(overrides);
        for (name, value) in layers.flat_map(|layer| layer.iter()) {
            let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
                warn!("Skipping invalid header name: {:?}", name);
                continue;
            };
            if RESERVED_HEADERS.contains(&name.as_str()) {
                debug!("Skipping reserved header: {}", name);
                continue;
            }
            let Ok(value) = HeaderValue::from_str(value) else {
                warn!("Skipping invalid value for header {}", name);
                continue;
            };
            headers.insert(name, value);
        }

        if let Some(range) = range {
            headers.insert(header::RANGE, range.clone());
        }

        headers
    }

    /// Send the single outbound GET for `request`.
    ///
    /// # Errors
    /// Returns [`ProxyError::OriginFailure`] only for transport failures;
    /// any HTTP status from the origin is returned as a response.
    pub async fn fetch(
        &self,
        request: &ProxyRequest,
        range: Option<&HeaderValue>,
    ) -> Result<OriginResponse> {
        let headers = self.build_headers(request.header_overrides.as_ref(), range);

        debug!(
            "Fetching {} with {} outbound headers",
            request.target,
            headers.len()
        );

        let response = self
            .client
            .get(request.target.clone())
            .headers(headers)
            .send()
            .await?;

        Ok(OriginResponse {
            status: response.status(),
            headers: response.headers().clone(),
            inner: response,
        })
    }
}

impl OriginResponse {
    /// Lower-cased `Content-Type`, if present and readable
    pub fn content_type(&self) -> Option<String> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_ascii_lowercase)
    }

    /// Buffer the whole body (manifests only)
    pub async fn bytes(self) -> Result<Bytes> {
        Ok(self.inner.bytes().await?)
    }

    /// Body as a chunk stream, for pass-through without buffering
    pub fn into_stream(self) -> impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static {
        self.inner
            .bytes_stream()
            .inspect_err(|e| warn!("Origin body stream failed: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header as header_is, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(defaults: &[(&str, &str)]) -> OriginFetcher {
        let defaults = defaults
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        OriginFetcher::new(Client::new(), Arc::new(defaults))
    }

    fn overrides(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn request_for(url: &str, header_overrides: Option<BTreeMap<String, String>>) -> ProxyRequest {
        ProxyRequest {
            target: url.parse().unwrap(),
            header_overrides,
            raw_headers: None,
        }
    }

    #[test]
    fn defaults_only() {
        let f = fetcher(&[("Referer", "https://default.example/")]);
        let headers = f.build_headers(None, None);
        assert_eq!(headers.get("referer").unwrap(), "https://default.example/");
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn overrides_beat_defaults_case_insensitively() {
        let f = fetcher(&[("Cookie", "session=default"), ("User-Agent", "relay")]);
        let o = overrides(&[("cookie", "session=caller")]);
        let headers = f.build_headers(Some(&o), None);

        assert_eq!(headers.get(header::COOKIE).unwrap(), "session=caller");
        assert_eq!(headers.get_all(header::COOKIE).iter().count(), 1);
        assert_eq!(headers.get(header::USER_AGENT).unwrap(), "relay");
    }

    #[test]
    fn inbound_range_always_wins() {
        let f = fetcher(&[("Range", "bytes=0-")]);
        let o = overrides(&[("Range", "bytes=10-20")]);
        let range = HeaderValue::from_static("bytes=100-199");
        let headers = f.build_headers(Some(&o), Some(&range));
        assert_eq!(headers.get(header::RANGE).unwrap(), "bytes=100-199");
    }

    #[test]
    fn invalid_and_reserved_headers_skipped() {
        let f = fetcher(&[]);
        let o = overrides(&[
            ("bad header", "x"),
            ("X-Ok", "yes"),
            ("X-Newline", "a\nb"),
            ("Host", "evil.example"),
        ]);
        let headers = f.build_headers(Some(&o), None);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("x-ok").unwrap(), "yes");
    }

    #[tokio::test]
    async fn sends_merged_headers_to_origin() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/show/index.m3u8"))
            .and(header_is("referer", "https://caller.example/"))
            .and(header_is("x-default", "1"))
            .and(header_is("range", "bytes=0-99"))
            .respond_with(ResponseTemplate::new(206).set_body_string("#EXTM3U"))
            .expect(1)
            .mount(&server)
            .await;

        let f = fetcher(&[("Referer", "https://default.example/"), ("X-Default", "1")]);
        let req = request_for(
            &format!("{}/show/index.m3u8", server.uri()),
            Some(overrides(&[("Referer", "https://caller.example/")])),
        );
        let range = HeaderValue::from_static("bytes=0-99");

        let resp = f.fetch(&req, Some(&range)).await.unwrap();
        assert_eq!(resp.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(resp.bytes().await.unwrap(), Bytes::from_static(b"#EXTM3U"));
    }

    #[tokio::test]
    async fn origin_error_status_is_not_a_failure() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
            .mount(&server)
            .await;

        let f = fetcher(&[]);
        let req = request_for(&format!("{}/missing.ts", server.uri()), None);

        let resp = f.fetch(&req, None).await.unwrap();
        assert_eq!(resp.status, StatusCode::NOT_FOUND);
        assert_eq!(resp.bytes().await.unwrap(), Bytes::from_static(b"gone"));
    }

    #[tokio::test]
    async fn unreachable_origin_is_origin_failure() {
        // Bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let f = fetcher(&[]);
        let req = request_for(&format!("http://{}/index.m3u8", addr), None);

        let err = f.fetch(&req, None).await.unwrap_err();
        assert!(matches!(err, ProxyError::OriginFailure(_)));
    }

    #[tokio::test]
    async fn content_type_is_lower_cased() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "Application/VND.Apple.MPEGURL"),
            )
            .mount(&server)
            .await;

        let f = fetcher(&[]);
        let req = request_for(&format!("{}/live", server.uri()), None);
        let resp = f.fetch(&req, None).await.unwrap();
        assert_eq!(
            resp.content_type().as_deref(),
            Some("application/vnd.apple.mpegurl")
        );
    }
}
