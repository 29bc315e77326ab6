use url::form_urlencoded;

/// Path the proxy handler is mounted on
pub const PROXY_PATH: &str = "/proxy";

/// Builds same-origin proxy URLs for references found in a manifest.
///
/// Every URL carries the target in `url` and, when the inbound request had
/// one, the original `headers` string unchanged. Values are form-encoded, so
/// decoding the query with `ProxyRequest::from_query` yields them back exactly.
#[derive(Debug, Clone)]
pub struct ProxyUrlBuilder<'a> {
    base_url: &'a str,
    raw_headers: Option<&'a str>,
}

impl<'a> ProxyUrlBuilder<'a> {
    /// `base_url` is an optional absolute prefix; pass `""` for root-relative URLs.
    pub fn new(base_url: &'a str, raw_headers: Option<&'a str>) -> Self {
        Self {
            base_url,
            raw_headers: raw_headers.filter(|h| !h.is_empty()),
        }
    }

    pub fn build(&self, target: &str) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("url", target);
        if let Some(headers) = self.raw_headers {
            query.append_pair("headers", headers);
        }
        format!("{}{}?{}", self.base_url, PROXY_PATH, query.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::request::ProxyRequest;

    #[test]
    fn root_relative_without_headers() {
        let builder = ProxyUrlBuilder::new("", None);
        assert_eq!(
            builder.build("https://cdn.example.com/show/seg_000.ts"),
            "/proxy?url=https%3A%2F%2Fcdn.example.com%2Fshow%2Fseg_000.ts"
        );
    }

    #[test]
    fn carries_header_bundle() {
        let builder = ProxyUrlBuilder::new("", Some(r#"{"Referer":"https://a.example/"}"#));
        assert_eq!(
            builder.build("https://cdn.example.com/a.ts"),
            "/proxy?url=https%3A%2F%2Fcdn.example.com%2Fa.ts\
             &headers=%7B%22Referer%22%3A%22https%3A%2F%2Fa.example%2F%22%7D"
        );
    }

    #[test]
    fn absolute_prefix() {
        let builder = ProxyUrlBuilder::new("https://relay.example.com", None);
        assert!(
            builder
                .build("https://cdn.example.com/a.ts")
                .starts_with("https://relay.example.com/proxy?url=")
        );
    }

    #[test]
    fn empty_headers_omitted() {
        let builder = ProxyUrlBuilder::new("", Some(""));
        assert!(!builder.build("https://cdn.example.com/a.ts").contains("headers="));
    }

    #[test]
    fn decoder_reproduces_target_and_headers() {
        let raw_headers = r#"{"Cookie":"a=1; b=2&c","User-Agent":"Mozilla/5.0 (X11)"}"#;
        let target = "https://cdn.example.com/p/seg 01.ts?token=a+b&sig=%2F==";
        let builder = ProxyUrlBuilder::new("", Some(raw_headers));

        let proxied = builder.build(target);
        let query = proxied.strip_prefix("/proxy?").unwrap();
        let decoded = ProxyRequest::from_query(Some(query), false).unwrap();

        assert_eq!(decoded.raw_headers.as_deref(), Some(raw_headers));
        // Url normalises the space; the raw query parameter itself is exact
        let url_param = form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == "url")
            .map(|(_, v)| v.into_owned());
        assert_eq!(url_param.as_deref(), Some(target));
        assert_eq!(
            decoded.header_overrides.unwrap()["Cookie"],
            "a=1; b=2&c"
        );
    }

    #[test]
    fn nested_proxy_urls_stay_unambiguous() {
        let inner = ProxyUrlBuilder::new("", Some("{}")).build("https://cdn.example.com/a.m3u8");
        let outer = ProxyUrlBuilder::new("", Some("{}")).build(&format!("https://relay.example.com{inner}"));

        let query = outer.strip_prefix("/proxy?").unwrap();
        let decoded = ProxyRequest::from_query(Some(query), false).unwrap();
        assert_eq!(decoded.target.as_str(), format!("https://relay.example.com{inner}"));
    }
}
