use std::collections::BTreeMap;
use std::env;
use std::fs;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    /// Optional absolute prefix for rewritten references (e.g. `https://relay.example.com`).
    /// Empty means references are emitted root-relative (`/proxy?...`).
    pub base_url: String,
    pub is_dev: bool,
    /// Headers sent with every origin request, lowest precedence
    pub default_headers: BTreeMap<String, String>,
    /// Reject targets whose host is a private or loopback IP literal
    pub block_private_origins: bool,
    /// TCP connect timeout for the shared HTTP client
    pub connect_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    /// In DEV mode, provides sensible defaults. In PROD mode, PORT is required.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let is_dev = env::var("DEV_MODE")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        // Port: required in prod, defaults to 3000 in dev
        let port = if is_dev {
            env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?
        } else {
            env::var("PORT")
                .map_err(|_| "PORT is required in production")?
                .parse()?
        };

        let base_url = env::var("BASE_URL")
            .unwrap_or_default()
            .trim_end_matches('/')
            .to_string();

        // File first, inline JSON on top of it
        let mut default_headers = BTreeMap::new();
        if let Ok(path) = env::var("DEFAULT_HEADERS_FILE") {
            let raw = fs::read_to_string(&path)
                .map_err(|e| format!("Failed to read DEFAULT_HEADERS_FILE {}: {}", path, e))?;
            default_headers.extend(parse_header_json(&raw, "DEFAULT_HEADERS_FILE")?);
        }
        if let Ok(raw) = env::var("DEFAULT_HEADERS")
            && !raw.trim().is_empty()
        {
            default_headers.extend(parse_header_json(&raw, "DEFAULT_HEADERS")?);
        }

        let block_private_origins = env::var("BLOCK_PRIVATE_ORIGINS")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        let connect_timeout_secs = env::var("CONNECT_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        Ok(Config {
            port,
            base_url,
            is_dev,
            default_headers,
            block_private_origins,
            connect_timeout_secs,
        })
    }
}

/// Default headers must be a flat JSON object of strings. Unlike the
/// per-request `headers` parameter, a malformed value here aborts startup.
fn parse_header_json(
    raw: &str,
    source: &str,
) -> Result<BTreeMap<String, String>, Box<dyn std::error::Error>> {
    serde_json::from_str(raw)
        .map_err(|e| format!("{} must be a JSON object of strings: {}", source, e).into())
}
