pub mod classify;
pub mod language;
pub mod proxy_url;
pub mod resolve;
pub mod rewriter;

pub use classify::{Classification, classify};
pub use proxy_url::{PROXY_PATH, ProxyUrlBuilder};
pub use rewriter::{ManifestLine, ManifestRewriter, RewriteStats};
