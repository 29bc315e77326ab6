pub mod fetcher;
pub mod origin_guard;
pub mod request;

pub use fetcher::{OriginFetcher, OriginResponse};
pub use request::ProxyRequest;
