//! Network-facing pieces of the crawler: fetching, politeness and rendering.

pub mod http_client;
pub mod politeness;
pub mod rate_limiter;
pub mod renderer;
pub mod robots;

pub use http_client::{FetchOptions, FetchResponse, HttpClient, SessionCookie, StreamingResponse};
pub use politeness::Politeness;
pub use rate_limiter::{DomainSlot, DomainStats, RateLimitConfig, RateLimiter};
pub use renderer::{PageRenderer, RenderedPage, StaticRenderer};
pub use robots::{RobotsCache, RobotsTxt};
