//! Cross-cutting utilities: outbound-call rate limiting and text helpers.

pub mod rate_limiter;
pub mod text;

pub use rate_limiter::{RateLimitConfig, RateLimiter};
