// =============================================================================
// Gateway — venue connectivity: signed requests, rate limiting, breaker, stream
// =============================================================================

pub mod circuit_breaker;
pub mod client;
pub mod stream;
pub mod token_bucket;

pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use client::{Gateway, OrderRequest};
pub use stream::run_with_backoff;
pub use token_bucket::TokenBucket;
