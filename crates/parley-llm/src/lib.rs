//! Backend adapters and the guard stack in front of them.
//!
//! Every model API is normalized behind [`BackendProvider`]: complete-text
//! generation plus an optional fragment stream. Calls go through
//! [`GuardedCaller`] (rate limit, timeout, retry) and may be short-circuited
//! by the [`ResponseCache`].

pub mod cache;
pub mod error;
pub mod extract;
pub mod framing;
pub mod limiter;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod retry;

pub use cache::{CacheStats, CachedResponse, Fingerprint, ResponseCache};
pub use error::{BackendError, Result};
pub use extract::extract_text;
pub use framing::NdjsonFramer;
pub use limiter::{RateLimiter, RateLimiterSet};
pub use provider::{BackendProvider, GenerationParams, TextStream};
pub use providers::{AnthropicBackend, GeminiBackend, OllamaBackend, OpenAiBackend};
pub use registry::BackendRegistry;
pub use retry::{GuardedCaller, RetryPolicy};
