//! LLM provider layer for Toolwire.
//!
//! # Architecture
//!
//! - [`traits::LlmProvider`]: trait that all providers implement, with a
//!   complete (`chat`) and a streaming (`chat_stream`) entry point
//! - [`stream`]: SSE decoding of streamed chat completions into [`Fragment`]s
//! - [`registry`]: static specs for the supported providers + matching logic
//! - [`http_provider::HttpProvider`]: generic OpenAI-compatible HTTP client
//! - [`http_provider::create_provider`]: convenience builder from model name + config

pub mod http_provider;
pub mod registry;
pub mod stream;
pub mod traits;

pub use http_provider::{create_provider, HttpProvider};
pub use registry::{ProviderConfig, ProviderKind, ProviderSpec, PROVIDERS};
pub use traits::{Fragment, FragmentStream, LlmProvider, LlmRequestConfig};
