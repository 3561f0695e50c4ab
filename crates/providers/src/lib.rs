//! Model backend implementations for agenx.
//!
//! All backends implement the `agenx_core::ModelBackend` trait.
//! The router builds the right one from configuration.

pub mod cache;
pub mod openai_compat;
pub mod router;

pub use cache::{CachedBackend, DEFAULT_CAPACITY};
pub use openai_compat::OpenAiBackend;
pub use router::{build_backend, BackendRouter};
