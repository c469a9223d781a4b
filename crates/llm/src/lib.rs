//! Language-model clients used by the jarvis router for chat fallback and
//! function-name extraction.

pub mod http;
pub mod provider;
