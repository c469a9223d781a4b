//! Intent routing for a voice/text assistant.
//!
//! Requests flow through four stages: the [`rules::PatternClassifier`] labels
//! the text, the [`risk::RiskGate`] decides whether the labelled intent may run,
//! the [`registry::FunctionRegistry`] finds and calls the matching capability,
//! and the [`router::Router`] stitches the stages together and renders replies.

pub mod capability;
pub mod config;
pub mod registry;
pub mod risk;
pub mod router;
pub mod rules;
pub mod types;
