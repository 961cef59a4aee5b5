//! Core flowlens library (stream decoding, execution state, log parsing, templates).

pub mod config;
pub mod graph;
pub mod messages;
pub mod store;
pub mod stream;
pub mod template;
