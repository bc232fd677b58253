//! # Trickle
//!
//! Progressive structured streaming: typed records out of an LLM completion
//! before the model finishes generating.
//!
//! A session pulls token batches from an upstream producer, re-extracts the
//! target array from the growing buffer on every batch, and pushes each
//! newly-complete record over a long-lived HTTP response as a newline-framed
//! event. The client consumer rebuilds reactive state from those frames with
//! retry and cancellation semantics.
//!
//! ## Modules
//!
//! - `client` - Stream consumer state machine with watch-channel state
//! - `config` - TOML configuration for server, upstream, and streaming defaults
//! - `extract` - Pure extraction engine: tolerant parse, path, predicate
//! - `mode` - Mode selector policy (structured/hybrid/text/auto)
//! - `producer` - Upstream token producer seam (HTTP and scripted)
//! - `protocol` - Wire event variants, frame encoder, re-buffering decoder
//! - `registry` - Prompt/schema registry keyed by feature and step
//! - `server` - axum routes serving the streaming responses
//! - `session` - Session orchestrator driving one request end to end
pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod mode;
pub mod producer;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
