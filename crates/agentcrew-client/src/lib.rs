//! Client side of the AgentCrew completions API.
//!
//! [`AgentCompletionsClient`] talks to `/agent/completions` and keeps the
//! transcript; [`FragmentAggregator`] turns streamed fragments into text.

pub mod aggregator;
pub mod client;

pub use aggregator::{FragmentAggregator, AUTHOR_BREAK};
pub use client::{AgentCompletionsClient, NdjsonDecoder, ReplyStream};
