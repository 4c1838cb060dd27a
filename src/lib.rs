//! Education News Radar - an RSS evaluation pipeline
//!
//! This crate collects RSS feeds inside a rolling time window, removes
//! near-identical stories across sources and across runs, scores every story
//! along five weighted dimensions with an LLM, and persists the rolling result
//! set for downstream display.

pub mod config;
pub mod db;
pub mod dedup;
pub mod error;
pub mod fetcher;
pub mod item;
pub mod llm;
pub mod oracle;
pub mod pipeline;
pub mod rate_limit;
pub mod scorer;
pub mod similarity;
pub mod whitelist;
pub mod window;
