#![doc = "feed-campaign-core: core logic library for feed-campaign."]

//! This crate holds everything a run does: watermark persistence, feed
//! synchronisation and enrichment, rendering, and the two-phase publish
//! protocol against the mailing-list service.
//!
//! # Usage
//! Build a [`config::Settings`], wire the collaborators (or mocks from
//! [`contract`]) and call [`pipeline::run_once`].

pub mod config;
pub mod contract;
pub mod error;
pub mod feed;
pub mod listmonk;
pub mod metadata;
pub mod notify;
pub mod pipeline;
pub mod publish;
pub mod render;
pub mod synchronise;
pub mod watermark;

pub use error::{Error, Result};
pub use watermark::Watermark;
