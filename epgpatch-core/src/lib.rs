//! Core types and pipeline for epgpatch, which scrapes a channel schedule and
//! merges it into a baseline XMLTV guide.

/// Multi-day schedule aggregation.
pub mod aggregate;
/// Run configuration.
pub mod config;
/// Listing slot parser.
pub mod fragment;
/// Domain models and the listing window.
pub mod model;
/// Traits describing the backends.
pub mod ports;
/// High-level service facade used by clients.
pub mod service;
/// XMLTV reading, merging and writing.
pub mod xmltv;

pub use aggregate::*;
pub use config::*;
pub use fragment::*;
pub use model::*;
pub use ports::*;
pub use service::*;
pub use xmltv::*;
