//! vss-ingest library interface
//!
//! Ingests a variant classification feed, merges it into the variant store,
//! and notifies subscribers whose preferences match a classification
//! transition.

pub mod builder;
pub mod config;
pub mod error;
pub mod feed;
pub mod merge;
pub mod notify;
pub mod persistence;
pub mod pipeline;

pub use crate::builder::RecordBuilder;
pub use crate::config::{CliOverrides, IngestConfig};
pub use crate::error::{DeliveryError, FeedError, IngestError};
pub use crate::feed::{FeedReader, FeedRecord};
pub use crate::notify::{Delivery, DeliveryReport};
pub use crate::pipeline::{IngestionPipeline, PipelineSettings};
