//! mixeval-core: Mixed dataset evaluation.
//!
//! The workflow has three steps: describe a data-mixing [`schema`], draw a
//! mixed sample from several datasets with the [`sampler`], and run one
//! unified evaluation over it with the [`engine`].

pub mod cache;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod report;
pub mod results;
pub mod sampler;
pub mod schema;
pub mod scoring;
pub mod statistics;
pub mod traits;
