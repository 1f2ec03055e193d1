pub mod aggregate;
pub mod config;
pub mod forecast;
pub mod http_api;
pub mod model;
pub mod observability;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod runner;
pub mod schema;
pub mod sources;
pub mod stats;
pub mod summary;
pub mod transform;

pub use pipeline::{Envelope, Pipeline, PipelineError};
