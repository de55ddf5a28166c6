//! Metric records and the rules they are ingested under.
//!
//! - [`MetricData`] is a single time-series data point as submitted by clients.
//! - [`MetricSchema`] validates records and computes their series identity. [`StandardSchema`]
//!   implements the rules of the raintank metrics schema.
//! - The [`msg`] module implements the binary message format that wraps batches of records.
#![warn(missing_docs)]

mod metric;
pub mod msg;
mod schema;

pub use self::metric::*;
pub use self::schema::*;
