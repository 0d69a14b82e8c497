//! fleet-core: Domain types and configuration for the fleet control plane
//!
//! This crate provides the node and app records, business status codes,
//! metric payload decoding, the app catalog and the configuration
//! structures shared by the store and the control plane.

pub mod app;
pub mod config;
pub mod error;
pub mod metrics;
pub mod node;
pub mod serial;
pub mod time;
pub mod types;

pub use app::{App, NodeApp, NodeRegistration, OverrideLayers};
pub use error::{ConfigError, MetricError};
pub use metrics::{MetricFamily, MetricPayload};
pub use node::Node;
pub use types::{BizStatus, DiagnosticFlag, NodeId};
