//! fleet-protocol: Wire types for the fleet control plane
//!
//! This crate defines the JSON bodies, query parameters and header names
//! exchanged between edge nodes and the control plane over HTTP.

pub mod auth;
pub mod device;
pub mod error;
pub mod headers;
pub mod keepalive;
pub mod query;

pub use auth::{LoginQuery, RegisterQuery, SignVerifyRequest};
pub use device::DeviceReport;
pub use error::ProtocolError;
pub use keepalive::{decode_app_reports, AppReport, KeepaliveRequest};
pub use query::{ControllerQuery, ResourceQuery};
