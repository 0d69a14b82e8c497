//! fleet-controlplane: HTTP control plane for a fleet of edge nodes
//!
//! Nodes register a public key, log in for a bearer token, poll for the
//! apps they should run and report keepalives and app metrics. The control
//! plane persists node state, accrues online time, derives a business
//! status per node and keeps a live view of agents and controllers for
//! operators.

pub mod auth;
pub mod business;
pub mod distribution;
pub mod geoip;
pub mod keepalive;
pub mod registry;
pub mod server;
pub mod state;

pub use registry::NodeRegistry;
pub use state::ControlPlaneState;
