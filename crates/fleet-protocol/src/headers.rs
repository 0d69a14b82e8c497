//! Header names used on node-facing endpoints

/// Seconds the node should wait before its next keepalive
pub const NEXT_KEEPALIVE_INTERVAL: &str = "next-keepalive-interval";

/// Business status code persisted for the node after a distribution decision
pub const SERVICE_STATE: &str = "ServiceState";

/// Business status code computed by the distribution decision itself
pub const INIT_STATE: &str = "InitState";

/// Address of the web server a logged-in node should talk to
pub const WEB_SERVER: &str = "Web-Server";
