use std::time::Duration;

/// Configuration for server mode.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Configuration for helper mode.
#[derive(Debug, Clone)]
pub struct HelperConfig {
    pub controller_url: String,
    pub startup_delay: Duration,
    pub timeout: u64,
    pub poll_interval: Duration,
}
