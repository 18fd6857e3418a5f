use std::{net::IpAddr, time::Duration};


#[derive(Debug, Clone, confique::Config)]
pub struct HttpConfig {
    /// The TCP port the web console should listen on.
    #[config(default = 8089)]
    pub port: u16,

    /// The bind address to listen on. Use "0.0.0.0" to accept connections
    /// from other machines.
    #[config(default = "127.0.0.1")]
    pub address: IpAddr,

    /// How long to wait for active connections to terminate when shutting down.
    #[config(default = "3s", deserialize_with = crate::config::deserialize_duration)]
    pub shutdown_timeout: Duration,
}
