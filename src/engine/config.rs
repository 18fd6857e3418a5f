use std::time::Duration;


#[derive(Debug, Clone, confique::Config)]
pub struct EngineConfig {
    /// Host of the load-test engine's controller socket.
    #[config(default = "127.0.0.1")]
    pub controller_host: String,

    /// Port of the load-test engine's controller socket.
    #[config(default = 5116)]
    pub controller_port: u16,

    /// How long to wait when connecting to the controller before reporting
    /// the engine as unreachable.
    #[config(default = "3s", deserialize_with = crate::config::deserialize_duration)]
    pub connect_timeout: Duration,

    /// How long to wait for the controller's reply to a single command.
    #[config(default = "5s", deserialize_with = crate::config::deserialize_duration)]
    pub command_timeout: Duration,
}

impl EngineConfig {
    pub fn controller_addr(&self) -> String {
        format!("{}:{}", self.controller_host, self.controller_port)
    }
}
