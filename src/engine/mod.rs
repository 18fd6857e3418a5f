//! Client for the load-test engine's controller socket.
//!
//! The engine is a separate goose process started with `--no-autostart`: it
//! idles until commanded, exposing goose's line-based telnet controller.
//! This module speaks just enough of that protocol to drive the engine:
//! send one line, read until the `goose> ` prompt, hand back everything in
//! between.

use std::time::Duration;

use bytes::BytesMut;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};

use crate::prelude::*;

mod config;

pub use self::config::EngineConfig;


/// The prompt the controller prints once it is ready for the next command.
const PROMPT: &[u8] = b"goose> ";

/// Upper bound on a single controller response. Metrics reports are a few
/// KiB, so hitting this means we are not talking to a goose controller.
const MAX_RESPONSE_LEN: usize = 512 * 1024;

/// A connection to the engine's controller.
///
/// One connection per command sequence: the controller is an interactive
/// shell, and short-lived connections mean there is no state to keep in
/// sync and no stale socket to detect after an engine restart.
#[derive(Debug)]
pub struct Controller {
    stream: TcpStream,
    command_timeout: Duration,
}

impl Controller {
    /// Connects to the controller and waits for its greeting prompt.
    pub async fn connect(config: &EngineConfig) -> Result<Self> {
        let addr = config.controller_addr();
        let stream = timeout(config.connect_timeout, TcpStream::connect(addr.as_str()))
            .await
            .map_err(|_| anyhow!("timeout connecting to load-test engine at {addr}"))?
            .with_context(|| format!("failed to connect to load-test engine at {addr}"))?;

        let mut this = Self { stream, command_timeout: config.command_timeout };

        // The controller greets every connection with a banner ending in
        // the prompt. Discard it.
        this.read_response().await.context("did not receive controller greeting")?;
        trace!("connected to engine controller at {addr}");

        Ok(this)
    }

    /// Sends a single command and returns the controller's response
    /// verbatim, minus the trailing prompt and surrounding whitespace.
    pub async fn command(&mut self, command: &str) -> Result<String> {
        debug!(command, "sending command to engine controller");
        self.stream.write_all(format!("{command}\r\n").as_bytes()).await
            .context("failed to send command to engine controller")?;
        let response = self.read_response().await?;
        trace!(?response, "controller response");
        Ok(response)
    }

    pub async fn metrics(&mut self) -> Result<String> {
        self.command("metrics").await
    }

    pub async fn start(&mut self) -> Result<String> {
        self.command("start").await
    }

    pub async fn stop(&mut self) -> Result<String> {
        self.command("stop").await
    }

    pub async fn set_users(&mut self, users: u64) -> Result<String> {
        self.command(&format!("users {users}")).await
    }

    pub async fn set_hatch_rate(&mut self, rate: f64) -> Result<String> {
        self.command(&format!("hatchrate {rate}")).await
    }

    async fn read_response(&mut self) -> Result<String> {
        timeout(self.command_timeout, self.read_until_prompt()).await
            .map_err(|_| anyhow!("timeout waiting for response from engine controller"))?
    }

    async fn read_until_prompt(&mut self) -> Result<String> {
        let mut buf = BytesMut::new();
        loop {
            let n = self.stream.read_buf(&mut buf).await
                .context("failed to read from engine controller")?;
            if n == 0 {
                bail!("engine controller closed the connection mid-response");
            }
            if buf.len() > MAX_RESPONSE_LEN {
                bail!("response from engine controller exceeds {MAX_RESPONSE_LEN} bytes");
            }
            if buf.ends_with(PROMPT) {
                buf.truncate(buf.len() - PROMPT.len());
                return Ok(String::from_utf8_lossy(&buf).trim().to_owned());
            }
        }
    }
}
