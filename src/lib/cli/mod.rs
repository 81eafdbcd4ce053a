use std::net::SocketAddr;

use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "toolrelay",
    version,
    about = "Agent loop over multiple MCP capability servers with streamed progress"
)]
pub struct Cli {
    /// Path to the TOML config (defaults to config/client.toml)
    #[arg(long)]
    pub config: Option<String>,
    /// System prompt appended to the generated tool instructions
    #[arg(long)]
    pub system: Option<String>,
    #[arg(long, short, value_enum, default_value_t = RunMode::Stdio)]
    pub mode: RunMode,
    /// Overrides `[rest_server] bind`
    #[arg(long)]
    pub rest_addr: Option<SocketAddr>,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum RunMode {
    /// Interactive STDIO mode
    Stdio,
    /// REST API server with SSE streaming
    Rest,
    /// Run both STDIO and REST simultaneously
    All,
}
