use clap::{Parser, ValueEnum};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct ClientArgs {
    /// Host name or IP address of the chat server.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// TCP port of the chat server.
    #[arg(long, default_value_t = 1300)]
    pub port: u16,

    /// Username to log in with. Must not contain spaces.
    #[arg(long)]
    pub username: String,

    /// How incoming events are printed.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human readable chat transcript.
    Text,
    /// One JSON object per event.
    Json,
}
