use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Args;

pub const DEFAULT_BIND: &str = "0.0.0.0:5876";
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5876/main";

#[derive(Debug, Clone, Args)]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "TASKBOARD_BIND", default_value = DEFAULT_BIND)]
    pub bind: SocketAddr,

    /// SQLite database file
    #[arg(long = "db", env = "TASKBOARD_DB", default_value = "taskboard.db")]
    pub db_path: PathBuf,

    /// bcrypt work factor for stored passwords (4-31)
    #[arg(long, env = "TASKBOARD_BCRYPT_COST", default_value_t = bcrypt::DEFAULT_COST,
          value_parser = clap::value_parser!(u32).range(4..=31))]
    pub bcrypt_cost: u32,
}

#[derive(Debug, Clone, Args)]
pub struct ClientConfig {
    /// Base URL of the task API
    #[arg(long, global = true, env = "TASKBOARD_URL", default_value = DEFAULT_SERVER_URL)]
    pub server: String,

    /// Where the signed-in credentials are kept
    #[arg(long, global = true, env = "TASKBOARD_SESSION")]
    pub session_file: Option<PathBuf>,
}

impl ClientConfig {
    pub fn session_path(&self) -> PathBuf {
        self.session_file.clone().unwrap_or_else(default_session_path)
    }
}

fn default_session_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join("taskboard")
        .join("session.json")
}
