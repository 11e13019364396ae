use std::env;
use std::path::PathBuf;

pub const HOME_VAR: &str = "LLAMA_CHAT_HOME";
pub const HOST_VAR: &str = "LLAMA_CHAT_HOST";

const DEFAULT_HOME: &str = "~/.cache/llama-chat";
const DEFAULT_PORT: u16 = 7860;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub host: String,
    pub port: u16,
}

impl Host {
    pub fn from_env() -> Self {
        Self::parse(&env::var(HOST_VAR).unwrap_or_else(|_| format!("127.0.0.1:{}", DEFAULT_PORT)))
    }

    pub fn parse(value: &str) -> Self {
        match value.rsplit_once(':') {
            Some((host, port)) => Self {
                host: host.to_string(),
                port: port.parse().unwrap_or(DEFAULT_PORT),
            },
            None => Self {
                host: value.to_string(),
                port: DEFAULT_PORT,
            },
        }
    }
}

/// Root under which `<model>/` checkpoint directories are looked up.
pub fn cache_dir() -> PathBuf {
    expand_home(&env::var(HOME_VAR).unwrap_or_else(|_| DEFAULT_HOME.to_string()))
}

pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
