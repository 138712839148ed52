use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DB: &str = "/tmp/todolist.db";
const DEFAULT_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_SEND_TIMEOUT_MS: u64 = 5_000;

/// Server settings, read from the environment (and `.env`).
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    /// `None` lets a broadcast wait on a stuck client forever.
    pub send_timeout: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let db_path = lookup("TODO_DB")
            .unwrap_or_else(|| DEFAULT_DB.to_string())
            .into();

        let addr = lookup("TODO_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let addr = addr
            .parse()
            .map_err(|e| format!("TODO_ADDR '{}' is not a socket address: {}", addr, e))?;

        let send_timeout = match lookup("TODO_SEND_TIMEOUT_MS") {
            Some(ms) => ms
                .parse::<u64>()
                .map_err(|e| format!("TODO_SEND_TIMEOUT_MS '{}' is not a number: {}", ms, e))?,
            None => DEFAULT_SEND_TIMEOUT_MS,
        };
        let send_timeout = (send_timeout > 0).then(|| Duration::from_millis(send_timeout));

        Ok(Self { db_path, addr, send_timeout })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/todolist.db"));
        assert_eq!(config.addr, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(config.send_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn overrides() {
        let config = config(&[
            ("TODO_DB", "/var/lib/todo.db"),
            ("TODO_ADDR", "127.0.0.1:8080"),
            ("TODO_SEND_TIMEOUT_MS", "250"),
        ])
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/var/lib/todo.db"));
        assert_eq!(config.addr.port(), 8080);
        assert_eq!(config.send_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn zero_timeout_disables_it() {
        let config = config(&[("TODO_SEND_TIMEOUT_MS", "0")]).unwrap();
        assert_eq!(config.send_timeout, None);
    }

    #[test]
    fn bad_values_are_errors() {
        assert!(config(&[("TODO_ADDR", "nowhere")]).unwrap_err().contains("TODO_ADDR"));
        assert!(config(&[("TODO_SEND_TIMEOUT_MS", "soon")]).unwrap_err().contains("TODO_SEND_TIMEOUT_MS"));
    }
}
