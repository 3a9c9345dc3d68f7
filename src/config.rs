use anyhow::Result;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

use crate::client::Credentials;

pub const DEFAULT_ADDRESS: &str = "http://localhost:8000/api/v1/";
pub const DEFAULT_USERNAME: &str = "chris";
pub const DEFAULT_PASSWORD: &str = "chris1234";

#[derive(Debug, Deserialize)]
pub struct Config {
    pub cube: CubeConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize)]
pub struct CubeConfig {
    pub address: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_addr")]
    pub addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
        }
    }
}

fn default_server_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 4000))
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("field {0} is required")]
    MissingField(String),
}

impl CubeConfig {
    /// A token takes priority over username and password.
    pub fn credentials(&self) -> Result<Credentials> {
        if let Some(token) = self.token.as_ref().filter(|token| !token.is_empty()) {
            return Ok(Credentials::Token(token.clone()));
        }

        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Ok(Credentials::Password {
                username: username.clone(),
                password: password.clone(),
            }),
            (None, _) => Err(ConfigError::MissingField("cube.username".to_owned()).into()),
            (_, None) => Err(ConfigError::MissingField("cube.password".to_owned()).into()),
        }
    }
}

impl Config {
    #[tracing::instrument(name = "config::Config::from_file", skip_all, fields(
        file_path = ?file_path.as_ref()
    ))]
    pub async fn from_file(file_path: impl AsRef<Path>) -> Result<Self> {
        let file_contents = tokio::fs::read_to_string(file_path.as_ref()).await?;

        let config: Config = serde_yaml::from_str(&file_contents)?;

        if config.cube.address.is_empty() {
            return Err(ConfigError::MissingField("cube.address".to_owned()).into());
        }

        Ok(config)
    }
}
