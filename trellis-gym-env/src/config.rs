//! Configuration of the gym endpoint client.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`GymClient`](crate::GymClient) and
/// [`PreprocessedGymEnv`](crate::PreprocessedGymEnv).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct GymClientConfig {
    /// Address of the remote stepper, `host:port`.
    pub addr: String,

    /// Environment identifier requested in the handshake.
    pub env_id: String,

    /// Asks the server to render the game on screen.
    pub render: bool,
}

impl Default for GymClientConfig {
    fn default() -> Self {
        Self {
            addr: "localhost:5001".to_string(),
            env_id: "Pong-v0".to_string(),
            render: false,
        }
    }
}

impl GymClientConfig {
    /// Sets the endpoint address.
    pub fn addr(mut self, v: impl Into<String>) -> Self {
        self.addr = v.into();
        self
    }

    /// Sets the environment identifier.
    pub fn env_id(mut self, v: impl Into<String>) -> Self {
        self.env_id = v.into();
        self
    }

    /// Sets whether the server renders on screen.
    pub fn render(mut self, v: bool) -> Self {
        self.render = v;
        self
    }

    /// Constructs [`GymClientConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`GymClientConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
