//! Durable policy snapshots.
//!
//! A checkpoint is a directory holding the architecture as YAML and the
//! parameter values as safetensors. Both files are written under temporary
//! names and renamed into place, so an interrupted save never clobbers a
//! good checkpoint.
use crate::{PolicyNet, PolicyNetConfig};
use anyhow::Result;
use candle_core::Device;
use log::info;
use std::fs;
use std::path::Path;

const CONFIG_FILE: &str = "policy.yaml";
const WEIGHTS_FILE: &str = "policy.safetensors";

/// Persists the network's architecture and parameter values.
pub fn save(net: &PolicyNet, dir: impl AsRef<Path>) -> Result<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let tmp_config = dir.join(format!("{}.tmp", CONFIG_FILE));
    let tmp_weights = dir.join(format!("{}.tmp", WEIGHTS_FILE));
    net.config().save(&tmp_config)?;
    net.varmap().save(&tmp_weights)?;
    fs::rename(&tmp_config, dir.join(CONFIG_FILE))?;
    fs::rename(&tmp_weights, dir.join(WEIGHTS_FILE))?;
    info!("saved policy checkpoint to {:?}", dir);
    Ok(())
}

/// Restores a network from a checkpoint directory.
pub fn load(dir: impl AsRef<Path>, device: Device) -> Result<PolicyNet> {
    let dir = dir.as_ref();
    let config = PolicyNetConfig::load(dir.join(CONFIG_FILE))?;
    let mut net = PolicyNet::build_raw(config, device)?;
    net.varmap_mut().load(dir.join(WEIGHTS_FILE))?;
    Ok(net)
}

/// Restores a network from a checkpoint, falling back to fresh construction
/// when the checkpoint is missing or unreadable. The fallback is not an
/// error; it is how the first training run starts.
pub fn load_or_build(
    dir: impl AsRef<Path>,
    config: PolicyNetConfig,
    device: Device,
) -> Result<PolicyNet> {
    match load(&dir, device.clone()) {
        Ok(net) => {
            info!("loaded policy checkpoint from {:?}", dir.as_ref());
            Ok(net)
        }
        Err(err) => {
            info!("no usable checkpoint ({}); building a fresh policy", err);
            PolicyNet::build(config, device)
        }
    }
}
