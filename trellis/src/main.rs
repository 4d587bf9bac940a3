//! Long-running training process: builds the environment pool, restores or
//! constructs the policy, trains on a background thread and saves a
//! checkpoint on interrupt.
use anyhow::{bail, Result};
use candle_core::Device;
use clap::Parser;
use crossbeam_channel::bounded;
use log::info;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use trellis_candle_agent::{checkpoint, PolicyNetConfig, TrpoAgent, TrpoAgentConfig, TrpoConfig};
use trellis_core::{Env, Trainer, TrainerConfig};
use trellis_gym_env::{GymClientConfig, PreprocessedGymEnv};

/// Trains a recurrent policy against a remote gym endpoint with
/// trust-region policy optimization.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Address of the gym endpoint.
    #[arg(long, default_value = "localhost:5001")]
    addr: String,

    /// Environment identifier.
    #[arg(long, default_value = "Pong-v0")]
    env_id: String,

    /// Number of parallel environment sessions.
    #[arg(long, default_value_t = 8)]
    n_envs: usize,

    /// Aggregate environment steps per optimization batch.
    #[arg(long, default_value_t = 100_000)]
    batch_steps: usize,

    /// Aggregate step target of one rollout call.
    #[arg(long, default_value_t = 10_000)]
    steps_per_rollout: usize,

    /// Discount factor of the action-value judge.
    #[arg(long, default_value_t = 0.99)]
    discount: f32,

    /// Trust-region radius in KL divergence.
    #[arg(long, default_value_t = 0.01)]
    max_kl: f64,

    /// Conjugate-gradient iteration budget.
    #[arg(long, default_value_t = 10)]
    cg_iters: usize,

    /// Fraction of trajectories used for curvature estimation.
    #[arg(long, default_value_t = 0.1)]
    subsample_frac: f64,

    /// Checkpoint directory.
    #[arg(long, default_value = "trained_policy")]
    model_dir: PathBuf,

    /// Ask the server to render the game on screen.
    #[arg(long)]
    render: bool,

    /// Skip logging per-parameter update magnitudes.
    #[arg(long)]
    no_param_norms: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let env_config = GymClientConfig::default()
        .addr(args.addr.clone())
        .env_id(args.env_id.clone())
        .render(args.render);
    if args.n_envs == 0 {
        bail!("at least one environment session is required");
    }
    info!(
        "connecting {} environment sessions to {}",
        args.n_envs, args.addr
    );
    let mut envs = Vec::with_capacity(args.n_envs);
    for _ in 0..args.n_envs {
        // All-or-nothing: a partial pool aborts startup.
        envs.push(PreprocessedGymEnv::build(&env_config)?);
    }
    let n_actions = envs[0].n_actions();

    let policy_config = PolicyNetConfig::default()
        .in_shape(envs[0].obs_height(), envs[0].obs_width())
        .n_actions(n_actions);
    let trpo_config = TrpoConfig::default()
        .discount(args.discount)
        .max_kl(args.max_kl)
        .cg_iters(args.cg_iters)
        .subsample_frac(args.subsample_frac);
    let agent_config = TrpoAgentConfig::default()
        .policy(policy_config)
        .trpo(trpo_config);
    let agent = TrpoAgent::load_or_build(&args.model_dir, agent_config, Device::Cpu)?;
    let agent = Arc::new(Mutex::new(agent));

    let trainer_config = TrainerConfig::default()
        .batch_steps(args.batch_steps)
        .steps_per_rollout(args.steps_per_rollout)
        .log_param_norms(!args.no_param_norms);

    let (stop_tx, stop_rx) = bounded(1);
    let (int_tx, int_rx) = bounded(1);
    ctrlc::set_handler(move || {
        let _ = int_tx.send(());
    })?;

    let trainer_handle = {
        let agent = Arc::clone(&agent);
        let trainer = Trainer::build(trainer_config);
        thread::spawn(move || trainer.train(envs, agent, stop_rx))
    };

    info!("training; press Ctrl-C to stop and save");
    let _ = int_rx.recv();
    info!("interrupt received; finishing the in-flight iteration");
    let _ = stop_tx.send(());
    match trainer_handle.join() {
        Ok(result) => result?,
        Err(_) => bail!("training thread panicked"),
    }

    // The trainer has exited, so the lock is free and the parameters are
    // never mid-update here.
    let agent = agent.lock().unwrap();
    checkpoint::save(agent.policy(), &args.model_dir)?;
    Ok(())
}
