//! End-to-end exercise of one training iteration against a loopback gym
//! server: collect, pack, optimize, apply, checkpoint.
use anyhow::Result;
use candle_core::Device;
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::JoinHandle;
use tempdir::TempDir;
use trellis_candle_agent::{checkpoint, PolicyNetConfig, TrpoAgent, TrpoAgentConfig, TrpoConfig};
use trellis_core::{pack, Env, PolicyLearner, Roller};
use trellis_gym_env::{GymClientConfig, PreprocessedGymEnv};

const HEIGHT: usize = 20;
const WIDTH: usize = 20;
const EPISODE_LEN: usize = 2;

fn frame_bytes(fill: u8) -> Vec<u8> {
    vec![fill; HEIGHT * WIDTH * 3]
}

fn serve(stream: TcpStream) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut writer = stream;
    let mut t = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap() == 0 {
            return;
        }
        let req: Value = serde_json::from_str(line.trim_end()).unwrap();
        let reply = match req["cmd"].as_str().unwrap() {
            "make" => json!({"actions": 6, "height": HEIGHT, "width": WIDTH}),
            "reset" => {
                t = 0;
                json!({"obs": frame_bytes(0)})
            }
            "step" => {
                t += 1;
                let done = t == EPISODE_LEN;
                let reward = if done { 1.0 } else { 0.0 };
                let fill = if done {
                    t = 0;
                    0
                } else {
                    (40 * t) as u8
                };
                json!({"obs": frame_bytes(fill), "reward": reward, "done": done})
            }
            other => panic!("unexpected command {}", other),
        };
        let mut line = reply.to_string();
        line.push('\n');
        writer.write_all(line.as_bytes()).unwrap();
    }
}

fn spawn_server(sessions: usize) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let handle = std::thread::spawn(move || {
        let mut workers = Vec::new();
        for _ in 0..sessions {
            let (stream, _) = listener.accept().unwrap();
            workers.push(std::thread::spawn(move || serve(stream)));
        }
        for w in workers {
            w.join().unwrap();
        }
    });
    (addr, handle)
}

#[test]
fn one_training_iteration_end_to_end() -> Result<()> {
    let (addr, server) = spawn_server(2);
    let model_dir = TempDir::new("trellis-train")?;
    {
        let env_config = GymClientConfig::default().addr(addr.as_str()).env_id("Test-v0");
        let mut envs = vec![
            PreprocessedGymEnv::build(&env_config)?,
            PreprocessedGymEnv::build(&env_config)?,
        ];

        let policy_config = PolicyNetConfig::default()
            .in_shape(envs[0].obs_height(), envs[0].obs_width())
            .n_actions(envs[0].n_actions())
            .fc_dim(8)
            .rnn_dim(8);
        let agent_config = TrpoAgentConfig::default()
            .policy(policy_config)
            .trpo(TrpoConfig::default().subsample_frac(1.0));
        let mut agent =
            TrpoAgent::load_or_build(model_dir.path(), agent_config, Device::Cpu)?;

        // Collect and pack.
        let set = Roller::new(4).rollout(&mut envs, &mut agent)?;
        assert!(set.num_steps() >= 4);
        assert!(set.trajectories().iter().all(|t| t.terminated()));
        assert!(set
            .trajectories()
            .iter()
            .all(|t| t.len() == EPISODE_LEN));
        let batch = pack(vec![set]);

        // Optimize and apply.
        let update = PolicyLearner::<PreprocessedGymEnv>::compute_update(&mut agent, &batch)?;
        PolicyLearner::<PreprocessedGymEnv>::apply_update(&mut agent, update)?;

        // Checkpoint survives a round trip.
        PolicyLearner::<PreprocessedGymEnv>::save(&agent, model_dir.path())?;
        let restored = checkpoint::load(model_dir.path(), Device::Cpu)?;
        assert_eq!(restored.config(), agent.policy().config());
    }
    server.join().unwrap();
    Ok(())
}
