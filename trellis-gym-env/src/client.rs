//! Wire client for the remote gym stepper.
//!
//! The protocol is newline-delimited JSON over TCP, strictly alternating
//! request/response. The server resets on episode end and returns the fresh
//! first observation in the same step response. Any transport or decode
//! error is unrecoverable for the process.
use crate::{GymClientConfig, RawFrame};
use anyhow::{bail, Context, Result};
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;

#[derive(Serialize)]
#[serde(tag = "cmd", rename_all = "lowercase")]
enum Request {
    Make { id: String, render: bool },
    Reset,
    Step { action: usize },
}

#[derive(Deserialize)]
struct MakeReply {
    actions: usize,
    height: usize,
    width: usize,
}

#[derive(Deserialize)]
struct StepReply {
    obs: Vec<u8>,
    #[serde(default)]
    reward: f32,
    #[serde(default)]
    done: bool,
}

/// One live session with the remote stepper.
pub struct GymClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    n_actions: usize,
    frame_height: usize,
    frame_width: usize,
}

impl GymClient {
    /// Connects and performs the handshake. Failure here is fatal at
    /// startup; the pool is all-or-nothing.
    pub fn connect(config: &GymClientConfig) -> Result<Self> {
        let stream = TcpStream::connect(&config.addr)
            .with_context(|| format!("connecting to gym endpoint {}", config.addr))?;
        let writer = stream.try_clone()?;
        let mut client = Self {
            reader: BufReader::new(stream),
            writer,
            n_actions: 0,
            frame_height: 0,
            frame_width: 0,
        };
        let reply: MakeReply = client.request(&Request::Make {
            id: config.env_id.clone(),
            render: config.render,
        })?;
        client.n_actions = reply.actions;
        client.frame_height = reply.height;
        client.frame_width = reply.width;
        info!(
            "gym session {}: {} actions, {}x{} frames",
            config.env_id, reply.actions, reply.height, reply.width
        );
        Ok(client)
    }

    /// Size of the discrete action set.
    pub fn n_actions(&self) -> usize {
        self.n_actions
    }

    /// Raw frame height in pixels.
    pub fn frame_height(&self) -> usize {
        self.frame_height
    }

    /// Raw frame width in pixels.
    pub fn frame_width(&self) -> usize {
        self.frame_width
    }

    /// Resets the episode and returns the first frame.
    pub fn reset(&mut self) -> Result<RawFrame> {
        let reply: StepReply = self.request(&Request::Reset)?;
        self.frame(reply.obs)
    }

    /// Advances the episode by one action.
    pub fn step(&mut self, action: usize) -> Result<(RawFrame, f32, bool)> {
        let reply: StepReply = self.request(&Request::Step { action })?;
        let frame = self.frame(reply.obs)?;
        Ok((frame, reply.reward, reply.done))
    }

    fn frame(&self, data: Vec<u8>) -> Result<RawFrame> {
        let expected = self.frame_height * self.frame_width * 3;
        if data.len() != expected {
            bail!(
                "gym endpoint sent a frame of {} bytes, expected {}",
                data.len(),
                expected
            );
        }
        Ok(RawFrame {
            data,
            height: self.frame_height,
            width: self.frame_width,
        })
    }

    fn request<R: DeserializeOwned>(&mut self, req: &Request) -> Result<R> {
        let mut line = serde_json::to_string(req)?;
        line.push('\n');
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()?;

        let mut reply = String::new();
        let n = self.reader.read_line(&mut reply)?;
        if n == 0 {
            bail!("gym endpoint closed the connection");
        }
        serde_json::from_str(reply.trim_end()).context("decoding gym endpoint reply")
    }
}
