//! UCI engine process wrapper.
//!
//! Owns one child process speaking the UCI line protocol. A dedicated
//! reader thread drains the child's stdout into a channel so that reads
//! can honor absolute deadlines: a read that times out returns `None` and
//! leaves the process running. The child is killed and reaped on every
//! exit path.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::TournamentError;

/// Window for the startup handshake and per-game readiness checks.
pub const READY_TIMEOUT: Duration = Duration::from_secs(60);

/// Grace added on top of an engine's clock before it is flagged for losing
/// on time; absorbs process scheduling jitter.
pub const MOVE_OVERHEAD: Duration = Duration::from_millis(100);

/// Cancellation latency bound: deadline waits are sliced so the stop flag
/// is observed at least this often.
const POLL_SLICE: Duration = Duration::from_millis(100);

/// Last reported evaluation from an `info` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Cp(i32),
    Mate(i32),
}

impl Score {
    /// Centipawn view with mate scores saturated to +/-32000.
    pub fn as_cp(&self) -> i32 {
        match *self {
            Score::Cp(cp) => cp,
            Score::Mate(n) => {
                if n >= 0 {
                    32_000
                } else {
                    -32_000
                }
            }
        }
    }
}

/// Outcome of one `go` request.
#[derive(Debug, Clone, Default)]
pub struct ThinkResult {
    pub best_move: Option<String>,
    pub score: Option<Score>,
    pub depth: Option<u32>,
    /// No `bestmove` arrived before the deadline.
    pub timed_out: bool,
    /// The stop flag fired while waiting.
    pub interrupted: bool,
}

/// Clock arguments for one `go` command.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoParams {
    pub wtime_ms: Option<u64>,
    pub btime_ms: Option<u64>,
    pub winc_ms: Option<u64>,
    pub binc_ms: Option<u64>,
    pub movestogo: Option<u32>,
    pub movetime_ms: Option<u64>,
    pub nodes: Option<u64>,
    pub depth: Option<u32>,
}

impl GoParams {
    pub fn to_command(&self) -> String {
        let mut cmd = String::from("go");
        let mut push = |key: &str, value: String| {
            cmd.push(' ');
            cmd.push_str(key);
            cmd.push(' ');
            cmd.push_str(&value);
        };
        if let Some(v) = self.movetime_ms {
            push("movetime", v.to_string());
        }
        if let Some(v) = self.wtime_ms {
            push("wtime", v.to_string());
        }
        if let Some(v) = self.btime_ms {
            push("btime", v.to_string());
        }
        if let Some(v) = self.winc_ms {
            push("winc", v.to_string());
        }
        if let Some(v) = self.binc_ms {
            push("binc", v.to_string());
        }
        if let Some(v) = self.movestogo {
            push("movestogo", v.to_string());
        }
        if let Some(v) = self.nodes {
            push("nodes", v.to_string());
        }
        if let Some(v) = self.depth {
            push("depth", v.to_string());
        }
        cmd
    }
}

/// One UCI engine child process.
pub struct UciEngine {
    name: String,
    child: Child,
    stdin: ChildStdin,
    lines: Receiver<String>,
    reader: Option<JoinHandle<()>>,
}

impl UciEngine {
    /// Spawns the engine and completes the UCI handshake: `uci`/`uciok`,
    /// configured options, then `isready`/`readyok`, all within
    /// [`READY_TIMEOUT`].
    pub fn start(config: &EngineConfig) -> Result<Self, TournamentError> {
        let start_err = |reason: String| TournamentError::EngineStart {
            name: config.name.clone(),
            reason,
        };

        let mut command = Command::new(&config.cmd);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        if let Some(dir) = &config.dir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|e| start_err(format!("spawn failed: {e}")))?;

        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");

        let (tx, rx) = mpsc::channel();
        let reader = std::thread::Builder::new()
            .name(format!("uci-reader-{}", config.name))
            .spawn(move || {
                let reader = BufReader::new(stdout);
                for line in reader.lines() {
                    let Ok(line) = line else { break };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            })
            .map_err(|e| start_err(format!("reader thread spawn failed: {e}")))?;

        let mut engine = UciEngine {
            name: config.name.clone(),
            child,
            stdin,
            lines: rx,
            reader: Some(reader),
        };

        let result = engine.handshake(config);
        if let Err(e) = result {
            // The caller never sees this engine; reap it here.
            engine.shutdown();
            return Err(e);
        }
        Ok(engine)
    }

    fn handshake(&mut self, config: &EngineConfig) -> Result<(), TournamentError> {
        let deadline = Instant::now() + READY_TIMEOUT;
        let start_err = |reason: String| TournamentError::EngineStart {
            name: config.name.clone(),
            reason,
        };

        self.write_line("uci")
            .map_err(|e| start_err(e.to_string()))?;
        self.wait_for("uciok", deadline)
            .ok_or_else(|| start_err("no uciok before deadline".into()))?;

        for (key, value) in &config.options {
            self.write_line(&format!("setoption name {key} value {value}"))
                .map_err(|e| start_err(e.to_string()))?;
        }

        self.write_line("isready")
            .map_err(|e| start_err(e.to_string()))?;
        self.wait_for("readyok", deadline)
            .ok_or_else(|| start_err("no readyok before deadline".into()))?;

        debug!(engine = %self.name, "handshake complete");
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Re-synchronizes the engine at a game boundary.
    pub fn new_game(&mut self) -> Result<(), TournamentError> {
        self.write_line("ucinewgame")?;
        self.write_line("isready")?;
        self.wait_for("readyok", Instant::now() + READY_TIMEOUT)
            .ok_or_else(|| TournamentError::EngineIo {
                name: self.name.clone(),
                reason: "no readyok after ucinewgame".into(),
            })?;
        Ok(())
    }

    pub fn write_line(&mut self, line: &str) -> Result<(), TournamentError> {
        debug!(engine = %self.name, line, "->");
        writeln!(self.stdin, "{line}")
            .and_then(|_| self.stdin.flush())
            .map_err(|e| TournamentError::EngineIo {
                name: self.name.clone(),
                reason: format!("write failed: {e}"),
            })
    }

    /// Reads one line, waiting no later than `deadline`. `None` on expiry
    /// or closed pipe; the process is left running.
    pub fn read_line(&self, deadline: Instant) -> Option<String> {
        self.recv(deadline).unwrap_or(None)
    }

    /// Deadline-bounded receive distinguishing expiry (`Ok(None)`) from a
    /// closed pipe (`Err`).
    fn recv(&self, deadline: Instant) -> Result<Option<String>, RecvTimeoutError> {
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        match self.lines.recv_timeout(deadline - now) {
            Ok(line) => {
                debug!(engine = %self.name, line, "<-");
                Ok(Some(line))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(e @ RecvTimeoutError::Disconnected) => Err(e),
        }
    }

    fn wait_for(&self, expected: &str, deadline: Instant) -> Option<()> {
        while let Some(line) = self.read_line(deadline) {
            if line.trim() == expected {
                return Some(());
            }
        }
        None
    }

    /// Sends a position and a think command, then polls output until a
    /// `bestmove` arrives, the deadline expires, or the stop flag fires.
    /// The last seen `info` score and depth are retained for adjudication
    /// and archive comments.
    pub fn go(
        &mut self,
        position_cmd: &str,
        params: &GoParams,
        deadline: Instant,
        stop: &AtomicBool,
    ) -> Result<ThinkResult, TournamentError> {
        self.write_line(position_cmd)?;
        self.write_line(&params.to_command())?;

        let mut result = ThinkResult::default();
        loop {
            if stop.load(Ordering::Relaxed) {
                result.interrupted = true;
                return Ok(result);
            }
            let slice = deadline.min(Instant::now() + POLL_SLICE);
            let line = match self.recv(slice) {
                Ok(Some(line)) => line,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        result.timed_out = true;
                        return Ok(result);
                    }
                    continue;
                }
                Err(_) => {
                    return Err(TournamentError::EngineIo {
                        name: self.name.clone(),
                        reason: "engine closed its output pipe".into(),
                    })
                }
            };
            let line = line.trim();
            if line.starts_with("info") {
                if let Some(cp) = parse_field::<i32>(line, "cp") {
                    result.score = Some(Score::Cp(cp));
                }
                if let Some(mate) = parse_field::<i32>(line, "mate") {
                    result.score = Some(Score::Mate(mate));
                }
                if let Some(depth) = parse_field::<u32>(line, "depth") {
                    result.depth = Some(depth);
                }
            } else if let Some(rest) = line.strip_prefix("bestmove") {
                result.best_move = rest.split_whitespace().next().map(str::to_string);
                return Ok(result);
            }
        }
    }

    /// Best-effort `quit`, then kill and reap. Idempotent.
    fn shutdown(&mut self) {
        let _ = writeln!(self.stdin, "quit").and_then(|_| self.stdin.flush());

        // Give the engine a moment to exit on its own.
        let deadline = Instant::now() + Duration::from_millis(50);
        let exited = loop {
            match self.child.try_wait() {
                Ok(Some(_)) => break true,
                Ok(None) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(5));
                }
                _ => break false,
            }
        };

        if !exited {
            if let Err(e) = self.child.kill() {
                warn!(engine = %self.name, error = %e, "kill failed");
            }
            let _ = self.child.wait();
        }

        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

impl Drop for UciEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Value following `key` in a whitespace-tokenized UCI line.
fn parse_field<T: std::str::FromStr>(line: &str, key: &str) -> Option<T> {
    let mut tokens = line.split_whitespace();
    while let Some(token) = tokens.next() {
        if token == key {
            return tokens.next()?.parse().ok();
        }
    }
    None
}
