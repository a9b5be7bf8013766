//! Tournament and engine configuration types.
//!
//! Everything here is immutable after loading. The CLI layer (or a JSON
//! config file) produces a `TournamentOptions` plus a list of
//! `EngineConfig`s and hands them to the scheduler.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TournamentError;

/// Chess variant an engine is configured for. Only standard chess is
/// implemented; the tag exists so configs for other variants are rejected
/// up front instead of producing garbage games.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    #[default]
    Standard,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpeningFormat {
    #[default]
    Epd,
    Pgn,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpeningOrder {
    #[default]
    Sequential,
    Random,
}

/// Progress output flavor. `Cutechess` mimics the line format external
/// tooling scrapes and enables the 50/50 first-game color swap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Gauntlet,
    Cutechess,
}

/// Clock settings for one engine, all in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeControl {
    /// Base time per control (`go wtime`/`btime`).
    #[serde(default)]
    pub time_ms: u64,
    /// Increment per move (`go winc`/`binc`).
    #[serde(default)]
    pub increment_ms: u64,
    /// Fixed time per move (`go movetime`); overrides the clock when set.
    #[serde(default)]
    pub fixed_time_ms: u64,
    /// Moves per control (`go movestogo`); 0 = sudden death.
    #[serde(default)]
    pub moves_per_control: u32,
}

impl fmt::Display for TimeControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fixed_time_ms > 0 {
            return write!(f, "{}/move", format_seconds(self.fixed_time_ms));
        }
        if self.moves_per_control > 0 {
            write!(f, "{}/", self.moves_per_control)?;
        }
        write!(f, "{}", format_seconds(self.time_ms))?;
        if self.increment_ms > 0 {
            write!(f, "+{}", format_seconds(self.increment_ms))?;
        }
        Ok(())
    }
}

fn format_seconds(ms: u64) -> String {
    let secs = ms as f64 / 1000.0;
    if secs.fract() == 0.0 {
        format!("{}", secs as u64)
    } else {
        format!("{}", secs)
    }
}

fn parse_seconds(s: &str) -> Result<u64, TournamentError> {
    s.parse::<f64>()
        .ok()
        .filter(|v| *v >= 0.0)
        .map(|v| (v * 1000.0).round() as u64)
        .ok_or_else(|| TournamentError::Config(format!("invalid time value '{s}'")))
}

impl FromStr for TimeControl {
    type Err = TournamentError;

    /// Parses `moves/base+inc` with seconds as decimals, e.g. `40/60+0.6`,
    /// `10+0.1` or plain `8`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tc = TimeControl::default();
        let rest = match s.split_once('/') {
            Some((moves, rest)) => {
                tc.moves_per_control = moves.parse().map_err(|_| {
                    TournamentError::Config(format!("invalid moves-per-control in tc '{s}'"))
                })?;
                rest
            }
            None => s,
        };
        let base = match rest.split_once('+') {
            Some((base, inc)) => {
                tc.increment_ms = parse_seconds(inc)?;
                base
            }
            None => rest,
        };
        tc.time_ms = parse_seconds(base)?;
        Ok(tc)
    }
}

/// Search limit for the `go` command. At least one field must be positive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limit {
    #[serde(default)]
    pub tc: TimeControl,
    #[serde(default)]
    pub nodes: u64,
    #[serde(default)]
    pub plies: u32,
}

impl Limit {
    pub fn is_positive(&self) -> bool {
        self.tc.time_ms > 0 || self.tc.fixed_time_ms > 0 || self.nodes > 0 || self.plies > 0
    }
}

/// One engine entry in the tournament. Immutable after loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Display name, unique within a tournament.
    pub name: String,
    /// Executable to spawn.
    pub cmd: String,
    /// Extra command-line arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the child process.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// UCI options sent as `setoption name <k> value <v>` during startup.
    #[serde(default)]
    pub options: Vec<(String, String)>,
    #[serde(default)]
    pub limit: Limit,
    #[serde(default)]
    pub variant: Variant,
    /// Retry a game whose start handshake failed instead of forfeiting it.
    #[serde(default)]
    pub recover: bool,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), TournamentError> {
        if self.name.is_empty() {
            return Err(TournamentError::Config("engine is missing a name".into()));
        }
        if self.cmd.is_empty() {
            return Err(TournamentError::Config(format!(
                "engine '{}' is missing a command",
                self.name
            )));
        }
        if !self.limit.is_positive() {
            return Err(TournamentError::Config(format!(
                "engine '{}' has no positive limit (tc, st, nodes or depth)",
                self.name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpeningOptions {
    /// Opening book path; absent means every game starts from the
    /// standard position.
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub format: OpeningFormat,
    #[serde(default)]
    pub order: OpeningOrder,
    /// Offset into the (possibly shuffled) book.
    #[serde(default)]
    pub start: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SprtOptions {
    pub alpha: f64,
    pub beta: f64,
    pub elo0: f64,
    pub elo1: f64,
}

/// Draw adjudication: once `move_number` full moves have been played, a
/// streak of `move_count` plies in which both engines report
/// |score| <= `score` centipawns ends the game as a draw.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DrawAdjudication {
    pub move_number: u32,
    pub move_count: u32,
    pub score: i32,
}

/// Resign adjudication: an engine reporting score <= -`score` centipawns
/// for `move_count` consecutive own moves forfeits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResignAdjudication {
    pub move_count: u32,
    pub score: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TournamentOptions {
    /// Number of worker threads running games in parallel.
    pub concurrency: usize,
    pub rounds: u32,
    /// Games per pairing unit; 2 enables pentanomial reporting.
    pub games: u32,
    /// Seed for the opening shuffle and the cutechess color swap.
    pub seed: u64,
    pub opening: OpeningOptions,
    pub sprt: Option<SprtOptions>,
    /// Archive path; `.pgn` is appended when missing.
    pub pgn_file: Option<PathBuf>,
    pub output: OutputMode,
    pub report_penta: bool,
    pub draw: Option<DrawAdjudication>,
    pub resign: Option<ResignAdjudication>,
    /// PGN `Event` header.
    pub event: String,
}

impl Default for TournamentOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            rounds: 1,
            games: 2,
            seed: 0,
            opening: OpeningOptions::default(),
            sprt: None,
            pgn_file: None,
            output: OutputMode::Gauntlet,
            report_penta: true,
            draw: None,
            resign: None,
            event: "?".into(),
        }
    }
}

impl TournamentOptions {
    /// Pentanomial reporting is only meaningful for paired games.
    pub fn penta(&self) -> bool {
        self.report_penta && self.games == 2
    }

    pub fn validate(&self, engines: &[EngineConfig]) -> Result<(), TournamentError> {
        if self.concurrency == 0 {
            return Err(TournamentError::Config("concurrency must be positive".into()));
        }
        if self.rounds == 0 {
            return Err(TournamentError::Config("rounds must be positive".into()));
        }
        if !(1..=2).contains(&self.games) {
            return Err(TournamentError::Config("games must be 1 or 2".into()));
        }
        if engines.len() < 2 {
            return Err(TournamentError::Config(
                "a tournament needs at least two engines".into(),
            ));
        }
        for engine in engines {
            engine.validate()?;
        }
        for (i, a) in engines.iter().enumerate() {
            if engines.iter().skip(i + 1).any(|b| b.name == a.name) {
                return Err(TournamentError::Config(format!(
                    "duplicate engine name '{}'",
                    a.name
                )));
            }
        }
        if let Some(sprt) = &self.sprt {
            if engines.len() != 2 {
                return Err(TournamentError::Config(
                    "SPRT applies to exactly two engines".into(),
                ));
            }
            if sprt.elo0 == sprt.elo1 {
                return Err(TournamentError::Config("SPRT requires elo0 != elo1".into()));
            }
            if !(0.0..1.0).contains(&sprt.alpha)
                || !(0.0..1.0).contains(&sprt.beta)
                || sprt.alpha <= 0.0
                || sprt.beta <= 0.0
                || sprt.alpha + sprt.beta >= 1.0
            {
                return Err(TournamentError::Config(
                    "SPRT alpha/beta must lie in (0, 1) with alpha + beta < 1".into(),
                ));
            }
        }
        if let Some(draw) = &self.draw {
            if draw.move_count == 0 {
                return Err(TournamentError::Config(
                    "draw adjudication move_count must be positive".into(),
                ));
            }
        }
        if let Some(resign) = &self.resign {
            if resign.move_count == 0 || resign.score <= 0 {
                return Err(TournamentError::Config(
                    "resign adjudication needs a positive move_count and score".into(),
                ));
            }
        }
        Ok(())
    }

    /// Archive path with the `.pgn` extension applied.
    pub fn archive_path(&self) -> PathBuf {
        let mut path = self
            .pgn_file
            .clone()
            .unwrap_or_else(|| PathBuf::from("gauntlet"));
        if path.extension().is_none() {
            path.set_extension("pgn");
        }
        path
    }
}
