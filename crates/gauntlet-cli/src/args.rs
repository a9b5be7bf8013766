//! Command-line surface: flags in, `TournamentOptions` + engine list out.

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use serde::Deserialize;

use gauntlet_core::config::{
    DrawAdjudication, EngineConfig, OpeningFormat, OpeningOptions, OpeningOrder, OutputMode,
    ResignAdjudication, SprtOptions, TournamentOptions,
};
use gauntlet_core::TournamentError;

#[derive(Parser, Debug)]
#[command(name = "gauntlet", version, about = "Run round-robin tournaments between UCI engines")]
pub struct Args {
    /// Engine definition as key=value tokens. Recognized keys: cmd=, name=,
    /// dir=, arg= (repeatable), tc=moves/base+inc, st=seconds, nodes=,
    /// depth=, recover=, option.<Name>=<Value>. Repeat --engine per engine.
    #[arg(long = "engine", num_args = 1.., value_name = "KEY=VALUE")]
    pub engine: Vec<Vec<String>>,

    /// JSON file holding the full tournament configuration; engines given
    /// on the command line are appended to the ones in the file.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Worker threads running games in parallel; 0 = one per CPU core.
    #[arg(long, default_value_t = 1)]
    pub concurrency: usize,

    #[arg(long, default_value_t = 1)]
    pub rounds: u32,

    /// Games per pairing; 2 enables pentanomial statistics.
    #[arg(long, default_value_t = 2)]
    pub games: u32,

    /// Seed for the opening shuffle and color swaps.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Retry games whose engine failed to start, for every engine.
    #[arg(long)]
    pub recover: bool,

    #[arg(long, value_name = "FILE")]
    pub openings_file: Option<PathBuf>,

    /// epd or pgn
    #[arg(long, default_value = "epd")]
    pub openings_format: String,

    /// sequential or random
    #[arg(long, default_value = "sequential")]
    pub openings_order: String,

    #[arg(long, default_value_t = 0)]
    pub openings_start: u64,

    #[arg(long, default_value_t = 0.05)]
    pub sprt_alpha: f64,

    #[arg(long, default_value_t = 0.05)]
    pub sprt_beta: f64,

    /// Setting both --sprt-elo0 and --sprt-elo1 enables the SPRT.
    #[arg(long)]
    pub sprt_elo0: Option<f64>,

    #[arg(long)]
    pub sprt_elo1: Option<f64>,

    /// Archive file for finished games (.pgn appended when missing).
    #[arg(long, value_name = "FILE")]
    pub pgn_out: Option<PathBuf>,

    /// gauntlet or cutechess
    #[arg(long, default_value = "gauntlet")]
    pub output: String,

    #[arg(long, default_value_t = true, action = ArgAction::Set, value_name = "BOOL")]
    pub report_penta: bool,

    #[arg(long, value_name = "N")]
    pub draw_move_number: Option<u32>,

    /// Setting both --draw-move-count and --draw-score enables draw
    /// adjudication.
    #[arg(long, value_name = "N")]
    pub draw_move_count: Option<u32>,

    #[arg(long, value_name = "CP")]
    pub draw_score: Option<i32>,

    /// Setting both --resign-move-count and --resign-score enables resign
    /// adjudication.
    #[arg(long, value_name = "N")]
    pub resign_move_count: Option<u32>,

    #[arg(long, value_name = "CP")]
    pub resign_score: Option<i32>,

    /// PGN Event header.
    #[arg(long, default_value = "?")]
    pub event: String,
}

/// Shape of the `--config` JSON file.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(flatten)]
    options: TournamentOptions,
    #[serde(default)]
    engines: Vec<EngineConfig>,
}

impl Args {
    pub fn resolve(self) -> Result<(TournamentOptions, Vec<EngineConfig>), TournamentError> {
        let (mut options, mut engines) = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    TournamentError::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                let file: ConfigFile = serde_json::from_str(&text).map_err(|e| {
                    TournamentError::Config(format!("cannot parse {}: {e}", path.display()))
                })?;
                (file.options, file.engines)
            }
            None => (self.options_from_flags()?, Vec::new()),
        };

        for tokens in &self.engine {
            engines.push(parse_engine_spec(tokens)?);
        }
        if self.recover {
            for engine in &mut engines {
                engine.recover = true;
            }
        }
        if options.concurrency == 0 {
            options.concurrency = num_cpus::get();
        }

        Ok((options, engines))
    }

    fn options_from_flags(&self) -> Result<TournamentOptions, TournamentError> {
        let format = match self.openings_format.as_str() {
            "epd" => OpeningFormat::Epd,
            "pgn" => OpeningFormat::Pgn,
            other => {
                return Err(TournamentError::Config(format!(
                    "unknown opening format '{other}'"
                )))
            }
        };
        let order = match self.openings_order.as_str() {
            "sequential" => OpeningOrder::Sequential,
            "random" => OpeningOrder::Random,
            other => {
                return Err(TournamentError::Config(format!(
                    "unknown opening order '{other}'"
                )))
            }
        };
        let output = match self.output.as_str() {
            "gauntlet" => OutputMode::Gauntlet,
            "cutechess" => OutputMode::Cutechess,
            other => {
                return Err(TournamentError::Config(format!(
                    "unknown output mode '{other}'"
                )))
            }
        };

        let sprt = match (self.sprt_elo0, self.sprt_elo1) {
            (Some(elo0), Some(elo1)) => Some(SprtOptions {
                alpha: self.sprt_alpha,
                beta: self.sprt_beta,
                elo0,
                elo1,
            }),
            (None, None) => None,
            _ => {
                return Err(TournamentError::Config(
                    "SPRT needs both --sprt-elo0 and --sprt-elo1".into(),
                ))
            }
        };

        let draw = match (self.draw_move_count, self.draw_score) {
            (Some(move_count), Some(score)) => Some(DrawAdjudication {
                move_number: self.draw_move_number.unwrap_or(0),
                move_count,
                score,
            }),
            (None, None) => None,
            _ => {
                return Err(TournamentError::Config(
                    "draw adjudication needs both --draw-move-count and --draw-score".into(),
                ))
            }
        };

        let resign = match (self.resign_move_count, self.resign_score) {
            (Some(move_count), Some(score)) => Some(ResignAdjudication { move_count, score }),
            (None, None) => None,
            _ => {
                return Err(TournamentError::Config(
                    "resign adjudication needs both --resign-move-count and --resign-score".into(),
                ))
            }
        };

        Ok(TournamentOptions {
            concurrency: self.concurrency,
            rounds: self.rounds,
            games: self.games,
            seed: self.seed,
            opening: OpeningOptions {
                file: self.openings_file.clone(),
                format,
                order,
                start: self.openings_start,
            },
            sprt,
            pgn_file: self.pgn_out.clone(),
            output,
            report_penta: self.report_penta,
            draw,
            resign,
            event: self.event.clone(),
        })
    }
}

/// Parses one `--engine` occurrence worth of key=value tokens.
pub fn parse_engine_spec(tokens: &[String]) -> Result<EngineConfig, TournamentError> {
    let mut engine = EngineConfig {
        name: String::new(),
        cmd: String::new(),
        args: Vec::new(),
        dir: None,
        options: Vec::new(),
        limit: Default::default(),
        variant: Default::default(),
        recover: false,
    };

    for token in tokens {
        let (key, value) = token.split_once('=').ok_or_else(|| {
            TournamentError::Config(format!("engine token '{token}' is not key=value"))
        })?;
        match key {
            "cmd" => engine.cmd = value.to_string(),
            "name" => engine.name = value.to_string(),
            "dir" => engine.dir = Some(PathBuf::from(value)),
            "arg" => engine.args.push(value.to_string()),
            "tc" => {
                let st = engine.limit.tc.fixed_time_ms;
                engine.limit.tc = value.parse()?;
                engine.limit.tc.fixed_time_ms = st;
            }
            "st" => {
                engine.limit.tc.fixed_time_ms = (value
                    .parse::<f64>()
                    .map_err(|_| {
                        TournamentError::Config(format!("invalid st value '{value}'"))
                    })?
                    * 1000.0)
                    .round() as u64
            }
            "nodes" => {
                engine.limit.nodes = value.parse().map_err(|_| {
                    TournamentError::Config(format!("invalid nodes value '{value}'"))
                })?
            }
            "depth" => {
                engine.limit.plies = value.parse().map_err(|_| {
                    TournamentError::Config(format!("invalid depth value '{value}'"))
                })?
            }
            "recover" => {
                engine.recover = value.parse().map_err(|_| {
                    TournamentError::Config(format!("invalid recover value '{value}'"))
                })?
            }
            _ => {
                if let Some(option) = key.strip_prefix("option.") {
                    engine
                        .options
                        .push((option.to_string(), value.to_string()));
                } else {
                    return Err(TournamentError::Config(format!(
                        "unknown engine key '{key}'"
                    )));
                }
            }
        }
    }

    if engine.name.is_empty() || engine.cmd.is_empty() {
        return Err(TournamentError::Config(
            "every engine needs name= and cmd=".into(),
        ));
    }
    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(spec: &[&str]) -> Vec<String> {
        spec.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn engine_spec_round_trip() {
        let engine = parse_engine_spec(&tokens(&[
            "cmd=/usr/bin/stockfish",
            "name=sf",
            "tc=40/60+0.6",
            "nodes=100000",
            "arg=--threads",
            "arg=1",
            "option.Hash=128",
            "recover=true",
        ]))
        .unwrap();

        assert_eq!(engine.name, "sf");
        assert_eq!(engine.cmd, "/usr/bin/stockfish");
        assert_eq!(engine.args, vec!["--threads", "1"]);
        assert_eq!(engine.limit.tc.moves_per_control, 40);
        assert_eq!(engine.limit.tc.time_ms, 60_000);
        assert_eq!(engine.limit.nodes, 100_000);
        assert_eq!(engine.options, vec![("Hash".to_string(), "128".to_string())]);
        assert!(engine.recover);
    }

    #[test]
    fn engine_spec_requires_name_and_cmd() {
        assert!(parse_engine_spec(&tokens(&["cmd=/bin/sf"])).is_err());
        assert!(parse_engine_spec(&tokens(&["name=sf"])).is_err());
        assert!(parse_engine_spec(&tokens(&["bogus"])).is_err());
        assert!(parse_engine_spec(&tokens(&["cmd=/bin/sf", "name=sf", "weird=1"])).is_err());
    }

    #[test]
    fn flags_resolve_to_options() {
        let args = Args::parse_from([
            "gauntlet",
            "--rounds",
            "3",
            "--games",
            "1",
            "--seed",
            "7",
            "--openings-order",
            "random",
            "--sprt-elo0",
            "0",
            "--sprt-elo1",
            "5",
            "--engine",
            "cmd=/bin/a",
            "name=a",
            "st=0.1",
            "--engine",
            "cmd=/bin/b",
            "name=b",
            "st=0.1",
        ]);
        let (options, engines) = args.resolve().unwrap();
        assert_eq!(options.rounds, 3);
        assert_eq!(options.games, 1);
        assert_eq!(options.seed, 7);
        assert_eq!(options.opening.order, OpeningOrder::Random);
        let sprt = options.sprt.unwrap();
        assert_eq!(sprt.elo1, 5.0);
        assert_eq!(engines.len(), 2);
        assert_eq!(engines[0].limit.tc.fixed_time_ms, 100);
    }

    #[test]
    fn half_configured_sprt_is_rejected() {
        let args = Args::parse_from(["gauntlet", "--sprt-elo0", "0"]);
        assert!(args.resolve().is_err());
    }

    #[test]
    fn global_recover_applies_to_all_engines() {
        let args = Args::parse_from([
            "gauntlet",
            "--recover",
            "--engine",
            "cmd=/bin/a",
            "name=a",
            "st=0.1",
        ]);
        let (_, engines) = args.resolve().unwrap();
        assert!(engines[0].recover);
    }
}
