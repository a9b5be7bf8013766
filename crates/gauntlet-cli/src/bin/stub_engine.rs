//! Minimal deterministic UCI engine used by the integration tests.
//!
//! Picks a legal move keyed off the position hash so games are
//! reproducible but non-trivial. `--fail-handshake` exits before `uciok`
//! to simulate a broken engine; `--delay-ms` slows each move down so
//! tests can interrupt a game in flight.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use shakmaty::fen::Fen;
use shakmaty::uci::Uci;
use shakmaty::zobrist::{Zobrist64, ZobristHash};
use shakmaty::{CastlingMode, Chess, EnPassantMode, Position};

struct Options {
    fail_handshake: bool,
    delay: Duration,
    name: String,
}

fn parse_args() -> Options {
    let mut options = Options {
        fail_handshake: false,
        delay: Duration::ZERO,
        name: "stub".to_string(),
    };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--fail-handshake" => options.fail_handshake = true,
            "--delay-ms" => {
                let ms = args
                    .next()
                    .and_then(|v| v.parse().ok())
                    .expect("--delay-ms needs a number");
                options.delay = Duration::from_millis(ms);
            }
            "--name" => options.name = args.next().expect("--name needs a value"),
            other => panic!("unknown stub-engine argument: {other}"),
        }
    }
    options
}

fn parse_position(line: &str) -> Option<Chess> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let mut pos: Chess;
    let mut idx = 1;
    match tokens.get(idx)? {
        &"startpos" => {
            pos = Chess::default();
            idx += 1;
        }
        &"fen" => {
            idx += 1;
            let mut fen_fields = Vec::new();
            while idx < tokens.len() && tokens[idx] != "moves" {
                fen_fields.push(tokens[idx]);
                idx += 1;
            }
            pos = fen_fields
                .join(" ")
                .parse::<Fen>()
                .ok()?
                .into_position(CastlingMode::Standard)
                .ok()?;
        }
        _ => return None,
    }
    if tokens.get(idx) == Some(&"moves") {
        for token in &tokens[idx + 1..] {
            let mv = Uci::from_ascii(token.as_bytes()).ok()?.to_move(&pos).ok()?;
            pos.play_unchecked(&mv);
        }
    }
    Some(pos)
}

fn main() {
    let options = parse_args();
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut pos = Chess::default();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let line = line.trim();

        if line == "uci" {
            if options.fail_handshake {
                std::process::exit(2);
            }
            writeln!(out, "id name {}", options.name).unwrap();
            writeln!(out, "id author gauntlet tests").unwrap();
            writeln!(out, "uciok").unwrap();
            out.flush().unwrap();
        } else if line == "isready" {
            writeln!(out, "readyok").unwrap();
            out.flush().unwrap();
        } else if line.starts_with("position") {
            if let Some(parsed) = parse_position(line) {
                pos = parsed;
            }
        } else if line.starts_with("go") {
            if !options.delay.is_zero() {
                std::thread::sleep(options.delay);
            }
            let moves = pos.legal_moves();
            if moves.is_empty() {
                writeln!(out, "bestmove 0000").unwrap();
            } else {
                let Zobrist64(hash) = pos.zobrist_hash(EnPassantMode::Legal);
                let mv = &moves[(hash % moves.len() as u64) as usize];
                let score = (hash % 41) as i64 - 20;
                writeln!(out, "info depth 1 score cp {score} nodes 1").unwrap();
                writeln!(out, "bestmove {}", mv.to_uci(CastlingMode::Standard)).unwrap();
            }
            out.flush().unwrap();
        } else if line == "quit" {
            break;
        }
        // setoption, ucinewgame and stop need no reply.
    }
}
