//! Plays exactly one game between two engines and seals the outcome.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use shakmaty::uci::Uci;
use shakmaty::zobrist::{Zobrist64, ZobristHash};
use shakmaty::{Chess, Color, EnPassantMode, Position};

use crate::config::{DrawAdjudication, EngineConfig, ResignAdjudication, TimeControl};
use crate::error::TournamentError;
use crate::openings::Opening;
use crate::uci::{GoParams, Score, UciEngine, MOVE_OVERHEAD};

/// Think-time cap for engines limited only by nodes or depth, so every
/// blocking wait stays bounded.
const NO_CLOCK_CAP: Duration = Duration::from_secs(300);

/// Final game result from the white side's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOutcome {
    WhiteWins,
    BlackWins,
    Draw,
    /// The game was interrupted and has no result.
    Unfinished,
}

impl GameOutcome {
    fn win_for(color: Color) -> Self {
        match color {
            Color::White => GameOutcome::WhiteWins,
            Color::Black => GameOutcome::BlackWins,
        }
    }

    fn loss_for(color: Color) -> Self {
        GameOutcome::win_for(!color)
    }
}

/// How the game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Decided by the rules of chess.
    Normal,
    Adjudicated,
    Timeout,
    IllegalMove,
    EngineError,
    Interrupt,
}

#[derive(Debug, Clone)]
pub struct MoveData {
    pub uci: String,
    pub elapsed_ms: u64,
    pub score: Option<Score>,
    pub depth: Option<u32>,
}

/// Sealed record of one finished game.
#[derive(Debug, Clone)]
pub struct MatchData {
    pub white: String,
    pub black: String,
    pub outcome: GameOutcome,
    pub reason: String,
    pub termination: Termination,
    /// Starting FEN when the opening was not the standard position.
    pub fen: Option<String>,
    /// Book moves played before the engines took over, in UCI notation.
    pub opening_moves: Vec<String>,
    pub moves: Vec<MoveData>,
    pub round: u32,
    pub game_no: u32,
    pub started_at: DateTime<Local>,
    pub tc_white: TimeControl,
    pub tc_black: TimeControl,
}

impl MatchData {
    pub fn result_str(&self) -> &'static str {
        match self.outcome {
            GameOutcome::WhiteWins => "1-0",
            GameOutcome::BlackWins => "0-1",
            GameOutcome::Draw => "1/2-1/2",
            GameOutcome::Unfinished => "*",
        }
    }

    /// Synthetic record for a game that never started because one side
    /// failed its handshake.
    pub fn forfeit(spec: &GameSpec, loser_is_white: bool, reason: String) -> MatchData {
        let loser = if loser_is_white {
            Color::White
        } else {
            Color::Black
        };
        MatchData {
            white: spec.white.name.clone(),
            black: spec.black.name.clone(),
            outcome: GameOutcome::loss_for(loser),
            reason,
            termination: Termination::EngineError,
            fen: spec.opening.fen.clone(),
            opening_moves: Vec::new(),
            moves: Vec::new(),
            round: spec.round,
            game_no: spec.game_no,
            started_at: Local::now(),
            tc_white: spec.white.limit.tc,
            tc_black: spec.black.limit.tc,
        }
    }
}

/// Inputs for one game.
pub struct GameSpec<'a> {
    pub white: &'a EngineConfig,
    pub black: &'a EngineConfig,
    pub opening: &'a Opening,
    pub round: u32,
    pub game_no: u32,
    pub draw: Option<DrawAdjudication>,
    pub resign: Option<ResignAdjudication>,
}

/// Per-side clock state for classical and fixed-time controls.
struct Clock {
    tc: TimeControl,
    remaining_ms: i64,
    moves_played: u32,
}

impl Clock {
    fn new(tc: TimeControl) -> Self {
        Clock {
            tc,
            remaining_ms: tc.time_ms as i64,
            moves_played: 0,
        }
    }

    /// Absolute deadline for the next move of this side.
    fn deadline(&self) -> Instant {
        let budget = if self.tc.fixed_time_ms > 0 {
            Duration::from_millis(self.tc.fixed_time_ms)
        } else if self.tc.time_ms > 0 {
            Duration::from_millis(self.remaining_ms.max(0) as u64)
        } else {
            NO_CLOCK_CAP
        };
        Instant::now() + budget + MOVE_OVERHEAD
    }

    /// Moves remaining to the next time control, for `go movestogo`.
    fn moves_to_go(&self) -> Option<u32> {
        if self.tc.moves_per_control == 0 {
            None
        } else {
            Some(self.tc.moves_per_control - self.moves_played % self.tc.moves_per_control)
        }
    }

    /// Deducts the elapsed time and applies increment and control refill.
    /// Returns false when the flag fell.
    fn consume(&mut self, elapsed_ms: u64) -> bool {
        if self.tc.fixed_time_ms > 0 {
            return elapsed_ms <= self.tc.fixed_time_ms + MOVE_OVERHEAD.as_millis() as u64;
        }
        if self.tc.time_ms == 0 {
            return true;
        }
        self.remaining_ms -= elapsed_ms as i64;
        if self.remaining_ms + (MOVE_OVERHEAD.as_millis() as i64) < 0 {
            return false;
        }
        self.remaining_ms += self.tc.increment_ms as i64;
        self.moves_played += 1;
        if self.tc.moves_per_control > 0 && self.moves_played % self.tc.moves_per_control == 0 {
            self.remaining_ms += self.tc.time_ms as i64;
        }
        true
    }
}

fn position_command(fen: &Option<String>, moves: &[String]) -> String {
    let mut cmd = match fen {
        Some(fen) => format!("position fen {fen}"),
        None => String::from("position startpos"),
    };
    if !moves.is_empty() {
        cmd.push_str(" moves ");
        cmd.push_str(&moves.join(" "));
    }
    cmd
}

fn go_params(turn: Color, white: &Clock, black: &Clock, limit: &crate::config::Limit) -> GoParams {
    let mover = match turn {
        Color::White => white,
        Color::Black => black,
    };
    let mut params = GoParams::default();
    if mover.tc.fixed_time_ms > 0 {
        params.movetime_ms = Some(mover.tc.fixed_time_ms);
    } else {
        if white.tc.time_ms > 0 {
            params.wtime_ms = Some(white.remaining_ms.max(0) as u64);
            if white.tc.increment_ms > 0 {
                params.winc_ms = Some(white.tc.increment_ms);
            }
        }
        if black.tc.time_ms > 0 {
            params.btime_ms = Some(black.remaining_ms.max(0) as u64);
            if black.tc.increment_ms > 0 {
                params.binc_ms = Some(black.tc.increment_ms);
            }
        }
        params.movestogo = mover.moves_to_go();
    }
    if limit.nodes > 0 {
        params.nodes = Some(limit.nodes);
    }
    if limit.plies > 0 {
        params.depth = Some(limit.plies);
    }
    params
}

/// Rule-based terminal detection: checkmate, stalemate, insufficient
/// material, fifty-move rule, threefold repetition.
fn rules_result(
    pos: &Chess,
    repetitions: &HashMap<Zobrist64, u32>,
) -> Option<(GameOutcome, String)> {
    if pos.is_checkmate() {
        let winner = !pos.turn();
        return Some((
            GameOutcome::win_for(winner),
            format!("{} mates", color_name(winner)),
        ));
    }
    if pos.is_stalemate() {
        return Some((GameOutcome::Draw, "draw by stalemate".into()));
    }
    if pos.is_insufficient_material() {
        return Some((
            GameOutcome::Draw,
            "draw by insufficient mating material".into(),
        ));
    }
    if pos.halfmoves() >= 100 {
        return Some((GameOutcome::Draw, "draw by fifty move rule".into()));
    }
    let key: Zobrist64 = pos.zobrist_hash(EnPassantMode::Legal);
    if repetitions.get(&key).copied().unwrap_or(0) >= 3 {
        return Some((GameOutcome::Draw, "draw by threefold repetition".into()));
    }
    None
}

fn color_name(color: Color) -> &'static str {
    match color {
        Color::White => "White",
        Color::Black => "Black",
    }
}

#[allow(clippy::too_many_arguments)]
fn sealed(
    spec: &GameSpec,
    started_at: DateTime<Local>,
    opening_uci: Vec<String>,
    moves: Vec<MoveData>,
    outcome: GameOutcome,
    reason: String,
    termination: Termination,
) -> MatchData {
    MatchData {
        white: spec.white.name.clone(),
        black: spec.black.name.clone(),
        outcome,
        reason,
        termination,
        fen: spec.opening.fen.clone(),
        opening_moves: opening_uci,
        moves,
        round: spec.round,
        game_no: spec.game_no,
        started_at,
        tc_white: spec.white.limit.tc,
        tc_black: spec.black.limit.tc,
    }
}

/// Runs one game to completion. The only error is a start failure of one
/// of the two engines (the caller decides between retry and forfeit);
/// everything that happens after both engines are up is sealed into the
/// returned `MatchData`.
pub fn run(spec: &GameSpec, stop: &AtomicBool) -> Result<MatchData, TournamentError> {
    let started_at = Local::now();
    let (mut pos, opening_uci) = spec.opening.setup()?;

    // Both engines must be up before the first move is requested; start
    // them concurrently so a slow loader does not serialize the pair.
    let (white_start, black_start) = std::thread::scope(|scope| {
        let white = scope.spawn(|| UciEngine::start(spec.white));
        let black = UciEngine::start(spec.black);
        (white.join().expect("engine start thread panicked"), black)
    });
    let mut white = white_start?;
    let mut black = black_start?;

    let mut clock_white = Clock::new(spec.white.limit.tc);
    let mut clock_black = Clock::new(spec.black.limit.tc);

    let mut repetitions: HashMap<Zobrist64, u32> = HashMap::new();
    *repetitions
        .entry(pos.zobrist_hash(EnPassantMode::Legal))
        .or_insert(0) += 1;

    let mut all_moves = opening_uci.clone();
    let mut moves: Vec<MoveData> = Vec::new();
    let mut draw_streak = 0u32;
    let mut resign_streak = [0u32; 2];

    for (engine, cfg) in [(&mut white, spec.white), (&mut black, spec.black)] {
        if engine.new_game().is_err() {
            let loser = if cfg.name == spec.white.name {
                Color::White
            } else {
                Color::Black
            };
            return Ok(sealed(
                spec,
                started_at,
                opening_uci,
                moves,
                GameOutcome::loss_for(loser),
                format!("{} disconnects", color_name(loser)),
                Termination::EngineError,
            ));
        }
    }

    loop {
        if let Some((outcome, reason)) = rules_result(&pos, &repetitions) {
            return Ok(sealed(
                spec,
                started_at,
                opening_uci,
                moves,
                outcome,
                reason,
                Termination::Normal,
            ));
        }
        if stop.load(Ordering::Relaxed) {
            return Ok(sealed(
                spec,
                started_at,
                opening_uci,
                moves,
                GameOutcome::Unfinished,
                "interrupted".into(),
                Termination::Interrupt,
            ));
        }

        let turn = pos.turn();
        let (engine, cfg) = match turn {
            Color::White => (&mut white, spec.white),
            Color::Black => (&mut black, spec.black),
        };
        let clock = match turn {
            Color::White => &clock_white,
            Color::Black => &clock_black,
        };

        let position_cmd = position_command(&spec.opening.fen, &all_moves);
        let params = go_params(turn, &clock_white, &clock_black, &cfg.limit);
        let deadline = clock.deadline();

        let before = Instant::now();
        let think = match engine.go(&position_cmd, &params, deadline, stop) {
            Ok(think) => think,
            Err(_) => {
                return Ok(sealed(
                    spec,
                    started_at,
                    opening_uci,
                    moves,
                    GameOutcome::loss_for(turn),
                    format!("{} disconnects", color_name(turn)),
                    Termination::EngineError,
                ));
            }
        };
        let elapsed_ms = before.elapsed().as_millis() as u64;

        if think.interrupted {
            return Ok(sealed(
                spec,
                started_at,
                opening_uci,
                moves,
                GameOutcome::Unfinished,
                "interrupted".into(),
                Termination::Interrupt,
            ));
        }

        let timed_out = {
            let clock = match turn {
                Color::White => &mut clock_white,
                Color::Black => &mut clock_black,
            };
            think.timed_out || !clock.consume(elapsed_ms)
        };
        if timed_out {
            return Ok(sealed(
                spec,
                started_at,
                opening_uci,
                moves,
                GameOutcome::loss_for(turn),
                format!("{} loses on time", color_name(turn)),
                Termination::Timeout,
            ));
        }

        let Some(uci_str) = think.best_move else {
            return Ok(sealed(
                spec,
                started_at,
                opening_uci,
                moves,
                GameOutcome::loss_for(turn),
                format!("{} disconnects", color_name(turn)),
                Termination::EngineError,
            ));
        };

        let mv = Uci::from_ascii(uci_str.as_bytes())
            .ok()
            .and_then(|uci| uci.to_move(&pos).ok());
        let Some(mv) = mv else {
            return Ok(sealed(
                spec,
                started_at,
                opening_uci,
                moves,
                GameOutcome::loss_for(turn),
                format!("{} makes an illegal move", color_name(turn)),
                Termination::IllegalMove,
            ));
        };

        moves.push(MoveData {
            uci: uci_str.clone(),
            elapsed_ms,
            score: think.score,
            depth: think.depth,
        });
        all_moves.push(uci_str);
        pos.play_unchecked(&mv);
        *repetitions
            .entry(pos.zobrist_hash(EnPassantMode::Legal))
            .or_insert(0) += 1;

        // Adjudication runs on the mover's reported score; a missing
        // score resets the streaks.
        let score_cp = think.score.map(|s| s.as_cp());
        if let Some(draw) = &spec.draw {
            match score_cp {
                Some(cp) if cp.abs() <= draw.score => draw_streak += 1,
                _ => draw_streak = 0,
            }
            if draw_streak >= draw.move_count && pos.fullmoves().get() > draw.move_number {
                return Ok(sealed(
                    spec,
                    started_at,
                    opening_uci,
                    moves,
                    GameOutcome::Draw,
                    "draw by adjudication".into(),
                    Termination::Adjudicated,
                ));
            }
        }
        if let Some(resign) = &spec.resign {
            let streak = &mut resign_streak[turn as usize];
            match score_cp {
                Some(cp) if cp <= -resign.score => *streak += 1,
                _ => *streak = 0,
            }
            if *streak >= resign.move_count {
                return Ok(sealed(
                    spec,
                    started_at,
                    opening_uci,
                    moves,
                    GameOutcome::loss_for(turn),
                    format!("{} resigns", color_name(turn)),
                    Termination::Adjudicated,
                ));
            }
        }
    }
}
