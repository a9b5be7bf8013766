//! Renders a sealed game into one PGN archive record.

use std::fmt::Write as _;

use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::uci::Uci;
use shakmaty::{CastlingMode, Chess, Color, Position};

use crate::game::{MatchData, MoveData, Termination};
use crate::uci::Score;

const LINE_LENGTH: usize = 80;

/// Builds the PGN record for one game: seven-tag roster plus start-position
/// and termination metadata, movetext with per-move `{score/depth time}`
/// comments wrapped at 80 columns.
pub struct PgnBuilder<'a> {
    data: &'a MatchData,
    event: &'a str,
}

impl<'a> PgnBuilder<'a> {
    pub fn new(data: &'a MatchData, event: &'a str) -> Self {
        PgnBuilder { data, event }
    }

    pub fn build(&self) -> String {
        let mut pgn = String::new();
        self.headers(&mut pgn);
        pgn.push('\n');
        self.movetext(&mut pgn);
        pgn.push('\n');
        pgn
    }

    fn headers(&self, pgn: &mut String) {
        let data = self.data;
        let mut header = |name: &str, value: &str| {
            let _ = writeln!(pgn, "[{name} \"{value}\"]");
        };
        header("Event", self.event);
        header("Site", "?");
        header("Date", &data.started_at.format("%Y.%m.%d").to_string());
        header("Round", &data.round.to_string());
        header("White", &data.white);
        header("Black", &data.black);
        header("Result", data.result_str());
        if let Some(fen) = &data.fen {
            header("SetUp", "1");
            header("FEN", fen);
        }
        header(
            "PlyCount",
            &(data.opening_moves.len() + data.moves.len()).to_string(),
        );
        if data.tc_white == data.tc_black {
            header("TimeControl", &data.tc_white.to_string());
        } else {
            header(
                "TimeControl",
                &format!("{}|{}", data.tc_white, data.tc_black),
            );
        }
        if let Some(termination) = termination_tag(data.termination) {
            header("Termination", termination);
        }
    }

    fn movetext(&self, pgn: &mut String) {
        let data = self.data;
        let mut pos: Chess = match &data.fen {
            Some(fen) => fen
                .parse::<Fen>()
                .ok()
                .and_then(|fen| fen.into_position(CastlingMode::Standard).ok())
                .unwrap_or_default(),
            None => Chess::default(),
        };

        let mut tokens: Vec<String> = Vec::new();
        let book_plies = data.opening_moves.len();
        let annotations: Vec<Option<&MoveData>> = std::iter::repeat(None)
            .take(book_plies)
            .chain(data.moves.iter().map(Some))
            .collect();

        for (ply, uci_str) in data
            .opening_moves
            .iter()
            .chain(data.moves.iter().map(|m| &m.uci))
            .enumerate()
        {
            let Some(mv) = Uci::from_ascii(uci_str.as_bytes())
                .ok()
                .and_then(|uci| uci.to_move(&pos).ok())
            else {
                // An illegal final move still appears in the record, as sent.
                tokens.push(uci_str.clone());
                break;
            };
            let number = pos.fullmoves().get();
            match pos.turn() {
                Color::White => tokens.push(format!("{number}.")),
                Color::Black if ply == 0 => tokens.push(format!("{number}...")),
                Color::Black => {}
            }
            let san = SanPlus::from_move_and_play_unchecked(&mut pos, &mv);
            let mut token = san.to_string();
            if let Some(annotation) = annotations[ply] {
                token.push_str(&comment(annotation));
            }
            tokens.push(token);
        }
        tokens.push(data.result_str().to_string());

        let mut line_len = 0;
        for (i, token) in tokens.iter().enumerate() {
            if i > 0 {
                if line_len + 1 + token.len() > LINE_LENGTH {
                    pgn.push('\n');
                    line_len = 0;
                } else {
                    pgn.push(' ');
                    line_len += 1;
                }
            }
            pgn.push_str(token);
            line_len += token.len();
        }
        pgn.push('\n');
    }
}

fn termination_tag(termination: Termination) -> Option<&'static str> {
    match termination {
        Termination::Normal => None,
        Termination::Adjudicated => Some("adjudication"),
        Termination::Timeout => Some("time forfeit"),
        Termination::IllegalMove => Some("illegal move"),
        Termination::EngineError => Some("abandoned"),
        Termination::Interrupt => Some("interrupted"),
    }
}

fn comment(annotation: &MoveData) -> String {
    let time = format!("{:.3}s", annotation.elapsed_ms as f64 / 1000.0);
    match annotation.score {
        Some(Score::Cp(cp)) => {
            format!(" {{{:+.2}/{} {}}}", cp as f64 / 100.0, annotation.depth.unwrap_or(0), time)
        }
        Some(Score::Mate(n)) => {
            let sign = if n >= 0 { "+" } else { "-" };
            format!(" {{{sign}M{}/{} {}}}", n.abs(), annotation.depth.unwrap_or(0), time)
        }
        None => format!(" {{{time}}}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeControl;
    use crate::game::GameOutcome;
    use chrono::Local;

    fn move_data(uci: &str, cp: i32) -> MoveData {
        MoveData {
            uci: uci.into(),
            elapsed_ms: 513,
            score: Some(Score::Cp(cp)),
            depth: Some(12),
        }
    }

    fn match_data() -> MatchData {
        MatchData {
            white: "alpha".into(),
            black: "beta".into(),
            outcome: GameOutcome::WhiteWins,
            reason: "Black resigns".into(),
            termination: Termination::Adjudicated,
            fen: None,
            opening_moves: vec!["e2e4".into(), "e7e5".into()],
            moves: vec![move_data("g1f3", 35), move_data("b8c6", -20)],
            round: 1,
            game_no: 1,
            started_at: Local::now(),
            tc_white: "10+0.1".parse::<TimeControl>().unwrap(),
            tc_black: "10+0.1".parse::<TimeControl>().unwrap(),
        }
    }

    #[test]
    fn record_has_roster_headers_and_san_movetext() {
        let data = match_data();
        let pgn = PgnBuilder::new(&data, "test event").build();

        assert!(pgn.contains("[Event \"test event\"]"));
        assert!(pgn.contains("[White \"alpha\"]"));
        assert!(pgn.contains("[Black \"beta\"]"));
        assert!(pgn.contains("[Result \"1-0\"]"));
        assert!(pgn.contains("[PlyCount \"4\"]"));
        assert!(pgn.contains("[TimeControl \"10+0.1\"]"));
        assert!(pgn.contains("[Termination \"adjudication\"]"));
        // Book moves are plain, engine moves carry comments.
        assert!(pgn.contains("1. e4 e5"));
        assert!(pgn.contains("2. Nf3 {+0.35/12 0.513s}"));
        assert!(pgn.contains("Nc6 {-0.20/12 0.513s}"));
        assert!(pgn.trim_end().ends_with("1-0"));
    }

    #[test]
    fn custom_fen_start_adds_setup_headers_and_numbering() {
        let mut data = match_data();
        data.fen = Some("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1".into());
        data.opening_moves = vec![];
        data.moves = vec![move_data("c7c5", 10)];
        data.outcome = GameOutcome::Draw;
        data.termination = Termination::Normal;

        let pgn = PgnBuilder::new(&data, "?").build();
        assert!(pgn.contains("[SetUp \"1\"]"));
        assert!(pgn.contains("[FEN \"rnbqkbnr/"));
        assert!(!pgn.contains("[Termination"));
        // Black to move in the start position.
        assert!(pgn.contains("1... c5"));
        assert!(pgn.contains("1/2-1/2"));
    }

    #[test]
    fn long_movetext_wraps() {
        let mut data = match_data();
        data.opening_moves = vec![
            "g1f3", "g8f6", "f3g1", "f6g8", "g1f3", "g8f6", "f3g1", "f6g8", "g1f3", "g8f6",
            "f3g1", "f6g8", "g1f3", "g8f6", "f3g1", "f6g8", "g1f3", "g8f6", "f3g1", "f6g8",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        data.moves = vec![];
        let pgn = PgnBuilder::new(&data, "?").build();
        let movetext: Vec<&str> = pgn.split("\n\n").nth(1).unwrap().lines().collect();
        assert!(movetext.len() > 1);
        for line in movetext {
            assert!(line.len() <= LINE_LENGTH);
        }
    }
}
