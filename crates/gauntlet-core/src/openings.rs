//! Opening book loading and the shared opening cursor.

use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use regex::Regex;
use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::{CastlingMode, Chess, Position};
use tracing::info;

use crate::config::{OpeningFormat, OpeningOptions, OpeningOrder};
use crate::error::TournamentError;

/// One starting position: a FEN (absent = standard start) and an optional
/// SAN move prefix played out before the engines take over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Opening {
    pub fen: Option<String>,
    pub moves: Vec<String>,
}

impl Opening {
    /// Replays the opening and returns the resulting board together with
    /// the prefix moves in UCI notation.
    pub fn setup(&self) -> Result<(Chess, Vec<String>), TournamentError> {
        let mut pos: Chess = match &self.fen {
            Some(fen) => fen
                .parse::<Fen>()
                .map_err(|e| TournamentError::OpeningLoad(format!("bad FEN '{fen}': {e}")))?
                .into_position(CastlingMode::Standard)
                .map_err(|e| TournamentError::OpeningLoad(format!("illegal position '{fen}': {e}")))?,
            None => Chess::default(),
        };
        let mut uci_moves = Vec::with_capacity(self.moves.len());
        for san_str in &self.moves {
            let san: San = san_str
                .parse()
                .map_err(|e| TournamentError::OpeningLoad(format!("bad SAN '{san_str}': {e}")))?;
            let mv = san.to_move(&pos).map_err(|e| {
                TournamentError::OpeningLoad(format!("illegal opening move '{san_str}': {e}"))
            })?;
            uci_moves.push(mv.to_uci(CastlingMode::Standard).to_string());
            pos.play_unchecked(&mv);
        }
        Ok((pos, uci_moves))
    }
}

/// Loaded opening book served as an infinite cyclic sequence. The cursor
/// is a shared atomic so concurrent workers never skip or repeat an entry
/// within a cycle.
#[derive(Debug)]
pub struct OpeningBook {
    openings: Vec<Opening>,
    start: u64,
    cursor: AtomicU64,
}

impl OpeningBook {
    pub fn load(options: &OpeningOptions, rng: &mut ChaCha8Rng) -> Result<Self, TournamentError> {
        let Some(file) = &options.file else {
            // No book configured: every game starts from the standard position.
            return Ok(OpeningBook {
                openings: vec![Opening::default()],
                start: 0,
                cursor: AtomicU64::new(0),
            });
        };

        let text = fs::read_to_string(file).map_err(|e| {
            TournamentError::OpeningLoad(format!("cannot read {}: {e}", file.display()))
        })?;

        let mut openings = match options.format {
            OpeningFormat::Epd => parse_epd(&text),
            OpeningFormat::Pgn => parse_pgn(&text),
        };

        if openings.is_empty() {
            return Err(TournamentError::OpeningLoad(format!(
                "no openings found in {}",
                file.display()
            )));
        }

        for opening in &openings {
            opening.setup()?;
        }

        if options.order == OpeningOrder::Random {
            openings.shuffle(rng);
        }

        info!(
            file = %file.display(),
            count = openings.len(),
            order = ?options.order,
            "opening book loaded"
        );

        Ok(OpeningBook {
            openings,
            start: options.start,
            cursor: AtomicU64::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.openings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.openings.is_empty()
    }

    /// Next opening in cyclic order; safe to call from any thread.
    pub fn next(&self) -> Opening {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        let idx = (self.start.wrapping_add(i) % self.openings.len() as u64) as usize;
        self.openings[idx].clone()
    }
}

fn parse_epd(text: &str) -> Vec<Opening> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| Opening {
            fen: Some(line.to_string()),
            moves: Vec::new(),
        })
        .collect()
}

/// Lightweight regex-based PGN extraction: headers we care about plus the
/// SAN movetext, one game per record. Comments, variations and NAGs are
/// stripped; everything else in the tag section is ignored.
fn parse_pgn(text: &str) -> Vec<Opening> {
    let header_re = Regex::new(r#"\[(\w+)\s+"([^"]*)"\]"#).unwrap();
    let mut games = Vec::new();
    let mut fen: Option<String> = None;
    let mut movetext = String::new();
    let mut in_moves = false;

    let mut flush = |fen: &mut Option<String>, movetext: &mut String| {
        let moves = extract_san_moves(movetext);
        if fen.is_some() || !moves.is_empty() {
            games.push(Opening {
                fen: fen.take(),
                moves,
            });
        }
        movetext.clear();
    };

    for line in text.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            if in_moves {
                flush(&mut fen, &mut movetext);
                in_moves = false;
            }
            if let Some(cap) = header_re.captures(line) {
                if &cap[1] == "FEN" {
                    fen = Some(cap[2].to_string());
                }
            }
        } else if !line.is_empty() {
            in_moves = true;
            movetext.push_str(line);
            movetext.push(' ');
        }
    }
    flush(&mut fen, &mut movetext);

    games
}

fn extract_san_moves(movetext: &str) -> Vec<String> {
    let comment_re = Regex::new(r"\{[^}]*\}").unwrap();
    let variation_re = Regex::new(r"\([^)]*\)").unwrap();
    let move_re =
        Regex::new(r"[KQRBN]?[a-h]?[1-8]?x?[a-h][1-8](?:=[QRBN])?[+#]?|O-O-O|O-O").unwrap();

    let no_comments = comment_re.replace_all(movetext, "");
    let no_variations = variation_re.replace_all(&no_comments, "");

    move_re
        .find_iter(&no_variations)
        .map(|m| m.as_str().to_string())
        .collect()
}
