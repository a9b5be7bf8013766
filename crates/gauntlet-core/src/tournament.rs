//! Round-robin tournament scheduler.
//!
//! Enumerates `(engine_i, engine_j, round)` units onto the worker pool,
//! counts completions, drives SPRT evaluation on two-engine runs and
//! publishes the process-wide stop flag.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{error, info, warn};

use crate::archive::FileWriter;
use crate::config::{EngineConfig, OutputMode, TournamentOptions};
use crate::error::TournamentError;
use crate::game::{self, GameOutcome, GameSpec, MatchData, Termination};
use crate::ledger::ResultLedger;
use crate::openings::OpeningBook;
use crate::output::{make_output, Output};
use crate::pgn::PgnBuilder;
use crate::pool::WorkerPool;
use crate::sprt::{Sprt, SprtStatus};
use crate::stats::Stats;

/// All unordered pairings of `n` engines, one unit per round.
fn pairings(n: usize, rounds: u32) -> Vec<(usize, usize, u32)> {
    let mut units = Vec::with_capacity(n * (n - 1) / 2 * rounds as usize);
    for i in 0..n {
        for j in i + 1..n {
            for round in 0..rounds {
                units.push((i, j, round));
            }
        }
    }
    units
}

struct Shared {
    options: TournamentOptions,
    engines: Vec<EngineConfig>,
    book: OpeningBook,
    ledger: ResultLedger,
    output: Box<dyn Output>,
    writer: FileWriter,
    sprt: Sprt,
    rng: Mutex<ChaCha8Rng>,
    stop: Arc<AtomicBool>,
    completed: AtomicU64,
    total: u64,
    progress_lock: Mutex<()>,
    progress: Condvar,
    finalized: AtomicBool,
}

impl Shared {
    fn notify_progress(&self) {
        let _guard = self.progress_lock.lock().unwrap();
        self.progress.notify_all();
    }

    /// Exactly-once claim on the terminal report.
    fn claim_finalize(&self) -> bool {
        self.finalized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Runs one scheduling unit: `games` consecutive games between the
    /// pair, sharing a single opening with colors alternating.
    fn play_pairings(&self, i: usize, j: usize, round: u32) {
        if self.stop.load(Ordering::Relaxed) {
            return;
        }

        let a = &self.engines[i];
        let b = &self.engines[j];
        let mut first = a;
        let mut second = b;

        // Cutechess front ends expect the first game's colors to be coin
        // flipped; everywhere else the first engine starts white.
        if self.options.output == OutputMode::Cutechess && self.rng.lock().unwrap().gen_bool(0.5) {
            std::mem::swap(&mut first, &mut second);
        }

        let opening = self.book.next();
        let penta = self.options.penta();
        let mut pair = Stats::default();

        let mut game_idx = 0;
        while game_idx < self.options.games {
            if self.stop.load(Ordering::Relaxed) {
                return;
            }

            let current = self.completed.load(Ordering::Relaxed) + 1;
            self.output
                .start_game(&first.name, &second.name, current, self.total);

            let spec = GameSpec {
                white: first,
                black: second,
                opening: &opening,
                round: round + 1,
                game_no: round * self.options.games + game_idx + 1,
                draw: self.options.draw,
                resign: self.options.resign,
            };

            let data = match game::run(&spec, &self.stop) {
                Ok(data) => data,
                Err(err) => {
                    let failed = err.engine_name().unwrap_or(&first.name).to_string();
                    let recover = if failed == first.name {
                        first.recover
                    } else {
                        second.recover
                    };
                    if recover {
                        warn!(engine = %failed, error = %err, "game failed to start, retrying");
                        continue;
                    }
                    warn!(engine = %failed, error = %err, "game failed to start, forfeiting");
                    MatchData::forfeit(
                        &spec,
                        failed == first.name,
                        format!("{failed} failed to start"),
                    )
                }
            };

            if data.termination == Termination::Interrupt {
                // Interrupted games are neither counted nor archived.
                return;
            }

            let record = PgnBuilder::new(&data, &self.options.event).build();
            if let Err(err) = self.writer.append(&record) {
                error!(error = %err, "archive append failed");
            }

            let game_stats = match data.outcome {
                GameOutcome::WhiteWins => Stats::win(),
                GameOutcome::BlackWins => Stats::loss(),
                GameOutcome::Draw | GameOutcome::Unfinished => Stats::draw(),
            };
            // The unit accumulator stays in the first engine's view.
            let oriented = if first.name == a.name {
                game_stats
            } else {
                !game_stats
            };
            pair += oriented;

            let completed = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
            self.output.end_game(
                data.result_str(),
                &first.name,
                &second.name,
                &data.reason,
                completed,
            );

            if !penta {
                self.ledger.update(&a.name, &b.name, oriented);
                self.output.print_interval(
                    &self.sprt,
                    &self.ledger.snapshot(&a.name, &b.name),
                    &a.name,
                    &b.name,
                    completed,
                    penta,
                );
            }
            self.notify_progress();

            std::mem::swap(&mut first, &mut second);
            game_idx += 1;
        }

        if penta {
            self.ledger
                .update(&a.name, &b.name, pair.with_penta_bucket());
            self.output.print_interval(
                &self.sprt,
                &self.ledger.snapshot(&a.name, &b.name),
                &a.name,
                &b.name,
                self.completed.load(Ordering::Relaxed),
                penta,
            );
        }

        if self.sprt.valid() && self.engines.len() == 2 {
            self.update_sprt_status();
        }
        self.notify_progress();
    }

    fn update_sprt_status(&self) {
        let first = &self.engines[0].name;
        let second = &self.engines[1].name;
        let stats = self.ledger.snapshot(first, second);
        let llr = self.sprt.llr(&stats, self.options.penta());
        let status = self.sprt.status(llr);
        let completed = self.completed.load(Ordering::Relaxed);

        if status == SprtStatus::Continue && completed < self.total {
            return;
        }

        self.stop.store(true, Ordering::Relaxed);
        self.notify_progress();

        if self.claim_finalize() {
            let verdict = match status {
                SprtStatus::AcceptH1 => "H1 accepted",
                SprtStatus::AcceptH0 => "H0 accepted",
                SprtStatus::Continue => "inconclusive",
            };
            info!(llr, verdict, completed, "SPRT finished");
            println!("SPRT test finished: {verdict} {}", self.sprt.summary(llr));
            self.output.print_elo(&stats, first, second, completed);
            self.output.end_tournament();
        }
    }
}

pub struct RoundRobin {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for RoundRobin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundRobin").finish_non_exhaustive()
    }
}

impl RoundRobin {
    pub fn new(
        options: TournamentOptions,
        engines: Vec<EngineConfig>,
    ) -> Result<Self, TournamentError> {
        options.validate(&engines)?;

        let mut rng = ChaCha8Rng::seed_from_u64(options.seed);
        let book = OpeningBook::load(&options.opening, &mut rng)?;
        let writer = FileWriter::create(&options.archive_path())?;
        let sprt = options
            .sprt
            .as_ref()
            .map(Sprt::new)
            .unwrap_or_else(Sprt::disabled);

        let n = engines.len() as u64;
        let total = n * (n - 1) / 2 * options.rounds as u64 * options.games as u64;

        Ok(RoundRobin {
            shared: Arc::new(Shared {
                output: make_output(options.output),
                options,
                engines,
                book,
                ledger: ResultLedger::new(),
                writer,
                sprt,
                rng: Mutex::new(rng),
                stop: Arc::new(AtomicBool::new(false)),
                completed: AtomicU64::new(0),
                total,
                progress_lock: Mutex::new(()),
                progress: Condvar::new(),
                finalized: AtomicBool::new(false),
            }),
        })
    }

    /// Process-wide stop flag; setting it ends the tournament early.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shared.stop)
    }

    pub fn total_games(&self) -> u64 {
        self.shared.total
    }

    pub fn completed(&self) -> u64 {
        self.shared.completed.load(Ordering::Relaxed)
    }

    pub fn ledger(&self) -> &ResultLedger {
        &self.shared.ledger
    }

    /// Runs the tournament to completion or early stop, then joins the
    /// worker pool and emits the final tally.
    pub fn run(&self) -> Result<(), TournamentError> {
        let shared = &self.shared;
        info!(
            engines = shared.engines.len(),
            total = shared.total,
            concurrency = shared.options.concurrency,
            "starting round robin"
        );

        let mut pool = WorkerPool::new(shared.options.concurrency);
        for (i, j, round) in pairings(shared.engines.len(), shared.options.rounds) {
            let shared = Arc::clone(&self.shared);
            pool.enqueue(move || shared.play_pairings(i, j, round));
        }

        {
            let mut guard = shared.progress_lock.lock().unwrap();
            while shared.completed.load(Ordering::Relaxed) < shared.total
                && !shared.stop.load(Ordering::Relaxed)
            {
                let (next, _) = shared
                    .progress
                    .wait_timeout(guard, Duration::from_millis(200))
                    .unwrap();
                guard = next;
            }
        }

        // Publishes the stop to any units still queued; in-flight games
        // observe it at their next move boundary.
        shared.stop.store(true, Ordering::Relaxed);
        pool.shutdown();

        if shared.claim_finalize() {
            for (first, second, stats) in shared.ledger.pairs() {
                shared
                    .output
                    .print_elo(&stats, &first, &second, stats.sum());
            }
            shared.output.end_tournament();
        }

        info!(completed = self.completed(), "tournament complete");
        Ok(())
    }
}
