//! Progress output backends.
//!
//! These print the user-facing tournament feed to stdout. `Gauntlet` is
//! the native format; `Cutechess` mimics the line shapes external tooling
//! already scrapes (and enables the random first-game color swap in the
//! scheduler).

use crate::config::OutputMode;
use crate::elo::EloEstimate;
use crate::sprt::Sprt;
use crate::stats::Stats;

pub trait Output: Send + Sync {
    fn mode(&self) -> OutputMode;

    fn start_game(&self, first: &str, second: &str, current: u64, total: u64);

    fn end_game(&self, result: &str, first: &str, second: &str, reason: &str, current: u64);

    fn print_elo(&self, stats: &Stats, first: &str, second: &str, current: u64);

    fn print_sprt(&self, sprt: &Sprt, stats: &Stats, penta: bool);

    #[allow(clippy::too_many_arguments)]
    fn print_interval(
        &self,
        sprt: &Sprt,
        stats: &Stats,
        first: &str,
        second: &str,
        current: u64,
        penta: bool,
    ) {
        println!("--------------------------------------------------");
        self.print_elo(stats, first, second, current);
        if sprt.valid() {
            self.print_sprt(sprt, stats, penta);
        }
        println!("--------------------------------------------------");
    }

    fn end_tournament(&self);
}

pub fn make_output(mode: OutputMode) -> Box<dyn Output> {
    match mode {
        OutputMode::Gauntlet => Box::new(GauntletOutput),
        OutputMode::Cutechess => Box::new(CutechessOutput),
    }
}

pub struct GauntletOutput;

impl Output for GauntletOutput {
    fn mode(&self) -> OutputMode {
        OutputMode::Gauntlet
    }

    fn start_game(&self, first: &str, second: &str, current: u64, total: u64) {
        println!("Started game {current} of {total} ({first} vs {second})");
    }

    fn end_game(&self, result: &str, first: &str, second: &str, reason: &str, current: u64) {
        println!("Finished game {current} ({first} vs {second}): {result} {{{reason}}}");
    }

    fn print_elo(&self, stats: &Stats, first: &str, second: &str, current: u64) {
        let elo = EloEstimate::new(stats);
        println!(
            "Score of {first} vs {second} after {current} games: {} - {} - {} ({:.2})",
            stats.wins,
            stats.losses,
            stats.draws,
            stats.score()
        );
        if stats.penta_sum() > 0 {
            println!(
                "Ptnml:   WW: {}, WD: {}, DD|WL: {}, LD: {}, LL: {}",
                stats.penta_ww,
                stats.penta_wd,
                stats.penta_dd + stats.penta_wl,
                stats.penta_ld,
                stats.penta_ll
            );
        }
        println!("Elo difference: {}", elo.summary());
    }

    fn print_sprt(&self, sprt: &Sprt, stats: &Stats, penta: bool) {
        let llr = sprt.llr(stats, penta);
        println!("SPRT: {}", sprt.summary(llr));
    }

    fn end_tournament(&self) {
        println!("Tournament finished");
    }
}

pub struct CutechessOutput;

impl Output for CutechessOutput {
    fn mode(&self) -> OutputMode {
        OutputMode::Cutechess
    }

    fn start_game(&self, first: &str, second: &str, current: u64, total: u64) {
        println!("Started game {current} of {total} ({first} vs {second})");
    }

    fn end_game(&self, result: &str, first: &str, second: &str, reason: &str, current: u64) {
        println!("Finished game {current} ({first} vs {second}): {result} {{{reason}}}");
    }

    fn print_elo(&self, stats: &Stats, first: &str, second: &str, current: u64) {
        let elo = EloEstimate::new(stats);
        println!(
            "Score of {first} vs {second}: {} - {} - {}  [{:.3}] {current}",
            stats.wins,
            stats.losses,
            stats.draws,
            stats.score()
        );
        println!(
            "Elo difference: {}, LOS: {:.1} %, DrawRatio: {:.1} %",
            elo.summary(),
            elo.los() * 100.0,
            elo.draw_ratio() * 100.0
        );
    }

    fn print_sprt(&self, sprt: &Sprt, stats: &Stats, penta: bool) {
        let llr = sprt.llr(stats, penta);
        println!(
            "SPRT: llr {llr:.2}, lbound {:.2}, ubound {:.2}",
            sprt.lower(),
            sprt.upper()
        );
    }

    fn end_tournament(&self) {
        println!("Finished match");
    }
}
