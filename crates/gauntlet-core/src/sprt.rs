//! Sequential probability ratio test over a pair's result record.
//!
//! Uses the GSPRT approximation: the Elo hypotheses are mapped to expected
//! score rates through the logistic curve and the log-likelihood ratio is
//! computed from the observed score mean and variance, per game for the
//! trinomial model and per game pair for the pentanomial one.

use crate::config::SprtOptions;
use crate::elo::expected_score;
use crate::stats::Stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SprtStatus {
    Continue,
    AcceptH0,
    AcceptH1,
}

#[derive(Debug, Clone, Copy)]
pub struct Sprt {
    valid: bool,
    lower: f64,
    upper: f64,
    elo0: f64,
    elo1: f64,
}

impl Sprt {
    pub fn new(options: &SprtOptions) -> Self {
        Sprt {
            valid: options.elo0 != options.elo1,
            lower: (options.beta / (1.0 - options.alpha)).ln(),
            upper: ((1.0 - options.beta) / options.alpha).ln(),
            elo0: options.elo0,
            elo1: options.elo1,
        }
    }

    /// A disabled test: never valid, never decisive.
    pub fn disabled() -> Self {
        Sprt {
            valid: false,
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
            elo0: 0.0,
            elo1: 0.0,
        }
    }

    pub fn valid(&self) -> bool {
        self.valid
    }

    /// Log-likelihood ratio of H1 over H0 for the observed record.
    /// Pentanomial pair counts are used when `penta` is set and any pairs
    /// have been recorded; otherwise falls back to the trinomial model.
    pub fn llr(&self, stats: &Stats, penta: bool) -> f64 {
        if !self.valid {
            return 0.0;
        }
        if penta && stats.penta_sum() > 0 {
            self.llr_from_samples(
                &[
                    (0.0, stats.penta_ll as f64),
                    (0.25, stats.penta_ld as f64),
                    (0.5, (stats.penta_wl + stats.penta_dd) as f64),
                    (0.75, stats.penta_wd as f64),
                    (1.0, stats.penta_ww as f64),
                ],
            )
        } else {
            self.llr_from_samples(&[
                (0.0, stats.losses as f64),
                (0.5, stats.draws as f64),
                (1.0, stats.wins as f64),
            ])
        }
    }

    fn llr_from_samples(&self, outcomes: &[(f64, f64)]) -> f64 {
        let n: f64 = outcomes.iter().map(|(_, count)| count).sum();
        if n == 0.0 {
            return 0.0;
        }
        let mean: f64 = outcomes.iter().map(|(x, count)| x * count).sum::<f64>() / n;
        let mean_sq: f64 = outcomes.iter().map(|(x, count)| x * x * count).sum::<f64>() / n;
        let variance = mean_sq - mean * mean;
        if variance <= 0.0 {
            return 0.0;
        }
        let s0 = expected_score(self.elo0);
        let s1 = expected_score(self.elo1);
        (s1 - s0) * (2.0 * mean - s0 - s1) / (2.0 * variance / n)
    }

    pub fn status(&self, llr: f64) -> SprtStatus {
        if !self.valid {
            return SprtStatus::Continue;
        }
        if llr >= self.upper {
            SprtStatus::AcceptH1
        } else if llr <= self.lower {
            SprtStatus::AcceptH0
        } else {
            SprtStatus::Continue
        }
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    pub fn elo0(&self) -> f64 {
        self.elo0
    }

    pub fn elo1(&self) -> f64 {
        self.elo1
    }

    /// `"llr 2.97 (100.8%), lower: -2.94, upper: 2.94"`
    pub fn summary(&self, llr: f64) -> String {
        let percent = if self.upper != 0.0 {
            llr / self.upper * 100.0
        } else {
            0.0
        };
        format!(
            "llr {:.2} ({:.1}%), lower: {:.2}, upper: {:.2}",
            llr, percent, self.lower, self.upper
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sprt() -> Sprt {
        Sprt::new(&SprtOptions {
            alpha: 0.05,
            beta: 0.05,
            elo0: 0.0,
            elo1: 5.0,
        })
    }

    fn stats(wins: u64, draws: u64, losses: u64) -> Stats {
        Stats {
            wins,
            draws,
            losses,
            ..Stats::default()
        }
    }

    #[test]
    fn bounds_match_wald() {
        let s = sprt();
        assert!((s.lower() - (0.05f64 / 0.95).ln()).abs() < 1e-12);
        assert!((s.upper() - (0.95f64 / 0.05).ln()).abs() < 1e-12);
    }

    #[test]
    fn llr_is_reproducible() {
        let s = sprt();
        let record = stats(120, 60, 80);
        assert_eq!(s.llr(&record, false), s.llr(&record, false));
    }

    #[test]
    fn degenerate_records_yield_zero() {
        let s = sprt();
        assert_eq!(s.llr(&Stats::default(), false), 0.0);
        // All wins: zero variance.
        assert_eq!(s.llr(&stats(50, 0, 0), false), 0.0);
    }

    #[test]
    fn strong_record_accepts_h1_and_stays_crossed() {
        let s = sprt();
        let mut record = Stats::default();
        let mut decided_at = None;
        // Injected 70% win rate, well above the elo1=5 hypothesis.
        for game in 0..2000u64 {
            record += match game % 10 {
                0..=6 => Stats::win(),
                7 => Stats::draw(),
                _ => Stats::loss(),
            };
            match s.status(s.llr(&record, false)) {
                SprtStatus::AcceptH1 => {
                    decided_at = Some(game);
                    break;
                }
                SprtStatus::AcceptH0 => panic!("accepted H0 on a winning record"),
                SprtStatus::Continue => {}
            }
        }
        let decided_at = decided_at.expect("70% win rate must stop before 2000 games");
        assert!(decided_at < 1999);

        // Once crossed, the bound stays crossed as the record keeps growing
        // in the same direction.
        for _ in 0..100 {
            record += Stats::win();
            assert_eq!(s.status(s.llr(&record, false)), SprtStatus::AcceptH1);
        }
    }

    #[test]
    fn losing_record_accepts_h0() {
        let s = sprt();
        let mut record = Stats::default();
        for game in 0..2000u64 {
            record += match game % 10 {
                0..=6 => Stats::loss(),
                7 => Stats::draw(),
                _ => Stats::win(),
            };
            if s.status(s.llr(&record, false)) == SprtStatus::AcceptH0 {
                return;
            }
        }
        panic!("70% loss rate must accept H0");
    }

    #[test]
    fn pentanomial_model_uses_pair_buckets() {
        let s = sprt();
        let record = Stats {
            wins: 60,
            draws: 30,
            losses: 10,
            penta_ww: 20,
            penta_wd: 15,
            penta_dd: 10,
            penta_wl: 3,
            penta_ld: 2,
            penta_ll: 0,
        };
        let tri = s.llr(&record, false);
        let penta = s.llr(&record, true);
        assert!(penta > 0.0);
        assert_ne!(tri, penta);
    }

    #[test]
    fn invalid_test_never_decides() {
        let s = Sprt::disabled();
        assert!(!s.valid());
        assert_eq!(s.status(1e9), SprtStatus::Continue);
    }
}
