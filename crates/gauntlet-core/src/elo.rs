//! Elo difference estimation from a W/D/L record.

use crate::stats::Stats;

/// Point estimate and 95% confidence margin of the Elo difference between
/// two engines, computed from their head-to-head record.
#[derive(Debug, Clone, Copy)]
pub struct EloEstimate {
    diff: f64,
    error: f64,
    los: f64,
    draw_ratio: f64,
}

/// Logistic expectation: score rate for a given Elo advantage.
pub fn expected_score(elo: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf(-elo / 400.0))
}

fn score_to_elo(score: f64) -> f64 {
    -400.0 * (1.0 / score - 1.0).log10()
}

// Abramowitz & Stegun 7.1.26, |error| < 1.5e-7. Good enough for a
// likelihood-of-superiority percentage.
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.3275911 * x);
    let y = 1.0
        - (((((1.061405429 * t - 1.453152027) * t) + 1.421413741) * t - 0.284496736) * t
            + 0.254829592)
            * t
            * (-x * x).exp();
    sign * y
}

impl EloEstimate {
    pub fn new(stats: &Stats) -> Self {
        let n = stats.sum() as f64;
        if n == 0.0 {
            return EloEstimate {
                diff: 0.0,
                error: 0.0,
                los: 0.5,
                draw_ratio: 0.0,
            };
        }
        let w = stats.wins as f64 / n;
        let d = stats.draws as f64 / n;
        let l = stats.losses as f64 / n;
        let score = w + d / 2.0;
        let variance = w * (1.0 - score).powi(2) + d * (0.5 - score).powi(2) + l * score.powi(2);
        let stddev = (variance / n).sqrt();

        // Clamp away from the poles so a 100% score still prints something.
        let clamp = |s: f64| s.clamp(1e-3, 1.0 - 1e-3);
        let diff = score_to_elo(clamp(score));
        let error = (score_to_elo(clamp(score + 1.96 * stddev))
            - score_to_elo(clamp(score - 1.96 * stddev)))
            / 2.0;

        let los = if stats.wins + stats.losses == 0 {
            0.5
        } else {
            0.5 * (1.0
                + erf((stats.wins as f64 - stats.losses as f64)
                    / (2.0 * (stats.wins + stats.losses) as f64).sqrt()))
        };

        EloEstimate {
            diff,
            error,
            los,
            draw_ratio: d,
        }
    }

    pub fn diff(&self) -> f64 {
        self.diff
    }

    pub fn error(&self) -> f64 {
        self.error
    }

    /// Likelihood of superiority, in [0, 1].
    pub fn los(&self) -> f64 {
        self.los
    }

    pub fn draw_ratio(&self) -> f64 {
        self.draw_ratio
    }

    /// `"12.34 +/- 5.67"` as printed in progress reports.
    pub fn summary(&self) -> String {
        format!("{:.2} +/- {:.2}", self.diff, self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_record_is_zero_elo() {
        let stats = Stats {
            wins: 50,
            draws: 20,
            losses: 50,
            ..Stats::default()
        };
        let elo = EloEstimate::new(&stats);
        assert!(elo.diff().abs() < 1e-9);
        assert!((elo.los() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn winning_record_is_positive_and_bounded() {
        let stats = Stats {
            wins: 70,
            draws: 10,
            losses: 20,
            ..Stats::default()
        };
        let elo = EloEstimate::new(&stats);
        // 75% score is roughly +191 Elo.
        assert!((elo.diff() - 190.8).abs() < 2.0);
        assert!(elo.error() > 0.0);
        assert!(elo.los() > 0.99);
    }

    #[test]
    fn error_shrinks_with_sample_size() {
        let small = Stats {
            wins: 6,
            draws: 2,
            losses: 4,
            ..Stats::default()
        };
        let big = Stats {
            wins: 600,
            draws: 200,
            losses: 400,
            ..Stats::default()
        };
        assert!(EloEstimate::new(&big).error() < EloEstimate::new(&small).error());
    }

    #[test]
    fn expected_score_matches_logistic() {
        assert!((expected_score(0.0) - 0.5).abs() < 1e-12);
        assert!((expected_score(400.0) - 10.0 / 11.0).abs() < 1e-9);
    }
}
