use std::time::Duration;

use clap::ValueEnum;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// How long a session waits before each request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Pacing {
    /// `uniform(0, 1) * 10s / busy`, truncated to whole milliseconds. Delays grow as `busy`
    /// approaches 0 and saturate at `u64::MAX` milliseconds.
    #[default]
    ScaledUniform,
    /// `|normal(0, 1) * 100 + 10 * busy|` seconds.
    OffsetNormal,
}

impl Pacing {
    /// Draws the next delay. `None` means the session is idle and should never send: that is
    /// what a zero busy factor means under scaled-uniform pacing.
    pub fn delay<R: Rng + ?Sized>(&self, busy: f64, rng: &mut R) -> Option<Duration> {
        match self {
            Pacing::ScaledUniform => {
                if busy <= 0.0 {
                    return None;
                }

                // float to int casts saturate, so tiny busy factors cannot overflow
                let millis = rng.random::<f64>() * 10_000.0 / busy;
                Some(Duration::from_millis(millis as u64))
            }
            Pacing::OffsetNormal => {
                let z: f64 = StandardNormal.sample(rng);
                let secs = (z * 100.0 + 10.0 * busy).abs();
                Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
            }
        }
    }
}
