use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::time::sleep;
use tracing::debug;

use crate::config::PacingSection;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayRange {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl DelayRange {
    pub fn new([min_secs, max_secs]: [f64; 2]) -> Self {
        Self {
            min_secs: min_secs.min(max_secs).max(0.0),
            max_secs: max_secs.max(min_secs).max(0.0),
        }
    }

    pub fn contains(&self, delay: Duration) -> bool {
        let secs = delay.as_secs_f64();
        secs >= self.min_secs - 1e-9 && secs <= self.max_secs + 1e-9
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> Duration {
        if self.max_secs <= self.min_secs {
            return Duration::from_secs_f64(self.min_secs);
        }
        Duration::from_secs_f64(rng.gen_range(self.min_secs..=self.max_secs))
    }
}

/// Inter-item delay bands, widening as a run goes on.
#[derive(Debug, Clone, PartialEq)]
pub struct DelayBands {
    pub early: DelayRange,
    pub middle: DelayRange,
    pub late: DelayRange,
    pub early_until: usize,
    pub middle_until: usize,
}

impl DelayBands {
    pub fn from_config(config: &PacingSection) -> Self {
        Self {
            early: DelayRange::new(config.early_secs),
            middle: DelayRange::new(config.middle_secs),
            late: DelayRange::new(config.late_secs),
            early_until: config.early_until,
            middle_until: config.middle_until,
        }
    }

    pub fn band(&self, index: usize) -> DelayRange {
        if index < self.early_until {
            self.early
        } else if index < self.middle_until {
            self.middle
        } else {
            self.late
        }
    }

    pub fn sample<R: Rng>(&self, index: usize, rng: &mut R) -> Duration {
        self.band(index).sample(rng)
    }
}

/// Owns the run's delay randomness and does the sleeping.
#[derive(Debug, Clone)]
pub struct Pacer {
    bands: DelayBands,
    before_listing: DelayRange,
    between_pages: Option<DelayRange>,
    rng: ChaCha8Rng,
    total_wait: Duration,
}

impl Pacer {
    pub fn new(config: &PacingSection, between_pages: Option<[f64; 2]>) -> Self {
        Self::with_rng(config, between_pages, ChaCha8Rng::from_entropy())
    }

    pub fn seeded(config: &PacingSection, between_pages: Option<[f64; 2]>, seed: u64) -> Self {
        Self::with_rng(config, between_pages, ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(config: &PacingSection, between_pages: Option<[f64; 2]>, rng: ChaCha8Rng) -> Self {
        Self {
            bands: DelayBands::from_config(config),
            before_listing: DelayRange::new(config.before_listing_secs),
            between_pages: between_pages.map(DelayRange::new),
            rng,
            total_wait: Duration::ZERO,
        }
    }

    pub fn bands(&self) -> &DelayBands {
        &self.bands
    }

    pub fn total_wait(&self) -> Duration {
        self.total_wait
    }

    pub async fn before_listing(&mut self) -> Duration {
        let delay = self.before_listing.sample(&mut self.rng);
        self.wait(delay, "pause before listing").await
    }

    /// Sleeps after item `index` when another item follows.
    pub async fn between_items(&mut self, index: usize) -> Duration {
        let delay = self.bands.sample(index, &mut self.rng);
        debug!(index, delay_ms = delay.as_millis() as u64, "pacing between items");
        self.wait(delay, "pause between items").await
    }

    pub async fn between_pages(&mut self) -> Duration {
        match self.between_pages {
            Some(range) => {
                let delay = range.sample(&mut self.rng);
                self.wait(delay, "pause between pages").await
            }
            None => Duration::ZERO,
        }
    }

    async fn wait(&mut self, delay: Duration, reason: &'static str) -> Duration {
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis() as u64, reason, "pacing");
            sleep(delay).await;
        }
        self.total_wait += delay;
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_follow_index_thresholds() {
        let bands = DelayBands::from_config(&PacingSection::default());
        assert_eq!(bands.band(0), DelayRange::new([3.0, 5.0]));
        assert_eq!(bands.band(4), DelayRange::new([3.0, 5.0]));
        assert_eq!(bands.band(5), DelayRange::new([4.0, 6.0]));
        assert_eq!(bands.band(9), DelayRange::new([4.0, 6.0]));
        assert_eq!(bands.band(10), DelayRange::new([5.0, 8.0]));
        assert_eq!(bands.band(20), DelayRange::new([5.0, 8.0]));
    }

    #[test]
    fn samples_stay_inside_their_band() {
        let bands = DelayBands::from_config(&PacingSection::default());
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for index in [0, 4, 5, 9, 10, 20] {
            for _ in 0..200 {
                let delay = bands.sample(index, &mut rng);
                assert!(bands.band(index).contains(delay), "{index}: {delay:?}");
            }
        }
    }

    #[test]
    fn degenerate_range_is_fixed() {
        let range = DelayRange::new([0.0, 0.0]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(range.sample(&mut rng), Duration::ZERO);
        assert_eq!(DelayRange::new([2.0, 1.0]).min_secs, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn pacer_sleeps_and_accumulates() {
        let mut pacer = Pacer::seeded(&PacingSection::default(), None, 3);
        let start = tokio::time::Instant::now();
        let waited = pacer.between_items(0).await;
        assert!(start.elapsed() >= waited);
        assert_eq!(pacer.between_pages().await, Duration::ZERO);
        assert_eq!(pacer.total_wait(), waited);
    }
}
