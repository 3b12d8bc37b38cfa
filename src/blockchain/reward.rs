use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

/// Mining reward tiers. One tier is drawn per mined block, then an amount is
/// drawn uniformly from the tier's range and rounded to one decimal place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RewardBand {
    Low,
    Mid,
    High,
    Top,
}

impl RewardBand {
    pub const ALL: [RewardBand; 4] = [
        RewardBand::Low,
        RewardBand::Mid,
        RewardBand::High,
        RewardBand::Top,
    ];

    /// Probability mass in percent
    pub fn weight(self) -> u32 {
        match self {
            RewardBand::Low => 55,
            RewardBand::Mid => 25,
            RewardBand::High => 10,
            RewardBand::Top => 10,
        }
    }

    /// Inclusive amount range
    pub fn range(self) -> (f64, f64) {
        match self {
            RewardBand::Low => (0.1, 0.5),
            RewardBand::Mid => (0.6, 0.7),
            RewardBand::High => (0.8, 0.9),
            RewardBand::Top => (1.0, 1.4),
        }
    }

    pub fn choose<R: Rng + ?Sized>(rng: &mut R) -> RewardBand {
        let weights = RewardBand::ALL.map(RewardBand::weight);
        // Weights are constant and non-zero.
        let index = WeightedIndex::new(weights).expect("reward weights are valid");
        RewardBand::ALL[index.sample(rng)]
    }

    pub fn sample_amount<R: Rng + ?Sized>(self, rng: &mut R) -> f64 {
        let (low, high) = self.range();
        round_to_tenth(rng.gen_range(low..=high))
    }

    #[cfg(test)]
    pub fn contains(self, amount: f64) -> bool {
        let (low, high) = self.range();
        amount >= low - f64::EPSILON && amount <= high + f64::EPSILON
    }
}

/// Draws a full reward: tier first, then the amount within it
pub fn sample_reward<R: Rng + ?Sized>(rng: &mut R) -> (RewardBand, f64) {
    let band = RewardBand::choose(rng);
    (band, band.sample_amount(rng))
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    #[test]
    fn test_weights_sum_to_one_hundred() {
        let total: u32 = RewardBand::ALL.iter().map(|band| band.weight()).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn test_band_frequencies_and_bounds() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let trials = 20_000;
        let mut counts: HashMap<RewardBand, usize> = HashMap::new();

        for _ in 0..trials {
            let (band, amount) = sample_reward(&mut rng);
            assert!(band.contains(amount), "{amount} outside {band:?}");
            *counts.entry(band).or_default() += 1;
        }

        for band in RewardBand::ALL {
            let observed = counts.get(&band).copied().unwrap_or(0) as f64 / trials as f64;
            let expected = band.weight() as f64 / 100.0;
            assert!(
                (observed - expected).abs() < 0.02,
                "{band:?}: observed {observed}, expected {expected}"
            );
        }
    }

    #[test]
    fn test_amounts_have_one_decimal_place() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1_000 {
            let (_, amount) = sample_reward(&mut rng);
            let scaled = amount * 10.0;
            assert!((scaled - scaled.round()).abs() < 1e-9);
            assert!((0.1..=1.4).contains(&amount));
        }
    }
}
