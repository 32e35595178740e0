use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;

use crate::errors::InvalidArgument;

pub const TOLERANCE: f64 = 1e-6;

pub fn checked_sqrt(value: f64) -> Result<f64, InvalidArgument> {
    if value < 0.0 {
        return Err(InvalidArgument::NegativeSqrt(value));
    }

    Ok(value.sqrt())
}

pub fn approximate(a: f64, b: f64) -> bool {
    (a - b).abs() <= TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

/// Select `count` distinct indices of `weights`, each draw proportional to the remaining weights.
///
/// When every remaining weight is zero the draw falls back to a uniform pick.
pub fn weighted_random(rng: &mut impl Rng, weights: &[f64], count: usize) -> Result<Vec<usize>, InvalidArgument> {
    if weights.is_empty() {
        return Err(InvalidArgument::EmptyPopulation);
    }

    if count > weights.len() {
        return Err(InvalidArgument::SelectionExceedsPopulation {
            count,
            population: weights.len(),
        });
    }

    if let Some(&weight) = weights.iter().find(|&&w| w < 0.0) {
        return Err(InvalidArgument::NegativeWeight(weight));
    }

    let mut remaining = (0..weights.len()).collect::<Vec<_>>();
    let mut result = Vec::with_capacity(count);
    while result.len() < count {
        let index = match WeightedIndex::new(remaining.iter().map(|&i| weights[i])) {
            Ok(distribution) => distribution.sample(rng),
            Err(_) => rng.random_range(0..remaining.len()),
        };

        result.push(remaining.swap_remove(index));
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn sqrt_domain() {
        assert_eq!(checked_sqrt(16.0), Ok(4.0));
        assert_eq!(checked_sqrt(0.0), Ok(0.0));
        assert_eq!(checked_sqrt(-1.0), Err(InvalidArgument::NegativeSqrt(-1.0)));
    }

    #[test]
    fn approximate_is_relative() {
        assert!(approximate(1.0, 1.0 + 1e-9));
        assert!(approximate(1e9, 1e9 + 1.0));
        assert!(!approximate(1.0, 1.001));
    }

    #[test]
    fn selection_errors() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(
            weighted_random(&mut rng, &[1.0, 2.0], 3),
            Err(InvalidArgument::SelectionExceedsPopulation {
                count: 3,
                population: 2
            })
        );
        assert_eq!(
            weighted_random(&mut rng, &[1.0, -2.0], 1),
            Err(InvalidArgument::NegativeWeight(-2.0))
        );
        assert_eq!(weighted_random(&mut rng, &[], 0), Err(InvalidArgument::EmptyPopulation));
    }

    #[test]
    fn selection_is_distinct_and_skips_zero_weights() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let mut selected = weighted_random(&mut rng, &[0.0, 5.0, 0.0, 1.0, 3.0], 3).unwrap();
            selected.sort_unstable();
            assert_eq!(selected, vec![1, 3, 4]);
        }

        let mut all = weighted_random(&mut rng, &[0.0, 0.0, 0.0], 3).unwrap();
        all.sort_unstable();
        assert_eq!(all, vec![0, 1, 2]);
    }
}
