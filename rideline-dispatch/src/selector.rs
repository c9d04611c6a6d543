use rand::seq::SliceRandom;

/// Picks which of the matching drivers gets the offer.
pub trait DriverSelector: Send + Sync {
    fn select(&self, candidates: &[String]) -> Option<String>;
}

/// Uniform random choice. No proximity or load ranking.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSelector;

impl DriverSelector for RandomSelector {
    fn select(&self, candidates: &[String]) -> Option<String> {
        candidates.choose(&mut rand::thread_rng()).cloned()
    }
}
