//! Context bracket classification.
//!
//! Maps how many turns a session has processed to an estimate of how much
//! of the model's context window is left, and from there to a discrete
//! [`Bracket`] that drives what the engine injects.
//!
//! ```text
//! contextPercent = 100 − (promptCount × avgTurnTokens × safetyMultiplier / windowSize × 100)
//! ```
//!
//! | Bracket  | contextPercent | Layers | Memory hints | Handoff warning |
//! |----------|----------------|--------|--------------|-----------------|
//! | FRESH    | [60, 100]      | 0,1,2,7| no           | no              |
//! | MODERATE | [40, 60)       | all    | no           | no              |
//! | DEPLETED | [25, 40)       | all    | yes          | no              |
//! | CRITICAL | [0, 25)        | all    | yes          | yes             |
//!
//! Classification is pure: no I/O, never fails.

use crate::layer::ManifestLayer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Average tokens one turn adds to the window.
pub const AVG_TURN_TOKENS: u32 = 1500;

/// Overhead factor for the markup a turn picks up when serialized for injection.
pub const SAFETY_MULTIPLIER: f64 = 1.2;

/// Size of the model's context window in tokens.
pub const WINDOW_SIZE: u64 = 200_000;

/// Discrete classification of how depleted the context window is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Bracket {
    Fresh,
    Moderate,
    Depleted,
    Critical,
}

impl Bracket {
    pub const ALL: [Bracket; 4] = [Self::Fresh, Self::Moderate, Self::Depleted, Self::Critical];

    /// Map a remaining-context percentage to its bracket.
    ///
    /// Bands are closed below and open above, except FRESH which also
    /// includes 100. Anything above 100 is FRESH; NaN and negatives are
    /// CRITICAL.
    pub fn from_percent(percent: f64) -> Self {
        if percent.is_nan() {
            return Self::Critical;
        }
        if percent >= 60.0 {
            Self::Fresh
        } else if percent >= 40.0 {
            Self::Moderate
        } else if percent >= 25.0 {
            Self::Depleted
        } else {
            Self::Critical
        }
    }

    /// Upper-case label, as it appears on disk and in payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fresh => "FRESH",
            Self::Moderate => "MODERATE",
            Self::Depleted => "DEPLETED",
            Self::Critical => "CRITICAL",
        }
    }

    /// Token budget for everything injected in one turn at this bracket.
    pub fn token_budget(self) -> usize {
        match self {
            Self::Fresh => 800,
            Self::Moderate => 1500,
            Self::Depleted => 2000,
            Self::Critical => 2500,
        }
    }

    /// Ceiling on memory-hint tokens at this bracket, whatever the caller asks for.
    pub fn memory_hint_cap(self) -> usize {
        match self {
            Self::Fresh => 0,
            Self::Moderate => 50,
            Self::Depleted => 200,
            Self::Critical => 1000,
        }
    }

    pub fn memory_hints_enabled(self) -> bool {
        matches!(self, Self::Depleted | Self::Critical)
    }

    pub fn handoff_warning(self) -> bool {
        matches!(self, Self::Critical)
    }

    /// Layers injected at this bracket, in index order.
    pub fn active_layers(self) -> Vec<ManifestLayer> {
        ManifestLayer::ALL
            .into_iter()
            .filter(|layer| layer.is_eligible(self))
            .collect()
    }
}

impl fmt::Display for Bracket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for Bracket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FRESH" => Ok(Self::Fresh),
            "MODERATE" => Ok(Self::Moderate),
            "DEPLETED" => Ok(Self::Depleted),
            "CRITICAL" => Ok(Self::Critical),
            other => Err(format!("unknown bracket: {other}")),
        }
    }
}

/// Constants the context-percent estimate is computed from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextLimits {
    pub avg_turn_tokens: u32,
    pub safety_multiplier: f64,
    pub window_size: u64,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            avg_turn_tokens: AVG_TURN_TOKENS,
            safety_multiplier: SAFETY_MULTIPLIER,
            window_size: WINDOW_SIZE,
        }
    }
}

/// The result of classifying one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub bracket: Bracket,
    /// Estimated share of the window still free, in `[0, 100]`.
    pub context_percent: f64,
    /// Estimated window tokens consumed so far.
    pub tokens_used: u64,
    pub token_budget: usize,
    pub active_layers: Vec<ManifestLayer>,
    pub memory_hints_enabled: bool,
    pub handoff_warning: bool,
}

/// Pure classifier from prompt count to [`Classification`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BracketClassifier {
    limits: ContextLimits,
}

impl BracketClassifier {
    pub fn new(limits: ContextLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> ContextLimits {
        self.limits
    }

    /// Estimated window tokens consumed after `prompt_count` turns.
    pub fn tokens_used(&self, prompt_count: u64) -> u64 {
        let used = prompt_count as f64
            * f64::from(self.limits.avg_turn_tokens)
            * self.limits.safety_multiplier;
        used.round() as u64
    }

    /// Estimated remaining context, clamped to `[0, 100]`.
    ///
    /// A window size of zero leaves no room at all.
    pub fn context_percent(&self, prompt_count: u64) -> f64 {
        if self.limits.window_size == 0 {
            return 0.0;
        }
        let used = prompt_count as f64
            * f64::from(self.limits.avg_turn_tokens)
            * self.limits.safety_multiplier;
        let percent = 100.0 - (used / self.limits.window_size as f64 * 100.0);
        if percent.is_nan() {
            return 0.0;
        }
        percent.clamp(0.0, 100.0)
    }

    /// Classify a session that has processed `prompt_count` turns.
    pub fn classify(&self, prompt_count: u64) -> Classification {
        let context_percent = self.context_percent(prompt_count);
        let bracket = Bracket::from_percent(context_percent);
        Classification {
            bracket,
            context_percent,
            tokens_used: self.tokens_used(prompt_count),
            token_budget: bracket.token_budget(),
            active_layers: bracket.active_layers(),
            memory_hints_enabled: bracket.memory_hints_enabled(),
            handoff_warning: bracket.handoff_warning(),
        }
    }

    /// Classify a raw, possibly invalid prompt count.
    ///
    /// Negative or non-finite values are treated as zero turns.
    pub fn classify_lenient(&self, raw: f64) -> Classification {
        let count = if raw.is_finite() && raw > 0.0 {
            raw.floor() as u64
        } else {
            0
        };
        self.classify(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn zero_prompts_is_fresh_and_full() {
        let c = BracketClassifier::default().classify(0);
        assert_eq!(c.bracket, Bracket::Fresh);
        assert!(approx(c.context_percent, 100.0));
        assert_eq!(c.tokens_used, 0);
        assert!(!c.memory_hints_enabled);
        assert!(!c.handoff_warning);
    }

    #[test]
    fn reference_points() {
        let classifier = BracketClassifier::default();

        let c = classifier.classify(50);
        assert_eq!(c.bracket, Bracket::Moderate);
        assert!(approx(c.context_percent, 55.0));

        let c = classifier.classify(75);
        assert_eq!(c.bracket, Bracket::Depleted);
        assert!(approx(c.context_percent, 32.5));

        let c = classifier.classify(100);
        assert_eq!(c.bracket, Bracket::Critical);
        assert!(approx(c.context_percent, 10.0));
    }

    #[test]
    fn small_counts() {
        let classifier = BracketClassifier::default();
        assert!(approx(classifier.context_percent(1), 99.1));
        assert!(approx(classifier.context_percent(2), 98.2));
        assert!(approx(classifier.context_percent(30), 73.0));
        assert_eq!(classifier.classify(25).bracket, Bracket::Fresh);
        assert_eq!(classifier.classify(83).bracket, Bracket::Depleted);
    }

    #[test]
    fn clamps_to_zero_when_window_exhausted() {
        let classifier = BracketClassifier::default();
        assert_eq!(classifier.context_percent(200), 0.0);
        assert_eq!(classifier.classify(10_000).bracket, Bracket::Critical);
    }

    #[test]
    fn percent_is_monotonic_and_bounded() {
        let classifier = BracketClassifier::default();
        let mut previous = f64::INFINITY;
        for count in 0..400 {
            let p = classifier.context_percent(count);
            assert!((0.0..=100.0).contains(&p));
            assert!(p <= previous, "percent rose at count {count}");
            previous = p;
        }
    }

    #[test]
    fn custom_limits() {
        let classifier = BracketClassifier::new(ContextLimits {
            avg_turn_tokens: 1000,
            safety_multiplier: 1.2,
            window_size: 50_000,
        });
        assert!(approx(classifier.context_percent(5), 88.0));
    }

    #[test]
    fn zero_window_means_no_room() {
        let classifier = BracketClassifier::new(ContextLimits {
            window_size: 0,
            ..ContextLimits::default()
        });
        assert_eq!(classifier.context_percent(5), 0.0);
        assert_eq!(classifier.classify(5).bracket, Bracket::Critical);
    }

    #[test]
    fn percent_band_boundaries() {
        assert_eq!(Bracket::from_percent(100.0), Bracket::Fresh);
        assert_eq!(Bracket::from_percent(150.0), Bracket::Fresh);
        assert_eq!(Bracket::from_percent(60.0), Bracket::Fresh);
        assert_eq!(Bracket::from_percent(59.99), Bracket::Moderate);
        assert_eq!(Bracket::from_percent(40.0), Bracket::Moderate);
        assert_eq!(Bracket::from_percent(39.99), Bracket::Depleted);
        assert_eq!(Bracket::from_percent(25.0), Bracket::Depleted);
        assert_eq!(Bracket::from_percent(24.99), Bracket::Critical);
        assert_eq!(Bracket::from_percent(0.0), Bracket::Critical);
        assert_eq!(Bracket::from_percent(-10.0), Bracket::Critical);
        assert_eq!(Bracket::from_percent(f64::NAN), Bracket::Critical);
    }

    #[test]
    fn invalid_counts_classify_as_fresh() {
        let classifier = BracketClassifier::default();
        assert_eq!(classifier.classify_lenient(-5.0).bracket, Bracket::Fresh);
        assert_eq!(classifier.classify_lenient(f64::NAN).bracket, Bracket::Fresh);
        assert_eq!(
            classifier.classify_lenient(f64::NEG_INFINITY).bracket,
            Bracket::Fresh
        );
        assert_eq!(classifier.classify_lenient(50.0).bracket, Bracket::Moderate);
    }

    #[test]
    fn layer_sets_per_bracket() {
        let classifier = BracketClassifier::default();
        let fresh = classifier.classify(0);
        let moderate = classifier.classify(50);
        assert!(fresh.active_layers.len() <= 4);
        assert_eq!(moderate.active_layers.len(), 8);
        assert!(fresh
            .active_layers
            .iter()
            .all(|l| moderate.active_layers.contains(l)));

        let depleted = classifier.classify(75);
        assert_eq!(depleted.active_layers.len(), 8);
        assert!(depleted.memory_hints_enabled);
        assert!(!depleted.handoff_warning);

        let critical = classifier.classify(100);
        assert!(critical.memory_hints_enabled);
        assert!(critical.handoff_warning);
    }

    #[test]
    fn budget_tables() {
        assert_eq!(Bracket::Fresh.token_budget(), 800);
        assert_eq!(Bracket::Moderate.token_budget(), 1500);
        assert_eq!(Bracket::Depleted.token_budget(), 2000);
        assert_eq!(Bracket::Critical.token_budget(), 2500);
        assert_eq!(Bracket::Fresh.memory_hint_cap(), 0);
        assert_eq!(Bracket::Moderate.memory_hint_cap(), 50);
        assert_eq!(Bracket::Depleted.memory_hint_cap(), 200);
        assert_eq!(Bracket::Critical.memory_hint_cap(), 1000);
    }

    #[test]
    fn bracket_string_roundtrip() {
        for bracket in Bracket::ALL {
            assert_eq!(bracket.as_str().parse::<Bracket>().unwrap(), bracket);
            let json = serde_json::to_string(&bracket).unwrap();
            assert_eq!(json, format!("\"{}\"", bracket.as_str()));
        }
        assert!("fresh".parse::<Bracket>().is_err());
    }
}
