//! Scoring engine
//!
//! The algebra that governs a record's lifetime:
//!
//! - **Importance**: weighted sum of recency, frequency, salience, relevance
//! - **Decay**: per-day strength loss modulated by importance, access
//!   recency, and memory type
//! - **Reinforcement**: strength boost on access
//! - **Privacy risk**: regex-detected PII/financial markers plus age

use chrono::{DateTime, Duration, Utc};
use regex::Regex;

use crate::config::DecayConfig;
use crate::embedding::{cosine_similarity, relevance_from_cosine};
use crate::memory::{MemoryRecord, PrivacyMarkers, SalienceSignals};

// ============================================================================
// ERRORS
// ============================================================================

/// Scoring failure
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    /// Weights or factor inputs left their valid range
    #[error("Invalid score input: {0}")]
    InvalidScoreInput(String),
}

impl From<ScoringError> for crate::error::MemoryError {
    fn from(err: ScoringError) -> Self {
        crate::error::MemoryError::InvalidInput(err.to_string())
    }
}

// ============================================================================
// IMPORTANCE WEIGHTS
// ============================================================================

/// Weights of the four importance factors; must sum to 1.0
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImportanceWeights {
    /// Weight of the exponential-recency factor
    pub recency: f64,
    /// Weight of the log-frequency factor
    pub frequency: f64,
    /// Weight of the salience factor
    pub salience: f64,
    /// Weight of the context-relevance factor
    pub relevance: f64,
}

impl Default for ImportanceWeights {
    fn default() -> Self {
        Self {
            recency: 0.25,
            frequency: 0.20,
            salience: 0.35,
            relevance: 0.20,
        }
    }
}

impl ImportanceWeights {
    fn sum(&self) -> f64 {
        self.recency + self.frequency + self.salience + self.relevance
    }

    /// Redistribute the relevance weight proportionally across the rest
    ///
    /// Used when no context vector is available for a scoring call.
    fn without_relevance(&self) -> Result<Self, ScoringError> {
        let remainder = self.recency + self.frequency + self.salience;
        if remainder <= 0.0 {
            return Err(ScoringError::InvalidScoreInput(
                "cannot renormalize weights: non-relevance weights sum to zero".into(),
            ));
        }
        let scale = 1.0 / remainder;
        Ok(Self {
            recency: self.recency * scale,
            frequency: self.frequency * scale,
            salience: self.salience * scale,
            relevance: 0.0,
        })
    }
}

// ============================================================================
// SCORING ENGINE
// ============================================================================

/// Pure calculator for importance, decay, reinforcement, and privacy risk
pub struct ScoringEngine {
    weights: ImportanceWeights,
    decay: DecayConfig,
    detector: PrivacyDetector,
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new(ImportanceWeights::default(), DecayConfig::default())
    }
}

impl ScoringEngine {
    /// Create an engine with the given weights and decay constants
    pub fn new(weights: ImportanceWeights, decay: DecayConfig) -> Self {
        Self {
            weights,
            decay,
            detector: PrivacyDetector::new(),
        }
    }

    /// Current weights
    pub fn weights(&self) -> &ImportanceWeights {
        &self.weights
    }

    /// Compute importance for a record
    ///
    /// `salience` overrides the record's stored signals; when both are
    /// absent a neutral 0.5 factor is used. `context` contributes the
    /// relevance factor; without it the relevance weight is redistributed.
    pub fn importance(
        &self,
        record: &MemoryRecord,
        salience: Option<&SalienceSignals>,
        context: Option<&[f32]>,
        now: DateTime<Utc>,
    ) -> Result<f64, ScoringError> {
        let relevance = match (context, record.embedding.as_deref()) {
            (Some(ctx), Some(embedding)) => {
                Some(relevance_from_cosine(cosine_similarity(embedding, ctx)))
            }
            _ => None,
        };

        let weights = match relevance {
            Some(_) => self.weights,
            None => self.weights.without_relevance()?,
        };
        let sum = weights.sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ScoringError::InvalidScoreInput(format!(
                "importance weights sum to {sum}, expected 1.0"
            )));
        }

        let days_idle = (now - record.last_accessed).num_seconds().max(0) as f64 / 86400.0;
        let recency = (-self.decay.recency_lambda * days_idle).exp();

        let frequency =
            ((1.0 + f64::from(record.access_count)).ln() / (101.0f64).ln()).clamp(0.0, 1.0);

        let signals = salience
            .copied()
            .or(record.salience)
            .unwrap_or_else(SalienceSignals::neutral);
        if !signals.is_valid() {
            return Err(ScoringError::InvalidScoreInput(
                "salience sub-scores must lie in [0, 10]".into(),
            ));
        }
        let salience_factor = signals.factor();

        for (name, value) in [
            ("recency", recency),
            ("frequency", frequency),
            ("salience", salience_factor),
            ("relevance", relevance.unwrap_or(0.0)),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ScoringError::InvalidScoreInput(format!(
                    "{name} factor {value} out of [0, 1]"
                )));
            }
        }

        let importance = weights.recency * recency
            + weights.frequency * frequency
            + weights.salience * salience_factor
            + weights.relevance * relevance.unwrap_or(0.0);
        Ok(importance.clamp(0.0, 1.0))
    }

    /// Per-day decay rate for a record
    pub fn decay_rate(&self, record: &MemoryRecord, now: DateTime<Utc>) -> f64 {
        let importance_mod = 1.0 - 0.9 * record.importance;

        let access_mod = if record.access_count == 0 {
            1.5
        } else {
            let idle = now - record.last_accessed;
            if idle <= Duration::hours(24) {
                0.5
            } else if idle <= Duration::days(7) {
                0.7
            } else {
                1.0
            }
        };

        self.decay.base_rate * importance_mod * access_mod * record.memory_type.decay_modifier()
    }

    /// Apply decay for the elapsed time since `last_decayed`
    ///
    /// Updates strength and `last_decayed`; state transitions are the decay
    /// worker's job. Returns the new strength.
    pub fn apply_decay(&self, record: &mut MemoryRecord, now: DateTime<Utc>) -> f64 {
        let days = (now - record.last_decayed).num_seconds().max(0) as f64 / 86400.0;
        let rate = self.decay_rate(record, now);
        record.strength = (record.strength - rate * days).clamp(0.0, 1.0);
        record.last_decayed = now;
        record.strength
    }

    /// Reinforce a record on access
    pub fn reinforce(&self, record: &mut MemoryRecord, now: DateTime<Utc>) {
        record.strength = (record.strength + 0.15 * (1.0 - record.strength)).min(1.0);
        record.record_access(now);
    }

    /// Detect privacy markers in content and tags
    pub fn privacy_markers(
        &self,
        content: &str,
        tags: &std::collections::BTreeSet<String>,
    ) -> PrivacyMarkers {
        self.detector.detect(content, tags)
    }

    /// Composite privacy risk for a record at `now`
    pub fn privacy_risk(&self, record: &MemoryRecord, now: DateTime<Utc>) -> f64 {
        let age_score = (1.0 - record.age_days(now) / 365.0).max(0.0);
        0.4 * record.privacy_markers.pii_score
            + 0.4 * record.privacy_markers.financial_score
            + 0.2 * age_score
    }
}

// ============================================================================
// PRIVACY DETECTION
// ============================================================================

/// Regex-based detector for personal and financial markers
///
/// Patterns are compiled once at engine construction.
pub struct PrivacyDetector {
    email: Regex,
    phone: Regex,
    ssn: Regex,
    credit_card: Regex,
    street_address: Regex,
    iban: Regex,
    account_number: Regex,
}

impl Default for PrivacyDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl PrivacyDetector {
    /// Compile the detection patterns
    pub fn new() -> Self {
        // Patterns favor recall over precision; scores saturate at 1.0 so a
        // false positive cannot dominate a record's risk on its own.
        Self {
            email: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
                .expect("email pattern"),
            phone: Regex::new(r"(?:\+?\d{1,2}[\s.-]?)?(?:\(\d{3}\)|\d{3})[\s.-]\d{3}[\s.-]\d{4}")
                .expect("phone pattern"),
            ssn: Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("ssn pattern"),
            credit_card: Regex::new(r"\b(?:\d{4}[ -]){3}\d{4}\b|\b\d{15,16}\b")
                .expect("credit card pattern"),
            street_address: Regex::new(
                r"(?i)\b\d{1,5}\s+\w+(?:\s\w+)?\s+(?:street|st|avenue|ave|road|rd|boulevard|blvd|lane|ln|drive|dr)\b",
            )
            .expect("street address pattern"),
            iban: Regex::new(r"\b[A-Z]{2}\d{2}[A-Z0-9]{11,30}\b").expect("iban pattern"),
            account_number: Regex::new(r"(?i)\b(?:account|acct)\s*(?:number|no|#)?\s*[:#]?\s*\d{6,}")
                .expect("account number pattern"),
        }
    }

    /// Detect markers, returning saturated scores
    pub fn detect(
        &self,
        content: &str,
        tags: &std::collections::BTreeSet<String>,
    ) -> PrivacyMarkers {
        let mut pii = 0.0f64;
        if self.email.is_match(content) {
            pii += 0.3;
        }
        if self.phone.is_match(content) {
            pii += 0.3;
        }
        if self.ssn.is_match(content) {
            pii += 0.5;
        }
        if self.credit_card.is_match(content) {
            pii += 0.5;
        }
        if self.street_address.is_match(content) {
            pii += 0.2;
        }
        if tags.contains("personal") {
            pii += 0.2;
        }

        let mut financial = 0.0f64;
        if self.credit_card.is_match(content) {
            financial += 0.5;
        }
        if self.iban.is_match(content) || self.account_number.is_match(content) {
            financial += 0.3;
        }
        if tags.contains("financial") {
            financial += 0.2;
        }

        PrivacyMarkers {
            pii_score: pii.min(1.0),
            financial_score: financial.min(1.0),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
