//! Object class labels and the fused classification distribution
//!
//! Each track carries a probability distribution over class labels. The
//! distribution is a plain value type owned by the track; fusion with a new
//! detection's classification happens through [`Classification::fuse`] with
//! an explicit [`FusionConfig`], never through shared state.

use crate::{Result, TrackError};

// ============================================================================
// Labels
// ============================================================================

/// Semantic class of a detected or tracked object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectLabel {
    Unknown,
    Car,
    Truck,
    Bus,
    Trailer,
    Motorcycle,
    Bicycle,
    Pedestrian,
}

impl ObjectLabel {
    /// All known labels, in a fixed order.
    pub const ALL: [ObjectLabel; 8] = [
        ObjectLabel::Unknown,
        ObjectLabel::Car,
        ObjectLabel::Truck,
        ObjectLabel::Bus,
        ObjectLabel::Trailer,
        ObjectLabel::Motorcycle,
        ObjectLabel::Bicycle,
        ObjectLabel::Pedestrian,
    ];

    /// Stable index of the label, usable for table lookups.
    #[inline]
    pub fn index(&self) -> usize {
        match self {
            ObjectLabel::Unknown => 0,
            ObjectLabel::Car => 1,
            ObjectLabel::Truck => 2,
            ObjectLabel::Bus => 3,
            ObjectLabel::Trailer => 4,
            ObjectLabel::Motorcycle => 5,
            ObjectLabel::Bicycle => 6,
            ObjectLabel::Pedestrian => 7,
        }
    }

    /// True for the four-wheeled vehicle labels.
    #[inline]
    pub fn is_vehicle(&self) -> bool {
        matches!(
            self,
            ObjectLabel::Car | ObjectLabel::Truck | ObjectLabel::Bus | ObjectLabel::Trailer
        )
    }

    /// True for vehicle labels larger than a passenger car.
    #[inline]
    pub fn is_large_vehicle(&self) -> bool {
        matches!(
            self,
            ObjectLabel::Truck | ObjectLabel::Bus | ObjectLabel::Trailer
        )
    }
}

// ============================================================================
// Fusion configuration
// ============================================================================

/// Parameters of the decaying-weighted classification fusion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionConfig {
    /// Weight of the incoming classification, in (0, 1).
    pub gain: f64,
    /// Entries below this probability are dropped after fusion, in [0, 1).
    pub prune_threshold: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            gain: 0.05,
            prune_threshold: 0.005,
        }
    }
}

impl FusionConfig {
    /// Validates the configured constants.
    ///
    /// # Errors
    /// Returns [`TrackError::InvalidConfig`] when the gain is outside (0, 1)
    /// or the prune threshold is outside [0, 1).
    pub fn validate(&self) -> Result<()> {
        if !(self.gain > 0.0 && self.gain < 1.0) {
            return Err(TrackError::InvalidConfig(format!(
                "fusion gain must be in (0, 1), got {}",
                self.gain
            )));
        }
        if !(self.prune_threshold >= 0.0 && self.prune_threshold < 1.0) {
            return Err(TrackError::InvalidConfig(format!(
                "fusion prune threshold must be in [0, 1), got {}",
                self.prune_threshold
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Classification distribution
// ============================================================================

/// A normalized probability distribution over [`ObjectLabel`]s.
///
/// Invariant: entries are non-negative and sum to 1 (within floating-point
/// tolerance). Entry order is stable: existing labels keep their position and
/// newly fused labels are appended, so iteration is deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    entries: Vec<(ObjectLabel, f64)>,
}

impl Classification {
    /// Builds a normalized distribution from raw (label, probability) pairs.
    ///
    /// Duplicate labels are merged by summing their probabilities.
    ///
    /// # Errors
    /// Returns [`TrackError::InvalidDetection`] when the list is empty,
    /// contains a non-finite or negative probability, or sums to zero.
    pub fn new(pairs: &[(ObjectLabel, f64)]) -> Result<Self> {
        if pairs.is_empty() {
            return Err(TrackError::InvalidDetection(
                "empty classification list".to_string(),
            ));
        }
        let mut entries: Vec<(ObjectLabel, f64)> = Vec::with_capacity(pairs.len());
        for &(label, p) in pairs {
            if !p.is_finite() || p < 0.0 {
                return Err(TrackError::InvalidDetection(format!(
                    "classification probability {p} for {label:?} is not a valid probability"
                )));
            }
            match entries.iter_mut().find(|(l, _)| *l == label) {
                Some((_, existing)) => *existing += p,
                None => entries.push((label, p)),
            }
        }
        let sum: f64 = entries.iter().map(|(_, p)| p).sum();
        if sum <= 0.0 {
            return Err(TrackError::InvalidDetection(
                "classification probabilities sum to zero".to_string(),
            ));
        }
        for (_, p) in &mut entries {
            *p /= sum;
        }
        Ok(Self { entries })
    }

    /// A distribution fully concentrated on one label.
    pub fn certain(label: ObjectLabel) -> Self {
        Self {
            entries: vec![(label, 1.0)],
        }
    }

    /// The (label, probability) entries in stable order.
    #[inline]
    pub fn entries(&self) -> &[(ObjectLabel, f64)] {
        &self.entries
    }

    /// Probability of `label`, zero if absent.
    pub fn probability_of(&self, label: ObjectLabel) -> f64 {
        self.entries
            .iter()
            .find(|(l, _)| *l == label)
            .map(|(_, p)| *p)
            .unwrap_or(0.0)
    }

    /// The label with the highest probability.
    ///
    /// Ties resolve to the earliest entry, which makes the result
    /// deterministic for identical inputs.
    pub fn highest_probability_label(&self) -> ObjectLabel {
        let mut best = self.entries[0];
        for &(label, p) in &self.entries[1..] {
            if p > best.1 {
                best = (label, p);
            }
        }
        best.0
    }

    /// Sum of all probabilities. 1.0 up to floating-point error.
    #[inline]
    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, p)| p).sum()
    }

    /// Fuses an incoming classification into this one.
    ///
    /// Every existing probability decays by `(1 - gain)`; each incoming entry
    /// then boosts its matching label by `gain * incoming_probability`, or is
    /// inserted at that value when the label is new. Entries that fall below
    /// the prune threshold are removed, and the distribution is renormalized.
    ///
    /// The decay keeps single-frame misclassifications from overturning a
    /// historically confident label.
    pub fn fuse(&mut self, incoming: &Classification, config: &FusionConfig) {
        let gain = config.gain;
        for (_, p) in &mut self.entries {
            *p *= 1.0 - gain;
        }
        for &(label, p_in) in incoming.entries() {
            let boost = gain * p_in;
            match self.entries.iter_mut().find(|(l, _)| *l == label) {
                Some((_, p)) => *p += boost,
                None => self.entries.push((label, boost)),
            }
        }
        self.entries.retain(|(_, p)| *p >= config.prune_threshold);
        // A threshold above every surviving probability would empty the
        // distribution; keep the incoming best label in that case.
        if self.entries.is_empty() {
            self.entries
                .push((incoming.highest_probability_label(), 1.0));
        }
        let sum = self.total();
        for (_, p) in &mut self.entries {
            *p /= sum;
        }
    }
}
