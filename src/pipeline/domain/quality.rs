use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Discrete operating point trading analysis thoroughness for resource cost.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    Minimal,
    Low,
    Medium,
    High,
}

impl QualityLevel {
    pub fn name(&self) -> &'static str {
        match self {
            QualityLevel::Minimal => "minimal",
            QualityLevel::Low => "low",
            QualityLevel::Medium => "medium",
            QualityLevel::High => "high",
        }
    }
}

/// Degradation state driven by thermal, battery and latency pressure.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ThrottleLevel {
    None,
    Light,
    Moderate,
    Aggressive,
}

impl ThrottleLevel {
    pub fn name(&self) -> &'static str {
        match self {
            ThrottleLevel::None => "none",
            ThrottleLevel::Light => "light",
            ThrottleLevel::Moderate => "moderate",
            ThrottleLevel::Aggressive => "aggressive",
        }
    }

    /// One step more throttled, saturating at `Aggressive`.
    pub fn escalate(self) -> Self {
        match self {
            ThrottleLevel::None => ThrottleLevel::Light,
            ThrottleLevel::Light => ThrottleLevel::Moderate,
            ThrottleLevel::Moderate | ThrottleLevel::Aggressive => ThrottleLevel::Aggressive,
        }
    }

    /// One step less throttled, saturating at `None`.
    pub fn deescalate(self) -> Self {
        match self {
            ThrottleLevel::None | ThrottleLevel::Light => ThrottleLevel::None,
            ThrottleLevel::Moderate => ThrottleLevel::Light,
            ThrottleLevel::Aggressive => ThrottleLevel::Moderate,
        }
    }

    pub fn quality_level(&self) -> QualityLevel {
        match self {
            ThrottleLevel::None => QualityLevel::High,
            ThrottleLevel::Light => QualityLevel::Medium,
            ThrottleLevel::Moderate => QualityLevel::Low,
            ThrottleLevel::Aggressive => QualityLevel::Minimal,
        }
    }
}

impl std::fmt::Display for ThrottleLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What a quality level buys: analyzer budget, frame cadence and input resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityProfile {
    pub max_analyzers: usize,
    pub target_interval_ms: u64,
    pub downsample_factor: u32,
}

impl QualityProfile {
    pub fn new(max_analyzers: usize, target_interval_ms: u64, downsample_factor: u32) -> Self {
        Self {
            max_analyzers,
            target_interval_ms,
            downsample_factor,
        }
    }

    pub fn target_interval(&self) -> Duration {
        Duration::from_millis(self.target_interval_ms)
    }

    /// Analyzer budget for a registry of `registry_size` analyzers, kept in `1..=registry_size`.
    pub fn analyzer_budget(&self, registry_size: usize) -> usize {
        self.max_analyzers.max(1).min(registry_size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityProfiles {
    pub minimal: QualityProfile,
    pub low: QualityProfile,
    pub medium: QualityProfile,
    pub high: QualityProfile,
}

impl QualityProfiles {
    pub fn get(&self, level: QualityLevel) -> QualityProfile {
        match level {
            QualityLevel::Minimal => self.minimal,
            QualityLevel::Low => self.low,
            QualityLevel::Medium => self.medium,
            QualityLevel::High => self.high,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (QualityLevel, QualityProfile)> + '_ {
        [
            QualityLevel::Minimal,
            QualityLevel::Low,
            QualityLevel::Medium,
            QualityLevel::High,
        ]
        .into_iter()
        .map(|level| (level, self.get(level)))
    }
}

impl Default for QualityProfiles {
    fn default() -> Self {
        Self {
            minimal: QualityProfile::new(1, 250, 4),
            low: QualityProfile::new(2, 133, 2),
            medium: QualityProfile::new(4, 66, 2),
            high: QualityProfile::new(6, 33, 1),
        }
    }
}

/// Immutable view of the current operating point, published by the throttle controller.
///
/// Readers copy one of these at the start of a frame so a level change never
/// lands half way through processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QualitySnapshot {
    pub throttle_level: ThrottleLevel,
    pub quality_level: QualityLevel,
    pub profile: QualityProfile,
}

impl QualitySnapshot {
    /// Resolve a throttle level against the profiles, never exceeding `ceiling`.
    pub fn resolve(
        throttle_level: ThrottleLevel,
        ceiling: QualityLevel,
        profiles: &QualityProfiles,
    ) -> Self {
        let quality_level = throttle_level.quality_level().min(ceiling);
        Self {
            throttle_level,
            quality_level,
            profile: profiles.get(quality_level),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_steps_are_single_and_saturating() {
        assert_eq!(ThrottleLevel::None.escalate(), ThrottleLevel::Light);
        assert_eq!(ThrottleLevel::Aggressive.escalate(), ThrottleLevel::Aggressive);
        assert_eq!(ThrottleLevel::Aggressive.deescalate(), ThrottleLevel::Moderate);
        assert_eq!(ThrottleLevel::None.deescalate(), ThrottleLevel::None);
    }

    #[test]
    fn budget_stays_within_registry_bounds() {
        let profile = QualityProfile::new(0, 100, 1);
        assert_eq!(profile.analyzer_budget(3), 1);

        let profile = QualityProfile::new(10, 100, 1);
        assert_eq!(profile.analyzer_budget(3), 3);
        assert_eq!(profile.analyzer_budget(0), 0);
    }

    #[test]
    fn ceiling_caps_quality_level() {
        let profiles = QualityProfiles::default();
        let snapshot = QualitySnapshot::resolve(ThrottleLevel::None, QualityLevel::Low, &profiles);
        assert_eq!(snapshot.quality_level, QualityLevel::Low);
        assert_eq!(snapshot.profile, profiles.low);

        let snapshot =
            QualitySnapshot::resolve(ThrottleLevel::Aggressive, QualityLevel::High, &profiles);
        assert_eq!(snapshot.quality_level, QualityLevel::Minimal);
    }
}
