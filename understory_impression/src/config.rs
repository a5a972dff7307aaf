// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Detection configuration: optional per-call values, host defaults, and
//! validated resolution.
//!
//! Configuration is layered. A value set on the [`ImpressionConfig`] passed to
//! a sampler wins; otherwise the group's value applies (for grouped
//! samplers); otherwise the host's [`ImpressionDefaults`]. Resolution happens
//! once, when the sampler or group is constructed, and produces a
//! [`ResolvedConfig`] that is never re-resolved per tick.
//!
//! ```
//! use core::time::Duration;
//! use understory_impression::{ImpressionConfig, ImpressionDefaults, Redetect};
//!
//! let config = ImpressionConfig::new()
//!     .with_area_ratio_threshold(0.75)
//!     .with_redetect(Redetect::LEFT_SCREEN);
//!
//! let resolved = config.resolve(&ImpressionDefaults::default()).unwrap();
//! assert_eq!(resolved.area_ratio_threshold, 0.75);
//! assert_eq!(resolved.detection_interval, Duration::from_millis(200));
//!
//! // Out-of-range thresholds are rejected rather than clamped.
//! let bad = ImpressionConfig::new().with_area_ratio_threshold(1.5);
//! assert!(bad.resolve(&ImpressionDefaults::default()).is_err());
//! ```

use core::time::Duration;

bitflags::bitflags! {
    /// Re-detection policy applied after an element has been impressed.
    ///
    /// Each flag names a kind of loss that drops an impressed element back to
    /// [`ImpressionState::NotImpressed`](crate::ImpressionState::NotImpressed)
    /// so that it can be impressed again. The empty set means "never
    /// re-detect": the sampler freezes at its first impression and stops
    /// sampling.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct Redetect: u8 {
        /// The element's visible area dropped below the area threshold.
        const LEFT_SCREEN        = 0b0000_0001;
        /// The hosting container (screen, page, tab) was hidden.
        const HOST_HIDDEN        = 0b0000_0010;
        /// The application moved to the background.
        const ENTERED_BACKGROUND = 0b0000_0100;
        /// The application stopped being the active one.
        const RESIGNED_ACTIVE    = 0b0000_1000;
    }
}

/// Errors produced while resolving a detection configuration.
#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The area ratio threshold is outside `[0, 1]` or is NaN.
    #[error("area ratio threshold {0} is outside [0, 1]")]
    AreaRatioOutOfRange(f64),
    /// The detection interval is zero.
    #[error("detection interval must be greater than zero")]
    ZeroDetectionInterval,
    /// An explicitly configured duration threshold is zero.
    #[error("duration threshold must be greater than zero")]
    ZeroDurationThreshold,
}

/// Optional detection settings for one sampler or group.
///
/// Every field is optional; an unset field falls through to the next
/// configuration layer.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ImpressionConfig {
    /// How often the element is sampled.
    pub detection_interval: Option<Duration>,
    /// How long the element must stay visible before it counts as impressed.
    pub duration_threshold: Option<Duration>,
    /// Minimum fraction of the element's area that must be on screen.
    pub area_ratio_threshold: Option<f64>,
    /// Re-detection policy after the first impression.
    pub redetect: Option<Redetect>,
}

impl ImpressionConfig {
    /// Creates a configuration with every field unset.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            detection_interval: None,
            duration_threshold: None,
            area_ratio_threshold: None,
            redetect: None,
        }
    }

    /// Sets the detection interval.
    #[must_use]
    pub const fn with_detection_interval(mut self, interval: Duration) -> Self {
        self.detection_interval = Some(interval);
        self
    }

    /// Sets the duration threshold.
    #[must_use]
    pub const fn with_duration_threshold(mut self, threshold: Duration) -> Self {
        self.duration_threshold = Some(threshold);
        self
    }

    /// Sets the area ratio threshold.
    #[must_use]
    pub const fn with_area_ratio_threshold(mut self, threshold: f64) -> Self {
        self.area_ratio_threshold = Some(threshold);
        self
    }

    /// Sets the re-detection policy.
    #[must_use]
    pub const fn with_redetect(mut self, redetect: Redetect) -> Self {
        self.redetect = Some(redetect);
        self
    }

    /// Fills every unset field from `fallback`.
    ///
    /// Values already set on `self` win.
    #[must_use]
    pub fn or(self, fallback: &Self) -> Self {
        Self {
            detection_interval: self.detection_interval.or(fallback.detection_interval),
            duration_threshold: self.duration_threshold.or(fallback.duration_threshold),
            area_ratio_threshold: self.area_ratio_threshold.or(fallback.area_ratio_threshold),
            redetect: self.redetect.or(fallback.redetect),
        }
    }

    /// Resolves the remaining unset fields against `defaults` and validates
    /// the result.
    ///
    /// Durations set on `self` must be non-zero. A zero duration threshold
    /// from `defaults` is accepted and means "impressed on the first visible
    /// sample".
    pub fn resolve(&self, defaults: &ImpressionDefaults) -> Result<ResolvedConfig, ConfigError> {
        if self.detection_interval == Some(Duration::ZERO) {
            return Err(ConfigError::ZeroDetectionInterval);
        }
        if self.duration_threshold == Some(Duration::ZERO) {
            return Err(ConfigError::ZeroDurationThreshold);
        }
        let resolved = ResolvedConfig {
            detection_interval: self
                .detection_interval
                .unwrap_or(defaults.detection_interval),
            duration_threshold: self
                .duration_threshold
                .unwrap_or(defaults.duration_threshold),
            area_ratio_threshold: self
                .area_ratio_threshold
                .unwrap_or(defaults.area_ratio_threshold),
            redetect: self.redetect.unwrap_or(defaults.redetect),
        };
        resolved.validate()?;
        Ok(resolved)
    }
}

/// Host-level defaults: the last configuration layer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImpressionDefaults {
    /// Default sampling interval (200 ms).
    pub detection_interval: Duration,
    /// Default continuous-visibility requirement (zero: impressed as soon as
    /// the area threshold is met).
    pub duration_threshold: Duration,
    /// Default area ratio threshold (0.5).
    pub area_ratio_threshold: f64,
    /// Default re-detection policy (never re-detect).
    pub redetect: Redetect,
}

impl Default for ImpressionDefaults {
    fn default() -> Self {
        Self {
            detection_interval: Duration::from_millis(200),
            duration_threshold: Duration::ZERO,
            area_ratio_threshold: 0.5,
            redetect: Redetect::empty(),
        }
    }
}

impl From<ResolvedConfig> for ImpressionDefaults {
    fn from(resolved: ResolvedConfig) -> Self {
        Self {
            detection_interval: resolved.detection_interval,
            duration_threshold: resolved.duration_threshold,
            area_ratio_threshold: resolved.area_ratio_threshold,
            redetect: resolved.redetect,
        }
    }
}

/// A fully resolved and validated configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolvedConfig {
    /// Sampling interval; always non-zero.
    pub detection_interval: Duration,
    /// Continuous-visibility requirement; zero means the first visible
    /// sample impresses.
    pub duration_threshold: Duration,
    /// Area ratio threshold in `[0, 1]`.
    pub area_ratio_threshold: f64,
    /// Re-detection policy.
    pub redetect: Redetect,
}

impl ResolvedConfig {
    /// Checks the invariants every resolved configuration must hold.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.area_ratio_threshold) {
            return Err(ConfigError::AreaRatioOutOfRange(self.area_ratio_threshold));
        }
        if self.detection_interval.is_zero() {
            return Err(ConfigError::ZeroDetectionInterval);
        }
        Ok(())
    }

    /// Returns `true` if the element freezes after its first impression.
    #[must_use]
    pub fn freezes_after_impression(&self) -> bool {
        self.redetect.is_empty()
    }
}
