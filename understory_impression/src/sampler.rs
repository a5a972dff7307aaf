// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The per-element visibility sampler.
//!
//! ## Usage
//!
//! 1) Start a sampler with [`Sampler::start`], passing the configuration and
//!    an observer (any `FnMut(ImpressionState)` works).
//! 2) On every timer tick, call [`Sampler::tick`] with a probe for the element.
//!    Out-of-band samples (scroll, layout) go through [`Sampler::sample`] with
//!    the time elapsed since the previous sample.
//! 3) Forward host lifecycle events with [`Sampler::handle_event`].
//! 4) Call [`Sampler::stop`] when the element is torn down.
//!
//! ## Rules
//!
//! - A sample is *visible* when the probe reports a ratio `>=` the area
//!   threshold. A probe failure (`None`) is not visible.
//! - Visible samples add their elapsed time to a continuous-visibility
//!   accumulator; a non-visible sample resets it to zero.
//! - The sampler becomes impressed the first time the accumulator reaches the
//!   duration threshold.
//! - With an empty [`Redetect`] policy, it then freezes and ignores further
//!   samples. Otherwise it keeps sampling and drops to
//!   [`ImpressionState::NotImpressed`] on any loss named by the policy.
//! - The observer sees every state change exactly once and nothing after
//!   [`Sampler::stop`].
//!
//! ```
//! use core::time::Duration;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use understory_impression::{ImpressionConfig, ImpressionState, Sampler};
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = seen.clone();
//! let config = ImpressionConfig::new()
//!     .with_detection_interval(Duration::from_millis(500))
//!     .with_duration_threshold(Duration::from_secs(1));
//! let mut sampler =
//!     Sampler::start(&config, move |s: ImpressionState| sink.borrow_mut().push(s)).unwrap();
//!
//! sampler.tick(&0.8);
//! assert!(seen.borrow().is_empty());
//! sampler.tick(&0.8);
//! assert_eq!(&*seen.borrow(), &[ImpressionState::Impressed { area_ratio: 0.8 }]);
//! ```

use alloc::boxed::Box;
use core::fmt;
use core::time::Duration;

use crate::config::{ConfigError, ImpressionConfig, ImpressionDefaults, Redetect, ResolvedConfig};
use crate::probe::VisibilityProbe;
use crate::state::{HostEvent, ImpressionState, LossReason, Suspension};

/// Receives state changes from a [`Sampler`].
///
/// Closures of the form `FnMut(ImpressionState)` implement this directly.
/// Routing observers (such as the one an
/// [`ImpressionGroup`](crate::ImpressionGroup) installs) can also report
/// whether they are still attached and request a fresh detection.
pub trait ImpressionObserver {
    /// Called once per state transition.
    fn on_change(&mut self, state: ImpressionState);

    /// Whether the observer still wants notifications.
    ///
    /// A sampler whose observer reports `false` stops itself.
    fn is_attached(&self) -> bool {
        true
    }

    /// Returns `true` once for every fresh detection requested since the
    /// previous call.
    fn take_redetect_request(&mut self) -> bool {
        false
    }
}

impl<F> ImpressionObserver for F
where
    F: FnMut(ImpressionState),
{
    fn on_change(&mut self, state: ImpressionState) {
        self(state);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Sampling,
    Frozen,
    Stopped,
}

/// Decides whether one element counts as impressed and reports transitions.
pub struct Sampler {
    config: ResolvedConfig,
    state: ImpressionState,
    phase: Phase,
    visible_for: Duration,
    last_area_ratio: Option<f64>,
    suspension: Suspension,
    observer: Box<dyn ImpressionObserver>,
}

impl fmt::Debug for Sampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sampler")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("phase", &self.phase)
            .field("visible_for", &self.visible_for)
            .field("last_area_ratio", &self.last_area_ratio)
            .field("suspension", &self.suspension)
            .finish_non_exhaustive()
    }
}

impl Sampler {
    /// Starts a sampler, resolving `config` against [`ImpressionDefaults::default`].
    pub fn start(
        config: &ImpressionConfig,
        observer: impl ImpressionObserver + 'static,
    ) -> Result<Self, ConfigError> {
        Self::start_with_defaults(config, &ImpressionDefaults::default(), observer)
    }

    /// Starts a sampler, resolving `config` against host `defaults`.
    pub fn start_with_defaults(
        config: &ImpressionConfig,
        defaults: &ImpressionDefaults,
        observer: impl ImpressionObserver + 'static,
    ) -> Result<Self, ConfigError> {
        let resolved = config.resolve(defaults)?;
        Ok(Self::with_validated(resolved, Box::new(observer)))
    }

    /// Starts a sampler from an already resolved configuration.
    pub fn from_resolved(
        config: ResolvedConfig,
        observer: impl ImpressionObserver + 'static,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_validated(config, Box::new(observer)))
    }

    pub(crate) fn with_validated(
        config: ResolvedConfig,
        observer: Box<dyn ImpressionObserver>,
    ) -> Self {
        tracing::debug!(?config, "impression sampler started");
        Self {
            config,
            state: ImpressionState::NotDetermined,
            phase: Phase::Sampling,
            visible_for: Duration::ZERO,
            last_area_ratio: None,
            suspension: Suspension::empty(),
            observer,
        }
    }

    /// The resolved configuration this sampler runs with.
    #[must_use]
    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Current impression state.
    #[must_use]
    pub fn state(&self) -> ImpressionState {
        self.state
    }

    /// Returns `false` once [`Sampler::stop`] has been called (or the sampler
    /// stopped itself because its observer detached).
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.phase != Phase::Stopped
    }

    /// Returns `true` while samples can still change the state.
    ///
    /// Frozen (impressed under an empty re-detect policy) and stopped
    /// samplers return `false`; hosts may skip their timers.
    #[must_use]
    pub fn is_sampling(&self) -> bool {
        self.phase == Phase::Sampling
    }

    /// Continuous visible time accumulated so far.
    #[must_use]
    pub fn visible_for(&self) -> Duration {
        self.visible_for
    }

    /// The ratio reported by the most recent sample, if any.
    #[must_use]
    pub fn last_area_ratio(&self) -> Option<f64> {
        self.last_area_ratio
    }

    /// Runs one timer-driven sample, crediting one detection interval.
    pub fn tick<P: VisibilityProbe + ?Sized>(&mut self, probe: &P) {
        self.sample(self.config.detection_interval, probe);
    }

    /// Runs one sample, crediting `elapsed` if the element is visible.
    pub fn sample<P: VisibilityProbe + ?Sized>(&mut self, elapsed: Duration, probe: &P) {
        if self.phase == Phase::Stopped {
            return;
        }
        if !self.observer.is_attached() {
            tracing::debug!("impression observer detached; stopping sampler");
            self.stop();
            return;
        }
        if self.observer.take_redetect_request() {
            self.redetect();
        }
        if self.phase == Phase::Frozen || !self.suspension.is_empty() {
            return;
        }

        let ratio = probe.area_ratio();
        self.last_area_ratio = ratio;
        let visible = match ratio {
            Some(ratio) => ratio >= self.config.area_ratio_threshold,
            None => {
                tracing::trace!("visibility probe reported no geometry");
                false
            }
        };
        tracing::trace!(?ratio, visible, ?elapsed, "impression sample");

        if visible {
            self.visible_for = self.visible_for.saturating_add(elapsed);
            if !self.state.is_impressed() && self.visible_for >= self.config.duration_threshold {
                let area_ratio = ratio.unwrap_or_default();
                if self.config.freezes_after_impression() {
                    self.phase = Phase::Frozen;
                }
                self.transition(ImpressionState::Impressed { area_ratio });
            }
        } else {
            self.visible_for = Duration::ZERO;
            if self.state.is_impressed() && self.config.redetect.contains(Redetect::LEFT_SCREEN) {
                self.transition(ImpressionState::NotImpressed {
                    reason: LossReason::LeftScreen,
                });
            }
        }
    }

    /// Applies a host lifecycle event.
    ///
    /// Suspending events (`Hidden`, `EnteredBackground`, `ResignedActive`)
    /// reset the accumulator and pause sampling until the matching resuming
    /// event. If the element is impressed and the policy names the loss, the
    /// sampler transitions to [`ImpressionState::NotImpressed`].
    pub fn handle_event(&mut self, event: HostEvent) {
        if self.phase == Phase::Stopped {
            return;
        }
        let (bit, suspend, reason) = event.effect();
        if !suspend {
            self.suspension.remove(bit);
            return;
        }
        let newly_suspended = !self.suspension.contains(bit);
        self.suspension.insert(bit);
        self.visible_for = Duration::ZERO;
        if newly_suspended
            && self.phase == Phase::Sampling
            && self.state.is_impressed()
            && self.config.redetect.contains(reason.redetect_flag())
        {
            self.transition(ImpressionState::NotImpressed { reason });
        }
    }

    /// Resets to [`ImpressionState::NotDetermined`] and resumes sampling.
    ///
    /// This re-arms a frozen sampler. The reset itself is not reported to the
    /// observer. Has no effect on a stopped sampler.
    pub fn redetect(&mut self) {
        if self.phase == Phase::Stopped {
            return;
        }
        self.state = ImpressionState::NotDetermined;
        self.visible_for = Duration::ZERO;
        self.phase = Phase::Sampling;
    }

    /// Stops the sampler. Idempotent; no callback fires afterwards.
    pub fn stop(&mut self) {
        if self.phase != Phase::Stopped {
            tracing::debug!(state = ?self.state, "impression sampler stopped");
            self.phase = Phase::Stopped;
        }
    }

    fn transition(&mut self, next: ImpressionState) {
        if self.state.same_kind(&next) {
            return;
        }
        tracing::debug!(from = ?self.state, to = ?next, "impression state changed");
        // State is committed before the observer runs.
        self.state = next;
        if self.phase != Phase::Stopped && self.observer.is_attached() {
            self.observer.on_change(next);
        }
    }
}
