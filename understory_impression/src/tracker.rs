// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host-side registry of attached samplers.
//!
//! [`ImpressionTracker`] is the piece a host event loop talks to. It keeps one
//! sampler (plus its [`Ticker`]) per element key, drives them all from a
//! single monotonic clock, and forwards lifecycle events. It mirrors the two
//! ways a host attaches detection to an element:
//!
//! - [`ImpressionTracker::detect_impression`]: standalone, with its own
//!   configuration and observer.
//! - [`ImpressionTracker::detect_impression_in_group`]: configuration and
//!   notification routing owned by an [`ImpressionGroup`].
//!
//! ```
//! use core::time::Duration;
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use understory_impression::{ImpressionConfig, ImpressionState, ImpressionTracker};
//!
//! let impressed = Rc::new(Cell::new(false));
//! let flag = impressed.clone();
//! let mut tracker = ImpressionTracker::<&str>::new();
//! tracker
//!     .detect_impression(
//!         "banner",
//!         &ImpressionConfig::new().with_duration_threshold(Duration::from_millis(400)),
//!         move |s: ImpressionState| flag.set(s.is_impressed()),
//!     )
//!     .unwrap();
//!
//! // The host reports the banner fully on screen.
//! let lookup = |_: &&str| Some(1.0);
//! // The first advance after attaching starts the banner's timer.
//! tracker.advance(Duration::ZERO, &lookup);
//! tracker.advance(Duration::from_millis(200), &lookup);
//! assert!(!impressed.get());
//! tracker.advance(Duration::from_millis(400), &lookup);
//! assert!(impressed.get());
//! ```

use alloc::boxed::Box;
use core::hash::Hash;
use core::time::Duration;

use hashbrown::HashMap;

use crate::config::{ConfigError, ImpressionConfig, ImpressionDefaults};
use crate::group::ImpressionGroup;
use crate::probe::VisibilityLookup;
use crate::sampler::{ImpressionObserver, Sampler};
use crate::state::{HostEvent, ImpressionState};
use crate::ticker::Ticker;

#[derive(Debug)]
struct Tracked {
    sampler: Sampler,
    /// Anchored by the first `advance` after attaching.
    ticker: Option<Ticker>,
}

/// Keeps one sampler per element and drives them from a shared clock.
#[derive(Debug)]
pub struct ImpressionTracker<K> {
    defaults: ImpressionDefaults,
    now: Duration,
    max_catch_up: u32,
    elements: HashMap<K, Tracked>,
}

impl<K> Default for ImpressionTracker<K>
where
    K: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> ImpressionTracker<K>
where
    K: Clone + Eq + Hash,
{
    /// Creates an empty tracker using [`ImpressionDefaults::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_defaults(ImpressionDefaults::default())
    }

    /// Creates an empty tracker with host `defaults` for standalone samplers.
    #[must_use]
    pub fn with_defaults(defaults: ImpressionDefaults) -> Self {
        Self {
            defaults,
            now: Duration::ZERO,
            max_catch_up: 1,
            elements: HashMap::new(),
        }
    }

    /// Sets how many missed ticks one [`ImpressionTracker::advance`] may run
    /// per element after a stall. Applies to elements not yet advanced.
    #[must_use]
    pub fn with_max_catch_up(mut self, max_catch_up: u32) -> Self {
        self.max_catch_up = max_catch_up.max(1);
        self
    }

    /// The host defaults used for standalone samplers.
    #[must_use]
    pub fn defaults(&self) -> &ImpressionDefaults {
        &self.defaults
    }

    /// The clock value passed to the most recent [`ImpressionTracker::advance`].
    #[must_use]
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Attaches a standalone sampler to `key`.
    ///
    /// Any sampler already attached to `key` is stopped first. Fails without
    /// touching the existing attachment if `config` is invalid.
    pub fn detect_impression(
        &mut self,
        key: K,
        config: &ImpressionConfig,
        on_change: impl ImpressionObserver + 'static,
    ) -> Result<(), ConfigError> {
        let resolved = config.resolve(&self.defaults)?;
        self.attach(key, Sampler::with_validated(resolved, Box::new(on_change)));
        Ok(())
    }

    /// Attaches `key` to `group` under `index`.
    ///
    /// The group's configuration applies and state changes reach the group's
    /// observer tagged with `index`. Any sampler already attached to `key` is
    /// stopped first.
    pub fn detect_impression_in_group<I>(&mut self, key: K, group: &ImpressionGroup<I>, index: I)
    where
        I: Clone + Eq + Hash + 'static,
    {
        self.attach(key, group.bind(index));
    }

    /// Attaches an existing sampler to `key`, stopping any previous one.
    ///
    /// The element's timer starts at the next [`ImpressionTracker::advance`],
    /// which takes no sample for it; the first tick is one detection interval
    /// after that.
    pub fn attach(&mut self, key: K, sampler: Sampler) {
        let tracked = Tracked {
            sampler,
            ticker: None,
        };
        if let Some(mut previous) = self.elements.insert(key, tracked) {
            tracing::debug!("element re-attached; stopping previous sampler");
            previous.sampler.stop();
        }
    }

    /// Stops and removes the sampler attached to `key`.
    ///
    /// Returns `false` if nothing was attached.
    pub fn detach(&mut self, key: &K) -> bool {
        match self.elements.remove(key) {
            Some(mut tracked) => {
                tracked.sampler.stop();
                true
            }
            None => false,
        }
    }

    /// The sampler attached to `key`, if any.
    #[must_use]
    pub fn sampler(&self, key: &K) -> Option<&Sampler> {
        self.elements.get(key).map(|t| &t.sampler)
    }

    /// Current state of the element attached to `key`, if any.
    #[must_use]
    pub fn state(&self, key: &K) -> Option<ImpressionState> {
        self.sampler(key).map(Sampler::state)
    }

    /// Number of attached elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns `true` if no element is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Forwards a host lifecycle event to every attached sampler.
    pub fn handle_event(&mut self, event: HostEvent) {
        tracing::debug!(?event, "broadcasting host event");
        for tracked in self.elements.values_mut() {
            tracked.sampler.handle_event(event);
        }
    }

    /// Advances the clock to `now` and runs every due tick.
    ///
    /// Each element's ratio is looked up once per tick through `lookup`.
    /// Elements attached since the previous call start their timer here.
    /// Samplers that stopped (including ones orphaned by their group) are
    /// removed afterwards. Returns the number of samples taken.
    pub fn advance<L>(&mut self, now: Duration, lookup: &L) -> usize
    where
        L: VisibilityLookup<K> + ?Sized,
    {
        self.now = self.now.max(now);
        let now = self.now;
        let max_catch_up = self.max_catch_up;
        let mut samples = 0;
        for (key, tracked) in &mut self.elements {
            let Some(ticker) = tracked.ticker.as_mut() else {
                tracked.ticker = Some(
                    Ticker::new(tracked.sampler.config().detection_interval, now)
                        .with_max_catch_up(max_catch_up),
                );
                continue;
            };
            let due = ticker.advance(now);
            for _ in 0..due {
                if !tracked.sampler.is_active() {
                    break;
                }
                tracked.sampler.tick(&lookup.area_ratio(key));
                samples += 1;
            }
        }
        self.prune();
        tracing::trace!(samples, ?now, "impression tracker advanced");
        samples
    }

    /// Takes an out-of-band sample for `key` (after a scroll or layout pass).
    ///
    /// No visible time is credited, so this can report a loss or confirm
    /// state but never shortens the duration threshold. Returns `false` if
    /// nothing is attached to `key`.
    pub fn resample<L>(&mut self, key: &K, lookup: &L) -> bool
    where
        L: VisibilityLookup<K> + ?Sized,
    {
        let Some(tracked) = self.elements.get_mut(key) else {
            return false;
        };
        tracked.sampler.sample(Duration::ZERO, &lookup.area_ratio(key));
        true
    }

    /// Removes samplers that are no longer active.
    ///
    /// Dropping a grouped sampler also releases its group binding.
    fn prune(&mut self) {
        let before = self.elements.len();
        self.elements.retain(|_, t| t.sampler.is_active());
        let removed = before - self.elements.len();
        if removed > 0 {
            tracing::debug!(removed, "pruned inactive impression samplers");
        }
    }
}
