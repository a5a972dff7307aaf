// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Grouped impression detection: one configuration and one observer shared
//! by many elements, each identified by a caller-supplied index.
//!
//! [`ImpressionGroup::bind`] hands back a [`Sampler`] for one element. The
//! host owns that sampler and ticks it like any other. The group only keeps
//! a weak back-reference, so dropping the sampler (or the element that owns
//! it) is enough to make the binding inert.
//!
//! ## Binding policy
//!
//! Indices are unique per group. Binding an index that is already bound
//! **replaces** the previous binding: the earlier sampler stops delivering at
//! once and stops itself on its next tick. [`ImpressionGroup::unbind`] does
//! the same without a replacement.
//!
//! ## Example
//!
//! ```
//! use core::time::Duration;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use understory_impression::{ImpressionConfig, ImpressionGroup, ImpressionState};
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = seen.clone();
//! let config = ImpressionConfig::new()
//!     .with_detection_interval(Duration::from_millis(250))
//!     .with_duration_threshold(Duration::from_secs(1))
//!     .with_area_ratio_threshold(0.5);
//! let group = ImpressionGroup::new(&config, move |index: &u32, state| {
//!     sink.borrow_mut().push((*index, state));
//! })
//! .unwrap();
//!
//! let mut row = group.bind(7);
//! for _ in 0..4 {
//!     row.tick(&0.6);
//! }
//! assert_eq!(&*seen.borrow(), &[(7, ImpressionState::Impressed { area_ratio: 0.6 })]);
//! assert_eq!(group.state(&7), Some(ImpressionState::Impressed { area_ratio: 0.6 }));
//! ```

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::fmt;
use core::hash::Hash;

use hashbrown::HashMap;

use crate::config::{ConfigError, ImpressionConfig, ImpressionDefaults, ResolvedConfig};
use crate::sampler::{ImpressionObserver, Sampler};
use crate::state::ImpressionState;

type GroupCallback<I> = Box<dyn FnMut(&I, ImpressionState)>;

/// Liveness marker owned by a bound sampler; the group holds a `Weak` to it.
#[derive(Debug)]
struct Attachment;

#[derive(Debug)]
struct Binding {
    generation: u64,
    attachment: Weak<Attachment>,
    state: ImpressionState,
}

impl Binding {
    fn is_live(&self) -> bool {
        self.attachment.strong_count() > 0
    }
}

struct GroupInner<I> {
    config: ResolvedConfig,
    bindings: RefCell<HashMap<I, Binding>>,
    next_generation: Cell<u64>,
    epoch: Cell<u64>,
    observer: RefCell<GroupCallback<I>>,
    pending: RefCell<VecDeque<(I, ImpressionState)>>,
}

impl<I> GroupInner<I>
where
    I: Clone + Eq + Hash,
{
    fn is_current(&self, index: &I, generation: u64) -> bool {
        self.bindings
            .borrow()
            .get(index)
            .is_some_and(|b| b.generation == generation)
    }

    fn deliver(&self, index: &I, generation: u64, state: ImpressionState) {
        {
            let mut bindings = self.bindings.borrow_mut();
            match bindings.get_mut(index) {
                Some(binding) if binding.generation == generation => binding.state = state,
                _ => return,
            }
        }
        self.pending.borrow_mut().push_back((index.clone(), state));

        // A notification raised from inside the observer stays queued and is
        // drained by the outer call below.
        let Ok(mut observer) = self.observer.try_borrow_mut() else {
            return;
        };
        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some((index, state)) = next else {
                break;
            };
            (*observer)(&index, state);
        }
    }
}

/// Routes one sampler's changes into its group, tagged with the index.
///
/// Dropping the link (with its sampler) removes the binding if it is still
/// the current one for its index.
struct GroupLink<I: Eq + Hash> {
    group: Weak<GroupInner<I>>,
    index: I,
    generation: u64,
    epoch: u64,
    _attachment: Rc<Attachment>,
}

impl<I> ImpressionObserver for GroupLink<I>
where
    I: Clone + Eq + Hash,
{
    fn on_change(&mut self, state: ImpressionState) {
        if let Some(group) = self.group.upgrade() {
            group.deliver(&self.index, self.generation, state);
        }
    }

    fn is_attached(&self) -> bool {
        self.group
            .upgrade()
            .is_some_and(|group| group.is_current(&self.index, self.generation))
    }

    fn take_redetect_request(&mut self) -> bool {
        let Some(group) = self.group.upgrade() else {
            return false;
        };
        let epoch = group.epoch.get();
        if epoch == self.epoch {
            return false;
        }
        self.epoch = epoch;
        true
    }
}

impl<I: Eq + Hash> Drop for GroupLink<I> {
    fn drop(&mut self) {
        let Some(group) = self.group.upgrade() else {
            return;
        };
        // Left for `prune` if the registry is busy.
        let Ok(mut bindings) = group.bindings.try_borrow_mut() else {
            return;
        };
        if bindings
            .get(&self.index)
            .is_some_and(|b| b.generation == self.generation)
        {
            bindings.remove(&self.index);
            tracing::trace!(generation = self.generation, "impression group binding released");
        }
    }
}

/// Shared configuration plus an index registry for many tracked elements.
///
/// Cloning the group is cheap and yields another handle to the same
/// registry. All handles and all bound samplers must stay on one thread.
pub struct ImpressionGroup<I> {
    inner: Rc<GroupInner<I>>,
}

impl<I> Clone for ImpressionGroup<I> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<I: fmt::Debug> fmt::Debug for ImpressionGroup<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImpressionGroup")
            .field("config", &self.inner.config)
            .field("bindings", &self.inner.bindings)
            .field("epoch", &self.inner.epoch.get())
            .finish_non_exhaustive()
    }
}

impl<I> ImpressionGroup<I>
where
    I: Clone + Eq + Hash + 'static,
{
    /// Creates a group, resolving `config` against [`ImpressionDefaults::default`].
    ///
    /// `on_change` receives `(index, state)` for every transition of every
    /// bound element.
    pub fn new(
        config: &ImpressionConfig,
        on_change: impl FnMut(&I, ImpressionState) + 'static,
    ) -> Result<Self, ConfigError> {
        Self::with_defaults(config, &ImpressionDefaults::default(), on_change)
    }

    /// Creates a group, resolving `config` against host `defaults`.
    pub fn with_defaults(
        config: &ImpressionConfig,
        defaults: &ImpressionDefaults,
        on_change: impl FnMut(&I, ImpressionState) + 'static,
    ) -> Result<Self, ConfigError> {
        let config = config.resolve(defaults)?;
        Ok(Self {
            inner: Rc::new(GroupInner {
                config,
                bindings: RefCell::new(HashMap::new()),
                next_generation: Cell::new(0),
                epoch: Cell::new(0),
                observer: RefCell::new(Box::new(on_change)),
                pending: RefCell::new(VecDeque::new()),
            }),
        })
    }

    /// The configuration shared by every sampler this group starts.
    #[must_use]
    pub fn config(&self) -> &ResolvedConfig {
        &self.inner.config
    }

    /// Binds `index` and starts a sampler with the group's configuration.
    ///
    /// Replaces any existing binding for `index`.
    pub fn bind(&self, index: I) -> Sampler {
        let config = self.inner.config;
        self.bind_resolved(index, config)
    }

    /// Binds `index` with per-element overrides layered over the group's
    /// configuration.
    ///
    /// Fails without touching the registry if the merged configuration is
    /// invalid.
    pub fn bind_with(&self, index: I, overrides: &ImpressionConfig) -> Result<Sampler, ConfigError> {
        let config = overrides.resolve(&ImpressionDefaults::from(self.inner.config))?;
        Ok(self.bind_resolved(index, config))
    }

    fn bind_resolved(&self, index: I, config: ResolvedConfig) -> Sampler {
        let generation = self.inner.next_generation.get();
        self.inner.next_generation.set(generation + 1);

        let attachment = Rc::new(Attachment);
        let previous = self.inner.bindings.borrow_mut().insert(
            index.clone(),
            Binding {
                generation,
                attachment: Rc::downgrade(&attachment),
                state: ImpressionState::NotDetermined,
            },
        );
        if previous.is_some() {
            tracing::debug!(generation, "impression group index rebound; previous sampler orphaned");
        } else {
            tracing::debug!(generation, "impression group index bound");
        }

        let link = GroupLink {
            group: Rc::downgrade(&self.inner),
            index,
            generation,
            epoch: self.inner.epoch.get(),
            _attachment: attachment,
        };
        Sampler::with_validated(config, Box::new(link))
    }

    /// Removes the binding for `index`.
    ///
    /// The sampler that was bound stops reporting immediately. Returns
    /// `false` if `index` was not bound.
    pub fn unbind(&self, index: &I) -> bool {
        let removed = self.inner.bindings.borrow_mut().remove(index).is_some();
        if removed {
            tracing::debug!("impression group index unbound");
        }
        removed
    }

    /// Resets every bound element to [`ImpressionState::NotDetermined`].
    ///
    /// Each bound sampler resumes detection on its next tick, including
    /// samplers frozen after their first impression.
    pub fn redetect(&self) {
        self.inner.epoch.set(self.inner.epoch.get() + 1);
        for binding in self.inner.bindings.borrow_mut().values_mut() {
            binding.state = ImpressionState::NotDetermined;
        }
        tracing::debug!(epoch = self.inner.epoch.get(), "impression group redetect");
    }

    /// Last reported state for `index`, if it is bound to a live sampler.
    #[must_use]
    pub fn state(&self, index: &I) -> Option<ImpressionState> {
        self.inner
            .bindings
            .borrow()
            .get(index)
            .filter(|b| b.is_live())
            .map(|b| b.state)
    }

    /// Snapshot of `(index, state)` for every live binding, in arbitrary order.
    #[must_use]
    pub fn states(&self) -> Vec<(I, ImpressionState)> {
        self.inner
            .bindings
            .borrow()
            .iter()
            .filter(|(_, b)| b.is_live())
            .map(|(i, b)| (i.clone(), b.state))
            .collect()
    }

    /// Returns `true` if `index` is bound to a live sampler.
    #[must_use]
    pub fn is_bound(&self, index: &I) -> bool {
        self.inner
            .bindings
            .borrow()
            .get(index)
            .is_some_and(Binding::is_live)
    }

    /// Number of live bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .bindings
            .borrow()
            .values()
            .filter(|b| b.is_live())
            .count()
    }

    /// Returns `true` if no live binding exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops registry entries whose samplers no longer exist.
    ///
    /// Dropping a bound sampler normally removes its entry at once, so this
    /// only finds entries whose sampler was dropped while the registry was
    /// borrowed. Returns the number of entries removed.
    pub fn prune(&self) -> usize {
        let mut bindings = self.inner.bindings.borrow_mut();
        let before = bindings.len();
        bindings.retain(|_, b| b.is_live());
        before - bindings.len()
    }
}
