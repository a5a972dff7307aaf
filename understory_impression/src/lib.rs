// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_impression --heading-base-level=0

//! Understory Impression: headless impression (visibility) detection for UI.
//!
//! An element is *impressed* once enough of it has been on screen for long
//! enough. This crate decides when that happens and reports the transitions.
//! It does not own a view tree, a timer, or an event loop; the host supplies
//! those through small seams:
//!
//! - a [`VisibilityProbe`] (or keyed [`VisibilityLookup`]) reporting what
//!   fraction of an element is currently visible,
//! - a clock, fed to [`Sampler::tick`] directly or to
//!   [`ImpressionTracker::advance`],
//! - lifecycle events ([`HostEvent`]) such as the app moving to the background.
//!
//! ## Pieces
//!
//! - [`Sampler`]: per-element state machine. Compares each sample against the
//!   area threshold, accumulates continuous visible time, and becomes
//!   [`ImpressionState::Impressed`] once the duration threshold is reached.
//! - [`ImpressionGroup`]: one shared configuration and one `(index, state)`
//!   observer for many elements, such as the rows of a list.
//! - [`ImpressionTracker`]: host-facing registry that keeps one sampler per
//!   element key and drives them all from a monotonic clock.
//! - [`FrameProbe`]: computes the visible ratio from element bounds, the
//!   viewport, and clipping ancestors.
//!
//! ## Configuration
//!
//! Settings live in [`ImpressionConfig`], where every field is optional. They
//! resolve per call, then per group, then against [`ImpressionDefaults`]
//! (200 ms interval, zero duration, 0.5 area ratio, never re-detect). A zero
//! duration means an element is impressed on the first sample that meets the
//! area threshold. Invalid values, including an explicitly configured zero
//! duration, fail with [`ConfigError`] at construction and are never clamped.
//!
//! ## Example
//!
//! ```rust
//! use core::time::Duration;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use understory_impression::{
//!     ImpressionConfig, ImpressionGroup, ImpressionState, ImpressionTracker, Redetect,
//! };
//!
//! let events = Rc::new(RefCell::new(Vec::new()));
//! let sink = events.clone();
//! let rows = ImpressionGroup::new(
//!     &ImpressionConfig::new()
//!         .with_detection_interval(Duration::from_millis(250))
//!         .with_duration_threshold(Duration::from_secs(1))
//!         .with_area_ratio_threshold(0.5)
//!         .with_redetect(Redetect::LEFT_SCREEN),
//!     move |row: &usize, state| sink.borrow_mut().push((*row, state)),
//! )
//! .unwrap();
//!
//! let mut tracker = ImpressionTracker::<u64>::new();
//! // Element 100 shows row 0, element 101 shows row 1.
//! tracker.detect_impression_in_group(100, &rows, 0);
//! tracker.detect_impression_in_group(101, &rows, 1);
//!
//! // Row 0 is 60% visible; row 1 is scrolled out.
//! let lookup = |element: &u64| Some(if *element == 100 { 0.6 } else { 0.0 });
//! // The first advance starts each element's timer.
//! for step in 0..=4 {
//!     tracker.advance(Duration::from_millis(250 * step), &lookup);
//! }
//!
//! assert_eq!(&*events.borrow(), &[(0, ImpressionState::Impressed { area_ratio: 0.6 })]);
//! ```
//!
//! ## Threading
//!
//! Everything here is single-threaded: groups are `Rc`-backed and samplers
//! own boxed observers. Sampling, threshold checks, and callbacks all run on
//! the thread that drives the host's UI loop.
//!
//! ## Features
//!
//! - `std` (default): forwards to `kurbo`, `tracing`, and `thiserror`.
//! - `libm`: `no_std` float math for `kurbo`.
//!
//! This crate is `no_std` compatible (with `alloc`).

#![no_std]

extern crate alloc;

mod config;
mod group;
mod probe;
mod sampler;
mod state;
mod ticker;
mod tracker;

pub use config::{ConfigError, ImpressionConfig, ImpressionDefaults, Redetect, ResolvedConfig};
pub use group::ImpressionGroup;
pub use probe::{FrameProbe, VisibilityLookup, VisibilityProbe, area_ratio};
pub use sampler::{ImpressionObserver, Sampler};
pub use state::{HostEvent, ImpressionState, LossReason};
pub use ticker::Ticker;
pub use tracker::ImpressionTracker;
