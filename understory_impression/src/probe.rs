// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host visibility queries.
//!
//! A sampler never inspects the host's view tree itself. Each sample asks a
//! [`VisibilityProbe`] for the fraction of the element's area that is
//! currently on screen. `None` means the host cannot report geometry right
//! now (not laid out, zero-sized, detached) and is treated as "not visible".
//!
//! Hosts that keep world-space bounds around can use [`FrameProbe`], which
//! clips the element's bounds against the viewport and every clipping
//! ancestor:
//!
//! ```
//! use kurbo::Rect;
//! use understory_impression::{FrameProbe, VisibilityProbe};
//!
//! let probe = FrameProbe::new(
//!     Rect::new(0.0, 80.0, 100.0, 120.0),
//!     Rect::new(0.0, 0.0, 100.0, 100.0),
//! );
//! // Half of the element hangs below the viewport.
//! assert_eq!(probe.area_ratio(), Some(0.5));
//! ```

use kurbo::Rect;
use smallvec::SmallVec;

/// Per-element visibility query.
pub trait VisibilityProbe {
    /// Fraction of the element's area currently visible, in `[0, 1]`.
    ///
    /// Returns `None` when the host cannot report geometry for this sample.
    fn area_ratio(&self) -> Option<f64>;
}

impl VisibilityProbe for Option<f64> {
    fn area_ratio(&self) -> Option<f64> {
        *self
    }
}

impl VisibilityProbe for f64 {
    fn area_ratio(&self) -> Option<f64> {
        Some(*self)
    }
}

impl<P: VisibilityProbe + ?Sized> VisibilityProbe for &P {
    fn area_ratio(&self) -> Option<f64> {
        (**self).area_ratio()
    }
}

/// Keyed visibility query used by [`ImpressionTracker`](crate::ImpressionTracker).
///
/// Hosts can implement this over their view tree, an ECS, or a plain map.
/// Closures of the form `Fn(&K) -> Option<f64>` implement it directly.
pub trait VisibilityLookup<K> {
    /// Fraction of the element `key` currently visible, or `None` if the host
    /// cannot report it.
    fn area_ratio(&self, key: &K) -> Option<f64>;
}

impl<K, F> VisibilityLookup<K> for F
where
    F: Fn(&K) -> Option<f64>,
{
    fn area_ratio(&self, key: &K) -> Option<f64> {
        self(key)
    }
}

/// Ratio of `bounds` that lies inside `visible`.
///
/// Returns `None` if `bounds` has no area or is not finite.
#[must_use]
pub fn area_ratio(bounds: Rect, visible: Rect) -> Option<f64> {
    let bounds = bounds.abs();
    let total = bounds.area();
    if !total.is_finite() || total <= 0.0 {
        return None;
    }
    let shown = bounds.intersect(visible.abs()).area();
    Some((shown / total).clamp(0.0, 1.0))
}

/// Snapshot of an element's frame in a shared (world or window) space.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameProbe {
    /// The element's bounds.
    pub bounds: Rect,
    /// The visible region of the screen or window.
    pub viewport: Rect,
    /// Bounds of clipping ancestors, innermost first.
    pub clips: SmallVec<[Rect; 4]>,
    /// Whether the element is attached to a window at all.
    pub attached: bool,
    /// Whether the element or an ancestor is hidden.
    pub hidden: bool,
    /// Effective opacity after ancestor opacity is applied.
    pub opacity: f64,
}

impl FrameProbe {
    /// Creates an attached, opaque, unclipped frame.
    #[must_use]
    pub fn new(bounds: Rect, viewport: Rect) -> Self {
        Self {
            bounds,
            viewport,
            clips: SmallVec::new(),
            attached: true,
            hidden: false,
            opacity: 1.0,
        }
    }

    /// Adds a clipping ancestor.
    #[must_use]
    pub fn with_clip(mut self, clip: Rect) -> Self {
        self.clips.push(clip);
        self
    }

    /// Marks the element as detached from any window.
    #[must_use]
    pub fn detached(mut self) -> Self {
        self.attached = false;
        self
    }

    /// Sets the hidden flag.
    #[must_use]
    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// Sets the effective opacity.
    #[must_use]
    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }

    /// The region of the element's bounds that survives every clip.
    #[must_use]
    pub fn visible_rect(&self) -> Rect {
        self.clips
            .iter()
            .fold(self.viewport.abs(), |acc, clip| acc.intersect(clip.abs()))
    }
}

impl VisibilityProbe for FrameProbe {
    fn area_ratio(&self) -> Option<f64> {
        if !self.attached {
            return None;
        }
        let ratio = area_ratio(self.bounds, self.visible_rect())?;
        if self.hidden || self.opacity <= 0.0 {
            return Some(0.0);
        }
        Some(ratio)
    }
}
