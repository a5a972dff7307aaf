// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Impression states and host lifecycle events.

use crate::config::Redetect;

/// Why an impressed element dropped back to not-impressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LossReason {
    /// The visible area fell below the area threshold.
    LeftScreen,
    /// The hosting container was hidden.
    HostHidden,
    /// The application moved to the background.
    EnteredBackground,
    /// The application stopped being the active one.
    ResignedActive,
}

impl LossReason {
    /// The re-detection flag that enables this kind of loss.
    #[must_use]
    pub const fn redetect_flag(self) -> Redetect {
        match self {
            Self::LeftScreen => Redetect::LEFT_SCREEN,
            Self::HostHidden => Redetect::HOST_HIDDEN,
            Self::EnteredBackground => Redetect::ENTERED_BACKGROUND,
            Self::ResignedActive => Redetect::RESIGNED_ACTIVE,
        }
    }
}

/// The impression classification of one element.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum ImpressionState {
    /// No impression has been reached yet.
    #[default]
    NotDetermined,
    /// The element met both thresholds.
    Impressed {
        /// Visible-area ratio sampled at the moment of impression.
        area_ratio: f64,
    },
    /// The element was impressed and then lost it under the re-detect policy.
    NotImpressed {
        /// The loss that caused the transition.
        reason: LossReason,
    },
}

impl ImpressionState {
    /// Returns `true` for [`ImpressionState::Impressed`].
    #[must_use]
    pub const fn is_impressed(&self) -> bool {
        matches!(self, Self::Impressed { .. })
    }

    /// Returns `true` if `self` and `other` are the same classification,
    /// ignoring payloads.
    #[must_use]
    pub fn same_kind(&self, other: &Self) -> bool {
        core::mem::discriminant(self) == core::mem::discriminant(other)
    }
}

/// Host lifecycle events that pause or resume sampling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HostEvent {
    /// The hosting container disappeared.
    Hidden,
    /// The hosting container appeared again.
    Shown,
    /// The application moved to the background.
    EnteredBackground,
    /// The application returned to the foreground.
    EnteredForeground,
    /// The application stopped being the active one.
    ResignedActive,
    /// The application became active again.
    BecameActive,
}

bitflags::bitflags! {
    /// Active reasons for which sampling is paused.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub(crate) struct Suspension: u8 {
        const HIDDEN     = 0b0000_0001;
        const BACKGROUND = 0b0000_0010;
        const INACTIVE   = 0b0000_0100;
    }
}

impl HostEvent {
    /// Splits the event into the suspension bit it affects, whether it sets
    /// or clears that bit, and the loss it reports when it sets it.
    pub(crate) const fn effect(self) -> (Suspension, bool, LossReason) {
        match self {
            Self::Hidden => (Suspension::HIDDEN, true, LossReason::HostHidden),
            Self::Shown => (Suspension::HIDDEN, false, LossReason::HostHidden),
            Self::EnteredBackground => (
                Suspension::BACKGROUND,
                true,
                LossReason::EnteredBackground,
            ),
            Self::EnteredForeground => (
                Suspension::BACKGROUND,
                false,
                LossReason::EnteredBackground,
            ),
            Self::ResignedActive => (Suspension::INACTIVE, true, LossReason::ResignedActive),
            Self::BecameActive => (Suspension::INACTIVE, false, LossReason::ResignedActive),
        }
    }
}
