// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tests for the `understory_impression` crate.
//!
//! These drive samplers, groups, and the tracker end to end through their
//! public API, the way a host UI loop would.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use kurbo::Rect;
use understory_impression::{
    FrameProbe, HostEvent, ImpressionConfig, ImpressionGroup, ImpressionState, ImpressionTracker,
    LossReason, Redetect, Sampler,
};

type GroupLog = Rc<RefCell<Vec<(u32, ImpressionState)>>>;

fn group_with(config: &ImpressionConfig) -> (ImpressionGroup<u32>, GroupLog) {
    let log: GroupLog = Rc::default();
    let sink = log.clone();
    let group = ImpressionGroup::new(config, move |index: &u32, state| {
        sink.borrow_mut().push((*index, state));
    })
    .unwrap();
    (group, log)
}

fn scenario_config(redetect: Redetect) -> ImpressionConfig {
    ImpressionConfig::new()
        .with_area_ratio_threshold(0.5)
        .with_duration_threshold(Duration::from_secs(1))
        .with_detection_interval(Duration::from_millis(250))
        .with_redetect(redetect)
}

#[test]
fn group_reports_one_impression_after_the_fourth_tick() {
    let (group, log) = group_with(&scenario_config(Redetect::empty()));
    let mut sampler = group.bind(42);

    for tick in 1..=3 {
        sampler.tick(&0.6);
        assert!(log.borrow().is_empty(), "impressed early at tick {tick}");
    }
    sampler.tick(&0.6);
    for _ in 0..4 {
        sampler.tick(&0.6);
    }

    assert_eq!(
        &*log.borrow(),
        &[(42, ImpressionState::Impressed { area_ratio: 0.6 })]
    );
}

#[test]
fn group_oscillation_alternates_states_under_left_screen_policy() {
    // One tick of visibility is enough here so each visible run re-impresses.
    let config = scenario_config(Redetect::LEFT_SCREEN)
        .with_duration_threshold(Duration::from_millis(250));
    let (group, log) = group_with(&config);
    let mut sampler = group.bind(9);

    for ratio in [0.6, 0.4, 0.6, 0.4, 0.6] {
        sampler.tick(&ratio);
    }

    let impressed = ImpressionState::Impressed { area_ratio: 0.6 };
    let lost = ImpressionState::NotImpressed {
        reason: LossReason::LeftScreen,
    };
    assert_eq!(
        &*log.borrow(),
        &[(9, impressed), (9, lost), (9, impressed), (9, lost), (9, impressed)]
    );
}

#[test]
fn oscillation_never_reaches_a_longer_duration_threshold() {
    let (group, log) = group_with(&scenario_config(Redetect::LEFT_SCREEN));
    let mut sampler = group.bind(1);
    for i in 0..40 {
        sampler.tick(&if i % 2 == 0 { 0.6 } else { 0.4 });
    }
    assert!(log.borrow().is_empty());
}

#[test]
fn never_impressed_below_area_threshold() {
    let (group, log) = group_with(&scenario_config(Redetect::empty()));
    let mut sampler = group.bind(1);
    for _ in 0..100 {
        sampler.tick(&0.49);
    }
    assert!(log.borrow().is_empty());
    assert_eq!(sampler.state(), ImpressionState::NotDetermined);
}

#[test]
fn ratio_equal_to_threshold_counts_as_visible() {
    let (group, log) = group_with(&scenario_config(Redetect::empty()));
    let mut sampler = group.bind(1);
    for _ in 0..4 {
        sampler.tick(&0.5);
    }
    assert_eq!(log.borrow().len(), 1);
}

#[test]
fn unbinding_mid_run_stops_notifications() {
    let (group, log) = group_with(&scenario_config(Redetect::LEFT_SCREEN));
    let mut sampler = group.bind(5);
    sampler.tick(&0.6);
    sampler.tick(&0.6);
    group.unbind(&5);
    sampler.tick(&0.6);
    sampler.tick(&0.6);
    assert!(log.borrow().is_empty());
    assert!(!sampler.is_active());
}

#[test]
fn stop_twice_is_silent() {
    let seen = Rc::new(RefCell::new(0_u32));
    let counter = seen.clone();
    let config = scenario_config(Redetect::LEFT_SCREEN);
    let mut sampler = Sampler::start(&config, move |_: ImpressionState| {
        *counter.borrow_mut() += 1;
    })
    .unwrap();
    sampler.tick(&1.0);
    sampler.stop();
    sampler.stop();
    for _ in 0..8 {
        sampler.tick(&1.0);
    }
    sampler.handle_event(HostEvent::EnteredBackground);
    assert_eq!(*seen.borrow(), 0);
}

#[test]
fn tracker_drives_group_members_from_frames() {
    let (group, log) = group_with(&scenario_config(Redetect::LEFT_SCREEN));
    let mut tracker = ImpressionTracker::<u32>::new();
    tracker.detect_impression_in_group(10, &group, 0);
    tracker.detect_impression_in_group(11, &group, 1);

    let viewport = Rect::new(0.0, 0.0, 100.0, 100.0);
    let scroll = RefCell::new(0.0);
    let frame = |element: &u32| {
        // Rows are 100 tall and stacked; element 10 is row 0, 11 is row 1.
        let top = f64::from(*element - 10) * 100.0 - *scroll.borrow();
        let probe = FrameProbe::new(Rect::new(0.0, top, 100.0, top + 100.0), viewport);
        understory_impression::VisibilityProbe::area_ratio(&probe)
    };

    for step in 0..=4 {
        tracker.advance(Duration::from_millis(250 * step), &frame);
    }
    assert_eq!(
        &*log.borrow(),
        &[(0, ImpressionState::Impressed { area_ratio: 1.0 })]
    );

    // Scroll so row 0 is 30% visible and row 1 is 70% visible.
    *scroll.borrow_mut() = 70.0;
    for step in 5..=8 {
        tracker.advance(Duration::from_millis(250 * step), &frame);
    }
    let log = log.borrow();
    assert_eq!(log.len(), 3);
    assert_eq!(
        log[1],
        (
            0,
            ImpressionState::NotImpressed {
                reason: LossReason::LeftScreen
            }
        )
    );
    assert_eq!(log[2].0, 1);
    assert!(log[2].1.is_impressed());
}

#[test]
fn tracker_prunes_samplers_orphaned_by_their_group() {
    let (group, _) = group_with(&scenario_config(Redetect::empty()));
    let mut tracker = ImpressionTracker::<u32>::new();
    tracker.detect_impression_in_group(1, &group, 7);
    assert!(group.is_bound(&7));
    tracker.advance(Duration::ZERO, &|_: &u32| Some(1.0));

    group.unbind(&7);
    tracker.advance(Duration::from_millis(250), &|_: &u32| Some(1.0));
    assert!(tracker.is_empty());
}

#[test]
fn background_with_policy_drops_and_regains_impression() {
    let config = scenario_config(Redetect::ENTERED_BACKGROUND | Redetect::RESIGNED_ACTIVE)
        .with_duration_threshold(Duration::from_millis(500));
    let (group, log) = group_with(&config);
    let mut tracker = ImpressionTracker::<u32>::new();
    tracker.detect_impression_in_group(1, &group, 3);

    let visible = |_: &u32| Some(1.0);
    tracker.advance(Duration::ZERO, &visible);
    tracker.advance(Duration::from_millis(250), &visible);
    tracker.advance(Duration::from_millis(500), &visible);
    tracker.handle_event(HostEvent::ResignedActive);
    tracker.handle_event(HostEvent::EnteredBackground);
    // Suspended: ticks do not accumulate.
    tracker.advance(Duration::from_millis(750), &visible);
    tracker.advance(Duration::from_millis(1000), &visible);
    tracker.handle_event(HostEvent::EnteredForeground);
    tracker.handle_event(HostEvent::BecameActive);
    tracker.advance(Duration::from_millis(1250), &visible);
    tracker.advance(Duration::from_millis(1500), &visible);

    assert_eq!(
        &*log.borrow(),
        &[
            (3, ImpressionState::Impressed { area_ratio: 1.0 }),
            (
                3,
                ImpressionState::NotImpressed {
                    reason: LossReason::ResignedActive
                }
            ),
            (3, ImpressionState::Impressed { area_ratio: 1.0 }),
        ]
    );
}

#[test]
fn tracker_never_credits_time_before_a_late_attach() {
    let (group, log) = group_with(
        &scenario_config(Redetect::empty()).with_duration_threshold(Duration::from_millis(250)),
    );
    let mut tracker = ImpressionTracker::<u32>::new();
    let visible = |_: &u32| Some(1.0);
    tracker.advance(Duration::ZERO, &visible);

    tracker.detect_impression_in_group(1, &group, 0);
    tracker.advance(Duration::from_millis(10_010), &visible);
    assert!(log.borrow().is_empty());
    tracker.advance(Duration::from_millis(10_260), &visible);
    assert_eq!(
        &*log.borrow(),
        &[(0, ImpressionState::Impressed { area_ratio: 1.0 })]
    );
}

#[test]
fn default_config_impresses_as_soon_as_area_threshold_is_met() {
    let (group, log) = group_with(&ImpressionConfig::new());
    let mut sampler = group.bind(2);
    sampler.tick(&0.3);
    assert!(log.borrow().is_empty());
    sampler.tick(&0.5);
    assert_eq!(
        &*log.borrow(),
        &[(2, ImpressionState::Impressed { area_ratio: 0.5 })]
    );
}

#[test]
fn panicking_observer_does_not_prevent_stop() {
    let mut sampler = Sampler::start(
        &scenario_config(Redetect::empty()).with_duration_threshold(Duration::from_millis(250)),
        |_: ImpressionState| panic!("observer fault"),
    )
    .unwrap();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sampler.tick(&1.0)));
    assert!(result.is_err());
    assert!(sampler.state().is_impressed());
    sampler.stop();
    sampler.stop();
    assert!(!sampler.is_active());
}
