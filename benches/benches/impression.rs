// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{
    BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main,
};
use kurbo::Rect;
use std::time::Duration;
use understory_impression::{
    FrameProbe, ImpressionConfig, ImpressionGroup, ImpressionTracker, Redetect, VisibilityProbe,
};

const ROW_HEIGHT: f64 = 40.0;
const VIEWPORT: Rect = Rect::new(0.0, 0.0, 400.0, 800.0);

fn config() -> ImpressionConfig {
    ImpressionConfig::new()
        .with_detection_interval(Duration::from_millis(100))
        .with_duration_threshold(Duration::from_millis(500))
        .with_area_ratio_threshold(0.5)
        .with_redetect(Redetect::LEFT_SCREEN)
}

/// A list of `rows` rows, one tracked element per row.
fn tracked_list(rows: u32) -> (ImpressionTracker<u32>, ImpressionGroup<u32>) {
    let group = ImpressionGroup::new(&config(), |row: &u32, state| {
        black_box((row, state));
    })
    .unwrap();
    let mut tracker = ImpressionTracker::new();
    for row in 0..rows {
        tracker.detect_impression_in_group(row, &group, row);
    }
    (tracker, group)
}

fn row_ratio(row: u32, scroll: f64) -> Option<f64> {
    let top = f64::from(row) * ROW_HEIGHT - scroll;
    FrameProbe::new(Rect::new(0.0, top, 400.0, top + ROW_HEIGHT), VIEWPORT).area_ratio()
}

fn bench_tracker_advance(c: &mut Criterion) {
    let mut group = c.benchmark_group("impression/tracker_advance");

    // Each iteration scrolls half a viewport and advances one tick for every row.
    for rows in [64_u32, 512, 4_096] {
        group.throughput(Throughput::Elements(u64::from(rows)));
        group.bench_with_input(BenchmarkId::new("scrolling_list", rows), &rows, |b, &rows| {
            b.iter_batched(
                || tracked_list(rows),
                |(mut tracker, _group)| {
                    for step in 1..=20_u32 {
                        let scroll = f64::from(step) * 400.0;
                        let lookup = |row: &u32| row_ratio(*row, scroll);
                        tracker.advance(Duration::from_millis(100 * u64::from(step)), &lookup);
                    }
                    black_box(tracker);
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

fn bench_frame_probe(c: &mut Criterion) {
    let mut group = c.benchmark_group("impression/frame_probe");
    for clips in [0_usize, 4, 16] {
        let mut probe = FrameProbe::new(Rect::new(10.0, 10.0, 110.0, 60.0), VIEWPORT);
        for i in 0..clips {
            let inset = i as f64;
            probe = probe.with_clip(Rect::new(inset, inset, 400.0 - inset, 800.0 - inset));
        }
        group.bench_with_input(BenchmarkId::new("clip_chain", clips), &probe, |b, probe| {
            b.iter(|| black_box(probe.area_ratio()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_tracker_advance, bench_frame_probe);
criterion_main!(benches);
