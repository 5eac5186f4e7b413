// tests/test_hdr_merge.rs — Integration tests for the HDR merge stage.
//
// Drives HdrMerge through the public ProcessingBlock surface only.

use std::sync::Arc;

use hdr_merge::frame::{
    depth_frame, infrared_frame, Extension, Frame, FrameUnit, Frameset, HeapAllocator,
    MetadataKind,
};
use hdr_merge::hdr::{select, select_with_ir, IrWindow};
use hdr_merge::source::SyntheticHdrSource;
use hdr_merge::{HdrConfig, HdrMerge, ProcessingBlock, SourceConfig};
use proptest::prelude::*;

fn meta(counter: i64, seq: i64) -> Vec<(MetadataKind, i64)> {
    vec![
        (MetadataKind::FrameCounter, counter),
        (MetadataKind::SubpresetSequenceId, seq),
        (MetadataKind::SubpresetSequenceSize, 2),
    ]
}

fn depth_set(w: u32, h: u32, counter: i64, seq: i64, depth: &[u16]) -> FrameUnit {
    FrameUnit::Set(Frameset::new(depth_frame(w, h, depth, &meta(counter, seq)), None))
}

fn ir_set(counter: i64, seq: i64, depth: &[u16], ir: &[u8]) -> FrameUnit {
    let w = depth.len() as u32;
    let m = meta(counter, seq);
    FrameUnit::Set(Frameset::new(
        depth_frame(w, 1, depth, &m),
        Some(infrared_frame(w, 1, ir, &m)),
    ))
}

fn samples(unit: &FrameUnit) -> Vec<u16> {
    let frame: &Frame = unit.primary().expect("unit has a depth frame");
    frame.as_depth().unwrap().samples().collect()
}

fn stage_with_window(low: u8, high: u8) -> HdrMerge {
    HdrMerge::from_config(&HdrConfig {
        ir_under_saturated: low,
        ir_over_saturated: high,
        ..HdrConfig::default()
    })
}

// ===== Eligibility =====

#[test]
fn only_sequence_tagged_framesets_are_processed() {
    let stage = HdrMerge::new();
    assert!(stage.should_process(&depth_set(1, 1, 0, 0, &[1])));

    let single = FrameUnit::Single(depth_frame(1, 1, &[1], &meta(0, 0)));
    assert!(!stage.should_process(&single));

    let mut bad_size = meta(0, 0);
    bad_size[2] = (MetadataKind::SubpresetSequenceSize, 4);
    let unit = FrameUnit::Set(Frameset::new(depth_frame(1, 1, &[1], &bad_size), None));
    assert!(!stage.should_process(&unit));
}

#[test]
fn ineligible_units_pass_through_invoke() {
    let mut stage = HdrMerge::new();
    let alloc = HeapAllocator::new();
    let single = FrameUnit::Single(depth_frame(2, 1, &[4, 2], &meta(5, 0)));
    let out = stage.invoke(&alloc, single);
    assert!(!out.is_frameset());
    assert_eq!(samples(&out), vec![4, 2]);
    assert_eq!(stage.pending(), 0);
    assert_eq!(stage.stats().frames_in, 0);
}

// ===== Pairing & merge =====

#[test]
fn worked_example_without_infrared() {
    let mut stage = HdrMerge::new();
    let alloc = HeapAllocator::new();
    stage.invoke(&alloc, depth_set(4, 1, 10, 0, &[0, 5, 0, 7]));
    let out = stage.invoke(&alloc, depth_set(4, 1, 11, 1, &[3, 0, 6, 0]));

    assert_eq!(samples(&out), vec![3, 5, 6, 7]);
    let merged = out.primary().unwrap();
    assert_eq!(merged.frame_counter(), Some(10));
    assert_eq!((merged.width(), merged.height()), (4, 1));
}

#[test]
fn worked_example_with_infrared() {
    let mut stage = stage_with_window(30, 220);
    let alloc = HeapAllocator::new();
    stage.invoke(&alloc, ir_set(10, 0, &[9, 5, 0, 7], &[10, 200, 10, 50]));
    let out = stage.invoke(&alloc, ir_set(11, 1, &[3, 4, 6, 0], &[100, 100, 100, 100]));

    assert_eq!(samples(&out), vec![3, 5, 6, 7]);
    assert_eq!(stage.stats().merged_with_ir, 1);
}

#[test]
fn misaligned_infrared_falls_back_to_depth_only() {
    let mut stage = stage_with_window(30, 220);
    let alloc = HeapAllocator::new();

    // IR of the second exposure is one capture late
    let d1 = depth_frame(2, 1, &[3, 4], &meta(11, 1));
    let ir1 = infrared_frame(2, 1, &[100, 100], &meta(12, 1));
    stage.invoke(&alloc, ir_set(10, 0, &[9, 0], &[0, 0]));
    let out = stage.invoke(&alloc, FrameUnit::Set(Frameset::new(d1, Some(ir1))));

    // IR would have rejected 9; depth-only keeps it
    assert_eq!(samples(&out), vec![9, 4]);
    let stats = stage.stats();
    assert_eq!(stats.merged, 1);
    assert_eq!(stats.merged_with_ir, 0);
}

#[test]
fn id_one_first_is_dropped() {
    let mut stage = HdrMerge::new();
    let alloc = HeapAllocator::new();
    let out = stage.invoke(&alloc, depth_set(1, 1, 11, 1, &[3]));
    assert!(out.is_frameset());
    assert_eq!(stage.pending(), 0);
    assert_eq!(stage.stats().dropped, 1);
}

#[test]
fn counter_gap_rejects_pair_and_restarts_from_id_zero() {
    let mut stage = HdrMerge::new();
    let alloc = HeapAllocator::new();
    stage.invoke(&alloc, depth_set(1, 1, 10, 0, &[1]));
    let out = stage.invoke(&alloc, depth_set(1, 1, 12, 1, &[2]));
    assert!(out.is_frameset());
    assert_eq!(stage.pending(), 0);

    stage.invoke(&alloc, depth_set(1, 1, 13, 0, &[0]));
    let out = stage.invoke(&alloc, depth_set(1, 1, 14, 1, &[8]));
    assert_eq!(samples(&out), vec![8]);
}

#[test]
fn depth_resolution_mismatch_rejects_pair() {
    let mut stage = HdrMerge::new();
    let alloc = HeapAllocator::new();
    stage.invoke(&alloc, depth_set(2, 1, 10, 0, &[1, 1]));
    let out = stage.invoke(&alloc, depth_set(1, 2, 11, 1, &[2, 2]));
    assert!(out.is_frameset());
    assert_eq!(stage.stats().rejected, 1);
}

#[test]
fn depth_not_tagged_as_depth_rejects_pair() {
    let mut stage = HdrMerge::new();
    let alloc = HeapAllocator::new();

    // Z16 samples, but the frames were never tagged as depth frames
    let untagged = |counter, seq| {
        let mut frame = depth_frame(2, 1, &[1, 2], &meta(counter, seq));
        Arc::make_mut(&mut frame.meta).extension = Extension::VideoFrame;
        FrameUnit::Set(Frameset::new(frame, None))
    };
    stage.invoke(&alloc, untagged(10, 0));
    let out = stage.invoke(&alloc, untagged(11, 1));

    assert!(out.is_frameset());
    let stats = stage.stats();
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.alloc_failures, 0);
    assert_eq!(stats.merged, 0);
    assert_eq!(stage.pending(), 0);
}

// ===== Cache & eviction =====

#[test]
fn half_pair_returns_previous_merge() {
    let mut stage = HdrMerge::new();
    let alloc = HeapAllocator::new();
    stage.invoke(&alloc, depth_set(2, 1, 10, 0, &[1, 0]));
    stage.invoke(&alloc, depth_set(2, 1, 11, 1, &[0, 2]));

    let out = stage.invoke(&alloc, depth_set(2, 1, 12, 0, &[9, 9]));
    assert_eq!(samples(&out), vec![1, 2]);
    assert_eq!(out.primary().unwrap().frame_counter(), Some(10));
    assert_eq!(stage.pending(), 1);
}

#[test]
fn counter_regression_evicts_cache() {
    let mut stage = HdrMerge::new();
    let alloc = HeapAllocator::new();
    stage.invoke(&alloc, depth_set(2, 1, 10, 0, &[1, 0]));
    stage.invoke(&alloc, depth_set(2, 1, 11, 1, &[0, 2]));

    // Device restarted: counters begin again
    let out = stage.invoke(&alloc, depth_set(2, 1, 0, 0, &[5, 6]));
    assert!(out.is_frameset());
    assert_eq!(samples(&out), vec![5, 6]);
    assert!(stage.cached().is_none());
    assert_eq!(stage.stats().evicted, 1);
}

#[test]
fn rejected_pair_consults_evictor() {
    let mut stage = HdrMerge::new();
    let alloc = HeapAllocator::new();
    stage.invoke(&alloc, depth_set(2, 1, 10, 0, &[1, 0]));
    stage.invoke(&alloc, depth_set(2, 1, 11, 1, &[0, 2]));

    // Half pair keeps the merge; its partner both breaks adjacency and
    // regresses below the cached counter
    let out = stage.invoke(&alloc, depth_set(2, 1, 12, 0, &[3, 3]));
    assert_eq!(samples(&out), vec![1, 2]);
    let out = stage.invoke(&alloc, depth_set(2, 1, 5, 1, &[4, 4]));

    assert!(out.is_frameset());
    assert_eq!(samples(&out), vec![4, 4]);
    assert!(stage.cached().is_none());
    assert_eq!(stage.pending(), 0);
    let stats = stage.stats();
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.evicted, 1);
}

#[test]
fn unreadable_pair_evicts_on_counter_regression() {
    let mut stage = HdrMerge::new();
    let alloc = HeapAllocator::new();
    stage.invoke(&alloc, depth_set(2, 1, 10, 0, &[1, 0]));
    stage.invoke(&alloc, depth_set(2, 1, 11, 1, &[0, 2]));

    // Partner's buffer is one sample short and its counter went backwards
    let out = stage.invoke(&alloc, depth_set(2, 1, 12, 0, &[5, 5]));
    assert_eq!(samples(&out), vec![1, 2]);
    let out = stage.invoke(&alloc, depth_set(2, 1, 3, 1, &[6]));

    assert!(out.is_frameset());
    assert!(stage.cached().is_none());
    let stats = stage.stats();
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.alloc_failures, 0);
    assert_eq!(stats.evicted, 1);
}

#[test]
fn resolution_change_evicts_cache() {
    let mut stage = HdrMerge::new();
    let alloc = HeapAllocator::new();
    stage.invoke(&alloc, depth_set(2, 1, 10, 0, &[1, 0]));
    stage.invoke(&alloc, depth_set(2, 1, 11, 1, &[0, 2]));

    let out = stage.invoke(&alloc, depth_set(1, 1, 12, 0, &[5]));
    assert!(out.is_frameset());
    assert!(stage.cached().is_none());
}

#[test]
fn new_merge_replaces_cache() {
    let mut stage = HdrMerge::new();
    let alloc = HeapAllocator::new();
    for (base, value) in [(10, 1u16), (12, 2), (14, 3)] {
        stage.invoke(&alloc, depth_set(1, 1, base, 0, &[value]));
        stage.invoke(&alloc, depth_set(1, 1, base + 1, 1, &[0]));
    }
    assert_eq!(stage.cached().unwrap().frame_counter(), Some(14));
    assert_eq!(stage.stats().merged, 3);
}

// ===== Synthetic stream =====

#[test]
fn synthetic_stream_merges_to_full_coverage() {
    let config = SourceConfig {
        width: 16,
        height: 4,
        fps: 30,
        with_infrared: true,
        frame_limit: Some(6),
    };
    let mut stage = HdrMerge::new();
    let alloc = HeapAllocator::new();

    let mut last = None;
    for set in SyntheticHdrSource::new(config) {
        last = Some(stage.invoke(&alloc, FrameUnit::Set(set)));
    }
    let out = last.unwrap();
    let frame = out.primary().unwrap();
    assert_eq!(frame.frame_counter(), Some(4));

    let view = frame.as_depth().unwrap();
    for y in 0..4 {
        for x in 0..16 {
            let i = (y * 16 + x) as usize;
            assert_eq!(view.sample(i), SyntheticHdrSource::scene_depth(x, y));
        }
    }
    assert_eq!(stage.stats().merged_with_ir, 3);
}

// ===== Pixel rules =====

proptest! {
    #[test]
    fn depth_only_rule_prefers_first_exposure(
        pixels in prop::collection::vec((any::<u16>(), any::<u16>()), 1..64)
    ) {
        let d0: Vec<u16> = pixels.iter().map(|p| p.0).collect();
        let d1: Vec<u16> = pixels.iter().map(|p| p.1).collect();
        let w = d0.len() as u32;

        let mut stage = HdrMerge::new();
        let alloc = HeapAllocator::new();
        stage.invoke(&alloc, depth_set(w, 1, 100, 0, &d0));
        let out = stage.invoke(&alloc, depth_set(w, 1, 101, 1, &d1));

        let merged = samples(&out);
        prop_assert_eq!(merged.len(), d0.len());
        for i in 0..d0.len() {
            let expected = if d0[i] != 0 { d0[i] } else if d1[i] != 0 { d1[i] } else { 0 };
            prop_assert_eq!(merged[i], expected);
            prop_assert_eq!(select(d0[i], d1[i]), expected);
        }
    }

    #[test]
    fn ir_rule_requires_sample_inside_window(
        pixels in prop::collection::vec(
            (any::<u16>(), any::<u8>(), any::<u16>(), any::<u8>()), 1..64),
        low in 0u8..128,
        span in 1u8..127,
    ) {
        let high = low + span;
        let window = IrWindow::new(low, high);
        let d0: Vec<u16> = pixels.iter().map(|p| p.0).collect();
        let i0: Vec<u8> = pixels.iter().map(|p| p.1).collect();
        let d1: Vec<u16> = pixels.iter().map(|p| p.2).collect();
        let i1: Vec<u8> = pixels.iter().map(|p| p.3).collect();

        let mut stage = stage_with_window(low, high);
        let alloc = HeapAllocator::new();
        stage.invoke(&alloc, ir_set(50, 0, &d0, &i0));
        let out = stage.invoke(&alloc, ir_set(51, 1, &d1, &i1));

        let merged = samples(&out);
        for i in 0..d0.len() {
            let ok = |v: u8| low < v && v < high;
            let expected = if d0[i] != 0 && ok(i0[i]) {
                d0[i]
            } else if d1[i] != 0 && ok(i1[i]) {
                d1[i]
            } else {
                0
            };
            prop_assert_eq!(merged[i], expected);
            prop_assert_eq!(select_with_ir(d0[i], i0[i], d1[i], i1[i], window), expected);
        }
    }
}
