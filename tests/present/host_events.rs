//! Host event tests
//!
//! Presentation feedback, output enter/leave and fractional scale events
//! dispatched through the headless transport.

use std::time::Duration;

use scanout_core::backend::headless::{HeadlessEvent, SurfaceOp};
use scanout_core::backend::transport::ColorSupport;
use scanout_core::testing::Fixture;
use scanout_core::{BackendConnector, Config};

fn presented(refresh_ns: u32) -> HeadlessEvent {
    HeadlessEvent::Presented {
        time: Duration::from_millis(16),
        refresh_ns,
    }
}

/// Test that a fixed refresh interval updates the output refresh rate
#[test]
fn test_presented_with_refresh_interval() {
    let fixture = Fixture::new();
    let connector = fixture.connector().expect("connector");

    fixture.transport().queue_root_event(presented(8_333_333));
    fixture.dispatch();

    assert_eq!(fixture.output.refresh_mhz(), 120_000);
    assert!(!connector.supports_vrr());
    assert_eq!(fixture.vblank.vblanks(), vec![Duration::from_millis(16)]);
    assert_eq!(fixture.vblank.nudge_count(), 1);
}

/// Test that a zero refresh interval marks the host as VRR
#[test]
fn test_presented_without_interval_is_host_vrr() {
    let fixture = Fixture::new();
    let connector = fixture.connector().expect("connector");

    fixture.transport().queue_root_event(presented(0));
    fixture.dispatch();

    assert!(connector.supports_vrr());
    // Adaptive sync is off in the default config
    assert!(!connector.is_vrr_active());
    assert_eq!(fixture.output.refresh_mhz(), 60_000);

    // A later fixed interval turns host VRR back off
    fixture.transport().queue_root_event(presented(16_666_666));
    fixture.dispatch();
    assert!(!connector.supports_vrr());
}

/// Test that VRR is active only with adaptive sync configured
#[test]
fn test_vrr_active_with_adaptive_sync() {
    let mut config = Config::default();
    config.adaptive_sync = true;
    let fixture = Fixture::with_config(config, ColorSupport::default());
    let connector = fixture.connector().expect("connector");
    assert!(!connector.is_vrr_active());

    fixture.transport().queue_root_event(presented(0));
    fixture.dispatch();
    assert!(connector.is_vrr_active());
}

/// Test that a VRR host adopts the fastest output the window overlaps
#[test]
fn test_vrr_refresh_follows_entered_outputs() {
    let fixture = Fixture::new();
    let _connector = fixture.connector().expect("connector");
    let transport = fixture.transport();
    transport.add_output(1, 144_000);
    transport.add_output(2, 165_000);

    transport.queue_root_event(presented(0));
    transport.queue_root_event(HeadlessEvent::Enter(1));
    fixture.dispatch();
    assert_eq!(fixture.output.refresh_mhz(), 144_000);

    transport.queue_root_event(HeadlessEvent::Enter(2));
    fixture.dispatch();
    assert_eq!(fixture.output.refresh_mhz(), 165_000);

    transport.queue_root_event(HeadlessEvent::Leave(2));
    fixture.dispatch();
    assert_eq!(fixture.output.refresh_mhz(), 144_000);

    // Leaving every output keeps the last rate
    transport.queue_root_event(HeadlessEvent::Leave(1));
    fixture.dispatch();
    assert_eq!(fixture.output.refresh_mhz(), 144_000);
}

/// Test that output refresh rates are ignored without host VRR
#[test]
fn test_enter_without_vrr_keeps_refresh() {
    let fixture = Fixture::new();
    let _connector = fixture.connector().expect("connector");
    fixture.transport().add_output(1, 144_000);

    fixture.transport().queue_root_event(HeadlessEvent::Enter(1));
    fixture.dispatch();

    assert_eq!(fixture.output.refresh_mhz(), 60_000);
}

/// Test that discarded frames only nudge the vblank timer
#[test]
fn test_discarded_nudges() {
    let fixture = Fixture::new();
    let _connector = fixture.connector().expect("connector");

    fixture.transport().queue_root_event(HeadlessEvent::Discarded);
    fixture.dispatch();

    assert_eq!(fixture.vblank.nudge_count(), 1);
    assert!(fixture.vblank.vblanks().is_empty());
}

/// Test that the first preferred scale repaints without resizing the output
#[test]
fn test_first_preferred_scale() {
    let fixture = Fixture::new();
    let connector = fixture.connector().expect("connector");

    fixture
        .transport()
        .queue_root_event(HeadlessEvent::PreferredScale(180));
    assert!(fixture.dispatch());
    // The repaint request is consumed
    assert!(!fixture.dispatch());

    assert_eq!(connector.shared().scale(), 180);
    assert_eq!(fixture.output.size(), (1280, 720));
    // 1280 physical pixels at 1.5x round up to 854 logical
    assert_eq!(connector.shared().logical_size(), (854, 480));
}

/// Test that later scale changes rescale the output and the viewport
#[test]
fn test_scale_change_rescales_output() {
    let fixture = Fixture::new();
    let connector = fixture.connector().expect("connector");
    let transport = fixture.transport();

    transport.queue_root_event(HeadlessEvent::PreferredScale(180));
    transport.queue_root_event(HeadlessEvent::PreferredScale(240));
    fixture.dispatch();

    // 1280x720 scaled by 240/180
    assert_eq!(fixture.output.size(), (1706, 960));
    fixture.take_ops();

    let base = Fixture::layer(1706, 960, false);
    fixture
        .present(&connector, &fixture.frame(vec![base]))
        .expect("present");

    let ops = fixture.take_ops();
    let viewport = ops[0]
        .iter()
        .find_map(|op| match op {
            SurfaceOp::Viewport { dst, .. } => Some(*dst),
            _ => None,
        })
        .expect("root viewport");
    assert_eq!(viewport, (853, 480));
}

/// Test that overlays ignore preferred scale events
#[test]
fn test_overlay_scale_event_ignored() {
    let fixture = Fixture::new();
    let connector = fixture.connector().expect("connector");

    fixture
        .transport()
        .queue_event(3, HeadlessEvent::PreferredScale(240));
    assert!(!fixture.dispatch());
    assert_eq!(connector.shared().scale(), 120);
}

/// Test that events for destroyed connectors are dropped
#[test]
fn test_event_after_connector_dropped() {
    let fixture = Fixture::new();
    let connector = fixture.connector().expect("connector");
    drop(connector);

    fixture.transport().queue_event(0, presented(8_333_333));
    assert!(!fixture.dispatch());
    assert_eq!(fixture.output.refresh_mhz(), 60_000);
    assert!(fixture.vblank.vblanks().is_empty());
}
