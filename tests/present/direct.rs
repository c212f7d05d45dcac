//! Direct scanout tests
//!
//! Layers handed straight to host planes, with and without black backing.

use insta::assert_snapshot;
use scanout_core::backend::headless::{HeadlessFb, SurfaceOp};
use scanout_core::backend::transport::Transport;
use scanout_core::testing::Fixture;
use scanout_core::BackendConnector;

use super::{cleared_overlay, layer_fb, render_ops};

/// Test that an opaque screen-size base layer takes the root plane directly
#[test]
fn test_opaque_screen_layer_has_no_backing() {
    let fixture = Fixture::new();
    let connector = fixture.connector().expect("connector");
    fixture.take_ops();

    let base = fixture.screen_layer(false);
    let base_fb = layer_fb(&base);
    let frame = fixture.frame(vec![base]);
    fixture.present(&connector, &frame).expect("present");

    let ops = fixture.take_ops();
    assert_snapshot!(render_ops(&ops[0], &[(base_fb, "base")]), @r"
    PresentationFeedback
    Viewport 1280x720+0+0 -> 1280x720
    Attach(base)
    DamageAll
    Opaque(true)
    BufferScale(1)
    Commit
    ");
    for overlay in &ops[1..] {
        assert_eq!(overlay, &cleared_overlay());
    }
    assert_eq!(fixture.renderer.composite_count(), 0);
    assert_eq!(fixture.vblank.was_compositing(), vec![false]);
}

/// Test that a translucent base layer is pushed up one plane above black backing
#[test]
fn test_translucent_base_gets_backing() {
    let fixture = Fixture::new();
    let connector = fixture.connector().expect("connector");
    fixture.take_ops();

    let black = fixture.transport().black_fb().expect("black fb");
    let black_id = HeadlessFb::id_of(&black).expect("headless fb");
    let base = fixture.screen_layer(true);
    let base_fb = layer_fb(&base);
    let frame = fixture.frame(vec![base]);
    fixture.present(&connector, &frame).expect("present");

    let ops = fixture.take_ops();
    let names = [(black_id, "black"), (base_fb, "base")];
    assert_snapshot!(render_ops(&ops[0], &names), @r"
    PresentationFeedback
    Viewport 1x1+0+0 -> 1280x720
    Attach(black)
    DamageAll
    Opaque(true)
    BufferScale(1)
    Commit
    ");
    assert_snapshot!(render_ops(&ops[1], &names), @r"
    Viewport 1280x720+0+0 -> 1280x720
    Position(0, 0)
    Attach(base)
    DamageAll
    Opaque(true)
    BufferScale(1)
    Commit
    ");
    for overlay in &ops[2..] {
        assert_eq!(overlay, &cleared_overlay());
    }
}

/// Test that a faded base layer with an opaque texture still gets backing
#[test]
fn test_faded_base_gets_backing() {
    let fixture = Fixture::new();
    let connector = fixture.connector().expect("connector");
    fixture.take_ops();

    let black = fixture.transport().black_fb().expect("black fb");
    let black_id = HeadlessFb::id_of(&black).expect("headless fb");
    let mut base = fixture.screen_layer(false);
    base.opacity = 0.5;
    let base_fb = layer_fb(&base);
    fixture
        .present(&connector, &fixture.frame(vec![base]))
        .expect("present");

    let ops = fixture.take_ops();
    let names = [(black_id, "black"), (base_fb, "base")];
    assert_snapshot!(render_ops(&ops[0], &names), @r"
    PresentationFeedback
    Viewport 1x1+0+0 -> 1280x720
    Attach(black)
    DamageAll
    Opaque(true)
    BufferScale(1)
    Commit
    ");
    assert_snapshot!(render_ops(&ops[1], &names), @r"
    Viewport 1280x720+0+0 -> 1280x720
    Position(0, 0)
    Attach(base)
    DamageAll
    Opaque(true)
    BufferScale(1)
    Commit
    ");
}

/// Test that a frame without layers still shows black backing
#[test]
fn test_empty_frame_shows_backing() {
    let fixture = Fixture::new();
    let connector = fixture.connector().expect("connector");
    fixture.take_ops();

    fixture
        .present(&connector, &fixture.frame(Vec::new()))
        .expect("present");

    let black = fixture.transport().black_fb().expect("black fb");
    let black_id = HeadlessFb::id_of(&black);
    let ops = fixture.take_ops();
    assert!(ops[0].contains(&SurfaceOp::Attach(black_id)));
    for overlay in &ops[1..] {
        assert_eq!(overlay, &cleared_overlay());
    }
}

/// Test that a smaller base layer does not count as covering the output
#[test]
fn test_small_base_layer_gets_backing() {
    let fixture = Fixture::new();
    let connector = fixture.connector().expect("connector");
    fixture.take_ops();

    let base = Fixture::layer(640, 360, false);
    let base_fb = layer_fb(&base);
    fixture
        .present(&connector, &fixture.frame(vec![base]))
        .expect("present");

    let ops = fixture.take_ops();
    assert!(!ops[0].contains(&SurfaceOp::Attach(Some(base_fb))));
    assert!(ops[1].contains(&SurfaceOp::Attach(Some(base_fb))));
}

/// Test that overlay layers land on consecutive planes and are positioned
#[test]
fn test_overlay_layers_fill_planes_in_order() {
    let fixture = Fixture::new();
    let connector = fixture.connector().expect("connector");
    fixture.take_ops();

    let base = fixture.screen_layer(false);
    let mut cursor = Fixture::layer(64, 64, true);
    cursor.zpos = 2;
    cursor.offset = (-100.0, -50.0);
    let base_fb = layer_fb(&base);
    let cursor_fb = layer_fb(&cursor);
    fixture
        .present(&connector, &fixture.frame(vec![base, cursor]))
        .expect("present");

    let ops = fixture.take_ops();
    assert!(ops[0].contains(&SurfaceOp::Attach(Some(base_fb))));
    assert_snapshot!(render_ops(&ops[1], &[(cursor_fb, "cursor")]), @r"
    Viewport 64x64+0+0 -> 64x64
    Position(100, 50)
    Attach(cursor)
    DamageAll
    Opaque(false)
    BufferScale(1)
    Commit
    ");
    for overlay in &ops[2..] {
        assert_eq!(overlay, &cleared_overlay());
    }
}

/// Test that an overlay pushed past the output edge leaves its plane empty
#[test]
fn test_offscreen_overlay_is_cleared() {
    let fixture = Fixture::new();
    let connector = fixture.connector().expect("connector");
    fixture.take_ops();

    let mut cursor = Fixture::layer(64, 64, true);
    cursor.zpos = 2;
    cursor.offset = (-1280.0, 0.0);
    fixture
        .present(&connector, &fixture.frame(vec![fixture.screen_layer(false), cursor]))
        .expect("present");

    let ops = fixture.take_ops();
    assert_eq!(ops[1], cleared_overlay());
    assert!(connector.plane_shared(1).expect("plane").current_state().is_none());
}

/// Test that the current plane state is kept for input mapping
#[test]
fn test_current_state_tracks_presented_layer() {
    let fixture = Fixture::new();
    let connector = fixture.connector().expect("connector");

    let mut overlay = Fixture::layer(320, 240, true);
    overlay.zpos = 1;
    overlay.offset = (-640.0, -360.0);
    fixture
        .present(&connector, &fixture.frame(vec![fixture.screen_layer(false), overlay]))
        .expect("present");

    let plane = connector.plane_shared(1).expect("plane");
    let state = plane.current_state().expect("plane shows a layer");
    assert_eq!((state.dest_x, state.dest_y), (640, 360));
    assert_eq!((state.dst_w, state.dst_h), (320, 240));

    // Surface-local (0, 0) on the overlay maps to the output center
    let (x, y) = plane.surface_to_output(0.0, 0.0).expect("mapped");
    assert!((x - 0.5).abs() < 1e-9);
    assert!((y - 0.5).abs() < 1e-9);

    assert!(connector.plane_shared(2).expect("plane").current_state().is_none());
}

/// Test that an invisible connector presents nothing on every plane
#[test]
fn test_invisible_connector_clears_all_planes() {
    let fixture = Fixture::new();
    let connector = fixture.connector().expect("connector");
    fixture
        .present(&connector, &fixture.frame(vec![fixture.screen_layer(false)]))
        .expect("present");
    fixture.take_ops();

    connector.set_visible(false);
    assert!(!connector.is_visible());
    // Visibility changes request a repaint
    assert!(fixture.dispatch());

    let flushes = fixture.transport().flush_count();
    fixture
        .present(&connector, &fixture.frame(vec![fixture.screen_layer(false)]))
        .expect("present while invisible");

    let ops = fixture.take_ops();
    assert_eq!(ops.len(), 8);
    for plane in &ops {
        assert_eq!(plane, &cleared_overlay());
    }
    assert_eq!(fixture.transport().flush_count(), flushes + 1);
    assert_eq!(fixture.renderer.composite_count(), 0);
}

/// Test that setting the same visibility twice does not repaint
#[test]
fn test_visibility_unchanged_is_noop() {
    let fixture = Fixture::new();
    let connector = fixture.connector().expect("connector");

    connector.set_visible(true);
    assert!(!fixture.dispatch());
}

/// Test that presenting flushes once and records timing
#[test]
fn test_present_flushes_and_records_draw_time() {
    let fixture = Fixture::new();
    let connector = fixture.connector().expect("connector");

    for _ in 0..3 {
        fixture
            .present(&connector, &fixture.frame(vec![fixture.screen_layer(false)]))
            .expect("present");
    }

    assert_eq!(fixture.transport().flush_count(), 3);
    assert_eq!(fixture.vblank.draw_time_count(), 3);
    assert_eq!(fixture.vblank.was_compositing(), vec![false, false, false]);
}
