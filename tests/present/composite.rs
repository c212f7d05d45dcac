//! GPU composite path tests

use insta::assert_snapshot;
use scanout_core::backend::transport::ColorSupport;
use scanout_core::color::Colorspace;
use scanout_core::testing::Fixture;
use scanout_core::{Config, PresentError};

use super::{cleared_overlay, render_ops};

fn forced_composite() -> Fixture {
    let mut config = Config::default();
    config.composite.force = true;
    Fixture::with_config(config, ColorSupport::default())
}

/// Test that a forced composite shows the output image on the root only
#[test]
fn test_forced_composite_uses_output_image() {
    let fixture = forced_composite();
    let connector = fixture.connector().expect("connector");
    fixture.take_ops();

    let mut overlay = Fixture::layer(64, 64, true);
    overlay.zpos = 1;
    let frame = fixture.frame(vec![fixture.screen_layer(false), overlay]);
    fixture.present(&connector, &frame).expect("present");

    let output_fb = fixture.renderer.output_fb_id().expect("output image fb");
    let ops = fixture.take_ops();
    assert_snapshot!(render_ops(&ops[0], &[(output_fb, "composite")]), @r"
    PresentationFeedback
    Viewport 1280x720+0+0 -> 1280x720
    Attach(composite)
    DamageAll
    Opaque(true)
    BufferScale(1)
    Commit
    ");
    for overlay in &ops[1..] {
        assert_eq!(overlay, &cleared_overlay());
    }

    assert_eq!(fixture.renderer.composite_count(), 1);
    // Presentation waits on the sequence point of the composite
    assert_eq!(fixture.renderer.waits(), vec![1]);
    assert_eq!(fixture.vblank.was_compositing(), vec![true]);
}

/// Test that a frame effect forces composite without any config switch
#[test]
fn test_effect_forces_composite() {
    let fixture = Fixture::new();
    let connector = fixture.connector().expect("connector");

    let mut frame = fixture.frame(vec![fixture.screen_layer(false)]);
    fixture.present(&connector, &frame).expect("direct present");
    assert_eq!(fixture.renderer.composite_count(), 0);

    frame.effects.fading_out = true;
    fixture.present(&connector, &frame).expect("composite present");
    assert_eq!(fixture.renderer.composite_count(), 1);
    assert_eq!(fixture.vblank.was_compositing(), vec![false, true]);
}

/// Test that HDR content composites when the host has no color management
#[test]
fn test_hdr_layer_composites_without_color_management() {
    let fixture = Fixture::new();
    let connector = fixture.connector().expect("connector");

    let mut base = fixture.screen_layer(false);
    base.colorspace = Colorspace::Hdr10Pq;
    fixture
        .present(&connector, &fixture.frame(vec![base]))
        .expect("present");

    assert_eq!(fixture.renderer.composite_count(), 1);
}

/// Test that a failed composite reports an error and commits nothing
#[test]
fn test_composite_failure() {
    let fixture = forced_composite();
    let connector = fixture.connector().expect("connector");
    fixture.take_ops();
    fixture.renderer.set_failing(true);

    let frame = fixture.frame(vec![fixture.screen_layer(false)]);
    let err = fixture
        .present(&connector, &frame)
        .expect_err("composite should fail");

    assert!(matches!(err, PresentError::CompositeFailed));
    assert_eq!(err.code(), -libc::EINVAL);
    assert_eq!(err.to_string(), "vulkan_composite failed");
    assert!(fixture.take_ops().iter().all(|ops| ops.is_empty()));
    assert_eq!(fixture.transport().flush_count(), 0);
    assert!(fixture.renderer.waits().is_empty());

    // Recovers once the compositor works again
    fixture.renderer.set_failing(false);
    fixture.present(&connector, &frame).expect("present");
    assert_eq!(fixture.transport().flush_count(), 1);
}

/// Test that the HDR output encoding tags the composite image as PQ
#[test]
fn test_pq_output_encoding_tags_composite() {
    let fixture = Fixture::with_config(
        {
            let mut config = Config::default();
            config.composite.force = true;
            config
        },
        ColorSupport {
            wp: true,
            frog: false,
        },
    );
    let connector = fixture.connector().expect("connector");
    fixture.take_ops();

    let mut frame = fixture.frame(vec![fixture.screen_layer(false)]);
    frame.output_encoding_eotf = scanout_core::color::Eotf::Pq;
    fixture.present(&connector, &frame).expect("present");

    let plane = connector.plane_shared(0).expect("root");
    let state = plane.current_state().expect("composite shown");
    assert_eq!(state.colorspace, Colorspace::Hdr10Pq);
}
