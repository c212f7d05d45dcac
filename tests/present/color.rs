//! Color management tests
//!
//! Per-plane color descriptions and the host's preferred HDR parameters.

use scanout_core::backend::headless::{HeadlessEvent, SurfaceOp};
use scanout_core::backend::transport::ColorSupport;
use scanout_core::color::{
    self, ColorDescription, Colorspace, DisplayColorimetry, Eotf, FrogPreferredMetadata,
    FrogTransferFunction, NamedPrimaries, PrimariesSpec,
};
use scanout_core::testing::Fixture;
use scanout_core::{BackendConnector, Config};

fn hdr_config() -> Config {
    let mut config = Config::default();
    config.hdr.enabled = true;
    config
}

fn assert_close(a: (f32, f32), b: (f32, f32)) {
    assert!(
        (a.0 - b.0).abs() < 1e-4 && (a.1 - b.1).abs() < 1e-4,
        "{:?} != {:?}",
        a,
        b
    );
}

/// Test that every plane gets a description when the host is color managed
#[test]
fn test_wp_descriptions_per_plane() {
    let fixture = Fixture::with_config(
        Config::default(),
        ColorSupport {
            wp: true,
            frog: false,
        },
    );
    let connector = fixture.connector().expect("connector");
    fixture.take_ops();

    let mut base = fixture.screen_layer(false);
    base.colorspace = Colorspace::Hdr10Pq;
    let mut overlay = Fixture::layer(64, 64, true);
    overlay.zpos = 1;
    overlay.colorspace = Colorspace::Srgb;
    fixture
        .present(&connector, &fixture.frame(vec![base, overlay]))
        .expect("present");

    // HDR content goes straight to the host when it can describe it
    assert_eq!(fixture.renderer.composite_count(), 0);

    let ops = fixture.take_ops();
    let hdr10 = ColorDescription::Hdr10 {
        primaries: PrimariesSpec::Named(NamedPrimaries::Bt2020),
        mastering: None,
    };
    assert_eq!(ops[0][1], SurfaceOp::ColorDescription(Some(hdr10)));
    // Untagged content clears the description
    assert_eq!(ops[1][0], SurfaceOp::ColorDescription(None));
}

/// Test that scRGB content is described as Windows scRGB
#[test]
fn test_scrgb_description() {
    let fixture = Fixture::with_config(
        Config::default(),
        ColorSupport {
            wp: true,
            frog: false,
        },
    );
    let connector = fixture.connector().expect("connector");
    fixture.take_ops();

    let mut base = fixture.screen_layer(false);
    base.colorspace = Colorspace::Scrgb;
    fixture
        .present(&connector, &fixture.frame(vec![base]))
        .expect("present");

    let ops = fixture.take_ops();
    assert!(ops[0].contains(&SurfaceOp::ColorDescription(Some(
        ColorDescription::WindowsScrgb
    ))));
}

/// Test that frog-only hosts get a primaries and transfer function pair
#[test]
fn test_frog_color_per_plane() {
    let fixture = Fixture::with_config(
        Config::default(),
        ColorSupport {
            wp: false,
            frog: true,
        },
    );
    let connector = fixture.connector().expect("connector");
    fixture.take_ops();

    let mut base = fixture.screen_layer(false);
    base.colorspace = Colorspace::Hdr10Pq;
    fixture
        .present(&connector, &fixture.frame(vec![base]))
        .expect("present");

    let (primaries, transfer) = color::frog_color(Colorspace::Hdr10Pq);
    let ops = fixture.take_ops();
    assert!(ops[0].contains(&SurfaceOp::FrogColor(primaries, transfer)));
    assert!(!ops[0]
        .iter()
        .any(|op| matches!(op, SurfaceOp::ColorDescription(_))));
}

/// Test that without color support no color requests are made
#[test]
fn test_no_color_requests_without_support() {
    let fixture = Fixture::new();
    let connector = fixture.connector().expect("connector");
    fixture.take_ops();

    fixture
        .present(&connector, &fixture.frame(vec![fixture.screen_layer(false)]))
        .expect("present");

    for ops in fixture.take_ops() {
        assert!(!ops.iter().any(|op| matches!(
            op,
            SurfaceOp::ColorDescription(_) | SurfaceOp::FrogColor(..)
        )));
    }
}

/// Test that a PQ preference exposes HDR only when HDR is enabled
#[test]
fn test_preferred_transfer() {
    for (hdr_enabled, expect_hdr) in [(true, true), (false, false)] {
        let mut config = hdr_config();
        config.hdr.enabled = hdr_enabled;
        let fixture = Fixture::with_config(config, ColorSupport::default());
        let connector = fixture.connector().expect("connector");

        fixture
            .transport()
            .queue_root_event(HeadlessEvent::PreferredTransfer { is_pq: true });
        fixture.dispatch();

        let hdr = connector.hdr_info();
        assert_eq!(hdr.expose_hdr_support, expect_hdr);
        assert_eq!(hdr.output_encoding_eotf, Eotf::Pq);
        assert_eq!(hdr.is_hdr10(), expect_hdr);
    }
}

/// Test that target primaries and light levels reach the connector
#[test]
fn test_target_primaries_and_light_levels() {
    let fixture = Fixture::with_config(hdr_config(), ColorSupport::default());
    let connector = fixture.connector().expect("connector");
    let transport = fixture.transport();

    transport.queue_root_event(HeadlessEvent::TargetPrimaries([
        7080, 2920, 1700, 7970, 1310, 460, 3127, 3290,
    ]));
    transport.queue_root_event(HeadlessEvent::TargetMaxCll(1000));
    transport.queue_root_event(HeadlessEvent::TargetMaxFall(70_000));
    transport.queue_root_event(HeadlessEvent::PreferredTransfer { is_pq: true });
    fixture.dispatch();

    let hdr = connector.hdr_info();
    assert_eq!(hdr.max_cll, 1000);
    // Clamped to the infoframe field
    assert_eq!(hdr.max_fall, u16::MAX);

    let native = connector.native_colorimetry(true);
    for (got, want) in native
        .display
        .primaries
        .iter()
        .zip(DisplayColorimetry::BT2020.primaries.iter())
    {
        assert_close(*got, *want);
    }
    assert_close(native.display.white, DisplayColorimetry::BT2020.white);
    assert_eq!(native.output_encoding_eotf, Eotf::Pq);

    // SDR queries keep the display primaries and gamma 2.2
    let sdr = connector.native_colorimetry(false);
    assert_eq!(sdr.output_encoding_eotf, Eotf::Gamma22);
}

/// Test that frog preferred metadata sets primaries and luminance at once
#[test]
fn test_frog_preferred_metadata() {
    let fixture = Fixture::with_config(hdr_config(), ColorSupport::default());
    let connector = fixture.connector().expect("connector");

    fixture
        .transport()
        .queue_root_event(HeadlessEvent::FrogPreferredMetadata(FrogPreferredMetadata {
            transfer_function: FrogTransferFunction::St2084Pq,
            primaries: [32000, 16500, 15000, 30000, 7500, 3000, 15635, 16450],
            max_luminance: 800,
            min_luminance: 5,
            max_full_frame_luminance: 400,
        }));
    fixture.dispatch();

    let hdr = connector.hdr_info();
    assert!(hdr.is_hdr10());
    assert_eq!(hdr.max_cll, 800);
    assert_eq!(hdr.min_cll, 5);
    assert_eq!(hdr.max_fall, 400);

    let display = connector.native_colorimetry(false).display;
    assert_close(display.primaries[0], (0.64, 0.33));
    assert_close(display.white, (0.3127, 0.329));
}

/// Test that the color state defaults to an SDR BT.709 display
#[test]
fn test_default_colorimetry() {
    let fixture = Fixture::new();
    let connector = fixture.connector().expect("connector");

    let native = connector.native_colorimetry(true);
    assert_eq!(native.display, DisplayColorimetry::BT709);
    assert_eq!(native.output_encoding_eotf, Eotf::Gamma22);
    assert!(!connector.hdr_info().is_hdr10());
}
