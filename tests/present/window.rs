//! Window management tests
//!
//! Configure and close events, fullscreen, title, icon, cursor, selections
//! and relative mouse mode as seen by the host.

use std::sync::Arc;

use scanout_core::backend::headless::{HeadlessEvent, SurfaceOp};
use scanout_core::backend::transport::{ColorSupport, Icon, SelectionKind};
use scanout_core::cursor::CursorImage;
use scanout_core::testing::Fixture;
use scanout_core::{BackendConnector, Config};

/// Test the window state requested when a connector is created
#[test]
fn test_initial_window_state() {
    let fixture = Fixture::new();
    let _connector = fixture.connector().expect("connector");

    assert_eq!(
        fixture.transport().ops(0),
        vec![SurfaceOp::Title("gamescope".to_string())]
    );
    for overlay in 1..8 {
        assert!(fixture.transport().ops(overlay).is_empty());
    }
    assert!(fixture.transport().requests().relative_mouse.is_empty());
}

/// Test that the EDID is published once at creation
#[test]
fn test_edid_written_at_creation() {
    let fixture = Fixture::new();
    assert_eq!(fixture.edid.write_count(), 0);

    let connector = fixture.connector().expect("connector");
    assert_eq!(fixture.edid.write_count(), 1);

    let (edid, hdr) = fixture.edid.last().expect("edid");
    assert_eq!(edid, connector.raw_edid());
    assert_eq!(&edid[..8], &[0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00]);
    assert!(!hdr.expose_hdr_support);
}

/// Test that configure resizes the output and commits window geometry
#[test]
fn test_configure_resizes_output() {
    let fixture = Fixture::new();
    let connector = fixture.connector().expect("connector");
    fixture.take_ops();

    fixture.transport().queue_root_event(HeadlessEvent::Configure {
        size: Some((1920, 1080)),
        fullscreen: false,
    });
    assert!(fixture.dispatch());
    assert_eq!(fixture.output.size(), (1920, 1080));

    fixture
        .present(&connector, &fixture.frame(vec![fixture.screen_layer(false)]))
        .expect("present");
    let root = fixture.take_ops().swap_remove(0);
    assert_eq!(
        root[root.len() - 2..],
        [SurfaceOp::CommitWindow(1920, 1080), SurfaceOp::Commit]
    );

    // Only the first frame after a configure commits the window
    fixture
        .present(&connector, &fixture.frame(vec![fixture.screen_layer(false)]))
        .expect("present");
    let root = fixture.take_ops().swap_remove(0);
    assert!(!root.iter().any(|op| matches!(op, SurfaceOp::CommitWindow(..))));
}

/// Test that configure sizes are logical and scaled to physical pixels
#[test]
fn test_configure_with_fractional_scale() {
    let fixture = Fixture::new();
    let _connector = fixture.connector().expect("connector");
    let transport = fixture.transport();

    transport.queue_root_event(HeadlessEvent::PreferredScale(240));
    transport.queue_root_event(HeadlessEvent::Configure {
        size: Some((800, 600)),
        fullscreen: false,
    });
    fixture.dispatch();

    assert_eq!(fixture.output.size(), (1600, 1200));
}

/// Test that configure without a size keeps the current window size
#[test]
fn test_configure_without_size() {
    let fixture = Fixture::new();
    let _connector = fixture.connector().expect("connector");

    for size in [None, Some((0, 0))] {
        fixture
            .transport()
            .queue_root_event(HeadlessEvent::Configure {
                size,
                fullscreen: true,
            });
        fixture.dispatch();
        assert_eq!(fixture.output.size(), (1280, 720));
    }
    assert!(fixture.runtime.is_fullscreen());
}

/// Test that a close event is latched on the connector
#[test]
fn test_close_requested() {
    let fixture = Fixture::new();
    let connector = fixture.connector().expect("connector");
    assert!(!connector.shared().close_requested());

    fixture.transport().queue_root_event(HeadlessEvent::Close);
    fixture.dispatch();

    assert!(connector.shared().close_requested());
}

/// Test that fullscreen startup requests fullscreen on the root surface
#[test]
fn test_fullscreen_at_startup() {
    let mut config = Config::default();
    config.window.fullscreen = true;
    let fixture = Fixture::with_config(config, ColorSupport::default());
    let connector = fixture.connector().expect("connector");

    assert_eq!(
        fixture.transport().ops(0),
        vec![
            SurfaceOp::Fullscreen(true),
            SurfaceOp::Title("gamescope".to_string())
        ]
    );
    assert!(fixture.runtime.is_fullscreen());
    fixture.take_ops();

    // Window geometry follows on the first commit
    fixture
        .present(&connector, &fixture.frame(Vec::new()))
        .expect("present");
    let root = fixture.take_ops().swap_remove(0);
    assert!(root.contains(&SurfaceOp::CommitWindow(1280, 720)));
}

/// Test that toggling fullscreen is applied on the next present
#[test]
fn test_toggle_fullscreen() {
    let fixture = Fixture::new();
    let connector = fixture.connector().expect("connector");
    fixture.take_ops();

    fixture.runtime.toggle_fullscreen();
    fixture
        .present(&connector, &fixture.frame(Vec::new()))
        .expect("present");

    let root = fixture.take_ops().swap_remove(0);
    assert_eq!(root[0], SurfaceOp::Fullscreen(true));
    assert!(fixture.runtime.is_fullscreen());
}

/// Test the title with and without a keyboard grab
#[test]
fn test_title() {
    let fixture = Fixture::new();
    let connector = fixture.connector().expect("connector");
    fixture.take_ops();

    connector.set_title(Some("Half-Life"));
    fixture.runtime.set_grabbed(true);
    connector.set_title(Some("Half-Life"));
    fixture.runtime.set_grabbed(false);
    connector.set_title(None);

    assert_eq!(
        fixture.transport().ops(0),
        vec![
            SurfaceOp::Title("Half-Life".to_string()),
            SurfaceOp::Title("Half-Life (grabbed)".to_string()),
            SurfaceOp::Title("gamescope".to_string()),
        ]
    );
}

/// Test that a configured title replaces the default
#[test]
fn test_configured_title() {
    let mut config = Config::default();
    config.window.title = Some("Steam".to_string());
    let fixture = Fixture::with_config(config, ColorSupport::default());
    let _connector = fixture.connector().expect("connector");

    assert_eq!(
        fixture.transport().ops(0),
        vec![SurfaceOp::Title("Steam".to_string())]
    );
}

/// Test that relative mouse mode is forwarded and forced by config
#[test]
fn test_relative_mouse_mode() {
    let fixture = Fixture::new();
    let connector = fixture.connector().expect("connector");
    connector.set_relative_mouse_mode(true);
    connector.set_relative_mouse_mode(false);
    assert_eq!(
        fixture.transport().requests().relative_mouse,
        vec![true, false]
    );

    let mut config = Config::default();
    config.window.force_relative_mouse = true;
    let forced = Fixture::with_config(config, ColorSupport::default());
    let _connector = forced.connector().expect("connector");
    assert_eq!(forced.transport().requests().relative_mouse, vec![true]);
}

/// Test that icons are parsed from the X11 layout
#[test]
fn test_icon() {
    let fixture = Fixture::new();
    let connector = fixture.connector().expect("connector");

    connector.set_icon(Some(&[2, 1, 0xffff_0000, 0xff00_ff00]));
    // Truncated pixel data clears the icon
    connector.set_icon(Some(&[4, 4, 0]));
    connector.set_icon(None);

    let requests = fixture.transport().requests();
    assert_eq!(
        requests.icons,
        vec![
            Some(Icon {
                width: 2,
                height: 1,
                pixels: vec![0xffff_0000, 0xff00_ff00],
            }),
            None,
            None,
        ]
    );
}

/// Test that cursor images and selections reach the transport
#[test]
fn test_cursor_and_selection() {
    let fixture = Fixture::new();
    let connector = fixture.connector().expect("connector");

    let image = Arc::new(CursorImage::fallback());
    connector.set_cursor_image(Some(image.clone()));
    connector.set_cursor_image(None);
    connector.set_selection(SelectionKind::Clipboard, "copied".to_string());
    connector.set_selection(SelectionKind::Primary, "selected".to_string());

    let requests = fixture.transport().requests();
    assert_eq!(requests.cursor_images.len(), 2);
    assert!(requests.cursor_images[0]
        .as_ref()
        .is_some_and(|img| Arc::ptr_eq(img, &image)));
    assert!(requests.cursor_images[1].is_none());
    assert_eq!(
        requests.selections,
        vec![
            (SelectionKind::Clipboard, "copied".to_string()),
            (SelectionKind::Primary, "selected".to_string()),
        ]
    );
}
