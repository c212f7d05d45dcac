//! Deferred backend tests
//!
//! A headless child that is not reachable for the first few attempts.

use std::fs::File;
use std::os::fd::OwnedFd;
use std::sync::Arc;

use scanout_core::backend::deferred::NoStartup;
use scanout_core::backend::fb::{self, DmabufAttributes, DmabufPlane};
use scanout_core::backend::headless::SurfaceOp;
use scanout_core::backend::{
    fourcc, BackendFb, DeferredBackend, HeadlessBackend, OutputFormats, ScreenType,
};
use scanout_core::config::OutputConfig;
use scanout_core::frame::{Layer, Texture};
use scanout_core::{Backend, BackendConnector, Config, FrameInfo, OutputState, Runtime};

fn deferred(failures: u32) -> DeferredBackend<HeadlessBackend> {
    let config = Config::default();
    let output = Arc::new(OutputState::new());
    let child = HeadlessBackend::new(config.clone(), output.clone(), Arc::new(Runtime::default()));
    child.fail_init(failures);
    DeferredBackend::new(child, output, OutputConfig::default(), Box::new(NoStartup))
}

fn dmabuf() -> DmabufAttributes {
    let fd = OwnedFd::from(File::open("/dev/null").expect("open /dev/null"));
    DmabufAttributes {
        width: 1280,
        height: 720,
        format: fourcc::XRGB8888,
        modifier: fourcc::MOD_LINEAR,
        planes: vec![DmabufPlane {
            fd,
            offset: 0,
            stride: 1280 * 4,
        }],
    }
}

/// Test the conservative answers given before the child is ready
#[test]
fn test_defaults_before_ready() {
    let backend = deferred(u32::MAX);
    backend.init().expect("deferred init never fails on the child");
    backend.post_init().expect("post_init");

    assert!(!backend.is_child_initted());
    assert_eq!(
        backend.preferred_output_format(),
        OutputFormats {
            primary: fourcc::ABGR2101010,
            overlay: fourcc::ARGB8888,
        }
    );
    assert!(backend.is_paused());
    assert!(backend.is_visible());
    assert!(!backend.supports_tearing());
    assert!(!backend.needs_frame_sync());
    assert!(backend.uses_modifiers());
    assert_eq!(backend.cursor_surface_size((64, 64)), (64, 64));
    assert!(!backend.set_dynamic_refresh(90_000));
    assert!(backend.current_connector().is_none());
    assert!(backend.connector(ScreenType::Internal).is_none());
    assert!(backend.create_virtual_connector(0).is_none());
    assert!(!backend.newly_initted());
    assert!(!backend.poll_state());

    // Failed attempts are not counted
    assert_eq!(backend.child().init_count(), 0);
    assert_eq!(backend.child().post_init_count(), 0);
}

/// Test that the child is brought up from poll and reported exactly once
#[test]
fn test_child_ready_after_retries() {
    let backend = deferred(2);
    backend.init().expect("init");
    backend.post_init().expect("post_init");
    assert!(!backend.is_child_initted());

    // Second attempt still fails
    assert!(!backend.poll_state());
    assert!(!backend.is_child_initted());

    // Third attempt succeeds and catches up on post_init
    assert!(backend.poll_state());
    assert!(backend.is_child_initted());
    assert_eq!(backend.child().init_count(), 1);
    assert_eq!(backend.child().post_init_count(), 1);

    assert!(!backend.poll_state());
    assert!(backend.newly_initted());
    assert!(!backend.newly_initted());

    assert!(!backend.is_paused());
    assert!(backend.create_virtual_connector(0).is_some());
}

/// Test that a child ready at init runs post_init only once
#[test]
fn test_child_ready_at_init() {
    let backend = deferred(0);
    backend.init().expect("init");
    assert!(backend.is_child_initted());
    assert_eq!(backend.child().post_init_count(), 0);

    backend.post_init().expect("post_init");
    assert_eq!(backend.child().post_init_count(), 1);

    assert!(backend.newly_initted());
    assert!(backend.poll_state());
    assert!(!backend.poll_state());
}

/// Test that dmabufs imported early reach the child on first use
#[test]
fn test_deferred_import() {
    let backend = deferred(1);
    backend.init().expect("init");
    backend.post_init().expect("post_init");

    let fb = backend.import_dmabuf(&dmabuf()).expect("wrapper fb");
    assert!(fb.is_wrapper());
    // Not importable until the child is up
    assert!(fb::resolve(&fb).is_none());
    assert_eq!(backend.child().import_count(), 0);

    assert!(backend.poll_state());
    let connector = backend.create_virtual_connector(0).expect("connector");
    backend.child().transport().take_ops();

    let frame = FrameInfo {
        layers: vec![Layer {
            tex: Some(Texture {
                width: 1280,
                height: 720,
                has_alpha: false,
                fb: Some(fb.clone()),
            }),
            ..Default::default()
        }],
        ..Default::default()
    };
    connector.present(&frame, false).expect("present");
    connector.present(&frame, false).expect("present");

    // Imported once, then reused
    assert_eq!(backend.child().import_count(), 1);
    let ops = backend.child().transport().take_ops();
    assert!(ops[0]
        .iter()
        .any(|op| matches!(op, SurfaceOp::Attach(Some(_)))));
}
