//! Deferred backend: start before the real target is reachable.
//!
//! [`DeferredBackend`] wraps a child backend whose `init` may not succeed yet
//! (the host compositor is not up, the session is not ready). Until it does,
//! queries get conservative defaults; afterwards everything is forwarded.
//!
//! # Design Invariants
//!
//! 1. **One transition**: the child goes from not-ready to ready exactly once,
//!    under the write lock, retried from `init` and every `poll_state`.
//!
//! 2. **Readers never race the transition**: every forwarding query holds the
//!    read lock while it checks readiness and calls into the child.
//!
//! 3. **Post-init catches up**: if `post_init` already ran when the child
//!    becomes ready, the child's `post_init` runs immediately. Failure there
//!    is a broken contract and panics.
//!
//! 4. **Two independent latches**: `newly_initted` and `poll_state` each
//!    report the transition exactly once.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{error, info, trace};

use super::blob::{BackendBlob, BlobData};
use super::fb::{BackendFb, DmabufAttributes, FbHandle, FbRefs};
use super::{fourcc, Backend, InputType, OutputFormats, PresentLayout, ScreenType, TouchClickMode};
use crate::config::{OutputConfig, OutputState};

/// Subsystems brought up by the deferred backend before its child: the
/// renderer instance and the session.
pub trait StartupHook: Send + Sync {
    fn init(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Modifiers the renderer can sample from for `format`.
    fn supported_sample_modifiers(&self, _format: u32) -> Vec<u64> {
        vec![fourcc::MOD_LINEAR]
    }
}

#[derive(Debug, Default)]
pub struct NoStartup;

impl StartupHook for NoStartup {}

#[derive(Debug, Default)]
struct InitState {
    done_post_init: bool,
}

struct Inner<B> {
    child: B,
    init_lock: RwLock<InitState>,
    initted_child: AtomicBool,
    just_initted_client: AtomicBool,
    just_initted_poll: AtomicBool,
    output: Arc<OutputState>,
    output_config: OutputConfig,
    startup: Box<dyn StartupHook>,
}

impl<B: Backend> Inner<B> {
    fn try_init_child(&self) {
        if self.initted_child.load(Ordering::Acquire) {
            return;
        }

        let state = self.init_lock.write();
        if self.initted_child.load(Ordering::Acquire) {
            return;
        }

        match self.child.init() {
            Ok(()) => {
                self.initted_child.store(true, Ordering::Release);
                if state.done_post_init {
                    if let Err(err) = self.child.post_init() {
                        panic!("Deferred child post_init failed: {:?}", err);
                    }
                }
                self.just_initted_client.store(true, Ordering::Release);
                self.just_initted_poll.store(true, Ordering::Release);
                info!("Deferred backend child is ready");
            }
            Err(err) => trace!("Deferred backend child not ready yet: {:?}", err),
        }
    }

    /// Run `f` against the child if it is ready, under the read lock.
    fn with_child<R>(&self, f: impl FnOnce(&B) -> R) -> Option<R> {
        let _state = self.init_lock.read();
        if self.initted_child.load(Ordering::Acquire) {
            Some(f(&self.child))
        } else {
            None
        }
    }
}

pub struct DeferredBackend<B> {
    inner: Arc<Inner<B>>,
}

impl<B: Backend + 'static> DeferredBackend<B> {
    pub fn new(
        child: B,
        output: Arc<OutputState>,
        output_config: OutputConfig,
        startup: Box<dyn StartupHook>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                child,
                init_lock: RwLock::new(InitState::default()),
                initted_child: AtomicBool::new(false),
                just_initted_client: AtomicBool::new(false),
                just_initted_poll: AtomicBool::new(false),
                output,
                output_config,
                startup,
            }),
        }
    }

    pub fn is_child_initted(&self) -> bool {
        self.inner.initted_child.load(Ordering::Acquire)
    }

    pub fn child(&self) -> &B {
        &self.inner.child
    }
}

impl<B: Backend + 'static> Backend for DeferredBackend<B> {
    type Connector = B::Connector;

    fn init(&self) -> anyhow::Result<()> {
        self.inner.output.configure(&self.inner.output_config)?;
        self.inner.startup.init()?;
        self.inner.try_init_child();
        Ok(())
    }

    fn post_init(&self) -> anyhow::Result<()> {
        let mut state = self.inner.init_lock.write();
        state.done_post_init = true;
        if self.inner.initted_child.load(Ordering::Acquire) {
            return self.inner.child.post_init();
        }
        Ok(())
    }

    fn present_layout(&self) -> PresentLayout {
        self.inner
            .with_child(|c| c.present_layout())
            .unwrap_or(PresentLayout::General)
    }

    fn preferred_output_format(&self) -> OutputFormats {
        OutputFormats {
            primary: fourcc::ABGR2101010,
            overlay: fourcc::ARGB8888,
        }
    }

    fn valid_physical_device(&self) -> bool {
        true
    }

    fn dirty_state(&self, force: bool, force_modeset: bool) {
        self.inner.with_child(|c| c.dirty_state(force, force_modeset));
    }

    fn poll_state(&self) -> bool {
        self.inner.try_init_child();
        let polled = self.inner.with_child(|c| c.poll_state()).unwrap_or(false);
        polled || self.inner.just_initted_poll.swap(false, Ordering::AcqRel)
    }

    fn create_backend_blob(&self, data: BlobData) -> Arc<BackendBlob> {
        Arc::new(BackendBlob::new(data))
    }

    fn import_dmabuf(&self, attrs: &DmabufAttributes) -> Option<FbHandle> {
        let attrs = match attrs.try_clone() {
            Ok(attrs) => attrs,
            Err(err) => {
                error!("Failed to duplicate dmabuf fds: {:?}", err);
                return None;
            }
        };
        Some(Arc::new(DeferredFb {
            backend: self.inner.clone(),
            attrs,
            child_fb: Mutex::new(None),
            refs: FbRefs::default(),
        }))
    }

    fn uses_modifiers(&self) -> bool {
        true
    }

    fn supported_modifiers(&self, format: u32) -> Vec<u64> {
        self.inner.startup.supported_sample_modifiers(format)
    }

    fn current_connector(&self) -> Option<Arc<Self::Connector>> {
        self.inner.with_child(|c| c.current_connector()).flatten()
    }

    fn connector(&self, screen_type: ScreenType) -> Option<Arc<Self::Connector>> {
        self.inner
            .with_child(|c| c.connector(screen_type))
            .flatten()
    }

    fn supports_plane_hardware_cursor(&self) -> bool {
        self.inner.child.supports_plane_hardware_cursor()
    }

    fn supports_tearing(&self) -> bool {
        self.inner
            .with_child(|c| c.supports_tearing())
            .unwrap_or(false)
    }

    fn uses_vulkan_swapchain(&self) -> bool {
        self.inner.child.uses_vulkan_swapchain()
    }

    fn is_session_based(&self) -> bool {
        self.inner.child.is_session_based()
    }

    fn supports_explicit_sync(&self) -> bool {
        self.inner.child.supports_explicit_sync()
    }

    fn is_paused(&self) -> bool {
        self.inner.with_child(|c| c.is_paused()).unwrap_or(true)
    }

    fn is_visible(&self) -> bool {
        self.inner.with_child(|c| c.is_visible()).unwrap_or(true)
    }

    fn cursor_surface_size(&self, size: (u32, u32)) -> (u32, u32) {
        self.inner
            .with_child(|c| c.cursor_surface_size(size))
            .unwrap_or(size)
    }

    fn set_dynamic_refresh(&self, refresh_mhz: i32) -> bool {
        self.inner
            .with_child(|c| c.set_dynamic_refresh(refresh_mhz))
            .unwrap_or(false)
    }

    fn hack_update_patched_edid(&self) {
        self.inner.with_child(|c| c.hack_update_patched_edid());
    }

    fn needs_frame_sync(&self) -> bool {
        false
    }

    fn touch_click_mode(&self) -> TouchClickMode {
        self.inner.child.touch_click_mode()
    }

    fn dump_debug_info(&self) {
        self.inner.child.dump_debug_info();
    }

    fn uses_virtual_connectors(&self) -> bool {
        self.inner.child.uses_virtual_connectors()
    }

    fn create_virtual_connector(&self, key: u64) -> Option<Arc<Self::Connector>> {
        self.inner
            .with_child(|c| c.create_virtual_connector(key))
            .flatten()
    }

    fn notify_physical_input(&self, kind: InputType) {
        self.inner.with_child(|c| c.notify_physical_input(kind));
    }

    fn supports_vr_overlay_forwarding(&self) -> bool {
        self.inner.child.supports_vr_overlay_forwarding()
    }

    fn newly_initted(&self) -> bool {
        self.inner.just_initted_client.swap(false, Ordering::AcqRel)
    }

    fn should_fit_windows(&self) -> bool {
        self.inner.child.should_fit_windows()
    }
}

/// Framebuffer imported before the child backend was ready. The dmabuf is
/// imported into the child the first time a plane needs it.
pub struct DeferredFb<B> {
    backend: Arc<Inner<B>>,
    attrs: DmabufAttributes,
    child_fb: Mutex<Option<FbHandle>>,
    refs: FbRefs,
}

impl<B> std::fmt::Debug for DeferredFb<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredFb")
            .field("attrs", &self.attrs)
            .field("imported", &self.child_fb.lock().is_some())
            .finish()
    }
}

impl<B: Backend + 'static> BackendFb for DeferredFb<B> {
    fn refs(&self) -> &FbRefs {
        &self.refs
    }

    fn is_wrapper(&self) -> bool {
        true
    }

    fn unwrap_fb(&self) -> Option<FbHandle> {
        let mut child_fb = self.child_fb.lock();
        if child_fb.is_none() {
            if !self.backend.initted_child.load(Ordering::Acquire) {
                error!("Deferred framebuffer used before the backend was ready");
                return None;
            }
            *child_fb = self.backend.child.import_dmabuf(&self.attrs);
        }
        child_fb.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
