//! Framebuffer handles and compositor acquire/release bookkeeping.
//!
//! A framebuffer stays alive while the host compositor may still read from
//! it. That window is not tied to any local scope: it opens when a plane
//! attaches the buffer and closes when the host sends a release. [`FbRefs`]
//! counts those holds and keeps the framebuffer alive through a self
//! reference while the count is non-zero.

use std::any::Any;
use std::fmt;
use std::os::fd::OwnedFd;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

pub type FbHandle = Arc<dyn BackendFb>;

pub trait BackendFb: fmt::Debug + Send + Sync + 'static {
    fn refs(&self) -> &FbRefs;

    /// Whether this framebuffer only wraps another backend's import.
    fn is_wrapper(&self) -> bool {
        false
    }

    /// The wrapped framebuffer, imported on demand.
    fn unwrap_fb(&self) -> Option<FbHandle> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

/// Resolve wrapper framebuffers down to the one a transport can attach.
pub fn resolve(fb: &FbHandle) -> Option<FbHandle> {
    if fb.is_wrapper() {
        fb.unwrap_fb()
    } else {
        Some(fb.clone())
    }
}

#[derive(Default)]
struct RefsInner {
    holds: u32,
    keepalive: Option<FbHandle>,
}

#[derive(Default)]
pub struct FbRefs {
    inner: Mutex<RefsInner>,
}

impl fmt::Debug for FbRefs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FbRefs")
            .field("holds", &self.inner.lock().holds)
            .finish()
    }
}

impl FbRefs {
    pub fn holds(&self) -> u32 {
        self.inner.lock().holds
    }

    pub fn is_acquired(&self) -> bool {
        self.holds() > 0
    }
}

/// Record one host hold on `fb`.
pub fn acquire(fb: &FbHandle) {
    let mut inner = fb.refs().inner.lock();
    if inner.holds == 0 {
        inner.keepalive = Some(fb.clone());
    }
    inner.holds += 1;
}

/// Acquire `fb` for a plane unless the host already holds it.
pub fn on_compositor_acquire(fb: &FbHandle) {
    if !fb.refs().is_acquired() {
        acquire(fb);
    }
}

/// Drop one host hold. An unbalanced release is logged and ignored.
pub fn release(refs: &FbRefs) {
    let keepalive = {
        let mut inner = refs.inner.lock();
        if inner.holds == 0 {
            error!("Framebuffer released but not acquired");
            return;
        }
        inner.holds -= 1;
        if inner.holds == 0 {
            inner.keepalive.take()
        } else {
            None
        }
    };
    // The last hold may be the last reference, drop it outside the lock.
    drop(keepalive);
}

/// One plane of a dmabuf.
#[derive(Debug)]
pub struct DmabufPlane {
    pub fd: OwnedFd,
    pub offset: u32,
    pub stride: u32,
}

#[derive(Debug)]
pub struct DmabufAttributes {
    pub width: i32,
    pub height: i32,
    /// DRM fourcc.
    pub format: u32,
    pub modifier: u64,
    pub planes: Vec<DmabufPlane>,
}

impl DmabufAttributes {
    pub fn try_clone(&self) -> std::io::Result<Self> {
        let planes = self
            .planes
            .iter()
            .map(|p| {
                Ok(DmabufPlane {
                    fd: p.fd.try_clone()?,
                    offset: p.offset,
                    stride: p.stride,
                })
            })
            .collect::<std::io::Result<Vec<_>>>()?;
        Ok(Self {
            width: self.width,
            height: self.height,
            format: self.format,
            modifier: self.modifier,
            planes,
        })
    }
}
