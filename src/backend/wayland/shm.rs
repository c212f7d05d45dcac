//! Small ARGB8888 shm buffers for cursors, icons and the black fallback.

use std::fs::File;
use std::io::Write;
use std::os::fd::{AsFd, FromRawFd, OwnedFd};

use anyhow::Context;
use wayland_client::protocol::{wl_buffer::WlBuffer, wl_shm, wl_shm::WlShm};
use wayland_client::{Dispatch, QueueHandle};

/// Anonymous memory file holding `contents`.
fn memfd_with(contents: &[u8]) -> anyhow::Result<OwnedFd> {
    let raw = unsafe { libc::memfd_create(c"scanout-shm".as_ptr(), libc::MFD_CLOEXEC) };
    if raw < 0 {
        return Err(std::io::Error::last_os_error()).context("memfd_create failed");
    }
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };
    let mut file = File::from(fd);
    file.write_all(contents).context("failed to fill shm file")?;
    Ok(file.into())
}

/// Create a `width`x`height` ARGB8888 buffer from little-endian pixel bytes.
pub fn create_argb_buffer<D, U>(
    shm: &WlShm,
    qh: &QueueHandle<D>,
    width: u32,
    height: u32,
    bytes: &[u8],
    udata: U,
) -> anyhow::Result<WlBuffer>
where
    D: Dispatch<wayland_client::protocol::wl_shm_pool::WlShmPool, ()>
        + Dispatch<WlBuffer, U>
        + 'static,
    U: Send + Sync + 'static,
{
    let stride = width * 4;
    let size = stride * height;
    anyhow::ensure!(
        bytes.len() == size as usize,
        "shm buffer expects {} bytes, got {}",
        size,
        bytes.len()
    );

    let fd = memfd_with(bytes)?;
    let pool = shm.create_pool(fd.as_fd(), size as i32, qh, ());
    let buffer = pool.create_buffer(
        0,
        width as i32,
        height as i32,
        stride as i32,
        wl_shm::Format::Argb8888,
        qh,
        udata,
    );
    pool.destroy();
    Ok(buffer)
}
