//! Dedicated input thread.
//!
//! Input is read on its own event queue and thread so pointer and keyboard
//! events reach the sink while the presentation thread is busy. The thread
//! binds its own seat and relative pointer manager. The presentation thread
//! talks to it through a command channel and an eventfd that wakes the poll.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use anyhow::Context;
use tracing::{debug, error, info, trace, warn};
use wayland_client::backend::WaylandError;
use wayland_client::protocol::{
    wl_keyboard::{self, WlKeyboard},
    wl_pointer::{self, WlPointer},
    wl_registry::{self, WlRegistry},
    wl_seat::{self, WlSeat},
};
use wayland_client::{Connection, Dispatch, EventQueue, Proxy, QueueHandle, WEnum};
use wayland_protocols::wp::relative_pointer::zv1::client::{
    zwp_relative_pointer_manager_v1::ZwpRelativePointerManagerV1,
    zwp_relative_pointer_v1::{self, ZwpRelativePointerV1},
};

use crate::backend::plane::PlaneShared;
use crate::input::{Axis, AxisSource, InputTranslator, KeyAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputCommand {
    SetRelative(bool),
    Shutdown,
}

struct InputState {
    translator: InputTranslator,
    seat: Option<WlSeat>,
    relative_manager: Option<ZwpRelativePointerManagerV1>,
    pointer: Option<WlPointer>,
    keyboard: Option<WlKeyboard>,
    relative_pointer: Option<ZwpRelativePointerV1>,
}

impl InputState {
    fn set_relative(&mut self, relative: bool, qh: &QueueHandle<Self>) {
        self.translator.set_relative(relative);
        if relative {
            if self.relative_pointer.is_none() {
                if let (Some(manager), Some(pointer)) = (&self.relative_manager, &self.pointer) {
                    self.relative_pointer = Some(manager.get_relative_pointer(pointer, qh, ()));
                }
            }
        } else if let Some(relative_pointer) = self.relative_pointer.take() {
            relative_pointer.destroy();
        }
    }
}

/// Handle to the running input thread. Dropping it stops the thread.
pub struct InputThread {
    commands: Sender<InputCommand>,
    wake: Arc<OwnedFd>,
    handle: Option<thread::JoinHandle<()>>,
}

impl InputThread {
    pub fn spawn(conn: &Connection, translator: InputTranslator) -> anyhow::Result<Self> {
        let mut queue = conn.new_event_queue::<InputState>();
        let qh = queue.handle();
        conn.display().get_registry(&qh, ());

        let mut state = InputState {
            translator,
            seat: None,
            relative_manager: None,
            pointer: None,
            keyboard: None,
            relative_pointer: None,
        };
        // Globals first, then the seat capabilities.
        queue
            .roundtrip(&mut state)
            .context("input registry roundtrip failed")?;
        queue
            .roundtrip(&mut state)
            .context("input seat roundtrip failed")?;
        anyhow::ensure!(state.seat.is_some(), "host has no wl_seat for input");
        anyhow::ensure!(
            state.relative_manager.is_some(),
            "host has no relative pointer manager for input"
        );

        let wake = Arc::new(new_eventfd()?);
        let (commands, command_rx) = mpsc::channel();
        let conn = conn.clone();
        let thread_wake = wake.clone();
        let handle = thread::Builder::new()
            .name("scanout-input".to_string())
            .spawn(move || run(conn, queue, state, command_rx, thread_wake))
            .context("failed to spawn input thread")?;

        info!("Input thread started");
        Ok(Self {
            commands,
            wake,
            handle: Some(handle),
        })
    }

    pub fn set_relative(&self, relative: bool) {
        self.send(InputCommand::SetRelative(relative));
    }

    fn send(&self, command: InputCommand) {
        if self.commands.send(command).is_err() {
            debug!("Input thread gone, dropping {:?}", command);
            return;
        }
        signal_eventfd(&self.wake);
    }
}

impl Drop for InputThread {
    fn drop(&mut self) {
        self.send(InputCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Input thread panicked");
            }
        }
    }
}

fn new_eventfd() -> anyhow::Result<OwnedFd> {
    let raw = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
    if raw < 0 {
        return Err(io::Error::last_os_error()).context("eventfd failed");
    }
    Ok(unsafe { OwnedFd::from_raw_fd(raw) })
}

fn signal_eventfd(fd: &OwnedFd) {
    let value: u64 = 1;
    let ret = unsafe {
        libc::write(
            fd.as_raw_fd(),
            (&value as *const u64).cast(),
            std::mem::size_of::<u64>(),
        )
    };
    if ret < 0 {
        warn!("Failed to wake input thread: {}", io::Error::last_os_error());
    }
}

fn drain_eventfd(fd: &OwnedFd) {
    let mut value: u64 = 0;
    unsafe {
        libc::read(
            fd.as_raw_fd(),
            (&mut value as *mut u64).cast(),
            std::mem::size_of::<u64>(),
        );
    }
}

fn run(
    conn: Connection,
    mut queue: EventQueue<InputState>,
    mut state: InputState,
    commands: Receiver<InputCommand>,
    wake: Arc<OwnedFd>,
) {
    let qh = queue.handle();
    loop {
        while let Ok(command) = commands.try_recv() {
            match command {
                InputCommand::Shutdown => {
                    debug!("Input thread stopping");
                    return;
                }
                InputCommand::SetRelative(relative) => state.set_relative(relative, &qh),
            }
        }

        if let Err(err) = queue.dispatch_pending(&mut state) {
            error!("Input dispatch failed: {}", err);
            return;
        }
        if let Err(err) = conn.flush() {
            error!("Input flush failed: {}", err);
            return;
        }

        let Some(guard) = queue.prepare_read() else {
            continue;
        };

        let mut fds = [
            libc::pollfd {
                fd: guard.connection_fd().as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
            libc::pollfd {
                fd: wake.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
        ];
        let ret = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            error!("Input poll failed: {}", err);
            return;
        }

        if fds[1].revents & libc::POLLIN != 0 {
            drain_eventfd(&wake);
            // Dropping the guard cancels the read.
            continue;
        }

        match guard.read() {
            Ok(_) => {}
            Err(WaylandError::Io(err)) if err.kind() == io::ErrorKind::WouldBlock => {}
            Err(err) => {
                error!("Input read failed: {}", err);
                return;
            }
        }
    }
}

fn plane_of(surface: &wayland_client::protocol::wl_surface::WlSurface) -> Option<Arc<PlaneShared>> {
    surface.data::<Arc<PlaneShared>>().cloned()
}

impl Dispatch<WlRegistry, ()> for InputState {
    fn event(
        state: &mut Self,
        registry: &WlRegistry,
        event: wl_registry::Event,
        _: &(),
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        let wl_registry::Event::Global {
            name,
            interface,
            version,
        } = event
        else {
            return;
        };
        match interface.as_str() {
            "wl_seat" if state.seat.is_none() => {
                state.seat = Some(registry.bind(name, version.min(8), qh, ()));
            }
            "zwp_relative_pointer_manager_v1" => {
                state.relative_manager = Some(registry.bind(name, 1, qh, ()));
            }
            _ => {}
        }
    }
}

impl Dispatch<WlSeat, ()> for InputState {
    fn event(
        state: &mut Self,
        seat: &WlSeat,
        event: wl_seat::Event,
        _: &(),
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        let wl_seat::Event::Capabilities {
            capabilities: WEnum::Value(caps),
        } = event
        else {
            return;
        };

        if caps.contains(wl_seat::Capability::Pointer) {
            if state.pointer.is_none() {
                state.pointer = Some(seat.get_pointer(qh, ()));
            }
        } else if let Some(pointer) = state.pointer.take() {
            if let Some(relative_pointer) = state.relative_pointer.take() {
                relative_pointer.destroy();
            }
            pointer.release();
        }

        if caps.contains(wl_seat::Capability::Keyboard) {
            if state.keyboard.is_none() {
                state.keyboard = Some(seat.get_keyboard(qh, ()));
            }
        } else if let Some(keyboard) = state.keyboard.take() {
            keyboard.release();
        }
    }
}

impl Dispatch<ZwpRelativePointerManagerV1, ()> for InputState {
    fn event(
        _: &mut Self,
        _: &ZwpRelativePointerManagerV1,
        _: <ZwpRelativePointerManagerV1 as wayland_client::Proxy>::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
    }
}

fn axis_source(source: wl_pointer::AxisSource) -> AxisSource {
    match source {
        wl_pointer::AxisSource::Finger => AxisSource::Finger,
        wl_pointer::AxisSource::Continuous => AxisSource::Continuous,
        wl_pointer::AxisSource::WheelTilt => AxisSource::WheelTilt,
        _ => AxisSource::Wheel,
    }
}

impl Dispatch<WlPointer, ()> for InputState {
    fn event(
        state: &mut Self,
        _: &WlPointer,
        event: wl_pointer::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        let translator = &mut state.translator;
        match event {
            wl_pointer::Event::Enter {
                surface,
                surface_x,
                surface_y,
                ..
            } => {
                if let Some(plane) = plane_of(&surface) {
                    translator.pointer_enter(plane, surface_x, surface_y);
                }
            }
            wl_pointer::Event::Leave { surface, .. } => {
                if let Some(plane) = plane_of(&surface) {
                    translator.pointer_leave(&plane);
                }
            }
            wl_pointer::Event::Motion {
                surface_x,
                surface_y,
                ..
            } => translator.pointer_motion(surface_x, surface_y),
            wl_pointer::Event::Button {
                button,
                state: button_state,
                ..
            } => {
                let pressed = button_state == WEnum::Value(wl_pointer::ButtonState::Pressed);
                translator.pointer_button(button, pressed);
            }
            wl_pointer::Event::AxisSource {
                axis_source: WEnum::Value(source),
            } => translator.pointer_axis_source(axis_source(source)),
            wl_pointer::Event::AxisValue120 {
                axis: WEnum::Value(axis),
                value120,
            } => {
                let axis = match axis {
                    wl_pointer::Axis::HorizontalScroll => Axis::Horizontal,
                    _ => Axis::Vertical,
                };
                translator.pointer_axis_value120(axis, value120);
            }
            wl_pointer::Event::Frame => translator.pointer_frame(),
            _ => {}
        }
    }
}

impl Dispatch<WlKeyboard, ()> for InputState {
    fn event(
        state: &mut Self,
        _: &WlKeyboard,
        event: wl_keyboard::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        let translator = &mut state.translator;
        match event {
            wl_keyboard::Event::Enter { surface, keys, .. } => {
                if plane_of(&surface).is_none() {
                    return;
                }
                let keys: Vec<u32> = keys
                    .chunks_exact(4)
                    .filter_map(|c| c.try_into().ok().map(u32::from_ne_bytes))
                    .collect();
                translator.keyboard_enter(&keys);
            }
            wl_keyboard::Event::Leave { surface, .. } => {
                if plane_of(&surface).is_some() {
                    translator.keyboard_leave();
                }
            }
            wl_keyboard::Event::Key {
                key,
                state: key_state,
                ..
            } => {
                let pressed = key_state == WEnum::Value(wl_keyboard::KeyState::Pressed);
                if let KeyAction::Hotkey(hotkey) = translator.keyboard_key(key, pressed) {
                    trace!("Hotkey {:?}", hotkey);
                }
            }
            wl_keyboard::Event::Modifiers {
                mods_depressed,
                mods_latched,
                mods_locked,
                ..
            } => translator.keyboard_modifiers(mods_depressed, mods_latched, mods_locked),
            _ => {}
        }
    }
}

impl Dispatch<ZwpRelativePointerV1, ()> for InputState {
    fn event(
        state: &mut Self,
        _: &ZwpRelativePointerV1,
        event: zwp_relative_pointer_v1::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let zwp_relative_pointer_v1::Event::RelativeMotion {
            dx_unaccel,
            dy_unaccel,
            ..
        } = event
        {
            state.translator.relative_motion(dx_unaccel, dy_unaccel);
        }
    }
}
