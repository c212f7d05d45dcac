//! Scanout binary entry point
//!
//! Opens one virtual connector and presents backing frames at the output
//! refresh rate until the window is closed. Useful to check a host
//! compositor's handling of the window without running a nested session.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use parking_lot::Mutex;
use scanout_core::backend::connector::Connector;
use scanout_core::backend::deferred::NoStartup;
use scanout_core::backend::transport::Transport;
use scanout_core::backend::{Backend, BackendConnector, DeferredBackend, HeadlessBackend, WaylandBackend};
use scanout_core::input::{InputLock, InputSink};
use scanout_core::utils::{get_monotonic_time, mhz_to_interval};
use scanout_core::{logging, Config, FrameInfo, OutputState, Runtime};
use tracing::{debug, error, info, trace};

const CONNECTOR_KEY: u64 = 0;
const RETRY_INTERVAL: Duration = Duration::from_millis(250);
const FALLBACK_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    headless: bool,
    /// Stop after this many frames.
    frames: Option<u64>,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        let mut parsed = Args::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let path = args.next().context("--config needs a path")?;
                    parsed.config = Some(PathBuf::from(path));
                }
                "--headless" => parsed.headless = true,
                "--frames" => {
                    let count = args.next().context("--frames needs a count")?;
                    parsed.frames = Some(count.parse().context("invalid frame count")?);
                }
                other => anyhow::bail!("unknown argument {}", other),
            }
        }
        Ok(parsed)
    }
}

/// Logs input instead of delivering it to nested clients.
struct TraceSink;

impl InputSink for TraceSink {
    fn key(&mut self, key: u32, pressed: bool, time: u32) {
        trace!("key {} pressed={} t={}", key, pressed, time);
    }

    fn button(&mut self, button: u32, pressed: bool, time: u32) {
        trace!("button {:#x} pressed={} t={}", button, pressed, time);
    }

    fn relative_motion(&mut self, dx: f64, dy: f64, time: u32) {
        trace!("relative motion {:.2},{:.2} t={}", dx, dy, time);
    }

    fn touch_motion(&mut self, x: f64, y: f64, touch_id: i32, time: u32) {
        trace!("touch {} at {:.3},{:.3} t={}", touch_id, x, y, time);
    }

    fn wheel(&mut self, x: f64, y: f64, time: u32) {
        trace!("wheel {},{} t={}", x, y, time);
    }
}

fn main() {
    logging::init();

    let args = match Args::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("Usage: scanout [--config <file>] [--headless] [--frames <count>]");
            std::process::exit(2);
        }
    };

    if let Err(e) = run(args) {
        error!("Fatal error: {:?}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let output = Arc::new(OutputState::new());
    let runtime = Arc::new(Runtime::default());

    if args.headless {
        info!("Starting scanout with headless backend");
        let child = HeadlessBackend::new(config.clone(), output.clone(), runtime.clone());
        let backend = DeferredBackend::new(child, output.clone(), config.output, Box::new(NoStartup));
        drive(&backend, &output, args.frames)
    } else {
        info!("Starting scanout with Wayland backend");
        let sink: InputLock = Arc::new(Mutex::new(Box::new(TraceSink) as Box<dyn InputSink>));
        let child = WaylandBackend::new(config.clone(), output.clone(), runtime.clone(), sink);
        let backend = DeferredBackend::new(child, output.clone(), config.output, Box::new(NoStartup));
        drive(&backend, &output, args.frames)
    }
}

fn drive<B, T>(backend: &B, output: &OutputState, frames: Option<u64>) -> anyhow::Result<()>
where
    B: Backend<Connector = Connector<T>>,
    T: Transport,
{
    backend.init()?;
    backend.post_init()?;

    let connector = loop {
        if let Some(connector) = backend.create_virtual_connector(CONNECTOR_KEY) {
            break connector;
        }
        debug!("Waiting for the presentation target");
        backend.poll_state();
        std::thread::sleep(RETRY_INTERVAL);
    };
    info!(
        "Presenting on {} {} ({}x{})",
        connector.make(),
        connector.model(),
        output.width(),
        output.height()
    );

    let mut presented = 0u64;
    while !connector.shared().close_requested() {
        if frames.is_some_and(|limit| presented >= limit) {
            break;
        }

        let frame = FrameInfo {
            wakeup_time: get_monotonic_time(),
            ..Default::default()
        };
        if let Err(e) = connector.present(&frame, false) {
            error!("Present failed ({}): {}", e.code(), e);
        }
        presented += 1;

        backend.poll_state();
        let interval = mhz_to_interval(output.refresh_mhz()).unwrap_or(FALLBACK_INTERVAL);
        std::thread::sleep(interval);
    }

    info!("Presented {} frames, exiting", presented);
    Ok(())
}
