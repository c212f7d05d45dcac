//! Tracy profiling hooks.
//!
//! The macros compile to nothing unless the `profile-with-tracy` feature is
//! enabled. `tracy_span!` goes at the top of per-frame functions
//! (`Connector::present`, `WaylandBackend::poll_state`), `tracy_frame_mark!`
//! where a vblank is recorded.

/// Create a Tracy span for the current scope.
#[macro_export]
#[cfg(feature = "profile-with-tracy")]
macro_rules! tracy_span {
    ($name:expr) => {
        let _span = tracy_client::span!($name);
    };
}

#[macro_export]
#[cfg(not(feature = "profile-with-tracy"))]
macro_rules! tracy_span {
    ($name:expr) => {};
}

/// Mark a presented frame.
#[macro_export]
#[cfg(feature = "profile-with-tracy")]
macro_rules! tracy_frame_mark {
    () => {
        tracy_client::Client::running().map(|c| c.frame_mark());
    };
}

#[macro_export]
#[cfg(not(feature = "profile-with-tracy"))]
macro_rules! tracy_frame_mark {
    () => {};
}

/// Plot a value over time (refresh rate, plane count).
#[macro_export]
#[cfg(feature = "profile-with-tracy")]
macro_rules! tracy_plot {
    ($name:expr, $value:expr) => {{
        static PLOT: std::sync::OnceLock<tracy_client::PlotName> = std::sync::OnceLock::new();
        let name = PLOT.get_or_init(|| tracy_client::plot_name!($name));
        tracy_client::Client::running().map(|c| c.plot(*name, $value as f64));
    }};
}

#[macro_export]
#[cfg(not(feature = "profile-with-tracy"))]
macro_rules! tracy_plot {
    ($name:expr, $value:expr) => {};
}
