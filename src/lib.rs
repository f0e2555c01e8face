//! Wayland display core for the beacon launcher overlay.
//!
//! This crate owns the client side of the compositor conversation: the
//! global registry, a layer-shell overlay surface with its configure
//! handshake, triple-buffered shared-memory pools with lazy reclamation,
//! seat input aggregation (key repeat, pointer frame coalescing, 120-unit
//! scroll), clipboard retrieval over pipes, and cursor presentation.
//!
//! The frontend constructs a [`Config`], connects with
//! [`WaylandDisplay::connect`] against a calloop loop, and drains
//! [`Event`]s once per loop turn. Rendering is the caller's business; the
//! display hands out writable ARGB8888 canvases and presents them.
//!
//! ```no_run
//! use beacon::{Config, Event, WaylandDisplay};
//!
//! let mut event_loop = calloop::EventLoop::<WaylandDisplay>::try_new()?;
//! let mut display = WaylandDisplay::connect(Config::default(), event_loop.handle())?;
//! event_loop.run(None, &mut display, |display| {
//!     for event in display.take_events() {
//!         if let Event::Configured { width, height } = event {
//!             // allocate pools, draw, present
//!         }
//!     }
//! })?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod clipboard;
mod config;
mod cursor;
mod display;
mod error;
mod output;
mod pool;
mod registry;
mod seat;
mod surface;

pub use clipboard::ClipboardKind;
pub use config::{Config, Location};
pub use cursor::CursorKind;
pub use display::{Event, MouseButton, ScrollAxis, WaylandDisplay};
pub use error::{PoolError, SetupError};
pub use output::Geometry;
pub use pool::{PoolId, POOL_DEPTH};
