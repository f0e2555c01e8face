//! Error types for the display core.

use std::io;

use wayland_client::{ConnectError, DispatchError};

/// Errors that abort display setup.
///
/// Everything in here is fatal: without a compositor, shared memory, a
/// layer shell, at least one output and one seat there is no way to put a
/// launcher surface on screen.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// Failed to connect to a Wayland compositor.
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Error while dispatching events during the startup round-trips.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The initial registry round-trip failed.
    #[error(transparent)]
    Registry(#[from] wayland_client::globals::GlobalError),

    /// The initial registry listing did not advertise a required global.
    #[error("compositor does not advertise {0}")]
    MissingGlobal(&'static str),

    /// A required global is older than the minimum version this client
    /// knows how to talk to.
    #[error("{interface} version {advertised} is below the supported minimum {minimum}")]
    Version {
        interface: &'static str,
        advertised: u32,
        minimum: u32,
    },

    /// No output was advertised after the initial round-trip.
    #[error("no outputs advertised")]
    NoOutputs,

    /// No seat was advertised after the initial round-trip.
    #[error("no seats advertised")]
    NoSeats,

    /// Failed to register the connection with the event loop.
    #[error(transparent)]
    EventLoop(#[from] calloop::Error),
}

/// Buffer pool allocation errors.
///
/// These are recoverable: the caller presents nothing for the current frame
/// and may retry later (for example after the next configure).
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The requested width does not fit a 32-bit-per-pixel stride.
    #[error("stride overflow for buffer width {0}")]
    StrideOverflow(i32),

    /// Creating or sizing the anonymous shared memory file failed.
    #[error("shm allocation failed: {0}")]
    Allocate(#[from] rustix::io::Errno),

    /// Mapping the shared memory failed.
    #[error("shm mapping failed: {0}")]
    Map(#[from] io::Error),
}
