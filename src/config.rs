//! Runtime configuration for the display core.
//!
//! The launcher frontend constructs one of these at startup and hands it to
//! [`WaylandDisplay::connect`](crate::WaylandDisplay::connect). There is no
//! process-global state; everything flows through this value.

/// Where the surface is anchored on the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Location {
    NorthWest,
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    #[default]
    Center,
}

/// Display configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Bind the surface to the output with this `wl_output` name. When unset
    /// (or when no output matches) the compositor picks one.
    pub monitor: Option<String>,

    /// Whether pointer motion alone selects the hovered entry.
    pub hover_select: bool,

    /// Grab keys that would otherwise be swallowed by compositor-global
    /// shortcuts, when the compositor supports the inhibitor protocol.
    pub inhibit_shortcuts: bool,
}
