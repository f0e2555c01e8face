//! Global registry bookkeeping.
//!
//! The compositor advertises its capabilities as named globals that can
//! appear and disappear at any time. Process-wide singletons live in
//! [`Globals`]; multi-instance kinds (seats, outputs) live in keyed maps on
//! the display, keyed by the server-assigned numeric name rather than proxy
//! identity. Removal is routed first-match through singletons, then seats,
//! then outputs.

use wayland_client::{
    globals::GlobalListContents,
    protocol::{
        wl_compositor::WlCompositor,
        wl_data_device_manager::WlDataDeviceManager,
        wl_output::WlOutput,
        wl_registry::{self, WlRegistry},
        wl_seat::WlSeat,
        wl_shm::WlShm,
    },
    Connection, Dispatch, Proxy, QueueHandle,
};
use wayland_protocols::wp::cursor_shape::v1::client::wp_cursor_shape_manager_v1::WpCursorShapeManagerV1;
use wayland_protocols::wp::keyboard_shortcuts_inhibit::zv1::client::zwp_keyboard_shortcuts_inhibit_manager_v1::ZwpKeyboardShortcutsInhibitManagerV1;
use wayland_protocols::wp::primary_selection::zv1::client::zwp_primary_selection_device_manager_v1::ZwpPrimarySelectionDeviceManagerV1;
use wayland_protocols_wlr::layer_shell::v1::client::zwlr_layer_shell_v1::ZwlrLayerShellV1;

use crate::display::WaylandDisplay;
use crate::error::SetupError;
use crate::output::Output;
use crate::seat::Seat;

// Versions we know how to speak. Binding clamps to
// min(advertised, supported); seats and outputs additionally carry a hard
// minimum below which setup fails.
const COMPOSITOR_VERSION: u32 = 4;
const SHM_VERSION: u32 = 1;
const LAYER_SHELL_VERSION: u32 = 4;
const DATA_DEVICE_MANAGER_VERSION: u32 = 3;
const PRIMARY_SELECTION_VERSION: u32 = 1;
const SHORTCUTS_INHIBIT_VERSION: u32 = 1;
const CURSOR_SHAPE_VERSION: u32 = 1;
pub(crate) const SEAT_VERSION: u32 = 8;
pub(crate) const SEAT_MIN_VERSION: u32 = 5;
pub(crate) const OUTPUT_VERSION: u32 = 4;
pub(crate) const OUTPUT_MIN_VERSION: u32 = 2;

/// The singleton kinds the removal path can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SingletonKind {
    Compositor,
    Shm,
    LayerShell,
    DataDeviceManager,
    PrimarySelection,
    ShortcutsInhibit,
    CursorShape,
}

/// Bound process-wide singletons, each paired with its global name.
#[derive(Debug, Default)]
pub(crate) struct Globals {
    pub compositor: Option<(u32, WlCompositor)>,
    pub shm: Option<(u32, WlShm)>,
    pub layer_shell: Option<(u32, ZwlrLayerShellV1)>,
    pub data_device_manager: Option<(u32, WlDataDeviceManager)>,
    pub primary_selection: Option<(u32, ZwpPrimarySelectionDeviceManagerV1)>,
    pub shortcuts_inhibit: Option<(u32, ZwpKeyboardShortcutsInhibitManagerV1)>,
    pub cursor_shape: Option<(u32, WpCursorShapeManagerV1)>,
}

impl Globals {
    /// Checks the capabilities a launcher surface cannot exist without.
    pub fn require(&self) -> Result<(), SetupError> {
        if self.compositor.is_none() {
            return Err(SetupError::MissingGlobal("wl_compositor"));
        }
        if self.shm.is_none() {
            return Err(SetupError::MissingGlobal("wl_shm"));
        }
        if self.layer_shell.is_none() {
            return Err(SetupError::MissingGlobal("zwlr_layer_shell_v1"));
        }
        Ok(())
    }

    fn names(&self) -> Vec<(SingletonKind, u32)> {
        let mut names = Vec::with_capacity(7);
        let mut push = |kind, slot: Option<u32>| {
            if let Some(name) = slot {
                names.push((kind, name));
            }
        };
        push(SingletonKind::Compositor, self.compositor.as_ref().map(|g| g.0));
        push(SingletonKind::Shm, self.shm.as_ref().map(|g| g.0));
        push(SingletonKind::LayerShell, self.layer_shell.as_ref().map(|g| g.0));
        push(
            SingletonKind::DataDeviceManager,
            self.data_device_manager.as_ref().map(|g| g.0),
        );
        push(
            SingletonKind::PrimarySelection,
            self.primary_selection.as_ref().map(|g| g.0),
        );
        push(
            SingletonKind::ShortcutsInhibit,
            self.shortcuts_inhibit.as_ref().map(|g| g.0),
        );
        push(SingletonKind::CursorShape, self.cursor_shape.as_ref().map(|g| g.0));
        names
    }
}

/// Cleanup path a removed global name routes to. Every name belongs to
/// exactly one category; the first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Removal {
    Singleton(SingletonKind),
    Seat,
    Output,
    Unknown,
}

pub(crate) fn route_removal(
    singletons: &[(SingletonKind, u32)],
    seats: &[u32],
    outputs: &[u32],
    name: u32,
) -> Removal {
    if let Some((kind, _)) = singletons.iter().find(|(_, n)| *n == name) {
        Removal::Singleton(*kind)
    } else if seats.contains(&name) {
        Removal::Seat
    } else if outputs.contains(&name) {
        Removal::Output
    } else {
        Removal::Unknown
    }
}

impl WaylandDisplay {
    /// Binds a recognized global. Shared between the initial listing and
    /// dynamic advertisements; version errors are fatal only at startup,
    /// callers on the dynamic path log and skip instead.
    pub(crate) fn register_global(
        &mut self,
        registry: &WlRegistry,
        qh: &QueueHandle<WaylandDisplay>,
        name: u32,
        interface: &str,
        version: u32,
    ) -> Result<(), SetupError> {
        match interface {
            "wl_compositor" => {
                let proxy =
                    registry.bind::<WlCompositor, _, _>(name, version.min(COMPOSITOR_VERSION), qh, ());
                self.globals.compositor = Some((name, proxy));
            }
            "wl_shm" => {
                let proxy = registry.bind::<WlShm, _, _>(name, version.min(SHM_VERSION), qh, ());
                self.globals.shm = Some((name, proxy));
            }
            "zwlr_layer_shell_v1" => {
                let proxy = registry
                    .bind::<ZwlrLayerShellV1, _, _>(name, version.min(LAYER_SHELL_VERSION), qh, ());
                self.globals.layer_shell = Some((name, proxy));
            }
            "wl_data_device_manager" => {
                let proxy = registry.bind::<WlDataDeviceManager, _, _>(
                    name,
                    version.min(DATA_DEVICE_MANAGER_VERSION),
                    qh,
                    (),
                );
                self.globals.data_device_manager = Some((name, proxy));
                self.ensure_seat_devices(qh);
            }
            "zwp_primary_selection_device_manager_v1" => {
                let proxy = registry.bind::<ZwpPrimarySelectionDeviceManagerV1, _, _>(
                    name,
                    version.min(PRIMARY_SELECTION_VERSION),
                    qh,
                    (),
                );
                self.globals.primary_selection = Some((name, proxy));
                self.ensure_seat_devices(qh);
            }
            "zwp_keyboard_shortcuts_inhibit_manager_v1" => {
                let proxy = registry.bind::<ZwpKeyboardShortcutsInhibitManagerV1, _, _>(
                    name,
                    version.min(SHORTCUTS_INHIBIT_VERSION),
                    qh,
                    (),
                );
                self.globals.shortcuts_inhibit = Some((name, proxy));
            }
            "wp_cursor_shape_manager_v1" => {
                let proxy = registry.bind::<WpCursorShapeManagerV1, _, _>(
                    name,
                    version.min(CURSOR_SHAPE_VERSION),
                    qh,
                    (),
                );
                self.globals.cursor_shape = Some((name, proxy));
            }
            "wl_seat" => {
                if version < SEAT_MIN_VERSION {
                    return Err(SetupError::Version {
                        interface: "wl_seat",
                        advertised: version,
                        minimum: SEAT_MIN_VERSION,
                    });
                }
                let proxy = registry.bind::<WlSeat, _, _>(name, version.min(SEAT_VERSION), qh, name);
                self.seats.insert(name, Seat::new(name, proxy));
                self.ensure_seat_devices(qh);
            }
            "wl_output" => {
                if version < OUTPUT_MIN_VERSION {
                    return Err(SetupError::Version {
                        interface: "wl_output",
                        advertised: version,
                        minimum: OUTPUT_MIN_VERSION,
                    });
                }
                let proxy =
                    registry.bind::<WlOutput, _, _>(name, version.min(OUTPUT_VERSION), qh, name);
                self.outputs.insert(name, Output::new(name, proxy));
            }
            _ => {}
        }
        Ok(())
    }

    fn remove_singleton(&mut self, kind: SingletonKind) {
        match kind {
            SingletonKind::Compositor => {
                // A cursor surface cannot outlive the compositor it was
                // created from.
                self.cursor.teardown();
                self.globals.compositor = None;
            }
            SingletonKind::Shm => {
                self.cursor.teardown();
                self.globals.shm = None;
            }
            SingletonKind::LayerShell => {
                if let Some((_, shell)) = self.globals.layer_shell.take() {
                    if shell.version() >= 3 {
                        shell.destroy();
                    }
                }
            }
            SingletonKind::DataDeviceManager => {
                self.globals.data_device_manager = None;
            }
            SingletonKind::PrimarySelection => {
                if let Some((_, manager)) = self.globals.primary_selection.take() {
                    manager.destroy();
                }
            }
            SingletonKind::ShortcutsInhibit => {
                if let Some((_, manager)) = self.globals.shortcuts_inhibit.take() {
                    manager.destroy();
                }
            }
            SingletonKind::CursorShape => {
                if let Some((_, manager)) = self.globals.cursor_shape.take() {
                    manager.destroy();
                }
            }
        }
    }

    fn handle_global_removed(&mut self, name: u32) {
        let singletons = self.globals.names();
        let seats: Vec<u32> = self.seats.keys().copied().collect();
        let outputs: Vec<u32> = self.outputs.keys().copied().collect();

        match route_removal(&singletons, &seats, &outputs, name) {
            Removal::Singleton(kind) => {
                tracing::debug!(name, ?kind, "singleton global removed");
                self.remove_singleton(kind);
            }
            Removal::Seat => {
                tracing::debug!(name, "seat removed");
                if self.last_seat == Some(name) {
                    self.last_seat = None;
                }
                if let Some(seat) = self.seats.remove(&name) {
                    seat.release(&self.loop_handle);
                }
            }
            Removal::Output => {
                tracing::debug!(name, "output removed");
                if let Some(output) = self.outputs.remove(&name) {
                    output.release();
                }
            }
            // A name we never bound (or an unrecognized interface).
            Removal::Unknown => {}
        }
    }
}

impl Dispatch<WlRegistry, GlobalListContents> for WaylandDisplay {
    fn event(
        state: &mut WaylandDisplay,
        registry: &WlRegistry,
        event: wl_registry::Event,
        _data: &GlobalListContents,
        _conn: &Connection,
        qh: &QueueHandle<WaylandDisplay>,
    ) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } => {
                if let Err(err) = state.register_global(registry, qh, name, &interface, version) {
                    tracing::warn!(name, %interface, "skipping hotplugged global: {err}");
                }
            }
            wl_registry::Event::GlobalRemove { name } => {
                state.handle_global_removed(name);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLETONS: &[(SingletonKind, u32)] = &[
        (SingletonKind::Compositor, 1),
        (SingletonKind::Shm, 2),
        (SingletonKind::LayerShell, 3),
    ];

    #[test]
    fn each_name_routes_to_one_path() {
        let seats = [10, 11];
        let outputs = [20];

        assert_eq!(
            route_removal(SINGLETONS, &seats, &outputs, 2),
            Removal::Singleton(SingletonKind::Shm)
        );
        assert_eq!(route_removal(SINGLETONS, &seats, &outputs, 11), Removal::Seat);
        assert_eq!(route_removal(SINGLETONS, &seats, &outputs, 20), Removal::Output);
    }

    #[test]
    fn unknown_name_is_a_noop() {
        assert_eq!(route_removal(SINGLETONS, &[], &[], 99), Removal::Unknown);
    }

    #[test]
    fn singletons_win_over_instances() {
        // Shared numbers cannot happen on a real connection, but the routing
        // must still be deterministic.
        let seats = [1];
        assert_eq!(
            route_removal(SINGLETONS, &seats, &[], 1),
            Removal::Singleton(SingletonKind::Compositor)
        );
    }
}
