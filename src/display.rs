//! The display core: one connection, one dispatch state, one event stream.
//!
//! [`WaylandDisplay`] owns every protocol object and is the single
//! `Dispatch` target. Setup performs the only blocking round-trips of the
//! process: one inside `registry_queue_init` so the initial global listing
//! is complete before anything depends on it, one for output and seat
//! details, and one after surface creation for the first configure. After
//! that the connection is multiplexed into the host calloop loop and
//! everything is event-driven.
//!
//! Nothing calls back into the view collaborator during dispatch. Events
//! accumulate in an internal queue and the caller drains
//! [`take_events`](WaylandDisplay::take_events) once per loop turn.

use std::collections::HashMap;

use calloop::LoopHandle;
use calloop_wayland_source::WaylandSource;
use wayland_client::{
    delegate_noop,
    globals::registry_queue_init,
    protocol::{
        wl_callback::{self, WlCallback},
        wl_compositor::WlCompositor,
        wl_data_device_manager::WlDataDeviceManager,
        wl_data_offer::WlDataOffer,
        wl_shm::WlShm,
        wl_shm_pool::WlShmPool,
    },
    Connection, Dispatch, QueueHandle,
};
use wayland_protocols::wp::cursor_shape::v1::client::{
    wp_cursor_shape_device_v1::WpCursorShapeDeviceV1,
    wp_cursor_shape_manager_v1::WpCursorShapeManagerV1,
};
use wayland_protocols::wp::keyboard_shortcuts_inhibit::zv1::client::{
    zwp_keyboard_shortcuts_inhibit_manager_v1::ZwpKeyboardShortcutsInhibitManagerV1,
    zwp_keyboard_shortcuts_inhibitor_v1::ZwpKeyboardShortcutsInhibitorV1,
};
use wayland_protocols::wp::primary_selection::zv1::client::{
    zwp_primary_selection_device_manager_v1::ZwpPrimarySelectionDeviceManagerV1,
    zwp_primary_selection_offer_v1::ZwpPrimarySelectionOfferV1,
};
use wayland_protocols_wlr::layer_shell::v1::client::zwlr_layer_shell_v1::ZwlrLayerShellV1;

use crate::config::Config;
use crate::cursor::CursorManager;
use crate::error::SetupError;
use crate::output::{self, Output};
use crate::pool::{BufferPool, PoolId};
use crate::registry::Globals;
use crate::seat::Seat;
use crate::surface::Surface;

/// Identity of one link in the surface frame-callback chain, carried as the
/// callback's user data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FrameToken(u32);

/// What a pending `wl_callback` frame is pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameKind {
    Surface(FrameToken),
    Cursor,
}

/// Tracks which surface frame callback is the live one.
///
/// Surface recreation arms a fresh callback while the old surface's `done`
/// may still be queued; only the holder of the current token may re-arm, so
/// exactly one callback chain runs at any time and a stale `done` is simply
/// dropped.
#[derive(Debug, Default)]
pub(crate) struct FrameChain {
    current: u32,
}

impl FrameChain {
    /// Issues the token for the next callback, invalidating all prior ones.
    pub(crate) fn advance(&mut self) -> FrameToken {
        self.current = self.current.wrapping_add(1);
        FrameToken(self.current)
    }

    pub(crate) fn is_current(&self, token: FrameToken) -> bool {
        token.0 == self.current
    }
}

/// Mouse buttons the launcher cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollAxis {
    Vertical,
    Horizontal,
}

/// Events surfaced to the caller, drained once per loop turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The compositor proposed (and we acknowledged) a surface size.
    Configured { width: u32, height: u32 },
    /// The previous frame was consumed; the next one may be prepared.
    FrameReady,
    /// Buffer pools are stale (scale change, surface recreation) and must
    /// be freed and recreated at the current size and scale.
    PoolRefresh,
    /// Input was handled; repaint if anything is dirty.
    Redraw,
    /// Text produced by a key press, a repeat fire or an enter replay.
    KeyText(String),
    MouseMotion { x: f64, y: f64, hover: bool },
    MouseButton {
        button: MouseButton,
        pressed: bool,
        time: u32,
    },
    /// Whole scroll clicks; the sub-click remainder stays accumulated.
    Scroll { axis: ScrollAxis, steps: i32 },
}

/// Client-side display state for the launcher overlay.
pub struct WaylandDisplay {
    pub(crate) conn: Connection,
    pub(crate) qh: QueueHandle<WaylandDisplay>,
    pub(crate) loop_handle: LoopHandle<'static, WaylandDisplay>,
    pub(crate) config: Config,
    pub(crate) globals: Globals,
    pub(crate) outputs: HashMap<u32, Output>,
    pub(crate) seats: HashMap<u32, Seat>,
    /// Seat of the most recent serial-bearing event; target for clipboard
    /// and cursor requests.
    pub(crate) last_seat: Option<u32>,
    pub(crate) surface: Option<Surface>,
    pub(crate) pools: HashMap<PoolId, BufferPool>,
    next_pool: u32,
    pub(crate) clipboard_offer: Option<WlDataOffer>,
    pub(crate) primary_offer: Option<ZwpPrimarySelectionOfferV1>,
    pub(crate) cursor: CursorManager,
    pub(crate) frame_chain: FrameChain,
    /// Buffer scale of the output the surface is on.
    pub(crate) scale: i32,
    pending: Vec<Event>,
}

impl WaylandDisplay {
    /// Connects to the compositor named by `WAYLAND_DISPLAY`, binds the
    /// required globals, creates the overlay surface and registers the
    /// connection with the event loop.
    pub fn connect(
        config: Config,
        loop_handle: LoopHandle<'static, WaylandDisplay>,
    ) -> Result<WaylandDisplay, SetupError> {
        let conn = Connection::connect_to_env()?;
        let (global_list, mut event_queue) = registry_queue_init::<WaylandDisplay>(&conn)?;
        let qh = event_queue.handle();

        let mut display = WaylandDisplay {
            conn: conn.clone(),
            qh: qh.clone(),
            loop_handle,
            config,
            globals: Globals::default(),
            outputs: HashMap::new(),
            seats: HashMap::new(),
            last_seat: None,
            surface: None,
            pools: HashMap::new(),
            next_pool: 0,
            clipboard_offer: None,
            primary_offer: None,
            cursor: CursorManager::new(),
            frame_chain: FrameChain::default(),
            scale: 1,
            pending: Vec::new(),
        };

        for global in global_list.contents().clone_list() {
            display.register_global(
                global_list.registry(),
                &qh,
                global.name,
                &global.interface,
                global.version,
            )?;
        }
        display.globals.require()?;

        // Output geometry and seat capabilities must land before the
        // surface is created (placement may be bound to a named monitor).
        event_queue.roundtrip(&mut display)?;
        if display.outputs.is_empty() {
            return Err(SetupError::NoOutputs);
        }
        if display.seats.is_empty() {
            return Err(SetupError::NoSeats);
        }

        display.create_surface(&qh);
        // Wait for the first configure so the caller sees a usable size.
        event_queue.roundtrip(&mut display)?;

        WaylandSource::new(conn, event_queue)
            .insert(display.loop_handle.clone())
            .map_err(|err| SetupError::EventLoop(err.error))?;

        let outputs = display.outputs.len();
        let seats = display.seats.len();
        tracing::info!(outputs, seats, "display connected");
        Ok(display)
    }

    /// Drains the events accumulated since the last call. The caller runs
    /// this once per loop turn; handlers never call outward directly.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.pending)
    }

    pub(crate) fn push_event(&mut self, event: Event) {
        self.pending.push(event);
    }

    /// Current buffer scale.
    pub fn scale(&self) -> i32 {
        self.scale
    }

    /// Allocates a pool of three buffers at `width` x `height` logical
    /// pixels, scaled by the current buffer scale. `None` means no frame
    /// can be presented right now; callers may retry after the next
    /// configure.
    pub fn create_buffer_pool(&mut self, width: i32, height: i32) -> Option<PoolId> {
        let Some((_, shm)) = &self.globals.shm else {
            tracing::warn!("no wl_shm, cannot allocate buffers");
            return None;
        };
        let id = PoolId(self.next_pool);
        match BufferPool::create(shm, &self.qh, id, width, height, self.scale) {
            Ok(pool) => {
                self.next_pool = self.next_pool.wrapping_add(1);
                self.pools.insert(id, pool);
                Some(id)
            }
            Err(err) => {
                tracing::warn!("failed to allocate buffer pool: {err}");
                None
            }
        }
    }

    /// Next writable buffer of the pool, or `None` when the compositor
    /// holds all three (wait for the next `FrameReady`).
    pub fn acquire_buffer(&mut self, id: PoolId) -> Option<usize> {
        self.pools.get_mut(&id)?.acquire()
    }

    /// Pixel bytes of an acquired buffer.
    pub fn canvas(&mut self, id: PoolId, slot: usize) -> Option<&mut [u8]> {
        self.pools.get_mut(&id)?.canvas(slot)
    }

    /// Attaches the drawn buffer to the surface and commits. Ownership of
    /// the buffer passes to the compositor until its release notification.
    pub fn present(&mut self, id: PoolId, slot: usize) {
        let scale = self.scale;
        let Some(wl_surface) = self.surface.as_ref().map(|s| s.wl_surface.clone()) else {
            return;
        };
        let Some(pool) = self.pools.get_mut(&id) else {
            return;
        };
        let Some(buffer) = pool.mark_presented(slot) else {
            return;
        };
        wl_surface.attach(Some(buffer), 0, 0);
        wl_surface.set_buffer_scale(scale);
        wl_surface.damage(0, 0, i32::MAX, i32::MAX);
        wl_surface.commit();
    }

    /// Starts freeing a pool. The backing memory goes away once the
    /// compositor has released every buffer, possibly later.
    pub fn free_pool(&mut self, id: PoolId) {
        if let Some(pool) = self.pools.get_mut(&id) {
            if pool.begin_free() {
                self.pools.remove(&id);
            }
        }
    }

    /// Prints the monitor layout to stdout.
    pub fn dump_monitor_layout(&self) {
        output::dump_monitor_layout(self.outputs.values());
    }
}

impl Dispatch<WlCallback, FrameKind> for WaylandDisplay {
    fn event(
        state: &mut WaylandDisplay,
        _proxy: &WlCallback,
        event: wl_callback::Event,
        kind: &FrameKind,
        _conn: &Connection,
        qh: &QueueHandle<WaylandDisplay>,
    ) {
        if let wl_callback::Event::Done { callback_data } = event {
            match kind {
                FrameKind::Surface(token) => {
                    // A done from a surface that has since been destroyed or
                    // recreated; its chain ends here.
                    if !state.frame_chain.is_current(*token) {
                        return;
                    }
                    let Some(surface) = &state.surface else {
                        return;
                    };
                    // Keep exactly one frame callback pending; it becomes
                    // active with the caller's next commit.
                    let next = state.frame_chain.advance();
                    surface.wl_surface.frame(qh, FrameKind::Surface(next));
                    state.push_event(Event::FrameReady);
                }
                FrameKind::Cursor => state.cursor_frame(callback_data, qh),
            }
        }
    }
}

// Requests-only (or ignored-event) objects.
delegate_noop!(WaylandDisplay: ignore WlCompositor);
delegate_noop!(WaylandDisplay: ignore WlShm);
delegate_noop!(WaylandDisplay: ignore WlShmPool);
delegate_noop!(WaylandDisplay: ignore WlDataDeviceManager);
delegate_noop!(WaylandDisplay: ignore WlDataOffer);
delegate_noop!(WaylandDisplay: ignore ZwlrLayerShellV1);
delegate_noop!(WaylandDisplay: ignore ZwpPrimarySelectionDeviceManagerV1);
delegate_noop!(WaylandDisplay: ignore ZwpPrimarySelectionOfferV1);
delegate_noop!(WaylandDisplay: ignore ZwpKeyboardShortcutsInhibitManagerV1);
delegate_noop!(WaylandDisplay: ignore ZwpKeyboardShortcutsInhibitorV1);
delegate_noop!(WaylandDisplay: ignore WpCursorShapeManagerV1);
delegate_noop!(WaylandDisplay: ignore WpCursorShapeDeviceV1);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_frame_callbacks_cannot_restart_the_chain() {
        let mut chain = FrameChain::default();
        let stale = chain.advance();

        // Surface recreated while `stale` was still queued: the new chain's
        // token supersedes it, so the old done neither re-arms nor emits.
        let fresh = chain.advance();
        assert!(!chain.is_current(stale));
        assert!(chain.is_current(fresh));

        // The live chain keeps exactly one token valid at a time.
        let next = chain.advance();
        assert!(!chain.is_current(fresh));
        assert!(chain.is_current(next));
    }
}
