//! Pointer cursor presentation.
//!
//! Two paths: when the compositor offers `wp_cursor_shape_manager_v1` the
//! cursor is set by shape name per seat, no pixels involved. Otherwise an
//! xcursor theme is loaded at `XCURSOR_SIZE` (default 24) times the output
//! scale and presented on a dedicated cursor surface; animated cursors step
//! through their frames on a frame callback. Theme load failure degrades to
//! no visible cursor change.

use wayland_client::protocol::wl_surface::WlSurface;
use wayland_client::QueueHandle;
use wayland_cursor::CursorTheme;
use wayland_protocols::wp::cursor_shape::v1::client::wp_cursor_shape_device_v1::Shape;

use crate::display::{FrameKind, WaylandDisplay};

const DEFAULT_CURSOR_SIZE: u32 = 24;

/// The cursors the launcher distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorKind {
    #[default]
    Default,
    Pointer,
    Text,
}

impl CursorKind {
    /// Xcursor names to try, most specific first. Themes disagree on
    /// naming, hence the fallbacks.
    fn names(self) -> &'static [&'static str] {
        match self {
            CursorKind::Default => &["default", "left_ptr", "top_left_arrow", "left-arrow"],
            CursorKind::Pointer => &["pointer", "hand1"],
            CursorKind::Text => &["text", "xterm"],
        }
    }

    fn shape(self) -> Shape {
        match self {
            CursorKind::Default => Shape::Default,
            CursorKind::Pointer => Shape::Pointer,
            CursorKind::Text => Shape::Text,
        }
    }
}

pub(crate) struct CursorManager {
    kind: CursorKind,
    theme: Option<CursorTheme>,
    /// Scale the theme was loaded for; a mismatch forces a reload.
    theme_scale: i32,
    surface: Option<WlSurface>,
    frame_pending: bool,
}

impl CursorManager {
    pub fn new() -> Self {
        CursorManager {
            kind: CursorKind::default(),
            theme: None,
            theme_scale: 0,
            surface: None,
            frame_pending: false,
        }
    }

    /// Drops everything backed by the compositor or shm. Called when either
    /// global disappears.
    pub fn teardown(&mut self) {
        if let Some(surface) = self.surface.take() {
            surface.destroy();
        }
        self.theme = None;
        self.theme_scale = 0;
        self.frame_pending = false;
    }

    /// The pointer left our surface; stop stepping any animation.
    pub fn pointer_left(&mut self) {
        self.frame_pending = false;
    }
}

fn base_cursor_size() -> u32 {
    std::env::var("XCURSOR_SIZE")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(DEFAULT_CURSOR_SIZE)
}

impl WaylandDisplay {
    /// Switches the cursor image for every seat whose pointer is over the
    /// surface. No-op when the kind is unchanged.
    pub fn set_cursor_kind(&mut self, kind: CursorKind) {
        if self.cursor.kind == kind {
            return;
        }
        self.cursor.kind = kind;
        let qh = self.qh.clone();
        let seat_names: Vec<u32> = self
            .seats
            .iter()
            .filter(|(_, seat)| seat.pointer().is_some())
            .map(|(name, _)| *name)
            .collect();
        for seat_name in seat_names {
            self.apply_cursor_to_seat(seat_name, &qh);
        }
    }

    /// Presents the current cursor kind on one seat, preferring the
    /// cursor-shape fast path.
    pub(crate) fn apply_cursor_to_seat(&mut self, seat_name: u32, qh: &QueueHandle<WaylandDisplay>) {
        let Some(seat) = self.seats.get(&seat_name) else {
            return;
        };
        if seat.pointer().is_none() {
            return;
        }
        if let Some(device) = &seat.cursor_shape_device {
            device.set_shape(seat.pointer_serial, self.cursor.kind.shape());
            return;
        }
        if self.ensure_cursor_theme(qh) {
            self.show_cursor_frame(seat_name, 0, qh);
        }
    }

    /// Steps an animated cursor; wired to the cursor frame callback.
    pub(crate) fn cursor_frame(&mut self, time: u32, qh: &QueueHandle<WaylandDisplay>) {
        self.cursor.frame_pending = false;
        let Some(seat_name) = self.last_seat else {
            return;
        };
        self.show_cursor_frame(seat_name, time, qh);
    }

    /// Loads (or reloads, on scale change) the xcursor theme and the cursor
    /// surface. Returns `false` when no theme is available; the cursor then
    /// simply keeps whatever the compositor shows.
    fn ensure_cursor_theme(&mut self, qh: &QueueHandle<WaylandDisplay>) -> bool {
        let scale = self.scale.max(1);
        if self.cursor.theme.is_none() || self.cursor.theme_scale != scale {
            let Some((_, shm)) = &self.globals.shm else {
                return false;
            };
            let size = base_cursor_size() * scale as u32;
            match CursorTheme::load(&self.conn, shm.clone(), size) {
                Ok(theme) => {
                    tracing::debug!(size, "cursor theme loaded");
                    self.cursor.theme = Some(theme);
                    self.cursor.theme_scale = scale;
                }
                Err(err) => {
                    tracing::debug!("cursor theme unavailable: {err}");
                    self.cursor.theme = None;
                    return false;
                }
            }
        }
        if self.cursor.surface.is_none() {
            let Some((_, compositor)) = &self.globals.compositor else {
                return false;
            };
            self.cursor.surface = Some(compositor.create_surface(qh, ()));
        }
        true
    }

    fn show_cursor_frame(&mut self, seat_name: u32, millis: u32, qh: &QueueHandle<WaylandDisplay>) {
        let Some(seat) = self.seats.get(&seat_name) else {
            return;
        };
        let Some(pointer) = seat.pointer() else {
            return;
        };
        let pointer = pointer.clone();
        let serial = seat.pointer_serial;
        let Some(surface) = self.cursor.surface.clone() else {
            return;
        };
        let scale = self.cursor.theme_scale.max(1);
        let kind = self.cursor.kind;

        let Some(theme) = self.cursor.theme.as_mut() else {
            return;
        };
        let Some(name) = kind
            .names()
            .iter()
            .copied()
            .find(|name| theme.get_cursor(name).is_some())
        else {
            tracing::debug!(?kind, "no cursor image in theme");
            return;
        };
        let Some(cursor) = theme.get_cursor(name) else {
            return;
        };

        let frame = cursor.frame_and_duration(millis);
        let image = &cursor[frame.frame_index];
        let buffer: &wayland_client::protocol::wl_buffer::WlBuffer = image;
        let (hotspot_x, hotspot_y) = image.hotspot();
        let animated = cursor.image_count() > 1;

        surface.attach(Some(buffer), 0, 0);
        surface.set_buffer_scale(scale);
        surface.damage(0, 0, i32::MAX, i32::MAX);
        if animated && !self.cursor.frame_pending {
            surface.frame(qh, FrameKind::Cursor);
            self.cursor.frame_pending = true;
        }
        surface.commit();
        pointer.set_cursor(
            serial,
            Some(&surface),
            hotspot_x as i32 / scale,
            hotspot_y as i32 / scale,
        );
    }
}
