//! The layer surface and its configure lifecycle.
//!
//! The overlay lives on a `zwlr_layer_surface_v1`. Creation requests size
//! (0, 0) anchored to all four edges, which asks the compositor to report
//! the usable area through the first `configure` instead of us prescribing
//! one. Every `configure` must be acknowledged with its serial before the
//! compositor will send another. A compositor-initiated `closed` is not an
//! error: both protocol objects are destroyed and the surface is recreated
//! from scratch, with the caller told to rebuild its buffer pools.

use wayland_client::{
    protocol::{wl_surface, wl_surface::WlSurface},
    Connection, Dispatch, Proxy, QueueHandle,
};
use wayland_protocols::wp::keyboard_shortcuts_inhibit::zv1::client::zwp_keyboard_shortcuts_inhibitor_v1::ZwpKeyboardShortcutsInhibitorV1;
use wayland_protocols_wlr::layer_shell::v1::client::{
    zwlr_layer_shell_v1::Layer,
    zwlr_layer_surface_v1::{self, Anchor, KeyboardInteractivity, ZwlrLayerSurfaceV1},
};

use crate::config::Location;
use crate::display::{Event, FrameKind, WaylandDisplay};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Unconfigured,
    Configured,
    Destroyed,
}

/// Configure bookkeeping, separate from the protocol objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SurfaceCore {
    pub phase: Phase,
    pub width: u32,
    pub height: u32,
}

impl SurfaceCore {
    fn new() -> Self {
        SurfaceCore {
            phase: Phase::Unconfigured,
            width: 0,
            height: 0,
        }
    }

    /// Records the proposed geometry and returns the serial that must be
    /// acknowledged, transitioning to `Configured`.
    fn configure(&mut self, serial: u32, width: u32, height: u32) -> u32 {
        self.width = width;
        self.height = height;
        self.phase = Phase::Configured;
        serial
    }

    /// Records a requested size so readers see it before the compositor's
    /// next configure confirms (or overrides) it.
    fn request(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }
}

/// The live overlay surface.
#[derive(Debug)]
pub(crate) struct Surface {
    pub wl_surface: WlSurface,
    pub layer_surface: ZwlrLayerSurfaceV1,
    pub core: SurfaceCore,
    inhibitors: Vec<ZwpKeyboardShortcutsInhibitorV1>,
}

/// Maps a placement location to the layer-shell anchor bitmask.
///
/// Center means no anchors at all; a zero width or height additionally
/// anchors the opposite edge pair, which the protocol reads as "fill that
/// axis".
pub(crate) fn anchor_for(location: Location, width: u32, height: u32) -> Anchor {
    let mut anchor = match location {
        Location::NorthWest => Anchor::Top | Anchor::Left,
        Location::North => Anchor::Top,
        Location::NorthEast => Anchor::Top | Anchor::Right,
        Location::East => Anchor::Right,
        Location::SouthEast => Anchor::Bottom | Anchor::Right,
        Location::South => Anchor::Bottom,
        Location::SouthWest => Anchor::Bottom | Anchor::Left,
        Location::West => Anchor::Left,
        Location::Center => Anchor::empty(),
    };
    if height == 0 {
        anchor |= Anchor::Top | Anchor::Bottom;
    }
    if width == 0 {
        anchor |= Anchor::Left | Anchor::Right;
    }
    anchor
}

impl WaylandDisplay {
    /// Creates the overlay surface. Called once at setup and again whenever
    /// the compositor closes the surface under us.
    pub(crate) fn create_surface(&mut self, qh: &QueueHandle<WaylandDisplay>) {
        let (Some((_, compositor)), Some((_, layer_shell))) =
            (&self.globals.compositor, &self.globals.layer_shell)
        else {
            tracing::warn!("cannot create surface without compositor and layer shell");
            return;
        };

        let wl_surface = compositor.create_surface(qh, ());
        let bound_output = self.config.monitor.as_deref().and_then(|wanted| {
            self.outputs
                .values()
                .find(|output| output.name.as_deref() == Some(wanted))
                .map(|output| &output.output)
        });
        if self.config.monitor.is_some() && bound_output.is_none() {
            tracing::warn!(
                monitor = self.config.monitor.as_deref().unwrap_or(""),
                "configured monitor not present, letting the compositor choose"
            );
        }

        let layer_surface = layer_shell.get_layer_surface(
            &wl_surface,
            bound_output,
            Layer::Overlay,
            String::from("beacon"),
            qh,
            (),
        );
        // Zero size plus full anchoring: the compositor answers with the
        // usable area in the first configure.
        layer_surface.set_anchor(Anchor::Top | Anchor::Left | Anchor::Right | Anchor::Bottom);
        layer_surface.set_size(0, 0);
        layer_surface.set_keyboard_interactivity(KeyboardInteractivity::Exclusive);

        let mut inhibitors = Vec::new();
        if self.config.inhibit_shortcuts {
            if let Some((_, manager)) = &self.globals.shortcuts_inhibit {
                for seat in self.seats.values() {
                    inhibitors.push(manager.inhibit_shortcuts(&wl_surface, &seat.seat, qh, ()));
                }
            }
        }

        // One frame callback is kept pending from here on; the done handler
        // re-arms it. Recreation starts a new chain, so a done still queued
        // for the old surface is dropped instead of forking a second chain.
        let token = self.frame_chain.advance();
        wl_surface.frame(qh, FrameKind::Surface(token));
        wl_surface.commit();

        self.surface = Some(Surface {
            wl_surface,
            layer_surface,
            core: SurfaceCore::new(),
            inhibitors,
        });
    }

    /// Tears the surface down. Idempotent; safe in any phase.
    pub fn destroy_surface(&mut self) {
        if let Some(mut surface) = self.surface.take() {
            for inhibitor in surface.inhibitors.drain(..) {
                inhibitor.destroy();
            }
            surface.layer_surface.destroy();
            surface.wl_surface.destroy();
            surface.core.phase = Phase::Destroyed;
        }
    }

    /// Requests a size and position for the surface.
    ///
    /// Margins are passed through to the compositor even when `location` is
    /// `Center`: with no anchors set they have no effect. That is protocol
    /// behavior, kept as-is.
    pub fn set_placement(
        &mut self,
        width: u32,
        height: u32,
        x_margin: i32,
        y_margin: i32,
        location: Location,
    ) {
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        surface.core.request(width, height);
        surface.layer_surface.set_size(width, height);
        surface
            .layer_surface
            .set_anchor(anchor_for(location, width, height));
        surface
            .layer_surface
            .set_margin(y_margin, -x_margin, -y_margin, x_margin);
        surface.wl_surface.commit();
    }

    /// Covers the whole output, ignoring exclusive zones of other layer
    /// surfaces (panels and the like). The resulting configure carries the
    /// new size; buffers must be rebuilt for it.
    pub fn set_fullscreen(&mut self) {
        let Some(surface) = &self.surface else {
            return;
        };
        surface.layer_surface.set_exclusive_zone(-1);
        surface.layer_surface.set_size(0, 0);
        surface
            .layer_surface
            .set_anchor(Anchor::Top | Anchor::Left | Anchor::Right | Anchor::Bottom);
        surface.wl_surface.commit();
        self.push_event(Event::PoolRefresh);
    }

    /// Last configured size, (0, 0) before the first configure.
    pub fn surface_size(&self) -> (u32, u32) {
        self.surface
            .as_ref()
            .map(|surface| (surface.core.width, surface.core.height))
            .unwrap_or((0, 0))
    }

    fn handle_surface_closed(&mut self, qh: &QueueHandle<WaylandDisplay>) {
        // Output unplug or similar; recreate and tell the caller to rebuild
        // its pools at whatever size the next configure reports.
        tracing::debug!("surface closed by the compositor, recreating");
        self.destroy_surface();
        self.create_surface(qh);
        self.push_event(Event::PoolRefresh);
    }
}

impl Dispatch<ZwlrLayerSurfaceV1, ()> for WaylandDisplay {
    fn event(
        state: &mut WaylandDisplay,
        proxy: &ZwlrLayerSurfaceV1,
        event: zwlr_layer_surface_v1::Event,
        _data: &(),
        _conn: &Connection,
        qh: &QueueHandle<WaylandDisplay>,
    ) {
        match event {
            zwlr_layer_surface_v1::Event::Configure {
                serial,
                width,
                height,
            } => {
                let Some(surface) = state.surface.as_mut() else {
                    return;
                };
                if surface.layer_surface != *proxy {
                    // Configure for a surface we already destroyed.
                    return;
                }
                let ack = surface.core.configure(serial, width, height);
                surface.layer_surface.ack_configure(ack);
                tracing::debug!(serial, width, height, "surface configured");
                state.push_event(Event::Configured { width, height });
            }
            zwlr_layer_surface_v1::Event::Closed => {
                if state
                    .surface
                    .as_ref()
                    .is_some_and(|surface| surface.layer_surface == *proxy)
                {
                    state.handle_surface_closed(qh);
                }
            }
            _ => {}
        }
    }
}

impl Dispatch<WlSurface, ()> for WaylandDisplay {
    fn event(
        state: &mut WaylandDisplay,
        proxy: &WlSurface,
        event: wl_surface::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<WaylandDisplay>,
    ) {
        if let wl_surface::Event::Enter { output } = event {
            let is_overlay = state
                .surface
                .as_ref()
                .is_some_and(|surface| surface.wl_surface == *proxy);
            if !is_overlay {
                return;
            }
            let scale = state
                .outputs
                .values()
                .find(|entry| entry.output.id() == output.id())
                .map(|entry| entry.current.scale)
                .unwrap_or(1);
            if scale != state.scale {
                tracing::debug!(old = state.scale, new = scale, "buffer scale changed");
                state.scale = scale;
                proxy.set_buffer_scale(scale);
                // Existing pools are sized for the old scale.
                state.push_event(Event::PoolRefresh);
                state.push_event(Event::Redraw);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locations_map_to_documented_anchors() {
        let w = 300;
        let h = 200;
        assert_eq!(anchor_for(Location::NorthWest, w, h), Anchor::Top | Anchor::Left);
        assert_eq!(anchor_for(Location::North, w, h), Anchor::Top);
        assert_eq!(anchor_for(Location::NorthEast, w, h), Anchor::Top | Anchor::Right);
        assert_eq!(anchor_for(Location::East, w, h), Anchor::Right);
        assert_eq!(
            anchor_for(Location::SouthEast, w, h),
            Anchor::Bottom | Anchor::Right
        );
        assert_eq!(anchor_for(Location::South, w, h), Anchor::Bottom);
        assert_eq!(
            anchor_for(Location::SouthWest, w, h),
            Anchor::Bottom | Anchor::Left
        );
        assert_eq!(anchor_for(Location::West, w, h), Anchor::Left);
        assert_eq!(anchor_for(Location::Center, w, h), Anchor::empty());
    }

    #[test]
    fn zero_extent_fills_the_axis() {
        assert_eq!(
            anchor_for(Location::Center, 300, 0),
            Anchor::Top | Anchor::Bottom
        );
        assert_eq!(
            anchor_for(Location::Center, 0, 200),
            Anchor::Left | Anchor::Right
        );
        // Fill anchors apply regardless of location.
        assert_eq!(
            anchor_for(Location::North, 0, 200),
            Anchor::Top | Anchor::Left | Anchor::Right
        );
    }

    #[test]
    fn configure_acks_the_proposed_serial() {
        let mut core = SurfaceCore::new();
        assert_eq!(core.phase, Phase::Unconfigured);

        let ack = core.configure(1, 800, 30);
        assert_eq!(ack, 1);
        assert_eq!(core.phase, Phase::Configured);
        assert_eq!((core.width, core.height), (800, 30));
    }

    #[test]
    fn requested_size_is_visible_before_the_configure() {
        let mut core = SurfaceCore::new();
        core.request(800, 300);
        assert_eq!((core.width, core.height), (800, 300));

        // The compositor's answer still wins.
        core.configure(2, 640, 480);
        assert_eq!((core.width, core.height), (640, 480));
    }
}
