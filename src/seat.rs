//! Seat handling: keyboard with repeat, pointer with frame coalescing.
//!
//! Raw pointer events only stage per-seat fields; the compositor's `frame`
//! event is the batch boundary at which staged state is flushed outward as
//! at most one motion, at most one button transition and the accumulated
//! scroll steps. Key repeat is a two-stage timer on the host loop: the
//! configured delay once, then the rate interval, each fire redelivering the
//! repeating key as a synthetic press until the matching release.

use std::io::Read;
use std::os::fd::OwnedFd;
use std::time::Duration;

use calloop::timer::{TimeoutAction, Timer};
use calloop::{LoopHandle, RegistrationToken};
use wayland_client::{
    protocol::{
        wl_keyboard::{self, KeyState, KeymapFormat, WlKeyboard},
        wl_pointer::{self, Axis, AxisSource, ButtonState, WlPointer},
        wl_seat::{self, Capability, WlSeat},
    },
    Connection, Dispatch, Proxy, QueueHandle, WEnum,
};
use wayland_protocols::wp::cursor_shape::v1::client::wp_cursor_shape_device_v1::WpCursorShapeDeviceV1;
use wayland_protocols::wp::primary_selection::zv1::client::zwp_primary_selection_device_v1::ZwpPrimarySelectionDeviceV1;
use xkbcommon::xkb;

use crate::display::{Event, MouseButton, ScrollAxis, WaylandDisplay};

// Linux evdev button codes.
const BTN_LEFT: u32 = 0x110;
const BTN_RIGHT: u32 = 0x111;
const BTN_MIDDLE: u32 = 0x112;

/// One logical scroll click in the high-resolution axis domain.
const SCROLL_STEP: i32 = 120;
/// Continuous (finger/touchpad) deltas are folded into the 120-unit domain
/// at this factor, so roughly six units of motion make one click.
const CONTINUOUS_SCALE: f64 = 20.0;

/// Key-repeat bookkeeping, separate from the timer registration.
///
/// At most one key repeats per seat. New repeat-info from the compositor
/// clears the current key; a rate of zero disables repeat entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RepeatState {
    key: Option<u32>,
    rate_ms: u32,
    delay_ms: u32,
}

impl RepeatState {
    fn new() -> Self {
        RepeatState {
            key: None,
            rate_ms: 0,
            delay_ms: 0,
        }
    }

    /// Returns `true` when a live timer must be cancelled.
    fn set_info(&mut self, rate_ms: u32, delay_ms: u32) -> bool {
        self.rate_ms = rate_ms;
        self.delay_ms = delay_ms;
        self.key.take().is_some()
    }

    /// A repeating key was pressed; returns the initial delay to arm, or
    /// `None` when repeat is disabled.
    fn press(&mut self, key: u32) -> Option<Duration> {
        if self.rate_ms == 0 {
            self.key = None;
            return None;
        }
        self.key = Some(key);
        Some(Duration::from_millis(u64::from(self.delay_ms)))
    }

    /// Returns `true` when the released key was the repeating one and the
    /// timer must be cancelled.
    fn release(&mut self, key: u32) -> bool {
        if self.key == Some(key) {
            self.key = None;
            true
        } else {
            false
        }
    }

    /// State for one timer expiry: the key to redeliver and the interval to
    /// the next fire, or `None` when the repeat was cancelled in between.
    fn fire(&self) -> Option<(u32, Duration)> {
        self.key
            .map(|key| (key, Duration::from_millis(u64::from(self.rate_ms))))
    }

    fn clear(&mut self) -> bool {
        self.key.take().is_some()
    }
}

/// Scroll accumulator in 120ths of a click, one per seat.
///
/// Draining emits whole steps by truncation and keeps the sign-preserving
/// remainder, so over any event sequence `value = steps * 120 + remainder`
/// holds exactly and no fraction of a click is ever lost.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScrollAccumulator {
    vertical: i32,
    horizontal: i32,
}

impl ScrollAccumulator {
    fn add(&mut self, axis: ScrollAxis, value_120: i32) {
        match axis {
            ScrollAxis::Vertical => self.vertical += value_120,
            ScrollAxis::Horizontal => self.horizontal += value_120,
        }
    }

    fn drain(&mut self) -> (i32, i32) {
        let v_steps = self.vertical / SCROLL_STEP;
        let h_steps = self.horizontal / SCROLL_STEP;
        self.vertical %= SCROLL_STEP;
        self.horizontal %= SCROLL_STEP;
        (v_steps, h_steps)
    }
}

/// Pointer state staged between `frame` boundaries.
#[derive(Debug, Default)]
struct PointerFrame {
    motion: Option<(f64, f64)>,
    /// Button code, pressed flag, timestamp and the pointer position at the
    /// time of the transition.
    button: Option<(u32, bool, u32, (f64, f64))>,
    /// Continuous per-axis deltas; folded into the 120-unit accumulator at
    /// the frame boundary, but only for finger/continuous sources (wheels
    /// deliver discrete events as well).
    continuous: [f64; 2],
    source: Option<AxisSource>,
}

impl PointerFrame {
    fn axis_index(axis: Axis) -> Option<usize> {
        match axis {
            Axis::VerticalScroll => Some(0),
            Axis::HorizontalScroll => Some(1),
            _ => None,
        }
    }
}

/// Everything we track for one `wl_seat`.
pub(crate) struct Seat {
    pub global_name: u32,
    pub seat: WlSeat,
    pub name: Option<String>,
    keyboard: Option<WlKeyboard>,
    pointer: Option<WlPointer>,
    xkb_context: xkb::Context,
    keymap: Option<xkb::Keymap>,
    xkb_state: Option<xkb::State>,
    repeat: RepeatState,
    repeat_timer: Option<RegistrationToken>,
    /// Last serial seen from this seat, for seat-scoped requests.
    pub serial: u32,
    /// Serial of the last pointer enter, required by set_cursor/set_shape.
    pub pointer_serial: u32,
    /// Last known pointer position on the surface.
    position: (f64, f64),
    frame: PointerFrame,
    scroll: ScrollAccumulator,
    pub cursor_shape_device: Option<WpCursorShapeDeviceV1>,
    pub data_device: Option<wayland_client::protocol::wl_data_device::WlDataDevice>,
    pub primary_device: Option<ZwpPrimarySelectionDeviceV1>,
}

impl Seat {
    pub fn new(global_name: u32, seat: WlSeat) -> Self {
        Seat {
            global_name,
            seat,
            name: None,
            keyboard: None,
            pointer: None,
            xkb_context: xkb::Context::new(xkb::CONTEXT_NO_FLAGS),
            keymap: None,
            xkb_state: None,
            repeat: RepeatState::new(),
            repeat_timer: None,
            serial: 0,
            pointer_serial: 0,
            position: (0.0, 0.0),
            frame: PointerFrame::default(),
            scroll: ScrollAccumulator::default(),
            cursor_shape_device: None,
            data_device: None,
            primary_device: None,
        }
    }

    pub fn pointer(&self) -> Option<&WlPointer> {
        self.pointer.as_ref()
    }

    fn release_keyboard(&mut self, loop_handle: &LoopHandle<'static, WaylandDisplay>) {
        if let Some(token) = self.repeat_timer.take() {
            loop_handle.remove(token);
        }
        self.repeat.clear();
        if let Some(keyboard) = self.keyboard.take() {
            keyboard.release();
        }
    }

    fn release_pointer(&mut self) {
        if let Some(device) = self.cursor_shape_device.take() {
            device.destroy();
        }
        if let Some(pointer) = self.pointer.take() {
            pointer.release();
        }
    }

    /// Full teardown on seat removal.
    pub fn release(mut self, loop_handle: &LoopHandle<'static, WaylandDisplay>) {
        self.release_keyboard(loop_handle);
        self.release_pointer();
        if let Some(device) = self.data_device.take() {
            if device.version() >= 2 {
                device.release();
            }
        }
        if let Some(device) = self.primary_device.take() {
            device.destroy();
        }
        self.seat.release();
    }
}

impl WaylandDisplay {
    /// Creates the per-seat clipboard devices for every seat that is still
    /// missing one. Safe to call repeatedly; the registry calls it on seat
    /// adds and on late manager advertisements, whichever comes second.
    pub(crate) fn ensure_seat_devices(&mut self, qh: &QueueHandle<WaylandDisplay>) {
        for seat in self.seats.values_mut() {
            if seat.data_device.is_none() {
                if let Some((_, manager)) = &self.globals.data_device_manager {
                    seat.data_device =
                        Some(manager.get_data_device(&seat.seat, qh, seat.global_name));
                }
            }
            if seat.primary_device.is_none() {
                if let Some((_, manager)) = &self.globals.primary_selection {
                    seat.primary_device =
                        Some(manager.get_device(&seat.seat, qh, seat.global_name));
                }
            }
        }
    }

    fn cancel_repeat(&mut self, seat_name: u32) {
        let token = self
            .seats
            .get_mut(&seat_name)
            .and_then(|seat| seat.repeat_timer.take());
        if let Some(token) = token {
            self.loop_handle.remove(token);
        }
    }

    fn arm_repeat(&mut self, seat_name: u32, delay: Duration) {
        self.cancel_repeat(seat_name);
        let timer = Timer::from_duration(delay);
        let registration =
            self.loop_handle
                .insert_source(timer, move |_deadline, _: &mut (), display| {
                    display.repeat_fire(seat_name)
                });
        match registration {
            Ok(token) => {
                if let Some(seat) = self.seats.get_mut(&seat_name) {
                    seat.repeat_timer = Some(token);
                }
            }
            Err(err) => tracing::warn!("failed to arm key repeat timer: {err}"),
        }
    }

    fn repeat_fire(&mut self, seat_name: u32) -> TimeoutAction {
        let Some(seat) = self.seats.get_mut(&seat_name) else {
            return TimeoutAction::Drop;
        };
        let Some((key, rate)) = seat.repeat.fire() else {
            seat.repeat_timer = None;
            return TimeoutAction::Drop;
        };
        self.deliver_key(seat_name, key);
        self.push_event(Event::Redraw);
        TimeoutAction::ToDuration(rate)
    }

    /// Translates a raw keycode into text through the seat's xkb state and
    /// emits it. Used by real presses, repeat fires and enter replay alike.
    fn deliver_key(&mut self, seat_name: u32, raw: u32) {
        let text = self.seats.get(&seat_name).and_then(|seat| {
            let state = seat.xkb_state.as_ref()?;
            // Protocol keycodes are offset by 8 from evdev.
            let text = state.key_get_utf8(xkb::Keycode::from(raw + 8));
            (!text.is_empty()).then_some(text)
        });
        if let Some(text) = text {
            self.push_event(Event::KeyText(text));
        }
    }

    fn key_repeats(&self, seat_name: u32, raw: u32) -> bool {
        self.seats
            .get(&seat_name)
            .and_then(|seat| seat.keymap.as_ref())
            .map(|keymap| keymap.key_repeats(xkb::Keycode::from(raw + 8)))
            .unwrap_or(false)
    }

    fn apply_keymap(&mut self, seat_name: u32, fd: OwnedFd, size: u32) {
        let Some(seat) = self.seats.get_mut(&seat_name) else {
            return;
        };
        let mut file = std::fs::File::from(fd);
        let mut raw = vec![0u8; size as usize];
        if let Err(err) = file.read_exact(&mut raw) {
            tracing::warn!("failed to read keymap: {err}");
            return;
        }
        // The buffer the compositor sends is NUL terminated.
        while raw.last() == Some(&0) {
            raw.pop();
        }
        let Ok(text) = String::from_utf8(raw) else {
            tracing::warn!("keymap is not valid utf8");
            return;
        };
        let keymap = xkb::Keymap::new_from_string(
            &seat.xkb_context,
            text,
            xkb::KEYMAP_FORMAT_TEXT_V1,
            xkb::KEYMAP_COMPILE_NO_FLAGS,
        );
        match keymap {
            Some(keymap) => {
                seat.xkb_state = Some(xkb::State::new(&keymap));
                seat.keymap = Some(keymap);
                tracing::debug!(seat = seat_name, "keymap compiled");
            }
            None => tracing::warn!(seat = seat_name, "keymap failed to compile"),
        }
    }

    fn handle_key(&mut self, seat_name: u32, serial: u32, raw: u32, pressed: bool) {
        if let Some(seat) = self.seats.get_mut(&seat_name) {
            seat.serial = serial;
        }
        self.last_seat = Some(seat_name);

        if pressed {
            self.deliver_key(seat_name, raw);
            if self.key_repeats(seat_name, raw) {
                let delay = self
                    .seats
                    .get_mut(&seat_name)
                    .and_then(|seat| seat.repeat.press(raw));
                if let Some(delay) = delay {
                    self.arm_repeat(seat_name, delay);
                }
            } else {
                // Any press ends the previous key's repeat, including keys
                // that do not repeat themselves (modifiers, say).
                let cancel = self
                    .seats
                    .get_mut(&seat_name)
                    .is_some_and(|seat| seat.repeat.clear());
                if cancel {
                    self.cancel_repeat(seat_name);
                }
            }
        } else {
            let cancel = self
                .seats
                .get_mut(&seat_name)
                .is_some_and(|seat| seat.repeat.release(raw));
            if cancel {
                self.cancel_repeat(seat_name);
            }
        }
        self.push_event(Event::Redraw);
    }

    /// Flushes the staged pointer state at the frame boundary.
    fn pointer_frame(&mut self, seat_name: u32) {
        let Some(seat) = self.seats.get_mut(&seat_name) else {
            return;
        };
        let frame = std::mem::take(&mut seat.frame);

        if matches!(
            frame.source,
            Some(AxisSource::Finger) | Some(AxisSource::Continuous)
        ) {
            for (index, axis) in [ScrollAxis::Vertical, ScrollAxis::Horizontal]
                .into_iter()
                .enumerate()
            {
                if frame.continuous[index] != 0.0 {
                    seat.scroll
                        .add(axis, (frame.continuous[index] * CONTINUOUS_SCALE) as i32);
                }
            }
        }
        let (v_steps, h_steps) = seat.scroll.drain();
        let hover = self.config.hover_select;

        if let Some((x, y)) = frame.motion {
            self.push_event(Event::MouseMotion { x, y, hover });
        }
        if let Some((code, pressed, time, (x, y))) = frame.button {
            let button = match code {
                BTN_LEFT => Some(MouseButton::Left),
                BTN_RIGHT => Some(MouseButton::Right),
                BTN_MIDDLE => Some(MouseButton::Middle),
                _ => None,
            };
            if let Some(button) = button {
                if pressed {
                    // Snap the selection to the press position before the
                    // button lands, whether or not motion arrived this frame.
                    self.push_event(Event::MouseMotion { x, y, hover: false });
                }
                self.push_event(Event::MouseButton {
                    button,
                    pressed,
                    time,
                });
            }
        }
        if v_steps != 0 {
            self.push_event(Event::Scroll {
                axis: ScrollAxis::Vertical,
                steps: v_steps,
            });
        }
        if h_steps != 0 {
            self.push_event(Event::Scroll {
                axis: ScrollAxis::Horizontal,
                steps: h_steps,
            });
        }
        self.push_event(Event::Redraw);
    }
}

impl Dispatch<WlSeat, u32> for WaylandDisplay {
    fn event(
        state: &mut WaylandDisplay,
        proxy: &WlSeat,
        event: wl_seat::Event,
        seat_name: &u32,
        _conn: &Connection,
        qh: &QueueHandle<WaylandDisplay>,
    ) {
        match event {
            wl_seat::Event::Capabilities {
                capabilities: WEnum::Value(capabilities),
            } => {
                let cursor_shape = state
                    .globals
                    .cursor_shape
                    .as_ref()
                    .map(|(_, manager)| manager.clone());
                let loop_handle = state.loop_handle.clone();
                let Some(seat) = state.seats.get_mut(seat_name) else {
                    return;
                };

                let wants_keyboard = capabilities.contains(Capability::Keyboard);
                if wants_keyboard && seat.keyboard.is_none() {
                    seat.keyboard = Some(proxy.get_keyboard(qh, *seat_name));
                } else if !wants_keyboard && seat.keyboard.is_some() {
                    seat.release_keyboard(&loop_handle);
                }

                let wants_pointer = capabilities.contains(Capability::Pointer);
                if wants_pointer && seat.pointer.is_none() {
                    let pointer = proxy.get_pointer(qh, *seat_name);
                    if let Some(manager) = cursor_shape {
                        seat.cursor_shape_device = Some(manager.get_pointer(&pointer, qh, ()));
                    }
                    seat.pointer = Some(pointer);
                } else if !wants_pointer && seat.pointer.is_some() {
                    seat.release_pointer();
                }
            }
            wl_seat::Event::Name { name } => {
                if let Some(seat) = state.seats.get_mut(seat_name) {
                    seat.name = Some(name);
                }
            }
            _ => {}
        }
    }
}

impl Dispatch<WlKeyboard, u32> for WaylandDisplay {
    fn event(
        state: &mut WaylandDisplay,
        _proxy: &WlKeyboard,
        event: wl_keyboard::Event,
        seat_name: &u32,
        _conn: &Connection,
        _qh: &QueueHandle<WaylandDisplay>,
    ) {
        match event {
            wl_keyboard::Event::Keymap { format, fd, size } => {
                if format == WEnum::Value(KeymapFormat::XkbV1) {
                    state.apply_keymap(*seat_name, fd, size);
                }
            }
            wl_keyboard::Event::Enter { serial, keys, .. } => {
                if let Some(seat) = state.seats.get_mut(seat_name) {
                    seat.serial = serial;
                }
                state.last_seat = Some(*seat_name);
                // Resync: the compositor reports keys already held on focus
                // gain. Replayed presses never arm the repeat timer.
                for raw in keys
                    .chunks_exact(4)
                    .map(|k| u32::from_ne_bytes([k[0], k[1], k[2], k[3]]))
                {
                    state.deliver_key(*seat_name, raw);
                }
            }
            wl_keyboard::Event::Leave { .. } => {
                let cancel = state
                    .seats
                    .get_mut(seat_name)
                    .is_some_and(|seat| seat.repeat.clear());
                if cancel {
                    state.cancel_repeat(*seat_name);
                }
            }
            wl_keyboard::Event::Modifiers {
                serial,
                mods_depressed,
                mods_latched,
                mods_locked,
                group,
            } => {
                if let Some(seat) = state.seats.get_mut(seat_name) {
                    seat.serial = serial;
                    if let Some(xkb_state) = seat.xkb_state.as_mut() {
                        xkb_state.update_mask(
                            mods_depressed,
                            mods_latched,
                            mods_locked,
                            0,
                            0,
                            group,
                        );
                    }
                }
            }
            wl_keyboard::Event::Key {
                serial,
                key,
                state: key_state,
                ..
            } => {
                let pressed = key_state == WEnum::Value(KeyState::Pressed);
                state.handle_key(*seat_name, serial, key, pressed);
            }
            wl_keyboard::Event::RepeatInfo { rate, delay } => {
                let cancel = state.seats.get_mut(seat_name).is_some_and(|seat| {
                    seat.repeat
                        .set_info(rate.max(0) as u32, delay.max(0) as u32)
                });
                if cancel {
                    state.cancel_repeat(*seat_name);
                }
            }
            _ => {}
        }
    }
}

impl Dispatch<WlPointer, u32> for WaylandDisplay {
    fn event(
        state: &mut WaylandDisplay,
        _proxy: &WlPointer,
        event: wl_pointer::Event,
        seat_name: &u32,
        _conn: &Connection,
        qh: &QueueHandle<WaylandDisplay>,
    ) {
        match event {
            wl_pointer::Event::Enter {
                serial,
                surface_x,
                surface_y,
                ..
            } => {
                if let Some(seat) = state.seats.get_mut(seat_name) {
                    seat.serial = serial;
                    seat.pointer_serial = serial;
                    seat.position = (surface_x, surface_y);
                    seat.frame.motion = Some((surface_x, surface_y));
                }
                state.last_seat = Some(*seat_name);
                state.apply_cursor_to_seat(*seat_name, qh);
            }
            wl_pointer::Event::Leave { serial, .. } => {
                if let Some(seat) = state.seats.get_mut(seat_name) {
                    seat.serial = serial;
                    seat.frame = PointerFrame::default();
                }
                state.cursor.pointer_left();
            }
            wl_pointer::Event::Motion {
                surface_x,
                surface_y,
                ..
            } => {
                if let Some(seat) = state.seats.get_mut(seat_name) {
                    seat.position = (surface_x, surface_y);
                    seat.frame.motion = Some((surface_x, surface_y));
                }
            }
            wl_pointer::Event::Button {
                serial,
                time,
                button,
                state: button_state,
            } => {
                if let Some(seat) = state.seats.get_mut(seat_name) {
                    seat.serial = serial;
                    let pressed = button_state == WEnum::Value(ButtonState::Pressed);
                    seat.frame.button = Some((button, pressed, time, seat.position));
                }
                state.last_seat = Some(*seat_name);
            }
            wl_pointer::Event::Axis { axis, value, .. } => {
                if let (Some(seat), WEnum::Value(axis)) = (state.seats.get_mut(seat_name), axis) {
                    if let Some(index) = PointerFrame::axis_index(axis) {
                        seat.frame.continuous[index] += value;
                    }
                }
            }
            wl_pointer::Event::AxisSource {
                axis_source: WEnum::Value(source),
            } => {
                if let Some(seat) = state.seats.get_mut(seat_name) {
                    seat.frame.source = Some(source);
                }
            }
            // Discrete deltas scale by 120 to share the accumulator with
            // the high-resolution event.
            wl_pointer::Event::AxisDiscrete { axis, discrete } => {
                if let (Some(seat), WEnum::Value(axis)) = (state.seats.get_mut(seat_name), axis) {
                    if let Some(index) = PointerFrame::axis_index(axis) {
                        let scroll_axis = if index == 0 {
                            ScrollAxis::Vertical
                        } else {
                            ScrollAxis::Horizontal
                        };
                        seat.scroll.add(scroll_axis, discrete * SCROLL_STEP);
                    }
                }
            }
            wl_pointer::Event::AxisValue120 { axis, value120 } => {
                if let (Some(seat), WEnum::Value(axis)) = (state.seats.get_mut(seat_name), axis) {
                    if let Some(index) = PointerFrame::axis_index(axis) {
                        let scroll_axis = if index == 0 {
                            ScrollAxis::Vertical
                        } else {
                            ScrollAxis::Horizontal
                        };
                        seat.scroll.add(scroll_axis, value120);
                    }
                }
            }
            wl_pointer::Event::Frame => {
                state.pointer_frame(*seat_name);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scroll_conserves_every_120th() {
        let mut acc = ScrollAccumulator::default();
        let deltas = [30, 30, 30, 30, 45, 100, -20, 7];
        let total: i32 = deltas.iter().sum();

        let mut steps = 0;
        for delta in deltas {
            acc.add(ScrollAxis::Vertical, delta);
            let (v, _) = acc.drain();
            steps += v;
        }
        let remainder = acc.vertical;

        assert_eq!(steps * SCROLL_STEP + remainder, total);
        assert!(remainder.abs() < SCROLL_STEP);
    }

    #[test]
    fn negative_scroll_keeps_its_carry() {
        let mut acc = ScrollAccumulator::default();
        acc.add(ScrollAxis::Vertical, -130);
        let (steps, _) = acc.drain();
        // Truncation toward zero: one step down, ten 120ths retained.
        assert_eq!(steps, -1);
        assert_eq!(acc.vertical, -10);

        acc.add(ScrollAxis::Vertical, -110);
        let (steps, _) = acc.drain();
        assert_eq!(steps, -1);
        assert_eq!(acc.vertical, 0);
    }

    #[test]
    fn sub_step_scroll_emits_nothing() {
        let mut acc = ScrollAccumulator::default();
        acc.add(ScrollAxis::Horizontal, 119);
        assert_eq!(acc.drain(), (0, 0));
        assert_eq!(acc.horizontal, 119);
    }

    #[test]
    fn release_before_delay_cancels_the_repeat() {
        let mut repeat = RepeatState::new();
        assert!(!repeat.set_info(25, 600));

        let delay = repeat.press(30).unwrap();
        assert_eq!(delay, Duration::from_millis(600));

        // Released before the delay elapsed: the timer must be cancelled and
        // a stale fire must deliver nothing.
        assert!(repeat.release(30));
        assert_eq!(repeat.fire(), None);
    }

    #[test]
    fn repeat_fires_at_the_rate_interval() {
        let mut repeat = RepeatState::new();
        repeat.set_info(25, 600);
        repeat.press(30);

        let (key, interval) = repeat.fire().unwrap();
        assert_eq!(key, 30);
        assert_eq!(interval, Duration::from_millis(25));

        // A different key's release does not cancel.
        assert!(!repeat.release(31));
        assert!(repeat.fire().is_some());
    }

    #[test]
    fn any_new_press_ends_the_previous_repeat() {
        let mut repeat = RepeatState::new();
        repeat.set_info(25, 600);
        repeat.press(30);

        // A key that does not repeat itself clears the held key instead of
        // re-arming, so 30 stops repeating under the new press.
        assert!(repeat.clear());
        assert_eq!(repeat.fire(), None);

        // A repeating key takes the slot over outright.
        repeat.press(31);
        assert_eq!(repeat.fire().map(|(key, _)| key), Some(31));
    }

    #[test]
    fn zero_rate_disables_repeat() {
        let mut repeat = RepeatState::new();
        repeat.set_info(0, 600);
        assert_eq!(repeat.press(30), None);
        assert_eq!(repeat.fire(), None);
    }

    #[test]
    fn new_repeat_info_clears_the_current_key() {
        let mut repeat = RepeatState::new();
        repeat.set_info(25, 600);
        repeat.press(30);
        assert!(repeat.set_info(40, 400));
        assert_eq!(repeat.fire(), None);
    }
}
