//! Per-monitor geometry tracking.
//!
//! `wl_output` delivers geometry in bursts terminated by a `done` event. All
//! events update a pending copy; `done` publishes it atomically so that
//! readers never observe a half-updated geometry.

use wayland_client::{
    protocol::{wl_output, wl_output::WlOutput},
    Connection, Dispatch, QueueHandle,
};

use crate::display::WaylandDisplay;

/// Output geometry as last published by a `done` event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    /// Physical size in millimetres, 0 when unknown.
    pub physical_width: i32,
    pub physical_height: i32,
    pub scale: i32,
    pub transform: i32,
}

/// One advertised `wl_output`.
#[derive(Debug)]
pub struct Output {
    pub global_name: u32,
    pub output: WlOutput,
    pub name: Option<String>,
    pub current: Geometry,
    pending: Geometry,
}

impl Output {
    pub fn new(global_name: u32, output: WlOutput) -> Self {
        let pending = Geometry {
            scale: 1,
            ..Geometry::default()
        };
        Output {
            global_name,
            output,
            name: None,
            current: pending,
            pending,
        }
    }

    /// Dots per inch along one axis, derived from the physical size.
    /// Returns 0 when the output did not report its physical dimensions.
    pub fn dpi(size_px: i32, scale: i32, size_mm: i32) -> i32 {
        if size_mm > 0 && scale > 0 {
            (f64::from(size_px) * 25.4 / f64::from(scale) / f64::from(size_mm)).round() as i32
        } else {
            0
        }
    }

    /// Releases the protocol object. `wl_output.release` only exists from
    /// version 3 onwards; older objects are simply dropped.
    pub fn release(self) {
        use wayland_client::Proxy;
        if self.output.version() >= 3 {
            self.output.release();
        }
    }
}

/// Prints the monitor layout for the `--dump-monitors` CLI mode.
pub fn dump_monitor_layout<'a>(outputs: impl Iterator<Item = &'a Output>) {
    println!("Monitor layout:");
    for output in outputs {
        let geo = &output.current;
        println!("              ID: {}", output.global_name);
        println!("            name: {}", output.name.as_deref().unwrap_or("(unknown)"));
        println!("           scale: {}", geo.scale);
        println!("        position: {},{}", geo.x, geo.y);
        println!("            size: {},{}", geo.width, geo.height);
        if geo.physical_width > 0 && geo.physical_height > 0 {
            println!(
                "            size: {}mm,{}mm  dpi: {},{}",
                geo.physical_width,
                geo.physical_height,
                Output::dpi(geo.width, geo.scale, geo.physical_width),
                Output::dpi(geo.height, geo.scale, geo.physical_height),
            );
        }
        println!();
    }
}

impl Dispatch<WlOutput, u32> for WaylandDisplay {
    fn event(
        state: &mut WaylandDisplay,
        _proxy: &WlOutput,
        event: wl_output::Event,
        global_name: &u32,
        _conn: &Connection,
        _qh: &QueueHandle<WaylandDisplay>,
    ) {
        let Some(output) = state.outputs.get_mut(global_name) else {
            return;
        };

        match event {
            wl_output::Event::Geometry {
                x,
                y,
                physical_width,
                physical_height,
                transform,
                ..
            } => {
                output.pending.x = x;
                output.pending.y = y;
                output.pending.physical_width = physical_width;
                output.pending.physical_height = physical_height;
                if let wayland_client::WEnum::Value(transform) = transform {
                    output.pending.transform = transform as i32;
                }
            }
            wl_output::Event::Mode { flags, width, height, .. } => {
                if flags
                    .into_result()
                    .is_ok_and(|f| f.contains(wl_output::Mode::Current))
                {
                    output.pending.width = width;
                    output.pending.height = height;
                }
            }
            wl_output::Event::Scale { factor } => {
                output.pending.scale = factor;
            }
            wl_output::Event::Name { name } => {
                output.name = Some(name);
            }
            wl_output::Event::Done => {
                output.current = output.pending;
                tracing::debug!(
                    name = output.name.as_deref().unwrap_or("unknown"),
                    width = output.current.width,
                    height = output.current.height,
                    physical_width_mm = output.current.physical_width,
                    physical_height_mm = output.current.physical_height,
                    x = output.current.x,
                    y = output.current.y,
                    scale = output.current.scale,
                    transform = output.current.transform,
                    "output geometry published",
                );
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dpi_requires_physical_size() {
        assert_eq!(Output::dpi(1920, 1, 0), 0);
        assert_eq!(Output::dpi(1920, 0, 510), 0);
        // 1920px over 510mm is ~96 dpi.
        assert_eq!(Output::dpi(1920, 1, 510), 96);
        // Doubling the scale halves the logical density.
        assert_eq!(Output::dpi(1920, 2, 510), 48);
    }
}
