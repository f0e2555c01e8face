use std::process;

use beacon::{Config, Event, Location, PoolId, WaylandDisplay};
use tracing_subscriber::EnvFilter;

static USAGE: &str = "\
beacon - launcher overlay display core

USAGE:
  beacon [OPTIONS]

OPTIONS:
  --dump-monitors       print the monitor layout and exit
  --monitor <NAME>      bind the surface to the named output
  --hover-select        pointer motion alone selects the hovered entry
  --inhibit-shortcuts   grab compositor-global shortcuts while open
  -h, --help            show this help

Runs a solid-fill overlay until q or Escape is pressed.";

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() {
    init_logging();

    let mut config = Config::default();
    let mut dump_monitors = false;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--dump-monitors" => dump_monitors = true,
            "--monitor" => match args.next() {
                Some(name) => config.monitor = Some(name),
                None => {
                    eprintln!("--monitor needs an output name");
                    process::exit(1);
                }
            },
            "--hover-select" => config.hover_select = true,
            "--inhibit-shortcuts" => config.inhibit_shortcuts = true,
            "-h" | "--help" => {
                println!("{USAGE}");
                return;
            }
            other => {
                eprintln!("unknown argument: {other}\n\n{USAGE}");
                process::exit(1);
            }
        }
    }

    let mut event_loop = match calloop::EventLoop::<WaylandDisplay>::try_new() {
        Ok(event_loop) => event_loop,
        Err(err) => {
            tracing::error!("could not create event loop: {err}");
            process::exit(1);
        }
    };
    let mut display = match WaylandDisplay::connect(config, event_loop.handle()) {
        Ok(display) => display,
        Err(err) => {
            tracing::error!("display setup failed: {err}");
            process::exit(1);
        }
    };

    if dump_monitors {
        display.dump_monitor_layout();
        return;
    }

    display.set_placement(800, 300, 0, 0, Location::Center);

    let signal = event_loop.get_signal();
    let mut pool: Option<PoolId> = None;
    let mut size = display.surface_size();
    let mut dirty = true;

    let result = event_loop.run(None, &mut display, move |display| {
        let mut refresh = false;
        for event in display.take_events() {
            match event {
                Event::Configured { width, height } => {
                    if (width, height) != size {
                        size = (width, height);
                        refresh = true;
                    }
                    dirty = true;
                }
                Event::PoolRefresh => refresh = true,
                Event::FrameReady | Event::Redraw => dirty = true,
                Event::KeyText(text) => {
                    if text == "q" || text == "\u{1b}" {
                        signal.stop();
                    }
                }
                _ => {}
            }
        }

        if refresh {
            if let Some(id) = pool.take() {
                display.free_pool(id);
            }
        }
        if size.0 == 0 || size.1 == 0 {
            return;
        }
        if pool.is_none() {
            pool = display.create_buffer_pool(size.0 as i32, size.1 as i32);
            dirty = pool.is_some();
        }
        if !dirty {
            return;
        }
        if let Some(id) = pool {
            // Draw when a buffer is free; otherwise stay dirty and retry on
            // the next frame callback.
            if let Some(slot) = display.acquire_buffer(id) {
                if let Some(canvas) = display.canvas(id, slot) {
                    for pixel in canvas.chunks_exact_mut(4) {
                        pixel.copy_from_slice(&[0x28, 0x28, 0x28, 0xe0]);
                    }
                }
                display.present(id, slot);
                dirty = false;
            }
        }
    });

    if let Err(err) = result {
        tracing::error!("event loop failed: {err}");
        process::exit(1);
    }
}
