//! Connection setup and the frame loop
//!
//! Setup connects, binds globals, allocates the default framebuffer and
//! waits for the first configure. After that every iteration checks the exit
//! conditions, paints a frame when the compositor is ready for one, flushes,
//! and blocks until the next batch of events.

use crate::client::PhylloClient;
use crate::config::PhylloConfig;
use crate::error::SetupError;
use crate::registry::{self, RequiredGlobal};
use log::{debug, info, warn};
use std::io;
use wayland_client::backend::WaylandError;
use wayland_client::Connection;

/// What the loop does next, checked before any rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Quit,
    Closed,
    Lost(RequiredGlobal),
    Render,
}

/// Exit conditions take precedence over rendering, quit first
pub fn next_step(quit: bool, closed: bool, lost: Option<RequiredGlobal>) -> Step {
    if quit {
        Step::Quit
    } else if closed {
        Step::Closed
    } else if let Some(global) = lost {
        Step::Lost(global)
    } else {
        Step::Render
    }
}

/// Bring the window up and run until quit, close or disconnect
pub fn run(config: PhylloConfig) -> Result<(), SetupError> {
    let conn = Connection::connect_to_env()?;
    info!("🔌 Connected to Wayland display");

    let mut queue = conn.new_event_queue();
    let qh = queue.handle();
    let mut client = PhylloClient::new(config)?;

    let (wl_registry, globals) = registry::discover_and_bind(&conn.display(), &mut queue, &mut client)?;
    client.attach_globals(wl_registry, globals);
    client.create_window(&qh)?;

    while !client.is_configured() {
        match client.next_step() {
            Step::Quit | Step::Closed => {
                info!("🚪 Session ended before the window was configured");
                return shutdown(conn, client);
            }
            Step::Lost(global) => return Err(SetupError::GlobalRemoved(global.interface())),
            Step::Render => {}
        }
        queue.blocking_dispatch(&mut client).map_err(SetupError::Roundtrip)?;
    }
    info!("✅ Window configured, entering frame loop");

    loop {
        match client.next_step() {
            Step::Quit => {
                info!("👋 Quit key released");
                break;
            }
            Step::Closed => {
                info!("👋 Window closed");
                break;
            }
            Step::Lost(global) => return Err(SetupError::GlobalRemoved(global.interface())),
            Step::Render => {}
        }

        client.render_frame(&qh).map_err(SetupError::Frame)?;

        match queue.flush() {
            Ok(()) => {}
            Err(WaylandError::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => {
                debug!("Socket full, flushing on next dispatch");
            }
            Err(e) => {
                warn!("⚠️ Lost connection to the compositor: {}", e);
                break;
            }
        }

        if let Err(e) = queue.blocking_dispatch(&mut client) {
            warn!("⚠️ Event dispatch ended: {}", e);
            break;
        }
    }

    info!("🖼️ Rendered {} frames", client.engine().frames_rendered());
    shutdown(conn, client)
}

/// Send destructors for the window, input devices and globals
fn shutdown(conn: Connection, client: PhylloClient) -> Result<(), SetupError> {
    drop(client);
    if let Err(e) = conn.flush() {
        debug!("Final flush failed: {}", e);
    }
    Ok(())
}
