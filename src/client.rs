//! Client state and protocol event handlers
//!
//! [`PhylloClient`] is the state every `Dispatch` impl receives. Handlers only
//! update state; rendering and presenting happen from the event loop.

use crate::config::PhylloConfig;
use crate::error::{RenderError, SetupError};
use crate::event_loop::{self, Step};
use crate::input::{InputRouter, PressState};
use crate::registry::{BoundGlobals, GlobalRegistry, RequiredGlobal};
use crate::renderer::RenderEngine;
use crate::resource::Owned;
use crate::shm::Framebuffer;
use crate::window::Window;
use log::{debug, error, info, trace};
use wayland_client::protocol::{
    wl_buffer::{self, WlBuffer},
    wl_callback::{self, WlCallback},
    wl_compositor::WlCompositor,
    wl_keyboard::{self, WlKeyboard},
    wl_pointer::{self, WlPointer},
    wl_registry::{self, WlRegistry},
    wl_seat::{self, WlSeat},
    wl_shm::{self, WlShm},
    wl_shm_pool::WlShmPool,
    wl_surface::WlSurface,
};
use wayland_client::{delegate_noop, Connection, Dispatch, QueueHandle, WEnum};
use wayland_protocols::xdg::shell::client::{
    xdg_surface::{self, XdgSurface},
    xdg_toplevel::{self, XdgToplevel},
    xdg_wm_base::{self, XdgWmBase},
};

/// Everything the event handlers and the frame loop share
#[derive(Debug)]
pub struct PhylloClient {
    // Fields drop in order: window objects go before the globals they came from
    window: Option<Window>,
    keyboard: Option<Owned<WlKeyboard>>,
    pointer: Option<Owned<WlPointer>>,
    globals: Option<BoundGlobals>,
    wl_registry: Option<WlRegistry>,
    registry: GlobalRegistry,
    input: InputRouter,
    engine: RenderEngine,
    config: PhylloConfig,
}

impl PhylloClient {
    pub fn new(config: PhylloConfig) -> Result<Self, SetupError> {
        let engine = RenderEngine::new(&config.render)?;
        Ok(Self {
            window: None,
            keyboard: None,
            pointer: None,
            globals: None,
            wl_registry: None,
            registry: GlobalRegistry::new(),
            input: InputRouter::new(&config.input),
            engine,
            config,
        })
    }

    /// Keep the registry and bound globals for the rest of the session
    pub fn attach_globals(&mut self, registry: WlRegistry, globals: BoundGlobals) {
        self.wl_registry = Some(registry);
        self.globals = Some(globals);
    }

    /// Allocate the default framebuffer and start the toplevel handshake
    pub fn create_window(&mut self, qh: &QueueHandle<Self>) -> Result<(), SetupError> {
        let globals = self
            .globals
            .as_ref()
            .ok_or(SetupError::MissingGlobal("wl_compositor"))?;
        let window_config = &self.config.window;

        let framebuffer = Framebuffer::allocate(
            &globals.shm,
            window_config.width,
            window_config.height,
            self.config.render.pixel_format,
            qh,
        )?;

        let mut window = Window::create(globals, framebuffer, window_config, qh);
        window.initial_commit();
        info!(
            "🪟 Created {}x{} toplevel \"{}\"",
            window_config.width, window_config.height, window_config.title
        );

        self.window = Some(window);
        Ok(())
    }

    /// Render and present if the surface is ready for a new frame.
    ///
    /// Returns whether a frame went out.
    pub fn render_frame(&mut self, qh: &QueueHandle<Self>) -> Result<bool, RenderError> {
        let Some(window) = self.window.as_mut() else {
            return Ok(false);
        };
        if !window.can_render() {
            return Ok(false);
        }

        {
            let mut target = window.frame_target()?;
            self.engine.render(&mut target, self.input.anchors().as_slice())?;
        }
        window.present(qh);
        Ok(true)
    }

    pub fn is_configured(&self) -> bool {
        self.window.as_ref().is_some_and(|w| w.shell().is_configured())
    }

    pub fn is_closed(&self) -> bool {
        self.window.as_ref().is_some_and(|w| w.shell().is_closed())
    }

    pub fn quit_requested(&self) -> bool {
        self.input.quit_requested()
    }

    /// Exit condition to honour before anything else, in any shell state
    pub fn next_step(&self) -> Step {
        event_loop::next_step(self.quit_requested(), self.is_closed(), self.lost_global())
    }

    /// A bound global the compositor has since removed
    pub fn lost_global(&self) -> Option<RequiredGlobal> {
        self.registry.lost()
    }

    pub fn input(&self) -> &InputRouter {
        &self.input
    }

    pub fn window(&self) -> Option<&Window> {
        self.window.as_ref()
    }

    pub fn engine(&self) -> &RenderEngine {
        &self.engine
    }
}

impl AsMut<GlobalRegistry> for PhylloClient {
    fn as_mut(&mut self) -> &mut GlobalRegistry {
        &mut self.registry
    }
}

fn press_state_key(state: WEnum<wl_keyboard::KeyState>) -> Option<PressState> {
    match state {
        WEnum::Value(wl_keyboard::KeyState::Pressed) => Some(PressState::Pressed),
        WEnum::Value(wl_keyboard::KeyState::Released) => Some(PressState::Released),
        _ => None,
    }
}

fn press_state_button(state: WEnum<wl_pointer::ButtonState>) -> Option<PressState> {
    match state {
        WEnum::Value(wl_pointer::ButtonState::Pressed) => Some(PressState::Pressed),
        WEnum::Value(wl_pointer::ButtonState::Released) => Some(PressState::Released),
        _ => None,
    }
}

impl Dispatch<WlRegistry, ()> for PhylloClient {
    fn event(
        state: &mut Self,
        _registry: &WlRegistry,
        event: wl_registry::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } => state.registry.announce(name, &interface, version),
            wl_registry::Event::GlobalRemove { name } => {
                if let Some(lost) = state.registry.remove(name) {
                    error!("❌ Compositor removed required global {}", lost.interface());
                }
            }
            _ => {}
        }
    }
}

impl Dispatch<WlShm, ()> for PhylloClient {
    fn event(
        _state: &mut Self,
        _shm: &WlShm,
        event: wl_shm::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_shm::Event::Format { format } = event {
            debug!("wl_shm supports {:?}", format);
        }
    }
}

impl Dispatch<WlSeat, ()> for PhylloClient {
    fn event(
        state: &mut Self,
        seat: &WlSeat,
        event: wl_seat::Event,
        _data: &(),
        _conn: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_seat::Event::Capabilities {
                capabilities: WEnum::Value(caps),
            } => {
                let keyboard = caps.contains(wl_seat::Capability::Keyboard);
                if keyboard && state.keyboard.is_none() {
                    state.keyboard = Some(Owned::new(seat.get_keyboard(qh, ())));
                    debug!("Keyboard attached");
                } else if !keyboard && state.keyboard.take().is_some() {
                    debug!("Keyboard detached");
                }

                let pointer = caps.contains(wl_seat::Capability::Pointer);
                if pointer && state.pointer.is_none() {
                    state.pointer = Some(Owned::new(seat.get_pointer(qh, ())));
                    debug!("Pointer attached");
                } else if !pointer && state.pointer.take().is_some() {
                    debug!("Pointer detached");
                }
            }
            wl_seat::Event::Name { name } => debug!("Seat name: {}", name),
            _ => {}
        }
    }
}

impl Dispatch<WlKeyboard, ()> for PhylloClient {
    fn event(
        state: &mut Self,
        _keyboard: &WlKeyboard,
        event: wl_keyboard::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_keyboard::Event::Key {
            key, state: key_state, ..
        } = event
        {
            if let Some(press) = press_state_key(key_state) {
                trace!("Key {} {:?}", key, press);
                state.input.on_key(key, press);
            }
        }
    }
}

impl Dispatch<WlPointer, ()> for PhylloClient {
    fn event(
        state: &mut Self,
        _pointer: &WlPointer,
        event: wl_pointer::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_pointer::Event::Motion {
                surface_x,
                surface_y,
                ..
            } => state.input.on_motion(surface_x, surface_y),
            wl_pointer::Event::Button {
                button,
                state: button_state,
                ..
            } => {
                if let Some(press) = press_state_button(button_state) {
                    state.input.on_button(button, press);
                }
            }
            _ => {}
        }
    }
}

impl Dispatch<XdgWmBase, ()> for PhylloClient {
    fn event(
        _state: &mut Self,
        wm_base: &XdgWmBase,
        event: xdg_wm_base::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let xdg_wm_base::Event::Ping { serial } = event {
            wm_base.pong(serial);
        }
    }
}

impl Dispatch<XdgSurface, ()> for PhylloClient {
    fn event(
        state: &mut Self,
        _xdg_surface: &XdgSurface,
        event: xdg_surface::Event,
        _data: &(),
        _conn: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        if let xdg_surface::Event::Configure { serial } = event {
            let (Some(window), Some(globals)) = (state.window.as_mut(), state.globals.as_ref()) else {
                return;
            };
            window.configure(serial, &globals.shm, qh);
        }
    }
}

impl Dispatch<XdgToplevel, ()> for PhylloClient {
    fn event(
        state: &mut Self,
        _toplevel: &XdgToplevel,
        event: xdg_toplevel::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let Some(window) = state.window.as_mut() else {
            return;
        };
        match event {
            xdg_toplevel::Event::Configure { width, height, .. } => window.suggest_size(width, height),
            xdg_toplevel::Event::Close => {
                info!("🚪 Compositor asked to close the window");
                window.close();
            }
            _ => {}
        }
    }
}

impl Dispatch<WlBuffer, ()> for PhylloClient {
    fn event(
        _state: &mut Self,
        buffer: &WlBuffer,
        event: wl_buffer::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_buffer::Event::Release = event {
            trace!("Buffer {:?} released", wayland_client::Proxy::id(buffer));
        }
    }
}

impl Dispatch<WlCallback, ()> for PhylloClient {
    fn event(
        state: &mut Self,
        _callback: &WlCallback,
        event: wl_callback::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_callback::Event::Done { .. } = event {
            if let Some(window) = state.window.as_mut() {
                window.frame_done();
            }
        }
    }
}

delegate_noop!(PhylloClient: ignore WlCompositor);
delegate_noop!(PhylloClient: ignore WlShmPool);
delegate_noop!(PhylloClient: ignore WlSurface);

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_ESC: u32 = 1;

    fn client() -> PhylloClient {
        let mut config = PhylloConfig::default();
        config.render.samples = 16;
        PhylloClient::new(config).unwrap()
    }

    #[test]
    fn test_fresh_client_is_unconfigured_and_renders() {
        let client = client();
        assert!(!client.is_configured());
        assert!(!client.is_closed());
        assert_eq!(client.next_step(), Step::Render);
    }

    #[test]
    fn test_quit_is_honoured_before_configure() {
        let mut client = client();
        client.input.on_key(KEY_ESC, PressState::Released);

        assert!(!client.is_configured());
        assert_eq!(client.next_step(), Step::Quit);
    }

    #[test]
    fn test_lost_global_is_honoured_before_configure() {
        let mut client = client();
        client.registry.announce(7, "wl_seat", 5);
        let seat = client.registry.select(RequiredGlobal::Seat).unwrap();
        client.registry.mark_bound(seat);

        assert_eq!(client.registry.remove(7), Some(RequiredGlobal::Seat));
        assert_eq!(client.next_step(), Step::Lost(RequiredGlobal::Seat));

        // Quit still wins
        client.input.on_key(KEY_ESC, PressState::Released);
        assert_eq!(client.next_step(), Step::Quit);
    }
}
