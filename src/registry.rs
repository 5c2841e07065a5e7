//! Global discovery and binding
//!
//! The compositor advertises its globals on the registry right after we ask
//! for it. [`discover_and_bind`] collects them over one roundtrip, then binds
//! the four this client cannot live without. Anything else is ignored.
//! Losing a bound global later is latched and turned into a fatal error by
//! the event loop.

use crate::error::SetupError;
use crate::resource::Owned;
use log::{debug, error, info};
use wayland_client::protocol::{
    wl_compositor::WlCompositor, wl_display::WlDisplay, wl_registry::WlRegistry, wl_seat::WlSeat,
    wl_shm::WlShm,
};
use wayland_client::{Dispatch, EventQueue, Proxy, QueueHandle};
use wayland_protocols::xdg::shell::client::xdg_wm_base::XdgWmBase;

/// Globals the client must bind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequiredGlobal {
    Compositor,
    Shm,
    Seat,
    WmBase,
}

impl RequiredGlobal {
    pub const ALL: [RequiredGlobal; 4] = [
        RequiredGlobal::Compositor,
        RequiredGlobal::Shm,
        RequiredGlobal::Seat,
        RequiredGlobal::WmBase,
    ];

    /// Protocol interface name
    pub fn interface(self) -> &'static str {
        match self {
            RequiredGlobal::Compositor => "wl_compositor",
            RequiredGlobal::Shm => "wl_shm",
            RequiredGlobal::Seat => "wl_seat",
            RequiredGlobal::WmBase => "xdg_wm_base",
        }
    }

    /// Highest version this client speaks
    pub fn supported_version(self) -> u32 {
        match self {
            RequiredGlobal::Compositor => 4,
            RequiredGlobal::Shm => 1,
            RequiredGlobal::Seat => 5,
            RequiredGlobal::WmBase => 3,
        }
    }

    fn from_interface(interface: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.interface() == interface)
    }
}

/// One advertised global
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    pub name: u32,
    pub interface: String,
    pub version: u32,
}

/// Which advertisement to bind and at what version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub global: RequiredGlobal,
    pub name: u32,
    pub version: u32,
}

/// Bookkeeping of advertised and bound globals
#[derive(Debug, Default)]
pub struct GlobalRegistry {
    advertised: Vec<Global>,
    bound: Vec<Selection>,
    lost: Option<RequiredGlobal>,
}

impl GlobalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a `wl_registry.global` event
    pub fn announce(&mut self, name: u32, interface: &str, version: u32) {
        debug!("Global {} {} v{}", name, interface, version);
        self.advertised.push(Global {
            name,
            interface: interface.to_string(),
            version,
        });
    }

    /// Record a `wl_registry.global_remove` event.
    ///
    /// Returns the required global that went away, if it was one we bound.
    pub fn remove(&mut self, name: u32) -> Option<RequiredGlobal> {
        self.advertised.retain(|g| g.name != name);
        let lost = self.bound.iter().find(|s| s.name == name).map(|s| s.global)?;
        self.lost.get_or_insert(lost);
        Some(lost)
    }

    /// First advertisement of `global`, at `min(supported, advertised)`
    pub fn select(&self, global: RequiredGlobal) -> Option<Selection> {
        self.advertised
            .iter()
            .find(|g| RequiredGlobal::from_interface(&g.interface) == Some(global))
            .map(|g| Selection {
                global,
                name: g.name,
                version: g.version.min(global.supported_version()),
            })
    }

    /// Select every global in `required`, failing on the first one missing
    pub fn select_all(&self, required: &[RequiredGlobal]) -> Result<Vec<Selection>, SetupError> {
        required
            .iter()
            .map(|&global| {
                self.select(global)
                    .ok_or(SetupError::MissingGlobal(global.interface()))
            })
            .collect()
    }

    pub fn advertised(&self) -> &[Global] {
        &self.advertised
    }

    /// A bound global that has since been removed
    pub fn lost(&self) -> Option<RequiredGlobal> {
        self.lost
    }

    pub(crate) fn mark_bound(&mut self, selection: Selection) {
        self.bound.push(selection);
    }
}

/// Proxies for the required globals
#[derive(Debug)]
pub struct BoundGlobals {
    pub compositor: WlCompositor,
    pub shm: WlShm,
    pub seat: Owned<WlSeat>,
    pub wm_base: Owned<XdgWmBase>,
}

fn bind<I, D>(registry: &WlRegistry, selection: Selection, qh: &QueueHandle<D>) -> I
where
    I: Proxy + 'static,
    D: Dispatch<I, ()> + 'static,
{
    info!(
        "🔗 Binding {} v{} (global {})",
        selection.global.interface(),
        selection.version,
        selection.name
    );
    registry.bind::<I, (), D>(selection.name, selection.version, qh, ())
}

/// Ask for the registry, roundtrip once, and bind every required global.
///
/// The returned registry must stay alive so later `global_remove` events are
/// still delivered.
pub fn discover_and_bind<D>(
    display: &WlDisplay,
    queue: &mut EventQueue<D>,
    state: &mut D,
) -> Result<(WlRegistry, BoundGlobals), SetupError>
where
    D: Dispatch<WlRegistry, ()>
        + Dispatch<WlCompositor, ()>
        + Dispatch<WlShm, ()>
        + Dispatch<WlSeat, ()>
        + Dispatch<XdgWmBase, ()>
        + AsMut<GlobalRegistry>
        + 'static,
{
    let qh = queue.handle();
    let registry = display.get_registry(&qh, ());
    queue.roundtrip(state).map_err(SetupError::Roundtrip)?;

    let globals: &mut GlobalRegistry = state.as_mut();
    let selections = globals.select_all(&RequiredGlobal::ALL).map_err(|e| {
        error!("❌ {}", e);
        e
    })?;

    let mut compositor: Option<WlCompositor> = None;
    let mut shm: Option<WlShm> = None;
    let mut seat: Option<Owned<WlSeat>> = None;
    let mut wm_base: Option<Owned<XdgWmBase>> = None;
    for selection in selections {
        match selection.global {
            RequiredGlobal::Compositor => compositor = Some(bind(&registry, selection, &qh)),
            RequiredGlobal::Shm => shm = Some(bind(&registry, selection, &qh)),
            RequiredGlobal::Seat => seat = Some(Owned::new(bind(&registry, selection, &qh))),
            RequiredGlobal::WmBase => wm_base = Some(Owned::new(bind(&registry, selection, &qh))),
        }
        globals.mark_bound(selection);
    }

    let bound = BoundGlobals {
        compositor: compositor.ok_or(SetupError::MissingGlobal("wl_compositor"))?,
        shm: shm.ok_or(SetupError::MissingGlobal("wl_shm"))?,
        seat: seat.ok_or(SetupError::MissingGlobal("wl_seat"))?,
        wm_base: wm_base.ok_or(SetupError::MissingGlobal("xdg_wm_base"))?,
    };
    Ok((registry, bound))
}
