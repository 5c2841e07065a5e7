//! Scoped ownership of Wayland protocol objects
//!
//! wayland-client proxies are plain handles: dropping one does not tell the
//! compositor anything. Objects that have a destructor request implement
//! [`Destroy`], and [`Owned`] sends that request exactly once when it goes out
//! of scope, on every exit path.

use std::fmt;
use std::ops::Deref;

use wayland_client::protocol::{
    wl_buffer::WlBuffer, wl_keyboard::WlKeyboard, wl_pointer::WlPointer, wl_seat::WlSeat,
    wl_shm_pool::WlShmPool, wl_surface::WlSurface,
};
use wayland_client::Proxy;
use wayland_protocols::xdg::shell::client::{
    xdg_surface::XdgSurface, xdg_toplevel::XdgToplevel, xdg_wm_base::XdgWmBase,
};

/// A protocol object with a destructor request
pub trait Destroy: Proxy {
    /// Send the destructor request for this object
    fn send_destroy(&self);
}

impl Destroy for WlBuffer {
    fn send_destroy(&self) {
        self.destroy();
    }
}

impl Destroy for WlShmPool {
    fn send_destroy(&self) {
        self.destroy();
    }
}

impl Destroy for WlSurface {
    fn send_destroy(&self) {
        self.destroy();
    }
}

impl Destroy for XdgSurface {
    fn send_destroy(&self) {
        self.destroy();
    }
}

impl Destroy for XdgToplevel {
    fn send_destroy(&self) {
        self.destroy();
    }
}

impl Destroy for XdgWmBase {
    fn send_destroy(&self) {
        self.destroy();
    }
}

// Input devices and seats only gained release requests in later versions;
// older objects are simply abandoned.
impl Destroy for WlKeyboard {
    fn send_destroy(&self) {
        if self.version() >= 3 {
            self.release();
        }
    }
}

impl Destroy for WlPointer {
    fn send_destroy(&self) {
        if self.version() >= 3 {
            self.release();
        }
    }
}

impl Destroy for WlSeat {
    fn send_destroy(&self) {
        if self.version() >= 5 {
            self.release();
        }
    }
}

/// Owning wrapper that destroys the protocol object on drop
pub struct Owned<P: Destroy>(P);

impl<P: Destroy> Owned<P> {
    pub fn new(proxy: P) -> Self {
        Self(proxy)
    }
}

impl<P: Destroy> Deref for Owned<P> {
    type Target = P;

    fn deref(&self) -> &P {
        &self.0
    }
}

impl<P: Destroy> Drop for Owned<P> {
    fn drop(&mut self) {
        self.0.send_destroy();
    }
}

impl<P: Destroy> fmt::Debug for Owned<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Owned").field(&self.0.id()).finish()
    }
}
