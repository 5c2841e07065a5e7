//! The toplevel window: surface, xdg role objects and framebuffer
//!
//! Presents follow the handshake in `shell.rs`: nothing is attached until
//! the surface is configured, and a replaced framebuffer stays mapped until
//! its successor has been attached and committed.

use crate::config::WindowConfig;
use crate::error::{RenderError, ShmError};
use crate::registry::BoundGlobals;
use crate::renderer::FrameTarget;
use crate::resource::Owned;
use crate::shell::{ShellSurface, Size};
use crate::shm::Framebuffer;
use log::{debug, info, warn};
use std::mem;
use wayland_client::protocol::{
    wl_buffer::WlBuffer, wl_callback::WlCallback, wl_shm::WlShm, wl_shm_pool::WlShmPool,
    wl_surface::WlSurface,
};
use wayland_client::{Dispatch, Proxy, QueueHandle};
use wayland_protocols::xdg::shell::client::{xdg_surface::XdgSurface, xdg_toplevel::XdgToplevel};

/// The framebuffer being drawn plus the one the compositor may still read.
///
/// A replaced buffer is kept only if it was presented, and only until its
/// successor has been presented in turn.
#[derive(Debug)]
pub struct BufferSlot<F> {
    current: F,
    current_presented: bool,
    retired: Option<F>,
}

impl<F> BufferSlot<F> {
    pub fn new(current: F) -> Self {
        Self {
            current,
            current_presented: false,
            retired: None,
        }
    }

    pub fn current(&self) -> &F {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut F {
        &mut self.current
    }

    /// Buffer kept alive for the compositor, if any
    pub fn retired(&self) -> Option<&F> {
        self.retired.as_ref()
    }

    /// Swap in the buffer `allocate` produces. On error nothing changes.
    pub fn replace_with<E>(&mut self, allocate: impl FnOnce(&F) -> Result<F, E>) -> Result<(), E> {
        let next = allocate(&self.current)?;
        let previous = mem::replace(&mut self.current, next);
        if mem::replace(&mut self.current_presented, false) {
            // The surface shows `previous` now; anything older can go
            self.retired = Some(previous);
        }
        Ok(())
    }

    /// The current buffer has been attached and committed
    pub fn mark_presented(&mut self) {
        self.current_presented = true;
        self.retired = None;
    }
}

/// One xdg toplevel and the framebuffer it shows
#[derive(Debug)]
pub struct Window {
    buffers: BufferSlot<Framebuffer>,
    shell: ShellSurface,
    frame_pending: bool,
    presented: u64,
    // Role objects before the surface: fields drop in declaration order.
    // The toplevel is only held so its destructor runs.
    _toplevel: Owned<XdgToplevel>,
    xdg_surface: Owned<XdgSurface>,
    surface: Owned<WlSurface>,
}

impl Window {
    /// Create the surface and its toplevel role around `framebuffer`
    pub fn create<D>(
        globals: &BoundGlobals,
        framebuffer: Framebuffer,
        config: &WindowConfig,
        qh: &QueueHandle<D>,
    ) -> Self
    where
        D: Dispatch<WlSurface, ()> + Dispatch<XdgSurface, ()> + Dispatch<XdgToplevel, ()> + 'static,
    {
        let surface = Owned::new(globals.compositor.create_surface(qh, ()));
        let xdg_surface = Owned::new(globals.wm_base.get_xdg_surface(&surface, qh, ()));
        let toplevel = Owned::new(xdg_surface.get_toplevel(qh, ()));
        toplevel.set_title(config.title.clone());
        toplevel.set_app_id(config.app_id.clone());

        let size = Size::new(framebuffer.width(), framebuffer.height());

        Self {
            buffers: BufferSlot::new(framebuffer),
            shell: ShellSurface::new(size),
            frame_pending: false,
            presented: 0,
            _toplevel: toplevel,
            xdg_surface,
            surface,
        }
    }

    /// Bufferless commit that starts the configure handshake
    pub fn initial_commit(&mut self) {
        self.surface.commit();
        self.shell.initial_commit();
    }

    pub fn shell(&self) -> &ShellSurface {
        &self.shell
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        self.buffers.current()
    }

    /// `xdg_toplevel.configure`: remember the suggested size
    pub fn suggest_size(&mut self, width: i32, height: i32) {
        self.shell.suggest_size(width, height);
    }

    /// `xdg_surface.configure`: acknowledge, then follow a size change
    pub fn configure<D>(&mut self, serial: u32, shm: &WlShm, qh: &QueueHandle<D>)
    where
        D: Dispatch<WlShmPool, ()> + Dispatch<WlBuffer, ()> + 'static,
    {
        let Some(acked) = self.shell.configure(serial) else {
            return;
        };
        self.xdg_surface.ack_configure(acked.serial);
        debug!("Acked configure {}", acked.serial);

        if let Some(size) = acked.resize {
            if let Err(e) = self.resize(size, shm, qh) {
                warn!(
                    "⚠️ Resize to {}x{} failed, keeping {}x{}: {}",
                    size.width,
                    size.height,
                    self.framebuffer().width(),
                    self.framebuffer().height(),
                    e
                );
            }
        }
    }

    /// Swap in a framebuffer of `size`. On failure the current one stays.
    pub fn resize<D>(&mut self, size: Size, shm: &WlShm, qh: &QueueHandle<D>) -> Result<(), ShmError>
    where
        D: Dispatch<WlShmPool, ()> + Dispatch<WlBuffer, ()> + 'static,
    {
        self.buffers.replace_with(|current| {
            Framebuffer::allocate(shm, size.width, size.height, current.format(), qh)
        })?;
        self.shell.resized(size);

        info!("📐 Framebuffer resized to {}x{}", size.width, size.height);
        Ok(())
    }

    /// `xdg_toplevel.close`
    pub fn close(&mut self) {
        self.shell.close();
    }

    /// `wl_callback.done` for the last present
    pub fn frame_done(&mut self) {
        self.frame_pending = false;
    }

    /// Configured and not waiting on a frame callback
    pub fn can_render(&self) -> bool {
        self.shell.is_configured() && !self.frame_pending
    }

    /// Pixels of the current framebuffer
    pub fn frame_target(&mut self) -> Result<FrameTarget<'_>, RenderError> {
        let framebuffer = self.buffers.current_mut();
        let width = framebuffer.width();
        let height = framebuffer.height();
        FrameTarget::new(framebuffer.mapping_mut().pixels_mut(), width, height)
    }

    /// Damage, attach and commit the current framebuffer
    pub fn present<D>(&mut self, qh: &QueueHandle<D>)
    where
        D: Dispatch<WlCallback, ()> + 'static,
    {
        if !self.shell.is_configured() {
            return;
        }

        let framebuffer = self.buffers.current();
        let width = framebuffer.width() as i32;
        let height = framebuffer.height() as i32;
        if self.surface.version() >= 4 {
            self.surface.damage_buffer(0, 0, width, height);
        } else {
            self.surface.damage(0, 0, width, height);
        }
        self.surface.attach(Some(framebuffer.buffer()), 0, 0);
        self.surface.frame(qh, ());
        self.surface.commit();

        self.frame_pending = true;
        self.presented += 1;
        self.buffers.mark_presented();
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_presented_buffer_is_retired_until_next_present() {
        let first = Rc::new(1);
        let mut slot = BufferSlot::new(Rc::clone(&first));
        slot.mark_presented();

        slot.replace_with(|_| Ok::<_, ()>(Rc::new(2))).unwrap();
        assert_eq!(**slot.current(), 2);
        assert_eq!(slot.retired().map(|r| **r), Some(1));
        assert_eq!(Rc::strong_count(&first), 2);

        slot.mark_presented();
        assert!(slot.retired().is_none());
        assert_eq!(Rc::strong_count(&first), 1);
    }

    #[test]
    fn test_unpresented_buffer_is_dropped_on_replace() {
        let first = Rc::new(1);
        let mut slot = BufferSlot::new(Rc::clone(&first));

        slot.replace_with(|_| Ok::<_, ()>(Rc::new(2))).unwrap();
        assert!(slot.retired().is_none());
        assert_eq!(Rc::strong_count(&first), 1);
    }

    #[test]
    fn test_second_resize_keeps_the_buffer_on_screen() {
        let shown = Rc::new(1);
        let mut slot = BufferSlot::new(Rc::clone(&shown));
        slot.mark_presented();

        let skipped = Rc::new(2);
        slot.replace_with(|_| Ok::<_, ()>(Rc::clone(&skipped))).unwrap();
        slot.replace_with(|_| Ok::<_, ()>(Rc::new(3))).unwrap();

        assert_eq!(**slot.current(), 3);
        assert_eq!(slot.retired().map(|r| **r), Some(1));
        assert_eq!(Rc::strong_count(&skipped), 1);
    }

    #[test]
    fn test_failed_allocation_keeps_current() {
        let mut slot = BufferSlot::new(Rc::new(1));
        slot.mark_presented();

        let result = slot.replace_with(|current| {
            assert_eq!(**current, 1);
            Err::<Rc<i32>, _>("no memory")
        });
        assert_eq!(result, Err("no memory"));
        assert_eq!(**slot.current(), 1);
        assert!(slot.retired().is_none());

        // Still counts as presented: the next good resize retires it
        slot.replace_with(|_| Ok::<_, ()>(Rc::new(2))).unwrap();
        assert_eq!(slot.retired().map(|r| **r), Some(1));
    }
}
