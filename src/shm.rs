//! Shared-memory framebuffers
//!
//! A framebuffer is an anonymous file in `$XDG_RUNTIME_DIR`, sized to
//! `4 × width × height` bytes and mapped read-write/shared into this process.
//! The file is unlinked at creation, so it lives exactly as long as the
//! descriptor and the mapping do and never shows up on disk. The same file
//! descriptor is handed to the compositor through a `wl_shm_pool`, from which
//! one `wl_buffer` covering the whole pool is carved.

use crate::config::PixelFormat;
use crate::error::ShmError;
use crate::resource::Owned;
use log::{debug, error};
use memmap2::MmapMut;
use std::env;
use std::fs::File;
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};
use wayland_client::protocol::{wl_buffer::WlBuffer, wl_shm, wl_shm::WlShm};
use wayland_client::{Dispatch, QueueHandle};

/// Upper bound on the temp file path, terminator included
pub const MAX_PATH_LEN: usize = 4096;

/// Suffix appended to the runtime directory when naming the temp file
pub const TEMPLATE: &str = "/phyllo-shared-XXXXXX";

const BYTES_PER_PIXEL: u32 = 4;

/// Resolve `$XDG_RUNTIME_DIR` and check it can host a framebuffer file
pub fn runtime_dir() -> Result<PathBuf, ShmError> {
    let dir = env::var_os("XDG_RUNTIME_DIR")
        .filter(|dir| !dir.is_empty())
        .ok_or(ShmError::RuntimeDirUnset)?;
    let dir = PathBuf::from(dir);
    check_runtime_dir(&dir)?;
    Ok(dir)
}

fn check_runtime_dir(dir: &Path) -> Result<(), ShmError> {
    let len = dir.as_os_str().len() + TEMPLATE.len();
    if len >= MAX_PATH_LEN {
        return Err(ShmError::PathTooLong { len });
    }
    if !dir.is_dir() {
        return Err(ShmError::RuntimeDirMissing(dir.to_path_buf()));
    }
    Ok(())
}

/// Byte size of a `width × height` framebuffer, bounded by the `i32` pool size
pub fn buffer_len(width: u32, height: u32) -> Result<usize, ShmError> {
    if width == 0 || height == 0 {
        return Err(ShmError::EmptyDimensions { width, height });
    }
    let len = u64::from(width) * u64::from(height) * u64::from(BYTES_PER_PIXEL);
    if len > i32::MAX as u64 {
        return Err(ShmError::TooLarge { width, height });
    }
    Ok(len as usize)
}

/// An unlinked runtime-dir file mapped into memory
#[derive(Debug)]
pub struct ShmMapping {
    file: File,
    map: MmapMut,
    width: u32,
    height: u32,
}

impl ShmMapping {
    /// Create a mapping in `$XDG_RUNTIME_DIR`
    pub fn create(width: u32, height: u32) -> Result<Self, ShmError> {
        let dir = runtime_dir()?;
        Self::create_in(&dir, width, height)
    }

    /// Create a mapping in an explicit directory
    pub fn create_in(dir: &Path, width: u32, height: u32) -> Result<Self, ShmError> {
        let len = buffer_len(width, height)?;
        check_runtime_dir(dir)?;

        let file = tempfile::tempfile_in(dir).map_err(ShmError::CreateFile)?;
        file.set_len(len as u64).map_err(ShmError::Truncate)?;

        // SAFETY: the file is anonymous and only shared with the compositor,
        // which reads it; nothing in this process truncates it while mapped.
        let map = unsafe { MmapMut::map_mut(&file) }.map_err(ShmError::Map)?;

        debug!("Mapped {} byte framebuffer ({}x{})", len, width, height);

        Ok(Self {
            file,
            map,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> u32 {
        self.width * BYTES_PER_PIXEL
    }

    /// Length of the mapping in bytes
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn bytes(&self) -> &[u8] {
        &self.map
    }

    pub fn pixels(&self) -> &[u32] {
        bytemuck::cast_slice(&self.map[..])
    }

    pub fn pixels_mut(&mut self) -> &mut [u32] {
        bytemuck::cast_slice_mut(&mut self.map[..])
    }
}

impl From<PixelFormat> for wl_shm::Format {
    fn from(format: PixelFormat) -> Self {
        match format {
            PixelFormat::Xrgb8888 => wl_shm::Format::Xrgb8888,
            PixelFormat::Argb8888 => wl_shm::Format::Argb8888,
        }
    }
}

/// A mapping plus the compositor-side buffer that presents it
#[derive(Debug)]
pub struct Framebuffer {
    buffer: Owned<WlBuffer>,
    mapping: ShmMapping,
    format: PixelFormat,
}

impl Framebuffer {
    /// Allocate a `width × height` framebuffer registered with `shm`.
    ///
    /// Failures are logged here; callers decide whether they are fatal.
    pub fn allocate<D>(
        shm: &WlShm,
        width: u32,
        height: u32,
        format: PixelFormat,
        qh: &QueueHandle<D>,
    ) -> Result<Self, ShmError>
    where
        D: Dispatch<wayland_client::protocol::wl_shm_pool::WlShmPool, ()>
            + Dispatch<WlBuffer, ()>
            + 'static,
    {
        let mapping = ShmMapping::create(width, height).map_err(|e| {
            error!("❌ Cannot create {}x{} shm buffer: {}", width, height, e);
            e
        })?;

        let pool = Owned::new(shm.create_pool(
            mapping.file().as_fd(),
            mapping.len() as i32,
            qh,
            (),
        ));
        let buffer = pool.create_buffer(
            0,
            width as i32,
            height as i32,
            mapping.stride() as i32,
            format.into(),
            qh,
            (),
        );
        // The pool goes away here; the buffer keeps the memory referenced.
        drop(pool);

        Ok(Self {
            buffer: Owned::new(buffer),
            mapping,
            format,
        })
    }

    pub fn buffer(&self) -> &WlBuffer {
        &self.buffer
    }

    pub fn width(&self) -> u32 {
        self.mapping.width()
    }

    pub fn height(&self) -> u32 {
        self.mapping.height()
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn mapping(&self) -> &ShmMapping {
        &self.mapping
    }

    pub fn mapping_mut(&mut self) -> &mut ShmMapping {
        &mut self.mapping
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_mapping_is_exactly_four_bytes_per_pixel() {
        let dir = tempdir().unwrap();
        for (w, h) in [(1, 1), (3, 7), (640, 480), (1280, 960)] {
            let mapping = ShmMapping::create_in(dir.path(), w, h).unwrap();
            assert_eq!(mapping.len(), 4 * w as usize * h as usize);
            assert_eq!(mapping.file().metadata().unwrap().len(), 4 * u64::from(w) * u64::from(h));
            assert_eq!(mapping.pixels().len(), w as usize * h as usize);
            assert_eq!(mapping.stride(), 4 * w);
        }
    }

    #[test]
    fn test_zero_dimensions_fail() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            ShmMapping::create_in(dir.path(), 0, 10),
            Err(ShmError::EmptyDimensions { width: 0, height: 10 })
        ));
        assert!(matches!(
            ShmMapping::create_in(dir.path(), 10, 0),
            Err(ShmError::EmptyDimensions { .. })
        ));
    }

    #[test]
    fn test_oversized_buffer_fails() {
        assert!(matches!(buffer_len(65536, 65536), Err(ShmError::TooLarge { .. })));
        assert_eq!(buffer_len(2, 3).unwrap(), 24);
    }

    #[test]
    fn test_no_file_left_behind() {
        let dir = tempdir().unwrap();
        let _mapping = ShmMapping::create_in(dir.path(), 16, 16).unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_pixels_are_shared_with_the_file() {
        use std::io::{Read, Seek, SeekFrom};

        let dir = tempdir().unwrap();
        let mut mapping = ShmMapping::create_in(dir.path(), 2, 1).unwrap();
        mapping.pixels_mut().copy_from_slice(&[0x1122_3344, 0xaabb_ccdd]);

        let mut file = mapping.file().try_clone().unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).unwrap();

        // B, G, R, A byte order on little-endian
        assert_eq!(bytes, mapping.bytes());
        assert_eq!(&bytes[..4], &0x1122_3344u32.to_ne_bytes());
    }

    #[test]
    fn test_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("not-here");
        assert!(matches!(
            ShmMapping::create_in(&missing, 4, 4),
            Err(ShmError::RuntimeDirMissing(_))
        ));
    }

    #[test]
    fn test_overlong_directory_fails() {
        let long = PathBuf::from(format!("/{}", "a".repeat(MAX_PATH_LEN)));
        assert!(matches!(
            ShmMapping::create_in(&long, 4, 4),
            Err(ShmError::PathTooLong { .. })
        ));
    }
}
