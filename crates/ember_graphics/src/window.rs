//! Platform window seam.
//!
//! The windowing layer lives outside this crate; the context only needs a
//! native surface to build its swap chain and the initial window size.

use raw_window_handle::RawWindowHandle;

pub trait WindowSurface {
    /// Native handle the swap chain presents into. `None` once the window
    /// has been destroyed.
    fn native_surface_handle(&self) -> Option<RawWindowHandle>;

    /// Client-area size in pixels.
    fn window_size(&self) -> (u32, u32);

    fn is_open(&self) -> bool;
}
