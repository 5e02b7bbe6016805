//! Frame Driver: the per-frame update loop.
//!
//! A tick reads the clock, applies spins, updates the camera controls,
//! uploads dirty instance buffers, renders, clears one-shot shadow updates
//! and requests exactly one next frame unless halted.

mod clock;
mod driver;
mod spin;
mod stats;

pub use clock::{Clock, ManualClock, WallClock};
pub use driver::{CountingScheduler, FrameDriver, FrameScheduler, RenderContext, Tick};
pub use spin::{Spin, SpinTarget};
pub use stats::FrameStats;

pub fn crate_info() -> &'static str {
    "perfscene-frame v0.1.0"
}
