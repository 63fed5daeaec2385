//! Headless wgpu backend for [`GpuSurface`](crate::GpuSurface).
//!
//! - `context` picks an adapter and opens a device without any window.
//! - `uniforms` reflects a program's std140 block and sampler bindings from
//!   the naga module and stages uniform writes by name.
//! - `pipeline` turns a fragment shader into a render pipeline with one
//!   uniform bind group (set 0) and one texture bind group (set 1).
//! - `textures` uploads images and allocates the ping-pong render targets.
//! - `readback` copies a render target into a mapped buffer and strips the
//!   row padding.
//! - `state` glues everything together behind `WgpuSurface`.

mod context;
mod pipeline;
mod readback;
mod state;
mod textures;
mod uniforms;

pub use state::WgpuSurface;
