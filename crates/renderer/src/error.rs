use scheduler::SchedulerError;

use crate::source::LoadError;
use crate::surface::SurfaceError;
use crate::tiled::RendererState;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("cannot {operation} while the renderer is {state}")]
    InvalidState {
        operation: &'static str,
        state: RendererState,
    },
    #[error("{0}")]
    Precondition(&'static str),
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Schedule(#[from] SchedulerError),
}
