//! Renderer seam
//!
//! The consumer loop hands every fresh [`VehicleState`] to a [`Renderer`].
//! Drawing is out of scope for the core; front ends implement the trait.

use thiserror::Error;

use crate::vehicle::VehicleState;

/// Errors reported by a renderer
#[derive(Error, Debug)]
pub enum RenderError {
    /// Output could not be acquired
    #[error("Renderer failed to start: {0}")]
    Open(String),

    /// Writing to the output failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Something that displays vehicle state
///
/// `open` runs once before the consumer loop starts; a failure aborts
/// startup. `render` is called at most once per consumer tick and must not
/// block for long. `close` runs once after the loop exits.
pub trait Renderer: Send + 'static {
    /// Acquire output resources
    fn open(&mut self) -> Result<(), RenderError> {
        Ok(())
    }

    /// Draw one state
    fn render(&mut self, state: &VehicleState);

    /// Release output resources
    fn close(&mut self) {}
}

/// Renderer that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn render(&mut self, _state: &VehicleState) {}
}
