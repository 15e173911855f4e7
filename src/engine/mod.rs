//! Audio Engine Module
//!
//! Core render plumbing:
//! - Audio buffer management
//! - Render state machine
//! - End-to-end renderer
//! - WAV output sink

pub mod buffer;
pub mod io;
pub mod renderer;
pub mod state;

pub use buffer::{AudioBuffer, ChannelLayout};
pub use io::{read_wav, write_render, write_wav, ExportFormat, RenderManifest};
pub use renderer::{CancellationToken, PsalmRenderer, RenderOutcome};
pub use state::{RenderState, RenderTracker};
