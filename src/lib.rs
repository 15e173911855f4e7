//! Psalmody - Sung Latin Psalm Renderer
//!
//! Turns Latin text (and an optional melody) into a layered liturgical
//! mix:
//! 1. Vocal pipeline - segmentation, speech synthesis, formant shaping,
//!    melodic contour, duration alignment and choral layering
//! 2. Sacred Machinery Engine - modal pads, drones and percussion, per-layer
//!    effect chains, constant-power panning and master dynamics
//!
//! # Architecture
//!
//! A render moves through a fixed set of stages tracked by
//! [`engine::RenderTracker`]:
//! - Text segmented
//! - Vocal synthesized
//! - Layered
//! - Mixed
//! - Finalized

pub mod ambient;
pub mod cli;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod mixer;
pub mod rng;
pub mod vocal;

pub use config::RenderConfig;
pub use engine::{PsalmRenderer, RenderOutcome};
pub use error::{PsalmodyError, Result};
pub use mixer::{PsalmRenderResult, SacredMachineryEngine, StemKind};
