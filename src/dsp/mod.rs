//! DSP Effects Library
//!
//! Stateless, parameter-validated transforms usable by any mix layer.
//! All effects implement the `Effect` trait for uniform processing.

mod chain;
mod chorus;
mod compressor;
mod delay;
mod dynamics;
pub mod effect;
pub(crate) mod filter;
mod freeze;
mod glitch;
mod limiter;
mod reverb;
mod saturation;
pub mod spectral;

pub use chain::{ChainEffect, EffectChain, LayerEffectParams};
pub use chorus::{Chorus, ChorusParams};
pub use compressor::{Compressor, CompressorParams};
pub use delay::{Delay, DelayParams};
pub use dynamics::{MasterDynamics, MasterDynamicsParams};
pub use effect::{Bound, Effect};
pub use filter::{BandpassFilter, BandpassFilterParams, ResonantFilter, ResonantFilterParams};
pub use freeze::{SpectralFreeze, SpectralFreezeParams};
pub use glitch::{Glitch, GlitchKind, GlitchParams};
pub use limiter::{Limiter, LimiterParams};
pub use reverb::{Reverb, ReverbParams};
pub use saturation::{Saturation, SaturationParams};
