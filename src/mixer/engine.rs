//! Sacred Machinery Engine
//!
//! Renders the ambient layers, runs each layer through its effect chain,
//! pans and peak-normalizes it, sums the layers with their gains and puts
//! the master through compressor and limiter.

use super::{pan_buffer, EffectSettings, MixConfig, PsalmRenderResult, StemKind};
use crate::ambient::{AmbientGenerator, AmbientParams, DroneGenerator, PadGenerator, PercussionGenerator};
use crate::dsp::spectral::resample_linear;
use crate::dsp::{Effect, EffectChain, MasterDynamics};
use crate::engine::{AudioBuffer, ChannelLayout};
use crate::error::Result;
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Mixes vocals and ambient layers into a finished render
#[derive(Debug)]
pub struct SacredMachineryEngine {
    mix: MixConfig,
    chains: BTreeMap<StemKind, EffectChain>,
    master: MasterDynamics,
}

impl SacredMachineryEngine {
    /// Validate settings and build every effect up front
    pub fn new(mix: MixConfig, effects: &EffectSettings) -> Result<Self> {
        mix.validate()?;
        let chains = StemKind::ALL
            .into_iter()
            .map(|kind| Ok((kind, EffectChain::from_params(effects.layer(kind))?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        let master = MasterDynamics::new(&effects.master)?;
        Ok(Self { mix, chains, master })
    }

    pub fn mix_config(&self) -> &MixConfig {
        &self.mix
    }

    /// Highest absolute sample the master can contain
    pub fn ceiling(&self) -> f32 {
        self.master.ceiling()
    }

    /// Render length in samples for a vocal of `vocal_len` samples at the mix rate
    pub fn render_len(&self, vocal_len: usize, ambient: &AmbientParams) -> usize {
        let sr = self.mix.sample_rate as f64;
        match ambient.duration_secs {
            Some(secs) => (secs as f64 * sr).round() as usize,
            None => vocal_len + (self.mix.tail_secs as f64 * sr).round() as usize,
        }
    }

    /// Full mixdown of `vocal` over freshly generated ambient layers
    pub fn render(&self, vocal: &AudioBuffer, ambient: &AmbientParams) -> Result<PsalmRenderResult> {
        let layers = self.prepare_layers(vocal, ambient)?;
        self.mix_layers(layers)
    }

    /// Vocal at the mix rate plus generated pad, drone and percussion layers,
    /// ready for [`mix_layers`](Self::mix_layers)
    pub fn prepare_layers(
        &self,
        vocal: &AudioBuffer,
        ambient: &AmbientParams,
    ) -> Result<Vec<(StemKind, AudioBuffer)>> {
        ambient.validate()?;
        let vocal = self.to_mix_rate(vocal);
        let len = self.render_len(vocal.len(), ambient);
        if len < vocal.len() {
            warn!(
                vocal_samples = vocal.len(),
                render_samples = len,
                "fixed duration shorter than vocals, truncating"
            );
        }
        let (pads, drones, percussion) = self.generate_ambient(ambient, len);
        Ok(vec![
            (StemKind::Vocals, vocal),
            (StemKind::Pads, pads),
            (StemKind::Drones, drones),
            (StemKind::Percussion, percussion),
        ])
    }

    /// Generate pad, drone and percussion buffers of `len` samples in parallel
    ///
    /// Disabled layers come back silent without being synthesized.
    pub fn generate_ambient(&self, ambient: &AmbientParams, len: usize) -> (AudioBuffer, AudioBuffer, AudioBuffer) {
        let sr = self.mix.sample_rate;
        let run = |kind: StemKind, generator: &dyn AmbientGenerator| {
            if self.mix.layer(kind).enabled {
                debug!(layer = %kind, generator = generator.name(), samples = len, "generating layer");
                generator.generate(ambient, len, sr)
            } else {
                AudioBuffer::new(len, ChannelLayout::Mono, sr)
            }
        };
        let (pads, (drones, percussion)) = rayon::join(
            || run(StemKind::Pads, &PadGenerator),
            || {
                rayon::join(
                    || run(StemKind::Drones, &DroneGenerator),
                    || run(StemKind::Percussion, &PercussionGenerator),
                )
            },
        );
        (pads, drones, percussion)
    }

    /// Effects, pan, normalization, gain and master dynamics over ready layers
    ///
    /// Every layer is fitted to the longest non-vocal layer (or the vocal if
    /// it is alone). Stems are taken after normalization and before gain.
    pub fn mix_layers(&self, layers: Vec<(StemKind, AudioBuffer)>) -> Result<PsalmRenderResult> {
        let sr = self.mix.sample_rate;
        let len = layers
            .iter()
            .filter(|(kind, _)| *kind != StemKind::Vocals)
            .map(|(_, buf)| buf.len())
            .max()
            .or_else(|| layers.iter().map(|(_, buf)| buf.len()).max())
            .unwrap_or(0);

        let processed = layers
            .into_par_iter()
            .map(|(kind, buffer)| self.process_layer(kind, &buffer, len).map(|stem| (kind, stem)))
            .collect::<Result<Vec<_>>>()?;

        let mut stems: BTreeMap<StemKind, AudioBuffer> = processed.into_iter().collect();
        for kind in StemKind::ALL {
            stems
                .entry(kind)
                .or_insert_with(|| AudioBuffer::new(len, ChannelLayout::Stereo, sr));
        }

        let mut left = vec![0.0_f32; len];
        let mut right = vec![0.0_f32; len];
        for (kind, stem) in &stems {
            let layer = self.mix.layer(*kind);
            if !layer.enabled {
                continue;
            }
            for (out, s) in left.iter_mut().zip(stem.channel(0)) {
                *out += s * layer.gain;
            }
            for (out, s) in right.iter_mut().zip(stem.channel(1)) {
                *out += s * layer.gain;
            }
        }

        let summed = AudioBuffer::from_stereo(left, right, sr);
        summed.ensure_finite("mix_sum", None)?;
        let master = self.master.process(&summed);
        master.ensure_finite("master_dynamics", None)?;

        info!(
            samples = master.len(),
            duration_secs = master.duration_secs(),
            peak = master.peak(),
            "mixdown complete"
        );
        Ok(PsalmRenderResult { master, stems })
    }

    fn process_layer(&self, kind: StemKind, buffer: &AudioBuffer, len: usize) -> Result<AudioBuffer> {
        let layer = self.mix.layer(kind);
        if !layer.enabled {
            return Ok(AudioBuffer::new(len, ChannelLayout::Stereo, self.mix.sample_rate));
        }
        let fitted = self.to_mix_rate(buffer).fitted(len);
        // Repeat glitches lengthen the layer; stems stay at the render length.
        let wet = match self.chains.get(&kind) {
            Some(chain) => chain.process(&fitted, kind.as_str())?.fitted(len),
            None => fitted,
        };
        let stem = pan_buffer(&wet, layer.pan).normalized_to_peak(self.mix.layer_peak);
        stem.ensure_finite("layer", Some(kind.as_str()))?;
        Ok(stem)
    }

    /// Linear resample of `buffer` to the mix rate; a copy when rates match
    pub fn to_mix_rate(&self, buffer: &AudioBuffer) -> AudioBuffer {
        let target = self.mix.sample_rate;
        if buffer.sample_rate == target {
            return buffer.clone();
        }
        let out_len = (buffer.len() as f64 * target as f64 / buffer.sample_rate as f64).round() as usize;
        AudioBuffer {
            samples: buffer.samples.iter().map(|ch| resample_linear(ch, out_len)).collect(),
            sample_rate: target,
        }
    }
}
