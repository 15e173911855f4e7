//! Render output sink
//!
//! Writes the master mix and every stem as WAV files next to a JSON
//! manifest. Each manifest entry carries the file's SHA-256 so a render can
//! be verified later. Reading is supported for round-trip checks.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::buffer::{calculate_peak, calculate_rms, AudioBuffer, ChannelLayout};
use crate::error::{PsalmodyError, Result};
use crate::mixer::PsalmRenderResult;

pub const MASTER_FILE: &str = "master.wav";
pub const STEMS_DIR: &str = "stems";
pub const MANIFEST_FILE: &str = "manifest.json";

/// WAV sample encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFormat {
    /// 16 or 24 (integer PCM) or 32 (float)
    pub bit_depth: u16,
}

impl Default for ExportFormat {
    fn default() -> Self {
        Self::pcm24()
    }
}

impl ExportFormat {
    pub fn new(bit_depth: u16) -> Result<Self> {
        match bit_depth {
            16 | 24 | 32 => Ok(Self { bit_depth }),
            other => Err(PsalmodyError::config("bit_depth", other, "16, 24 or 32")),
        }
    }

    pub fn pcm16() -> Self {
        Self { bit_depth: 16 }
    }

    pub fn pcm24() -> Self {
        Self { bit_depth: 24 }
    }

    pub fn float32() -> Self {
        Self { bit_depth: 32 }
    }

    fn spec(&self, channels: u16, sample_rate: u32) -> WavSpec {
        WavSpec {
            channels,
            sample_rate,
            bits_per_sample: self.bit_depth,
            sample_format: if self.bit_depth == 32 { SampleFormat::Float } else { SampleFormat::Int },
        }
    }
}

/// One written file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Stem name, or "master"
    pub name: String,
    /// Path relative to the output directory
    pub path: String,
    pub channels: usize,
    /// `None` for a silent file
    pub peak_dbfs: Option<f32>,
    pub rms_dbfs: Option<f32>,
    pub sha256: String,
}

/// Description of a written render
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderManifest {
    pub render_id: Option<Uuid>,
    pub sample_rate: u32,
    pub num_samples: usize,
    pub duration_secs: f64,
    pub bit_depth: u16,
    pub files: Vec<ManifestEntry>,
}

impl RenderManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn entry(&self, name: &str) -> Option<&ManifestEntry> {
        self.files.iter().find(|e| e.name == name)
    }
}

fn wav_error(path: &Path, source: hound::Error) -> PsalmodyError {
    PsalmodyError::Wav { path: path.display().to_string(), source }
}

/// Write `buffer` to `path` at its own sample rate
pub fn write_wav(buffer: &AudioBuffer, path: &Path, format: ExportFormat) -> Result<()> {
    let format = ExportFormat::new(format.bit_depth)?;
    buffer.ensure_finite("wav_export", None)?;
    let spec = format.spec(buffer.num_channels() as u16, buffer.sample_rate);
    let mut writer = WavWriter::create(path, spec).map_err(|e| wav_error(path, e))?;

    let interleaved = buffer.to_interleaved();
    match format.bit_depth {
        16 => {
            for sample in interleaved {
                let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                writer.write_sample(scaled).map_err(|e| wav_error(path, e))?;
            }
        }
        24 => {
            for sample in interleaved {
                // hound stores 24-bit samples in an i32
                let scaled = (sample * 8_388_607.0).clamp(-8_388_608.0, 8_388_607.0) as i32;
                writer.write_sample(scaled).map_err(|e| wav_error(path, e))?;
            }
        }
        _ => {
            for sample in interleaved {
                writer.write_sample(sample).map_err(|e| wav_error(path, e))?;
            }
        }
    }

    writer.finalize().map_err(|e| wav_error(path, e))?;
    debug!(path = %path.display(), samples = buffer.len(), "wav written");
    Ok(())
}

/// Read a mono or stereo WAV file as float samples
pub fn read_wav(path: &Path) -> Result<AudioBuffer> {
    let reader = WavReader::open(path).map_err(|e| wav_error(path, e))?;
    let spec = reader.spec();
    let layout = ChannelLayout::from_count(spec.channels as usize).ok_or_else(|| {
        PsalmodyError::processing("wav_import", format!("{} channels (only mono/stereo supported)", spec.channels))
    })?;

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, _) => reader.into_samples::<f32>().collect::<std::result::Result<_, _>>(),
        (SampleFormat::Int, 16) => reader
            .into_samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<std::result::Result<_, _>>(),
        (SampleFormat::Int, 24) => reader
            .into_samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8_388_608.0))
            .collect::<std::result::Result<_, _>>(),
        (SampleFormat::Int, bits) => {
            return Err(PsalmodyError::processing("wav_import", format!("{}-bit integer audio", bits)));
        }
    }
    .map_err(|e| wav_error(path, e))?;

    AudioBuffer::from_interleaved(&samples, layout, spec.sample_rate)
}

/// SHA-256 of a file as lowercase hex
pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Write master, stems and manifest into `dir`, creating it if needed
pub fn write_render(
    result: &PsalmRenderResult,
    dir: &Path,
    format: ExportFormat,
    render_id: Option<Uuid>,
) -> Result<RenderManifest> {
    fs::create_dir_all(dir.join(STEMS_DIR))?;

    let mut targets: Vec<(String, PathBuf, &AudioBuffer)> =
        vec![("master".to_string(), PathBuf::from(MASTER_FILE), &result.master)];
    for (kind, stem) in &result.stems {
        let relative = Path::new(STEMS_DIR).join(format!("{}.wav", kind));
        targets.push((kind.to_string(), relative, stem));
    }

    let mut files = Vec::with_capacity(targets.len());
    for (name, relative, buffer) in targets {
        let full = dir.join(&relative);
        write_wav(buffer, &full, format)?;
        let silent = buffer.peak() == 0.0;
        files.push(ManifestEntry {
            name,
            path: relative.to_string_lossy().replace('\\', "/"),
            channels: buffer.num_channels(),
            peak_dbfs: (!silent).then(|| calculate_peak(buffer)),
            rms_dbfs: (!silent).then(|| calculate_rms(buffer)),
            sha256: file_sha256(&full)?,
        });
    }

    let manifest = RenderManifest {
        render_id,
        sample_rate: result.sample_rate(),
        num_samples: result.len(),
        duration_secs: result.duration_secs(),
        bit_depth: format.bit_depth,
        files,
    };
    fs::write(dir.join(MANIFEST_FILE), serde_json::to_string_pretty(&manifest)?)?;

    info!(
        dir = %dir.display(),
        files = manifest.files.len(),
        duration_secs = manifest.duration_secs,
        "render written"
    );
    Ok(manifest)
}
