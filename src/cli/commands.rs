//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::RenderArgs;
use crate::config::RenderConfig;
use crate::engine::{write_render, ExportFormat, PsalmRenderer};
use crate::vocal::{MelodyEvent, TextSegmenter};

/// Render a psalm and write master, stems and manifest.
pub fn render(args: &RenderArgs) -> Result<()> {
    let text = match (&args.text, &args.text_file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => {
            fs::read_to_string(path).with_context(|| format!("reading text file {}", path.display()))?
        }
        (None, None) => anyhow::bail!("either --text or --text-file is required"),
    };
    let melody = load_melody(args)?;
    let config = load_config(args)?;
    let format = ExportFormat::new(args.bit_depth)?;

    info!(
        words = TextSegmenter::new().segment(&text).len(),
        melody_events = melody.as_ref().map_or(0, Vec::len),
        mode = %config.ambient.mode,
        "starting render"
    );

    let renderer = PsalmRenderer::new(config).context("building renderer")?;
    let outcome = renderer.render(&text, melody.as_deref()).context("rendering psalm")?;
    let manifest = write_render(&outcome.result, &args.out, format, Some(outcome.render_id))
        .with_context(|| format!("writing render to {}", args.out.display()))?;

    println!("Render {} complete", outcome.render_id);
    println!("Duration: {:.2}s at {} Hz", manifest.duration_secs, manifest.sample_rate);
    for entry in &manifest.files {
        let peak = entry.peak_dbfs.map_or_else(|| "silent".to_string(), |db| format!("{:.1} dBFS", db));
        println!("  {:<12} {:<22} {}", entry.name, entry.path, peak);
    }

    Ok(())
}

/// Print the default configuration.
pub fn default_config() -> Result<()> {
    println!("{}", RenderConfig::default().to_json_pretty()?);
    Ok(())
}

/// Print the word segmentation of `text`.
pub fn segment(text: &str) -> Result<()> {
    let segments = TextSegmenter::new().segment(text);
    if segments.is_empty() {
        println!("No words found.");
        return Ok(());
    }
    for segment in segments {
        println!("{:>3}  {:<20} [{}..{})", segment.index, segment.text, segment.span.start, segment.span.end);
    }
    Ok(())
}

fn load_config(args: &RenderArgs) -> Result<RenderConfig> {
    let mut config = match &args.config {
        Some(path) => RenderConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RenderConfig::default(),
    };
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }
    if let Some(layers) = args.layers {
        config.vocal.layers.num_layers = layers;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn load_melody(args: &RenderArgs) -> Result<Option<Vec<MelodyEvent>>> {
    if let Some(list) = &args.melody {
        return Ok(Some(MelodyEvent::parse_list(list)?));
    }
    match &args.melody_file {
        Some(path) => Ok(Some(read_melody_file(path)?)),
        None => Ok(None),
    }
}

fn read_melody_file(path: &Path) -> Result<Vec<MelodyEvent>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading melody file {}", path.display()))?;
    let events: Vec<MelodyEvent> =
        serde_json::from_str(&content).with_context(|| format!("parsing melody file {}", path.display()))?;
    for event in &events {
        event.validate()?;
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    fn render_args(extra: &[&str]) -> RenderArgs {
        let mut argv = vec!["psalmody", "render", "--text", "Amen", "--out", "unused"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Some(Commands::Render(args)) => args,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_overrides_applied() {
        let config = load_config(&render_args(&["--seed", "11", "--layers", "2"])).unwrap();
        assert_eq!(config.ambient.seed, 11);
        assert_eq!(config.vocal.layers.seed, 11);
        assert_eq!(config.vocal.layers.num_layers, 2);
    }

    #[test]
    fn test_bad_layer_count_rejected() {
        assert!(load_config(&render_args(&["--layers", "0"])).is_err());
    }

    #[test]
    fn test_melody_sources() {
        let inline = load_melody(&render_args(&["--melody", "220:0.5, 247:0.3"])).unwrap().unwrap();
        assert_eq!(inline.len(), 2);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("melody.json");
        fs::write(&path, r#"[{"pitch_hz": 196.0, "duration_sec": 0.4}]"#).unwrap();
        let from_file =
            load_melody(&render_args(&["--melody-file", path.to_str().unwrap()])).unwrap().unwrap();
        assert_eq!(from_file, vec![MelodyEvent { pitch_hz: 196.0, duration_sec: 0.4 }]);

        assert!(load_melody(&render_args(&[])).unwrap().is_none());
    }

    #[test]
    fn test_render_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        fs::write(
            &config_path,
            r#"{"speech": {"sample_rate": 8000}, "vocal": {"stretch_fft_size": 512, "layers": {"num_layers": 1}},
                "mix": {"sample_rate": 8000, "tail_secs": 0.25}}"#,
        )
        .unwrap();
        let out = dir.path().join("render");
        let args = render_args(&["--config", config_path.to_str().unwrap(), "--bit-depth", "16"]);
        let args = RenderArgs { out: out.clone(), ..args };
        render(&args).unwrap();
        assert!(out.join("master.wav").exists());
        assert!(out.join("manifest.json").exists());
    }
}
