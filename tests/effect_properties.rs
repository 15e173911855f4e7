//! Effect property tests
//!
//! Behavioral properties of the effect library checked through the public API.

use psalmody::dsp::{
    Delay, DelayParams, Effect, EffectChain, Glitch, GlitchKind, GlitchParams, LayerEffectParams, ReverbParams,
};
use psalmody::engine::AudioBuffer;
use psalmody::vocal::{estimate_pitch, FormantShifter, FormantSpeechConfig, FormantSpeechSynth, TextSegment, TtsAdapter};
use rustfft::{num_complex::Complex, FftPlanner};
use test_case::test_case;

fn impulse(len: usize, sample_rate: u32) -> AudioBuffer {
    let mut samples = vec![0.0; len];
    samples[0] = 1.0;
    AudioBuffer::from_mono(samples, sample_rate)
}

fn sung_vowel() -> AudioBuffer {
    let synth = FormantSpeechSynth::new(FormantSpeechConfig {
        sample_rate: 16000,
        pitch_hz: 150.0,
        vowel_ms: 300.0,
        ..Default::default()
    })
    .unwrap();
    let segment = TextSegment { index: 0, text: "aaa".to_string(), span: 0..3 };
    synth.synthesize(&segment).unwrap()
}

fn spectral_centroid(buffer: &AudioBuffer) -> f64 {
    let samples = buffer.channel(0);
    let mut spectrum: Vec<Complex<f32>> = samples.iter().map(|&s| Complex::new(s, 0.0)).collect();
    FftPlanner::<f32>::new().plan_fft_forward(spectrum.len()).process(&mut spectrum);

    let bin_hz = buffer.sample_rate as f64 / spectrum.len() as f64;
    let (weighted, total) = spectrum[..spectrum.len() / 2]
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(w, t), (k, c)| {
            let mag = c.norm() as f64;
            (w + k as f64 * bin_hz * mag, t + mag)
        });
    weighted / total
}

// === Delay ===

#[test]
fn test_delay_feedback_increases_tail_energy() {
    let input = impulse(2000, 1000);
    let tail_energy = |feedback: f32| {
        let delay = Delay::new(DelayParams { delay_time_ms: 100.0, feedback, mix: 0.5 }).unwrap();
        let out = delay.process(&input);
        out.channel(0)[150..].iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>()
    };

    let energies: Vec<f64> = [0.0, 0.2, 0.5, 0.8, 0.95].into_iter().map(tail_energy).collect();
    for pair in energies.windows(2) {
        assert!(pair[1] > pair[0], "tail energies not increasing: {:?}", energies);
    }
}

// === Glitch ===

#[test]
fn test_glitch_repeat_three_longer_than_two() {
    let input = AudioBuffer::from_mono((0..4000).map(|i| (i as f32 * 0.01).sin()).collect(), 8000);
    let glitch = |repeat_count: u32| {
        Glitch::new(GlitchParams {
            kind: GlitchKind::Repeat { repeat_count },
            intensity: 0.6,
            chunk_size_ms: 50.0,
            seed: 21,
        })
        .unwrap()
        .process(&input)
    };
    let two = glitch(2);
    let three = glitch(3);
    assert!(two.len() > input.len());
    assert!(three.len() > two.len());
}

// === Formant Shift ===

#[test]
fn test_formant_shift_keeps_pitch() {
    let vowel = sung_vowel();
    let original = estimate_pitch(vowel.channel(0), vowel.sample_rate, 60.0, 600.0).unwrap();

    for ratio in [0.5, 0.75, 1.25, 1.6, 2.0] {
        let shifted = FormantShifter::new(ratio).unwrap().process(&vowel);
        assert_eq!(shifted.len(), vowel.len());
        let pitch = estimate_pitch(shifted.channel(0), shifted.sample_rate, 60.0, 600.0).unwrap();
        assert!(
            (pitch - original).abs() / original < 0.02,
            "ratio {}: pitch {} vs {}",
            ratio,
            pitch,
            original
        );
    }
}

#[test]
fn test_formant_shift_moves_centroid_monotonically() {
    let vowel = sung_vowel();
    let centroids: Vec<f64> = [0.6, 0.8, 1.0, 1.3, 1.7]
        .into_iter()
        .map(|ratio| spectral_centroid(&FormantShifter::new(ratio).unwrap().process(&vowel)))
        .collect();
    for pair in centroids.windows(2) {
        assert!(pair[1] > pair[0], "centroids not increasing: {:?}", centroids);
    }
}

// === Parameter Rejection ===

#[test_case(LayerEffectParams { delay: Some(DelayParams { delay_time_ms: 0.0, feedback: 0.2, mix: 0.5 }), ..Default::default() } ; "zero delay time")]
#[test_case(LayerEffectParams { delay: Some(DelayParams { delay_time_ms: 200.0, feedback: 1.0, mix: 0.5 }), ..Default::default() } ; "unity feedback")]
#[test_case(LayerEffectParams { reverb: Some(ReverbParams { mix: 1.5, ..Default::default() }), ..Default::default() } ; "reverb mix above one")]
#[test_case(LayerEffectParams { reverb: Some(ReverbParams { decay_time_secs: f32::NAN, ..Default::default() }), ..Default::default() } ; "nan decay")]
#[test_case(LayerEffectParams { glitch: Some(GlitchParams { kind: GlitchKind::Repeat { repeat_count: 1 }, ..Default::default() }), ..Default::default() } ; "single repeat")]
fn test_chain_rejects_invalid_parameters(params: LayerEffectParams) {
    let err = EffectChain::from_params(&params).unwrap_err();
    assert_eq!(err.error_code(), "EFFECT_PARAMETER");
    assert!(err.is_fatal());
}

#[test]
fn test_formant_ratio_out_of_range() {
    for ratio in [0.49, 2.01, f32::INFINITY] {
        assert_eq!(FormantShifter::new(ratio).unwrap_err().error_code(), "EFFECT_PARAMETER");
    }
}
