//! Segmented speech synthesis.
//!
//! Turns a `ScriptIntent` into one continuous waveform plus the timing map
//! that places every segment on the time axis. Each segment is synthesized
//! separately with its emphasis tokens uppercased (the acoustic model
//! stresses capitalised words), then pauses are inserted as literal zero
//! samples. If any per-segment call fails, the whole script falls back to a
//! single-shot synthesis with a one-segment timing map; callers must not
//! treat that as an error.

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use lumen_models::{IntentTimingMap, ScriptIntent, TimingSegment};

use crate::audio;
use crate::error::{MediaError, MediaResult};
use crate::tts::SpeechSynthesizer;

/// Segmented synthesis output.
#[derive(Debug)]
pub struct SegmentedOutput {
    pub audio_path: PathBuf,
    pub timing_map: IntentTimingMap,
    /// True when per-segment synthesis failed and the single-shot fallback
    /// produced the waveform.
    pub fallback_used: bool,
}

/// Drives per-segment TTS and assembles the intent timing map.
pub struct SegmentedSynthesizer {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    fps: u32,
    language: String,
}

impl SegmentedSynthesizer {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, fps: u32, language: impl Into<String>) -> Self {
        Self {
            synthesizer,
            fps,
            language: language.into(),
        }
    }

    /// Synthesize a full script, writing 16-bit PCM WAV at the model's
    /// native rate to `output_path`.
    pub async fn synthesize_with_intent(
        &self,
        intent: &ScriptIntent,
        reference_audio: &Path,
        output_path: &Path,
    ) -> MediaResult<SegmentedOutput> {
        match self
            .synthesize_segments(intent, reference_audio, output_path)
            .await
        {
            Ok(output) => Ok(output),
            Err(err) => {
                warn!(error = %err, "Per-segment synthesis failed, falling back to single-shot");
                self.synthesize_single_shot(intent, reference_audio, output_path)
                    .await
            }
        }
    }

    async fn synthesize_segments(
        &self,
        intent: &ScriptIntent,
        reference_audio: &Path,
        output_path: &Path,
    ) -> MediaResult<SegmentedOutput> {
        let mut waveform: Vec<f32> = Vec::new();
        let mut segments: Vec<TimingSegment> = Vec::new();
        let mut cursor = 0.0_f64;
        let mut sample_rate: Option<u32> = None;

        for (idx, seg) in intent.segments.iter().enumerate() {
            let shaped = shape_emphasis(&seg.text, &seg.emphasis);
            let synthesis = self
                .synthesizer
                .synthesize(&shaped, reference_audio, &self.language)
                .await?;

            match sample_rate {
                None => sample_rate = Some(synthesis.sample_rate),
                Some(rate) if rate != synthesis.sample_rate => {
                    return Err(MediaError::tts_failed(format!(
                        "sample rate changed mid-script: {} then {}",
                        rate, synthesis.sample_rate
                    )));
                }
                Some(_) => {}
            }
            let rate = sample_rate.unwrap_or(0);

            let duration = synthesis.duration();
            debug!(
                segment = idx,
                duration_s = format!("{:.2}", duration),
                pause_s = seg.pause_after,
                "Synthesized segment"
            );

            segments.push(TimingSegment {
                segment_idx: idx,
                start_time: cursor,
                end_time: cursor + duration,
                text: seg.text.clone(),
                pause_after: seg.pause_after,
                emphasis: seg.emphasis.clone(),
                sentence_end: seg.sentence_end,
            });

            waveform.extend_from_slice(&synthesis.samples);
            audio::append_silence(&mut waveform, seg.pause_after, rate);
            cursor += duration + seg.pause_after;
        }

        let sample_rate = sample_rate.ok_or_else(|| MediaError::tts_failed("no segments synthesized"))?;
        audio::write_pcm16_wav(output_path, &waveform, sample_rate)?;

        let timing_map = IntentTimingMap::new(segments, cursor, self.fps);
        info!(
            segments = timing_map.segments.len(),
            duration_s = format!("{:.2}", cursor),
            sample_rate = sample_rate,
            "Segmented synthesis complete"
        );

        Ok(SegmentedOutput {
            audio_path: output_path.to_path_buf(),
            timing_map,
            fallback_used: false,
        })
    }

    async fn synthesize_single_shot(
        &self,
        intent: &ScriptIntent,
        reference_audio: &Path,
        output_path: &Path,
    ) -> MediaResult<SegmentedOutput> {
        let text = intent.plain_text();
        let synthesis = self
            .synthesizer
            .synthesize(&text, reference_audio, &self.language)
            .await?;

        let duration = synthesis.duration();
        audio::write_pcm16_wav(output_path, &synthesis.samples, synthesis.sample_rate)?;

        let timing_map = IntentTimingMap::new(
            vec![TimingSegment {
                segment_idx: 0,
                start_time: 0.0,
                end_time: duration,
                text,
                pause_after: 0.0,
                emphasis: Vec::new(),
                sentence_end: true,
            }],
            duration,
            self.fps,
        );

        Ok(SegmentedOutput {
            audio_path: output_path.to_path_buf(),
            timing_map,
            fallback_used: true,
        })
    }
}

/// Uppercase each emphasis token where it occurs in `text`.
///
/// Matching is whole-word and ASCII-case-insensitive; only the first
/// occurrence of each token is shaped. Punctuation and spacing are
/// preserved untouched.
pub fn shape_emphasis(text: &str, emphasis: &[String]) -> String {
    let mut shaped = text.to_string();
    for token in emphasis {
        if token.trim().is_empty() {
            continue;
        }
        if let Some(range) = find_whole_word(&shaped, token) {
            let upper = shaped[range.clone()].to_uppercase();
            shaped.replace_range(range, &upper);
        }
    }
    shaped
}

/// Byte range of the first whole-word occurrence of `word` in `text`.
fn find_whole_word(text: &str, word: &str) -> Option<Range<usize>> {
    let mut start: Option<usize> = None;
    let mut spans: Vec<Range<usize>> = Vec::new();

    for (i, c) in text.char_indices() {
        if c.is_alphanumeric() || c == '\'' {
            if start.is_none() {
                start = Some(i);
            }
        } else if let Some(s) = start.take() {
            spans.push(s..i);
        }
    }
    if let Some(s) = start {
        spans.push(s..text.len());
    }

    spans
        .into_iter()
        .find(|r| text[r.clone()].eq_ignore_ascii_case(word))
}
