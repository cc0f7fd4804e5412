use std::path::Path;

use crate::audio::MAX_TRACK_CHANNELS;
use crate::error::{Error, Result};
use crate::pipeline::{Track, TrackMetadata};

// Load a WAV file from disk into a Track at `target_rate`, keeping the file's
// own channel layout. Nothing here runs on the audio thread.
pub fn load(path: &Path, target_rate: u32) -> Result<Track> {
    let decode_err = |reason: String| Error::Decode {
        path: path.display().to_string(),
        reason,
    };

    let mut reader = hound::WavReader::open(path).map_err(|e| decode_err(e.to_string()))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 || channels > MAX_TRACK_CHANNELS {
        return Err(Error::UnsupportedFormat(format!("{channels} channels")));
    }

    // Read the samples from the WAV file
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader // float, just pass it through
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| decode_err(e.to_string()))?,
        hound::SampleFormat::Int => { // int, scale into [-1, 1)
            let max = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|x| x as f32 / max))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| decode_err(e.to_string()))?
        }
    };

    if samples.len() < channels {
        return Err(decode_err("file holds no audio".into()));
    }

    let samples = if spec.sample_rate != target_rate {
        tracing::info!(from = spec.sample_rate, to = target_rate, "resampling track");
        resample_linear(&samples, channels, spec.sample_rate, target_rate)
    } else {
        samples
    };

    let track = Track::new(samples, target_rate, channels).with_metadata(metadata_for(path));
    tracing::info!(
        path = %path.display(),
        frames = track.frames(),
        channels,
        "decoded track"
    );
    Ok(track)
}

// WAV gives us no tags through hound, so the title is the file name
fn metadata_for(path: &Path) -> TrackMetadata {
    TrackMetadata {
        title: path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        ..TrackMetadata::default()
    }
}

// Simple linear resampler over interleaved frames.
pub fn resample_linear(samples: &[f32], channels: usize, source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || source_rate == 0 || target_rate == 0 {
        return samples.to_vec();
    }
    let frames = samples.len() / channels;
    let ratio = target_rate as f64 / source_rate as f64;
    let out_frames = (frames as f64 * ratio).ceil() as usize;
    let mut out = Vec::with_capacity(out_frames * channels);

    for i in 0..out_frames {
        // fractional position in the source buffer
        let src_pos = i as f64 / ratio; // ex. 3.7
        let idx = src_pos.floor() as usize; // ex. 3
        let frac = (src_pos - idx as f64) as f32; // ex. 0.7
        if idx + 1 >= frames { // edge case, hold the last frame
            let last = frames.saturating_sub(1) * channels;
            out.extend_from_slice(&samples[last..last + channels]);
        } else {
            let a = &samples[idx * channels..(idx + 1) * channels];
            let b = &samples[(idx + 1) * channels..(idx + 2) * channels];
            out.extend(a.iter().zip(b).map(|(a, b)| a * (1.0 - frac) + b * frac));
        }
    }
    out
}
