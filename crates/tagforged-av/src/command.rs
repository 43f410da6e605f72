//! ffmpeg argument construction.
//!
//! [`codec_args`] is a total function over `AudioFormat x Quality`; there is
//! no fallthrough arm, so adding a format without codec flags is a compile
//! error rather than a silent passthrough encode.

use std::path::Path;

use tagforged_common::{AudioFormat, Quality};

/// Copy global metadata (tags) from the first input into the output.
pub const PRESERVE_METADATA: [&str; 2] = ["-map_metadata", "0"];

/// Overwrite the destination without prompting.
pub const OVERWRITE: &str = "-y";

/// Bitrate in kbps used by the bitrate-driven encoders (mp3, m4a).
pub fn bitrate_kbps(quality: Quality) -> u32 {
    match quality {
        Quality::Low => 128,
        Quality::Standard => 192,
        Quality::High => 256,
        Quality::Maximum => 320,
    }
}

/// FLAC `-compression_level`.
pub fn flac_compression_level(quality: Quality) -> u32 {
    match quality {
        Quality::Low => 0,
        Quality::Standard => 5,
        Quality::High => 8,
        Quality::Maximum => 12,
    }
}

/// PCM codec and sample rate for WAV output.
pub fn wav_sample_spec(quality: Quality) -> (&'static str, u32) {
    match quality {
        Quality::Low => ("pcm_s16le", 22_050),
        Quality::Standard => ("pcm_s16le", 44_100),
        Quality::High => ("pcm_s24le", 48_000),
        Quality::Maximum => ("pcm_s32le", 96_000),
    }
}

/// libvorbis `-q:a` index.
pub fn vorbis_quality(quality: Quality) -> u32 {
    match quality {
        Quality::Low => 2,
        Quality::Standard => 5,
        Quality::High => 7,
        Quality::Maximum => 10,
    }
}

/// Encoder selection and quality flags for one format/tier pair.
pub fn codec_args(format: AudioFormat, quality: Quality) -> Vec<String> {
    match format {
        AudioFormat::Mp3 => vec![
            "-c:a".into(),
            "libmp3lame".into(),
            "-b:a".into(),
            format!("{}k", bitrate_kbps(quality)),
        ],
        AudioFormat::M4a => vec![
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            format!("{}k", bitrate_kbps(quality)),
        ],
        AudioFormat::Flac => vec![
            "-c:a".into(),
            "flac".into(),
            "-compression_level".into(),
            flac_compression_level(quality).to_string(),
        ],
        AudioFormat::Wav => {
            let (codec, rate) = wav_sample_spec(quality);
            vec![
                "-c:a".into(),
                codec.into(),
                "-ar".into(),
                rate.to_string(),
            ]
        }
        AudioFormat::Ogg => vec![
            "-c:a".into(),
            "libvorbis".into(),
            "-q:a".into(),
            vorbis_quality(quality).to_string(),
        ],
    }
}

/// Full ffmpeg argument list converting `input` into `output`.
///
/// Layout: `-hide_banner -nostdin -i <input> -map_metadata 0 <codec args>
/// -y <output>`. WAV output additionally gets `-vn` before `-y` because it
/// cannot carry embedded cover art.
pub fn conversion_args(
    input: &Path,
    output: &Path,
    format: AudioFormat,
    quality: Quality,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-nostdin".into(),
        "-i".into(),
        input.to_string_lossy().to_string(),
    ];
    args.extend(PRESERVE_METADATA.iter().map(|s| s.to_string()));
    args.extend(codec_args(format, quality));
    if format == AudioFormat::Wav {
        args.push("-vn".into());
    }
    args.push(OVERWRITE.into());
    args.push(output.to_string_lossy().to_string());
    args
}
