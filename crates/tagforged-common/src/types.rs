//! Core type definitions for the conversion domain.
//!
//! [`AudioFormat`] and [`Quality`] together span the full parameter space of
//! a conversion. Both serialize in lowercase and parse case-insensitively.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Target container/codec family for a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// MPEG-1 Layer III.
    Mp3,
    /// Free Lossless Audio Codec.
    Flac,
    /// PCM in a RIFF/WAVE container.
    Wav,
    /// Vorbis in an Ogg container.
    Ogg,
    /// AAC in an MPEG-4 container.
    M4a,
}

impl AudioFormat {
    /// Every supported format, in display order.
    pub const ALL: [AudioFormat; 5] = [
        AudioFormat::Mp3,
        AudioFormat::Flac,
        AudioFormat::Wav,
        AudioFormat::Ogg,
        AudioFormat::M4a,
    ];

    /// Lowercase name, also used as the file extension.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Flac => "flac",
            Self::Wav => "wav",
            Self::Ogg => "ogg",
            Self::M4a => "m4a",
        }
    }

    /// File extension written for this format (without the dot).
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    /// Whether the format discards audio information.
    pub fn is_lossy(&self) -> bool {
        matches!(self, Self::Mp3 | Self::Ogg | Self::M4a)
    }

    /// Detect a format from a file extension, if it is one we know.
    pub fn from_extension(ext: &str) -> Option<Self> {
        ext.parse().ok()
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "mp3" => Ok(Self::Mp3),
            "flac" => Ok(Self::Flac),
            "wav" => Ok(Self::Wav),
            "ogg" => Ok(Self::Ogg),
            "m4a" => Ok(Self::M4a),
            _ => Err(Error::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Quality tier, mapped per format onto bitrate, compression level or
/// sample format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    #[default]
    Standard,
    High,
    Maximum,
}

impl Quality {
    /// Every tier, lowest first.
    pub const ALL: [Quality; 4] = [
        Quality::Low,
        Quality::Standard,
        Quality::High,
        Quality::Maximum,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Standard => "standard",
            Self::High => "high",
            Self::Maximum => "maximum",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "standard" => Ok(Self::Standard),
            "high" => Ok(Self::High),
            "maximum" | "max" => Ok(Self::Maximum),
            _ => Err(Error::UnsupportedQuality(s.to_string())),
        }
    }
}
