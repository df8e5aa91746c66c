//! Codec table: the fixed set of encoders the engine can run and the
//! launch description instantiated for each one.

use std::str::FromStr;
use thiserror::Error;

/// RTP clock rate used to convert buffer durations into sample counts
/// for video codecs.
pub const VIDEO_CLOCK_RATE: u32 = 90_000;

/// Clock rate for Opus audio; also the playback sample rate of the
/// reference configuration.
pub const AUDIO_CLOCK_RATE: u32 = 48_000;

/// Codecs the engine knows how to produce.
///
/// The set is closed: an unrecognized codec name is a configuration error
/// surfaced at the parse boundary, before any pipeline is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    Vp8,
    Vp9,
    H264,
    Opus,
}

impl Codec {
    /// All codecs, in the order they are documented.
    pub const ALL: [Codec; 4] = [Codec::Vp8, Codec::Vp9, Codec::H264, Codec::Opus];

    /// Whether buffers of this codec carry audio samples.
    pub fn is_audio(self) -> bool {
        matches!(self, Codec::Opus)
    }

    /// The clock rate the duration of a buffer is converted against.
    pub fn clock_rate(self) -> u32 {
        if self.is_audio() {
            AUDIO_CLOCK_RATE
        } else {
            VIDEO_CLOCK_RATE
        }
    }

    /// The launch description instantiated in the engine for this codec:
    /// a synthetic test source, the encoder stage, and the application sink
    /// the engine delivers encoded buffers from.
    pub fn launch_description(self) -> String {
        let sink = "appsink name=appsink";
        match self {
            Codec::Vp8 => format!("videotestsrc ! vp8enc ! {sink}"),
            Codec::Vp9 => format!("videotestsrc ! vp9enc ! {sink}"),
            Codec::H264 => format!(
                "videotestsrc ! video/x-raw,format=I420 ! \
                 x264enc bframes=0 speed-preset=veryfast key-int-max=60 ! \
                 video/x-h264,stream-format=byte-stream ! {sink}"
            ),
            Codec::Opus => format!("audiotestsrc ! opusenc ! {sink}"),
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Codec::Vp8 => write!(f, "VP8"),
            Codec::Vp9 => write!(f, "VP9"),
            Codec::H264 => write!(f, "H264"),
            Codec::Opus => write!(f, "Opus"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown codec '{0}', expected one of vp8, vp9, h264, opus")]
pub struct UnknownCodec(pub String);

impl FromStr for Codec {
    type Err = UnknownCodec;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vp8" => Ok(Codec::Vp8),
            "vp9" => Ok(Codec::Vp9),
            "h264" => Ok(Codec::H264),
            "opus" => Ok(Codec::Opus),
            _ => Err(UnknownCodec(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptions_contain_encoder_stage() {
        assert!(Codec::Vp8.launch_description().contains("vp8enc"));
        assert!(Codec::Vp9.launch_description().contains("vp9enc"));
        assert!(Codec::H264.launch_description().contains("x264enc"));
        assert!(Codec::Opus.launch_description().contains("opusenc"));

        for codec in Codec::ALL {
            assert!(codec.launch_description().ends_with("appsink name=appsink"));
        }
    }

    #[test]
    fn test_sources_match_media_kind() {
        for codec in Codec::ALL {
            let desc = codec.launch_description();
            if codec.is_audio() {
                assert!(desc.starts_with("audiotestsrc"));
            } else {
                assert!(desc.starts_with("videotestsrc"));
            }
        }
    }

    #[test]
    fn test_clock_rates() {
        assert_eq!(Codec::Opus.clock_rate(), 48_000);
        assert_eq!(Codec::Vp8.clock_rate(), 90_000);
        assert_eq!(Codec::Vp9.clock_rate(), 90_000);
        assert_eq!(Codec::H264.clock_rate(), 90_000);
    }

    #[test]
    fn test_parse_known_codecs() {
        assert_eq!("vp8".parse::<Codec>().unwrap(), Codec::Vp8);
        assert_eq!("VP9".parse::<Codec>().unwrap(), Codec::Vp9);
        assert_eq!("H264".parse::<Codec>().unwrap(), Codec::H264);
        assert_eq!("opus".parse::<Codec>().unwrap(), Codec::Opus);
    }

    #[test]
    fn test_parse_unknown_codec_fails() {
        let err = "av1".parse::<Codec>().unwrap_err();
        assert_eq!(err, UnknownCodec("av1".to_string()));
        assert!("".parse::<Codec>().is_err());
    }
}
