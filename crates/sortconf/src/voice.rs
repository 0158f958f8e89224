//! Voice pipeline settings: transcoder parameters and suspension-point timeouts.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Settings consumed by the voice-delivery core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// ffmpeg binary used by the transcoder.
    /// Default: "ffmpeg" (resolved through PATH)
    #[serde(default = "VoiceConfig::default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Opus target bitrate in kbit/s.
    /// Default: 128
    #[serde(default = "VoiceConfig::default_bitrate_kbps")]
    pub bitrate_kbps: u32,

    /// Output sample rate; the voice transport only accepts 48 kHz.
    /// Default: 48000
    #[serde(default = "VoiceConfig::default_sample_rate")]
    pub sample_rate: u32,

    /// Output channel count.
    /// Default: 2
    #[serde(default = "VoiceConfig::default_channels")]
    pub channels: u16,

    /// Gateway ready wait.
    /// Default: 10000 (10s)
    #[serde(default = "VoiceConfig::default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Voice join wait, until the transport reports ready.
    /// Default: 30000 (30s)
    #[serde(default = "VoiceConfig::default_join_timeout_ms")]
    pub join_timeout_ms: u64,

    /// Probation window after a transport disconnect.
    /// Default: 5000 (5s)
    #[serde(default = "VoiceConfig::default_reconnect_probe_ms")]
    pub reconnect_probe_ms: u64,

    /// Time allowed for the transcoder to emit its first bytes.
    /// Default: 10000 (10s)
    #[serde(default = "VoiceConfig::default_first_output_timeout_ms")]
    pub first_output_timeout_ms: u64,
}

impl VoiceConfig {
    fn default_ffmpeg_path() -> PathBuf {
        PathBuf::from("ffmpeg")
    }

    fn default_bitrate_kbps() -> u32 {
        128
    }

    fn default_sample_rate() -> u32 {
        48_000
    }

    fn default_channels() -> u16 {
        2
    }

    fn default_connect_timeout_ms() -> u64 {
        10_000
    }

    fn default_join_timeout_ms() -> u64 {
        30_000
    }

    fn default_reconnect_probe_ms() -> u64 {
        5_000
    }

    fn default_first_output_timeout_ms() -> u64 {
        10_000
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn reconnect_probe(&self) -> Duration {
        Duration::from_millis(self.reconnect_probe_ms)
    }

    pub fn first_output_timeout(&self) -> Duration {
        Duration::from_millis(self.first_output_timeout_ms)
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: Self::default_ffmpeg_path(),
            bitrate_kbps: Self::default_bitrate_kbps(),
            sample_rate: Self::default_sample_rate(),
            channels: Self::default_channels(),
            connect_timeout_ms: Self::default_connect_timeout_ms(),
            join_timeout_ms: Self::default_join_timeout_ms(),
            reconnect_probe_ms: Self::default_reconnect_probe_ms(),
            first_output_timeout_ms: Self::default_first_output_timeout_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_defaults() {
        let voice = VoiceConfig::default();
        assert_eq!(voice.bitrate_kbps, 128);
        assert_eq!(voice.sample_rate, 48_000);
        assert_eq!(voice.channels, 2);
        assert_eq!(voice.connect_timeout(), Duration::from_secs(10));
        assert_eq!(voice.join_timeout(), Duration::from_secs(30));
        assert_eq!(voice.reconnect_probe(), Duration::from_secs(5));
    }
}
