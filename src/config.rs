use crate::error::{EngineError, SettingsError};
use configparser::ini::Ini;
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default detection threshold in dB
pub const DEFAULT_SIGNAL_THRESHOLD: f64 = -70.0;

/// Largest FFT size accepted through a config update
pub const MAX_FFT_SIZE: u32 = 1 << 20;

const DEFAULT_UPSTREAM_URL: &str = "ws://localhost:8073/ws/";

static UPSTREAM_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(wss?|tcp|synthetic)://[^\s/:]+(:\d{1,5})?(/\S*)?$").expect("Invalid regex")
});

/// Check that an upstream URL has a supported scheme and a host
pub fn validate_upstream_url(url: &str) -> Result<(), EngineError> {
    if UPSTREAM_URL.is_match(url) {
        Ok(())
    } else {
        Err(EngineError::InvalidUrl(url.to_string()))
    }
}

/// Runtime-tunable acquisition and detection parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Bins per frame, `None` until inferred from the first frame
    pub fft_size: Option<u32>,
    /// Center frequency in Hz
    pub center_freq: f64,
    /// Sample rate in Hz
    pub sample_rate: f64,
    /// Detection threshold in dB
    pub signal_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fft_size: None,
            center_freq: 0.0,
            sample_rate: 0.0,
            signal_threshold: DEFAULT_SIGNAL_THRESHOLD,
        }
    }
}

/// Partial update of [`EngineConfig`]; `None` fields are left untouched.
///
/// An `fft_size` of 0 clears the configured size so the next frame
/// determines it again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub fft_size: Option<u32>,
    pub center_freq: Option<f64>,
    pub sample_rate: Option<f64>,
    pub signal_threshold: Option<f64>,
}

impl ConfigUpdate {
    pub fn validate(&self) -> Result<(), EngineError> {
        if let Some(size) = self.fft_size {
            if size > MAX_FFT_SIZE {
                return Err(EngineError::InvalidConfig {
                    field: "fft_size",
                    reason: format!("{} exceeds maximum of {}", size, MAX_FFT_SIZE),
                });
            }
        }
        if let Some(freq) = self.center_freq {
            check_frequency("center_freq", freq)?;
        }
        if let Some(rate) = self.sample_rate {
            check_frequency("sample_rate", rate)?;
        }
        if let Some(threshold) = self.signal_threshold {
            if !threshold.is_finite() {
                return Err(EngineError::InvalidConfig {
                    field: "signal_threshold",
                    reason: "must be a finite dB value".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Validate, then return `config` with the provided fields replaced
    pub fn apply(&self, config: &EngineConfig) -> Result<EngineConfig, EngineError> {
        self.validate()?;
        let mut next = *config;
        if let Some(size) = self.fft_size {
            next.fft_size = (size > 0).then_some(size);
        }
        if let Some(freq) = self.center_freq {
            next.center_freq = freq;
        }
        if let Some(rate) = self.sample_rate {
            next.sample_rate = rate;
        }
        if let Some(threshold) = self.signal_threshold {
            next.signal_threshold = threshold;
        }
        Ok(next)
    }
}

fn check_frequency(field: &'static str, value: f64) -> Result<(), EngineError> {
    if !value.is_finite() {
        return Err(EngineError::InvalidConfig {
            field,
            reason: "must be finite".to_string(),
        });
    }
    if value < 0.0 {
        return Err(EngineError::InvalidConfig {
            field,
            reason: format!("must not be negative (got {})", value),
        });
    }
    Ok(())
}

/// Upstream connection and reconnect policy
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamSettings {
    pub url: String,
    pub reconnect_base_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
    pub max_reconnect_attempts: u32,
}

impl UpstreamSettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_UPSTREAM_URL.to_string(),
            reconnect_base_delay_ms: 2000,
            max_reconnect_delay_ms: 60_000,
            max_reconnect_attempts: 5,
        }
    }
}

/// Frame buffer and detection history bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferSettings {
    pub max_size: usize,
    pub cleanup_threshold: usize,
    pub history_max: usize,
    pub history_cleanup: usize,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            max_size: 1000,
            cleanup_threshold: 500,
            history_max: 100,
            history_cleanup: 50,
        }
    }
}

/// Peak detector tuning
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    /// Peaks closer than this many bins collapse to the strongest one
    pub min_peak_distance: usize,
    /// Drop from the peak that bounds the occupied bandwidth
    pub bandwidth_margin_db: f64,
    /// Margin above threshold at which confidence saturates
    pub confidence_span_db: f64,
    /// Minimum SNR over the estimated noise floor, if any
    pub min_snr: Option<f64>,
    /// Restrict detection to a scan profile's ranges
    pub profile: Option<String>,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            min_peak_distance: 5,
            bandwidth_margin_db: 3.0,
            confidence_span_db: 40.0,
            min_snr: None,
            profile: None,
        }
    }
}

/// Synthetic receiver parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticSettings {
    pub frame_interval_ms: u64,
    pub carriers: u32,
}

impl Default for SyntheticSettings {
    fn default() -> Self {
        Self {
            frame_interval_ms: 100,
            carriers: 4,
        }
    }
}

/// Persisted engine settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub upstream: UpstreamSettings,
    pub engine: EngineConfig,
    /// Run detection on every decoded frame instead of on demand
    pub detect_on_frame: bool,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
    pub buffer: BufferSettings,
    pub detector: DetectorSettings,
    pub synthetic: SyntheticSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            upstream: UpstreamSettings::default(),
            engine: EngineConfig::default(),
            detect_on_frame: true,
            event_capacity: 1024,
            buffer: BufferSettings::default(),
            detector: DetectorSettings::default(),
            synthetic: SyntheticSettings::default(),
        }
    }
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "spectrum", "spectrum-engine")
            .map(|dirs| dirs.config_dir().join("settings.ini"))
    }

    /// Load settings from the default location, or return defaults
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load settings from `path`; missing files or keys fall back to defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        let mut ini = Ini::new();
        if ini.load(path).is_err() {
            return Self::default();
        }

        let defaults = Self::default();

        let upstream = UpstreamSettings {
            url: ini
                .get("upstream", "url")
                .filter(|url| validate_upstream_url(url).is_ok())
                .unwrap_or(defaults.upstream.url),
            reconnect_base_delay_ms: get_u64(&ini, "upstream", "reconnect_base_delay_ms")
                .unwrap_or(defaults.upstream.reconnect_base_delay_ms),
            max_reconnect_delay_ms: get_u64(&ini, "upstream", "max_reconnect_delay_ms")
                .unwrap_or(defaults.upstream.max_reconnect_delay_ms),
            max_reconnect_attempts: get_u32(&ini, "upstream", "max_reconnect_attempts")
                .unwrap_or(defaults.upstream.max_reconnect_attempts),
        };

        // Each key is validated on its own; a rejected value keeps its default
        let updates = [
            ConfigUpdate {
                fft_size: get_u32(&ini, "engine", "fft_size"),
                ..ConfigUpdate::default()
            },
            ConfigUpdate {
                center_freq: get_f64(&ini, "engine", "center_freq"),
                ..ConfigUpdate::default()
            },
            ConfigUpdate {
                sample_rate: get_f64(&ini, "engine", "sample_rate"),
                ..ConfigUpdate::default()
            },
            ConfigUpdate {
                signal_threshold: get_f64(&ini, "engine", "signal_threshold"),
                ..ConfigUpdate::default()
            },
        ];
        let engine = updates.iter().fold(defaults.engine, |engine, update| {
            update.apply(&engine).unwrap_or(engine)
        });

        let buffer = BufferSettings {
            max_size: get_u64(&ini, "buffer", "max_size")
                .map(|v| v as usize)
                .unwrap_or(defaults.buffer.max_size),
            cleanup_threshold: get_u64(&ini, "buffer", "cleanup_threshold")
                .map(|v| v as usize)
                .unwrap_or(defaults.buffer.cleanup_threshold),
            history_max: get_u64(&ini, "buffer", "history_max")
                .map(|v| v as usize)
                .unwrap_or(defaults.buffer.history_max),
            history_cleanup: get_u64(&ini, "buffer", "history_cleanup")
                .map(|v| v as usize)
                .unwrap_or(defaults.buffer.history_cleanup),
        };

        let detector = DetectorSettings {
            min_peak_distance: get_u64(&ini, "detector", "min_peak_distance")
                .map(|v| v as usize)
                .unwrap_or(defaults.detector.min_peak_distance),
            bandwidth_margin_db: get_f64(&ini, "detector", "bandwidth_margin_db")
                .unwrap_or(defaults.detector.bandwidth_margin_db),
            confidence_span_db: get_f64(&ini, "detector", "confidence_span_db")
                .filter(|span| *span > 0.0)
                .unwrap_or(defaults.detector.confidence_span_db),
            min_snr: get_f64(&ini, "detector", "min_snr"),
            profile: ini
                .get("detector", "profile")
                .filter(|p| !p.trim().is_empty()),
        };

        let synthetic = SyntheticSettings {
            frame_interval_ms: get_u64(&ini, "synthetic", "frame_interval_ms")
                .filter(|ms| *ms > 0)
                .unwrap_or(defaults.synthetic.frame_interval_ms),
            carriers: get_u32(&ini, "synthetic", "carriers")
                .unwrap_or(defaults.synthetic.carriers),
        };

        Self {
            upstream,
            engine,
            detect_on_frame: ini
                .getbool("engine", "detect_on_frame")
                .ok()
                .flatten()
                .unwrap_or(defaults.detect_on_frame),
            event_capacity: get_u64(&ini, "engine", "event_capacity")
                .filter(|c| *c > 0)
                .map(|v| v as usize)
                .unwrap_or(defaults.event_capacity),
            buffer,
            detector,
            synthetic,
        }
    }

    /// Save settings to the default location
    pub fn save(&self) -> Result<(), SettingsError> {
        let path = Self::config_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to(&path)
    }

    /// Save settings to `path`, creating the parent directory if needed
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(SettingsError::CreateDir)?;
        }

        let mut ini = Ini::new();
        ini.set("upstream", "url", Some(self.upstream.url.clone()));
        ini.set(
            "upstream",
            "reconnect_base_delay_ms",
            Some(self.upstream.reconnect_base_delay_ms.to_string()),
        );
        ini.set(
            "upstream",
            "max_reconnect_delay_ms",
            Some(self.upstream.max_reconnect_delay_ms.to_string()),
        );
        ini.set(
            "upstream",
            "max_reconnect_attempts",
            Some(self.upstream.max_reconnect_attempts.to_string()),
        );

        ini.set(
            "engine",
            "fft_size",
            Some(self.engine.fft_size.unwrap_or(0).to_string()),
        );
        ini.set(
            "engine",
            "center_freq",
            Some(self.engine.center_freq.to_string()),
        );
        ini.set(
            "engine",
            "sample_rate",
            Some(self.engine.sample_rate.to_string()),
        );
        ini.set(
            "engine",
            "signal_threshold",
            Some(self.engine.signal_threshold.to_string()),
        );
        ini.set(
            "engine",
            "detect_on_frame",
            Some(self.detect_on_frame.to_string()),
        );
        ini.set(
            "engine",
            "event_capacity",
            Some(self.event_capacity.to_string()),
        );

        ini.set("buffer", "max_size", Some(self.buffer.max_size.to_string()));
        ini.set(
            "buffer",
            "cleanup_threshold",
            Some(self.buffer.cleanup_threshold.to_string()),
        );
        ini.set(
            "buffer",
            "history_max",
            Some(self.buffer.history_max.to_string()),
        );
        ini.set(
            "buffer",
            "history_cleanup",
            Some(self.buffer.history_cleanup.to_string()),
        );

        ini.set(
            "detector",
            "min_peak_distance",
            Some(self.detector.min_peak_distance.to_string()),
        );
        ini.set(
            "detector",
            "bandwidth_margin_db",
            Some(self.detector.bandwidth_margin_db.to_string()),
        );
        ini.set(
            "detector",
            "confidence_span_db",
            Some(self.detector.confidence_span_db.to_string()),
        );
        if let Some(min_snr) = self.detector.min_snr {
            ini.set("detector", "min_snr", Some(min_snr.to_string()));
        }
        if let Some(profile) = &self.detector.profile {
            ini.set("detector", "profile", Some(profile.clone()));
        }

        ini.set(
            "synthetic",
            "frame_interval_ms",
            Some(self.synthetic.frame_interval_ms.to_string()),
        );
        ini.set(
            "synthetic",
            "carriers",
            Some(self.synthetic.carriers.to_string()),
        );

        ini.write(path).map_err(SettingsError::Write)
    }

    /// Reset to defaults
    pub fn reset_to_defaults(&mut self) {
        let url = std::mem::take(&mut self.upstream.url);
        *self = Self::default();
        // Keep the upstream url as-is
        self.upstream.url = url;
    }
}

fn get_u64(ini: &Ini, section: &str, key: &str) -> Option<u64> {
    ini.getuint(section, key).ok().flatten()
}

/// Out-of-range values read as missing
fn get_u32(ini: &Ini, section: &str, key: &str) -> Option<u32> {
    get_u64(ini, section, key).and_then(|v| u32::try_from(v).ok())
}

fn get_f64(ini: &Ini, section: &str, key: &str) -> Option<f64> {
    ini.getfloat(section, key).ok().flatten()
}
