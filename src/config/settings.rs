//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and handed to component
//! threads by value.  Every section is `#[serde(default)]`, so a partial
//! `settings.toml` only needs the keys it changes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// MicrophoneConfig
// ---------------------------------------------------------------------------

/// Microphone capture and voice segmentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MicrophoneConfig {
    /// Input device name, `None` means the system default.
    pub device: Option<String>,
    /// Frame rate handed to the segmenter in Hz.
    pub sample_rate: u32,
    /// Samples per frame.
    pub chunk_size: usize,
    /// Longest a frame read may block before the loop re-checks its stop
    /// token.
    pub read_timeout_ms: u64,
    /// RMS threshold (0.0 – 1.0) above which a frame counts as voice.
    pub vad_threshold: f32,
    /// Silence in milliseconds that closes a recording.
    pub max_silence_ms: u64,
    /// Speech in milliseconds a closed recording needs to be sent for
    /// reasoning.
    pub min_sentence_ms: u64,
    /// Also write accepted utterances as WAV files.
    pub save_recordings: bool,
    /// Where recordings go; `None` uses the platform data dir.
    pub recordings_dir: Option<PathBuf>,
}

impl Default for MicrophoneConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: 16_000,
            chunk_size: 1_024,
            read_timeout_ms: 500,
            vad_threshold: 0.02,
            max_silence_ms: 1_000,
            min_sentence_ms: 500,
            save_recordings: false,
            recordings_dir: None,
        }
    }
}

impl MicrophoneConfig {
    pub fn max_silence(&self) -> Duration {
        Duration::from_millis(self.max_silence_ms)
    }

    pub fn min_sentence(&self) -> Duration {
        Duration::from_millis(self.min_sentence_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// CloudConfig
// ---------------------------------------------------------------------------

/// Reasoning request settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    pub model: String,
    /// Instruction text sent before the audio part.
    pub prompt_template: String,
    /// Attach the latest camera image when it is younger than this many
    /// milliseconds.  `0` disables image attachment.
    pub max_image_age_ms: u64,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".into(),
            prompt_template: "You control a small robot arm with a gripper, a buzzer and a \
                              camera. Listen to the spoken request. If it asks for an action, \
                              call the matching function. Otherwise answer briefly in the \
                              language of the request."
                .into(),
            max_image_age_ms: 2_000,
        }
    }
}

impl ReasoningConfig {
    pub fn max_image_age(&self) -> Duration {
        Duration::from_millis(self.max_image_age_ms)
    }
}

/// Speech synthesis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub model: String,
    /// Prebuilt voice name.
    pub voice: String,
    /// Rate of the PCM the service returns.
    pub sample_rate: u32,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash-preview-tts".into(),
            voice: "Kore".into(),
            sample_rate: 24_000,
        }
    }
}

/// Cloud reasoning and TTS service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Start the reasoning and TTS workers.
    pub enabled: bool,
    /// Base URL of the `generateContent` API.
    pub base_url: String,
    /// API key.  Takes precedence over `api_key_file`.
    pub api_key: Option<String>,
    /// File holding the API key; `None` uses `api-key.txt` in the config dir.
    pub api_key_file: Option<PathBuf>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    pub reasoning: ReasoningConfig,
    pub tts: TtsConfig,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://generativelanguage.googleapis.com".into(),
            api_key: None,
            api_key_file: None,
            timeout_secs: 30,
            reasoning: ReasoningConfig::default(),
            tts: TtsConfig::default(),
        }
    }
}

impl CloudConfig {
    /// Resolve the API key from config, then from the key file.
    pub fn resolve_api_key(&self, paths: &AppPaths) -> Result<String> {
        if let Some(key) = self.api_key.as_deref().map(str::trim) {
            if !key.is_empty() {
                return Ok(key.to_string());
            }
        }

        let file = self
            .api_key_file
            .clone()
            .unwrap_or_else(|| paths.api_key_file.clone());
        let key = std::fs::read_to_string(&file)
            .with_context(|| format!("API key file not found: {}", file.display()))?;
        let key = key.trim();
        if key.is_empty() {
            bail!("API key file is empty: {}", file.display());
        }
        Ok(key.to_string())
    }
}

// ---------------------------------------------------------------------------
// HardwareConfig
// ---------------------------------------------------------------------------

/// Actuator board on the register bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// Bus number the board hangs off.
    pub bus_number: u8,
    /// 7-bit device address of the board.
    pub bus_address: u8,
    /// Brightness (0 – 255) of the listening-state LED colours.
    pub led_intensity: u8,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            bus_number: 1,
            bus_address: 0x15,
            led_intensity: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// NetworkConfig
// ---------------------------------------------------------------------------

/// TCP link to the actuator board controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// Milliseconds between connection attempts.
    pub retry_interval_ms: u64,
    /// Largest frame accepted from the peer.
    pub max_frame_bytes: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "192.168.1.20".into(),
            port: 5_000,
            retry_interval_ms: 5_000,
            max_frame_bytes: 1 << 20,
        }
    }
}

impl NetworkConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

// ---------------------------------------------------------------------------
// CameraConfig
// ---------------------------------------------------------------------------

/// Scene camera.  Frames are read from a snapshot file kept fresh by an
/// external capture process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub enabled: bool,
    pub snapshot_path: PathBuf,
    /// Nominal capture rate; the worker polls at twice this rate.
    pub frame_rate: f32,
    /// Consecutive read failures after which the worker gives up.
    pub max_reading_errors: u32,
    /// MIME type of the snapshot.
    pub image_format: String,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            snapshot_path: PathBuf::from("/tmp/robot-camera.jpg"),
            frame_rate: 5.0,
            max_reading_errors: 10,
            image_format: "image/jpeg".into(),
        }
    }
}

impl CameraConfig {
    /// `0.5 / frame_rate` seconds.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(0.5 / f64::from(self.frame_rate))
    }
}

// ---------------------------------------------------------------------------
// DispatchConfig / ReadinessConfig
// ---------------------------------------------------------------------------

/// Poll intervals of the result dispatch loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Sleep after an iteration that found nothing.
    pub idle_sleep_ms: u64,
    /// Yield after an iteration that dispatched something.
    pub busy_yield_ms: u64,
    /// Play synthesised speech on the default output device.
    pub playback: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            idle_sleep_ms: 200,
            busy_yield_ms: 50,
            playback: true,
        }
    }
}

/// Startup readiness barrier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub interval_ms: u64,
    pub max_attempts: u32,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            max_attempts: 20,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use voice_robot::config::{AppConfig, AppPaths};
///
/// // Load (returns Default when file is missing)
/// let paths = AppPaths::new();
/// let config = AppConfig::load_from(&paths.settings_file).unwrap();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub microphone: MicrophoneConfig,
    pub cloud: CloudConfig,
    pub hardware: HardwareConfig,
    pub network: NetworkConfig,
    pub camera: CameraConfig,
    pub dispatch: DispatchConfig,
    pub readiness: ReadinessConfig,
}

impl AppConfig {
    /// Load from `path`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Save to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values no component can run with.
    pub fn validate(&self) -> Result<()> {
        let mic = &self.microphone;
        if mic.sample_rate == 0 {
            bail!("microphone.sample_rate must be > 0");
        }
        if mic.chunk_size == 0 {
            bail!("microphone.chunk_size must be > 0");
        }
        if !(0.0..=1.0).contains(&mic.vad_threshold) {
            bail!("microphone.vad_threshold must be within 0.0 – 1.0");
        }
        if self.cloud.tts.sample_rate == 0 {
            bail!("cloud.tts.sample_rate must be > 0");
        }
        if self.network.max_frame_bytes == 0 {
            bail!("network.max_frame_bytes must be > 0");
        }
        if !self.camera.frame_rate.is_finite() || self.camera.frame_rate <= 0.0 {
            bail!("camera.frame_rate must be > 0");
        }
        if self.readiness.max_attempts == 0 {
            bail!("readiness.max_attempts must be at least 1");
        }
        Ok(())
    }

    /// Directory for debug recordings.
    pub fn recordings_dir(&self, paths: &AppPaths) -> PathBuf {
        self.microphone
            .recordings_dir
            .clone()
            .unwrap_or_else(|| paths.recordings_dir.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn paths_in(dir: &Path) -> AppPaths {
        AppPaths::rooted(dir)
    }

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(original, loaded);
    }

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let config = AppConfig::load_from(&dir.path().join("nonexistent.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");
        std::fs::write(
            &path,
            "[microphone]\nmax_silence_ms = 800\n\n[network]\nenabled = true\nport = 6000\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.microphone.max_silence(), Duration::from_millis(800));
        assert_eq!(config.microphone.sample_rate, 16_000);
        assert!(config.network.enabled);
        assert_eq!(config.network.address(), "192.168.1.20:6000");
        assert_eq!(config.cloud, CloudConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "[microphone\n").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("parsing"));
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.microphone.sample_rate, 16_000);
        assert_eq!(cfg.cloud.tts.model, "gemini-2.5-flash-preview-tts");
        assert_eq!(cfg.cloud.tts.voice, "Kore");
        assert_eq!(cfg.cloud.tts.sample_rate, 24_000);
        assert_eq!(cfg.dispatch.idle_sleep_ms, 200);
        assert_eq!(cfg.dispatch.busy_yield_ms, 50);
        assert!(!cfg.network.enabled);
        assert!(!cfg.camera.enabled);
        assert_eq!(cfg.camera.poll_interval(), Duration::from_millis(100));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_impossible_values() {
        let mut cfg = AppConfig::default();
        cfg.microphone.chunk_size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.microphone.vad_threshold = -0.1;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("vad_threshold"));

        let mut cfg = AppConfig::default();
        cfg.readiness.max_attempts = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.camera.frame_rate = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn api_key_prefers_config_then_file() {
        let dir = tempdir().expect("temp dir");
        let paths = paths_in(dir.path());

        let mut cloud = CloudConfig::default();
        assert!(cloud.resolve_api_key(&paths).is_err());

        std::fs::create_dir_all(&paths.config_dir).unwrap();
        std::fs::write(&paths.api_key_file, "  from-file\n").unwrap();
        assert_eq!(cloud.resolve_api_key(&paths).unwrap(), "from-file");

        cloud.api_key = Some("inline".into());
        assert_eq!(cloud.resolve_api_key(&paths).unwrap(), "inline");

        cloud.api_key = Some("   ".into());
        assert_eq!(cloud.resolve_api_key(&paths).unwrap(), "from-file");
    }

    #[test]
    fn recordings_dir_override() {
        let dir = tempdir().expect("temp dir");
        let paths = paths_in(dir.path());
        let mut cfg = AppConfig::default();
        assert_eq!(cfg.recordings_dir(&paths), paths.recordings_dir);
        cfg.microphone.recordings_dir = Some(dir.path().join("rec"));
        assert_eq!(cfg.recordings_dir(&paths), dir.path().join("rec"));
    }
}
