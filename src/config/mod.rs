//! Configuration for the robot controller.
//!
//! Provides `AppConfig` (top-level settings), one sub-config per component,
//! `AppPaths` for cross-platform directories, and TOML persistence via
//! `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, CameraConfig, CloudConfig, DispatchConfig, HardwareConfig, MicrophoneConfig,
    NetworkConfig, ReadinessConfig, ReasoningConfig, TtsConfig,
};
