// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::path::{Path, PathBuf};

use lumen_core::FailureClass;
use lumen_render::{DepthConvention, PresentPreference, RenderSettings};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("render.concurrent_frames must be between 1 and 8, got {0}")]
    ConcurrentFrames(usize),
    #[error("render.msaa_samples must be a power of two up to 64, got {0}")]
    MsaaSamples(u32),
    #[error("render.shadow_map_size must be between 16 and 16384, got {0}")]
    ShadowMapSize(u32),
    #[error("render.fence_timeout_ms and render.max_fence_timeouts must be non-zero")]
    FenceWatchdog,
}

pub fn failure_class(err: &(dyn std::error::Error + 'static)) -> Option<FailureClass> {
    err.is::<ConfigError>().then_some(FailureClass::Config)
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum PresentMode {
    Fifo,
    #[default]
    Mailbox,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum DepthMode {
    Standard,
    #[default]
    Reversed,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RenderCfg {
    concurrent_frames: usize,
    msaa_samples: u32,
    depth: DepthMode,
    present_mode: PresentMode,
    shadows: bool,
    shadow_map_size: u32,
    clear_color: [f32; 4],
    anisotropy: f32,
    shader_dir: PathBuf,
    fence_timeout_ms: u64,
    max_fence_timeouts: u32,
}

impl Default for RenderCfg {
    fn default() -> Self {
        let d = RenderSettings::default();
        RenderCfg {
            concurrent_frames: d.concurrent_frames,
            msaa_samples: d.msaa_samples,
            depth: DepthMode::Reversed,
            present_mode: PresentMode::Mailbox,
            shadows: d.shadows,
            shadow_map_size: d.shadow_map_size,
            clear_color: d.clear_color,
            anisotropy: d.anisotropy,
            shader_dir: d.shader_dir,
            fence_timeout_ms: d.fence_timeout_ms,
            max_fence_timeouts: d.max_fence_timeouts,
        }
    }
}

impl RenderCfg {
    /// Check ranges and convert. `shader_dir` overrides the configured
    /// directory when given on the command line.
    pub fn settings(&self, shader_dir: Option<&Path>) -> Result<RenderSettings, ConfigError> {
        if !(1..=8).contains(&self.concurrent_frames) {
            return Err(ConfigError::ConcurrentFrames(self.concurrent_frames));
        }
        if !self.msaa_samples.is_power_of_two() || self.msaa_samples > 64 {
            return Err(ConfigError::MsaaSamples(self.msaa_samples));
        }
        if !(16..=16384).contains(&self.shadow_map_size) {
            return Err(ConfigError::ShadowMapSize(self.shadow_map_size));
        }
        if self.fence_timeout_ms == 0 || self.max_fence_timeouts == 0 {
            return Err(ConfigError::FenceWatchdog);
        }
        Ok(RenderSettings {
            concurrent_frames: self.concurrent_frames,
            msaa_samples: self.msaa_samples,
            depth: match self.depth {
                DepthMode::Standard => DepthConvention::Standard,
                DepthMode::Reversed => DepthConvention::Reversed,
            },
            present: match self.present_mode {
                PresentMode::Fifo => PresentPreference::Fifo,
                PresentMode::Mailbox => PresentPreference::Mailbox,
            },
            shadows: self.shadows,
            shadow_map_size: self.shadow_map_size,
            clear_color: self.clear_color,
            anisotropy: self.anisotropy.max(1.0),
            shader_dir: shader_dir.map_or_else(|| self.shader_dir.clone(), Path::to_path_buf),
            fence_timeout_ms: self.fence_timeout_ms,
            max_fence_timeouts: self.max_fence_timeouts,
        })
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowCfg {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: "lumen".into(),
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct AppCfg {
    #[serde(default)]
    pub render: RenderCfg,
    #[serde(default)]
    pub window: WindowCfg,
}

fn parse_cfg(text: &str, path: &Path) -> AppCfg {
    match toml::from_str::<AppCfg>(text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %path.display(), "ignoring malformed config: {e}");
            AppCfg::default()
        }
    }
}

pub fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => {
            info!(path = %path.display(), "config loaded");
            parse_cfg(&s, path)
        }
        Err(e) => {
            debug!(path = %path.display(), "no config ({e}), using defaults");
            AppCfg::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> AppCfg {
        parse_cfg(text, Path::new("lumen.toml"))
    }

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = parse("");
        assert_eq!(cfg, AppCfg::default());
        let s = cfg.render.settings(None).unwrap();
        assert_eq!(s.concurrent_frames, 2);
        assert_eq!(s.depth, DepthConvention::Reversed);
        assert_eq!(s.present, PresentPreference::Mailbox);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = parse(
            r#"
            [render]
            concurrent_frames = 3
            depth = "standard"
            present_mode = "fifo"

            [window]
            title = "viewer"
            "#,
        );
        let s = cfg.render.settings(None).unwrap();
        assert_eq!(s.concurrent_frames, 3);
        assert_eq!(s.depth, DepthConvention::Standard);
        assert_eq!(s.present, PresentPreference::Fifo);
        assert_eq!(s.msaa_samples, 4);
        assert_eq!(cfg.window.title, "viewer");
        assert_eq!(cfg.window.width, 1280);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let cfg = parse("[render\nconcurrent_frames = ");
        assert_eq!(cfg, AppCfg::default());
        let cfg = parse("[render]\ndepth = \"sideways\"\n");
        assert_eq!(cfg, AppCfg::default());
    }

    #[test]
    fn out_of_range_values_are_config_errors() {
        let cfg = parse("[render]\nconcurrent_frames = 0\n");
        let err = cfg.render.settings(None).unwrap_err();
        assert_eq!(err, ConfigError::ConcurrentFrames(0));

        let cfg = parse("[render]\nmsaa_samples = 3\n");
        assert_eq!(
            cfg.render.settings(None).unwrap_err(),
            ConfigError::MsaaSamples(3)
        );

        let err = anyhow::Error::new(ConfigError::FenceWatchdog);
        assert_eq!(
            lumen_core::classify(&err, failure_class),
            FailureClass::Config
        );
    }

    #[test]
    fn shader_dir_flag_overrides_config() {
        let cfg = parse("[render]\nshader_dir = \"assets/spv\"\n");
        let s = cfg.render.settings(None).unwrap();
        assert_eq!(s.shader_dir, PathBuf::from("assets/spv"));
        let s = cfg.render.settings(Some(Path::new("/tmp/spv"))).unwrap();
        assert_eq!(s.shader_dir, PathBuf::from("/tmp/spv"));
    }

    #[test]
    fn missing_file_uses_defaults() {
        let cfg = load_cfg(Path::new("/definitely/not/here/lumen.toml"));
        assert_eq!(cfg, AppCfg::default());
    }
}
