// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use texel_render_vk::{PresentModePreference, RendererOptions};

pub const DEFAULT_CONFIG_PATH: &str = "texel.toml";

#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AppCfg {
    pub window: WindowCfg,
    pub render: RenderCfg,
    pub assets: AssetsCfg,
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
            title: "texel".to_owned(),
            width: 800,
            height: 600,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    pub present_mode: PresentModeCfg,
    /// Unset means the build-profile default.
    pub validation: Option<bool>,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            present_mode: PresentModeCfg::Mailbox,
            validation: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeCfg {
    Fifo,
    #[default]
    Mailbox,
}

impl From<PresentModeCfg> for PresentModePreference {
    fn from(mode: PresentModeCfg) -> Self {
        match mode {
            PresentModeCfg::Fifo => PresentModePreference::Fifo,
            PresentModeCfg::Mailbox => PresentModePreference::Mailbox,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct AssetsCfg {
    pub model: Option<PathBuf>,
    pub texture: Option<PathBuf>,
}

impl AppCfg {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("parse config")
    }

    /// Reads `path`, or `texel.toml` when none is given. Only the implicit
    /// default file may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p, true),
            None => (Path::new(DEFAULT_CONFIG_PATH), false),
        };
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text).with_context(|| format!("config {}", path.display())),
            Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("no {}; using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("read config {}", path.display())),
        }
    }

    pub fn renderer_options(&self) -> RendererOptions {
        RendererOptions {
            clear_color: self.render.clear_color,
            present_mode: self.render.present_mode.into(),
        }
    }
}
