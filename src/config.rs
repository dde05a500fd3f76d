use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "WindowConfig::default_title")]
    pub title: String,
    #[serde(default = "WindowConfig::default_width")]
    pub width: u32,
    #[serde(default = "WindowConfig::default_height")]
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptConfig {
    #[serde(default = "ScriptConfig::default_dir")]
    pub dir: PathBuf,
    #[serde(default = "ScriptConfig::default_extension")]
    pub extension: String,
    /// Library directory, relative to `dir`.
    #[serde(default = "ScriptConfig::default_libraries")]
    pub libraries: PathBuf,
    /// Script names added when the host starts or is reset.
    #[serde(default = "ScriptConfig::default_startup")]
    pub startup: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetConfig {
    #[serde(default = "AssetConfig::default_dir")]
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub scripts: ScriptConfig,
    #[serde(default)]
    pub assets: AssetConfig,
    #[serde(default = "HostConfig::default_frame_rate")]
    pub frame_rate: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostConfigOverrides {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub scripts_dir: Option<PathBuf>,
}

impl WindowConfig {
    fn default_title() -> String {
        "Kestrel Script Host".to_string()
    }

    const fn default_width() -> u32 {
        640
    }

    const fn default_height() -> u32 {
        360
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { title: Self::default_title(), width: Self::default_width(), height: Self::default_height() }
    }
}

impl ScriptConfig {
    fn default_dir() -> PathBuf {
        PathBuf::from("scripts")
    }

    fn default_extension() -> String {
        "rhai".to_string()
    }

    fn default_libraries() -> PathBuf {
        PathBuf::from("libraries")
    }

    fn default_startup() -> Vec<String> {
        vec!["Smiley".to_string()]
    }

    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), ..Self::default() }
    }

    pub fn source_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{}", self.extension))
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.dir.join(&self.libraries)
    }
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            dir: Self::default_dir(),
            extension: Self::default_extension(),
            libraries: Self::default_libraries(),
            startup: Self::default_startup(),
        }
    }
}

impl AssetConfig {
    fn default_dir() -> PathBuf {
        PathBuf::from(".")
    }
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self { dir: Self::default_dir() }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            scripts: ScriptConfig::default(),
            assets: AssetConfig::default(),
            frame_rate: Self::default_frame_rate(),
        }
    }
}

impl HostConfig {
    const fn default_frame_rate() -> u32 {
        60
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!("Config load error: {err:#}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &HostConfigOverrides) {
        if let Some(width) = overrides.width {
            self.window.width = width;
        }
        if let Some(height) = overrides.height {
            self.window.height = height;
        }
        if let Some(dir) = &overrides.scripts_dir {
            self.scripts.dir = dir.clone();
        }
    }
}

impl HostConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.width.is_none() && self.height.is_none() && self.scripts_dir.is_none()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.width.is_some() {
            fields.push("width");
        }
        if self.height.is_some() {
            fields.push("height");
        }
        if self.scripts_dir.is_some() {
            fields.push("scripts");
        }
        fields
    }
}
