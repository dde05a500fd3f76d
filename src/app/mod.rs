use std::path::Path;
use std::thread;

use anyhow::{Context, Result};

use crate::assets::ImageHandle;
use crate::cli::CliOverrides;
use crate::config::HostConfig;
use crate::scripts::ScriptHost;
use crate::time::Time;

const DEFAULT_CONFIG_PATH: &str = "config/host.json";
const CLEAR_COLOR: [u8; 4] = [0, 0, 0, 255];

pub fn load_config(cli: &CliOverrides) -> Result<HostConfig> {
    let mut config = match cli.config_path() {
        Some(path) => HostConfig::load(path)?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => HostConfig::load(DEFAULT_CONFIG_PATH)?,
        None => HostConfig::default(),
    };
    let overrides = cli.config_overrides();
    if !overrides.is_empty() {
        tracing::info!(fields = ?overrides.applied_fields(), "applying command-line overrides");
    }
    config.apply_overrides(&overrides);
    Ok(config)
}

/// Headless frame loop: update, clear, draw, then sleep out the rest of the frame.
pub fn run(cli: &CliOverrides) -> Result<()> {
    let config = load_config(cli)?;
    tracing::info!(
        title = %config.window.title,
        width = config.window.width,
        height = config.window.height,
        scripts = %config.scripts.dir.display(),
        "starting script host"
    );
    let mut host = ScriptHost::new(&config).context("Failed to initialise script host")?;
    host.add_startup_scripts();

    let surface = ImageHandle::new(config.window.width, config.window.height);
    let mut time = Time::new(config.frame_rate);
    let mut frames: u64 = 0;
    while cli.frames().map_or(true, |limit| frames < limit) {
        time.tick();
        if frames > 0 && time.delta > time.frame_budget() * 2 {
            tracing::debug!(delta = ?time.delta, budget = ?time.frame_budget(), "frame overran its budget");
        }
        host.update();
        surface.fill(CLEAR_COLOR);
        host.draw(&surface).context("Script change scan failed")?;
        frames += 1;
        thread::sleep(time.remaining());
    }

    if let Some(path) = cli.snapshot_path() {
        surface.to_image().save(path).with_context(|| format!("Failed to write snapshot {}", path.display()))?;
        tracing::info!(path = %path.display(), "wrote final frame");
    }
    tracing::info!(frames, scripts = host.len(), elapsed = time.elapsed_seconds(), "script host stopped");
    Ok(())
}
