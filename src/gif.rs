//! Animated GIF from a directory of rendered frames

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::render::open_viewer;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GifConfig {
    /// Pause between frames, hundredths of a second
    pub delay: u32,
    /// Times to loop, 0 loops forever
    pub loops: u32,
    /// Replace every colour by its complement
    pub negate: bool,
    pub gif_name: String,
    /// Open the result in `viewer`
    pub open: bool,
    pub converter: String,
    pub viewer: String,
}

impl Default for GifConfig {
    fn default() -> Self {
        Self {
            delay: 40,
            loops: 0,
            negate: false,
            gif_name: "devices.gif".to_string(),
            open: true,
            converter: "convert".to_string(),
            viewer: "eog".to_string(),
        }
    }
}

/// PNG frames in `dir`, sorted by file name
pub fn frame_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut frames: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "png"))
        .collect();
    frames.sort();
    Ok(frames)
}

/// Arguments to the converter, run inside the output directory
pub fn gif_command(frames: &[PathBuf], config: &GifConfig) -> Vec<String> {
    let mut args = vec![
        "-delay".to_string(),
        config.delay.to_string(),
        "-loop".to_string(),
        config.loops.to_string(),
    ];
    if config.negate {
        args.push("-negate".to_string());
    }
    args.extend(
        frames
            .iter()
            .filter_map(|f| f.file_name())
            .map(|name| name.to_string_lossy().into_owned()),
    );
    args.push(config.gif_name.clone());
    args
}

/// Assemble every PNG in `dir` into `dir/<gif_name>`.
///
/// The converter is waited on; the viewer is left running.
pub fn assemble_gif(dir: &Path, config: &GifConfig) -> Result<PathBuf> {
    let frames = frame_files(dir)?;
    if frames.is_empty() {
        warn!("No PNG frames in {}", dir.display());
    }
    let args = gif_command(&frames, config);
    info!("Running in {}: {} {}", dir.display(), config.converter, args.join(" "));

    let status = Command::new(&config.converter).args(&args).current_dir(dir).status()?;
    let gif = dir.join(&config.gif_name);
    if !status.success() {
        warn!("{} exited with {}", config.converter, status);
    } else if config.open {
        open_viewer(&config.viewer, &gif)?;
    }
    Ok(gif)
}
