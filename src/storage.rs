// SPDX-License-Identifier: GPL-3.0-only

//! Output locations for recordings

use crate::constants::{app_info, encoding};
use chrono::Local;
use std::path::{Path, PathBuf};

/// Default folder for recordings: `<videos>/overlay-recorder`
pub fn default_video_dir() -> PathBuf {
    dirs::video_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(app_info::APP_NAME)
}

/// Timestamped file name for a new recording
pub fn recording_file_name() -> String {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    format!("recording_{}.{}", timestamp, encoding::CONTAINER_EXTENSION)
}

/// Resolve where a recording goes
///
/// An explicit path wins; otherwise a timestamped file in `folder`
/// (or the default video folder) is used. The folder is created.
pub fn resolve_output_path(
    explicit: Option<&Path>,
    folder: Option<&Path>,
) -> std::io::Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    let dir = folder
        .map(Path::to_path_buf)
        .unwrap_or_else(default_video_dir);
    std::fs::create_dir_all(&dir)?;
    Ok(dir.join(recording_file_name()))
}
