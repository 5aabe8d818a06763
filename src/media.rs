//! Attachment media handling: kind detection, thumbnails and video transcoding.

use std::path::Path;

use serde::Serialize;
use utoipa::ToSchema;

pub const VIDEO_EXTENSIONS: [&str; 4] = [".avi", ".mov", ".mp4", ".webm"];
pub const THUMB_WIDTH: u32 = 300;
pub const THUMB_HEIGHT: u32 = 500;
pub const THUMB_PREFIX: &str = "thumb_";

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ffmpeg binary not found: {0}")]
    FfmpegNotFound(std::io::Error),

    #[error("ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed { exit_code: Option<i32>, stderr: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn from_extension(extension: &str) -> Self {
        let extension = extension.to_lowercase();
        if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
            MediaKind::Video
        } else {
            MediaKind::Image
        }
    }

    pub fn from_file_name(name: &str) -> Self {
        Self::from_extension(&extension(name))
    }
}

/// Lowercase extension including the dot, or empty.
pub fn extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

pub fn thumbnail_key(name: &str) -> String {
    format!("{THUMB_PREFIX}{name}")
}

/// Replaces the extension of `name` with `.mp4`.
pub fn mp4_name(name: &str) -> String {
    let stem = Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    format!("{stem}.mp4")
}

/// Writes a copy of `src` fitting 300×500 to `dst`. Smaller images are kept
/// at their size. Blocking.
pub fn write_thumbnail(src: &Path, dst: &Path) -> Result<(), MediaError> {
    let img = image::open(src)?;
    let thumb = if img.width() > THUMB_WIDTH || img.height() > THUMB_HEIGHT {
        img.thumbnail(THUMB_WIDTH, THUMB_HEIGHT)
    } else {
        img
    };
    thumb.save(dst)?;
    Ok(())
}

/// Re-encodes a video as H.264/AAC mp4 with the `ffmpeg` binary.
pub async fn transcode_to_mp4(src: &Path, dst: &Path) -> Result<(), MediaError> {
    let output = tokio::process::Command::new("ffmpeg")
        .args(["-v", "error", "-y", "-i"])
        .arg(src)
        .args(["-c:v", "libx264", "-pix_fmt", "yuv420p", "-c:a", "aac", "-movflags", "+faststart"])
        .arg(dst)
        .output()
        .await
        .map_err(MediaError::FfmpegNotFound)?;

    if !output.status.success() {
        return Err(MediaError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }
    Ok(())
}
