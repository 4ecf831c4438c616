//! FFprobe-based input video validation.

use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use mocap_models::VideoInfo;

use crate::error::{MediaError, MediaResult};

/// Admission limits for input videos.
#[derive(Debug, Clone, Copy)]
pub struct VideoLimits {
    /// Longest allowed edge in pixels
    pub max_edge: u32,
    /// Maximum duration in seconds
    pub max_duration: f64,
    /// Minimum number of frames the tracker needs
    pub min_frames: u64,
}

impl Default for VideoLimits {
    fn default() -> Self {
        Self {
            max_edge: 2048,
            max_duration: 30.0,
            min_frames: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
}

/// Probe a video and enforce the admission limits.
///
/// Returns the probed metadata on success so it can be attached to the job
/// record.
pub async fn validate_video(path: impl AsRef<Path>, limits: VideoLimits) -> MediaResult<VideoInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    which::which("ffprobe").map_err(|_| MediaError::ToolNotFound("ffprobe".to_string()))?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::InvalidVideo(format!(
            "ffprobe could not read {}",
            path.display()
        )));
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;

    let stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::InvalidVideo("No video stream found".to_string()))?;

    let width = stream.width.unwrap_or(0);
    let height = stream.height.unwrap_or(0);
    let fps = stream
        .r_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .unwrap_or(0.0);

    let duration = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    // nb_frames is container-dependent; fall back to duration * fps.
    let frame_count = stream
        .nb_frames
        .as_ref()
        .and_then(|n| n.parse::<u64>().ok())
        .unwrap_or_else(|| (duration * fps).round() as u64);

    if fps <= 0.0 {
        return Err(MediaError::InvalidVideo(
            "Could not determine frame rate".to_string(),
        ));
    }

    let max_edge = width.max(height);
    if max_edge > limits.max_edge {
        return Err(MediaError::InvalidVideo(format!(
            "Resolution too high: {}x{} (max edge {})",
            width, height, limits.max_edge
        )));
    }
    if duration > limits.max_duration {
        return Err(MediaError::InvalidVideo(format!(
            "Video too long: {:.2}s (max {:.0}s)",
            duration, limits.max_duration
        )));
    }
    if frame_count < limits.min_frames {
        return Err(MediaError::InvalidVideo(format!(
            "Too few frames: {} (min {})",
            frame_count, limits.min_frames
        )));
    }

    Ok(VideoInfo {
        width,
        height,
        fps,
        frame_count,
        duration,
    })
}

/// Parse ffprobe's rational frame rate ("30000/1001").
fn parse_frame_rate(rate: &str) -> Option<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
        None => rate.parse().ok(),
    }
}
