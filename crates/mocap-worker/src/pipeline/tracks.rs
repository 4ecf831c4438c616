//! Tracking output parsing and auto subject selection.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use mocap_media::{MediaError, MediaResult};

/// One frame of the tracker's output: the subject ids visible in it.
#[derive(Debug, Deserialize)]
pub struct TrackedFrame {
    #[serde(default)]
    pub tid: Vec<u32>,
}

/// Load the tracker's per-frame subject data.
pub async fn load_tracking(path: impl AsRef<Path>) -> MediaResult<Vec<TrackedFrame>> {
    let path = path.as_ref();
    let raw = tokio::fs::read(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            MediaError::FileNotFound(path.to_path_buf())
        } else {
            MediaError::from(e)
        }
    })?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Pick the subject present in the most frames.
///
/// Ties resolve to the subject first encountered in frame order. Returns
/// `None` when no frame contains any subject.
pub fn select_longest_track(frames: &[TrackedFrame]) -> Option<u32> {
    let mut counts: HashMap<u32, usize> = HashMap::new();
    let mut first_seen: Vec<u32> = Vec::new();

    for frame in frames {
        for &tid in &frame.tid {
            if !counts.contains_key(&tid) {
                first_seen.push(tid);
            }
            *counts.entry(tid).or_insert(0) += 1;
        }
    }

    let mut best: Option<(u32, usize)> = None;
    for tid in first_seen {
        let count = counts[&tid];
        // Strictly greater keeps the first-encountered subject on ties.
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((tid, count));
        }
    }

    best.map(|(tid, count)| {
        tracing::info!(tid, frames = count, "Auto-selected longest track");
        tid
    })
}
