//! Quality variants and frame I/O.
//!
//! Variants are same-content encodes at different quality parameters, named
//! `{stem}_{qp}.{ext}`. They are ordered by file size; the largest is the
//! highest quality and serves as ground truth.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use accmask_models::qp_from_name;

use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// Frame file pattern used for extraction, relative to the output directory.
pub const FRAME_PATTERN: &str = "%010d.png";

/// One encoded quality level of the source video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityVariant {
    pub path: PathBuf,
    /// Quality parameter parsed from the file name
    pub qp: i32,
    /// Encoded size in bytes
    pub size: u64,
    /// Size relative to the largest variant, in `(0, 1]`
    pub weight: f64,
}

/// Decoded frames of one variant.
#[derive(Debug, Clone)]
pub struct VideoFrames {
    pub variant: QualityVariant,
    pub frames: Vec<Frame>,
}

/// Stat and sort variants by ascending size.
pub async fn load_variants(paths: &[PathBuf]) -> MediaResult<Vec<QualityVariant>> {
    if paths.is_empty() {
        return Err(MediaError::InvalidVideo("no input variants".to_string()));
    }

    let mut variants = Vec::with_capacity(paths.len());
    for path in paths {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.clone()));
        }
        let size = tokio::fs::metadata(path).await?.len();
        let qp = qp_from_name(path)?;
        variants.push(QualityVariant {
            path: path.clone(),
            qp,
            size,
            weight: 0.0,
        });
    }

    variants.sort_by_key(|v| v.size);
    let largest = variants.last().map(|v| v.size).unwrap_or(0);
    if largest == 0 {
        return Err(MediaError::InvalidVideo("all input variants are empty".to_string()));
    }
    for variant in &mut variants {
        variant.weight = variant.size as f64 / largest as f64;
    }

    info!(
        count = variants.len(),
        ground_truth = %variants[variants.len() - 1].path.display(),
        "Loaded quality variants"
    );
    Ok(variants)
}

/// Bandwidth weights of sorted variants.
pub fn bandwidth_weights(variants: &[QualityVariant]) -> Vec<f64> {
    variants.iter().map(|v| v.weight).collect()
}

/// Decode every frame of `video` into numbered PNGs under `out_dir`.
///
/// Frames are numbered from zero so file order matches frame ids. Returns the
/// number of frames written.
pub async fn extract_frames(video: &Path, out_dir: &Path) -> MediaResult<usize> {
    if !video.exists() {
        return Err(MediaError::FileNotFound(video.to_path_buf()));
    }
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;
    tokio::fs::create_dir_all(out_dir).await?;

    debug!(video = %video.display(), out_dir = %out_dir.display(), "Extracting frames");
    let output = Command::new("ffmpeg")
        .args(["-y", "-v", "error", "-i"])
        .arg(video)
        .args(["-start_number", "0"])
        .arg(out_dir.join(FRAME_PATTERN))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::ffmpeg_failed(
            format!("frame extraction failed for {}", video.display()),
            Some(String::from_utf8_lossy(&output.stderr).to_string()),
            output.status.code(),
        ));
    }

    let count = frame_files(out_dir)?.len();
    info!(video = %video.display(), frames = count, "Extracted frames");
    Ok(count)
}

/// Read numbered PNG frames from a directory in frame id order.
pub fn read_frames(dir: &Path) -> MediaResult<Vec<Frame>> {
    let files = frame_files(dir)?;
    files
        .par_iter()
        .map(|path| -> MediaResult<Frame> {
            let image = image::open(path)?.to_rgb8();
            Ok(Frame::from_rgb(&image))
        })
        .collect()
}

/// Extract and decode one variant into `work_dir/{file stem}`.
pub async fn decode_variant(variant: &QualityVariant, work_dir: &Path) -> MediaResult<VideoFrames> {
    let stem = variant
        .path
        .file_stem()
        .map(|s| s.to_os_string())
        .ok_or_else(|| MediaError::InvalidVideo(variant.path.display().to_string()))?;
    let dir = work_dir.join(stem);

    extract_frames(&variant.path, &dir).await?;
    let frames = tokio::task::spawn_blocking(move || read_frames(&dir))
        .await
        .map_err(|e| MediaError::internal(format!("frame decode task failed: {}", e)))??;

    Ok(VideoFrames {
        variant: variant.clone(),
        frames,
    })
}

/// Check that all variants share frame count and dimensions.
///
/// Returns `(width, height, frame count)`.
pub fn validate_shapes(videos: &[Vec<Frame>]) -> MediaResult<(u32, u32, usize)> {
    let first = videos
        .first()
        .ok_or_else(|| MediaError::shape_mismatch("no variants to compare"))?;
    let count = first.len();
    let dims = first
        .first()
        .map(Frame::dimensions)
        .ok_or_else(|| MediaError::shape_mismatch("variant 0 has no frames"))?;

    for (idx, frames) in videos.iter().enumerate() {
        if frames.len() != count {
            return Err(MediaError::shape_mismatch(format!(
                "variant {} has {} frames, variant 0 has {}",
                idx,
                frames.len(),
                count
            )));
        }
        if let Some((fid, frame)) = frames.iter().enumerate().find(|(_, f)| f.dimensions() != dims) {
            return Err(MediaError::shape_mismatch(format!(
                "variant {} frame {} is {}x{}, expected {}x{}",
                idx,
                fid,
                frame.width(),
                frame.height(),
                dims.0,
                dims.1
            )));
        }
    }

    Ok((dims.0, dims.1, count))
}

fn frame_files(dir: &Path) -> MediaResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(MediaError::FileNotFound(dir.to_path_buf()));
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("png"))
        .collect();
    files.sort();
    Ok(files)
}
