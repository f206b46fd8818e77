//! Still previews for video uploads.

use std::{io::Cursor, path::PathBuf};

use image::{DynamicImage, ImageFormat, codecs::jpeg::JpegEncoder};
use tokio::process::Command;
use tracing::{debug, warn};

use super::Error;
use crate::{
    job::{storage::object, uploader},
    record::{RawFile, UserId},
};

const JPEG_QUALITY: u8 = 85;

pub trait FrameDecoder {
    /// Decode the first renderable frame of a video file.
    fn first_frame(&self, file: &RawFile) -> impl Future<Output = Result<DynamicImage, Error>>;
}

/// Extracts frames by running `ffmpeg` as a child process.
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    program: PathBuf,
}

impl FfmpegDecoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FrameDecoder for FfmpegDecoder {
    async fn first_frame(&self, file: &RawFile) -> Result<DynamicImage, Error> {
        let suffix = std::path::Path::new(&file.name)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let input = tempfile::Builder::new()
            .suffix(&suffix)
            .tempfile()
            .map_err(Error::Io)?;
        tokio::fs::write(input.path(), &file.body)
            .await
            .map_err(Error::Io)?;
        let output = Command::new(&self.program)
            .args(["-v", "error", "-i"])
            .arg(input.path())
            .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "-"])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(Error::Io)?;
        if !output.status.success() {
            return Err(Error::Ffmpeg {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        tokio::task::spawn_blocking(move || {
            image::load_from_memory_with_format(&output.stdout, ImageFormat::Png)
        })
        .await
        .map_err(Error::Join)?
        .map_err(Error::Image)
    }
}

async fn encode_jpeg(frame: DynamicImage) -> Result<Vec<u8>, Error> {
    tokio::task::spawn_blocking(move || {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(frame.to_rgb8())
            .write_with_encoder(JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY))
            .map(|_| out.into_inner())
    })
    .await
    .map_err(Error::Join)?
    .map_err(Error::Image)
}

async fn render<D: FrameDecoder, S: object::Client>(
    decoder: &D,
    store: &S,
    user: UserId,
    file: &RawFile,
) -> Result<String, Error> {
    let frame = decoder.first_frame(file).await?;
    let jpeg = encode_jpeg(frame).await?;
    let path = uploader::preview_path(user, &file.name);
    uploader::store(store, &path, mime::IMAGE_JPEG.as_ref(), jpeg.into())
        .await
        .map_err(|error| Error::Upload(Box::new(error)))?;
    Ok(path)
}

/// Render and store a preview frame, returning its storage path. Non-video files
/// and every decode, encode or upload failure yield `None`.
pub async fn render_preview<D: FrameDecoder, S: object::Client>(
    decoder: &D,
    store: &S,
    user: UserId,
    file: &RawFile,
) -> Option<String> {
    if !super::is_video(file) {
        return None;
    }
    render(decoder, store, user, file)
        .await
        .inspect(|path| debug!(name = %file.name, %path, "preview stored"))
        .inspect_err(|error| warn!(%error, name = %file.name, "failed to render preview"))
        .ok()
}
