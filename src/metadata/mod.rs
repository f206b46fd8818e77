//! Metadata derived from a raw file before it is registered.

use std::io::Cursor;

use exif::{In, Tag};
use tracing::trace;

use crate::record::{GeoData, RawFile};

pub mod preview;

pub use preview::{FfmpegDecoder, FrameDecoder, render_preview};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read EXIF: {0}")]
    Exif(exif::Error),
    #[error("I/O error: {0}")]
    Io(std::io::Error),
    #[error("ffmpeg exited with {status}: {stderr}")]
    Ffmpeg {
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("failed to process frame: {0}")]
    Image(image::ImageError),
    #[error("blocking task failed: {0}")]
    Join(tokio::task::JoinError),
    #[error("failed to store preview: {0}")]
    Upload(crate::BoxError),
}

pub fn is_video(file: &RawFile) -> bool {
    file.content_type.type_() == mime::VIDEO
}

/// Location embedded in the file's EXIF block. Anything short of a complete,
/// finite coordinate pair is treated as absent.
pub fn extract_geo_data(file: &RawFile) -> Option<GeoData> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(&file.body[..]))
        .map_err(Error::Exif)
        .inspect_err(|error| trace!(%error, name = %file.name, "no EXIF block"))
        .ok()?;
    let latitude = coordinate(&exif, Tag::GPSLatitude, Tag::GPSLatitudeRef)?;
    let longitude = coordinate(&exif, Tag::GPSLongitude, Tag::GPSLongitudeRef)?;
    Some(GeoData {
        latitude,
        longitude,
    })
}

fn coordinate(exif: &exif::Exif, value: Tag, reference: Tag) -> Option<f64> {
    let exif::Value::Rational(parts) = &exif.get_field(value, In::PRIMARY)?.value else {
        return None;
    };
    let parts = parts.iter().map(|part| part.to_f64()).collect::<Vec<_>>();
    let reference = exif
        .get_field(reference, In::PRIMARY)
        .and_then(|field| ascii(&field.value));
    dms_to_degrees(&parts, reference.as_deref())
}

fn ascii(value: &exif::Value) -> Option<String> {
    match value {
        exif::Value::Ascii(values) => values
            .first()
            .and_then(|raw| std::str::from_utf8(raw).ok())
            .map(|s| s.trim_matches('\0').trim().to_owned())
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}

fn dms_to_degrees(parts: &[f64], reference: Option<&str>) -> Option<f64> {
    let [degrees, minutes, seconds] = parts.get(..3)? else {
        return None;
    };
    let value = degrees + minutes / 60.0 + seconds / 3600.0;
    let value = match reference {
        Some(r) if r.starts_with(['S', 's', 'W', 'w']) => -value,
        _ => value,
    };
    value.is_finite().then_some(value)
}
