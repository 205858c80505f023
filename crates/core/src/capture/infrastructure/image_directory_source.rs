use std::io::Cursor;
use std::path::{Path, PathBuf};

use chrono::Utc;
use image::codecs::jpeg::JpegEncoder;

use crate::capture::domain::frame_source::{CaptureError, FrameSource};
use crate::shared::constants::{IMAGE_EXTENSIONS, JPEG_QUALITY};
use crate::shared::frame::EncodedFrame;

/// Plays back still images as a camera feed.
///
/// `path` may be a directory (its images are served in name order, wrapping
/// around) or a single image file. Every frame is re-encoded as JPEG.
pub struct ImageDirectorySource {
    path: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
    served: usize,
    open: bool,
}

impl ImageDirectorySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            files: Vec::new(),
            next: 0,
            served: 0,
            open: false,
        }
    }

    fn list_images(path: &Path) -> Result<Vec<PathBuf>, CaptureError> {
        if path.is_file() {
            return Ok(vec![path.to_path_buf()]);
        }
        let entries = std::fs::read_dir(path).map_err(|source| CaptureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && has_image_extension(p))
            .collect();
        files.sort();
        Ok(files)
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn encode_jpeg(path: &Path) -> Result<(Vec<u8>, u32, u32), CaptureError> {
    let img = image::open(path).map_err(|e| CaptureError::Decode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let rgb = img.to_rgb8();
    let mut buf = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
    rgb.write_with_encoder(encoder)
        .map_err(|e| CaptureError::Encode(e.to_string()))?;
    Ok((buf.into_inner(), rgb.width(), rgb.height()))
}

impl FrameSource for ImageDirectorySource {
    fn open(&mut self) -> Result<(), CaptureError> {
        let files = Self::list_images(&self.path)?;
        if files.is_empty() {
            return Err(CaptureError::NoFrames(self.path.clone()));
        }
        log::info!("Opened {} image(s) from {}", files.len(), self.path.display());
        self.files = files;
        self.next = 0;
        self.open = true;
        Ok(())
    }

    fn capture(&mut self) -> Result<EncodedFrame, CaptureError> {
        if !self.open {
            return Err(CaptureError::NotOpen);
        }
        let path = &self.files[self.next % self.files.len()];
        let (data, width, height) = encode_jpeg(path)?;
        self.next = (self.next + 1) % self.files.len();
        let frame = EncodedFrame::new(data, width, height, self.served, Utc::now());
        self.served += 1;
        Ok(frame)
    }

    fn close(&mut self) {
        if self.open {
            log::debug!("Closed capture source {}", self.path.display());
        }
        self.open = false;
        self.files.clear();
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_image(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([50, 100, 200]));
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn test_capture_before_open_fails() {
        let mut source = ImageDirectorySource::new("/nonexistent");
        assert!(matches!(source.capture(), Err(CaptureError::NotOpen)));
    }

    #[test]
    fn test_frames_are_jpeg_and_cycle() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "a.png", 40, 30);
        write_image(dir.path(), "b.png", 20, 10);
        std::fs::write(dir.path().join("notes.txt"), "skip me").unwrap();
        let mut source = ImageDirectorySource::new(dir.path());
        source.open().unwrap();

        let first = source.capture().unwrap();
        let second = source.capture().unwrap();
        let third = source.capture().unwrap();

        assert_eq!(&first.data()[..2], &[0xFF, 0xD8]);
        assert_eq!((first.width(), first.height()), (40, 30));
        assert_eq!((second.width(), second.height()), (20, 10));
        assert_eq!((third.width(), third.height()), (40, 30));
        assert_eq!(third.index(), 2);
    }

    #[test]
    fn test_single_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_image(dir.path(), "probe.png", 16, 16);
        let mut source = ImageDirectorySource::new(path);

        source.open().unwrap();

        assert_eq!(source.capture().unwrap().width(), 16);
    }

    #[test]
    fn test_empty_directory_has_no_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = ImageDirectorySource::new(dir.path());
        assert!(matches!(source.open(), Err(CaptureError::NoFrames(_))));
        assert!(!source.is_open());
    }

    #[test]
    fn test_close_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "a.png", 8, 8);
        let mut source = ImageDirectorySource::new(dir.path());
        source.open().unwrap();

        source.close();
        source.close();

        assert!(!source.is_open());
        assert!(source.capture().is_err());
    }
}
