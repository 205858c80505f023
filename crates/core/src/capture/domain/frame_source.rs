use std::path::PathBuf;

use thiserror::Error;

use crate::shared::frame::EncodedFrame;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("capture source is not open")]
    NotOpen,
    #[error("no image files found in {0}")]
    NoFrames(PathBuf),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {message}")]
    Decode { path: PathBuf, message: String },
    #[error("failed to encode frame: {0}")]
    Encode(String),
}

/// A camera-like source of encoded frames.
///
/// `close` releases the underlying resource and may be called any number of
/// times.
pub trait FrameSource: Send {
    fn open(&mut self) -> Result<(), CaptureError>;

    fn capture(&mut self) -> Result<EncodedFrame, CaptureError>;

    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Grabs a single frame, opening and closing the source around it unless
    /// it was already open.
    fn capture_once(&mut self) -> Result<EncodedFrame, CaptureError> {
        let opened_here = !self.is_open();
        if opened_here {
            self.open()?;
        }
        let frame = self.capture();
        if opened_here {
            self.close();
        }
        frame
    }
}
