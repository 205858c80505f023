use chrono::{DateTime, Utc};

/// One captured frame, already encoded for the detection service.
///
/// The pipeline never decodes pixels itself; the bytes are handed to the
/// external detector as-is.
#[derive(Clone, Debug)]
pub struct EncodedFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    index: usize,
    captured_at: DateTime<Utc>,
}

impl EncodedFrame {
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        index: usize,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            data,
            width,
            height,
            index,
            captured_at,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}
