use anyhow::Result;

/// One rendered frame: row-major RGB8, top row first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Frame {
    pub const BYTES_PER_PIXEL: usize = 3;

    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = Self::byte_len(width, height);
        if pixels.len() != expected {
            anyhow::bail!(
                "Frame buffer is {} bytes, expected {} for {}x{} RGB",
                pixels.len(),
                expected,
                width,
                height
            );
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * Self::BYTES_PER_PIXEL
    }
}

/// Append-only destination for rendered frames in presentation order.
pub trait FrameSink {
    fn append(&mut self, frame: Frame) -> Result<()>;

    /// Frames accepted so far.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Keeps every frame in memory until the capture ends.
#[derive(Debug, Default)]
pub struct MemoryFrameSink {
    frames: Vec<Frame>,
}

impl MemoryFrameSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }
}

impl FrameSink for MemoryFrameSink {
    fn append(&mut self, frame: Frame) -> Result<()> {
        self.frames.push(frame);
        Ok(())
    }

    fn len(&self) -> usize {
        self.frames.len()
    }
}
