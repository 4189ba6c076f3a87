use bytes::Bytes;

/// One compressed image as handed out by the frame source.
///
/// The payload is an opaque JPEG blob; it is cheap to clone because the
/// bytes are reference counted, so copies for live streams and the
/// time-lapse never duplicate the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub data: Bytes,
    pub seq: u64,
    /// Capture time on the monotonic timebase, in milliseconds
    pub captured_ms: u64,
}

impl Frame {
    pub fn new(data: impl Into<Bytes>, seq: u64, captured_ms: u64) -> Self {
        Self {
            data: data.into(),
            seq,
            captured_ms,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}
