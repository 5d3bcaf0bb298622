// Keyhost Engine — Length-Prefixed Framing
//
//   frame = u32 little-endian length || `length` bytes of UTF-8 JSON
//
// The decoder accumulates whatever the stream hands it and yields complete
// payloads. A declared length above MAX_FRAME_LEN is fatal: there is no way
// to find the next frame boundary after it.

use crate::atoms::constants::{FRAME_HEADER_LEN, MAX_FRAME_LEN};
use crate::atoms::error::{EngineError, EngineResult};

/// Prefix `payload` with its length.
pub fn encode_frame(payload: &[u8]) -> EngineResult<Vec<u8>> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(EngineError::WriteError(format!(
            "frame of {} bytes exceeds the {} byte limit",
            payload.len(),
            MAX_FRAME_LEN
        )));
    }
    let len = u32::try_from(payload.len())
        .map_err(|_| EngineError::WriteError("frame length does not fit in u32".into()))?;
    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete payload, `Ok(None)` if more bytes are needed.
    pub fn next_frame(&mut self) -> EngineResult<Option<Vec<u8>>> {
        if self.buf.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }
        let mut header = [0u8; FRAME_HEADER_LEN];
        header.copy_from_slice(&self.buf[..FRAME_HEADER_LEN]);
        let len = u32::from_le_bytes(header) as usize;
        if len > MAX_FRAME_LEN {
            return Err(EngineError::InvalidInput(format!(
                "declared frame length {} exceeds the {} byte limit",
                len, MAX_FRAME_LEN
            )));
        }
        if self.buf.len() < FRAME_HEADER_LEN + len {
            return Ok(None);
        }
        let payload = self.buf[FRAME_HEADER_LEN..FRAME_HEADER_LEN + len].to_vec();
        self.buf.drain(..FRAME_HEADER_LEN + len);
        Ok(Some(payload))
    }

    /// Bytes received but not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}
