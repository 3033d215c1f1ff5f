//! Length-prefixed JSON frames.
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────────────────────┐
//! │ length: u32 (BE)     │ UTF-8 JSON {"name": "...", "args": {..}} │
//! └──────────────────────┴──────────────────────────────────────────┘
//! ```

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::broker::FunctionCall;

const LENGTH_PREFIX: usize = 4;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },

    #[error("frame is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("could not serialise function call: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialise `call` into one complete frame.
pub fn encode_frame(call: &FunctionCall) -> Result<Vec<u8>, FrameError> {
    let payload = serde_json::to_vec(call)?;
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::TooLarge {
        len: payload.len(),
        max: u32::MAX as usize,
    })?;

    let mut frame = Vec::with_capacity(LENGTH_PREFIX + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Write `call` as a single frame.  Prefix and payload go out in one write
/// so a peer never sees a prefix without its body.
pub fn write_frame<W: Write>(writer: &mut W, call: &FunctionCall) -> Result<(), FrameError> {
    writer.write_all(&encode_frame(call)?)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame's payload as text.
///
/// Returns `Ok(None)` on a clean end of stream at a frame boundary.  A
/// stream that ends mid-frame is an `UnexpectedEof` I/O error.
pub fn read_frame<R: Read>(reader: &mut R, max_len: usize) -> Result<Option<String>, FrameError> {
    let mut prefix = [0u8; LENGTH_PREFIX];
    let mut filled = 0;
    while filled < LENGTH_PREFIX {
        match reader.read(&mut prefix[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len > max_len {
        return Err(FrameError::TooLarge { len, max: max_len });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(Some(String::from_utf8(payload)?))
}
