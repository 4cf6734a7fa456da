// Wire protocol for the vehicle link
//
// Outbound: one ASCII line per control tick,
//   "{throttle:.1},{rf:.1},{rr:.1},{lf:.1},{lr:.1};"
// Inbound: 26-byte frames, [0xFE, 0xFE] magic followed by a 24-byte payload
// of six big-endian i32. The first five are fixed-point (value * 100), the
// sixth is the vehicle error code.

use crate::config::{FRAME_HEADER, FRAME_LEN, FRAME_PAYLOAD_LEN};
use crate::messages::{TelemetryFrame, WheelCommand};

/// Decode errors for a single inbound frame. Never fatal to the link, a bad
/// frame is logged and skipped.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Payload length {0}, expected {FRAME_PAYLOAD_LEN}")]
    PayloadLength(usize),
}

/// Encode a wheel command as its ASCII wire form.
///
/// One decimal place per field, comma separated, `;` terminated. Field order
/// is throttle, RF, RR, LF, LR and is part of the vehicle contract.
pub fn encode_command(cmd: &WheelCommand) -> String {
    format!(
        "{:.1},{:.1},{:.1},{:.1},{:.1};",
        cmd.throttle, cmd.right_front, cmd.right_rear, cmd.left_front, cmd.left_rear
    )
}

/// Decode one 24-byte payload (magic already stripped).
pub fn decode_payload(payload: &[u8]) -> Result<TelemetryFrame, DecodeError> {
    if payload.len() != FRAME_PAYLOAD_LEN {
        return Err(DecodeError::PayloadLength(payload.len()));
    }

    let mut raw = [0i32; 6];
    for (i, chunk) in payload.chunks_exact(4).enumerate() {
        raw[i] = i32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }

    let mut values = [0.0f64; 5];
    for (v, &r) in values.iter_mut().zip(&raw[..5]) {
        *v = f64::from(r) / 100.0;
    }

    Ok(TelemetryFrame {
        values,
        error_code: raw[5],
    })
}

/// Streaming frame decoder with header-search resynchronization.
///
/// Bytes are accumulated across reads; garbage before a magic header is
/// discarded, and a lone trailing 0xFE is retained in case it is the first
/// half of a header split across two reads.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered bytes awaiting more data.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Feed received bytes, returning every frame that completed.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<TelemetryFrame, DecodeError>> {
        self.buf.extend_from_slice(bytes);

        let mut frames = Vec::new();
        loop {
            match self.find_header() {
                Some(start) => {
                    // Resync: drop anything before the magic
                    if start > 0 {
                        self.buf.drain(..start);
                    }
                    if self.buf.len() < FRAME_LEN {
                        break;
                    }
                    frames.push(decode_payload(&self.buf[FRAME_HEADER.len()..FRAME_LEN]));
                    self.buf.drain(..FRAME_LEN);
                }
                None => {
                    // No header anywhere. Keep a trailing 0xFE, it may be a
                    // header split across reads; everything else is garbage.
                    if self.buf.last() == Some(&FRAME_HEADER[0]) {
                        let last = self.buf.len() - 1;
                        self.buf.drain(..last);
                    } else {
                        self.buf.clear();
                    }
                    break;
                }
            }
        }
        frames
    }

    fn find_header(&self) -> Option<usize> {
        self.buf.windows(2).position(|w| w == FRAME_HEADER)
    }
}
