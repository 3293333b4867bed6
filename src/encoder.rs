//! Splitting an outbound payload into MTU-sized frames.

use alloc::vec::Vec;

use crate::crypto;
use crate::frame::{Frame, FrameControl, FrameKind};

// Header bytes plus room for the optional checksum; what every frame
// spends before payload.
const FRAME_MIN_SIZE: i16 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// The MTU leaves no room for a fragment's payload.
    MtuTooSmall { mtu: u8 },
    /// The payload exceeds what a total-content-length field can declare.
    PayloadTooLarge { len: usize },
}

/// Split `data` into a run of frames fitting `mtu`.
///
/// Non-terminal frames carry the fragment flag, `capacity - 2` payload
/// bytes (two reserved for the total-content-length prefix) and declare the
/// content bytes remaining from themselves onward; the terminal frame
/// carries the rest. Sequence numbers count up from
/// `starting_sequence_number`, one per frame. The caller's flags are masked
/// to {encrypted, checksummed, direction, ack}; the fragment flag is
/// computed here and cannot be supplied. A checksummed frame digests its
/// own `(sequence, payload)` tuple. An empty payload still produces one
/// (empty) terminal frame.
pub fn fragment(
    kind: FrameKind,
    frame_control: FrameControl,
    starting_sequence_number: u8,
    data: &[u8],
    mtu: u8,
) -> Result<Vec<Frame>, EncodeError> {
    let capacity = i16::from(mtu) - FRAME_MIN_SIZE;
    if capacity < FRAME_MIN_SIZE {
        return Err(EncodeError::MtuTooSmall { mtu });
    }
    let capacity = capacity as usize;

    if data.len() > usize::from(u16::MAX) {
        return Err(EncodeError::PayloadTooLarge { len: data.len() });
    }

    let frame_control = frame_control.masked();
    let mut frame_list = Vec::new();
    let mut sequence_number = starting_sequence_number;
    let mut rest = data;

    loop {
        let remaining = rest.len();
        let (fc, body, data_length, total_content_length) = if capacity < remaining {
            (
                frame_control.with_fragmented(true),
                &rest[..capacity - 2],
                capacity as u8,
                remaining as u16,
            )
        } else {
            (frame_control, rest, remaining as u8, 0)
        };

        let check_sum = if fc.checksummed() {
            crypto::frame_checksum(sequence_number, body)
        } else {
            0
        };

        frame_list.push(Frame {
            kind,
            frame_control: fc,
            sequence_number,
            data_length,
            total_content_length,
            data: body.to_vec(),
            check_sum,
        });

        sequence_number = sequence_number.wrapping_add(1);
        rest = &rest[body.len()..];
        if rest.is_empty() {
            break;
        }
    }

    Ok(frame_list)
}
