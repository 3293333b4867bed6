//! Reassembly of one logical message from its frames.
//!
//! Frames belonging to one message share type, subtype and direction; a
//! run of frames with the fragment flag set, closed by one frame without
//! it, carries the message content in sequence-number order. The decoder
//! accumulates frames, validates them as they arrive and reports its state
//! after each one. Error states are terminal for the aggregation attempt:
//! the buffered frames stay as they are and the owner is expected to tear
//! the session down.

use alloc::vec::Vec;

use crate::crypto;
use crate::frame::{Frame, FrameControl, FrameKind};

/// Largest content length a peer may declare for one message. The protocol
/// itself has no ceiling; this bounds what a misbehaving peer can make the
/// decoder buffer.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Decoder state after the most recent [`FragmentDecoder::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// No frames buffered.
    Empty,
    /// New frame's type differs from the buffered frames'.
    TypeMismatch,
    /// Same type, different subtype.
    SubtypeMismatch,
    /// Direction flag differs from the buffered frames'.
    DirectionMismatch,
    /// The frame's declared checksum does not match its content.
    ChecksumMismatch,
    /// Buffered sequence numbers do not form a contiguous run.
    SequenceSkipped,
    /// The declared total content length is inconsistent with the payload
    /// bytes on hand (or exceeds [`MAX_MESSAGE_LEN`]).
    InvalidContentLength,
    /// The highest-sequence frame still announces subsequent fragments.
    NeedMoreFrames,
    /// The message is complete; [`FragmentDecoder::drain`] will yield it.
    ReadyToDecode,
}

/// A fully reassembled message, ready for payload decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: FrameKind,
    /// Head frame's flags, masked to the four caller-visible bits.
    pub frame_control: FrameControl,
    pub content: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct FragmentDecoder {
    frame_list: Vec<Frame>,
    state: DecoderState,
}

impl Default for DecoderState {
    fn default() -> Self {
        DecoderState::Empty
    }
}

impl FragmentDecoder {
    pub fn new() -> Self {
        Self {
            frame_list: Vec::new(),
            state: DecoderState::Empty,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Feed one frame and report the resulting state.
    pub fn update(&mut self, frame: Frame) -> DecoderState {
        if let Some(head) = self.frame_list.first() {
            let head_kind = head.kind;
            let head_direction = head.frame_control.direction();
            if !head_kind.same_type(frame.kind) {
                return self.fail(DecoderState::TypeMismatch);
            }
            if head_kind != frame.kind {
                return self.fail(DecoderState::SubtypeMismatch);
            }
            if head_direction != frame.frame_control.direction() {
                return self.fail(DecoderState::DirectionMismatch);
            }
        }

        if frame.frame_control.checksummed() {
            let computed = crypto::frame_checksum(frame.sequence_number, &frame.data);
            if frame.check_sum != computed {
                return self.fail(DecoderState::ChecksumMismatch);
            }
        }

        if frame.frame_control.fragmented()
            && usize::from(frame.total_content_length) > MAX_MESSAGE_LEN
        {
            return self.fail(DecoderState::InvalidContentLength);
        }

        self.frame_list.push(frame);
        // Stable ascending sort on the raw 8-bit value; sequence wrap-around
        // inside one message is not a thing the protocol supports.
        self.frame_list.sort_by_key(|frame| frame.sequence_number);

        let mut expected = self.frame_list[0].sequence_number;
        for frame in &self.frame_list {
            if frame.sequence_number != expected {
                return self.fail(DecoderState::SequenceSkipped);
            }
            expected = expected.wrapping_add(1);
        }

        let tail = &self.frame_list[self.frame_list.len() - 1];
        if tail.frame_control.fragmented() {
            self.state = DecoderState::NeedMoreFrames;
            return self.state;
        }

        // Every fragment declares the content bytes remaining from itself
        // onward; the terminal frame must land the remainder exactly on
        // zero.
        let mut rest: i32 = 0;
        for frame in &self.frame_list {
            if frame.frame_control.fragmented() {
                if rest == 0 {
                    rest = i32::from(frame.total_content_length);
                }
                if rest != i32::from(frame.total_content_length) {
                    return self.fail(DecoderState::InvalidContentLength);
                }
                rest -= frame.data.len() as i32;
                if rest <= 0 {
                    return self.fail(DecoderState::InvalidContentLength);
                }
            } else {
                if rest > 0 {
                    rest -= frame.data.len() as i32;
                }
                if rest != 0 {
                    return self.fail(DecoderState::InvalidContentLength);
                }
            }
        }

        self.state = DecoderState::ReadyToDecode;
        self.state
    }

    /// Take the completed message out, clearing the buffer back to
    /// [`DecoderState::Empty`]. Yields nothing unless the state is
    /// [`DecoderState::ReadyToDecode`].
    pub fn drain(&mut self) -> Option<Message> {
        if self.state != DecoderState::ReadyToDecode {
            return None;
        }

        let head = &self.frame_list[0];
        let kind = head.kind;
        let frame_control = head.frame_control.masked();

        let total: usize = self.frame_list.iter().map(|frame| frame.data.len()).sum();
        let mut content = Vec::with_capacity(total);
        for frame in &self.frame_list {
            content.extend_from_slice(&frame.data);
        }

        self.frame_list.clear();
        self.state = DecoderState::Empty;

        Some(Message {
            kind,
            frame_control,
            content,
        })
    }

    fn fail(&mut self, state: DecoderState) -> DecoderState {
        self.state = state;
        self.state
    }
}
