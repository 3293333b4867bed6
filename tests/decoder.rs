use blufi::crypto;
use blufi::decoder::{DecoderState, FragmentDecoder, MAX_MESSAGE_LEN};
use blufi::encoder::{self, EncodeError};
use blufi::frame::{ControlSubtype, DataSubtype, Frame, FrameControl, FrameKind};
use blufi::payload::{self, PayloadBody};

fn custom_data_frames(payload: &[u8], mtu: u8) -> Vec<Frame> {
    encoder::fragment(
        FrameKind::Data(DataSubtype::CustomData),
        FrameControl::new(),
        0,
        payload,
        mtu,
    )
    .unwrap()
}

/// Twelve payload bytes at the minimum MTU split into three frames: two
/// fragments of four content bytes each (data_length 6 = payload + the
/// two-byte remaining-length prefix) and a terminal frame with the rest.
#[test]
fn fragmentation_at_minimum_mtu() {
    let payload: [u8; 12] = [
        0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66,
    ];
    let frames = custom_data_frames(&payload, 12);
    assert_eq!(frames.len(), 3);

    assert!(frames[0].frame_control.fragmented());
    assert_eq!(frames[0].sequence_number, 0);
    assert_eq!(frames[0].data_length, 6);
    assert_eq!(frames[0].total_content_length, 12);
    assert_eq!(frames[0].data, payload[0..4]);

    assert!(frames[1].frame_control.fragmented());
    assert_eq!(frames[1].sequence_number, 1);
    assert_eq!(frames[1].data_length, 6);
    // Remaining-length chain: eight content bytes left from here.
    assert_eq!(frames[1].total_content_length, 8);
    assert_eq!(frames[1].data, payload[4..8]);

    assert!(!frames[2].frame_control.fragmented());
    assert_eq!(frames[2].sequence_number, 2);
    assert_eq!(frames[2].data_length, 4);
    assert_eq!(frames[2].total_content_length, 0);
    assert_eq!(frames[2].data, payload[8..12]);

    let mut decoder = FragmentDecoder::new();
    assert_eq!(decoder.update(frames[0].clone()), DecoderState::NeedMoreFrames);
    assert_eq!(decoder.update(frames[1].clone()), DecoderState::NeedMoreFrames);
    assert_eq!(decoder.update(frames[2].clone()), DecoderState::ReadyToDecode);

    let message = decoder.drain().expect("message did not complete");
    assert_eq!(message.content, payload);
    assert_eq!(decoder.state(), DecoderState::Empty);
}

/// Swapping two adjacent fragments on arrival still reassembles: the
/// decoder orders by sequence number, not arrival.
#[test]
fn out_of_order_fragments_reassemble() {
    let payload: Vec<u8> = (0..40).collect();
    let frames = custom_data_frames(&payload, 20);
    assert_eq!(frames.len(), 4);

    let mut decoder = FragmentDecoder::new();
    assert_eq!(decoder.update(frames[1].clone()), DecoderState::NeedMoreFrames);
    assert_eq!(decoder.update(frames[0].clone()), DecoderState::NeedMoreFrames);
    assert_eq!(decoder.update(frames[2].clone()), DecoderState::NeedMoreFrames);
    assert_eq!(decoder.update(frames[3].clone()), DecoderState::ReadyToDecode);
    assert_eq!(decoder.drain().unwrap().content, payload);
}

#[test]
fn mtu_below_minimum_is_rejected() {
    assert_eq!(
        encoder::fragment(
            FrameKind::Data(DataSubtype::CustomData),
            FrameControl::new(),
            0,
            &[0u8; 12],
            10,
        ),
        Err(EncodeError::MtuTooSmall { mtu: 10 })
    );
    assert!(custom_data_frames(&[0u8; 12], 12).len() > 1);
}

#[test]
fn empty_payload_emits_one_empty_frame() {
    let frames = custom_data_frames(&[], 125);
    assert_eq!(frames.len(), 1);
    assert!(!frames[0].frame_control.fragmented());
    assert_eq!(frames[0].data_length, 0);
    assert!(frames[0].data.is_empty());

    let mut decoder = FragmentDecoder::new();
    assert_eq!(decoder.update(frames[0].clone()), DecoderState::ReadyToDecode);
    assert!(decoder.drain().unwrap().content.is_empty());
}

/// The encoder checksums each frame over its own (sequence, payload) and
/// the decoder verifies it; flipping any payload byte trips it.
#[test]
fn checksum_tamper_is_detected() {
    let payload: Vec<u8> = (0..30).collect();
    let frames = encoder::fragment(
        FrameKind::Data(DataSubtype::Ssid),
        FrameControl::new().with_checksummed(true),
        0,
        &payload,
        20,
    )
    .unwrap();

    // Untampered frames pass.
    let mut decoder = FragmentDecoder::new();
    for frame in &frames {
        let state = decoder.update(frame.clone());
        assert_ne!(state, DecoderState::ChecksumMismatch);
    }
    assert_eq!(decoder.state(), DecoderState::ReadyToDecode);

    // Each byte of each frame, flipped, trips the check.
    for frame_index in 0..frames.len() {
        for byte_index in 0..frames[frame_index].data.len() {
            let mut tampered = frames[frame_index].clone();
            tampered.data[byte_index] ^= 0x01;
            let mut decoder = FragmentDecoder::new();
            assert_eq!(decoder.update(tampered), DecoderState::ChecksumMismatch);
        }
    }
}

/// A wire-level tamper: corrupt the encoded bytes, re-decode, feed.
#[test]
fn checksum_tamper_on_the_wire() {
    let check_sum = crypto::frame_checksum(0x05, b"HELLO");
    let mut bytes = vec![0x09, 0x02, 0x05, 0x05];
    bytes.extend_from_slice(b"HELLO");
    bytes.extend_from_slice(&check_sum.to_le_bytes());

    for i in 4..9 {
        let mut tampered = bytes.clone();
        tampered[i] ^= 0x40;
        let frame = Frame::decode(&tampered).unwrap();
        let mut decoder = FragmentDecoder::new();
        assert_eq!(decoder.update(frame), DecoderState::ChecksumMismatch);
    }

    let mut decoder = FragmentDecoder::new();
    assert_eq!(
        decoder.update(Frame::decode(&bytes).unwrap()),
        DecoderState::ReadyToDecode
    );
    let message = decoder.drain().unwrap();
    let decoded = payload::decode(&message).unwrap().unwrap();
    assert_eq!(decoded.body, PayloadBody::Ssid("HELLO".into()));
}

#[test]
fn skipped_sequence_number_is_terminal() {
    let payload: Vec<u8> = (0..40).collect();
    let frames = custom_data_frames(&payload, 20);

    let mut decoder = FragmentDecoder::new();
    assert_eq!(decoder.update(frames[0].clone()), DecoderState::NeedMoreFrames);
    assert_eq!(decoder.update(frames[2].clone()), DecoderState::SequenceSkipped);
    // Terminal: the state sticks.
    assert_eq!(decoder.state(), DecoderState::SequenceSkipped);
    assert!(decoder.drain().is_none());
}

#[test]
fn replayed_frame_is_a_sequence_violation() {
    let payload: Vec<u8> = (0..40).collect();
    let frames = custom_data_frames(&payload, 20);

    let mut decoder = FragmentDecoder::new();
    decoder.update(frames[0].clone());
    assert_eq!(decoder.update(frames[0].clone()), DecoderState::SequenceSkipped);
}

#[test]
fn direction_flip_mid_message_is_terminal() {
    let payload: Vec<u8> = (0..40).collect();
    let frames = custom_data_frames(&payload, 20);

    let mut flipped = frames[1].clone();
    flipped.frame_control = flipped
        .frame_control
        .with_direction(blufi::frame::Direction::ToApp);

    let mut decoder = FragmentDecoder::new();
    decoder.update(frames[0].clone());
    assert_eq!(decoder.update(flipped), DecoderState::DirectionMismatch);
}

#[test]
fn type_and_subtype_changes_mid_message_are_terminal() {
    let payload: Vec<u8> = (0..40).collect();
    let frames = custom_data_frames(&payload, 20);

    let mut other_type = frames[1].clone();
    other_type.kind = FrameKind::Control(ControlSubtype::Ack);

    let mut other_subtype = frames[1].clone();
    other_subtype.kind = FrameKind::Data(DataSubtype::Ssid);

    let mut decoder = FragmentDecoder::new();
    decoder.update(frames[0].clone());
    assert_eq!(decoder.update(other_type), DecoderState::TypeMismatch);

    let mut decoder = FragmentDecoder::new();
    decoder.update(frames[0].clone());
    assert_eq!(decoder.update(other_subtype), DecoderState::SubtypeMismatch);
}

#[test]
fn inconsistent_remaining_length_is_terminal() {
    let payload: Vec<u8> = (0..40).collect();
    let mut frames = custom_data_frames(&payload, 20);
    // Claim a larger remainder on the second fragment than the chain allows.
    frames[1].total_content_length += 4;

    let mut decoder = FragmentDecoder::new();
    for frame in frames {
        if decoder.update(frame) == DecoderState::InvalidContentLength {
            return;
        }
    }
    panic!("content-length mismatch went undetected");
}

#[test]
fn short_terminal_frame_is_an_invalid_content_length() {
    let payload: Vec<u8> = (0..40).collect();
    let mut frames = custom_data_frames(&payload, 20);
    let tail = frames.last_mut().unwrap();
    tail.data.pop();
    tail.data_length -= 1;

    let mut decoder = FragmentDecoder::new();
    for frame in frames {
        if decoder.update(frame) == DecoderState::InvalidContentLength {
            return;
        }
    }
    panic!("short terminal frame went undetected");
}

#[test]
fn declared_total_above_ceiling_is_rejected() {
    let payload: Vec<u8> = (0..40).collect();
    let mut frames = custom_data_frames(&payload, 20);
    frames[0].total_content_length = (MAX_MESSAGE_LEN + 1) as u16;

    let mut decoder = FragmentDecoder::new();
    assert_eq!(
        decoder.update(frames[0].clone()),
        DecoderState::InvalidContentLength
    );
}

/// The reassembled message keeps the head frame's flags minus the fragment
/// bit, and payload decoding sees the concatenated content.
#[test]
fn drained_message_feeds_the_payload_codec() {
    let frames = encoder::fragment(
        FrameKind::Control(ControlSubtype::SetWifiOpMode),
        FrameControl::new().with_ack_requested(true),
        9,
        &[0x01],
        125,
    )
    .unwrap();

    let mut decoder = FragmentDecoder::new();
    assert_eq!(decoder.update(frames[0].clone()), DecoderState::ReadyToDecode);
    let message = decoder.drain().unwrap();
    assert!(message.frame_control.ack_requested());
    assert!(!message.frame_control.fragmented());

    let decoded = payload::decode(&message).unwrap().unwrap();
    assert_eq!(
        decoded.body,
        PayloadBody::WifiOpMode(blufi::payload::WifiOpMode::Sta)
    );
}
