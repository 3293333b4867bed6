use blufi::frame::{
    ControlSubtype, DataSubtype, Direction, Frame, FrameControl, FrameError, FrameKind,
};
use blufi::crypto;

/// Single-frame ack from the device, no checksum, no encryption.
///
/// 00 04 07 01 06
///
/// Field | type+subtype | frame_control | seq | data_length | data |
/// Value | Control/Ack  | direction=1   | 7   | 1           | 06   |
#[test]
fn ack_frame_decodes_and_reencodes_byte_exact() {
    let bytes = [0x00, 0x04, 0x07, 0x01, 0x06];

    let frame = Frame::decode(&bytes).expect("ack frame did not parse");
    assert_eq!(frame.kind, FrameKind::Control(ControlSubtype::Ack));
    assert_eq!(frame.frame_control.direction(), Direction::ToApp);
    assert!(!frame.frame_control.encrypted());
    assert!(!frame.frame_control.checksummed());
    assert!(!frame.frame_control.fragmented());
    assert_eq!(frame.sequence_number, 7);
    assert_eq!(frame.data_length, 1);
    assert_eq!(frame.total_content_length, 0);
    assert_eq!(frame.data, [0x06]);

    assert_eq!(frame.encode().unwrap(), bytes);
}

/// A checksummed SSID frame: the trailing CRC is little-endian and runs
/// over (sequence, payload length, payload).
#[test]
fn checksummed_frame_roundtrip() {
    let check_sum = crypto::frame_checksum(0x05, b"HELLO");
    let mut bytes = vec![0x09, 0x02, 0x05, 0x05];
    bytes.extend_from_slice(b"HELLO");
    bytes.extend_from_slice(&check_sum.to_le_bytes());

    let frame = Frame::decode(&bytes).expect("ssid frame did not parse");
    assert_eq!(frame.kind, FrameKind::Data(DataSubtype::Ssid));
    assert!(frame.frame_control.checksummed());
    assert_eq!(frame.data, b"HELLO");
    assert_eq!(frame.check_sum, check_sum);

    assert_eq!(frame.encode().unwrap(), bytes);
}

/// A fragmented frame carries a little-endian total-content-length between
/// the header and the payload, counted inside data_length.
#[test]
fn fragmented_frame_layout() {
    let frame = Frame {
        kind: FrameKind::Data(DataSubtype::CustomData),
        frame_control: FrameControl::new().with_fragmented(true),
        sequence_number: 3,
        data_length: 4,
        total_content_length: 0x0102,
        data: vec![0xAA, 0xBB],
        check_sum: 0,
    };

    let bytes = frame.encode().unwrap();
    assert_eq!(bytes, [0x4D, 0x10, 0x03, 0x04, 0x02, 0x01, 0xAA, 0xBB]);
    assert_eq!(Frame::decode(&bytes).unwrap(), frame);
}

#[test]
fn header_shorter_than_four_bytes_is_rejected() {
    assert_eq!(
        Frame::decode(&[0x00, 0x04, 0x07]),
        Err(FrameError::SmallerThanMinSize { have: 3, need: 4 })
    );
}

#[test]
fn truncated_payload_is_rejected() {
    // data_length says 4 but only 2 bytes follow.
    assert_eq!(
        Frame::decode(&[0x00, 0x04, 0x07, 0x04, 0x06, 0x07]),
        Err(FrameError::SmallerThanMinSize { have: 6, need: 8 })
    );
}

#[test]
fn leftover_bytes_are_rejected() {
    assert_eq!(
        Frame::decode(&[0x00, 0x04, 0x07, 0x01, 0x06, 0xFF]),
        Err(FrameError::TrailingBytes { extra: 1 })
    );
}

#[test]
fn reserved_flag_bits_are_rejected() {
    assert_eq!(
        Frame::decode(&[0x00, 0x24, 0x07, 0x01, 0x06]),
        Err(FrameError::ReservedFlagBits { frame_control: 0x24 })
    );
}

#[test]
fn unknown_subtypes_are_rejected() {
    // Control subtype 0x0A is past the defined set.
    let control = 0x0A << 2;
    assert!(matches!(
        Frame::decode(&[control, 0x00, 0x00, 0x00]),
        Err(FrameError::Subtype(_))
    ));

    // Data subtype 0x1F likewise.
    let data = 0x01 | (0x1F << 2);
    assert!(matches!(
        Frame::decode(&[data, 0x00, 0x00, 0x00]),
        Err(FrameError::Subtype(_))
    ));
}

#[test]
fn fragment_flag_requires_nonzero_total() {
    let frame = Frame {
        kind: FrameKind::Data(DataSubtype::CustomData),
        frame_control: FrameControl::new().with_fragmented(true),
        sequence_number: 0,
        data_length: 4,
        total_content_length: 0,
        data: vec![0xAA, 0xBB],
        check_sum: 0,
    };
    assert_eq!(frame.encode(), Err(FrameError::MissingTotalContentLength));
}

#[test]
fn total_without_fragment_flag_is_rejected() {
    let frame = Frame {
        kind: FrameKind::Data(DataSubtype::CustomData),
        frame_control: FrameControl::new(),
        sequence_number: 0,
        data_length: 2,
        total_content_length: 9,
        data: vec![0xAA, 0xBB],
        check_sum: 0,
    };
    assert_eq!(
        frame.encode(),
        Err(FrameError::UnexpectedTotalContentLength {
            total_content_length: 9
        })
    );
}

#[test]
fn data_length_must_match_payload() {
    let frame = Frame {
        kind: FrameKind::Control(ControlSubtype::Ack),
        frame_control: FrameControl::new(),
        sequence_number: 0,
        data_length: 2,
        total_content_length: 0,
        data: vec![0x06],
        check_sum: 0,
    };
    assert_eq!(
        frame.encode(),
        Err(FrameError::DataLengthMismatch {
            declared: 2,
            actual: 1
        })
    );
}

/// Round-trip across the flag/field combinations.
#[test]
fn codec_roundtrip() {
    let cases = [
        (FrameKind::Control(ControlSubtype::GetWifiList), vec![]),
        (FrameKind::Data(DataSubtype::Password), b"hunter2".to_vec()),
        (
            FrameKind::Data(DataSubtype::CustomData),
            (0u8..64).collect::<Vec<u8>>(),
        ),
    ];

    for (kind, data) in cases {
        for checksummed in [false, true] {
            let frame_control = FrameControl::new()
                .with_checksummed(checksummed)
                .with_direction(Direction::ToDevice)
                .with_ack_requested(true);
            let frame = Frame {
                kind,
                frame_control,
                sequence_number: 42,
                data_length: data.len() as u8,
                total_content_length: 0,
                check_sum: if checksummed {
                    crypto::frame_checksum(42, &data)
                } else {
                    0
                },
                data: data.clone(),
            };
            let bytes = frame.encode().unwrap();
            assert_eq!(Frame::decode(&bytes).unwrap(), frame);
        }
    }
}
