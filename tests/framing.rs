//! Wire framing properties over the public API

use aria_gateway::audio::AudioFormat;
use aria_gateway::wyoming::{decode, encode, DecodeOutcome, Event, Frame};

fn sample_events() -> Vec<Event> {
    vec![
        Event::Describe,
        Event::Synthesize(aria_gateway::wyoming::event::Synthesize {
            text: "Hello world.".to_string(),
            voice: None,
        }),
        Event::AudioStart(AudioFormat { rate: 22050, width: 2, channels: 1 }),
        Event::AudioChunk {
            format: AudioFormat { rate: 22050, width: 2, channels: 1 },
            pcm: (0..=255).collect(),
        },
        Event::AudioStop,
        Event::SynthesizeStopped,
        Event::Transcript(aria_gateway::wyoming::event::Transcript {
            text: "hi".to_string(),
            language: Some("en-US".to_string()),
        }),
    ]
}

#[test]
fn round_trip_all_event_shapes() {
    for event in sample_events() {
        let frame = event.to_frame().unwrap();
        let wire = encode(&frame);

        let DecodeOutcome::Frame(decoded, consumed) = decode(&wire).unwrap() else {
            panic!("expected complete frame for {}", event.tag());
        };
        assert_eq!(consumed, wire.len(), "consumed everything for {}", event.tag());
        assert_eq!(decoded, frame);
        assert_eq!(Event::from_frame(&decoded).unwrap(), event);
    }
}

#[test]
fn incremental_decode_needs_every_byte() {
    let event = Event::AudioChunk {
        format: AudioFormat { rate: 16000, width: 2, channels: 1 },
        pcm: vec![9; 300],
    };
    let wire = encode(&event.to_frame().unwrap());

    for end in 0..wire.len() {
        assert_eq!(decode(&wire[..end]).unwrap(), DecodeOutcome::NeedMore);
    }
    let DecodeOutcome::Frame(frame, consumed) = decode(&wire).unwrap() else {
        panic!("expected frame at full length");
    };
    assert_eq!(consumed, wire.len());
    assert_eq!(Event::from_frame(&frame).unwrap(), event);
}

#[test]
fn back_to_back_frames_decode_in_order() {
    let mut wire = Vec::new();
    let events = sample_events();
    for event in &events {
        wire.extend_from_slice(&encode(&event.to_frame().unwrap()));
    }

    let mut offset = 0;
    let mut decoded = Vec::new();
    while offset < wire.len() {
        let DecodeOutcome::Frame(frame, consumed) = decode(&wire[offset..]).unwrap() else {
            panic!("incomplete frame at offset {offset}");
        };
        decoded.push(Event::from_frame(&frame).unwrap());
        offset += consumed;
    }
    assert_eq!(decoded, events);
}

#[test]
fn frame_with_data_and_payload_sizes_advertised() {
    let frame = Frame {
        frame_type: "audio-chunk".to_string(),
        data: br#"{"rate":16000,"width":2,"channels":1}"#.to_vec(),
        payload: vec![1, 2, 3],
    };
    let wire = encode(&frame);
    let header_end = wire.iter().position(|&b| b == b'\n').unwrap();
    let header: serde_json::Value = serde_json::from_slice(&wire[..header_end]).unwrap();

    assert_eq!(header["data_length"], frame.data.len());
    assert_eq!(header["payload_length"], frame.payload.len());
}
