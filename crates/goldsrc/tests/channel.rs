use std::net::SocketAddr;
use std::time::Instant;

use goldsrc::net::encoder::munge2;
use goldsrc::net::protocol::DEFAULT_PORT;
use goldsrc::{BitBuffer, Channel, ChannelConfig, Delivery};
use proptest::collection::vec;
use proptest::prelude::*;

fn addr(last: u8) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, last], DEFAULT_PORT))
}

fn sequence_of(data: &[u8]) -> u32 {
    u32::from_le_bytes([data[0], data[1], data[2], data[3]]) & 0x3FFF_FFFF
}

fn is_reliable(data: &[u8]) -> bool {
    data[3] & 0x80 != 0
}

#[test]
fn test_outgoing_sequence_increases_by_one() {
    let now = Instant::now();
    let mut channel = Channel::new(addr(1), ChannelConfig::default(), now);

    let sequences: Vec<u32> = (0..5)
        .map(|_| sequence_of(&channel.transmit(&[], now)))
        .collect();
    assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_unacknowledged_reliable_is_resent() {
    let now = Instant::now();
    let mut client = Channel::new(addr(1), ChannelConfig::default(), now);
    let mut server = Channel::new(addr(2), ChannelConfig::default(), now);

    client.push_reliable(vec![3, b'h', b'i', 0]);
    let first = client.transmit(&[], now);
    assert!(is_reliable(&first));

    // Lost on the way; the server's next datagram acks nothing new.
    let reply = server.transmit(&[], now);
    client.process(&reply, now).unwrap();

    let second = client.transmit(&[], now);
    assert!(!is_reliable(&second));

    server.process(&second, now).unwrap();
    let reply = server.transmit(&[], now);
    client.process(&reply, now).unwrap();

    let third = client.transmit(&[], now);
    assert!(is_reliable(&third));
    assert_eq!(client.pending_reliable(), 1);

    server.process(&third, now).unwrap();
    let reply = server.transmit(&[], now);
    client.process(&reply, now).unwrap();
    assert_eq!(client.pending_reliable(), 0);
}

/// Runs the two channels against each other until `sender` has nothing
/// left to deliver, collecting everything the receiver completed.
fn exchange(sender: &mut Channel, receiver: &mut Channel, now: Instant) -> Vec<Vec<u8>> {
    let mut completed = Vec::new();
    for _ in 0..256 {
        if sender.pending_fragments() == 0 && sender.pending_reliable() == 0 {
            break;
        }
        let data = sender.transmit(&[], now);
        if let Some(deliveries) = receiver.process(&data, now).unwrap() {
            let count = deliveries.len();
            for delivery in deliveries.into_iter().take(count - 1) {
                if let Delivery::Messages(buf) = delivery {
                    completed.push(buf.remaining_bytes().to_vec());
                }
            }
        }
        let reply = receiver.transmit(&[], now);
        sender.process(&reply, now).unwrap();
    }
    completed
}

fn flatten(messages: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = BitBuffer::new();
    for message in messages {
        buf.write_u32(message.len() as u32);
        buf.write_bytes(message);
    }
    buf.into_bytes()
}

#[test]
fn test_large_reliable_data_crosses_as_fragments() {
    let now = Instant::now();
    let config = ChannelConfig {
        fragment_size: 64,
        compress_fragments: false,
        ..ChannelConfig::default()
    };
    let mut client = Channel::new(addr(1), config, now);
    let mut server = Channel::new(addr(2), ChannelConfig::default(), now);

    let messages: Vec<Vec<u8>> = (0..10u8)
        .map(|i| {
            let mut message = vec![3];
            message.extend(format!("dlfile models/player{:02}.mdl", i).bytes());
            message.push(0);
            message
        })
        .collect();
    for message in &messages {
        client.push_reliable(message.clone());
    }

    let total = client.create_fragments().unwrap();
    assert!(total > 1);
    assert_eq!(client.pending_reliable(), 0);

    let completed = exchange(&mut client, &mut server, now);
    assert_eq!(completed, vec![flatten(&messages)]);
    assert_eq!(client.pending_fragments(), 0);
}

#[test]
fn test_compressed_fragments_are_inflated() {
    let now = Instant::now();
    let config = ChannelConfig {
        fragment_size: 32,
        compress_fragments: true,
        ..ChannelConfig::default()
    };
    let mut client = Channel::new(addr(1), config, now);
    let mut server = Channel::new(addr(2), ChannelConfig::default(), now);

    let mut message = vec![3];
    message.extend(std::iter::repeat_n(b'a', 600));
    message.push(0);
    client.push_reliable(message.clone());
    client.create_fragments().unwrap();

    let completed = exchange(&mut client, &mut server, now);
    assert_eq!(completed, vec![flatten(&[message])]);
}

const FRAGMENT_FLAG: u32 = 1 << 30;

/// One inbound fragment: total, 1-based ordinal, chunk.
type Piece<'a> = (usize, usize, &'a [u8]);

/// Builds a fragmented server datagram. The file chunk sits right after
/// the normal one in the data area.
fn fragment_datagram(
    sequence: u32,
    normal: Option<Piece<'_>>,
    file: Option<Piece<'_>>,
    tail: &[u8],
) -> Vec<u8> {
    let normal_len = normal.map_or(0, |(_, _, chunk)| chunk.len());

    let mut buf = BitBuffer::new();
    buf.write_u32(sequence | FRAGMENT_FLAG);
    buf.write_u32(0);
    for (piece, offset) in [(normal, 0), (file, normal_len)] {
        match piece {
            Some((total, ordinal, chunk)) => {
                buf.write_u8(1);
                buf.write_u16(total as u16);
                buf.write_u16(ordinal as u16);
                buf.write_u16(offset as u16);
                buf.write_u16(chunk.len() as u16);
            }
            None => buf.write_u8(0),
        }
    }
    for (_, _, chunk) in normal.iter().chain(file.iter()) {
        buf.write_bytes(chunk);
    }
    buf.write_bytes(tail);

    let mut data = buf.into_bytes();
    munge2(&mut data[8..], (sequence | FRAGMENT_FLAG) & 0xFF);
    data
}

fn file_record(name: &str, contents: &[u8]) -> Vec<u8> {
    let mut buf = BitBuffer::new();
    buf.write_string(name);
    buf.write_string("");
    buf.write_u32(contents.len() as u32);
    buf.write_bytes(contents);
    buf.into_bytes()
}

/// Message data, file contents, chunk size and a delivery order for each
/// stream's chunks.
fn transfers() -> impl Strategy<Value = (Vec<u8>, Vec<u8>, usize, Vec<usize>, Vec<usize>)> {
    (vec(any::<u8>(), 0..1024), vec(any::<u8>(), 0..1024), 16usize..200).prop_flat_map(
        |(body, contents, chunk)| {
            let mut messages = vec![3];
            messages.extend(body);
            let file = file_record("sound/test.wav", &contents);

            let normal_order =
                Just((0..messages.len().div_ceil(chunk)).collect::<Vec<_>>()).prop_shuffle();
            let file_order =
                Just((0..file.len().div_ceil(chunk)).collect::<Vec<_>>()).prop_shuffle();
            (Just(messages), Just(contents), Just(chunk), normal_order, file_order)
        },
    )
}

proptest! {
    #[test]
    fn test_fragments_reassemble_in_any_order(
        (messages, contents, chunk, normal_order, file_order) in transfers()
    ) {
        let now = Instant::now();
        let mut channel = Channel::new(addr(1), ChannelConfig::default(), now);

        let file = file_record("sound/test.wav", &contents);
        let normal_chunks: Vec<&[u8]> = messages.chunks(chunk).collect();
        let file_chunks: Vec<&[u8]> = file.chunks(chunk).collect();

        let mut completed = Vec::new();
        let mut files = Vec::new();
        let mut tails = Vec::new();
        for step in 0..normal_order.len().max(file_order.len()) {
            let normal = normal_order
                .get(step)
                .map(|&i| (normal_chunks.len(), i + 1, normal_chunks[i]));
            let file = file_order
                .get(step)
                .map(|&i| (file_chunks.len(), i + 1, file_chunks[i]));
            let datagram = fragment_datagram(step as u32 + 1, normal, file, &[9, 9]);

            let mut deliveries = channel.process(&datagram, now).unwrap().unwrap();
            if let Some(Delivery::Messages(tail)) = deliveries.pop() {
                tails.push(tail.remaining_bytes().to_vec());
            }
            for delivery in deliveries {
                match delivery {
                    Delivery::Messages(buf) => completed.push(buf.remaining_bytes().to_vec()),
                    Delivery::File { name, data } => files.push((name, data)),
                }
            }
        }

        prop_assert_eq!(completed, vec![messages]);
        prop_assert_eq!(files, vec![("sound/test.wav".to_string(), contents)]);
        prop_assert!(tails.iter().all(|tail| tail == &[9, 9]));
    }
}
