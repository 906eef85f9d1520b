//! Packet codec.
//!
//! All integers are little-endian. This module only knows about bytes: no
//! sockets, no threads. `OutBuffer` models the growable send buffer with
//! exact capacity growth, so boundary tests can assert on it directly.

use std::io::{self, Read};

use crate::net::{tag, ClientId, NetFrame};

/// A length-prefixed, exact-growth output buffer.
///
/// `reserve_exact` only allocates when the existing spare capacity is
/// insufficient, and then allocates exactly the deficit — which is what
/// lets `flush`-style call sites land on a buffer whose capacity equals its
/// length after a tightly-sized batch of writes.
#[derive(Debug, Default)]
pub struct OutBuffer {
    buf: Vec<u8>,
}

impl OutBuffer {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Writes `u32 len(packet) | packet` to the buffer, growing exactly
    /// enough to fit if the current spare capacity is insufficient.
    pub fn write_len_prefixed(&mut self, packet: &[u8]) {
        let additional = 4 + packet.len();
        self.buf.reserve_exact(additional);
        self.buf.extend_from_slice(&(packet.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(packet);
    }
}

/// Builds the `frame:u32 | concatenated orders` packet body for
/// `send_frame`. The outer length prefix is added separately by
/// [`OutBuffer::write_len_prefixed`] so callers can reuse the same packet
/// bytes for the awaiting-ack FIFO.
pub fn encode_order_frame(frame: NetFrame, orders: &[Vec<u8>]) -> Vec<u8> {
    let payload_len: usize = orders.iter().map(|o| o.len()).sum();
    let mut out = Vec::with_capacity(4 + payload_len);
    out.extend_from_slice(&frame.to_le_bytes());
    for order in orders {
        out.extend_from_slice(order);
    }
    out
}

/// Builds a `0:u32 | order` immediate-order packet body.
pub fn encode_immediate(order: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + order.len());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(order);
    out
}

/// Builds a `frame:u32 | SyncHash-tag:u8 | hash:u32` sync packet body
/// (9 bytes). The outer length prefix is added by the framer.
pub fn encode_sync(frame: NetFrame, hash: u32) -> [u8; 9] {
    let mut out = [0u8; 9];
    out[0..4].copy_from_slice(&frame.to_le_bytes());
    out[4] = tag::SYNC_HASH;
    out[5..9].copy_from_slice(&hash.to_le_bytes());
    out
}

/// Builds a `frame:u32 | Disconnect-tag:u8` packet body (5 bytes).
pub fn encode_disconnect(frame: NetFrame) -> [u8; 5] {
    let mut out = [0u8; 5];
    out[0..4].copy_from_slice(&frame.to_le_bytes());
    out[4] = tag::DISCONNECT;
    out
}

/// Builds a `frameReceived:u32 | Ack-tag:u8 | framesToAck:u16` packet body
/// (7 bytes).
pub fn encode_ack(frame_received: NetFrame, frames_to_ack: u16) -> [u8; 7] {
    let mut out = [0u8; 7];
    out[0..4].copy_from_slice(&frame_received.to_le_bytes());
    out[4] = tag::ACK;
    out[5..7].copy_from_slice(&frames_to_ack.to_le_bytes());
    out
}

/// Parses a sync-hash packet payload (`frame:u32 | tag:u8 | hash:u32`).
/// Returns `None` if the shape doesn't match.
pub fn parse_sync(payload: &[u8]) -> Option<(NetFrame, u32)> {
    if payload.len() != 9 || payload[4] != tag::SYNC_HASH {
        return None;
    }
    let frame = u32::from_le_bytes(payload[0..4].try_into().unwrap());
    let hash = u32::from_le_bytes(payload[5..9].try_into().unwrap());
    Some((frame, hash))
}

/// Parses a disconnect packet payload (`frame:u32 | tag:u8`).
pub fn parse_disconnect(payload: &[u8]) -> Option<NetFrame> {
    if payload.len() != 5 || payload[4] != tag::DISCONNECT {
        return None;
    }
    Some(u32::from_le_bytes(payload[0..4].try_into().unwrap()))
}

/// Parses an ack packet payload (`frameReceived:u32 | tag:u8 | framesToAck:u16`).
pub fn parse_ack(payload: &[u8]) -> Option<(NetFrame, u16)> {
    if payload.len() != 7 || payload[4] != tag::ACK {
        return None;
    }
    let frame_received = u32::from_le_bytes(payload[0..4].try_into().unwrap());
    let frames_to_ack = u16::from_le_bytes(payload[5..7].try_into().unwrap());
    Some((frame_received, frames_to_ack))
}

/// Reads one `u32 length | u32 fromClient | payload[length]` record from a
/// blocking reader. A zero length is a protocol error, not an empty packet.
pub fn read_packet<R: Read>(reader: &mut R) -> io::Result<(ClientId, Vec<u8>)> {
    let mut header = [0u8; 8];
    reader.read_exact(&mut header)?;
    let len = u32::from_le_bytes(header[0..4].try_into().unwrap());
    let from_client = ClientId(u32::from_le_bytes(header[4..8].try_into().unwrap()));
    if len == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "zero-length packet is reserved/error",
        ));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;
    Ok((from_client, payload))
}

/// Reads one `u32 length | payload[length]` record from a blocking reader —
/// the client→server wire shape, which omits the `fromClient` prefix the
/// relay adds when rebroadcasting. A zero length is a protocol error, same
/// as [`read_packet`].
pub fn read_client_packet<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf);
    if len == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "zero-length packet is reserved/error",
        ));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

/// Reads every remaining `(ClientId, payload)` record from `reader` until
/// EOF, decoding the whole stream eagerly. Used by [`crate::connection::replay`]
/// and round-trip tests; the live receiver thread uses [`read_packet`]
/// directly in a loop instead, since it must react to each packet as it
/// arrives.
pub fn decode_stream<R: Read>(reader: &mut R) -> io::Result<Vec<(ClientId, Vec<u8>)>> {
    let mut out = Vec::new();
    loop {
        match read_packet(reader) {
            Ok(record) => out.push(record),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_len_prefixed_grows_to_fit_capacity() {
        let mut buf = OutBuffer::with_capacity(10);
        let packet = [0u8; 5];
        buf.write_len_prefixed(&packet);
        assert_eq!(buf.len(), 9);
        assert_eq!(buf.capacity(), 10);
    }

    #[test]
    fn write_len_prefixed_reuses_sufficient_capacity() {
        let mut buf = OutBuffer::with_capacity(18);
        buf.write_len_prefixed(&[0u8; 5]);
        buf.write_len_prefixed(&[0u8; 5]);
        assert_eq!(buf.len(), 18);
        assert_eq!(buf.capacity(), 18);
    }

    #[test]
    fn write_len_prefixed_grows_exactly_on_deficit() {
        let mut buf = OutBuffer::with_capacity(10);
        buf.write_len_prefixed(&[0u8; 5]);
        buf.write_len_prefixed(&[0u8; 5]);
        assert_eq!(buf.len(), 18);
        assert_eq!(buf.capacity(), 18);
    }

    #[test]
    fn write_len_prefixed_composes_encoded_packet() {
        let mut buf = OutBuffer::with_capacity(10);
        let packet = encode_order_frame(1, &[vec![0u8, 0u8]]);
        buf.write_len_prefixed(&packet);
        assert_eq!(buf.len(), 10);
        assert_eq!(buf.capacity(), 10);
    }

    #[test]
    fn decode_order_frame_roundtrip() {
        let orders = vec![vec![1, 2, 3], vec![4, 5]];
        let packet = encode_order_frame(7, &orders);
        assert_eq!(&packet[0..4], &7u32.to_le_bytes());
        assert_eq!(&packet[4..], &[1, 2, 3, 4, 5][..]);
    }

    #[test]
    fn sync_roundtrip() {
        let packet = encode_sync(42, 0xDEADBEEF);
        assert_eq!(parse_sync(&packet), Some((42, 0xDEADBEEF)));
    }

    #[test]
    fn disconnect_roundtrip() {
        let packet = encode_disconnect(5);
        assert_eq!(parse_disconnect(&packet), Some(5));
    }

    #[test]
    fn ack_roundtrip() {
        let packet = encode_ack(100, 3);
        assert_eq!(parse_ack(&packet), Some((100, 3)));
    }

    #[test]
    fn read_packet_rejects_zero_length() {
        let mut header = Vec::new();
        header.extend_from_slice(&0u32.to_le_bytes());
        header.extend_from_slice(&1u32.to_le_bytes());
        let mut cursor = io::Cursor::new(header);
        let err = read_packet(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn decode_stream_reads_multiple_packets() {
        let mut wire = Vec::new();
        for (client, payload) in [(ClientId(1), vec![9u8; 3]), (ClientId(2), vec![1u8; 2])] {
            wire.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            wire.extend_from_slice(&client.0.to_le_bytes());
            wire.extend_from_slice(&payload);
        }
        let mut cursor = io::Cursor::new(wire);
        let records = decode_stream(&mut cursor).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, ClientId(1));
        assert_eq!(records[1].1, vec![1u8; 2]);
    }

    #[test]
    fn read_client_packet_omits_from_client() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&3u32.to_le_bytes());
        wire.extend_from_slice(&[9, 9, 9]);
        let mut cursor = io::Cursor::new(wire);
        let payload = read_client_packet(&mut cursor).unwrap();
        assert_eq!(payload, vec![9, 9, 9]);
    }
}
