//! Datagrams and their on-the-wire form.

use std::net::SocketAddrV4;

use crate::units::Bytes;

identifier!(PacketId, u64);

/// Size of an IPv4 header without options.
pub const IPV4_HEADER_LEN: usize = 20;
/// Size of a UDP header.
pub const UDP_HEADER_LEN: usize = 8;

const DEFAULT_TTL: u8 = 64;
const PROTO_UDP: u8 = 17;

/// A UDP datagram in flight. The payload is never materialized; only its size is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Packet {
    pub id: PacketId,
    pub src: SocketAddrV4,
    pub dst: SocketAddrV4,
    /// Payload size.
    pub size: Bytes,
}

impl Packet {
    /// Size of the encoded frame: both headers plus the payload.
    pub fn wire_len(&self) -> u64 {
        (IPV4_HEADER_LEN + UDP_HEADER_LEN) as u64 + self.size.into_u64()
    }

    /// Encodes the packet as an IPv4 frame carrying a UDP datagram with a zero-filled payload.
    /// Length fields saturate at `u16::MAX`.
    pub fn encode(&self) -> Vec<u8> {
        let payload = self.size.into_u64() as usize;
        let udp_len = clamp_u16(UDP_HEADER_LEN + payload);
        let total_len = clamp_u16(IPV4_HEADER_LEN + UDP_HEADER_LEN + payload);

        let mut frame = Vec::with_capacity(self.wire_len() as usize);
        frame.push(0x45); // version 4, 5-word header
        frame.push(0); // DSCP/ECN
        frame.extend_from_slice(&total_len.to_be_bytes());
        frame.extend_from_slice(&(self.id.inner() as u16).to_be_bytes());
        frame.extend_from_slice(&[0, 0]); // flags, fragment offset
        frame.push(DEFAULT_TTL);
        frame.push(PROTO_UDP);
        frame.extend_from_slice(&[0, 0]); // checksum, filled below
        frame.extend_from_slice(&self.src.ip().octets());
        frame.extend_from_slice(&self.dst.ip().octets());
        let checksum = internet_checksum(&frame[..IPV4_HEADER_LEN]);
        frame[10..12].copy_from_slice(&checksum.to_be_bytes());

        frame.extend_from_slice(&self.src.port().to_be_bytes());
        frame.extend_from_slice(&self.dst.port().to_be_bytes());
        frame.extend_from_slice(&udp_len.to_be_bytes());
        frame.extend_from_slice(&[0, 0]); // no UDP checksum
        frame.resize(frame.len() + payload, 0);
        frame
    }
}

fn clamp_u16(n: usize) -> u16 {
    u16::try_from(n).unwrap_or(u16::MAX)
}

/// The ones' complement of the ones' complement sum of `bytes`, taken as big-endian words.
fn internet_checksum(bytes: &[u8]) -> u16 {
    let mut sum = bytes
        .chunks(2)
        .map(|w| u32::from(u16::from_be_bytes([w[0], *w.get(1).unwrap_or(&0)])))
        .sum::<u32>();
    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn packet(size: u64) -> Packet {
        Packet {
            id: PacketId::new(3),
            src: SocketAddrV4::new(Ipv4Addr::new(10, 1, 3, 3), 49153),
            dst: SocketAddrV4::new(Ipv4Addr::new(10, 1, 2, 4), 9),
            size: Bytes::new(size),
        }
    }

    #[test]
    fn frame_layout() {
        let frame = packet(1024).encode();
        assert_eq!(frame.len(), 1052);
        assert_eq!(packet(1024).wire_len(), 1052);
        assert_eq!(&frame[..4], &[0x45, 0, 0x04, 0x1c]);
        assert_eq!(frame[9], PROTO_UDP);
        assert_eq!(&frame[12..16], &[10, 1, 3, 3]);
        assert_eq!(&frame[16..20], &[10, 1, 2, 4]);
        // Ports 49153 and 9, UDP length 1032.
        assert_eq!(&frame[20..26], &[0xc0, 0x01, 0, 9, 0x04, 0x08]);
        assert!(frame[28..].iter().all(|&b| b == 0));
    }

    #[test]
    fn header_checksum_verifies() {
        let frame = packet(512).encode();
        // Summing a header that includes its own checksum yields zero after complement.
        assert_eq!(internet_checksum(&frame[..IPV4_HEADER_LEN]), 0);
    }

    #[test]
    fn oversized_lengths_saturate() {
        let frame = packet(70_000).encode();
        assert_eq!(&frame[2..4], &[0xff, 0xff]);
        assert_eq!(frame.len(), 70_028);
        assert_eq!(packet(70_000).wire_len(), 70_028);
    }
}
