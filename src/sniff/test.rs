use pcap::PacketHeader;
use super::decode;

const FIN_ACK: u8 = 0x11;
const PSH_ACK: u8 = 0x18;

fn frame(proto: u8, flags: u8, payload: &[u8], padding: usize) -> Vec<u8> {
    let total = 20 + 20 + payload.len();

    let mut buf = Vec::new();

    // ethernet
    buf.extend_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    buf.extend_from_slice(&[0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb]);
    buf.extend_from_slice(&[0x08, 0x00]);

    // ipv4
    buf.push(0x45);
    buf.push(0x00);
    buf.extend_from_slice(&(total as u16).to_be_bytes());
    buf.extend_from_slice(&[0x00, 0x01, 0x40, 0x00]);
    buf.push(0x40);
    buf.push(proto);
    buf.extend_from_slice(&[0x00, 0x00]);
    buf.extend_from_slice(&[10, 0, 0, 1]);
    buf.extend_from_slice(&[10, 0, 0, 2]);

    // tcp
    buf.extend_from_slice(&41000u16.to_be_bytes());
    buf.extend_from_slice(&3306u16.to_be_bytes());
    buf.extend_from_slice(&100u32.to_be_bytes());
    buf.extend_from_slice(&0u32.to_be_bytes());
    buf.push(0x50);
    buf.push(flags);
    buf.extend_from_slice(&[0xff, 0xff, 0x00, 0x00, 0x00, 0x00]);

    buf.extend_from_slice(payload);
    buf.extend_from_slice(&vec![0u8; padding]);

    buf
}

fn header(data: &[u8]) -> PacketHeader {
    PacketHeader {
        ts:     libc::timeval { tv_sec: 1_425_565_800, tv_usec: 0 },
        caplen: data.len() as u32,
        len:    data.len() as u32,
    }
}

#[test]
fn decodes_tcp_segment() {
    let data   = frame(6, PSH_ACK, b"hello", 0);
    let header = header(&data);
    let pkt    = pcap::Packet::new(&header, &data);

    let seg = decode(&pkt).unwrap();
    assert_eq!(seg.tuple.src.port, 41000);
    assert_eq!(seg.tuple.dst.port, 3306);
    assert_eq!(seg.tuple.src.addr.to_string(), "10.0.0.1");
    assert_eq!(seg.tuple.dst.addr.to_string(), "10.0.0.2");
    assert_eq!(seg.seq, 100);
    assert_eq!(seg.payload, b"hello");
    assert!(!seg.fin);
}

#[test]
fn decodes_fin() {
    let data   = frame(6, FIN_ACK, b"", 0);
    let header = header(&data);
    let pkt    = pcap::Packet::new(&header, &data);

    let seg = decode(&pkt).unwrap();
    assert!(seg.fin);
    assert!(seg.payload.is_empty());
}

#[test]
fn trims_ethernet_padding() {
    let data   = frame(6, PSH_ACK, b"hi", 8);
    let header = header(&data);
    let pkt    = pcap::Packet::new(&header, &data);

    let seg = decode(&pkt).unwrap();
    assert_eq!(seg.payload, b"hi");
}

#[test]
fn skips_non_tcp() {
    let data   = frame(17, PSH_ACK, b"hello", 0);
    let header = header(&data);
    let pkt    = pcap::Packet::new(&header, &data);

    assert!(decode(&pkt).is_none());
}

#[test]
fn skips_empty_ack() {
    let data   = frame(6, PSH_ACK, b"", 0);
    let header = header(&data);
    let pkt    = pcap::Packet::new(&header, &data);

    assert!(decode(&pkt).is_none());
}
