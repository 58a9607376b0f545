use std::net::IpAddr;
use chrono::{DateTime, TimeZone, Utc};
use pnet::packet::{Packet as PacketExt, PacketSize};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::vlan::VlanPacket;
use crate::tcp::{Addr, Segment, Tuple};

const FIN: u16 = 0b00001;

pub fn decode(cap: &pcap::Packet<'_>) -> Option<Segment> {
    let ts  = timestamp(cap);
    let eth = EthernetPacket::new(cap.data)?;

    let mut ethertype = eth.get_ethertype();
    let mut payload   = eth.payload();

    while ethertype == EtherTypes::Vlan {
        let pkt = VlanPacket::new(payload)?;
        ethertype = pkt.get_ethertype();
        payload   = &payload[pkt.packet_size()..];
    }

    match ethertype {
        EtherTypes::Ipv4 => ipv4(ts, payload),
        EtherTypes::Ipv6 => ipv6(ts, payload),
        _                => None,
    }
}

fn ipv4(ts: DateTime<Utc>, payload: &[u8]) -> Option<Segment> {
    let pkt = Ipv4Packet::new(payload)?;
    if pkt.get_next_level_protocol() != IpNextHeaderProtocols::Tcp {
        return None;
    }

    // the frame may carry ethernet padding past the IP datagram
    let header = pkt.get_header_length() as usize * 4;
    let total  = (pkt.get_total_length() as usize).min(payload.len());
    if total <= header {
        return None;
    }

    let src = IpAddr::V4(pkt.get_source());
    let dst = IpAddr::V4(pkt.get_destination());
    tcp(ts, src, dst, &payload[header..total])
}

fn ipv6(ts: DateTime<Utc>, payload: &[u8]) -> Option<Segment> {
    let pkt = Ipv6Packet::new(payload)?;
    if pkt.get_next_header() != IpNextHeaderProtocols::Tcp {
        return None;
    }

    let header = 40;
    let total  = (header + pkt.get_payload_length() as usize).min(payload.len());
    if total <= header {
        return None;
    }

    let src = IpAddr::V6(pkt.get_source());
    let dst = IpAddr::V6(pkt.get_destination());
    tcp(ts, src, dst, &payload[header..total])
}

fn tcp(ts: DateTime<Utc>, src: IpAddr, dst: IpAddr, payload: &[u8]) -> Option<Segment> {
    let pkt  = TcpPacket::new(payload)?;
    let fin  = pkt.get_flags() & FIN != 0;
    let data = pkt.payload();

    if data.is_empty() && !fin {
        return None;
    }

    Some(Segment {
        ts:    ts,
        tuple: Tuple {
            src: Addr { addr: src, port: pkt.get_source() },
            dst: Addr { addr: dst, port: pkt.get_destination() },
        },
        seq:     pkt.get_sequence(),
        fin:     fin,
        payload: data.to_vec(),
    })
}

fn timestamp(cap: &pcap::Packet<'_>) -> DateTime<Utc> {
    let ts = cap.header.ts;
    Utc.timestamp_opt(ts.tv_sec as i64, (ts.tv_usec as u32).saturating_mul(1000))
        .earliest()
        .unwrap_or_else(Utc::now)
}
