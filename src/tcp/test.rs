use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use crate::event::Record;
use super::*;

struct TestProtocol {
    ports: Vec<u16>,
    calls: Sender<Call>,
}

#[derive(Debug, Eq, PartialEq)]
enum Call {
    Parse(Direction, Vec<u8>),
    Gap(Direction),
    Fin(Direction),
}

impl TestProtocol {
    fn new(ports: &[u16]) -> (Box<dyn Plugin>, Receiver<Call>) {
        let (tx, rx) = unbounded();
        let proto = TestProtocol {
            ports: ports.to_vec(),
            calls: tx,
        };
        (Box::new(proto), rx)
    }
}

impl Plugin for TestProtocol {
    fn name(&self) -> &'static str {
        "test"
    }

    fn init(&mut self, _test_mode: bool, _results: Sender<Record>) -> Result<()> {
        Ok(())
    }

    fn ports(&self) -> &[u16] {
        &self.ports
    }

    fn parse(&mut self, seg: &Segment, _tuple: &Tuple, dir: Direction, state: State) -> State {
        self.calls.send(Call::Parse(dir, seg.payload.clone())).unwrap();
        state
    }

    fn gap_in_stream(&mut self, _tuple: &Tuple, dir: Direction, state: State) -> State {
        self.calls.send(Call::Gap(dir)).unwrap();
        state
    }

    fn received_fin(&mut self, _tuple: &Tuple, dir: Direction, state: State) -> State {
        self.calls.send(Call::Fin(dir)).unwrap();
        state
    }
}

fn addr(ip: &str, port: u16) -> Addr {
    Addr {
        addr: ip.parse().unwrap(),
        port: port,
    }
}

fn segment(ts: DateTime<Utc>, src: Addr, dst: Addr, seq: u32, payload: &[u8]) -> Segment {
    Segment {
        ts:      ts,
        tuple:   Tuple { src, dst },
        seq:     seq,
        fin:     false,
        payload: payload.to_vec(),
    }
}

fn ts() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2015, 3, 5, 14, 30, 0).unwrap()
}

#[test]
fn ports_map() -> Result<()> {
    let (http,  _) = TestProtocol::new(&[80, 8080]);
    let (mysql, _) = TestProtocol::new(&[3306]);
    let (redis, _) = TestProtocol::new(&[6379, 6380]);

    let map = build_ports_map(&[http, mysql, redis])?;

    assert_eq!(map.len(), 5);
    assert_eq!(map[&80],   0);
    assert_eq!(map[&8080], 0);
    assert_eq!(map[&3306], 1);
    assert_eq!(map[&6379], 2);
    assert_eq!(map[&6380], 2);

    Ok(())
}

#[test]
fn ports_map_collapses_duplicates() -> Result<()> {
    let (http, _) = TestProtocol::new(&[80, 8080, 8080]);
    let map = build_ports_map(&[http])?;
    assert_eq!(map.len(), 2);
    Ok(())
}

#[test]
fn ports_map_rejects_collision() {
    let (http,  _) = TestProtocol::new(&[80, 8080]);
    let (mysql, _) = TestProtocol::new(&[3306]);
    let (redis, _) = TestProtocol::new(&[6379, 6380, 3306]);

    let err = build_ports_map(&[http, mysql, redis]).unwrap_err();
    assert!(err.to_string().contains("Duplicate port (3306)"));
}

#[test]
fn direction_is_stable() -> Result<()> {
    let (proto, calls) = TestProtocol::new(&[3306]);
    let mut dispatcher = Dispatcher::new(vec![proto])?;

    let client = addr("10.0.0.1", 41000);
    let server = addr("10.0.0.2", 3306);

    dispatcher.process(&segment(ts(), client, server, 100, b"abc"));
    dispatcher.process(&segment(ts(), server, client, 500, b"def"));
    dispatcher.process(&segment(ts(), client, server, 103, b"ghi"));

    assert_eq!(calls.try_recv()?, Call::Parse(Direction::Original, b"abc".to_vec()));
    assert_eq!(calls.try_recv()?, Call::Parse(Direction::Reverse,  b"def".to_vec()));
    assert_eq!(calls.try_recv()?, Call::Parse(Direction::Original, b"ghi".to_vec()));

    Ok(())
}

#[test]
fn unknown_port_is_dropped() -> Result<()> {
    let (proto, calls) = TestProtocol::new(&[3306]);
    let mut dispatcher = Dispatcher::new(vec![proto])?;

    let a = addr("10.0.0.1", 41000);
    let b = addr("10.0.0.2", 9999);
    dispatcher.process(&segment(ts(), a, b, 100, b"abc"));

    assert!(calls.try_recv().is_err());
    Ok(())
}

#[test]
fn gap_is_reported() -> Result<()> {
    let (proto, calls) = TestProtocol::new(&[3306]);
    let mut dispatcher = Dispatcher::new(vec![proto])?;

    let client = addr("10.0.0.1", 41000);
    let server = addr("10.0.0.2", 3306);

    dispatcher.process(&segment(ts(), client, server, 100, b"abc"));
    dispatcher.process(&segment(ts(), client, server, 113, b"def"));

    assert_eq!(calls.try_recv()?, Call::Parse(Direction::Original, b"abc".to_vec()));
    assert_eq!(calls.try_recv()?, Call::Gap(Direction::Original));
    assert_eq!(calls.try_recv()?, Call::Parse(Direction::Original, b"def".to_vec()));

    Ok(())
}

#[test]
fn retransmit_is_dropped() -> Result<()> {
    let (proto, calls) = TestProtocol::new(&[3306]);
    let mut dispatcher = Dispatcher::new(vec![proto])?;

    let client = addr("10.0.0.1", 41000);
    let server = addr("10.0.0.2", 3306);

    dispatcher.process(&segment(ts(), client, server, 100, b"abc"));
    dispatcher.process(&segment(ts(), client, server, 100, b"abc"));

    assert_eq!(calls.try_recv()?, Call::Parse(Direction::Original, b"abc".to_vec()));
    assert!(calls.try_recv().is_err());

    Ok(())
}

#[test]
fn overlap_delivers_tail() -> Result<()> {
    let (proto, calls) = TestProtocol::new(&[3306]);
    let mut dispatcher = Dispatcher::new(vec![proto])?;

    let client = addr("10.0.0.1", 41000);
    let server = addr("10.0.0.2", 3306);

    dispatcher.process(&segment(ts(), client, server, 100, b"abc"));
    dispatcher.process(&segment(ts(), client, server, 101, b"bcdef"));

    assert_eq!(calls.try_recv()?, Call::Parse(Direction::Original, b"abc".to_vec()));
    assert_eq!(calls.try_recv()?, Call::Parse(Direction::Original, b"def".to_vec()));

    Ok(())
}

#[test]
fn fin_is_reported() -> Result<()> {
    let (proto, calls) = TestProtocol::new(&[3306]);
    let mut dispatcher = Dispatcher::new(vec![proto])?;

    let client = addr("10.0.0.1", 41000);
    let server = addr("10.0.0.2", 3306);

    let mut seg = segment(ts(), client, server, 100, b"abc");
    seg.fin = true;
    dispatcher.process(&seg);

    assert_eq!(calls.try_recv()?, Call::Parse(Direction::Original, b"abc".to_vec()));
    assert_eq!(calls.try_recv()?, Call::Fin(Direction::Original));

    Ok(())
}

#[test]
fn canonical_key_is_shared() {
    let a = addr("10.0.0.1", 41000);
    let b = addr("10.0.0.2", 3306);

    let tuple = Tuple { src: a, dst: b };
    assert_eq!(tuple.key(), tuple.reverse().key());
}
