use std::any::Any;
use std::collections::HashMap;
use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, Utc};
use crossbeam_channel::Sender;
use log::debug;
use crate::event::Record;
use super::{Direction, Key, Tuple};

const STREAM_EXPIRY_SECS: i64 = 600;
const SWEEP_INTERVAL_SECS: i64 = 1;

pub type State = Option<Box<dyn Any + Send>>;

#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub ts:      DateTime<Utc>,
    pub tuple:   Tuple,
    pub seq:     u32,
    pub fin:     bool,
    pub payload: Vec<u8>,
}

pub trait Plugin: Send {
    fn name(&self) -> &'static str;

    fn init(&mut self, test_mode: bool, results: Sender<Record>) -> Result<()>;

    fn ports(&self) -> &[u16];

    fn parse(&mut self, seg: &Segment, tuple: &Tuple, dir: Direction, state: State) -> State;

    fn gap_in_stream(&mut self, tuple: &Tuple, dir: Direction, state: State) -> State;

    fn received_fin(&mut self, tuple: &Tuple, dir: Direction, state: State) -> State;

    fn expire(&mut self, _now: DateTime<Utc>) {}
}

pub fn build_ports_map(plugins: &[Box<dyn Plugin>]) -> Result<HashMap<u16, usize>> {
    let mut map = HashMap::new();
    for (index, plugin) in plugins.iter().enumerate() {
        for &port in plugin.ports() {
            match map.insert(port, index) {
                Some(prev) if prev != index => {
                    return Err(anyhow!("Duplicate port ({}) exists in configuration", port));
                }
                _ => (),
            }
        }
    }
    Ok(map)
}

pub struct Dispatcher {
    ports:   HashMap<u16, usize>,
    plugins: Vec<Box<dyn Plugin>>,
    flows:   HashMap<Key, Flow>,
    swept:   Option<DateTime<Utc>>,
}

struct Flow {
    tuple: Tuple,
    proto: usize,
    state: State,
    next:  [Option<u32>; 2],
    seen:  DateTime<Utc>,
}

impl Dispatcher {
    pub fn new(plugins: Vec<Box<dyn Plugin>>) -> Result<Self> {
        let ports = build_ports_map(&plugins)?;
        Ok(Self {
            ports:   ports,
            plugins: plugins,
            flows:   HashMap::new(),
            swept:   None,
        })
    }

    pub fn process(&mut self, seg: &Segment) {
        self.sweep(seg.ts);

        let port  = self.ports.get(&seg.tuple.dst.port);
        let port  = port.or_else(|| self.ports.get(&seg.tuple.src.port));
        let proto = match port.copied() {
            Some(proto) => proto,
            None        => return,
        };

        let flow = self.flows.entry(seg.tuple.key()).or_insert_with(|| Flow {
            tuple: seg.tuple,
            proto: proto,
            state: None,
            next:  [None, None],
            seen:  seg.ts,
        });

        let dir = match flow.tuple.src == seg.tuple.src {
            true  => Direction::Original,
            false => Direction::Reverse,
        };

        flow.seen = seg.ts;

        let plugin = match self.plugins.get_mut(flow.proto) {
            Some(plugin) => plugin,
            None         => return,
        };

        let tuple     = flow.tuple;
        let n         = dir.index();
        let mut state = flow.state.take();

        if !seg.payload.is_empty() {
            let end  = seg.seq.wrapping_add(seg.payload.len() as u32);
            let next = flow.next[n];

            state = match next {
                Some(next) if next == seg.seq => plugin.parse(seg, &tuple, dir, state),
                Some(next) if seq_lt(next, seg.seq) => {
                    debug!("gap of {} bytes on stream {}", seg.seq.wrapping_sub(next), tuple);
                    let state = plugin.gap_in_stream(&tuple, dir, state);
                    plugin.parse(seg, &tuple, dir, state)
                }
                Some(next) => {
                    let skip = next.wrapping_sub(seg.seq) as usize;
                    match skip < seg.payload.len() {
                        true => {
                            let tail = Segment {
                                payload: seg.payload[skip..].to_vec(),
                                ..seg.clone()
                            };
                            plugin.parse(&tail, &tuple, dir, state)
                        }
                        false => state,
                    }
                }
                None => plugin.parse(seg, &tuple, dir, state),
            };

            flow.next[n] = Some(match next {
                Some(next) if seq_lt(end, next) => next,
                _                               => end,
            });
        }

        if seg.fin {
            state = plugin.received_fin(&tuple, dir, state);
        }

        flow.state = state;
    }

    fn sweep(&mut self, now: DateTime<Utc>) {
        if let Some(last) = self.swept {
            if now - last < Duration::seconds(SWEEP_INTERVAL_SECS) {
                return;
            }
        }
        self.swept = Some(now);

        let expiry = Duration::seconds(STREAM_EXPIRY_SECS);
        self.flows.retain(|_, flow| now - flow.seen < expiry);

        for plugin in self.plugins.iter_mut() {
            plugin.expire(now);
        }
    }
}

fn seq_lt(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}
