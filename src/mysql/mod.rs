pub use parser::{parse, read_length, read_linteger, read_lstring, Decoded, Message, ParseState, Stream};
pub use response::{dump_csv, parse_response};

mod parser;
mod response;


use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::mem;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use crossbeam_channel::Sender;
use log::{debug, warn};
use serde_json::{json, Value};
use crate::config;
use crate::event::{self, Event, Record, ERROR_STATUS, OK_STATUS};
use crate::tcp::{self, Direction, Endpoint, Key, Plugin, Segment, State, Tuple};

pub const MAX_PAYLOAD_SIZE: usize = 100 * 1024;

const CMD_QUERY: u8 = 3;
const TRANSACTION_TIMEOUT_SECS: i64 = 10;

pub struct Mysql {
    ports:           Vec<u16>,
    max_rows:        usize,
    max_row_length:  usize,
    send_request:    bool,
    send_response:   bool,
    publish_timeout: bool,

    cfg:          config::Proto,
    transactions: HashMap<Key, Transaction>,
    deadlines:    BinaryHeap<Reverse<Deadline>>,
    results:      Option<Sender<Record>>,
}

struct Transaction {
    ts:      DateTime<Utc>,
    src:     Endpoint,
    dst:     Endpoint,
    method:  String,
    query:   String,
    path:    String,
    size:    u64,
    request: String,
}

#[derive(Eq, PartialEq, Ord, PartialOrd)]
struct Deadline {
    at:  DateTime<Utc>,
    key: Key,
    ts:  DateTime<Utc>,
}

#[derive(Default)]
struct Conn {
    streams: [Option<Stream>; 2],
}

impl Mysql {
    pub fn new(cfg: config::Proto) -> Self {
        Self {
            ports:           cfg.ports.clone(),
            max_rows:        10,
            max_row_length:  1024,
            send_request:    false,
            send_response:   false,
            publish_timeout: false,
            cfg:             cfg,
            transactions:    HashMap::new(),
            deadlines:       BinaryHeap::new(),
            results:         None,
        }
    }

    fn handle(&mut self, msg: &Message, tuple: &Tuple, dir: Direction, raw: &[u8]) {
        match msg.is_request {
            true  => self.received_request(msg, tuple, dir),
            false => self.received_response(msg, tuple, raw),
        }
    }

    fn received_request(&mut self, msg: &Message, tuple: &Tuple, dir: Direction) {
        let key = tuple.key();
        if self.transactions.contains_key(&key) {
            debug!("two requests without a response, dropping the old one");
        }

        let mut src = Endpoint::from(tuple.src);
        let mut dst = Endpoint::from(tuple.dst);
        if dir == Direction::Reverse {
            mem::swap(&mut src, &mut dst);
        }

        let query  = msg.query.trim().to_owned();
        let method = query.split_whitespace().next().unwrap_or("").to_uppercase();

        self.deadlines.push(Reverse(Deadline {
            at:  msg.ts + Duration::seconds(TRANSACTION_TIMEOUT_SECS),
            key: key,
            ts:  msg.ts,
        }));

        self.transactions.insert(key, Transaction {
            ts:      msg.ts,
            src:     src,
            dst:     dst,
            method:  method,
            query:   query,
            path:    String::new(),
            size:    0,
            request: msg.query.clone(),
        });
    }

    fn received_response(&mut self, msg: &Message, tuple: &Tuple, raw: &[u8]) {
        let key = tuple.key();
        let mut trans = match self.transactions.remove(&key) {
            Some(trans) => trans,
            None        => {
                warn!("response from unknown transaction, ignoring");
                return;
            }
        };

        trans.size = msg.size;
        trans.path = msg.tables.clone();

        let mysql = json!({
            "affected_rows": msg.affected_rows,
            "insert_id":     msg.insert_id,
            "num_rows":      msg.num_rows,
            "num_fields":    msg.num_fields,
            "iserror":       msg.is_error,
            "is_truncated":  msg.truncated,
            "error_code":    msg.error_code,
            "error_message": msg.error_info,
        });

        let status = match msg.is_error {
            true  => ERROR_STATUS,
            false => OK_STATUS,
        };

        let responsetime = (msg.ts - trans.ts).num_milliseconds();

        let response = match raw.is_empty() {
            true  => String::new(),
            false => {
                let (fields, rows) = parse_response(raw, self.max_rows, self.max_row_length);
                dump_csv(&fields, &rows)
            }
        };

        self.publish(&trans, status, Some(responsetime), mysql, Some(response));
    }

    fn publish(&self, trans: &Transaction, status: &str, responsetime: Option<i64>, mysql: Value, response: Option<String>) {
        let results = match &self.results {
            Some(results) => results,
            None          => return,
        };

        let mut event = Event::new();
        event.insert("timestamp".to_owned(), event::timestamp(trans.ts));
        event.insert("type".to_owned(), "mysql".into());
        event.insert("status".to_owned(), status.into());
        if let Some(ms) = responsetime {
            event.insert("responsetime".to_owned(), ms.into());
        }
        event.insert("method".to_owned(), trans.method.clone().into());
        event.insert("query".to_owned(), trans.query.clone().into());
        event.insert("path".to_owned(), trans.path.clone().into());
        event.insert("bytes_out".to_owned(), trans.size.into());
        event.insert("src".to_owned(), json!({"ip": trans.src.ip, "port": trans.src.port}));
        event.insert("dst".to_owned(), json!({"ip": trans.dst.ip, "port": trans.dst.port}));
        event.insert("mysql".to_owned(), mysql);

        if self.send_request {
            event.insert("request".to_owned(), trans.request.clone().into());
        }
        if self.send_response {
            if let Some(response) = response {
                event.insert("response".to_owned(), response.into());
            }
        }

        if results.send(Record::new(trans.ts, event)).is_err() {
            debug!("results channel closed");
        }
    }

    fn conn(state: State) -> Conn {
        match state {
            Some(state) => match state.downcast::<Conn>() {
                Ok(conn) => *conn,
                Err(_)   => Conn::default(),
            },
            None => Conn::default(),
        }
    }
}

impl Plugin for Mysql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn init(&mut self, test_mode: bool, results: Sender<Record>) -> Result<()> {
        if !test_mode {
            let cfg = self.cfg.clone();
            self.max_rows        = cfg.max_rows.unwrap_or(self.max_rows);
            self.max_row_length  = cfg.max_row_length.unwrap_or(self.max_row_length);
            self.send_request    = cfg.send_request.unwrap_or(self.send_request);
            self.send_response   = cfg.send_response.unwrap_or(self.send_response);
            self.publish_timeout = cfg.publish_timeout.unwrap_or(self.publish_timeout);
        }
        self.results = Some(results);
        Ok(())
    }

    fn ports(&self) -> &[u16] {
        &self.ports
    }

    fn parse(&mut self, seg: &Segment, tuple: &Tuple, dir: Direction, state: State) -> State {
        let mut conn = Self::conn(state);
        let n = dir.index();

        match conn.streams[n].as_mut() {
            Some(stream) => {
                stream.data.extend_from_slice(&seg.payload);
                if stream.data.len() > tcp::MAX_STREAM_BYTES {
                    debug!("stream data too large, dropping tcp stream {}", tuple);
                    conn.streams[n] = None;
                    return Some(Box::new(conn));
                }
            }
            None => {
                let mut stream = Stream::new();
                stream.data = seg.payload.clone();
                stream.message = Some(Message::new(seg.ts));
                conn.streams[n] = Some(stream);
            }
        }

        loop {
            let stream = match conn.streams[n].as_mut() {
                Some(stream) => stream,
                None         => break,
            };
            if stream.data.is_empty() {
                break;
            }
            if stream.message.is_none() {
                stream.message = Some(Message::new(seg.ts));
            }

            let (ok, complete) = parser::parse(stream);
            if !ok {
                // drop this direction, retry with the next segment
                debug!("invalid mysql stream, dropping tcp stream {}", tuple);
                conn.streams[n] = None;
                break;
            }
            if !complete {
                break;
            }

            let message = match stream.message.take() {
                Some(message) => message,
                None          => break,
            };
            let raw = stream.data[message.start..message.end].to_vec();
            stream.advance(message.end);

            if !message.ignore {
                self.handle(&message, tuple, dir, &raw);
            }
        }

        Some(Box::new(conn))
    }

    fn gap_in_stream(&mut self, tuple: &Tuple, dir: Direction, state: State) -> State {
        let mut conn = Self::conn(state);
        debug!("gap in stream {}, dropping direction state", tuple);
        conn.streams[dir.index()] = None;
        Some(Box::new(conn))
    }

    fn received_fin(&mut self, _tuple: &Tuple, _dir: Direction, state: State) -> State {
        state
    }

    fn expire(&mut self, now: DateTime<Utc>) {
        loop {
            match self.deadlines.peek() {
                Some(Reverse(deadline)) if deadline.at <= now => (),
                _ => break,
            }
            let deadline = match self.deadlines.pop() {
                Some(Reverse(deadline)) => deadline,
                None                    => break,
            };

            let live = match self.transactions.get(&deadline.key) {
                Some(trans) => trans.ts == deadline.ts,
                None        => false,
            };
            if !live {
                continue;
            }

            let trans = match self.transactions.remove(&deadline.key) {
                Some(trans) => trans,
                None        => continue,
            };
            debug!("transaction timed out: {}", trans.query);

            if self.publish_timeout {
                self.publish(&trans, ERROR_STATUS, None, Value::Object(Event::new()), None);
            }
        }
    }
}
