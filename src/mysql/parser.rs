use chrono::{DateTime, Utc};
use log::{debug, warn};
use super::{CMD_QUERY, MAX_PAYLOAD_SIZE};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ParseState {
    Start,
    EatMessage,
    EatFields,
    EatRows,
}

#[derive(Clone, Debug)]
pub struct Message {
    pub start: usize,
    pub end:   usize,

    pub ts:            DateTime<Utc>,
    pub is_request:    bool,
    pub packet_length: u32,
    pub seq:           u8,
    pub typ:           u8,
    pub num_fields:    usize,
    pub num_rows:      usize,
    pub size:          u64,
    pub tables:        String,
    pub is_ok:         bool,
    pub is_error:      bool,
    pub affected_rows: u64,
    pub insert_id:     u64,
    pub error_code:    u16,
    pub error_info:    String,
    pub query:         String,
    pub ignore:        bool,
    pub truncated:     bool,
}

impl Message {
    pub fn new(ts: DateTime<Utc>) -> Self {
        Self {
            start:         0,
            end:           0,
            ts:            ts,
            is_request:    false,
            packet_length: 0,
            seq:           0,
            typ:           0,
            num_fields:    0,
            num_rows:      0,
            size:          0,
            tables:        String::new(),
            is_ok:         false,
            is_error:      false,
            affected_rows: 0,
            insert_id:     0,
            error_code:    0,
            error_info:    String::new(),
            query:         String::new(),
            ignore:        false,
            truncated:     false,
        }
    }
}

pub struct Stream {
    pub data:      Vec<u8>,
    pub offset:    usize,
    pub state:     ParseState,
    pub is_client: bool,
    pub message:   Option<Message>,
}

impl Stream {
    pub fn new() -> Self {
        Self {
            data:      Vec::new(),
            offset:    0,
            state:     ParseState::Start,
            is_client: false,
            message:   None,
        }
    }

    pub fn advance(&mut self, end: usize) {
        self.data.drain(..end);
        self.offset = 0;
        self.state  = ParseState::Start;
        self.message = None;
    }
}

pub enum Decoded<T> {
    Complete(T, usize),
    Partial,
    Invalid,
}

/// Returns (ok, complete). ok == false means the stream is beyond
/// recovery and must be dropped; complete == false means more bytes
/// are needed.
pub fn parse(s: &mut Stream) -> (bool, bool) {
    let mut m = match s.message.take() {
        Some(m) => m,
        None    => return (false, false),
    };
    let (ok, complete) = run(s, &mut m);
    s.message = Some(m);
    (ok, complete)
}

fn run(s: &mut Stream, m: &mut Message) -> (bool, bool) {
    while s.offset < s.data.len() {
        match s.state {
            ParseState::Start => {
                m.start = s.offset;
                if s.data.len() - s.offset < 5 {
                    return (true, false);
                }
                let hdr = &s.data[s.offset..s.offset + 5];
                m.packet_length = header_length(hdr);
                m.seq = hdr[3];
                m.typ = hdr[4];

                if m.seq == 0 {
                    if m.typ == CMD_QUERY {
                        m.is_request = true;
                        s.state = ParseState::EatMessage;
                    } else {
                        m.ignore = true;
                        s.state = ParseState::EatMessage;
                    }
                    s.is_client = true;
                } else if !s.is_client {
                    m.is_request = false;
                    if m.typ == 0x00 || m.typ == 0xfe {
                        m.is_ok = true;
                        s.state = ParseState::EatMessage;
                    } else if m.typ == 0xff {
                        m.is_error = true;
                        s.state = ParseState::EatMessage;
                    } else if m.packet_length == 1 {
                        m.num_fields = m.typ as usize;
                        s.offset += 5;
                        s.state = ParseState::EatFields;
                    } else {
                        m.ignore = true;
                        s.state = ParseState::EatMessage;
                    }
                } else {
                    warn!("unexpected mysql message of type {}", m.typ);
                    return (false, false);
                }
            }

            ParseState::EatMessage => {
                if s.data.len() - s.offset < m.packet_length as usize + 4 {
                    return (true, false);
                }
                s.offset += 4;
                s.offset += m.packet_length as usize;
                m.end = s.offset;

                if m.is_request {
                    m.query = String::from_utf8_lossy(&s.data[m.start + 5..m.end]).into_owned();
                } else if m.is_ok {
                    let (affected, off) = match read_linteger(&s.data, m.start + 5) {
                        Decoded::Complete(v, off) => (v, off),
                        Decoded::Partial          => return (true, false),
                        Decoded::Invalid          => return (false, false),
                    };
                    m.affected_rows = affected;

                    let (insert_id, _) = match read_linteger(&s.data, off) {
                        Decoded::Complete(v, off) => (v, off),
                        Decoded::Partial          => return (true, false),
                        Decoded::Invalid          => return (false, false),
                    };
                    m.insert_id = insert_id;
                } else if m.is_error {
                    if m.end < m.start + 13 {
                        debug!("mysql error packet too short");
                        return (false, false);
                    }
                    m.error_code = (s.data[m.start + 6] as u16) << 8 | s.data[m.start + 5] as u16;
                    m.error_info = format!("{}: {}",
                        String::from_utf8_lossy(&s.data[m.start + 8..m.start + 13]),
                        String::from_utf8_lossy(&s.data[m.start + 13..m.end]));
                }
                return (true, true);
            }

            ParseState::EatFields => {
                if s.data.len() - s.offset < 4 {
                    return (true, false);
                }
                let hdr = &s.data[s.offset..s.offset + 4];
                m.packet_length = header_length(hdr);
                m.seq = hdr[3];

                if s.data.len() - s.offset < m.packet_length as usize + 4 {
                    return (true, false);
                }
                s.offset += 4;
                if m.packet_length == 0 {
                    return (false, false);
                }

                if s.data[s.offset] == 0xfe {
                    // EOF marker, field definitions are done
                    s.offset += m.packet_length as usize;
                    s.state = ParseState::EatRows;
                } else {
                    let off = match read_lstring(&s.data, s.offset) {
                        Decoded::Complete(_, off) => off,
                        Decoded::Partial          => return (true, false),
                        Decoded::Invalid          => return (false, false),
                    };
                    let (db, off) = match read_lstring(&s.data, off) {
                        Decoded::Complete(v, off) => (v, off),
                        Decoded::Partial          => return (true, false),
                        Decoded::Invalid          => return (false, false),
                    };
                    let (table, _) = match read_lstring(&s.data, off) {
                        Decoded::Complete(v, off) => (v, off),
                        Decoded::Partial          => return (true, false),
                        Decoded::Invalid          => return (false, false),
                    };

                    let db_table = format!("{}.{}",
                        String::from_utf8_lossy(db),
                        String::from_utf8_lossy(table));

                    if m.tables.is_empty() {
                        m.tables = db_table;
                    } else if !m.tables.contains(&db_table) {
                        m.tables.push_str(", ");
                        m.tables.push_str(&db_table);
                    }
                    s.offset += m.packet_length as usize;
                }
            }

            ParseState::EatRows => {
                if s.data.len() - s.offset < 4 {
                    return (true, false);
                }
                let hdr = &s.data[s.offset..s.offset + 4];
                m.packet_length = header_length(hdr);
                m.seq = hdr[3];

                if s.data.len() - s.offset < m.packet_length as usize + 4 {
                    return (true, false);
                }
                s.offset += 4;
                if m.packet_length == 0 {
                    return (false, false);
                }

                if s.data[s.offset] == 0xfe {
                    // EOF marker, the response is done
                    s.offset += m.packet_length as usize;

                    if m.end == 0 {
                        m.end = s.offset;
                    } else {
                        m.truncated = true;
                    }
                    m.size = (s.offset - m.start) as u64;
                    if !m.is_error {
                        m.is_ok = true;
                    }
                    return (true, true);
                }

                s.offset += m.packet_length as usize;
                if m.end == 0 && s.offset > MAX_PAYLOAD_SIZE {
                    // publish only up to here, but keep reading for size accounting
                    m.end = s.offset;
                }
                m.num_rows += 1;
            }
        }
    }

    (true, false)
}

pub fn header_length(hdr: &[u8]) -> u32 {
    hdr[0] as u32 | (hdr[1] as u32) << 8 | (hdr[2] as u32) << 16
}

pub fn read_length(data: &[u8], offset: usize) -> Option<usize> {
    let hdr = data.get(offset..offset + 3)?;
    Some(header_length(hdr) as usize)
}

pub fn read_linteger(data: &[u8], offset: usize) -> Decoded<u64> {
    let b = match data.get(offset) {
        Some(&b) => b,
        None     => return Decoded::Partial,
    };

    let le = |bytes: &[u8]| {
        bytes.iter().enumerate().fold(0u64, |v, (i, &b)| v | (b as u64) << (8 * i))
    };

    match b {
        0xfb | 0xff => Decoded::Invalid,
        0xfc => match data.get(offset + 1..offset + 3) {
            Some(bytes) => Decoded::Complete(le(bytes), offset + 3),
            None        => Decoded::Partial,
        },
        0xfd => match data.get(offset + 1..offset + 4) {
            Some(bytes) => Decoded::Complete(le(bytes), offset + 4),
            None        => Decoded::Partial,
        },
        0xfe => match data.get(offset + 1..offset + 9) {
            Some(bytes) => Decoded::Complete(le(bytes), offset + 9),
            None        => Decoded::Partial,
        },
        b => Decoded::Complete(b as u64, offset + 1),
    }
}

pub fn read_lstring(data: &[u8], offset: usize) -> Decoded<&[u8]> {
    match read_linteger(data, offset) {
        Decoded::Complete(n, off) => match data.get(off..off + n as usize) {
            Some(s) => Decoded::Complete(s, off + n as usize),
            None    => Decoded::Partial,
        },
        Decoded::Partial => Decoded::Partial,
        Decoded::Invalid => Decoded::Invalid,
    }
}
