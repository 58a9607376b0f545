use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

pub const OK_STATUS:    &str = "OK";
pub const ERROR_STATUS: &str = "ERROR";

pub type Event = Map<String, Value>;

#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub ts:    DateTime<Utc>,
    pub event: Event,
}

impl Record {
    pub fn new(ts: DateTime<Utc>, event: Event) -> Self {
        Self { ts, event }
    }
}

pub fn timestamp(ts: DateTime<Utc>) -> Value {
    Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}
