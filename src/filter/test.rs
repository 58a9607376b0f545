use std::time::Duration;
use anyhow::Result;
use chrono::{TimeZone, Utc};
use crossbeam_channel::unbounded;
use serde_json::json;
use crate::event::{Event, Record};
use super::*;

fn record(key: &str, value: &str) -> Record {
    let ts = Utc.with_ymd_and_hms(2015, 3, 5, 14, 30, 0).unwrap();
    let mut event = Event::new();
    event.insert(key.to_owned(), json!(value));
    Record::new(ts, event)
}

#[test]
fn nop_chain_passes_through() -> Result<()> {
    let (tx, rx) = unbounded();
    let filters = vec![
        Box::new(Nop::new("nop1")) as Box<dyn Filter>,
        Box::new(Nop::new("nop2")) as Box<dyn Filter>,
    ];

    let queue = run(filters, tx);
    queue.send(record("hello", "world"))?;
    queue.send(record("foo", "bar"))?;

    let timeout = Duration::from_secs(5);
    assert_eq!(rx.recv_timeout(timeout)?, record("hello", "world"));
    assert_eq!(rx.recv_timeout(timeout)?, record("foo", "bar"));

    Ok(())
}

#[test]
fn load_by_type() -> Result<()> {
    let filters = load(&["nop".to_owned()])?;
    assert_eq!(filters.len(), 1);
    assert_eq!(filters[0].name(), "nop");
    Ok(())
}

#[test]
fn load_unknown_type() {
    let err = load(&["nop".to_owned(), "scrub".to_owned()]).unwrap_err();
    assert_eq!(err.to_string(), "no such filter type: scrub");
}

#[test]
fn empty_chain_loads_empty() -> Result<()> {
    assert!(load(&[])?.is_empty());
    Ok(())
}
