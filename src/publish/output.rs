use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use chrono::{DateTime, Utc};
use crossbeam_channel::{never, select, tick, Receiver};
use log::{debug, error, info};
use serde_json::{json, Value};
use tokio::runtime::Runtime;
use elastic_api::Client;
use crate::config;
use crate::event::{Event, Record};
use super::Topology;

pub struct Output {
    index:          String,
    flush_interval: u64,
    bulk_size:      usize,
    conn:           Arc<Client>,
    topo:           Arc<Topology>,
    rt:             Runtime,
}

impl Output {
    pub fn new(cfg: &config::Output, expire: u64, name: &str) -> Result<Self> {
        let url  = cfg.url();
        let conn = Arc::new(Client::new(&url, cfg.username.clone(), cfg.password.clone()));
        let topo = Arc::new(Topology::new(expire));
        let rt   = Runtime::new()?;

        rt.block_on(topo.enable_ttl(&conn))?;

        info!("using elasticsearch {}", url);
        info!("using index pattern [{}-]YYYY.MM.DD", cfg.index);
        match cfg.flush_interval {
            0 => info!("inserting events one by one"),
            n => info!("inserting events in batches, flush interval {}ms, bulk size {}", n, cfg.bulk_size),
        }

        let refresh = topo.clone();
        let client  = conn.clone();
        let name    = name.to_owned();
        rt.spawn(async move {
            let mut timer = tokio::time::interval(Duration::from_secs(10));
            loop {
                timer.tick().await;
                refresh.publish(&client, &name).await;
            }
        });

        Ok(Self {
            index:          cfg.index.clone(),
            flush_interval: cfg.flush_interval,
            bulk_size:      cfg.bulk_size,
            conn:           conn,
            topo:           topo,
            rt:             rt,
        })
    }

    pub fn run(self, rx: Receiver<Record>, name: String, disabled: bool) {
        let ticker = match self.flush_interval {
            0 => never(),
            n => tick(Duration::from_millis(n)),
        };

        let mut batch: Vec<Value> = Vec::new();

        loop {
            select! {
                recv(rx) -> record => {
                    let mut record = match record {
                        Ok(record) => record,
                        Err(_)     => break,
                    };

                    annotate(&mut record.event, &name, &self.topo);

                    if disabled {
                        debug!("publisher disabled, dropping event");
                        continue;
                    }

                    match self.flush_interval {
                        0 => self.index_one(record),
                        _ => self.append(&mut batch, record),
                    }
                }
                recv(ticker) -> _ => self.flush(&mut batch),
            }
        }

        // final flush runs to completion before the runtime goes away
        if let Some(body) = drain(&mut batch) {
            self.rt.block_on(send(self.conn.clone(), body));
        }
    }

    fn append(&self, batch: &mut Vec<Value>, record: Record) {
        if bulk_full(batch, self.bulk_size) {
            debug!("bulk size reached, flushing");
            self.flush(batch);
        }

        let index = index_name(&self.index, record.ts);
        let kind  = kind(&record.event);
        batch.push(json!({"index": {"_index": index, "_type": kind}}));
        batch.push(Value::Object(record.event));
    }

    fn flush(&self, batch: &mut Vec<Value>) {
        if let Some(body) = drain(batch) {
            self.rt.spawn(send(self.conn.clone(), body));
        }
    }

    fn index_one(&self, record: Record) {
        let index = index_name(&self.index, record.ts);
        let kind  = kind(&record.event);
        let body  = Value::Object(record.event);
        if let Err(e) = self.rt.block_on(self.conn.index(&index, &kind, "", &[], &body)) {
            error!("failed to index event: {:?}", e);
        }
    }
}

async fn send(conn: Arc<Client>, body: String) {
    match conn.bulk(body).await {
        Ok(_)  => (),
        Err(e) => error!("bulk index failed: {:?}", e),
    }
}

pub fn annotate(event: &mut Event, name: &str, topo: &Topology) {
    if !name.is_empty() {
        event.insert("shipper".to_owned(), name.into());
    }

    for (side, field) in &[("src", "src_server"), ("dst", "dst_server")] {
        let ip = event.get(*side)
            .and_then(|v| v.get("ip"))
            .and_then(Value::as_str)
            .map(str::to_owned);

        if let Some(ip) = ip {
            let server = topo.name_of(&ip);
            if !server.is_empty() {
                event.insert((*field).to_owned(), server.into());
            }
        }
    }
}

pub fn index_name(base: &str, ts: DateTime<Utc>) -> String {
    format!("{}-{}", base, ts.format("%Y.%m.%d"))
}

pub fn bulk_full(batch: &[Value], bulk_size: usize) -> bool {
    batch.len() + 2 > bulk_size
}

pub fn drain(batch: &mut Vec<Value>) -> Option<String> {
    if batch.is_empty() {
        return None;
    }
    let body = bulk_body(batch);
    batch.clear();
    Some(body)
}

pub fn bulk_body(batch: &[Value]) -> String {
    let mut body = String::new();
    for item in batch {
        body.push_str(&item.to_string());
        body.push('\n');
    }
    body
}

fn kind(event: &Event) -> String {
    event.get("type").and_then(Value::as_str).unwrap_or("event").to_owned()
}
