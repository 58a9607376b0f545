pub use nop::Nop;

mod nop;

#[cfg(test)]
mod test;

use std::thread;
use anyhow::{Result, anyhow};
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error};
use crate::event::{Event, Record};

pub trait Filter: Send {
    fn name(&self) -> &str;

    fn filter(&self, event: Event) -> Result<Event>;
}

pub fn load(names: &[String]) -> Result<Vec<Box<dyn Filter>>> {
    names.iter().map(|name| match name.as_str() {
        "nop" => Ok(Box::new(Nop::new(name)) as Box<dyn Filter>),
        _     => Err(anyhow!("no such filter type: {}", name)),
    }).collect()
}

pub fn run(filters: Vec<Box<dyn Filter>>, output: Sender<Record>) -> Sender<Record> {
    let (tx, rx) = bounded(1000);
    thread::spawn(move || runner(rx, filters, output));
    tx
}

fn runner(rx: Receiver<Record>, filters: Vec<Box<dyn Filter>>, output: Sender<Record>) {
    'records: for record in rx.iter() {
        let Record { ts, mut event } = record;

        for filter in &filters {
            event = match filter.filter(event) {
                Ok(event) => event,
                Err(e)    => {
                    error!("filter {} failed: {}", filter.name(), e);
                    continue 'records;
                }
            };
        }

        if output.send(Record::new(ts, event)).is_err() {
            break;
        }
    }
    debug!("filter runner finished");
}
