pub use output::{annotate, bulk_body, bulk_full, drain, index_name, Output};
pub use topology::{Identity, Topology};

mod output;
mod topology;


use std::env;
use std::thread::{self, JoinHandle};
use anyhow::Result;
use crossbeam_channel::{bounded, Sender};
use log::error;
use crate::config;
use crate::event::Record;

pub struct Publisher {
    tx:     Sender<Record>,
    handle: JoinHandle<()>,
}

impl Publisher {
    pub fn new(cfg: &config::Config, disabled: bool) -> Result<Self> {
        let name = match &cfg.shipper.name {
            Some(name) => name.clone(),
            None       => env::var("HOSTNAME").unwrap_or_default(),
        };
        let expire = cfg.shipper.topology_expire.unwrap_or(15) * 1000;

        let output = Output::new(&cfg.output, expire, &name)?;

        let (tx, rx) = bounded(1000);
        let handle = thread::spawn(move || output.run(rx, name, disabled));

        Ok(Self { tx, handle })
    }

    pub fn queue(&self) -> Sender<Record> {
        self.tx.clone()
    }

    pub fn stop(self) {
        let Publisher { tx, handle } = self;
        drop(tx);
        if handle.join().is_err() {
            error!("publisher thread panicked");
        }
    }
}
