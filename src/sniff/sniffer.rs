use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, info};
use pcap::{Capture, Device};
use crate::config;
use crate::tcp::Dispatcher;
use super::{capture, decode};
use pcap::Error::*;

pub struct Sniffer {
    cfg: config::Interfaces,
}

impl Sniffer {
    pub fn new(cfg: config::Interfaces) -> Self {
        Self { cfg }
    }

    pub fn run(&mut self, dispatcher: &mut Dispatcher, shutdown: &AtomicBool) -> Result<()> {
        match self.cfg.file.clone() {
            Some(file) => self.replay(&file, dispatcher, shutdown),
            None       => self.live(dispatcher, shutdown),
        }
    }

    fn live(&self, dispatcher: &mut Dispatcher, shutdown: &AtomicBool) -> Result<()> {
        let device = match self.cfg.device.clone() {
            Some(device) => device,
            None         => Device::lookup()?.name,
        };

        let mut cap = capture::open(&device)?;
        info!("listening on {}", device);

        while !shutdown.load(Ordering::Acquire) {
            match cap.next() {
                Ok(pkt) => {
                    if let Some(seg) = decode(&pkt) {
                        dispatcher.process(&seg);
                    }
                }
                Err(TimeoutExpired) => continue,
                Err(NoMorePackets)  => break,
                Err(e)              => return Err(e.into()),
            }
        }

        debug!("capture finished");
        Ok(())
    }

    fn replay(&self, file: &str, dispatcher: &mut Dispatcher, shutdown: &AtomicBool) -> Result<()> {
        let mut rounds = self.cfg.loops;

        'replay: loop {
            let mut cap = Capture::from_file(file)?;
            let mut last: Option<DateTime<Utc>> = None;

            info!("replaying {}", file);

            loop {
                if shutdown.load(Ordering::Acquire) {
                    break 'replay;
                }

                let seg = match cap.next() {
                    Ok(pkt)            => decode(&pkt),
                    Err(NoMorePackets) => break,
                    Err(e)             => return Err(e.into()),
                };
                let seg = match seg {
                    Some(seg) => seg,
                    None      => continue,
                };

                if !self.cfg.topspeed {
                    if let Some(last) = last {
                        let wait = (seg.ts - last).to_std().unwrap_or_default();
                        thread::sleep(wait.min(Duration::from_secs(1)));
                    }
                }
                last = Some(seg.ts);

                dispatcher.process(&seg);
            }

            match rounds {
                0 => continue,
                1 => break,
                _ => rounds -= 1,
            }
        }

        Ok(())
    }
}
