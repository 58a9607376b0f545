use anyhow::{Result, anyhow};
use pcap::{Active, Capture};

pub fn open(dev: &str) -> Result<Capture<Active>> {
    let mut cap = Capture::from_device(dev)?
        .buffer_size(10_000_000)
        .timeout(500)
        .snaplen(65535)
        .promisc(true)
        .open()?;

    match cap.list_datalinks()?.into_iter().find(|lt| lt.0 == 1) {
        Some(linktype) => cap.set_datalink(linktype)?,
        None           => return Err(anyhow!("{} is not an ethernet link", dev)),
    }

    Ok(cap)
}
