use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use anyhow::Result;
use clap::{App, Arg, value_t};
use env_logger::Builder;
use log::{debug, info};
use log::LevelFilter::*;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag::register;
use siphon::config;
use siphon::filter;
use siphon::mysql::Mysql;
use siphon::publish::Publisher;
use siphon::sniff::Sniffer;
use siphon::tcp::{Dispatcher, Plugin};

fn main() -> Result<()> {
    let ver  = env!("CARGO_PKG_VERSION");
    let args = App::new("siphon").version(ver)
        .arg(Arg::with_name("config")
             .short("c")
             .takes_value(true)
             .default_value("/etc/siphon/siphon.yml")
             .help("configuration file"))
        .arg(Arg::with_name("file")
             .short("I")
             .takes_value(true)
             .help("read packets from a pcap file"))
        .arg(Arg::with_name("loop")
             .short("l")
             .takes_value(true)
             .default_value("1")
             .help("replay the pcap file this many times, 0 for forever"))
        .arg(Arg::with_name("topspeed")
             .short("t")
             .help("replay packets as fast as possible"))
        .arg(Arg::with_name("nopublish")
             .short("N")
             .help("disable actual publishing for testing"))
        .arg(Arg::with_name("test")
             .long("test")
             .help("test configuration and exit"))
        .arg(Arg::with_name("verbose")
             .short("v")
             .multiple(true)
             .help("increase log verbosity"))
        .get_matches();

    let (module, level) = match args.occurrences_of("verbose") {
        0 => (Some(module_path!()), Info),
        1 => (Some(module_path!()), Debug),
        2 => (Some(module_path!()), Trace),
        _ => (None,                 Trace),
    };
    Builder::from_default_env().filter(module, level).init();

    info!("initializing siphon {}", ver);

    let path    = value_t!(args, "config", String)?;
    let mut cfg = config::load(&path)?;

    if let Some(file) = args.value_of("file") {
        cfg.interfaces.file = Some(file.to_owned());
    }
    cfg.interfaces.loops    = value_t!(args, "loop", u32)?;
    cfg.interfaces.topspeed = cfg.interfaces.topspeed || args.is_present("topspeed");

    let publish = Publisher::new(&cfg, args.is_present("nopublish"))?;

    let filters = filter::load(&cfg.filter)?;
    let queue   = match filters.is_empty() {
        true  => publish.queue(),
        false => filter::run(filters, publish.queue()),
    };

    let mut mysql = Mysql::new(cfg.protocols.mysql.clone());
    mysql.init(false, queue)?;

    let mut dispatcher = Dispatcher::new(vec![Box::new(mysql)])?;

    if args.is_present("test") {
        println!("config ok");
        return Ok(());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    register(SIGTERM, shutdown.clone())?;
    register(SIGINT,  shutdown.clone())?;

    let mut sniffer = Sniffer::new(cfg.interfaces.clone());
    sniffer.run(&mut dispatcher, &shutdown)?;

    debug!("shutting down");

    drop(dispatcher);
    publish.stop();

    Ok(())
}
