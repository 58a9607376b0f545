pub use dispatch::{build_ports_map, Dispatcher, Plugin, Segment, State};
pub use tuple::{Addr, Direction, Endpoint, Key, Tuple};

mod dispatch;
mod tuple;

#[cfg(test)]
mod test;

pub const MAX_STREAM_BYTES: usize = 10 * 1024 * 1024;
