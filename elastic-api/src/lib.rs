pub use client::{Client, Hit, Hits, SearchResult};
pub use error::Error;

mod client;
mod error;
