use std::fs;
use anyhow::Result;
use serde::Deserialize;

pub fn load(path: &str) -> Result<Config> {
    let text = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&text)?)
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub interfaces: Interfaces,
    pub output:     Output,
    pub shipper:    Shipper,
    pub protocols:  Protocols,
    pub filter:     Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Interfaces {
    pub device:   Option<String>,
    pub file:     Option<String>,
    #[serde(rename = "loop")]
    pub loops:    u32,
    pub topspeed: bool,
}

impl Default for Interfaces {
    fn default() -> Self {
        Self {
            device:   None,
            file:     None,
            loops:    1,
            topspeed: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Output {
    pub host:           String,
    pub port:           u16,
    pub protocol:       String,
    pub path:           String,
    pub username:       Option<String>,
    pub password:       Option<String>,
    pub index:          String,
    pub flush_interval: u64,
    pub bulk_size:      usize,
}

impl Default for Output {
    fn default() -> Self {
        Self {
            host:           "localhost".to_owned(),
            port:           9200,
            protocol:       "http".to_owned(),
            path:           String::new(),
            username:       None,
            password:       None,
            index:          "siphon".to_owned(),
            flush_interval: 1000,
            bulk_size:      10_000,
        }
    }
}

impl Output {
    pub fn url(&self) -> String {
        let protocol = match self.protocol.is_empty() {
            true  => "http",
            false => &self.protocol,
        };
        format!("{}://{}:{}{}", protocol, self.host, self.port, self.path)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Shipper {
    pub name:            Option<String>,
    pub topology_expire: Option<u64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Protocols {
    pub mysql: Proto,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Proto {
    pub ports:           Vec<u16>,
    pub max_rows:        Option<usize>,
    pub max_row_length:  Option<usize>,
    pub send_request:    Option<bool>,
    pub send_response:   Option<bool>,
    pub publish_timeout: Option<bool>,
}
