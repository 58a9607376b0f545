use std::collections::HashMap;
use std::sync::Arc;
use log::{debug, error};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use elastic_api::{Client, Error};

pub const TOPOLOGY_INDEX: &str = ".siphon-topology";

#[derive(Debug, Deserialize, Serialize, Eq, PartialEq)]
pub struct Identity {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "IPs")]
    pub ips:  String,
}

pub struct Topology {
    expire: u64,
    map:    Mutex<Arc<HashMap<String, String>>>,
}

impl Topology {
    pub fn new(expire: u64) -> Self {
        Self {
            expire: expire,
            map:    Mutex::new(Arc::new(HashMap::new())),
        }
    }

    pub fn name_of(&self, ip: &str) -> String {
        self.map.lock().get(ip).cloned().unwrap_or_default()
    }

    pub fn replace(&self, map: HashMap<String, String>) {
        *self.map.lock() = Arc::new(map);
    }

    pub async fn enable_ttl(&self, conn: &Client) -> Result<(), Error> {
        let _ = conn.create_index(TOPOLOGY_INDEX).await;

        let setting = json!({
            "server-ip": {
                "_ttl": { "enabled": true, "default": "15000" },
            },
        });
        conn.index(TOPOLOGY_INDEX, "server-ip", "_mapping", &[], &setting).await?;
        Ok(())
    }

    pub async fn publish(&self, conn: &Client, name: &str) {
        let addrs = local_ips();
        debug!("publishing {:?} with expiration time {}", addrs, self.expire);

        let body = match serde_json::to_value(Identity {
            name: name.to_owned(),
            ips:  addrs.join(","),
        }) {
            Ok(body) => body,
            Err(e)   => {
                error!("failed to encode topology entry: {}", e);
                return;
            }
        };

        let ttl    = self.expire.to_string();
        let params = [("ttl", ttl.as_str()), ("refresh", "true")];

        match conn.index(TOPOLOGY_INDEX, "server-ip", name, &params, &body).await {
            Ok(_)  => self.refresh(conn).await,
            Err(e) => error!("failed to publish addresses: {:?}", e),
        }
    }

    pub async fn refresh(&self, conn: &Client) {
        let res = match conn.search_uri(TOPOLOGY_INDEX, "server-ip").await {
            Ok(res) => res,
            Err(e)  => {
                error!("topology query failed: {:?}", e);
                return;
            }
        };

        let mut map = HashMap::new();
        for hit in res.hits.hits {
            let id: Identity = match serde_json::from_value(hit.source) {
                Ok(id) => id,
                Err(e) => {
                    error!("invalid topology entry: {}", e);
                    continue;
                }
            };
            for ip in id.ips.split(',').filter(|ip| !ip.is_empty()) {
                map.insert(ip.to_owned(), id.name.clone());
            }
        }

        debug!("topology map {:?}", map);
        self.replace(map);
    }
}

fn local_ips() -> Vec<String> {
    pnet::datalink::interfaces().iter()
        .filter(|i| !i.is_loopback())
        .flat_map(|i| i.ips.iter())
        .map(|n| n.ip().to_string())
        .collect()
}
