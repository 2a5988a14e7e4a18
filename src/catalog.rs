//! Built-in catalog of candidate endpoints.
//!
//! The catalog is fixed for the process lifetime; the engine only ever
//! reads it. Metadata beyond the dial URL exists for the display layer.

use serde::{Deserialize, Serialize};

/// One network target the engine can probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    pub name: String,
    pub location: String,
    pub region: String,
    pub company: String,
    /// Dial target for the probe exchange.
    pub url: String,
}

/// Read-only list of candidate endpoints.
#[derive(Debug, Clone)]
pub struct Catalog {
    endpoints: Vec<Endpoint>,
}

impl Catalog {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self { endpoints }
    }

    /// All catalog entries, in declaration order.
    pub fn entries(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Look up an endpoint by its id.
    pub fn get(&self, id: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(vec![
            Endpoint {
                id: "cloudflare-us".to_string(),
                name: "USA".to_string(),
                location: "Cloudflare Edge".to_string(),
                region: "North America".to_string(),
                company: "Cloudflare".to_string(),
                url: "https://cloudflare-dns.com/dns-query?dns=AAABAAABAAAAAAAAA3d3dwdleGFtcGxlA2NvbQAAAQAB".to_string(),
            },
            Endpoint {
                id: "cloudflare-eu".to_string(),
                name: "Europe".to_string(),
                location: "Cloudflare Edge".to_string(),
                region: "Europe".to_string(),
                company: "Cloudflare".to_string(),
                url: "https://cloudflare-dns.com/dns-query?dns=AAABAAABAAAAAAAAA3d3dwdleGFtcGxlA2NvbQAAAQAB&ct=application/dns-json".to_string(),
            },
            Endpoint {
                id: "jsonplaceholder".to_string(),
                name: "Various".to_string(),
                location: "Global CDN".to_string(),
                region: "Global".to_string(),
                company: "JSONPlaceholder".to_string(),
                url: "https://jsonplaceholder.typicode.com/todos/1".to_string(),
            },
            Endpoint {
                id: "httpbin-get".to_string(),
                name: "Various".to_string(),
                location: "Global CDN".to_string(),
                region: "Global".to_string(),
                company: "HTTPBin".to_string(),
                url: "https://httpbin.org/get".to_string(),
            },
        ])
    }
}
