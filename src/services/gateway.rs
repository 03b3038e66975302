//! Default-gateway discovery from the routing table.
//!
//! Runs `netstat -rn`, keeps rows whose destination is `default` and turns
//! the gateway column into monitored hosts. Lookups are cached for a short
//! validity window on an explicit cache owned by the caller.

use crate::models::host::Host;
use crate::utils::clock::Clock;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

pub const DEFAULT_CACHE_VALIDITY: Duration = Duration::from_secs(30);

const ROUTE_TABLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Source of routing-table text. `None` when it could not be read.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RouteTable: Send + Sync {
    async fn dump(&self) -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct NetstatRouteTable {
    program: String,
}

impl NetstatRouteTable {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for NetstatRouteTable {
    fn default() -> Self {
        Self::new("netstat")
    }
}

#[async_trait]
impl RouteTable for NetstatRouteTable {
    async fn dump(&self) -> Option<String> {
        let mut command = Command::new(&self.program);
        command
            .arg("-rn")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match tokio::time::timeout(ROUTE_TABLE_TIMEOUT, command.output()).await {
            Ok(Ok(output)) => match String::from_utf8(output.stdout) {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!("Routing table output is not UTF-8: {}", e);
                    None
                }
            },
            Ok(Err(e)) => {
                warn!("Failed to run {} -rn: {}", self.program, e);
                None
            }
            Err(_) => {
                warn!("{} -rn did not finish within {:?}", self.program, ROUTE_TABLE_TIMEOUT);
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gateway {
    pub address: String,
    pub interface: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedLookup {
    gateways: Vec<Gateway>,
    fetched_at: DateTime<Utc>,
}

pub struct GatewayDiscovery {
    route_table: Arc<dyn RouteTable>,
    clock: Arc<dyn Clock>,
    validity: Duration,
    cache: Option<CachedLookup>,
}

impl GatewayDiscovery {
    pub fn new(route_table: Arc<dyn RouteTable>, clock: Arc<dyn Clock>, validity: Duration) -> Self {
        Self {
            route_table,
            clock,
            validity,
            cache: None,
        }
    }

    /// Sorted, deduplicated gateway addresses. Empty on failure.
    pub async fn discover(&mut self, force_refresh: bool) -> Vec<String> {
        self.discover_gateways(force_refresh)
            .await
            .into_iter()
            .map(|gateway| gateway.address)
            .collect()
    }

    pub async fn discover_gateways(&mut self, force_refresh: bool) -> Vec<Gateway> {
        if !force_refresh {
            if let Some(cached) = self.fresh_cache() {
                debug!("Serving {} cached gateway(s)", cached.len());
                return cached;
            }
        }

        let gateways = match self.route_table.dump().await {
            Some(output) => parse_gateways(&output),
            None => Vec::new(),
        };

        info!(
            "Discovered {} gateway(s): {:?}",
            gateways.len(),
            gateways.iter().map(|g| g.address.as_str()).collect::<Vec<_>>()
        );

        self.cache = Some(CachedLookup {
            gateways: gateways.clone(),
            fetched_at: self.clock.now(),
        });
        gateways
    }

    /// Hosts for the discovered gateways, labelled `Gateway` or `Gateway N`.
    pub async fn discover_hosts(&mut self, force_refresh: bool) -> Vec<Host> {
        let gateways = self.discover_gateways(force_refresh).await;
        let numbered = gateways.len() > 1;

        gateways
            .into_iter()
            .enumerate()
            .map(|(index, gateway)| {
                let label = if numbered {
                    format!("Gateway {}", index + 1)
                } else {
                    "Gateway".to_string()
                };
                Host::new(gateway.address, label, false).with_interface(gateway.interface)
            })
            .collect()
    }

    pub fn clear_cache(&mut self) {
        self.cache = None;
    }

    fn fresh_cache(&self) -> Option<Vec<Gateway>> {
        let cached = self.cache.as_ref()?;
        if cached.gateways.is_empty() {
            return None;
        }

        let age = (self.clock.now() - cached.fetched_at).to_std().ok()?;
        (age < self.validity).then(|| cached.gateways.clone())
    }
}

/// Extracts default gateways from `netstat -rn` output.
///
/// ```text
/// default            192.168.1.1        UGScg          en0
/// default            fe80::1%en0        UGcIg          en0
/// ```
pub fn parse_gateways(output: &str) -> Vec<Gateway> {
    let mut gateways: BTreeMap<String, Option<String>> = BTreeMap::new();

    for line in output.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 2 || tokens[0] != "default" {
            continue;
        }

        let address = tokens[1];
        if !is_valid_gateway(address) {
            continue;
        }

        // Netif is the last non-numeric column; Refs/Use/Expire are numeric.
        let interface = tokens
            .iter()
            .skip(3)
            .rev()
            .find(|token| !token.chars().all(|c| c.is_ascii_digit()))
            .map(|token| token.to_string());

        gateways.entry(address.to_string()).or_insert(interface);
    }

    gateways
        .into_iter()
        .map(|(address, interface)| Gateway { address, interface })
        .collect()
}

pub fn is_valid_gateway(address: &str) -> bool {
    if address.starts_with("127.") || address == "::1" {
        return false;
    }
    if address.to_lowercase().starts_with("fe80::") {
        return false;
    }
    if address.starts_with("link#") {
        return false;
    }
    address.contains('.') || address.contains(':')
}
