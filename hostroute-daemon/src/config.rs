//
// Copyright (c) The Route Control Plane Contributors
//
// SPDX-License-Identifier: MIT
//

#![allow(clippy::derivable_impls)]

use std::net::IpAddr;
use std::path::PathBuf;

use hostroute_bgp::{PeerConfig, RouterConfig};
use serde::Deserialize;

use crate::template;

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub router_id: String,
    pub asn: u32,
    pub peers: Vec<String>,
    pub networks: Vec<String>,
    pub default_route: Option<String>,
    pub proc_root: String,
    pub text_logs: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            router_id: "{{ GetPrivateIP }}".to_owned(),
            asn: 65123,
            peers: Vec::new(),
            networks: vec!["weave".to_owned()],
            default_route: None,
            proc_root: "/proc".to_owned(),
            text_logs: false,
        }
    }
}

/// Fully resolved, ready-to-run configuration: every address template has
/// already been turned into a concrete [`IpAddr`].
#[derive(Debug)]
pub struct Resolved {
    pub router_config: RouterConfig,
    pub peers: Vec<PeerConfig>,
    pub watched_networks: Vec<String>,
    pub default_gateway: Option<IpAddr>,
    pub proc_root: PathBuf,
    pub text_logs: bool,
}

#[derive(Debug)]
pub enum Error {
    Template(template::Error),
    RouterIdNotIpv4(IpAddr),
    InvalidPeerAddress(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Template(error) => write!(f, "{error}"),
            Error::RouterIdNotIpv4(addr) => {
                write!(f, "router-id must resolve to an IPv4 address, got {addr}")
            }
            Error::InvalidPeerAddress(raw) => write!(f, "invalid peer address: {raw:?}"),
        }
    }
}

impl std::error::Error for Error {}

// ===== impl Config =====

impl Config {
    const DFLT_FILEPATH: &'static str = "/etc/hostroute.toml";

    /// Loads the base configuration from `config_file` (or the default
    /// path if the flag was never given one and it happens to exist), then
    /// lets `matches` override individual fields. CLI flags always win
    /// over the file, and the file always wins over the built-in
    /// defaults.
    pub fn load(config_file: Option<&str>, matches: &clap::ArgMatches<'_>) -> Config {
        let mut config = match config_file {
            Some(path) => Config::from_file(path),
            None => match std::fs::metadata(Config::DFLT_FILEPATH) {
                Ok(_) => Config::from_file(Config::DFLT_FILEPATH),
                Err(_) => Config::default(),
            },
        };

        if let Some(v) = matches.value_of("router-id") {
            config.router_id = v.to_owned();
        }
        if let Some(v) = matches.value_of("asn") {
            if let Ok(asn) = v.parse() {
                config.asn = asn;
            }
        }
        if let Some(v) = matches.value_of("peer") {
            config.peers = split_csv(v);
        }
        if let Some(v) = matches.value_of("network") {
            config.networks = split_csv(v);
        }
        if let Some(v) = matches.value_of("default-route") {
            config.default_route = Some(v.to_owned());
        }
        if let Some(v) = matches.value_of("proc-root") {
            config.proc_root = v.to_owned();
        }
        if matches.is_present("text") {
            config.text_logs = true;
        }

        config
    }

    fn from_file(path: &str) -> Config {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|error| {
                eprintln!("failed to parse configuration file {path}: {error}");
                Config::default()
            }),
            Err(error) => {
                eprintln!("failed to read configuration file {path}: {error}");
                Config::default()
            }
        }
    }

    /// Resolves every address template and validates peer addresses,
    /// producing the [`Resolved`] configuration the supervisor runs with.
    pub async fn resolve(&self) -> Result<Resolved, Error> {
        let router_id = match template::resolve(&self.router_id)
            .await
            .map_err(Error::Template)?
        {
            IpAddr::V4(addr) => addr,
            other => return Err(Error::RouterIdNotIpv4(other)),
        };

        let mut peers = Vec::with_capacity(self.peers.len());
        for raw in &self.peers {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let addr: IpAddr = raw
                .parse()
                .map_err(|_| Error::InvalidPeerAddress(raw.to_owned()))?;
            peers.push(PeerConfig::new(addr, self.asn));
        }

        let default_gateway = match &self.default_route {
            Some(raw) => Some(template::resolve(raw).await.map_err(Error::Template)?),
            None => None,
        };

        Ok(Resolved {
            router_config: RouterConfig {
                router_id,
                asn: self.asn,
                ipv6_next_hop: None,
            },
            peers,
            watched_networks: self.networks.clone(),
            default_gateway,
            proc_root: PathBuf::from(&self.proc_root),
            text_logs: self.text_logs,
        })
    }
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_csv_trims_and_drops_empties() {
        assert_eq!(
            split_csv(" weave, bridge ,, infra"),
            vec!["weave", "bridge", "infra"]
        );
    }

    #[tokio::test]
    async fn resolve_rejects_garbage_peer_addresses() {
        let config = Config {
            peers: vec!["not-an-address".to_owned()],
            ..Config::default()
        };
        let result = config.resolve().await;
        assert!(matches!(result, Err(Error::InvalidPeerAddress(_))));
    }
}
