//! Listen-address resolution.
//!
//! # Responsibilities
//! - Split a listen target into host and port
//! - Fill in the default service port when none is given
//! - Resolve names into an ordered, de-duplicated [`AddressSet`]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use futures_util::future::BoxFuture;

/// Service used when a listen target carries no port.
pub const DEFAULT_SERVICE: &str = "https";

/// Error type for address resolution.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("invalid listen address {0:?}")]
    InvalidAddress(String),

    #[error("unknown service {0:?}")]
    UnknownService(String),

    #[error("lookup failed: {0}")]
    Lookup(#[from] std::io::Error),

    #[error("{0:?} resolved to no addresses")]
    Empty(String),
}

/// Resolved socket addresses for one listen target, in resolver order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressSet {
    addrs: Vec<SocketAddr>,
}

impl AddressSet {
    /// Build a set, dropping duplicates while keeping first-seen order.
    pub fn new(addrs: impl IntoIterator<Item = SocketAddr>) -> Self {
        let mut unique: Vec<SocketAddr> = Vec::new();
        for addr in addrs {
            if !unique.contains(&addr) {
                unique.push(addr);
            }
        }
        Self { addrs: unique }
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }
}

impl IntoIterator for AddressSet {
    type Item = SocketAddr;
    type IntoIter = std::vec::IntoIter<SocketAddr>;

    fn into_iter(self) -> Self::IntoIter {
        self.addrs.into_iter()
    }
}

/// Resolves listen targets. Runs once per port at setup, never per connection.
pub trait Resolver: Send + Sync + 'static {
    fn resolve<'a>(
        &'a self,
        target: &'a str,
        default_service: &'a str,
    ) -> BoxFuture<'a, Result<AddressSet, ResolveError>>;
}

/// Resolver backed by the system's name lookup.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve<'a>(
        &'a self,
        target: &'a str,
        default_service: &'a str,
    ) -> BoxFuture<'a, Result<AddressSet, ResolveError>> {
        Box::pin(async move {
            let (host, port) = split_host_port(target)?;
            let port = match port {
                Some(port) if port.bytes().all(|b| b.is_ascii_digit()) => port
                    .parse::<u16>()
                    .map_err(|_| ResolveError::InvalidAddress(target.to_string()))?,
                Some(service) => service_port(service)?,
                None => service_port(default_service)?,
            };

            let set = if host.is_empty() {
                AddressSet::new([SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)])
            } else if let Ok(ip) = host.parse::<IpAddr>() {
                AddressSet::new([SocketAddr::new(ip, port)])
            } else {
                AddressSet::new(tokio::net::lookup_host((host, port)).await?)
            };

            if set.is_empty() {
                return Err(ResolveError::Empty(target.to_string()));
            }
            tracing::debug!(address = %target, resolved = ?set, "Listen address resolved");
            Ok(set)
        })
    }
}

/// Split `host:port`, `[v6]:port`, `[v6]`, bare `v6` or bare `host`.
pub fn split_host_port(target: &str) -> Result<(&str, Option<&str>), ResolveError> {
    let invalid = || ResolveError::InvalidAddress(target.to_string());
    let target_trimmed = target.trim();
    if target_trimmed.is_empty() {
        return Err(invalid());
    }

    if let Some(rest) = target_trimmed.strip_prefix('[') {
        let (host, after) = rest.split_once(']').ok_or_else(invalid)?;
        return match after {
            "" => Ok((host, None)),
            _ => match after.strip_prefix(':') {
                Some(port) if !port.is_empty() => Ok((host, Some(port))),
                _ => Err(invalid()),
            },
        };
    }

    match target_trimmed.matches(':').count() {
        0 => Ok((target_trimmed, None)),
        1 => {
            let (host, port) = target_trimmed.rsplit_once(':').ok_or_else(invalid)?;
            if port.is_empty() {
                return Err(invalid());
            }
            Ok((host, Some(port)))
        }
        _ => Ok((target_trimmed, None)),
    }
}

fn service_port(service: &str) -> Result<u16, ResolveError> {
    match service {
        "https" => Ok(443),
        "http" => Ok(80),
        other => other
            .parse()
            .map_err(|_| ResolveError::UnknownService(other.to_string())),
    }
}
