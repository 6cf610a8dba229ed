//! Optional explicit-DNS-server / IPv4-preferring resolver.
//!
//! Grounded in the original's `pycurl.DNS_SERVERS` option ("Needs c-ares").
//! `hickory-resolver` is the async resolver the pack already reaches for
//! this job (`yonasBSD-freebsd-rustdate` pulls it in for exactly this
//! kind of lookup).

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::str::FromStr;

use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};

/// Resolves names against an explicit nameserver and sorts IPv4 addresses
/// first, matching the fetch worker's "prefer IPv4" per-request option.
#[derive(Clone)]
pub struct AresResolver {
    inner: TokioAsyncResolver,
}

impl AresResolver {
    pub fn new(nsserver: &str) -> Option<Self> {
        let ip = IpAddr::from_str(nsserver).ok()?;
        let group = NameServerConfigGroup::from_ips_clear(&[ip], 53, true);
        let config = ResolverConfig::from_parts(None, vec![], group);
        let resolver = TokioAsyncResolver::tokio(config, ResolverOpts::default());
        Some(Self { inner: resolver })
    }
}

impl Resolve for AresResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let resolver = self.inner.clone();
        Box::pin(async move {
            let lookup = resolver.lookup_ip(name.as_str()).await?;
            let mut addrs: Vec<SocketAddr> =
                lookup.iter().map(|ip| SocketAddr::new(ip, 0)).collect();
            prefer_ipv4(&mut addrs);
            Ok(Box::new(addrs.into_iter()) as Addrs)
        }) as Pin<Box<dyn Future<Output = _> + Send>>
    }
}

pub fn prefer_ipv4(addrs: &mut [SocketAddr]) {
    addrs.sort_by_key(|a| !a.is_ipv4());
}
