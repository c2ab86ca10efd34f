use std::future::Future;
use std::io;
use std::net::IpAddr;
use std::pin::Pin;

/// Hostname lookup as seen by the reconciler: a plain, stateless query that
/// may yield zero or more addresses of either family.
pub trait HostResolver: Send + Sync {
    fn resolve<'a>(
        &'a self,
        hostname: &'a str,
    ) -> Pin<Box<dyn Future<Output = io::Result<Vec<IpAddr>>> + Send + 'a>>;
}

/// Resolver backed by the operating system (via `tokio::net::lookup_host`)
pub struct SystemResolver {
    _priv: (),
}

impl SystemResolver {
    pub fn new() -> Self {
        Self { _priv: () }
    }
}

impl HostResolver for SystemResolver {
    fn resolve<'a>(
        &'a self,
        hostname: &'a str,
    ) -> Pin<Box<dyn Future<Output = io::Result<Vec<IpAddr>>> + Send + 'a>> {
        Box::pin(async move {
            // The port is required by the socket-address API but irrelevant here
            let addresses = tokio::net::lookup_host((hostname, 0u16)).await?;
            Ok(addresses.map(|socket_address| socket_address.ip()).collect())
        })
    }
}
