use crate::firewall_backend::FirewallBackend;
use std::future::Future;
use std::net::Ipv4Addr;
use std::pin::Pin;

pub struct NoopFirewallBackend {
    _priv: (),
}

impl NoopFirewallBackend {
    pub fn new() -> Self {
        log::info!("Firewall backend is disabled");
        Self { _priv: () }
    }
}

impl FirewallBackend for NoopFirewallBackend {
    fn allow(&self, ip: Ipv4Addr) -> Pin<Box<dyn Future<Output = Result<(), ()>> + Send + '_>> {
        log::debug!("Skipping allow rule for {} (no firewall)", ip);
        Box::pin(async { Ok(()) })
    }

    fn revoke(&self, ip: Ipv4Addr) -> Pin<Box<dyn Future<Output = Result<(), ()>> + Send + '_>> {
        log::debug!("Skipping revoke of {} (no firewall)", ip);
        Box::pin(async { Ok(()) })
    }
}
