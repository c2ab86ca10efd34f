pub mod noop;
pub mod ufw;

use std::future::Future;
use std::net::Ipv4Addr;
use std::pin::Pin;

/// External capability controlling actual firewall rule presence.
///
/// Both operations are independently fallible; implementations log their own
/// diagnostics and report failure through the unit error so callers can
/// decide whether the cycle needs to care.
pub trait FirewallBackend: Send + Sync {
    /// Allow inbound traffic from `ip` on the configured service port
    fn allow(&self, ip: Ipv4Addr) -> Pin<Box<dyn Future<Output = Result<(), ()>> + Send + '_>>;

    /// Remove any existing allow rule matching `ip`
    fn revoke(&self, ip: Ipv4Addr) -> Pin<Box<dyn Future<Output = Result<(), ()>> + Send + '_>>;
}
