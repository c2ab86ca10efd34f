use crate::endpoint::{Endpoint, EndpointSet};
use crate::firewall_backend::FirewallBackend;
use crate::resolver::HostResolver;
use chrono::Utc;
use std::net::IpAddr;

/// Decides, per endpoint, whether firewall rules must be swapped, added or
/// revoked, executes those calls, and assembles the set to persist.
pub struct Reconciler {
    resolver: Box<dyn HostResolver>,
    firewall: Box<dyn FirewallBackend>,
}

/// Result of one reconciliation pass. `changed` signals that the set differs
/// from what was loaded and needs to be written back.
pub struct ReconcileOutcome {
    pub set: EndpointSet,
    pub changed: bool,
}

impl Reconciler {
    pub fn new(resolver: Box<dyn HostResolver>, firewall: Box<dyn FirewallBackend>) -> Self {
        Self { resolver, firewall }
    }

    pub async fn reconcile(&self, set: EndpointSet) -> ReconcileOutcome {
        let mut changed = false;
        let mut surviving = Vec::with_capacity(set.endpoints.len());

        for mut endpoint in set.endpoints {
            if !endpoint.active {
                self.decommission(&endpoint).await;
                changed = true;
                continue;
            }

            changed |= self.refresh(&mut endpoint).await;
            surviving.push(endpoint);
        }

        ReconcileOutcome {
            set: EndpointSet {
                update_minutes: set.update_minutes,
                endpoints: surviving,
            },
            changed,
        }
    }

    /// Removes the endpoint's firewall rule and drops it from tracking.
    ///
    /// Removal is terminal: the endpoint is gone from the persisted set even
    /// when the revoke fails, so a stale rule left behind by a failed revoke
    /// shows up in the logs only and is never retried.
    async fn decommission(&self, endpoint: &Endpoint) {
        if let Some(ip) = endpoint.current_ip {
            if self.firewall.revoke(ip).await.is_err() {
                log::warn!(
                    "Failed to remove firewall rule for '{}' ({}); the rule must be cleaned up manually",
                    endpoint.hostname,
                    ip
                );
            }
        }

        log::info!(
            "Endpoint '{}' ({}) removed from tracking",
            endpoint.label,
            endpoint.hostname
        );
    }

    /// Resolves the endpoint's hostname and swaps firewall rules on drift.
    /// Returns whether the endpoint mutated.
    async fn refresh(&self, endpoint: &mut Endpoint) -> bool {
        let addresses = match self.resolver.resolve(&endpoint.hostname).await {
            Ok(addresses) => addresses,
            Err(e) => {
                log::info!(
                    "Lookup of '{}' failed, retrying next cycle: {}",
                    endpoint.hostname,
                    e
                );
                return false;
            }
        };

        let mut changed = false;

        // Every differing IPv4 address triggers its own revoke/allow pair,
        // so with multiple A records the last one wins. Under DNS
        // round-robin this oscillates between records across cycles; a
        // known consequence of tracking a single address per endpoint.
        for address in addresses {
            let IpAddr::V4(address) = address else {
                continue;
            };

            if endpoint.current_ip == Some(address) {
                continue;
            }

            if let Some(previous) = endpoint.current_ip {
                if self.firewall.revoke(previous).await.is_err() {
                    log::warn!(
                        "Failed to remove firewall rule for '{}' ({})",
                        endpoint.hostname,
                        previous
                    );
                }
            }

            if self.firewall.allow(address).await.is_err() {
                log::warn!(
                    "Failed to add firewall rule for '{}' ({})",
                    endpoint.hostname,
                    address
                );
            }

            log::info!("'{}' now points to {}", endpoint.hostname, address);
            endpoint.current_ip = Some(address);
            endpoint.last_update = Utc::now();
            changed = true;
        }

        changed
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use std::collections::HashMap;
    use std::future::Future;
    use std::net::Ipv4Addr;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};

    /// Lookup table resolver: hostnames mapped to `None` fail, everything
    /// not in the table resolves to nothing.
    struct TableResolver {
        table: HashMap<String, Option<Vec<IpAddr>>>,
    }

    impl HostResolver for TableResolver {
        fn resolve<'a>(
            &'a self,
            hostname: &'a str,
        ) -> Pin<Box<dyn Future<Output = std::io::Result<Vec<IpAddr>>> + Send + 'a>> {
            let result = match self.table.get(hostname) {
                Some(Some(addresses)) => Ok(addresses.clone()),
                Some(None) => Err(std::io::Error::other("lookup failed")),
                None => Ok(Vec::new()),
            };
            Box::pin(async move { result })
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum FirewallCall {
        Allow(Ipv4Addr),
        Revoke(Ipv4Addr),
    }

    #[derive(Default)]
    struct RecordingFirewall {
        calls: Arc<Mutex<Vec<FirewallCall>>>,
        fail: bool,
    }

    impl RecordingFirewall {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn record(&self, call: FirewallCall) -> Result<(), ()> {
            self.calls.lock().unwrap().push(call);
            if self.fail {
                Err(())
            } else {
                Ok(())
            }
        }
    }

    impl FirewallBackend for RecordingFirewall {
        fn allow(&self, ip: Ipv4Addr) -> Pin<Box<dyn Future<Output = Result<(), ()>> + Send + '_>> {
            let result = self.record(FirewallCall::Allow(ip));
            Box::pin(async move { result })
        }

        fn revoke(
            &self,
            ip: Ipv4Addr,
        ) -> Pin<Box<dyn Future<Output = Result<(), ()>> + Send + '_>> {
            let result = self.record(FirewallCall::Revoke(ip));
            Box::pin(async move { result })
        }
    }

    fn ipv4(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    fn old_timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
    }

    fn endpoint(hostname: &str, current_ip: Option<&str>, active: bool) -> Endpoint {
        Endpoint {
            label: format!("{hostname}@example.com"),
            hostname: hostname.to_string(),
            current_ip: current_ip.map(ipv4),
            active,
            last_update: old_timestamp(),
        }
    }

    fn set(endpoints: Vec<Endpoint>) -> EndpointSet {
        EndpointSet {
            update_minutes: 5,
            endpoints,
        }
    }

    fn reconciler(
        table: &[(&str, Option<&[&str]>)],
        firewall: RecordingFirewall,
    ) -> (Reconciler, Arc<Mutex<Vec<FirewallCall>>>) {
        let table = table
            .iter()
            .map(|(hostname, addresses)| {
                (
                    hostname.to_string(),
                    addresses.map(|addresses| {
                        addresses
                            .iter()
                            .map(|a| a.parse::<IpAddr>().unwrap())
                            .collect()
                    }),
                )
            })
            .collect();

        let calls = firewall.calls.clone();
        (
            Reconciler::new(Box::new(TableResolver { table }), Box::new(firewall)),
            calls,
        )
    }

    #[tokio::test]
    async fn drift_revokes_old_rule_before_allowing_new_one() {
        let (reconciler, calls) = reconciler(
            &[("h", Some(&["2.2.2.2"]))],
            RecordingFirewall::default(),
        );

        let outcome = reconciler
            .reconcile(set(vec![endpoint("h", Some("1.1.1.1"), true)]))
            .await;

        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                FirewallCall::Revoke(ipv4("1.1.1.1")),
                FirewallCall::Allow(ipv4("2.2.2.2")),
            ]
        );
        assert!(outcome.changed);
        let endpoint = &outcome.set.endpoints[0];
        assert_eq!(endpoint.current_ip, Some(ipv4("2.2.2.2")));
        assert!(endpoint.last_update > old_timestamp());
    }

    #[tokio::test]
    async fn settled_endpoint_triggers_no_calls() {
        let (reconciler, calls) = reconciler(
            &[("h", Some(&["2.2.2.2"]))],
            RecordingFirewall::default(),
        );

        let input = set(vec![endpoint("h", Some("2.2.2.2"), true)]);
        let outcome = reconciler.reconcile(input.clone()).await;

        assert!(calls.lock().unwrap().is_empty());
        assert!(!outcome.changed);
        assert_eq!(outcome.set, input);
    }

    #[tokio::test]
    async fn second_pass_is_idempotent() {
        let (reconciler, _) = reconciler(
            &[("h", Some(&["2.2.2.2"]))],
            RecordingFirewall::default(),
        );

        let first = reconciler
            .reconcile(set(vec![endpoint("h", Some("1.1.1.1"), true)]))
            .await;
        assert!(first.changed);

        let second = reconciler.reconcile(first.set.clone()).await;
        assert!(!second.changed);
        assert_eq!(second.set, first.set);
    }

    #[tokio::test]
    async fn initial_assignment_skips_the_revoke() {
        let (reconciler, calls) = reconciler(
            &[("h", Some(&["2.2.2.2"]))],
            RecordingFirewall::default(),
        );

        let outcome = reconciler
            .reconcile(set(vec![endpoint("h", None, true)]))
            .await;

        assert_eq!(
            *calls.lock().unwrap(),
            vec![FirewallCall::Allow(ipv4("2.2.2.2"))]
        );
        assert!(outcome.changed);
        assert_eq!(outcome.set.endpoints[0].current_ip, Some(ipv4("2.2.2.2")));
    }

    #[tokio::test]
    async fn inactive_endpoint_is_revoked_and_dropped() {
        let (reconciler, calls) = reconciler(&[], RecordingFirewall::default());

        let outcome = reconciler
            .reconcile(set(vec![endpoint("h", Some("3.3.3.3"), false)]))
            .await;

        assert_eq!(
            *calls.lock().unwrap(),
            vec![FirewallCall::Revoke(ipv4("3.3.3.3"))]
        );
        assert!(outcome.changed);
        assert!(outcome.set.endpoints.is_empty());
    }

    #[tokio::test]
    async fn inactive_endpoint_is_dropped_even_when_revoke_fails() {
        let (reconciler, calls) = reconciler(&[], RecordingFirewall::failing());

        let outcome = reconciler
            .reconcile(set(vec![endpoint("h", Some("3.3.3.3"), false)]))
            .await;

        assert_eq!(
            *calls.lock().unwrap(),
            vec![FirewallCall::Revoke(ipv4("3.3.3.3"))]
        );
        assert!(outcome.changed);
        assert!(outcome.set.endpoints.is_empty());
    }

    #[tokio::test]
    async fn inactive_endpoint_without_ip_is_dropped_without_calls() {
        let (reconciler, calls) = reconciler(&[], RecordingFirewall::default());

        let outcome = reconciler
            .reconcile(set(vec![endpoint("h", None, false)]))
            .await;

        assert!(calls.lock().unwrap().is_empty());
        assert!(outcome.changed);
        assert!(outcome.set.endpoints.is_empty());
    }

    #[tokio::test]
    async fn lookup_failure_leaves_endpoint_untouched() {
        let (reconciler, calls) = reconciler(&[("h", None)], RecordingFirewall::default());

        let input = set(vec![endpoint("h", Some("1.1.1.1"), true)]);
        let outcome = reconciler.reconcile(input.clone()).await;

        assert!(calls.lock().unwrap().is_empty());
        assert!(!outcome.changed);
        assert_eq!(outcome.set, input);
    }

    #[tokio::test]
    async fn empty_lookup_leaves_endpoint_untouched() {
        let (reconciler, calls) = reconciler(&[], RecordingFirewall::default());

        let input = set(vec![endpoint("h", Some("1.1.1.1"), true)]);
        let outcome = reconciler.reconcile(input.clone()).await;

        assert!(calls.lock().unwrap().is_empty());
        assert!(!outcome.changed);
        assert_eq!(outcome.set, input);
    }

    #[tokio::test]
    async fn ipv6_only_response_is_ignored() {
        let (reconciler, calls) = reconciler(
            &[("h", Some(&["2001:db8::1", "::1"]))],
            RecordingFirewall::default(),
        );

        let input = set(vec![endpoint("h", Some("1.1.1.1"), true)]);
        let outcome = reconciler.reconcile(input.clone()).await;

        assert!(calls.lock().unwrap().is_empty());
        assert!(!outcome.changed);
        assert_eq!(outcome.set, input);
    }

    #[tokio::test]
    async fn multiple_a_records_apply_last_write_wins() {
        let (reconciler, calls) = reconciler(
            &[("h", Some(&["2.2.2.2", "3.3.3.3"]))],
            RecordingFirewall::default(),
        );

        let outcome = reconciler
            .reconcile(set(vec![endpoint("h", Some("1.1.1.1"), true)]))
            .await;

        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                FirewallCall::Revoke(ipv4("1.1.1.1")),
                FirewallCall::Allow(ipv4("2.2.2.2")),
                FirewallCall::Revoke(ipv4("2.2.2.2")),
                FirewallCall::Allow(ipv4("3.3.3.3")),
            ]
        );
        assert_eq!(outcome.set.endpoints[0].current_ip, Some(ipv4("3.3.3.3")));
    }

    #[tokio::test]
    async fn firewall_failure_does_not_block_state_update() {
        let (reconciler, _) = reconciler(
            &[("h", Some(&["2.2.2.2"]))],
            RecordingFirewall::failing(),
        );

        let outcome = reconciler
            .reconcile(set(vec![endpoint("h", Some("1.1.1.1"), true)]))
            .await;

        assert!(outcome.changed);
        assert_eq!(outcome.set.endpoints[0].current_ip, Some(ipv4("2.2.2.2")));
    }

    #[tokio::test]
    async fn surviving_endpoints_keep_their_relative_order() {
        let (reconciler, _) = reconciler(
            &[("a", Some(&["1.1.1.1"])), ("c", Some(&["3.3.3.3"]))],
            RecordingFirewall::default(),
        );

        let outcome = reconciler
            .reconcile(set(vec![
                endpoint("a", Some("1.1.1.1"), true),
                endpoint("b", Some("2.2.2.2"), false),
                endpoint("c", Some("3.3.3.3"), true),
            ]))
            .await;

        let hostnames: Vec<_> = outcome
            .set
            .endpoints
            .iter()
            .map(|e| e.hostname.as_str())
            .collect();
        assert_eq!(hostnames, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn interval_is_carried_through() {
        let (reconciler, _) = reconciler(&[], RecordingFirewall::default());

        let outcome = reconciler
            .reconcile(EndpointSet {
                update_minutes: 42,
                endpoints: Vec::new(),
            })
            .await;

        assert_eq!(outcome.set.update_minutes, 42);
        assert!(!outcome.changed);
    }
}
