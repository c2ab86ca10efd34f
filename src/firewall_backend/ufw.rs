use crate::firewall_backend::FirewallBackend;
use anyhow::bail;
use std::future::Future;
use std::net::Ipv4Addr;
use std::pin::Pin;

const UFW: &str = "/usr/sbin/ufw";

pub struct UfwFirewallBackend {
    service_port: u16,
}

impl UfwFirewallBackend {
    pub fn new(service_port: u16) -> anyhow::Result<Self> {
        log::info!("Using ufw backend, service port {}", service_port);

        // Probe once at startup so a missing or broken ufw aborts early
        // instead of failing every cycle
        Self::run_process_sync(UFW, &["status"])?;

        Ok(Self { service_port })
    }

    fn run_process_sync(program: &str, args: &[&str]) -> anyhow::Result<()> {
        Self::handle_process_output(
            program,
            args,
            std::process::Command::new(program).args(args).output(),
        )
        .map(|_| ())
    }

    async fn run_process_async(program: &str, args: &[&str]) -> Result<Vec<u8>, ()> {
        Self::handle_process_output(
            program,
            args,
            tokio::process::Command::new(program)
                .args(args)
                .output()
                .await,
        )
        .map_err(|_| ())
    }

    fn handle_process_output(
        program: &str,
        args: &[&str],
        output: std::io::Result<std::process::Output>,
    ) -> anyhow::Result<Vec<u8>> {
        match output {
            Ok(output) => {
                if output.status.success() {
                    return Ok(output.stdout);
                } else {
                    log::error!(
                        "'{} {}' failed: [{}] {}",
                        program,
                        args.join(" "),
                        output.status,
                        String::from_utf8_lossy(&output.stderr).trim_end()
                    );
                }
            }
            Err(e) => {
                log::error!("Failed to start {}: {}", program, e);
            }
        }

        bail!("Failed to run {}", program);
    }
}

impl FirewallBackend for UfwFirewallBackend {
    fn allow(&self, ip: Ipv4Addr) -> Pin<Box<dyn Future<Output = Result<(), ()>> + Send + '_>> {
        Box::pin(async move {
            Self::run_process_async(
                UFW,
                &[
                    "allow",
                    "from",
                    &ip.to_string(),
                    "to",
                    "any",
                    "port",
                    &self.service_port.to_string(),
                    "proto",
                    "tcp",
                ],
            )
            .await
            .map(|_| ())
        })
    }

    fn revoke(&self, ip: Ipv4Addr) -> Pin<Box<dyn Future<Output = Result<(), ()>> + Send + '_>> {
        Box::pin(async move {
            // `ufw show added` prints one `ufw allow ...` command per active
            // rule; delete every rule mentioning this source address.
            let listing = Self::run_process_async(UFW, &["show", "added"]).await?;
            let listing = String::from_utf8_lossy(&listing);

            let needle = format!("from {ip} ");
            let mut failed = false;

            for line in listing.lines() {
                let Some(rule) = line.trim().strip_prefix("ufw ") else {
                    continue;
                };
                if !rule.contains(&needle) {
                    continue;
                }

                let mut args = vec!["delete"];
                args.extend(rule.split_whitespace());
                if Self::run_process_async(UFW, &args).await.is_err() {
                    failed = true;
                }
            }

            if failed {
                Err(())
            } else {
                Ok(())
            }
        })
    }
}
