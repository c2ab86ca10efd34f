use clap::{Args, Parser, ValueEnum};

#[derive(Debug, Parser)]
#[clap(name = "ddns-allowlist")]
pub struct ProgramConfig {
    /// Firewall backend
    #[clap(flatten)]
    pub firewall: FirewallConfig,
}

#[derive(Debug, Args)]
pub struct FirewallConfig {
    /// Firewall backend
    #[clap(long = "firewall", env = "FIREWALL", value_enum, ignore_case = true)]
    pub backend: FirewallKind,

    /// Service port allow rules are created for (ufw backend only)
    #[clap(long, env, default_value = "22")]
    pub service_port: u16,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
#[allow(non_camel_case_types)]
pub enum FirewallKind {
    none,
    ufw,
}

impl ProgramConfig {
    pub fn parse() -> Self {
        Parser::parse()
    }
}
