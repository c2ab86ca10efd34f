use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Polling cadence used when no configuration is available
pub const DEFAULT_UPDATE_MINUTES: u64 = 5;

/// One tracked dynamic-DNS-to-firewall binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Informational identifier (typically the operator's mail address); never used in logic
    pub label: String,

    /// Dynamic DNS name resolved each cycle
    pub hostname: String,

    /// Last IPv4 address known to be allowed in the firewall
    #[serde(rename = "ip", with = "optional_ipv4")]
    pub current_ip: Option<Ipv4Addr>,

    /// `false` marks the endpoint for decommissioning on the next cycle
    #[serde(rename = "status", with = "status_flag")]
    pub active: bool,

    /// When `current_ip` last changed
    pub last_update: DateTime<Utc>,
}

/// The whole tracked set, loaded fresh from disk every cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSet {
    /// Polling cadence in minutes, shared by all endpoints
    #[serde(rename = "update")]
    pub update_minutes: u64,

    /// Endpoints in operator-defined order
    #[serde(rename = "list")]
    pub endpoints: Vec<Endpoint>,
}

impl EndpointSet {
    pub fn empty() -> Self {
        Self {
            update_minutes: DEFAULT_UPDATE_MINUTES,
            endpoints: Vec::new(),
        }
    }

    /// Starter configuration written on first launch
    pub fn starter() -> Self {
        let sample = |label: &str, hostname: &str, ip: Ipv4Addr| Endpoint {
            label: label.to_string(),
            hostname: hostname.to_string(),
            current_ip: Some(ip),
            active: true,
            last_update: Utc::now(),
        };

        Self {
            update_minutes: DEFAULT_UPDATE_MINUTES,
            endpoints: vec![
                sample(
                    "operator@example.com",
                    "my-host.duckdns.org",
                    Ipv4Addr::new(127, 0, 0, 1),
                ),
                sample(
                    "operator2@example.com",
                    "my-host2.duckdns.org",
                    Ipv4Addr::new(127, 0, 0, 2),
                ),
            ],
        }
    }
}

/// The status flag is persisted as an integer: 0 = pending deletion, anything else = active
mod status_flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(active: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*active))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(i64::deserialize(deserializer)? != 0)
    }
}

/// An unset IP is persisted as the empty string
mod optional_ipv4 {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::net::Ipv4Addr;

    pub fn serialize<S: Serializer>(
        ip: &Option<Ipv4Addr>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match ip {
            Some(ip) => serializer.collect_str(ip),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Ipv4Addr>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse()
            .map(Some)
            .map_err(|e| D::Error::custom(format!("Invalid IPv4 address '{raw}': {e}")))
    }
}
