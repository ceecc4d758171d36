//! Configuration: a YAML file describing the zones this server is
//! authoritative for, the TSIG keys it shares, its EDNS template, and
//! its rate limits.  Zone contents are structured records here, not
//! zone-file text - parsing the RFC 1035 master format is a job for
//! other tooling.

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use base64::Engine;
use config::{Config, ConfigError, File};
use serde::Deserialize;

use dns_auth::acl::{Acl, AclEntry};
use dns_auth::context::{ChaosIdentity, OptTemplate, ServerContext, ZonePolicy};
use dns_auth::rrl::{RateLimiter, RrlConfig};
use dns_auth::tsig::{TsigAlgorithm, TsigKey, TsigKeyring};
use dns_types::protocol::types::*;
use dns_types::zones::types::*;

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub interface: Option<IpAddr>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub server_version: Option<String>,
    #[serde(default)]
    pub server_id: Option<String>,
    #[serde(default)]
    pub max_payload: Option<u16>,
    #[serde(default)]
    pub nsid: Option<String>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitSettings>,
    #[serde(default)]
    pub journal_depth: Option<usize>,
    #[serde(default)]
    pub keys: Vec<KeySettings>,
    #[serde(default)]
    pub zones: Vec<ZoneSettings>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RateLimitSettings {
    pub rate: u32,
    #[serde(default)]
    pub slip: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KeySettings {
    pub name: String,
    pub algorithm: String,
    /// base64, like every other nameserver's key files
    pub secret: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ZoneSettings {
    pub apex: String,
    #[serde(default)]
    pub ttl_policy: TtlPolicySettings,
    #[serde(default = "default_record_ttl")]
    pub default_ttl: u32,
    #[serde(default)]
    pub records: Vec<RecordSettings>,
    /// Absent means queries are open; present means the list is
    /// consulted.
    #[serde(default)]
    pub allow_query: Option<Vec<AclEntrySettings>>,
    #[serde(default)]
    pub allow_transfer: Vec<AclEntrySettings>,
    #[serde(default)]
    pub allow_update: Vec<AclEntrySettings>,
    #[serde(default)]
    pub allow_notify: Vec<AclEntrySettings>,
    #[serde(default)]
    pub notify: Vec<SocketAddr>,
}

fn default_record_ttl() -> u32 {
    3600
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TtlPolicySettings {
    #[default]
    Primary,
    Secondary,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AclEntrySettings {
    /// "192.0.2.0/24", "2001:db8::/32", a bare address, or absent for
    /// any address.
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
}

/// One record, typed.  Names are relative to the apex unless they end
/// with a dot; "@" is the apex itself.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum RecordSettings {
    #[serde(rename = "SOA")]
    Soa {
        mname: String,
        rname: String,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    A {
        name: String,
        #[serde(default)]
        ttl: Option<u32>,
        address: Ipv4Addr,
    },
    #[serde(rename = "AAAA")]
    Aaaa {
        name: String,
        #[serde(default)]
        ttl: Option<u32>,
        address: Ipv6Addr,
    },
    #[serde(rename = "NS")]
    Ns {
        name: String,
        #[serde(default)]
        ttl: Option<u32>,
        nsdname: String,
    },
    #[serde(rename = "CNAME")]
    Cname {
        name: String,
        #[serde(default)]
        ttl: Option<u32>,
        cname: String,
    },
    #[serde(rename = "PTR")]
    Ptr {
        name: String,
        #[serde(default)]
        ttl: Option<u32>,
        ptrdname: String,
    },
    #[serde(rename = "MX")]
    Mx {
        name: String,
        #[serde(default)]
        ttl: Option<u32>,
        preference: u16,
        exchange: String,
    },
    #[serde(rename = "TXT")]
    Txt {
        name: String,
        #[serde(default)]
        ttl: Option<u32>,
        text: String,
    },
    #[serde(rename = "SRV")]
    Srv {
        name: String,
        #[serde(default)]
        ttl: Option<u32>,
        priority: u16,
        weight: u16,
        port: u16,
        target: String,
    },
}

impl Settings {
    pub fn new(filename: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(filename))
            .build()?
            .try_deserialize()
    }

    /// Turn the settings into a ready-to-serve context.
    pub fn build_context(&self) -> Result<ServerContext, SettingsError> {
        let mut keyring = TsigKeyring::new();
        for key in &self.keys {
            let name = parse_name(&key.name)?;
            let algorithm = TsigAlgorithm::from_string(&key.algorithm)
                .ok_or_else(|| SettingsError::BadAlgorithm(key.algorithm.clone()))?;
            let secret = base64::engine::general_purpose::STANDARD
                .decode(&key.secret)
                .map_err(|_| SettingsError::BadSecret(key.name.clone()))?;
            keyring.insert(TsigKey {
                name,
                algorithm,
                secret,
            });
        }

        let mut zones = ZoneSet::new();
        let mut policies = HashMap::new();
        for zone_settings in &self.zones {
            let apex = parse_name(&zone_settings.apex)?;
            let zone = build_zone(&apex, zone_settings)?;
            zones.insert(Arc::new(zone));
            policies.insert(apex, build_policy(zone_settings)?);
        }

        Ok(ServerContext::new(
            zones,
            keyring,
            policies,
            OptTemplate {
                max_payload: self.max_payload.unwrap_or(1232),
                nsid: self.nsid.as_ref().map(|nsid| nsid.as_bytes().to_vec()),
            },
            ChaosIdentity {
                version: self.server_version.clone(),
                server_id: self.server_id.clone(),
            },
            self.rate_limit.as_ref().map(|settings| {
                RateLimiter::new(RrlConfig {
                    rate: settings.rate,
                    slip: settings.slip,
                })
            }),
            self.journal_depth.unwrap_or(64),
        ))
    }
}

fn build_zone(apex: &DomainName, settings: &ZoneSettings) -> Result<Zone, SettingsError> {
    let ttl_policy = match settings.ttl_policy {
        TtlPolicySettings::Primary => TtlPolicy::Primary,
        TtlPolicySettings::Secondary => TtlPolicy::Secondary,
    };

    let mut builder = Zone::builder(apex.clone(), ttl_policy);
    for record in &settings.records {
        let rr = build_record(apex, settings.default_ttl, record)?;
        builder
            .insert_rr(&rr)
            .map_err(|error| SettingsError::Zone {
                apex: settings.apex.clone(),
                error,
            })?;
    }

    builder.build().map_err(|error| SettingsError::Zone {
        apex: settings.apex.clone(),
        error,
    })
}

fn build_record(
    apex: &DomainName,
    default_ttl: u32,
    settings: &RecordSettings,
) -> Result<ResourceRecord, SettingsError> {
    let relative = |name: &str| -> Result<DomainName, SettingsError> {
        DomainName::from_relative_dotted_string(apex, name)
            .ok_or_else(|| SettingsError::BadName(name.to_string()))
    };

    let (name, ttl, rtype_with_data) = match settings {
        RecordSettings::Soa {
            mname,
            rname,
            serial,
            refresh,
            retry,
            expire,
            minimum,
        } => (
            apex.clone(),
            *minimum,
            RecordTypeWithData::SOA {
                mname: relative(mname)?,
                rname: relative(rname)?,
                serial: *serial,
                refresh: *refresh,
                retry: *retry,
                expire: *expire,
                minimum: *minimum,
            },
        ),
        RecordSettings::A { name, ttl, address } => (
            relative(name)?,
            ttl.unwrap_or(default_ttl),
            RecordTypeWithData::A { address: *address },
        ),
        RecordSettings::Aaaa { name, ttl, address } => (
            relative(name)?,
            ttl.unwrap_or(default_ttl),
            RecordTypeWithData::AAAA { address: *address },
        ),
        RecordSettings::Ns { name, ttl, nsdname } => (
            relative(name)?,
            ttl.unwrap_or(default_ttl),
            RecordTypeWithData::NS {
                nsdname: relative(nsdname)?,
            },
        ),
        RecordSettings::Cname { name, ttl, cname } => (
            relative(name)?,
            ttl.unwrap_or(default_ttl),
            RecordTypeWithData::CNAME {
                cname: relative(cname)?,
            },
        ),
        RecordSettings::Ptr {
            name,
            ttl,
            ptrdname,
        } => (
            relative(name)?,
            ttl.unwrap_or(default_ttl),
            RecordTypeWithData::PTR {
                ptrdname: relative(ptrdname)?,
            },
        ),
        RecordSettings::Mx {
            name,
            ttl,
            preference,
            exchange,
        } => (
            relative(name)?,
            ttl.unwrap_or(default_ttl),
            RecordTypeWithData::MX {
                preference: *preference,
                exchange: relative(exchange)?,
            },
        ),
        RecordSettings::Txt { name, ttl, text } => {
            // TXT RDATA is one or more length-prefixed character
            // strings
            let mut octets = Vec::with_capacity(text.len() + 1);
            for chunk in text.as_bytes().chunks(255) {
                #[allow(clippy::cast_possible_truncation)]
                octets.push(chunk.len() as u8);
                octets.extend_from_slice(chunk);
            }
            if octets.is_empty() {
                octets.push(0);
            }
            (
                relative(name)?,
                ttl.unwrap_or(default_ttl),
                RecordTypeWithData::TXT { octets },
            )
        }
        RecordSettings::Srv {
            name,
            ttl,
            priority,
            weight,
            port,
            target,
        } => (
            relative(name)?,
            ttl.unwrap_or(default_ttl),
            RecordTypeWithData::SRV {
                priority: *priority,
                weight: *weight,
                port: *port,
                target: relative(target)?,
            },
        ),
    };

    Ok(ResourceRecord {
        name,
        rtype_with_data,
        rclass: RecordClass::IN,
        ttl,
    })
}

fn build_policy(settings: &ZoneSettings) -> Result<ZonePolicy, SettingsError> {
    let build_acl = |entries: &[AclEntrySettings]| -> Result<Acl, SettingsError> {
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            out.push(build_acl_entry(entry)?);
        }
        Ok(Acl::new(out))
    };

    Ok(ZonePolicy {
        query_acl: settings
            .allow_query
            .as_ref()
            .map(|entries| build_acl(entries))
            .transpose()?,
        transfer_acl: build_acl(&settings.allow_transfer)?,
        update_acl: build_acl(&settings.allow_update)?,
        notify_acl: build_acl(&settings.allow_notify)?,
        notify_targets: settings.notify.clone(),
    })
}

fn build_acl_entry(settings: &AclEntrySettings) -> Result<AclEntry, SettingsError> {
    let key = settings.key.as_deref().map(parse_name).transpose()?;

    let Some(prefix) = &settings.prefix else {
        return Ok(AclEntry {
            network: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            prefix_len: 0,
            key,
        });
    };

    let (address, len) = match prefix.split_once('/') {
        Some((address, len)) => (
            address,
            Some(
                len.parse::<u8>()
                    .map_err(|_| SettingsError::BadPrefix(prefix.clone()))?,
            ),
        ),
        None => (prefix.as_str(), None),
    };

    let network: IpAddr = address
        .parse()
        .map_err(|_| SettingsError::BadPrefix(prefix.clone()))?;
    let full = match network {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    };
    let prefix_len = len.unwrap_or(full);
    if prefix_len > full {
        return Err(SettingsError::BadPrefix(prefix.clone()));
    }

    Ok(AclEntry {
        network,
        prefix_len,
        key,
    })
}

fn parse_name(name: &str) -> Result<DomainName, SettingsError> {
    let dotted = if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    };
    DomainName::from_dotted_string(&dotted).ok_or_else(|| SettingsError::BadName(name.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    BadName(String),
    BadAlgorithm(String),
    BadSecret(String),
    BadPrefix(String),
    Zone { apex: String, error: ZoneError },
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::BadName(name) => write!(f, "'{name}' is not a valid domain name"),
            SettingsError::BadAlgorithm(algorithm) => {
                write!(f, "'{algorithm}' is not a supported TSIG algorithm")
            }
            SettingsError::BadSecret(key) => write!(f, "key '{key}' has an invalid secret"),
            SettingsError::BadPrefix(prefix) => {
                write!(f, "'{prefix}' is not a valid address prefix")
            }
            SettingsError::Zone { apex, error } => write!(f, "zone '{apex}': {error}"),
        }
    }
}

impl std::error::Error for SettingsError {}
