//! Wire types returned by the VirtFusion API and the dashboard-shaped views
//! the rest of the crate works with.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ─── Wire envelopes ──────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PageEnvelope<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub current_page: Option<u64>,
    #[serde(default)]
    pub per_page: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
}

// ─── Servers ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VfServer {
    pub id: u64,
    #[serde(default)]
    pub owner_id: Option<u64>,
    #[serde(default)]
    pub hypervisor_id: Option<u64>,
    #[serde(default)]
    pub package_id: Option<u64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub suspended: bool,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub network: Option<serde_json::Value>,
}

impl VfServer {
    /// First IPv4 address on the first interface that has one.
    fn primary_ipv4(&self) -> Option<String> {
        let interfaces = self.network.as_ref()?.get("interfaces")?.as_array()?;
        interfaces.iter().find_map(|iface| {
            iface
                .get("ipv4")?
                .as_array()?
                .iter()
                .find_map(|ip| ip.get("address")?.as_str().map(String::from))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Server {
    pub id: u64,
    pub name: String,
    pub hostname: Option<String>,
    pub uuid: Option<String>,
    pub status: String,
    pub suspended: bool,
    /// VirtFusion user id of the owner.
    pub owner_id: Option<u64>,
    pub ipv4: Option<String>,
    pub package_id: Option<u64>,
    pub hypervisor_id: Option<u64>,
    pub created: Option<String>,
}

impl From<VfServer> for Server {
    fn from(s: VfServer) -> Self {
        let ipv4 = s.primary_ipv4();
        Server {
            id: s.id,
            name: s.name,
            hostname: s.hostname,
            uuid: s.uuid,
            status: s.state.unwrap_or_else(|| "unknown".into()),
            suspended: s.suspended,
            owner_id: s.owner_id,
            ipv4,
            package_id: s.package_id,
            hypervisor_id: s.hypervisor_id,
            created: s.created,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServerPage {
    pub data: Vec<Server>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

// ─── Hypervisors ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VfHypervisor {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub maintenance: bool,
    #[serde(default)]
    pub cpu_utilization: Option<f64>,
    #[serde(default)]
    pub memory_utilization: Option<f64>,
    #[serde(default)]
    pub disk_utilization: Option<f64>,
    #[serde(default)]
    pub server_count: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Hypervisor {
    pub id: u64,
    pub name: String,
    pub ip: Option<String>,
    pub enabled: bool,
    pub maintenance: bool,
    pub cpu_utilization: f64,
    pub memory_utilization: f64,
    pub disk_utilization: f64,
    pub server_count: u64,
}

fn clamp_percent(v: Option<f64>) -> f64 {
    v.unwrap_or(0.0).clamp(0.0, 100.0)
}

impl From<VfHypervisor> for Hypervisor {
    fn from(h: VfHypervisor) -> Self {
        Hypervisor {
            id: h.id,
            name: h.name,
            ip: h.ip,
            enabled: h.enabled,
            maintenance: h.maintenance,
            cpu_utilization: clamp_percent(h.cpu_utilization),
            memory_utilization: clamp_percent(h.memory_utilization),
            disk_utilization: clamp_percent(h.disk_utilization),
            server_count: h.server_count.unwrap_or(0),
        }
    }
}

// ─── IP blocks ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VfIpBlock {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cidr: Option<String>,
    #[serde(default)]
    pub total_addresses: Option<u64>,
    #[serde(default)]
    pub used_addresses: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct IpBlock {
    pub id: u64,
    pub name: String,
    pub cidr: Option<String>,
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

impl From<VfIpBlock> for IpBlock {
    fn from(b: VfIpBlock) -> Self {
        let total = b.total_addresses.unwrap_or(0);
        let used = b.used_addresses.unwrap_or(0).min(total);
        IpBlock {
            id: b.id,
            name: b.name,
            cidr: b.cidr,
            total,
            used,
            free: total - used,
        }
    }
}

// ─── Templates ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct VfTemplateGroup {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub templates: Vec<VfTemplate>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VfTemplate {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub variant: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct OsTemplate {
    pub id: u64,
    pub group: String,
    pub name: String,
    pub version: Option<String>,
    pub variant: Option<String>,
}

// ─── Users ───────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VfUser {
    pub id: u64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub ext_relation_id: Option<i64>,
}
