use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DataList<T> {
    pub data: Vec<T>,
}

// ─── Auth / users ────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: String,
    pub vf_user_id: Option<i64>,
    pub force_password_change: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct UpdateUserRole {
    pub role: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub user_email: String,
    pub action: String,
    pub resource: String,
    pub resource_id: Option<String>,
    pub reason: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// ─── Servers ─────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct Server {
    pub id: u64,
    pub name: String,
    pub hostname: Option<String>,
    pub uuid: Option<String>,
    pub status: String,
    pub suspended: bool,
    pub owner_id: Option<u64>,
    pub ipv4: Option<String>,
    pub package_id: Option<u64>,
    pub hypervisor_id: Option<u64>,
    pub created: Option<String>,
}

#[derive(Debug, Serialize, Default)]
pub struct ServerActionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_owner_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServerActionResponse {
    pub ok: bool,
    pub action: String,
    pub server_id: u64,
}

#[derive(Debug, Serialize, Deserialize)]
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

#[derive(Debug, Serialize, Deserialize)]
pub struct IpBlock {
    pub id: u64,
    pub name: String,
    pub cidr: Option<String>,
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminOverview {
    pub servers_total: i64,
    pub hypervisors_total: usize,
    pub hypervisors_enabled: usize,
    pub hypervisors_maintenance: usize,
    pub avg_cpu_utilization: f64,
    pub avg_memory_utilization: f64,
    pub ipv4_total: u64,
    pub ipv4_free: u64,
    pub customers: i64,
    pub open_tickets: i64,
    pub wallet_balance_total_cents: i64,
    pub revenue_30d_cents: i64,
}

// ─── Wallet / billing ────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct AutoTopupSettings {
    pub enabled: bool,
    pub threshold_cents: i64,
    pub amount_cents: i64,
    pub payment_method_id: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WalletResponse {
    pub balance_cents: i64,
    pub balance: String,
    pub auto_topup: AutoTopupSettings,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub amount_cents: i64,
    pub balance_after_cents: i64,
    pub source_id: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AdjustBalanceRequest {
    pub user_id: Uuid,
    pub amount_cents: i64,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct TopupRequest {
    pub amount_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TopupResponse {
    pub status: String,
    pub balance_cents: Option<i64>,
    pub checkout_url: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConfirmCheckoutRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfirmCheckoutResponse {
    pub credited: bool,
    pub balance_cents: i64,
}

#[derive(Debug, Serialize)]
pub struct UpdateAutoTopup {
    pub enabled: bool,
    pub threshold_cents: i64,
    pub amount_cents: i64,
    pub payment_method_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: String,
    pub brand: String,
    pub last4: String,
    pub exp_month: u32,
    pub exp_year: u32,
    pub is_default: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetupIntentResponse {
    pub client_secret: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RemovedPaymentMethod {
    pub deleted: bool,
    pub auto_topup_disabled: bool,
}

// ─── Deploy ──────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub region_id: String,
    pub name: String,
    pub cpu_cores: i32,
    pub memory_mb: i32,
    pub disk_gb: i32,
    pub bandwidth_gb: i32,
    pub price_cents: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OsTemplate {
    pub id: u64,
    pub group: String,
    pub name: String,
    pub version: Option<String>,
    pub variant: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeployRequest {
    pub region: String,
    pub plan_id: Uuid,
    pub template_id: u64,
    pub hostname: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssh_key_ids: Vec<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeployResponse {
    pub order_id: Uuid,
    pub server_id: u64,
    pub balance_cents: i64,
}

// ─── Tickets ─────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subject: String,
    pub status: String,
    pub priority: String,
    pub category: String,
    pub server_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CreateTicket {
    pub subject: String,
    pub body: String,
    pub priority: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<i64>,
}

#[derive(Debug, Serialize, Default)]
pub struct UpdateTicket {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TicketMessage {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub user_id: Option<Uuid>,
    pub user_email: String,
    pub is_staff: bool,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CreateTicketMessage {
    pub body: String,
}
