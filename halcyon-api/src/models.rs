use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::payments::PaymentMethod;
use crate::virtfusion::models::{Hypervisor, IpBlock, Server};

// ─── Pagination ──────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T: Serialize> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

impl PageQuery {
    /// (page, per_page, offset) with page ≥ 1 and per_page in 1..=100.
    pub fn clamped(&self) -> (i64, i64, i64) {
        clamp_page(self.page, self.per_page)
    }
}

pub fn clamp_page(page: i64, per_page: i64) -> (i64, i64, i64) {
    let per_page = per_page.clamp(1, 100);
    let page = page.max(1);
    (page, per_page, (page - 1) * per_page)
}

fn default_page() -> i64 { 1 }
fn default_per_page() -> i64 { 25 }

// ─── Users & Auth ────────────────────────────────────────

#[derive(Debug, sqlx::FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    pub ext_id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub role: String,
    pub vf_user_id: Option<i64>,
    pub force_password_change: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: String,
    pub vf_user_id: Option<i64>,
    pub force_password_change: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            name: u.name,
            role: u.role,
            vf_user_id: u.vf_user_id,
            force_password_change: u.force_password_change,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUserRole {
    pub role: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct UserListQuery {
    pub role: Option<String>,
    /// Case-insensitive substring match on email.
    pub search: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedUserResponse {
    pub data: Vec<UserResponse>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

// ─── Wallet ──────────────────────────────────────────────

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Wallet {
    pub user_id: Uuid,
    pub balance_cents: i64,
    pub stripe_customer_id: Option<String>,
    pub auto_topup_enabled: bool,
    pub auto_topup_threshold_cents: i64,
    pub auto_topup_amount_cents: i64,
    pub auto_topup_payment_method_id: Option<String>,
    pub auto_topup_last_attempt_at: Option<DateTime<Utc>>,
    pub auto_topup_last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AutoTopupSettings {
    pub enabled: bool,
    pub threshold_cents: i64,
    pub amount_cents: i64,
    pub payment_method_id: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl From<&Wallet> for AutoTopupSettings {
    fn from(w: &Wallet) -> Self {
        Self {
            enabled: w.auto_topup_enabled,
            threshold_cents: w.auto_topup_threshold_cents,
            amount_cents: w.auto_topup_amount_cents,
            payment_method_id: w.auto_topup_payment_method_id.clone(),
            last_attempt_at: w.auto_topup_last_attempt_at,
            last_error: w.auto_topup_last_error.clone(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WalletResponse {
    pub balance_cents: i64,
    pub balance: String,
    pub auto_topup: AutoTopupSettings,
}

impl From<&Wallet> for WalletResponse {
    fn from(w: &Wallet) -> Self {
        Self {
            balance_cents: w.balance_cents,
            balance: halcyon::money::format_cents(w.balance_cents),
            auto_topup: w.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub amount_cents: i64,
    pub balance_after_cents: i64,
    pub source_id: String,
    pub description: String,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct TransactionListQuery {
    pub kind: Option<String>,
    /// Admins may read another user's ledger.
    pub user_id: Option<Uuid>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedTransactionResponse {
    pub data: Vec<Transaction>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdjustBalanceRequest {
    pub user_id: Uuid,
    pub amount_cents: i64,
    pub reason: String,
}

// ─── Billing ─────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct TopupRequest {
    pub amount_cents: i64,
    pub payment_method_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TopupResponse {
    /// `succeeded` or `requires_checkout`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_cents: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

pub const TOPUP_SUCCEEDED: &str = "succeeded";
pub const TOPUP_REQUIRES_CHECKOUT: &str = "requires_checkout";

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfirmCheckoutRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConfirmCheckoutResponse {
    pub credited: bool,
    pub balance_cents: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateAutoTopup {
    pub enabled: bool,
    pub threshold_cents: i64,
    pub amount_cents: i64,
    pub payment_method_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SetupIntentResponse {
    pub client_secret: String,
}

#[derive(Serialize, ToSchema)]
pub struct PaymentMethodList {
    pub data: Vec<PaymentMethod>,
}

// ─── Catalog & deploy ────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Region {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub vf_hypervisor_group_id: i64,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Plan {
    pub id: Uuid,
    pub region_id: String,
    pub name: String,
    pub vf_package_id: i64,
    pub cpu_cores: i32,
    pub memory_mb: i32,
    pub disk_gb: i32,
    pub bandwidth_gb: i32,
    pub price_cents: i64,
    pub active: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct PlanQuery {
    pub region: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct TemplateQuery {
    pub plan_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeployRequest {
    pub region: String,
    pub plan_id: Uuid,
    pub template_id: u64,
    pub hostname: String,
    #[serde(default)]
    pub ssh_key_ids: Vec<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeployResponse {
    pub order_id: Uuid,
    pub server_id: u64,
    pub balance_cents: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub region_id: String,
    pub hostname: String,
    pub template_id: i64,
    pub vf_server_id: Option<i64>,
    pub amount_cents: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

// ─── Servers ─────────────────────────────────────────────

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ServerActionRequest {
    pub reason: Option<String>,
    pub new_owner_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ServerActionResponse {
    pub ok: bool,
    pub action: String,
    pub server_id: u64,
}

#[derive(Serialize, ToSchema)]
pub struct ServerList {
    pub data: Vec<Server>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
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

#[derive(Serialize, ToSchema)]
pub struct HypervisorList {
    pub data: Vec<Hypervisor>,
}

#[derive(Serialize, ToSchema)]
pub struct IpBlockList {
    pub data: Vec<IpBlock>,
}

// ─── Tickets ─────────────────────────────────────────────

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
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

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTicket {
    pub subject: String,
    pub body: String,
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default = "default_category")]
    pub category: String,
    pub server_id: Option<i64>,
}

fn default_priority() -> String { "medium".into() }
fn default_category() -> String { "other".into() }

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateTicket {
    pub status: Option<String>,
    pub priority: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct TicketMessage {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub user_id: Option<Uuid>,
    pub user_email: String,
    pub is_staff: bool,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTicketMessage {
    pub body: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct TicketListQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedTicketResponse {
    pub data: Vec<Ticket>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}
