use utoipa::OpenApi;

use crate::errors::ErrorResponse;
#[allow(unused_imports)]
use crate::models::{
    AdjustBalanceRequest, AdminOverview, AutoTopupSettings, ChangePasswordRequest,
    ConfirmCheckoutRequest, ConfirmCheckoutResponse, CreateTicket, CreateTicketMessage,
    DeployRequest, DeployResponse, HypervisorList, IpBlockList, LoginRequest, LoginResponse,
    Order, PaginatedTicketResponse, PaginatedTransactionResponse, PaginatedUserResponse,
    PaymentMethodList, Plan, Region, RegisterRequest, ServerActionRequest, ServerActionResponse,
    ServerList, SetupIntentResponse, Ticket, TicketMessage, TopupRequest, TopupResponse,
    Transaction, UpdateAutoTopup, UpdateTicket, UpdateUserRole, UserResponse, WalletResponse,
};
use crate::payments::PaymentMethod;
use crate::routes::audit_logs::{AuditLog, PaginatedAuditLogResponse};
use crate::virtfusion::models::{Hypervisor, IpBlock, OsTemplate, Server, ServerPage};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Halcyon API",
        version = "0.1.0",
        description = "VPS reseller dashboard API: VirtFusion servers, Stripe-funded wallets, support tickets"
    ),
    paths(
        // Auth
        crate::routes::auth_routes::register,
        crate::routes::auth_routes::login,
        crate::routes::auth_routes::me,
        crate::routes::auth_routes::change_password,
        // Users
        crate::routes::users::list,
        crate::routes::users::get_one,
        crate::routes::users::set_role,
        // Audit
        crate::routes::audit_logs::list,
        // Admin servers
        crate::routes::admin_servers::list,
        crate::routes::admin_servers::get_one,
        crate::routes::admin_servers::power,
        crate::routes::admin_servers::suspend,
        crate::routes::admin_servers::unsuspend,
        crate::routes::admin_servers::transfer,
        crate::routes::admin_servers::delete,
        // Infrastructure
        crate::routes::infrastructure::overview,
        crate::routes::infrastructure::hypervisors,
        crate::routes::infrastructure::ip_blocks,
        // Customer servers
        crate::routes::servers::list,
        crate::routes::servers::get_one,
        crate::routes::servers::power,
        // Wallet
        crate::routes::wallet::get_wallet,
        crate::routes::wallet::transactions,
        crate::routes::wallet::export,
        crate::routes::wallet::adjust,
        // Billing
        crate::routes::billing::topup,
        crate::routes::billing::confirm_checkout,
        crate::routes::billing::get_auto_topup,
        crate::routes::billing::update_auto_topup,
        crate::routes::webhooks::stripe,
        // Payment methods
        crate::routes::payment_methods::list,
        crate::routes::payment_methods::setup_intent,
        crate::routes::payment_methods::set_default,
        crate::routes::payment_methods::remove,
        // Deploy
        crate::routes::deploy::regions,
        crate::routes::deploy::plans,
        crate::routes::deploy::templates,
        crate::routes::deploy::deploy,
        // Tickets
        crate::routes::tickets::list,
        crate::routes::tickets::create,
        crate::routes::tickets::get_one,
        crate::routes::tickets::update,
        crate::routes::tickets::list_messages,
        crate::routes::tickets::add_message,
    ),
    components(schemas(
        ErrorResponse,
        RegisterRequest, LoginRequest, LoginResponse, ChangePasswordRequest,
        UserResponse, UpdateUserRole, PaginatedUserResponse,
        AuditLog, PaginatedAuditLogResponse,
        Server, ServerPage, Hypervisor, IpBlock, OsTemplate,
        ServerActionRequest, ServerActionResponse, ServerList,
        AdminOverview, HypervisorList, IpBlockList,
        WalletResponse, AutoTopupSettings, Transaction, PaginatedTransactionResponse,
        AdjustBalanceRequest,
        TopupRequest, TopupResponse, ConfirmCheckoutRequest, ConfirmCheckoutResponse,
        UpdateAutoTopup, SetupIntentResponse, PaymentMethod, PaymentMethodList,
        Region, Plan, DeployRequest, DeployResponse, Order,
        Ticket, CreateTicket, UpdateTicket, TicketMessage, CreateTicketMessage,
        PaginatedTicketResponse,
    )),
    tags(
        (name = "Auth", description = "Registration, login and sessions"),
        (name = "Users", description = "User administration"),
        (name = "Audit", description = "Admin action history"),
        (name = "Admin Servers", description = "Server administration on the control plane"),
        (name = "Infrastructure", description = "Hypervisors, IP blocks and the admin overview"),
        (name = "Servers", description = "Customer servers"),
        (name = "Wallet", description = "Prepaid balance and ledger"),
        (name = "Billing", description = "Top-ups, checkout and auto top-up"),
        (name = "Payment Methods", description = "Saved cards"),
        (name = "Deploy", description = "Catalog and server ordering"),
        (name = "Tickets", description = "Support tickets"),
    )
)]
pub struct ApiDoc;
