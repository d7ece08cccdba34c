mod client;
mod commands;
mod config;
mod models;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "halcyon", about = "Halcyon VPS dashboard CLI")]
struct Cli {
    /// API base URL (overrides config file and HALCYON_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Session token (overrides config file and HALCYON_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,

    /// Service API key (overrides config file and HALCYON_API_KEY)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Output raw JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Admin dashboard totals
    Overview {
        /// Re-poll every 30 seconds until interrupted
        #[arg(long)]
        watch: bool,
    },
    /// Your servers
    Servers {
        #[command(subcommand)]
        command: ServerCommands,
    },
    /// Administration (servers, infrastructure, users, audit log)
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },
    /// Top-ups, auto top-up and saved cards
    Billing {
        #[command(subcommand)]
        command: BillingCommands,
    },
    /// Order a new server
    Deploy {
        #[command(subcommand)]
        command: DeployCommands,
    },
    /// Support tickets
    Tickets {
        #[command(subcommand)]
        command: TicketCommands,
    },
    /// Wallet balance and transactions
    Wallet {
        #[command(subcommand)]
        command: WalletCommands,
    },
    /// Sign in and account
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Manage CLI configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

// ─── Servers ─────────────────────────────────────────────

#[derive(Subcommand)]
enum ServerCommands {
    /// List your servers
    List,
    /// Show one server
    Get { id: u64 },
    /// Start, stop or restart a server
    Power {
        id: u64,
        /// start, stop or restart
        action: String,
    },
}

// ─── Admin ───────────────────────────────────────────────

#[derive(Subcommand)]
enum AdminCommands {
    /// Control-plane servers
    Server {
        #[command(subcommand)]
        command: AdminServerCommands,
    },
    /// Hypervisors with utilization
    Hypervisors,
    /// IP blocks with free addresses
    #[command(name = "ip-blocks")]
    IpBlocks,
    /// Dashboard accounts
    Users {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Audit log of admin actions
    #[command(name = "audit-logs")]
    AuditLogs {
        #[arg(long)]
        resource: Option<String>,
        #[arg(long)]
        resource_id: Option<String>,
        #[arg(long)]
        action: Option<String>,
        #[arg(long)]
        user_id: Option<Uuid>,
        #[arg(long, default_value = "1")]
        page: i64,
        #[arg(long, default_value = "25")]
        per_page: i64,
    },
    /// Credit or debit a customer's wallet
    Adjust {
        #[arg(long)]
        user_id: Uuid,
        /// Dollars, negative to debit (e.g. 12.50 or -5)
        #[arg(long, allow_hyphen_values = true)]
        amount: String,
        #[arg(long)]
        reason: String,
    },
}

#[derive(Subcommand)]
enum AdminServerCommands {
    /// List all servers
    List {
        #[arg(long, default_value = "1")]
        page: i64,
        #[arg(long, default_value = "25")]
        per_page: i64,
    },
    /// Show one server
    Get { id: u64 },
    /// Run an action: start, stop, restart, suspend, unsuspend, transfer, delete
    Action {
        id: u64,
        action: String,
        /// Required for suspend, unsuspend, transfer and delete
        #[arg(long)]
        reason: Option<String>,
        /// VirtFusion user id of the new owner (transfer only)
        #[arg(long)]
        owner: Option<i64>,
        /// Confirm transfer or delete
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// List accounts
    List {
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value = "1")]
        page: i64,
        #[arg(long, default_value = "25")]
        per_page: i64,
    },
    /// Change an account's role
    Role { id: Uuid, role: String },
}

// ─── Billing ─────────────────────────────────────────────

#[derive(Subcommand)]
enum BillingCommands {
    /// Add funds; without --amount the presets are listed
    Topup {
        /// Dollars, $5 to $500
        #[arg(long)]
        amount: Option<String>,
        /// Saved card to charge directly
        #[arg(long)]
        card: Option<String>,
    },
    /// Credit a finished checkout session
    Confirm { session_id: String },
    /// Show or change auto top-up
    #[command(name = "auto-topup")]
    AutoTopup {
        #[command(subcommand)]
        command: AutoTopupCommands,
    },
    /// Saved cards
    Cards {
        #[command(subcommand)]
        command: CardCommands,
    },
}

#[derive(Subcommand)]
enum AutoTopupCommands {
    /// Show current settings
    Show,
    /// Change settings; omitted fields keep their value
    Set {
        #[arg(long, conflicts_with = "disable")]
        enable: bool,
        #[arg(long)]
        disable: bool,
        /// Top up when the balance drops below this many dollars
        #[arg(long)]
        threshold: Option<String>,
        /// Dollars to add each time
        #[arg(long)]
        amount: Option<String>,
        #[arg(long)]
        card: Option<String>,
    },
}

#[derive(Subcommand)]
enum CardCommands {
    /// List saved cards
    List,
    /// Start adding a card
    Add,
    /// Make a card the default
    Default { id: String },
    /// Remove a card
    Remove { id: String },
}

// ─── Deploy ──────────────────────────────────────────────

#[derive(Subcommand)]
enum DeployCommands {
    /// Available regions
    Regions,
    /// Plans, optionally for one region
    Plans {
        #[arg(long)]
        region: Option<String>,
    },
    /// Operating systems available for a plan
    Templates {
        #[arg(long)]
        plan: Uuid,
    },
    /// Order a server
    Create {
        #[arg(long)]
        region: String,
        #[arg(long)]
        plan: Uuid,
        #[arg(long)]
        template: u64,
        #[arg(long)]
        hostname: String,
        /// SSH key id (repeatable)
        #[arg(long)]
        ssh_key: Vec<i64>,
    },
}

// ─── Tickets ─────────────────────────────────────────────

#[derive(Subcommand)]
enum TicketCommands {
    /// List tickets
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value = "1")]
        page: i64,
        #[arg(long, default_value = "25")]
        per_page: i64,
    },
    /// Show a ticket and its messages
    Get { id: Uuid },
    /// Open a ticket
    Create {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        body: String,
        #[arg(long, default_value = "medium")]
        priority: String,
        #[arg(long, default_value = "other")]
        category: String,
        #[arg(long)]
        server: Option<i64>,
    },
    /// Reply to a ticket
    Reply {
        id: Uuid,
        #[arg(long)]
        body: String,
    },
    /// Close a ticket
    Close { id: Uuid },
    /// Change status or priority (staff)
    Update {
        id: Uuid,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        priority: Option<String>,
    },
}

// ─── Wallet ──────────────────────────────────────────────

#[derive(Subcommand)]
enum WalletCommands {
    /// Balance and auto top-up state
    Show,
    /// Ledger entries, newest first
    Transactions {
        #[arg(long)]
        kind: Option<String>,
        /// Another account's ledger (admin)
        #[arg(long)]
        user_id: Option<Uuid>,
        #[arg(long, default_value = "1")]
        page: i64,
        #[arg(long, default_value = "25")]
        per_page: i64,
    },
    /// Export transactions
    Export {
        #[arg(long, default_value = "csv")]
        format: String,
        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

// ─── Auth ────────────────────────────────────────────────

#[derive(Subcommand)]
enum AuthCommands {
    /// Sign in and store the session token
    Login {
        #[arg(long)]
        email: String,
        /// Prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Create a customer account
    Register {
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Forget the stored session token
    Logout,
    /// Show the signed-in account
    Me,
    /// Change your password
    #[command(name = "change-password")]
    ChangePassword {
        #[arg(long)]
        current: Option<String>,
        #[arg(long)]
        new: Option<String>,
    },
}

// ─── Config ──────────────────────────────────────────────

#[derive(Subcommand)]
enum ConfigCommands {
    /// Set the API URL
    SetUrl { url: String },
    /// Set the service API key
    SetKey { key: String },
    /// Show the effective configuration
    Show,
}

// ─── Main dispatch ───────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = config::Config::load(config::Overrides {
        api_url: cli.api_url.as_deref(),
        token: cli.token.as_deref(),
        api_key: cli.api_key.as_deref(),
    })?;

    // These don't need an HTTP client
    match &cli.command {
        Commands::Config { command } => {
            return match command {
                ConfigCommands::SetUrl { url } => config::set_config_value("api_url", url),
                ConfigCommands::SetKey { key } => config::set_config_value("api_key", key),
                ConfigCommands::Show => {
                    config::show(&cfg);
                    Ok(())
                }
            };
        }
        Commands::Auth {
            command: AuthCommands::Logout,
        } => return commands::auth::logout(),
        _ => {}
    }

    let client = client::HalcyonClient::new(&cfg)?;
    let json = cli.json;

    match cli.command {
        Commands::Overview { watch } => commands::overview::overview(&client, watch, json).await,
        Commands::Servers { command } => match command {
            ServerCommands::List => commands::servers::list(&client, json).await,
            ServerCommands::Get { id } => commands::servers::get(&client, id, json).await,
            ServerCommands::Power { id, action } => {
                commands::servers::power(&client, id, &action, json).await
            }
        },
        Commands::Admin { command } => match command {
            AdminCommands::Server { command } => match command {
                AdminServerCommands::List { page, per_page } => {
                    commands::admin::list_servers(&client, page, per_page, json).await
                }
                AdminServerCommands::Get { id } => {
                    commands::admin::get_server(&client, id, json).await
                }
                AdminServerCommands::Action {
                    id,
                    action,
                    reason,
                    owner,
                    yes,
                } => {
                    commands::admin::server_action(&client, id, &action, reason, owner, yes, json)
                        .await
                }
            },
            AdminCommands::Hypervisors => commands::admin::hypervisors(&client, json).await,
            AdminCommands::IpBlocks => commands::admin::ip_blocks(&client, json).await,
            AdminCommands::Users { command } => match command {
                UserCommands::List {
                    role,
                    search,
                    page,
                    per_page,
                } => commands::admin::list_users(&client, role, search, page, per_page, json).await,
                UserCommands::Role { id, role } => {
                    commands::admin::set_role(&client, id, role, json).await
                }
            },
            AdminCommands::AuditLogs {
                resource,
                resource_id,
                action,
                user_id,
                page,
                per_page,
            } => {
                commands::admin::audit_logs(
                    &client,
                    resource,
                    resource_id,
                    action,
                    user_id,
                    page,
                    per_page,
                    json,
                )
                .await
            }
            AdminCommands::Adjust {
                user_id,
                amount,
                reason,
            } => commands::admin::adjust_wallet(&client, user_id, &amount, &reason, json).await,
        },
        Commands::Billing { command } => match command {
            BillingCommands::Topup { amount, card } => {
                commands::billing::topup(&client, amount.as_deref(), card, json).await
            }
            BillingCommands::Confirm { session_id } => {
                commands::billing::confirm(&client, session_id, json).await
            }
            BillingCommands::AutoTopup { command } => match command {
                AutoTopupCommands::Show => commands::billing::show_auto_topup(&client, json).await,
                AutoTopupCommands::Set {
                    enable,
                    disable,
                    threshold,
                    amount,
                    card,
                } => {
                    let enabled = match (enable, disable) {
                        (true, _) => Some(true),
                        (_, true) => Some(false),
                        _ => None,
                    };
                    commands::billing::set_auto_topup(
                        &client,
                        enabled,
                        threshold.as_deref(),
                        amount.as_deref(),
                        card,
                        json,
                    )
                    .await
                }
            },
            BillingCommands::Cards { command } => match command {
                CardCommands::List => commands::billing::list_cards(&client, json).await,
                CardCommands::Add => commands::billing::add_card(&client, json).await,
                CardCommands::Default { id } => {
                    commands::billing::set_default_card(&client, &id).await
                }
                CardCommands::Remove { id } => {
                    commands::billing::remove_card(&client, &id, json).await
                }
            },
        },
        Commands::Deploy { command } => match command {
            DeployCommands::Regions => commands::deploy::regions(&client, json).await,
            DeployCommands::Plans { region } => {
                commands::deploy::plans(&client, region, json).await
            }
            DeployCommands::Templates { plan } => {
                commands::deploy::templates(&client, plan, json).await
            }
            DeployCommands::Create {
                region,
                plan,
                template,
                hostname,
                ssh_key,
            } => {
                commands::deploy::create(&client, region, plan, template, hostname, ssh_key, json)
                    .await
            }
        },
        Commands::Tickets { command } => match command {
            TicketCommands::List {
                status,
                priority,
                category,
                page,
                per_page,
            } => {
                commands::tickets::list(&client, status, priority, category, page, per_page, json)
                    .await
            }
            TicketCommands::Get { id } => commands::tickets::get(&client, id, json).await,
            TicketCommands::Create {
                subject,
                body,
                priority,
                category,
                server,
            } => {
                commands::tickets::create(&client, subject, body, priority, category, server, json)
                    .await
            }
            TicketCommands::Reply { id, body } => {
                commands::tickets::reply(&client, id, body, json).await
            }
            TicketCommands::Close { id } => {
                commands::tickets::update(&client, id, Some("closed".into()), None, json).await
            }
            TicketCommands::Update {
                id,
                status,
                priority,
            } => commands::tickets::update(&client, id, status, priority, json).await,
        },
        Commands::Wallet { command } => match command {
            WalletCommands::Show => commands::wallet::show(&client, json).await,
            WalletCommands::Transactions {
                kind,
                user_id,
                page,
                per_page,
            } => commands::wallet::transactions(&client, kind, user_id, page, per_page, json).await,
            WalletCommands::Export { format, output } => {
                commands::wallet::export(&client, &format, output.as_deref()).await
            }
        },
        Commands::Auth { command } => match command {
            AuthCommands::Login { email, password } => {
                commands::auth::login(&client, email, password).await
            }
            AuthCommands::Register {
                email,
                name,
                password,
            } => commands::auth::register(&client, email, name, password).await,
            AuthCommands::Logout => unreachable!(),
            AuthCommands::Me => commands::auth::me(&client, json).await,
            AuthCommands::ChangePassword { current, new } => {
                commands::auth::change_password(&client, current, new).await
            }
        },
        Commands::Config { .. } => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_negative_adjustment_parses() {
        let cli = Cli::try_parse_from([
            "halcyon",
            "admin",
            "adjust",
            "--user-id",
            "00000000-0000-0000-0000-000000000001",
            "--amount",
            "-5",
            "--reason",
            "Refund",
        ])
        .unwrap();
        match cli.command {
            Commands::Admin {
                command: AdminCommands::Adjust { amount, .. },
            } => assert_eq!(amount, "-5"),
            _ => panic!("expected admin adjust"),
        }
    }

    #[test]
    fn test_server_action_flags() {
        let cli = Cli::try_parse_from([
            "halcyon", "--json", "admin", "server", "action", "12", "transfer", "--reason",
            "merge", "--owner", "7", "--yes",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Admin {
                command:
                    AdminCommands::Server {
                        command:
                            AdminServerCommands::Action {
                                id, owner, yes, ..
                            },
                    },
            } => {
                assert_eq!(id, 12);
                assert_eq!(owner, Some(7));
                assert!(yes);
            }
            _ => panic!("expected admin server action"),
        }
    }
}
