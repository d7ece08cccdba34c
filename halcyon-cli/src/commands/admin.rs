use anyhow::{Result, bail};
use halcyon::money::{format_cents, parse_dollars};
use halcyon::{HttpMethod, ServerAction, ValidatedAction};
use uuid::Uuid;

use crate::client::HalcyonClient;
use crate::models::*;
use crate::output;

// ─── Servers ─────────────────────────────────────────────

pub async fn list_servers(client: &HalcyonClient, page: i64, per_page: i64, json: bool) -> Result<()> {
    let resp: PaginatedResponse<Server> = client
        .get_query(
            "/admin/vf/servers",
            &[
                ("page", Some(page.to_string())),
                ("per_page", Some(per_page.to_string())),
            ],
        )
        .await?;

    if json {
        return output::print_json(&resp.data);
    }

    let rows = resp
        .data
        .iter()
        .map(|s| {
            vec![
                s.id.to_string(),
                s.name.clone(),
                output::opt(&s.ipv4),
                status_label(s),
                output::opt(&s.owner_id),
                output::opt(&s.hypervisor_id),
            ]
        })
        .collect();
    output::print_table(&["ID", "Name", "IPv4", "Status", "Owner", "Hypervisor"], rows);
    output::print_pagination(resp.page, resp.per_page, resp.total);
    Ok(())
}

pub(crate) fn status_label(s: &Server) -> String {
    if s.suspended {
        format!("{} (suspended)", s.status)
    } else {
        s.status.clone()
    }
}

pub async fn get_server(client: &HalcyonClient, id: u64, json: bool) -> Result<()> {
    let s: Server = client.get(&format!("/admin/vf/servers/{id}")).await?;

    if json {
        return output::print_json(&s);
    }

    output::print_record(vec![
        ("ID", s.id.to_string()),
        ("Name", s.name.clone()),
        ("Hostname", output::opt(&s.hostname)),
        ("UUID", output::opt(&s.uuid)),
        ("Status", status_label(&s)),
        ("Owner", output::opt(&s.owner_id)),
        ("IPv4", output::opt(&s.ipv4)),
        ("Package", output::opt(&s.package_id)),
        ("Hypervisor", output::opt(&s.hypervisor_id)),
        ("Created", output::opt(&s.created)),
    ]);
    Ok(())
}

/// Runs one action from the admin server dialog. The same reason and owner
/// rules the API enforces are checked before anything is sent.
pub async fn server_action(
    client: &HalcyonClient,
    id: u64,
    action: &str,
    reason: Option<String>,
    new_owner_id: Option<i64>,
    yes: bool,
    json: bool,
) -> Result<()> {
    let action: ServerAction = action.parse()?;
    let validated = ValidatedAction::new(action, reason.as_deref(), new_owner_id)?;

    if action.is_destructive() && !yes {
        bail!("'{action}' on server {id} cannot be undone from here; pass --yes to confirm");
    }

    let body = ServerActionRequest {
        reason: validated.reason,
        new_owner_id: validated.new_owner_id.map(|o| o as i64),
    };
    let endpoint = action.dashboard_endpoint(id);
    let resp: ServerActionResponse = match endpoint.method {
        HttpMethod::Delete => client.delete_with(&endpoint.path, &body).await?,
        _ => client.post(&endpoint.path, &body).await?,
    };

    if json {
        return output::print_json(&resp);
    }

    println!("{} sent to server {}", resp.action, resp.server_id);
    Ok(())
}

// ─── Infrastructure ──────────────────────────────────────

pub async fn hypervisors(client: &HalcyonClient, json: bool) -> Result<()> {
    let resp: DataList<Hypervisor> = client.get("/admin/vf/hypervisors").await?;

    if json {
        return output::print_json(&resp.data);
    }

    let rows = resp
        .data
        .iter()
        .map(|h| {
            let state = match (h.enabled, h.maintenance) {
                (false, _) => "disabled",
                (true, true) => "maintenance",
                (true, false) => "enabled",
            };
            vec![
                h.id.to_string(),
                h.name.clone(),
                output::opt(&h.ip),
                state.to_string(),
                h.server_count.to_string(),
                output::percent(h.cpu_utilization),
                output::percent(h.memory_utilization),
                output::percent(h.disk_utilization),
            ]
        })
        .collect();
    output::print_table(
        &["ID", "Name", "IP", "State", "Servers", "CPU", "Memory", "Disk"],
        rows,
    );
    Ok(())
}

pub async fn ip_blocks(client: &HalcyonClient, json: bool) -> Result<()> {
    let resp: DataList<IpBlock> = client.get("/admin/vf/ip-blocks").await?;

    if json {
        return output::print_json(&resp.data);
    }

    let rows = resp
        .data
        .iter()
        .map(|b| {
            vec![
                b.id.to_string(),
                b.name.clone(),
                output::opt(&b.cidr),
                b.used.to_string(),
                b.free.to_string(),
                b.total.to_string(),
            ]
        })
        .collect();
    output::print_table(&["ID", "Name", "CIDR", "Used", "Free", "Total"], rows);
    Ok(())
}

// ─── Users ───────────────────────────────────────────────

pub async fn list_users(
    client: &HalcyonClient,
    role: Option<String>,
    search: Option<String>,
    page: i64,
    per_page: i64,
    json: bool,
) -> Result<()> {
    let resp: PaginatedResponse<User> = client
        .get_query(
            "/admin/users",
            &[
                ("role", role),
                ("search", search),
                ("page", Some(page.to_string())),
                ("per_page", Some(per_page.to_string())),
            ],
        )
        .await?;

    if json {
        return output::print_json(&resp.data);
    }

    let rows = resp
        .data
        .iter()
        .map(|u| {
            vec![
                u.id.to_string(),
                u.email.clone(),
                u.name.clone(),
                u.role.clone(),
                output::opt(&u.vf_user_id),
                u.created_at.format("%Y-%m-%d").to_string(),
            ]
        })
        .collect();
    output::print_table(&["ID", "Email", "Name", "Role", "VF User", "Created"], rows);
    output::print_pagination(resp.page, resp.per_page, resp.total);
    Ok(())
}

pub async fn set_role(client: &HalcyonClient, id: Uuid, role: String, json: bool) -> Result<()> {
    let user: User = client
        .put(&format!("/admin/users/{id}/role"), &UpdateUserRole { role })
        .await?;

    if json {
        return output::print_json(&user);
    }

    println!("{} is now {}", user.email, user.role);
    Ok(())
}

// ─── Audit log ───────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
pub async fn audit_logs(
    client: &HalcyonClient,
    resource: Option<String>,
    resource_id: Option<String>,
    action: Option<String>,
    user_id: Option<Uuid>,
    page: i64,
    per_page: i64,
    json: bool,
) -> Result<()> {
    let resp: PaginatedResponse<AuditLog> = client
        .get_query(
            "/admin/audit-logs",
            &[
                ("resource", resource),
                ("resource_id", resource_id),
                ("action", action),
                ("user_id", user_id.map(|u| u.to_string())),
                ("page", Some(page.to_string())),
                ("per_page", Some(per_page.to_string())),
            ],
        )
        .await?;

    if json {
        return output::print_json(&resp.data);
    }

    let rows = resp
        .data
        .iter()
        .map(|l| {
            vec![
                l.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                l.user_email.clone(),
                l.action.clone(),
                format!("{}/{}", l.resource, l.resource_id.as_deref().unwrap_or("-")),
                output::opt(&l.reason),
            ]
        })
        .collect();
    output::print_table(&["When", "Who", "Action", "Resource", "Reason"], rows);
    output::print_pagination(resp.page, resp.per_page, resp.total);
    Ok(())
}

// ─── Wallet ──────────────────────────────────────────────

/// `amount` is in dollars as typed (`-5`, `12.50`).
pub async fn adjust_wallet(
    client: &HalcyonClient,
    user_id: Uuid,
    amount: &str,
    reason: &str,
    json: bool,
) -> Result<()> {
    let amount_cents = parse_dollars(amount)?;
    let reason = halcyon::validation::validate_adjustment(amount_cents, reason)?;

    let tx: Transaction = client
        .post(
            "/admin/wallet/adjust",
            &AdjustBalanceRequest {
                user_id,
                amount_cents,
                reason,
            },
        )
        .await?;

    if json {
        return output::print_json(&tx);
    }

    println!(
        "Adjusted by {}; balance is now {}",
        format_cents(tx.amount_cents),
        format_cents(tx.balance_after_cents)
    );
    Ok(())
}
