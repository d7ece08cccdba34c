use anyhow::{Result, bail};
use halcyon::money::format_cents;
use halcyon::validation::validate_hostname;
use uuid::Uuid;

use crate::client::HalcyonClient;
use crate::models::*;
use crate::output;

pub async fn regions(client: &HalcyonClient, json: bool) -> Result<()> {
    let regions: Vec<Region> = client.get("/deploy/regions").await?;

    if json {
        return output::print_json(&regions);
    }

    let rows = regions
        .iter()
        .map(|r| vec![r.id.clone(), r.name.clone()])
        .collect();
    output::print_table(&["ID", "Name"], rows);
    Ok(())
}

pub async fn plans(client: &HalcyonClient, region: Option<String>, json: bool) -> Result<()> {
    let plans: Vec<Plan> = client
        .get_query("/deploy/plans", &[("region", region)])
        .await?;

    if json {
        return output::print_json(&plans);
    }

    let rows = plans
        .iter()
        .map(|p| {
            vec![
                p.id.to_string(),
                p.region_id.clone(),
                p.name.clone(),
                p.cpu_cores.to_string(),
                format!("{} MB", p.memory_mb),
                format!("{} GB", p.disk_gb),
                format!("{} GB", p.bandwidth_gb),
                format_cents(p.price_cents),
            ]
        })
        .collect();
    output::print_table(
        &["ID", "Region", "Name", "vCPU", "Memory", "Disk", "Transfer", "Price"],
        rows,
    );
    Ok(())
}

pub async fn templates(client: &HalcyonClient, plan_id: Uuid, json: bool) -> Result<()> {
    let templates: Vec<OsTemplate> = client
        .get_query("/deploy/templates", &[("plan_id", Some(plan_id.to_string()))])
        .await?;

    if json {
        return output::print_json(&templates);
    }

    let rows = templates
        .iter()
        .map(|t| {
            vec![
                t.id.to_string(),
                t.group.clone(),
                t.name.clone(),
                output::opt(&t.version),
                output::opt(&t.variant),
            ]
        })
        .collect();
    output::print_table(&["ID", "Group", "Name", "Version", "Variant"], rows);
    Ok(())
}

/// Checks the hostname and that the wallet covers the plan, then orders.
pub async fn create(
    client: &HalcyonClient,
    region: String,
    plan_id: Uuid,
    template_id: u64,
    hostname: String,
    ssh_key_ids: Vec<i64>,
    json: bool,
) -> Result<()> {
    validate_hostname(&hostname)?;

    let plans: Vec<Plan> = client
        .get_query("/deploy/plans", &[("region", Some(region.clone()))])
        .await?;
    let Some(plan) = plans.iter().find(|p| p.id == plan_id) else {
        bail!("plan {plan_id} is not offered in region '{region}'");
    };

    let wallet: WalletResponse = client.get("/wallet").await?;
    if wallet.balance_cents < plan.price_cents {
        bail!(
            "Insufficient balance: {} costs {}, your wallet has {}. Top up with `halcyon billing topup`.",
            plan.name,
            format_cents(plan.price_cents),
            format_cents(wallet.balance_cents)
        );
    }

    let resp: DeployResponse = client
        .post(
            "/deploy",
            &DeployRequest {
                region,
                plan_id,
                template_id,
                hostname: hostname.clone(),
                ssh_key_ids,
            },
        )
        .await?;

    if json {
        return output::print_json(&resp);
    }

    println!("Deploying {hostname} as server {}", resp.server_id);
    println!("Order:   {}", resp.order_id);
    println!("Balance: {}", format_cents(resp.balance_cents));
    Ok(())
}
