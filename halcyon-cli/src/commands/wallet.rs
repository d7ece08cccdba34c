use anyhow::{Result, bail};
use halcyon::money::format_cents;
use uuid::Uuid;

use crate::client::HalcyonClient;
use crate::models::*;
use crate::output;

pub async fn show(client: &HalcyonClient, json: bool) -> Result<()> {
    let w: WalletResponse = client.get("/wallet").await?;

    if json {
        return output::print_json(&w);
    }

    println!("Balance: {}", w.balance);
    if w.auto_topup.enabled {
        println!(
            "Auto top-up: {} when below {}",
            format_cents(w.auto_topup.amount_cents),
            format_cents(w.auto_topup.threshold_cents)
        );
    } else {
        println!("Auto top-up: off");
    }
    if let Some(ref err) = w.auto_topup.last_error {
        println!("Last auto top-up failed: {err}");
    }
    Ok(())
}

pub async fn transactions(
    client: &HalcyonClient,
    kind: Option<String>,
    user_id: Option<Uuid>,
    page: i64,
    per_page: i64,
    json: bool,
) -> Result<()> {
    let resp: PaginatedResponse<Transaction> = client
        .get_query(
            "/wallet/transactions",
            &[
                ("kind", kind),
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
        .map(|t| {
            vec![
                t.created_at.format("%Y-%m-%d %H:%M").to_string(),
                t.kind.clone(),
                format_cents(t.amount_cents),
                format_cents(t.balance_after_cents),
                t.description.clone(),
            ]
        })
        .collect();
    output::print_table(&["Date", "Kind", "Amount", "Balance", "Description"], rows);
    output::print_pagination(resp.page, resp.per_page, resp.total);
    Ok(())
}

pub async fn export(client: &HalcyonClient, format: &str, output_file: Option<&str>) -> Result<()> {
    if !matches!(format, "csv" | "json") {
        bail!("Unsupported export format: {format} (use csv or json)");
    }
    let body = client
        .get_text(&format!("/wallet/transactions/export?format={format}"))
        .await?;

    match output_file {
        Some(path) => {
            std::fs::write(path, &body)?;
            println!("Exported transactions to {path}");
        }
        None => print!("{body}"),
    }
    Ok(())
}
