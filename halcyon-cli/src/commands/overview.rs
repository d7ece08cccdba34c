use std::time::Duration;

use anyhow::Result;
use halcyon::money::format_cents;

use crate::client::HalcyonClient;
use crate::models::*;
use crate::output;

/// Dashboard refresh period for `overview --watch`.
pub const WATCH_INTERVAL: Duration = Duration::from_secs(30);

pub async fn overview(client: &HalcyonClient, watch: bool, json: bool) -> Result<()> {
    if !watch {
        return show(client, json).await;
    }

    let mut ticker = tokio::time::interval(WATCH_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !json {
                    // Clear screen and home the cursor
                    print!("\x1B[2J\x1B[H");
                }
                // A failed poll is shown and retried on the next tick
                if let Err(e) = show(client, json).await {
                    eprintln!("Error: {e:#}");
                }
                if !json {
                    println!(
                        "\nRefreshing every {}s, Ctrl-C to stop",
                        WATCH_INTERVAL.as_secs()
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

async fn show(client: &HalcyonClient, json: bool) -> Result<()> {
    let o: AdminOverview = client.get("/admin/overview").await?;

    if json {
        return output::print_json(&o);
    }

    println!("=== Halcyon Overview ===\n");
    output::print_table(
        &["Metric", "Value"],
        vec![
            vec!["Servers".into(), o.servers_total.to_string()],
            vec![
                "Hypervisors".into(),
                format!(
                    "{} ({} enabled, {} in maintenance)",
                    o.hypervisors_total, o.hypervisors_enabled, o.hypervisors_maintenance
                ),
            ],
            vec!["Avg CPU".into(), output::percent(o.avg_cpu_utilization)],
            vec!["Avg Memory".into(), output::percent(o.avg_memory_utilization)],
            vec![
                "IPv4 free".into(),
                format!("{} of {}", o.ipv4_free, o.ipv4_total),
            ],
            vec!["Customers".into(), o.customers.to_string()],
            vec!["Open tickets".into(), o.open_tickets.to_string()],
            vec![
                "Wallet balances".into(),
                format_cents(o.wallet_balance_total_cents),
            ],
            vec!["Revenue (30d)".into(), format_cents(o.revenue_30d_cents)],
        ],
    );
    Ok(())
}
