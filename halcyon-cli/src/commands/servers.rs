use anyhow::{Result, bail};
use halcyon::ServerAction;

use crate::client::HalcyonClient;
use crate::commands::admin::status_label;
use crate::models::*;
use crate::output;

pub async fn list(client: &HalcyonClient, json: bool) -> Result<()> {
    let resp: DataList<Server> = client.get("/servers").await?;

    if json {
        return output::print_json(&resp.data);
    }

    if resp.data.is_empty() {
        println!("No servers yet. Deploy one with `halcyon deploy create`.");
        return Ok(());
    }

    let rows = resp
        .data
        .iter()
        .map(|s| {
            vec![
                s.id.to_string(),
                s.name.clone(),
                output::opt(&s.hostname),
                output::opt(&s.ipv4),
                status_label(s),
                output::opt(&s.created),
            ]
        })
        .collect();
    output::print_table(&["ID", "Name", "Hostname", "IPv4", "Status", "Created"], rows);
    Ok(())
}

pub async fn get(client: &HalcyonClient, id: u64, json: bool) -> Result<()> {
    let s: Server = client.get(&format!("/servers/{id}")).await?;

    if json {
        return output::print_json(&s);
    }

    output::print_record(vec![
        ("ID", s.id.to_string()),
        ("Name", s.name.clone()),
        ("Hostname", output::opt(&s.hostname)),
        ("Status", status_label(&s)),
        ("IPv4", output::opt(&s.ipv4)),
        ("Created", output::opt(&s.created)),
    ]);
    Ok(())
}

pub async fn power(client: &HalcyonClient, id: u64, action: &str, json: bool) -> Result<()> {
    let action: ServerAction = action.parse()?;
    if !action.is_power() {
        bail!("only start, stop and restart are available for your servers");
    }

    let resp: ServerActionResponse = client
        .post_empty(&format!("/servers/{id}/power/{action}"))
        .await?;

    if json {
        return output::print_json(&resp);
    }

    println!("{} sent to server {}", resp.action, resp.server_id);
    Ok(())
}
