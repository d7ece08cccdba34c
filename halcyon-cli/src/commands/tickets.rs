use anyhow::{Result, bail};
use halcyon::tickets::{
    validate_body, validate_subject, TicketCategory, TicketPriority, TicketStatus,
};
use uuid::Uuid;

use crate::client::HalcyonClient;
use crate::models::*;
use crate::output;

#[allow(clippy::too_many_arguments)]
pub async fn list(
    client: &HalcyonClient,
    status: Option<String>,
    priority: Option<String>,
    category: Option<String>,
    page: i64,
    per_page: i64,
    json: bool,
) -> Result<()> {
    if let Some(ref s) = status {
        s.parse::<TicketStatus>()?;
    }
    if let Some(ref p) = priority {
        p.parse::<TicketPriority>()?;
    }
    if let Some(ref c) = category {
        c.parse::<TicketCategory>()?;
    }

    let resp: PaginatedResponse<Ticket> = client
        .get_query(
            "/support/tickets",
            &[
                ("status", status),
                ("priority", priority),
                ("category", category),
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
                t.id.to_string(),
                t.subject.clone(),
                t.status.clone(),
                t.priority.clone(),
                t.category.clone(),
                t.updated_at.format("%Y-%m-%d %H:%M").to_string(),
            ]
        })
        .collect();
    output::print_table(
        &["ID", "Subject", "Status", "Priority", "Category", "Updated"],
        rows,
    );
    output::print_pagination(resp.page, resp.per_page, resp.total);
    Ok(())
}

/// Ticket header followed by the conversation, oldest message first.
pub async fn get(client: &HalcyonClient, id: Uuid, json: bool) -> Result<()> {
    let ticket: Ticket = client.get(&format!("/support/tickets/{id}")).await?;
    let messages: Vec<TicketMessage> = client
        .get(&format!("/support/tickets/{id}/messages"))
        .await?;

    if json {
        return output::print_json(&serde_json::json!({
            "ticket": ticket,
            "messages": messages,
        }));
    }

    output::print_record(vec![
        ("ID", ticket.id.to_string()),
        ("Subject", ticket.subject.clone()),
        ("Status", ticket.status.clone()),
        ("Priority", ticket.priority.clone()),
        ("Category", ticket.category.clone()),
        ("Server", output::opt(&ticket.server_id)),
        ("Opened", ticket.created_at.to_rfc3339()),
    ]);

    for m in &messages {
        let who = if m.is_staff {
            format!("{} (staff)", m.user_email)
        } else {
            m.user_email.clone()
        };
        println!("\n── {who}, {} ──", m.created_at.format("%Y-%m-%d %H:%M"));
        println!("{}", m.body);
    }
    Ok(())
}

pub async fn create(
    client: &HalcyonClient,
    subject: String,
    body: String,
    priority: String,
    category: String,
    server_id: Option<i64>,
    json: bool,
) -> Result<()> {
    validate_subject(&subject)?;
    validate_body(&body)?;
    priority.parse::<TicketPriority>()?;
    category.parse::<TicketCategory>()?;

    let ticket: Ticket = client
        .post(
            "/support/tickets",
            &CreateTicket {
                subject,
                body,
                priority,
                category,
                server_id,
            },
        )
        .await?;

    if json {
        return output::print_json(&ticket);
    }

    println!("Opened ticket {} ({})", ticket.id, ticket.subject);
    Ok(())
}

pub async fn reply(client: &HalcyonClient, id: Uuid, body: String, json: bool) -> Result<()> {
    validate_body(&body)?;

    let message: TicketMessage = client
        .post(
            &format!("/support/tickets/{id}/messages"),
            &CreateTicketMessage { body },
        )
        .await?;

    if json {
        return output::print_json(&message);
    }

    println!("Reply added to ticket {id}");
    Ok(())
}

pub async fn update(
    client: &HalcyonClient,
    id: Uuid,
    status: Option<String>,
    priority: Option<String>,
    json: bool,
) -> Result<()> {
    if status.is_none() && priority.is_none() {
        bail!("nothing to change; pass --status and/or --priority");
    }
    if let Some(ref s) = status {
        s.parse::<TicketStatus>()?;
    }
    if let Some(ref p) = priority {
        p.parse::<TicketPriority>()?;
    }

    let ticket: Ticket = client
        .patch(
            &format!("/support/tickets/{id}"),
            &UpdateTicket { status, priority },
        )
        .await?;

    if json {
        return output::print_json(&ticket);
    }

    println!(
        "Ticket {} is {} ({} priority)",
        ticket.id, ticket.status, ticket.priority
    );
    Ok(())
}
