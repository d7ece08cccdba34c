use anyhow::Result;
use halcyon::money::{format_cents, parse_dollars};
use halcyon::validation::{
    validate_auto_topup, validate_topup_amount, AUTO_TOPUP_AMOUNTS_CENTS,
    AUTO_TOPUP_THRESHOLDS_CENTS, TOPUP_PRESETS_CENTS,
};

use crate::client::HalcyonClient;
use crate::models::*;
use crate::output;

fn preset_line(presets: &[i64]) -> String {
    presets
        .iter()
        .map(|c| format_cents(*c))
        .collect::<Vec<_>>()
        .join(", ")
}

// ─── Top-up ──────────────────────────────────────────────

pub async fn topup(
    client: &HalcyonClient,
    amount: Option<&str>,
    card: Option<String>,
    json: bool,
) -> Result<()> {
    let Some(amount) = amount else {
        println!("Presets: {}", preset_line(TOPUP_PRESETS_CENTS));
        println!("Pass one with --amount, or any whole-cent amount from $5.00 to $500.00.");
        return Ok(());
    };
    let amount_cents = parse_dollars(amount)?;
    validate_topup_amount(amount_cents)?;

    let resp: TopupResponse = client
        .post(
            "/billing/topup",
            &TopupRequest {
                amount_cents,
                payment_method_id: card,
            },
        )
        .await?;

    if json {
        return output::print_json(&resp);
    }

    match (resp.status.as_str(), resp.checkout_url, resp.session_id) {
        ("succeeded", _, _) => {
            println!("Charged {}.", format_cents(amount_cents));
            if let Some(balance) = resp.balance_cents {
                println!("Balance: {}", format_cents(balance));
            }
        }
        (_, Some(url), session) => {
            println!("Complete the payment in your browser:\n  {url}");
            if let Some(session) = session {
                println!("Then run: halcyon billing confirm {session}");
            }
        }
        (status, None, _) => println!("Top-up status: {status}"),
    }
    Ok(())
}

pub async fn confirm(client: &HalcyonClient, session_id: String, json: bool) -> Result<()> {
    let resp: ConfirmCheckoutResponse = client
        .post("/billing/checkout/confirm", &ConfirmCheckoutRequest { session_id })
        .await?;

    if json {
        return output::print_json(&resp);
    }

    if resp.credited {
        println!("Payment received. Balance: {}", format_cents(resp.balance_cents));
    } else {
        println!("Already credited. Balance: {}", format_cents(resp.balance_cents));
    }
    Ok(())
}

// ─── Auto top-up ─────────────────────────────────────────

fn print_auto_topup(s: &AutoTopupSettings) {
    output::print_record(vec![
        ("Enabled", s.enabled.to_string()),
        ("When below", format_cents(s.threshold_cents)),
        ("Top up by", format_cents(s.amount_cents)),
        ("Card", output::opt(&s.payment_method_id)),
        (
            "Last attempt",
            s.last_attempt_at.map_or("-".into(), |t| t.to_rfc3339()),
        ),
        ("Last error", output::opt(&s.last_error)),
    ]);
}

pub async fn show_auto_topup(client: &HalcyonClient, json: bool) -> Result<()> {
    let s: AutoTopupSettings = client.get("/billing/auto-topup").await?;

    if json {
        return output::print_json(&s);
    }

    print_auto_topup(&s);
    Ok(())
}

/// Fields left out keep their current value.
pub async fn set_auto_topup(
    client: &HalcyonClient,
    enabled: Option<bool>,
    threshold: Option<&str>,
    amount: Option<&str>,
    card: Option<String>,
    json: bool,
) -> Result<()> {
    let current: AutoTopupSettings = client.get("/billing/auto-topup").await?;

    let threshold_cents = match threshold {
        Some(t) => parse_dollars(t)?,
        None => current.threshold_cents,
    };
    let amount_cents = match amount {
        Some(a) => parse_dollars(a)?,
        None => current.amount_cents,
    };
    let body = UpdateAutoTopup {
        enabled: enabled.unwrap_or(current.enabled),
        threshold_cents,
        amount_cents,
        payment_method_id: card.or(current.payment_method_id),
    };

    validate_auto_topup(
        body.enabled,
        body.threshold_cents,
        body.amount_cents,
        body.payment_method_id.as_deref(),
    )
    .map_err(|e| {
        anyhow::anyhow!(
            "{e} (thresholds: {}; amounts: {})",
            preset_line(AUTO_TOPUP_THRESHOLDS_CENTS),
            preset_line(AUTO_TOPUP_AMOUNTS_CENTS)
        )
    })?;

    let updated: AutoTopupSettings = client.put("/billing/auto-topup", &body).await?;

    if json {
        return output::print_json(&updated);
    }

    print_auto_topup(&updated);
    Ok(())
}

// ─── Cards ───────────────────────────────────────────────

pub async fn list_cards(client: &HalcyonClient, json: bool) -> Result<()> {
    let resp: DataList<PaymentMethod> = client.get("/payment-methods").await?;

    if json {
        return output::print_json(&resp.data);
    }

    let rows = resp
        .data
        .iter()
        .map(|m| {
            vec![
                m.id.clone(),
                m.brand.clone(),
                format!("•••• {}", m.last4),
                format!("{:02}/{}", m.exp_month, m.exp_year),
                if m.is_default { "yes".into() } else { String::new() },
            ]
        })
        .collect();
    output::print_table(&["ID", "Brand", "Number", "Expires", "Default"], rows);
    Ok(())
}

pub async fn add_card(client: &HalcyonClient, json: bool) -> Result<()> {
    let resp: SetupIntentResponse = client.post_empty("/payment-methods/setup-intent").await?;

    if json {
        return output::print_json(&resp);
    }

    println!("Card setup started. Finish entering the card with the processor using:");
    println!("  client secret: {}", resp.client_secret);
    Ok(())
}

pub async fn set_default_card(client: &HalcyonClient, id: &str) -> Result<()> {
    let _: serde_json::Value = client
        .post_empty(&format!("/payment-methods/{id}/default"))
        .await?;
    println!("{id} is now the default card");
    Ok(())
}

pub async fn remove_card(client: &HalcyonClient, id: &str, json: bool) -> Result<()> {
    let resp: RemovedPaymentMethod = client.delete_json(&format!("/payment-methods/{id}")).await?;

    if json {
        return output::print_json(&resp);
    }

    println!("Removed card {id}");
    if resp.auto_topup_disabled {
        println!("Auto top-up was using this card and has been turned off.");
    }
    Ok(())
}
