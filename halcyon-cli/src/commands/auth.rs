use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};

use crate::client::HalcyonClient;
use crate::config;
use crate::models::*;
use crate::output;

/// Reads a password from stdin when it wasn't given as a flag.
fn password_or_prompt(password: Option<String>, prompt: &str) -> Result<String> {
    if let Some(p) = password {
        return Ok(p);
    }
    print!("{prompt}: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn save_session(resp: &LoginResponse) -> Result<()> {
    config::set_config_value("token", &resp.token)?;
    println!("Signed in as {} ({})", resp.user.email, resp.user.role);
    if resp.user.force_password_change {
        println!("Your password must be changed: run `halcyon auth change-password`.");
    }
    Ok(())
}

pub async fn login(client: &HalcyonClient, email: String, password: Option<String>) -> Result<()> {
    let password = password_or_prompt(password, "Password")?;
    let resp: LoginResponse = client
        .post("/auth/login", &LoginRequest { email, password })
        .await?;
    save_session(&resp)
}

pub async fn register(
    client: &HalcyonClient,
    email: String,
    name: String,
    password: Option<String>,
) -> Result<()> {
    let password = password_or_prompt(password, "Choose a password")?;
    let resp: LoginResponse = client
        .post(
            "/auth/register",
            &RegisterRequest {
                email,
                password,
                name,
            },
        )
        .await?;
    save_session(&resp)
}

pub fn logout() -> Result<()> {
    config::clear_config_value("token")
}

pub async fn me(client: &HalcyonClient, json: bool) -> Result<()> {
    let user: User = client.get("/auth/me").await?;

    if json {
        return output::print_json(&user);
    }

    output::print_record(vec![
        ("ID", user.id.to_string()),
        ("Email", user.email.clone()),
        ("Name", user.name.clone()),
        ("Role", user.role.clone()),
        ("VirtFusion user", output::opt(&user.vf_user_id)),
        ("Member since", user.created_at.format("%Y-%m-%d").to_string()),
    ]);
    Ok(())
}

pub async fn change_password(
    client: &HalcyonClient,
    current: Option<String>,
    new: Option<String>,
) -> Result<()> {
    let current_password = password_or_prompt(current, "Current password")?;
    let new_password = password_or_prompt(new, "New password")?;
    let _: serde_json::Value = client
        .post(
            "/auth/change-password",
            &ChangePasswordRequest {
                current_password,
                new_password,
            },
        )
        .await?;
    println!("Password changed");
    Ok(())
}
