//! `tillwise` operator CLI: sign in, sign out, inspect the stored session.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};

use tillwise_client::{ApiClient, ClientConfig, Credentials, FileSessionStorage, SessionStore};

#[derive(Debug, Parser)]
#[command(name = "tillwise", about = "Tillwise back-office session tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sign in and store the session.
    Login {
        username: String,
        #[arg(env = "TILLWISE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and remove the stored session.
    Logout,
    /// Show whether a session is stored and when it expires.
    Status,
    /// Show the signed-in user and their permissions.
    Whoami,
}

#[tokio::main]
async fn main() {
    tillwise_observability::init_pretty();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ClientConfig::from_env();
    tracing::debug!(api = %config.api_base_url, "configuration loaded");

    let storage = FileSessionStorage::for_key(&config.session_key)?;
    let client = ApiClient::new(config).context("failed to build API client")?;
    let store = SessionStore::new(client, Arc::new(storage));
    store.init();

    let outcome = match cli.command {
        Command::Login { username, password } => login(&store, username, password).await,
        Command::Logout => {
            store.logout().await;
            println!("Signed out.");
            Ok(())
        }
        Command::Status => {
            status(&store);
            Ok(())
        }
        Command::Whoami => whoami(&store),
    };

    store.shutdown();
    outcome
}

async fn login(store: &SessionStore, username: String, password: String) -> anyhow::Result<()> {
    let session = store
        .login(&Credentials::new(username, password))
        .await
        .map_err(|e| {
            let message = e.user_message();
            anyhow::Error::new(e).context(message)
        })?;
    println!(
        "Signed in as {} ({} permissions), access token valid until {}.",
        session.user.display_name(),
        session.permissions.len(),
        session.access_token_expires_at.to_rfc3339(),
    );
    Ok(())
}

fn status(store: &SessionStore) {
    let Some(session) = store.current() else {
        println!("No session stored.");
        return;
    };

    let now = Utc::now();
    let remaining = session.access_token_expires_at - now;
    println!("state:        {:?}", store.state());
    println!("user:         {}", session.user.username);
    println!("expires at:   {}", session.access_token_expires_at.to_rfc3339());
    if remaining.num_seconds() > 0 {
        println!("expires in:   {}s", remaining.num_seconds());
    } else {
        println!("expires in:   expired");
    }
    println!("refreshable:  {}", session.refresh_token().is_some());
    if let Some(claims) = &session.claims {
        if let Some(sub) = claims.sub.as_deref() {
            println!("token sub:    {sub}");
        }
        if let Some(exp) = claims.expires_at() {
            println!("token exp:    {}", exp.to_rfc3339());
        }
    }
}

fn whoami(store: &SessionStore) -> anyhow::Result<()> {
    let session = store.current().context("not signed in")?;
    let user = &session.user;

    println!("{} <{}>", user.display_name(), user.email.as_deref().unwrap_or("-"));
    println!("username: {}", user.username);
    println!("role:     {}", user.role.as_deref().unwrap_or("-"));
    if session.permissions.grants_all() {
        println!("permissions: all");
    } else {
        println!("permissions:");
        for code in session.permissions.iter() {
            println!("  {code}");
        }
    }
    Ok(())
}
