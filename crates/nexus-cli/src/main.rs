//! Nexus CLI: command-line client for the provisioning API.
//!
//! Set PROVISIONING_API_SECRET and NEXUS_API_URL (or PROVISIONING_API_URL).

use anyhow::Context;
use clap::{Parser, Subcommand};
use nexus_api_client::{ApiClient, ProvisionOutcome, RotationOutcome};
use nexus_cli::{describe_poll_state, init_tracing, poll_exit_code};
use nexus_core::models::{Plan, ProvisionRequest, TenantStatus, UpdateCredentialsRequest};
use nexus_core::{wait_for_ready, PollPolicy, PollState};
use serde::Serialize;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "nexus", about = "Nexus tenant provisioning CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether an organization name or subdomain is available
    Check {
        /// Organization name or subdomain candidate
        name: String,
    },
    /// Provision a new tenant site
    Provision {
        /// Organization display name (normalized into the subdomain)
        organization: String,
        /// Owner/admin email address
        #[arg(long)]
        email: String,
        /// Admin password (generated when omitted)
        #[arg(long)]
        password: Option<String>,
        /// Admin display name
        #[arg(long)]
        name: Option<String>,
        /// free, pro or enterprise
        #[arg(long, default_value = "free")]
        plan: Plan,
        /// Return immediately and provision in the background
        #[arg(long)]
        background: bool,
        /// With --background: poll until the workspace is ready
        #[arg(long)]
        wait: bool,
    },
    /// Show provisioning status, optionally polling until ready
    Status {
        subdomain: String,
        #[arg(long)]
        wait: bool,
        /// Seconds between checks
        #[arg(long, default_value = "5")]
        interval: u64,
        /// Give up after this many seconds
        #[arg(long, default_value = "300")]
        timeout: u64,
    },
    /// Look up an owner's existing workspace
    Resolve { email: String },
    /// Show a tenant's registry record
    Get { subdomain: String },
    /// Finish a pending tenant
    Resume { subdomain: String },
    /// Issue a new API credential pair for a tenant
    Rotate { subdomain: String },
    /// Report a tenant's credentials into the registry
    UpdateCredentials {
        tenant: String,
        #[arg(long)]
        api_key: String,
        #[arg(long)]
        api_secret: String,
        #[arg(long)]
        owner_email: Option<String>,
        #[arg(long)]
        site_url: Option<String>,
    },
    /// Change a tenant's lifecycle status
    SetStatus {
        subdomain: String,
        /// trial, active, suspended or cancelled
        status: TenantStatus,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

async fn poll(client: &ApiClient, subdomain: &str, policy: PollPolicy) -> PollState {
    wait_for_ready(client, subdomain, policy, |state| {
        tracing::info!(subdomain = %subdomain, "{}", describe_poll_state(state));
    })
    .await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let client = ApiClient::from_env().context(
        "Failed to create API client. Set PROVISIONING_API_SECRET and NEXUS_API_URL",
    )?;

    match cli.command {
        Commands::Check { name } => {
            print_json(&client.check_subdomain(&name).await?)?;
        }
        Commands::Provision {
            organization,
            email,
            password,
            name,
            plan,
            background,
            wait,
        } => {
            let request = ProvisionRequest {
                organization_name: organization,
                admin_email: email,
                admin_password: password,
                admin_name: name,
                plan,
                background,
            };
            let outcome = client.provision(&request).await?;
            print_json(&outcome)?;
            match outcome {
                ProvisionOutcome::Accepted(accepted) if wait => {
                    let state = poll(&client, &accepted.subdomain, PollPolicy::default()).await;
                    std::process::exit(poll_exit_code(&state));
                }
                ProvisionOutcome::Degraded(_) => std::process::exit(3),
                _ => {}
            }
        }
        Commands::Status {
            subdomain,
            wait,
            interval,
            timeout,
        } => {
            if wait {
                let policy =
                    PollPolicy::new(Duration::from_secs(interval), Duration::from_secs(timeout));
                let state = poll(&client, &subdomain, policy).await;
                if let PollState::Ready(report) = &state {
                    print_json(report)?;
                }
                std::process::exit(poll_exit_code(&state));
            }
            print_json(&client.provisioning_status(&subdomain).await?)?;
        }
        Commands::Resolve { email } => {
            print_json(&client.resolve_by_email(&email).await?)?;
        }
        Commands::Get { subdomain } => {
            print_json(&client.get_tenant(&subdomain).await?)?;
        }
        Commands::Resume { subdomain } => {
            let outcome = client.resume(&subdomain).await?;
            print_json(&outcome)?;
            if matches!(outcome, ProvisionOutcome::Degraded(_)) {
                std::process::exit(3);
            }
        }
        Commands::Rotate { subdomain } => {
            let outcome = client.rotate_credentials(&subdomain).await?;
            print_json(&outcome)?;
            if matches!(outcome, RotationOutcome::Degraded(_)) {
                std::process::exit(3);
            }
        }
        Commands::UpdateCredentials {
            tenant,
            api_key,
            api_secret,
            owner_email,
            site_url,
        } => {
            let request = UpdateCredentialsRequest {
                tenant_name: tenant,
                api_key,
                api_secret,
                owner_email,
                site_url,
            };
            print_json(&client.update_credentials(&request).await?)?;
        }
        Commands::SetStatus { subdomain, status } => {
            print_json(&client.change_status(&subdomain, status).await?)?;
        }
    }

    Ok(())
}
