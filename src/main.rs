//! Command-line front end for the STK-push dashboard

use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::time::Duration;
use stkpay::{
    config::env_vars, filter_customers, ClientConfig, DashboardClient, Navigation,
    NotificationLevel, PaymentPoller, PaymentState, PollConfig, RetryPolicy, Settings,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "stkpay", version, about = "M-Pesa STK-push dashboard client")]
struct Cli {
    /// Backend base URL
    #[arg(long, env = env_vars::API_BASE_URL, default_value = stkpay::config::DEFAULT_API_BASE_URL)]
    api_url: String,

    /// File holding the session token
    #[arg(long, env = env_vars::TOKEN_FILE, default_value = ".stkpay/session.json")]
    token_file: PathBuf,

    /// Request timeout in seconds
    #[arg(long, env = env_vars::TIMEOUT_SECS, default_value_t = 30)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check that the backend is up
    Health,
    /// Log in as a business, or as an admin with --admin
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "STKPAY_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        admin: bool,
    },
    /// Register a new business
    Signup {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "STKPAY_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the logged-in account and its pages
    Whoami,
    /// Send an STK push and wait for the payer's answer
    Push(PushArgs),
    /// Query the status of an initiated push once
    Status { checkout_id: String },
    /// List customers, optionally filtered by name or phone
    Customers {
        #[arg(long)]
        search: Option<String>,
    },
    /// Export customers to a spreadsheet
    ExportCustomers {
        #[arg(long)]
        out: Option<PathBuf>,
        /// Export every tenant's customers (admin)
        #[arg(long)]
        all: bool,
    },
    /// Show wallet balance and commission deductions
    Wallet,
    /// Show or update Daraja settings
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Administrator commands
    #[command(subcommand)]
    Admin(AdminCommand),
}

#[derive(Debug, Args)]
struct PushArgs {
    #[arg(long)]
    phone: String,
    #[arg(long)]
    amount: String,
    /// Seconds between status polls [default: 5, or STKPAY_POLL_INTERVAL_SECS]
    #[arg(long)]
    interval: Option<u64>,
    /// Consecutive transient poll failures tolerated; 0 fails on the first
    /// [default: 0, or STKPAY_POLL_RETRIES]
    #[arg(long)]
    retries: Option<u32>,
    /// Give up after this many seconds without an answer [or STKPAY_POLL_MAX_WAIT_SECS]
    #[arg(long)]
    max_wait: Option<u64>,
}

#[derive(Debug, Subcommand)]
enum SettingsCommand {
    Show,
    Update {
        #[arg(long)]
        consumer_key: String,
        #[arg(long)]
        consumer_secret: String,
        #[arg(long)]
        till_number: Option<String>,
        #[arg(long)]
        paybill_number: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum AdminCommand {
    Businesses,
    Transactions,
    Commissions,
    Suspend { business_id: u64 },
    Reactivate { business_id: u64 },
    SetCommission { rate: Decimal },
    Impersonate { business_id: u64 },
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::new(&cli.api_url)
        .with_timeout(Duration::from_secs(cli.timeout))
        .with_token_file(&cli.token_file);
    let client = DashboardClient::new(config)?;

    match run(client, cli.command).await {
        Err(e) if e.is_auth() => {
            eprintln!("{}", e.user_message());
            eprintln!("Not logged in or session expired; run `stkpay login` first.");
            std::process::exit(2);
        }
        other => other.map_err(Into::into),
    }
}

async fn run(client: DashboardClient, command: Command) -> stkpay::Result<()> {
    match command {
        Command::Health => {
            let health = client.health().await?;
            println!("backend: {}", health.status);
        }
        Command::Login {
            email,
            password,
            admin,
        } => {
            if admin {
                client.admin_login(&email, &password).await?;
            } else {
                client.login(&email, &password).await?;
            }
            println!("Logged in as {}", email);
        }
        Command::Signup {
            name,
            email,
            password,
        } => {
            let message = client.signup(&name, &email, &password).await?;
            println!("{}", message);
        }
        Command::Logout => {
            client.logout()?;
            println!("Logged out");
        }
        Command::Whoami => {
            let profile = client.profile().await?;
            let nav = Navigation::for_profile(&profile)?;
            match &nav {
                Navigation::Business(business) => println!("Business: {}", business.name),
                Navigation::Admin(admin) => println!("Admin: {}", admin.email),
            }
            for item in nav.items() {
                println!("  {:<22} {}", item.label, item.path);
            }
        }
        Command::Push(args) => {
            if !push(client, args).await? {
                std::process::exit(1);
            }
        }
        Command::Status { checkout_id } => {
            let status = client.transaction_status(&checkout_id.into()).await?;
            println!("{}", status);
        }
        Command::Customers { search } => {
            let customers = client.customers().await?;
            let shown = filter_customers(&customers, search.as_deref().unwrap_or(""));
            println!(
                "{:<24} {:<14} {:>14} {:>6}  {}",
                "NAME", "PHONE", "REQUESTED", "COUNT", "LAST"
            );
            for customer in shown {
                println!(
                    "{:<24} {:<14} {:>14} {:>6}  {}",
                    customer.name.as_deref().unwrap_or("-"),
                    customer.phone_number,
                    customer.total_amount_requested,
                    customer.transaction_count,
                    customer
                        .last_transaction_date
                        .map(|d| d.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                );
            }
        }
        Command::ExportCustomers { out, all } => {
            let export = if all {
                client.export_all_customers_excel().await?
            } else {
                client.export_customers_excel().await?
            };
            let path = out.unwrap_or_else(|| PathBuf::from(&export.file_name));
            tokio::fs::write(&path, &export.bytes).await?;
            println!("Wrote {} bytes to {}", export.bytes.len(), path.display());
        }
        Command::Wallet => {
            let wallet = client.wallet().await?;
            println!("Balance: {}", wallet.balance);
            for entry in wallet.commission_ledgers {
                println!("  {}  -{}", entry.timestamp, entry.amount);
            }
        }
        Command::Settings(SettingsCommand::Show) => {
            let settings = client.settings().await?;
            println!("consumer key:   {}", settings.consumer_key);
            println!("till number:    {}", settings.till_number.as_deref().unwrap_or("-"));
            println!("paybill number: {}", settings.paybill_number.as_deref().unwrap_or("-"));
        }
        Command::Settings(SettingsCommand::Update {
            consumer_key,
            consumer_secret,
            till_number,
            paybill_number,
        }) => {
            let settings = Settings {
                consumer_key,
                consumer_secret,
                till_number,
                paybill_number,
            };
            println!("{}", client.update_settings(&settings).await?);
        }
        Command::Admin(command) => admin(client, command).await?,
    }
    Ok(())
}

/// Returns whether the payment was confirmed
async fn push(client: DashboardClient, args: PushArgs) -> stkpay::Result<bool> {
    let mut poll_config = PollConfig::from_env()?;
    if let Some(secs) = args.interval {
        poll_config = poll_config.with_interval(Duration::from_secs(secs));
    }
    match args.retries {
        Some(0) => poll_config = poll_config.with_retry_policy(RetryPolicy::FailFast),
        Some(max_attempts) => {
            poll_config = poll_config.with_retry_policy(RetryPolicy::Bounded { max_attempts })
        }
        None => {}
    }
    if let Some(secs) = args.max_wait {
        poll_config = poll_config.with_max_wait(Duration::from_secs(secs));
    }

    let poller = PaymentPoller::new(client, poll_config)?;
    let mut states = poller.subscribe();
    let mut notifications = poller.notifications();

    let checkout_id = poller.submit(&args.phone, &args.amount).await?;
    println!("Prompt sent, checkout id {}", checkout_id);

    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                if let PaymentState::Pending { .. } = state {
                    println!("Waiting for the payer to confirm...");
                }
                if state.is_terminal() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                poller.cancel();
                println!("Stopped waiting; check later with `stkpay status {}`", checkout_id);
                return Ok(false);
            }
        }
    }

    // The failure reason reaches the user through its notification.
    while let Ok(notification) = notifications.try_recv() {
        match notification.level {
            NotificationLevel::Success => println!("{}", notification.message),
            NotificationLevel::Error => eprintln!("{}", notification.message),
        }
    }

    Ok(matches!(poller.state(), PaymentState::Success { .. }))
}

async fn admin(client: DashboardClient, command: AdminCommand) -> stkpay::Result<()> {
    match command {
        AdminCommand::Businesses => {
            for business in client.admin_businesses().await? {
                println!(
                    "{:>5}  {:<24} {:<32} {}  {}",
                    business.id,
                    business.name.as_deref().unwrap_or("-"),
                    business.email,
                    business.created_at,
                    if business.is_active { "active" } else { "suspended" }
                );
            }
        }
        AdminCommand::Transactions => {
            for tx in client.admin_transactions().await? {
                println!(
                    "{:>5}  {}  {:<14} {:>12} {:<8} business {}",
                    tx.id, tx.timestamp, tx.phone_number, tx.amount, tx.status, tx.business_id
                );
            }
        }
        AdminCommand::Commissions => {
            for entry in client.admin_commissions().await? {
                println!(
                    "{:>5}  {}  {:>12}  business {}",
                    entry.id, entry.timestamp, entry.amount, entry.business_id
                );
            }
        }
        AdminCommand::Suspend { business_id } => {
            println!("{}", client.suspend_business(business_id).await?)
        }
        AdminCommand::Reactivate { business_id } => {
            println!("{}", client.reactivate_business(business_id).await?)
        }
        AdminCommand::SetCommission { rate } => {
            println!("{}", client.set_commission_rate(rate).await?)
        }
        AdminCommand::Impersonate { business_id } => {
            client.impersonate(business_id).await?;
            println!("Session switched to business {}", business_id);
        }
    }
    Ok(())
}
