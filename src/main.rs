//! Muster administrative CLI
//!
//! ## Usage
//!
//! ```bash
//! # Create the storage directory, default config and database
//! muster init
//!
//! # Register (secret from --secret or MUSTER_SECRET)
//! muster register --user root@example.org --name Root --secret pw1
//!
//! # Approve an account, then make it a lead
//! muster --user root@example.org approve opa@example.org
//! muster --user root@example.org set-role opa@example.org lead
//!
//! # Tickets and calendar
//! muster --user root@example.org tickets create --category ServerAdmin --title "Broken Spawn" --body "..." --severity 8
//! muster --user opa@example.org calendar set 2025-03-01 --time 20:00 --location Discord --mission "CQB drills"
//! ```
//!
//! Results go to stdout as JSON; logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use muster::services::spawn_logging_listener;
use muster::{
    Actor, ApprovalStatus, CalendarInput, Config, DeskDb, NewTicket, ParentRef, RequestContext,
    ResourceKind, Role, Services, Severity, TicketStatus,
};

#[derive(Parser, Debug)]
#[command(name = "muster")]
#[command(about = "Role-gated ticket desk and mission calendar")]
struct Args {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(long, global = true)]
    storage_dir: Option<PathBuf>,

    /// Acting account identifier
    #[arg(short, long, global = true, env = "MUSTER_USER")]
    user: Option<String>,

    /// Secret for the acting account
    #[arg(long, global = true, env = "MUSTER_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the storage directory, config and database
    Init,

    /// Register a new account as --user
    Register {
        /// Display name
        #[arg(short, long)]
        name: String,
    },

    /// Show the approval status of --user
    Status,

    /// Approve an account (SuperAdmin)
    Approve {
        target: String,
        /// Put the account back to pending instead
        #[arg(long)]
        revoke: bool,
    },

    /// Change an account's role (SuperAdmin)
    SetRole {
        target: String,
        /// super_admin, admin, lead, member or pending
        role: Role,
    },

    /// List accounts (Admin tier)
    Accounts {
        /// Only pending or approved accounts
        #[arg(long)]
        approval: Option<ApprovalStatus>,
    },

    /// Ticket channels
    #[command(subcommand)]
    Tickets(TicketCommands),

    /// Mission calendar
    #[command(subcommand)]
    Calendar(CalendarCommands),

    /// Database statistics
    Stats,
}

#[derive(Debug, Subcommand)]
enum TicketCommands {
    /// List tickets, highest severity first
    List {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        status: Option<TicketStatus>,
    },

    /// Channels with open and unread counts
    Categories,

    /// Show a ticket and its discussion
    Show { id: i64 },

    /// Create a ticket
    Create {
        #[arg(long)]
        category: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        body: String,
        /// 1 (lowest) to 10 (highest)
        #[arg(long)]
        severity: u8,
        #[arg(long)]
        assignee: Option<String>,
    },

    Resolve { id: i64 },

    Reopen { id: i64 },

    /// Delete a ticket and its discussion (SuperAdmin)
    Purge { id: i64 },

    /// Post to a ticket's discussion
    Post { id: i64, body: String },

    /// Unread tickets (Admin tier)
    Unread {
        #[arg(long)]
        category: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum CalendarCommands {
    /// List entries; defaults to the upcoming window from today
    List {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Show one day and its discussion
    Show { date: NaiveDate },

    /// Create or replace a day's entry (Lead tier)
    Set {
        date: NaiveDate,
        /// 24h HH:MM
        #[arg(long)]
        time: String,
        #[arg(long)]
        timezone: Option<String>,
        #[arg(long)]
        location: String,
        #[arg(long)]
        mission: String,
    },

    /// Delete a day with its roster and discussion (Lead tier)
    Remove { date: NaiveDate },

    /// RSVP; --account answers for someone else (Lead tier)
    Rsvp {
        date: NaiveDate,
        #[arg(long)]
        account: Option<String>,
    },

    /// Withdraw an RSVP
    Withdraw {
        date: NaiveDate,
        #[arg(long)]
        account: Option<String>,
    },

    /// Post to a day's discussion
    Post { date: NaiveDate, body: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing; stdout is reserved for command output
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("muster=info"));
    let json = args.log_json;
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();

    // Load config
    let mut config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };

    // Apply CLI overrides
    if let Some(dir) = args.storage_dir.clone() {
        config.storage_dir = dir;
    }
    config.validate()?;

    if matches!(args.command, Command::Init) {
        return init(&config).await;
    }

    if !config.database_path().exists() {
        bail!(
            "no database at {}; run `muster init` first",
            config.database_path().display()
        );
    }

    let db = Arc::new(DeskDb::open(&config.storage_dir)?.with_default_timeout(config.op_timeout()));
    let services = Services::new(db.clone(), &config)?;
    let listener = spawn_logging_listener(services.events.clone());

    let result = run(&args, &services, &db);

    // Dropping the last bus handle lets the listener drain and exit
    drop(services);
    if let Err(e) = listener.await {
        warn!("Event listener task failed: {}", e);
    }

    result
}

async fn init(config: &Config) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&config.storage_dir).await?;

    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    DeskDb::open(&config.storage_dir)?;
    info!(path = %config.database_path().display(), "Database ready");
    Ok(())
}

fn run(args: &Args, services: &Services, db: &DeskDb) -> anyhow::Result<()> {
    match &args.command {
        // Handled before the database is opened
        Command::Init => Ok(()),

        Command::Register { name } => {
            let (user, secret) = credentials(args)?;
            print_json(&services.identity.register(user, name, secret)?)
        }

        Command::Status => {
            let (user, secret) = credentials(args)?;
            print_json(&services.identity.approval_status(user, secret)?)
        }

        Command::Approve { target, revoke } => {
            let ctx = login(args, services)?;
            let status = if *revoke {
                ApprovalStatus::Pending
            } else {
                ApprovalStatus::Approved
            };
            print_json(&services.identity.set_approval(&ctx, target, status)?)
        }

        Command::SetRole { target, role } => {
            let ctx = login(args, services)?;
            print_json(&services.identity.set_role(&ctx, target, *role)?)
        }

        Command::Accounts { approval } => {
            let ctx = login(args, services)?;
            print_json(&services.identity.list(&ctx, *approval)?)
        }

        Command::Tickets(cmd) => {
            let ctx = login(args, services)?;
            run_tickets(cmd, &ctx, services)
        }

        Command::Calendar(cmd) => {
            let ctx = login(args, services)?;
            run_calendar(cmd, &ctx, services, Utc::now().date_naive())
        }

        Command::Stats => print_json(&db.stats()?),
    }
}

fn run_tickets(cmd: &TicketCommands, ctx: &RequestContext, services: &Services) -> anyhow::Result<()> {
    let tickets = &services.tickets;

    match cmd {
        TicketCommands::List { category, status } => {
            print_json(&tickets.list(ctx, category.as_deref(), *status)?)
        }
        TicketCommands::Categories => print_json(&tickets.categories(ctx)?),
        TicketCommands::Show { id } => {
            let ticket = tickets.get(ctx, *id)?;
            let discussion = services.discussion.list_for(ctx, ParentRef::Ticket(*id))?;
            print_json(&serde_json::json!({ "ticket": ticket, "discussion": discussion }))
        }
        TicketCommands::Create {
            category,
            title,
            body,
            severity,
            assignee,
        } => {
            let input = NewTicket {
                category: category.clone(),
                title: title.clone(),
                body: body.clone(),
                severity: Severity::new(*severity)?,
                assignee: assignee.clone(),
            };
            print_json(&tickets.create(ctx, input)?)
        }
        TicketCommands::Resolve { id } => print_json(&tickets.resolve(ctx, *id)?),
        TicketCommands::Reopen { id } => print_json(&tickets.reopen(ctx, *id)?),
        TicketCommands::Purge { id } => {
            tickets.purge(ctx, *id)?;
            print_json(&serde_json::json!({ "purged": id }))
        }
        TicketCommands::Post { id, body } => {
            print_json(&services.discussion.post(ctx, ParentRef::Ticket(*id), body)?)
        }
        TicketCommands::Unread { category } => {
            print_json(&services.notifications.unread(ctx, category.as_deref())?)
        }
    }
}

fn run_calendar(
    cmd: &CalendarCommands,
    ctx: &RequestContext,
    services: &Services,
    today: NaiveDate,
) -> anyhow::Result<()> {
    let calendar = &services.calendar;
    // Editors see audit fields; everyone else gets the briefing projection
    let member_view = !services.policy.can_write(ctx.role(), ResourceKind::Calendar);

    match cmd {
        CalendarCommands::List { from, to } => {
            let from = from.unwrap_or(today);
            let entries = match to {
                Some(to) => calendar.list_range(ctx, from, *to)?,
                None => calendar.upcoming(ctx, from)?,
            };
            if member_view {
                let briefings: Vec<_> = entries.iter().map(|e| e.briefing()).collect();
                print_json(&briefings)
            } else {
                print_json(&entries)
            }
        }
        CalendarCommands::Show { date } => {
            let entry = calendar.get(ctx, *date)?;
            let discussion = services.discussion.list_for(ctx, ParentRef::Calendar(*date))?;
            if member_view {
                print_json(&serde_json::json!({ "entry": entry.briefing(), "discussion": discussion }))
            } else {
                print_json(&serde_json::json!({ "entry": entry, "discussion": discussion }))
            }
        }
        CalendarCommands::Set {
            date,
            time,
            timezone,
            location,
            mission,
        } => {
            let input = CalendarInput {
                time: time.clone(),
                timezone: timezone.clone(),
                location: location.clone(),
                mission_body: mission.clone(),
            };
            print_json(&calendar.upsert(ctx, *date, input)?)
        }
        CalendarCommands::Remove { date } => {
            calendar.remove(ctx, *date)?;
            print_json(&serde_json::json!({ "removed": date }))
        }
        CalendarCommands::Rsvp { date, account } => {
            let account = account.as_deref().unwrap_or(ctx.actor_id());
            print_json(&calendar.rsvp(ctx, *date, account)?.briefing())
        }
        CalendarCommands::Withdraw { date, account } => {
            let account = account.as_deref().unwrap_or(ctx.actor_id());
            print_json(&calendar.withdraw(ctx, *date, account)?.briefing())
        }
        CalendarCommands::Post { date, body } => {
            print_json(&services.discussion.post(ctx, ParentRef::Calendar(*date), body)?)
        }
    }
}

fn credentials(args: &Args) -> anyhow::Result<(&str, &str)> {
    let user = args.user.as_deref().context("--user is required")?;
    let secret = args
        .secret
        .as_deref()
        .context("--secret or MUSTER_SECRET is required")?;
    Ok((user, secret))
}

/// Authenticate --user and build the request context
fn login(args: &Args, services: &Services) -> anyhow::Result<RequestContext> {
    let (user, secret) = credentials(args)?;
    let account = services.identity.authenticate(user, secret)?;
    let ctx = RequestContext::new(Actor::from(&account));
    debug!(%ctx, "Authenticated");
    Ok(ctx)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
