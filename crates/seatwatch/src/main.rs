use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use lettre::message::Mailbox;
use seatwatch::catalog::{CatalogClient, CourseQuery, FetchError, SeatSource, Term};
use seatwatch::config::Config;
use seatwatch::logging::{setup_logging, LogFormat};
use seatwatch::notify::{NotificationSender, NO_RELAY_WARNING};
use seatwatch::watch::{format_countdown, NotifyPolicy, WatchEvent, WatchLoop, WatchSession};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

/// Checks for open seats in a UVic course section.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the current seat and waitlist counts once
    Check(CourseArgs),

    /// Keep checking and email when seats open
    Watch {
        #[command(flatten)]
        course: CourseArgs,

        /// Address to notify
        #[arg(long, value_parser = parse_email)]
        email: Mailbox,

        /// Seconds between checks (min 120)
        #[arg(long)]
        interval: Option<u64>,

        /// Also notify when waitlist seats open
        #[arg(long)]
        notify_waitlist: bool,

        /// Overrides the configured notification policy
        #[arg(long, value_parser = parse_policy)]
        notify_policy: Option<NotifyPolicy>,
    },
}

#[derive(Debug, Args)]
struct CourseArgs {
    /// The code for the course (eg: SENG)
    subject: String,

    /// The number of the course (eg: 275)
    number: u32,

    /// The section to check (eg: A01, B01 or T01)
    section: String,

    #[command(flatten)]
    term: TermArgs,
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
struct TermArgs {
    /// Course in the summer term (May start)
    #[arg(short, long)]
    summer: bool,

    /// Course in the fall term (September start)
    #[arg(short, long)]
    fall: bool,

    /// Course in the winter term (January start)
    #[arg(short, long)]
    winter: bool,
}

impl TermArgs {
    fn term(&self) -> Term {
        if self.summer {
            Term::Summer
        } else if self.fall {
            Term::Fall
        } else {
            Term::Winter
        }
    }
}

impl CourseArgs {
    fn query(&self) -> CourseQuery {
        CourseQuery::new(&self.subject, self.number, &self.section, self.term.term())
    }
}

fn parse_policy(s: &str) -> Result<NotifyPolicy, String> {
    match s {
        "every_tick" | "every-tick" => Ok(NotifyPolicy::EveryTick),
        "on_change" | "on-change" => Ok(NotifyPolicy::OnChange),
        other => Err(format!("unknown policy '{other}' (expected every_tick or on_change)")),
    }
}

fn parse_email(s: &str) -> Result<Mailbox, String> {
    s.trim()
        .parse::<Mailbox>()
        .map_err(|e| format!("'{s}' is not a valid email address: {e}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    setup_logging(&config, cli.log_format);

    info!(version = env!("CARGO_PKG_VERSION"), "starting seatwatch");

    let result = match cli.command {
        Command::Check(course) => check(&config, course.query()).await,
        Command::Watch {
            course,
            email,
            interval,
            notify_waitlist,
            notify_policy,
        } => {
            let mut config = config;
            if let Some(policy) = notify_policy {
                config.watch.notify_policy = policy;
            }
            let session =
                WatchSession::new(course.query(), email.email.to_string(), interval, notify_waitlist);
            watch(&config, session).await
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!(error = ?e, "seatwatch failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn check(config: &Config, query: CourseQuery) -> anyhow::Result<ExitCode> {
    let client =
        CatalogClient::with_config(config.catalog.clone()).context("Failed to create catalog client")?;

    match client.fetch(&query).await {
        Ok(snapshot) => {
            print!("{snapshot}");
            Ok(ExitCode::SUCCESS)
        }
        Err(e @ FetchError::NotFound { .. }) => {
            eprintln!("{e}.");
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e).with_context(|| format!("Failed to fetch seats for {query}")),
    }
}

async fn watch(config: &Config, session: WatchSession) -> anyhow::Result<ExitCode> {
    let source =
        CatalogClient::with_config(config.catalog.clone()).context("Failed to create catalog client")?;
    let notifier =
        NotificationSender::from_config(&config.notify).context("Failed to create notifier")?;

    println!("{} watcher", session.query);
    println!("Ping interval (min 120s): {}", format_countdown(session.interval));

    let mut handle =
        WatchLoop::new(Arc::new(source), Arc::new(notifier), config.watch.clone()).start(session);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut exit = ExitCode::SUCCESS;
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                println!();
                break;
            }
            event = handle.next_event() => match event {
                Some(event) => {
                    if !render(&event) {
                        exit = ExitCode::FAILURE;
                        break;
                    }
                }
                None => break,
            }
        }
    }

    let session = handle.stop().await.context("Watch task failed")?;
    info!(
        course = %session.query,
        notifications_sent = session.notifications_sent,
        "Watch closed"
    );
    Ok(exit)
}

/// Prints one watch event. Returns false when watching cannot continue.
fn render(event: &WatchEvent) -> bool {
    match event {
        WatchEvent::Snapshot(snapshot) => {
            println!();
            println!("Seats remaining: {}", snapshot.seats.remaining);
            println!("Waitlist seats remaining: {}", snapshot.waitlist.remaining);
        }
        WatchEvent::Countdown(remaining) => {
            print!("\rTime until next ping: {:<20}", format_countdown(*remaining));
            let _ = std::io::stdout().flush();
        }
        WatchEvent::Notified(opening) => {
            println!();
            println!("Emailed about {opening}");
        }
        WatchEvent::NotifyFailed { error, .. } if error.is_relay_unreachable() => {
            println!();
            eprintln!("WARNING: {NO_RELAY_WARNING}");
            return false;
        }
        WatchEvent::NotifyFailed { opening, error } => {
            println!();
            eprintln!("Could not send email about {opening}: {error}");
        }
        WatchEvent::FetchFailed(error) => {
            println!();
            eprintln!("Check failed: {error}");
        }
    }
    true
}
