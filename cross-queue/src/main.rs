//! cross-queue - Manage scheduled posts
//!
//! Unix-style tool for working the publish queue.

use clap::{Parser, Subcommand};
use libcrosscast::db::{Database, JobStats};
use libcrosscast::scheduler::{RetryPolicy, Scheduler};
use libcrosscast::types::{PostStatus, TriggerSource};
use libcrosscast::{logging, Config, CrosscastError, Post, Result};

#[derive(Parser, Debug)]
#[command(name = "cross-queue")]
#[command(version)]
#[command(about = "Manage scheduled posts")]
#[command(long_about = "\
cross-queue - Manage scheduled posts

DESCRIPTION:
    cross-queue operates on the Crosscast publish queue from the command
    line: inspect what is waiting, pull a post out of the queue, move it to
    a new time, or fire it immediately without waiting for the daemon's
    poll.

COMMANDS:
    list        List all scheduled posts
    cancel      Cancel a scheduled post (back to draft)
    reschedule  Move a post to a different time
    now         Publish a post immediately
    stats       Show queue statistics

USAGE EXAMPLES:
    # What is waiting, soonest first
    cross-queue list

    # The same, machine-readable
    cross-queue list --format json

    # Pull a post out of the queue
    cross-queue cancel <POST_ID>

    # Push a post to tomorrow afternoon
    cross-queue reschedule <POST_ID> \"tomorrow 3pm\"

    # Stop waiting, publish now
    cross-queue now <POST_ID>

    # Queue health at a glance
    cross-queue stats

CONFIGURATION:
    Configuration file: ~/.config/crosscast/config.toml
    Database location: ~/.local/share/crosscast/crosscast.db

    Override with environment variables:
        CROSSCAST_CONFIG    - Path to config file

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Database or configuration error
    3 - Invalid input (bad post ID, time format, etc.)

For more information, visit: https://github.com/crosscast/crosscast
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    #[arg(help = "Enable verbose logging to stderr (useful for debugging)")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List scheduled posts
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Maximum number of posts to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Cancel a scheduled post
    Cancel {
        /// Post ID to cancel
        post_id: Option<String>,

        /// Cancel all scheduled posts
        #[arg(long)]
        all: bool,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Reschedule a post
    Reschedule {
        /// Post ID to reschedule
        post_id: String,

        /// New schedule time (e.g., "tomorrow 3pm", "2h")
        time: String,
    },

    /// Publish immediately
    Now {
        /// Post ID to publish now
        post_id: String,
    },

    /// Show queue statistics
    Stats {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_cli(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;
    let scheduler = Scheduler::new(db.clone(), RetryPolicy::from_config(&config.scheduler));

    match cli.command {
        Commands::List { format, limit } => cmd_list(&db, parse_format(&format)?, limit).await,
        Commands::Cancel {
            post_id,
            all,
            force,
        } => cmd_cancel(&db, &scheduler, post_id.as_deref(), all, force).await,
        Commands::Reschedule { post_id, time } => {
            cmd_reschedule(&db, &scheduler, &post_id, &time).await
        }
        Commands::Now { post_id } => cmd_now(&db, &scheduler, &post_id).await,
        Commands::Stats { format } => cmd_stats(&db, parse_format(&format)?).await,
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

fn parse_format(format: &str) -> Result<OutputFormat> {
    match format {
        "text" => Ok(OutputFormat::Text),
        "json" => Ok(OutputFormat::Json),
        other => Err(CrosscastError::InvalidInput(format!(
            "Unknown output format '{}': use text or json",
            other
        ))),
    }
}

/// List scheduled posts, one line per post in text mode
async fn cmd_list(db: &Database, format: OutputFormat, limit: usize) -> Result<()> {
    let posts = db.posts_with_status(PostStatus::Scheduled, limit).await?;

    match format {
        OutputFormat::Json => {
            let entries: Vec<serde_json::Value> = posts.iter().map(post_summary_json).collect();
            println!("{}", serde_json::to_string_pretty(&entries).unwrap());
        }
        OutputFormat::Text => {
            let now = chrono::Utc::now().timestamp();
            for post in &posts {
                let eta = post
                    .scheduled_at
                    .map(|due| human_eta(now, due))
                    .unwrap_or_else(|| "unknown".to_string());
                println!("{} | {} | {}", post.id, preview(&post.content, 50), eta);
            }
        }
    }

    Ok(())
}

fn post_summary_json(post: &Post) -> serde_json::Value {
    serde_json::json!({
        "id": post.id,
        "channel_id": post.channel_id,
        "content": post.content,
        "scheduled_at": post.scheduled_at,
        "created_at": post.created_at,
        "status": post.status.as_str(),
        "is_repeat": post.is_repeat,
    })
}

/// First `max` characters of `content`, with an ellipsis when cut short
fn preview(content: &str, max: usize) -> String {
    let mut shortened: String = content.chars().take(max).collect();
    if shortened.len() < content.len() {
        shortened.push_str("...");
    }
    shortened
}

/// "in 2 hours" / "in 1 day" / "overdue"
fn human_eta(now: i64, due: i64) -> String {
    let remaining = due - now;
    if remaining < 0 {
        return "overdue".to_string();
    }

    let (count, unit) = if remaining >= 86400 {
        (remaining / 86400, "day")
    } else if remaining >= 3600 {
        (remaining / 3600, "hour")
    } else if remaining >= 60 {
        (remaining / 60, "minute")
    } else {
        return "in <1 minute".to_string();
    };

    format!("in {} {}{}", count, unit, if count == 1 { "" } else { "s" })
}

/// Cancel scheduled post(s): pending jobs are canceled and the post returns
/// to draft with its schedule cleared.
async fn cmd_cancel(
    db: &Database,
    scheduler: &Scheduler,
    post_id: Option<&str>,
    all: bool,
    force: bool,
) -> Result<()> {
    let posts = if all {
        db.posts_with_status(PostStatus::Scheduled, usize::MAX / 2)
            .await?
    } else {
        let post_id = post_id.ok_or_else(|| {
            CrosscastError::InvalidInput("Provide a post ID or use --all".to_string())
        })?;
        vec![fetch_with_status(db, post_id, PostStatus::Scheduled).await?]
    };

    if posts.is_empty() {
        println!("No scheduled posts to cancel");
        return Ok(());
    }

    if !force && !confirm(&format!("Cancel {} scheduled post(s)?", posts.len()))? {
        println!("Aborted");
        return Ok(());
    }

    for mut post in posts {
        scheduler.cancel(&post.id).await?;
        post.status = PostStatus::Draft;
        post.scheduled_at = None;
        db.update_post(&post).await?;
        println!("canceled: {}", post.id);
    }

    Ok(())
}

async fn fetch_with_status(db: &Database, post_id: &str, expected: PostStatus) -> Result<Post> {
    let post = db
        .get_post(post_id)
        .await?
        .ok_or_else(|| CrosscastError::InvalidInput(format!("Post not found: {}", post_id)))?;

    if post.status != expected {
        return Err(CrosscastError::InvalidInput(format!(
            "Post {} is not {} (status: {})",
            post_id, expected, post.status
        )));
    }

    Ok(post)
}

/// Ask for confirmation on stdin
fn confirm(prompt: &str) -> Result<bool> {
    use std::io::Write;

    print!("{} [y/N] ", prompt);
    std::io::stdout().flush().ok();

    let mut answer = String::new();
    std::io::stdin()
        .read_line(&mut answer)
        .map_err(|e| CrosscastError::InvalidInput(format!("Failed to read input: {}", e)))?;

    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

/// Move a post's due time; the pending job is superseded, never duplicated
async fn cmd_reschedule(
    db: &Database,
    scheduler: &Scheduler,
    post_id: &str,
    time: &str,
) -> Result<()> {
    let mut post = fetch_with_status(db, post_id, PostStatus::Scheduled).await?;

    let new_time = libcrosscast::scheduling::parse_schedule(time)?;
    post.scheduled_at = Some(new_time.timestamp());
    db.update_post(&post).await?;
    scheduler
        .enqueue(post_id, new_time.timestamp(), TriggerSource::Scheduler)
        .await?;

    println!("rescheduled: {} at {}", post_id, new_time.to_rfc3339());
    Ok(())
}

/// Queue a manual job due immediately; the daemon picks it up on its next poll
async fn cmd_now(db: &Database, scheduler: &Scheduler, post_id: &str) -> Result<()> {
    let post = db
        .get_post(post_id)
        .await?
        .ok_or_else(|| CrosscastError::InvalidInput(format!("Post not found: {}", post_id)))?;

    if !libcrosscast::lifecycle::publish_eligible(post.status, TriggerSource::Manual) {
        return Err(CrosscastError::InvalidInput(format!(
            "Post {} cannot be published now (status: {})",
            post_id, post.status
        )));
    }

    scheduler
        .enqueue(post_id, chrono::Utc::now().timestamp(), TriggerSource::Manual)
        .await?;

    println!("queued for immediate publish: {}", post_id);
    Ok(())
}

/// Show queue statistics
async fn cmd_stats(db: &Database, format: OutputFormat) -> Result<()> {
    let jobs = db.job_stats().await?;
    let scheduled = db
        .posts_with_status(PostStatus::Scheduled, usize::MAX / 2)
        .await?
        .len();
    let awaiting_review = db
        .posts_with_status(PostStatus::PendingApproval, usize::MAX / 2)
        .await?
        .len();

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&stats_json(scheduled, awaiting_review, &jobs)).unwrap()
        ),
        OutputFormat::Text => {
            println!("scheduled posts:       {}", scheduled);
            println!("awaiting review:       {}", awaiting_review);
            println!("jobs pending:          {}", jobs.pending);
            println!("jobs done:             {}", jobs.done);
            println!("jobs canceled:         {}", jobs.canceled);
            println!("jobs exhausted:        {}", jobs.exhausted);
        }
    }

    Ok(())
}

fn stats_json(scheduled: usize, awaiting_review: usize, jobs: &JobStats) -> serde_json::Value {
    serde_json::json!({
        "scheduled_posts": scheduled,
        "posts_awaiting_review": awaiting_review,
        "jobs": {
            "pending": jobs.pending,
            "done": jobs.done,
            "canceled": jobs.canceled,
            "exhausted": jobs.exhausted,
        },
    })
}
