//! cross-review - Approve or reject posts awaiting review
//!
//! Unix-style tool for working the approval queue.

use std::time::Duration;

use clap::{Parser, Subcommand};
use libcrosscast::approval::ApprovalGate;
use libcrosscast::db::Database;
use libcrosscast::events::EventBus;
use libcrosscast::notify::Notifier;
use libcrosscast::scheduler::{RetryPolicy, Scheduler};
use libcrosscast::types::{ApprovalAction, PostStatus};
use libcrosscast::{logging, Config, CrosscastError, Result};

#[derive(Parser, Debug)]
#[command(name = "cross-review")]
#[command(version)]
#[command(about = "Approve or reject posts awaiting review")]
#[command(long_about = "\
cross-review - Approve or reject posts awaiting review

DESCRIPTION:
    cross-review works the approval queue. Posts created on channels with a
    review policy wait in pending_approval until a reviewer decides; an
    approved post with a schedule goes straight into the publish queue.

COMMANDS:
    pending     List posts awaiting review
    approve     Approve a post
    reject      Reject a post

USAGE EXAMPLES:
    # See what's waiting
    cross-review pending

    # Approve with the audit trail noting who decided
    cross-review approve <POST_ID> --reviewer alice

    # Reject with a comment for the author
    cross-review reject <POST_ID> --reviewer alice --comment \"off brand\"

CONFIGURATION:
    Configuration file: ~/.config/crosscast/config.toml
    Database location: ~/.local/share/crosscast/crosscast.db

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Database or configuration error
    3 - Invalid input (unknown post, not awaiting review, etc.)

For more information, visit: https://github.com/crosscast/crosscast
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List posts awaiting review
    Pending {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Maximum number of posts to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Approve a post
    Approve {
        /// Post ID to approve
        post_id: String,

        /// Reviewer id recorded in the audit trail
        #[arg(short, long, default_value = "cli")]
        reviewer: String,

        /// Optional comment for the author
        #[arg(short, long)]
        comment: Option<String>,
    },

    /// Reject a post
    Reject {
        /// Post ID to reject
        post_id: String,

        /// Reviewer id recorded in the audit trail
        #[arg(short, long, default_value = "cli")]
        reviewer: String,

        /// Optional comment for the author
        #[arg(short, long)]
        comment: Option<String>,
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
    let notifier = Notifier::new(Duration::from_secs(config.notifications.request_timeout))?;
    let gate = ApprovalGate::new(db.clone(), scheduler, notifier, EventBus::new(16));

    match cli.command {
        Commands::Pending { format, limit } => {
            cmd_pending(&db, &format, limit).await?;
        }
        Commands::Approve {
            post_id,
            reviewer,
            comment,
        } => {
            let new_status = gate
                .decide(&post_id, &reviewer, ApprovalAction::Approved, comment)
                .await?;
            println!("approved: {} -> {}", post_id, new_status);
        }
        Commands::Reject {
            post_id,
            reviewer,
            comment,
        } => {
            let new_status = gate
                .decide(&post_id, &reviewer, ApprovalAction::Rejected, comment)
                .await?;
            println!("rejected: {} -> {}", post_id, new_status);
        }
    }

    Ok(())
}

/// List posts awaiting review
async fn cmd_pending(db: &Database, format: &str, limit: usize) -> Result<()> {
    if format != "text" && format != "json" {
        return Err(CrosscastError::InvalidInput(format!(
            "Unknown output format '{}': use text or json",
            format
        )));
    }

    let posts = db.posts_with_status(PostStatus::PendingApproval, limit).await?;

    let mut with_targets = Vec::new();
    for post in posts {
        if let Some(entry) = db.get_post_with_targets(&post.id).await? {
            with_targets.push(entry);
        }
    }

    if format == "json" {
        let json: Vec<serde_json::Value> = with_targets
            .iter()
            .map(|entry| {
                serde_json::json!({
                    "id": entry.post.id,
                    "channel_id": entry.post.channel_id,
                    "author_id": entry.post.author_id,
                    "content": entry.post.content,
                    "scheduled_at": entry.post.scheduled_at,
                    "created_at": entry.post.created_at,
                    "platforms": entry
                        .targets
                        .iter()
                        .map(|t| t.platform.as_str())
                        .collect::<Vec<_>>(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json).unwrap());
    } else {
        for entry in &with_targets {
            let preview: String = entry.post.content.chars().take(50).collect();
            let platforms: Vec<&str> =
                entry.targets.iter().map(|t| t.platform.as_str()).collect();
            println!(
                "{} | {} | {} | {}",
                entry.post.id,
                entry.post.author_id,
                platforms.join(","),
                preview
            );
        }
    }

    Ok(())
}
