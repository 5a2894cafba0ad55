//! Parley demo binary.
//!
//! Runs one conversation through every operation against an in-process
//! loopback server and logs each transition.
//!
//! # Usage
//!
//! ```bash
//! # Default scenario
//! parley --client-id alice --member bob --member carol
//!
//! # Server rejects every message with code 4301
//! parley --reject-code 4301 --log-level debug
//! ```

use clap::Parser;
use parley_client::{Conversation, Message, StageMode};
use parley_harness::{LoopbackConfig, LoopbackSession};
use parley_proto::ConversationData;
use serde_json::json;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Parley conversation demo
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(about = "Drive a conversation against the loopback server")]
#[command(version)]
struct Args {
    /// Local client id
    #[arg(long, default_value = "alice")]
    client_id: String,

    /// Conversation id
    #[arg(long, default_value = "general")]
    conversation: String,

    /// Participant to add (repeatable)
    #[arg(long = "member")]
    members: Vec<String>,

    /// Name to stage and save
    #[arg(long, default_value = "Parley demo")]
    name: String,

    /// Message text to send
    #[arg(long, default_value = "hello")]
    text: String,

    /// Treat the conversation as transient
    #[arg(long)]
    transient: bool,

    /// Reject every message with this error code
    #[arg(long)]
    reject_code: Option<i32>,

    /// Maximum participants per conversation
    #[arg(long, default_value = "500")]
    max_members: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let config = LoopbackConfig {
        max_members: args.max_members,
        reject_messages: args.reject_code,
        ..Default::default()
    };
    let session = LoopbackSession::new(args.client_id.as_str(), config);
    session.seed(ConversationData {
        creator: Some(args.client_id.clone()),
        members: vec![args.client_id.clone()],
        transient: args.transient,
        ..ConversationData::new(args.conversation.as_str())
    });

    let snapshot = session
        .snapshot(&args.conversation)
        .ok_or_else(|| format!("conversation {} was not seeded", args.conversation))?;
    let conversation = Conversation::from_snapshot(snapshot, session.clone())?;
    tracing::info!(
        conversation_id = %conversation.id(),
        transient = args.transient,
        "conversation loaded"
    );

    run(&conversation, &args).await?;

    tracing::info!(
        conversation_id = %conversation.id(),
        name = ?conversation.committed_name(),
        members = conversation.members().len(),
        commands = session.call_count(),
        "scenario finished"
    );
    Ok(())
}

async fn run(
    conversation: &Conversation<LoopbackSession>,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    conversation.stage_name(args.name.as_str());
    conversation.stage_attributes(json!({ "topic": "demo" }), StageMode::Merge)?;
    conversation.save().await?;
    tracing::info!(
        name = ?conversation.committed_name(),
        updated_at = ?conversation.updated_at(),
        "saved"
    );

    conversation.mute().await?;
    tracing::info!(muted = conversation.is_muted(), "muted");

    if !args.members.is_empty() {
        conversation.add(args.members.clone()).await?;
        tracing::info!(members = conversation.members().len(), "members added");
    }

    let count = conversation.count().await?;
    tracing::info!(count, "participant count");

    match conversation.send(Message::text(args.text.as_str()).with_receipt(true)).await {
        Ok(message) => tracing::info!(
            message_id = ?message.id(),
            timestamp = ?message.timestamp(),
            "message acknowledged"
        ),
        Err(e) => {
            tracing::warn!(error = %e, retryable = e.error.is_retryable(), "message not sent");
        },
    }

    conversation.unmute().await?;
    tracing::info!(muted = conversation.is_muted(), "unmuted");

    if !args.members.is_empty() {
        conversation.remove(args.members.clone()).await?;
        tracing::info!(members = conversation.members().len(), "members removed");
    }

    conversation.fetch().await?;
    Ok(())
}
