//! Line-oriented console transport
//!
//! Reads one command per line from stdin, forwards it to the allocator actor
//! and prints the reply. Allocator events are printed as they arrive, prefixed
//! with `*`.

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use wave_alloc::{
    run_alloc_actor, AllocError, AllocEvent, AllocHandle, Allocator, ExclusionList,
    JsonFileStore, PairingLedger, ParticipantId, SharedRanking, Submission,
};
use wave_table::{Channel, ScoreTable};

use crate::settings::Settings;

/// One parsed console line
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Request { a: String, b: String },
    Join(Channel),
    Leave(ParticipantId),
    Say { from: ParticipantId, text: String },
    End(Channel),
    Status(Channel),
    Bindings,
    Help,
    Quit,
}

const HELP: &str = "commands: request <a> <b> | join <ch> | leave <id> | say <id> <text> | end <ch> | status <ch> | list | quit";

impl ConsoleCommand {
    /// Parse a console line; blank lines give None
    pub fn parse(line: &str) -> Option<Result<Self, String>> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (verb, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(v, r)| (v, r.trim()));

        let parsed = match verb.to_ascii_lowercase().as_str() {
            "request" => {
                let mut ids = rest.split_whitespace();
                match (ids.next(), ids.next(), ids.next()) {
                    (Some(a), Some(b), None) => Ok(Self::Request {
                        a: a.to_string(),
                        b: b.to_string(),
                    }),
                    _ => Err("usage: request <a> <b>".to_string()),
                }
            }
            "join" => parse_channel(rest).map(Self::Join),
            "leave" => parse_participant(rest).map(Self::Leave),
            "say" => {
                let (id, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                parse_participant(id).map(|from| Self::Say {
                    from,
                    text: text.trim().to_string(),
                })
            }
            "end" => parse_channel(rest).map(Self::End),
            "status" => parse_channel(rest).map(Self::Status),
            "list" => Ok(Self::Bindings),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(format!("unknown command {:?}", other)),
        };
        Some(parsed)
    }
}

fn parse_channel(s: &str) -> Result<Channel, String> {
    s.parse().map_err(|_| format!("not a channel: {:?}", s))
}

fn parse_participant(s: &str) -> Result<ParticipantId, String> {
    s.trim()
        .parse::<u64>()
        .map(ParticipantId)
        .map_err(|_| format!("not a participant id: {:?}", s))
}

/// Run one command against the actor and format the reply
pub async fn execute(handle: &AllocHandle, command: ConsoleCommand) -> String {
    let reply = match command {
        ConsoleCommand::Request { a, b } => {
            handle.submit_request(a, b).await.map(|s| match s {
                Submission::Pending { pair } => {
                    format!("pair {} pending, waiting for the other side", pair)
                }
                Submission::Assigned { pair, channel, .. } => {
                    format!("pair {} assigned channel {}", pair, channel)
                }
                Submission::Unavailable { pair } => format!(
                    "no channel available for pair {}, it will be assigned when one frees up",
                    pair
                ),
            })
        }
        ConsoleCommand::Join(channel) => handle
            .join(channel)
            .await
            .map(|id| format!("joined channel {} as participant {}", channel, id)),
        ConsoleCommand::Leave(participant) => handle
            .leave(participant)
            .await
            .map(|channel| format!("participant {} left channel {}", participant, channel)),
        ConsoleCommand::Say { from, text } => handle
            .relay(from, text)
            .await
            .map(|to| format!("delivered to {} participants", to.len())),
        ConsoleCommand::End(channel) => handle.end_session(channel).await.map(|end| {
            format!(
                "channel {} released ({} disconnected)",
                end.channel,
                end.disconnected.len()
            )
        }),
        ConsoleCommand::Status(channel) => handle
            .channel_occupancy(channel)
            .await
            .map(|n| format!("channel {}: {} connected", channel, n)),
        ConsoleCommand::Bindings => handle.bound_channels().await.map(|bound| {
            if bound.is_empty() {
                "no channels assigned".to_string()
            } else {
                bound
                    .iter()
                    .map(|(channel, pair)| format!("{} -> {}", channel, pair))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }),
        ConsoleCommand::Help => Ok(HELP.to_string()),
        ConsoleCommand::Quit => Ok("bye".to_string()),
    };

    reply.unwrap_or_else(|e: AllocError| format!("error: {}", e.user_message()))
}

/// Format an allocator event for the console
pub fn describe_event(event: &AllocEvent) -> String {
    match event {
        AllocEvent::PairPending { pair } => format!("* pair {} pending", pair),
        AllocEvent::ChannelAssigned { pair, channel, .. } => {
            format!("* channel {} assigned to pair {}", channel, pair)
        }
        AllocEvent::ChannelUnavailable { pair } => {
            format!("* pair {} waiting for a free channel", pair)
        }
        AllocEvent::SubmissionRejected { pair } => format!("* pair {} rejected", pair),
        AllocEvent::SessionEnded { channel, .. } => format!("* session on {} ended", channel),
        AllocEvent::ParticipantJoined {
            channel,
            participant,
            occupancy,
        } => format!(
            "* participant {} joined {} ({} connected)",
            participant, channel, occupancy
        ),
        AllocEvent::ParticipantLeft {
            channel,
            participant,
        } => format!("* participant {} left {}", participant, channel),
        AllocEvent::JoinRefused { channel } => format!("* channel {} is full", channel),
        AllocEvent::MessageRelayed {
            channel,
            from,
            text,
        } => format!("* [{}] {}: {}", channel, from, text),
        AllocEvent::Error { source, message } => format!("* {} error: {}", source, message),
    }
}

/// Serve the console until `quit` or end of input
pub async fn serve(settings: &Settings) -> anyhow::Result<()> {
    let files = &settings.files;
    let scores_path = files.resolve(&files.scores);
    let scores = ScoreTable::load(&scores_path).with_context(|| {
        format!(
            "Failed to load {} (run build-table and build-scores first)",
            scores_path.display()
        )
    })?;
    let ranking: SharedRanking = Arc::new(scores);

    let allocator = Allocator::open(
        settings.allocator_config(),
        ranking,
        Box::new(JsonFileStore::<ExclusionList>::new(
            files.resolve(&files.exclusions),
        )),
        Box::new(JsonFileStore::<PairingLedger>::new(files.resolve(&files.ledger))),
    )?;

    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (event_tx, mut event_rx) = mpsc::channel(256);
    let actor = tokio::spawn(run_alloc_actor(allocator, cmd_rx, event_tx));
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            println!("{}", describe_event(&event));
        }
    });

    let handle = AllocHandle::new(cmd_tx);
    info!("Console ready");
    println!("{}", HELP);

    let input = run_lines(&handle, BufReader::new(tokio::io::stdin())).await;

    if let Err(e) = handle.shutdown().await {
        warn!("Allocator already stopped: {}", e);
    }
    drop(handle);
    actor.await?;
    printer.await?;
    input.context("Failed to read console input")
}

/// Execute lines until `quit`, end of input, or a read error
async fn run_lines<R>(handle: &AllocHandle, reader: R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        match ConsoleCommand::parse(&line) {
            None => continue,
            Some(Ok(ConsoleCommand::Quit)) => break,
            Some(Ok(command)) => println!("{}", execute(handle, command).await),
            Some(Err(usage)) => println!("error: {}", usage),
        }
    }
    Ok(())
}
