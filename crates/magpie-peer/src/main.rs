//! Magpie - local-network social peer

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use magpie_core::{UdpTransport, PROFILE_INTERVAL};
use magpie_peer::config::Config;
use magpie_peer::context::{detect_local_ip, Context};
use magpie_peer::dispatcher::Dispatcher;
use magpie_peer::handlers::{
    DmHandler, FollowHandler, GameHandler, GroupHandler, PostHandler, ProfileHandler,
    RevokeHandler,
};
use magpie_peer::prompt::{PromptQueue, PromptRequest};
use magpie_peer::transfer::FileTransferEngine;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter};

#[derive(Parser)]
#[command(name = "magpie")]
#[command(about = "Local-network social peer", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "magpie.toml")]
    config: String,

    /// UDP port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Username (overrides config)
    #[arg(short, long)]
    username: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

type FilterHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match Config::load(Path::new(&cli.config)) {
        Ok(config) => config,
        Err(_) => Config::default(),
    };
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(username) = cli.username {
        config.username = username;
    }

    // Set up logging, reloadable so verbosity can be toggled at runtime
    let verbose = cli.verbose || config.verbose;
    let filter = EnvFilter::new(if verbose { "debug" } else { "info" });
    let (filter, filter_handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    let transport = UdpTransport::bind(config.port).await?;
    let (prompts, mut prompt_rx) = PromptQueue::new();
    let ctx = Context::new(
        transport,
        prompts,
        config.username.clone(),
        detect_local_ip(),
        config.port,
    );
    tracing::info!(
        user = ctx.full_id(),
        port = config.port,
        "magpie peer starting"
    );

    let engine = FileTransferEngine::new(Arc::clone(&ctx), PathBuf::from(&config.downloads_dir));
    let profiles = Arc::new(ProfileHandler::new(
        Arc::clone(&ctx),
        config.display_name.clone(),
        config.status.clone(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&ctx),
        engine.clone(),
        Arc::new(PostHandler::new(Arc::clone(&ctx))),
        Arc::new(DmHandler::new(Arc::clone(&ctx))),
        Arc::new(FollowHandler::new(Arc::clone(&ctx))),
        Arc::clone(&profiles),
        Arc::new(GroupHandler::new(Arc::clone(&ctx))),
        Arc::new(GameHandler::new(Arc::clone(&ctx))),
        Arc::new(RevokeHandler::new(Arc::clone(&ctx))),
    ));

    let receiver = Arc::clone(&dispatcher);
    tokio::spawn(async move { receiver.run().await });

    let monitor = engine.clone();
    tokio::spawn(async move { monitor.run_retry_monitor().await });

    let announcer = Arc::clone(&profiles);
    tokio::spawn(async move {
        loop {
            if let Err(e) = announcer.announce().await {
                tracing::warn!("profile announce failed: {e}");
            }
            tokio::time::sleep(PROFILE_INTERVAL).await;
        }
    });

    println!("magpie - type 'help' for commands");
    enum Input {
        Prompt(PromptRequest),
        Line(Option<String>),
    }
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let input = tokio::select! {
            biased;
            req = prompt_rx.recv() => match req {
                Some(req) => Input::Prompt(req),
                None => break,
            },
            line = lines.next_line() => Input::Line(line?),
        };
        match input {
            Input::Prompt(req) => {
                print!("{}", req.prompt);
                use std::io::Write as _;
                std::io::stdout().flush()?;
                let answer = lines.next_line().await?.unwrap_or_default();
                let _ = req.reply.send(answer);
            }
            Input::Line(None) => break,
            Input::Line(Some(line)) => {
                if !run_command(&line, &dispatcher, &filter_handle).await {
                    break;
                }
            }
        }
    }
    Ok(())
}

/// Execute one interactive command. Returns false to quit.
async fn run_command(
    line: &str,
    dispatcher: &Dispatcher<UdpTransport>,
    filter_handle: &FilterHandle,
) -> bool {
    let mut parts = line.trim().splitn(3, ' ');
    let command = parts.next().unwrap_or("");
    let arg1 = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("");

    let result = match command {
        "" => Ok(()),
        "help" => {
            print_help();
            Ok(())
        }
        "post" => {
            let content = format!("{arg1} {rest}");
            dispatcher.posts.send_post(content.trim()).await.map(|_| ())
        }
        "dm" => match resolve(dispatcher, arg1) {
            Some((user, addr)) => dispatcher.dms.send_dm(bare(&user), addr, rest).await,
            None => unknown_peer(arg1),
        },
        "like" => match resolve(dispatcher, arg1) {
            Some((user, addr)) => dispatcher.posts.send_like(&user, addr, rest).await,
            None => unknown_peer(arg1),
        },
        "follow" => match resolve(dispatcher, arg1) {
            Some((user, addr)) => dispatcher.follows.send_follow(&user, addr).await,
            None => unknown_peer(arg1),
        },
        "unfollow" => match resolve(dispatcher, arg1) {
            Some((user, addr)) => dispatcher.follows.send_unfollow(&user, addr).await,
            None => unknown_peer(arg1),
        },
        "send" => match resolve(dispatcher, arg1) {
            Some((user, addr)) => {
                let mut file_parts = rest.splitn(2, ' ');
                let path = file_parts.next().unwrap_or("");
                let description = file_parts.next().unwrap_or("");
                dispatcher
                    .engine
                    .send_file(bare(&user), addr, Path::new(path), description)
                    .await
                    .map(|file_id| println!("transfer started: {file_id}"))
            }
            None => unknown_peer(arg1),
        },
        "peers" => {
            for (id, profile) in dispatcher.profiles.known_peers() {
                println!("  {id} ({}) {}", profile.display_name, profile.status);
            }
            Ok(())
        }
        "following" => {
            for peer in dispatcher.follows.following() {
                println!("  {} @ {}", peer.user_id, peer.addr);
            }
            Ok(())
        }
        "group" => run_group_command(dispatcher, arg1, rest).await,
        "play" => match resolve(dispatcher, arg1) {
            Some((user, addr)) => dispatcher
                .games
                .send_invite(&user, addr)
                .await
                .map(|game_id| println!("game started: {game_id}")),
            None => unknown_peer(arg1),
        },
        "move" => match rest.parse::<usize>() {
            Ok(position) => dispatcher.games.send_move(arg1, position).await,
            Err(_) => {
                println!("usage: move <game_id> <0-8>");
                Ok(())
            }
        },
        "abandon" => {
            dispatcher.engine.abandon_inbound(arg1);
            println!("inbound transfer {arg1} dropped");
            Ok(())
        }
        "revoke" => dispatcher.revokes.send_revoke(arg1).await,
        "status" => {
            println!("  id: {}", dispatcher.ctx.full_id());
            println!("  pending chunks: {}", dispatcher.engine.pending_count());
            println!("  known peers: {}", dispatcher.profiles.known_peers().len());
            Ok(())
        }
        "verbose" => {
            let on = arg1 != "off";
            let filter = EnvFilter::new(if on { "debug" } else { "info" });
            if filter_handle.reload(filter).is_ok() {
                println!("verbose {}", if on { "on" } else { "off" });
            }
            Ok(())
        }
        "quit" | "exit" => return false,
        other => {
            println!("unknown command '{other}', try 'help'");
            Ok(())
        }
    };
    if let Err(e) = result {
        println!("error: {e}");
    }
    true
}

async fn run_group_command(
    dispatcher: &Dispatcher<UdpTransport>,
    subcommand: &str,
    rest: &str,
) -> magpie_core::Result<()> {
    let mut parts = rest.splitn(2, ' ');
    let first = parts.next().unwrap_or("");
    let second = parts.next().unwrap_or("");
    match subcommand {
        "create" => {
            let members: Vec<String> = second
                .split(',')
                .filter(|m| !m.is_empty())
                .filter_map(|m| resolve(dispatcher, m.trim()).map(|(id, _)| id))
                .collect();
            let group_id = dispatcher.groups.create_group(first, members).await?;
            println!("group created: {group_id}");
        }
        "msg" => {
            dispatcher.groups.send_group_message(first, second).await?;
        }
        "add" => {
            let members: Vec<String> = second
                .split(',')
                .filter_map(|m| resolve(dispatcher, m.trim()).map(|(id, _)| id))
                .collect();
            dispatcher.groups.update_group(first, members, vec![]).await?;
        }
        "remove" => {
            let members: Vec<String> = second
                .split(',')
                .filter_map(|m| resolve(dispatcher, m.trim()).map(|(id, _)| id))
                .collect();
            dispatcher.groups.update_group(first, vec![], members).await?;
        }
        _ => println!("usage: group <create|msg|add|remove> ..."),
    }
    Ok(())
}

/// Resolve a peer argument to a full id and socket address. Accepts either
/// a `user@ip` identifier or a bare username known from a profile.
fn resolve(dispatcher: &Dispatcher<UdpTransport>, who: &str) -> Option<(String, SocketAddr)> {
    if let Some((_, ip)) = who.split_once('@') {
        let addr = format!("{}:{}", ip, dispatcher.ctx.port).parse().ok()?;
        return Some((who.to_string(), addr));
    }
    dispatcher.profiles.lookup(who)
}

fn bare(full_id: &str) -> &str {
    full_id.split('@').next().unwrap_or(full_id)
}

fn unknown_peer(who: &str) -> magpie_core::Result<()> {
    println!("unknown peer '{who}', try 'peers' or use user@ip");
    Ok(())
}

fn print_help() {
    println!("commands:");
    println!("  post <text>                   broadcast a post");
    println!("  dm <peer> <text>              direct message");
    println!("  like <peer> <message_id>      like a post");
    println!("  follow <peer> / unfollow <peer>");
    println!("  send <peer> <path> [description]   offer and send a file");
    println!("  group create <name> <peers,comma>");
    println!("  group msg <group_id> <text>");
    println!("  group add <group_id> <peers,comma>");
    println!("  group remove <group_id> <peers,comma>");
    println!("  play <peer>                   invite to tic-tac-toe");
    println!("  move <game_id> <0-8>          play a move");
    println!("  abandon <file_id>             drop a stalled inbound transfer");
    println!("  revoke <token>                revoke one of our tokens");
    println!("  peers / following / status / verbose [on|off] / quit");
}
