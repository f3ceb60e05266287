use std::env;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tokio::sync::mpsc;

use market_chat::common::{ChatCommand, ChatEvent, Message};
use market_chat::config::{self, AppConfig};
use market_chat::network::{ChatApi, ChatClient, LoopbackBroker, RestClient};
use market_chat::storage::{self, KeyValueStore, KvDatabase, ReadStateStore, SESSION_TOKEN_KEY};
use market_chat::ui::format::{chatroom_line, message_line};
use market_chat::{ChatError, Result};

type CliClient = ChatClient<RestClient, LoopbackBroker, Arc<KvDatabase>>;

#[derive(Parser)]
#[command(
    name = "market-chat",
    version,
    about = "Marketplace chat client: conversations, history and read state"
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List conversations with unread counts
    Rooms,
    /// Get or create the conversation with a seller and show it
    Contact {
        #[arg(long)]
        seller: i64,
        #[arg(long)]
        order: Option<i64>,
    },
    /// Show the newest page of a conversation
    Open {
        chatroom: i64,
        /// Fetch the whole history in one request instead
        #[arg(long)]
        all: bool,
    },
    /// Backfill every page of a conversation, oldest first
    History { chatroom: i64 },
    /// Show or reset locally stored read marks
    ReadState {
        #[arg(long)]
        clear: bool,
    },
    /// Store a bearer token for later commands
    Login { token: String },
    /// Forget the stored bearer token
    Logout,
    /// Update and save the config file
    Configure {
        #[arg(long)]
        api_url: Option<String>,
        #[arg(long)]
        user_id: Option<i64>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        page_size: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let mut app_config = config::load_config(&cli.config);
    app_config.apply_env();

    storage::ensure_data_dir(&app_config.data_dir)?;
    let store = Arc::new(KvDatabase::with_path(app_config.database_path())?);
    let read_state =
        ReadStateStore::with_key(Arc::clone(&store), app_config.read_state_key.clone());

    match cli.command {
        Command::Login { token } => {
            store.set(SESSION_TOKEN_KEY, token.trim())?;
            println!("Token stored");
        }
        Command::Logout => {
            store.remove(SESSION_TOKEN_KEY)?;
            println!("Token removed");
        }
        Command::Configure { api_url, user_id, name, page_size } => {
            // start from the file alone so env overrides are not persisted
            let mut saved = config::load_config(&cli.config);
            if let Some(url) = api_url {
                saved.api_base_url = url;
            }
            if let Some(user_id) = user_id {
                saved.user_id = user_id;
            }
            if let Some(name) = name {
                saved.sender_name = name;
            }
            if let Some(page_size) = page_size.filter(|size| *size > 0) {
                saved.page_size = page_size;
            }
            config::save_config(&cli.config, &saved)?;
            println!(
                "Saved {}: {} as user {} ({})",
                cli.config, saved.api_base_url, saved.user_id, saved.sender_name
            );
        }
        Command::ReadState { clear } => {
            if clear {
                read_state.clear()?;
                println!("Read state cleared");
            } else {
                let ids = read_state.read_ids();
                println!("{} read ids", ids.len());
                for id in ids {
                    println!("  {id}");
                }
            }
        }
        Command::Rooms => {
            let (mut client, mut events) = start_client(&app_config, &store);
            client.handle_command(ChatCommand::RefreshChatrooms).await;
            client.process_next().await;
            check_events(&mut events)?;

            let view = client.view();
            for chatroom in &view.chatrooms {
                println!("{}", chatroom_line(chatroom));
            }
            println!("{} unread in total", view.total_unread());
        }
        Command::Contact { seller, order } => {
            let (mut client, mut events) = start_client(&app_config, &store);
            client
                .handle_command(ChatCommand::Contact { seller_id: seller, order_id: order })
                .await;
            client.process_next().await;
            check_events(&mut events)?;
            if client.transcript().is_loading_initial() {
                client.process_next().await;
                check_events(&mut events)?;
            }
            if let Some(chatroom) = client.view().chatrooms.first() {
                println!("{}", chatroom_line(chatroom));
            }
            print_transcript(&client);
        }
        Command::Open { chatroom, all } if all => {
            let api = rest_client(&app_config, &store);
            let messages = api.fetch_history(chatroom).await?;
            let read = read_state.read_ids();
            print_messages(&messages, |message| !read.contains(&message.id));
        }
        Command::Open { chatroom, .. } => {
            let read_before = read_state.read_ids();
            let (mut client, mut events) = start_client(&app_config, &store);
            client.handle_command(ChatCommand::Open(chatroom)).await;
            client.process_next().await;
            check_events(&mut events)?;

            let transcript = client.transcript();
            print_messages(transcript.messages(), |message| !read_before.contains(&message.id));
            if transcript.has_older() {
                println!("(older messages available: `market-chat history {chatroom}`)");
            }
        }
        Command::History { chatroom } => {
            let (mut client, mut events) = start_client(&app_config, &store);
            client.handle_command(ChatCommand::Open(chatroom)).await;
            client.process_next().await;
            check_events(&mut events)?;

            loop {
                let page = client.transcript().cursor().current_page;
                client.handle_command(ChatCommand::LoadOlder).await;
                if !client.transcript().is_loading_older() {
                    break;
                }
                client.process_next().await;
                check_events(&mut events)?;
                // failed backfill leaves the cursor where it was
                if client.transcript().cursor().current_page == page {
                    break;
                }
            }
            print_transcript(&client);
        }
    }

    Ok(())
}

fn rest_client(app_config: &AppConfig, store: &Arc<KvDatabase>) -> RestClient {
    let token = env::var(config::TOKEN_ENV)
        .ok()
        .filter(|token| !token.trim().is_empty())
        .or_else(|| match store.get(SESSION_TOKEN_KEY) {
            Ok(token) => token,
            Err(err) => {
                log::warn!("Failed to read stored session token: {err}");
                None
            }
        });
    if token.is_none() {
        log::warn!("No session token; requests are sent unauthenticated");
    }
    RestClient::new(app_config.api_base_url.clone(), token)
}

/// The binary has no live transport of its own; the loopback broker stands
/// in so the client loop runs unchanged.
fn start_client(
    app_config: &AppConfig,
    store: &Arc<KvDatabase>,
) -> (CliClient, mpsc::Receiver<ChatEvent>) {
    let api = Arc::new(rest_client(app_config, store));
    let live = Arc::new(LoopbackBroker::new());
    let (event_tx, event_rx) = mpsc::channel(100);
    let (_cmd_tx, cmd_rx) = mpsc::channel(1);

    log::info!("Using chat backend at {}", api.base_url());
    let client = ChatClient::new(
        api,
        live,
        Arc::clone(store),
        app_config.client_settings(),
        event_tx,
        cmd_rx,
    );
    (client, event_rx)
}

fn check_events(events: &mut mpsc::Receiver<ChatEvent>) -> Result<()> {
    while let Ok(event) = events.try_recv() {
        match event {
            ChatEvent::Toast(message) => eprintln!("! {message}"),
            ChatEvent::SessionExpired => {
                eprintln!("Session expired; run `market-chat login <token>` again");
                return Err(ChatError::Unauthorized);
            }
            other => log::debug!("Event: {other:?}"),
        }
    }
    Ok(())
}

fn print_transcript(client: &CliClient) {
    print_messages(client.transcript().messages(), |_| false);
}

fn print_messages(messages: &[Message], is_unread: impl Fn(&Message) -> bool) {
    let now = Utc::now();
    if messages.is_empty() {
        println!("(no messages)");
    }
    for message in messages {
        println!("{}", message_line(message, is_unread(message), now));
    }
}
