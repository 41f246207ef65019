//! lexplain CLI: GDPR knowledge-base client.
//!
//! Usage:
//!   lexplain chat
//!   lexplain ask <query...>
//!   lexplain search <query...>
//!   lexplain article <id>
//!   lexplain graph <id> [--format text|json]

mod display;

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use lexplain_core::{ChatRequest, ModelSelector, graph};
use lexplain_stream::{
    ApiClient, Conversation, DEFAULT_BASE_URL, PendingTurn, StreamOrchestrator, TransportError,
    TurnHandle, TurnId, TurnObserver, TurnOutcome, TurnSnapshot, load_article_view,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{Level, info};

use display::StreamPrinter;

#[derive(Parser)]
#[command(name = "lexplain", version, about = "GDPR knowledge-base client")]
struct Cli {
    /// Backend API base URL
    #[arg(long, env = "LEXPLAIN_API_URL", default_value = DEFAULT_BASE_URL, global = true)]
    api_url: String,
    /// Language model used for chat answers (openai, gemini)
    #[arg(long, env = "LEXPLAIN_MODEL", default_value = "openai", global = true)]
    model: ModelSelector,
    /// Abandon a chat turn after this many seconds
    #[arg(long, env = "LEXPLAIN_TIMEOUT", global = true)]
    timeout: Option<u64>,
    /// Log verbosity on stderr (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat; Ctrl-C abandons the current answer
    Chat,
    /// Ask one question and print the answer
    Ask {
        #[arg(required = true)]
        query: Vec<String>,
    },
    /// Search articles
    Search {
        #[arg(required = true)]
        query: Vec<String>,
    },
    /// Show an article, its graph and a plain-language explanation
    Article {
        /// Article id, e.g. art-6
        id: String,
    },
    /// Print an article's knowledge graph
    Graph {
        /// Article id, e.g. art-6
        id: String,
        #[arg(long, value_enum, default_value_t = GraphFormat::Text)]
        format: GraphFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum GraphFormat {
    Text,
    Json,
}

/// How a streamed turn ended from the caller's side.
enum Ended {
    Outcome(TurnOutcome),
    Interrupted,
    TimedOut,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
    info!(api_url = %cli.api_url, model = %cli.model, "lexplain v{}", env!("CARGO_PKG_VERSION"));

    let client = ApiClient::new(cli.api_url.as_str());
    let timeout = cli.timeout.map(Duration::from_secs);

    match cli.command {
        Commands::Chat => cmd_chat(client, cli.model, timeout).await,
        Commands::Ask { query } => cmd_ask(client, cli.model, &query.join(" "), timeout).await,
        Commands::Search { query } => cmd_search(&client, &query.join(" ")).await,
        Commands::Article { id } => cmd_article(&client, &id).await,
        Commands::Graph { id, format } => cmd_graph(&client, &id, format).await,
    }
}

/// Drive a started turn, abandoning it on Ctrl-C or when `timeout` expires.
async fn stream_turn<O>(
    handle: TurnHandle,
    turn: PendingTurn<'_, ApiClient>,
    timeout: Option<Duration>,
    observer: &mut O,
) -> Ended
where
    O: TurnObserver,
{
    let deadline = async {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };

    let ended = tokio::select! {
        outcome = turn.drive(observer) => Ended::Outcome(outcome),
        _ = tokio::signal::ctrl_c() => Ended::Interrupted,
        _ = deadline => Ended::TimedOut,
    };
    if !matches!(ended, Ended::Outcome(_)) {
        handle.cancel();
        info!(turn = %handle.id(), "turn abandoned");
    }
    ended
}

async fn cmd_ask(
    client: ApiClient,
    model: ModelSelector,
    query: &str,
    timeout: Option<Duration>,
) -> anyhow::Result<()> {
    let orchestrator = StreamOrchestrator::new(client);
    let mut printer = StreamPrinter::new();

    let (handle, turn) = orchestrator.start(ChatRequest::new(query, model));
    match stream_turn(handle, turn, timeout, &mut printer).await {
        Ended::Outcome(TurnOutcome::Failed(_)) => {
            let err = printer
                .take_error()
                .unwrap_or_else(|| TransportError::Aborted("turn failed".into()));
            Err(err).context("chat request failed")
        }
        Ended::Outcome(_) => Ok(()),
        Ended::Interrupted => {
            println!("\n[interrupted]");
            Ok(())
        }
        Ended::TimedOut => bail!("no complete answer within the timeout"),
    }
}

/// Forwards turn callbacks to both the conversation and the printer.
struct ChatSession {
    conversation: Conversation,
    printer: StreamPrinter,
}

impl TurnObserver for ChatSession {
    fn on_progress(&mut self, turn: &TurnSnapshot) {
        if self.conversation.apply_progress(turn) {
            self.printer.on_progress(turn);
        }
    }

    fn on_error(&mut self, turn: TurnId, error: TransportError) {
        self.conversation.on_error(turn, error);
        self.printer.show_failure();
    }

    fn on_complete(&mut self, turn: TurnId) {
        self.conversation.on_complete(turn);
        self.printer.on_complete(turn);
    }
}

async fn cmd_chat(
    client: ApiClient,
    model: ModelSelector,
    timeout: Option<Duration>,
) -> anyhow::Result<()> {
    let orchestrator = StreamOrchestrator::new(client);
    let mut session = ChatSession {
        conversation: Conversation::new(),
        printer: StreamPrinter::new(),
    };
    for message in session.conversation.messages() {
        println!("{}", message.text());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if matches!(query, "exit" | "quit") {
            break;
        }

        let (handle, turn) = orchestrator.start(ChatRequest::new(query, model));
        let id = handle.id();
        session.conversation.begin(id, query)?;
        session.printer.reset();

        match stream_turn(handle, turn, timeout, &mut session).await {
            Ended::Outcome(_) => {}
            Ended::Interrupted | Ended::TimedOut => {
                session.conversation.abandon(id);
                println!("\n[abandoned]");
            }
        }
    }
    println!();
    Ok(())
}

async fn cmd_search(client: &ApiClient, query: &str) -> anyhow::Result<()> {
    let results = client
        .search(query)
        .await
        .with_context(|| format!("search for {query:?} failed"))?;
    print!("{}", display::search_results(&results));
    Ok(())
}

async fn cmd_article(client: &ApiClient, id: &str) -> anyhow::Result<()> {
    let view = load_article_view(client, id, |article, graph| {
        print!("{}", display::article_card(article));
        print!("{}", display::graph_text(graph));
        println!();
    })
    .await
    .with_context(|| format!("failed to load article {id}"))?;

    println!("Explanation");
    println!("  {}", view.explanation_text());
    Ok(())
}

async fn cmd_graph(client: &ApiClient, id: &str, format: GraphFormat) -> anyhow::Result<()> {
    let article = client
        .article(id)
        .await
        .with_context(|| format!("failed to load article {id}"))?;
    let graph = graph::build(&article);
    match format {
        GraphFormat::Text => print!("{}", display::graph_text(&graph)),
        GraphFormat::Json => println!("{}", serde_json::to_string_pretty(&graph.to_elements())?),
    }
    Ok(())
}
