//! ragkit CLI - chat sessions grounded in your documents.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use ragkit_core::{
    CollectionId, KnowledgeBaseCollection, KnowledgeBaseId, KnowledgeBaseSession, MessageSession,
    Registry, Role, SessionId,
};
use ragkit_knowledge::{
    ChatService, HttpRetriever, Ingestor, RagkitConfig, Retriever, SearchRequest, Summarizer,
};
use ragkit_storage::{JsonStorage, Storage};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ragkit")]
#[command(about = "Chat sessions grounded in your documents", long_about = None)]
struct Cli {
    /// Data directory (overrides the config file)
    #[arg(long, global = true, env = "RAGKIT_DATA_DIR")]
    data: Option<PathBuf>,

    /// Configuration file
    #[arg(long, global = true, default_value = "ragkit.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Message sessions
    #[command(subcommand)]
    Session(SessionCommand),
    /// Knowledge bases
    #[command(subcommand)]
    Kb(KbCommand),
    /// Knowledge-base collections
    #[command(subcommand)]
    Collection(CollectionCommand),
    /// Semantic search
    Search {
        /// Query text
        query: String,
        /// Passages to return
        #[arg(short, long, default_value = "3")]
        k: usize,
        /// Only passages ingested from this source
        #[arg(long)]
        source: Option<String>,
    },
    /// Summarize a text file
    Summarize {
        /// File to summarize
        file: PathBuf,
        /// Map-reduce over chunks instead of a single request
        #[arg(long)]
        chunked: bool,
    },
    /// Ask a question in a session
    Ask {
        /// Session ID
        session: String,
        /// Question
        message: String,
        /// Print the answer as it is generated
        #[arg(long)]
        stream: bool,
        /// Only retrieve passages ingested from this source
        #[arg(long)]
        source: Option<String>,
    },
}

#[derive(Subcommand)]
enum SessionCommand {
    /// Create a session
    New {
        /// Title
        title: String,
        /// Session ID (generated if omitted)
        #[arg(long)]
        id: Option<String>,
        /// Attached file paths
        #[arg(long = "file")]
        files: Vec<String>,
    },
    /// Append a message
    Say {
        /// Session ID
        id: String,
        /// Message text
        content: String,
        /// Author: human or assistant
        #[arg(long, default_value = "human")]
        role: Role,
    },
    /// Ground a session in a knowledge base
    Attach {
        /// Session ID
        session: String,
        /// Knowledge base ID
        kb: String,
    },
    /// Close a session
    Close {
        /// Session ID
        id: String,
    },
    /// Show a session and its messages
    Show {
        /// Session ID
        id: String,
    },
    /// List sessions
    List,
}

#[derive(Subcommand)]
enum KbCommand {
    /// Embed a document and store it as a knowledge base
    Ingest {
        /// Document file
        file: PathBuf,
        /// Knowledge base ID (generated if omitted)
        #[arg(long)]
        id: Option<String>,
        /// Metadata JSON
        #[arg(long)]
        metadata: Option<String>,
        /// Collection to join
        #[arg(long)]
        collection: Option<String>,
        /// Store one knowledge base per chunk, tagged with the file name
        #[arg(long, conflicts_with_all = ["id", "metadata"])]
        chunked: bool,
    },
    /// Show a knowledge base
    Show {
        /// Knowledge base ID
        id: String,
    },
}

#[derive(Subcommand)]
enum CollectionCommand {
    /// Create a collection
    New {
        /// Name
        name: String,
        /// Collection ID (generated if omitted)
        #[arg(long)]
        id: Option<String>,
        /// Metadata JSON
        #[arg(long, default_value = "{}")]
        metadata: String,
    },
    /// Add a knowledge base to a collection
    Add {
        /// Collection ID
        collection: String,
        /// Knowledge base ID
        kb: String,
    },
    /// Show a collection
    Show {
        /// Collection ID
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = RagkitConfig::load(Some(cli.config.as_path()))?;

    // Open storage and rebuild the registry
    let data_dir = cli.data.clone().unwrap_or_else(|| config.storage.data_dir.clone());
    let mut storage = JsonStorage::new(&data_dir).await?;
    let registry = match config.embedding.dimension {
        Some(dim) => Registry::new().with_embedding_dimension(dim),
        None => Registry::new(),
    };
    registry
        .restore(storage.load_snapshot().await?)
        .with_context(|| format!("stored data in {} is inconsistent", data_dir.display()))?;
    let registry = Arc::new(registry);

    execute(cli.command, &registry, &config, &mut storage).await
}

/// Run one command and persist the registry if it changed. A command that
/// fails after mutating the registry still saves what it changed.
async fn execute(
    command: Commands,
    registry: &Arc<Registry>,
    config: &RagkitConfig,
    storage: &mut JsonStorage,
) -> Result<()> {
    let before = registry.snapshot();
    let outcome = run(command, registry, config).await;

    let message = match &outcome {
        Ok(message) => message.clone(),
        Err(e) if registry.snapshot() != before => {
            warn!("Saving partial changes after error: {}", e);
            Some(format!("Partial change before error: {}", e))
        }
        Err(_) => None,
    };
    if let Some(message) = message {
        storage.save_snapshot(&registry.snapshot()).await?;
        storage.commit(&message).await?;
        info!("Saved to {}", storage.root().display());
    }

    outcome.map(|_| ())
}

/// Run one command. Returns a commit message when the registry changed.
async fn run(
    command: Commands,
    registry: &Arc<Registry>,
    config: &RagkitConfig,
) -> Result<Option<String>> {
    match command {
        Commands::Session(cmd) => session_command(cmd, registry),
        Commands::Kb(cmd) => kb_command(cmd, registry, config).await,
        Commands::Collection(cmd) => collection_command(cmd, registry),
        Commands::Search { query, k, source } => {
            let retriever = retriever(config)?;
            let mut request = SearchRequest::new(query).with_k(k);
            if let Some(source) = source {
                request = request.with_source(source);
            }
            let response = request.execute(retriever.as_ref()).await?;
            println!("Results ({})", response.results.len());
            for (i, passage) in response.results.iter().enumerate() {
                println!("[{}] {}", i + 1, passage);
            }
            Ok(None)
        }
        Commands::Summarize { file, chunked } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("cannot read {}", file.display()))?;
            let settings = config.summarize.settings(config.completion.max_tokens);
            let completer = Arc::new(config.completion.client());
            let summarizer = Summarizer::with_settings(completer, settings);

            if chunked {
                let summary = summarizer.summarize_chunked(&text).await?;
                for (i, part) in summary.individual_summaries.iter().enumerate() {
                    println!("=== Part {} ===\n{}\n", i + 1, part);
                }
                println!(
                    "=== Summary ({} chars in) ===\n{}",
                    summary.original_length, summary.final_summary
                );
            } else {
                println!("{}", summarizer.summarize(&text).await?);
            }
            Ok(None)
        }
        Commands::Ask { session, message, stream, source } => {
            let session_id = SessionId::new(session);
            let completer = Arc::new(config.completion.client());
            let service = ChatService::new(registry.clone(), retriever(config)?, completer)
                .with_k(config.retrieval.k)
                .with_source(source)
                .with_options(config.completion.options());

            if stream {
                let mut chunks = service.ask_stream(&session_id, &message).await?;
                let mut stdout = std::io::stdout();
                while let Some(chunk) = chunks.next().await {
                    print!("{}", chunk?);
                    stdout.flush()?;
                }
                println!();
            } else {
                let reply = service.ask(&session_id, &message).await?;
                println!("{}", reply.content());
            }
            Ok(Some(format!("Chat in session {}", session_id)))
        }
    }
}

fn session_command(cmd: SessionCommand, registry: &Registry) -> Result<Option<String>> {
    match cmd {
        SessionCommand::New { title, id, files } => {
            let id = id.map(SessionId::new).unwrap_or_else(SessionId::generate);
            let files = (!files.is_empty()).then_some(files);
            let session = registry.create_message_session(id, title, files)?;
            println!("Created session: {} - {}", session.id(), session.title());
            Ok(Some(format!("Create session {}", session.id())))
        }
        SessionCommand::Say { id, content, role } => {
            let id = SessionId::new(id);
            let message = registry.append_chat_message(&id, content, role)?;
            println!(
                "[{}] {}: {}",
                message.created_at().to_rfc3339(),
                message.role(),
                message.content()
            );
            Ok(Some(format!("Append message to {}", id)))
        }
        SessionCommand::Attach { session, kb } => {
            let session_id = SessionId::new(session);
            let kb_id = KnowledgeBaseId::new(kb);
            registry.attach_knowledge_base(&session_id, &kb_id)?;
            println!("Attached {} to {}", kb_id, session_id);
            Ok(Some(format!("Attach {} to {}", kb_id, session_id)))
        }
        SessionCommand::Close { id } => {
            let session = registry.close_message_session(&SessionId::new(id))?;
            println!("Closed session: {}", session.id());
            Ok(Some(format!("Close session {}", session.id())))
        }
        SessionCommand::Show { id } => {
            print_session(&registry.message_session(&SessionId::new(id))?);
            Ok(None)
        }
        SessionCommand::List => {
            let sessions = registry.list_message_sessions();
            println!("Sessions ({})", sessions.len());
            for s in sessions {
                println!(
                    "  {} | {} | {} messages{} - {}",
                    s.id(),
                    s.created_at().format("%Y-%m-%d %H:%M"),
                    s.messages().len(),
                    if s.is_closed() { " | closed" } else { "" },
                    s.title(),
                );
            }
            Ok(None)
        }
    }
}

async fn kb_command(
    cmd: KbCommand,
    registry: &Arc<Registry>,
    config: &RagkitConfig,
) -> Result<Option<String>> {
    match cmd {
        KbCommand::Ingest { file, id, metadata, collection, chunked } => {
            let document = std::fs::read_to_string(&file)
                .with_context(|| format!("cannot read {}", file.display()))?;
            let source = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());
            let collection = collection.map(CollectionId::new);
            let ingestor = Ingestor::new(registry.clone(), config.embedding.embedder())
                .with_chunk_size(config.ingest.chunk_size);

            if chunked {
                let chunks = ingestor
                    .ingest_chunks(&document, &source, collection.as_ref())
                    .await?;
                for kb in &chunks {
                    let chars = kb.document().chars().count();
                    println!("Ingested chunk: {} ({} chars)", kb.id(), chars);
                }
                return Ok(Some(format!("Ingest {} chunks of {}", chunks.len(), source)));
            }

            let metadata =
                metadata.unwrap_or_else(|| serde_json::json!({ "source": source }).to_string());
            let kb = ingestor
                .ingest(id.map(KnowledgeBaseId::new), &document, &metadata, collection.as_ref())
                .await?;
            println!("Ingested knowledge base: {} ({} dims)", kb.id(), kb.dimension());
            Ok(Some(format!("Ingest {}", kb.id())))
        }
        KbCommand::Show { id } => {
            print_knowledge_base(&registry.knowledge_base(&KnowledgeBaseId::new(id))?);
            Ok(None)
        }
    }
}

fn collection_command(cmd: CollectionCommand, registry: &Registry) -> Result<Option<String>> {
    match cmd {
        CollectionCommand::New { name, id, metadata } => {
            let id = id.map(CollectionId::new).unwrap_or_else(CollectionId::generate);
            let collection = registry.create_collection(id, name, metadata)?;
            println!("Created collection: {} - {}", collection.id(), collection.name());
            Ok(Some(format!("Create collection {}", collection.id())))
        }
        CollectionCommand::Add { collection, kb } => {
            let collection_id = CollectionId::new(collection);
            let kb_id = KnowledgeBaseId::new(kb);
            if registry.add_session_to_collection(&collection_id, &kb_id)? {
                println!("Added {} to {}", kb_id, collection_id);
                Ok(Some(format!("Add {} to {}", kb_id, collection_id)))
            } else {
                println!("{} is already in {}", kb_id, collection_id);
                Ok(None)
            }
        }
        CollectionCommand::Show { id } => {
            print_collection(&registry.collection(&CollectionId::new(id))?);
            Ok(None)
        }
    }
}

/// The configured retrieval service.
fn retriever(config: &RagkitConfig) -> Result<Arc<dyn Retriever>> {
    let Some(endpoint) = &config.retrieval.endpoint else {
        anyhow::bail!(
            "no retrieval endpoint configured (set retrieval.endpoint or RAGKIT_RETRIEVAL_URL)"
        );
    };
    Ok(Arc::new(HttpRetriever::new(endpoint)))
}

fn print_session(session: &MessageSession) {
    println!("Session: {}", session.id());
    println!("  Title: {}", session.title());
    println!("  Created: {}", session.created_at());
    if let Some(closed) = session.closed_at() {
        println!("  Closed: {}", closed);
    }
    if let Some(files) = session.files() {
        println!("  Files: {}", files.join(", "));
    }
    if let Some(kb) = session.knowledge_base() {
        println!("  Knowledge base: {}", kb.id());
    }
    println!("  Messages ({})", session.messages().len());
    for m in session.messages() {
        println!("    [{}] {}: {}", m.created_at().to_rfc3339(), m.role(), m.content());
    }
}

fn print_knowledge_base(kb: &KnowledgeBaseSession) {
    println!("Knowledge base: {}", kb.id());
    println!("  Dimension: {}", kb.dimension());
    println!("  Metadata: {}", kb.metadata());
    println!("  Created: {}", kb.created_at());
    if let Some(collection) = kb.collection_id() {
        println!("  Collection: {}", collection);
    }
    println!("  Document: {} chars", kb.document().chars().count());
}

fn print_collection(collection: &KnowledgeBaseCollection) {
    println!("Collection: {}", collection.id());
    println!("  Name: {}", collection.name());
    println!("  Metadata: {}", collection.metadata());
    println!("  Created: {}", collection.created_at());
    println!("  Knowledge bases ({})", collection.len());
    for id in collection.sessions() {
        println!("    {}", id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_say_with_role() {
        let args = [
            "ragkit", "--data", "/tmp/x", "session", "say", "s1", "hello", "--role", "assistant",
        ];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.data, Some(PathBuf::from("/tmp/x")));
        match cli.command {
            Commands::Session(SessionCommand::Say { id, content, role }) => {
                assert_eq!(id, "s1");
                assert_eq!(content, "hello");
                assert_eq!(role, Role::Assistant);
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn test_parse_search_default_k() {
        let cli = Cli::try_parse_from(["ragkit", "search", "who hosts"]).unwrap();
        assert!(matches!(cli.command, Commands::Search { k: 3, source: None, .. }));

        let cli = Cli::try_parse_from(["ragkit", "search", "q", "--source", "ep1.txt"]).unwrap();
        assert!(matches!(cli.command, Commands::Search { source: Some(s), .. } if s == "ep1.txt"));
    }

    #[test]
    fn test_chunked_ingest_rejects_explicit_id() {
        let args = ["ragkit", "kb", "ingest", "notes.txt", "--chunked", "--id", "kb1"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[tokio::test]
    async fn test_session_commands_mutate_registry() {
        let registry = Arc::new(Registry::new());
        let config = RagkitConfig::default();

        let new = Commands::Session(SessionCommand::New {
            title: "Session 1".into(),
            id: Some("s1".into()),
            files: vec![],
        });
        assert!(run(new, &registry, &config).await.unwrap().is_some());

        let say = Commands::Session(SessionCommand::Say {
            id: "s1".into(),
            content: "hi".into(),
            role: Role::Human,
        });
        run(say, &registry, &config).await.unwrap();

        let show = Commands::Session(SessionCommand::Show { id: "s1".into() });
        assert!(run(show, &registry, &config).await.unwrap().is_none());
        assert_eq!(registry.message_session(&"s1".into()).unwrap().messages().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_ask_still_saves_human_turn() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = JsonStorage::new(dir.path()).await.unwrap();
        let registry = Arc::new(Registry::new());
        registry.create_message_session("s1".into(), "Podcast", None).unwrap();

        // Nothing listens on port 1, so retrieval fails after the human turn.
        let mut config = RagkitConfig::default();
        config.retrieval.endpoint = Some("http://127.0.0.1:1/retrieval/".into());

        let ask = Commands::Ask {
            session: "s1".into(),
            message: "Who is the host?".into(),
            stream: false,
            source: None,
        };
        assert!(execute(ask, &registry, &config, &mut storage).await.is_err());

        let restored = Registry::new();
        restored.restore(storage.load_snapshot().await.unwrap()).unwrap();
        let session = restored.message_session(&"s1".into()).unwrap();
        let log: Vec<_> = session.messages().iter().map(|m| (m.role(), m.content())).collect();
        assert_eq!(log, vec![(Role::Human, "Who is the host?")]);
        assert!(!storage.has_pending().await);
    }

    #[tokio::test]
    async fn test_failed_command_without_changes_saves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = JsonStorage::new(dir.path()).await.unwrap();
        let registry = Arc::new(Registry::new());

        let say = Commands::Session(SessionCommand::Say {
            id: "missing".into(),
            content: "hi".into(),
            role: Role::Human,
        });
        assert!(execute(say, &registry, &RagkitConfig::default(), &mut storage).await.is_err());
        assert!(storage.load_snapshot().await.unwrap().sessions.is_empty());
    }

    #[tokio::test]
    async fn test_search_requires_retrieval_endpoint() {
        let registry = Arc::new(Registry::new());
        let search = Commands::Search {
            query: "who hosts".into(),
            k: 3,
            source: None,
        };
        let err = run(search, &registry, &RagkitConfig::default()).await.unwrap_err();
        assert!(err.to_string().contains("RAGKIT_RETRIEVAL_URL"));
    }
}
