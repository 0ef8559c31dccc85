use anyhow::Context;
use docqa::cli::{Cli, Commands, ConfigAction};
use docqa::config::Config;
use docqa::error::{DocQaError, Result};
use docqa::server::{IpcClient, IpcMessage, IpcResponse, Server};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Serve => cmd_serve(cli.config)?,
        Commands::Ingest { file, upload } => cmd_ingest(cli.config, &file, upload)?,
        Commands::Query { question, k, json } => cmd_query(cli.config, question, k, json)?,
        Commands::Ask { question, k } => cmd_ask(cli.config, question, k)?,
        Commands::Status => cmd_status(cli.config)?,
        Commands::Stop => cmd_stop(cli.config)?,
        Commands::Config { action } => cmd_config(cli.config, action)?,
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "docqa=debug" } else { "docqa=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?)
}

fn cmd_serve(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    tracing::info!("Starting docqa server...");

    let server = Server::new(&config)?;
    runtime()?.block_on(server.run_foreground())
}

/// Send one request to the running server
fn send(config_path: Option<PathBuf>, message: IpcMessage) -> Result<IpcResponse> {
    let config = load_config(config_path)?;
    let client = IpcClient::new(config.socket_path());
    runtime()?.block_on(client.send(&message))
}

/// Turn an unsuccessful response into an error
fn check(response: &IpcResponse) -> Result<()> {
    if response.success {
        return Ok(());
    }
    Err(DocQaError::Server(
        response
            .message
            .clone()
            .unwrap_or_else(|| "Request failed".to_string()),
    ))
}

fn cmd_ingest(config_path: Option<PathBuf>, file: &Path, upload: bool) -> Result<()> {
    // The server resolves paths against its own working directory
    let path = std::fs::canonicalize(file)
        .with_context(|| format!("Cannot read document: {:?}", file))?;

    let message = if upload {
        let bytes =
            std::fs::read(&path).with_context(|| format!("Cannot read document: {:?}", path))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        IpcMessage::IngestBytes { name, bytes }
    } else {
        IpcMessage::Ingest { path }
    };

    let response = send(config_path, message)?;
    check(&response)?;

    println!(
        "✓ {}",
        response.message.as_deref().unwrap_or("Document ingested")
    );
    if let Some(data) = response.data {
        if let Some(id) = data.get("corpus_id").and_then(|v| v.as_str()) {
            println!("  Corpus: {}", id);
        }
    }

    Ok(())
}

fn cmd_query(
    config_path: Option<PathBuf>,
    question: String,
    k: Option<usize>,
    json: bool,
) -> Result<()> {
    let response = send(config_path, IpcMessage::Query { question, k })?;
    check(&response)?;

    let data = response.data.unwrap_or_default();

    if json {
        let pretty = serde_json::to_string_pretty(&data).map_err(|e| DocQaError::Json {
            source: e,
            context: "Failed to format query results".to_string(),
        })?;
        println!("{}", pretty);
        return Ok(());
    }

    if let Some(message) = response.message {
        println!("{}", message);
        return Ok(());
    }

    let results = data
        .get("results")
        .and_then(|r| r.as_array())
        .cloned()
        .unwrap_or_default();

    for (rank, result) in results.iter().enumerate() {
        let score = result.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0);
        let index = result.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
        let text = result.get("text").and_then(|t| t.as_str()).unwrap_or("");
        println!("[{}] chunk {} (score {:.4})", rank + 1, index, score);
        println!("{}\n", text);
    }

    Ok(())
}

fn cmd_ask(config_path: Option<PathBuf>, question: String, k: Option<usize>) -> Result<()> {
    let response = send(config_path, IpcMessage::Ask { question, k })?;
    check(&response)?;

    let answer = response
        .data
        .as_ref()
        .and_then(|d| d.get("answer"))
        .and_then(|a| a.as_str())
        .unwrap_or_default();
    println!("{}", answer);

    Ok(())
}

fn cmd_status(config_path: Option<PathBuf>) -> Result<()> {
    let response = match send(config_path, IpcMessage::Status) {
        Ok(response) => response,
        Err(DocQaError::ServerNotRunning { .. }) => {
            println!("Server: Stopped");
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    check(&response)?;

    let data = response.data.unwrap_or_default();
    println!("docqa Status");
    println!("============");
    println!("\nServer: Running");
    if let Some(started) = data.get("started_at").and_then(|v| v.as_str()) {
        println!("  Started: {}", started);
    }

    if data.get("loaded").and_then(|v| v.as_bool()) == Some(true) {
        println!(
            "\nDocument: {} chunks, {}D",
            data.get("chunk_count").cloned().unwrap_or_default(),
            data.get("dimension").cloned().unwrap_or_default()
        );
        if let Some(id) = data.get("corpus_id").and_then(|v| v.as_str()) {
            println!("  Corpus: {}", id);
        }
    } else {
        println!("\nDocument: none loaded");
    }

    let llm = data.get("llm").and_then(|v| v.as_bool()).unwrap_or(false);
    println!("LLM: {}", if llm { "available" } else { "unavailable" });

    Ok(())
}

fn cmd_stop(config_path: Option<PathBuf>) -> Result<()> {
    match send(config_path, IpcMessage::Stop) {
        Ok(response) => {
            check(&response)?;
            println!("✓ Server stopped");
        }
        Err(DocQaError::ServerNotRunning { .. }) => println!("Server is not running"),
        Err(e) => return Err(e),
    }
    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path)?;
            let mut value = serde_json::to_value(&config).map_err(|e| DocQaError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;

            if let Some(section) = section {
                value = value
                    .get(&section)
                    .cloned()
                    .ok_or_else(|| DocQaError::Config(format!("Unknown section: {}", section)))?;
            }

            let json = serde_json::to_string_pretty(&value).map_err(|e| DocQaError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| DocQaError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'docqa config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        return Ok(config);
    }

    Config::load(&path)
}
