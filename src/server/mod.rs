// Server module: hosts the corpus and answers ingestion and query requests

mod ipc;
mod signals;

pub use ipc::{
    read_frame, read_message, write_frame, write_response, IpcClient, IpcMessage, IpcResponse,
    IpcServer, MAX_MESSAGE_SIZE,
};
pub use signals::SignalHandler;

use crate::chunking::Chunker;
use crate::config::Config;
use crate::embedding::{self, ModelIdentity};
use crate::error::{DocQaError, Result};
use crate::ingest::Ingestor;
use crate::llm::{self, CompletionProvider, LlmError};
use crate::retrieval::{CorpusHandle, RetrievalService, Retrieved, NO_DOCUMENT_LOADED};
use crate::storage::IndexStore;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task;

/// Shared state handed to every connection task
pub struct AppState {
    ingestor: Ingestor,
    retrieval: RetrievalService,
    llm: Option<Arc<dyn CompletionProvider>>,
    started_at: DateTime<Utc>,
    shutdown: Notify,
}

impl AppState {
    pub fn new(
        ingestor: Ingestor,
        retrieval: RetrievalService,
        llm: Option<Arc<dyn CompletionProvider>>,
    ) -> Self {
        Self {
            ingestor,
            retrieval,
            llm,
            started_at: Utc::now(),
            shutdown: Notify::new(),
        }
    }

    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    pub fn retrieval(&self) -> &RetrievalService {
        &self.retrieval
    }

    /// Ask the accept loop to stop
    pub fn request_shutdown(&self) {
        self.shutdown.notify_one();
    }
}

/// Document question-answering server
pub struct Server {
    socket_path: PathBuf,
    state: Arc<AppState>,
}

impl Server {
    /// Build every component from configuration and restore the persisted corpus
    pub fn new(config: &Config) -> Result<Self> {
        let provider = embedding::provider_from_config(&config.embedding)?;
        let chunker = Chunker::new(config.chunking.chunk_size, config.chunking.overlap)?;
        let store = Arc::new(IndexStore::new(
            config.corpus_dir(),
            ModelIdentity::of(provider.as_ref()).with_normalized(config.embedding.normalize),
        ));

        let corpus = CorpusHandle::new();
        let ingestor = Ingestor::new(chunker, provider.clone(), store, corpus.clone())
            .with_batch_size(config.embedding.batch_size);
        let retrieval =
            RetrievalService::new(provider, corpus).with_default_k(config.retrieval.top_k);

        let llm = match llm::provider_from_config(&config.llm) {
            Ok(provider) => {
                tracing::info!("Answering with LLM provider {}", provider.name());
                Some(provider)
            }
            Err(e) => {
                tracing::warn!("LLM unavailable, ask requests will fail: {}", e);
                None
            }
        };

        let state = AppState::new(ingestor, retrieval, llm);
        match state.ingestor.restore() {
            Some(count) => tracing::info!("Loaded persisted corpus ({} chunks)", count),
            None => tracing::info!("No persisted corpus, waiting for a document"),
        }

        Ok(Self::from_state(config.socket_path(), state))
    }

    /// Host already assembled state on `socket_path`
    pub fn from_state(socket_path: PathBuf, state: AppState) -> Self {
        Self {
            socket_path,
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Serve until SIGTERM, SIGINT, SIGHUP or a stop request
    pub async fn run_foreground(self) -> Result<()> {
        let mut signal_handler = SignalHandler::new()?;
        self.serve_until(async move {
            let sig = signal_handler.wait().await;
            tracing::info!("Shutdown signal received ({})", sig);
        })
        .await
    }

    /// Serve until `shutdown` completes or a stop request arrives
    pub async fn serve_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut ipc_server = IpcServer::new(self.socket_path.clone());
        ipc_server.bind()?;

        tracing::info!("Server started successfully");

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = ipc_server.accept() => {
                    match accepted {
                        Ok(stream) => {
                            let state = self.state.clone();
                            task::spawn(async move {
                                if let Err(e) = handle_client(stream, state).await {
                                    tracing::error!("Client handler error: {}", e);
                                }
                            });
                        }
                        Err(e) => tracing::warn!("{}", e),
                    }
                }

                _ = &mut shutdown => break,

                _ = self.state.shutdown.notified() => {
                    tracing::info!("Stop requested by client");
                    break;
                }
            }
        }

        tracing::info!("Shutting down server");
        ipc_server.shutdown()?;
        tracing::info!("Server shutdown complete");

        Ok(())
    }
}

/// Handle a client connection
async fn handle_client(mut stream: tokio::net::UnixStream, state: Arc<AppState>) -> Result<()> {
    let message = ipc::read_message(&mut stream).await?;
    tracing::debug!("Received {:?}", message);

    let stop = matches!(message, IpcMessage::Stop);
    let response = match dispatch(message, state.clone()).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("Request failed: {}", e);
            IpcResponse::error(e.to_string())
        }
    };

    ipc::write_response(&mut stream, &response).await?;

    if stop {
        state.request_shutdown();
    }

    Ok(())
}

/// Run a request against the shared state
pub async fn dispatch(message: IpcMessage, state: Arc<AppState>) -> Result<IpcResponse> {
    match message {
        IpcMessage::Ingest { path } => {
            let report = blocking(state, move |s| s.ingestor.ingest_file(&path)).await?;
            Ok(ingested(report))
        }
        IpcMessage::IngestBytes { name, bytes } => {
            let report = blocking(state, move |s| s.ingestor.ingest_bytes(&name, &bytes)).await?;
            Ok(ingested(report))
        }
        IpcMessage::IngestText { text } => {
            let report = blocking(state, move |s| s.ingestor.ingest_text(&text)).await?;
            Ok(ingested(report))
        }
        IpcMessage::Query { question, k } => {
            let retrieved = blocking(state, move |s| {
                Ok(s.retrieval.retrieve_scored(&question, k)?)
            })
            .await?;

            Ok(match retrieved {
                Retrieved::NoDocument => IpcResponse::success_with_data(json!({
                    "contexts": [NO_DOCUMENT_LOADED],
                    "results": [],
                }))
                .with_message(NO_DOCUMENT_LOADED),
                Retrieved::Chunks(chunks) => {
                    let contexts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
                    IpcResponse::success_with_data(json!({
                        "contexts": contexts,
                        "results": chunks,
                    }))
                }
            })
        }
        IpcMessage::Ask { question, k } => answer(state, question, k).await,
        IpcMessage::Status => Ok(status(&state)),
        IpcMessage::Stop => Ok(IpcResponse::success("Shutdown initiated")),
    }
}

async fn answer(state: Arc<AppState>, question: String, k: Option<usize>) -> Result<IpcResponse> {
    let retrieved = {
        let question = question.clone();
        blocking(state.clone(), move |s| {
            Ok(s.retrieval.retrieve_scored(&question, k)?)
        })
        .await?
    };

    let chunks = match retrieved {
        Retrieved::NoDocument => {
            return Ok(IpcResponse::success_with_data(json!({
                "answer": NO_DOCUMENT_LOADED,
                "contexts": [NO_DOCUMENT_LOADED],
            }))
            .with_message(NO_DOCUMENT_LOADED));
        }
        Retrieved::Chunks(chunks) => chunks,
    };

    let provider = state.llm.clone().ok_or(LlmError::Disabled)?;
    let contexts: Vec<String> = chunks.into_iter().map(|c| c.text).collect();
    let prompt = llm::build_prompt(&question, &contexts);

    let answer = provider.complete(&prompt).await?;
    tracing::info!("Answered question with {} context chunks", contexts.len());

    Ok(IpcResponse::success_with_data(json!({
        "answer": answer,
        "contexts": contexts,
    })))
}

fn status(state: &AppState) -> IpcResponse {
    let uptime = (Utc::now() - state.started_at).num_seconds();
    let corpus = state.retrieval.corpus().snapshot();

    let data = match corpus {
        Some(corpus) => json!({
            "loaded": true,
            "corpus_id": corpus.id(),
            "chunk_count": corpus.len(),
            "dimension": corpus.index().dimension(),
            "llm": state.llm.is_some(),
            "started_at": state.started_at.to_rfc3339(),
            "uptime_secs": uptime,
        }),
        None => json!({
            "loaded": false,
            "llm": state.llm.is_some(),
            "started_at": state.started_at.to_rfc3339(),
            "uptime_secs": uptime,
        }),
    };

    IpcResponse::success_with_data(data).with_message("Server is running")
}

fn ingested(report: crate::ingest::IngestReport) -> IpcResponse {
    let message = format!(
        "Ingested {} chunks in {}ms",
        report.chunk_count, report.duration_ms
    );
    match serde_json::to_value(&report) {
        Ok(data) => IpcResponse::success_with_data(data).with_message(message),
        Err(_) => IpcResponse::success(message),
    }
}

/// Run CPU-bound embedding work off the async workers
async fn blocking<T, F>(state: Arc<AppState>, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> Result<T> + Send + 'static,
{
    task::spawn_blocking(move || work(&state))
        .await
        .map_err(|e| DocQaError::Server(format!("Worker task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingProvider, HashEmbedProvider};
    use crate::retrieval::RetrievalError;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct EchoLlm;

    #[async_trait]
    impl CompletionProvider for EchoLlm {
        async fn complete(&self, prompt: &str) -> std::result::Result<String, LlmError> {
            Ok(format!("echo: {}", prompt.len()))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn state(temp: &TempDir, llm: Option<Arc<dyn CompletionProvider>>) -> Arc<AppState> {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashEmbedProvider::new(256));
        let store = Arc::new(IndexStore::new(
            temp.path().join("corpus"),
            ModelIdentity::of(provider.as_ref()),
        ));
        let corpus = CorpusHandle::new();
        let ingestor = Ingestor::new(
            Chunker::new(8, 2).unwrap(),
            provider.clone(),
            store,
            corpus.clone(),
        );
        let retrieval = RetrievalService::new(provider, corpus);
        Arc::new(AppState::new(ingestor, retrieval, llm))
    }

    #[tokio::test]
    async fn test_query_without_document() {
        let temp = TempDir::new().unwrap();
        let response = dispatch(
            IpcMessage::Query {
                question: "anything".to_string(),
                k: None,
            },
            state(&temp, None),
        )
        .await
        .unwrap();

        assert!(response.success);
        assert_eq!(response.message.as_deref(), Some(NO_DOCUMENT_LOADED));
        assert_eq!(response.data.unwrap()["contexts"][0], NO_DOCUMENT_LOADED);
    }

    #[tokio::test]
    async fn test_ask_without_document_skips_llm() {
        let temp = TempDir::new().unwrap();
        let response = dispatch(
            IpcMessage::Ask {
                question: "anything".to_string(),
                k: None,
            },
            state(&temp, None),
        )
        .await
        .unwrap();

        assert!(response.success);
        assert_eq!(response.data.unwrap()["answer"], NO_DOCUMENT_LOADED);
    }

    #[tokio::test]
    async fn test_ingest_then_query() {
        let temp = TempDir::new().unwrap();
        let state = state(&temp, None);

        let text = "photosynthesis converts light into chemical energy in plants. \
                    the mitochondria is the powerhouse of the cell and makes atp.";
        let response = dispatch(
            IpcMessage::IngestText {
                text: text.to_string(),
            },
            state.clone(),
        )
        .await
        .unwrap();
        assert!(response.success);
        assert_eq!(response.data.unwrap()["chunk_count"], 4);

        let response = dispatch(
            IpcMessage::Query {
                question: "mitochondria powerhouse cell".to_string(),
                k: Some(1),
            },
            state,
        )
        .await
        .unwrap();
        let data = response.data.unwrap();
        let contexts = data["contexts"].as_array().unwrap();
        assert_eq!(contexts.len(), 1);
        assert!(contexts[0].as_str().unwrap().contains("powerhouse"));
    }

    #[tokio::test]
    async fn test_ask_uses_llm() {
        let temp = TempDir::new().unwrap();
        let state = state(&temp, Some(Arc::new(EchoLlm)));
        dispatch(
            IpcMessage::IngestText {
                text: "cells divide by mitosis".to_string(),
            },
            state.clone(),
        )
        .await
        .unwrap();

        let response = dispatch(
            IpcMessage::Ask {
                question: "how do cells divide?".to_string(),
                k: None,
            },
            state,
        )
        .await
        .unwrap();

        let data = response.data.unwrap();
        assert!(data["answer"].as_str().unwrap().starts_with("echo: "));
        assert_eq!(data["contexts"][0], "cells divide by mitosis");
    }

    #[tokio::test]
    async fn test_ask_without_llm_is_an_error() {
        let temp = TempDir::new().unwrap();
        let state = state(&temp, None);
        dispatch(
            IpcMessage::IngestText {
                text: "cells divide by mitosis".to_string(),
            },
            state.clone(),
        )
        .await
        .unwrap();

        let result = dispatch(
            IpcMessage::Ask {
                question: "how?".to_string(),
                k: None,
            },
            state,
        )
        .await;
        assert!(matches!(result, Err(DocQaError::Llm(LlmError::Disabled))));
    }

    #[tokio::test]
    async fn test_ingest_uploaded_bytes() {
        let temp = TempDir::new().unwrap();
        let state = state(&temp, None);

        let response = dispatch(
            IpcMessage::IngestBytes {
                name: "notes.txt".to_string(),
                bytes: b"ribosomes translate messenger rna into protein".to_vec(),
            },
            state.clone(),
        )
        .await
        .unwrap();
        assert!(response.success);
        assert_eq!(response.data.unwrap()["chunk_count"], 1);

        let result = dispatch(
            IpcMessage::IngestBytes {
                name: "scan.pdf".to_string(),
                bytes: b"not really a pdf".to_vec(),
            },
            state.clone(),
        )
        .await;
        assert!(matches!(result, Err(DocQaError::Extract(_))));
        assert!(state.ingestor().corpus().is_loaded());
    }

    #[tokio::test]
    async fn test_blank_question_is_an_error() {
        let temp = TempDir::new().unwrap();
        let state = state(&temp, None);
        state.ingestor().ingest_text("cells divide by mitosis").unwrap();

        let result = dispatch(
            IpcMessage::Query {
                question: "  ".to_string(),
                k: None,
            },
            state,
        )
        .await;
        assert!(matches!(
            result,
            Err(DocQaError::Retrieval(RetrievalError::EmptyQuery))
        ));
    }

    #[tokio::test]
    async fn test_status_reports_corpus() {
        let temp = TempDir::new().unwrap();
        let state = state(&temp, None);

        let response = dispatch(IpcMessage::Status, state.clone()).await.unwrap();
        assert_eq!(response.data.unwrap()["loaded"], false);

        state.ingestor().ingest_text("one two three").unwrap();
        let response = dispatch(IpcMessage::Status, state).await.unwrap();
        let data = response.data.unwrap();
        assert_eq!(data["loaded"], true);
        assert_eq!(data["chunk_count"], 1);
        assert_eq!(data["dimension"], 256);
    }
}
