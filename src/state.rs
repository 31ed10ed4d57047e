use crate::cache::CacheStore;
use crate::config::Config;
use crate::embedding::EmbeddingClient;
use crate::error::Result;
use crate::mcp::McpServer;
use crate::search::{OpenSearchHttp, VectorSearchClient};
use crate::table::{MySqlExecutor, WideTableClient};
use crate::tools::LindormTools;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Application state shared by both transports.
pub struct AppState {
    pub server: McpServer,
    /// Set once every backend client has been constructed
    pub ready: AtomicBool,
}

impl AppState {
    /// Build the backend clients from `config`.
    ///
    /// The SQL connection is opened eagerly; when that fails the server
    /// still starts and the connection is retried on the first SQL call.
    pub async fn new(config: &Config) -> Result<Self> {
        let engine = OpenSearchHttp::new(config.search_url(), &config.username, &config.password)?;
        let embedder = EmbeddingClient::new(
            config.ai_url(),
            &config.username,
            &config.password,
            &config.text_embedding_model,
            config.embedding_connect_timeout,
            config.embedding_read_timeout,
        )?;
        let search = VectorSearchClient::new(Arc::new(engine), Arc::new(embedder));

        let executor = MySqlExecutor::new(
            &config.table_host,
            config.table_port,
            &config.username,
            &config.password,
            &config.table_database,
        );
        if let Err(e) = executor.connect().await {
            tracing::warn!(
                error = %e,
                host = %config.table_host,
                "SQL connection failed at startup, will retry on first query"
            );
        }
        let table = WideTableClient::new(Arc::new(executor), config.table_database.clone());

        let cache = CacheStore::new(config.cache_dir.clone());
        tracing::info!(
            search = %config.search_url(),
            cache_dir = %config.cache_dir.display(),
            database = %config.table_database,
            "Backend clients initialized"
        );

        Ok(Self::from_tools(LindormTools::new(search, table, cache)))
    }

    /// Wrap an already-assembled facade; marks the state ready.
    pub fn from_tools(tools: LindormTools) -> Self {
        let state = Self {
            server: McpServer::new(tools),
            ready: AtomicBool::new(false),
        };
        state.ready.store(true, Ordering::SeqCst);
        state
    }

    /// Check if the service is ready to handle requests.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Stop accepting calls and release backend connections.
    pub async fn shutdown(&self) {
        self.ready.store(false, Ordering::SeqCst);
        self.server.tools().close().await;
        tracing::info!("Backend connections released");
    }
}
