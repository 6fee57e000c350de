//! Constructs and wires the supervisor's components.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{Supervisor, SupervisorError};
use crate::{
    config::AppConfig,
    downloader::HttpDownloader,
    fetcher::HttpFetcher,
    forensics::{
        providers::{CommandMetadataExtractor, CommandSignatureScanner, MagicCarver, PrintableStrings},
        FileAnalyser,
    },
    http_client::HttpClientPool,
    persistence::{traits::Store, SqliteStore},
    scanner::ScanPipeline,
};

/// Builder assembling the supervisor's dependencies.
#[derive(Default)]
pub struct SupervisorBuilder {
    config: Option<AppConfig>,
}

impl SupervisorBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provides the application configuration.
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Connects the store, runs migrations and wires the pipeline.
    pub async fn build(self) -> Result<Supervisor, SupervisorError> {
        let config = Arc::new(self.config.ok_or(SupervisorError::MissingConfig)?);

        let store = Arc::new(
            SqliteStore::new(&config.store_uri)
                .await
                .map_err(|e| SupervisorError::StoreUnreachable(e.to_string()))?,
        );
        store
            .run_migrations()
            .await
            .map_err(|e| SupervisorError::StoreUnreachable(e.to_string()))?;

        let clients = Arc::new(
            HttpClientPool::new(&config.anon_proxy_addr, config.request_timeout())
                .map_err(|e| SupervisorError::InvalidConfiguration(e.to_string()))?,
        );
        let fetcher = Arc::new(HttpFetcher::new(Arc::clone(&clients), config.fetch_max_bytes));
        let downloader =
            Arc::new(HttpDownloader::new(Arc::clone(&clients), config.download_max_bytes));

        let file_analyser = Arc::new(FileAnalyser::new(
            Arc::new(CommandSignatureScanner::new(config.signature_scanner_path.as_str())),
            Arc::new(PrintableStrings::default()),
            Arc::new(CommandMetadataExtractor::new(config.metadata_extractor_path.as_str())),
            Arc::new(MagicCarver),
        ));

        let store_dyn: Arc<dyn Store> = store.clone();
        let pipeline = Arc::new(ScanPipeline::new(
            fetcher,
            downloader,
            file_analyser,
            store_dyn,
            config.max_file_downloads,
        ));

        Ok(Supervisor {
            config,
            store,
            pipeline,
            cancellation_token: CancellationToken::new(),
            join_set: tokio::task::JoinSet::new(),
        })
    }
}
