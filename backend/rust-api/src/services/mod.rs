use std::sync::Arc;

use crate::config::Config;
use mongodb::Client as MongoClient;

use self::ai_client::AiClient;
use self::record_repository::{MongoRecordRepository, RecordRepository};
use self::tutor_service::TutorService;

pub struct AppState {
    pub config: Config,
    pub records: Arc<dyn RecordRepository>,
    /// `None` while no AI provider key is configured.
    pub tutor: Option<TutorService>,
}

impl AppState {
    pub async fn new(config: Config, mongo_client: MongoClient) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);
        let records: Arc<dyn RecordRepository> = Arc::new(MongoRecordRepository::new(mongo));

        tracing::info!("Checking MongoDB connectivity...");
        match tokio::time::timeout(std::time::Duration::from_secs(5), records.ping()).await {
            Ok(Ok(())) => tracing::info!("MongoDB connection established successfully"),
            Ok(Err(e)) => tracing::warn!("MongoDB ping failed, continuing degraded: {}", e),
            Err(_) => tracing::warn!("MongoDB ping timeout after 5s, continuing degraded"),
        }

        Self::with_repository(config, records)
    }

    pub fn with_repository(
        config: Config,
        records: Arc<dyn RecordRepository>,
    ) -> anyhow::Result<Self> {
        let tutor = AiClient::from_config(&config.ai)?.map(TutorService::new);
        if tutor.is_none() {
            tracing::warn!("AI_API_KEY not set, AI routes will answer 503");
        }

        Ok(Self {
            config,
            records,
            tutor,
        })
    }
}

pub mod ai_client;
pub mod record_repository;
pub mod tutor_service;
