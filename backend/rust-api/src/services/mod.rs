use std::sync::Arc;

use redis::aio::ConnectionManager;

use crate::cache::{RedisSessionCache, SessionCache};
use crate::config::Config;
use crate::store::{mongo::MongoQuizStore, QuizStore};

pub mod attempt_service;
pub mod quiz_service;
pub mod scoring_service;

/// Shared application state. The store and cache are injected
/// capabilities: constructed once here (or from fakes in tests) and
/// passed down explicitly, never reached through a global.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn QuizStore>,
    pub cache: Arc<dyn SessionCache>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn QuizStore>, cache: Arc<dyn SessionCache>) -> Self {
        Self {
            config,
            store,
            cache,
        }
    }

    /// Connects to MongoDB and Redis as configured and wraps them in
    /// the store/cache capabilities.
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        let mongo_client = mongodb::Client::with_uri_str(&config.mongo_uri)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to MongoDB: {}", e))?;
        let mongo = mongo_client.database(&config.mongo_database);
        tracing::info!("MongoDB connected");

        let redis_client = redis::Client::open(config.redis_uri.clone())
            .map_err(|e| anyhow::anyhow!("Failed to create Redis client: {}", e))?;

        tracing::info!("Attempting to connect to Redis...");
        let redis = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            ConnectionManager::new(redis_client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        // Test connection
        let mut conn = redis.clone();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

        tracing::info!("Redis connection established successfully");

        Ok(Self {
            config,
            store: Arc::new(MongoQuizStore::new(mongo)),
            cache: Arc::new(RedisSessionCache::new(redis)),
        })
    }
}
