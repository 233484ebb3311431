// MongoDB backend, shared with the bot process that writes the same collections

use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Bson, Document},
    options::ClientOptions,
    Client, Collection,
};
use tokio::sync::RwLock;
use tracing::info;

use super::{DocumentStore, Filter, FindOptions, Stage, Update, UpdateOutcome};
use crate::config::StoreConfig;
use crate::error::StoreError;

pub struct MongoStore {
    config: StoreConfig,
    client: RwLock<Option<Client>>,
}

impl MongoStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            client: RwLock::new(None),
        }
    }

    async fn collection(&self, name: &str) -> Result<Collection<Document>, StoreError> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or(StoreError::NotConnected)?;
        Ok(client.database(&self.config.database).collection(name))
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn connect(&self) -> Result<(), StoreError> {
        let mut guard = self.client.write().await;
        if guard.is_some() {
            return Ok(());
        }

        info!("Connecting to MongoDB database: {}", self.config.database);

        let mut options = ClientOptions::parse(&self.config.uri)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        options.app_name = Some("otp-dashboard".to_string());
        options.max_pool_size = Some(self.config.max_pool_size);
        options.connect_timeout = Some(self.config.connect_timeout);
        options.server_selection_timeout = Some(self.config.server_selection_timeout);

        let client = Client::with_options(options).map_err(|e| StoreError::Connection(e.to_string()))?;
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        info!("MongoDB connected successfully");
        *guard = Some(client);
        Ok(())
    }

    async fn disconnect(&self) {
        if let Some(client) = self.client.write().await.take() {
            client.shutdown().await;
            info!("MongoDB connection closed");
        }
    }

    async fn ensure_connected(&self) -> Result<(), StoreError> {
        match *self.client.read().await {
            Some(_) => Ok(()),
            None => Err(StoreError::NotConnected),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or(StoreError::NotConnected)?;
        client.database("admin").run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    async fn insert_one(&self, collection: &str, mut document: Document) -> Result<String, StoreError> {
        let id = match document.get("_id") {
            Some(Bson::ObjectId(oid)) => *oid,
            _ => {
                let oid = ObjectId::new();
                document.insert("_id", oid);
                oid
            }
        };

        self.collection(collection).await?.insert_one(document).await?;
        Ok(id.to_hex())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        upsert: bool,
    ) -> Result<UpdateOutcome, StoreError> {
        let result = self
            .collection(collection)
            .await?
            .update_one(filter.to_document(), update.to_document())
            .upsert(upsert)
            .await?;

        Ok(UpdateOutcome {
            matched: result.matched_count,
            upserted: result.upserted_id.is_some(),
        })
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let result = self
            .collection(collection)
            .await?
            .delete_one(filter.to_document())
            .await?;
        Ok(result.deleted_count)
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let result = self
            .collection(collection)
            .await?
            .delete_many(filter.to_document())
            .await?;
        Ok(result.deleted_count)
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        let coll = self.collection(collection).await?;
        let mut action = coll.find(filter.to_document());
        if let Some((field, order)) = &options.sort {
            action = action.sort(doc! { field.as_str(): order.as_i32() });
        }
        if let Some(limit) = options.limit {
            action = action.limit(limit);
        }

        let cursor = action.await?;
        let docs: Vec<Document> = cursor.try_collect().await?;
        Ok(docs)
    }

    async fn count_documents(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let count = self
            .collection(collection)
            .await?
            .count_documents(filter.to_document())
            .await?;
        Ok(count)
    }

    async fn aggregate(&self, collection: &str, pipeline: &[Stage]) -> Result<Vec<Document>, StoreError> {
        let stages: Vec<Document> = pipeline.iter().map(Stage::to_document).collect();
        let cursor = self.collection(collection).await?.aggregate(stages).await?;
        let docs: Vec<Document> = cursor.try_collect().await?;
        Ok(docs)
    }
}
