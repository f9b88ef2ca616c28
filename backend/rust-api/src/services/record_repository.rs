use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, Document},
    Database,
};
use tokio::sync::RwLock;

use crate::metrics::track_db_operation;
use crate::models::records::Collection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Replaced,
}

/// Server-side copies of synced records, keyed by the client-generated id.
///
/// `upsert` must be idempotent on `id`: replaying the same record replaces
/// the stored copy instead of duplicating it.
#[async_trait]
pub trait RecordRepository: Send + Sync {
    async fn upsert(
        &self,
        collection: Collection,
        id: &str,
        record: serde_json::Value,
    ) -> Result<UpsertOutcome>;

    async fn find(&self, collection: Collection, id: &str) -> Result<Option<serde_json::Value>>;

    async fn list_by_student(
        &self,
        collection: Collection,
        student_id: &str,
    ) -> Result<Vec<serde_json::Value>>;

    async fn ping(&self) -> Result<()>;
}

pub struct MongoRecordRepository {
    mongo: Database,
}

impl MongoRecordRepository {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn collection(&self, collection: Collection) -> mongodb::Collection<Document> {
        self.mongo.collection(collection.remote_collection())
    }
}

fn to_document(id: &str, record: serde_json::Value) -> Result<Document> {
    let mut document =
        mongodb::bson::to_document(&record).context("Record is not a JSON object")?;
    document.insert("_id", id);
    Ok(document)
}

fn from_document(mut document: Document) -> serde_json::Value {
    document.remove("_id");
    Bson::Document(document).into_relaxed_extjson()
}

#[async_trait]
impl RecordRepository for MongoRecordRepository {
    async fn upsert(
        &self,
        collection: Collection,
        id: &str,
        record: serde_json::Value,
    ) -> Result<UpsertOutcome> {
        let document = to_document(id, record)?;
        let target = self.collection(collection);

        let result = track_db_operation("upsert", collection.remote_collection(), async {
            target
                .replace_one(doc! { "_id": id }, document)
                .upsert(true)
                .await
                .context("Failed to upsert synced record")
        })
        .await?;

        Ok(if result.upserted_id.is_some() {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Replaced
        })
    }

    async fn find(&self, collection: Collection, id: &str) -> Result<Option<serde_json::Value>> {
        let target = self.collection(collection);
        let document = track_db_operation("find_one", collection.remote_collection(), async {
            target
                .find_one(doc! { "_id": id })
                .await
                .context("Failed to load synced record")
        })
        .await?;

        Ok(document.map(from_document))
    }

    async fn list_by_student(
        &self,
        collection: Collection,
        student_id: &str,
    ) -> Result<Vec<serde_json::Value>> {
        let target = self.collection(collection);
        let documents = track_db_operation("find", collection.remote_collection(), async {
            let cursor = target
                .find(doc! { "studentId": student_id })
                .await
                .context("Failed to query synced records")?;
            cursor
                .try_collect::<Vec<Document>>()
                .await
                .context("Synced records cursor error")
        })
        .await?;

        Ok(documents.into_iter().map(from_document).collect())
    }

    async fn ping(&self) -> Result<()> {
        self.mongo
            .run_command(doc! { "ping": 1 })
            .await
            .context("MongoDB ping failed")?;
        Ok(())
    }
}

/// Process-local repository for tests and single-node development.
#[derive(Default)]
pub struct InMemoryRecordRepository {
    records: RwLock<HashMap<(Collection, String), serde_json::Value>>,
}

impl InMemoryRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, collection: Collection) -> usize {
        self.records
            .read()
            .await
            .keys()
            .filter(|(c, _)| *c == collection)
            .count()
    }
}

#[async_trait]
impl RecordRepository for InMemoryRecordRepository {
    async fn upsert(
        &self,
        collection: Collection,
        id: &str,
        record: serde_json::Value,
    ) -> Result<UpsertOutcome> {
        let previous = self
            .records
            .write()
            .await
            .insert((collection, id.to_string()), record);
        Ok(match previous {
            Some(_) => UpsertOutcome::Replaced,
            None => UpsertOutcome::Created,
        })
    }

    async fn find(&self, collection: Collection, id: &str) -> Result<Option<serde_json::Value>> {
        Ok(self
            .records
            .read()
            .await
            .get(&(collection, id.to_string()))
            .cloned())
    }

    async fn list_by_student(
        &self,
        collection: Collection,
        student_id: &str,
    ) -> Result<Vec<serde_json::Value>> {
        let records = self.records.read().await;
        let mut matches: Vec<serde_json::Value> = records
            .iter()
            .filter(|((c, _), record)| {
                *c == collection && record["studentId"].as_str() == Some(student_id)
            })
            .map(|(_, record)| record.clone())
            .collect();
        matches.sort_by(|a, b| a["id"].as_str().cmp(&b["id"].as_str()));
        Ok(matches)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn in_memory_upsert_is_idempotent_on_id() {
        let repo = InMemoryRecordRepository::new();
        let record = json!({"id": "s1", "studentId": "u1", "content": "v1"});

        let first = repo
            .upsert(Collection::Submissions, "s1", record.clone())
            .await
            .unwrap();
        let second = repo
            .upsert(
                Collection::Submissions,
                "s1",
                json!({"id": "s1", "studentId": "u1", "content": "v2"}),
            )
            .await
            .unwrap();

        assert_eq!(first, UpsertOutcome::Created);
        assert_eq!(second, UpsertOutcome::Replaced);
        assert_eq!(repo.len(Collection::Submissions).await, 1);
        assert_eq!(
            repo.find(Collection::Submissions, "s1").await.unwrap().unwrap()["content"],
            "v2"
        );
    }

    #[test]
    fn documents_round_trip_without_mongo_id() {
        let record = json!({"id": "q1", "score": 0.5, "answers": ["a", 2]});
        let document = to_document("q1", record.clone()).unwrap();
        assert_eq!(document.get_str("_id").unwrap(), "q1");
        assert_eq!(from_document(document), record);
    }

    #[test]
    fn non_object_records_are_rejected() {
        assert!(to_document("x", json!(["not", "an", "object"])).is_err());
    }
}
