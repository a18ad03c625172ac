//! In-memory object store for unit tests

use crate::error::{UploadError, UploadResult};
use crate::s3::store::ObjectStore;
use async_trait::async_trait;
use aws_sdk_s3::types::ObjectCannedAcl;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Bucket = BTreeMap<String, (Vec<u8>, ObjectCannedAcl)>;

#[derive(Default)]
pub struct MemoryStore {
    buckets: Mutex<HashMap<String, Bucket>>,
    delay: Option<Duration>,
    stall: Option<(String, Duration)>,
    failure: Option<String>,
    bucket_checks: AtomicUsize,
    puts: AtomicUsize,
}

impl MemoryStore {
    pub fn with_bucket(name: &str) -> Self {
        let store = Self::default();
        store
            .buckets
            .lock()
            .unwrap()
            .insert(name.to_string(), Bucket::new());
        store
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Delay only puts of `key`
    pub fn stalled_on(mut self, key: &str, delay: Duration) -> Self {
        self.stall = Some((key.to_string(), delay));
        self
    }

    pub fn failing_with(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .lock()
            .unwrap()
            .get(bucket)
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.buckets
            .lock()
            .unwrap()
            .get(bucket)
            .and_then(|b| b.get(key))
            .map(|(data, _)| data.clone())
    }

    pub fn acl(&self, bucket: &str, key: &str) -> Option<ObjectCannedAcl> {
        self.buckets
            .lock()
            .unwrap()
            .get(bucket)
            .and_then(|b| b.get(key))
            .map(|(_, acl)| acl.clone())
    }

    pub fn bucket_checks(&self) -> usize {
        self.bucket_checks.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn bucket_exists(&self, bucket: &str) -> UploadResult<bool> {
        self.bucket_checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.buckets.lock().unwrap().contains_key(bucket))
    }

    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        acl: ObjectCannedAcl,
    ) -> UploadResult<u64> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((ref stalled, delay)) = self.stall {
            if stalled == key {
                tokio::time::sleep(delay).await;
            }
        }
        if let Some(ref message) = self.failure {
            return Err(UploadError::Storage(message.clone()));
        }

        let data = tokio::fs::read(path).await.map_err(|source| UploadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let size = data.len() as u64;

        let mut buckets = self.buckets.lock().unwrap();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| UploadError::Storage(format!("NoSuchBucket: {}", bucket)))?;
        objects.insert(key.to_string(), (data, acl));

        Ok(size)
    }
}
