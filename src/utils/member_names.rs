use std::{collections::HashMap, sync::Arc, time::Duration};

use futures_util::StreamExt;
use moka::future::Cache;

use crate::{error::StoreError, model::member::UNKNOWN_MEMBER, store::JobStore};

/// Member id -> display name, read through to the store on a miss.
#[derive(Clone)]
pub struct MemberNames {
    cache: Cache<u64, String>,
    store: Arc<dyn JobStore>,
}

impl MemberNames {
    pub fn new(store: Arc<dyn JobStore>, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(100_000)
            .time_to_live(ttl)
            .build();
        Self { cache, store }
    }

    pub async fn remember(&self, member_id: u64, name: String) {
        self.cache.insert(member_id, name).await;
    }

    async fn batch_remember(&self, batch: &[(u64, String)]) {
        let futures: Vec<_> = batch
            .iter()
            .map(|(id, name)| self.cache.insert(*id, name.clone()))
            .collect();
        futures::future::join_all(futures).await;
    }

    /// Names for every id in `member_ids`. Ids the store cannot resolve map
    /// to "Unknown Member" and are not cached.
    pub async fn resolve(&self, member_ids: &[u64]) -> Result<HashMap<u64, String>, StoreError> {
        let mut names = HashMap::with_capacity(member_ids.len());
        let mut misses = Vec::new();
        for &id in member_ids {
            match self.cache.get(&id).await {
                Some(name) => {
                    names.insert(id, name);
                }
                None => misses.push(id),
            }
        }

        if !misses.is_empty() {
            let loaded = self.store.member_names(&misses).await?;
            for id in misses {
                match loaded.get(&id) {
                    Some(name) => {
                        self.remember(id, name.clone()).await;
                        names.insert(id, name.clone());
                    }
                    None => {
                        names.insert(id, UNKNOWN_MEMBER.to_string());
                    }
                }
            }
        }
        Ok(names)
    }

    /// Streams every member into the cache in batches.
    pub async fn warmup(&self, batch_size: usize) -> Result<usize, StoreError> {
        let mut stream = self.store.stream_members();
        let mut batch = Vec::with_capacity(batch_size);
        let mut total = 0usize;

        while let Some(member) = stream.next().await {
            let member = member?;
            batch.push((member.id, member.display_name()));
            total += 1;

            if batch.len() >= batch_size {
                self.batch_remember(&batch).await;
                batch.clear();
            }
        }

        if !batch.is_empty() {
            self.batch_remember(&batch).await;
        }

        tracing::info!(members = total, "Member name cache warmup complete");
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn names_over(store: Arc<MemoryStore>) -> MemberNames {
        MemberNames::new(store, Duration::from_secs(60))
    }

    #[actix_web::test]
    async fn warmup_loads_every_member() {
        let store = Arc::new(MemoryStore::new());
        store.add_member(1, "Asha", "Rao");
        store.add_member(2, "Ben", "Okafor");
        store.add_member(3, "Chen", "Li");

        let names = names_over(store);
        assert_eq!(names.warmup(2).await.unwrap(), 3);
        assert_eq!(names.cache.get(&2).await.as_deref(), Some("Ben Okafor"));
    }

    #[actix_web::test]
    async fn unresolved_ids_fall_back() {
        let store = Arc::new(MemoryStore::new());
        store.add_member(1, "Asha", "Rao");

        let names = names_over(store);
        let resolved = names.resolve(&[1, 404]).await.unwrap();
        assert_eq!(resolved[&1], "Asha Rao");
        assert_eq!(resolved[&404], UNKNOWN_MEMBER);
        assert!(names.cache.get(&404).await.is_none());
    }

    #[actix_web::test]
    async fn cached_names_win_over_store() {
        let store = Arc::new(MemoryStore::new());
        store.add_member(1, "Asha", "Rao");

        let names = names_over(store);
        names.remember(1, "A. Rao".to_string()).await;
        assert_eq!(names.resolve(&[1]).await.unwrap()[&1], "A. Rao");
    }
}
