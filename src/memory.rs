use crate::{
    error::{LinkError, Result},
    models::{Link, LinkStatus},
    store::LinkStore,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    links: HashMap<String, Link>,
    by_owner: HashMap<String, HashSet<String>>,
}

/// In-process link store.
///
/// Both maps live behind one `RwLock`, so lookups run in parallel while
/// inserts and deletes see and leave both maps consistent.
#[derive(Debug, Default)]
pub struct MemoryLinkStore {
    tables: RwLock<Tables>,
}

impl MemoryLinkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LinkStore for MemoryLinkStore {
    async fn exists(&self, short_id: &str) -> Result<bool> {
        Ok(self.tables.read().await.links.contains_key(short_id))
    }

    async fn store(&self, mut link: Link) -> Result<Link> {
        link.owner_id = link.owner_id.filter(|o| !o.is_empty());
        let mut tables = self.tables.write().await;
        if tables.links.contains_key(&link.short_id) {
            return Err(LinkError::AlreadyExists);
        }
        if let Some(owner) = &link.owner_id {
            tables
                .by_owner
                .entry(owner.clone())
                .or_default()
                .insert(link.short_id.clone());
        }
        tables.links.insert(link.short_id.clone(), link.clone());
        Ok(link)
    }

    async fn get(&self, short_id: &str) -> Result<Link> {
        self.tables
            .read()
            .await
            .links
            .get(short_id)
            .cloned()
            .ok_or(LinkError::NotFound)
    }

    async fn delete(&self, short_id: &str, owner_id: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        let link = tables.links.get(short_id).ok_or(LinkError::NotFound)?;
        if !link.is_owned_by(owner_id) {
            return Err(LinkError::AccessDenied);
        }

        tables.links.remove(short_id);
        if let Some(ids) = tables.by_owner.get_mut(owner_id) {
            ids.remove(short_id);
            if ids.is_empty() {
                tables.by_owner.remove(owner_id);
            }
        }
        Ok(())
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Link>> {
        let tables = self.tables.read().await;
        let links = tables
            .by_owner
            .get(owner_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| tables.links.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();
        Ok(links)
    }

    async fn update_status(&self, short_id: &str, status: LinkStatus) -> Result<()> {
        let mut tables = self.tables.write().await;
        let link = tables.links.get_mut(short_id).ok_or(LinkError::NotFound)?;
        link.status = status;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Link>> {
        Ok(self.tables.read().await.links.values().cloned().collect())
    }
}
