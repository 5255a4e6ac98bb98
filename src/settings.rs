use serde_json::Map;

use crate::error::CoreResult;
use crate::model::{id_from_value, id_to_value};
use crate::reconcile::DefaultsReconciler;
use crate::store::{PathStore, Paths};

/// Community-level keys outside the leveling block.
#[derive(Clone)]
pub struct CommunitySettings {
    store: PathStore,
    paths: Paths,
    reconciler: DefaultsReconciler,
}

impl CommunitySettings {
    pub fn new(store: PathStore, paths: Paths, reconciler: DefaultsReconciler) -> Self {
        Self { store, paths, reconciler }
    }

    async fn read_id(&self, community_id: &str, key: &str) -> CoreResult<Option<String>> {
        let path = self.paths.data(community_id)?.child(key)?;
        Ok(self.store.get(&path).await?.as_ref().and_then(id_from_value))
    }

    async fn write_id(&self, community_id: &str, key: &str, id: Option<&str>) -> CoreResult<()> {
        self.reconciler.ensure_community(community_id).await?;
        let mut partial = Map::new();
        partial.insert(key.to_string(), id.map(id_to_value).unwrap_or_else(|| 0.into()));
        self.store.update(&self.paths.data(community_id)?, partial).await
    }

    /// Channel whose joiners get their own voice room, if configured.
    pub async fn voice_trigger(&self, community_id: &str) -> CoreResult<Option<String>> {
        self.read_id(community_id, "create_vc").await
    }

    pub async fn set_voice_trigger(&self, community_id: &str, channel_id: Option<&str>) -> CoreResult<()> {
        self.write_id(community_id, "create_vc", channel_id).await
    }

    pub async fn supporter_role(&self, community_id: &str) -> CoreResult<Option<String>> {
        self.read_id(community_id, "supporter_role").await
    }

    pub async fn set_supporter_role(&self, community_id: &str, role_id: &str) -> CoreResult<()> {
        self.write_id(community_id, "supporter_role", Some(role_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Defaults;
    use crate::store::MemoryBackend;
    use std::sync::Arc;

    fn settings() -> CommunitySettings {
        let store = PathStore::new(Arc::new(MemoryBackend::new()));
        let reconciler =
            DefaultsReconciler::new(store.clone(), Paths::default(), Arc::new(Defaults::builtin()));
        CommunitySettings::new(store, Paths::default(), reconciler)
    }

    #[tokio::test]
    async fn test_voice_trigger_roundtrip_and_disable() {
        let s = settings();
        assert_eq!(s.voice_trigger("g1").await.unwrap(), None);
        s.set_voice_trigger("g1", Some("555")).await.unwrap();
        assert_eq!(s.voice_trigger("g1").await.unwrap().as_deref(), Some("555"));
        s.set_voice_trigger("g1", None).await.unwrap();
        assert_eq!(s.voice_trigger("g1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_supporter_role() {
        let s = settings();
        s.set_supporter_role("g1", "77").await.unwrap();
        assert_eq!(s.supporter_role("g1").await.unwrap().as_deref(), Some("77"));
    }
}
