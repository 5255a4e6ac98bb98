//! Additive synchronization of stored records against the default schema.
//!
//! Only keys absent from a record are ever written, so a second pass over
//! unchanged state issues no writes, and an interrupted pass can simply be rerun.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::error::CoreResult;
use crate::events::CommunitySnapshot;
use crate::logging::{log, log_reconcile_report, obj, v_str, Domain, Level};
use crate::schema::{missing_keys, Defaults};
use crate::store::{PathStore, Paths, StorePath};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub communities_created: u64,
    pub communities_extended: u64,
    pub users_created: u64,
    pub users_extended: u64,
    pub keys_inserted: u64,
    pub writes: u64,
}

impl ReconcileReport {
    pub fn absorb(&mut self, other: &ReconcileReport) {
        self.communities_created += other.communities_created;
        self.communities_extended += other.communities_extended;
        self.users_created += other.users_created;
        self.users_extended += other.users_extended;
        self.keys_inserted += other.keys_inserted;
        self.writes += other.writes;
    }

    pub fn is_noop(&self) -> bool {
        self.writes == 0
    }
}

#[derive(Clone)]
pub struct DefaultsReconciler {
    store: PathStore,
    paths: Paths,
    defaults: Arc<Defaults>,
}

impl DefaultsReconciler {
    pub fn new(store: PathStore, paths: Paths, defaults: Arc<Defaults>) -> Self {
        Self { store, paths, defaults }
    }

    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    /// Reconcile every community and its human members, one at a time.
    pub async fn reconcile_all(&self, communities: &[CommunitySnapshot]) -> CoreResult<ReconcileReport> {
        let mut total = ReconcileReport::default();
        for community in communities {
            let report = self.reconcile_community(community).await?;
            log_reconcile_report("community", Some(&community.id), &report);
            total.absorb(&report);
        }
        log_reconcile_report("all", None, &total);
        Ok(total)
    }

    pub async fn reconcile_community(&self, community: &CommunitySnapshot) -> CoreResult<ReconcileReport> {
        let mut report = self.ensure_community(&community.id).await?;
        for member in community.members.iter().filter(|m| !m.is_bot) {
            let member_report = self.reconcile_one(&community.id, &member.id).await?;
            report.absorb(&member_report);
        }
        Ok(report)
    }

    /// Create the community record, or insert top-level `data` keys it lacks.
    pub async fn ensure_community(&self, community_id: &str) -> CoreResult<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let data_path = self.paths.data(community_id)?;

        match self.store.get(&data_path).await? {
            Some(Value::Object(existing)) => {
                let missing = missing_keys(self.defaults.config(), &existing);
                if !missing.is_empty() {
                    report.communities_extended += 1;
                    report.keys_inserted += missing.len() as u64;
                    report.writes += 1;
                    self.store.update(&data_path, missing).await?;
                }
            }
            Some(other) => {
                // A scalar where the configuration mapping belongs cannot be merged into.
                log(
                    Level::Warn,
                    Domain::Reconcile,
                    "data_replaced",
                    obj(&[
                        ("community_id", v_str(community_id)),
                        ("found", v_str(&other.to_string())),
                    ]),
                );
                report.communities_extended += 1;
                report.keys_inserted += self.defaults.config().len() as u64;
                report.writes += 1;
                self.store
                    .set(&data_path, Value::Object(self.defaults.config().clone()))
                    .await?;
            }
            None => {
                let community_path = self.paths.community(community_id)?;
                if self.store.exists(&community_path).await? {
                    report.communities_extended += 1;
                    report.keys_inserted += self.defaults.config().len() as u64;
                    report.writes += 1;
                    self.store
                        .update(&data_path, self.defaults.config().clone())
                        .await?;
                } else {
                    report.communities_created += 1;
                    report.writes += 1;
                    self.store
                        .set(
                            &community_path,
                            json!({
                                "data": Value::Object(self.defaults.config().clone()),
                                "users": {},
                            }),
                        )
                        .await?;
                }
            }
        }
        Ok(report)
    }

    /// Create the member record, or insert the schema keys it lacks.
    pub async fn reconcile_one(&self, community_id: &str, member_id: &str) -> CoreResult<ReconcileReport> {
        let user_path = self.paths.user(community_id, member_id)?;
        self.reconcile_user_at(&user_path).await
    }

    async fn reconcile_user_at(&self, user_path: &StorePath) -> CoreResult<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let template = self.defaults.user();
        match self.store.get(user_path).await? {
            Some(Value::Object(existing)) => {
                let missing: Map<String, Value> = missing_keys(template, &existing);
                if !missing.is_empty() {
                    report.users_extended += 1;
                    report.keys_inserted += missing.len() as u64;
                    report.writes += 1;
                    self.store.update(user_path, missing).await?;
                }
            }
            Some(other) => {
                log(
                    Level::Warn,
                    Domain::Reconcile,
                    "user_replaced",
                    obj(&[
                        ("path", v_str(&user_path.to_string())),
                        ("found", v_str(&other.to_string())),
                    ]),
                );
                report.users_created += 1;
                report.writes += 1;
                self.store.set(user_path, Value::Object(template.clone())).await?;
            }
            None => {
                report.users_created += 1;
                report.writes += 1;
                self.store.set(user_path, Value::Object(template.clone())).await?;
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemberInfo;
    use crate::store::MemoryBackend;

    fn setup() -> (Arc<MemoryBackend>, PathStore, DefaultsReconciler) {
        let backend = Arc::new(MemoryBackend::new());
        let store = PathStore::new(backend.clone());
        let reconciler =
            DefaultsReconciler::new(store.clone(), Paths::default(), Arc::new(Defaults::builtin()));
        (backend, store, reconciler)
    }

    fn community(id: &str, members: &[(&str, bool)]) -> CommunitySnapshot {
        CommunitySnapshot {
            id: id.to_string(),
            members: members
                .iter()
                .map(|(m, bot)| MemberInfo { id: m.to_string(), is_bot: *bot })
                .collect(),
        }
    }

    fn p(raw: &str) -> StorePath {
        StorePath::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_creates_community_with_users_container() {
        let (backend, store, rec) = setup();
        let report = rec.ensure_community("g1").await.unwrap();
        assert_eq!(report.communities_created, 1);

        let raw = backend.snapshot();
        assert_eq!(raw["communities"]["g1"]["users"], json!({"_init": true}));
        assert_eq!(raw["communities"]["g1"]["data"]["levels"]["level_roles"], json!({"_init": true}));
        assert!(store.exists(&p("communities/g1/users")).await.unwrap());
    }

    #[tokio::test]
    async fn test_second_pass_writes_nothing() {
        let (backend, _, rec) = setup();
        let snapshot = vec![community("g1", &[("u1", false), ("u2", false), ("bot", true)])];
        let first = rec.reconcile_all(&snapshot).await.unwrap();
        assert_eq!(first.users_created, 2);

        let writes_after_first = backend.writes();
        let second = rec.reconcile_all(&snapshot).await.unwrap();
        assert!(second.is_noop());
        assert_eq!(backend.writes(), writes_after_first);
    }

    #[tokio::test]
    async fn test_bots_are_skipped() {
        let (_, store, rec) = setup();
        rec.reconcile_community(&community("g1", &[("bot", true)])).await.unwrap();
        assert!(!store.exists(&p("communities/g1/users/bot")).await.unwrap());
    }

    #[tokio::test]
    async fn test_existing_user_keeps_values_and_extra_keys() {
        let (_, store, rec) = setup();
        store
            .set(&p("communities/g1/users/u1"), json!({"xp": 340, "nickname": "zed"}))
            .await
            .unwrap();
        let report = rec.reconcile_one("g1", "u1").await.unwrap();
        assert_eq!(report.users_extended, 1);
        assert_eq!(report.keys_inserted, 2);

        let user = store.get(&p("communities/g1/users/u1")).await.unwrap().unwrap();
        assert_eq!(user, json!({"xp": 340, "nickname": "zed", "level": 0, "last_message_time": 0}));
    }

    #[tokio::test]
    async fn test_existing_config_is_not_overwritten() {
        let (_, store, rec) = setup();
        store
            .set(&p("communities/g1/data"), json!({"levels": {"enabled": false}, "custom": 1}))
            .await
            .unwrap();
        let report = rec.ensure_community("g1").await.unwrap();
        assert_eq!(report.communities_extended, 1);

        let data = store.get(&p("communities/g1/data")).await.unwrap().unwrap();
        // Top-level merge only: the partial levels mapping stays as the admin left it.
        assert_eq!(data["levels"], json!({"enabled": false}));
        assert_eq!(data["custom"], 1);
        assert_eq!(data["create_vc"], 0);
    }

    #[tokio::test]
    async fn test_grown_schema_is_merged_in() {
        let (backend, store, rec) = setup();
        rec.reconcile_one("g1", "u1").await.unwrap();

        let grown = Arc::new(Defaults::builtin().with_user_override("streak", json!(0)));
        let rec2 = DefaultsReconciler::new(store.clone(), Paths::default(), grown);
        let before = backend.writes();
        let report = rec2.reconcile_one("g1", "u1").await.unwrap();
        assert_eq!(report.keys_inserted, 1);
        assert_eq!(backend.writes(), before + 1);
        assert_eq!(store.get(&p("communities/g1/users/u1/streak")).await.unwrap(), Some(json!(0)));
    }

    #[tokio::test]
    async fn test_scalar_user_record_is_replaced_with_template() {
        let (_, store, rec) = setup();
        store.set(&p("communities/g1/users/u1"), json!(42)).await.unwrap();
        let report = rec.reconcile_one("g1", "u1").await.unwrap();
        assert_eq!(report.users_created, 1);
        assert_eq!(
            store.get(&p("communities/g1/users/u1")).await.unwrap(),
            Some(json!({"level": 0, "xp": 0, "last_message_time": 0}))
        );
        assert!(rec.reconcile_one("g1", "u1").await.unwrap().is_noop());
    }

    #[tokio::test]
    async fn test_store_down_propagates() {
        let (backend, _, rec) = setup();
        backend.set_available(false);
        assert!(rec.reconcile_one("g1", "u1").await.is_err());
    }
}
