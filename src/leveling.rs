//! Message-driven experience points and levels.
//!
//! Thresholds are linear and anchored at level 0: reaching level `n` takes
//! `n * xp_per_level` XP. A single grant may cross several thresholds at once.

use serde_json::{json, Map, Value};

use crate::error::{CoreError, CoreResult};
use crate::events::{mention, role_mention, Action, ContentMessage};
use crate::logging::{log, log_level_up, obj, v_str, Domain, Level};
use crate::model::{id_to_value, LevelSettings, UserRecord};
use crate::reconcile::DefaultsReconciler;
use crate::store::{PathStore, Paths};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    Disabled,
    Cooldown { remaining: u64 },
    Granted { previous_level: u64, level: u64, xp: u64 },
}

/// Level reached with `xp`, never below `level`.
///
/// Equivalent to stepping `level` up while `xp >= (level + 1) * xp_per_level`,
/// without the loop or the overflow.
pub fn level_for_xp(level: u64, xp: u64, xp_per_level: u64) -> u64 {
    if xp_per_level == 0 {
        return level;
    }
    level.max(xp / xp_per_level)
}

/// Apply one activity event at unix time `now` to `record`, in place.
pub fn apply_activity(record: &mut UserRecord, settings: &LevelSettings, now: u64) -> Grant {
    if !settings.enabled {
        return Grant::Disabled;
    }
    // Out-of-order timestamps saturate to 0 elapsed and fall under the cooldown.
    let elapsed = now.saturating_sub(record.last_message_time);
    if elapsed < settings.xp_cooldown {
        return Grant::Cooldown {
            remaining: settings.xp_cooldown - elapsed,
        };
    }

    let previous_level = record.level;
    record.xp = record.xp.saturating_add(settings.xp_per_message);
    record.level = level_for_xp(record.level, record.xp, settings.xp_per_level);
    record.last_message_time = now;
    Grant::Granted {
        previous_level,
        level: record.level,
        xp: record.xp,
    }
}

pub fn render_template(template: &str, user: &str, level: u64, xp: u64) -> String {
    template
        .replace("{user}", user)
        .replace("{level}", &level.to_string())
        .replace("{xp}", &xp.to_string())
}

/// Side effects of reaching `level`.
pub fn level_up_actions(
    settings: &LevelSettings,
    msg: &ContentMessage,
    level: u64,
    xp: u64,
) -> Vec<Action> {
    let mut actions = Vec::new();
    let user = mention(&msg.member_id);
    if let Some(channel_id) = &settings.level_up_channel {
        actions.push(Action::SendMessage {
            channel_id: channel_id.clone(),
            title: Some("Level Up!".to_string()),
            content: render_template(&settings.level_up_message, &user, level, xp),
        });
    }
    if let Some(role_id) = settings.level_roles.get(&level) {
        actions.push(Action::GrantRole {
            community_id: msg.community_id.clone(),
            member_id: msg.member_id.clone(),
            role_id: role_id.clone(),
        });
        actions.push(Action::SendMessage {
            channel_id: msg.channel_id.clone(),
            title: None,
            content: format!(
                "{} has been given the role {} for reaching level {}!",
                user,
                role_mention(role_id),
                level
            ),
        });
    }
    actions
}

#[derive(Clone)]
pub struct LevelingEngine {
    store: PathStore,
    paths: Paths,
    reconciler: DefaultsReconciler,
}

impl LevelingEngine {
    pub fn new(store: PathStore, paths: Paths, reconciler: DefaultsReconciler) -> Self {
        Self { store, paths, reconciler }
    }

    /// Current settings; a missing community is created and the defaults apply.
    pub async fn settings(&self, community_id: &str) -> CoreResult<LevelSettings> {
        let levels_path = self.paths.levels(community_id)?;
        match self.store.get(&levels_path).await? {
            Some(value) => Ok(LevelSettings::from_value(Some(&value))),
            None => {
                let missing = CoreError::MissingConfiguration(levels_path.to_string());
                log(
                    Level::Warn,
                    Domain::Leveling,
                    "settings_recovered",
                    obj(&[("community_id", v_str(community_id)), ("msg", v_str(&missing.to_string()))]),
                );
                self.reconciler.ensure_community(community_id).await?;
                Ok(LevelSettings::from_value(self.reconciler.defaults().levels()))
            }
        }
    }

    pub async fn on_message(&self, msg: &ContentMessage) -> CoreResult<Vec<Action>> {
        if msg.author_is_bot {
            return Ok(Vec::new());
        }
        let settings = self.settings(&msg.community_id).await?;
        if !settings.enabled {
            return Ok(Vec::new());
        }

        let user_path = self.paths.user(&msg.community_id, &msg.member_id)?;
        let mut record = match self.store.get(&user_path).await? {
            Some(value) => UserRecord::from_value(value),
            None => {
                self.reconciler
                    .reconcile_one(&msg.community_id, &msg.member_id)
                    .await?;
                UserRecord::from_value(Value::Object(self.reconciler.defaults().user().clone()))
            }
        };

        match apply_activity(&mut record, &settings, msg.timestamp) {
            Grant::Disabled | Grant::Cooldown { .. } => Ok(Vec::new()),
            Grant::Granted { previous_level, level, xp } => {
                self.store.update(&user_path, record.progress_update()).await?;
                if level > previous_level {
                    log_level_up(&msg.community_id, &msg.member_id, previous_level, level, xp);
                    Ok(level_up_actions(&settings, msg, level, xp))
                } else {
                    Ok(Vec::new())
                }
            }
        }
    }

    // =========================================================================
    // Admin setters
    // =========================================================================

    async fn set_level_key(&self, community_id: &str, key: &str, value: Value) -> CoreResult<()> {
        self.reconciler.ensure_community(community_id).await?;
        let mut partial = Map::new();
        partial.insert(key.to_string(), value);
        self.store.update(&self.paths.levels(community_id)?, partial).await
    }

    /// Flip `enabled` and return the new state.
    pub async fn toggle_enabled(&self, community_id: &str) -> CoreResult<bool> {
        let current = self.settings(community_id).await?.enabled;
        self.set_level_key(community_id, "enabled", json!(!current)).await?;
        Ok(!current)
    }

    pub async fn set_xp_per_message(&self, community_id: &str, xp: i64) -> CoreResult<()> {
        if xp < 1 {
            return Err(CoreError::invalid("XP per message must be a positive integer."));
        }
        self.set_level_key(community_id, "xp_per_message", json!(xp)).await
    }

    pub async fn set_xp_cooldown(&self, community_id: &str, seconds: i64) -> CoreResult<()> {
        if seconds < 0 {
            return Err(CoreError::invalid("XP cooldown must be a non-negative integer."));
        }
        self.set_level_key(community_id, "xp_cooldown", json!(seconds)).await
    }

    pub async fn set_xp_per_level(&self, community_id: &str, xp: i64) -> CoreResult<()> {
        if xp < 1 {
            return Err(CoreError::invalid("XP per level must be a positive integer."));
        }
        self.set_level_key(community_id, "xp_per_level", json!(xp)).await
    }

    pub async fn set_level_up_message(&self, community_id: &str, message: &str) -> CoreResult<()> {
        if message.trim().is_empty() {
            return Err(CoreError::invalid("Level up message must not be empty."));
        }
        self.set_level_key(community_id, "level_up_message", json!(message)).await
    }

    pub async fn set_level_up_channel(&self, community_id: &str, channel_id: &str) -> CoreResult<()> {
        self.set_level_key(community_id, "level_up_channel", id_to_value(channel_id)).await
    }

    /// Map `level` to `role_id`, leaving other level roles in place.
    pub async fn set_level_role(&self, community_id: &str, level: i64, role_id: &str) -> CoreResult<()> {
        if level < 1 {
            return Err(CoreError::invalid("Level must be a positive integer."));
        }
        self.reconciler.ensure_community(community_id).await?;
        let roles_path = self.paths.levels(community_id)?.child("level_roles")?;
        let mut partial = Map::new();
        partial.insert(level.to_string(), id_to_value(role_id));
        self.store.update(&roles_path, partial).await
    }
}
