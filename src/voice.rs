//! Ephemeral voice rooms: joining the trigger channel opens a personal room,
//! and a personal room is removed once its last member leaves.

use crate::error::CoreResult;
use crate::events::{Action, VoicePresenceChanged};
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::settings::CommunitySettings;

pub const ROOM_SUFFIX: &str = "'s VC";

pub fn room_name(member_name: &str) -> String {
    format!("{}{}", member_name, ROOM_SUFFIX)
}

/// Room actions for one presence change, given the configured trigger channel.
pub fn room_actions(trigger: Option<&str>, ev: &VoicePresenceChanged) -> Vec<Action> {
    let Some(trigger) = trigger else {
        return Vec::new();
    };
    let mut actions = Vec::new();

    if let (None, Some(after)) = (&ev.before, &ev.after) {
        if after.id == trigger {
            actions.push(Action::CreateVoiceChannel {
                community_id: ev.community_id.clone(),
                name: room_name(&ev.member_name),
                category_id: after.category_id.clone(),
                move_member_id: ev.member_id.clone(),
            });
        }
    }

    if let Some(before) = &ev.before {
        if before.member_count == 0 && before.name.ends_with(ROOM_SUFFIX) {
            actions.push(Action::DeleteChannel {
                channel_id: before.id.clone(),
            });
        }
    }
    actions
}

#[derive(Clone)]
pub struct VoiceRooms {
    settings: CommunitySettings,
}

impl VoiceRooms {
    pub fn new(settings: CommunitySettings) -> Self {
        Self { settings }
    }

    pub async fn on_presence(&self, ev: &VoicePresenceChanged) -> CoreResult<Vec<Action>> {
        let trigger = self.settings.voice_trigger(&ev.community_id).await?;
        let actions = room_actions(trigger.as_deref(), ev);
        for action in &actions {
            let (event, target) = match action {
                Action::CreateVoiceChannel { name, .. } => ("room_opened", name.as_str()),
                Action::DeleteChannel { channel_id } => ("room_closed", channel_id.as_str()),
                _ => continue,
            };
            log(
                Level::Info,
                Domain::Voice,
                event,
                obj(&[
                    ("community_id", v_str(&ev.community_id)),
                    ("member_id", v_str(&ev.member_id)),
                    ("target", v_str(target)),
                ]),
            );
        }
        Ok(actions)
    }
}
