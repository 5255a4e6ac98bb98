//! Support tickets: one private thread per member, visible to the supporter role.

use serde_json::json;

use crate::error::{CoreError, CoreResult};
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::model::id_from_value;
use crate::settings::CommunitySettings;
use crate::store::{PathStore, Paths};

pub fn ticket_name(member_name: &str) -> String {
    format!("ticket-{}", member_name).to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketOpen {
    /// No supporter role has been set up for the community.
    NotConfigured,
    AlreadyOpen { parent_channel_id: String, name: String },
    Opened { name: String, supporter_role_id: String },
}

#[derive(Clone)]
pub struct TicketDesk {
    store: PathStore,
    paths: Paths,
    settings: CommunitySettings,
}

impl TicketDesk {
    pub fn new(store: PathStore, paths: Paths, settings: CommunitySettings) -> Self {
        Self { store, paths, settings }
    }

    pub async fn open(
        &self,
        community_id: &str,
        parent_channel_id: &str,
        member_id: &str,
        member_name: &str,
    ) -> CoreResult<TicketOpen> {
        let Some(supporter_role_id) = self.settings.supporter_role(community_id).await? else {
            return Ok(TicketOpen::NotConfigured);
        };

        let path = self.paths.ticket(community_id, member_id)?;
        if let Some(existing) = self.store.get(&path).await? {
            return Ok(TicketOpen::AlreadyOpen {
                parent_channel_id: existing
                    .get("parent_channel_id")
                    .and_then(id_from_value)
                    .unwrap_or_else(|| parent_channel_id.to_string()),
                name: existing
                    .get("name")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| ticket_name(member_name)),
            });
        }

        let name = ticket_name(member_name);
        self.store
            .set(
                &path,
                json!({
                    "parent_channel_id": parent_channel_id,
                    "name": name,
                }),
            )
            .await?;
        log(
            Level::Info,
            Domain::Ticket,
            "ticket_opened",
            obj(&[
                ("community_id", v_str(community_id)),
                ("member_id", v_str(member_id)),
                ("name", v_str(&name)),
            ]),
        );
        Ok(TicketOpen::Opened { name, supporter_role_id })
    }

    /// Forget the open ticket of `owner_id`. Closing twice is `NotFound`.
    pub async fn close(&self, community_id: &str, owner_id: &str) -> CoreResult<()> {
        let path = self.paths.ticket(community_id, owner_id)?;
        if !self.store.exists(&path).await? {
            return Err(CoreError::NotFound("ticket".to_string()));
        }
        self.store.delete(&path).await?;
        log(
            Level::Info,
            Domain::Ticket,
            "ticket_closed",
            obj(&[("community_id", v_str(community_id)), ("member_id", v_str(owner_id))]),
        );
        Ok(())
    }
}
