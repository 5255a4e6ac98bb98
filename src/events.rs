//! Inbound events from the chat platform and the outbound actions sent back.
//!
//! Both travel as internally tagged JSON, one object per line:
//! `{"kind": "member_joined", ...}` in, `{"action": "grant_role", ...}` out.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub id: String,
    #[serde(default)]
    pub is_bot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunitySnapshot {
    pub id: String,
    #[serde(default)]
    pub members: Vec<MemberInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMessage {
    pub community_id: String,
    pub channel_id: String,
    pub member_id: String,
    /// Unix seconds.
    pub timestamp: u64,
    #[serde(default)]
    pub author_is_bot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceChannelState {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category_id: Option<String>,
    /// Members still connected after the change.
    #[serde(default)]
    pub member_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoicePresenceChanged {
    pub community_id: String,
    pub member_id: String,
    pub member_name: String,
    #[serde(default)]
    pub before: Option<VoiceChannelState>,
    #[serde(default)]
    pub after: Option<VoiceChannelState>,
}

/// Commands and component interactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Interaction {
    /// `options` is the raw comma-separated list as typed.
    CreatePoll { question: String, options: String },
    PollVote { poll_id: String, choice: usize },
    PollRemoveVote { poll_id: String },
    PollShowVote { poll_id: String },
    ToggleLeveling,
    SetXpPerMessage { xp: i64 },
    SetXpCooldown { seconds: i64 },
    SetXpPerLevel { xp: i64 },
    SetLevelUpMessage { message: String },
    SetLevelUpChannel { channel_id: String },
    SetLevelRole { level: i64, role_id: String },
    /// `None` disables ephemeral voice rooms.
    SetVoiceTrigger { channel_id: Option<String> },
    SetupSupport { role_id: String },
    /// Pressed in the channel that holds the support panel.
    CreateTicket { member_name: String },
    /// Pressed inside a ticket thread; `owner_id` is the member the ticket belongs to.
    CloseTicket { owner_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub community_id: String,
    pub member_id: String,
    pub channel_id: String,
    pub interaction: Interaction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundEvent {
    Ready { communities: Vec<CommunitySnapshot> },
    CommunityJoined { community: CommunitySnapshot },
    MemberJoined { community_id: String, member: MemberInfo },
    ContentMessage(ContentMessage),
    VoicePresenceChanged(VoicePresenceChanged),
    Interaction(InteractionEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Ready,
    CommunityJoined,
    MemberJoined,
    ContentMessage,
    VoicePresenceChanged,
    Interaction,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Ready => "ready",
            EventKind::CommunityJoined => "community_joined",
            EventKind::MemberJoined => "member_joined",
            EventKind::ContentMessage => "content_message",
            EventKind::VoicePresenceChanged => "voice_presence_changed",
            EventKind::Interaction => "interaction",
        }
    }
}

impl InboundEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            InboundEvent::Ready { .. } => EventKind::Ready,
            InboundEvent::CommunityJoined { .. } => EventKind::CommunityJoined,
            InboundEvent::MemberJoined { .. } => EventKind::MemberJoined,
            InboundEvent::ContentMessage(_) => EventKind::ContentMessage,
            InboundEvent::VoicePresenceChanged(_) => EventKind::VoicePresenceChanged,
            InboundEvent::Interaction(_) => EventKind::Interaction,
        }
    }
}

/// Requests for the platform adapter. Delivery is fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    SendMessage {
        channel_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        content: String,
    },
    /// Response to the member who triggered an interaction.
    Reply { content: String, ephemeral: bool },
    GrantRole {
        community_id: String,
        member_id: String,
        role_id: String,
    },
    CreateVoiceChannel {
        community_id: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category_id: Option<String>,
        move_member_id: String,
    },
    DeleteChannel { channel_id: String },
    /// Private thread under `parent_channel_id` with the member and the supporter role added.
    /// The opening post carries a close button bound to `owner_id`.
    CreateTicketThread {
        community_id: String,
        parent_channel_id: String,
        name: String,
        owner_id: String,
        supporter_role_id: String,
        title: String,
        description: String,
        content: String,
    },
    PostPoll {
        community_id: String,
        channel_id: String,
        poll_id: String,
        title: String,
        body: String,
        footer: String,
        options: Vec<String>,
    },
    RestorePollView {
        community_id: String,
        poll_id: String,
        options: Vec<String>,
    },
    UpdatePollMessage {
        community_id: String,
        poll_id: String,
        title: String,
        body: String,
        footer: String,
    },
}

impl Action {
    pub fn ephemeral(content: impl Into<String>) -> Self {
        Action::Reply {
            content: content.into(),
            ephemeral: true,
        }
    }
}

pub fn mention(member_id: &str) -> String {
    format!("<@{}>", member_id)
}

pub fn role_mention(role_id: &str) -> String {
    format!("<@&{}>", role_id)
}

pub fn channel_mention(channel_id: &str) -> String {
    format!("<#{}>", channel_id)
}
