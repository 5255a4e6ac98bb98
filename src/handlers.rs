//! Built-in handlers, one per inbound event kind.

use std::sync::Arc;

use async_trait::async_trait;

use crate::dispatch::{Context, Dispatcher, EventHandler};
use crate::error::CoreResult;
use crate::events::{
    channel_mention, mention, role_mention, Action, EventKind, InboundEvent, Interaction,
    InteractionEvent,
};
use crate::poll::{parse_options, render_poll, VoteRemoval};
use crate::tickets::TicketOpen;

pub fn register_defaults(d: &mut Dispatcher) {
    d.register(EventKind::Ready, Arc::new(ReadyHandler));
    d.register(EventKind::CommunityJoined, Arc::new(CommunityJoinedHandler));
    d.register(EventKind::MemberJoined, Arc::new(MemberJoinedHandler));
    d.register(EventKind::ContentMessage, Arc::new(ContentMessageHandler));
    d.register(EventKind::VoicePresenceChanged, Arc::new(VoicePresenceHandler));
    d.register(EventKind::Interaction, Arc::new(InteractionHandler));
}

/// Full reconciliation, then re-attach the views of every stored poll.
pub struct ReadyHandler;

#[async_trait]
impl EventHandler for ReadyHandler {
    async fn handle(&self, ctx: &Context, event: &InboundEvent) -> CoreResult<Vec<Action>> {
        let InboundEvent::Ready { communities } = event else {
            return Ok(Vec::new());
        };
        ctx.reconciler.reconcile_all(communities).await?;

        let mut actions = Vec::new();
        for community in communities {
            for (poll_id, options) in ctx.polls.list(&community.id).await? {
                actions.push(Action::RestorePollView {
                    community_id: community.id.clone(),
                    poll_id,
                    options,
                });
            }
        }
        Ok(actions)
    }
}

pub struct CommunityJoinedHandler;

#[async_trait]
impl EventHandler for CommunityJoinedHandler {
    async fn handle(&self, ctx: &Context, event: &InboundEvent) -> CoreResult<Vec<Action>> {
        if let InboundEvent::CommunityJoined { community } = event {
            ctx.reconciler.reconcile_community(community).await?;
        }
        Ok(Vec::new())
    }
}

pub struct MemberJoinedHandler;

#[async_trait]
impl EventHandler for MemberJoinedHandler {
    async fn handle(&self, ctx: &Context, event: &InboundEvent) -> CoreResult<Vec<Action>> {
        if let InboundEvent::MemberJoined { community_id, member } = event {
            if !member.is_bot {
                ctx.reconciler.ensure_community(community_id).await?;
                ctx.reconciler.reconcile_one(community_id, &member.id).await?;
            }
        }
        Ok(Vec::new())
    }
}

pub struct ContentMessageHandler;

#[async_trait]
impl EventHandler for ContentMessageHandler {
    async fn handle(&self, ctx: &Context, event: &InboundEvent) -> CoreResult<Vec<Action>> {
        match event {
            InboundEvent::ContentMessage(msg) => ctx.leveling.on_message(msg).await,
            _ => Ok(Vec::new()),
        }
    }
}

pub struct VoicePresenceHandler;

#[async_trait]
impl EventHandler for VoicePresenceHandler {
    async fn handle(&self, ctx: &Context, event: &InboundEvent) -> CoreResult<Vec<Action>> {
        match event {
            InboundEvent::VoicePresenceChanged(change) => ctx.voice.on_presence(change).await,
            _ => Ok(Vec::new()),
        }
    }
}

pub struct InteractionHandler;

#[async_trait]
impl EventHandler for InteractionHandler {
    async fn handle(&self, ctx: &Context, event: &InboundEvent) -> CoreResult<Vec<Action>> {
        match event {
            InboundEvent::Interaction(ev) => handle_interaction(ctx, ev).await,
            _ => Ok(Vec::new()),
        }
    }
}

fn reply(content: impl Into<String>) -> Vec<Action> {
    vec![Action::ephemeral(content)]
}

async fn handle_interaction(ctx: &Context, ev: &InteractionEvent) -> CoreResult<Vec<Action>> {
    let cid = ev.community_id.as_str();
    match &ev.interaction {
        Interaction::CreatePoll { question, options } => {
            let options = parse_options(options);
            let poll_id = ctx.polls.create(cid, question, options).await?;
            let poll = ctx.polls.get(cid, &poll_id).await?;
            let rendered = render_poll(&poll_id, &poll);
            Ok(vec![
                Action::PostPoll {
                    community_id: ev.community_id.clone(),
                    channel_id: ev.channel_id.clone(),
                    poll_id,
                    title: rendered.title,
                    body: rendered.body,
                    footer: rendered.footer,
                    options: poll.options,
                },
                Action::ephemeral("Poll has been created."),
            ])
        }
        Interaction::PollVote { poll_id, choice } => {
            let poll = ctx.polls.vote(cid, poll_id, &ev.member_id, *choice).await?;
            let rendered = render_poll(poll_id, &poll);
            Ok(vec![
                Action::UpdatePollMessage {
                    community_id: ev.community_id.clone(),
                    poll_id: poll_id.clone(),
                    title: rendered.title,
                    body: rendered.body,
                    footer: rendered.footer,
                },
                Action::ephemeral("Your vote has been recorded."),
            ])
        }
        Interaction::PollRemoveVote { poll_id } => {
            match ctx.polls.remove_vote(cid, poll_id, &ev.member_id).await? {
                VoteRemoval::Removed(poll) => {
                    let rendered = render_poll(poll_id, &poll);
                    Ok(vec![
                        Action::UpdatePollMessage {
                            community_id: ev.community_id.clone(),
                            poll_id: poll_id.clone(),
                            title: rendered.title,
                            body: rendered.body,
                            footer: rendered.footer,
                        },
                        Action::ephemeral("Your vote has been removed."),
                    ])
                }
                VoteRemoval::NotVoted => Ok(reply("You haven't voted yet.")),
            }
        }
        Interaction::PollShowVote { poll_id } => {
            let mine = ctx.polls.my_vote(cid, poll_id, &ev.member_id).await?;
            match mine.choice {
                Some((_, label)) => Ok(reply(format!(
                    "You voted for: **{}**\n\n{}",
                    label, mine.rendered.body
                ))),
                None => Ok(reply("You haven't voted yet.")),
            }
        }
        Interaction::ToggleLeveling => {
            let enabled = ctx.leveling.toggle_enabled(cid).await?;
            let status = if enabled { "enabled" } else { "disabled" };
            Ok(reply(format!("Levels have been {}.", status)))
        }
        Interaction::SetXpPerMessage { xp } => {
            ctx.leveling.set_xp_per_message(cid, *xp).await?;
            Ok(reply(format!("XP per message has been set to {}.", xp)))
        }
        Interaction::SetXpCooldown { seconds } => {
            ctx.leveling.set_xp_cooldown(cid, *seconds).await?;
            Ok(reply(format!("XP cooldown has been set to {} seconds.", seconds)))
        }
        Interaction::SetXpPerLevel { xp } => {
            ctx.leveling.set_xp_per_level(cid, *xp).await?;
            Ok(reply(format!("XP per level has been set to {}.", xp)))
        }
        Interaction::SetLevelUpMessage { message } => {
            ctx.leveling.set_level_up_message(cid, message).await?;
            Ok(reply("Level up message has been updated."))
        }
        Interaction::SetLevelUpChannel { channel_id } => {
            ctx.leveling.set_level_up_channel(cid, channel_id).await?;
            Ok(reply(format!(
                "Level up messages will be sent in {}.",
                channel_mention(channel_id)
            )))
        }
        Interaction::SetLevelRole { level, role_id } => {
            ctx.leveling.set_level_role(cid, *level, role_id).await?;
            Ok(reply(format!(
                "Role {} will be assigned to users when they reach level {}.",
                role_mention(role_id),
                level
            )))
        }
        Interaction::SetVoiceTrigger { channel_id } => {
            let channel_id = channel_id.as_deref().filter(|c| !c.is_empty() && *c != "0");
            ctx.settings.set_voice_trigger(cid, channel_id).await?;
            match channel_id {
                Some(id) => Ok(reply(format!("Selected channel: {}", channel_mention(id)))),
                None => Ok(reply("Voice rooms have been disabled.")),
            }
        }
        Interaction::SetupSupport { role_id } => {
            ctx.settings.set_supporter_role(cid, role_id).await?;
            Ok(vec![
                Action::SendMessage {
                    channel_id: ev.channel_id.clone(),
                    title: Some("Support Tickets".to_string()),
                    content: "Click the button below to create a support ticket.".to_string(),
                },
                Action::ephemeral("Support ticket system has been set up in this channel."),
            ])
        }
        Interaction::CreateTicket { member_name } => {
            let opened = ctx
                .tickets
                .open(cid, &ev.channel_id, &ev.member_id, member_name)
                .await?;
            match opened {
                TicketOpen::NotConfigured => {
                    Ok(reply("Support tickets are not configured on this server."))
                }
                TicketOpen::AlreadyOpen { parent_channel_id, name } => Ok(reply(format!(
                    "You already have an open ticket in {}: {}",
                    channel_mention(&parent_channel_id),
                    name
                ))),
                TicketOpen::Opened { name, supporter_role_id } => Ok(vec![
                    Action::CreateTicketThread {
                        community_id: ev.community_id.clone(),
                        parent_channel_id: ev.channel_id.clone(),
                        name,
                        owner_id: ev.member_id.clone(),
                        content: format!(
                            "{}, your ticket has been created.\n{}",
                            mention(&ev.member_id),
                            role_mention(&supporter_role_id)
                        ),
                        supporter_role_id,
                        title: "Support Ticket".to_string(),
                        description: "A supporter will be with you shortly. To close this ticket, press the button below.".to_string(),
                    },
                    Action::ephemeral("Your ticket has been created."),
                ]),
            }
        }
        Interaction::CloseTicket { owner_id } => {
            ctx.tickets.close(cid, owner_id).await?;
            Ok(vec![
                Action::ephemeral("Closing ticket..."),
                Action::DeleteChannel {
                    channel_id: ev.channel_id.clone(),
                },
            ])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Defaults;
    use crate::store::{MemoryBackend, PathStore, Paths};

    fn dispatcher() -> Dispatcher {
        let store = PathStore::new(Arc::new(MemoryBackend::new()));
        Dispatcher::with_default_handlers(Context::new(
            store,
            Paths::default(),
            Arc::new(Defaults::builtin()),
        ))
    }

    fn interact(interaction: Interaction) -> InboundEvent {
        InboundEvent::Interaction(InteractionEvent {
            community_id: "g1".into(),
            member_id: "u1".into(),
            channel_id: "c1".into(),
            interaction,
        })
    }

    #[tokio::test]
    async fn test_toggle_leveling_replies_with_state() {
        let d = dispatcher();
        let out = d.dispatch(&interact(Interaction::ToggleLeveling)).await;
        assert_eq!(out.actions, vec![Action::ephemeral("Levels have been disabled.")]);
        let out = d.dispatch(&interact(Interaction::ToggleLeveling)).await;
        assert_eq!(out.actions, vec![Action::ephemeral("Levels have been enabled.")]);
    }

    #[tokio::test]
    async fn test_invalid_setter_value_is_rejected() {
        let d = dispatcher();
        let out = d.dispatch(&interact(Interaction::SetXpPerMessage { xp: 0 })).await;
        assert_eq!(
            out.actions,
            vec![Action::ephemeral("XP per message must be a positive integer.")]
        );
    }

    #[tokio::test]
    async fn test_vote_on_missing_poll() {
        let d = dispatcher();
        let out = d
            .dispatch(&interact(Interaction::PollVote { poll_id: "nope1234".into(), choice: 0 }))
            .await;
        assert_eq!(out.actions, vec![Action::ephemeral("Poll not found.")]);
    }

    #[tokio::test]
    async fn test_show_vote_before_voting() {
        let d = dispatcher();
        let pid = d.context().polls.create("g1", "Q", vec!["a".into(), "b".into()]).await.unwrap();
        let out = d.dispatch(&interact(Interaction::PollShowVote { poll_id: pid })).await;
        assert_eq!(out.actions, vec![Action::ephemeral("You haven't voted yet.")]);
    }
}
