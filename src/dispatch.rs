//! Event routing: inbound event -> registered handlers -> outbound actions.
//!
//! Handlers for one event run in registration order and are awaited one at a
//! time. The first failure stops the event; nothing produced for it is emitted
//! except the user-facing reply, when the error has one.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{CoreError, CoreResult};
use crate::events::{Action, EventKind, InboundEvent};
use crate::leveling::LevelingEngine;
use crate::logging::{log, log_handler_error, obj, v_str, Domain, Level};
use crate::poll::PollEngine;
use crate::reconcile::DefaultsReconciler;
use crate::schema::Defaults;
use crate::settings::CommunitySettings;
use crate::store::{PathStore, Paths};
use crate::tickets::TicketDesk;
use crate::voice::VoiceRooms;

/// Shared engines, built once at startup and handed to every handler.
#[derive(Clone)]
pub struct Context {
    pub store: PathStore,
    pub paths: Paths,
    pub defaults: Arc<Defaults>,
    pub reconciler: DefaultsReconciler,
    pub leveling: LevelingEngine,
    pub polls: PollEngine,
    pub settings: CommunitySettings,
    pub voice: VoiceRooms,
    pub tickets: TicketDesk,
}

impl Context {
    pub fn new(store: PathStore, paths: Paths, defaults: Arc<Defaults>) -> Self {
        let reconciler = DefaultsReconciler::new(store.clone(), paths.clone(), defaults.clone());
        let leveling = LevelingEngine::new(store.clone(), paths.clone(), reconciler.clone());
        let polls = PollEngine::new(store.clone(), paths.clone());
        let settings = CommunitySettings::new(store.clone(), paths.clone(), reconciler.clone());
        let voice = VoiceRooms::new(settings.clone());
        let tickets = TicketDesk::new(store.clone(), paths.clone(), settings.clone());
        Self {
            store,
            paths,
            defaults,
            reconciler,
            leveling,
            polls,
            settings,
            voice,
            tickets,
        }
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, ctx: &Context, event: &InboundEvent) -> CoreResult<Vec<Action>>;
}

/// Result of dispatching one event.
#[derive(Debug, Default)]
pub struct Outcome {
    pub actions: Vec<Action>,
    pub error: Option<CoreError>,
}

pub struct Dispatcher {
    ctx: Context,
    handlers: HashMap<EventKind, Vec<Arc<dyn EventHandler>>>,
}

impl Dispatcher {
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            handlers: HashMap::new(),
        }
    }

    /// Dispatcher with the built-in handler for every event kind.
    pub fn with_default_handlers(ctx: Context) -> Self {
        let mut d = Self::new(ctx);
        crate::handlers::register_defaults(&mut d);
        d
    }

    pub fn register(&mut self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub async fn dispatch(&self, event: &InboundEvent) -> Outcome {
        let kind = event.kind();
        let Some(handlers) = self.handlers.get(&kind) else {
            log(
                Level::Debug,
                Domain::Dispatch,
                "unhandled",
                obj(&[("event_kind", v_str(kind.as_str()))]),
            );
            return Outcome::default();
        };

        let mut actions = Vec::new();
        for handler in handlers {
            match handler.handle(&self.ctx, event).await {
                Ok(mut produced) => actions.append(&mut produced),
                Err(err) => return self.fail(event, err),
            }
        }
        Outcome { actions, error: None }
    }

    fn fail(&self, event: &InboundEvent, err: CoreError) -> Outcome {
        let kind = event.kind();
        let reply = match (kind, err.user_message()) {
            (EventKind::Interaction, Some(text)) => Some(Action::ephemeral(text)),
            _ => None,
        };
        match &reply {
            Some(_) => log(
                Level::Info,
                Domain::Dispatch,
                "rejected",
                obj(&[
                    ("event_kind", v_str(kind.as_str())),
                    ("error_kind", v_str(err.kind())),
                    ("msg", v_str(&err.to_string())),
                ]),
            ),
            None => log_handler_error(kind.as_str(), err.kind(), &err.to_string()),
        }
        Outcome {
            actions: reply.into_iter().collect(),
            error: Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{InteractionEvent, Interaction};
    use crate::store::MemoryBackend;

    struct Fixed(Vec<Action>);

    #[async_trait]
    impl EventHandler for Fixed {
        async fn handle(&self, _: &Context, _: &InboundEvent) -> CoreResult<Vec<Action>> {
            Ok(self.0.clone())
        }
    }

    struct Failing(fn() -> CoreError);

    #[async_trait]
    impl EventHandler for Failing {
        async fn handle(&self, _: &Context, _: &InboundEvent) -> CoreResult<Vec<Action>> {
            Err((self.0)())
        }
    }

    fn ctx() -> Context {
        let store = PathStore::new(Arc::new(MemoryBackend::new()));
        Context::new(store, Paths::default(), Arc::new(Defaults::builtin()))
    }

    fn interaction() -> InboundEvent {
        InboundEvent::Interaction(InteractionEvent {
            community_id: "g1".into(),
            member_id: "u1".into(),
            channel_id: "c1".into(),
            interaction: Interaction::ToggleLeveling,
        })
    }

    #[tokio::test]
    async fn test_handlers_run_in_order() {
        let mut d = Dispatcher::new(ctx());
        d.register(EventKind::Interaction, Arc::new(Fixed(vec![Action::ephemeral("a")])));
        d.register(EventKind::Interaction, Arc::new(Fixed(vec![Action::ephemeral("b")])));
        let out = d.dispatch(&interaction()).await;
        assert_eq!(out.actions, vec![Action::ephemeral("a"), Action::ephemeral("b")]);
        assert!(out.error.is_none());
    }

    #[tokio::test]
    async fn test_user_error_becomes_ephemeral_reply() {
        let mut d = Dispatcher::new(ctx());
        d.register(EventKind::Interaction, Arc::new(Failing(|| CoreError::NotFound("poll".into()))));
        let out = d.dispatch(&interaction()).await;
        assert_eq!(out.actions, vec![Action::ephemeral("Poll not found.")]);
    }

    #[tokio::test]
    async fn test_store_failure_aborts_without_actions() {
        let mut d = Dispatcher::new(ctx());
        d.register(EventKind::Interaction, Arc::new(Fixed(vec![Action::ephemeral("a")])));
        d.register(EventKind::Interaction, Arc::new(Failing(|| CoreError::unavailable("down"))));
        d.register(EventKind::Interaction, Arc::new(Fixed(vec![Action::ephemeral("c")])));
        let out = d.dispatch(&interaction()).await;
        assert!(out.actions.is_empty());
        assert!(matches!(out.error, Some(CoreError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_unregistered_kind_is_empty() {
        let d = Dispatcher::new(ctx());
        let out = d.dispatch(&interaction()).await;
        assert!(out.actions.is_empty() && out.error.is_none());
    }
}
