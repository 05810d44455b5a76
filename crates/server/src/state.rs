//! Process-wide shared state, built once in `main` and cloned into every
//! WebSocket connection.

use std::sync::Arc;

use convo_core::bus::EventBus;
use convo_core::context::ContextManager;
use convo_core::executor::Scheduler;
use convo_core::janitor::Janitor;
use convo_core::orchestrator::ConversationOrchestrator;
use convo_core::provider::{LlmProvider, SttProvider};
use convo_core::transcript::TranscriptBufferManager;

use crate::config::ServerConfig;
use crate::forwarder::{AiResponseTracker, ClientForwarder};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub bus: Arc<EventBus>,
    pub scheduler: Arc<Scheduler>,
    pub transcripts: Arc<TranscriptBufferManager>,
    pub contexts: Arc<ContextManager>,
    pub orchestrator: Arc<ConversationOrchestrator>,
    pub janitor: Arc<Janitor>,
    pub stt: Arc<dyn SttProvider>,
    pub forwarder: Arc<ClientForwarder>,
    pub ai_responding: Arc<AiResponseTracker>,
}

impl AppState {
    /// The bus's handler list can't be fixed at construction: the
    /// orchestrator is itself a handler but needs a reference to the bus it
    /// is registered on. Build the bus first, register handlers onto it
    /// after they exist (`EventBus::register_handler`).
    pub fn build(config: ServerConfig, stt: Arc<dyn SttProvider>, llm: Arc<dyn LlmProvider>) -> Self {
        let config = Arc::new(config);
        let transcripts = Arc::new(TranscriptBufferManager::new(
            convo_core::context::MAX_MESSAGES_PER_CONTEXT,
        ));
        let contexts = Arc::new(ContextManager::new());
        let scheduler = Arc::new(config.apply_pool_sizes(Scheduler::new()));

        let forwarder = ClientForwarder::new();
        let ai_responding = AiResponseTracker::new();

        let bus = EventBus::new(vec![forwarder.clone(), ai_responding.clone()]);
        let janitor = Janitor::new(bus.clone(), contexts.clone(), config.session_idle_ms);

        let orchestrator = Arc::new(ConversationOrchestrator::new(
            bus.clone(),
            transcripts.clone(),
            contexts.clone(),
            scheduler.clone(),
            llm,
            config.orchestrator,
        ));
        bus.register_handler(orchestrator.clone());

        janitor.spawn();

        Self {
            config,
            bus,
            scheduler,
            transcripts,
            contexts,
            orchestrator,
            janitor,
            stt,
            forwarder,
            ai_responding,
        }
    }
}
