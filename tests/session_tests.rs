use async_trait::async_trait;
use conclave::client_wrapper::{
    Completion, CompletionClient, CompletionError, Message, ModelCatalog, Role,
};
use conclave::conclave::metrics::COLLECTIVE_MODEL;
use conclave::{
    AgentGroup, AgentRole, ChatSession, ConversationRecord, OrchestrationEvent, RoleModels,
    SessionError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct MockClient {
    models: Vec<String>,
    calls: AtomicUsize,
}

impl MockClient {
    fn new(models: &[&str]) -> Self {
        Self {
            models: models.iter().map(|m| m.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CompletionClient for MockClient {
    async fn complete(
        &self,
        model: &str,
        _messages: &[Message],
        _temperature: f32,
    ) -> Result<Completion, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Completion {
            text: format!("reply from {}", model),
            tokens: 10,
            elapsed: Duration::ZERO,
        })
    }
}

#[async_trait]
impl ModelCatalog for MockClient {
    async fn list_models(&self) -> Result<Vec<String>, CompletionError> {
        if self.models.is_empty() {
            return Err(CompletionError::Status {
                code: 401,
                body: "unauthorized".to_string(),
            });
        }
        Ok(self.models.clone())
    }
}

struct EmptyCatalog;

#[async_trait]
impl ModelCatalog for EmptyCatalog {
    async fn list_models(&self) -> Result<Vec<String>, CompletionError> {
        Ok(Vec::new())
    }
}

fn new_session(client: Arc<MockClient>) -> ChatSession {
    ChatSession::new(AgentGroup::new(client))
}

#[tokio::test]
async fn test_setup_agents_registers_default_roles() {
    let client = Arc::new(MockClient::new(&[]));
    let mut session = new_session(client);

    session.setup_agents(&RoleModels::uniform("openai/gpt-4o")).unwrap();

    assert!(session.group().has_coordinator());
    assert_eq!(
        session.group().agent_names(),
        vec!["Human Assistant", "Code Assistant", "Critic"]
    );
    let coder = session.group().agent("Code Assistant").await.unwrap();
    assert_eq!(coder.role, AgentRole::Coder);
    assert_eq!(coder.model, "openai/gpt-4o");
    assert_eq!(
        session.role_models(),
        Some(&RoleModels::uniform("openai/gpt-4o"))
    );
}

#[tokio::test]
async fn test_setup_agents_requires_every_role() {
    let client = Arc::new(MockClient::new(&[]));
    let mut session = new_session(client);
    let mut models = RoleModels::uniform("m");
    models.critic = None;

    assert_eq!(
        session.setup_agents(&models),
        Err(SessionError::MissingModel(AgentRole::Critic))
    );
    assert!(session.group().is_empty());
    assert!(!session.group().has_coordinator());
}

#[tokio::test]
async fn test_setup_from_catalog_keeps_saved_choices() {
    let client = Arc::new(MockClient::new(&["first", "second"]));
    let mut session = new_session(client.clone());
    let mut saved = RoleModels::default();
    saved.set(&AgentRole::Critic, "second");
    saved.set(&AgentRole::Coder, "retired");

    let models = session
        .setup_agents_from_catalog(client.as_ref(), Some(&saved))
        .await
        .unwrap();

    assert_eq!(models.critic.as_deref(), Some("second"));
    assert_eq!(models.coder.as_deref(), Some("first"));
    assert_eq!(session.group().agent("Critic").await.unwrap().model, "second");
}

#[tokio::test]
async fn test_setup_from_catalog_errors() {
    let client = Arc::new(MockClient::new(&[]));
    let mut session = new_session(client.clone());

    let err = session
        .setup_agents_from_catalog(client.as_ref(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Catalog(CompletionError::Status { code: 401, .. })));

    let err = session
        .setup_agents_from_catalog(&EmptyCatalog, None)
        .await
        .unwrap_err();
    assert_eq!(err, SessionError::NoModelsAvailable);
}

#[tokio::test]
async fn test_send_single_updates_metrics_and_history() {
    let client = Arc::new(MockClient::new(&[]));
    let mut session = new_session(client);
    session.setup_agents(&RoleModels::uniform("m")).unwrap();

    let reply = session.send_single("Critic", "review this").await.unwrap();
    assert_eq!(reply.text, "reply from m");

    assert_eq!(session.metrics().total_tokens, 10);
    assert_eq!(session.metrics().usage_for("m"), 1);
    assert_eq!(session.metrics().response_times.len(), 1);

    match &session.history()[0] {
        ConversationRecord::Single { agent, messages, .. } => {
            assert_eq!(agent, "Critic");
            assert_eq!(messages.len(), 3);
            assert_eq!(messages[2].role, Role::Assistant);
        }
        other => panic!("expected a single-agent record, got {:?}", other),
    }
}

#[tokio::test]
async fn test_blank_input_is_rejected() {
    let client = Arc::new(MockClient::new(&[]));
    let mut session = new_session(client.clone());
    session.setup_agents(&RoleModels::uniform("m")).unwrap();

    assert_eq!(
        session.send_single("Critic", "   ").await.unwrap_err(),
        SessionError::EmptyInput
    );
    assert!(session.send_collective("").is_err());
    assert_eq!(client.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_collective_is_recorded_under_collective_model() {
    let client = Arc::new(MockClient::new(&[]));
    let mut session = new_session(client);
    session.setup_agents(&RoleModels::uniform("m")).unwrap();

    let events = session.collect_collective("write a parser").await.unwrap();
    assert!(matches!(
        events.last(),
        Some(OrchestrationEvent::CompletePhase { .. })
    ));

    // three specialists plus the synthesis
    assert_eq!(session.metrics().total_tokens, 40);
    assert_eq!(session.metrics().usage_for(COLLECTIVE_MODEL), 1);
    match &session.history()[0] {
        ConversationRecord::Collective {
            user_input,
            responses,
            ..
        } => {
            assert_eq!(user_input, "write a parser");
            assert_eq!(responses.len(), 3);
        }
        other => panic!("expected a collective record, got {:?}", other),
    }
}

#[tokio::test]
async fn test_reset_clears_history_but_keeps_metrics() {
    let client = Arc::new(MockClient::new(&[]));
    let mut session = new_session(client);
    session.setup_agents(&RoleModels::uniform("m")).unwrap();
    session.send_single("Code Assistant", "hello").await.unwrap();

    session.reset().await;

    assert!(session.history().is_empty());
    assert_eq!(session.metrics().total_tokens, 10);
    let coder = session.group().agent("Code Assistant").await.unwrap();
    assert_eq!(coder.transcript().len(), 1);
    assert_eq!(session.group().agent_names().len(), 3);
}
