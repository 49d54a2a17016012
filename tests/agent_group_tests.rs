use async_trait::async_trait;
use conclave::client_wrapper::{Completion, CompletionClient, CompletionError, Message, Role};
use conclave::{
    Agent, AgentGroup, AgentRole, ConclaveConfig, CoordinatorAgent, FanOutMode, GroupError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
enum Script {
    Reply(&'static str, usize),
    Fail,
}

struct MockClient {
    scripts: Mutex<HashMap<String, Script>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockClient {
    fn new(scripts: &[(&str, Script)]) -> Self {
        Self {
            scripts: Mutex::new(
                scripts
                    .iter()
                    .map(|(model, script)| (model.to_string(), script.clone()))
                    .collect(),
            ),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn set_script(&self, model: &str, script: Script) {
        self.scripts.lock().unwrap().insert(model.to_string(), script);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
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
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let script = self.scripts.lock().unwrap().get(model).cloned();
        match script {
            Some(Script::Reply(text, tokens)) => Ok(Completion {
                text: text.to_string(),
                tokens,
                elapsed: Duration::ZERO,
            }),
            Some(Script::Fail) | None => Err(CompletionError::Status {
                code: 500,
                body: "upstream error".to_string(),
            }),
        }
    }
}

fn coder(model: &str) -> Agent {
    Agent::new("Code Assistant", AgentRole::Coder, model, "You write code.")
}

#[tokio::test]
async fn test_get_response_unknown_agent() {
    let client = Arc::new(MockClient::new(&[]));
    let group = AgentGroup::new(client.clone());

    let err = group.get_response("Nobody").await.unwrap_err();
    assert_eq!(err, GroupError::AgentNotFound("Nobody".to_string()));
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_get_response_is_cached_and_does_not_append() {
    let client = Arc::new(MockClient::new(&[("m", Script::Reply("fn main() {}", 12))]));
    let mut group = AgentGroup::new(client.clone());
    let mut agent = coder("m");
    agent.append_message(Role::User, "write main");
    group.add_agent(agent);

    let first = group.get_response("Code Assistant").await.unwrap();
    let second = group.get_response("Code Assistant").await.unwrap();

    assert_eq!(client.calls(), 1);
    assert_eq!(first, second);
    assert_eq!(first.text, "fn main() {}");
    assert_eq!(first.tokens, 12);

    let agent = group.agent("Code Assistant").await.unwrap();
    assert_eq!(agent.transcript().len(), 2);
    assert_eq!(agent.last_call_duration(), Some(first.elapsed));
    assert_eq!(group.cache().len().await, 1);
}

#[tokio::test]
async fn test_failed_calls_are_retried() {
    let client = Arc::new(MockClient::new(&[("m", Script::Fail)]));
    let mut group = AgentGroup::new(client.clone());
    group.add_agent(coder("m"));

    let err = group.get_response("Code Assistant").await.unwrap_err();
    assert!(matches!(err, GroupError::Completion(CompletionError::Status { code: 500, .. })));
    assert!(group.cache().is_empty().await);

    client.set_script("m", Script::Reply("recovered", 1));
    let completion = group.get_response("Code Assistant").await.unwrap();
    assert_eq!(completion.text, "recovered");
    assert_eq!(client.calls(), 2);
}

#[tokio::test]
async fn test_concurrent_lookups_share_one_call() {
    let client = Arc::new(
        MockClient::new(&[("m", Script::Reply("once", 3))]).with_delay(Duration::from_millis(30)),
    );
    let mut group = AgentGroup::new(client.clone());
    group.add_agent(coder("m"));

    let (a, b) = tokio::join!(
        group.get_response("Code Assistant"),
        group.get_response("Code Assistant")
    );
    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn test_same_transcript_different_agents_are_separate_entries() {
    let client = Arc::new(MockClient::new(&[("m", Script::Reply("hi", 1))]));
    let mut group = AgentGroup::new(client.clone());
    group.add_agent(Agent::new("One", AgentRole::Coder, "m", "same"));
    group.add_agent(Agent::new("Two", AgentRole::Coder, "m", "same"));

    group.get_response("One").await.unwrap();
    group.get_response("Two").await.unwrap();
    assert_eq!(client.calls(), 2);
}

#[tokio::test]
async fn test_chat_appends_user_and_assistant_messages() {
    let client = Arc::new(MockClient::new(&[("m", Script::Reply("use a HashMap", 4))]));
    let mut group = AgentGroup::new(client.clone());
    group.add_agent(coder("m"));

    let reply = group.chat("Code Assistant", "count words").await.unwrap();
    assert_eq!(reply.text, "use a HashMap");

    let agent = group.agent("Code Assistant").await.unwrap();
    let roles: Vec<Role> = agent.transcript().iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
    assert_eq!(agent.transcript()[2].content, "use a HashMap");
}

#[tokio::test]
async fn test_failed_chat_keeps_only_the_user_message() {
    let client = Arc::new(MockClient::new(&[("m", Script::Fail)]));
    let mut group = AgentGroup::new(client);
    group.add_agent(coder("m"));

    assert!(group.chat("Code Assistant", "hello").await.is_err());
    let agent = group.agent("Code Assistant").await.unwrap();
    assert_eq!(agent.transcript().len(), 2);
    assert_eq!(agent.transcript()[1].role, Role::User);
}

#[tokio::test]
async fn test_reset_conversations_restores_system_messages() {
    let client = Arc::new(MockClient::new(&[("m", Script::Reply("ok", 1))]));
    let mut group = AgentGroup::new(client);
    group.add_agent(coder("m"));
    group.add_agent(CoordinatorAgent::new("Coordinator", "m", "You coordinate."));

    group.chat("Code Assistant", "one").await.unwrap();
    group.chat("Code Assistant", "two").await.unwrap();
    group.run_collective("three").collect_events().await;

    group.reset_conversations().await;

    let agent = group.agent("Code Assistant").await.unwrap();
    assert_eq!(agent.transcript(), &[Message::new(Role::System, "You write code.")]);
    let coordinator = group.coordinator().await.unwrap();
    assert_eq!(
        coordinator.agent().transcript(),
        &[Message::new(Role::System, "You coordinate.")]
    );
}

#[tokio::test]
async fn test_duplicate_names_overwrite_in_place() {
    let client = Arc::new(MockClient::new(&[]));
    let mut group = AgentGroup::new(client);
    group.add_agent(Agent::new("A", AgentRole::Coder, "first", "sys"));
    group.add_agent(Agent::new("B", AgentRole::Critic, "m", "sys"));
    group.add_agent(Agent::new("A", AgentRole::Coder, "second", "sys"));

    assert_eq!(group.agent_names(), vec!["A".to_string(), "B".to_string()]);
    assert_eq!(group.agent("A").await.unwrap().model, "second");
}

#[tokio::test]
async fn test_remove_agent() {
    let client = Arc::new(MockClient::new(&[]));
    let mut group = AgentGroup::new(client);
    group.add_agent(Agent::new("A", AgentRole::Coder, "m", "sys"));
    group.add_agent(Agent::new("B", AgentRole::Critic, "m", "sys"));

    assert!(group.remove_agent("A"));
    assert!(!group.remove_agent("A"));
    assert_eq!(group.agent_names(), vec!["B".to_string()]);
    assert!(group.agent("A").await.is_none());
}

#[tokio::test]
async fn test_coordinator_role_agent_fills_coordinator_slot() {
    let client = Arc::new(MockClient::new(&[]));
    let mut group = AgentGroup::new(client);
    assert!(!group.has_coordinator());

    group.add_agent(Agent::new("Lead", AgentRole::Coordinator, "m", "sys"));
    assert!(group.has_coordinator());
    assert!(group.is_empty());

    group.add_agent(CoordinatorAgent::new("Replacement", "m", "sys"));
    assert_eq!(group.coordinator().await.unwrap().name(), "Replacement");
}

#[tokio::test]
async fn test_from_config_applies_run_defaults() {
    let client = Arc::new(MockClient::new(&[]));
    let config = ConclaveConfig {
        fan_out: FanOutMode::Concurrent,
        ..ConclaveConfig::default()
    };
    let group = AgentGroup::from_config(client, &config);
    assert_eq!(group.fan_out(), FanOutMode::Concurrent);
}
