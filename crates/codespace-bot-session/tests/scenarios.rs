//! End-to-end flows against a mock Codespaces API.

use std::{sync::Arc, time::Duration};

use codespace_bot_core::{
    Callback, ChatId, CredentialStorage, InboundEvent, OutboundAction, Sender, ToggleAction,
};
use codespace_bot_github::GithubClient;
use codespace_bot_session::{
    ChatState, Router,
    router::{INVALID_TOKEN, TOKEN_ADDED},
    storage::MemoryStorage,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CHAT: ChatId = ChatId(42);

fn sender() -> Sender {
    Sender {
        username: Some("octocat".into()),
        first_name: "Mona".into(),
    }
}

async fn setup() -> (MockServer, Arc<MemoryStorage>, Router<Arc<MemoryStorage>, GithubClient>) {
    let server = MockServer::start().await;
    let client = GithubClient::builder()
        .base_url(server.uri())
        .timeout(Duration::from_millis(500))
        .build()
        .unwrap();
    let storage = Arc::new(MemoryStorage::new());
    let router = Router::new(Arc::clone(&storage), client);
    (server, storage, router)
}

async fn submit_token(router: &Router<Arc<MemoryStorage>, GithubClient>, token: &str) -> Vec<OutboundAction> {
    router
        .handle_event(InboundEvent::button(CHAT, sender(), Callback::AddToken))
        .await;
    router
        .handle_event(InboundEvent::text(CHAT, sender(), token))
        .await
}

#[tokio::test]
async fn test_valid_token_is_persisted() {
    let (server, storage, router) = setup().await;

    Mock::given(method("GET"))
        .and(path("/user/codespaces"))
        .and(header("authorization", "Bearer ghp_valid"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"codespaces":[]}"#))
        .expect(1)
        .mount(&server)
        .await;

    let actions = submit_token(&router, "ghp_valid").await;

    let record = storage.find(CHAT).await.unwrap().unwrap();
    assert_eq!(record.tokens, vec!["ghp_valid"]);
    assert!(record.is_aligned());
    assert!(actions.contains(&OutboundAction::reply(TOKEN_ADDED)));
    assert!(actions.iter().any(|a| matches!(a, OutboundAction::SendToAudit { .. })));
}

#[tokio::test]
async fn test_rejected_token_is_never_persisted() {
    let (server, storage, router) = setup().await;

    Mock::given(method("GET"))
        .and(path("/user/codespaces"))
        .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"message":"Bad credentials"}"#))
        .mount(&server)
        .await;

    let actions = submit_token(&router, "ghp_bad").await;

    assert_eq!(actions, vec![OutboundAction::reply(INVALID_TOKEN)]);
    assert!(storage.find(CHAT).await.unwrap().is_none());
    assert_eq!(router.sessions().state(CHAT), ChatState::AwaitingCredential);
}

#[tokio::test]
async fn test_slow_upstream_counts_as_invalid() {
    let (server, storage, router) = setup().await;

    Mock::given(method("GET"))
        .and(path("/user/codespaces"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"codespaces":[]}"#)
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let actions = submit_token(&router, "ghp_slow").await;

    assert_eq!(actions, vec![OutboundAction::reply(INVALID_TOKEN)]);
    assert!(storage.find(CHAT).await.unwrap().is_none());
}

#[tokio::test]
async fn test_positional_delete_compacts() {
    let (_server, storage, router) = setup().await;
    for token in ["a", "b", "c"] {
        router.store().save(CHAT, token).await;
    }

    router
        .handle_event(InboundEvent::button(CHAT, sender(), Callback::DeleteToken))
        .await;
    router
        .handle_event(InboundEvent::button(CHAT, sender(), Callback::ConfirmDelete { index: 1 }))
        .await;

    assert_eq!(router.store().load(CHAT).await, vec!["a", "c"]);
    assert_eq!(storage.raw_len(CHAT), 2);
    assert!(storage.find(CHAT).await.unwrap().unwrap().is_aligned());
}

#[tokio::test]
async fn test_toggle_keeps_selection() {
    let (server, _storage, router) = setup().await;

    Mock::given(method("GET"))
        .and(path("/user/codespaces"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"codespaces":[{"name":"env-1","state":"Available"}]}"#,
        ))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/user/codespaces/env-1/stop"))
        .and(header("authorization", "Bearer ghp_valid"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    router.store().save(CHAT, "ghp_valid").await;
    router
        .handle_event(InboundEvent::button(CHAT, sender(), Callback::YourTokens))
        .await;
    let listing = router
        .handle_event(InboundEvent::button(CHAT, sender(), Callback::SelectToken { index: 0 }))
        .await;

    let toggle = listing[0]
        .keyboard()
        .and_then(|k| k.callbacks().next().cloned())
        .unwrap();
    assert_eq!(
        toggle,
        Callback::Toggle {
            action: ToggleAction::Stop,
            name: "env-1".into()
        }
    );

    let actions = router
        .handle_event(InboundEvent::button(CHAT, sender(), toggle))
        .await;

    assert_eq!(actions, vec![OutboundAction::send("✅ Codespace env-1 is stopping.")]);
    assert_eq!(router.sessions().current(CHAT).as_deref(), Some("env-1"));
}
