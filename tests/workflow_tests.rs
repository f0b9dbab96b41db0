//! Workflow state machine tests
//!
//! These drive the dispatcher end to end with a mock lifecycle executor and
//! an in-memory store, covering:
//! - Unauthorized callers never reach the store or the executor
//! - Create round trip: prompt → derived name → record → bundle delivery
//! - Retry-in-place for invalid and duplicate names
//! - Revoke failures terminate the cycle and keep the record
//! - Listing scope and formatting per caller role
//! - Same-name operations are serialized

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Local;

use vpn_steward::config::AdminsConfig;
use vpn_steward::workflow::{Event, Response};
use vpn_steward::{
    AdminRoster, ClientStore, CredentialBundle, Dispatcher, ExecutorError, LifecycleExecutor,
};

const SUPERADMIN: i64 = 1;
const ALICE: i64 = 10;
const BOB: i64 = 20;
const STRANGER: i64 = 999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CreateBehavior {
    Succeed,
    Duplicate,
    Fail,
}

// Mock executor recording every invocation, in place of the real script.
struct MockExecutor {
    create_behavior: Mutex<CreateBehavior>,
    revoke_ok: Mutex<bool>,
    create_calls: Mutex<Vec<String>>,
    revoke_calls: Mutex<Vec<String>>,
}

impl MockExecutor {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            create_behavior: Mutex::new(CreateBehavior::Succeed),
            revoke_ok: Mutex::new(true),
            create_calls: Mutex::new(Vec::new()),
            revoke_calls: Mutex::new(Vec::new()),
        })
    }

    fn set_create(&self, behavior: CreateBehavior) {
        *self.create_behavior.lock().unwrap() = behavior;
    }

    fn set_revoke_ok(&self, ok: bool) {
        *self.revoke_ok.lock().unwrap() = ok;
    }

    fn call_count(&self) -> usize {
        self.create_calls.lock().unwrap().len() + self.revoke_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LifecycleExecutor for MockExecutor {
    async fn create(&self, derived_name: &str) -> Result<CredentialBundle, ExecutorError> {
        self.create_calls
            .lock()
            .unwrap()
            .push(derived_name.to_string());
        match *self.create_behavior.lock().unwrap() {
            CreateBehavior::Succeed => Ok(CredentialBundle {
                filename: format!("{derived_name}.ovpn"),
                bytes: b"dummy-ovpn-config".to_vec(),
            }),
            CreateBehavior::Duplicate => Err(ExecutorError::DuplicateName),
            CreateBehavior::Fail => {
                Err(ExecutorError::UnexpectedFailure("script blew up".to_string()))
            }
        }
    }

    async fn revoke(&self, client_name: &str) -> Result<(), ExecutorError> {
        self.revoke_calls
            .lock()
            .unwrap()
            .push(client_name.to_string());
        if *self.revoke_ok.lock().unwrap() {
            Ok(())
        } else {
            Err(ExecutorError::UnexpectedFailure(
                "unexpected revoke output: some other text".to_string(),
            ))
        }
    }
}

fn roster() -> AdminRoster {
    AdminRoster::from_config(&AdminsConfig {
        superadmin_id: SUPERADMIN,
        superadmin_name: "Superadmin".to_string(),
        admin_ids: vec![ALICE, BOB],
        admin_names: vec!["Alice".to_string(), "Bob".to_string()],
    })
}

// Store assertions go through the dispatcher's List responses, since the
// in-memory database lives inside the dispatcher's store.
async fn dispatcher_with(executor: Arc<MockExecutor>) -> Dispatcher {
    let store = ClientStore::connect("sqlite::memory:", true)
        .await
        .expect("in-memory store");
    Dispatcher::new(roster(), store, executor)
}

fn today_suffix() -> String {
    Local::now().date_naive().format("%d-%m").to_string()
}

fn expect_text(response: Response) -> String {
    match response {
        Response::Text(text) => text,
        other => panic!("expected text response, got {other:?}"),
    }
}

fn expect_listing(response: Response) -> String {
    match response {
        Response::Listing(listing) => listing,
        other => panic!("expected listing response, got {other:?}"),
    }
}

#[tokio::test]
async fn unauthorized_caller_is_denied_everywhere() {
    let executor = MockExecutor::new();
    let dispatcher = dispatcher_with(Arc::clone(&executor)).await;

    for event in [
        Event::Start,
        Event::Create,
        Event::Delete,
        Event::List,
        Event::Text("alice".to_string()),
    ] {
        let response = dispatcher.handle(STRANGER, event).await;
        assert_eq!(expect_text(response), "🚫 Unauthorized access.");
    }

    // No mutation, no executor contact.
    assert_eq!(executor.call_count(), 0);
    let listing = expect_listing(dispatcher.handle(SUPERADMIN, Event::List).await);
    assert!(listing.contains("📂 No clients found."));
}

#[tokio::test]
async fn create_round_trip_records_and_delivers_bundle() {
    let executor = MockExecutor::new();
    let dispatcher = dispatcher_with(Arc::clone(&executor)).await;

    let prompt = expect_text(dispatcher.handle(ALICE, Event::Create).await);
    assert_eq!(prompt, "Please enter a name for the new client:");

    let derived = format!("alice_{}", today_suffix());
    let response = dispatcher
        .handle(ALICE, Event::Text("alice".to_string()))
        .await;
    match response {
        Response::Document { filename, bytes } => {
            assert_eq!(filename, format!("{derived}.ovpn"));
            assert_eq!(bytes, b"dummy-ovpn-config");
        }
        other => panic!("expected document, got {other:?}"),
    }
    assert_eq!(executor.create_calls.lock().unwrap().as_slice(), [derived.clone()]);

    let listing = expect_listing(dispatcher.handle(ALICE, Event::List).await);
    assert!(listing.contains(&format!("1. `{derived}`")));

    // Revoke the same client; the record disappears from the listing.
    expect_text(dispatcher.handle(ALICE, Event::Delete).await);
    let response = expect_text(dispatcher.handle(ALICE, Event::Text(derived.clone())).await);
    assert_eq!(response, format!("✅ Client `{derived}` has been deleted."));
    assert_eq!(executor.revoke_calls.lock().unwrap().as_slice(), [derived.clone()]);

    let listing = expect_listing(dispatcher.handle(ALICE, Event::List).await);
    assert!(listing.contains("📂 No clients found."));
}

#[tokio::test]
async fn invalid_name_reprompts_without_touching_executor() {
    let executor = MockExecutor::new();
    let dispatcher = dispatcher_with(Arc::clone(&executor)).await;

    expect_text(dispatcher.handle(ALICE, Event::Create).await);
    let response = expect_text(
        dispatcher
            .handle(ALICE, Event::Text("bad name!".to_string()))
            .await,
    );
    assert!(response.contains("Invalid username format"));
    assert_eq!(executor.call_count(), 0);

    // The prompt is still open; a valid name goes straight through.
    let response = dispatcher
        .handle(ALICE, Event::Text("good-name".to_string()))
        .await;
    assert!(matches!(response, Response::Document { .. }));
}

#[tokio::test]
async fn duplicate_name_reprompts_and_store_stays_unchanged() {
    let executor = MockExecutor::new();
    executor.set_create(CreateBehavior::Duplicate);
    let dispatcher = dispatcher_with(Arc::clone(&executor)).await;

    expect_text(dispatcher.handle(ALICE, Event::Create).await);
    let response = expect_text(
        dispatcher
            .handle(ALICE, Event::Text("alice".to_string()))
            .await,
    );
    assert_eq!(
        response,
        "❗ Client name already exists. Please choose another name."
    );

    let listing = expect_listing(dispatcher.handle(SUPERADMIN, Event::List).await);
    assert!(listing.contains("📂 No clients found."));

    // Retry in place with another name succeeds.
    executor.set_create(CreateBehavior::Succeed);
    let response = dispatcher
        .handle(ALICE, Event::Text("alice2".to_string()))
        .await;
    assert!(matches!(response, Response::Document { .. }));
}

#[tokio::test]
async fn unexpected_create_failure_terminates_cycle() {
    let executor = MockExecutor::new();
    executor.set_create(CreateBehavior::Fail);
    let dispatcher = dispatcher_with(Arc::clone(&executor)).await;

    expect_text(dispatcher.handle(ALICE, Event::Create).await);
    let response = expect_text(
        dispatcher
            .handle(ALICE, Event::Text("alice".to_string()))
            .await,
    );
    assert!(response.contains("script blew up"));

    // Cycle over: further text is not consumed as a name.
    let response = expect_text(
        dispatcher
            .handle(ALICE, Event::Text("alice".to_string()))
            .await,
    );
    assert_eq!(response, "Use the menu to choose an action first.");
    assert_eq!(executor.create_calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn revoke_failure_keeps_record_and_ends_cycle() {
    let executor = MockExecutor::new();
    let dispatcher = dispatcher_with(Arc::clone(&executor)).await;

    expect_text(dispatcher.handle(ALICE, Event::Create).await);
    dispatcher
        .handle(ALICE, Event::Text("alice".to_string()))
        .await;
    let derived = format!("alice_{}", today_suffix());

    executor.set_revoke_ok(false);
    expect_text(dispatcher.handle(ALICE, Event::Delete).await);
    let response = expect_text(dispatcher.handle(ALICE, Event::Text(derived.clone())).await);
    assert!(response.contains("Error occurred while deleting client"));
    assert!(response.contains("some other text"));

    // Record retained; cycle terminated, so plain text is no longer a name.
    let listing = expect_listing(dispatcher.handle(ALICE, Event::List).await);
    assert!(listing.contains(&derived));
    let response = expect_text(dispatcher.handle(ALICE, Event::Text(derived.clone())).await);
    assert_eq!(response, "Use the menu to choose an action first.");
}

#[tokio::test]
async fn deleting_unrecorded_client_is_tolerated() {
    let executor = MockExecutor::new();
    let dispatcher = dispatcher_with(Arc::clone(&executor)).await;

    expect_text(dispatcher.handle(ALICE, Event::Delete).await);
    let response = expect_text(
        dispatcher
            .handle(ALICE, Event::Text("never-recorded_01-01".to_string()))
            .await,
    );
    assert_eq!(
        response,
        "✅ Client `never-recorded_01-01` has been deleted."
    );
}

#[tokio::test]
async fn listing_scope_follows_role() {
    let executor = MockExecutor::new();
    let dispatcher = dispatcher_with(Arc::clone(&executor)).await;

    for (caller, base) in [(ALICE, "laptop"), (BOB, "phone"), (ALICE, "tablet")] {
        expect_text(dispatcher.handle(caller, Event::Create).await);
        let response = dispatcher.handle(caller, Event::Text(base.to_string())).await;
        assert!(matches!(response, Response::Document { .. }));
    }
    let suffix = today_suffix();

    // Superadmin: grouped by owner with display names.
    let listing = expect_listing(dispatcher.handle(SUPERADMIN, Event::List).await);
    assert!(listing.contains("👤 *Alice*"));
    assert!(listing.contains("👤 *Bob*"));
    assert!(listing.contains("- - -"));
    assert!(listing.contains(&format!("1. `laptop_{suffix}`")));
    assert!(listing.contains(&format!("2. `tablet_{suffix}`")));

    // Bob: flat list of his own client only.
    let listing = expect_listing(dispatcher.handle(BOB, Event::List).await);
    assert!(listing.contains(&format!("1. `phone_{suffix}`")));
    assert!(!listing.contains("laptop"));
    assert!(!listing.contains("👤"));
}

// Executor that parks in create() until released, for overlap tests.
struct GatedExecutor {
    started: tokio::sync::Notify,
    release: tokio::sync::Notify,
}

#[async_trait]
impl LifecycleExecutor for GatedExecutor {
    async fn create(&self, derived_name: &str) -> Result<CredentialBundle, ExecutorError> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(CredentialBundle {
            filename: format!("{derived_name}.ovpn"),
            bytes: Vec::new(),
        })
    }

    async fn revoke(&self, _client_name: &str) -> Result<(), ExecutorError> {
        Ok(())
    }
}

#[tokio::test]
async fn same_name_operations_are_serialized() {
    let executor = Arc::new(GatedExecutor {
        started: tokio::sync::Notify::new(),
        release: tokio::sync::Notify::new(),
    });
    let store = ClientStore::connect("sqlite::memory:", true).await.unwrap();
    let dispatcher = Arc::new(Dispatcher::new(
        roster(),
        store,
        Arc::clone(&executor) as Arc<dyn LifecycleExecutor>,
    ));

    // Both admins ask to create the same base name on the same day.
    expect_text(dispatcher.handle(ALICE, Event::Create).await);
    expect_text(dispatcher.handle(BOB, Event::Create).await);

    let first = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.handle(ALICE, Event::Text("shared".to_string())).await })
    };
    executor.started.notified().await;

    // Second caller is turned away while the first operation is in flight.
    let response = expect_text(
        dispatcher
            .handle(BOB, Event::Text("shared".to_string()))
            .await,
    );
    assert!(response.contains("already running"));

    executor.release.notify_one();
    let response = first.await.unwrap();
    assert!(matches!(response, Response::Document { .. }));
}
