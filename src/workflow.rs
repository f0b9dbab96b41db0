//! Workflow state machine: drives the create/delete conversation cycles.
//!
//! Every entry point checks the authorization gate first; an unauthorized
//! caller gets a fixed denial and nothing else happens. Conversation state
//! is an explicit per-caller value in a session table, not something hidden
//! in a framework.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::Local;
use tracing::{info, warn};

use crate::auth::{AdminRoster, Visibility};
use crate::executor::{self, ExecutorError, LifecycleExecutor};
use crate::store::{ClientRecord, ClientStore, StoreError};

const DENIED: &str = "🚫 Unauthorized access.";
const CREATE_PROMPT: &str = "Please enter a name for the new client:";
const DELETE_PROMPT: &str = "Please enter the name of the client you want to delete:";
const IDLE_NUDGE: &str = "Use the menu to choose an action first.";
const NO_CLIENTS: &str = "📂 No clients found.";
const UNKNOWN_ADMIN: &str = "Unknown Admin";

/// Inbound action events from the transport, caller id supplied at dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Show the action menu.
    Start,
    /// "Create client" button.
    Create,
    /// "Delete client" button.
    Delete,
    /// "List clients" button.
    List,
    /// Free-text message, fulfills a pending name prompt.
    Text(String),
}

/// Outbound responses for the transport to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Text(String),
    Menu,
    Listing(String),
    Document { filename: String, bytes: Vec<u8> },
}

/// Per-caller conversation state. Absent from the session table means idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum SessionState {
    #[default]
    Idle,
    AwaitingCreateName,
    AwaitingDeleteName,
}

pub struct Dispatcher {
    roster: AdminRoster,
    store: ClientStore,
    executor: Arc<dyn LifecycleExecutor>,
    sessions: Mutex<HashMap<i64, SessionState>>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

/// Holds a client name exclusively while a create/revoke runs, so two
/// concurrent operations on the same name never race the script.
struct NameClaim {
    names: Arc<Mutex<HashSet<String>>>,
    name: String,
}

impl NameClaim {
    fn acquire(names: &Arc<Mutex<HashSet<String>>>, name: &str) -> Option<Self> {
        let mut guard = names.lock().unwrap();
        if !guard.insert(name.to_string()) {
            return None;
        }
        Some(Self {
            names: Arc::clone(names),
            name: name.to_string(),
        })
    }
}

impl Drop for NameClaim {
    fn drop(&mut self) {
        self.names.lock().unwrap().remove(&self.name);
    }
}

impl Dispatcher {
    pub fn new(roster: AdminRoster, store: ClientStore, executor: Arc<dyn LifecycleExecutor>) -> Self {
        Self {
            roster,
            store,
            executor,
            sessions: Mutex::new(HashMap::new()),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Dispatch one inbound event for one caller.
    pub async fn handle(&self, caller_id: i64, event: Event) -> Response {
        if !self.roster.is_authorized(caller_id) {
            warn!(caller_id, "denied unauthorized caller");
            return Response::Text(DENIED.to_string());
        }

        match event {
            Event::Start => {
                self.set_state(caller_id, SessionState::Idle);
                Response::Menu
            }
            Event::Create => {
                self.set_state(caller_id, SessionState::AwaitingCreateName);
                Response::Text(CREATE_PROMPT.to_string())
            }
            Event::Delete => {
                self.set_state(caller_id, SessionState::AwaitingDeleteName);
                Response::Text(DELETE_PROMPT.to_string())
            }
            Event::List => self.render_listing(caller_id).await,
            Event::Text(text) => match self.state(caller_id) {
                SessionState::Idle => Response::Text(IDLE_NUDGE.to_string()),
                SessionState::AwaitingCreateName => self.finish_create(caller_id, &text).await,
                SessionState::AwaitingDeleteName => self.finish_delete(caller_id, &text).await,
            },
        }
    }

    fn state(&self, caller_id: i64) -> SessionState {
        self.sessions
            .lock()
            .unwrap()
            .get(&caller_id)
            .copied()
            .unwrap_or_default()
    }

    fn set_state(&self, caller_id: i64, state: SessionState) {
        let mut sessions = self.sessions.lock().unwrap();
        if state == SessionState::Idle {
            sessions.remove(&caller_id);
        } else {
            sessions.insert(caller_id, state);
        }
    }

    /// Fulfil a pending create prompt. Validation failures and duplicate
    /// names keep the prompt open for a retry; anything else ends the cycle.
    async fn finish_create(&self, caller_id: i64, text: &str) -> Response {
        let base = text.trim();
        if executor::validate_base_name(base).is_err() {
            return Response::Text(
                "⚠️ Invalid username format. Use only alphanumeric characters, underscores, or dashes."
                    .to_string(),
            );
        }

        let derived = executor::derive_client_name(base, Local::now().date_naive());

        let _claim = match NameClaim::acquire(&self.in_flight, &derived) {
            Some(claim) => claim,
            None => {
                return Response::Text(format!(
                    "⏳ An operation for `{derived}` is already running. Try again shortly."
                ))
            }
        };

        match self.executor.create(&derived).await {
            Ok(bundle) => {
                match self.store.add(&derived, caller_id).await {
                    Ok(()) => {}
                    Err(StoreError::AlreadyExists(_)) => {
                        // Certificate was issued anyway; keep the existing row.
                        warn!(name = %derived, "record already present after create");
                    }
                    Err(e) => {
                        self.set_state(caller_id, SessionState::Idle);
                        return Response::Text(format!(
                            "⚠️ Certificate issued but recording ownership failed: {e}"
                        ));
                    }
                }
                self.set_state(caller_id, SessionState::Idle);
                info!(caller_id, name = %derived, "client created");
                Response::Document {
                    filename: bundle.filename,
                    bytes: bundle.bytes,
                }
            }
            Err(ExecutorError::DuplicateName) => Response::Text(
                "❗ Client name already exists. Please choose another name.".to_string(),
            ),
            Err(ExecutorError::InvalidName) => Response::Text(
                "⚠️ Invalid username format. Use only alphanumeric characters, underscores, or dashes."
                    .to_string(),
            ),
            Err(ExecutorError::UnexpectedFailure(diag)) => {
                self.set_state(caller_id, SessionState::Idle);
                warn!(caller_id, name = %derived, error = %diag, "create failed");
                Response::Text(format!("⚠️ An unexpected error occurred: {diag}"))
            }
        }
    }

    /// Fulfil a pending delete prompt. Revoke failures always terminate the
    /// cycle with a single error message.
    async fn finish_delete(&self, caller_id: i64, text: &str) -> Response {
        let name = text.trim().to_string();

        let _claim = match NameClaim::acquire(&self.in_flight, &name) {
            Some(claim) => claim,
            None => {
                return Response::Text(format!(
                    "⏳ An operation for `{name}` is already running. Try again shortly."
                ))
            }
        };

        self.set_state(caller_id, SessionState::Idle);

        match self.executor.revoke(&name).await {
            Ok(()) => {
                match self.store.remove(&name).await {
                    Ok(()) => {}
                    // Revoked but never recorded here; nothing to clean up.
                    Err(StoreError::NotFound(_)) => {}
                    Err(e) => warn!(name = %name, error = %e, "record removal failed after revoke"),
                }
                info!(caller_id, name = %name, "client deleted");
                Response::Text(format!("✅ Client `{name}` has been deleted."))
            }
            Err(e) => {
                warn!(caller_id, name = %name, error = %e, "revoke failed");
                Response::Text(format!("⚠️ Error occurred while deleting client:\n{e}"))
            }
        }
    }

    /// Immediate listing response; no state transition.
    async fn render_listing(&self, caller_id: i64) -> Response {
        let result = match self.roster.visibility(caller_id) {
            Visibility::All => self.store.list(None).await,
            Visibility::OwnedOnly => self.store.list(Some(caller_id)).await,
        };

        let records = match result {
            Ok(records) => records,
            Err(e) => {
                warn!(caller_id, error = %e, "listing failed");
                return Response::Text(format!("⚠️ Could not read the client list: {e}"));
            }
        };

        let body = match self.roster.visibility(caller_id) {
            Visibility::All => render_grouped(&records, &self.roster),
            Visibility::OwnedOnly => render_flat(&records),
        };

        Response::Listing(format!("📋 *Client List:*\n\n{body}"))
    }
}

/// Superadmin view: rows grouped by owner in first-appearance order, each
/// group headed by the admin display name and numbered within the group.
fn render_grouped(records: &[ClientRecord], roster: &AdminRoster) -> String {
    if records.is_empty() {
        return NO_CLIENTS.to_string();
    }

    let mut owners: Vec<i64> = Vec::new();
    let mut grouped: HashMap<i64, Vec<&str>> = HashMap::new();
    for record in records {
        if !grouped.contains_key(&record.owner_id) {
            owners.push(record.owner_id);
        }
        grouped.entry(record.owner_id).or_default().push(&record.name);
    }

    let mut sections = Vec::new();
    for owner in owners {
        let admin_name = roster.display_name(owner).unwrap_or(UNKNOWN_ADMIN);
        let mut lines = vec![format!("👤 *{admin_name}*\n")];
        for (i, name) in grouped[&owner].iter().enumerate() {
            lines.push(format!("{}. `{name}`", i + 1));
        }
        sections.push(lines.join("\n"));
    }
    sections.join("\n\n- - -\n\n")
}

/// Regular admin view: flat numbered list of the caller's own clients.
fn render_flat(records: &[ClientRecord]) -> String {
    if records.is_empty() {
        return NO_CLIENTS.to_string();
    }
    records
        .iter()
        .enumerate()
        .map(|(i, record)| format!("{}. `{}`", i + 1, record.name))
        .collect::<Vec<_>>()
        .join("\n")
}
