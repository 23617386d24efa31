//! Scenario recorder: intercepts submissions while recording and collects
//! one log entry per confirmed call, in confirmation order.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ethereum_types::{Address, H256};
use indexmap::IndexMap;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::abi::{Abi, ContractInterface};
use crate::config::RecorderConfig;
use crate::error::{RecorderError, RpcError, UsageError};
use crate::extractor::StateExtractor;
use crate::provider::{ChainReader, Interception, Submit, SubmitEntrypoint};
use crate::record::{LogEntry, RecordedScenario};
use crate::registry::AddressRegistry;
use crate::resolver::EffectResolver;
use crate::types::{PendingCall, TransactionRequest};

/// A contract or token the scenario decodes calls and events for.
#[derive(Clone)]
pub struct TrackedContract {
    pub address: Address,
    pub interface: Arc<dyn ContractInterface>,
}

/// What a scenario tracks. Registration order is significant: it drives
/// holder order in balance snapshots and the event attribution tie-break.
#[derive(Clone, Default)]
pub struct ScenarioConfig {
    /// Display name; defaults to the test's title path.
    pub name: Option<String>,
    pub accounts: IndexMap<String, Address>,
    pub contracts: IndexMap<String, TrackedContract>,
    pub tokens: IndexMap<String, TrackedContract>,
    pub extractors: IndexMap<String, Arc<dyn StateExtractor>>,
}

impl ScenarioConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn account(mut self, name: impl Into<String>, address: Address) -> Self {
        self.accounts.insert(name.into(), address);
        self
    }

    pub fn contract(
        mut self,
        name: impl Into<String>,
        address: Address,
        interface: Arc<dyn ContractInterface>,
    ) -> Self {
        self.contracts
            .insert(name.into(), TrackedContract { address, interface });
        self
    }

    pub fn token(
        mut self,
        name: impl Into<String>,
        address: Address,
        interface: Arc<dyn ContractInterface>,
    ) -> Self {
        self.tokens
            .insert(name.into(), TrackedContract { address, interface });
        self
    }

    /// Track a token with the standard ERC-20 interface.
    pub fn erc20(self, name: impl Into<String>, address: Address) -> Self {
        self.token(name, address, Arc::new(Abi::erc20()))
    }

    pub fn extractor(mut self, name: impl Into<String>, extractor: impl StateExtractor + 'static) -> Self {
        self.extractors.insert(name.into(), Arc::new(extractor));
        self
    }

    fn registry(&self) -> AddressRegistry {
        AddressRegistry::new(
            self.accounts.iter().map(|(n, a)| (n.as_str(), *a)),
            self.contracts.iter().map(|(n, c)| (n.as_str(), c.address)),
            self.tokens.iter().map(|(n, t)| (n.as_str(), t.address)),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioState {
    Idle,
    Recording,
    Finalizing,
    Closed,
}

/// Shared between the scenario, its submit decorator and resolution tasks.
struct Recording {
    resolver: EffectResolver,
    entries: Mutex<Vec<LogEntry>>,
    tasks: Mutex<JoinSet<Result<(), RecorderError>>>,
    /// Cleared once the interception is removed; later sends pass through unrecorded.
    accepting: AtomicBool,
    sends_in_flight: AtomicUsize,
    sends_done: Notify,
}

impl Recording {
    fn spawn_resolution(self: &Arc<Self>, call: PendingCall) {
        let recording = Arc::clone(self);
        let mut tasks = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
        tasks.spawn(async move {
            if let Some(entry) = recording.resolver.resolve(call).await? {
                recording
                    .entries
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .push(entry);
            }
            Ok(())
        });
    }

    /// Wait until no send is between the node and the decorator.
    async fn sends_settled(&self) {
        loop {
            let notified = self.sends_done.notified();
            if self.sends_in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Await every spawned resolution, reporting the first failure.
    async fn drain(&self) -> Result<(), RecorderError> {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|p| p.into_inner()));
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(|e| RecorderError::Task(e.to_string())).and_then(|r| r);
            if let Err(err) = outcome {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn take_entries(&self) -> Vec<LogEntry> {
        std::mem::take(&mut *self.entries.lock().unwrap_or_else(|p| p.into_inner()))
    }
}

struct SendGuard<'a>(&'a Recording);

impl<'a> SendGuard<'a> {
    fn enter(recording: &'a Recording) -> Self {
        recording.sends_in_flight.fetch_add(1, Ordering::SeqCst);
        Self(recording)
    }
}

impl Drop for SendGuard<'_> {
    fn drop(&mut self) {
        if self.0.sends_in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.sends_done.notify_waiters();
        }
    }
}

/// Decorator installed on the entrypoint while a scenario records.
///
/// The wrapped submission runs untouched and its result is returned as-is;
/// a successful send additionally schedules resolution of the call.
struct RecordingSubmit {
    original: Arc<dyn Submit>,
    recording: Arc<Recording>,
}

#[async_trait]
impl Submit for RecordingSubmit {
    async fn send_transaction(&self, request: TransactionRequest) -> Result<H256, RpcError> {
        let _guard = SendGuard::enter(&self.recording);
        if !self.recording.accepting.load(Ordering::SeqCst) {
            return self.original.send_transaction(request).await;
        }
        let hash = self.original.send_transaction(request.clone()).await?;
        debug!(tx_hash = %format!("0x{hash:x}"), "intercepted call");
        self.recording
            .spawn_resolution(PendingCall::new(hash, &request));
        Ok(hash)
    }
}

pub struct Scenario {
    name: String,
    config: Arc<ScenarioConfig>,
    settings: RecorderConfig,
    entrypoint: Arc<SubmitEntrypoint>,
    reader: Arc<dyn ChainReader>,
    state: ScenarioState,
    recording: Option<Arc<Recording>>,
    interception: Option<Interception>,
}

impl Scenario {
    pub fn new(
        name: impl Into<String>,
        config: ScenarioConfig,
        settings: RecorderConfig,
        entrypoint: Arc<SubmitEntrypoint>,
        reader: Arc<dyn ChainReader>,
    ) -> Self {
        Self {
            name: name.into(),
            config: Arc::new(config),
            settings,
            entrypoint,
            reader,
            state: ScenarioState::Idle,
            recording: None,
            interception: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ScenarioState {
        self.state
    }

    /// Entries resolved so far.
    pub fn entry_count(&self) -> usize {
        self.recording.as_ref().map_or(0, |r| {
            r.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
        })
    }

    /// Begin recording. Starting a recording scenario again does nothing.
    pub async fn start(&mut self) -> Result<(), RecorderError> {
        match self.state {
            ScenarioState::Idle => {}
            ScenarioState::Recording => return Ok(()),
            ScenarioState::Finalizing | ScenarioState::Closed => {
                return Err(UsageError::AlreadyClosed {
                    scenario: self.name.clone(),
                }
                .into());
            }
        }

        let resolver = EffectResolver::new(
            Arc::clone(&self.reader),
            Arc::new(self.config.registry()),
            Arc::clone(&self.config),
            self.settings.missing_receipt,
        );
        let mut entries = Vec::new();
        if self.settings.record_initial_state {
            entries.push(resolver.initial_state().await?);
        }
        let recording = Arc::new(Recording {
            resolver,
            entries: Mutex::new(entries),
            tasks: Mutex::new(JoinSet::new()),
            accepting: AtomicBool::new(true),
            sends_in_flight: AtomicUsize::new(0),
            sends_done: Notify::new(),
        });

        let shared = Arc::clone(&recording);
        self.interception = Some(self.entrypoint.install(&self.name, move |original| {
            Arc::new(RecordingSubmit {
                original,
                recording: shared,
            })
        }));
        self.recording = Some(recording);
        self.state = ScenarioState::Recording;
        info!(scenario = %self.name, "Scenario recording started");
        Ok(())
    }

    /// Stop recording and return the finished log.
    ///
    /// Puts the original submitter back, then waits for every call already
    /// intercepted to resolve. Any resolution failure fails the whole
    /// scenario; the scenario is closed either way.
    pub async fn end(&mut self) -> Result<RecordedScenario, RecorderError> {
        match self.state {
            ScenarioState::Recording => {}
            ScenarioState::Idle => {
                return Err(UsageError::NotStarted {
                    scenario: self.name.clone(),
                }
                .into());
            }
            ScenarioState::Finalizing | ScenarioState::Closed => {
                return Err(UsageError::AlreadyClosed {
                    scenario: self.name.clone(),
                }
                .into());
            }
        }
        let (Some(recording), Some(interception)) = (self.recording.clone(), &self.interception)
        else {
            return Err(UsageError::NotStarted {
                scenario: self.name.clone(),
            }
            .into());
        };

        self.entrypoint.restore(interception)?;
        self.interception = None;
        self.state = ScenarioState::Finalizing;

        recording.accepting.store(false, Ordering::SeqCst);
        recording.sends_settled().await;
        let drained = recording.drain().await;
        self.state = ScenarioState::Closed;
        drained?;

        let entries = recording.take_entries();
        let token_decimals = recording.resolver.token_decimals().await;
        info!(
            scenario = %self.name,
            entries = entries.len(),
            "Scenario recording finished"
        );
        Ok(RecordedScenario {
            name: self.name.clone(),
            entries,
            tokens: self.config.tokens.keys().cloned().collect(),
            token_decimals,
        })
    }
}

/// A scenario dropped while recording (a panicking test, say) stops
/// recording and unwinds its interception if it is still the innermost one.
impl Drop for Scenario {
    fn drop(&mut self) {
        if let Some(recording) = &self.recording {
            recording.accepting.store(false, Ordering::SeqCst);
            recording
                .tasks
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .abort_all();
        }
        if let Some(interception) = self.interception.take() {
            if let Err(err) = self.entrypoint.restore(&interception) {
                warn!(
                    scenario = %self.name,
                    error = %err,
                    "Scenario dropped while recording; its decorator stays installed and passes calls through"
                );
            } else {
                debug!(scenario = %self.name, "Scenario dropped while recording, interception removed");
            }
        }
    }
}
