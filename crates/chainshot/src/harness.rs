//! Test-framework adapter: scenario state keyed by test identity, and the
//! per-file narrative written once a test file is done.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::RecorderConfig;
use crate::error::{RecorderError, UsageError};
use crate::narrative::{TestNarrative, human_snapshot_path, render_markdown, write_human_snapshot};
use crate::provider::{ChainReader, SubmitEntrypoint};
use crate::record::RecordedScenario;
use crate::scenario::{Scenario, ScenarioConfig};

/// Identity of the test currently running.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestContext {
    /// Stable, unique per test.
    pub id: String,
    /// Enclosing group titles followed by the test's own title.
    pub titles: Vec<String>,
    /// Source file the test lives in.
    pub file: PathBuf,
}

impl TestContext {
    pub fn new(id: impl Into<String>, titles: &[&str], file: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            titles: titles.iter().map(|t| t.to_string()).collect(),
            file: file.into(),
        }
    }

    /// Title path, e.g. `vault > deposits > first deposit`.
    pub fn full_title(&self) -> String {
        self.titles.join(" > ")
    }
}

struct ActiveScenario {
    context: TestContext,
    scenario: Scenario,
}

/// Owns every scenario of a test run.
pub struct ScenarioHarness {
    entrypoint: Arc<SubmitEntrypoint>,
    reader: Arc<dyn ChainReader>,
    settings: RecorderConfig,
    active: Mutex<HashMap<String, ActiveScenario>>,
    finished: Mutex<IndexMap<PathBuf, Vec<TestNarrative>>>,
}

impl ScenarioHarness {
    pub fn new(
        entrypoint: Arc<SubmitEntrypoint>,
        reader: Arc<dyn ChainReader>,
        settings: RecorderConfig,
    ) -> Self {
        Self {
            entrypoint,
            reader,
            settings,
            active: Mutex::new(HashMap::new()),
            finished: Mutex::new(IndexMap::new()),
        }
    }

    pub fn entrypoint(&self) -> &Arc<SubmitEntrypoint> {
        &self.entrypoint
    }

    /// Start recording for `ctx`. A second call for the same test is a no-op.
    pub async fn start_scenario(
        &self,
        ctx: &TestContext,
        config: ScenarioConfig,
    ) -> Result<(), RecorderError> {
        let mut active = self.active.lock().await;
        if active.contains_key(&ctx.id) {
            return Ok(());
        }
        let name = config.name.clone().unwrap_or_else(|| ctx.full_title());
        let mut scenario = Scenario::new(
            name,
            config,
            self.settings.clone(),
            Arc::clone(&self.entrypoint),
            Arc::clone(&self.reader),
        );
        scenario.start().await?;
        active.insert(
            ctx.id.clone(),
            ActiveScenario {
                context: ctx.clone(),
                scenario,
            },
        );
        Ok(())
    }

    /// Finish the scenario of `ctx` and queue it for the file's narrative.
    ///
    /// The scenario is removed before it is finalized, so ending it twice
    /// reports `NotStarted` the second time and nothing is queued twice.
    pub async fn end_scenario(&self, ctx: &TestContext) -> Result<RecordedScenario, RecorderError> {
        let Some(mut active) = self.active.lock().await.remove(&ctx.id) else {
            return Err(UsageError::NotStarted {
                scenario: ctx.full_title(),
            }
            .into());
        };
        let recorded = active.scenario.end().await?;
        self.finished
            .lock()
            .await
            .entry(active.context.file.clone())
            .or_default()
            .push(TestNarrative {
                test_title: active.context.full_title(),
                scenario: recorded.clone(),
            });
        Ok(recorded)
    }

    /// Whether a scenario is currently recording for `ctx`.
    pub async fn is_recording(&self, ctx: &TestContext) -> bool {
        self.active.lock().await.contains_key(&ctx.id)
    }

    /// Write the human snapshot of `test_file`.
    ///
    /// Fails while any scenario of that file is still recording. Returns the
    /// written path, or `None` when the file recorded nothing.
    pub async fn finish(&self, test_file: &Path) -> Result<Option<PathBuf>, RecorderError> {
        let mut running: Vec<String> = self
            .active
            .lock()
            .await
            .values()
            .filter(|a| a.context.file == test_file)
            .map(|a| a.scenario.name().to_string())
            .collect();
        if !running.is_empty() {
            running.sort();
            return Err(UsageError::StillRunning(running).into());
        }

        let Some(narratives) = self.finished.lock().await.shift_remove(test_file) else {
            return Ok(None);
        };
        let path = human_snapshot_path(test_file, &self.settings.human_snapshots_dir);
        let title = test_file
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        write_human_snapshot(&path, &render_markdown(&title, &narratives))?;
        info!(path = %path.display(), scenarios = narratives.len(), "Wrote human snapshot");
        Ok(Some(path))
    }
}
