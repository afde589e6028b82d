//! Workflow status model and its transition rules.
//!
//! A [`WorkflowStatus`] is the canonical progress snapshot of one session's
//! prospecting job: a coarse [`WorkflowStage`] plus an ordered list of
//! [`SubStep`]s. Every mutation goes through [`WorkflowStatus::apply`] or
//! [`SubStep::apply`], which enforce the state machines below and reject
//! anything that would move backwards.
//!
//! ```text
//! stage:   idle -> searching -> {analyzing|filtering|enriching|scoring}* -> {complete|error}
//! substep: pending -> in-progress -> {completed|error}
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::plan::PHASE_COUNT;
use crate::types::{SessionId, Timestamp};

/// Upper bound for every progress percentage.
pub const MAX_PROGRESS: u8 = 100;

/// Progress reported when a new search is started.
pub const SEARCH_STARTED_PROGRESS: u8 = 10;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Coarse stage of a session's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStage {
    Idle,
    Searching,
    Analyzing,
    Filtering,
    Enriching,
    Scoring,
    Complete,
    Error,
}

impl WorkflowStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Searching => "searching",
            Self::Analyzing => "analyzing",
            Self::Filtering => "filtering",
            Self::Enriching => "enriching",
            Self::Scoring => "scoring",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    /// `complete` and `error` end the job; nothing may follow them.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    /// Stages a running job may move between freely after `searching`.
    fn is_processing(self) -> bool {
        matches!(
            self,
            Self::Analyzing | Self::Filtering | Self::Enriching | Self::Scoring
        )
    }

    /// 1-based pipeline phase this stage corresponds to, if any.
    pub fn phase(self) -> Option<u32> {
        match self {
            Self::Searching => Some(1),
            Self::Analyzing => Some(2),
            Self::Filtering => Some(3),
            Self::Enriching => Some(4),
            Self::Scoring => Some(5),
            Self::Idle | Self::Complete | Self::Error => None,
        }
    }

    /// Whether moving from `self` to `next` is a legal stage change.
    ///
    /// Staying on the same non-terminal stage is allowed so a job can post
    /// progress without changing stage.
    pub fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        if self == next || next == Self::Error {
            return true;
        }
        match self {
            Self::Idle => next == Self::Searching,
            _ => next.is_processing() || next == Self::Complete,
        }
    }
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "searching" => Ok(Self::Searching),
            "analyzing" => Ok(Self::Analyzing),
            "filtering" => Ok(Self::Filtering),
            "enriching" => Ok(Self::Enriching),
            "scoring" => Ok(Self::Scoring),
            "complete" => Ok(Self::Complete),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown workflow stage '{other}'")),
        }
    }
}

/// Lifecycle of a single substep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubStepStatus {
    Pending,
    InProgress,
    Completed,
    Error,
}

impl SubStepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::InProgress => 1,
            Self::Completed | Self::Error => 2,
        }
    }

    /// Forward-only: a terminal status accepts nothing, otherwise the next
    /// status must not rank below the current one.
    pub fn can_transition_to(self, next: Self) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }
}

impl fmt::Display for SubStepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubStepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in-progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown substep status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Transition errors
// ---------------------------------------------------------------------------

/// A rejected mutation. The snapshot is left untouched when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("workflow is already {stage}; no further updates are accepted")]
    TerminalStage { stage: WorkflowStage },

    #[error("invalid stage transition {from} -> {to}")]
    InvalidStage {
        from: WorkflowStage,
        to: WorkflowStage,
    },

    #[error("substep {step_id} is already {status}")]
    TerminalSubstep {
        step_id: String,
        status: SubStepStatus,
    },

    #[error("invalid substep transition for {step_id}: {from} -> {to}")]
    InvalidSubstep {
        step_id: String,
        from: SubStepStatus,
        to: SubStepStatus,
    },
}

// ---------------------------------------------------------------------------
// SubStep
// ---------------------------------------------------------------------------

/// Smallest unit of progress within a pipeline phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubStep {
    /// `"<phase>.<index>"`, e.g. `"2.3"`.
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: SubStepStatus,
    pub category: String,
    pub priority: Priority,
    pub tools: Vec<String>,
    pub message: Option<String>,
    pub progress: Option<u8>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl SubStep {
    /// A fresh `pending` substep.
    pub fn pending(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
        priority: Priority,
        tools: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            status: SubStepStatus::Pending,
            category: category.into(),
            priority,
            tools,
            message: None,
            progress: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Substep created on demand for an id the plan does not know about.
    pub fn placeholder(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::pending(id.clone(), id, "", "general", Priority::Medium, Vec::new())
    }

    /// Apply a partial update, enforcing forward-only status transitions.
    ///
    /// Entering `in-progress` stamps `started_at`; entering a terminal status
    /// stamps `completed_at`. `completed` without an explicit progress
    /// reports 100.
    pub fn apply(&mut self, update: &SubStepUpdate, now: Timestamp) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::TerminalSubstep {
                step_id: self.id.clone(),
                status: self.status,
            });
        }
        if let Some(next) = update.status {
            if !self.status.can_transition_to(next) {
                return Err(TransitionError::InvalidSubstep {
                    step_id: self.id.clone(),
                    from: self.status,
                    to: next,
                });
            }
        }

        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(description) = &update.description {
            self.description = description.clone();
        }
        if let Some(category) = &update.category {
            self.category = category.clone();
        }
        if let Some(priority) = update.priority {
            self.priority = priority;
        }
        if let Some(tools) = &update.tools {
            self.tools = tools.clone();
        }
        if let Some(message) = &update.message {
            self.message = Some(message.clone());
        }
        if let Some(progress) = update.progress {
            self.progress = Some(progress.min(MAX_PROGRESS));
        }

        if let Some(next) = update.status {
            self.status = next;
            match next {
                SubStepStatus::InProgress => {
                    self.started_at.get_or_insert(now);
                }
                SubStepStatus::Completed | SubStepStatus::Error => {
                    self.started_at.get_or_insert(now);
                    self.completed_at = Some(now);
                    if next == SubStepStatus::Completed && update.progress.is_none() {
                        self.progress = Some(MAX_PROGRESS);
                    }
                }
                SubStepStatus::Pending => {}
            }
        }
        Ok(())
    }
}

/// Partial update for a [`SubStep`]. `None` fields are left unchanged.
///
/// Also the payload of the `workflow-substep` broadcast, so absent fields
/// are omitted from the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubStepUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SubStepStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

impl SubStepUpdate {
    pub fn status(status: SubStepStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Sort key for `"<phase>.<index>"` ids. Malformed ids sort last.
pub fn step_order_key(id: &str) -> (u32, u32) {
    let mut parts = id.splitn(2, '.');
    let phase = parts.next().and_then(|p| p.parse().ok());
    let index = parts.next().and_then(|p| p.parse().ok());
    match (phase, index) {
        (Some(phase), Some(index)) => (phase, index),
        _ => (u32::MAX, u32::MAX),
    }
}

// ---------------------------------------------------------------------------
// WorkflowStatus
// ---------------------------------------------------------------------------

/// Progress snapshot for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatus {
    pub session_id: SessionId,
    pub stage: WorkflowStage,
    pub message: String,
    pub progress: u8,
    pub current_step: u32,
    pub total_steps: u32,
    pub substeps: Vec<SubStep>,
    pub updated_at: Timestamp,
}

impl WorkflowStatus {
    /// Default snapshot for a session no job has touched yet.
    pub fn idle(session_id: impl Into<SessionId>) -> Self {
        Self {
            session_id: session_id.into(),
            stage: WorkflowStage::Idle,
            message: "Waiting for a search to start".to_string(),
            progress: 0,
            current_step: 0,
            total_steps: PHASE_COUNT,
            substeps: Vec::new(),
            updated_at: chrono::Utc::now(),
        }
    }

    /// Snapshot for a freshly started search. Replaces whatever came before.
    pub fn started(
        session_id: impl Into<SessionId>,
        query: &str,
        substeps: Vec<SubStep>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            stage: WorkflowStage::Searching,
            message: format!("Searching for companies matching \"{query}\""),
            progress: SEARCH_STARTED_PROGRESS,
            current_step: 1,
            total_steps: PHASE_COUNT,
            substeps,
            updated_at: chrono::Utc::now(),
        }
    }

    /// Merge a partial update into the snapshot.
    ///
    /// A stage change without an explicit `current_step` moves
    /// `current_step` to the stage's phase. Progress is clamped to 100.
    pub fn apply(&mut self, update: &StatusUpdate, now: Timestamp) -> Result<(), TransitionError> {
        if self.stage.is_terminal() {
            return Err(TransitionError::TerminalStage { stage: self.stage });
        }
        if let Some(next) = update.stage {
            if !self.stage.can_transition_to(next) {
                return Err(TransitionError::InvalidStage {
                    from: self.stage,
                    to: next,
                });
            }
            self.stage = next;
            if update.current_step.is_none() {
                if let Some(phase) = next.phase() {
                    self.current_step = phase;
                }
            }
        }
        if let Some(message) = &update.message {
            self.message = message.clone();
        }
        if let Some(progress) = update.progress {
            self.progress = progress.min(MAX_PROGRESS);
        }
        if let Some(current_step) = update.current_step {
            self.current_step = current_step;
        }
        if let Some(total_steps) = update.total_steps {
            self.total_steps = total_steps;
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn substep(&self, id: &str) -> Option<&SubStep> {
        self.substeps.iter().find(|s| s.id == id)
    }

    /// Find a substep by id, inserting a placeholder in id order if absent.
    pub fn substep_mut_or_insert(&mut self, id: &str) -> &mut SubStep {
        if let Some(pos) = self.substeps.iter().position(|s| s.id == id) {
            return &mut self.substeps[pos];
        }
        let key = step_order_key(id);
        let pos = self
            .substeps
            .partition_point(|s| step_order_key(&s.id) <= key);
        self.substeps.insert(pos, SubStep::placeholder(id));
        &mut self.substeps[pos]
    }

    /// Replace the substep with the same id, or insert it in id order.
    pub fn upsert_substep(&mut self, substep: SubStep) {
        let slot = self.substep_mut_or_insert(&substep.id);
        *slot = substep;
    }

    /// Move every listed, non-terminal substep to `error`.
    ///
    /// Unknown ids are created so the failure is still visible. Substeps
    /// that already finished keep their status. Returns how many changed.
    pub fn fail_substeps(&mut self, ids: &[String], message: &str, now: Timestamp) -> usize {
        let update = SubStepUpdate::status(SubStepStatus::Error).with_message(message);
        let mut changed = 0;
        for id in ids {
            if self.substep_mut_or_insert(id).apply(&update, now).is_ok() {
                changed += 1;
            }
        }
        if changed > 0 {
            self.updated_at = now;
        }
        changed
    }

    /// Ids of every substep that has not reached a terminal status.
    pub fn open_substep_ids(&self) -> Vec<String> {
        self.substeps
            .iter()
            .filter(|s| !s.status.is_terminal())
            .map(|s| s.id.clone())
            .collect()
    }
}

/// Partial update for a [`WorkflowStatus`]. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub stage: Option<WorkflowStage>,
    pub message: Option<String>,
    pub progress: Option<u8>,
    pub current_step: Option<u32>,
    pub total_steps: Option<u32>,
}

impl StatusUpdate {
    pub fn stage(stage: WorkflowStage) -> Self {
        Self {
            stage: Some(stage),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
