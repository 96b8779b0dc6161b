//! Path state machine: classifies human intent and gates timeline writes.
//!
//! Every session runs one of exactly four interaction modes. A mode decides
//! which operations are legal and whether anything done in it may ever be
//! promoted to the timeline. Promotion always requires explicit human
//! validation; no mode can write without it.

use crate::core::error::RudderError;
use crate::core::time;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// The four interaction modes. The set is fixed at four; collaborators that
/// need finer intent distinctions must layer them on top, not grow this enum.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PathMode {
    Resume,
    NewObjective,
    Exploration,
    Decision,
}

impl PathMode {
    pub const ALL: [PathMode; 4] = [
        PathMode::Resume,
        PathMode::NewObjective,
        PathMode::Exploration,
        PathMode::Decision,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PathMode::Resume => "resume",
            PathMode::NewObjective => "new-objective",
            PathMode::Exploration => "exploration",
            PathMode::Decision => "decision",
        }
    }

    pub fn from_mode_str(s: &str) -> Option<PathMode> {
        match s {
            "resume" => Some(PathMode::Resume),
            "new-objective" => Some(PathMode::NewObjective),
            "exploration" => Some(PathMode::Exploration),
            "decision" => Some(PathMode::Decision),
            _ => None,
        }
    }

    /// Fixed per-mode contract. This is the single source of truth for what
    /// each mode allows; illegal mode/operation pairs never compile into a
    /// step because `execute_option` consults this table first.
    pub fn profile(&self) -> ModeProfile {
        match self {
            PathMode::Resume => ModeProfile {
                intention: "I'm picking up where I left off",
                allowed: &[
                    OperationId::Continue,
                    OperationId::SwitchPreset,
                    OperationId::SwitchSphere,
                ],
                forbidden: &[OperationId::NewDecision, OperationId::IntrusiveSuggestion],
                can_write_timeline: false,
                requires_validation: false,
            },
            PathMode::NewObjective => ModeProfile {
                intention: "I'm starting something",
                allowed: &[
                    OperationId::ChooseSphere,
                    OperationId::ChoosePreset,
                    OperationId::EstimateDuration,
                ],
                forbidden: &[OperationId::ImplicitCreation, OperationId::AutomaticWrite],
                can_write_timeline: true,
                requires_validation: true,
            },
            PathMode::Exploration => ModeProfile {
                intention: "I'm thinking / discovering",
                allowed: &[
                    OperationId::TakeNotes,
                    OperationId::SwitchFocus,
                    OperationId::MarkIdea,
                ],
                forbidden: &[],
                can_write_timeline: false,
                requires_validation: false,
            },
            PathMode::Decision => ModeProfile {
                intention: "I'm committing to a choice",
                allowed: &[
                    OperationId::ViewContext,
                    OperationId::RequestAnalysis,
                    OperationId::CompareOptions,
                    OperationId::PrepareDecision,
                ],
                forbidden: &[OperationId::SuppressDecision],
                can_write_timeline: true,
                requires_validation: true,
            },
        }
    }
}

/// Per-mode contract: intention phrase, operation legality, write gating.
#[derive(Clone, Copy, Debug)]
pub struct ModeProfile {
    pub intention: &'static str,
    pub allowed: &'static [OperationId],
    pub forbidden: &'static [OperationId],
    pub can_write_timeline: bool,
    pub requires_validation: bool,
}

/// Closed set of operation identifiers.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum OperationId {
    Continue,
    SwitchPreset,
    SwitchSphere,
    ChooseSphere,
    ChoosePreset,
    EstimateDuration,
    TakeNotes,
    SwitchFocus,
    MarkIdea,
    ViewContext,
    RequestAnalysis,
    CompareOptions,
    PrepareDecision,
    NewDecision,
    IntrusiveSuggestion,
    ImplicitCreation,
    AutomaticWrite,
    SuppressDecision,
}

impl OperationId {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationId::Continue => "continue",
            OperationId::SwitchPreset => "switch-preset",
            OperationId::SwitchSphere => "switch-sphere",
            OperationId::ChooseSphere => "choose-sphere",
            OperationId::ChoosePreset => "choose-preset",
            OperationId::EstimateDuration => "estimate-duration",
            OperationId::TakeNotes => "take-notes",
            OperationId::SwitchFocus => "switch-focus",
            OperationId::MarkIdea => "mark-idea",
            OperationId::ViewContext => "view-context",
            OperationId::RequestAnalysis => "request-analysis",
            OperationId::CompareOptions => "compare-options",
            OperationId::PrepareDecision => "prepare-decision",
            OperationId::NewDecision => "new-decision",
            OperationId::IntrusiveSuggestion => "intrusive-suggestion",
            OperationId::ImplicitCreation => "implicit-creation",
            OperationId::AutomaticWrite => "automatic-write",
            OperationId::SuppressDecision => "suppress-decision",
        }
    }

    pub fn from_op_str(s: &str) -> Option<OperationId> {
        match s {
            "continue" => Some(OperationId::Continue),
            "switch-preset" => Some(OperationId::SwitchPreset),
            "switch-sphere" => Some(OperationId::SwitchSphere),
            "choose-sphere" => Some(OperationId::ChooseSphere),
            "choose-preset" => Some(OperationId::ChoosePreset),
            "estimate-duration" => Some(OperationId::EstimateDuration),
            "take-notes" => Some(OperationId::TakeNotes),
            "switch-focus" => Some(OperationId::SwitchFocus),
            "mark-idea" => Some(OperationId::MarkIdea),
            "view-context" => Some(OperationId::ViewContext),
            "request-analysis" => Some(OperationId::RequestAnalysis),
            "compare-options" => Some(OperationId::CompareOptions),
            "prepare-decision" => Some(OperationId::PrepareDecision),
            "new-decision" => Some(OperationId::NewDecision),
            "intrusive-suggestion" => Some(OperationId::IntrusiveSuggestion),
            "implicit-creation" => Some(OperationId::ImplicitCreation),
            "automatic-write" => Some(OperationId::AutomaticWrite),
            "suppress-decision" => Some(OperationId::SuppressDecision),
            _ => None,
        }
    }
}

/// Validation status of a single step.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepValidation {
    NotRequired,
    Pending,
    Validated,
    Rejected,
}

/// One executed operation inside the current path.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PathStep {
    pub operation: OperationId,
    pub payload: JsonValue,
    pub ts: String,
    pub validation: StepValidation,
}

/// Free-form in-memory scratch area. Nothing here reaches the timeline.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Scratch {
    pub notes: Vec<String>,
    pub marked: Vec<String>,
}

/// Outstanding request for human confirmation. At most one per path state.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ValidationRequest {
    pub id: String,
    pub step_index: usize,
    pub created_at: String,
}

/// Resolution of a validation request. `validated_by` is always a human
/// identity; the machine never validates its own steps.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ValidationResult {
    pub validated: bool,
    pub validated_by: String,
    pub can_write_to_timeline: bool,
}

/// Current session state owned exclusively by the path machine.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PathState {
    pub mode: PathMode,
    pub intention: String,
    pub scratch: Scratch,
    pub steps: Vec<PathStep>,
    pub pending: Option<ValidationRequest>,
}

impl PathState {
    fn fresh(mode: PathMode, intention: Option<&str>) -> Self {
        PathState {
            mode,
            intention: intention
                .map(|s| s.to_string())
                .unwrap_or_else(|| mode.profile().intention.to_string()),
            scratch: Scratch::default(),
            steps: Vec::new(),
            pending: None,
        }
    }
}

/// The path state machine. Initial mode is `Resume`; there is no terminal
/// state. Steps displaced by a retreat or a mode change move to the recovery
/// log, never to the bin.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathMachine {
    state: PathState,
    recovery: Vec<PathStep>,
    last_stable: Option<PathState>,
    pub(crate) retreated: bool,
}

impl Default for PathMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PathMachine {
    pub fn new() -> Self {
        PathMachine {
            state: PathState::fresh(PathMode::Resume, None),
            recovery: Vec::new(),
            last_stable: None,
            retreated: false,
        }
    }

    pub fn state(&self) -> &PathState {
        &self.state
    }

    pub fn recovery_log(&self) -> &[PathStep] {
        &self.recovery
    }

    pub fn pending_validation(&self) -> Option<&ValidationRequest> {
        self.state.pending.as_ref()
    }

    pub fn allowed_options(&self) -> &'static [OperationId] {
        self.state.mode.profile().allowed
    }

    /// Transition unconditionally into `mode`. The outgoing state's steps are
    /// moved to the recovery log and any pending validation request dies with
    /// the state that owned it.
    pub fn enter_path(&mut self, mode: PathMode, intention: Option<&str>) -> &PathState {
        self.recovery.append(&mut self.state.steps);
        self.state = PathState::fresh(mode, intention);
        self.last_stable = None;
        self.retreated = false;
        &self.state
    }

    /// Map free-text intent onto a mode. Ambiguity deliberately falls back to
    /// `Exploration`, the one mode that can never write history.
    pub fn parse_intention(text: &str) -> PathMode {
        if resume_patterns().iter().any(|p| p.is_match(text)) {
            return PathMode::Resume;
        }
        if objective_patterns().iter().any(|p| p.is_match(text)) {
            return PathMode::NewObjective;
        }
        if decision_patterns().iter().any(|p| p.is_match(text)) {
            return PathMode::Decision;
        }
        PathMode::Exploration
    }

    /// Execute an operation in the current mode. Operations outside the
    /// mode's allowed set are a caller bug, not a user-facing failure, and
    /// yield `Ok(None)` without touching state. Requesting a second
    /// validation while one is pending is rejected outright.
    pub fn execute_option(
        &mut self,
        operation: OperationId,
        payload: Option<JsonValue>,
    ) -> Result<Option<PathStep>, RudderError> {
        let profile = self.state.mode.profile();
        if profile.forbidden.contains(&operation) || !profile.allowed.contains(&operation) {
            return Ok(None);
        }

        let needs_validation = profile.requires_validation || operation == OperationId::MarkIdea;
        if needs_validation && self.state.pending.is_some() {
            return Err(RudderError::ValidationError(
                "a validation request is already pending; resolve it before executing another gated operation"
                    .to_string(),
            ));
        }

        let payload = payload.unwrap_or(JsonValue::Null);
        self.apply_scratch_effects(operation, &payload);

        let step = PathStep {
            operation,
            payload,
            ts: time::now_epoch_z(),
            validation: if needs_validation {
                StepValidation::Pending
            } else {
                StepValidation::NotRequired
            },
        };
        self.state.steps.push(step.clone());

        if needs_validation {
            self.state.pending = Some(ValidationRequest {
                id: time::new_event_id(),
                step_index: self.state.steps.len() - 1,
                created_at: time::now_epoch_z(),
            });
        }
        self.retreated = false;
        Ok(Some(step))
    }

    /// Resolve the single pending validation request. Confirmation promotes
    /// the step and snapshots the state as the last stable position; refusal
    /// marks the step rejected and nothing is ever written.
    pub fn validate(
        &mut self,
        confirmed: bool,
        validated_by: &str,
    ) -> Result<ValidationResult, RudderError> {
        let request = self.state.pending.take().ok_or_else(|| {
            RudderError::ValidationError("no validation request is pending".to_string())
        })?;
        let step = self.state.steps.get_mut(request.step_index).ok_or_else(|| {
            RudderError::ValidationError(format!(
                "pending validation points at missing step {}",
                request.step_index
            ))
        })?;
        step.validation = if confirmed {
            StepValidation::Validated
        } else {
            StepValidation::Rejected
        };

        let profile = self.state.mode.profile();
        if confirmed {
            self.last_stable = Some(self.state.clone());
        }
        self.retreated = false;
        Ok(ValidationResult {
            validated: confirmed,
            validated_by: validated_by.to_string(),
            can_write_to_timeline: confirmed && profile.can_write_timeline,
        })
    }

    /// Count of validated steps across the live state and the recovery log.
    /// Retreat must never change this figure.
    pub fn validated_step_count(&self) -> usize {
        self.state
            .steps
            .iter()
            .chain(self.recovery.iter())
            .filter(|s| s.validation == StepValidation::Validated)
            .count()
    }

    pub(crate) fn reset_to_neutral(&mut self) {
        self.recovery.append(&mut self.state.steps);
        self.state = PathState::fresh(PathMode::Resume, None);
    }

    pub(crate) fn restore_last_stable(&mut self) {
        let Some(snapshot) = self.last_stable.clone() else {
            self.reset_to_neutral();
            return;
        };
        // Steps are append-only, so the snapshot's steps are a prefix of the
        // current ones; only the unpromoted tail moves to recovery.
        let keep = snapshot.steps.len();
        if self.state.steps.len() > keep {
            self.recovery.extend(self.state.steps.drain(keep..));
        }
        self.state = snapshot;
    }

    fn apply_scratch_effects(&mut self, operation: OperationId, payload: &JsonValue) {
        match operation {
            OperationId::TakeNotes => {
                if let Some(note) = payload.get("note").and_then(|v| v.as_str()) {
                    self.state.scratch.notes.push(note.to_string());
                }
            }
            OperationId::MarkIdea => {
                if let Some(idea) = payload.get("idea").and_then(|v| v.as_str()) {
                    self.state.scratch.marked.push(idea.to_string());
                }
            }
            _ => {}
        }
    }
}

fn resume_patterns() -> Vec<Regex> {
    vec![
        Regex::new(r"(?i)\b(resum(e|ing)|continu(e|ing)|carry(ing)?\s+on)\b").unwrap(),
        Regex::new(r"(?i)\bpick(ing)?\s+up\b").unwrap(),
        Regex::new(r"(?i)\b(where\s+i\s+left|back\s+to\s+(it|work|my))\b").unwrap(),
    ]
}

fn objective_patterns() -> Vec<Regex> {
    vec![
        Regex::new(r"(?i)\b(start(ing)?|begin(ning)?|creat(e|ing)|launch(ing)?)\b").unwrap(),
        Regex::new(r"(?i)\b(new\s+(goal|objective|project)|kick(ing)?\s+off|set(ting)?\s+up)\b")
            .unwrap(),
    ]
}

fn decision_patterns() -> Vec<Regex> {
    vec![
        Regex::new(r"(?i)\b(decid(e|ing)|choos(e|ing)|commit(ting)?\s+to)\b").unwrap(),
        Regex::new(r"(?i)\b(must|have\s+to|need\s+to)\s+(choose|decide|pick)\b").unwrap(),
        Regex::new(r"(?i)\b(pick\s+between|make\s+a\s+(choice|call)|settle\s+on)\b").unwrap(),
    ]
}
