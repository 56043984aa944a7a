//! Rollout transition table.
//!
//! [`plan`] is a pure function from (record, command) to the store call to
//! make, the status and stage to commit on success, and the parent
//! notifications to fire. The controller executes the plan; nothing here
//! performs I/O.
//!
//! ```text
//!            start                 advance (last stage) / release_fully
//!  Created ────────► Started ───────────────────────────────────────► Completed
//!                    │  ▲  │
//!              pause │  │  │ halt
//!                    ▼  │  ▼
//!                Paused  Halted
//!                    └──┴── resume ──► Started
//! ```

use serde::{Deserialize, Serialize};

use rollgate_state::{RolloutRecord, RolloutStatus};
use rollgate_storefront::StoreCall;

use crate::stages::{StageProgress, FULL_ROLLOUT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    PrepareDraft,
    Start,
    Advance,
    Halt,
    Pause,
    Resume,
    ReleaseFully,
    /// The store reports the release complete on its own.
    ObserveCompletion,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PrepareDraft => "prepare_draft",
            Self::Start => "start",
            Self::Advance => "advance",
            Self::Halt => "halt",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::ReleaseFully => "release_fully",
            Self::ObserveCompletion => "observe_completion",
        }
    }

    /// Statuses the command is valid from.
    pub fn valid_from(self) -> &'static [RolloutStatus] {
        match self {
            Self::PrepareDraft | Self::Start => &[RolloutStatus::Created],
            Self::Advance
            | Self::Halt
            | Self::Pause
            | Self::ReleaseFully
            | Self::ObserveCompletion => &[RolloutStatus::Started],
            Self::Resume => &[RolloutStatus::Paused, RolloutStatus::Halted],
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parent notification attached to a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Fired before the store call, whatever its outcome.
    NotifyStarted,
    /// Fired after the transition is committed.
    NotifyComplete,
}

/// Why an operation did nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// The parent release is not in a state that allows the operation.
    NotActionable,
    InvalidStatus {
        command: Command,
        status: RolloutStatus,
    },
    /// Another rollout is active on the same run and channel.
    ChannelBusy { rollout_id: String },
    /// Another writer moved the rollout first.
    Stale,
    /// The store has not finished the release yet.
    StoreNotComplete,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotActionable => f.write_str("parent release not actionable"),
            Self::InvalidStatus { command, status } => write!(f, "cannot {command} from {status}"),
            Self::ChannelBusy { rollout_id } => {
                write!(f, "rollout {rollout_id} is active on this channel")
            }
            Self::Stale => f.write_str("rollout changed concurrently"),
            Self::StoreNotComplete => f.write_str("store release not complete"),
        }
    }
}

/// What executing a command means for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub command: Command,
    /// Store mutation to make; `None` for pure bookkeeping transitions.
    pub call: Option<StoreCall>,
    pub to: RolloutStatus,
    pub stage: Option<usize>,
    pub effects: Vec<Effect>,
    /// Retry review rejections with `skip_review`.
    pub skip_review_fallback: bool,
}

impl Plan {
    fn new(
        command: Command,
        call: Option<StoreCall>,
        to: RolloutStatus,
        stage: Option<usize>,
    ) -> Self {
        Self {
            command,
            call,
            to,
            stage,
            effects: Vec::new(),
            skip_review_fallback: !matches!(call, None | Some(StoreCall::CreateDraft)),
        }
    }

    fn with(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn has_effect(&self, effect: Effect) -> bool {
        self.effects.contains(&effect)
    }
}

/// Plan `command` against `record`, or say why it is a no-op.
pub fn plan(record: &RolloutRecord, command: Command) -> Result<Plan, SkipReason> {
    if !command.valid_from().contains(&record.status) {
        return Err(SkipReason::InvalidStatus {
            command,
            status: record.status,
        });
    }

    let stage = record.current_stage;
    let plan = match command {
        Command::PrepareDraft => {
            Plan::new(command, Some(StoreCall::CreateDraft), RolloutStatus::Created, stage)
        }

        Command::Start => {
            let first = record.stage_config.first().copied();
            match first {
                Some(percentage) if record.is_staged => Plan::new(
                    command,
                    Some(StoreCall::Rollout { percentage }),
                    RolloutStatus::Started,
                    Some(0),
                ),
                // Staged with nothing configured: straight to full release.
                None if record.is_staged => {
                    Plan::new(
                        command,
                        Some(StoreCall::ReleaseFully),
                        RolloutStatus::Completed,
                        None,
                    )
                    .with(Effect::NotifyComplete)
                }
                _ => Plan::new(
                    command,
                    Some(StoreCall::Rollout {
                        percentage: FULL_ROLLOUT,
                    }),
                    RolloutStatus::Completed,
                    None,
                )
                .with(Effect::NotifyComplete),
            }
            .with(Effect::NotifyStarted)
        }

        Command::Advance => match record.next_rollout_percentage() {
            Some(percentage) => Plan::new(
                command,
                Some(StoreCall::Rollout { percentage }),
                RolloutStatus::Started,
                Some(stage.map_or(0, |idx| idx + 1)),
            ),
            None => Plan::new(
                command,
                Some(StoreCall::ReleaseFully),
                RolloutStatus::Completed,
                stage,
            )
            .with(Effect::NotifyComplete),
        },

        Command::Halt => Plan::new(command, Some(StoreCall::Halt), RolloutStatus::Halted, stage),

        Command::Pause => Plan::new(command, Some(StoreCall::Pause), RolloutStatus::Paused, stage),

        Command::Resume => Plan::new(
            command,
            Some(StoreCall::Resume {
                percentage: record.last_rollout_percentage(),
            }),
            RolloutStatus::Started,
            stage,
        ),

        Command::ReleaseFully => Plan::new(
            command,
            Some(StoreCall::ReleaseFully),
            RolloutStatus::Completed,
            stage,
        )
        .with(Effect::NotifyComplete),

        Command::ObserveCompletion => {
            Plan::new(command, None, RolloutStatus::Completed, stage).with(Effect::NotifyComplete)
        }
    };
    Ok(plan)
}
