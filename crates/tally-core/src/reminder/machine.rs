//! Pure reminder state machine.
//!
//! Commands mutate the machine and return the [`Effect`]s the driver must
//! apply. Nothing here touches the UI or the scheduler directly, so effects
//! can be applied after the state lock is released.

use chrono::{DateTime, Utc};

use super::{OpenReason, PromptContent, ReminderState};
use crate::clock::TaskHandle;
use crate::error::TransitionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Effect {
    Show(PromptContent),
    Hide,
    Focus,
    /// Schedule the automatic end of snooze generation `snooze_id`.
    ArmUnsnooze {
        snooze_id: u64,
        until: DateTime<Utc>,
    },
    Cancel(TaskHandle),
}

/// Result of a close request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed,
    /// An open arrived while the close hook ran; the prompt stays up.
    Vetoed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Idle,
    Open {
        content: PromptContent,
        reason: OpenReason,
    },
    /// The close hook is running. Opens arriving now are collected in
    /// `reopen` and veto the close.
    Closing {
        content: PromptContent,
        reason: OpenReason,
        reopen: Option<(PromptContent, OpenReason)>,
    },
    Snoozed {
        until: DateTime<Utc>,
        snooze_id: u64,
        timer: Option<TaskHandle>,
    },
}

#[derive(Debug)]
pub(crate) struct ReminderMachine {
    phase: Phase,
    /// A scheduled open that could not be shown yet.
    deferred: Option<PromptContent>,
    next_snooze_id: u64,
}

impl Default for ReminderMachine {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            deferred: None,
            next_snooze_id: 1,
        }
    }
}

impl ReminderMachine {
    pub fn state(&self) -> ReminderState {
        match &self.phase {
            Phase::Idle => ReminderState::Idle,
            Phase::Open { content, reason } | Phase::Closing { content, reason, .. } => {
                ReminderState::Open {
                    content: *content,
                    reason: *reason,
                }
            }
            Phase::Snoozed { until, .. } => ReminderState::Snoozed { until: *until },
        }
    }

    pub fn snoozed_until(&self) -> Option<DateTime<Utc>> {
        match &self.phase {
            Phase::Snoozed { until, .. } => Some(*until),
            _ => None,
        }
    }

    pub fn deferred(&self) -> Option<PromptContent> {
        self.deferred
    }

    pub fn open(&mut self, content: PromptContent, reason: OpenReason) -> Vec<Effect> {
        match &mut self.phase {
            Phase::Idle => self.show(content, reason),
            Phase::Open {
                content: current,
                reason: current_reason,
            } => {
                if *current == content {
                    tracing::debug!(?content, ?reason, "open absorbed");
                    if reason == OpenReason::Manual {
                        *current_reason = OpenReason::Manual;
                        return vec![Effect::Focus];
                    }
                    return Vec::new();
                }
                match reason {
                    OpenReason::Manual => {
                        let displaced = (*current, *current_reason);
                        self.phase = Phase::Open { content, reason };
                        if displaced.1 == OpenReason::Scheduled {
                            self.defer(displaced.0);
                        }
                        vec![Effect::Show(content), Effect::Focus]
                    }
                    OpenReason::Scheduled => {
                        self.defer(content);
                        Vec::new()
                    }
                }
            }
            Phase::Closing { reopen, .. } => {
                tracing::debug!(?content, ?reason, "open during close hook vetoes the close");
                if reopen.is_none() || reason == OpenReason::Manual {
                    *reopen = Some((content, reason));
                }
                Vec::new()
            }
            Phase::Snoozed { timer, .. } => match reason {
                OpenReason::Manual => {
                    let mut effects: Vec<Effect> = timer.take().map(Effect::Cancel).into_iter().collect();
                    self.phase = Phase::Idle;
                    effects.extend(self.show(content, reason));
                    effects
                }
                OpenReason::Scheduled => {
                    self.defer(content);
                    Vec::new()
                }
            },
        }
    }

    /// Enter the closing guard. Returns the content being closed.
    pub fn begin_close(&mut self) -> Result<PromptContent, TransitionError> {
        match self.phase {
            Phase::Open { content, reason } => {
                self.phase = Phase::Closing {
                    content,
                    reason,
                    reopen: None,
                };
                Ok(content)
            }
            Phase::Closing { content, .. } => Err(TransitionError::AlreadyClosing(content)),
            _ => Err(TransitionError::NotOpen(self.state())),
        }
    }

    /// Leave the closing guard: hide, unless an open arrived meanwhile.
    pub fn finish_close(&mut self) -> (CloseOutcome, Vec<Effect>) {
        let Phase::Closing {
            content,
            reason,
            reopen,
        } = self.phase
        else {
            return (CloseOutcome::Closed, Vec::new());
        };

        match reopen {
            Some((again, again_reason)) => {
                self.phase = Phase::Open { content, reason };
                (CloseOutcome::Vetoed, self.open(again, again_reason))
            }
            None => {
                self.phase = Phase::Idle;
                let mut effects = vec![Effect::Hide];
                effects.extend(self.replay_deferred());
                (CloseOutcome::Closed, effects)
            }
        }
    }

    pub fn snooze(&mut self, until: DateTime<Utc>) -> Result<Vec<Effect>, TransitionError> {
        match self.phase {
            Phase::Open { .. } => {
                let snooze_id = self.next_snooze_id;
                self.next_snooze_id += 1;
                self.phase = Phase::Snoozed {
                    until,
                    snooze_id,
                    timer: None,
                };
                Ok(vec![Effect::Hide, Effect::ArmUnsnooze { snooze_id, until }])
            }
            Phase::Closing { content, .. } => Err(TransitionError::AlreadyClosing(content)),
            _ => Err(TransitionError::SnoozeNotOpen(self.state())),
        }
    }

    /// Remember the expiry timer of the current snooze. Hands the timer back
    /// if that snooze is already over, so the caller can cancel it.
    pub fn attach_timer(&mut self, snooze_id: u64, handle: TaskHandle) -> Option<TaskHandle> {
        match &mut self.phase {
            Phase::Snoozed {
                snooze_id: current,
                timer,
                ..
            } if *current == snooze_id => {
                *timer = Some(handle);
                None
            }
            _ => Some(handle),
        }
    }

    pub fn unsnooze(&mut self) -> Result<Vec<Effect>, TransitionError> {
        match &mut self.phase {
            Phase::Snoozed { timer, .. } => {
                let mut effects: Vec<Effect> = timer.take().map(Effect::Cancel).into_iter().collect();
                self.phase = Phase::Idle;
                effects.extend(self.replay_deferred());
                Ok(effects)
            }
            _ => Err(TransitionError::NotSnoozed(self.state())),
        }
    }

    /// Automatic end of snooze generation `snooze_id`; a no-op once that
    /// snooze is over.
    pub fn expire(&mut self, snooze_id: u64) -> Vec<Effect> {
        match self.phase {
            Phase::Snoozed { snooze_id: current, .. } if current == snooze_id => {
                self.phase = Phase::Idle;
                self.replay_deferred()
            }
            _ => {
                tracing::debug!(snooze_id, "stale snooze expiry ignored");
                Vec::new()
            }
        }
    }

    fn show(&mut self, content: PromptContent, reason: OpenReason) -> Vec<Effect> {
        if self.deferred == Some(content) {
            self.deferred = None;
        }
        self.phase = Phase::Open { content, reason };
        match reason {
            OpenReason::Manual => vec![Effect::Show(content), Effect::Focus],
            OpenReason::Scheduled => vec![Effect::Show(content)],
        }
    }

    /// The summary outranks a check-in when both are waiting.
    fn defer(&mut self, content: PromptContent) {
        tracing::debug!(?content, "open deferred");
        self.deferred = Some(self.deferred.map_or(content, |d| d.max(content)));
    }

    fn replay_deferred(&mut self) -> Vec<Effect> {
        match self.deferred.take() {
            Some(content) => self.open(content, OpenReason::Scheduled),
            None => Vec::new(),
        }
    }
}
