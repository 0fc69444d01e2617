//! Orchestration loop - routes one conversation across the agent registry

use futures::StreamExt;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::agent::{AgentHandle, AgentRegistry};
use crate::channel::{EventSink, ExitReason, SessionEvent};
use crate::command::SessionCommand;
use crate::console::Console;
use crate::error::{Result, WayfarerError};
use crate::policy::PolicyBridge;
use crate::prompt::build_prompt;
use crate::role::AgentRole;
use crate::session::{SessionState, Transition, USER_SPEAKER};

const RULE_WIDTH: usize = 70;

/// Where the loop is between steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    AwaitingUserInput,
    /// A queued handoff must be served before the user is prompted again
    AutoDispatch,
    Terminated(ExitReason),
}

/// Result of draining one streamed reply
enum StreamOutcome {
    Complete(String),
    Interrupted,
}

/// What a finished session leaves behind
pub struct SessionReport<W> {
    pub reason: ExitReason,
    pub state: SessionState,
    /// Agents released during teardown
    pub released: usize,
    pub output: W,
}

/// The handoff orchestrator
///
/// Owns the session state and drives the dialogue one speaker at a time.
pub struct Orchestrator<R, W> {
    registry: AgentRegistry,
    state: SessionState,
    policy: PolicyBridge,
    console: Console<R, W>,
    events: EventSink,
    cancel: CancellationToken,
}

impl<R, W> Orchestrator<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(registry: AgentRegistry, policy: PolicyBridge, console: Console<R, W>) -> Self {
        let state = SessionState::new(policy.is_configured()).with_roles(registry.roles());
        Self {
            registry,
            state,
            policy,
            console,
            events: EventSink::none(),
            cancel: CancellationToken::new(),
        }
    }

    /// Publish session events to `events`
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Stop the session when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Cap automatic specialist-to-specialist handoffs per user message
    pub fn with_max_auto_handoffs(mut self, max: usize) -> Self {
        self.state = self.state.with_max_auto_handoffs(max);
        self
    }

    /// Session state as it stands between steps
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Token that interrupts this session when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the session until exit, end of input, or interrupt.
    ///
    /// Every agent is released before this returns, whatever the outcome.
    #[instrument(skip(self))]
    pub async fn run(mut self) -> Result<SessionReport<W>> {
        info!(session_id = %self.state.id, "Starting handoff session");
        self.events.emit(SessionEvent::SessionStarted {
            session_id: self.state.id,
            roles: self.registry.roles(),
        });

        let outcome = self.drive().await;
        let released = self.registry.release().await;

        let reason = match outcome {
            Ok(reason) => reason,
            Err(e) => {
                error!(error = %e, "Session aborted");
                return Err(e);
            }
        };

        if reason == ExitReason::Interrupted {
            if let Err(e) = self.console.write("\nSession interrupted. Goodbye!\n").await {
                debug!(error = %e, "Could not write goodbye");
            }
        }

        self.events.emit(SessionEvent::SessionTerminated { reason });
        info!(reason = ?reason, released, "Handoff session ended");

        Ok(SessionReport {
            reason,
            state: self.state,
            released,
            output: self.console.into_output(),
        })
    }

    async fn drive(&mut self) -> Result<ExitReason> {
        self.print_banner().await?;

        let mut step = LoopState::AwaitingUserInput;
        loop {
            step = match step {
                LoopState::AwaitingUserInput => self.await_user_input().await?,
                LoopState::AutoDispatch => self.auto_dispatch().await?,
                LoopState::Terminated(reason) => return Ok(reason),
            };
        }
    }

    async fn print_banner(&mut self) -> Result<()> {
        let rule = "=".repeat(RULE_WIDTH);
        let policy = if self.state.policy_configured() {
            "Travel policy agent configured. Use 'policy' to invoke it."
        } else {
            "Travel policy agent not configured (optional)."
        };
        let banner = format!(
            "{rule}\nWayfarer travel planner\nCommands: summary, policy, exit\n{rule}\n{policy}\n\n"
        );
        self.console.write(&banner).await
    }

    async fn await_user_input(&mut self) -> Result<LoopState> {
        let label = self.state.active().display_label();
        self.console.write(&format!("You [{}]: ", label)).await?;

        let cancel = self.cancel.clone();
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(LoopState::Terminated(ExitReason::Interrupted)),
            line = self.console.read_line() => line?,
        };

        let Some(line) = line else {
            self.console.write("\nThanks for planning with the travel assistant!\n").await?;
            return Ok(LoopState::Terminated(ExitReason::EndOfInput));
        };

        match SessionCommand::parse(&line) {
            SessionCommand::Empty => Ok(LoopState::AwaitingUserInput),
            SessionCommand::Exit => {
                self.console.write("\nThanks for planning with the travel assistant!\n").await?;
                Ok(LoopState::Terminated(ExitReason::UserExit))
            }
            SessionCommand::Summary => {
                self.print_summary().await?;
                Ok(LoopState::AwaitingUserInput)
            }
            SessionCommand::Policy => self.run_policy_check().await,
            SessionCommand::Message(text) => {
                self.state.record_user_message(&text);
                self.events.emit(SessionEvent::TurnRecorded {
                    speaker: USER_SPEAKER.to_string(),
                    chars: text.chars().count(),
                });
                self.console.write("\n").await?;
                let role = self.state.active();
                self.dispatch(role, text).await
            }
        }
    }

    async fn auto_dispatch(&mut self) -> Result<LoopState> {
        let Some((role, prompt)) = self.state.take_pending() else {
            return Ok(LoopState::AwaitingUserInput);
        };
        debug!(role = %role, "Serving queued handoff");
        self.console
            .write(&format!("[Auto] {} is responding...\n", role.display_label()))
            .await?;
        self.dispatch(role, prompt).await
    }

    /// Prompt `role`, stream its reply, and resolve who speaks next
    async fn dispatch(&mut self, role: AgentRole, input: String) -> Result<LoopState> {
        let Some(agent) = self.registry.get(role).cloned() else {
            let err = WayfarerError::dispatch(role, "no agent registered for this role");
            return self.report_dispatch_failure(role, err).await;
        };

        let prompt = build_prompt(role, self.state.transcript(), &input);
        self.console.write(&format!("{}: ", agent.label())).await?;

        let text = match self.stream_reply(&agent, prompt).await {
            Ok(StreamOutcome::Complete(text)) => text,
            Ok(StreamOutcome::Interrupted) => {
                self.console.write("\n").await?;
                return Ok(LoopState::Terminated(ExitReason::Interrupted));
            }
            Err(e) => return self.report_dispatch_failure(role, e).await,
        };
        self.console.write("\n\n").await?;

        if !text.trim().is_empty() {
            self.events.emit(SessionEvent::TurnRecorded {
                speaker: agent.label().to_string(),
                chars: text.chars().count(),
            });
        }
        let transition = self.state.record_response(role, &text);
        self.events.emit(SessionEvent::TransitionResolved { role, transition });

        match transition {
            Transition::Handoff { to, .. } => {
                self.console
                    .write(&format!("[Handoff → {}]\n\n", to.display_label()))
                    .await?;
                Ok(LoopState::AutoDispatch)
            }
            Transition::Returned { explicit: true, .. } => {
                self.console.write("[Handoff → Coordinator]\n\n").await?;
                Ok(LoopState::AwaitingUserInput)
            }
            Transition::ChainLimit { .. } => {
                self.console
                    .write("[Handoff limit reached → Coordinator]\n\n")
                    .await?;
                Ok(LoopState::AwaitingUserInput)
            }
            Transition::Returned { explicit: false, .. } | Transition::Stay => {
                Ok(LoopState::AwaitingUserInput)
            }
        }
    }

    /// Drain the reply, echoing each fragment as it arrives.
    ///
    /// Session state is untouched until the stream is fully consumed.
    async fn stream_reply(
        &mut self,
        agent: &AgentHandle,
        prompt: String,
    ) -> Result<StreamOutcome> {
        let cancel = self.cancel.clone();

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(StreamOutcome::Interrupted),
            stream = agent.run_stream(prompt) => stream?,
        };

        let mut text = String::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(StreamOutcome::Interrupted),
                next = stream.next() => next,
            };
            match next {
                Some(Ok(fragment)) => {
                    self.console.write(&fragment).await?;
                    text.push_str(&fragment);
                }
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }
        Ok(StreamOutcome::Complete(text))
    }

    async fn report_dispatch_failure(
        &mut self,
        role: AgentRole,
        err: WayfarerError,
    ) -> Result<LoopState> {
        warn!(role = %role, error = %err, "Dispatch failed");
        self.events.emit(SessionEvent::DispatchFailed {
            role,
            error: err.to_string(),
        });
        self.console.write(&format!("\n[ERROR] {}\n\n", err)).await?;
        Ok(LoopState::AwaitingUserInput)
    }

    async fn print_summary(&mut self) -> Result<()> {
        let notes = self.state.notes();
        let text = if notes.is_empty() {
            "\n[Trip Summary] No specialist notes yet.\n\n".to_string()
        } else {
            let lines: Vec<String> = notes.iter().map(ToString::to_string).collect();
            format!("\n[Trip Summary]\n{}\n\n", lines.join("\n"))
        };
        self.console.write(&text).await
    }

    async fn run_policy_check(&mut self) -> Result<LoopState> {
        if !self.state.policy_configured() {
            self.console
                .write(&format!("\n{}\n\n", crate::policy::NOT_CONFIGURED))
                .await?;
            return Ok(LoopState::AwaitingUserInput);
        }

        let Some(summary) = self.state.policy_summary() else {
            self.console
                .write("\nAdd some trip details before running a policy check.\n\n")
                .await?;
            return Ok(LoopState::AwaitingUserInput);
        };

        self.console.write("\n[Policy] Checking itinerary...\n\n").await?;
        let result = self.policy.check(&summary, &self.cancel).await;
        self.events.emit(SessionEvent::PolicyChecked {
            result: result.clone(),
        });

        if self.cancel.is_cancelled() {
            return Ok(LoopState::Terminated(ExitReason::Interrupted));
        }

        self.console.write(&format!("{}\n\n", result)).await?;
        Ok(LoopState::AwaitingUserInput)
    }
}
