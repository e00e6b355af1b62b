//! Channel bridge for players outside the process: a human at a terminal or
//! an external agent. The engine side holds a `RelayStrategy`; whoever drives
//! the player holds the matching `RelayHandle`.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::warn;

use peril_core::{
    ActionFeedback, Decision, PlayerId, PlayerView, Resources, ServiceId, Strategy, StrategyError,
};

/// What the engine needs an answer to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayPrompt {
    pub round: u32,
    pub player: PlayerId,
    pub actions_remaining: u32,
    pub resources: Resources,
    pub uptime: f64,
    pub entropy: u8,
    pub services: Vec<ServiceId>,
    pub deadline_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayMessage {
    Prompt(RelayPrompt),
    Feedback(ActionFeedback),
    RoundFinished { round: u32, uptime: f64 },
}

pub struct RelayStrategy {
    outbox: Sender<RelayMessage>,
    inbox: Receiver<Decision>,
}

pub struct RelayHandle {
    messages: Receiver<RelayMessage>,
    decisions: Sender<Decision>,
}

/// Creates a connected strategy/handle pair.
pub fn relay_pair() -> (RelayStrategy, RelayHandle) {
    let (outbox, messages) = mpsc::channel();
    let (decisions, inbox) = mpsc::channel();
    (
        RelayStrategy { outbox, inbox },
        RelayHandle {
            messages,
            decisions,
        },
    )
}

impl RelayHandle {
    /// Blocks for the next message; `None` once the game side is gone.
    pub fn next_message(&self) -> Option<RelayMessage> {
        self.messages.recv().ok()
    }

    /// Returns false once the game side is gone.
    pub fn send(&self, decision: Decision) -> bool {
        self.decisions.send(decision).is_ok()
    }
}

impl Strategy for RelayStrategy {
    fn name(&self) -> &str {
        "relay"
    }

    fn decide(&mut self, view: &PlayerView<'_>, deadline: Duration) -> Result<Decision, StrategyError> {
        // Answers that arrived after an earlier deadline are stale.
        while self.inbox.try_recv().is_ok() {}

        let prompt = RelayPrompt {
            round: view.state.round,
            player: view.player,
            actions_remaining: view.actions_remaining(),
            resources: view.me().map(|p| p.resources).unwrap_or_default(),
            uptime: view.me().map_or(0.0, |p| p.uptime),
            entropy: view.state.entropy,
            services: view.my_services().iter().map(|s| s.id).collect(),
            deadline_ms: millis(deadline),
        };
        if self.outbox.send(RelayMessage::Prompt(prompt)).is_err() {
            return Err(StrategyError::Disconnected("relay handle dropped".into()));
        }

        let started = Instant::now();
        match self.inbox.recv_timeout(deadline) {
            Ok(decision) => Ok(decision),
            Err(RecvTimeoutError::Timeout) => Err(StrategyError::Timeout {
                elapsed_ms: millis(started.elapsed()),
                deadline_ms: millis(deadline),
            }),
            Err(RecvTimeoutError::Disconnected) => {
                Err(StrategyError::Disconnected("relay handle dropped".into()))
            }
        }
    }

    fn observe(&mut self, feedback: &ActionFeedback) {
        if self
            .outbox
            .send(RelayMessage::Feedback(feedback.clone()))
            .is_err()
        {
            warn!(player = %feedback.player, "relay feedback undeliverable");
        }
    }

    fn round_finished(&mut self, view: &PlayerView<'_>) {
        let message = RelayMessage::RoundFinished {
            round: view.state.round,
            uptime: view.me().map_or(0.0, |p| p.uptime),
        };
        // The handle may legitimately be gone once the player is done.
        let _ = self.outbox.send(message);
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
