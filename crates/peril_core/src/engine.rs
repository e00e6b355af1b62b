use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::actions::{submit, ActionRequest, ActionResult};
use crate::chaos::{apply_decay, maybe_trigger};
use crate::config::GameConfig;
use crate::dice::Dice;
use crate::error::{ConfigError, ConsistencyError, EngineError, StrategyError, ValidationError};
use crate::events::{Event, EventEnvelope, Stamp};
use crate::metrics::{compute_round_metrics, RoundMetrics};
use crate::setup::new_game;
use crate::snapshot::GameSnapshot;
use crate::strategy::{ActionFeedback, Decision, DecisionSource, PlayerView, Strategy};
use crate::traffic::{resolve_round, roll_traffic};
use crate::victory::{evaluate, update_standings};
use crate::{check_invariants, emit, GameState, Phase, PlayerId, TerminalResult};

/// Phase after `phase`. `finished` is whether the game has a verdict.
pub fn next_phase(phase: Phase, finished: bool) -> Phase {
    match phase {
        Phase::Setup => Phase::Traffic,
        Phase::Traffic => Phase::Action,
        Phase::Action => Phase::Resolution,
        Phase::Resolution => Phase::Chaos,
        Phase::Chaos => {
            if finished {
                Phase::End
            } else {
                Phase::Traffic
            }
        }
        Phase::End => Phase::End,
    }
}

/// One game instance: state, its private dice, and one strategy per seat.
///
/// Order of operations per round:
/// 1. Traffic: roll incoming volume for every active player.
/// 2. Action: each active player, in turn order, acts until out of budget
///    or passing.
/// 3. Resolution: route traffic, apply overloads and cascades, update
///    uptime and victory standings.
/// 4. Chaos: maybe fire a chaos event, raise entropy, check for a verdict.
///
/// Invariants are checked after every phase; a violation aborts the game.
pub struct Simulation {
    state: GameState,
    dice: Dice,
    config: GameConfig,
    strategies: Vec<Box<dyn Strategy>>,
    events: Vec<EventEnvelope>,
    history: Vec<RoundMetrics>,
    round_seq: u32,
}

impl Simulation {
    pub fn new(config: GameConfig, strategies: Vec<Box<dyn Strategy>>) -> Result<Self, EngineError> {
        if strategies.len() != config.players.len() {
            return Err(ConfigError::StrategyCount {
                expected: config.players.len(),
                actual: strategies.len(),
            }
            .into());
        }
        let mut dice = Dice::from_seed(config.seed);
        let state = new_game(&config, &mut dice)?;
        let mut sim = Self {
            state,
            dice,
            config,
            strategies,
            events: Vec::new(),
            history: Vec::new(),
            round_seq: 0,
        };
        let players = sim.state.players.iter().map(|p| p.id).collect();
        sim.record(Event::GameStarted {
            game_id: sim.state.meta.game_id,
            seed: sim.config.seed,
            players,
        });
        Ok(sim)
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn events(&self) -> &[EventEnvelope] {
        &self.events
    }

    /// One metrics row per completed round, sampled after its Chaos phase.
    pub fn round_metrics(&self) -> &[RoundMetrics] {
        &self.history
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot::capture(&self.state)
    }

    pub fn is_finished(&self) -> bool {
        self.state.phase == Phase::End
    }

    pub fn strategy_names(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.name().to_string()).collect()
    }

    /// Runs the current phase and moves to the next one.
    pub fn step_phase(&mut self) -> Result<Phase, EngineError> {
        let phase = self.state.phase;
        match phase {
            Phase::Setup => {}
            Phase::Traffic => self.traffic_phase(),
            Phase::Action => self.action_phase(),
            Phase::Resolution => self.resolution_phase(),
            Phase::Chaos => self.chaos_phase()?,
            Phase::End => return Ok(Phase::End),
        }
        self.verify(phase)?;

        let next = next_phase(phase, self.state.result.is_some());
        if phase == Phase::Chaos && next == Phase::Traffic {
            self.state.round += 1;
            self.round_seq = 0;
        }
        self.state.phase = next;
        Ok(next)
    }

    /// Runs phases until the next round starts or the game ends.
    pub fn play_round(&mut self) -> Result<(), EngineError> {
        let round = self.state.round;
        while !self.is_finished() && (self.state.round == round || self.state.phase == Phase::Setup) {
            self.step_phase()?;
        }
        Ok(())
    }

    /// Plays to the end and returns the verdict.
    pub fn run(&mut self) -> Result<TerminalResult, EngineError> {
        while !self.is_finished() {
            self.step_phase()?;
        }
        Ok(self.state.result.clone().unwrap_or(TerminalResult::Timeout {
            round: self.state.round,
        }))
    }

    fn record(&mut self, event: Event) {
        let at = Stamp {
            round: self.state.round,
            phase: self.state.phase,
            seq: self.round_seq,
        };
        self.round_seq += 1;
        debug!(round = at.round, phase = %at.phase, event = event.label(), "event");
        let envelope = emit(&mut self.state.counters, at, event);
        self.events.push(envelope);
    }

    fn verify(&self, phase: Phase) -> Result<(), ConsistencyError> {
        let violations = check_invariants(&self.state);
        if violations.is_empty() {
            return Ok(());
        }
        Err(ConsistencyError {
            round: self.state.round,
            phase,
            violations,
        })
    }

    // -----------------------------------------------------------------------
    // Phases
    // -----------------------------------------------------------------------

    fn traffic_phase(&mut self) {
        let rolls = roll_traffic(&mut self.state, &mut self.dice, &self.config);
        self.record(Event::TrafficRolled { rolls });
    }

    fn action_phase(&mut self) {
        let budget = self.config.rules.actions_per_round;
        for player in &mut self.state.players {
            player.actions_remaining = if player.is_active() { budget } else { 0 };
            player.ability_used = false;
        }
        let seats: Vec<PlayerId> = self.state.active_players().map(|p| p.id).collect();
        for player in seats {
            self.take_turn(player);
        }
    }

    fn resolution_phase(&mut self) {
        let report = resolve_round(&mut self.state, &mut self.dice, &self.config);
        for overload in report.overloads {
            self.record(Event::ServiceOverloaded { overload });
        }
        for chain in report.cascades {
            self.record(Event::CascadeTriggered { chain });
        }
        let uptime = self.state.players.iter().map(|p| p.uptime).collect();
        self.record(Event::RoundResolved {
            handled: report.requests_handled,
            dropped: report.requests_dropped,
            uptime,
        });

        for player in update_standings(&mut self.state, &self.config) {
            let uptime = self.state.player(player).map_or(0.0, |p| p.uptime);
            self.record(Event::PlayerEliminated { player, uptime });
        }
        for (index, strategy) in self.strategies.iter_mut().enumerate() {
            let Some(player) = self.state.players.get(index) else {
                continue;
            };
            let view = PlayerView::new(player.id, &self.state, &self.config);
            strategy.round_finished(&view);
        }
    }

    fn chaos_phase(&mut self) -> Result<(), EngineError> {
        let before = self.state.entropy;
        let struck = maybe_trigger(&mut self.state, &mut self.dice, &self.config)?;
        self.record(Event::ChaosChecked {
            entropy: before,
            threshold: self.config.chaos.threshold,
            triggered: struck.is_some(),
        });
        if let Some(chaos) = struck {
            info!(round = self.state.round, event = chaos.kind.label(), severity = ?chaos.severity, "chaos strikes");
            self.record(Event::ChaosStruck { chaos });
        }
        let after = apply_decay(&mut self.state, &self.config);
        if after != before {
            self.record(Event::EntropyChanged {
                from: before,
                to: after,
            });
        }

        if let Some(result) = evaluate(&self.state, &self.config) {
            info!(round = self.state.round, outcome = result.label(), "game over");
            self.state.result = Some(result.clone());
            self.record(Event::GameEnded { result });
        } else {
            info!(round = self.state.round, entropy = after, "round complete");
        }
        self.history.push(compute_round_metrics(&self.state));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Turns
    // -----------------------------------------------------------------------

    fn take_turn(&mut self, player: PlayerId) {
        let deadline = Duration::from_millis(self.config.decision_deadline_ms);
        let mut rejections = 0;
        while self
            .state
            .player(player)
            .is_some_and(|p| p.actions_remaining > 0)
        {
            let Some(decision) = self.consult(player, deadline) else {
                return;
            };
            let Decision::Act { action, dice_rolls } = decision else {
                return;
            };
            let request = ActionRequest {
                player_id: player,
                action,
                dice_rolls,
            };
            let result = submit(&mut self.state, &request, &mut self.dice, &self.config);
            let accepted = result.is_ok();
            self.report_action(&request, result);
            if accepted {
                continue;
            }
            rejections += 1;
            if rejections >= self.config.rules.max_rejections_per_turn {
                warn!(%player, rejections, "rejection limit reached, forcing pass");
                self.record(Event::ForcedPass { player, rejections });
                self.record(Event::DecisionMade {
                    player,
                    decision: Decision::Pass,
                    source: DecisionSource::RejectionLimit,
                });
                return;
            }
        }
    }

    /// Asks the player's strategy for a decision and records it. Returns
    /// `None` when the strategy missed its deadline or disconnected.
    fn consult(&mut self, player: PlayerId, deadline: Duration) -> Option<Decision> {
        let started = Instant::now();
        let view = PlayerView::new(player, &self.state, &self.config);
        let outcome = match self.strategies.get_mut(player.index()) {
            Some(strategy) => strategy.decide(&view, deadline),
            None => Err(StrategyError::Disconnected(format!("no strategy for {player}"))),
        };
        let elapsed = started.elapsed();
        let outcome = match outcome {
            Ok(_) if millis(elapsed) > millis(deadline) => Err(StrategyError::Timeout {
                elapsed_ms: millis(elapsed),
                deadline_ms: millis(deadline),
            }),
            other => other,
        };

        match outcome {
            Ok(decision) => {
                self.record(Event::DecisionMade {
                    player,
                    decision: decision.clone(),
                    source: DecisionSource::Strategy,
                });
                Some(decision)
            }
            Err(StrategyError::Timeout {
                elapsed_ms,
                deadline_ms,
            }) => {
                warn!(%player, elapsed_ms, deadline_ms, "strategy timed out, passing");
                self.state.metrics.strategy_timeouts += 1;
                self.record(Event::StrategyTimedOut {
                    player,
                    elapsed_ms,
                    deadline_ms,
                });
                self.record_forced(player, DecisionSource::Timeout);
                None
            }
            Err(StrategyError::Disconnected(reason)) => {
                warn!(%player, %reason, "strategy disconnected, passing");
                self.record_forced(player, DecisionSource::Disconnected);
                None
            }
        }
    }

    fn record_forced(&mut self, player: PlayerId, source: DecisionSource) {
        self.record(Event::DecisionMade {
            player,
            decision: Decision::Pass,
            source,
        });
    }

    fn report_action(
        &mut self,
        request: &ActionRequest,
        result: Result<crate::actions::ActionOutcome, ValidationError>,
    ) {
        let player = request.player_id;
        let feedback = ActionFeedback {
            player,
            action: request.action.clone(),
            result: ActionResult::from_result(&result),
        };
        match result {
            Ok(outcome) => self.record(Event::ActionApplied {
                player,
                action: request.action.clone(),
                outcome,
            }),
            Err(err) => {
                self.state.metrics.actions_rejected += 1;
                if matches!(err, ValidationError::InsufficientResources { .. }) {
                    self.state.metrics.resource_starvation += 1;
                }
                debug!(%player, action = request.action.label(), error = %err, "action rejected");
                self.record(Event::ActionRejected {
                    player,
                    action: request.action.clone(),
                    error_kind: err.kind(),
                    reason: err.to_string(),
                });
            }
        }
        if let Some(strategy) = self.strategies.get_mut(player.index()) {
            strategy.observe(&feedback);
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Action;
    use crate::strategy::PassStrategy;
    use crate::test_fixtures::base_config;
    use crate::{HexCoord, ResourceKind, ServiceType};

    fn passers(n: usize) -> Vec<Box<dyn Strategy>> {
        (0..n).map(|_| Box::new(PassStrategy) as Box<dyn Strategy>).collect()
    }

    /// Replays a fixed list of decisions, then passes.
    struct Fixed(Vec<Decision>);

    impl Strategy for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn decide(&mut self, _view: &PlayerView<'_>, _deadline: Duration) -> Result<Decision, StrategyError> {
            if self.0.is_empty() {
                return Ok(Decision::Pass);
            }
            Ok(self.0.remove(0))
        }
    }

    struct Slow;

    impl Strategy for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        fn decide(&mut self, _view: &PlayerView<'_>, _deadline: Duration) -> Result<Decision, StrategyError> {
            std::thread::sleep(Duration::from_millis(5));
            Ok(Decision::act(Action::Gather {
                resource: ResourceKind::Cpu,
            }))
        }
    }

    #[test]
    fn phases_cycle_in_order() {
        let mut sim = Simulation::new(base_config(), passers(4)).unwrap();
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(sim.step_phase().unwrap());
        }
        assert_eq!(
            seen,
            vec![
                Phase::Traffic,
                Phase::Action,
                Phase::Resolution,
                Phase::Chaos,
                Phase::Traffic,
                Phase::Action
            ]
        );
        assert_eq!(sim.state().round, 2);
    }

    #[test]
    fn strategy_count_must_match_players() {
        let err = Simulation::new(base_config(), passers(3)).err().unwrap();
        assert!(matches!(
            err,
            EngineError::Config(ConfigError::StrategyCount {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn budget_resets_each_action_phase() {
        let build = Decision::act(Action::Build {
            service_type: ServiceType::ApiGateway,
            location: HexCoord::new(1, 1),
        });
        let mut strategies = passers(4);
        strategies[0] = Box::new(Fixed(vec![build]));
        let mut sim = Simulation::new(base_config(), strategies).unwrap();
        sim.play_round().unwrap();
        assert_eq!(sim.state().players[0].actions_remaining, 2);
        assert_eq!(sim.state().players[1].actions_remaining, 3);

        sim.play_round().unwrap();
        assert_eq!(sim.state().players[0].actions_remaining, 3);
        assert_eq!(sim.state().services.len(), 1);
    }

    #[test]
    fn repeated_rejections_force_a_pass() {
        let bad = Decision::act(Action::Debug {
            service: crate::ServiceId(99),
        });
        let mut strategies = passers(4);
        strategies[2] = Box::new(Fixed(vec![bad; 10]));
        let mut sim = Simulation::new(base_config(), strategies).unwrap();
        sim.play_round().unwrap();

        assert_eq!(sim.state().metrics.actions_rejected, 3);
        let forced = sim
            .events()
            .iter()
            .filter(|e| matches!(e.event, Event::ForcedPass { player, .. } if player == PlayerId(2)))
            .count();
        assert_eq!(forced, 1);
    }

    #[test]
    fn slow_strategy_is_passed_without_acting() {
        let mut config = base_config();
        config.decision_deadline_ms = 0;
        let mut strategies = passers(4);
        strategies[1] = Box::new(Slow);
        let mut sim = Simulation::new(config, strategies).unwrap();
        sim.play_round().unwrap();

        assert_eq!(sim.state().metrics.strategy_timeouts, 1);
        assert_eq!(sim.state().players[1].resources.cpu, 5);
        assert!(sim.events().iter().any(|e| matches!(
            e.event,
            Event::DecisionMade {
                source: DecisionSource::Timeout,
                ..
            }
        )));
    }

    #[test]
    fn event_ids_are_sequential() {
        let mut sim = Simulation::new(base_config(), passers(4)).unwrap();
        sim.run().unwrap();
        for (i, envelope) in sim.events().iter().enumerate() {
            assert_eq!(envelope.id.0, i as u64);
        }
        assert!(matches!(
            sim.events().last().map(|e| &e.event),
            Some(Event::GameEnded { .. })
        ));
    }

    #[test]
    fn one_metrics_row_per_round() {
        let mut sim = Simulation::new(base_config(), passers(4)).unwrap();
        sim.run().unwrap();
        let rounds: Vec<u32> = sim.round_metrics().iter().map(|m| m.round).collect();
        assert_eq!(rounds, (1..=10).collect::<Vec<_>>());
    }
}
