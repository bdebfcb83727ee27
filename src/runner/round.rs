//! Round orchestration: one full pass of simulate, remember, grade, evolve,
//! persist and archive.
//!
//! Everything that can fail validation runs before the first write, so a
//! malformed round leaves the state directory untouched.

use crate::agent::{AgentGenerator, SymbolMemory, SymbolSelector, TickerStats};
use crate::config::KillcoreConfig;
use crate::error::{EvolutionError, Result};
use crate::evolution::{
    EvolutionPolicy, GradeResult, GradingEngine, MaturityReport, MemoryStore, RegimeClassifier,
    RegimeType, RoundContext, SelfEvaluation,
};
use crate::models::{AgentState, MarketRegimeInput, PerformanceRecord};
use crate::runner::archive::RoundArchiver;
use crate::runner::lock::InstanceLock;
use crate::runner::store::StateStore;
use crate::simulator::PerformanceSource;
use chrono::Utc;
use rand::Rng;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Summary of a completed round.
#[derive(Debug, Clone)]
pub struct RoundReport {
    pub round: u32,
    pub generation: u64,
    pub live_rounds: u64,
    pub regime: RegimeType,
    pub grade: GradeResult,
    pub frozen: bool,
    pub intent: Vec<String>,
    pub performance: PerformanceRecord,
    pub archive_dir: PathBuf,
}

pub struct RoundRunner<S> {
    config: KillcoreConfig,
    store: StateStore,
    archiver: RoundArchiver,
    source: S,
    grading: GradingEngine,
    policy: EvolutionPolicy,
}

impl<S: PerformanceSource> RoundRunner<S> {
    pub fn new(config: KillcoreConfig, source: S) -> Self {
        let store = StateStore::new(config.runner.state_dir.clone());
        let archiver = RoundArchiver::new(config.runner.archive_dir());
        let grading = GradingEngine::new(config.grading.clone());
        let policy = EvolutionPolicy::new(config.policy.clone());
        Self {
            config,
            store,
            archiver,
            source,
            grading,
            policy,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn archiver(&self) -> &RoundArchiver {
        &self.archiver
    }

    /// Run `f` while holding the configured instance lock. Fails without
    /// calling `f` when another instance holds it.
    pub fn exclusive<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let lock = InstanceLock::acquire(&self.config.runner.lock_path).map_err(|e| {
            warn!(lock = %self.config.runner.lock_path.display(), "another instance is running");
            e
        })?;
        let result = f(self);
        lock.release();
        result
    }

    /// Create and persist a fresh agent. Refuses to replace an existing one
    /// unless `force` is set.
    pub fn initialize_agent<R: Rng>(
        &self,
        tickers: Option<&[TickerStats]>,
        force: bool,
        rng: &mut R,
    ) -> Result<AgentState> {
        if self.store.has_agent() && !force {
            return self.store.load_agent();
        }

        let mut symbols = match self.store.load_symbol_memory()? {
            Some(memory) => memory,
            None => {
                SymbolMemory::with_symbols(self.config.runner.symbols.iter().map(String::as_str))
            }
        };

        let symbol = tickers
            .and_then(|t| SymbolSelector::select(t, &mut symbols))
            .or_else(|| symbols.most_used().map(str::to_string))
            .or_else(|| self.config.runner.symbols.first().cloned())
            .ok_or_else(|| EvolutionError::malformed("runner.symbols", "no candidate symbol"))?;

        let generator = AgentGenerator {
            capital: self.config.simulator.capital,
            ..AgentGenerator::default()
        };
        let agent = generator.generate(&symbol, Utc::now(), rng);

        self.store.save_symbol_memory(&symbols)?;
        self.store.save_agent(&agent)?;
        info!(
            symbol = %agent.symbol,
            style = %agent.style_profile,
            genetic_id = agent.genetic_id.as_deref().unwrap_or("-"),
            "generated agent"
        );
        Ok(agent)
    }

    /// Simulate a round with the configured source, then evolve on it.
    pub fn run_round<R: Rng>(&mut self, rng: &mut R) -> Result<RoundReport> {
        let agent = self.store.load_agent()?;
        agent.validate()?;
        let outcome = self.source.run_round(&agent, &mut *rng)?;
        debug!(
            return_pct = outcome.performance.return_pct,
            drawdown = outcome.performance.drawdown,
            "simulated round"
        );
        self.process(agent, outcome.performance, Some(outcome.market), None, rng)
    }

    /// Evolve on a performance record already written by an external
    /// simulator.
    pub fn ingest_recorded<R: Rng>(&mut self, rng: &mut R) -> Result<RoundReport> {
        let agent = self.store.load_agent()?;
        let performance = self.store.load_performance()?.ok_or_else(|| {
            EvolutionError::PersistenceUnavailable("no performance record to ingest".to_string())
        })?;
        let market = self.store.load_market()?;
        self.process(agent, performance, market, None, rng)
    }

    /// Like [`ingest_recorded`](Self::ingest_recorded), but the grade comes
    /// from the self-evaluation an external grading pass left in the state
    /// directory instead of from memory.
    pub fn ingest_graded<R: Rng>(&mut self, rng: &mut R) -> Result<RoundReport> {
        let agent = self.store.load_agent()?;
        let performance = self.store.load_performance()?.ok_or_else(|| {
            EvolutionError::PersistenceUnavailable("no performance record to ingest".to_string())
        })?;
        let evaluation = self.store.load_evaluation()?.ok_or_else(|| {
            EvolutionError::PersistenceUnavailable("no self-evaluation to apply".to_string())
        })?;
        let market = self.store.load_market()?;
        let grade = GradeResult::from(evaluation);
        self.process(agent, performance, market, Some(grade), rng)
    }

    /// Grade the stored memory and write the self-evaluation.
    pub fn evaluate(&self) -> Result<(SelfEvaluation, MaturityReport)> {
        let memory =
            MemoryStore::from_snapshot(self.config.memory.clone(), self.store.load_memory()?);
        let grade = self.grading.grade(&memory)?;
        let evaluation = SelfEvaluation::from(&grade);
        self.store.save_evaluation(&evaluation)?;
        Ok((evaluation, MaturityReport::assess(&memory)))
    }

    fn process<R: Rng>(
        &mut self,
        agent: AgentState,
        performance: PerformanceRecord,
        market: Option<MarketRegimeInput>,
        external_grade: Option<GradeResult>,
        rng: &mut R,
    ) -> Result<RoundReport> {
        let regime = RegimeClassifier::classify_input(market.as_ref());
        if market.is_none() {
            warn!("no market status for this round, treating as stable");
        }

        let mut memory =
            MemoryStore::from_snapshot(self.config.memory.clone(), self.store.load_memory()?);
        memory.append(&performance, RoundContext::from_agent(&agent, Utc::now()))?;

        let grade = match external_grade {
            Some(grade) => {
                debug!(grade = %grade.grade, "using stored self-evaluation");
                grade
            }
            None => self.grading.grade(&memory)?,
        };
        let outcome = self
            .policy
            .evolve(&agent, &performance, regime, &grade, &memory, rng)?;
        memory.record_evolution(outcome.event())?;

        let mut symbols = self.store.load_symbol_memory()?.unwrap_or_default();
        symbols.record_return(&agent.symbol, performance.return_pct);

        self.store.save_performance(&performance)?;
        if let Some(market) = &market {
            self.store.save_market(market)?;
        }
        self.store.save_memory(memory.snapshot())?;
        self.store.save_evaluation(&SelfEvaluation::from(&grade))?;
        self.store.save_symbol_memory(&symbols)?;
        self.store.save_agent(&outcome.agent)?;

        let archive_dir = self.archiver.archive(&self.store)?;
        let round = self.archiver.latest_round()?;

        info!(
            round,
            generation = outcome.agent.generation,
            regime = %regime,
            grade = %grade.grade,
            score = grade.score,
            frozen = outcome.frozen,
            "round complete"
        );
        for line in outcome.intent() {
            debug!(intent = %line);
        }
        if !outcome.agent.bad_behavior_tag.is_empty() {
            let tags: Vec<&str> = outcome
                .agent
                .bad_behavior_tag
                .iter()
                .map(|t| t.as_str())
                .collect();
            warn!(tags = %tags.join(","), "bad behavior tags present");
        }

        Ok(RoundReport {
            round,
            generation: outcome.agent.generation,
            live_rounds: memory.snapshot().live_rounds,
            regime,
            frozen: outcome.frozen,
            intent: outcome.agent.evolution_intent.clone(),
            grade,
            performance,
            archive_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::{Grade, StyleChange, TrendDirection, TrendReport};
    use crate::models::fixtures::{agent, record};
    use crate::models::StyleProfile;
    use crate::simulator::{PaperSimulator, RoundOutcome};
    use rand::{RngCore, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    struct FixedSource(PerformanceRecord, MarketRegimeInput);

    impl PerformanceSource for FixedSource {
        fn run_round(
            &mut self,
            _agent: &AgentState,
            _rng: &mut dyn RngCore,
        ) -> Result<RoundOutcome> {
            Ok(RoundOutcome {
                performance: self.0.clone(),
                market: self.1,
            })
        }
    }

    fn config(dir: &std::path::Path) -> KillcoreConfig {
        let mut config = KillcoreConfig::default();
        config.runner.state_dir = dir.join("state");
        config.runner.lock_path = dir.join("killcore.lock");
        config
    }

    #[test]
    fn test_round_persists_and_archives() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = RoundRunner::new(config(dir.path()), PaperSimulator::default());
        let mut rng = ChaCha8Rng::seed_from_u64(17);
        runner.initialize_agent(None, false, &mut rng).unwrap();

        let report = runner.run_round(&mut rng).unwrap();
        assert_eq!(report.round, 1);
        assert_eq!(report.generation, 1);
        assert_eq!(report.live_rounds, 1);
        assert!(report.archive_dir.join("agent.json").exists());
        assert_eq!(runner.store().load_agent().unwrap().generation, 1);

        let report = runner.run_round(&mut rng).unwrap();
        assert_eq!(report.round, 2);
        assert_eq!(report.generation, 2);
    }

    #[test]
    fn test_malformed_round_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut bad = record(1.0, 1.0);
        bad.win_rate = 150.0;
        let mut runner = RoundRunner::new(
            config(dir.path()),
            FixedSource(bad, MarketRegimeInput::new(3.0, 0.5)),
        );
        runner.store().save_agent(&agent()).unwrap();

        let err = runner
            .run_round(&mut ChaCha8Rng::seed_from_u64(1))
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(runner.store().load_performance().unwrap().is_none());
        assert_eq!(runner.store().load_agent().unwrap(), agent());
        assert_eq!(runner.archiver().latest_round().unwrap(), 0);
    }

    #[test]
    fn test_ingest_without_market_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = RoundRunner::new(
            config(dir.path()),
            FixedSource(record(1.0, 1.0), MarketRegimeInput::default()),
        );
        runner.store().save_agent(&agent()).unwrap();
        runner.store().save_performance(&record(1.0, 1.0)).unwrap();

        let report = runner
            .ingest_recorded(&mut ChaCha8Rng::seed_from_u64(3))
            .unwrap();
        assert_eq!(report.regime, RegimeType::Stable);
    }

    #[test]
    fn test_initialize_keeps_existing_agent() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RoundRunner::new(config(dir.path()), PaperSimulator::default());
        runner.store().save_agent(&agent()).unwrap();
        let kept = runner
            .initialize_agent(None, false, &mut ChaCha8Rng::seed_from_u64(0))
            .unwrap();
        assert_eq!(kept, agent());

        let fresh = runner
            .initialize_agent(None, true, &mut ChaCha8Rng::seed_from_u64(0))
            .unwrap();
        assert_eq!(fresh.generation, 0);
        assert!(fresh.genetic_id.is_some());
    }

    #[test]
    fn test_trend_round_records_decision_in_trace() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = RoundRunner::new(
            config(dir.path()),
            FixedSource(record(1.0, 1.0), MarketRegimeInput::new(7.0, 0.7)),
        );
        runner.store().save_agent(&agent()).unwrap();

        let report = runner.run_round(&mut ChaCha8Rng::seed_from_u64(6)).unwrap();
        assert_eq!(report.regime, RegimeType::Trend);

        let snapshot = runner.store().load_memory().unwrap();
        let last = snapshot.evolution_trace.last().unwrap();
        assert_eq!(last.generation, 0);
        assert_eq!(last.style, StyleProfile::Balanced);

        let event = last.evolution.as_ref().unwrap();
        assert_eq!(event.generation, 1);
        assert_eq!(event.regime, RegimeType::Trend);
        assert_eq!(
            event.style_change,
            Some(StyleChange {
                from: StyleProfile::Balanced,
                to: StyleProfile::Explosive,
            })
        );
        assert_eq!(event.intent, report.intent);
        assert!(!event.frozen);

        let saved = std::fs::read_to_string(runner.store().dir().join("memory.json")).unwrap();
        assert!(saved.contains(r#""regime": "trend""#));

        let scores = snapshot.history[0].context.score_snapshot;
        assert_eq!(scores.init_bias_score, 0.2);
        assert_eq!(scores.risk_tolerance, 0.1);
    }

    #[test]
    fn test_round_refused_while_lock_held() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let held = InstanceLock::try_acquire(&config.runner.lock_path)
            .unwrap()
            .unwrap();
        let mut runner = RoundRunner::new(config, PaperSimulator::default());
        runner.store().save_agent(&agent()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(2);

        let err = runner.exclusive(|r| r.run_round(&mut rng)).unwrap_err();
        assert!(matches!(err, EvolutionError::PersistenceUnavailable(_)));
        assert_eq!(runner.store().load_agent().unwrap(), agent());
        assert_eq!(runner.archiver().latest_round().unwrap(), 0);

        held.release();
        let report = runner.exclusive(|r| r.run_round(&mut rng)).unwrap();
        assert_eq!(report.round, 1);
        assert!(!dir.path().join("killcore.lock").exists());
    }

    #[test]
    fn test_graded_ingest_uses_stored_evaluation() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = RoundRunner::new(
            config(dir.path()),
            FixedSource(record(1.0, 1.0), MarketRegimeInput::default()),
        );
        runner.store().save_agent(&agent()).unwrap();
        runner.store().save_performance(&record(1.0, 1.0)).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(8);

        let err = runner.ingest_graded(&mut rng).unwrap_err();
        assert!(matches!(err, EvolutionError::PersistenceUnavailable(_)));
        assert_eq!(runner.archiver().latest_round().unwrap(), 0);

        // one round of memory alone would grade far below S+
        let external = SelfEvaluation {
            evolution_grade: Grade::SPlus,
            trend_score: 7,
            trend_report: TrendReport {
                return_trend: TrendDirection::Up,
                drawdown_trend: TrendDirection::Down,
                return_std: 0.4,
                fail_count: 0,
                samples: 5,
            },
            evolution_advice: Grade::SPlus.advice().to_string(),
        };
        runner.store().save_evaluation(&external).unwrap();

        let report = runner.ingest_graded(&mut rng).unwrap();
        assert_eq!(report.grade.grade, Grade::SPlus);
        assert!(report.frozen);
        let after = runner.store().load_agent().unwrap();
        assert_eq!(after.parameters, agent().parameters);
        assert_eq!(after.generation, 1);
    }

    #[test]
    fn test_evaluate_requires_history() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RoundRunner::new(config(dir.path()), PaperSimulator::default());
        assert!(matches!(
            runner.evaluate(),
            Err(EvolutionError::InsufficientData { .. })
        ));
    }
}
