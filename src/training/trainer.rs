//! Epoch loop: evaluate in parallel, rank, breed, repeat.
//!
//! A [`Trainer`] owns its strategy until [`Trainer::start`] moves it onto a
//! dedicated thread. Evaluations run on a private rayon pool. Observers read
//! progress through the state accessors and the scoped leaderboard lock.

use std::any::Any;
use std::fmt;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;

use super::cancel::CancelToken;
use super::leaderboard::{FitnessRecord, Leaderboard, LeaderboardSnapshot};
use super::strategy::{BrainSource, EvolutionStrategy};
use crate::brain::{Brain, BrainKind};
use crate::error::{BrainError, EvalError, TrainError};
use crate::genome::Genome;
use crate::simulation::sensors::format_cost;

/// Fitness callback: lower is better. Must return promptly once the token is cancelled.
pub type EvalFn = Arc<dyn Fn(&Brain, &CancelToken) -> Result<f64, EvalError> + Send + Sync>;

/// Parameters of one training run.
#[derive(Clone)]
pub struct TrainParams {
    /// Number of epochs before the run completes.
    pub max_epochs: usize,
    /// Fitness callback.
    pub eval_fn: EvalFn,
    /// Evaluation threads. None uses the available parallelism plus one.
    pub worker_threads: Option<usize>,
}

impl TrainParams {
    /// Creates parameters with the default worker count.
    pub fn new(
        max_epochs: usize,
        eval_fn: impl Fn(&Brain, &CancelToken) -> Result<f64, EvalError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            max_epochs,
            eval_fn: Arc::new(eval_fn),
            worker_threads: None,
        }
    }

    fn validate(&self) -> Result<(), TrainError> {
        if self.max_epochs == 0 {
            return Err(TrainError::InvalidParams("max_epochs must be positive".into()));
        }
        if self.worker_threads == Some(0) {
            return Err(TrainError::InvalidParams("worker_threads must be positive".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for TrainParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainParams")
            .field("max_epochs", &self.max_epochs)
            .field("worker_threads", &self.worker_threads)
            .finish_non_exhaustive()
    }
}

/// Lifecycle of a trainer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrainState {
    /// Created, not started.
    Idle,
    /// Epoch loop running.
    Running,
    /// Shutdown requested, waiting for in-flight evaluations.
    Stopping,
    /// Ended by shutdown.
    Stopped,
    /// Ran all epochs.
    Completed,
    /// Ended by an error.
    Failed,
}

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainOutcome {
    /// Shutdown was requested.
    Stopped,
    /// All epochs ran.
    Completed,
}

/// Summary of one finished epoch.
#[derive(Debug, Clone, Serialize)]
pub struct EpochStats {
    /// Epoch index.
    pub epoch: usize,
    /// Number of genomes evaluated.
    pub population: usize,
    /// Lowest cost of the epoch.
    pub best_cost: f64,
    /// Mean cost of the epoch.
    pub mean_cost: f64,
    /// Wall time spent on the epoch.
    pub elapsed: Duration,
}

struct Published {
    leaderboard: Leaderboard,
    source: BrainSource,
}

struct Shared {
    state: Mutex<TrainState>,
    epoch: AtomicUsize,
    published: Mutex<Published>,
    last_stats: Mutex<Option<EpochStats>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Runs a strategy's epoch loop on a background thread.
pub struct Trainer {
    kind: BrainKind,
    strategy: Option<Box<dyn EvolutionStrategy>>,
    shared: Arc<Shared>,
    cancel: CancelToken,
    handle: Option<JoinHandle<Result<TrainOutcome, TrainError>>>,
}

impl Trainer {
    /// Creates an idle trainer owning `strategy`.
    pub fn new(strategy: Box<dyn EvolutionStrategy>) -> Self {
        let published = Published {
            leaderboard: Leaderboard::default(),
            source: strategy.brain_source(),
        };
        Self {
            kind: strategy.kind(),
            strategy: Some(strategy),
            shared: Arc::new(Shared {
                state: Mutex::new(TrainState::Idle),
                epoch: AtomicUsize::new(0),
                published: Mutex::new(published),
                last_stats: Mutex::new(None),
            }),
            cancel: CancelToken::new(),
            handle: None,
        }
    }

    /// Architecture being trained.
    pub fn kind(&self) -> BrainKind {
        self.kind
    }

    /// Validates `params` and launches the epoch loop.
    ///
    /// Nothing is spawned when validation fails, and the trainer stays idle.
    pub fn start(&mut self, params: TrainParams) -> Result<(), TrainError> {
        if self.state() != TrainState::Idle {
            return Err(TrainError::AlreadyStarted);
        }
        params.validate()?;
        let strategy = self.strategy.as_mut().ok_or(TrainError::AlreadyStarted)?;
        let population = strategy.seed_population();
        if population.is_empty() {
            return Err(TrainError::InvalidParams("seed population is empty".into()));
        }

        let threads = params.worker_threads.unwrap_or_else(|| {
            std::thread::available_parallelism().map_or(1, NonZeroUsize::get) + 1
        });
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("pathfinder-eval-{i}"))
            .build()?;

        let mut strategy = self.strategy.take().ok_or(TrainError::AlreadyStarted)?;
        let shared = Arc::clone(&self.shared);
        let cancel = self.cancel.clone();
        *lock(&self.shared.state) = TrainState::Running;
        log::info!(
            "Training {} for {} epochs on {threads} threads, population {}",
            self.kind.name(),
            params.max_epochs,
            population.len()
        );

        let spawned = std::thread::Builder::new()
            .name("pathfinder-trainer".into())
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    run_epochs(strategy.as_mut(), population, &params, &pool, &shared, &cancel)
                }))
                .unwrap_or_else(|payload| Err(TrainError::Panicked(panic_message(&*payload))))
                .and_then(|outcome| {
                    let leaders = lock(&shared.published).leaderboard.snapshot();
                    strategy.on_training_end(&leaders)?;
                    log_training_end(&leaders);
                    Ok(outcome)
                });

                *lock(&shared.state) = match &result {
                    Ok(TrainOutcome::Completed) => TrainState::Completed,
                    Ok(TrainOutcome::Stopped) => TrainState::Stopped,
                    Err(err) => {
                        log::error!("Training failed: {err}");
                        TrainState::Failed
                    }
                };
                result
            });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(err) => {
                *lock(&self.shared.state) = TrainState::Failed;
                Err(TrainError::Spawn(err))
            }
        }
    }

    /// Asks the loop to stop. Safe to call repeatedly or before [`Self::start`].
    pub fn request_shutdown(&self) {
        self.cancel.cancel();
        let mut state = lock(&self.shared.state);
        if *state == TrainState::Running {
            *state = TrainState::Stopping;
        }
    }

    /// Token observed by the loop and passed to evaluations.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Waits for the loop thread and returns how the run ended.
    pub fn join(&mut self) -> Result<TrainOutcome, TrainError> {
        let handle = self.handle.take().ok_or(TrainError::NotStarted)?;
        handle.join().unwrap_or_else(|payload| {
            *lock(&self.shared.state) = TrainState::Failed;
            Err(TrainError::Panicked(panic_message(&*payload)))
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TrainState {
        *lock(&self.shared.state)
    }

    /// Returns true once the loop ended for any reason.
    pub fn is_finished(&self) -> bool {
        matches!(
            self.state(),
            TrainState::Stopped | TrainState::Completed | TrainState::Failed
        )
    }

    /// Epoch currently (or last) being evaluated.
    pub fn current_epoch(&self) -> usize {
        self.shared.epoch.load(Ordering::Relaxed)
    }

    /// Stats of the most recent finished epoch.
    pub fn last_epoch_stats(&self) -> Option<EpochStats> {
        lock(&self.shared.last_stats).clone()
    }

    /// Runs `f` with the leaderboard locked.
    pub fn with_leaderboard<R>(&self, f: impl FnOnce(&Leaderboard) -> R) -> R {
        f(&lock(&self.shared.published).leaderboard)
    }

    /// Copies the leaderboard out.
    pub fn leaderboard_snapshot(&self) -> LeaderboardSnapshot {
        self.with_leaderboard(Leaderboard::snapshot)
    }

    /// Decoder matching the current leaderboard.
    pub fn brain_source(&self) -> BrainSource {
        lock(&self.shared.published).source.clone()
    }

    /// Builds a brain from a leaderboard genome.
    pub fn create_brain(&self, genome: &Genome) -> Result<Brain, BrainError> {
        self.brain_source().create_brain(genome)
    }
}

impl Drop for Trainer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.request_shutdown();
            let _ = handle.join();
        }
    }
}

fn log_training_end(leaders: &LeaderboardSnapshot) {
    match leaders.records.first() {
        Some(best) => log::info!(
            "Training ended. Best chromo: {best}, cost:{}",
            format_cost(best.cost)
        ),
        None => log::info!("Training ended before any epoch finished"),
    }
}

fn run_epochs(
    strategy: &mut dyn EvolutionStrategy,
    mut population: Vec<Genome>,
    params: &TrainParams,
    pool: &rayon::ThreadPool,
    shared: &Shared,
    cancel: &CancelToken,
) -> Result<TrainOutcome, TrainError> {
    for epoch in 0..params.max_epochs {
        if cancel.is_cancelled() {
            return Ok(TrainOutcome::Stopped);
        }
        shared.epoch.store(epoch, Ordering::Relaxed);
        let started = Instant::now();

        let source = strategy.brain_source();
        let costs = pool.install(|| {
            population
                .par_iter()
                .enumerate()
                .map(|(index, genome)| {
                    if cancel.is_cancelled() {
                        return Ok(None);
                    }
                    let brain = source.create_brain(genome)?;
                    let cost = (params.eval_fn)(&brain, cancel)
                        .map_err(|source| TrainError::Evaluation { epoch, index, source })?;
                    Ok(Some(cost))
                })
                .collect::<Result<Vec<_>, TrainError>>()
        })?;

        // Costs from a cancelled epoch are partial; drop the whole epoch.
        let costs = match costs.into_iter().collect::<Option<Vec<f64>>>() {
            Some(costs) if !cancel.is_cancelled() => costs,
            _ => {
                log::info!("Shutdown requested, discarding epoch {epoch}");
                return Ok(TrainOutcome::Stopped);
            }
        };

        let mut ranked: Vec<(Genome, FitnessRecord)> = population
            .into_iter()
            .zip(costs)
            .enumerate()
            .map(|(index, (genome, cost))| (genome, FitnessRecord { cost, epoch, index }))
            .collect();
        ranked.sort_by(|a, b| a.1.cmp(&b.1));

        let next = strategy.next_generation(epoch, &ranked)?;
        {
            let mut published = lock(&shared.published);
            strategy.record_leaders(&mut published.leaderboard, &ranked);
            published.source = strategy.brain_source();
        }

        let stats = EpochStats {
            epoch,
            population: ranked.len(),
            best_cost: ranked.first().map_or(f64::NAN, |(_, r)| r.cost),
            mean_cost: ranked.iter().map(|(_, r)| r.cost).sum::<f64>() / ranked.len() as f64,
            elapsed: started.elapsed(),
        };
        log::info!(
            "Epoch {} done in {:.2?}: population {}, best {}, mean {}",
            stats.epoch,
            stats.elapsed,
            stats.population,
            format_cost(stats.best_cost),
            format_cost(stats.mean_cost)
        );
        *lock(&shared.last_stats) = Some(stats);

        if next.is_empty() {
            return Err(TrainError::EmptyPopulation { epoch });
        }
        population = next;
    }
    Ok(TrainOutcome::Completed)
}
