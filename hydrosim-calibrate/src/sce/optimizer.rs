use super::candidates::{uniform_in, CandidateFactory, FreeParameters};
use super::log::{LogLevel, OptimizerLog};
use super::parameters::SceParameters;
use super::termination::{MaxEvaluations, Progress, TerminationCondition};
use super::{CancellationToken, OptimizerStatus};
use crate::objectives::{ObjectiveEvaluator, ObjectiveScores};
use crate::{CalibrationError, CalibrationResult};
use hydrosim_core::config::SystemConfig;
use hydrosim_core::parameters::{Hypercube, ParameterSpace};
use log::{debug, info, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::time::Instant;

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub status: OptimizerStatus,
    pub best: ObjectiveScores,
    /// Final population, best first.
    pub population: Vec<ObjectiveScores>,
    pub generations: usize,
    pub evaluations: usize,
}

impl OptimizationResult {
    pub fn best_parameters(&self) -> &Hypercube {
        self.best.parameters()
    }
}

#[derive(Debug, Clone)]
struct Point {
    values: Vec<f64>,
    scores: ObjectiveScores,
}

impl Point {
    fn cost(&self) -> f64 {
        self.scores.cost()
    }
}

fn sort_points(points: &mut [Point]) {
    points.sort_by(|a, b| a.cost().total_cmp(&b.cost()));
}

/// Deal a sorted population into complexes: complex `k` takes points `k`, `k + p`, ...
fn deal(population: Vec<Point>, complexes: usize) -> Vec<Vec<Point>> {
    let mut dealt: Vec<Vec<Point>> = vec![Vec::new(); complexes];
    for (i, point) in population.into_iter().enumerate() {
        dealt[i % complexes].push(point);
    }
    dealt
}

/// Selection weights of the points of a sorted complex, best first.
fn trapezoid_weights(m: usize, density: f64) -> Vec<f64> {
    let mid = (m as f64 + 1.0) / 2.0;
    (1..=m)
        .map(|i| density * (m + 1 - i) as f64 + (1.0 - density) * mid)
        .collect()
}

/// Draw `q` distinct indices with probabilities proportional to `weights`.
fn select_parents<R: Rng + ?Sized>(weights: &[f64], q: usize, rng: &mut R) -> Vec<usize> {
    let mut available: Vec<usize> = (0..weights.len()).collect();
    let mut chosen = Vec::with_capacity(q);
    while chosen.len() < q && !available.is_empty() {
        let total: f64 = available.iter().map(|&i| weights[i]).sum();
        let mut target = rng.gen::<f64>() * total;
        let mut pick = available.len() - 1;
        for (k, &i) in available.iter().enumerate() {
            if target < weights[i] {
                pick = k;
                break;
            }
            target -= weights[i];
        }
        chosen.push(available.remove(pick));
    }
    chosen
}

/// `from + ratio * (towards - from)`
fn step(from: &[f64], towards: &[f64], ratio: f64) -> Vec<f64> {
    from.iter()
        .zip(towards)
        .map(|(g, w)| g + ratio * (w - g))
        .collect()
}

/// Smallest box holding every point of a complex.
fn bounding_box(complex: &[Point]) -> (Vec<f64>, Vec<f64>) {
    let n = complex.first().map_or(0, |p| p.values.len());
    let mut lower = vec![f64::INFINITY; n];
    let mut upper = vec![f64::NEG_INFINITY; n];
    for point in complex {
        for (j, x) in point.values.iter().enumerate() {
            lower[j] = lower[j].min(*x);
            upper[j] = upper[j].max(*x);
        }
    }
    (lower, upper)
}

fn log_point(
    log: &mut OptimizerLog,
    free: &FreeParameters,
    point: &Point,
    generation: usize,
    evaluations: usize,
    category: &str,
) {
    let mut numeric: Vec<(&str, f64)> = vec![
        ("Generation", generation as f64),
        ("Evaluations", evaluations as f64),
    ];
    numeric.extend(point.scores.scores().iter().map(|(n, v)| (n.as_str(), *v)));
    numeric.extend(free.names.iter().map(String::as_str).zip(point.values.iter().copied()));
    log.push_row(&numeric, &[("Category", category)]);
}

/// Run `f` on every item, on the pool with one objective clone per worker, or serially on
/// a single clone.
fn run_each<T, R, F>(
    pool: Option<&ThreadPool>,
    objective: &dyn ObjectiveEvaluator,
    items: Vec<T>,
    f: F,
) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(&mut dyn ObjectiveEvaluator, T) -> R + Send + Sync,
{
    match pool {
        Some(pool) => pool.install(|| {
            items
                .into_par_iter()
                .map_init(|| objective.box_clone(), |o, item| f(o.as_mut(), item))
                .collect()
        }),
        None => {
            let mut o = objective.box_clone();
            items.into_iter().map(|item| f(o.as_mut(), item)).collect()
        }
    }
}

/// A complex after evolution.
struct Evolved {
    complex: Vec<Point>,
    evaluations: usize,
    /// Every evaluated offspring, kept for detailed logs only.
    offspring: Vec<Point>,
}

/// Read-only state shared by the workers of a run.
struct Evolution<'a> {
    template: &'a dyn ParameterSpace,
    free: &'a FreeParameters,
    parameters: &'a SceParameters,
    score_names: &'a [String],
    maximizable: bool,
    keep_offspring: bool,
}

impl Evolution<'_> {
    fn evaluate(
        &self,
        objective: &mut dyn ObjectiveEvaluator,
        values: Vec<f64>,
    ) -> CalibrationResult<Point> {
        let mut candidate = self.template.box_clone();
        for (name, value) in self.free.names.iter().zip(&values) {
            candidate.set_value(name, *value)?;
        }
        let scores = match objective.evaluate_score_for_parameters(candidate.as_ref()) {
            Ok(scores) => scores,
            Err(e) if e.is_numeric_failure() => {
                warn!("Candidate {:?} is scored as dominated: {}", values, e);
                ObjectiveScores::dominated(
                    self.score_names,
                    candidate.to_hypercube()?,
                    self.maximizable,
                )
            }
            Err(e) => return Err(e),
        };
        Ok(Point { values, scores })
    }

    /// Competitive complex evolution of one sorted complex.
    fn evolve(
        &self,
        objective: &mut dyn ObjectiveEvaluator,
        mut complex: Vec<Point>,
        seed: u64,
    ) -> CalibrationResult<Evolved> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let m = complex.len();
        let q = self.parameters.points_per_subcomplex.min(m);
        let weights = trapezoid_weights(m, self.parameters.trapezoidal_density);
        let mut evaluations = 0;
        let mut offspring = Vec::new();

        for _ in 0..self.parameters.evolution_steps {
            let mut parents = select_parents(&weights, q, &mut rng);
            parents.sort_by(|a, b| complex[*a].cost().total_cmp(&complex[*b].cost()));

            for _ in 0..self.parameters.offspring {
                let worst = parents[q - 1];
                let worst_cost = complex[worst].cost();
                let worst_values = complex[worst].values.clone();
                let centroid: Vec<f64> = (0..worst_values.len())
                    .map(|j| {
                        parents[..q - 1]
                            .iter()
                            .map(|&i| complex[i].values[j])
                            .sum::<f64>()
                            / (q - 1) as f64
                    })
                    .collect();
                let (lower, upper) = bounding_box(&complex);

                let mut reflection =
                    step(&centroid, &worst_values, self.parameters.reflection_ratio);
                if !self.free.contains(&reflection) {
                    reflection = uniform_in(&lower, &upper, &mut rng);
                }
                let mut child = self.evaluate(objective, reflection)?;
                evaluations += 1;

                if !(child.cost() < worst_cost) {
                    if self.keep_offspring {
                        offspring.push(child.clone());
                    }
                    let mut contraction =
                        step(&centroid, &worst_values, self.parameters.contraction_ratio);
                    self.free.clamp(&mut contraction);
                    child = self.evaluate(objective, contraction)?;
                    evaluations += 1;

                    if !(child.cost() < worst_cost) {
                        if self.keep_offspring {
                            offspring.push(child.clone());
                        }
                        child = self.evaluate(objective, uniform_in(&lower, &upper, &mut rng))?;
                        evaluations += 1;
                    }
                }
                if self.keep_offspring {
                    offspring.push(child.clone());
                }
                complex[worst] = child;
                parents.sort_by(|a, b| complex[*a].cost().total_cmp(&complex[*b].cost()));
            }
            sort_points(&mut complex);
        }
        Ok(Evolved {
            complex,
            evaluations,
            offspring,
        })
    }
}

/// Shuffled complex evolution optimiser.
///
/// ```ignore
/// let mut optimizer = SceOptimizer::new(objective, Box::new(template))
///     .with_termination(create_termination("marginal", &[])?)
///     .with_config(SystemConfig::current().with_seed(42));
/// let result = optimizer.run()?;
/// ```
#[derive(Debug)]
pub struct SceOptimizer {
    objective: Box<dyn ObjectiveEvaluator>,
    template: Box<dyn ParameterSpace>,
    parameters: SceParameters,
    termination: Box<dyn TerminationCondition>,
    candidates: CandidateFactory,
    config: SystemConfig,
    log_level: LogLevel,
    cancellation: CancellationToken,
    status: OptimizerStatus,
    log: OptimizerLog,
}

impl SceOptimizer {
    /// An optimiser of the free parameters of `template`, with settings sized for them.
    pub fn new(objective: Box<dyn ObjectiveEvaluator>, template: Box<dyn ParameterSpace>) -> Self {
        let free = template
            .parameters()
            .map(|ps| ps.iter().filter(|p| p.max > p.min).count())
            .unwrap_or(4);
        Self {
            objective,
            template,
            parameters: SceParameters::for_free_parameters(free),
            termination: Box::new(MaxEvaluations::default()),
            candidates: CandidateFactory::default(),
            config: SystemConfig::current(),
            log_level: LogLevel::default(),
            cancellation: CancellationToken::new(),
            status: OptimizerStatus::Configured,
            log: OptimizerLog::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: SceParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_termination(mut self, termination: Box<dyn TerminationCondition>) -> Self {
        self.termination = termination;
        self
    }

    pub fn with_candidate_factory(mut self, candidates: CandidateFactory) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn with_config(mut self, config: SystemConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// A handle that cancels the run at the end of the current generation.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn parameters(&self) -> &SceParameters {
        &self.parameters
    }

    pub fn status(&self) -> OptimizerStatus {
        self.status
    }

    /// Log of the latest run.
    pub fn log(&self) -> &OptimizerLog {
        &self.log
    }

    fn thread_pool(&self) -> CalibrationResult<Option<ThreadPool>> {
        if self.config.max_threads <= 1 {
            return Ok(None);
        }
        if !(self.objective.supports_thread_safe_cloning()
            && self.template.supports_thread_safe_cloning())
        {
            debug!("Objective or parameter space cannot be cloned across threads, running serially");
            return Ok(None);
        }
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.max_threads)
            .build()
            .map(Some)
            .map_err(|e| CalibrationError::Optimizer(e.to_string()))
    }

    /// Run the optimisation to termination.
    ///
    /// Fails if the template is out of bounds or has no free parameter. Candidates whose
    /// simulation fails numerically are scored as dominated and the search goes on.
    pub fn run(&mut self) -> CalibrationResult<OptimizationResult> {
        let result = self.optimize();
        if result.is_err() {
            self.status = OptimizerStatus::Configured;
        }
        result
    }

    fn optimize(&mut self) -> CalibrationResult<OptimizationResult> {
        if !self.template.is_within_bounds() {
            return Err(CalibrationError::Optimizer(
                "the parameter space is out of bounds".to_string(),
            ));
        }
        self.parameters.validate()?;
        let free = FreeParameters::from_space(self.template.as_ref())?;
        if free.is_empty() {
            return Err(CalibrationError::Configuration(
                "the parameter space has no free parameter".to_string(),
            ));
        }
        let score_names = self.objective.score_names();
        let pool = self.thread_pool()?;
        let seed = self
            .config
            .seed
            .unwrap_or_else(|| rand::thread_rng().gen());
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        self.termination.reset();
        self.log = OptimizerLog::new();
        self.status = OptimizerStatus::Running;
        let start = Instant::now();
        let m = self.parameters.points_per_complex;
        let mut complexes = self.parameters.complexes;
        info!(
            "SCE started: {} free parameters, {} complexes of {} points, {}",
            free.len(),
            complexes,
            m,
            pool.as_ref()
                .map_or("serial".to_string(), |p| format!("{} threads", p.current_num_threads()))
        );

        let evolution = Evolution {
            template: self.template.as_ref(),
            free: &free,
            parameters: &self.parameters,
            score_names: &score_names,
            maximizable: self.objective.is_maximizable(),
            keep_offspring: self.log_level >= LogLevel::Detailed,
        };
        let objective = self.objective.as_ref();

        let initial = self.candidates.generate(complexes * m, &free, &mut rng);
        let mut population = run_each(pool.as_ref(), objective, initial, |o, values| {
            evolution.evaluate(o, values)
        })
        .into_iter()
        .collect::<CalibrationResult<Vec<_>>>()?;
        let mut evaluations = population.len();
        if self.log_level >= LogLevel::Detailed {
            for point in &population {
                log_point(&mut self.log, &free, point, 0, evaluations, "Evaluation");
            }
        }
        sort_points(&mut population);
        if self.log_level >= LogLevel::Generation {
            log_point(
                &mut self.log,
                &free,
                &population[0],
                0,
                evaluations,
                "Initial population",
            );
        }

        let ranges = free.ranges();
        let mut generation = 0;
        let status = loop {
            if self.cancellation.is_cancelled() {
                break OptimizerStatus::Cancelled;
            }
            let dealt: Vec<(Vec<Point>, u64)> = deal(population, complexes)
                .into_iter()
                .map(|complex| (complex, rng.gen()))
                .collect();
            let evolved = run_each(pool.as_ref(), objective, dealt, |o, (complex, seed)| {
                evolution.evolve(o, complex, seed)
            })
            .into_iter()
            .collect::<CalibrationResult<Vec<_>>>()?;

            generation += 1;
            population = Vec::with_capacity(complexes * m);
            for e in evolved {
                evaluations += e.evaluations;
                for point in &e.offspring {
                    log_point(&mut self.log, &free, point, generation, evaluations, "Evaluation");
                }
                population.extend(e.complex);
            }
            sort_points(&mut population);
            if complexes > self.parameters.min_complexes {
                complexes -= 1;
                population.truncate(complexes * m);
            }

            let best = &population[0];
            debug!(
                "SCE generation {}: best {} = {} after {} evaluations",
                generation,
                best.scores.primary_name(),
                best.scores.value(),
                evaluations
            );
            if self.log_level >= LogLevel::Generation {
                log_point(&mut self.log, &free, best, generation, evaluations, "Shuffle");
            }

            let points: Vec<Vec<f64>> = population.iter().map(|p| p.values.clone()).collect();
            let progress = Progress {
                generation,
                evaluations,
                elapsed: start.elapsed(),
                best_cost: best.cost(),
                points: &points,
                ranges: &ranges,
            };
            if let Some(status) = self.termination.check(&progress) {
                break status;
            }
            if generation >= self.parameters.max_shuffles {
                break OptimizerStatus::MaxIterations;
            }
        };

        self.status = status;
        let population: Vec<ObjectiveScores> = population.into_iter().map(|p| p.scores).collect();
        let best = population[0].clone();
        info!(
            "SCE {} after {} generations and {} evaluations: best {} = {}",
            status,
            generation,
            evaluations,
            best.primary_name(),
            best.value()
        );
        Ok(OptimizationResult {
            status,
            best,
            population,
            generations: generation,
            evaluations,
        })
    }
}
