use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Duration as ChronoDuration;

use recsim_eval::{
    CalibrationParams, CandidateSet, CaseContext, Continuation, EvalError, EvaluationConfig,
    Evaluator, Event, EventLog, ExecutionError, Infeasibility, ProcessSimulator, Recommendation,
    ResourceAvailability, SimulatedEvent, SimulationRequest, SimulatorError, Timestamp, Trace,
};

/// Simulator whose outcomes are a fixed table keyed by (case, run).
struct ScriptedSimulator {
    busy: Vec<&'static str>,
    minutes: HashMap<(&'static str, usize), i64>,
    fail: Vec<(&'static str, usize)>,
    requests: Mutex<Vec<SimulationRequest>>,
}

impl ScriptedSimulator {
    fn new() -> Self {
        let minutes = HashMap::from([
            (("A", 0), 110),
            (("A", 1), 120),
            (("C", 0), 180),
            (("C", 1), 170),
        ]);
        Self {
            busy: vec!["busy"],
            minutes,
            fail: Vec::new(),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl ProcessSimulator for ScriptedSimulator {
    fn check_executable(
        &self,
        _context: &CaseContext,
        candidate: &Recommendation,
        _availability: &ResourceAvailability,
        _starting_time: Timestamp,
    ) -> Result<(), Infeasibility> {
        if self.busy.contains(&candidate.resource.as_str()) {
            return Err(Infeasibility::ResourceUnavailable {
                resource: candidate.resource.clone(),
            });
        }
        Ok(())
    }

    fn simulate(&self, request: &SimulationRequest) -> Result<Continuation, SimulatorError> {
        self.requests.lock().unwrap().push(request.clone());
        let case = request.recommendation.case_id.as_str();
        if self.fail.iter().any(|(c, r)| *c == case && *r == request.run) {
            return Err(SimulatorError::failed("model deadlocked"));
        }
        let minutes = self
            .minutes
            .iter()
            .find(|((c, r), _)| *c == case && *r == request.run)
            .map(|(_, m)| *m)
            .ok_or_else(|| SimulatorError::failed("unscripted request"))?;
        Ok(Continuation::new(vec![
            SimulatedEvent {
                activity: request.recommendation.activity.clone(),
                resource: Some(request.recommendation.resource.clone()),
                timestamp: request.starting_time + ChronoDuration::minutes(5),
            },
            SimulatedEvent {
                activity: "close".to_string(),
                resource: None,
                timestamp: request.starting_time + ChronoDuration::minutes(minutes),
            },
        ]))
    }
}

fn log() -> EventLog {
    EventLog::new(vec![
        Trace::new(
            "A",
            vec![
                Event::new("open", Some("ann".into()), "2024-01-01 08:00:00"),
                Event::new("close", Some("ann".into()), "2024-01-01 10:40:00.000"),
            ],
        ),
        Trace::new(
            "B",
            vec![
                Event::new("open", Some("bob".into()), "2024-01-01 08:30:00"),
                Event::new("close", Some("bob".into()), "2024-01-01T09:50:00+01:00"),
            ],
        ),
        Trace::new(
            "C",
            vec![
                Event::new("open", Some("carl".into()), "2024-01-01 07:00:00"),
                Event::new("review", Some("carl".into()), "2024-01-01 10:00:00"),
                Event::new("close", Some("carl".into()), "2024-01-01 12:20:00"),
            ],
        ),
    ])
}

fn row(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn candidates() -> Vec<CandidateSet> {
    vec![
        CandidateSet::from_columns(
            &row(&[("case:concept:name", "A"), ("act_1", "fast"), ("res_1", "ann")]),
            3,
        )
        .unwrap(),
        CandidateSet::from_columns(
            &row(&[
                ("case:concept:name", "B"),
                ("act_1", "x"),
                ("res_1", "busy"),
                ("act_2", "y"),
                ("res_2", "busy"),
            ]),
            3,
        )
        .unwrap(),
        CandidateSet::from_columns(
            &row(&[
                ("case:concept:name", "C"),
                ("act_1", "slow"),
                ("res_1", "busy"),
                ("act_2", "slow"),
                ("res_2", "bob"),
            ]),
            3,
        )
        .unwrap(),
    ]
}

fn config(workers: usize) -> EvaluationConfig {
    let mut config = EvaluationConfig::new("2024-01-01 09:00:00");
    config.n_sim = 2;
    config.seed = Some(7);
    config.runtime.workers = workers;
    config.runtime.simulation_timeout_ms = 5_000;
    config
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn evaluate_end_to_end() {
    let simulator = Arc::new(ScriptedSimulator::new());
    let factory_sim = Arc::clone(&simulator);
    let factory = move |log: &EventLog, params: &CalibrationParams| -> Result<Arc<dyn ProcessSimulator>, SimulatorError> {
        assert_eq!(log.len(), 3);
        assert_eq!(*params, CalibrationParams::default());
        let simulator: Arc<dyn ProcessSimulator> = factory_sim.clone();
        Ok(simulator)
    };

    let evaluator = Evaluator::new(config(1)).unwrap();
    let report = evaluator
        .evaluate(&factory, &log(), &candidates(), ResourceAvailability::default())
        .unwrap();

    // Result table.
    let rows = &report.results.rows;
    assert_eq!(report.results.n_sim, 2);
    assert_eq!(rows.len(), 3);
    assert!(approx(rows[0].cycle_real, 100.0));
    assert!(approx(rows[1].cycle_real, 50.0));
    assert!(approx(rows[2].cycle_real, 200.0));
    assert_eq!(rows[0].top_k.map(|r| r.get()), Some(1));
    assert!(rows[1].top_k.is_none() && rows[1].act_rec.is_none() && rows[1].res_rec.is_none());
    assert_eq!(rows[1].cycle_sim, vec![50.0, 50.0]);
    assert_eq!(rows[2].top_k.map(|r| r.get()), Some(2));
    assert_eq!(rows[2].res_rec.as_deref(), Some("bob"));
    assert_eq!(rows[2].cycle_sim, vec![180.0, 170.0]);
    for row in rows {
        assert!(row.cycle_real >= 0.0);
    }

    // Statistics over feasible cases only.
    let stats = &report.statistics;
    let mean = stats.mean_deviation.unwrap();
    assert!(approx(mean.mean, -5.0));
    assert!(approx(mean.std, 0.0));
    assert!(approx(stats.sum_deviation.unwrap().mean, -10.0));
    assert!(approx(stats.infeasible_rate.unwrap(), 100.0 / 3.0));
    assert_eq!(stats.failed_simulations, 0);
    assert!(stats.to_string().contains("33.33% not possible recommendations."));

    // Simulation logs: one per run, infeasible case absent, sorted, reindexed.
    assert_eq!(report.simulation_logs.len(), 2);
    for log in &report.simulation_logs {
        assert_eq!(log.rows.len(), 4);
        assert!(log.rows.iter().all(|r| r.case_id.as_str() != "B"));
        assert!(log.rows.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert!(log.rows.iter().enumerate().all(|(i, r)| r.index == i));
    }

    // The selection was made once: every run simulated the same choices, and
    // the infeasible case was never simulated.
    let requests = simulator.requests.lock().unwrap();
    assert_eq!(requests.len(), 4);
    assert!(requests.iter().all(|r| r.recommendation.case_id.as_str() != "B"));
    assert!(requests
        .iter()
        .filter(|r| r.recommendation.case_id.as_str() == "C")
        .all(|r| r.recommendation.resource == "bob"));
    assert!(requests.iter().all(|r| r.n_repetitions == 1 && r.remove_head_tail == 0));
    let seeds: Vec<Option<u64>> = requests.iter().map(|r| r.seed).collect();
    assert_eq!(seeds, vec![Some(7), Some(9), Some(10), Some(12)]);
    // Prefix for C stops at the split time.
    let c = requests.iter().find(|r| r.recommendation.case_id.as_str() == "C").unwrap();
    assert_eq!(c.recommendation.prefix.len(), 1);
}

#[test]
fn parallel_workers_match_sequential_results() {
    let sequential = Evaluator::new(config(1))
        .unwrap()
        .evaluate_with(
            Arc::new(ScriptedSimulator::new()),
            &log(),
            &candidates(),
            ResourceAvailability::default(),
        )
        .unwrap();
    let parallel = Evaluator::new(config(4))
        .unwrap()
        .evaluate_with(
            Arc::new(ScriptedSimulator::new()),
            &log(),
            &candidates(),
            ResourceAvailability::default(),
        )
        .unwrap();

    assert_eq!(sequential.results, parallel.results);
    assert_eq!(sequential.statistics, parallel.statistics);
    assert_eq!(sequential.simulation_logs, parallel.simulation_logs);
}

#[test]
fn failing_simulation_is_isolated_and_counted() {
    let mut simulator = ScriptedSimulator::new();
    simulator.fail.push(("A", 1));

    let report = Evaluator::new(config(2))
        .unwrap()
        .evaluate_with(Arc::new(simulator), &log(), &candidates(), ResourceAvailability::default())
        .unwrap();

    let stats = &report.statistics;
    assert_eq!(stats.failed_simulations, 1);
    assert!(approx(stats.runs[0].mean_deviation.unwrap(), -5.0));
    // Run 2 only has case C left: 170 - 200.
    assert_eq!(stats.runs[1].cases, 1);
    assert!(approx(stats.runs[1].mean_deviation.unwrap(), -30.0));
    // Failed cell reports the real value in the table and adds no log rows.
    assert_eq!(report.results.rows[0].cycle_sim, vec![110.0, 100.0]);
    assert!(report.simulation_logs[1]
        .rows
        .iter()
        .all(|r| r.case_id.as_str() == "C"));
    assert!(stats.to_string().contains("1 simulations failed."));
}

#[test]
fn case_missing_from_log_is_fatal() {
    let mut sets = candidates();
    sets.push(CandidateSet::new("Z", vec![Recommendation::new("a", "ann")]));

    let err = Evaluator::new(config(1))
        .unwrap()
        .evaluate_with(
            Arc::new(ScriptedSimulator::new()),
            &log(),
            &sets,
            ResourceAvailability::default(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        EvalError::Execution(ExecutionError::DataAlignment { matches: 0, .. })
    ));
}

#[test]
fn slow_simulation_times_out_without_aborting() {
    struct Slow;

    impl ProcessSimulator for Slow {
        fn check_executable(
            &self,
            _context: &CaseContext,
            _candidate: &Recommendation,
            _availability: &ResourceAvailability,
            _starting_time: Timestamp,
        ) -> Result<(), Infeasibility> {
            Ok(())
        }

        fn simulate(&self, request: &SimulationRequest) -> Result<Continuation, SimulatorError> {
            if request.recommendation.case_id.as_str() == "A" {
                std::thread::sleep(Duration::from_millis(400));
            }
            Ok(Continuation::new(vec![SimulatedEvent {
                activity: "close".to_string(),
                resource: None,
                timestamp: request.starting_time + ChronoDuration::minutes(60),
            }]))
        }
    }

    let mut config = config(2);
    config.n_sim = 1;
    config.runtime.simulation_timeout_ms = 50;
    let sets = vec![
        CandidateSet::new("A", vec![Recommendation::new("a", "ann")]),
        CandidateSet::new("C", vec![Recommendation::new("c", "carl")]),
    ];

    let report = Evaluator::new(config)
        .unwrap()
        .evaluate_with(Arc::new(Slow), &log(), &sets, ResourceAvailability::default())
        .unwrap();

    assert_eq!(report.statistics.failed_simulations, 1);
    assert_eq!(report.statistics.runs[0].cases, 1);
    assert!(approx(report.results.rows[1].cycle_sim[0], 60.0));
}

#[test]
fn full_queue_submissions_are_counted_as_failed() {
    /// Holds the only worker on case A long enough to back up the queue.
    struct Stuck;

    impl ProcessSimulator for Stuck {
        fn check_executable(
            &self,
            _context: &CaseContext,
            _candidate: &Recommendation,
            _availability: &ResourceAvailability,
            _starting_time: Timestamp,
        ) -> Result<(), Infeasibility> {
            Ok(())
        }

        fn simulate(&self, request: &SimulationRequest) -> Result<Continuation, SimulatorError> {
            if request.recommendation.case_id.as_str() == "A" {
                std::thread::sleep(Duration::from_millis(600));
            }
            Ok(Continuation::new(vec![SimulatedEvent {
                activity: "close".to_string(),
                resource: None,
                timestamp: request.starting_time + ChronoDuration::minutes(60),
            }]))
        }
    }

    let mut config = config(1);
    config.n_sim = 1;
    config.runtime.queue_capacity = 1;
    config.runtime.simulation_timeout_ms = 100;
    let sets = vec![
        CandidateSet::new("A", vec![Recommendation::new("a", "ann")]),
        CandidateSet::new("B", vec![Recommendation::new("b", "bob")]),
        CandidateSet::new("C", vec![Recommendation::new("c", "carl")]),
    ];

    let report = Evaluator::new(config)
        .unwrap()
        .evaluate_with(Arc::new(Stuck), &log(), &sets, ResourceAvailability::default())
        .unwrap();

    // A times out, B never leaves the queue, C is rejected by the full queue.
    let stats = &report.statistics;
    assert_eq!(stats.failed_simulations, 3);
    assert_eq!(stats.runs[0].cases, 0);
    assert!(stats.mean_deviation.is_none());
    assert!(stats.to_string().contains("3 simulations failed."));
    for row in &report.results.rows {
        assert_eq!(row.cycle_sim, vec![row.cycle_real]);
    }
    assert!(report.simulation_logs[0].rows.is_empty());
}
