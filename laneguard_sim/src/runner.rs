//! Scenario runner - scripts each scenario against a [`SimWorld`] and checks
//! the requests the lane blocker published.

use laneguard_core::{ExternalLaneStates, GraphEdge, LaneBlockerConfig, MitigationPolicy, NavGraph};
use laneguard_env::{LaneRequest, OutboundRequest};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::SimError;
use crate::scenarios::ScenarioId;
use crate::world::{SimConfig, SimWorld, WorldMetrics, FLEET};

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub scenario: ScenarioId,
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    pub final_time_secs: f64,
    pub final_obstacle_count: usize,
    pub lane_requests: usize,
    pub speed_limit_requests: usize,

    pub failure_reason: Option<String>,
    pub metrics: WorldMetrics,
}

/// Runs lane blocker scenarios.
pub struct ScenarioRunner {
    seed: u64,
    config: SimConfig,
}

impl ScenarioRunner {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            config: SimConfig {
                seed,
                ..SimConfig::default()
            },
        }
    }

    /// Base blocker configuration. Scenarios still pick their own closure
    /// threshold and mitigation policy.
    pub fn with_config(mut self, blocker: LaneBlockerConfig) -> Self {
        self.config.blocker = blocker;
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let mut config = self.config.clone();
        match scenario {
            ScenarioId::Crowd => {
                config.blocker.lane_closure_threshold = 2;
                config.blocker.mitigation = MitigationPolicy::CloseAndSpeedLimit { limit: 0.3 };
            }
            _ => {
                config.blocker.lane_closure_threshold = 3;
                config.blocker.mitigation = MitigationPolicy::Close;
            }
        }

        let mut result = ScenarioResult {
            scenario,
            seed: self.seed,
            passed: false,
            final_time_secs: 0.0,
            final_obstacle_count: 0,
            lane_requests: 0,
            speed_limit_requests: 0,
            failure_reason: None,
            metrics: WorldMetrics::default(),
        };

        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                result.failure_reason = Some(SimError::from(e).to_string());
                return result;
            }
        };
        let mut world = match SimWorld::new(config) {
            Ok(world) => world,
            Err(e) => {
                result.failure_reason = Some(e.to_string());
                return result;
            }
        };

        debug!(
            scenario = scenario.name(),
            seed = self.seed,
            "Running: {}",
            scenario.description()
        );
        let outcome = runtime.block_on(async {
            match scenario {
                ScenarioId::CorridorBlockage => corridor_blockage(&mut world).await,
                ScenarioId::BelowThreshold => below_threshold(&mut world).await,
                ScenarioId::SensorDropout => sensor_dropout(&mut world).await,
                ScenarioId::GraphRefresh => graph_refresh(&mut world).await,
                ScenarioId::TransformOutage => transform_outage(&mut world).await,
                ScenarioId::Crowd => crowd(&mut world).await,
            }
        });

        result.passed = outcome.is_ok();
        result.failure_reason = outcome.err().map(|e| e.to_string());
        result.final_time_secs = world.now().as_secs_f64();
        result.final_obstacle_count = world.snapshot().map(|s| s.obstacles).unwrap_or_default();
        result.lane_requests = world.publisher.lane_requests().len();
        result.speed_limit_requests = world.publisher.speed_limit_requests().len();
        result.metrics = world.metrics.clone();

        if let Some(reason) = &result.failure_reason {
            warn!(
                scenario = scenario.name(),
                seed = self.seed,
                reason = %reason,
                "Scenario failed"
            );
        }
        result
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn ensure(
    world: &SimWorld,
    condition: bool,
    message: impl FnOnce() -> String,
) -> Result<(), SimError> {
    if condition {
        Ok(())
    } else {
        Err(SimError::Assertion {
            at: world.now().as_secs_f64(),
            message: message(),
        })
    }
}

fn close(index: usize) -> LaneRequest {
    LaneRequest::close(FLEET, index)
}

fn open(index: usize) -> LaneRequest {
    LaneRequest::open(FLEET, index)
}

fn expect_lane_requests(world: &SimWorld, expected: &[LaneRequest]) -> Result<(), SimError> {
    let actual = world.publisher.lane_requests();
    ensure(world, actual == expected, || {
        format!("expected lane requests {:?}, got {:?}", expected, actual)
    })
}

/// Time of the first recorded request equal to `request`.
fn published_at(world: &SimWorld, request: &LaneRequest) -> Option<Duration> {
    world
        .publisher
        .recorded()
        .into_iter()
        .find(|r| matches!(&r.request, OutboundRequest::Lane(l) if l == request))
        .map(|r| r.at)
}

/// `n` obstacles spread evenly along the y = 0 corridor (lanes 0/1).
fn line_along_x(world: &mut SimWorld, n: usize) -> Vec<u64> {
    (0..n)
        .map(|i| {
            let x = 1.0 + 8.0 * (i as f64 + 0.5) / n as f64;
            world.oracle.spawn([x, 0.0], 0.0, [0.4, 0.4])
        })
        .collect()
}

/// `n` obstacles spread evenly along the x = 10 corridor (lanes 2/3).
fn line_along_y(world: &mut SimWorld, n: usize) -> Vec<u64> {
    (0..n)
        .map(|i| {
            let y = 1.0 + 8.0 * (i as f64 + 0.5) / n as f64;
            world.oracle.spawn([10.0, y], 0.3, [0.4, 0.4])
        })
        .collect()
}

// ============================================================================
// SCENARIOS
// ============================================================================

/// LG-001: close on arrival, reopen on departure well before any TTL.
/// Lane 1 is reported closed by someone else, so we neither close nor reopen it.
async fn corridor_blockage(world: &mut SimWorld) -> Result<(), SimError> {
    let threshold = world.config.blocker.lane_closure_threshold;
    let ttl = world.config.blocker.obstacle_ttl;

    world.load_graph(&SimWorld::corridor_graph()).await?;
    world.set_lane_states(ExternalLaneStates::new([1]))?;

    let ids = line_along_x(world, threshold);
    world.run_for(Duration::from_secs(1)).await?;
    expect_lane_requests(world, &[close(0)])?;
    let snapshot = world.snapshot()?;
    ensure(world, snapshot.closed.len() == 2, || {
        format!("expected lanes 0 and 1 tracked closed, got {:?}", snapshot.closed)
    })?;

    let leave_at = world.now();
    for id in ids {
        world.oracle.set_velocity(id, [0.0, 1.5]);
    }
    world.run_for(Duration::from_secs(2)).await?;

    expect_lane_requests(world, &[close(0), open(0)])?;
    let reopened = published_at(world, &open(0)).unwrap_or(Duration::MAX);
    ensure(world, reopened < leave_at + ttl, || {
        format!("lane 0 reopened at {:?}, expected departure before expiry", reopened)
    })?;
    ensure(world, world.snapshot()?.closed.is_empty(), || "lanes still closed".to_string())
}

/// LG-002: one obstacle short of the threshold never closes anything.
async fn below_threshold(world: &mut SimWorld) -> Result<(), SimError> {
    let threshold = world.config.blocker.lane_closure_threshold;
    world.load_graph(&SimWorld::corridor_graph()).await?;
    line_along_y(world, threshold - 1);

    world.run_for(Duration::from_secs(5)).await?;

    expect_lane_requests(world, &[])?;
    let snapshot = world.snapshot()?;
    ensure(world, snapshot.vicinity.get("corridor_2") == Some(&(threshold - 1)), || {
        format!("unexpected vicinity {:?}", snapshot.vicinity)
    })
}

/// LG-003: closures are lifted by expiry once the sensor stops reporting.
async fn sensor_dropout(world: &mut SimWorld) -> Result<(), SimError> {
    let threshold = world.config.blocker.lane_closure_threshold;
    let ttl = world.config.blocker.obstacle_ttl;
    let cull_period = world.config.blocker.cull_period;

    world.load_graph(&SimWorld::corridor_graph()).await?;
    line_along_y(world, threshold + 1);
    world.run_for(Duration::from_secs(1)).await?;
    expect_lane_requests(world, &[close(2), close(3)])?;

    let last_seen = world.now();
    world.set_sensor_enabled(false);
    world.run_for(ttl + Duration::from_secs(2)).await?;

    expect_lane_requests(world, &[close(2), close(3), open(2), open(3)])?;
    let reopened = published_at(world, &open(2)).unwrap_or(Duration::MAX);
    ensure(
        world,
        reopened >= last_seen + ttl && reopened <= last_seen + ttl + cull_period,
        || format!("lane 2 reopened at {:?}, last seen at {:?}", reopened, last_seen),
    )?;
    ensure(world, world.snapshot()?.obstacles == 0, || "obstacles survived expiry".to_string())
}

/// LG-004: dropping closed lanes from the graph emits nothing; restoring
/// them closes them again straight away.
async fn graph_refresh(world: &mut SimWorld) -> Result<(), SimError> {
    let threshold = world.config.blocker.lane_closure_threshold;
    let full = SimWorld::corridor_graph();
    let without_branch = NavGraph::from_edges(
        full.waypoints.clone(),
        &[GraphEdge::two_way(0, 1)],
    );

    world.load_graph(&full).await?;
    line_along_y(world, threshold);
    world.run_for(Duration::from_secs(1)).await?;
    expect_lane_requests(world, &[close(2), close(3)])?;

    let transitions = world.load_graph(&without_branch).await?;
    ensure(world, transitions.is_empty(), || format!("unexpected transitions {:?}", transitions))?;
    let snapshot = world.snapshot()?;
    ensure(world, snapshot.closed.is_empty() && snapshot.lanes == 2, || {
        format!("dropped lanes still tracked: {:?}", snapshot)
    })?;

    world.run_for(Duration::from_secs(1)).await?;
    let transitions = world.load_graph(&full).await?;
    debug!(?transitions, "Graph restored");
    expect_lane_requests(world, &[close(2), close(3), close(2), close(3)])
}

/// LG-005: while the sensor frame is missing or too slow, observations are
/// dropped and the closure expires; it comes back once lookups work again.
async fn transform_outage(world: &mut SimWorld) -> Result<(), SimError> {
    let threshold = world.config.blocker.lane_closure_threshold;
    let ttl = world.config.blocker.obstacle_ttl;
    let frame = SimWorld::sensor_mount().frame;

    world.load_graph(&SimWorld::corridor_graph()).await?;
    line_along_x(world, threshold);
    world.run_for(Duration::from_secs(1)).await?;
    expect_lane_requests(world, &[close(0), close(1)])?;

    let pose = world
        .transforms
        .remove_frame(&frame)
        .ok_or_else(|| SimError::Setup(format!("{frame} was never registered")))?;
    world.run_for(ttl + Duration::from_secs(1)).await?;
    expect_lane_requests(world, &[close(0), close(1), open(0), open(1)])?;

    let dropped_missing = world.metrics.dropped_observations;
    ensure(world, dropped_missing > 0, || "no observation was dropped".to_string())?;

    world.transforms.set_frame(frame.clone(), pose);
    world.transforms.set_latency(frame.clone(), world.config.blocker.transform_lookup_timeout * 2);
    world.run_for(Duration::from_secs(1)).await?;
    ensure(world, world.metrics.dropped_observations > dropped_missing, || {
        "slow lookups were not dropped".to_string()
    })?;
    expect_lane_requests(world, &[close(0), close(1), open(0), open(1)])?;

    world.transforms.set_latency(frame, Duration::ZERO);
    world.run_for(Duration::from_secs(1)).await?;
    expect_lane_requests(world, &[close(0), close(1), open(0), open(1), close(0), close(1)])
}

/// LG-006: random crowd. Every lane's requests alternate close/open, every
/// lane request is paired with a speed-limit request, and everything reopens
/// once the crowd is no longer seen.
async fn crowd(world: &mut SimWorld) -> Result<(), SimError> {
    let ttl = world.config.blocker.obstacle_ttl;

    world.load_graph(&SimWorld::corridor_graph()).await?;
    world.oracle.spawn_random(40, [-1.0, -1.0], [11.0, 11.0], 0.3);
    world.run_for(Duration::from_secs(20)).await?;

    world.set_sensor_enabled(false);
    world.run_for(ttl + Duration::from_secs(1)).await?;

    let lane_requests = world.publisher.lane_requests();
    ensure(world, !lane_requests.is_empty(), || "crowd never closed a lane".to_string())?;

    for index in 0..4 {
        let states: Vec<bool> = lane_requests
            .iter()
            .filter(|r| r.lane_index == index)
            .map(|r| r.closed)
            .collect();
        let alternates = states.iter().enumerate().all(|(i, closed)| *closed == (i % 2 == 0));
        ensure(world, alternates && states.len() % 2 == 0, || {
            format!("lane {} request sequence {:?}", index, states)
        })?;
    }

    let recorded = world.publisher.recorded();
    ensure(world, recorded.len() == lane_requests.len() * 2, || {
        format!("{} requests for {} lane requests", recorded.len(), lane_requests.len())
    })?;
    for pair in recorded.chunks(2) {
        let paired = match (&pair[0].request, &pair[1].request) {
            (OutboundRequest::Lane(lane), OutboundRequest::SpeedLimit(limit)) => {
                lane.lane_index == limit.lane_index && lane.closed == limit.limit.is_some()
            }
            _ => false,
        };
        ensure(world, paired, || format!("unpaired requests {:?}", pair))?;
    }

    let snapshot = world.snapshot()?;
    ensure(world, snapshot.obstacles == 0 && snapshot.closed.is_empty(), || {
        format!("crowd did not clear: {:?}", snapshot)
    })
}
