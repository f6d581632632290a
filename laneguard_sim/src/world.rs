//! SimWorld - the simulation harness container.
//!
//! Drives one [`LaneBlockerRuntime`] on a virtual clock: every step moves the
//! oracle, feeds the sensor sweep through `ingest`, fires the periodic passes
//! when their period has elapsed and then re-checks the blocker invariants.

use laneguard_core::{
    ExternalLaneStates, GraphEdge, LaneBlockerConfig, LaneBlockerRuntime, LaneKey, LaneTransition,
    NavGraph, PassOutcome, Waypoint,
};
use laneguard_core::{BlockerSnapshot, IngestOutcome};
use laneguard_env::{FrameTransform, LaneGuardContext};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::context::SimContext;
use crate::error::SimError;
use crate::oracle::{Oracle, SensorMount};
use crate::publisher::RecordingPublisher;
use crate::transforms::SimTransforms;

/// Fleet every scenario runs against.
pub const FLEET: &str = "corridor";

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Virtual time per step (also the sensor period)
    pub step: Duration,

    /// Position noise standard deviation for sensor readings (meters)
    pub sensor_noise_std: f64,

    pub blocker: LaneBlockerConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            step: Duration::from_millis(100),
            sensor_noise_std: 0.02,
            blocker: LaneBlockerConfig {
                obstacle_ttl: Duration::from_secs(2),
                lane_closure_threshold: 3,
                ..Default::default()
            },
        }
    }
}

/// Counters collected while stepping.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorldMetrics {
    pub steps: u64,
    pub observations: u64,
    pub dropped_observations: u64,
    pub full_passes: u64,
    pub culls: u64,
    pub skipped_passes: u64,
    pub invariant_checks: u64,
}

pub type SimRuntime = LaneBlockerRuntime<SimContext, SimTransforms, RecordingPublisher>;

pub struct SimWorld {
    pub config: SimConfig,

    /// Shared simulation context (virtual clock)
    pub context: Arc<SimContext>,

    /// Frame table, for fault injection
    pub transforms: Arc<SimTransforms>,

    /// Every request the blocker published
    pub publisher: Arc<RecordingPublisher>,

    pub runtime: SimRuntime,

    /// Ground truth oracle
    pub oracle: Oracle,

    pub metrics: WorldMetrics,

    sensor_enabled: bool,
    next_process: Duration,
    next_cull: Duration,
}

impl SimWorld {
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        // Separate seed for physics so clock-related changes don't shift trajectories.
        let physics_seed = config.seed.wrapping_mul(0x9e3779b97f4a7c15);

        let context = SimContext::shared(config.seed);
        let mount = Self::sensor_mount();

        let transforms = Arc::new(SimTransforms::new(config.blocker.rmf_frame.clone()));
        transforms.set_frame(mount.frame.clone(), mount.pose);

        let publisher = Arc::new(RecordingPublisher::new(SimContext::clone(&context)));
        let runtime = LaneBlockerRuntime::new(
            context.clone(),
            transforms.clone(),
            publisher.clone(),
            config.blocker.clone(),
        )?;

        let mut oracle = Oracle::new(physics_seed, mount);
        oracle.set_position_noise(config.sensor_noise_std)?;

        Ok(Self {
            next_process: config.blocker.process_period,
            next_cull: config.blocker.cull_period,
            config,
            context,
            transforms,
            publisher,
            runtime,
            oracle,
            metrics: WorldMetrics::default(),
            sensor_enabled: true,
        })
    }

    /// Lidar mounted at (5, -2) looking along map +y.
    pub fn sensor_mount() -> SensorMount {
        SensorMount {
            source: "lidar".to_string(),
            frame: "lidar_link".to_string(),
            pose: FrameTransform::new(5.0, -2.0, std::f64::consts::FRAC_PI_2),
        }
    }

    /// An L-shaped corridor, two bidirectional edges:
    /// lanes 0/1 run along y = 0 from x = 0 to 10, lanes 2/3 along x = 10
    /// from y = 0 to 10.
    pub fn corridor_graph() -> NavGraph {
        NavGraph::from_edges(
            vec![
                Waypoint::new(0.0, 0.0),
                Waypoint::new(10.0, 0.0),
                Waypoint::new(10.0, 10.0),
            ],
            &[GraphEdge::two_way(0, 1), GraphEdge::two_way(1, 2)],
        )
    }

    pub fn lane(index: usize) -> LaneKey {
        LaneKey::new(FLEET, index)
    }

    pub async fn load_graph(&mut self, graph: &NavGraph) -> Result<Vec<LaneTransition>, SimError> {
        let transitions = self.runtime.update_graph(FLEET, graph).await?;
        self.check_invariants()?;
        Ok(transitions)
    }

    pub fn set_lane_states(&self, states: ExternalLaneStates) -> Result<(), SimError> {
        Ok(self.runtime.update_lane_states(FLEET, states)?)
    }

    pub fn set_sensor_enabled(&mut self, enabled: bool) {
        self.sensor_enabled = enabled;
    }

    pub fn now(&self) -> Duration {
        self.context.now()
    }

    pub fn snapshot(&self) -> Result<BlockerSnapshot, SimError> {
        Ok(self.runtime.snapshot()?)
    }

    /// Advance one step.
    pub async fn step(&mut self) -> Result<(), SimError> {
        let dt = self.config.step;
        self.oracle.step(dt.as_secs_f64());
        self.context.advance_time(dt);
        self.metrics.steps += 1;
        let now = self.context.now();

        if self.sensor_enabled {
            for observation in self.oracle.observe(now) {
                match self.runtime.ingest(observation).await? {
                    IngestOutcome::Accepted { .. } => self.metrics.observations += 1,
                    IngestOutcome::Dropped => self.metrics.dropped_observations += 1,
                }
            }
        }

        if now >= self.next_process {
            self.next_process += self.config.blocker.process_period;
            match self.runtime.process().await? {
                PassOutcome::Completed { .. } => self.metrics.full_passes += 1,
                PassOutcome::Skipped => self.metrics.skipped_passes += 1,
            }
        }
        if now >= self.next_cull {
            self.next_cull += self.config.blocker.cull_period;
            match self.runtime.cull().await? {
                PassOutcome::Completed { .. } => self.metrics.culls += 1,
                PassOutcome::Skipped => self.metrics.skipped_passes += 1,
            }
        }

        self.check_invariants()
    }

    /// Step until `duration` of virtual time has passed.
    pub async fn run_for(&mut self, duration: Duration) -> Result<(), SimError> {
        let until = self.now() + duration;
        while self.now() < until {
            self.step().await?;
        }
        debug!(t = self.now().as_secs_f64(), "Ran until");
        Ok(())
    }

    /// Index consistency plus the closure step function: every lane at or
    /// above the threshold is closed and every empty lane is open.
    pub fn check_invariants(&mut self) -> Result<(), SimError> {
        self.metrics.invariant_checks += 1;
        let threshold = self.config.blocker.lane_closure_threshold;
        let at = self.now().as_secs_f64();

        let violation = self.runtime.inspect(|blocker| -> Result<Option<String>, SimError> {
            blocker.check_consistency()?;
            for lane in blocker.lanes().iter() {
                let count = blocker.vicinity().count(&lane.key);
                let closed = blocker.is_closed(&lane.key);
                if count >= threshold && !closed {
                    return Ok(Some(format!("{} open with {} obstacles", lane.key, count)));
                }
                if count == 0 && closed {
                    return Ok(Some(format!("{} closed while empty", lane.key)));
                }
            }
            Ok(None)
        })??;

        match violation {
            Some(message) => Err(SimError::Assertion { at, message }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap()
            .block_on(future)
    }

    #[test]
    fn test_periodic_passes_follow_virtual_time() {
        block_on(async {
            let mut world = SimWorld::new(SimConfig::default()).unwrap();
            world.load_graph(&SimWorld::corridor_graph()).await.unwrap();
            world.run_for(Duration::from_secs(3)).await.unwrap();

            assert_eq!(world.metrics.steps, 30);
            assert_eq!(world.metrics.full_passes, 3);
            assert_eq!(world.metrics.culls, 6);
            assert_eq!(world.metrics.skipped_passes, 0);
        });
    }

    #[test]
    fn test_sensor_readings_land_on_the_right_lane() {
        block_on(async {
            let mut world = SimWorld::new(SimConfig::default()).unwrap();
            world.load_graph(&SimWorld::corridor_graph()).await.unwrap();
            world.oracle.spawn([10.0, 5.0], 0.0, [0.4, 0.4]);
            world.step().await.unwrap();

            let snapshot = world.snapshot().unwrap();
            assert_eq!(snapshot.obstacles, 1);
            assert_eq!(snapshot.vicinity.get("corridor_2"), Some(&1));
            assert_eq!(snapshot.vicinity.get("corridor_3"), Some(&1));
            assert_eq!(snapshot.vicinity.get("corridor_0"), None);
        });
    }
}
