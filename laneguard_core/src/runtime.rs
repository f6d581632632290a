//! Lane Blocker Runtime - drives the blocker from its three triggers.
//!
//! Observations, the full-pass timer and the cull timer all mutate the same
//! [`LaneBlocker`]. Each trigger runs its whole read/decide/write sequence
//! under one `Mutex`, which is never held across an `.await`:
//!
//! ```text
//!  observation ──► transform lookup (bounded, no lock)
//!                        │
//!                        ▼
//!              ┌───────────────────┐
//!  process ───►│  Mutex<LaneBlocker>│──► transitions ──► requests
//!  cull ──────►│  decide + plan     │
//!              └───────────────────┘
//!                        │ (lock released)
//!                        ▼
//!                 RequestPublisher
//! ```
//!
//! Requests leave in the order their decisions were made: each trigger takes
//! the publish-order lock before deciding and holds it until its requests are
//! published.
//!
//! The periodic passes are not re-entrant: a pass requested while the same
//! pass is still running is skipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use laneguard_env::{
    EnvError, LaneGuardContext, Observation, OutboundRequest, RequestPublisher, TransformLookup,
};

use crate::blocker::{BlockerSnapshot, LaneBlocker};
use crate::config::LaneBlockerConfig;
use crate::error::LaneGuardError;
use crate::geometry::OrientedBox;
use crate::keys::ObstacleKey;
use crate::lanes::NavGraph;
use crate::requests::{ExternalLaneStates, LaneTransition};

/// What happened to one observation.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Stored; carries the number of lane transitions it caused
    Accepted { transitions: usize },

    /// Discarded (transform failure or unusable box)
    Dropped,
}

/// What happened to one periodic pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Completed { transitions: usize },

    /// The same pass was already running
    Skipped,
}

/// A fleet's replacement navigation graph.
#[derive(Debug, Clone)]
pub struct GraphUpdate {
    pub fleet: String,
    pub graph: NavGraph,
}

/// A fleet's replacement lane states.
#[derive(Debug, Clone)]
pub struct LaneStatesUpdate {
    pub fleet: String,
    pub states: ExternalLaneStates,
}

/// Input feeds consumed by [`LaneBlockerRuntime::run`].
pub struct RuntimeInputs {
    pub observations: mpsc::Receiver<Observation>,
    pub graphs: mpsc::Receiver<GraphUpdate>,
    pub lane_states: mpsc::Receiver<LaneStatesUpdate>,
}

/// Clears a pass flag when the pass ends, however it ends.
struct PassGuard<'a>(&'a AtomicBool);

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The lane blocker wired to its environment.
///
/// Generic over the context, transform lookup and publisher so the same
/// runtime runs in production (tokio) and in the simulator.
pub struct LaneBlockerRuntime<Ctx, Tf, Pub>
where
    Ctx: LaneGuardContext,
    Tf: TransformLookup,
    Pub: RequestPublisher,
{
    context: Arc<Ctx>,
    transforms: Arc<Tf>,
    publisher: Arc<Pub>,
    config: LaneBlockerConfig,

    /// Obstacle store, lane index, vicinity index and closed set
    state: Mutex<LaneBlocker>,

    /// Held from decision to publication
    publish_order: tokio::sync::Mutex<()>,

    processing: AtomicBool,
    culling: AtomicBool,
}

impl<Ctx, Tf, Pub> LaneBlockerRuntime<Ctx, Tf, Pub>
where
    Ctx: LaneGuardContext,
    Tf: TransformLookup,
    Pub: RequestPublisher,
{
    pub fn new(
        context: Arc<Ctx>,
        transforms: Arc<Tf>,
        publisher: Arc<Pub>,
        config: LaneBlockerConfig,
    ) -> Result<Self, LaneGuardError> {
        let blocker = LaneBlocker::new(config.clone())?;
        Ok(Self {
            context,
            transforms,
            publisher,
            config,
            state: Mutex::new(blocker),
            publish_order: tokio::sync::Mutex::new(()),
            processing: AtomicBool::new(false),
            culling: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &LaneBlockerConfig {
        &self.config
    }

    pub fn context(&self) -> &Arc<Ctx> {
        &self.context
    }

    fn lock(&self) -> Result<MutexGuard<'_, LaneBlocker>, LaneGuardError> {
        self.state.lock().map_err(|_| LaneGuardError::StatePoisoned)
    }

    /// Run a read-only closure against the blocker under the lock.
    pub fn inspect<R>(&self, f: impl FnOnce(&LaneBlocker) -> R) -> Result<R, LaneGuardError> {
        Ok(f(&*self.lock()?))
    }

    pub fn snapshot(&self) -> Result<BlockerSnapshot, LaneGuardError> {
        self.inspect(LaneBlocker::snapshot)
    }

    /// Transform one observation into the common frame and record it.
    ///
    /// The transform lookup happens before the lock is taken and is bounded by
    /// `transform_lookup_timeout`; a failed lookup drops the observation.
    /// Expiry counts from the observation stamp, clamped to the current time.
    pub async fn ingest(&self, observation: Observation) -> Result<IngestOutcome, LaneGuardError> {
        let key = ObstacleKey::new(observation.source.clone(), observation.id);

        let [size_x, size_y] = observation.size;
        let usable = size_x > 0.0
            && size_y > 0.0
            && size_x.is_finite()
            && size_y.is_finite()
            && observation.center.iter().all(|v| v.is_finite())
            && observation.heading.is_finite();
        if !usable {
            warn!(
                obstacle = %key,
                size = ?observation.size,
                "Dropping observation with unusable box"
            );
            return Ok(IngestOutcome::Dropped);
        }

        let footprint = match self.to_common_frame(&observation).await {
            Ok(footprint) => footprint,
            Err(e) => {
                debug!(
                    obstacle = %key,
                    frame = %observation.frame,
                    error = %e,
                    "Dropping observation"
                );
                return Ok(IngestOutcome::Dropped);
            }
        };

        let observed_at = observation.stamp.min(self.context.now());
        let _order = self.publish_order.lock().await;
        let (transitions, requests) = {
            let mut blocker = self.lock()?;
            let transitions = blocker.observe(key, footprint, observed_at)?;
            let requests = blocker.plan_requests(&transitions);
            (transitions, requests)
        };

        self.publish(requests).await;
        Ok(IngestOutcome::Accepted {
            transitions: transitions.len(),
        })
    }

    async fn to_common_frame(&self, observation: &Observation) -> Result<OrientedBox, EnvError> {
        let timeout = self.config.transform_lookup_timeout;
        let lookup = self.transforms.lookup(
            &self.config.rmf_frame,
            &observation.frame,
            observation.stamp,
            timeout,
        );
        let transform = tokio::time::timeout(timeout, lookup)
            .await
            .map_err(|_| EnvError::TransformTimeout(timeout.as_millis() as u64))??;

        let [x, y] = transform.apply_point(observation.center);
        Ok(OrientedBox::new(
            x,
            y,
            transform.apply_heading(observation.heading),
            observation.size[0],
            observation.size[1],
        ))
    }

    /// Recompute every stored obstacle against every lane.
    pub async fn process(&self) -> Result<PassOutcome, LaneGuardError> {
        let Some(_guard) = PassGuard::acquire(&self.processing) else {
            debug!("Full pass still running, skipping");
            return Ok(PassOutcome::Skipped);
        };

        let _order = self.publish_order.lock().await;
        let (transitions, requests) = {
            let mut blocker = self.lock()?;
            let transitions = blocker.full_pass()?;
            blocker.check_consistency()?;
            let requests = blocker.plan_requests(&transitions);
            (transitions, requests)
        };

        self.publish(requests).await;
        Ok(PassOutcome::Completed {
            transitions: transitions.len(),
        })
    }

    /// Expire obstacles whose TTL has run out.
    pub async fn cull(&self) -> Result<PassOutcome, LaneGuardError> {
        let Some(_guard) = PassGuard::acquire(&self.culling) else {
            debug!("Cull still running, skipping");
            return Ok(PassOutcome::Skipped);
        };

        let _order = self.publish_order.lock().await;
        let (transitions, requests) = {
            let mut blocker = self.lock()?;
            let transitions = blocker.cull(self.context.now())?;
            let requests = blocker.plan_requests(&transitions);
            (transitions, requests)
        };

        self.publish(requests).await;
        Ok(PassOutcome::Completed {
            transitions: transitions.len(),
        })
    }

    /// Replace a fleet's lanes; runs a full pass in the same critical section.
    pub async fn update_graph(
        &self,
        fleet: &str,
        graph: &NavGraph,
    ) -> Result<Vec<LaneTransition>, LaneGuardError> {
        let _order = self.publish_order.lock().await;
        let (transitions, requests) = {
            let mut blocker = self.lock()?;
            let transitions = blocker.update_graph(fleet, graph)?;
            let requests = blocker.plan_requests(&transitions);
            (transitions, requests)
        };

        self.publish(requests).await;
        Ok(transitions)
    }

    pub fn update_lane_states(
        &self,
        fleet: &str,
        states: ExternalLaneStates,
    ) -> Result<(), LaneGuardError> {
        self.lock()?.update_lane_states(fleet, states);
        Ok(())
    }

    /// Hand requests to the publisher. Failures are logged; the decision
    /// has already been recorded and is not rolled back.
    async fn publish(&self, requests: Vec<OutboundRequest>) {
        for request in requests {
            let result = match request {
                OutboundRequest::Lane(request) => {
                    debug!(
                        fleet = %request.fleet_name,
                        lane = request.lane_index,
                        closed = request.closed,
                        "Publishing lane request"
                    );
                    self.publisher.publish_lane_request(request).await
                }
                OutboundRequest::SpeedLimit(request) => {
                    debug!(
                        fleet = %request.fleet_name,
                        lane = request.lane_index,
                        limit = ?request.limit,
                        "Publishing speed limit request"
                    );
                    self.publisher.publish_speed_limit(request).await
                }
            };
            if let Err(e) = result {
                warn!(error = %e, "Failed to publish request");
            }
        }
    }

    /// Serve all triggers until the observation feed closes or a fatal error
    /// occurs.
    ///
    /// The graph and lane-state feeds may close earlier; the runtime keeps
    /// working with the last data they delivered.
    pub async fn run(&self, inputs: RuntimeInputs) -> Result<(), LaneGuardError> {
        let RuntimeInputs {
            mut observations,
            mut graphs,
            mut lane_states,
        } = inputs;

        let mut process_timer = tokio::time::interval(self.config.process_period);
        process_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cull_timer = tokio::time::interval(self.config.cull_period);
        cull_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut graphs_open = true;
        let mut lane_states_open = true;

        info!(
            frame = %self.config.rmf_frame,
            threshold = self.config.lane_closure_threshold,
            seed = self.context.seed(),
            "Lane blocker running"
        );

        loop {
            let result = tokio::select! {
                observation = observations.recv() => match observation {
                    Some(observation) => self.ingest(observation).await.map(|_| ()),
                    None => {
                        info!("Observation feed closed, stopping");
                        return Ok(());
                    }
                },
                update = graphs.recv(), if graphs_open => match update {
                    Some(GraphUpdate { fleet, graph }) => {
                        self.update_graph(&fleet, &graph).await.map(|_| ())
                    }
                    None => {
                        graphs_open = false;
                        Ok(())
                    }
                },
                update = lane_states.recv(), if lane_states_open => match update {
                    Some(LaneStatesUpdate { fleet, states }) => {
                        self.update_lane_states(&fleet, states)
                    }
                    None => {
                        lane_states_open = false;
                        Ok(())
                    }
                },
                _ = process_timer.tick() => self.process().await.map(|_| ()),
                _ = cull_timer.tick() => self.cull().await.map(|_| ()),
            };

            if let Err(e) = result {
                if e.is_fatal() {
                    error!(error = %e, "Lane blocker state corrupted, stopping");
                    return Err(e);
                }
                warn!(error = %e, "Rejected input");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocker::tests::two_corridors;
    use crate::keys::LaneKey;
    use async_trait::async_trait;
    use laneguard_env::{
        ChannelPublisher, FrameTransform, LaneRequest, SpeedLimitRequest, TokioContext,
    };
    use std::collections::HashMap;
    use std::time::Duration;

    /// Frame table lookup; frames listed in `slow` never answer.
    struct StaticTransforms {
        frames: HashMap<String, FrameTransform>,
        slow: Vec<String>,
    }

    impl StaticTransforms {
        fn new() -> Self {
            let mut frames = HashMap::new();
            frames.insert("map".to_string(), FrameTransform::identity());
            // Sensor mounted at (2, 0), facing +y.
            frames.insert(
                "lidar_link".to_string(),
                FrameTransform::new(2.0, 0.0, std::f64::consts::FRAC_PI_2),
            );
            Self {
                frames,
                slow: vec!["slow_link".to_string()],
            }
        }
    }

    #[async_trait]
    impl TransformLookup for StaticTransforms {
        async fn lookup(
            &self,
            _target_frame: &str,
            source_frame: &str,
            _at: Duration,
            _timeout: Duration,
        ) -> Result<FrameTransform, EnvError> {
            if self.slow.iter().any(|f| f == source_frame) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            self.frames
                .get(source_frame)
                .copied()
                .ok_or_else(|| EnvError::frame_not_found(source_frame))
        }
    }

    /// Records the closed flag of each lane request; closures go out slowly.
    #[derive(Default)]
    struct SlowClosePublisher {
        sent: Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl RequestPublisher for SlowClosePublisher {
        async fn publish_lane_request(&self, request: LaneRequest) -> Result<(), EnvError> {
            if request.closed {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.sent.lock().unwrap().push(request.closed);
            Ok(())
        }

        async fn publish_speed_limit(&self, _request: SpeedLimitRequest) -> Result<(), EnvError> {
            Ok(())
        }
    }

    type TestRuntime = LaneBlockerRuntime<TokioContext, StaticTransforms, ChannelPublisher>;

    fn runtime(
        config: LaneBlockerConfig,
        capacity: usize,
    ) -> (Arc<TestRuntime>, mpsc::Receiver<OutboundRequest>) {
        let (publisher, rx) = ChannelPublisher::channel(capacity);
        let runtime = LaneBlockerRuntime::new(
            TokioContext::shared(),
            Arc::new(StaticTransforms::new()),
            Arc::new(publisher),
            config,
        )
        .unwrap();
        (Arc::new(runtime), rx)
    }

    fn threshold(n: usize) -> LaneBlockerConfig {
        LaneBlockerConfig {
            lane_closure_threshold: n,
            ..Default::default()
        }
    }

    fn observation(id: u64, frame: &str, center: [f64; 2]) -> Observation {
        Observation {
            source: "lidar".to_string(),
            id,
            frame: frame.to_string(),
            center,
            heading: 0.0,
            size: [0.4, 0.4],
            stamp: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_ingest_transforms_then_closes() {
        let (rt, mut rx) = runtime(threshold(1), 16);
        rt.update_graph("fleet", &two_corridors()).await.unwrap();

        // (5, 0) in lidar_link is (2, 5) in map: on lane 1.
        let outcome = rt.ingest(observation(1, "lidar_link", [5.0, 0.0])).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Accepted { transitions: 1 });
        assert_eq!(
            rx.recv().await,
            Some(OutboundRequest::Lane(LaneRequest::close("fleet", 1)))
        );
        assert!(rt.inspect(|b| b.is_closed(&LaneKey::new("fleet", 1))).unwrap());
    }

    #[tokio::test]
    async fn test_unknown_frame_drops_observation() {
        let (rt, _rx) = runtime(threshold(1), 16);
        let outcome = rt.ingest(observation(1, "nowhere", [0.0, 0.0])).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Dropped);
        assert_eq!(rt.snapshot().unwrap().obstacles, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_transform_times_out() {
        let (rt, _rx) = runtime(threshold(1), 16);
        let outcome = rt.ingest(observation(1, "slow_link", [0.0, 0.0])).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Dropped);
    }

    #[tokio::test]
    async fn test_degenerate_box_is_dropped() {
        let (rt, _rx) = runtime(threshold(1), 16);
        let mut flat = observation(1, "map", [2.0, 0.0]);
        flat.size = [0.0, 1.0];
        assert_eq!(rt.ingest(flat).await.unwrap(), IngestOutcome::Dropped);
    }

    #[tokio::test]
    async fn test_process_skips_while_running() {
        let config = LaneBlockerConfig {
            continuous_checking: false,
            ..threshold(1)
        };
        // Capacity 1: the second request of the pass blocks until drained.
        let (rt, mut rx) = runtime(config, 1);
        rt.update_graph("fleet", &two_corridors()).await.unwrap();
        rt.ingest(observation(1, "map", [2.0, 0.0])).await.unwrap();
        rt.ingest(observation(2, "map", [2.0, 5.0])).await.unwrap();

        let running = {
            let rt = rt.clone();
            tokio::spawn(async move { rt.process().await })
        };
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(rt.process().await.unwrap(), PassOutcome::Skipped);

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());
        assert_eq!(
            running.await.unwrap().unwrap(),
            PassOutcome::Completed { transitions: 2 }
        );
        assert_eq!(rt.process().await.unwrap(), PassOutcome::Completed { transitions: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_leave_in_decision_order() {
        let publisher = Arc::new(SlowClosePublisher::default());
        let rt = Arc::new(
            LaneBlockerRuntime::new(
                TokioContext::shared(),
                Arc::new(StaticTransforms::new()),
                publisher.clone(),
                threshold(1),
            )
            .unwrap(),
        );
        rt.update_graph("fleet", &two_corridors()).await.unwrap();

        let arrive = {
            let rt = rt.clone();
            tokio::spawn(async move { rt.ingest(observation(1, "map", [2.0, 0.0])).await })
        };
        let leave = {
            let rt = rt.clone();
            tokio::spawn(async move { rt.ingest(observation(1, "map", [2.0, 2.5])).await })
        };
        arrive.await.unwrap().unwrap();
        leave.await.unwrap().unwrap();

        assert_eq!(*publisher.sent.lock().unwrap(), vec![true, false]);
        assert!(!rt.inspect(|b| b.is_closed(&LaneKey::new("fleet", 0))).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_counts_from_observation_stamp() {
        let (rt, _rx) = runtime(threshold(1), 16);
        rt.update_graph("fleet", &two_corridors()).await.unwrap();

        // Delivered 400 ms after it was taken.
        tokio::time::advance(Duration::from_millis(400)).await;
        rt.ingest(observation(1, "map", [2.0, 0.0])).await.unwrap();
        // Stamped in the future: clamped to receipt.
        let mut ahead = observation(2, "map", [2.0, 5.0]);
        ahead.stamp = Duration::from_secs(3600);
        rt.ingest(ahead).await.unwrap();

        tokio::time::advance(Duration::from_millis(4800)).await;
        assert_eq!(rt.cull().await.unwrap(), PassOutcome::Completed { transitions: 1 });
        let snapshot = rt.snapshot().unwrap();
        assert_eq!(snapshot.obstacles, 1);
        assert_eq!(snapshot.closed, vec![LaneKey::new("fleet", 1)]);

        tokio::time::advance(Duration::from_millis(400)).await;
        rt.cull().await.unwrap();
        assert_eq!(rt.snapshot().unwrap().obstacles, 0);
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_decision() {
        let (rt, rx) = runtime(threshold(1), 16);
        drop(rx);
        rt.update_graph("fleet", &two_corridors()).await.unwrap();
        rt.ingest(observation(1, "map", [2.0, 0.0])).await.unwrap();
        assert_eq!(rt.snapshot().unwrap().closed, vec![LaneKey::new("fleet", 0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_culls_and_stops_when_feed_closes() {
        let (rt, mut rx) = runtime(threshold(1), 16);
        let (obs_tx, observations) = mpsc::channel(8);
        let (graph_tx, graphs) = mpsc::channel(8);
        let (_states_tx, lane_states) = mpsc::channel(8);

        let handle = {
            let rt = rt.clone();
            tokio::spawn(async move {
                rt.run(RuntimeInputs {
                    observations,
                    graphs,
                    lane_states,
                })
                .await
            })
        };

        graph_tx
            .send(GraphUpdate {
                fleet: "fleet".to_string(),
                graph: two_corridors(),
            })
            .await
            .unwrap();
        drop(graph_tx);
        tokio::time::sleep(Duration::from_millis(10)).await;
        obs_tx.send(observation(1, "map", [2.0, 0.0])).await.unwrap();

        assert_eq!(
            rx.recv().await,
            Some(OutboundRequest::Lane(LaneRequest::close("fleet", 0)))
        );
        // TTL is 5 s; the cull timer reopens the lane after that.
        assert_eq!(
            rx.recv().await,
            Some(OutboundRequest::Lane(LaneRequest::open("fleet", 0)))
        );

        drop(obs_tx);
        handle.await.unwrap().unwrap();
        assert_eq!(rt.snapshot().unwrap().obstacles, 0);
    }
}
