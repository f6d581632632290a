//! Ground truth oracle for simulation.
//!
//! The Oracle owns the true obstacle footprints in the map frame, moves them
//! with a constant-velocity model and produces what a sensor would report:
//! noisy boxes expressed in the sensor's own frame.

use laneguard_env::{FrameTransform, Observation};
use nalgebra::Vector2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::SimError;

/// A ground truth obstacle, in the map frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundTruthObstacle {
    pub id: u64,
    pub position: Vector2<f64>,
    pub velocity: Vector2<f64>,
    pub heading: f64,
    pub size: [f64; 2],

    /// Seen by the sensor
    pub visible: bool,
}

/// Where the simulated sensor sits: its frame name and its pose in the map.
#[derive(Debug, Clone)]
pub struct SensorMount {
    pub source: String,
    pub frame: String,
    pub pose: FrameTransform,
}

pub struct Oracle {
    rng: ChaCha8Rng,

    /// Ordered so readings come out in the same order for the same seed
    obstacles: BTreeMap<u64, GroundTruthObstacle>,

    next_id: u64,
    sensor: SensorMount,

    /// Position noise (meters, one sigma); `None` for exact readings
    noise: Option<Normal<f64>>,
}

impl Oracle {
    pub fn new(seed: u64, sensor: SensorMount) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            obstacles: BTreeMap::new(),
            next_id: 0,
            sensor,
            noise: None,
        }
    }

    /// Sets the position noise standard deviation.
    pub fn set_position_noise(&mut self, std_dev: f64) -> Result<(), SimError> {
        self.noise = if std_dev == 0.0 {
            None
        } else {
            Some(Normal::new(0.0, std_dev).map_err(|e| SimError::Setup(e.to_string()))?)
        };
        Ok(())
    }

    pub fn sensor(&self) -> &SensorMount {
        &self.sensor
    }

    pub fn spawn(&mut self, position: [f64; 2], heading: f64, size: [f64; 2]) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.obstacles.insert(
            id,
            GroundTruthObstacle {
                id,
                position: Vector2::new(position[0], position[1]),
                velocity: Vector2::zeros(),
                heading,
                size,
                visible: true,
            },
        );
        id
    }

    /// Spawn `count` obstacles uniformly inside `[min, max]` with random
    /// heading, size and a slow random walk velocity.
    pub fn spawn_random(
        &mut self,
        count: usize,
        min: [f64; 2],
        max: [f64; 2],
        max_speed: f64,
    ) -> Vec<u64> {
        (0..count)
            .map(|_| {
                let position = [
                    self.rng.gen_range(min[0]..=max[0]),
                    self.rng.gen_range(min[1]..=max[1]),
                ];
                let heading = self.rng.gen_range(0.0..std::f64::consts::TAU);
                let size = [self.rng.gen_range(0.3..0.8), self.rng.gen_range(0.3..0.8)];
                let id = self.spawn(position, heading, size);
                let velocity = [
                    self.rng.gen_range(-max_speed..=max_speed),
                    self.rng.gen_range(-max_speed..=max_speed),
                ];
                self.set_velocity(id, velocity);
                id
            })
            .collect()
    }

    pub fn set_velocity(&mut self, id: u64, velocity: [f64; 2]) {
        if let Some(obstacle) = self.obstacles.get_mut(&id) {
            obstacle.velocity = Vector2::new(velocity[0], velocity[1]);
        }
    }

    pub fn set_visible(&mut self, id: u64, visible: bool) {
        if let Some(obstacle) = self.obstacles.get_mut(&id) {
            obstacle.visible = visible;
        }
    }

    pub fn set_all_visible(&mut self, visible: bool) {
        for obstacle in self.obstacles.values_mut() {
            obstacle.visible = visible;
        }
    }

    pub fn remove(&mut self, id: u64) -> Option<GroundTruthObstacle> {
        self.obstacles.remove(&id)
    }

    pub fn obstacle(&self, id: u64) -> Option<&GroundTruthObstacle> {
        self.obstacles.get(&id)
    }

    pub fn obstacles(&self) -> impl Iterator<Item = &GroundTruthObstacle> {
        self.obstacles.values()
    }

    /// Advances physics by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        for obstacle in self.obstacles.values_mut() {
            obstacle.position += obstacle.velocity * dt;
        }
    }

    /// One sensor sweep: a noisy observation per visible obstacle, in the
    /// sensor frame.
    pub fn observe(&mut self, stamp: Duration) -> Vec<Observation> {
        let to_sensor = self.sensor.pose.inverse();
        let mut readings = Vec::with_capacity(self.obstacles.len());

        for obstacle in self.obstacles.values().filter(|o| o.visible) {
            let mut center = [obstacle.position.x, obstacle.position.y];
            if let Some(noise) = &self.noise {
                center[0] += noise.sample(&mut self.rng);
                center[1] += noise.sample(&mut self.rng);
            }
            readings.push(Observation {
                source: self.sensor.source.clone(),
                id: obstacle.id,
                frame: self.sensor.frame.clone(),
                center: to_sensor.apply_point(center),
                heading: to_sensor.apply_heading(obstacle.heading),
                size: obstacle.size,
                stamp,
            });
        }
        readings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mount() -> SensorMount {
        SensorMount {
            source: "lidar".to_string(),
            frame: "lidar_link".to_string(),
            pose: FrameTransform::new(5.0, -2.0, std::f64::consts::FRAC_PI_2),
        }
    }

    #[test]
    fn test_physics_step() {
        let mut oracle = Oracle::new(42, mount());
        let id = oracle.spawn([0.0, 0.0], 0.0, [0.5, 0.5]);
        oracle.set_velocity(id, [2.0, 0.0]);
        oracle.step(1.5);
        assert!((oracle.obstacle(id).unwrap().position.x - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_observation_maps_back_to_ground_truth() {
        let mut oracle = Oracle::new(42, mount());
        oracle.spawn([7.0, 1.0], 0.3, [0.5, 0.4]);

        let readings = oracle.observe(Duration::from_secs(1));
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].frame, "lidar_link");

        let [x, y] = oracle.sensor().pose.apply_point(readings[0].center);
        assert!((x - 7.0).abs() < 1e-9 && (y - 1.0).abs() < 1e-9);
        assert!((oracle.sensor().pose.apply_heading(readings[0].heading) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_invisible_obstacles_are_not_reported() {
        let mut oracle = Oracle::new(42, mount());
        let a = oracle.spawn([0.0, 0.0], 0.0, [0.5, 0.5]);
        oracle.spawn([1.0, 0.0], 0.0, [0.5, 0.5]);
        oracle.set_visible(a, false);
        assert_eq!(oracle.observe(Duration::ZERO).len(), 1);
    }

    #[test]
    fn test_deterministic_noise() {
        let run = |seed| {
            let mut oracle = Oracle::new(seed, mount());
            oracle.set_position_noise(0.05).unwrap();
            oracle.spawn_random(5, [0.0, 0.0], [10.0, 10.0], 0.2);
            oracle.observe(Duration::ZERO)
        };
        assert_eq!(run(42), run(42));
        assert_ne!(run(42), run(43));
    }

    #[test]
    fn test_negative_noise_is_rejected() {
        let mut oracle = Oracle::new(42, mount());
        assert!(oracle.set_position_noise(-1.0).is_err());
    }
}
