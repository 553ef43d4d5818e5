//! Car-following kinematics.
//!
//! Given the free distance ahead, a vehicle either accelerates toward its
//! target speed or picks the largest speed from which it can still stop
//! comfortably inside the free distance.  Speed changes over one step are
//! linear, so the distance covered is the mean of the old and new speeds
//! times the step duration.

use st_core::TrafficConfig;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FollowingParams {
    /// m/s²
    pub max_accel:     f64,
    /// Hard bound on the speed lost in one step, m/s².
    pub max_decel:     f64,
    /// Deceleration assumed when planning to stop, m/s².
    pub comfort_decel: f64,
}

/// Result of one kinematic update.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Motion {
    /// Metres covered this step, never more than the free distance.
    pub travel: f64,
    /// Speed at the end of the step, m/s.
    pub speed:  f64,
}

impl FollowingParams {
    pub fn from_config(config: &TrafficConfig) -> Self {
        Self {
            max_accel:     config.max_acceleration,
            max_decel:     config.max_deceleration,
            comfort_decel: config.comfort_deceleration,
        }
    }

    /// Distance needed to stop from `speed` at the comfortable rate.
    #[inline]
    pub fn braking_distance(&self, speed: f64) -> f64 {
        speed * speed / (2.0 * self.comfort_decel)
    }

    /// Speed and distance after one step of unconstrained driving toward
    /// `target`.
    pub fn reach(&self, speed: f64, target: f64, dt: f64) -> (f64, f64) {
        let up = if speed <= target {
            (speed + self.max_accel * dt).min(target)
        } else {
            (speed - self.max_decel * dt).max(target)
        };
        (up, 0.5 * (speed + up) * dt)
    }

    /// Distance a vehicle must see ahead before it can ignore what lies
    /// beyond: one unconstrained step plus the braking distance after it.
    pub fn lookahead(&self, speed: f64, target: f64, dt: f64) -> f64 {
        let (up, d) = self.reach(speed, target, dt);
        d + self.braking_distance(up)
    }

    /// Advance one step of `dt` seconds with `free` metres available.
    pub fn advance(&self, speed: f64, target: f64, free: f64, dt: f64) -> Motion {
        let free = free.max(0.0);
        let speed = speed.max(0.0);
        let (up, d_up) = self.reach(speed, target, dt);

        let mut next = if free >= d_up + self.braking_distance(up) {
            up
        } else {
            // Largest v' with (v + v')/2·dt + v'²/(2C) = free.
            let a = 1.0 / (2.0 * self.comfort_decel);
            let b = 0.5 * dt;
            let c = 0.5 * speed * dt - free;
            let disc = b * b - 4.0 * a * c;
            if disc > 0.0 { ((disc.sqrt() - b) / (2.0 * a)).max(0.0) } else { 0.0 }
        };
        next = next.min(up).max(speed - self.max_decel * dt).max(0.0);

        let mut travel = 0.5 * (speed + next) * dt;
        if travel > free {
            // Safety clamp: never pass the free distance.
            travel = free;
            next = (2.0 * free / dt - speed).clamp(0.0, next);
        }
        Motion { travel, speed: next }
    }
}
