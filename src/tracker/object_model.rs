//! Per-class object parameter tables
//!
//! Static tables holding the size priors, size limits, process noise, motion
//! limits and covariance defaults for each tracked class. The concrete
//! trackers read their motion-model parameters from here, so every class is
//! fully parameterized at compile time.
//!
//! Values are metric: meters, seconds, radians.

use crate::motion::{BicycleModelParams, CtrvModelParams};
use crate::utils::{deg2rad, kmph2mps};

const GRAVITY: f64 = 9.81;

#[inline]
const fn sq(value: f64) -> f64 {
    value * value
}

// ============================================================================
// Table row types
// ============================================================================

/// Size prior used until shape measurements settle.
#[derive(Debug, Clone, Copy)]
pub struct ObjectSize {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

/// Hard bounds the smoothed shape is clamped into.
#[derive(Debug, Clone, Copy)]
pub struct SizeLimit {
    pub length_min: f64,
    pub length_max: f64,
    pub width_min: f64,
    pub width_max: f64,
    pub height_min: f64,
    pub height_max: f64,
}

/// Process noise of the planar motion, as standard deviations.
#[derive(Debug, Clone, Copy)]
pub struct ProcessNoise {
    /// Longitudinal acceleration [m/s^2].
    pub acc_long: f64,
    /// Lateral acceleration [m/s^2].
    pub acc_lat: f64,
    /// Yaw rate lower bound [rad/s].
    pub yaw_rate_min: f64,
    /// Yaw rate upper bound [rad/s].
    pub yaw_rate_max: f64,
}

/// Hard limits the filtered state is clamped into.
#[derive(Debug, Clone, Copy)]
pub struct ProcessLimit {
    /// Longitudinal speed cap [m/s].
    pub vel_long_max: f64,
}

/// Geometry and slip constants of the kinematic bicycle model.
#[derive(Debug, Clone, Copy)]
pub struct BicycleState {
    /// Largest credible slip angle [rad].
    pub slip_angle_max: f64,
    /// Slip rate noise lower bound [rad/s].
    pub slip_rate_stddev_min: f64,
    /// Slip rate noise upper bound [rad/s].
    pub slip_rate_stddev_max: f64,
    /// Front wheel position as a ratio of length.
    pub wheel_pos_ratio_front: f64,
    /// Rear wheel position as a ratio of length.
    pub wheel_pos_ratio_rear: f64,
    /// Minimum center-to-front-wheel distance [m].
    pub wheel_pos_front_min: f64,
    /// Minimum center-to-rear-wheel distance [m].
    pub wheel_pos_rear_min: f64,
}

/// Initial state covariance, expressed in the object frame.
#[derive(Debug, Clone, Copy)]
pub struct InitialCovariance {
    /// Longitudinal position variance [m^2].
    pub pos_x: f64,
    /// Lateral position variance [m^2].
    pub pos_y: f64,
    /// Yaw variance [rad^2].
    pub yaw: f64,
    /// Longitudinal speed variance [(m/s)^2].
    pub vel_long: f64,
}

/// Default measurement noise, expressed in the object frame.
#[derive(Debug, Clone, Copy)]
pub struct MeasurementCovariance {
    /// Longitudinal position variance [m^2].
    pub pos_x: f64,
    /// Lateral position variance [m^2].
    pub pos_y: f64,
    /// Yaw variance [rad^2].
    pub yaw: f64,
    /// Speed variance [(m/s)^2].
    pub vel_long: f64,
}

/// Complete parameter set for one tracked class.
#[derive(Debug, Clone, Copy)]
pub struct ObjectModel {
    pub init_size: ObjectSize,
    pub size_limit: SizeLimit,
    pub process_noise: ProcessNoise,
    pub process_limit: ProcessLimit,
    pub bicycle_state: BicycleState,
    pub initial_covariance: InitialCovariance,
    pub measurement_covariance: MeasurementCovariance,
}

impl ObjectModel {
    /// Bicycle motion model parameters drawn from this row.
    pub fn bicycle_params(&self) -> BicycleModelParams {
        BicycleModelParams {
            q_stddev_acc_long: self.process_noise.acc_long,
            q_stddev_acc_lat: self.process_noise.acc_lat,
            q_stddev_yaw_rate_min: self.process_noise.yaw_rate_min,
            q_stddev_yaw_rate_max: self.process_noise.yaw_rate_max,
            q_stddev_slip_rate_min: self.bicycle_state.slip_rate_stddev_min,
            q_stddev_slip_rate_max: self.bicycle_state.slip_rate_stddev_max,
            q_max_slip_angle: self.bicycle_state.slip_angle_max,
            lf_ratio: self.bicycle_state.wheel_pos_ratio_front,
            lf_min: self.bicycle_state.wheel_pos_front_min,
            lr_ratio: self.bicycle_state.wheel_pos_ratio_rear,
            lr_min: self.bicycle_state.wheel_pos_rear_min,
            max_speed: self.process_limit.vel_long_max,
            max_slip: self.bicycle_state.slip_angle_max,
            p0_cov_pos_x: self.initial_covariance.pos_x,
            p0_cov_pos_y: self.initial_covariance.pos_y,
            p0_cov_yaw: self.initial_covariance.yaw,
            p0_cov_vel: self.initial_covariance.vel_long,
            ..BicycleModelParams::default()
        }
    }

    /// Turn-rate motion model parameters drawn from this row.
    ///
    /// Turn rate limit and its initial variance have no table column, so the
    /// model defaults apply.
    pub fn ctrv_params(&self) -> CtrvModelParams {
        CtrvModelParams {
            q_stddev_acc_long: self.process_noise.acc_long,
            q_stddev_acc_lat: self.process_noise.acc_lat,
            q_stddev_yaw_rate_min: self.process_noise.yaw_rate_min,
            q_stddev_yaw_rate_max: self.process_noise.yaw_rate_max,
            max_speed: self.process_limit.vel_long_max,
            p0_cov_pos_x: self.initial_covariance.pos_x,
            p0_cov_pos_y: self.initial_covariance.pos_y,
            p0_cov_yaw: self.initial_covariance.yaw,
            p0_cov_vel: self.initial_covariance.vel_long,
            ..CtrvModelParams::default()
        }
    }
}

// ============================================================================
// Shared sub-tables
// ============================================================================

/// Slip and wheel geometry shared by every class that runs the bicycle model.
const BICYCLE_STATE: BicycleState = BicycleState {
    slip_angle_max: deg2rad(30.0),
    slip_rate_stddev_min: deg2rad(0.3),
    slip_rate_stddev_max: deg2rad(10.0),
    wheel_pos_ratio_front: 0.3,
    wheel_pos_ratio_rear: 0.25,
    wheel_pos_front_min: 1.0,
    wheel_pos_rear_min: 1.0,
};

const VEHICLE_PROCESS_NOISE: ProcessNoise = ProcessNoise {
    acc_long: GRAVITY * 0.35,
    acc_lat: GRAVITY * 0.15,
    yaw_rate_min: deg2rad(1.5),
    yaw_rate_max: deg2rad(15.0),
};

const VEHICLE_INITIAL_COVARIANCE: InitialCovariance = InitialCovariance {
    pos_x: sq(1.0),
    pos_y: sq(0.3),
    yaw: sq(deg2rad(25.0)),
    vel_long: sq(kmph2mps(1000.0)),
};

const VEHICLE_MEASUREMENT_COVARIANCE: MeasurementCovariance = MeasurementCovariance {
    pos_x: sq(0.5),
    pos_y: sq(0.4),
    yaw: sq(deg2rad(20.0)),
    vel_long: sq(1.0),
};

// ============================================================================
// Class tables
// ============================================================================

pub const NORMAL_VEHICLE: ObjectModel = ObjectModel {
    init_size: ObjectSize {
        length: 3.0,
        width: 2.0,
        height: 1.8,
    },
    size_limit: SizeLimit {
        length_min: 1.0,
        length_max: 20.0,
        width_min: 1.0,
        width_max: 5.0,
        height_min: 1.0,
        height_max: 5.0,
    },
    process_noise: VEHICLE_PROCESS_NOISE,
    process_limit: ProcessLimit {
        vel_long_max: kmph2mps(100.0),
    },
    bicycle_state: BICYCLE_STATE,
    initial_covariance: VEHICLE_INITIAL_COVARIANCE,
    measurement_covariance: VEHICLE_MEASUREMENT_COVARIANCE,
};

pub const BIG_VEHICLE: ObjectModel = ObjectModel {
    init_size: ObjectSize {
        length: 10.0,
        width: 2.5,
        height: 3.0,
    },
    size_limit: SizeLimit {
        length_min: 1.0,
        length_max: 20.0,
        width_min: 1.0,
        width_max: 5.0,
        height_min: 1.0,
        height_max: 5.0,
    },
    process_noise: VEHICLE_PROCESS_NOISE,
    process_limit: ProcessLimit {
        vel_long_max: kmph2mps(100.0),
    },
    bicycle_state: BICYCLE_STATE,
    initial_covariance: VEHICLE_INITIAL_COVARIANCE,
    measurement_covariance: VEHICLE_MEASUREMENT_COVARIANCE,
};

pub const BICYCLE: ObjectModel = ObjectModel {
    init_size: ObjectSize {
        length: 2.0,
        width: 0.7,
        height: 1.0,
    },
    size_limit: SizeLimit {
        length_min: 1.0,
        length_max: 20.0,
        width_min: 1.0,
        width_max: 5.0,
        height_min: 1.0,
        height_max: 5.0,
    },
    process_noise: VEHICLE_PROCESS_NOISE,
    process_limit: ProcessLimit {
        vel_long_max: kmph2mps(100.0),
    },
    bicycle_state: BICYCLE_STATE,
    initial_covariance: VEHICLE_INITIAL_COVARIANCE,
    measurement_covariance: VEHICLE_MEASUREMENT_COVARIANCE,
};

pub const PEDESTRIAN: ObjectModel = ObjectModel {
    init_size: ObjectSize {
        length: 0.5,
        width: 0.5,
        height: 1.7,
    },
    size_limit: SizeLimit {
        length_min: 0.3,
        length_max: 2.0,
        width_min: 0.3,
        width_max: 1.0,
        height_min: 1.0,
        height_max: 2.0,
    },
    process_noise: VEHICLE_PROCESS_NOISE,
    process_limit: ProcessLimit {
        vel_long_max: kmph2mps(100.0),
    },
    // Pedestrians never run the bicycle model; the shared constants keep the
    // table total.
    bicycle_state: BICYCLE_STATE,
    initial_covariance: VEHICLE_INITIAL_COVARIANCE,
    measurement_covariance: VEHICLE_MEASUREMENT_COVARIANCE,
};

// ============================================================================
// Unclassified objects
// ============================================================================

/// Parameters of the free constant-velocity model used when no class is
/// known. Shaped differently from [`ObjectModel`] because the model carries
/// a world-frame velocity vector instead of heading plus speed.
#[derive(Debug, Clone, Copy)]
pub struct UnknownObjectModel {
    /// Position process noise [m/s].
    pub q_stddev_pos: f64,
    /// Velocity process noise [m/s^2].
    pub q_stddev_vel: f64,
    /// Per-component speed cap [m/s].
    pub vel_max: f64,
    /// Initial position variance [m^2].
    pub p0_cov_pos: f64,
    /// Initial velocity variance [(m/s)^2].
    pub p0_cov_vel: f64,
    /// Measurement position variance, isotropic [m^2].
    pub r_cov_pos: f64,
}

pub const UNKNOWN: UnknownObjectModel = UnknownObjectModel {
    q_stddev_pos: 0.5,
    q_stddev_vel: 9.8 * 0.3,
    vel_max: kmph2mps(60.0),
    p0_cov_pos: sq(1.0),
    p0_cov_vel: sq(kmph2mps(1000.0)),
    r_cov_pos: sq(1.0),
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_limits_ordered() {
        for model in [NORMAL_VEHICLE, BIG_VEHICLE, BICYCLE, PEDESTRIAN] {
            let l = model.size_limit;
            assert!(0.0 < l.length_min && l.length_min < l.length_max);
            assert!(0.0 < l.width_min && l.width_min < l.width_max);
            assert!(0.0 < l.height_min && l.height_min < l.height_max);
        }
    }

    #[test]
    fn test_vehicle_size_priors_within_their_limits() {
        for model in [NORMAL_VEHICLE, BIG_VEHICLE, PEDESTRIAN] {
            let s = model.init_size;
            let l = model.size_limit;
            assert!(l.length_min <= s.length && s.length <= l.length_max);
            assert!(l.width_min <= s.width && s.width <= l.width_max);
            assert!(l.height_min <= s.height && s.height <= l.height_max);
        }
    }

    #[test]
    fn test_noise_bounds_ordered() {
        for model in [NORMAL_VEHICLE, BIG_VEHICLE, BICYCLE, PEDESTRIAN] {
            let n = model.process_noise;
            assert!(n.yaw_rate_min < n.yaw_rate_max);
            let b = model.bicycle_state;
            assert!(b.slip_rate_stddev_min < b.slip_rate_stddev_max);
        }
    }

    #[test]
    fn test_unknown_speed_cap_lower_than_classed() {
        assert!(UNKNOWN.vel_max < NORMAL_VEHICLE.process_limit.vel_long_max);
    }

    #[test]
    fn test_bicycle_params_carry_row_values() {
        let params = BIG_VEHICLE.bicycle_params();
        assert_eq!(params.q_stddev_acc_long, BIG_VEHICLE.process_noise.acc_long);
        assert_eq!(params.max_slip, BIG_VEHICLE.bicycle_state.slip_angle_max);
        assert_eq!(params.p0_cov_vel, BIG_VEHICLE.initial_covariance.vel_long);
    }

    #[test]
    fn test_ctrv_params_carry_row_values() {
        let params = PEDESTRIAN.ctrv_params();
        assert_eq!(params.q_stddev_acc_lat, PEDESTRIAN.process_noise.acc_lat);
        assert_eq!(params.max_speed, PEDESTRIAN.process_limit.vel_long_max);
        assert_eq!(params.p0_cov_yaw, PEDESTRIAN.initial_covariance.yaw);
    }
}
