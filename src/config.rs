use std::error::Error;
use std::f64::consts;
use std::fs;

use clap::Args;
use serde::{Deserialize, Serialize};

use crate::cli;
use crate::errors::InvalidInstance;

/// Length of one speed band (s).
pub const HOUR: f64 = 3600.0;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TruckConfig {
    #[serde(rename = "V_max (m/s)")]
    pub speed: f64,

    #[serde(rename = "M_t (kg)")]
    pub capacity: f64,

    /// Hourly speed multipliers, cycled through as the day goes on.
    #[serde(default = "_default_coefficients")]
    pub coefficients: Vec<f64>,
}

fn _default_coefficients() -> Vec<f64> {
    vec![1.0]
}

impl TruckConfig {
    pub fn load(path: &str) -> Result<Self, Box<dyn Error>> {
        let config = serde_json::from_str::<Self>(&fs::read_to_string(path)?)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), InvalidInstance> {
        if self.coefficients.is_empty() {
            return Err(InvalidInstance::MalformedCoefficients(String::from("empty list")));
        }

        if let Some(c) = self.coefficients.iter().find(|&&c| !(c > 0.0 && c.is_finite())) {
            return Err(InvalidInstance::MalformedCoefficients(format!("{c} is not a positive speed multiplier")));
        }

        if !(self.speed > 0.0) {
            return Err(InvalidInstance::MalformedCoefficients(format!("maximum speed {}", self.speed)));
        }

        Ok(())
    }

    /// Speed during the `hour`-th hour since the truck left the depot for its first trip.
    pub fn speed_at(&self, hour: usize) -> f64 {
        self.speed * self.coefficients[hour % self.coefficients.len()]
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LinearJSON {
    #[serde(rename = "takeoffSpeed [m/s]")]
    pub takeoff_speed: f64,

    #[serde(rename = "cruiseSpeed [m/s]")]
    pub cruise_speed: f64,

    #[serde(rename = "landingSpeed [m/s]")]
    pub landing_speed: f64,

    #[serde(rename = "cruiseAlt [m]")]
    pub altitude: f64,

    #[serde(rename = "capacity [kg]")]
    pub capacity: f64,

    #[serde(rename = "batteryPower [Joule]")]
    pub battery: f64,

    pub speed_type: cli::ConfigType,
    pub range_type: cli::ConfigType,

    #[serde(rename = "beta(w/kg)")]
    pub beta: f64,

    #[serde(rename = "gamma(w)")]
    pub gamma: f64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NonLinearJSON {
    #[serde(rename = "takeoffSpeed [m/s]")]
    pub takeoff_speed: f64,

    #[serde(rename = "cruiseSpeed [m/s]")]
    pub cruise_speed: f64,

    #[serde(rename = "landingSpeed [m/s]")]
    pub landing_speed: f64,

    #[serde(rename = "cruiseAlt [m]")]
    pub altitude: f64,

    #[serde(rename = "capacity [kg]")]
    pub capacity: f64,

    #[serde(rename = "batteryPower [Joule]")]
    pub battery: f64,

    pub speed_type: cli::ConfigType,
    pub range_type: cli::ConfigType,
}

#[derive(Debug, Deserialize)]
pub struct NonLinearFileJSON {
    pub config: Vec<NonLinearJSON>,
    pub k1: f64,

    #[serde(rename = "k2 (sqrt(kg/m))")]
    pub k2: f64,

    #[serde(rename = "c1 (sqrt(m/kg))")]
    pub c1: f64,

    #[serde(rename = "c2 (sqrt(m/kg))")]
    pub c2: f64,

    #[serde(rename = "c4 (kg/m)")]
    pub c4: f64,

    #[serde(rename = "c5 (Ns/m)")]
    pub c5: f64,
}

fn _infinity() -> f64 {
    f64::INFINITY
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EnduranceJSON {
    pub speed_type: cli::ConfigType,
    pub range_type: cli::ConfigType,

    #[serde(rename = "capacity [kg]")]
    pub capacity: f64,

    #[serde(rename = "FixedTime (s)")]
    pub fixed_time: f64,

    #[serde(rename = "FixedDistance (m)", default = "_infinity")]
    pub fixed_distance: f64,

    #[serde(rename = "V_max (m/s)")]
    pub speed: f64,
}

/// Drone power model. Every variant answers the same queries; only the formulas differ.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "config")]
pub enum DroneConfig {
    Linear {
        data: LinearJSON,
        takeoff_time: f64,
        landing_time: f64,
    },
    NonLinear {
        data: NonLinearJSON,
        vert_k1: f64,
        vert_k2: f64,
        vert_c2: f64,
        vert_half_takeoff: f64,
        vert_half_landing: f64,
        vert_half_takeoff_2: f64,
        vert_half_landing_2: f64,
        hori_c12: f64,
        hori_c4v3: f64,
        hori_c42v4: f64,
        hori_c5: f64,
        takeoff_time: f64,
        landing_time: f64,
    },
    Endurance {
        data: EnduranceJSON,
    },
}

impl DroneConfig {
    /// Drone body weight (kg).
    const W: f64 = 1.5;
    const G: f64 = 9.8;

    pub fn load(
        path: &str,
        model: cli::EnergyModel,
        speed_type: cli::ConfigType,
        range_type: cli::ConfigType,
    ) -> Result<Self, Box<dyn Error>> {
        let no_match = || InvalidInstance::NoMatchingDroneConfig {
            speed_type: speed_type.to_string(),
            range_type: range_type.to_string(),
        };

        match model {
            cli::EnergyModel::Linear => {
                let data = serde_json::from_str::<Vec<LinearJSON>>(&fs::read_to_string(path)?)?;
                let config = data
                    .into_iter()
                    .find(|c| c.speed_type == speed_type && c.range_type == range_type)
                    .ok_or_else(no_match)?;

                Ok(Self::linear(config))
            }
            cli::EnergyModel::NonLinear => {
                let mut data = serde_json::from_str::<NonLinearFileJSON>(&fs::read_to_string(path)?)?;
                let index = data
                    .config
                    .iter()
                    .position(|c| c.speed_type == speed_type && c.range_type == range_type)
                    .ok_or_else(no_match)?;

                let config = data.config.swap_remove(index);
                Ok(Self::non_linear(config, &data))
            }
            cli::EnergyModel::Endurance => {
                let data = serde_json::from_str::<Vec<EnduranceJSON>>(&fs::read_to_string(path)?)?;
                let config = data
                    .into_iter()
                    .find(|c| c.speed_type == speed_type && c.range_type == range_type)
                    .ok_or_else(no_match)?;

                Ok(Self::Endurance { data: config })
            }
            cli::EnergyModel::Unlimited => Ok(Self::unlimited()),
        }
    }

    pub fn linear(data: LinearJSON) -> Self {
        let takeoff_time = data.altitude / data.takeoff_speed;
        let landing_time = data.altitude / data.landing_speed;
        Self::Linear {
            data,
            takeoff_time,
            landing_time,
        }
    }

    pub fn non_linear(data: NonLinearJSON, constants: &NonLinearFileJSON) -> Self {
        let vert_k1 = constants.k1 * Self::G;
        let vert_k2 = Self::G / (constants.k2 * constants.k2);
        let vert_c2 = constants.c2 * Self::G.powf(1.5);
        let vert_half_takeoff = data.takeoff_speed / 2.0;
        let vert_half_landing = data.landing_speed / 2.0;

        let v = data.cruise_speed;
        let deg_10 = consts::PI / 18.0;

        Self::NonLinear {
            vert_k1,
            vert_k2,
            vert_c2,
            vert_half_takeoff,
            vert_half_landing,
            vert_half_takeoff_2: vert_half_takeoff * vert_half_takeoff,
            vert_half_landing_2: vert_half_landing * vert_half_landing,
            hori_c12: constants.c1 + constants.c2,
            hori_c4v3: constants.c4 * v.powi(3),
            hori_c42v4: constants.c4 * constants.c4 * v.powi(4),
            hori_c5: constants.c5 * (v * deg_10.cos()).powi(2),
            takeoff_time: data.altitude / data.takeoff_speed,
            landing_time: data.altitude / data.landing_speed,
            data,
        }
    }

    pub fn unlimited() -> Self {
        Self::Endurance {
            data: EnduranceJSON {
                speed_type: cli::ConfigType::High,
                range_type: cli::ConfigType::High,
                capacity: f64::INFINITY,
                fixed_time: f64::INFINITY,
                fixed_distance: f64::INFINITY,
                speed: 1.0,
            },
        }
    }

    pub fn capacity(&self) -> f64 {
        match self {
            Self::Linear { data, .. } => data.capacity,
            Self::NonLinear { data, .. } => data.capacity,
            Self::Endurance { data } => data.capacity,
        }
    }

    /// Battery energy (J). Endurance models are limited by time and distance, not energy.
    pub fn battery(&self) -> Option<f64> {
        match self {
            Self::Linear { data, .. } => Some(data.battery),
            Self::NonLinear { data, .. } => Some(data.battery),
            Self::Endurance { .. } => None,
        }
    }

    pub fn fixed_time(&self) -> f64 {
        match self {
            Self::Linear { .. } | Self::NonLinear { .. } => f64::INFINITY,
            Self::Endurance { data } => data.fixed_time,
        }
    }

    pub fn fixed_distance(&self) -> f64 {
        match self {
            Self::Linear { .. } | Self::NonLinear { .. } => f64::INFINITY,
            Self::Endurance { data } => data.fixed_distance,
        }
    }

    fn _vertical_power(&self, weight: f64, half: f64, half_2: f64) -> f64 {
        match self {
            Self::NonLinear {
                vert_k1,
                vert_k2,
                vert_c2,
                ..
            } => {
                let w = Self::W + weight;
                (vert_k1 * w).mul_add(half + vert_k2.mul_add(w, half_2).sqrt(), vert_c2 * w.powf(1.5))
            }
            _ => 0.0,
        }
    }

    pub fn takeoff_power(&self, weight: f64) -> f64 {
        match self {
            Self::Linear { data, .. } => data.beta.mul_add(weight, data.gamma),
            Self::NonLinear {
                vert_half_takeoff,
                vert_half_takeoff_2,
                ..
            } => self._vertical_power(weight, *vert_half_takeoff, *vert_half_takeoff_2),
            Self::Endurance { .. } => f64::INFINITY,
        }
    }

    pub fn landing_power(&self, weight: f64) -> f64 {
        match self {
            Self::Linear { data, .. } => data.beta.mul_add(weight, data.gamma),
            Self::NonLinear {
                vert_half_landing,
                vert_half_landing_2,
                ..
            } => self._vertical_power(weight, *vert_half_landing, *vert_half_landing_2),
            Self::Endurance { .. } => f64::INFINITY,
        }
    }

    pub fn cruise_power(&self, weight: f64) -> f64 {
        match self {
            Self::Linear { data, .. } => data.beta.mul_add(weight, data.gamma),
            Self::NonLinear {
                hori_c12,
                hori_c4v3,
                hori_c42v4,
                hori_c5,
                ..
            } => {
                let temp = (Self::W + weight).mul_add(Self::G, -hori_c5);
                hori_c12.mul_add(temp.mul_add(temp, *hori_c42v4).powf(0.75), *hori_c4v3)
            }
            Self::Endurance { .. } => 0.0,
        }
    }

    pub fn takeoff_time(&self) -> f64 {
        match self {
            Self::Linear { takeoff_time, .. } | Self::NonLinear { takeoff_time, .. } => *takeoff_time,
            Self::Endurance { .. } => 0.0,
        }
    }

    pub fn landing_time(&self) -> f64 {
        match self {
            Self::Linear { landing_time, .. } | Self::NonLinear { landing_time, .. } => *landing_time,
            Self::Endurance { .. } => 0.0,
        }
    }

    pub fn cruise_time(&self, distance: f64) -> f64 {
        match self {
            Self::Linear { data, .. } => distance / data.cruise_speed,
            Self::NonLinear { data, .. } => distance / data.cruise_speed,
            Self::Endurance { data } => distance / data.speed,
        }
    }

    /// Energy spent on one leg carrying `weight`.
    pub fn leg_energy(&self, weight: f64, distance: f64) -> f64 {
        if self.battery().is_none() {
            return 0.0;
        }

        self.landing_time().mul_add(
            self.landing_power(weight),
            self.takeoff_time().mul_add(
                self.takeoff_power(weight),
                self.cruise_time(distance) * self.cruise_power(weight),
            ),
        )
    }
}

/// Adaptive penalty parameters.
#[derive(Clone, Debug, Args, Deserialize, Serialize)]
pub struct PenaltyConfig {
    /// Multiplier applied to a penalty coefficient when it is scaled up (and divisor when scaled down)
    #[arg(long = "penalty-factor", default_value_t = 1.5)]
    pub factor: f64,

    /// Lower bound of every penalty coefficient
    #[arg(long = "penalty-min", default_value_t = 1.0)]
    pub min: f64,

    /// Upper bound of every penalty coefficient
    #[arg(long = "penalty-max", default_value_t = 1000.0)]
    pub max: f64,

    /// Number of consecutive iterations with a positive violation before its coefficient is scaled up
    #[arg(long = "penalty-increase-after", default_value_t = 1)]
    pub increase_after: usize,

    /// Number of consecutive iterations with a zero violation before its coefficient is scaled down
    #[arg(long = "penalty-decrease-after", default_value_t = 1)]
    pub decrease_after: usize,
}

/// Tabu search parameters. Factors are multiplied by [Base] = [customers] / [vehicles].
#[derive(Clone, Debug, Args, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Tabu tenure, final value = max(1, [--tabu-size-factor] * [Base])
    #[arg(long, default_value_t = 0.75)]
    pub tabu_size_factor: f64,

    /// The number of non-improved iterations before diversification = max(1, [--reset-after-factor] * [Base])
    #[arg(long, default_value_t = 10.0)]
    pub reset_after_factor: f64,

    /// The number of ejection-chain iterations after each diversification = [--diversification-factor] * [Base]
    #[arg(long, default_value_t = 0.5)]
    pub diversification_factor: f64,

    /// The maximum size of the elite set
    #[arg(long, default_value_t = 10)]
    pub max_elite_size: usize,

    /// The fraction of customers removed during destroy-and-repair (set to 0 to disable)
    #[arg(long, default_value_t = 0.1)]
    pub destroy_rate: f64,

    /// The number of tabu search iterations
    #[arg(long, default_value_t = 500)]
    pub iterations: usize,

    /// Wall-clock budget in seconds, checked between iterations
    #[arg(long)]
    pub time_limit: Option<f64>,

    /// Maximum segment length moved by cross-exchange neighborhoods
    #[arg(long, default_value_t = 2)]
    pub segment_limit: usize,

    /// Routes with at most this many nodes (depot included) are sequenced exactly
    #[arg(long, default_value_t = 12)]
    pub held_karp_limit: usize,

    #[command(flatten)]
    pub penalty: PenaltyConfig,

    /// Seed of the random number generator. Otherwise, seed from the operating system.
    #[arg(long)]
    pub seed: Option<u64>,

    /// The verbose mode
    #[arg(short, long)]
    pub verbose: bool,

    /// The directory to store results
    #[arg(long, default_value_t = String::from("outputs/"))]
    pub outputs: String,

    /// Disable CSV logging per iteration (this can significantly reduce the running time)
    #[arg(long)]
    pub disable_logging: bool,
}
