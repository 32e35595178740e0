use std::fmt;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;
use crate::errors::InvalidArgument;
use crate::utils::checked_sqrt;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Deserialize, Serialize)]
pub enum EnergyModel {
    #[serde(rename = "linear")]
    Linear = 0,
    #[serde(rename = "non-linear")]
    NonLinear = 1,
    #[serde(rename = "endurance")]
    Endurance = 2,
    #[serde(rename = "unlimited")]
    Unlimited = 3,
}

impl fmt::Display for EnergyModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Linear => "linear",
                Self::NonLinear => "non-linear",
                Self::Endurance => "endurance",
                Self::Unlimited => "unlimited",
            }
        )
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Deserialize, Serialize)]
pub enum ConfigType {
    #[serde(rename = "low")]
    Low,
    #[serde(rename = "high")]
    High,
}

impl fmt::Display for ConfigType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Low => "low",
                Self::High => "high",
            }
        )
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Deserialize, Serialize)]
pub enum DistanceType {
    #[serde(rename = "manhattan")]
    Manhattan,
    #[serde(rename = "euclidean")]
    Euclidean,
}

impl fmt::Display for DistanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Manhattan => "manhattan",
                Self::Euclidean => "euclidean",
            }
        )
    }
}

impl DistanceType {
    pub fn matrix(&self, x: &[f64], y: &[f64]) -> Result<Vec<Vec<f64>>, InvalidArgument> {
        let n = x.len().min(y.len());

        let mut matrix = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in i + 1..n {
                let dx = x[i] - x[j];
                let dy = y[i] - y[j];
                let d = match self {
                    Self::Manhattan => dx.abs() + dy.abs(),
                    Self::Euclidean => checked_sqrt(dx.mul_add(dx, dy * dy))?,
                };

                matrix[i][j] = d;
                matrix[j][i] = d;
            }
        }

        Ok(matrix)
    }
}

#[derive(Debug, Parser)]
#[command(
    long_about = "Min-timespan delivery planning for a mixed fleet of multi-trip trucks and drones",
    propagate_version = true,
    version
)]
pub struct Arguments {
    #[command(subcommand)]
    pub command: Commands,
}

/// Everything needed to load a problem instance.
#[derive(Clone, Debug, Args)]
pub struct InstanceArgs {
    /// Path to the coordinate file
    pub problem: String,

    /// Path to truck config file
    #[arg(long, default_value_t = String::from("problems/config_parameter/truck_config.json"))]
    pub truck_cfg: String,

    /// Path to drone config file
    #[arg(long, default_value_t = String::from("problems/config_parameter/drone_endurance_config.json"))]
    pub drone_cfg: String,

    /// The energy consumption model to use. Otherwise, read the "drone_model" line of the problem file
    /// and fall back to the endurance model.
    #[arg(short, long)]
    pub config: Option<EnergyModel>,

    /// Speed type of drones.
    #[arg(long, default_value_t = ConfigType::High)]
    pub speed_type: ConfigType,

    /// Range type of drones.
    #[arg(long, default_value_t = ConfigType::High)]
    pub range_type: ConfigType,

    /// Distance type to use for trucks.
    #[arg(long, default_value_t = DistanceType::Euclidean)]
    pub truck_distance: DistanceType,

    /// Distance type to use for drones.
    #[arg(long, default_value_t = DistanceType::Euclidean)]
    pub drone_distance: DistanceType,

    /// The number of trucks to override. Otherwise, use the value in the problem file.
    #[arg(long)]
    pub trucks_count: Option<usize>,

    /// The number of drones to override. Otherwise, use the value in the problem file.
    #[arg(long)]
    pub drones_count: Option<usize>,

    /// The maximum waiting time of each customer (in seconds), measured from the end of its service
    /// until the vehicle returns to the depot.
    #[arg(long, default_value_t = 3600.0)]
    pub waiting_time_limit: f64,
}

#[allow(clippy::large_enum_variant)] // Parsed once per process
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Evaluate an existing solution against a problem instance
    Evaluate {
        /// Path to the solution JSON file
        solution: String,

        #[command(flatten)]
        instance: InstanceArgs,

        #[command(flatten)]
        search: SearchConfig,
    },

    /// Run the tabu search
    Run {
        #[command(flatten)]
        instance: InstanceArgs,

        #[command(flatten)]
        search: SearchConfig,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_matrices_are_symmetric() {
        let x = [0.0, 3.0, -1.0];
        let y = [0.0, 4.0, 2.0];

        let euclidean = DistanceType::Euclidean.matrix(&x, &y).unwrap();
        assert!((euclidean[0][1] - 5.0).abs() < 1e-9);
        assert_eq!(euclidean[1][0], euclidean[0][1]);
        assert_eq!(euclidean[2][2], 0.0);

        let manhattan = DistanceType::Manhattan.matrix(&x, &y).unwrap();
        assert!((manhattan[1][2] - 6.0).abs() < 1e-9);
    }

    #[test]
    fn run_command_defaults() {
        let arguments = Arguments::parse_from(["d2d-planner", "run", "problems/6.5.1.txt", "--seed", "3"]);
        let Commands::Run { instance, search } = arguments.command else {
            panic!("expected the run subcommand");
        };

        assert_eq!(instance.problem, "problems/6.5.1.txt");
        assert_eq!(instance.config, None);
        assert_eq!(instance.truck_distance, DistanceType::Euclidean);
        assert_eq!(search.seed, Some(3));
        assert!(search.penalty.factor > 1.0);
    }
}
