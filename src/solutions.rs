use std::rc::Rc;

use serde::{Deserialize, Serialize, Serializer};

use crate::config::PenaltyConfig;
use crate::errors::InvalidSolution;
use crate::problem::Problem;
use crate::routes::{Route, TruckClock, VehicleKind};

fn _serialize_routes<S>(routes: &[Vec<Rc<Route>>], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(
        routes
            .iter()
            .map(|r| r.iter().map(|r| &r.customers).collect::<Vec<_>>()),
    )
}

/// Labels of the penalised violation types, in the order of [`Solution::violations`].
pub const VIOLATIONS: [&str; 5] = ["energy", "capacity", "waiting time", "fixed time", "fixed distance"];

#[derive(Debug, Serialize)]
pub struct Solution {
    #[serde(serialize_with = "_serialize_routes")]
    pub truck_routes: Vec<Vec<Rc<Route>>>,
    #[serde(serialize_with = "_serialize_routes")]
    pub drone_routes: Vec<Vec<Rc<Route>>>,

    pub truck_working_time: Vec<f64>,
    pub drone_working_time: Vec<f64>,

    /// Completion time of the vehicle that returns last.
    pub working_time: f64,
    pub energy_violation: f64,
    pub capacity_violation: f64,
    pub waiting_time_violation: f64,
    pub fixed_time_violation: f64,
    pub fixed_distance_violation: f64,

    pub feasible: bool,
}

/// Route lists as stored in a solution JSON file.
#[derive(Debug, Deserialize)]
pub struct SolutionJSON {
    pub truck_routes: Vec<Vec<Vec<usize>>>,
    pub drone_routes: Vec<Vec<Vec<usize>>>,
}

fn _normalize(violation: f64, scale: f64) -> f64 {
    if violation > 0.0 { violation / scale } else { 0.0 }
}

impl Solution {
    pub fn new(problem: &Problem, truck_routes: Vec<Vec<Rc<Route>>>, drone_routes: Vec<Vec<Rc<Route>>>) -> Self {
        let mut truck_working_time = Vec::with_capacity(truck_routes.len());
        let mut truck_capacity_violation = 0.0;
        let mut waiting_time_violation = 0.0;
        for routes in &truck_routes {
            let (time, waiting) = Self::_truck_schedule(problem, routes);
            truck_working_time.push(time);
            waiting_time_violation += waiting;
            truck_capacity_violation += routes.iter().map(|r| r.capacity_violation).sum::<f64>();
        }

        let mut drone_working_time = Vec::with_capacity(drone_routes.len());
        let mut drone_capacity_violation = 0.0;
        let mut energy_violation = 0.0;
        let mut fixed_time_violation = 0.0;
        let mut fixed_distance_violation = 0.0;
        for routes in &drone_routes {
            drone_working_time.push(routes.iter().map(|r| r.working_time()).sum());
            waiting_time_violation += routes.iter().map(|r| r.waiting_time_violation()).sum::<f64>();
            drone_capacity_violation += routes.iter().map(|r| r.capacity_violation).sum::<f64>();
            energy_violation += routes.iter().map(|r| r.energy_violation).sum::<f64>();
            fixed_time_violation += routes.iter().map(|r| r.fixed_time_violation).sum::<f64>();
            fixed_distance_violation += routes.iter().map(|r| r.fixed_distance_violation).sum::<f64>();
        }

        let working_time = truck_working_time
            .iter()
            .chain(&drone_working_time)
            .copied()
            .fold(0.0, f64::max);

        let energy_violation = _normalize(energy_violation, problem.drone.battery().unwrap_or(1.0));
        let capacity_violation = _normalize(truck_capacity_violation, problem.truck.capacity)
            + _normalize(drone_capacity_violation, problem.drone.capacity());
        let waiting_time_violation = _normalize(waiting_time_violation, problem.maximum_waiting_time);
        let fixed_time_violation = _normalize(fixed_time_violation, problem.drone.fixed_time());
        let fixed_distance_violation = _normalize(fixed_distance_violation, problem.drone.fixed_distance());

        Self {
            truck_routes,
            drone_routes,
            truck_working_time,
            drone_working_time,
            working_time,
            energy_violation,
            capacity_violation,
            waiting_time_violation,
            fixed_time_violation,
            fixed_distance_violation,
            feasible: energy_violation == 0.0
                && capacity_violation == 0.0
                && waiting_time_violation == 0.0
                && fixed_time_violation == 0.0
                && fixed_distance_violation == 0.0,
        }
    }

    /// Completion time and waiting-time violation of one truck running `routes` back to back.
    ///
    /// Cached route timings assume a departure at time 0, which only holds for the first trip unless the
    /// truck speed is constant.
    fn _truck_schedule(problem: &Problem, routes: &[Rc<Route>]) -> (f64, f64) {
        let constant_speed = problem.truck.coefficients.len() == 1;

        let mut elapsed = 0.0;
        let mut waiting = 0.0;
        for (i, route) in routes.iter().enumerate() {
            if i == 0 || constant_speed {
                elapsed += route.working_time();
                waiting += route.waiting_time_violation();
            } else {
                let segments = TruckClock::at(elapsed).time_segments(problem, &route.customers);
                waiting +=
                    Route::waiting_time_violations(problem, VehicleKind::Truck, &route.customers, &segments).total();
                elapsed += segments.total();
            }
        }

        (elapsed, waiting)
    }

    pub fn from_json(problem: &Problem, data: SolutionJSON) -> Result<Self, InvalidSolution> {
        fn _build(
            problem: &Problem,
            kind: VehicleKind,
            vehicles: Vec<Vec<Vec<usize>>>,
        ) -> Result<Vec<Vec<Rc<Route>>>, InvalidSolution> {
            if vehicles.len() != problem.vehicles_count(kind) {
                return Err(InvalidSolution {
                    reason: format!(
                        "expected {} {kind} route lists, found {}",
                        problem.vehicles_count(kind),
                        vehicles.len()
                    ),
                });
            }

            let mut result = Vec::with_capacity(vehicles.len());
            for routes in vehicles {
                let mut built = Vec::with_capacity(routes.len());
                for customers in routes {
                    if customers.len() < 2 || customers.first() != Some(&0) || customers.last() != Some(&0) {
                        return Err(InvalidSolution {
                            reason: format!("{kind} route {customers:?} does not start and end at the depot"),
                        });
                    }

                    if let Some(&c) = customers.iter().find(|&&c| c > problem.customers_count) {
                        return Err(InvalidSolution {
                            reason: format!("unknown customer {c}"),
                        });
                    }

                    built.push(Route::new(problem, kind, customers));
                }

                result.push(built);
            }

            Ok(result)
        }

        let truck_routes = _build(problem, VehicleKind::Truck, data.truck_routes)?;
        let drone_routes = _build(problem, VehicleKind::Drone, data.drone_routes)?;
        let solution = Self::new(problem, truck_routes, drone_routes);
        solution.verify(problem)?;

        Ok(solution)
    }

    pub fn routes(&self, kind: VehicleKind) -> &[Vec<Rc<Route>>] {
        match kind {
            VehicleKind::Truck => &self.truck_routes,
            VehicleKind::Drone => &self.drone_routes,
        }
    }

    pub fn violations(&self) -> [f64; 5] {
        [
            self.energy_violation,
            self.capacity_violation,
            self.waiting_time_violation,
            self.fixed_time_violation,
            self.fixed_distance_violation,
        ]
    }

    pub fn cost(&self, coefficients: &PenaltyCoefficients) -> f64 {
        self.violations()
            .iter()
            .zip(coefficients.values)
            .fold(self.working_time, |acc, (&violation, coefficient)| {
                coefficient.mul_add(violation, acc)
            })
    }

    /// Check the structural rules: every customer is served exactly once, every route is bounded by the
    /// depot and serves someone, drones only carry dronable customers.
    pub fn verify(&self, problem: &Problem) -> Result<(), InvalidSolution> {
        let mut served = vec![false; problem.customers_count + 1];
        served[0] = true;

        for kind in VehicleKind::ALL {
            let vehicles = self.routes(kind);
            if vehicles.len() != problem.vehicles_count(kind) {
                return Err(InvalidSolution {
                    reason: format!("{} {kind} route lists for {} vehicles", vehicles.len(), problem.vehicles_count(kind)),
                });
            }

            for routes in vehicles {
                for route in routes {
                    let customers = &route.customers;
                    if customers.len() <= 2 || customers.first() != Some(&0) || customers.last() != Some(&0) {
                        return Err(InvalidSolution {
                            reason: format!("invalid {kind} route {customers:?}"),
                        });
                    }

                    for &c in &customers[1..customers.len() - 1] {
                        if c == 0 || c > problem.customers_count {
                            return Err(InvalidSolution {
                                reason: format!("{kind} route {customers:?} visits node {c} mid-trip"),
                            });
                        }

                        if served[c] {
                            return Err(InvalidSolution {
                                reason: format!("customer {c} is served more than once"),
                            });
                        }

                        if !kind.servable(problem, c) {
                            return Err(InvalidSolution {
                                reason: format!("customer {c} cannot be served by a drone"),
                            });
                        }

                        served[c] = true;
                    }
                }
            }
        }

        match served.iter().position(|s| !s) {
            Some(c) => Err(InvalidSolution {
                reason: format!("customer {c} is not served"),
            }),
            None => Ok(()),
        }
    }

    /// Number of customers whose successor differs between the two solutions.
    pub fn hamming_distance(&self, other: &Self) -> usize {
        fn _fill_repr(vehicle_routes: &[Vec<Rc<Route>>], repr: &mut Vec<usize>) {
            for routes in vehicle_routes {
                for route in routes {
                    let customers = &route.customers;
                    for i in 1..customers.len() - 1 {
                        let c = customers[i];
                        if c >= repr.len() {
                            repr.resize(c + 1, 0);
                        }

                        repr[c] = customers[i + 1];
                    }
                }
            }
        }

        let mut self_repr = vec![];
        _fill_repr(&self.truck_routes, &mut self_repr);
        _fill_repr(&self.drone_routes, &mut self_repr);

        let mut other_repr = vec![];
        _fill_repr(&other.truck_routes, &mut other_repr);
        _fill_repr(&other.drone_routes, &mut other_repr);

        let n = self_repr.len().max(other_repr.len());
        self_repr.resize(n, 0);
        other_repr.resize(n, 0);
        self_repr.iter().zip(&other_repr).filter(|(a, b)| a != b).count()
    }

    /// Customer sequences of every vehicle, trucks first. Two solutions with equal signatures are the same
    /// assignment.
    pub fn signature(&self) -> Vec<Vec<Vec<usize>>> {
        self.truck_routes
            .iter()
            .chain(&self.drone_routes)
            .map(|routes| routes.iter().map(|r| r.customers.clone()).collect())
            .collect()
    }
}

/// Adaptive weights of the violation terms in [`Solution::cost`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PenaltyCoefficients {
    pub values: [f64; 5],
    #[serde(skip)]
    positive: [usize; 5],
    #[serde(skip)]
    zero: [usize; 5],
}

impl PenaltyCoefficients {
    pub fn new(config: &PenaltyConfig) -> Self {
        Self {
            values: [1.0_f64.max(config.min).min(config.max); 5],
            positive: [0; 5],
            zero: [0; 5],
        }
    }

    /// Every coefficient at its upper bound, used when reinserting customers.
    pub fn saturated(config: &PenaltyConfig) -> Self {
        Self {
            values: [config.max; 5],
            positive: [0; 5],
            zero: [0; 5],
        }
    }

    pub fn update(&mut self, solution: &Solution, config: &PenaltyConfig) {
        for (k, violation) in solution.violations().into_iter().enumerate() {
            if violation > 0.0 {
                self.zero[k] = 0;
                self.positive[k] += 1;
                if self.positive[k] >= config.increase_after {
                    self.positive[k] = 0;
                    self.values[k] *= config.factor;
                }
            } else {
                self.positive[k] = 0;
                self.zero[k] += 1;
                if self.zero[k] >= config.decrease_after {
                    self.zero[k] = 0;
                    self.values[k] /= config.factor;
                }
            }

            self.values[k] = self.values[k].max(config.min).min(config.max);
        }
    }
}
