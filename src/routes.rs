use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::config::HOUR;
use crate::fenwick::FenwickTree;
use crate::problem::Problem;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub enum VehicleKind {
    Truck,
    Drone,
}

impl fmt::Display for VehicleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Truck => "truck",
                Self::Drone => "drone",
            }
        )
    }
}

impl VehicleKind {
    pub const ALL: [Self; 2] = [Self::Truck, Self::Drone];

    /// Whether a vehicle of this kind may visit `customer`. The depot is always servable.
    pub fn servable(self, problem: &Problem, customer: usize) -> bool {
        match self {
            Self::Truck => true,
            Self::Drone => problem.customers[customer].dronable,
        }
    }

    pub fn capacity(self, problem: &Problem) -> f64 {
        match self {
            Self::Truck => problem.truck.capacity,
            Self::Drone => problem.drone.capacity(),
        }
    }

    pub fn service_time(self, problem: &Problem, customer: usize) -> f64 {
        match self {
            Self::Truck => problem.customers[customer].truck_service_time,
            Self::Drone => problem.customers[customer].drone_service_time,
        }
    }
}

/// A single vehicle of the fleet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Vehicle {
    pub kind: VehicleKind,
    pub index: usize,
}

impl fmt::Display for Vehicle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.kind, self.index)
    }
}

/// Position of a truck within the hourly speed bands.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TruckClock {
    band: usize,
    within: f64,
}

impl TruckClock {
    pub fn at(time: f64) -> Self {
        let band = (time / HOUR) as usize;
        Self {
            band,
            within: (band as f64).mul_add(-HOUR, time),
        }
    }

    fn _shift(&mut self, dt: f64) {
        self.within += dt;
        while self.within >= HOUR {
            self.within -= HOUR;
            self.band += 1;
        }
    }

    /// Time from the start of service at `from` until arriving at `to`, advancing the clock.
    pub fn leg(&mut self, problem: &Problem, from: usize, to: usize) -> f64 {
        let service = problem.customers[from].truck_service_time;
        let mut segment = service;
        self._shift(service);

        let mut distance = problem.truck_distances[from][to];
        while distance > 0.0 {
            let speed = problem.truck.speed_at(self.band);
            let shift = distance.min(speed * (HOUR - self.within));
            distance -= shift;

            let dt = shift / speed;
            segment += dt;
            self._shift(dt);
        }

        segment
    }

    pub fn time_segments(&mut self, problem: &Problem, customers: &[usize]) -> FenwickTree<f64> {
        customers.windows(2).map(|w| self.leg(problem, w[0], w[1])).collect()
    }
}

/// An immutable trip that starts and ends at the depot. Aggregates are computed once on construction; any
/// change to the customer sequence builds a new route.
pub struct Route {
    pub kind: VehicleKind,
    pub customers: Vec<usize>,
    pub distance: f64,
    pub weight: f64,

    /// `time_segments[i]`: start of service at `customers[i]` until arrival at `customers[i + 1]`.
    pub time_segments: FenwickTree<f64>,

    /// One entry per position, depot entries are 0.
    pub waiting_time_violations: FenwickTree<f64>,

    pub energy_consumption: f64,
    pub capacity_violation: f64,
    pub energy_violation: f64,
    pub fixed_time_violation: f64,
    pub fixed_distance_violation: f64,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.customers)
    }
}

impl Route {
    pub fn new(problem: &Problem, kind: VehicleKind, customers: Vec<usize>) -> Rc<Self> {
        let time_segments = Self::time_segments(problem, kind, &customers);
        Rc::new(Self::_construct(problem, kind, customers, time_segments))
    }

    pub fn single(problem: &Problem, kind: VehicleKind, customer: usize) -> Rc<Self> {
        Self::new(problem, kind, vec![0, customer, 0])
    }

    /// Time segments of a trip that starts at time 0.
    pub fn time_segments(problem: &Problem, kind: VehicleKind, customers: &[usize]) -> FenwickTree<f64> {
        match kind {
            VehicleKind::Truck => TruckClock::default().time_segments(problem, customers),
            VehicleKind::Drone => customers
                .windows(2)
                .map(|w| Self::_drone_segment(problem, w[0], w[1]))
                .collect(),
        }
    }

    fn _drone_segment(problem: &Problem, from: usize, to: usize) -> f64 {
        let drone = &problem.drone;
        problem.customers[from].drone_service_time
            + drone.takeoff_time()
            + drone.cruise_time(problem.drone_distances[from][to])
            + drone.landing_time()
    }

    pub fn waiting_time_violations(
        problem: &Problem,
        kind: VehicleKind,
        customers: &[usize],
        time_segments: &FenwickTree<f64>,
    ) -> FenwickTree<f64> {
        let total = time_segments.total();
        let last = customers.len() - 1;
        customers
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                if i == 0 || i == last {
                    0.0
                } else {
                    let remaining = total - time_segments.sum(0, i) - kind.service_time(problem, c);
                    (remaining - problem.maximum_waiting_time).max(0.0)
                }
            })
            .collect()
    }

    fn _construct(
        problem: &Problem,
        kind: VehicleKind,
        customers: Vec<usize>,
        time_segments: FenwickTree<f64>,
    ) -> Self {
        debug_assert_eq!(customers.first(), Some(&0));
        debug_assert_eq!(customers.last(), Some(&0));
        debug_assert!(customers.len() >= 2);

        let distances = match kind {
            VehicleKind::Truck => &problem.truck_distances,
            VehicleKind::Drone => &problem.drone_distances,
        };

        let mut distance = 0.0;
        let mut weight = 0.0;
        let mut energy_consumption = 0.0;
        for w in customers.windows(2) {
            let leg = distances[w[0]][w[1]];
            distance += leg;
            weight += problem.customers[w[0]].demand;
            if kind == VehicleKind::Drone {
                energy_consumption += problem.drone.leg_energy(weight, leg);
            }
        }

        let waiting_time_violations = Self::waiting_time_violations(problem, kind, &customers, &time_segments);
        let capacity_violation = (weight - kind.capacity(problem)).max(0.0);

        let (energy_violation, fixed_time_violation, fixed_distance_violation) = match kind {
            VehicleKind::Truck => (0.0, 0.0, 0.0),
            VehicleKind::Drone => (
                problem
                    .drone
                    .battery()
                    .map_or(0.0, |battery| (energy_consumption - battery).max(0.0)),
                (time_segments.total() - problem.drone.fixed_time()).max(0.0),
                (distance - problem.drone.fixed_distance()).max(0.0),
            ),
        };

        Self {
            kind,
            customers,
            distance,
            weight,
            time_segments,
            waiting_time_violations,
            energy_consumption,
            capacity_violation,
            energy_violation,
            fixed_time_violation,
            fixed_distance_violation,
        }
    }

    pub fn working_time(&self) -> f64 {
        self.time_segments.total()
    }

    pub fn waiting_time_violation(&self) -> f64 {
        self.waiting_time_violations.total()
    }

    /// Number of customers served, depots excluded.
    pub fn len(&self) -> usize {
        self.customers.len() - 2
    }

    pub fn is_empty(&self) -> bool {
        self.customers.len() <= 2
    }

    /// Whether appending stays within every limit of this vehicle kind.
    pub fn within_limits(&self) -> bool {
        self.capacity_violation == 0.0
            && self.energy_violation == 0.0
            && self.waiting_time_violation() == 0.0
            && self.fixed_time_violation == 0.0
            && self.fixed_distance_violation == 0.0
    }

    /// Append `customer` before the closing depot. Only the trailing time segments are recomputed.
    pub fn push(&self, problem: &Problem, customer: usize) -> Rc<Self> {
        let mut customers = self.customers.clone();
        customers.insert(customers.len() - 1, customer);

        let mut time_segments = self.time_segments.clone();
        time_segments.pop();

        let start = customers.len() - 3;
        match self.kind {
            VehicleKind::Truck => {
                let mut clock = TruckClock::at(time_segments.total());
                for i in start..customers.len() - 1 {
                    time_segments.push(clock.leg(problem, customers[i], customers[i + 1]));
                }
            }
            VehicleKind::Drone => {
                for i in start..customers.len() - 1 {
                    time_segments.push(Self::_drone_segment(problem, customers[i], customers[i + 1]));
                }
            }
        }

        Rc::new(Self::_construct(problem, self.kind, customers, time_segments))
    }

    /// Reverse the customers at positions `[i, j]` (2-opt move). Drone legs are independent of the departure
    /// time, so only the legs touching the reversed block are recomputed.
    pub fn reverse(&self, problem: &Problem, i: usize, j: usize) -> Rc<Self> {
        let mut customers = self.customers.clone();
        customers[i..=j].reverse();

        match self.kind {
            VehicleKind::Truck => Self::new(problem, self.kind, customers),
            VehicleKind::Drone => {
                let mut time_segments = self.time_segments.clone();
                for k in i - 1..=j {
                    time_segments.set(k, Self::_drone_segment(problem, customers[k], customers[k + 1]));
                }

                Rc::new(Self::_construct(problem, self.kind, customers, time_segments))
            }
        }
    }
}
