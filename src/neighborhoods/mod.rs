mod cross;
mod cross_3;
mod ejection_chain;
mod move_xy;
mod rearrangement;
mod two_opt;

use std::fmt::{self, Display};
use std::rc::Rc;

use crate::problem::Problem;
use crate::routes::{Route, Vehicle, VehicleKind};
use crate::solutions::{PenaltyCoefficients, Solution};
use crate::tabu::TabuList;
use crate::utils::approximate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Neighborhood {
    TwoOpt,
    Move10,
    Move11,
    Move20,
    Move21,
    Move22,
    CrossExchange,
    CrossExchange3,
    EjectionChain,
    EdgeRearrangement,
}

impl Display for Neighborhood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::TwoOpt => "2-opt",
                Self::Move10 => "Move (1, 0)",
                Self::Move11 => "Move (1, 1)",
                Self::Move20 => "Move (2, 0)",
                Self::Move21 => "Move (2, 1)",
                Self::Move22 => "Move (2, 2)",
                Self::CrossExchange => "Cross-exchange",
                Self::CrossExchange3 => "Cross-exchange-3",
                Self::EjectionChain => "Ejection-chain",
                Self::EdgeRearrangement => "Edge rearrangement",
            }
        )
    }
}

/// Position of a route inside a solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub vehicle: Vehicle,
    pub route: usize,
}

/// The best neighbour accepted by one neighborhood.
#[derive(Debug)]
pub struct Candidate {
    pub solution: Solution,
    pub cost: f64,
    pub pair: (usize, usize),
    pub neighborhood: Neighborhood,
}

/// Shared state of one neighborhood exploration: evaluates proposed edits of `original` and keeps the cheapest
/// one that is either not tabu or satisfies the aspiration criterion.
pub struct Explorer<'a> {
    problem: &'a Problem,
    original: &'a Solution,
    tabu: &'a TabuList,
    iteration: usize,
    coefficients: &'a PenaltyCoefficients,
    neighborhood: Neighborhood,

    /// A feasible neighbour cheaper than this is accepted even when tabu.
    best_cost: f64,

    /// Accept nothing but feasible neighbours cheaper than `best_cost`.
    improving: bool,
    min_cost: f64,
    result: Option<Candidate>,
}

fn _dronable(problem: &Problem, kind: VehicleKind, customers: &[usize]) -> bool {
    kind == VehicleKind::Truck || customers.iter().all(|&c| kind.servable(problem, c))
}

impl<'a> Explorer<'a> {
    pub fn new(
        problem: &'a Problem,
        original: &'a Solution,
        tabu: &'a TabuList,
        iteration: usize,
        coefficients: &'a PenaltyCoefficients,
        neighborhood: Neighborhood,
        best_cost: f64,
    ) -> Self {
        Self {
            problem,
            original,
            tabu,
            iteration,
            coefficients,
            neighborhood,
            best_cost,
            improving: false,
            min_cost: f64::INFINITY,
            result: None,
        }
    }

    fn route(&self, slot: Slot) -> &'a Rc<Route> {
        &self.original.routes(slot.vehicle.kind)[slot.vehicle.index][slot.route]
    }

    fn slots_of(&self, vehicle: Vehicle) -> Vec<Slot> {
        (0..self.original.routes(vehicle.kind)[vehicle.index].len())
            .map(|route| Slot { vehicle, route })
            .collect()
    }

    /// Every route of the original solution, trucks first.
    fn slots(&self) -> Vec<Slot> {
        self.vehicles().into_iter().flat_map(|v| self.slots_of(v)).collect()
    }

    fn vehicles(&self) -> Vec<Vehicle> {
        VehicleKind::ALL
            .iter()
            .flat_map(|&kind| (0..self.problem.vehicles_count(kind)).map(move |index| Vehicle { kind, index }))
            .collect()
    }

    /// Propose replacing the customer sequences of `changes` and optionally appending a new route. Sequences
    /// without customers remove their route.
    fn propose(&mut self, changes: Vec<(Slot, Vec<usize>)>, appended: Option<(Vehicle, Vec<usize>)>, pair: (usize, usize)) {
        let routes = changes
            .into_iter()
            .map(|(slot, customers)| (slot, Route::new(self.problem, slot.vehicle.kind, customers)))
            .collect();
        let appended = appended.map(|(vehicle, customers)| (vehicle, Route::new(self.problem, vehicle.kind, customers)));

        self.propose_with(routes, appended, pair);
    }

    fn propose_with(&mut self, routes: Vec<(Slot, Rc<Route>)>, appended: Option<(Vehicle, Rc<Route>)>, pair: (usize, usize)) {
        if routes
            .iter()
            .map(|(_, route)| route)
            .chain(appended.iter().map(|(_, route)| route))
            .any(|route| !_dronable(self.problem, route.kind, &route.customers))
        {
            return;
        }

        let mut truck_routes = self.original.truck_routes.clone();
        let mut drone_routes = self.original.drone_routes.clone();

        let mut removed = vec![];
        for (slot, route) in routes {
            if route.is_empty() {
                removed.push(slot);
            } else {
                let vehicles = match slot.vehicle.kind {
                    VehicleKind::Truck => &mut truck_routes,
                    VehicleKind::Drone => &mut drone_routes,
                };
                vehicles[slot.vehicle.index][slot.route] = route;
            }
        }

        // Later indices first so that earlier slots stay valid
        removed.sort_by(|a, b| b.route.cmp(&a.route));
        for slot in removed {
            let vehicles = match slot.vehicle.kind {
                VehicleKind::Truck => &mut truck_routes,
                VehicleKind::Drone => &mut drone_routes,
            };
            vehicles[slot.vehicle.index].remove(slot.route);
        }

        if let Some((vehicle, route)) = appended
            && !route.is_empty()
        {
            let vehicles = match vehicle.kind {
                VehicleKind::Truck => &mut truck_routes,
                VehicleKind::Drone => &mut drone_routes,
            };
            vehicles[vehicle.index].push(route);
        }

        let solution = Solution::new(self.problem, truck_routes, drone_routes);
        let cost = solution.cost(self.coefficients);
        let aspiration = solution.feasible && cost < self.best_cost;
        let accepted = if self.improving {
            aspiration && !approximate(cost, self.best_cost)
        } else {
            aspiration || !self.tabu.is_tabu(pair, self.iteration)
        };

        if accepted && cost < self.min_cost {
            self.min_cost = cost;
            self.result = Some(Candidate {
                solution,
                cost,
                pair,
                neighborhood: self.neighborhood,
            });
        }
    }
}

impl Neighborhood {
    pub const ALL: [Self; 10] = [
        Self::TwoOpt,
        Self::Move10,
        Self::Move11,
        Self::Move20,
        Self::Move21,
        Self::Move22,
        Self::CrossExchange,
        Self::CrossExchange3,
        Self::EjectionChain,
        Self::EdgeRearrangement,
    ];

    /// Explore the neighbours of `solution` and return the cheapest accepted one.
    ///
    /// A neighbour whose move pair is tabu at `iteration` is only accepted when it is feasible and cheaper
    /// than `best_cost`.
    pub fn search(
        self,
        problem: &Problem,
        solution: &Solution,
        tabu: &TabuList,
        iteration: usize,
        coefficients: &PenaltyCoefficients,
        best_cost: f64,
    ) -> Option<Candidate> {
        let mut explorer = Explorer::new(problem, solution, tabu, iteration, coefficients, self, best_cost);
        self._explore(&mut explorer);
        explorer.result
    }

    /// The cheapest feasible neighbour of `solution` that is strictly cheaper than it, regardless of tabu
    /// status.
    pub fn improve(self, problem: &Problem, solution: &Solution, coefficients: &PenaltyCoefficients) -> Option<Candidate> {
        let tabu = TabuList::new(0);
        let mut explorer = Explorer::new(problem, solution, &tabu, 0, coefficients, self, solution.cost(coefficients));
        explorer.improving = true;
        self._explore(&mut explorer);
        explorer.result
    }

    fn _explore(self, explorer: &mut Explorer) {
        match self {
            Self::TwoOpt => two_opt::explore(explorer),
            Self::Move10 => move_xy::explore::<1, 0>(explorer),
            Self::Move11 => move_xy::explore::<1, 1>(explorer),
            Self::Move20 => move_xy::explore::<2, 0>(explorer),
            Self::Move21 => move_xy::explore::<2, 1>(explorer),
            Self::Move22 => move_xy::explore::<2, 2>(explorer),
            Self::CrossExchange => cross::explore(explorer),
            Self::CrossExchange3 => cross_3::explore(explorer),
            Self::EjectionChain => ejection_chain::explore(explorer),
            Self::EdgeRearrangement => rearrangement::explore(explorer),
        }
    }
}

#[cfg(test)]
pub mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::initial::initial_solution;
    use crate::problem::fixtures;

    /// At most one route per vehicle, an empty sequence leaves the vehicle idle.
    pub fn solution(problem: &Problem, trucks: &[Vec<usize>], drones: &[Vec<usize>]) -> Solution {
        let build = |kind: VehicleKind, vehicles: &[Vec<usize>]| {
            let mut result = vec![vec![]; problem.vehicles_count(kind)];
            for (i, customers) in vehicles.iter().enumerate() {
                if !customers.is_empty() {
                    result[i].push(Route::new(problem, kind, customers.clone()));
                }
            }
            result
        };

        Solution::new(problem, build(VehicleKind::Truck, trucks), build(VehicleKind::Drone, drones))
    }

    pub fn search(problem: &Problem, neighborhood: Neighborhood, original: &Solution, tabu: &TabuList) -> Option<Candidate> {
        let coefficients = PenaltyCoefficients::new(&problem.search.penalty);
        neighborhood.search(problem, original, tabu, 1, &coefficients, f64::INFINITY)
    }

    #[test]
    fn accepted_neighbours_stay_valid() {
        let problem = fixtures::mixed_fleet();
        let tabu = TabuList::new(problem.tabu_size);
        for seed in 0..3 {
            let mut rng = StdRng::seed_from_u64(seed);
            let original = initial_solution(&problem, &mut rng).unwrap();

            for neighborhood in Neighborhood::ALL {
                if let Some(candidate) = search(&problem, neighborhood, &original, &tabu) {
                    assert!(candidate.solution.verify(&problem).is_ok(), "{neighborhood}");
                    assert_eq!(candidate.neighborhood, neighborhood);
                    assert_eq!(
                        candidate.solution.feasible,
                        candidate.solution.violations().iter().all(|&v| v == 0.0)
                    );
                    for routes in candidate.solution.truck_routes.iter().chain(&candidate.solution.drone_routes) {
                        assert!(routes.iter().all(|r| !r.is_empty()));
                    }
                }
            }
        }
    }

    #[test]
    fn tabu_pairs_need_aspiration() {
        let problem = fixtures::single_truck();
        let original = solution(&problem, &[vec![0, 1, 3, 2, 4, 0]], &[]);
        let coefficients = PenaltyCoefficients::new(&problem.search.penalty);

        let free = TabuList::new(10);
        let best = Neighborhood::TwoOpt
            .search(&problem, &original, &free, 1, &coefficients, 0.0)
            .unwrap();

        // Forbid the best move: the explorer falls back to another one unless aspiration applies
        let mut tabu = TabuList::new(10);
        tabu.insert(best.pair, 1);
        let fallback = Neighborhood::TwoOpt
            .search(&problem, &original, &tabu, 1, &coefficients, 0.0)
            .unwrap();
        assert_ne!(fallback.pair, best.pair);
        assert!(fallback.cost >= best.cost);

        let aspired = Neighborhood::TwoOpt
            .search(&problem, &original, &tabu, 1, &coefficients, f64::INFINITY)
            .unwrap();
        assert_eq!(aspired.pair, best.pair);

        // Expired entries no longer forbid anything
        let expired = Neighborhood::TwoOpt
            .search(&problem, &original, &tabu, 11, &coefficients, 0.0)
            .unwrap();
        assert_eq!(expired.pair, best.pair);
    }

    #[test]
    fn three_route_moves_start_from_any_route() {
        let problem = fixtures::mixed_fleet();
        let original = solution(
            &problem,
            &[vec![0, 2, 5, 0], vec![0, 7, 3, 0]],
            &[vec![0, 1, 4, 0], vec![0, 6, 8, 0]],
        );
        let coefficients = PenaltyCoefficients::new(&problem.search.penalty);

        // Every vehicle has a single route; find the one of the vehicle that returns last
        let longest = original
            .truck_routes
            .iter()
            .chain(&original.drone_routes)
            .zip(original.truck_working_time.iter().chain(&original.drone_working_time))
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(routes, _)| routes[0].customers.clone())
            .unwrap();

        // Forbid every pair touching the depot or that route
        let mut tabu = TabuList::new(10);
        for a in 0..=problem.customers_count {
            for &b in &longest {
                if a != b {
                    tabu.insert((a, b), 1);
                }
            }
        }

        for neighborhood in [
            Neighborhood::CrossExchange3,
            Neighborhood::EjectionChain,
            Neighborhood::EdgeRearrangement,
        ] {
            let candidate = neighborhood
                .search(&problem, &original, &tabu, 1, &coefficients, 0.0)
                .unwrap_or_else(|| panic!("{neighborhood} found nothing"));

            assert!(candidate.solution.verify(&problem).is_ok());
            assert!(!longest.contains(&candidate.pair.0) && !longest.contains(&candidate.pair.1));
        }
    }
}
