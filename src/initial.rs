use std::rc::Rc;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::bitset::BitSet;
use crate::clusterize;
use crate::errors::{InvalidArgument, InvalidInstance};
use crate::problem::Problem;
use crate::routes::{Route, Vehicle, VehicleKind};
use crate::solutions::{PenaltyCoefficients, Solution};
use crate::tsp;
use crate::utils::{TOLERANCE, weighted_random};

/// Append `customer` to the first route of `vehicles` that stays within every limit.
fn _append_first_fit(problem: &Problem, vehicles: &mut [Vec<Rc<Route>>], kind: VehicleKind, customer: usize) -> bool {
    if !kind.servable(problem, customer) {
        return false;
    }

    for routes in vehicles {
        for route in routes.iter_mut() {
            let candidate = route.push(problem, customer);
            if candidate.within_limits() {
                *route = candidate;
                return true;
            }
        }
    }

    false
}

/// Reorder the customers of `route` by solving the TSP over its nodes. The new order is kept only when it is
/// strictly shorter and does not add any violation.
pub fn sequence(problem: &Problem, route: &Rc<Route>) -> Result<Rc<Route>, InvalidInstance> {
    // A cycle through the depot and at most 2 customers has a single length
    if route.len() <= 2 {
        return Ok(route.clone());
    }

    let nodes = &route.customers[..route.customers.len() - 1];
    let distances = problem.distances(route.kind);
    let distance = |i: usize, j: usize| distances[nodes[i]][nodes[j]];

    let (_, path) = if nodes.len() <= problem.search.held_karp_limit {
        tsp::held_karp(nodes.len(), distance)?
    } else {
        tsp::two_opt(nodes.len(), distance)?
    };

    let mut customers = path.into_iter().map(|i| nodes[i]).collect::<Vec<_>>();
    customers.push(0);

    let candidate = Route::new(problem, route.kind, customers);
    if candidate.distance + TOLERANCE < route.distance
        && candidate.energy_violation <= route.energy_violation
        && candidate.waiting_time_violation() <= route.waiting_time_violation()
        && candidate.fixed_time_violation <= route.fixed_time_violation
        && candidate.fixed_distance_violation <= route.fixed_distance_violation
    {
        Ok(candidate)
    } else {
        Ok(route.clone())
    }
}

/// Append `customer` to the last route of `routes` when that stays within every limit, or open a new route.
fn _append_or_open(problem: &Problem, routes: &mut Vec<Rc<Route>>, kind: VehicleKind, customer: usize) {
    match routes.last_mut() {
        Some(last) => {
            let candidate = last.push(problem, customer);
            if candidate.within_limits() {
                *last = candidate;
            } else {
                routes.push(Route::single(problem, kind, customer));
            }
        }
        None => routes.push(Route::single(problem, kind, customer)),
    }
}

fn _sequenced(
    problem: &Problem,
    mut truck_routes: Vec<Vec<Rc<Route>>>,
    mut drone_routes: Vec<Vec<Rc<Route>>>,
) -> Result<Solution, InvalidInstance> {
    for routes in truck_routes.iter_mut().chain(drone_routes.iter_mut()) {
        for route in routes.iter_mut() {
            *route = sequence(problem, route)?;
        }
    }

    Ok(Solution::new(problem, truck_routes, drone_routes))
}

/// Build a starting solution in three phases:
/// 1. seed every drone, then every truck, with the closest unassigned customer it can serve,
/// 2. append the remaining customers (dronable ones first) to the first route that stays within limits,
/// 3. distribute whatever is left round-robin, opening new routes when appending breaks a limit.
///
/// Every route is then re-sequenced with an exact or heuristic TSP solver.
fn _nearest_first(problem: &Problem, rng: &mut impl Rng) -> Result<Solution, InvalidInstance> {
    let mut truck_routes = vec![vec![]; problem.trucks_count];
    let mut drone_routes = vec![vec![]; problem.drones_count];
    let mut assigned = BitSet::new(problem.customers_count + 1);

    // Phase 1
    for kind in [VehicleKind::Drone, VehicleKind::Truck] {
        let distances = problem.distances(kind);
        let mut order = (1..=problem.customers_count)
            .filter(|&c| kind.servable(problem, c))
            .collect::<Vec<_>>();
        order.sort_by(|&a, &b| distances[0][a].total_cmp(&distances[0][b]));

        let mut order = order.into_iter();
        let vehicles = match kind {
            VehicleKind::Truck => &mut truck_routes,
            VehicleKind::Drone => &mut drone_routes,
        };

        for routes in vehicles.iter_mut() {
            if let Some(customer) = order.by_ref().find(|&c| !assigned.get(c)) {
                routes.push(Route::single(problem, kind, customer));
                assigned.set(customer);
            }
        }
    }

    // Phase 2
    let mut pending = (1..=problem.customers_count)
        .filter(|&c| !assigned.get(c))
        .collect::<Vec<_>>();
    pending.sort_by(|&a, &b| {
        problem.customers[b]
            .dronable
            .cmp(&problem.customers[a].dronable)
            .then(problem.truck_distances[0][a].total_cmp(&problem.truck_distances[0][b]))
    });

    let mut leftover = vec![];
    for customer in pending {
        if !_append_first_fit(problem, &mut drone_routes, VehicleKind::Drone, customer)
            && !_append_first_fit(problem, &mut truck_routes, VehicleKind::Truck, customer)
        {
            leftover.push(customer);
        }
    }

    // Phase 3
    leftover.shuffle(rng);

    let vehicles = VehicleKind::ALL
        .iter()
        .flat_map(|&kind| (0..problem.vehicles_count(kind)).map(move |index| Vehicle { kind, index }))
        .collect::<Vec<_>>();

    let mut cursor = 0;
    for customer in leftover {
        let vehicle = (0..vehicles.len())
            .map(|offset| (cursor + offset) % vehicles.len())
            .find(|&i| vehicles[i].kind.servable(problem, customer))
            .ok_or(InvalidInstance::UnservableCustomer(customer))?;
        cursor = vehicle + 1;

        let Vehicle { kind, index } = vehicles[vehicle];
        let routes = match kind {
            VehicleKind::Truck => &mut truck_routes[index],
            VehicleKind::Drone => &mut drone_routes[index],
        };
        _append_or_open(problem, routes, kind, customer);
    }

    _sequenced(problem, truck_routes, drone_routes)
}

/// Sweep the customers by polar angle around the depot, from a random starting direction. The first ones
/// each open a route of their own, on a free drone when they can fly and on a free truck otherwise. The rest
/// are dealt in random order to the vehicles of the kind that serves them, alternating between vehicles.
fn _angle_sweep(problem: &Problem, rng: &mut impl Rng) -> Result<Solution, InvalidInstance> {
    let mut customers = (1..=problem.customers_count).collect::<Vec<_>>();
    clusterize::sweep_order(problem, &mut customers);
    if !customers.is_empty() {
        let offset = rng.random_range(0..customers.len());
        customers.rotate_left(offset);
    }

    let mut truck_routes = vec![vec![]; problem.trucks_count];
    let mut drone_routes = vec![vec![]; problem.drones_count];
    let (mut trucks, mut drones) = (truck_routes.iter_mut(), drone_routes.iter_mut());

    let mut pending = vec![];
    for customer in customers {
        let dronable = VehicleKind::Drone.servable(problem, customer);
        if dronable && let Some(routes) = drones.next() {
            routes.push(Route::single(problem, VehicleKind::Drone, customer));
        } else if let Some(routes) = trucks.next() {
            routes.push(Route::single(problem, VehicleKind::Truck, customer));
        } else {
            pending.push(customer);
        }
    }

    pending.shuffle(rng);
    let (mut truck, mut drone) = (0, 0);
    for customer in pending {
        if problem.drones_count > 0 && VehicleKind::Drone.servable(problem, customer) {
            _append_or_open(problem, &mut drone_routes[drone % problem.drones_count], VehicleKind::Drone, customer);
            drone += 1;
        } else if problem.trucks_count > 0 {
            _append_or_open(problem, &mut truck_routes[truck % problem.trucks_count], VehicleKind::Truck, customer);
            truck += 1;
        } else {
            return Err(InvalidInstance::UnservableCustomer(customer));
        }
    }

    _sequenced(problem, truck_routes, drone_routes)
}

/// One truck route per k-means cluster of the customers, drones left idle. `None` without trucks.
fn _clustered(problem: &Problem) -> Result<Option<Solution>, InvalidInstance> {
    if problem.trucks_count == 0 {
        return Ok(None);
    }

    let customers = (1..=problem.customers_count).collect::<Vec<_>>();
    let mut truck_routes = vec![vec![]; problem.trucks_count];
    for (routes, cluster) in truck_routes
        .iter_mut()
        .zip(clusterize::clusterize(problem, &customers, problem.trucks_count))
    {
        if !cluster.is_empty() {
            let mut nodes = vec![0];
            nodes.extend(cluster);
            nodes.push(0);
            routes.push(Route::new(problem, VehicleKind::Truck, nodes));
        }
    }

    _sequenced(problem, truck_routes, vec![vec![]; problem.drones_count]).map(Some)
}

/// Build every constructive starting solution and keep the cheapest one under the initial penalty
/// coefficients. Ties go to the nearest-first construction.
pub fn initial_solution(problem: &Problem, rng: &mut impl Rng) -> Result<Solution, InvalidInstance> {
    let coefficients = PenaltyCoefficients::new(&problem.search.penalty);

    let mut result = _nearest_first(problem, rng)?;
    let mut result_cost = result.cost(&coefficients);
    for candidate in [Some(_angle_sweep(problem, rng)?), _clustered(problem)?]
        .into_iter()
        .flatten()
    {
        let cost = candidate.cost(&coefficients);
        if cost < result_cost {
            result = candidate;
            result_cost = cost;
        }
    }

    Ok(result)
}

/// Remove a fraction of the customers, favouring those whose removal saves the longest detour, and reinsert
/// each one at its cheapest position with every penalty coefficient at its maximum.
pub fn destroy_and_repair(problem: &Problem, solution: &Solution, rng: &mut impl Rng) -> Result<Solution, InvalidArgument> {
    let mut truck_routes = solution.truck_routes.clone();
    let mut drone_routes = solution.drone_routes.clone();

    let count = ((problem.customers_count as f64 * problem.search.destroy_rate) as usize).min(problem.customers_count);
    if count == 0 {
        return Ok(Solution::new(problem, truck_routes, drone_routes));
    }

    // weights[c - 1]: detour saved by removing customer c
    let mut weights = vec![0.0; problem.customers_count];
    for kind in VehicleKind::ALL {
        let distances = problem.distances(kind);
        for routes in solution.routes(kind) {
            for route in routes {
                for w in route.customers.windows(3) {
                    let (prev, c, next) = (w[0], w[1], w[2]);
                    let saving = distances[prev][c] + distances[c][next] - distances[prev][next];
                    weights[c - 1] = saving.max(0.0);
                }
            }
        }
    }

    let mut destroyed = BitSet::new(problem.customers_count + 1);
    for i in weighted_random(rng, &weights, count)? {
        destroyed.set(i + 1);
    }

    for routes in truck_routes.iter_mut().chain(drone_routes.iter_mut()) {
        let mut i = 0;
        while i < routes.len() {
            let buffer = routes[i]
                .customers
                .iter()
                .copied()
                .filter(|&c| !destroyed.get(c))
                .collect::<Vec<_>>();

            if buffer.len() == routes[i].customers.len() {
                i += 1;
            } else if buffer.len() > 2 {
                routes[i] = Route::new(problem, routes[i].kind, buffer);
                i += 1;
            } else {
                routes.remove(i);
            }
        }
    }

    let mut reinsert = destroyed.iter_ones().collect::<Vec<_>>();
    reinsert.shuffle(rng);

    let coefficients = PenaltyCoefficients::saturated(&problem.search.penalty);
    for customer in reinsert {
        // (cost, vehicle, route index and position; `None` opens a new route)
        let mut best: Option<(f64, Vehicle, Option<(usize, usize)>)> = None;

        for kind in VehicleKind::ALL {
            if !kind.servable(problem, customer) {
                continue;
            }

            for index in 0..problem.vehicles_count(kind) {
                let vehicle = Vehicle { kind, index };
                let mut evaluate = |placement: Option<(usize, usize)>| {
                    let candidate = _place(problem, &truck_routes, &drone_routes, vehicle, placement, customer);
                    let cost = candidate.cost(&coefficients);
                    if best.as_ref().is_none_or(|&(best_cost, ..)| cost < best_cost) {
                        best = Some((cost, vehicle, placement));
                    }
                };

                let routes = match kind {
                    VehicleKind::Truck => &truck_routes[index],
                    VehicleKind::Drone => &drone_routes[index],
                };

                for (r, route) in routes.iter().enumerate() {
                    for position in 1..route.customers.len() {
                        evaluate(Some((r, position)));
                    }
                }

                evaluate(None);
            }
        }

        if let Some((_, vehicle, placement)) = best {
            let routes = match vehicle.kind {
                VehicleKind::Truck => &mut truck_routes[vehicle.index],
                VehicleKind::Drone => &mut drone_routes[vehicle.index],
            };
            _insert(problem, routes, vehicle.kind, placement, customer);
        }
    }

    Ok(Solution::new(problem, truck_routes, drone_routes))
}

fn _insert(
    problem: &Problem,
    routes: &mut Vec<Rc<Route>>,
    kind: VehicleKind,
    placement: Option<(usize, usize)>,
    customer: usize,
) {
    match placement {
        Some((r, position)) => {
            let mut buffer = routes[r].customers.clone();
            buffer.insert(position, customer);
            routes[r] = Route::new(problem, kind, buffer);
        }
        None => routes.push(Route::single(problem, kind, customer)),
    }
}

fn _place(
    problem: &Problem,
    truck_routes: &[Vec<Rc<Route>>],
    drone_routes: &[Vec<Rc<Route>>],
    vehicle: Vehicle,
    placement: Option<(usize, usize)>,
    customer: usize,
) -> Solution {
    let mut truck_routes = truck_routes.to_vec();
    let mut drone_routes = drone_routes.to_vec();
    let routes = match vehicle.kind {
        VehicleKind::Truck => &mut truck_routes[vehicle.index],
        VehicleKind::Drone => &mut drone_routes[vehicle.index],
    };
    _insert(problem, routes, vehicle.kind, placement, customer);

    Solution::new(problem, truck_routes, drone_routes)
}

#[cfg(test)]
pub mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::problem::fixtures;

    pub fn permutations(items: &[usize]) -> Vec<Vec<usize>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }

        let mut result = vec![];
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let head = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, head);
                result.push(tail);
            }
        }

        result
    }

    #[test]
    fn single_truck_gets_one_shortest_route() {
        let problem = fixtures::single_truck();
        let mut rng = StdRng::seed_from_u64(42);
        let solution = initial_solution(&problem, &mut rng).unwrap();

        assert!(solution.verify(&problem).is_ok());
        assert_eq!(solution.truck_routes.len(), 1);
        assert_eq!(solution.truck_routes[0].len(), 1);

        let route = &solution.truck_routes[0][0];
        assert_eq!(route.len(), 4);
        assert_eq!(route.capacity_violation, 0.0);
        assert!(solution.feasible);

        let distances = &problem.truck_distances;
        let shortest = permutations(&[1, 2, 3, 4])
            .into_iter()
            .map(|p| {
                let mut path = vec![0];
                path.extend(p);
                path.push(0);
                path.windows(2).map(|w| distances[w[0]][w[1]]).sum::<f64>()
            })
            .fold(f64::INFINITY, f64::min);

        assert!((route.distance - shortest).abs() < 1e-9);
    }

    #[test]
    fn drones_only_carry_dronable_customers() {
        let problem = fixtures::mixed_fleet();
        for seed in 0..10 {
            let mut rng = StdRng::seed_from_u64(seed);
            let solution = initial_solution(&problem, &mut rng).unwrap();
            assert!(solution.verify(&problem).is_ok());

            for routes in &solution.drone_routes {
                for route in routes {
                    assert!(route.customers.iter().all(|&c| problem.customers[c].dronable));
                }
            }
        }
    }

    #[test]
    fn every_construction_serves_everyone() {
        let problem = fixtures::mixed_fleet();
        for seed in 0..5 {
            let mut rng = StdRng::seed_from_u64(seed);
            let nearest = _nearest_first(&problem, &mut rng).unwrap();
            let sweep = _angle_sweep(&problem, &mut rng).unwrap();
            let clustered = _clustered(&problem).unwrap().unwrap();

            for solution in [&nearest, &sweep, &clustered] {
                assert!(solution.verify(&problem).is_ok());
                for route in solution.drone_routes.iter().flatten() {
                    assert!(route.customers.iter().all(|&c| VehicleKind::Drone.servable(&problem, c)));
                }
            }

            // One trip per truck, and the sweep hands a first trip to every vehicle
            assert!(clustered.drone_routes.iter().all(Vec::is_empty));
            assert!(clustered.truck_routes.iter().all(|routes| routes.len() <= 1));
            assert!(sweep.truck_routes.iter().chain(&sweep.drone_routes).all(|routes| !routes.is_empty()));
        }
    }

    #[test]
    fn cheapest_construction_is_kept() {
        let problem = fixtures::mixed_fleet();
        let coefficients = PenaltyCoefficients::new(&problem.search.penalty);
        for seed in 0..5 {
            let result = initial_solution(&problem, &mut StdRng::seed_from_u64(seed)).unwrap();

            // Same random stream, same constructions
            let mut rng = StdRng::seed_from_u64(seed);
            let costs = [
                _nearest_first(&problem, &mut rng).unwrap(),
                _angle_sweep(&problem, &mut rng).unwrap(),
                _clustered(&problem).unwrap().unwrap(),
            ]
            .map(|s| s.cost(&coefficients));

            assert_eq!(result.cost(&coefficients), costs.into_iter().fold(f64::INFINITY, f64::min));
        }
    }

    #[test]
    fn clusters_need_trucks() {
        let mut problem = fixtures::mixed_fleet();
        problem.trucks_count = 0;
        assert!(_clustered(&problem).unwrap().is_none());
    }

    #[test]
    fn sequencing_never_lengthens_a_route() {
        let problem = fixtures::mixed_fleet();
        let route = Route::new(&problem, VehicleKind::Truck, vec![0, 5, 1, 7, 3, 0]);
        let sequenced = sequence(&problem, &route).unwrap();

        assert!(sequenced.distance <= route.distance);
        let mut customers = sequenced.customers.clone();
        customers.sort_unstable();
        assert_eq!(customers, vec![0, 0, 1, 3, 5, 7]);
    }

    #[test]
    fn destroy_and_repair_keeps_every_customer() {
        let mut problem = fixtures::mixed_fleet();
        problem.search.destroy_rate = 0.5;

        let mut rng = StdRng::seed_from_u64(7);
        let mut solution = initial_solution(&problem, &mut rng).unwrap();
        for _ in 0..5 {
            solution = destroy_and_repair(&problem, &solution, &mut rng).unwrap();
            assert!(solution.verify(&problem).is_ok());
        }
    }

    #[test]
    fn zero_destroy_rate_is_identity() {
        let mut problem = fixtures::mixed_fleet();
        problem.search.destroy_rate = 0.0;

        let mut rng = StdRng::seed_from_u64(3);
        let solution = initial_solution(&problem, &mut rng).unwrap();
        let repaired = destroy_and_repair(&problem, &solution, &mut rng).unwrap();
        assert_eq!(repaired.signature(), solution.signature());
    }
}
