use super::Explorer;
use crate::routes::VehicleKind;

/// Move a customer `x` from route `i` into route `j`, ejecting another customer `e` of route `j`, then insert
/// `e` into a third route `k` or onto a new drone route. `x` is inserted at any position of route `j`, not
/// necessarily where `e` was.
pub fn explore(explorer: &mut Explorer) {
    let slots = explorer.slots();
    let drones = explorer
        .vehicles()
        .into_iter()
        .filter(|v| v.kind == VehicleKind::Drone)
        .collect::<Vec<_>>();

    for &si in &slots {
        let ri = &explorer.route(si).customers;
        for pi in 1..ri.len() - 1 {
            let x = ri[pi];
            let mut new_i = ri.clone();
            new_i.remove(pi);

            for &sj in &slots {
                if sj == si {
                    continue;
                }

                let rj = &explorer.route(sj).customers;

                // `insert_at` indexes route j before the insertion, `eject_at` after it
                for insert_at in 1..rj.len() {
                    for eject_at in 1..rj.len() {
                        if insert_at == eject_at {
                            continue;
                        }

                        let mut new_j = rj.clone();
                        new_j.insert(insert_at, x);
                        let e = new_j.remove(eject_at);

                        for &sk in &slots {
                            if sk == si || sk == sj {
                                continue;
                            }

                            let rk = &explorer.route(sk).customers;
                            for pk in 1..rk.len() {
                                let mut new_k = rk.clone();
                                new_k.insert(pk, e);

                                explorer.propose(
                                    vec![(si, new_i.clone()), (sj, new_j.clone()), (sk, new_k)],
                                    None,
                                    (x, e),
                                );
                            }
                        }

                        for &vehicle in &drones {
                            explorer.propose(
                                vec![(si, new_i.clone()), (sj, new_j.clone())],
                                Some((vehicle, vec![0, e, 0])),
                                (x, e),
                            );
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::DroneConfig;
    use crate::neighborhoods::Neighborhood;
    use crate::neighborhoods::tests::{search, solution};
    use crate::problem::fixtures;
    use crate::routes::{Route, VehicleKind};
    use crate::solutions::{PenaltyCoefficients, Solution};
    use crate::tabu::TabuList;

    #[test]
    fn chain_moves_two_customers() {
        let problem = fixtures::mixed_fleet();
        let original = solution(
            &problem,
            &[vec![0, 2, 3, 5, 0], vec![0, 7, 6, 0]],
            &[vec![0, 1, 4, 0], vec![0, 8, 0]],
        );

        let candidate = search(&problem, Neighborhood::EjectionChain, &original, &TabuList::new(1)).unwrap();
        assert!(candidate.solution.verify(&problem).is_ok());
        assert_ne!(candidate.solution.signature(), original.signature());
        assert_ne!(candidate.pair.0, candidate.pair.1);
    }

    #[test]
    fn insertion_need_not_replace_the_ejected_customer() {
        // A single truck making three trips: the cost is the total distance
        let problem = fixtures::build(
            &[
                (20.0, 5.0, 1.0, false),
                (10.0, 0.0, 1.0, false),
                (0.0, 10.0, 1.0, false),
                (-30.0, -30.0, 1.0, false),
                (-30.0, -31.0, 1.0, false),
            ],
            1,
            0,
            fixtures::truck(100.0),
            DroneConfig::unlimited(),
            1e6,
        );
        let trips = [vec![0, 1, 0], vec![0, 4, 2, 3, 0], vec![0, 5, 0]]
            .map(|customers| Route::new(&problem, VehicleKind::Truck, customers))
            .to_vec();
        let original = Solution::new(&problem, vec![trips], vec![]);

        // Only chains that swap customers 1 and 4 are allowed
        let mut tabu = TabuList::new(10);
        for a in 0..=5 {
            for b in a + 1..=5 {
                if (a, b) != (1, 4) {
                    tabu.insert((a, b), 1);
                }
            }
        }

        let coefficients = PenaltyCoefficients::new(&problem.search.penalty);
        let candidate = Neighborhood::EjectionChain
            .search(&problem, &original, &tabu, 1, &coefficients, 0.0)
            .unwrap();

        // 4 joins 5, and 1 goes between 2 and 3 rather than where 4 was
        let trips = candidate.solution.truck_routes[0]
            .iter()
            .map(|r| r.customers.clone())
            .collect::<Vec<_>>();
        assert_eq!(trips.len(), 2);
        assert!(trips.contains(&vec![0, 2, 1, 3, 0]));
        assert!(candidate.solution.working_time < original.working_time);
    }
}
