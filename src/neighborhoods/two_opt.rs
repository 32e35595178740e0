use super::Explorer;

/// Segment reversal within every route, and tail exchange between every pair of routes.
pub fn explore(explorer: &mut Explorer) {
    let slots = explorer.slots();

    for &slot in &slots {
        let route = explorer.route(slot);
        let customers = &route.customers;
        for i in 1..customers.len() - 2 {
            for j in i + 1..customers.len() - 1 {
                let reversed = route.reverse(explorer.problem, i, j);
                explorer.propose_with(vec![(slot, reversed)], None, (customers[i], customers[j]));
            }
        }
    }

    for (index, &si) in slots.iter().enumerate() {
        for &sj in &slots[index + 1..] {
            let ri = &explorer.route(si).customers;
            let rj = &explorer.route(sj).customers;

            for i in 1..ri.len() {
                for j in 1..rj.len() {
                    // Exchanging the closing depots only
                    if i == ri.len() - 1 && j == rj.len() - 1 {
                        continue;
                    }

                    let mut new_i = ri[..i].to_vec();
                    new_i.extend_from_slice(&rj[j..]);
                    let mut new_j = rj[..j].to_vec();
                    new_j.extend_from_slice(&ri[i..]);

                    explorer.propose(vec![(si, new_i), (sj, new_j)], None, (ri[i - 1], rj[j]));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::initial::tests::permutations;
    use crate::neighborhoods::Neighborhood;
    use crate::neighborhoods::tests::{search, solution};
    use crate::problem::fixtures;
    use crate::tabu::TabuList;

    #[test]
    fn uncrosses_a_route() {
        let problem = fixtures::single_truck();

        // (10, 0) -> (0, 10) -> (10, 10) -> (-5, 5) crosses itself
        let original = solution(&problem, &[vec![0, 1, 3, 2, 4, 0]], &[]);
        let candidate = search(&problem, Neighborhood::TwoOpt, &original, &TabuList::new(1)).unwrap();

        assert!(candidate.solution.working_time < original.working_time);
        assert_eq!(candidate.solution.truck_routes[0].len(), 1);
    }

    #[test]
    fn descent_reaches_the_shortest_cycle() {
        let problem = fixtures::single_truck();
        let tabu = TabuList::new(0);

        let mut current = solution(&problem, &[vec![0, 3, 1, 4, 2, 0]], &[]);
        let start = current.working_time;
        while let Some(candidate) = search(&problem, Neighborhood::TwoOpt, &current, &tabu) {
            if candidate.solution.working_time >= current.working_time {
                break;
            }

            current = candidate.solution;
        }

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

        assert!(current.working_time < start);
        assert_eq!(current.truck_routes[0].len(), 1);
        assert!((current.truck_routes[0][0].distance - shortest).abs() < 1e-9);
    }

    #[test]
    fn tail_exchange_respects_dronability() {
        let problem = fixtures::mixed_fleet();

        // Customers 2, 5 and 7 cannot fly: no tail holding one of them may move onto the drone
        let original = solution(
            &problem,
            &[vec![0, 2, 5, 0], vec![0, 7, 3, 0]],
            &[vec![0, 1, 4, 0], vec![0, 6, 8, 0]],
        );
        let candidate = search(&problem, Neighborhood::TwoOpt, &original, &TabuList::new(1)).unwrap();

        assert!(candidate.solution.verify(&problem).is_ok());
    }
}
