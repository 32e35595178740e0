use super::Explorer;

/// Rotate three non-empty segments across three routes: route `i` receives the segment of route `k`, route
/// `j` the segment of route `i` and route `k` the segment of route `j`.
pub fn explore(explorer: &mut Explorer) {
    let limit = explorer.problem.search.segment_limit;
    let slots = explorer.slots();

    for &si in &slots {
        for &sj in &slots {
            for &sk in &slots {
                if sj == si || sk == si || sj == sk {
                    continue;
                }

                let ri = &explorer.route(si).customers;
                let rj = &explorer.route(sj).customers;
                let rk = &explorer.route(sk).customers;

                for li in 1..=limit.min(ri.len() - 2) {
                    for lj in 1..=limit.min(rj.len() - 2) {
                        for lk in 1..=limit.min(rk.len() - 2) {
                            for a in 1..ri.len() - li {
                                for b in 1..rj.len() - lj {
                                    for c in 1..rk.len() - lk {
                                        let mut new_i = ri[..a].to_vec();
                                        new_i.extend_from_slice(&rk[c..c + lk]);
                                        new_i.extend_from_slice(&ri[a + li..]);

                                        let mut new_j = rj[..b].to_vec();
                                        new_j.extend_from_slice(&ri[a..a + li]);
                                        new_j.extend_from_slice(&rj[b + lj..]);

                                        let mut new_k = rk[..c].to_vec();
                                        new_k.extend_from_slice(&rj[b..b + lj]);
                                        new_k.extend_from_slice(&rk[c + lk..]);

                                        explorer.propose(
                                            vec![(si, new_i), (sj, new_j), (sk, new_k)],
                                            None,
                                            (ri[a], rk[c]),
                                        );
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::neighborhoods::Neighborhood;
    use crate::neighborhoods::tests::{search, solution};
    use crate::problem::fixtures;
    use crate::tabu::TabuList;

    #[test]
    fn rotation_keeps_every_customer() {
        let problem = fixtures::mixed_fleet();
        let original = solution(
            &problem,
            &[vec![0, 2, 3, 5, 0], vec![0, 7, 6, 0]],
            &[vec![0, 1, 4, 0], vec![0, 8, 0]],
        );

        let candidate = search(&problem, Neighborhood::CrossExchange3, &original, &TabuList::new(1)).unwrap();
        assert!(candidate.solution.verify(&problem).is_ok());

        // Every route of the longest vehicle gives and receives exactly one segment
        let served = candidate
            .solution
            .truck_routes
            .iter()
            .chain(&candidate.solution.drone_routes)
            .flatten()
            .map(|r| r.len())
            .sum::<usize>();
        assert_eq!(served, 8);
    }

    #[test]
    fn needs_three_routes() {
        let problem = fixtures::mixed_fleet();
        let original = solution(&problem, &[vec![0, 2, 3, 5, 1, 0], vec![0, 7, 6, 4, 8, 0]], &[]);

        assert!(search(&problem, Neighborhood::CrossExchange3, &original, &TabuList::new(1)).is_none());
    }
}
