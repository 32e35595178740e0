use super::Explorer;

/// Exchange two segments of at most `segment_limit` customers between two routes. One of the segments may be
/// empty, which turns the exchange into a relocation.
pub fn explore(explorer: &mut Explorer) {
    let limit = explorer.problem.search.segment_limit;
    let slots = explorer.slots();

    for (index, &si) in slots.iter().enumerate() {
        for &sj in &slots[index + 1..] {
            let ri = &explorer.route(si).customers;
            let rj = &explorer.route(sj).customers;

            for li in 0..=limit.min(ri.len() - 2) {
                for lj in 0..=limit.min(rj.len() - 2) {
                    if li == 0 && lj == 0 {
                        continue;
                    }

                    for a in 1..ri.len() - li {
                        for b in 1..rj.len() - lj {
                            let mut new_i = ri[..a].to_vec();
                            new_i.extend_from_slice(&rj[b..b + lj]);
                            new_i.extend_from_slice(&ri[a + li..]);

                            let mut new_j = rj[..b].to_vec();
                            new_j.extend_from_slice(&ri[a..a + li]);
                            new_j.extend_from_slice(&rj[b + lj..]);

                            explorer.propose(vec![(si, new_i), (sj, new_j)], None, (ri[a], rj[b]));
                        }
                    }
                }
            }
        }
    }
}
