use super::Explorer;

/// Reconnect three routes by rotating their tails: route `i` continues with the tail of route `k`, route `j`
/// with the tail of route `i` and route `k` with the tail of route `j`.
pub fn explore(explorer: &mut Explorer) {
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

                for a in 1..ri.len() {
                    for b in 1..rj.len() {
                        for c in 1..rk.len() {
                            // Rotating the closing depots only
                            if a == ri.len() - 1 && b == rj.len() - 1 && c == rk.len() - 1 {
                                continue;
                            }

                            let mut new_i = ri[..a].to_vec();
                            new_i.extend_from_slice(&rk[c..]);
                            let mut new_j = rj[..b].to_vec();
                            new_j.extend_from_slice(&ri[a..]);
                            let mut new_k = rk[..c].to_vec();
                            new_k.extend_from_slice(&rj[b..]);

                            explorer.propose(vec![(si, new_i), (sj, new_j), (sk, new_k)], None, (ri[a - 1], rk[c]));
                        }
                    }
                }
            }
        }
    }
}
