use super::Explorer;

/// `customers` with the block of `x` customers at `i` and the block of `y` customers at `j` swapped,
/// where the first block ends before the second one starts.
fn _swap_blocks(customers: &[usize], i: usize, x: usize, j: usize, y: usize) -> Vec<usize> {
    let mut result = Vec::with_capacity(customers.len());
    result.extend_from_slice(&customers[..i]);
    result.extend_from_slice(&customers[j..j + y]);
    result.extend_from_slice(&customers[i + x..j]);
    result.extend_from_slice(&customers[i..i + x]);
    result.extend_from_slice(&customers[j + y..]);
    result
}

/// Relocate a block of `X` consecutive customers, swapping it with a block of `Y` customers at the
/// destination. `Move (1, 0)` may also open a new single-customer route on any vehicle.
pub fn explore<const X: usize, const Y: usize>(explorer: &mut Explorer) {
    let slots = explorer.slots();

    // Within a route, both block orders
    let orders = if X == Y { vec![(X, Y)] } else { vec![(X, Y), (Y, X)] };
    for &slot in &slots {
        let customers = &explorer.route(slot).customers;
        let last = customers.len() - 1;
        for &(x, y) in &orders {
            for i in 1..last {
                for j in i + x..=last {
                    if j + y > last || (x == 0 && j == i) {
                        continue;
                    }

                    let swapped = _swap_blocks(customers, i, x, j, y);
                    if &swapped == customers {
                        continue;
                    }

                    explorer.propose(vec![(slot, swapped)], None, (customers[i], customers[j]));
                }
            }
        }
    }

    // Between routes, ordered pairs unless the move is symmetric
    for (index, &si) in slots.iter().enumerate() {
        for (other, &sj) in slots.iter().enumerate() {
            if index == other || (X == Y && other < index) {
                continue;
            }

            let ri = &explorer.route(si).customers;
            let rj = &explorer.route(sj).customers;
            for i in 1..ri.len() - X {
                for j in 1..rj.len() - Y {
                    let mut new_i = ri[..i].to_vec();
                    new_i.extend_from_slice(&rj[j..j + Y]);
                    new_i.extend_from_slice(&ri[i + X..]);

                    let mut new_j = rj[..j].to_vec();
                    new_j.extend_from_slice(&ri[i..i + X]);
                    new_j.extend_from_slice(&rj[j + Y..]);

                    explorer.propose(vec![(si, new_i), (sj, new_j)], None, (ri[i], rj[j]));
                }
            }
        }
    }

    if X == 1 && Y == 0 {
        let vehicles = explorer.vehicles();
        for &si in &slots {
            let ri = &explorer.route(si).customers;
            for i in 1..ri.len() - 1 {
                let mut new_i = ri.clone();
                let customer = new_i.remove(i);

                for &vehicle in &vehicles {
                    // Moving a lone customer to a new route of the same vehicle changes nothing
                    if ri.len() == 3 && vehicle == si.vehicle {
                        continue;
                    }

                    explorer.propose(vec![(si, new_i.clone())], Some((vehicle, vec![0, customer, 0])), (customer, 0));
                }
            }
        }
    }
}
