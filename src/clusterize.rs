use std::f64::consts;

use crate::problem::Problem;

/// Upper bound on the Lloyd iterations of [`clusterize`].
const KMEANS_ITERATIONS: usize = 100;

/// Polar angle of `customer` around the depot, in `[0, 2π)`.
fn _angle(problem: &Problem, customer: usize) -> f64 {
    let depot = &problem.customers[0];
    let c = &problem.customers[customer];
    let angle = (c.y - depot.y).atan2(c.x - depot.x);
    if angle < 0.0 { angle + 2.0 * consts::PI } else { angle }
}

/// Sort `customers` by polar angle around the depot, starting right after the widest angular gap.
pub fn sweep_order(problem: &Problem, customers: &mut [usize]) {
    customers.sort_by(|&i, &j| _angle(problem, i).total_cmp(&_angle(problem, j)));
    if customers.len() < 2 {
        return;
    }

    let mut max_gap = 0.0;
    let mut max_gap_index = customers.len() - 1;
    for i in 0..customers.len() {
        let next = (i + 1) % customers.len();
        let gap = (_angle(problem, customers[next]) - _angle(problem, customers[i])).rem_euclid(2.0 * consts::PI);
        if gap > max_gap {
            max_gap = gap;
            max_gap_index = i;
        }
    }

    customers.rotate_left((max_gap_index + 1) % customers.len());
}

/// Partition `customers` into `k` groups with k-means over their coordinates.
///
/// The first assignment splits the sweep order into `k` equal angular sectors; Lloyd iterations then move
/// every customer to its nearest centroid until nothing changes. Groups may come out empty.
pub fn clusterize(problem: &Problem, customers: &[usize], k: usize) -> Vec<Vec<usize>> {
    let mut clusters = vec![vec![]; k];
    if customers.is_empty() || k == 0 {
        return clusters;
    }

    let mut order = customers.to_vec();
    sweep_order(problem, &mut order);

    let first = _angle(problem, order[0]);
    let offset = |c: usize| (_angle(problem, c) - first).rem_euclid(2.0 * consts::PI);
    let gap = offset(order[order.len() - 1]) / k as f64;
    let mut labels = order
        .iter()
        .map(|&c| if gap > 0.0 { ((offset(c) / gap) as usize).min(k - 1) } else { 0 })
        .collect::<Vec<_>>();

    let point = |c: usize| (problem.customers[c].x, problem.customers[c].y);
    for _ in 0..KMEANS_ITERATIONS {
        let mut sums = vec![(0.0, 0.0, 0_usize); k];
        for (&c, &label) in order.iter().zip(&labels) {
            let (x, y) = point(c);
            let sum = &mut sums[label];
            sum.0 += x;
            sum.1 += y;
            sum.2 += 1;
        }

        let centroids = sums
            .iter()
            .map(|&(x, y, n)| (n > 0).then_some((x / n as f64, y / n as f64)))
            .collect::<Vec<_>>();

        let mut changed = false;
        for (&c, label) in order.iter().zip(labels.iter_mut()) {
            let (x, y) = point(c);
            let nearest = centroids
                .iter()
                .enumerate()
                .filter_map(|(j, centroid)| centroid.map(|(cx, cy)| (j, (x - cx).hypot(y - cy))))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map_or(*label, |(j, _)| j);

            if nearest != *label {
                *label = nearest;
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }

    for (&c, &label) in order.iter().zip(&labels) {
        clusters[label].push(c);
    }

    clusters
}
