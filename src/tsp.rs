//! Travelling salesman solvers used to sequence the customers of a single route.
//!
//! Cities are numbered `0..n` and city 0 is the depot. Every solver returns the tour cost (including the
//! closing edge back to city 0) together with the visiting order, which always starts at city 0 and does
//! not repeat it at the end.

use crate::errors::InvalidInstance;
use crate::utils::TOLERANCE;

pub fn tour_cost(path: &[usize], distance: impl Fn(usize, usize) -> f64) -> f64 {
    match path.len() {
        0 | 1 => 0.0,
        n => (0..n).map(|i| distance(path[i], path[(i + 1) % n])).sum(),
    }
}

/// Exact bitmask dynamic program, `O(2^n * n^2)` time and `O(2^n * n)` space.
pub fn held_karp(n: usize, distance: impl Fn(usize, usize) -> f64) -> Result<(f64, Vec<usize>), InvalidInstance> {
    match n {
        0 => return Err(InvalidInstance::EmptyTsp),
        1 => return Ok((0.0, vec![0])),
        _ => {}
    }

    // Bit `j` of a mask stands for city `j + 1`.
    let m = n - 1;
    let full = 1_usize << m;
    let mut dp = vec![f64::INFINITY; full * m];
    let mut parent = vec![usize::MAX; full * m];

    for j in 0..m {
        dp[(1 << j) * m + j] = distance(0, j + 1);
    }

    for mask in 1..full {
        for j in 0..m {
            if mask & (1 << j) == 0 {
                continue;
            }

            let current = dp[mask * m + j];
            if current.is_infinite() {
                continue;
            }

            for k in 0..m {
                if mask & (1 << k) != 0 {
                    continue;
                }

                let next = (mask | (1 << k)) * m + k;
                let cost = current + distance(j + 1, k + 1);
                if cost < dp[next] {
                    dp[next] = cost;
                    parent[next] = j;
                }
            }
        }
    }

    let last = full - 1;
    let mut best = f64::INFINITY;
    let mut end = 0;
    for j in 0..m {
        let cost = dp[last * m + j] + distance(j + 1, 0);
        if cost < best {
            best = cost;
            end = j;
        }
    }

    let mut path = Vec::with_capacity(n);
    let mut mask = last;
    let mut j = end;
    while j != usize::MAX {
        path.push(j + 1);
        let p = parent[mask * m + j];
        mask ^= 1 << j;
        j = p;
    }

    path.push(0);
    path.reverse();
    Ok((best, path))
}

pub fn nearest_neighbour(
    n: usize,
    distance: impl Fn(usize, usize) -> f64,
) -> Result<(f64, Vec<usize>), InvalidInstance> {
    if n == 0 {
        return Err(InvalidInstance::EmptyTsp);
    }

    let mut visited = vec![false; n];
    visited[0] = true;

    let mut path = Vec::with_capacity(n);
    path.push(0);

    let mut current = 0;
    for _ in 1..n {
        let mut nearest = usize::MAX;
        let mut nearest_distance = f64::INFINITY;
        for (city, &v) in visited.iter().enumerate() {
            if !v && (nearest == usize::MAX || distance(current, city) < nearest_distance) {
                nearest = city;
                nearest_distance = distance(current, city);
            }
        }

        visited[nearest] = true;
        path.push(nearest);
        current = nearest;
    }

    Ok((tour_cost(&path, &distance), path))
}

/// Nearest-neighbour tour improved by segment reversal until no reversal shortens it.
pub fn two_opt(n: usize, distance: impl Fn(usize, usize) -> f64) -> Result<(f64, Vec<usize>), InvalidInstance> {
    let (_, mut path) = nearest_neighbour(n, &distance)?;

    let mut improved = true;
    while improved {
        improved = false;
        for i in 1..n.saturating_sub(1) {
            for j in i + 1..n {
                let before = path[i - 1];
                let after = path[(j + 1) % n];
                let delta = distance(before, path[j]) + distance(path[i], after)
                    - distance(before, path[i])
                    - distance(path[j], after);

                if delta < -TOLERANCE {
                    path[i..=j].reverse();
                    improved = true;
                }
            }
        }
    }

    Ok((tour_cost(&path, &distance), path))
}
