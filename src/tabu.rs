use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt;
use std::rc::Rc;
use std::time::Instant;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::initial::{destroy_and_repair, initial_solution};
use crate::logger::Logger;
use crate::neighborhoods::{Candidate, Neighborhood};
use crate::problem::Problem;
use crate::solutions::{PenaltyCoefficients, Solution};
use crate::utils::approximate;

fn _key((a, b): (usize, usize)) -> (usize, usize) {
    (a.min(b), a.max(b))
}

/// Recency memory of unordered customer pairs. A pair inserted at iteration `t` stays tabu during
/// `[t, t + size)`.
#[derive(Debug)]
pub struct TabuList {
    size: usize,
    expiry: HashMap<(usize, usize), usize>,
}

impl TabuList {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            expiry: HashMap::new(),
        }
    }

    pub fn is_tabu(&self, pair: (usize, usize), iteration: usize) -> bool {
        self.expiry.get(&_key(pair)).is_some_and(|&e| iteration < e)
    }

    /// Insert `pair`, refreshing its expiry if it is already present.
    pub fn insert(&mut self, pair: (usize, usize), iteration: usize) {
        self.expiry.insert(_key(pair), iteration + self.size);
    }

    /// Drop entries that expired at or before `iteration`.
    pub fn purge(&mut self, iteration: usize) {
        self.expiry.retain(|_, &mut e| iteration < e);
    }

    pub fn clear(&mut self) {
        self.expiry.clear();
    }

    /// Pairs currently stored, in ascending order.
    pub fn pairs(&self) -> Vec<(usize, usize)> {
        let mut pairs = self.expiry.keys().copied().collect::<Vec<_>>();
        pairs.sort_unstable();
        pairs
    }
}

struct _EliteMember {
    solution: Rc<Solution>,
    node: usize,
    signature: Vec<Vec<Vec<usize>>>,
}

/// Bounded pool of distinct feasible solutions, sorted by working time.
pub struct EliteSet {
    capacity: usize,
    members: Vec<_EliteMember>,
}

impl EliteSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            members: Vec::with_capacity(capacity),
        }
    }

    /// Offer a solution stored at `node` of the search tree. Infeasible solutions and duplicates of a
    /// member are rejected. When the set is full, the newcomer replaces the member with the longest working
    /// time, provided it is shorter.
    pub fn offer(&mut self, solution: &Rc<Solution>, node: usize) -> bool {
        if self.capacity == 0 || !solution.feasible {
            return false;
        }

        let signature = solution.signature();
        if self.members.iter().any(|m| m.signature == signature) {
            return false;
        }

        if self.members.len() == self.capacity {
            match self.members.last() {
                Some(worst) if solution.working_time < worst.solution.working_time => {
                    self.members.pop();
                }
                _ => return false,
            }
        }

        let index = self
            .members
            .partition_point(|m| m.solution.working_time <= solution.working_time);
        self.members.insert(
            index,
            _EliteMember {
                solution: solution.clone(),
                node,
                signature,
            },
        );
        true
    }

    /// Remove a uniformly chosen member, returning it with its search tree node.
    pub fn pop_random(&mut self, rng: &mut impl Rng) -> Option<(Rc<Solution>, usize)> {
        if self.members.is_empty() {
            return None;
        }

        let member = self.members.remove(rng.random_range(0..self.members.len()));
        Some((member.solution, member.node))
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn working_times(&self) -> Vec<f64> {
        self.members.iter().map(|m| m.solution.working_time).collect()
    }

    /// Search tree nodes of the members.
    pub fn nodes(&self) -> Vec<usize> {
        self.members.iter().map(|m| m.node).collect()
    }
}

#[derive(Debug)]
pub struct SearchNode {
    pub parent: Option<usize>,
    pub label: String,

    /// Penalised cost at the time the node was created.
    pub cost: f64,
    pub solution: Rc<Solution>,
}

/// Arena of the solutions the search moved to. Nodes only point back to their parent, and ids stay valid
/// across [`SearchTree::retain`].
#[derive(Debug, Default)]
pub struct SearchTree {
    nodes: HashMap<usize, SearchNode>,
    next_id: usize,
}

impl SearchTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, parent: Option<usize>, label: impl Into<String>, cost: f64, solution: Rc<Solution>) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.insert(
            id,
            SearchNode {
                parent,
                label: label.into(),
                cost,
                solution,
            },
        );
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Nodes from the root down to `id`.
    pub fn chain(&self, id: usize) -> Vec<&SearchNode> {
        let mut result = vec![];
        let mut current = self.nodes.get(&id);
        while let Some(node) = current {
            result.push(node);
            current = node.parent.and_then(|p| self.nodes.get(&p));
        }

        result.reverse();
        result
    }

    /// Drop every node that is not on the chain of one of `leaves`.
    pub fn retain(&mut self, leaves: &[usize]) {
        let mut alive = HashSet::new();
        for &leaf in leaves {
            let mut current = Some(leaf);
            while let Some(id) = current
                && alive.insert(id)
            {
                current = self.nodes.get(&id).and_then(|n| n.parent);
            }
        }

        self.nodes.retain(|id, _| alive.contains(id));
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Searching,
    Diversifying { remaining: usize },
    Terminated,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Searching => write!(f, "searching"),
            Self::Diversifying { remaining } => write!(f, "diversifying, {remaining} left"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Whether `candidate` should replace `best`: feasibility first, then working time between feasible
/// solutions and penalised cost between infeasible ones.
fn _improves(candidate: &Solution, best: &Solution, coefficients: &PenaltyCoefficients) -> bool {
    match (candidate.feasible, best.feasible) {
        (true, false) => true,
        (false, true) => false,
        (true, true) => {
            candidate.working_time < best.working_time && !approximate(candidate.working_time, best.working_time)
        }
        (false, false) => {
            let (a, b) = (candidate.cost(coefficients), best.cost(coefficients));
            a < b && !approximate(a, b)
        }
    }
}

/// The result of a search: the best solution found and the tree that leads to it.
pub struct SearchOutcome {
    pub best: Rc<Solution>,
    pub best_node: usize,
    pub tree: SearchTree,
    pub last_improved: usize,
    pub iterations: usize,

    /// Moves made by the final descent.
    pub post_optimized: usize,
}

struct _Search<'a> {
    problem: &'a Problem,
    coefficients: PenaltyCoefficients,
    tree: SearchTree,
    elite: EliteSet,
    tabu: TabuList,

    current: Rc<Solution>,
    current_node: usize,
    best: Rc<Solution>,
    best_node: usize,
    last_improved: usize,
}

impl _Search<'_> {
    /// Move to `solution`, recording it in the tree and the elite set.
    fn _advance(&mut self, parent: Option<usize>, label: String, solution: Solution, iteration: usize) {
        let solution = Rc::new(solution);
        let cost = solution.cost(&self.coefficients);
        self.current_node = self.tree.insert(parent, label, cost, solution.clone());
        self.current = solution;

        if _improves(&self.current, &self.best, &self.coefficients) {
            self.best = self.current.clone();
            self.best_node = self.current_node;
            self.last_improved = iteration;
        }

        self.elite.offer(&self.current, self.current_node);
    }

    /// Aspiration threshold: a tabu move is still accepted when it yields a feasible solution cheaper than this.
    fn _aspiration(&self) -> f64 {
        if self.best.feasible {
            self.best.working_time
        } else {
            f64::INFINITY
        }
    }

    fn _diversify(&mut self, rng: &mut impl Rng, iteration: usize) -> Result<(), Box<dyn Error>> {
        let (start, parent) = match self.elite.pop_random(rng) {
            Some((solution, node)) => (solution, node),
            None => {
                let solution = Rc::new(initial_solution(self.problem, rng)?);
                let cost = solution.cost(&self.coefficients);
                let node = self.tree.insert(None, "Initial solution", cost, solution.clone());
                (solution, node)
            }
        };

        let restarted = destroy_and_repair(self.problem, &start, rng)?;
        self._advance(Some(parent), String::from("Destroy and repair"), restarted, iteration);
        self.tabu.clear();
        self._prune();
        Ok(())
    }

    /// Forget the tree nodes that lead to neither the current, the best nor an elite solution.
    fn _prune(&mut self) {
        let mut leaves = self.elite.nodes();
        leaves.extend([self.current_node, self.best_node]);
        self.tree.retain(&leaves);
    }

    /// Descend from the best solution: try the neighborhoods in random order and move to the cheapest
    /// feasible neighbour that improves on it, until a full round finds none. Returns the number of moves.
    fn _post_optimize(&mut self, rng: &mut impl Rng) -> usize {
        let mut neighborhoods = Neighborhood::ALL;
        let mut moves = 0;
        let mut step = 0;
        let mut improved = true;

        while improved {
            improved = false;
            neighborhoods.shuffle(rng);
            for neighborhood in neighborhoods {
                step += 1;
                if self.problem.search.verbose {
                    eprint!("Post-optimization #{step} ({:.2})     \r", self.best.cost(&self.coefficients));
                }

                if let Some(candidate) = neighborhood.improve(self.problem, &self.best, &self.coefficients) {
                    let solution = Rc::new(candidate.solution);
                    self.best_node = self.tree.insert(
                        Some(self.best_node),
                        format!("Post-optimization: {neighborhood}"),
                        candidate.cost,
                        solution.clone(),
                    );
                    self.best = solution;
                    moves += 1;
                    improved = true;
                }
            }
        }

        moves
    }
}

/// Tabu search over every neighborhood, starting from the cheapest constructive initial solution.
///
/// Each iteration moves to the cheapest accepted neighbour across all neighborhoods. After `reset_after`
/// iterations without improving the best solution (or when no neighbour is accepted) the search restarts
/// from a perturbed elite solution and runs `diversification_iterations` ejection-chain iterations before
/// returning to the full neighborhood set. The best solution is finally post-optimized by a pure descent,
/// whose moves extend its chain in the search tree.
pub fn tabu_search(problem: &Problem, rng: &mut impl Rng, logger: &mut Logger) -> Result<SearchOutcome, Box<dyn Error>> {
    let started = Instant::now();
    let penalty = &problem.search.penalty;
    let coefficients = PenaltyCoefficients::new(penalty);

    let root = Rc::new(initial_solution(problem, rng)?);
    let mut tree = SearchTree::new();
    let root_node = tree.insert(None, "Initial solution", root.cost(&coefficients), root.clone());

    let mut search = _Search {
        problem,
        coefficients,
        tree,
        elite: EliteSet::new(problem.search.max_elite_size),
        tabu: TabuList::new(problem.tabu_size),
        current: root.clone(),
        current_node: root_node,
        best: root,
        best_node: root_node,
        last_improved: 0,
    };
    search.elite.offer(&search.current, root_node);

    let mut state = if problem.search.iterations == 0 {
        State::Terminated
    } else {
        State::Searching
    };
    let mut last_reset = 0;
    let mut iteration = 0;

    while state != State::Terminated {
        iteration += 1;
        if problem.search.verbose {
            eprint!(
                "Iteration #{} ({}): {:.2}/{:.2}, elite set {}/{}, {} nodes     \r",
                iteration,
                state,
                search.current.cost(&search.coefficients),
                search.best.cost(&search.coefficients),
                search.elite.len(),
                search.elite.capacity(),
                search.tree.len(),
            );
        }

        let neighborhoods: &[Neighborhood] = match state {
            State::Diversifying { .. } => &[Neighborhood::EjectionChain],
            _ => &Neighborhood::ALL,
        };

        let aspiration = search._aspiration();
        let mut accepted: Option<Candidate> = None;
        for &neighborhood in neighborhoods {
            if let Some(candidate) = neighborhood.search(
                problem,
                &search.current,
                &search.tabu,
                iteration,
                &search.coefficients,
                aspiration,
            ) && accepted.as_ref().is_none_or(|a| candidate.cost < a.cost)
            {
                accepted = Some(candidate);
            }
        }

        search.tabu.purge(iteration);
        let stuck = accepted.is_none();
        let (label, pair) = match accepted {
            Some(candidate) => {
                search.tabu.insert(candidate.pair, iteration);
                let label = candidate.neighborhood.to_string();
                search._advance(Some(search.current_node), label.clone(), candidate.solution, iteration);
                (label, Some(candidate.pair))
            }
            None => (String::from("None"), None),
        };

        search.coefficients.update(&search.current, penalty);
        logger.log(
            &search.current,
            &search.coefficients,
            &label,
            pair,
            &search.tabu,
            &search.best,
            &search.elite,
        )?;

        state = match state {
            State::Diversifying { remaining } if remaining > 1 => State::Diversifying {
                remaining: remaining - 1,
            },
            _ => State::Searching,
        };

        let timed_out = problem
            .search
            .time_limit
            .is_some_and(|limit| started.elapsed().as_secs_f64() >= limit);
        if iteration >= problem.search.iterations || timed_out {
            state = State::Terminated;
        } else if state == State::Searching
            && (stuck || iteration - search.last_improved.max(last_reset) >= problem.reset_after)
        {
            search._diversify(rng, iteration)?;
            last_reset = iteration;
            if problem.diversification_iterations > 0 {
                state = State::Diversifying {
                    remaining: problem.diversification_iterations,
                };
            }
        }
    }

    if problem.search.verbose {
        eprintln!();
    }

    let post_optimized = search._post_optimize(rng);
    if problem.search.verbose {
        eprintln!();
    }

    Ok(SearchOutcome {
        best: search.best,
        best_node: search.best_node,
        tree: search.tree,
        last_improved: search.last_improved,
        iterations: iteration,
        post_optimized,
    })
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::neighborhoods::tests::solution;
    use crate::problem::fixtures;
    use crate::routes::VehicleKind;

    #[test]
    fn tabu_expiry() {
        let mut tabu = TabuList::new(3);
        tabu.insert((4, 2), 5);

        assert!(tabu.is_tabu((2, 4), 5));
        assert!(tabu.is_tabu((4, 2), 7));
        assert!(!tabu.is_tabu((4, 2), 8));
        assert!(!tabu.is_tabu((4, 3), 5));

        // Refresh
        tabu.insert((2, 4), 7);
        assert!(tabu.is_tabu((4, 2), 9));
        assert_eq!(tabu.pairs(), [(2, 4)]);

        tabu.purge(10);
        assert!(tabu.pairs().is_empty());
    }

    #[test]
    fn elite_set_is_bounded_and_distinct() {
        let problem = fixtures::mixed_fleet();
        let mut elite = EliteSet::new(2);

        let a = Rc::new(solution(&problem, &[vec![0, 1, 2, 3, 4, 0], vec![0, 5, 6, 7, 8, 0]], &[]));
        let b = Rc::new(solution(&problem, &[vec![0, 2, 5, 7, 0], vec![0, 6, 3, 4, 0]], &[vec![0, 1, 0], vec![0, 8, 0]]));
        let c = Rc::new(solution(&problem, &[vec![0, 2, 1, 3, 4, 0], vec![0, 5, 6, 7, 8, 0]], &[]));
        assert!(a.feasible && b.feasible && c.feasible);

        assert!(elite.offer(&a, 0));
        assert!(!elite.offer(&a.clone(), 1));
        assert!(elite.offer(&b, 2));

        let accepted = elite.offer(&c, 3);
        assert_eq!(elite.len(), 2);
        assert_eq!(accepted, c.working_time < a.working_time.max(b.working_time));

        let times = elite.working_times();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));

        let mut rng = StdRng::seed_from_u64(0);
        assert!(elite.pop_random(&mut rng).is_some());
        assert!(elite.pop_random(&mut rng).is_some());
        assert!(elite.pop_random(&mut rng).is_none());
    }

    #[test]
    fn full_elite_set_evicts_the_longest_member() {
        let problem = fixtures::single_truck();
        let mut elite = EliteSet::new(2);

        let shortest = Rc::new(solution(&problem, &[vec![0, 1, 2, 3, 4, 0]], &[]));
        let middle = Rc::new(solution(&problem, &[vec![0, 2, 1, 3, 4, 0]], &[]));
        let longest = Rc::new(solution(&problem, &[vec![0, 1, 3, 2, 4, 0]], &[]));
        assert!(shortest.working_time < middle.working_time && middle.working_time < longest.working_time);

        // The newcomer resembles the middle member more than the longest one
        assert!(shortest.hamming_distance(&middle) < shortest.hamming_distance(&longest));

        assert!(elite.offer(&middle, 0));
        assert!(elite.offer(&longest, 1));
        assert!(elite.offer(&shortest, 2));
        assert_eq!(elite.working_times(), [shortest.working_time, middle.working_time]);
        assert_eq!(elite.nodes(), [2, 0]);

        assert!(!elite.offer(&longest, 3));
        assert_eq!(elite.nodes(), [2, 0]);
    }

    #[test]
    fn elite_set_rejects_infeasible() {
        let problem = fixtures::mixed_fleet();
        let mut elite = EliteSet::new(5);

        // Drone capacity is 2
        let overloaded = Rc::new(solution(
            &problem,
            &[vec![0, 2, 5, 7, 0]],
            &[vec![0, 1, 3, 4, 6, 8, 0]],
        ));
        assert!(!overloaded.feasible);
        assert!(!elite.offer(&overloaded, 0));
        assert!(elite.is_empty());
    }

    #[test]
    fn search_tree_chain() {
        let problem = fixtures::single_truck();
        let s = Rc::new(solution(&problem, &[vec![0, 1, 2, 3, 4, 0]], &[]));

        let mut tree = SearchTree::new();
        let root = tree.insert(None, "root", 0.0, s.clone());
        let a = tree.insert(Some(root), "a", 0.0, s.clone());
        let sibling = tree.insert(Some(root), "sibling", 0.0, s.clone());
        let b = tree.insert(Some(a), "b", 0.0, s);

        let labels = tree.chain(b).iter().map(|n| n.label.as_str()).collect::<Vec<_>>();
        assert_eq!(labels, ["root", "a", "b"]);
        assert_eq!(tree.chain(b)[2].parent, Some(a));
        assert_eq!(tree.chain(sibling).len(), 2);
    }

    #[test]
    fn pruning_keeps_live_chains() {
        let problem = fixtures::single_truck();
        let s = Rc::new(solution(&problem, &[vec![0, 1, 2, 3, 4, 0]], &[]));

        let mut tree = SearchTree::new();
        let root = tree.insert(None, "root", 0.0, s.clone());
        let a = tree.insert(Some(root), "a", 0.0, s.clone());
        let dead = tree.insert(Some(a), "dead", 0.0, s.clone());
        let b = tree.insert(Some(a), "b", 0.0, s.clone());
        let restart = tree.insert(None, "restart", 0.0, s.clone());
        let c = tree.insert(Some(restart), "c", 0.0, s.clone());
        tree.insert(None, "abandoned", 0.0, s.clone());

        tree.retain(&[b, c]);
        assert_eq!(tree.len(), 5);
        assert!(tree.chain(dead).is_empty());

        let labels = |id| tree.chain(id).iter().map(|n| n.label.clone()).collect::<Vec<_>>();
        assert_eq!(labels(b), ["root", "a", "b"]);
        assert_eq!(labels(c), ["restart", "c"]);

        // Ids of pruned nodes are never handed out again
        let d = tree.insert(Some(b), "d", 0.0, s);
        assert!(d > c);
        assert_eq!(tree.chain(d).len(), 4);
    }

    #[test]
    fn post_optimization_descends_to_a_local_optimum() {
        let problem = fixtures::single_truck();
        let coefficients = PenaltyCoefficients::new(&problem.search.penalty);

        // (10, 0) -> (0, 10) -> (10, 10) -> (-5, 5) crosses itself
        let start = Rc::new(solution(&problem, &[vec![0, 1, 3, 2, 4, 0]], &[]));
        let mut tree = SearchTree::new();
        let root = tree.insert(None, "Initial solution", start.cost(&coefficients), start.clone());

        let mut search = _Search {
            problem: &problem,
            coefficients,
            tree,
            elite: EliteSet::new(1),
            tabu: TabuList::new(problem.tabu_size),
            current: start.clone(),
            current_node: root,
            best: start.clone(),
            best_node: root,
            last_improved: 0,
        };

        let mut rng = StdRng::seed_from_u64(5);
        let moves = search._post_optimize(&mut rng);
        assert!(moves > 0);
        assert!(search.best.feasible);

        assert!(search.best.working_time < start.working_time);
        for neighborhood in Neighborhood::ALL {
            assert!(neighborhood.improve(&problem, &search.best, &search.coefficients).is_none());
        }

        let chain = search.tree.chain(search.best_node);
        assert_eq!(chain.len(), moves + 1);
        assert!(Rc::ptr_eq(&chain[0].solution, &start));
        assert!(chain[1..].iter().all(|n| n.label.starts_with("Post-optimization: ")));
        assert!(chain.windows(2).all(|w| w[1].solution.working_time < w[0].solution.working_time));
    }

    #[test]
    fn improvement_order() {
        let problem = fixtures::mixed_fleet();
        let coefficients = PenaltyCoefficients::new(&problem.search.penalty);

        let feasible = solution(&problem, &[vec![0, 1, 2, 3, 4, 0], vec![0, 5, 6, 7, 8, 0]], &[]);
        let infeasible = solution(&problem, &[vec![0, 2, 5, 7, 0]], &[vec![0, 1, 3, 4, 6, 8, 0]]);

        assert!(_improves(&feasible, &infeasible, &coefficients));
        assert!(!_improves(&infeasible, &feasible, &coefficients));
        assert!(!_improves(&feasible, &feasible, &coefficients));
    }

    #[test]
    fn end_to_end() {
        let mut problem = fixtures::mixed_fleet();
        problem.search.iterations = 40;
        problem.reset_after = 5;
        problem.diversification_iterations = 2;

        let mut rng = StdRng::seed_from_u64(42);
        let mut logger = Logger::new(&problem).unwrap();
        let outcome = tabu_search(&problem, &mut rng, &mut logger).unwrap();

        assert_eq!(outcome.iterations, 40);
        assert!(outcome.best.verify(&problem).is_ok());
        assert!(outcome.best.feasible);
        for route in outcome.best.drone_routes.iter().flatten() {
            assert!(route.customers.iter().all(|&c| VehicleKind::Drone.servable(&problem, c)));
        }

        // The chain ends at the best solution and starts at a root
        let chain = outcome.tree.chain(outcome.best_node);
        assert!(chain[0].parent.is_none());
        assert!(Rc::ptr_eq(&chain[chain.len() - 1].solution, &outcome.best));

        // Never worse than where it started
        let root = &chain[0].solution;
        if root.feasible {
            assert!(outcome.best.working_time <= root.working_time || approximate(outcome.best.working_time, root.working_time));
        }

        assert_eq!(logger.trace().progress.len(), 40);

        // The final descent only extends the chain
        for node in chain.iter().skip_while(|n| !n.label.starts_with("Post-optimization: ")) {
            assert!(node.label.starts_with("Post-optimization: "));
        }
    }

    #[test]
    fn zero_iterations_returns_initial_solution() {
        let mut problem = fixtures::single_truck();
        problem.search.iterations = 0;

        let mut rng = StdRng::seed_from_u64(1);
        let mut logger = Logger::new(&problem).unwrap();
        let outcome = tabu_search(&problem, &mut rng, &mut logger).unwrap();

        assert_eq!(outcome.iterations, 0);
        assert_eq!(outcome.post_optimized, 0);
        assert_eq!(outcome.tree.chain(outcome.best_node).len(), 1);
        assert_eq!(outcome.best.truck_routes[0].len(), 1);
    }
}
