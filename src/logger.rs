use std::error::Error;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Instant;

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::Serialize;

use crate::problem::Problem;
use crate::routes::Route;
use crate::solutions::{PenaltyCoefficients, Solution, VIOLATIONS};
use crate::tabu::{EliteSet, SearchNode, TabuList};

/// Per-iteration records kept in memory and written to the run report.
#[derive(Debug, Default, Serialize)]
pub struct SearchTrace {
    /// Penalised cost of the current solution.
    pub history: Vec<f64>,

    /// Penalised cost of the best solution.
    pub progress: Vec<f64>,
    pub coefficients: Vec<[f64; 5]>,
    pub elite_set: Vec<Vec<f64>>,
    pub neighborhoods: Vec<String>,
    pub tabu_pairs: Vec<Option<(usize, usize)>>,

    /// Customers whose successor differs between the current and the best solution.
    pub distances_to_best: Vec<usize>,
}

#[derive(Serialize)]
struct _ChainJSON<'a> {
    label: &'a str,
    cost: f64,
    solution: &'a Solution,
}

#[derive(Serialize)]
struct RunJSON<'a> {
    problem: &'a str,
    id: &'a str,
    tabu_size: usize,
    reset_after: usize,
    diversification_iterations: usize,
    iterations: usize,
    last_improved: usize,
    post_optimized: usize,
    elapsed: f64,
    solution: &'a Solution,
    chain: Vec<_ChainJSON<'a>>,
    trace: &'a SearchTrace,
}

pub struct Logger<'a> {
    _iteration: usize,
    _time_offset: Instant,

    _problem: &'a Problem,
    _outputs: PathBuf,
    _id: String,
    _writer: Option<BufWriter<File>>,
    _trace: SearchTrace,
}

impl<'a> Logger<'a> {
    pub fn new(problem: &'a Problem) -> Result<Self, Box<dyn Error>> {
        let outputs = Path::new(&problem.search.outputs).to_path_buf();
        let id = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect::<String>();

        let mut writer = if problem.search.disable_logging {
            None
        } else {
            fs::create_dir_all(&outputs)?;
            let path = outputs.join(format!("{}-{id}.csv", problem.name));
            eprintln!("Logging iterations to {}", path.display());
            Some(BufWriter::new(File::create(path)?))
        };

        if let Some(ref mut writer) = writer {
            let mut columns = vec![
                String::from("Iteration"),
                String::from("Cost"),
                String::from("Working time"),
                String::from("Feasible"),
            ];
            for (i, violation) in VIOLATIONS.iter().enumerate() {
                columns.push(format!("p{i}"));
                columns.push(_capitalize(&format!("{violation} violation")));
            }
            columns.extend(
                [
                    "Truck routes",
                    "Drone routes",
                    "Truck routes count",
                    "Drone routes count",
                    "Neighborhood",
                    "Tabu pair",
                    "Tabu list",
                    "Distance to best",
                    "Best cost",
                    "Elite set",
                ]
                .map(String::from),
            );

            writeln!(writer, "sep=,\n{}", columns.join(","))?;
        }

        Ok(Self {
            _iteration: 0,
            _time_offset: Instant::now(),
            _problem: problem,
            _outputs: outputs,
            _id: id,
            _writer: writer,
            _trace: SearchTrace::default(),
        })
    }

    pub fn trace(&self) -> &SearchTrace {
        &self._trace
    }

    /// Record one iteration: `solution` is the current solution after the move labelled `neighborhood`.
    pub fn log(
        &mut self,
        solution: &Solution,
        coefficients: &PenaltyCoefficients,
        neighborhood: &str,
        pair: Option<(usize, usize)>,
        tabu: &TabuList,
        best: &Solution,
        elite: &EliteSet,
    ) -> Result<(), io::Error> {
        fn _wrap(content: &str) -> String {
            format!("\"{content}\"")
        }

        fn _expand_routes(routes: &[Vec<Rc<Route>>]) -> Vec<Vec<&Vec<usize>>> {
            routes
                .iter()
                .map(|r| r.iter().map(|x| &x.customers).collect())
                .collect()
        }

        self._iteration += 1;
        let cost = solution.cost(coefficients);
        let best_cost = best.cost(coefficients);
        let distance = solution.hamming_distance(best);

        if let Some(ref mut writer) = self._writer {
            let mut row = vec![
                self._iteration.to_string(),
                cost.to_string(),
                solution.working_time.to_string(),
                i32::from(solution.feasible).to_string(),
            ];
            for (coefficient, violation) in coefficients.values.iter().zip(solution.violations()) {
                row.push(coefficient.to_string());
                row.push(violation.to_string());
            }
            row.extend([
                _wrap(&format!("{:?}", _expand_routes(&solution.truck_routes))),
                _wrap(&format!("{:?}", _expand_routes(&solution.drone_routes))),
                solution.truck_routes.iter().map(Vec::len).sum::<usize>().to_string(),
                solution.drone_routes.iter().map(Vec::len).sum::<usize>().to_string(),
                _wrap(neighborhood),
                _wrap(&pair.map_or_else(String::new, |(a, b)| format!("{a} {b}"))),
                _wrap(&format!("{:?}", tabu.pairs())),
                distance.to_string(),
                best_cost.to_string(),
                _wrap(&format!("{:?}", elite.working_times())),
            ]);

            writeln!(writer, "{}", row.join(","))?;
        }

        self._trace.history.push(cost);
        self._trace.progress.push(best_cost);
        self._trace.coefficients.push(coefficients.values);
        self._trace.elite_set.push(elite.working_times());
        self._trace.neighborhoods.push(neighborhood.to_string());
        self._trace.tabu_pairs.push(pair);
        self._trace.distances_to_best.push(distance);

        Ok(())
    }

    /// Write the run report, the best solution and the problem configuration as JSON files and print their
    /// paths.
    pub fn finalize(
        &mut self,
        result: &Solution,
        chain: &[&SearchNode],
        last_improved: usize,
        post_optimized: usize,
    ) -> Result<(), Box<dyn Error>> {
        if let Some(ref mut writer) = self._writer {
            writer.flush()?;
        }

        fs::create_dir_all(&self._outputs)?;
        let name = &self._problem.name;
        let elapsed = self._time_offset.elapsed().as_secs_f64();

        let json_path = self._outputs.join(format!("{name}-{}.json", self._id));
        let json = BufWriter::new(File::create(&json_path)?);
        println!("{}", json_path.display());
        serde_json::to_writer(
            json,
            &RunJSON {
                problem: name,
                id: &self._id,
                tabu_size: self._problem.tabu_size,
                reset_after: self._problem.reset_after,
                diversification_iterations: self._problem.diversification_iterations,
                iterations: self._iteration,
                last_improved,
                post_optimized,
                elapsed,
                solution: result,
                chain: chain
                    .iter()
                    .map(|node| _ChainJSON {
                        label: &node.label,
                        cost: node.cost,
                        solution: &node.solution,
                    })
                    .collect(),
                trace: &self._trace,
            },
        )?;

        let json_path = self._outputs.join(format!("{name}-{}-solution.json", self._id));
        let json = BufWriter::new(File::create(&json_path)?);
        println!("{}", json_path.display());
        serde_json::to_writer(json, result)?;

        let json_path = self._outputs.join(format!("{name}-{}-config.json", self._id));
        let json = BufWriter::new(File::create(&json_path)?);
        println!("{}", json_path.display());
        serde_json::to_writer(json, self._problem)?;

        Ok(())
    }
}

fn _capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars
        .next()
        .map(|c| c.to_uppercase().chain(chars).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::{env, process};

    use super::*;
    use crate::neighborhoods::tests::solution;
    use crate::problem::fixtures;
    use crate::tabu::SearchTree;

    #[test]
    fn capitalized_headers() {
        assert_eq!(_capitalize("waiting time violation"), "Waiting time violation");
        assert_eq!(_capitalize(""), "");
    }

    #[test]
    fn trace_follows_iterations() {
        let problem = fixtures::mixed_fleet();
        let coefficients = PenaltyCoefficients::new(&problem.search.penalty);
        let elite = EliteSet::new(3);
        let s = solution(&problem, &[vec![0, 1, 2, 3, 4, 0], vec![0, 5, 6, 7, 8, 0]], &[]);

        let other = solution(&problem, &[vec![0, 2, 1, 3, 4, 0], vec![0, 5, 6, 7, 8, 0]], &[]);
        let mut tabu = TabuList::new(5);
        tabu.insert((1, 2), 1);

        let mut logger = Logger::new(&problem).unwrap();
        logger.log(&other, &coefficients, "2-opt", Some((1, 2)), &tabu, &s, &elite).unwrap();
        logger.log(&s, &coefficients, "None", None, &tabu, &s, &elite).unwrap();

        let trace = logger.trace();
        assert_eq!(trace.history.len(), 2);
        assert_eq!(trace.progress, [s.cost(&coefficients); 2]);
        assert_eq!(trace.neighborhoods, ["2-opt", "None"]);
        assert_eq!(trace.tabu_pairs, [Some((1, 2)), None]);

        // 0 -> 2 -> 1 -> 3 instead of 0 -> 1 -> 2 -> 3: customers 1 and 2 change successors
        assert_eq!(trace.distances_to_best, [2, 0]);
    }

    #[test]
    fn reports_are_written() {
        let mut problem = fixtures::single_truck();
        let outputs = env::temp_dir().join(format!("d2d-planner-logger-{}", process::id()));
        problem.search.outputs = outputs.to_string_lossy().into_owned();
        problem.search.disable_logging = false;

        let coefficients = PenaltyCoefficients::new(&problem.search.penalty);
        let elite = EliteSet::new(1);
        let s = Rc::new(solution(&problem, &[vec![0, 1, 2, 3, 4, 0]], &[]));
        let mut tree = SearchTree::new();
        let root = tree.insert(None, "Initial solution", s.cost(&coefficients), s.clone());

        let mut logger = Logger::new(&problem).unwrap();
        let mut tabu = TabuList::new(3);
        tabu.insert((4, 1), 1);
        logger.log(&s, &coefficients, "2-opt", None, &tabu, &s, &elite).unwrap();
        logger.finalize(&s, &tree.chain(root), 0, 0).unwrap();

        let id = &logger._id;
        let report = fs::read_to_string(outputs.join(format!("fixture-{id}.json"))).unwrap();
        let report = serde_json::from_str::<serde_json::Value>(&report).unwrap();
        assert_eq!(report["iterations"], 1);
        assert_eq!(report["post_optimized"], 0);
        assert_eq!(report["chain"].as_array().unwrap().len(), 1);
        assert_eq!(report["solution"]["truck_routes"][0][0][0], 0);

        let csv = fs::read_to_string(outputs.join(format!("fixture-{id}.csv"))).unwrap();
        assert_eq!(csv.lines().count(), 3);
        assert!(csv.starts_with("sep=,\nIteration,Cost"));
        assert!(csv.contains("\"[(1, 4)]\""));
        assert!(outputs.join(format!("fixture-{id}-solution.json")).is_file());
        assert!(outputs.join(format!("fixture-{id}-config.json")).is_file());

        fs::remove_dir_all(outputs).unwrap();
    }
}
