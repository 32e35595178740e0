use std::error::Error;
use std::fs;
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use mimalloc::MiMalloc;
use rand::SeedableRng;
use rand::rngs::StdRng;

mod bitset;
mod cli;
mod clusterize;
mod config;
mod errors;
mod fenwick;
mod initial;
mod logger;
mod neighborhoods;
mod problem;
mod routes;
mod solutions;
mod tabu;
mod tsp;
mod utils;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn _run() -> Result<(), Box<dyn Error>> {
    match cli::Arguments::parse().command {
        cli::Commands::Evaluate {
            solution,
            instance,
            search,
        } => {
            let problem = problem::Problem::load(&instance, search)?;
            let mut logger = logger::Logger::new(&problem)?;

            // Rebuild from the route lists so that every aggregate follows the current configuration.
            let data = fs::read_to_string(solution)?;
            let s = solutions::Solution::from_json(&problem, serde_json::from_str(&data)?)?;

            logger.finalize(&s, &[], 0, 0)?;
            eprintln!("{}", format!("Result = {}", s.working_time).red());
            if !s.feasible {
                eprintln!("{}", "Solution is infeasible".yellow());
            }
        }
        cli::Commands::Run { instance, search } => {
            let mut rng = match search.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };

            let problem = problem::Problem::load(&instance, search)?;
            let mut logger = logger::Logger::new(&problem)?;

            let outcome = tabu::tabu_search(&problem, &mut rng, &mut logger)?;
            outcome.best.verify(&problem)?;
            logger.finalize(
                &outcome.best,
                &outcome.tree.chain(outcome.best_node),
                outcome.last_improved,
                outcome.post_optimized,
            )?;

            eprintln!("{}", format!("Result = {}", outcome.best.working_time).red());
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    match _run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", format!("Error: {e}").red());
            ExitCode::FAILURE
        }
    }
}
