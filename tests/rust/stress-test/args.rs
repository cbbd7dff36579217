// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use anyhow::Result;
use clap::{
    Arg,
    ArgMatches,
    Command,
};

//======================================================================================================================
// Program Arguments
//======================================================================================================================

/// Program Arguments
#[derive(Debug)]
pub struct ProgramArguments {
    /// Number of worker threads.
    workers: usize,
    /// Number of tasks in the flood scenario.
    tasks: usize,
    /// Problem size of the recursion scenario.
    problem_size: usize,
}

impl ProgramArguments {
    /// Parses the program arguments from the command line interface.
    pub fn new(app_name: &'static str, app_author: &'static str, app_about: &'static str) -> Result<Self> {
        let matches: ArgMatches = Command::new(app_name)
            .author(app_author)
            .about(app_about)
            .arg(
                Arg::new("workers")
                    .long("workers")
                    .value_parser(clap::value_parser!(usize))
                    .required(false)
                    .default_value("4")
                    .value_name("COUNT")
                    .help("Sets number of worker threads"),
            )
            .arg(
                Arg::new("tasks")
                    .long("tasks")
                    .value_parser(clap::value_parser!(usize))
                    .required(false)
                    .default_value("2000")
                    .value_name("COUNT")
                    .help("Sets number of tasks in the flood scenario"),
            )
            .arg(
                Arg::new("problem-size")
                    .long("problem-size")
                    .value_parser(clap::value_parser!(usize))
                    .required(false)
                    .default_value("1000000")
                    .value_name("N")
                    .help("Sets problem size of the recursion scenario"),
            )
            .get_matches();

        let workers: usize = *matches
            .get_one::<usize>("workers")
            .ok_or(anyhow::anyhow!("missing worker count"))?;
        if workers == 0 {
            anyhow::bail!("worker count must be at least one");
        }

        let tasks: usize = *matches
            .get_one::<usize>("tasks")
            .ok_or(anyhow::anyhow!("missing task count"))?;

        let problem_size: usize = *matches
            .get_one::<usize>("problem-size")
            .ok_or(anyhow::anyhow!("missing problem size"))?;

        Ok(Self {
            workers,
            tasks,
            problem_size,
        })
    }

    /// Returns the `workers` command line argument.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Returns the `tasks` command line argument.
    pub fn tasks(&self) -> usize {
        self.tasks
    }

    /// Returns the `problem-size` command line argument.
    pub fn problem_size(&self) -> usize {
        self.problem_size
    }
}
