//! Command-line argument parsing.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use storyteller_core::{PassthroughPolicy, StorytellerConfig};

/// Bedtime stories from three specialized writers, checked against a rubric
#[derive(Parser)]
#[command(name = "storyteller", version, long_about = None)]
pub struct Cli {
    /// Model for every stage (overrides $STORYTELLER_MODEL)
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Directory holding princess/, christmas/ and animals/ example stories
    #[arg(long, global = true, value_name = "DIR")]
    pub corpus: Option<PathBuf>,

    /// How the router's final answer is checked: strict or tool-output
    #[arg(long, global = true, value_name = "POLICY")]
    pub passthrough: Option<PassthroughPolicy>,

    /// Retries after a failed API call
    #[arg(long, global = true, value_name = "N")]
    pub max_retries: Option<u32>,

    /// More logging on stderr (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Subcommand (if not provided, starts an interactive session)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Tell one story and exit
    Tell {
        /// What the story should be about
        #[arg(required = true, num_args = 1..)]
        request: Vec<String>,

        /// Print the whole turn, scores included, as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Apply flag overrides on top of a config read from the environment.
    pub fn apply(&self, mut config: StorytellerConfig) -> StorytellerConfig {
        if let Some(model) = &self.model {
            config = config.with_model(model);
        }
        if let Some(corpus) = &self.corpus {
            config = config.with_corpus_root(corpus);
        }
        if let Some(passthrough) = self.passthrough {
            config = config.with_passthrough(passthrough);
        }
        if let Some(retries) = self.max_retries {
            config = config.with_max_retries(retries);
        }
        config
    }

    /// Log filter for the verbosity flag; `RUST_LOG` wins when no flag is given.
    pub fn log_filter(&self) -> Option<&'static str> {
        match self.verbose {
            0 => None,
            1 => Some("info,reqwest=warn,hyper=warn"),
            _ => Some("debug,reqwest=info,hyper=info,hyper_util=info,h2=info,rustls=info"),
        }
    }
}
