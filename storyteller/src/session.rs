//! Interactive and one-shot sessions.
//!
//! The interactive session is a line-oriented loop:
//! - The first line is the story request
//! - Every later line is a change to the last story
//! - `end` finishes; lines starting with `#` are commands

use anyhow::Context;
use std::io::{self, BufRead, Write};
use storyteller_core::{
    EvaluationResult, Genre, Oracle, PipelineError, Storyteller, TurnOutcome, APPROVAL_THRESHOLD,
};

const RULE_WIDTH: usize = 60;

/// Run a single turn and print the story, or the whole outcome as JSON.
pub async fn tell_once<O: Oracle>(
    mut teller: Storyteller<O>,
    request: &str,
    json: bool,
) -> anyhow::Result<()> {
    let outcome = teller.tell(request).await.map_err(stage_error)?;
    if json {
        let rendered =
            serde_json::to_string_pretty(&outcome).context("failed to serialize the turn")?;
        println!("{rendered}");
    } else {
        println!("{}", outcome.final_story);
    }
    Ok(())
}

fn stage_error(err: PipelineError) -> anyhow::Error {
    let stage = err.stage();
    anyhow::Error::new(err).context(format!("{stage} stage failed"))
}

/// Run the interactive session until `end` or end of input.
pub async fn run_interactive<O: Oracle>(mut teller: Storyteller<O>) -> anyhow::Result<()> {
    print_banner();
    print_request_prompt();

    let stdin = io::stdin();
    let mut last: Option<TurnOutcome> = None;

    for line in stdin.lock().lines() {
        let line = line.context("failed to read input")?;
        let line = line.trim();
        if line.is_empty() {
            print_next_prompt(last.is_some());
            continue;
        }

        if line.eq_ignore_ascii_case("end") {
            println!("Sweet dreams!");
            break;
        }

        if let Some(command) = line.strip_prefix('#') {
            match command.trim() {
                "quit" | "exit" => {
                    println!("Sweet dreams!");
                    break;
                }
                "scores" => match &last {
                    Some(outcome) => print!("{}", format_breakdown(&outcome.evaluation)),
                    None => println!("[ERROR] No story yet."),
                },
                "reset" => {
                    teller.reset();
                    last = None;
                    println!("[RESET] Starting over.");
                }
                "help" => print_help(),
                _ => println!("[ERROR] Unknown command. Type #help for help."),
            }
            print_next_prompt(last.is_some());
            continue;
        }

        print!("[WRITING]");
        io::stdout().flush().ok();

        let result = if last.is_some() {
            teller.edit(line).await
        } else {
            teller.tell(line).await
        };

        print!("\r         \r");
        io::stdout().flush().ok();

        match result {
            Ok(outcome) => {
                print!("{}", format_outcome(&outcome));
                last = Some(outcome);
            }
            Err(e) => println!("[ERROR] {} failed: {e}", e.stage()),
        }
        print_next_prompt(last.is_some());
    }

    Ok(())
}

fn print_banner() {
    println!("{}", "=".repeat(RULE_WIDTH));
    println!("Bedtime Storyteller");
    println!("{}", "=".repeat(RULE_WIDTH));
    println!("Three specialized writers:");
    for genre in Genre::ALL {
        println!("  {:<18} {}", genre.label(), genre.tagline());
    }
    println!();
    println!("Every story is scored on five dimensions and improved");
    println!("automatically when any of them falls below {APPROVAL_THRESHOLD:.1}.");
    println!("Type #help for commands.");
    println!();
}

fn print_help() {
    println!("[HELP]");
    println!("  end      - Finish the session");
    println!("  #scores  - Show the last score breakdown");
    println!("  #reset   - Forget the story and start over");
    println!("  #help    - Show this help");
    println!("  (anything else is a story request, or a change to the last story)");
}

fn print_request_prompt() {
    print!("What kind of story would you like? ");
    io::stdout().flush().ok();
}

fn print_next_prompt(has_story: bool) {
    if has_story {
        print!("Type 'end' to finish, or describe a change: ");
        io::stdout().flush().ok();
    } else {
        print_request_prompt();
    }
}

/// The story followed by its statistics and score breakdown.
pub fn format_outcome(outcome: &TurnOutcome) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = format!("\n{rule}\n");
    for paragraph in outcome.final_story.trim().split("\n\n") {
        out.push_str(paragraph.trim());
        out.push_str("\n\n");
    }
    out.push_str(&format!("{rule}\n"));
    out.push_str(&format!(
        "{} | Words: {} | Quality Score: {:.1}/10\n",
        outcome.genre.label(),
        outcome.final_word_count,
        outcome.evaluation.aggregate()
    ));
    out.push_str(&format_breakdown(&outcome.evaluation));
    if outcome.was_fixed {
        out.push_str(&format!(
            "Improved by the evaluator (the first draft had {} words).\n",
            outcome.word_count
        ));
    }
    out.push('\n');
    out
}

/// One line per rubric dimension, marking those below the threshold.
pub fn format_breakdown(evaluation: &EvaluationResult) -> String {
    let mut out = String::from("Score breakdown:\n");
    for (dimension, score) in evaluation.scores().iter() {
        let marker = if score < APPROVAL_THRESHOLD {
            "  (below threshold)"
        } else {
            ""
        };
        out.push_str(&format!("  {:<16} {score:>4.1}{marker}\n", dimension.label()));
    }
    if !evaluation.feedback().is_empty() {
        out.push_str(&format!("Feedback: {}\n", evaluation.feedback()));
    }
    out
}
