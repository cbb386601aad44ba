use colored::Colorize;
use declarative::{ApplyOutcome, OutcomeStatus, ReconciliationResult};

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// One line per resource: status symbol, label and message
pub fn result_line(label: &str, result: &ReconciliationResult) {
    let symbol = if result.failed() {
        "✗".red()
    } else if result.has_rejections() {
        "⚠".yellow()
    } else if result.changed {
        "✓".green()
    } else {
        "○".dimmed()
    };
    println!("  {} {} {}", symbol, label.bold(), result.message().dimmed());
}

/// Operations of one result, indented under its line
pub fn operations(result: &ReconciliationResult) {
    for outcome in &result.outcomes {
        operation(outcome);
    }
}

fn operation(outcome: &ApplyOutcome) {
    let text = outcome.operation.to_string();
    match &outcome.status {
        OutcomeStatus::Applied => println!("      {} {}", "✓".green(), text),
        OutcomeStatus::Planned => println!("      {} {}", "→".cyan(), text),
        OutcomeStatus::Rejected { message } => {
            println!("      {} {} {}", "⚠".yellow(), text, format!("({message})").dimmed());
        }
        OutcomeStatus::Failed { error } => {
            println!("      {} {} {}", "✗".red(), text, format!("({error})").dimmed());
        }
        OutcomeStatus::Skipped { reason } => {
            println!("      {} {} {}", "⊘".dimmed(), text.dimmed(), format!("({reason})").dimmed());
        }
    }
}
