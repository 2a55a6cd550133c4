//! User-facing console output.
//! Colored prefixes when attached to a terminal, plain text otherwise, so piped output
//! stays script-friendly.

use owo_colors::OwoColorize;
use std::io::{self, BufRead, Write};

pub fn stdout_is_tty() -> bool {
    atty::is(atty::Stream::Stdout)
}

pub fn stdin_is_tty() -> bool {
    atty::is(atty::Stream::Stdin)
}

fn stderr_is_tty() -> bool {
    atty::is(atty::Stream::Stderr)
}

pub fn print_info(msg: &str) {
    if stdout_is_tty() {
        println!("{} {}", "info:".cyan().bold(), msg);
    } else {
        println!("info: {msg}");
    }
}

pub fn print_warn(msg: &str) {
    if stderr_is_tty() {
        eprintln!("{} {}", "warn:".yellow().bold(), msg);
    } else {
        eprintln!("warn: {msg}");
    }
}

pub fn print_error(msg: &str) {
    if stderr_is_tty() {
        eprintln!("{} {}", "error:".red().bold(), msg);
    } else {
        eprintln!("error: {msg}");
    }
}

pub fn print_success(msg: &str) {
    if stdout_is_tty() {
        println!("{} {}", "ok:".green().bold(), msg);
    } else {
        println!("ok: {msg}");
    }
}

/// Plain line without prefix, for primary output that users may script against.
pub fn print_user(msg: &str) {
    println!("{msg}");
}

/// Header line of a table (bold on a terminal).
pub fn print_heading(msg: &str) {
    if stdout_is_tty() {
        println!("{}", msg.bold());
    } else {
        println!("{msg}");
    }
}

/// Ask a yes/no question on the terminal. Anything but `y`/`yes` is a no.
pub fn confirm(question: &str) -> io::Result<bool> {
    let mut stdout = io::stdout();
    if stdout_is_tty() {
        write!(stdout, "{} {question} [y/N] ", "confirm:".magenta().bold())?;
    } else {
        write!(stdout, "confirm: {question} [y/N] ")?;
    }
    stdout.flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(is_yes(&line))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_explicit_yes_confirms() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("no"));
        assert!(!is_yes("yep"));
    }
}
