//! # Shell Completion Module
//!
//! Completion scripts for the `listengraph` CLI, plus the user-id listing the
//! scripts can call for dynamic completion of `recommend`, `evaluate` and
//! `similar` arguments.
//!
//! ## Usage
//!
//! ```bash
//! # Generate bash completions
//! listengraph completion bash > ~/.local/share/bash-completion/completions/listengraph
//!
//! # Generate zsh completions
//! listengraph completion zsh > ~/.config/zsh/completions/_listengraph
//! ```

use crate::cli::Shell;
use crate::error::Result;
use crate::model::normalize;
use crate::store::{InteractionStore, OpenMode, SqliteStore};
use clap::Command;
use clap_complete::{generate, Generator, Shell as CompletionShell};
use std::io::{self, Write};
use std::path::Path;

/// Upper bound on ids offered to the shell.
pub const MAX_USER_COMPLETIONS: usize = 1000;

/// Generate shell completions for the given shell
pub fn generate_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
}

/// Convert our Shell enum to clap_complete's Shell enum
pub fn shell_to_completion_shell(shell: Shell) -> CompletionShell {
    match shell {
        Shell::Bash => CompletionShell::Bash,
        Shell::Zsh => CompletionShell::Zsh,
        Shell::Fish => CompletionShell::Fish,
        Shell::PowerShell => CompletionShell::PowerShell,
        Shell::Elvish => CompletionShell::Elvish,
    }
}

/// User ids starting with `prefix`. A missing or unreadable database yields
/// no completions rather than an error, so a shell never prints a backtrace
/// mid-completion.
pub fn user_completions(db_path: &Path, prefix: &str) -> Vec<String> {
    if !db_path.exists() {
        return Vec::new();
    }
    let Ok(store) = SqliteStore::open(db_path, OpenMode::Existing) else {
        return Vec::new();
    };
    matching_users(&store, prefix).unwrap_or_default()
}

/// Seeks to `prefix` in id order, so matches are found however many users
/// sort before them.
fn matching_users<S: InteractionStore + ?Sized>(store: &S, prefix: &str) -> Result<Vec<String>> {
    let prefix = normalize(prefix);
    Ok(store
        .users_from(&prefix, MAX_USER_COMPLETIONS)?
        .into_iter()
        .map(|user| user.as_str().to_string())
        .take_while(|user| user.starts_with(&prefix))
        .collect())
}

/// Print one completion per line, quoting ids that contain whitespace.
pub fn print_completions<W: Write>(out: &mut W, completions: &[String]) -> io::Result<()> {
    for completion in completions {
        if completion.contains(char::is_whitespace) {
            writeln!(out, "\"{}\"", completion.replace('"', "\\\""))?;
        } else {
            writeln!(out, "{completion}")?;
        }
    }
    Ok(())
}
