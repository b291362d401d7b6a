pub mod config;
pub mod date;

use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

use anyhow::Result;
use clap::Command;
use clap_complete::Shell;
use colored::Colorize;

/// Append an extension to `PathBuf`, which is missing from the standard lib :(
///
/// ```rust
/// use std::path::PathBuf;
/// use mydata_tools::append_extension_to_path;
///
/// let path = append_extension_to_path(PathBuf::from("reports/invoice_report"), "xlsx");
/// assert_eq!(path, PathBuf::from("reports/invoice_report.xlsx"));
///
/// // Existing dots are kept as part of the name
/// let path = append_extension_to_path(PathBuf::from("report.2024"), "csv");
/// assert_eq!(path, PathBuf::from("report.2024.csv"));
/// ```
pub fn append_extension_to_path(path: PathBuf, extension: impl AsRef<OsStr>) -> PathBuf {
    let mut os_string: OsString = path.into();
    os_string.push(".");
    os_string.push(extension);
    os_string.into()
}

#[inline]
pub fn print_error(message: &str) {
    eprintln!("{}", format!("Error: {message}").red());
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {
        $crate::print_error(&format!($($arg)*))
    };
}

#[inline]
pub fn print_warning(message: &str) {
    eprintln!("{}", message.yellow());
}

#[macro_export]
macro_rules! print_warning {
    ($($arg:tt)*) => {
        $crate::print_warning(&format!($($arg)*))
    };
}

/// Generate a shell completion script for the given shell.
///
/// With `install` the script is written to the user completion directory,
/// otherwise it is printed to stdout.
///
/// # Errors
/// Returns an error if the completion directory cannot be determined or written.
pub fn generate_shell_completion(shell: Shell, mut command: Command, install: bool, command_name: &str) -> Result<()> {
    if install {
        let out_dir = get_shell_completion_dir(shell, command_name)?;
        let path = clap_complete::generate_to(shell, &mut command, command_name, out_dir)?;
        println!("Completion file generated to: {}", path.display());
    } else {
        clap_complete::generate(shell, &mut command, command_name, &mut std::io::stdout());
    }
    Ok(())
}

/// Determine the appropriate directory for storing shell completions.
///
/// Uses the user-specific directory, creating it if needed.
/// Zsh completions go to an oh-my-zsh custom plugin when oh-my-zsh is installed.
fn get_shell_completion_dir(shell: Shell, name: &str) -> Result<PathBuf> {
    let Some(home) = dirs::home_dir() else {
        anyhow::bail!("Failed to get home directory");
    };

    if shell == Shell::Zsh {
        let omz_plugins = home.join(".oh-my-zsh/custom/plugins");
        if omz_plugins.exists() {
            let plugin_dir = omz_plugins.join(name);
            std::fs::create_dir_all(&plugin_dir)?;
            return Ok(plugin_dir);
        }
    }

    let user_dir = match shell {
        Shell::PowerShell => {
            if cfg!(windows) {
                home.join(r"Documents\PowerShell\completions")
            } else {
                home.join(".config/powershell/completions")
            }
        }
        Shell::Bash => home.join(".bash_completion.d"),
        Shell::Elvish => home.join(".elvish"),
        Shell::Fish => home.join(".config/fish/completions"),
        Shell::Zsh => home.join(".zsh/completions"),
        _ => anyhow::bail!("Unsupported shell"),
    };

    std::fs::create_dir_all(&user_dir)?;
    Ok(user_dir)
}

/// Helper method to assert floating point equality in test cases.
///
/// # Panics
/// Panics if the values differ by more than `f64::EPSILON`.
#[inline]
pub fn assert_f64_eq(a: f64, b: f64) {
    let epsilon = f64::EPSILON;
    assert!(
        (a - b).abs() <= epsilon,
        "Values are not equal: {a} and {b} (epsilon = {epsilon})"
    );
}
