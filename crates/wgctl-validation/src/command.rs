//! Safe command execution with command injection prevention.
//!
//! This module provides a `SafeCommand` builder that validates all arguments
//! before execution, preventing command injection attacks.
//!
//! # Security Features
//!
//! - **No shell invocation**: Uses `Command::new()` directly, never `sh -c`
//! - **Argument validation**: All arguments are validated before use
//! - **Allowlist enforcement**: Only pre-approved programs can be executed
//! - **Defense in depth**: Even though `Command` doesn't use a shell,
//!   we still reject shell metacharacters as a safeguard
//!
//! # Example
//!
//! ```rust,no_run
//! # #[cfg(feature = "command")]
//! # async fn example() -> Result<(), wgctl_validation::command::CommandError> {
//! use wgctl_validation::command::{SafeCommand, AllowedProgram};
//!
//! let output = SafeCommand::new(AllowedProgram::Wg)
//!     .arg("show")
//!     .arg("wg0")
//!     .execute()
//!     .await?;
//!
//! println!("stdout: {}", String::from_utf8_lossy(&output.stdout));
//! # Ok(())
//! # }
//! ```

use crate::error::ValidationError;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

#[cfg(feature = "command")]
use std::process::Stdio;
#[cfg(feature = "command")]
use tokio::process::Command as TokioCommand;

/// Programs that are explicitly allowed to be executed.
///
/// This allowlist ensures only known, safe programs can be invoked.
/// Adding new programs requires explicit code changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum AllowedProgram {
    /// The `wg` CLI, used to read interface/peer status (`wg show`).
    Wg,
    /// The `iptables` CLI, used to apply and inspect packet-filter rules.
    Iptables,
    /// The `iptables-save` CLI, used to snapshot rules for backup.
    IptablesSave,
    /// The `iptables-restore` CLI, used to roll back to a prior backup.
    IptablesRestore,
    /// The `ping` CLI, used for an optional reachability probe.
    Ping,
    /// The `conntrack` CLI, used for an optional connection-tracking probe.
    Conntrack,
}

impl AllowedProgram {
    /// Get the program name/path to execute.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wg => "wg",
            Self::Iptables => "iptables",
            Self::IptablesSave => "iptables-save",
            Self::IptablesRestore => "iptables-restore",
            Self::Ping => "ping",
            Self::Conntrack => "conntrack",
        }
    }

    /// Get a custom path override for this program, if any.
    ///
    /// Returns `None` for the default program name.
    #[must_use]
    pub fn custom_path(&self, path: &str) -> Result<String, CommandError> {
        // Validate the custom path
        validate_program_path(path)?;
        Ok(path.to_string())
    }
}

impl fmt::Display for AllowedProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur during safe command execution.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Validation of a command argument failed.
    #[error("argument validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    /// The command execution failed.
    #[error("command execution failed: {message}")]
    ExecutionFailed {
        /// Description of the failure.
        message: String,
    },

    /// The command returned a non-zero exit code.
    #[error("command '{command}' exited with code {exit_code}: {stderr}")]
    NonZeroExit {
        /// The command that was executed.
        command: String,
        /// The exit code.
        exit_code: i32,
        /// Standard error output.
        stderr: String,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CommandError {
    /// Create an execution failed error.
    #[must_use]
    pub fn execution_failed(message: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            message: message.into(),
        }
    }

    /// Create a non-zero exit error.
    #[must_use]
    pub fn non_zero_exit(command: impl Into<String>, exit_code: i32, stderr: impl Into<String>) -> Self {
        Self::NonZeroExit {
            command: command.into(),
            exit_code,
            stderr: stderr.into(),
        }
    }

    /// Check if this is a validation error.
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(self, Self::ValidationFailed(_))
    }

    /// Check if this is a security-related validation error.
    #[must_use]
    pub fn is_security_error(&self) -> bool {
        match self {
            Self::ValidationFailed(e) => e.is_security_error(),
            _ => false,
        }
    }
}

/// Characters that are never allowed in command arguments.
const FORBIDDEN_CHARS: &[char] = &[
    '\0',  // Null byte
    '\n',  // Newline (can break argument parsing)
    '\r',  // Carriage return
];

/// Characters that are suspicious and logged as warnings.
const SUSPICIOUS_CHARS: &[char] = &[
    ';', '&', '|', '$', '`', '(', ')', '{', '}', '[', ']', '<', '>', '!', '\\',
];

/// Validate a command argument.
///
/// # Errors
///
/// Returns an error if the argument contains forbidden characters.
pub fn validate_argument(arg: &str, field_name: &str) -> Result<(), ValidationError> {
    // Check for null bytes and control characters
    for c in arg.chars() {
        if FORBIDDEN_CHARS.contains(&c) {
            return Err(ValidationError::shell_injection(field_name, c));
        }
    }

    Ok(())
}

/// Validate a program path.
///
/// # Errors
///
/// Returns an error if the path contains dangerous patterns.
pub fn validate_program_path(path: &str) -> Result<(), ValidationError> {
    if path.is_empty() {
        return Err(ValidationError::empty("program_path"));
    }

    // Check for path traversal
    if path.contains("..") {
        return Err(ValidationError::path_traversal("program_path", ".."));
    }

    // Check for forbidden characters
    for c in path.chars() {
        if FORBIDDEN_CHARS.contains(&c) || matches!(c, ';' | '&' | '|' | '$' | '`') {
            return Err(ValidationError::shell_injection("program_path", c));
        }
    }

    Ok(())
}

/// Output from a successful command execution.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Standard output.
    pub stdout: Vec<u8>,
    /// Standard error.
    pub stderr: Vec<u8>,
    /// Exit status code (0 for success).
    pub exit_code: i32,
}

impl CommandOutput {
    /// Get stdout as a UTF-8 string, replacing invalid characters.
    #[must_use]
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Get stderr as a UTF-8 string, replacing invalid characters.
    #[must_use]
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Check if the command succeeded (exit code 0).
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A safe command builder that validates all inputs.
///
/// This builder ensures:
/// - Only allowlisted programs can be executed
/// - All arguments are validated before execution
/// - No shell is invoked (arguments are passed directly)
///
/// # Example
///
/// ```rust,no_run
/// # #[cfg(feature = "command")]
/// # async fn example() -> Result<(), wgctl_validation::command::CommandError> {
/// use wgctl_validation::command::{SafeCommand, AllowedProgram};
///
/// let output = SafeCommand::new(AllowedProgram::Iptables)
///     .args(&["-t", "filter", "-L", "FORWARD", "-n"])
///     .execute()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SafeCommand {
    program: AllowedProgram,
    program_path: Option<String>,
    args: Vec<String>,
    validation_errors: Vec<ValidationError>,
    env_vars: Vec<(String, String)>,
    current_dir: Option<String>,
    stdin: Option<String>,
}

impl SafeCommand {
    /// Create a new safe command for the given program.
    #[must_use]
    pub fn new(program: AllowedProgram) -> Self {
        Self {
            program,
            program_path: None,
            args: Vec::new(),
            validation_errors: Vec::new(),
            env_vars: Vec::new(),
            current_dir: None,
            stdin: None,
        }
    }

    /// Feed `text` to the command's standard input.
    ///
    /// Used by callers that pipe a generated ruleset into a restore tool
    /// rather than passing it as an argument.
    #[must_use]
    pub fn stdin(mut self, text: impl Into<String>) -> Self {
        self.stdin = Some(text.into());
        self
    }

    /// Use a custom path for the program instead of searching PATH.
    ///
    /// The path is validated for safety.
    #[must_use]
    pub fn with_program_path(mut self, path: &str) -> Self {
        match validate_program_path(path) {
            Ok(()) => self.program_path = Some(path.to_string()),
            Err(e) => self.validation_errors.push(e),
        }
        self
    }

    /// Add a single argument to the command.
    ///
    /// The argument is validated for safety.
    #[must_use]
    pub fn arg(mut self, arg: &str) -> Self {
        match validate_argument(arg, "argument") {
            Ok(()) => self.args.push(arg.to_string()),
            Err(e) => self.validation_errors.push(e),
        }
        self
    }

    /// Add multiple arguments to the command.
    ///
    /// Each argument is validated for safety.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            let arg = arg.as_ref();
            match validate_argument(arg, "argument") {
                Ok(()) => self.args.push(arg.to_string()),
                Err(e) => self.validation_errors.push(e),
            }
        }
        self
    }

    /// Set an environment variable for the command.
    ///
    /// Both key and value are validated.
    #[must_use]
    pub fn env(mut self, key: &str, value: &str) -> Self {
        // Validate key
        if let Err(e) = validate_argument(key, "env_key") {
            self.validation_errors.push(e);
            return self;
        }

        // Validate value
        if let Err(e) = validate_argument(value, "env_value") {
            self.validation_errors.push(e);
            return self;
        }

        self.env_vars.push((key.to_string(), value.to_string()));
        self
    }

    /// Set the working directory for the command.
    ///
    /// The directory path is validated.
    #[must_use]
    pub fn current_dir(mut self, dir: &str) -> Self {
        // Validate the directory path
        if dir.contains("..") {
            self.validation_errors.push(ValidationError::path_traversal("current_dir", ".."));
            return self;
        }

        if let Err(e) = validate_argument(dir, "current_dir") {
            self.validation_errors.push(e);
            return self;
        }

        self.current_dir = Some(dir.to_string());
        self
    }

    /// Check if there are any validation errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.validation_errors.is_empty()
    }

    /// Get any validation errors that occurred.
    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.validation_errors
    }

    /// Build the command description for logging.
    fn command_description(&self) -> String {
        let program = self.program_path.as_deref().unwrap_or(self.program.as_str());
        let args: Vec<_> = self.args.iter().map(|s| s.as_str()).collect();
        format!("{} {}", program, args.join(" "))
    }

    /// Spawns the process, writes `stdin` if set, and collects its output.
    #[cfg(feature = "command")]
    async fn run(&self) -> std::io::Result<std::process::Output> {
        use tokio::io::AsyncWriteExt;

        let program = self.program_path.as_deref().unwrap_or(self.program.as_str());

        let mut cmd = TokioCommand::new(program);
        cmd.args(&self.args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.stdin(if self.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }

        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn()?;

        if let Some(text) = &self.stdin {
            let mut stdin = child.stdin.take().expect("stdin was requested as piped");
            stdin.write_all(text.as_bytes()).await?;
            drop(stdin);
        }

        child.wait_with_output().await
    }

    /// Execute the command and return the output.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Validation errors were collected during building
    /// - The command fails to execute
    /// - The command returns a non-zero exit code
    #[cfg(feature = "command")]
    pub async fn execute(mut self) -> Result<CommandOutput, CommandError> {
        // Check for validation errors first
        if !self.validation_errors.is_empty() {
            let error = self.validation_errors.swap_remove(0);
            return Err(CommandError::ValidationFailed(error));
        }

        let description = self.command_description();
        let output = self.run().await?;

        let exit_code = output.status.code().unwrap_or(-1);

        if !output.status.success() {
            return Err(CommandError::non_zero_exit(
                description,
                exit_code,
                String::from_utf8_lossy(&output.stderr),
            ));
        }

        Ok(CommandOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code,
        })
    }

    /// Execute the command without checking the exit code.
    ///
    /// Use this when you want to handle non-zero exit codes yourself.
    ///
    /// # Errors
    ///
    /// Returns an error if validation failed or the command couldn't be executed.
    #[cfg(feature = "command")]
    pub async fn execute_unchecked(mut self) -> Result<CommandOutput, CommandError> {
        // Check for validation errors first
        if !self.validation_errors.is_empty() {
            let error = self.validation_errors.swap_remove(0);
            return Err(CommandError::ValidationFailed(error));
        }

        let output = self.run().await?;

        Ok(CommandOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

/// Registry of allowed programs for dynamic allowlisting.
///
/// This allows runtime configuration of which programs can be executed,
/// beyond the static `AllowedProgram` enum.
#[derive(Debug, Default)]
pub struct ProgramRegistry {
    allowed: HashSet<String>,
}

impl ProgramRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the default allowed programs.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.allow("wg");
        registry.allow("iptables");
        registry.allow("iptables-save");
        registry.allow("iptables-restore");
        registry.allow("ping");
        registry.allow("conntrack");
        registry
    }

    /// Allow a program to be executed.
    pub fn allow(&mut self, program: &str) {
        self.allowed.insert(program.to_string());
    }

    /// Disallow a program.
    pub fn disallow(&mut self, program: &str) {
        self.allowed.remove(program);
    }

    /// Check if a program is allowed.
    #[must_use]
    pub fn is_allowed(&self, program: &str) -> bool {
        self.allowed.contains(program)
    }
}
