#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use deepcheck_kernel_contracts::history::VerificationTimestamp;
use deepcheck_os::views::{sidebar_lines, signed_in_caption, CONFIDENCE_DISCLAIMER};
use deepcheck_os::{SessionContext, VerificationService};

#[derive(Debug, Parser)]
#[command(name = "deepcheck")]
#[command(about = "Verify images against the deepfake classifier and manage detection history")]
pub struct Cli {
    /// Overrides DEEPCHECK_DATA_DIR.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Create an account.
    Signup { username: String },
    /// Check credentials and warm the classifier up.
    Login { username: String },
    /// Classify one image and record the result.
    Verify { username: String, image: PathBuf },
    /// Show recent detections (or all of them with --all).
    History {
        username: String,
        #[arg(long)]
        all: bool,
    },
    /// Delete every detection recorded for the user.
    ClearHistory { username: String },
}

impl Command {
    /// Sign-up only touches the account store.
    pub fn needs_classifier(&self) -> bool {
        !matches!(self, Command::Signup { .. })
    }

    pub fn username(&self) -> &str {
        match self {
            Command::Signup { username }
            | Command::Login { username }
            | Command::Verify { username, .. }
            | Command::History { username, .. }
            | Command::ClearHistory { username } => username,
        }
    }
}

/// Runs one command in a fresh session and returns the text to print.
pub fn execute_command(
    service: &VerificationService,
    command: &Command,
    password: &str,
    now: VerificationTimestamp,
) -> Result<String, String> {
    let mut ctx = SessionContext::new();
    if let Command::Signup { username } = command {
        service
            .sign_up(&mut ctx, username, password)
            .map_err(|e| format!("sign-up failed: {e}"))?;
        service.log_out(&mut ctx).map_err(|e| e.to_string())?;
        return Ok(format!("account created: {username}"));
    }

    service
        .log_in(&mut ctx, command.username(), password)
        .map_err(|e| format!("login failed: {e}"))?;
    service
        .complete_loading(&mut ctx)
        .map_err(|e| format!("classifier not ready: {e}"))?;

    let output = match command {
        Command::Signup { username } | Command::Login { username } => {
            Ok(signed_in_caption(username))
        }
        Command::Verify { image, .. } => verify_file(service, &ctx, image, now),
        Command::History { all, .. } => {
            let records = if *all {
                let mut rows = service.history(&ctx).map_err(|e| e.to_string())?;
                rows.reverse();
                rows
            } else {
                service.recent_history(&ctx).map_err(|e| e.to_string())?
            };
            Ok(sidebar_lines(&records).join("\n"))
        }
        Command::ClearHistory { .. } => {
            let removed = service.clear_history(&ctx).map_err(|e| e.to_string())?;
            Ok(format!("removed {removed} detection(s)"))
        }
    };
    service.log_out(&mut ctx).map_err(|e| e.to_string())?;
    output
}

fn verify_file(
    service: &VerificationService,
    ctx: &SessionContext,
    image: &Path,
    now: VerificationTimestamp,
) -> Result<String, String> {
    let filename = image
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| format!("'{}' has no usable file name", image.display()))?;
    let bytes =
        fs::read(image).map_err(|e| format!("failed to read '{}': {e}", image.display()))?;
    let result = service
        .verify(ctx, filename, &bytes, now)
        .map_err(|e| format!("verification failed: {e}"))?;
    Ok(format!(
        "{}\n{}\n{}",
        result.prediction_line, result.confidence_line, CONFIDENCE_DISCLAIMER
    ))
}
