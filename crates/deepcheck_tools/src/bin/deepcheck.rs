#![forbid(unsafe_code)]

use std::io::{self, IsTerminal, Read};

use clap::Parser;
use deepcheck_kernel_contracts::history::VerificationTimestamp;
use deepcheck_os::{ClassifierSettings, VerificationService, WorkflowConfig};
use deepcheck_tools::cli::{execute_command, Cli};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

fn run() -> Result<(), String> {
    let cli = Cli::parse();
    let mut config = WorkflowConfig::from_env().map_err(|e| e.to_string())?;
    if let Some(dir) = cli.data_dir.clone() {
        config.data_dir = dir;
    }
    let settings = ClassifierSettings::from_env().map_err(|e| e.to_string())?;
    let classifier = if cli.command.needs_classifier() {
        settings.build_classifier()
    } else {
        settings.build_classifier_or_unconfigured()
    }
    .map_err(|e| e.to_string())?;
    let service = VerificationService::open_data_dir(config, classifier).map_err(|e| e.to_string())?;

    let password = read_password(cli.command.username())?;
    let output = execute_command(
        &service,
        &cli.command,
        &password,
        VerificationTimestamp::now_local(),
    )?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

fn read_password(username: &str) -> Result<String, String> {
    if io::stdin().is_terminal() {
        let prompt = format!("Password for {username}:");
        let value = rpassword::prompt_password(prompt).map_err(|e| e.to_string())?;
        if value.is_empty() {
            return Err("password must not be empty".to_string());
        }
        Ok(value)
    } else {
        let mut input = String::new();
        io::stdin()
            .read_to_string(&mut input)
            .map_err(|e| e.to_string())?;
        let value = input.trim_end_matches(['\r', '\n']).to_string();
        if value.is_empty() {
            return Err("password must not be empty".to_string());
        }
        Ok(value)
    }
}
