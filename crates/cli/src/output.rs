use crate::error::CliError;
use serde::Serialize;

fn report_json<T: Serialize>(report: &T) -> Result<String, CliError> {
    let json = serde_json::to_string_pretty(report)?;
    Ok(json)
}

pub async fn write_report<T: Serialize>(report: &T, path: String) -> Result<(), CliError> {
    let json = report_json(report)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

pub async fn print_report<T: Serialize>(report: &T) -> Result<(), CliError> {
    let json = report_json(report)?;
    println!("{json}");
    Ok(())
}

pub async fn emit<T: Serialize>(report: &T, output: Option<String>) -> Result<(), CliError> {
    match output {
        Some(path) => write_report(report, path).await,
        None => print_report(report).await,
    }
}
