//! Release management commands

use anyhow::Result;
use colored::Colorize;

use crate::client::{ApiClient, ReleaseResponse};
use crate::output::{color_status, print_json, print_success, OutputFormat};

pub async fn undeploy(client: &ApiClient, release: &str, format: OutputFormat) -> Result<()> {
    let response = client.undeploy(release).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            print_success(&format!("Release {} uninstalled", response.release.cyan()));
            print_log(&response);
        }
    }

    Ok(())
}

pub async fn status(client: &ApiClient, release: &str, format: OutputFormat) -> Result<()> {
    let response = client.status(release).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            println!("{}", "Release Status".bold());
            println!("{}", "=".repeat(40));
            println!("Release: {}", response.release.cyan());
            println!("Status:  {}", color_status(&response.status));

            if let Some(details) = &response.details {
                print_details(details);
            }
            print_log(&response);
        }
    }

    Ok(())
}

fn print_details(details: &serde_json::Value) {
    // helm's JSON carries the interesting bits under `info`
    let info = &details["info"];
    if let Some(state) = info["status"].as_str() {
        println!("Helm:    {}", state);
    }
    if let Some(revision) = details["version"].as_u64() {
        println!("Revision: {}", revision);
    }
    if let Some(namespace) = details["namespace"].as_str() {
        println!("Namespace: {}", namespace);
    }
    if let Some(deployed) = info["last_deployed"].as_str() {
        println!("Last deployed: {}", deployed);
    }
    if let Some(raw) = details.as_str() {
        println!();
        println!("{}", raw);
    }
}

fn print_log(response: &ReleaseResponse) {
    if let Some(log) = response.log.as_deref().filter(|l| !l.trim().is_empty()) {
        println!();
        println!("{}", log.trim_end().dimmed());
    }
}
