//! Archive upload command

use anyhow::Result;
use colored::Colorize;
use std::path::Path;
use tabled::Tabled;

use crate::client::{ApiClient, ChartOutcome, DeployReport};
use crate::output::{
    color_status, first_line, format_score, print_json, print_success, print_warning,
    OutputFormat,
};

/// Row for the deployment report table
#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Chart")]
    chart: String,
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Workload")]
    workload: String,
    #[tabled(rename = "Replicas")]
    replicas: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

impl From<&ChartOutcome> for OutcomeRow {
    fn from(outcome: &ChartOutcome) -> Self {
        let (workload, replicas, cpu, memory) = match &outcome.features {
            Some(f) => (
                f.workload_type.clone(),
                f.replica_count.to_string(),
                f.cpu_limit.to_string(),
                f.memory_limit.to_string(),
            ),
            None => ("-".into(), "-".into(), "-".into(), "-".into()),
        };
        let detail = outcome
            .error
            .as_deref()
            .or(outcome.log.as_deref())
            .map(|text| first_line(text, 60))
            .unwrap_or_default();

        Self {
            chart: outcome.chart.clone(),
            path: outcome.chart_path.clone(),
            status: color_status(&outcome.status),
            workload,
            replicas,
            cpu,
            memory,
            score: format_score(outcome.score),
            detail,
        }
    }
}

fn count(report: &DeployReport, status: &str) -> usize {
    report
        .deployments
        .iter()
        .filter(|o| o.status == status)
        .count()
}

/// Upload an archive and print one row per discovered chart
pub async fn deploy(client: &ApiClient, archive: &Path, format: OutputFormat) -> Result<()> {
    let report = client.deploy(archive).await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            println!("{} {}", "Deployment report for".bold(), archive.display());
            println!();

            if report.deployments.is_empty() {
                print_warning("No charts found in archive");
                return Ok(());
            }

            let rows: Vec<OutcomeRow> = report.deployments.iter().map(OutcomeRow::from).collect();
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!();

            let deployed = count(&report, "deployed");
            let skipped = count(&report, "skipped_anomalous");
            let failed = report.deployments.len() - deployed - skipped;
            let summary = format!(
                "{} deployed, {} skipped as anomalous, {} failed",
                deployed, skipped, failed
            );
            if failed == 0 {
                print_success(&summary);
            } else {
                print_warning(&summary);
            }
        }
    }

    Ok(())
}
