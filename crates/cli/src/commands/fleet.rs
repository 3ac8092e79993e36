//! Fleet composition view

use anyhow::Result;
use colored::Colorize;
use kube::Client;
use operator_lib::bootstrap::KubeCrdRegistry;
use operator_lib::discovery::KubeWorkerDiscovery;
use operator_lib::fleet::{fleet_report, FleetReport};
use tabled::Tabled;

use crate::output::{color_status, print_info, print_json, print_table, print_warning, OutputFormat};

#[derive(Debug, Tabled)]
struct FleetRow {
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Phase")]
    phase: String,
    #[tabled(rename = "Address")]
    address: String,
}

fn fleet_rows(report: &FleetReport) -> Vec<FleetRow> {
    report
        .roles
        .iter()
        .flat_map(|role| {
            role.pods.iter().map(move |pod| FleetRow {
                role: role.role.as_str().to_string(),
                namespace: pod.namespace.clone(),
                name: pod.name.clone(),
                phase: pod.phase.clone(),
                address: pod.address.clone().unwrap_or_else(|| "-".to_string()),
            })
        })
        .collect()
}

/// `kptctl fleet`
pub async fn show_fleet(client: Client, format: OutputFormat) -> Result<()> {
    let crds = KubeCrdRegistry::new(client.clone());
    let discovery = KubeWorkerDiscovery::new(client);
    let report = fleet_report(&discovery, &crds).await;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            println!("{}", "KPT Fleet".bold());
            match &report.crds.error {
                Some(error) => print_warning(&format!("CRDs: lookup failed: {}", error)),
                None if report.crds.names.is_empty() => print_warning("CRDs: none found"),
                None => {
                    for name in &report.crds.names {
                        print_info(&format!("Found CRD: {}", name));
                    }
                }
            }
            for role in &report.roles {
                match &role.error {
                    Some(error) => print_warning(&format!(
                        "{}: lookup failed: {}",
                        role.role.as_str(),
                        error
                    )),
                    None => print_info(&format!("{}: {} pod(s)", role.role.as_str(), role.pods.len())),
                }
            }
            println!();

            let rows: Vec<FleetRow> = fleet_rows(&report)
                .into_iter()
                .map(|row| FleetRow {
                    phase: color_status(&row.phase),
                    ..row
                })
                .collect();
            print_table(&rows);
        }
    }

    Ok(())
}
