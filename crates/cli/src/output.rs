// SPDX-License-Identifier: MIT

//! Shared text/JSON rendering for command output, centralizing the
//! `OutputFormat` switch so each command doesn't reimplement it.

use clap::ValueEnum;
use serde::Serialize;

use zallet_wire::ServiceSummary;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

pub fn print_services(services: &[ServiceSummary], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(services),
        OutputFormat::Text => {
            if services.is_empty() {
                println!("No services found");
                return;
            }
            println!("{:<34} {:<12} {:<10} {:<10} {:<8} {}", "SERVICE ID", "APP", "ENV", "STATUS", "PID", "HOST");
            for svc in services {
                println!(
                    "{:<34} {:<12} {:<10} {:<10} {:<8} {}",
                    svc.service_id,
                    svc.app,
                    svc.env,
                    svc.service_status,
                    svc.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
                    svc.agent_host.as_deref().unwrap_or("-"),
                );
            }
        }
    }
}

pub fn print_daemon_status(uptime_secs: u64, service_count: usize, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            print_json(&serde_json::json!({ "uptime_secs": uptime_secs, "service_count": service_count }));
        }
        OutputFormat::Text => {
            println!("uptime: {}s, services: {}", uptime_secs, service_count);
        }
    }
}

pub fn print_message(message: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({ "message": message })),
        OutputFormat::Text => println!("{message}"),
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(err) => eprintln!("failed to encode json: {err}"),
    }
}
