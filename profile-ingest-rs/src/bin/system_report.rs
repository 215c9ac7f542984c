use std::fs;

use serde::Serialize;

/// One-shot dump of host facts to stdout, for operational health checks.
/// Reads /proc, prints JSON, exits; nothing feeds back into the pipeline.

#[derive(Serialize)]
struct SystemReport {
    service_version: &'static str,
    hostname: Option<String>,
    kernel: Option<String>,
    cpu_model: Option<String>,
    cpu_count: Option<usize>,
    mem_total_kb: Option<u64>,
    mem_available_kb: Option<u64>,
    load_average: Option<String>,
    uptime_secs: Option<u64>,
}

fn read_trimmed(path: &str) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

fn meminfo_field(meminfo: &str, field: &str) -> Option<u64> {
    meminfo
        .lines()
        .find(|line| line.starts_with(field))?
        .split_whitespace()
        .nth(1)?
        .parse()
        .ok()
}

fn cpu_model() -> Option<String> {
    fs::read_to_string("/proc/cpuinfo")
        .ok()?
        .lines()
        .find(|line| line.starts_with("model name"))?
        .split(':')
        .nth(1)
        .map(|s| s.trim().to_string())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let meminfo = fs::read_to_string("/proc/meminfo").unwrap_or_default();

    let report = SystemReport {
        service_version: env!("CARGO_PKG_VERSION"),
        hostname: read_trimmed("/proc/sys/kernel/hostname"),
        kernel: read_trimmed("/proc/version"),
        cpu_model: cpu_model(),
        cpu_count: std::thread::available_parallelism().ok().map(|n| n.get()),
        mem_total_kb: meminfo_field(&meminfo, "MemTotal:"),
        mem_available_kb: meminfo_field(&meminfo, "MemAvailable:"),
        load_average: read_trimmed("/proc/loadavg"),
        uptime_secs: read_trimmed("/proc/uptime")
            .and_then(|s| s.split_whitespace().next().map(str::to_string))
            .and_then(|s| s.parse::<f64>().ok())
            .map(|secs| secs as u64),
    };

    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
