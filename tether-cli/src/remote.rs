//! Commands that talk to a live agent: ping, numbers, histogram.

use std::io::{Read, Write};

use anyhow::{Context, Result};
use tether::{Client, WireConfig};
use tether_proto::HeapHistogram;
use tracing::info;

use crate::OutputFormat;

/// Where the agent listens.
#[derive(clap::Args)]
pub struct Target {
    /// Agent address (`host:port`), or a socket path with `--unix`.
    pub addr: String,

    /// Treat the address as a Unix socket path.
    #[arg(long)]
    pub unix: bool,
}

/// One request to run against the agent.
pub enum Query {
    Ping { vm: bool },
    Numbers { format: OutputFormat },
    Histogram { top: usize, format: OutputFormat },
}

/// Connects to `target` and runs `query`. The connection is dropped
/// afterwards without detaching, so the agent keeps serving other controllers.
pub fn run(target: &Target, config: WireConfig, query: Query) -> Result<()> {
    if target.unix {
        return run_unix(target, config, query);
    }
    let mut client = Client::connect(target.addr.as_str(), config)
        .with_context(|| format!("connecting to {}", target.addr))?;
    execute(&mut client, query)
}

#[cfg(unix)]
fn run_unix(target: &Target, config: WireConfig, query: Query) -> Result<()> {
    let mut client = Client::connect_unix(&target.addr, config)
        .with_context(|| format!("connecting to {}", target.addr))?;
    execute(&mut client, query)
}

#[cfg(not(unix))]
fn run_unix(_target: &Target, _config: WireConfig, _query: Query) -> Result<()> {
    anyhow::bail!("Unix sockets require Linux or macOS")
}

fn execute<R: Read, W: Write>(client: &mut Client<R, W>, query: Query) -> Result<()> {
    match query {
        Query::Ping { vm } => ping(client, vm),
        Query::Numbers { format } => numbers(client, format),
        Query::Histogram { top, format } => histogram(client, top, format),
    }?;
    if client.integrity_faults() > 0 {
        eprintln!(
            "warning: {} compressed section(s) failed the integrity check",
            client.integrity_faults()
        );
    }
    Ok(())
}

fn ping<R: Read, W: Write>(client: &mut Client<R, W>, vm: bool) -> Result<()> {
    client.check_connection()?;
    info!("agent answered");
    if !vm {
        println!("ok");
        return Ok(());
    }
    let props = client.vm_properties()?;
    println!("jdk:        {}", props.jdk_version);
    println!("os:         {}", props.target_os);
    println!("command:    {}", props.java_command);
    println!("cwd:        {}", props.working_dir);
    println!("max heap:   {}", human_size(props.max_heap_size));
    println!("pid:        {}", props.agent_id);
    println!("agent:      v{}", props.agent_version);
    Ok(())
}

fn numbers<R: Read, W: Write>(client: &mut Client<R, W>, format: OutputFormat) -> Result<()> {
    let numbers = client.monitored_numbers()?;
    if matches!(format, OutputFormat::Json) {
        println!("{}", serde_json::to_string_pretty(&numbers)?);
        return Ok(());
    }

    let g = numbers.general;
    println!("heap used:      {}", human_size(g.used_memory()));
    println!("heap committed: {}", human_size(g.total_memory));
    println!("threads:        {} user, {} system", g.user_threads, g.system_threads);
    println!("classes:        {}", g.loaded_classes);
    println!("gc time:        {}.{}%", g.gc_time / 10, g.gc_time % 10);
    println!("gc pause:       {} ms", g.gc_pause);
    println!("generations:    {}", g.surviving_generations);
    if !numbers.new_threads.is_empty() {
        println!("new threads:");
        for t in &numbers.new_threads {
            println!("  {:>6}  {}", t.id, t.name);
        }
    }
    Ok(())
}

fn histogram<R: Read, W: Write>(
    client: &mut Client<R, W>,
    top: usize,
    format: OutputFormat,
) -> Result<()> {
    let histogram = client.heap_histogram()?;
    let rows = top_rows(&histogram, top);

    if matches!(format, OutputFormat::Json) {
        let rows: Vec<_> = rows
            .iter()
            .map(|(name, r)| {
                serde_json::json!({
                    "class": name,
                    "class_id": r.class_id,
                    "instances": r.instances,
                    "bytes": r.bytes,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{:>12} {:>12}  CLASS", "INSTANCES", "BYTES");
    for (name, r) in &rows {
        println!("{:>12} {:>12}  {name}", r.instances, human_size(r.bytes));
    }
    println!(
        "{:>12} {:>12}  (all classes)",
        histogram.total_instances(),
        human_size(histogram.total_bytes())
    );
    Ok(())
}

/// The `top` rows by live bytes, paired with their class names when the
/// histogram announced them.
fn top_rows(histogram: &HeapHistogram, top: usize) -> Vec<(String, tether_proto::HistogramRow)> {
    let mut rows = histogram.rows.clone();
    rows.sort_by(|a, b| b.bytes.cmp(&a.bytes));
    rows.truncate(top);
    rows.into_iter()
        .map(|r| {
            let name = histogram
                .new_classes
                .iter()
                .find(|c| c.id == r.class_id)
                .map_or_else(|| format!("#{}", r.class_id), |c| c.name.clone());
            (name, r)
        })
        .collect()
}

/// Formats bytes into a human-readable size string.
#[allow(clippy::cast_precision_loss)]
fn human_size(bytes: i64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    for unit in UNITS {
        if size.abs() < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} TB")
}
