use alloy_primitives::{Address, aliases::U256};
use anyhow::{Context, Result};
use clap::Parser;
use hoptrace::classifier::{RiskLabel, StaticClassifier, screen_transfers};
use hoptrace::data_sources::CsvTransferSource;
use hoptrace::sinks::{FindingSink, JsonLinesSink, TextLogSink, VecSink};
use hoptrace::summary::HopSummary;
use hoptrace::tracer::{FailurePolicy, HopTracer, TraceConfig};
use hoptrace::types::{Fraction, Transfer};
use std::str::FromStr;
use tracing::{info, warn};

#[derive(Parser, Debug)]
struct Args {
    /// Seed address to trace outward from
    #[arg(short, long)]
    seed: String,
    /// Amount that funded the seed, in raw token units
    #[arg(short = 'a', long)]
    seed_amount: String,
    /// Minimum fraction of a hop's funding a transfer must carry
    #[arg(short = 'f', long, default_value = "0.3")]
    min_fraction: f64,
    #[arg(short = 'd', long, default_value = "3")]
    max_depth: usize,
    /// CSV of transfers: sender, receiver, amount, tx_hash, timestamp
    #[arg(short, long)]
    transfers: String,
    /// Keep walking past addresses the source fails on instead of aborting
    #[arg(long, default_value = "false")]
    skip_on_source_error: bool,
    /// Write findings as JSON lines to this path
    #[arg(long)]
    json_out: Option<String>,
    /// Write findings as text rows to this path
    #[arg(long)]
    log_out: Option<String>,
    #[arg(long, value_delimiter = ',')]
    hacker_addresses: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    mixer_addresses: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    scam_addresses: Vec<String>,
}

fn parse_addresses(raw: &[String]) -> Result<Vec<Address>> {
    raw.iter()
        .map(|addr| Address::from_str(addr).with_context(|| format!("Invalid address: {addr}")))
        .collect()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    info!("Starting hoptrace");
    let args = Args::parse();
    let seed: Address = Address::from_str(&args.seed)?;
    let seed_amount: U256 = U256::from_str(&args.seed_amount)
        .with_context(|| format!("Invalid seed amount: {}", args.seed_amount))?;
    info!("Seed address: {seed}, funded with {seed_amount}");

    let config = TraceConfig {
        max_depth: args.max_depth,
        min_fraction: Fraction::new(args.min_fraction)?,
        on_source_error: if args.skip_on_source_error {
            FailurePolicy::SkipSubtree
        } else {
            FailurePolicy::Abort
        },
    };
    let tracer = HopTracer::new(config)?;

    info!("Loading transfers from {}", args.transfers);
    let source = CsvTransferSource::from_csv_path(&args.transfers)?;

    info!("Tracing hops");
    let mut sink = VecSink::new();
    let stats = tracer.trace(seed, seed_amount, &source, &mut sink)?;
    let findings = sink.into_findings();

    info!(
        "Visited {} addresses, saw {} transfers, emitted {} findings",
        stats.addresses_visited, stats.transfers_seen, stats.findings_emitted
    );
    for (address, reason) in &stats.skipped {
        warn!("Source failed for {address}, subtree skipped: {reason}");
    }

    if let Some(path) = &args.json_out {
        let mut json_sink = JsonLinesSink::create(path)?;
        for finding in &findings {
            json_sink.record(finding.clone())?;
        }
        info!("Findings written to {path}");
    }

    if let Some(path) = &args.log_out {
        let mut log_sink = TextLogSink::create(path)?;
        for finding in &findings {
            log_sink.record(finding.clone())?;
        }
        info!("Findings logged to {path}");
    }

    let classifier = StaticClassifier::new()
        .with_labelled(RiskLabel::Hacker, parse_addresses(&args.hacker_addresses)?)
        .with_labelled(RiskLabel::Mixer, parse_addresses(&args.mixer_addresses)?)
        .with_labelled(RiskLabel::Scam, parse_addresses(&args.scam_addresses)?);

    if !classifier.is_empty() {
        let transfers: Vec<Transfer> = findings
            .iter()
            .map(|finding| finding.transfer.clone())
            .collect();
        let flagged = screen_transfers(&transfers, &classifier);

        for hit in &flagged {
            warn!(
                "Traced value touched {} address {} in tx {}",
                hit.label, hit.counterparty, hit.transfer.tx_hash
            );
        }
        if flagged.is_empty() {
            info!("No traced transfer touches a labelled address");
        }
    }

    let summary = HopSummary::from_findings(&findings);
    print!("{summary}");

    Ok(())
}
