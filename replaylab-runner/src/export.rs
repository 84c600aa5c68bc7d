//! Export — JSON and CSV artifacts for finished runs.
//!
//! Every artifact of a run shares a study name prefix:
//! `<strategy>-<exchange>-<symbol>-<timeframe>[-and-N-more]-<start>-<finish>`,
//! built from the first route. Files written by [`save_artifacts`]:
//! - `<study>-report.json` — the full [`BacktestReport`]
//! - `<study>-trades.csv` / `<study>-trades.json` — completed trades
//! - `<study>-daily-balances.json` — end-of-day total balance series

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use replaylab_core::domain::CompletedTrade;

use crate::config::BacktestConfig;
use crate::runner::{BacktestReport, SCHEMA_VERSION};

/// Study name used as the file prefix of every artifact.
pub fn study_name(config: &BacktestConfig) -> String {
    let dates = format!("{}-{}", config.start_date, config.finish_date);
    let Some(first) = config.routes.first() else {
        return format!("empty-{dates}");
    };
    let more = match config.routes.len() - 1 {
        0 => String::new(),
        n => format!("-and-{n}-more"),
    };
    format!(
        "{}-{}-{}-{}{more}-{dates}",
        first.strategy, first.exchange, first.symbol, first.timeframe
    )
}

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json(report: &BacktestReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize BacktestReport to JSON")
}

/// Deserialize a `BacktestReport`, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<BacktestReport> {
    let report: BacktestReport =
        serde_json::from_str(json).context("failed to deserialize BacktestReport from JSON")?;
    if report.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(report)
}

pub fn export_trades_json(trades: &[CompletedTrade]) -> Result<String> {
    serde_json::to_string_pretty(trades).context("failed to serialize trades to JSON")
}

pub fn export_daily_balances_json(balances: &[f64]) -> Result<String> {
    serde_json::to_string_pretty(balances).context("failed to serialize daily balances to JSON")
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Export completed trades as CSV.
///
/// Columns: exchange, symbol, side, qty, entry_price, exit_price, opened_at,
/// closed_at, holding_minutes, pnl, fee, net_pnl, liquidated
pub fn export_trades_csv(trades: &[CompletedTrade]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "exchange",
        "symbol",
        "side",
        "qty",
        "entry_price",
        "exit_price",
        "opened_at",
        "closed_at",
        "holding_minutes",
        "pnl",
        "fee",
        "net_pnl",
        "liquidated",
    ])?;
    for t in trades {
        wtr.write_record([
            &t.exchange,
            &t.symbol,
            &format!("{:?}", t.side),
            &format!("{:.8}", t.qty),
            &format!("{:.6}", t.entry_price),
            &format!("{:.6}", t.exit_price),
            &t.opened_at.to_string(),
            &t.closed_at.to_string(),
            &t.holding_minutes().to_string(),
            &format!("{:.4}", t.pnl),
            &format!("{:.4}", t.fee),
            &format!("{:.4}", t.net_pnl()),
            &t.liquidated.to_string(),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for one run under `output_dir`.
///
/// Returns the path of the report JSON.
pub fn save_artifacts(report: &BacktestReport, output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create artifact dir: {}", output_dir.display()))?;
    let prefix = &report.study_name;

    let report_path = output_dir.join(format!("{prefix}-report.json"));
    write(&report_path, &export_json(report)?)?;
    write(
        &output_dir.join(format!("{prefix}-trades.csv")),
        &export_trades_csv(&report.result.trades)?,
    )?;
    write(
        &output_dir.join(format!("{prefix}-trades.json")),
        &export_trades_json(&report.result.trades)?,
    )?;
    write(
        &output_dir.join(format!("{prefix}-daily-balances.json")),
        &export_daily_balances_json(&report.result.daily_balances)?,
    )?;

    tracing::info!(dir = %output_dir.display(), study = %prefix, "artifacts saved");
    Ok(report_path)
}

/// Load a report written by [`save_artifacts`].
pub fn load_report(path: &Path) -> Result<BacktestReport> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}

fn write(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}
