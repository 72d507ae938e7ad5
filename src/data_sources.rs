use crate::types::Transfer;
use alloy_primitives::{
    Address, B256,
    aliases::U256,
};
use anyhow::{Context, Result};
use polars::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// TransferSource
///
/// A generic trait across different transfer sources.
///
/// An address with no recorded activity is an empty list, not an error.
/// The returned order is the source's own order and is never re-sorted by
/// the tracer.
pub trait TransferSource {
    fn list_outgoing(&self, address: &Address) -> Result<Vec<Transfer>>;
}

/// MemoryTransferSource
///
/// An in-memory source backed by a map of sender to outgoing transfers.
/// Insertion order per sender is preserved. Mostly useful for tests and
/// for callers that already fetched their transfers some other way.
#[derive(Debug, Default)]
pub struct MemoryTransferSource {
    outgoing: HashMap<Address, Vec<Transfer>>,
}

impl MemoryTransferSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, transfer: Transfer) {
        self.outgoing
            .entry(transfer.sender)
            .or_default()
            .push(transfer);
    }
}

impl TransferSource for MemoryTransferSource {
    fn list_outgoing(&self, address: &Address) -> Result<Vec<Transfer>> {
        Ok(self.outgoing.get(address).cloned().unwrap_or_default())
    }
}

/// CsvTransferSource
///
/// A source that wraps a polars DataFrame of transfers.
///
/// Each row of the DataFrame should be a single transfer, and it should
/// have the following columns:
/// - `sender` (0x-prefixed address string)
/// - `receiver` (0x-prefixed address string)
/// - `amount` (raw integer amount as a string)
/// - `tx_hash` (0x-prefixed 32-byte hash string)
/// - `timestamp` (unix seconds, u64)
///
pub struct CsvTransferSource {
    pub transfers: DataFrame,
}

impl CsvTransferSource {
    pub fn new(transfers: DataFrame) -> Self {
        Self { transfers }
    }

    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        // Schema overrides; can't use the default i64 inference for raw
        // token amounts
        let schema_changes = Schema::from_iter(vec![
            Field::new("sender".into(), DataType::String),
            Field::new("receiver".into(), DataType::String),
            Field::new("amount".into(), DataType::String),
            Field::new("tx_hash".into(), DataType::String),
            Field::new("timestamp".into(), DataType::UInt64),
        ]);

        let transfers = CsvReadOptions::default()
            .with_has_header(true)
            .with_schema_overwrite(Some(Arc::new(schema_changes)))
            .try_into_reader_with_file_path(Some(path.as_ref().to_path_buf()))?
            .finish()
            .with_context(|| {
                format!("Failed to read transfers from {}", path.as_ref().display())
            })?;

        Ok(Self::new(transfers))
    }
}

impl TransferSource for CsvTransferSource {
    fn list_outgoing(&self, address: &Address) -> Result<Vec<Transfer>> {
        let addr_hex = format!("{address:#x}");

        let outgoing = self
            .transfers
            .clone()
            .lazy()
            .filter(col("sender").eq(lit(addr_hex)))
            .collect()?;

        debug!("outgoing.height(): {}", outgoing.height());

        let mut transfers = Vec::with_capacity(outgoing.height());

        let col_sender = outgoing.column("sender")?.str()?;
        let col_receiver = outgoing.column("receiver")?.str()?;
        let col_amount = outgoing.column("amount")?.str()?;
        let col_tx_hash = outgoing.column("tx_hash")?.str()?;
        let col_timestamp = outgoing.column("timestamp")?.u64()?;

        for row in 0..outgoing.height() {
            let transfer = Transfer::new(
                Address::from_str(
                    col_sender
                        .get(row)
                        .with_context(|| format!("Failed to get sender for {}", row))?,
                )?,
                Address::from_str(
                    col_receiver
                        .get(row)
                        .with_context(|| format!("Failed to get receiver for {}", row))?,
                )?,
                U256::from_str(
                    col_amount
                        .get(row)
                        .with_context(|| format!("Failed to get amount for {}", row))?,
                )?,
                B256::from_str(
                    col_tx_hash
                        .get(row)
                        .with_context(|| format!("Failed to get tx_hash for {}", row))?,
                )?,
                col_timestamp
                    .get(row)
                    .with_context(|| format!("Failed to get timestamp for {}", row))?,
            );
            transfers.push(transfer);
        }

        Ok(transfers)
    }
}
