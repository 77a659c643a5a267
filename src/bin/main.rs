// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use wallet_ledger_rs::{
    Currency, LedgerEngine, SellerId, TransactionCategory, TxContext, WalletId,
};

/// Wallet Ledger - Process ledger operation CSV files
///
/// Reads ledger operations from a CSV file and outputs wallet balance
/// snapshots to stdout. Supports credits, debits, reserves, releases, and
/// pending-balance clearance.
#[derive(Parser, Debug)]
#[command(name = "wallet-ledger-rs")]
#[command(about = "A wallet ledger that processes operation CSVs", long_about = None)]
struct Args {
    /// Path to CSV file with ledger operations
    ///
    /// Expected format: op,seller,amount,category
    /// Example: cargo run -- operations.csv > wallets.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Currency for wallets opened while processing
    #[arg(long, default_value = "INR")]
    currency: String,
}

fn main() {
    // Parse command line arguments
    let args = Args::parse();

    // Open input file
    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    // Process operations from CSV
    let currency = Currency::new(&args.currency);
    let engine = match process_operations(BufReader::new(file), currency) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error processing operations: {}", e);
            process::exit(1);
        }
    };

    // Write results to stdout
    if let Err(e) = write_wallets(&engine, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `op, seller, amount, category`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    op: String,
    seller: u32,
    #[serde(deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
    #[serde(default)]
    category: Option<String>,
}

/// Parsed ledger operation.
#[derive(Debug)]
enum LedgerOp {
    Credit(TransactionCategory),
    Debit(TransactionCategory),
    Reserve,
    Release,
    MovePending,
}

impl CsvRecord {
    /// Converts a CSV record into an operation plus its amount.
    ///
    /// Returns `None` for unknown operations or missing amounts.
    fn into_operation(self) -> Option<(SellerId, LedgerOp, Decimal)> {
        let seller = SellerId(self.seller);
        let amount = self.amount?;
        let category = self.category.as_deref().and_then(parse_category);

        let op = match self.op.to_lowercase().as_str() {
            "credit" => LedgerOp::Credit(category.unwrap_or(TransactionCategory::Sale)),
            "debit" => LedgerOp::Debit(category.unwrap_or(TransactionCategory::Manual)),
            "reserve" => LedgerOp::Reserve,
            "release" => LedgerOp::Release,
            "move_pending" => LedgerOp::MovePending,
            _ => return None,
        };
        Some((seller, op, amount))
    }
}

fn parse_category(raw: &str) -> Option<TransactionCategory> {
    match raw.to_lowercase().as_str() {
        "sale" => Some(TransactionCategory::Sale),
        "refund" => Some(TransactionCategory::Refund),
        "adjustment" => Some(TransactionCategory::Adjustment),
        "settlement" => Some(TransactionCategory::Settlement),
        "fee" => Some(TransactionCategory::Fee),
        "manual" => Some(TransactionCategory::Manual),
        _ => None,
    }
}

/// Process ledger operations from a CSV reader.
///
/// Streaming parse, so arbitrarily large files never load fully into memory.
/// Wallets are opened on first use with the given currency. Malformed rows
/// and rejected operations are skipped.
///
/// # CSV Format
///
/// Expected columns: `op, seller, amount, category`
/// - `op`: credit, debit, reserve, release, move_pending
/// - `seller`: Seller ID (u32)
/// - `amount`: Decimal amount
/// - `category`: sale, refund, adjustment, settlement, fee, manual (optional)
///
/// # Example
///
/// ```csv
/// op,seller,amount,category
/// credit,1,100.00,sale
/// move_pending,1,100.00,
/// reserve,1,40.00,
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
/// Individual operation errors are logged in debug mode but don't stop
/// processing.
pub fn process_operations<R: Read>(
    reader: R,
    currency: Currency,
) -> Result<LedgerEngine, csv::Error> {
    let engine = LedgerEngine::new();

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All) // Handle whitespace in fields like " credit "
        .flexible(true) // Allow missing category field
        .has_headers(true) // Skip first row as header
        .from_reader(reader);

    for result in rdr.deserialize::<CsvRecord>() {
        match result {
            Ok(record) => {
                let Some((seller, op, amount)) = record.into_operation() else {
                    #[cfg(debug_assertions)]
                    eprintln!("Skipping invalid operation record");
                    continue;
                };

                let wallet_id = match wallet_for(&engine, seller, &currency) {
                    Some(id) => id,
                    None => continue,
                };

                let outcome = match op {
                    LedgerOp::Credit(category) => {
                        engine.credit(wallet_id, amount, category, TxContext::default())
                    }
                    LedgerOp::Debit(category) => {
                        engine.debit(wallet_id, amount, category, TxContext::default())
                    }
                    LedgerOp::Reserve => engine.reserve(wallet_id, amount, TxContext::default()),
                    LedgerOp::Release => {
                        engine.release_reserve(wallet_id, amount, TxContext::default())
                    }
                    LedgerOp::MovePending => {
                        engine.move_pending_to_available(wallet_id, amount, TxContext::default())
                    }
                };

                // Rejected operations don't stop the run (silent failure)
                if let Err(_e) = outcome {
                    #[cfg(debug_assertions)]
                    eprintln!("Skipping operation for seller {}: {}", seller, _e);
                }
            }
            Err(_e) => {
                // Skip malformed rows
                #[cfg(debug_assertions)]
                eprintln!("Skipping malformed row: {}", _e);
                continue;
            }
        }
    }

    Ok(engine)
}

/// Returns the seller's wallet ID, opening a wallet on first use.
fn wallet_for(engine: &LedgerEngine, seller: SellerId, currency: &Currency) -> Option<WalletId> {
    if let Some(wallet) = engine.wallet_for_seller(seller) {
        return Some(wallet.wallet_id());
    }
    match engine.open_wallet(seller, currency.clone()) {
        Ok(wallet) => Some(wallet.wallet_id()),
        // Lost a race with another opener; the wallet exists now.
        Err(_) => engine.wallet_for_seller(seller).map(|w| w.wallet_id()),
    }
}

/// Write wallet snapshots to a CSV writer
///
/// Outputs all wallets in CSV format with 2 decimal precision.
///
/// # CSV Format
///
/// Columns: `seller, currency, available, pending, reserved, total,
/// last_settlement_amount`
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_wallets<W: Write>(engine: &LedgerEngine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    // Serialize each wallet snapshot row
    for wallet in engine.wallets() {
        wtr.serialize(&*wallet)?;
    }

    // Flush to ensure all data is written
    wtr.flush()?;
    Ok(())
}
