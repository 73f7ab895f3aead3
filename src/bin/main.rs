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
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use timebank::{
    Decision, MarketConfig, MarketError, Marketplace, NewService, RequestId, ServiceId,
    ServiceKind, UserId,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Time Bank - Replay marketplace command CSV files
///
/// Reads marketplace commands from a CSV file, applies them in order and
/// writes the final ledger to stdout. Failing commands are logged and skipped.
#[derive(Parser, Debug)]
#[command(name = "timebank")]
#[command(about = "A time-banking engine that replays marketplace command CSVs", long_about = None)]
struct Args {
    /// Path to CSV file with commands
    ///
    /// Expected format: op,actor,target,value,text
    /// Example: cargo run -- commands.csv > ledger.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Hours granted to every newly registered user
    #[arg(long, env = "TIMEBANK_STARTING_GRANT", default_value = "3.00", value_parser = parse_grant)]
    starting_grant: Decimal,
}

/// Parses a registration grant, refusing negative hours.
fn parse_grant(s: &str) -> Result<Decimal, String> {
    let grant: Decimal = s.trim().parse().map_err(|e| format!("`{s}` is not a number: {e}"))?;
    if grant < Decimal::ZERO {
        return Err(format!("starting grant cannot be negative: {grant}"));
    }
    Ok(grant)
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("timebank=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = match MarketConfig::default().with_starting_grant(args.starting_grant) {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {e}");
            process::exit(2);
        }
    };

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            error!(path = %args.input.display(), "error opening file: {e}");
            process::exit(1);
        }
    };

    let market = match process_commands(BufReader::new(file), config) {
        Ok(market) => market,
        Err(e) => {
            error!("error processing commands: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = write_ledger(&market, std::io::stdout()) {
        error!("error writing output: {e}");
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `op, actor, target, value, text`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    op: String,
    actor: u32,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    target: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    value: Option<Decimal>,
    #[serde(default)]
    text: Option<String>,
}

/// One marketplace command, validated from a [`CsvRecord`].
#[derive(Debug)]
enum Command {
    Register,
    Post {
        kind: ServiceKind,
        title: String,
        hours: Option<u32>,
    },
    Request {
        service: ServiceId,
        message: String,
    },
    Decide {
        request: RequestId,
        decision: Decision,
        note: Option<String>,
    },
    Cancel(RequestId),
    ApproveStart(RequestId),
    ProposeHours(RequestId, Decimal),
    ApproveHours(RequestId),
    Complete(RequestId),
    Adjust {
        user: UserId,
        hours: Decimal,
        description: String,
    },
}

impl CsvRecord {
    /// Converts the record to a [`Command`].
    ///
    /// Returns `None` for unknown ops or missing required fields.
    fn into_command(self) -> Option<Command> {
        let request = self.target.map(RequestId);
        let text = self.text.filter(|text| !text.is_empty());

        let command = match self.op.to_lowercase().as_str() {
            "register" => Command::Register,
            op @ ("offer" | "need") => Command::Post {
                kind: if op == "offer" {
                    ServiceKind::Offer
                } else {
                    ServiceKind::Need
                },
                title: text?,
                hours: match self.value {
                    Some(value) if !value.fract().is_zero() => return None,
                    Some(value) => Some(value.to_u32()?),
                    None => None,
                },
            },
            "request" => Command::Request {
                service: ServiceId(self.target?),
                message: text.unwrap_or_default(),
            },
            "accept" => Command::Decide {
                request: request?,
                decision: Decision::Accept,
                note: text,
            },
            "reject" => Command::Decide {
                request: request?,
                decision: Decision::Reject,
                note: text,
            },
            "cancel" => Command::Cancel(request?),
            "approve_start" => Command::ApproveStart(request?),
            "propose_hours" => Command::ProposeHours(request?, self.value?),
            "approve_hours" => Command::ApproveHours(request?),
            "complete" => Command::Complete(request?),
            "adjust" => Command::Adjust {
                user: UserId(self.target?),
                hours: self.value?,
                description: text.unwrap_or_else(|| "Administrative adjustment".to_string()),
            },
            _ => return None,
        };
        Some(command)
    }
}

fn apply(market: &Marketplace, actor: UserId, command: Command) -> Result<(), MarketError> {
    match command {
        Command::Register => {
            market.register_user(actor);
        }
        Command::Post { kind, title, hours } => {
            let service = market.post_service(
                actor,
                NewService {
                    kind,
                    title,
                    description: String::new(),
                    estimated_hours: hours,
                },
            )?;
            info!(service = %service.id, "service ready");
        }
        Command::Request { service, message } => {
            let request = market.create_request(actor, service, message)?;
            info!(request = %request.id, "request ready");
        }
        Command::Decide {
            request,
            decision,
            note,
        } => {
            market.decide(request, actor, decision, note)?;
        }
        Command::Cancel(request) => {
            market.cancel(request, actor)?;
        }
        Command::ApproveStart(request) => {
            market.approve_start(request, actor)?;
        }
        Command::ProposeHours(request, hours) => {
            market.propose_hours(request, actor, hours)?;
        }
        Command::ApproveHours(request) => {
            market.approve_hours(request, actor)?;
        }
        Command::Complete(request) => {
            market.complete(request, actor)?;
        }
        Command::Adjust {
            user,
            hours,
            description,
        } => {
            market.adjust(user, hours, actor, description)?;
        }
    }
    Ok(())
}

/// Replay commands from a CSV reader.
///
/// Rows are streamed, so arbitrarily large scripts are not loaded into
/// memory. Malformed rows and rejected commands are logged and skipped.
///
/// # CSV Format
///
/// Expected columns: `op, actor, target, value, text`
/// - `op`: `register`, `offer`, `need`, `request`, `accept`, `reject`,
///   `cancel`, `approve_start`, `propose_hours`, `approve_hours`, `complete`,
///   `adjust`
/// - `actor`: acting user ID
/// - `target`: service ID for `request`, user ID for `adjust`, request ID
///   otherwise
/// - `value`: estimated whole hours for `offer`/`need`, hours for
///   `propose_hours`, signed hours for `adjust`
/// - `text`: service title, request message, decision note or adjustment
///   description
///
/// IDs are assigned sequentially from 1, so later rows can refer to services
/// and requests created by earlier ones.
///
/// # Example
///
/// ```csv
/// op,actor,target,value,text
/// register,1,,,
/// register,2,,,
/// offer,1,,2,Bike repair
/// request,2,1,,
/// accept,1,1,,
/// approve_start,1,1,,
/// approve_start,2,1,,
/// complete,2,1,,
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails.
pub fn process_commands<R: Read>(reader: R, config: MarketConfig) -> Result<Marketplace, csv::Error> {
    let market = Marketplace::with_config(config);

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for (line, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        // Header is line 1.
        let line = line + 2;
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(line, "skipping malformed row: {e}");
                continue;
            }
        };

        let actor = UserId(record.actor);
        let op = record.op.clone();
        let Some(command) = record.into_command() else {
            warn!(line, %op, "skipping invalid command");
            continue;
        };
        debug!(line, ?command, "applying");

        if let Err(e) = apply(&market, actor, command) {
            warn!(line, %op, %actor, "command rejected: {e}");
        }
    }

    Ok(market)
}

/// Write the ledger to a CSV writer.
///
/// Outputs every account ordered by user, rounded to the configured
/// display precision.
///
/// # CSV Format
///
/// Columns: `user, balance, total_earned, total_spent`
///
/// ```csv
/// user,balance,total_earned,total_spent
/// 1,5.00,2.00,0.00
/// 2,1.00,0.00,2.00
/// ```
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_ledger<W: Write>(market: &Marketplace, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    let precision = market.config().display_precision;

    for account in market.ledger().accounts() {
        wtr.serialize(account.snapshot().rounded(precision))?;
    }

    wtr.flush()?;
    Ok(())
}
