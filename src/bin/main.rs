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

use chrono::NaiveDate;
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use reserva_rs::{
    BookingRequest, Engine, ExperienceId, Guest, JsonFileStore, UserId, load_catalog,
};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

/// Reservation Engine - Process booking CSV files
///
/// Reads booking operations from a CSV file and outputs slot occupancy to
/// stdout. Supports reservations and cancellations against a catalog of
/// date-sloted experiences.
#[derive(Parser, Debug)]
#[command(name = "reserva-rs")]
#[command(about = "A reservation engine that processes booking CSVs", long_about = None)]
struct Args {
    /// Path to CSV file with booking operations
    ///
    /// Expected format: op,experience,user,name,seats,date
    /// Example: cargo run -- --catalog catalog.json bookings.csv > occupancy.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Path to JSON catalog of experiences to register
    #[arg(long, value_name = "FILE")]
    catalog: Option<PathBuf>,

    /// JSON ledger file to hydrate from and persist every accepted operation to
    #[arg(long, value_name = "FILE")]
    store: Option<PathBuf>,
}

fn main() {
    // Parse command line arguments
    let args = Args::parse();

    // Build the engine, hydrating from the ledger file when given
    let engine = match &args.store {
        Some(path) => match Engine::with_store(Arc::new(JsonFileStore::new(path))) {
            Ok(engine) => engine,
            Err(e) => {
                eprintln!("Error loading ledger '{}': {}", path.display(), e);
                process::exit(1);
            }
        },
        None => Engine::new(),
    };

    // Register catalog experiences
    if let Some(path) = &args.catalog {
        let configs = match load_catalog(path) {
            Ok(configs) => configs,
            Err(e) => {
                eprintln!("Error reading catalog '{}': {}", path.display(), e);
                process::exit(1);
            }
        };
        for config in &configs {
            if let Err(e) = engine.register(config) {
                eprintln!("Error registering experience {}: {}", config.id, e);
                process::exit(1);
            }
        }
    }

    // Open input file
    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    // Process bookings from CSV
    if let Err(e) = process_bookings(&engine, BufReader::new(file)) {
        eprintln!("Error processing bookings: {}", e);
        process::exit(1);
    }

    // Write occupancy to stdout
    if let Err(e) = write_occupancy(&engine, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `op, experience, user, name, seats, date`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    op: String,
    experience: u32,
    user: u32,
    name: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option")]
    seats: Option<u32>,
    #[serde(deserialize_with = "csv::invalid_option")]
    date: Option<NaiveDate>,
}

impl CsvRecord {
    /// Converts CSV record to BookingRequest.
    ///
    /// Returns `None` for invalid operations or missing required fields.
    fn into_request(self) -> Option<BookingRequest> {
        let experience_id = ExperienceId(self.experience);
        let user_id = UserId(self.user);

        match self.op.to_lowercase().as_str() {
            "reserve" => {
                let seats = self.seats?;
                Some(BookingRequest::Reserve {
                    experience_id,
                    guest: Guest {
                        user_id,
                        user_name: self.name.unwrap_or_default(),
                        user_avatar: None,
                    },
                    seats,
                    date: self.date,
                })
            }
            "cancel" => Some(BookingRequest::Cancel {
                experience_id,
                user_id,
                date: self.date,
            }),
            _ => None,
        }
    }
}

/// Process booking operations from a CSV reader.
///
/// Streaming parsing keeps memory flat for arbitrarily large files.
/// Malformed rows and rejected operations are skipped; rejection is the
/// engine's answer, not a processing failure.
///
/// # CSV Format
///
/// Expected columns: `op, experience, user, name, seats, date`
/// - `op`: Operation (reserve, cancel)
/// - `experience`: Experience ID (u32)
/// - `user`: User ID (u32)
/// - `name`: Display name (optional)
/// - `seats`: Seat count (required for reserve)
/// - `date`: Target slot date YYYY-MM-DD (optional; next available / first match)
///
/// # Example
///
/// ```csv
/// op,experience,user,name,seats,date
/// reserve,1,7,Ana,4,
/// reserve,1,8,Luis,2,2026-03-13
/// cancel,1,7,,,
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
pub fn process_bookings<R: Read>(engine: &Engine, reader: R) -> Result<(), csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All) // Handle whitespace in fields like " reserve "
        .flexible(true) // Allow missing trailing fields
        .has_headers(true) // Skip first row as header
        .from_reader(reader);

    for result in rdr.deserialize::<CsvRecord>() {
        match result {
            Ok(record) => {
                let Some(request) = record.into_request() else {
                    #[cfg(debug_assertions)]
                    eprintln!("Skipping invalid booking record");
                    continue;
                };

                let _experience_id = request.experience_id();
                if let Err(_e) = engine.process(request) {
                    #[cfg(debug_assertions)]
                    eprintln!("Skipping op for experience {}: {}", _experience_id, _e);
                }
            }
            Err(e) => {
                // Skip malformed rows
                #[cfg(debug_assertions)]
                eprintln!("Skipping malformed row: {}", e);
                continue;
            }
        }
    }

    Ok(())
}

/// One output row per date slot.
#[derive(Debug, Serialize)]
struct OccupancyRow {
    experience: u32,
    date: NaiveDate,
    reserved: u32,
    capacity: u32,
    open: bool,
}

/// Write slot occupancy to a CSV writer.
///
/// Outputs one row per slot, ordered by experience id and date.
///
/// # CSV Format
///
/// Columns: `experience, date, reserved, capacity, open`
///
/// # Example
///
/// ```csv
/// experience,date,reserved,capacity,open
/// 1,2026-03-06,10,10,false
/// 1,2026-03-13,2,10,true
/// ```
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_occupancy<W: Write>(engine: &Engine, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    for record in engine.records() {
        for slot in &record.dates {
            wtr.serialize(OccupancyRow {
                experience: record.id.0,
                date: slot.date,
                reserved: slot.reserved_seats,
                capacity: record.max_seats,
                open: slot.reserved_seats < record.max_seats,
            })?;
        }
    }

    // Flush to ensure all data is written
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reserva_rs::ExperienceConfig;
    use std::io::Cursor;

    fn engine_with_catalog() -> Engine {
        let engine = Engine::new();
        engine
            .register(&ExperienceConfig {
                id: ExperienceId(1),
                title: "Cellar tasting".into(),
                description: None,
                max_seats: 10,
                reference_date: NaiveDate::from_ymd_opt(2026, 3, 6).unwrap(),
                horizon: 2,
            })
            .unwrap();
        engine
    }

    #[test]
    fn parse_simple_reserve() {
        let csv = "op,experience,user,name,seats,date\nreserve,1,7,Ana,4,\n";
        let engine = engine_with_catalog();

        process_bookings(&engine, Cursor::new(csv)).unwrap();

        let records = engine.records();
        assert_eq!(records[0].dates[0].reserved_seats, 4);
    }

    #[test]
    fn parse_reserve_with_explicit_date() {
        let csv = "op,experience,user,name,seats,date\nreserve,1,7,Ana,4,2026-03-13\n";
        let engine = engine_with_catalog();

        process_bookings(&engine, Cursor::new(csv)).unwrap();

        let records = engine.records();
        assert_eq!(records[0].dates[0].reserved_seats, 0);
        assert_eq!(records[0].dates[1].reserved_seats, 4);
    }

    #[test]
    fn parse_reserve_and_cancel() {
        let csv = "op,experience,user,name,seats,date\n\
                   reserve,1,7,Ana,4,\n\
                   cancel,1,7,,,\n";
        let engine = engine_with_catalog();

        process_bookings(&engine, Cursor::new(csv)).unwrap();

        let records = engine.records();
        assert_eq!(records[0].dates[0].reserved_seats, 0);
    }

    #[test]
    fn parse_with_whitespace() {
        let csv = "op,experience,user,name,seats,date\n reserve , 1 , 7 , Ana , 4 , \n";
        let engine = engine_with_catalog();

        process_bookings(&engine, Cursor::new(csv)).unwrap();

        assert_eq!(engine.records()[0].dates[0].reserved_seats, 4);
    }

    #[test]
    fn skip_malformed_rows() {
        let csv = "op,experience,user,name,seats,date\n\
                   reserve,1,7,Ana,4,\n\
                   invalid,row,data\n\
                   reserve,1,8,Luis,2,\n";
        let engine = engine_with_catalog();

        process_bookings(&engine, Cursor::new(csv)).unwrap();

        // Both valid rows applied
        assert_eq!(engine.records()[0].dates[0].reserved_seats, 6);
    }

    #[test]
    fn rejected_operations_do_not_stop_processing() {
        let csv = "op,experience,user,name,seats,date\n\
                   reserve,1,7,Ana,8,\n\
                   reserve,1,8,Luis,5,2026-03-06\n\
                   reserve,1,9,Eva,2,\n";
        let engine = engine_with_catalog();

        process_bookings(&engine, Cursor::new(csv)).unwrap();

        // Luis exceeded capacity at the first slot; Eva still fits there.
        assert_eq!(engine.records()[0].dates[0].reserved_seats, 10);
    }

    #[test]
    fn write_occupancy_to_csv() {
        let csv_input = "op,experience,user,name,seats,date\nreserve,1,7,Ana,10,\n";
        let engine = engine_with_catalog();
        process_bookings(&engine, Cursor::new(csv_input)).unwrap();

        let mut output = Vec::new();
        write_occupancy(&engine, &mut output).unwrap();

        let output_str = String::from_utf8(output).unwrap();
        assert!(output_str.contains("experience,date,reserved,capacity,open"));
        assert!(output_str.contains("1,2026-03-06,10,10,false"));
        assert!(output_str.contains("1,2026-03-13,0,10,true"));
    }
}
