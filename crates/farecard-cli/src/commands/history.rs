use std::path::Path;

use farecard_card::{Card, CardDump};
use farecard_transit::{
    formats, identify, CardFormat, CardIdentity, History, Lookup, Obfuscator, ReadConfig, Record,
    TripDisplay,
};

use crate::formatters::{format_value, FormatMode};

use super::{read_live_card, CliError};

pub fn cmd_history(config: &ReadConfig, dump: Option<&Path>, format_mode: FormatMode) -> Result<(), CliError> {
    println!("Transit Card History - {} Mode\n", format_mode.description());

    let card = match dump {
        Some(path) => {
            let card = CardDump::load(path)?.into_card();
            println!("Dump: {}", path.display());
            card
        }
        None => read_live_card(config)?,
    };

    let formats = formats::all();
    let format = match identify(&card, &formats) {
        CardIdentity::Recognized(format) => format,
        CardIdentity::Locked => {
            let sectors = card.sectors().iter().filter(|s| s.is_unauthorized()).count();
            return Err(CliError::Locked { sectors });
        }
        CardIdentity::Unrecognized => return Err(CliError::Unrecognized),
    };

    println!("Card: {} ({})", card.tag_id_hex(), format.name);
    println!("Scanned: {}\n", card.scanned_at().format("%Y-%m-%d %H:%M UTC"));

    let history = format.analyse(&card);
    match format_mode {
        FormatMode::Raw => print_records(&history),
        FormatMode::Human => print_history(&card, format, &history, config),
    }
    Ok(())
}

fn print_records(history: &History) {
    println!("=== Records ===\n");
    for record in &history.classified.records {
        print_record(record);
    }
    if !history.classified.dropped.is_empty() {
        println!("=== Dropped ===\n");
        for dropped in &history.classified.dropped {
            println!("[{}] {}: {}", dropped.address, dropped.kind, dropped.error);
        }
    }
}

fn print_record(record: &Record) {
    println!("[{}] {}", record.address(), record.kind());
    for (name, value) in record.fields().iter() {
        println!("  {}: {}", name, format_value(value, FormatMode::Raw));
    }
    println!();
}

fn print_history(card: &Card, format: &CardFormat, history: &History, config: &ReadConfig) {
    let lookup: &dyn Lookup = format.lookup;
    let result = &history.reconciliation;

    if let Some(balance) = &result.balance {
        println!("Balance: {}", lookup.format_amount(balance.value));
        if let Some(at) = balance.timestamp {
            println!("  as of {}", at.format("%Y-%m-%d %H:%M"));
        }
        println!();
    }

    let obfuscator = Obfuscator::new(&config.obfuscation);
    if !obfuscator.is_identity() {
        println!("(dates and fares are obfuscated)\n");
    }

    println!("=== Trips ({}) ===\n", result.trips.len());
    for trip in &result.trips {
        let view = obfuscator.apply(trip);
        println!("{}", TripDisplay::new(&view, lookup));
    }

    if !result.topups.is_empty() {
        println!("\n=== Top-ups ===\n");
        for topup in &result.topups {
            let when = topup
                .timestamp
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "unknown time".to_string());
            let station = topup
                .station
                .and_then(|s| lookup.station_name(s))
                .map(|name| format!(" at {}", name))
                .unwrap_or_default();
            println!("{}  {}{}", when, lookup.format_amount(topup.amount), station);
        }
    }

    if !result.subscriptions.is_empty() {
        println!("\n=== Passes ===\n");
        for pass in &result.subscriptions {
            let remaining = pass
                .trips_remaining
                .map(|n| format!(", {} trips left", n))
                .unwrap_or_default();
            println!(
                "Pass type {} valid until {}{}",
                pass.pass_type.map_or_else(|| "?".to_string(), |t| t.to_string()),
                pass.expiry.format("%Y-%m-%d"),
                remaining
            );
        }
    }

    let dropped = history.classified.dropped.len();
    let unreadable = card.sectors().iter().filter(|s| !s.is_authorized()).count();
    if dropped > 0 || unreadable > 0 {
        println!(
            "\nNote: {} record(s) dropped, {} sector(s) unreadable; history may be incomplete",
            dropped, unreadable
        );
    }
}
