use std::path::Path;

use farecard_card::{BlockAddress, CardDump};
use farecard_transit::{classify, formats, identify, CardIdentity, ReadConfig};

use crate::formatters::{format_block, format_sector, FormatMode};

use super::{read_live_card, CliError};

pub fn cmd_read(config: &ReadConfig, save: Option<&Path>, format_mode: FormatMode) -> Result<(), CliError> {
    println!("Transit Card Reader - {} Mode\n", format_mode.description());

    let card = read_live_card(config)?;

    // Tag blocks with their record kind when the format is known
    let formats = formats::all();
    let identity = identify(&card, &formats);
    let tagged = match identity.format() {
        Some(format) => classify(&card, format).blocks,
        None => Vec::new(),
    };
    let kind_of = |address: BlockAddress| {
        tagged
            .iter()
            .find(|(a, _)| *a == address)
            .and_then(|(_, block)| block.kind())
    };

    for sector in card.sectors() {
        println!("{}", format_sector(sector, format_mode));
        for block in sector.blocks() {
            let address = BlockAddress::new(sector.index(), block.index());
            println!("{}", format_block(block, kind_of(address), format_mode));
        }
    }

    println!();
    match identity {
        CardIdentity::Recognized(format) => println!("Format: {}", format.name),
        CardIdentity::Locked => println!("Format: unknown (some sectors are locked)"),
        CardIdentity::Unrecognized => println!("Format: unknown"),
    }

    if let Some(path) = save {
        CardDump::new(card).save(path)?;
        println!("Saved dump to {}", path.display());
    }
    Ok(())
}
