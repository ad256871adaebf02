use std::path::Path;

use farecard_keys::KeyFile;

use super::CliError;

pub fn cmd_keys(path: &Path) -> Result<(), CliError> {
    let file = KeyFile::load(path)?;
    println!("Key file: {} ({} entries)\n", path.display(), file.entries().len());

    println!("{:<16} {:<6} KEY", "UID", "SECTOR");
    for entry in file.entries() {
        let uid = entry
            .uid
            .as_deref()
            .map_or_else(|| "*".to_string(), hex::encode_upper);
        let sector = entry.sector.map_or_else(|| "*".to_string(), |s| s.to_string());
        println!("{:<16} {:<6} {}", uid, sector, entry.key);
    }
    Ok(())
}
