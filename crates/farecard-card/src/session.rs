//! Sector-by-sector card reading with key fallback
//!
//! A read never fails because one sector stays closed: every sector ends in
//! exactly one terminal [`SectorState`](crate::model::SectorState) and the read moves on. Only a fatal
//! transport error (see [`TransceiveError::is_fatal`]) abandons the session.

use chrono::Utc;
use farecard_keys::{CardKeys, Key, KeyResolver, DEFAULT_KEYS};
use tracing::{debug, info, warn};

use crate::apdu::commands;
use crate::model::{blocks_in_sector, first_block, trailer_block, Block, Card, CardType, Sector, BLOCK_SIZE};
use crate::transceiver::{TransceiveError, Transceiver};
use crate::ReadError;

/// Reader key slot used for LOAD KEY / GENERAL AUTHENTICATE
pub const DEFAULT_KEY_SLOT: u8 = 0x00;

/// Tuning for one read session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessOptions {
    /// How many times each candidate key is tried (at least once)
    pub retry_limit: u32,
    pub key_slot: u8,
}

impl Default for AccessOptions {
    fn default() -> Self {
        Self {
            retry_limit: 3,
            key_slot: DEFAULT_KEY_SLOT,
        }
    }
}

/// Receives progress while a card is being read
pub trait ReadObserver {
    /// Called after each sector with `(sectors done, sectors total)`
    fn on_progress(&mut self, _current: usize, _total: usize) {}

    /// Called after each sector with everything read so far
    fn on_sectors(&mut self, _sectors: &[Sector]) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ReadObserver for NoopObserver {}

/// Reads the sectors of one card through a [`Transceiver`]
pub struct SectorAccessor<'a, T: Transceiver + ?Sized, R: KeyResolver + ?Sized> {
    transceiver: &'a mut T,
    resolver: &'a R,
    options: AccessOptions,
}

impl<'a, T: Transceiver + ?Sized, R: KeyResolver + ?Sized> SectorAccessor<'a, T, R> {
    pub fn new(transceiver: &'a mut T, resolver: &'a R, options: AccessOptions) -> Self {
        Self {
            transceiver,
            resolver,
            options,
        }
    }

    /// Read every sector of the card.
    ///
    /// Sector failures are recorded in the returned [`Card`]; an `Err` means
    /// the session itself was lost and nothing read so far is kept.
    pub fn read_card(
        &mut self,
        tag_id: &[u8],
        card_type: CardType,
        observer: &mut dyn ReadObserver,
    ) -> Result<Card, ReadError> {
        let card_keys = self.resolver.candidates_for(tag_id);
        let total = card_type.sector_count();
        let mut sectors = Vec::with_capacity(total);

        debug!(
            tag = %hex::encode_upper(tag_id),
            ?card_type,
            known_keys = card_keys.len(),
            "Reading card"
        );

        for index in 0..total {
            let sector = self.read_sector(index as u8, &card_keys)?;
            sectors.push(sector);
            observer.on_progress(index + 1, total);
            observer.on_sectors(&sectors);
        }

        let authorized = sectors.iter().filter(|s| s.is_authorized()).count();
        let unauthorized = sectors.iter().filter(|s| s.is_unauthorized()).count();
        info!(
            tag = %hex::encode_upper(tag_id),
            authorized,
            unauthorized,
            invalid = total - authorized - unauthorized,
            "Card read complete"
        );

        Ok(Card::new(tag_id.to_vec(), card_type, Utc::now(), sectors))
    }

    fn read_sector(&mut self, index: u8, card_keys: &CardKeys) -> Result<Sector, TransceiveError> {
        for key in candidate_keys(card_keys, index) {
            if !self.authenticate(index, &key)? {
                continue;
            }

            return match self.read_blocks(index) {
                Ok(blocks) => Ok(Sector::authorized(index, key, blocks)),
                Err(SectorRead::Transport(err)) if err.is_fatal() => Err(err),
                Err(failure) => {
                    let reason = failure.to_string();
                    warn!(sector = index, %reason, "Sector read failed");
                    Ok(Sector::invalid(index, Some(key), reason))
                }
            };
        }

        debug!(sector = index, "No key opened sector");
        Ok(Sector::unauthorized(index))
    }

    /// Try one key up to `retry_limit` times. `Ok(false)` means refused.
    fn authenticate(&mut self, sector: u8, key: &Key) -> Result<bool, TransceiveError> {
        let block = trailer_block(sector) as u8;
        let slot = self.options.key_slot;

        for attempt in 1..=self.options.retry_limit.max(1) {
            debug!(sector, key_type = %key.key_type(), attempt, "Authenticating");

            let loaded = commands::load_key(slot, key).send(&mut *self.transceiver);
            let outcome = match loaded {
                Ok(response) if response.is_success() => {
                    commands::general_authenticate(block, key, slot).send(&mut *self.transceiver)
                }
                other => other,
            };

            match outcome {
                Ok(response) if response.is_success() => return Ok(true),
                Ok(_) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => debug!(sector, error = %err, "Transport error while authenticating"),
            }
        }

        Ok(false)
    }

    fn read_blocks(&mut self, sector: u8) -> Result<Vec<Block>, SectorRead> {
        let first = first_block(sector);
        let mut blocks = Vec::with_capacity(blocks_in_sector(sector));

        for offset in 0..blocks_in_sector(sector) {
            let response = commands::read_binary((first + offset) as u8)
                .send(&mut *self.transceiver)
                .map_err(SectorRead::Transport)?;

            if !response.is_success() {
                return Err(SectorRead::Status {
                    block: offset as u8,
                    status: response.status_string(),
                });
            }

            let data: [u8; BLOCK_SIZE] = response.data.as_slice().try_into().map_err(|_| {
                SectorRead::Length {
                    block: offset as u8,
                    len: response.data.len(),
                }
            })?;
            blocks.push(Block::new(offset as u8, data));
        }

        Ok(blocks)
    }
}

/// Keys for `sector` in the order they are tried, without repeats
pub fn candidate_keys(card_keys: &CardKeys, sector: u8) -> Vec<Key> {
    let defaults = DEFAULT_KEYS;
    let mut keys: Vec<Key> = Vec::new();
    let ordered = card_keys
        .for_sector(sector)
        .into_iter()
        .chain(card_keys.all())
        .chain(defaults.iter());

    for key in ordered {
        if !keys.contains(key) {
            keys.push(*key);
        }
    }
    keys
}

#[derive(Debug, thiserror::Error)]
enum SectorRead {
    #[error("{0}")]
    Transport(TransceiveError),

    #[error("block {block}: status {status}")]
    Status { block: u8, status: String },

    #[error("block {block}: expected 16 bytes, got {len}")]
    Length { block: u8, len: usize },
}

/// Read a whole card with the default observer
pub fn read_card<T, R>(
    transceiver: &mut T,
    tag_id: &[u8],
    card_type: CardType,
    resolver: &R,
    retry_limit: u32,
) -> Result<Card, ReadError>
where
    T: Transceiver + ?Sized,
    R: KeyResolver + ?Sized,
{
    let options = AccessOptions {
        retry_limit,
        ..AccessOptions::default()
    };
    SectorAccessor::new(transceiver, resolver, options).read_card(tag_id, card_type, &mut NoopObserver)
}

/// Ask the reader for the tag identifier
pub fn read_uid<T: Transceiver + ?Sized>(transceiver: &mut T) -> Result<Vec<u8>, ReadError> {
    let response = commands::get_uid().send(transceiver)?;
    if !response.is_success() || response.data.is_empty() {
        return Err(ReadError::NoUid(response.status_string()));
    }
    Ok(response.data)
}
