//! In-memory sector card speaking the PC/SC storage-card commands
//!
//! [`VirtualCard`] answers LOAD KEY, GENERAL AUTHENTICATE, READ BINARY and
//! GET UID exactly like a contactless reader with a card on it, so reads can
//! be replayed from a dump or scripted with transport faults.

use std::collections::HashMap;

use farecard_keys::{Key, KeyType, FACTORY_KEY, KEY_LEN};

use crate::apdu::commands::{
    CLA_READER, INS_GENERAL_AUTHENTICATE, INS_GET_DATA, INS_LOAD_KEY, INS_READ_BINARY,
};
use crate::model::{address_of, blocks_in_sector, Card, CardType, BLOCK_SIZE};
use crate::transceiver::{TransceiveError, Transceiver};

const SW_SUCCESS: [u8; 2] = [0x90, 0x00];
const SW_AUTH_FAILED: [u8; 2] = [0x63, 0x00];
const SW_NOT_ALLOWED: [u8; 2] = [0x69, 0x82];
const SW_WRONG_LENGTH: [u8; 2] = [0x67, 0x00];
const SW_UNKNOWN_INS: [u8; 2] = [0x6D, 0x00];

/// Default access bits of a transport-configured sector trailer
const ACCESS_BITS: [u8; 4] = [0xFF, 0x07, 0x80, 0x69];

#[derive(Debug, Clone)]
struct VirtualSector {
    key_a: [u8; KEY_LEN],
    key_b: [u8; KEY_LEN],
    blocks: Vec<[u8; BLOCK_SIZE]>,
}

impl VirtualSector {
    fn blank(index: u8) -> Self {
        let count = blocks_in_sector(index);
        let mut blocks = vec![[0u8; BLOCK_SIZE]; count];
        blocks[count - 1][KEY_LEN..KEY_LEN + 4].copy_from_slice(&ACCESS_BITS);
        Self {
            key_a: FACTORY_KEY,
            key_b: FACTORY_KEY,
            blocks,
        }
    }

    fn accepts(&self, key_type: KeyType, secret: &[u8; KEY_LEN]) -> bool {
        match key_type {
            KeyType::A => &self.key_a == secret,
            KeyType::B => &self.key_b == secret,
        }
    }
}

/// A scripted transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The next `count` authentications of `sector` time out
    FlakyAuth { sector: u8, count: u32 },
    /// Every READ BINARY inside `sector` fails at the transport level
    BrokenReads { sector: u8 },
    /// The tag leaves the field as soon as `sector` is touched
    TagLostAt { sector: u8 },
}

/// Emulated sector card behind an emulated reader
#[derive(Debug, Clone)]
pub struct VirtualCard {
    uid: Vec<u8>,
    card_type: CardType,
    sectors: Vec<VirtualSector>,
    slots: HashMap<u8, [u8; KEY_LEN]>,
    authenticated: Option<u8>,
    faults: Vec<Fault>,
    auth_attempts: HashMap<u8, u32>,
    commands: usize,
}

impl VirtualCard {
    /// Blank card whose sectors all open with the factory key
    pub fn new(uid: Vec<u8>, card_type: CardType) -> Self {
        let sectors = (0..card_type.sector_count())
            .map(|i| VirtualSector::blank(i as u8))
            .collect();
        Self {
            uid,
            card_type,
            sectors,
            slots: HashMap::new(),
            authenticated: None,
            faults: Vec::new(),
            auth_attempts: HashMap::new(),
            commands: 0,
        }
    }

    /// Card holding the readable blocks of `card`.
    ///
    /// Sectors that were not readable get keys nobody knows.
    pub fn from_card(card: &Card) -> Self {
        let mut virtual_card = Self::new(card.tag_id().to_vec(), card.card_type());
        for sector in card.sectors() {
            let index = sector.index();
            if sector.is_authorized() {
                for block in sector.blocks() {
                    virtual_card.set_block(index, block.index(), *block.data());
                }
                if let Some(key) = sector.key() {
                    virtual_card.set_key(index, *key);
                }
            } else {
                virtual_card.lock_sector(index);
            }
        }
        virtual_card
    }

    pub fn uid(&self) -> &[u8] {
        &self.uid
    }

    pub fn card_type(&self) -> CardType {
        self.card_type
    }

    pub fn set_block(&mut self, sector: u8, block: u8, data: [u8; BLOCK_SIZE]) {
        if let Some(slot) = self
            .sectors
            .get_mut(sector as usize)
            .and_then(|s| s.blocks.get_mut(block as usize))
        {
            *slot = data;
        }
    }

    /// Replace one of a sector's keys
    pub fn set_key(&mut self, sector: u8, key: Key) {
        if let Some(s) = self.sectors.get_mut(sector as usize) {
            match key.key_type() {
                KeyType::A => s.key_a = *key.bytes(),
                KeyType::B => s.key_b = *key.bytes(),
            }
        }
    }

    /// Give a sector keys that are neither stored nor built in
    pub fn lock_sector(&mut self, sector: u8) {
        self.set_key(sector, Key::new(KeyType::A, [0x5A, 0xC3, 0x11, sector, 0x7E, 0x42]));
        self.set_key(sector, Key::new(KeyType::B, [0xA5, 0x3C, 0xEE, sector, 0x81, 0xBD]));
    }

    pub fn inject(&mut self, fault: Fault) {
        self.faults.push(fault);
    }

    /// Authentication attempts seen for `sector`
    pub fn auth_attempts(&self, sector: u8) -> u32 {
        self.auth_attempts.get(&sector).copied().unwrap_or(0)
    }

    /// Commands received so far
    pub fn command_count(&self) -> usize {
        self.commands
    }

    fn touch(&self, sector: u8) -> Result<(), TransceiveError> {
        let lost = self
            .faults
            .iter()
            .any(|f| matches!(f, Fault::TagLostAt { sector: s } if *s == sector));
        if lost {
            Err(TransceiveError::TagLost)
        } else {
            Ok(())
        }
    }

    fn load_key(&mut self, slot: u8, data: &[u8]) -> Vec<u8> {
        match <[u8; KEY_LEN]>::try_from(data) {
            Ok(key) => {
                self.slots.insert(slot, key);
                SW_SUCCESS.to_vec()
            }
            Err(_) => SW_WRONG_LENGTH.to_vec(),
        }
    }

    fn authenticate(&mut self, data: &[u8]) -> Result<Vec<u8>, TransceiveError> {
        if data.len() != 5 || data[0] != 0x01 {
            return Ok(SW_WRONG_LENGTH.to_vec());
        }
        let address = address_of(data[2] as usize);
        let sector = address.sector;
        self.touch(sector)?;
        *self.auth_attempts.entry(sector).or_insert(0) += 1;
        self.authenticated = None;

        for fault in &mut self.faults {
            if let Fault::FlakyAuth { sector: s, count } = fault {
                if *s == sector && *count > 0 {
                    *count -= 1;
                    return Err(TransceiveError::Timeout);
                }
            }
        }

        let key_type = match data[3] {
            0x60 => KeyType::A,
            0x61 => KeyType::B,
            _ => return Ok(SW_NOT_ALLOWED.to_vec()),
        };
        let accepted = match (self.slots.get(&data[4]), self.sectors.get(sector as usize)) {
            (Some(secret), Some(s)) => s.accepts(key_type, secret),
            _ => false,
        };

        if accepted {
            self.authenticated = Some(sector);
            Ok(SW_SUCCESS.to_vec())
        } else {
            Ok(SW_AUTH_FAILED.to_vec())
        }
    }

    fn read_binary(&mut self, block: u8) -> Result<Vec<u8>, TransceiveError> {
        let address = address_of(block as usize);
        self.touch(address.sector)?;

        let broken = self
            .faults
            .iter()
            .any(|f| matches!(f, Fault::BrokenReads { sector } if *sector == address.sector));
        if broken {
            return Err(TransceiveError::Io("CRC error".to_string()));
        }
        if self.authenticated != Some(address.sector) {
            return Ok(SW_NOT_ALLOWED.to_vec());
        }

        let sector = &self.sectors[address.sector as usize];
        let mut data = sector.blocks[address.block as usize];
        // Key A never reads back.
        if address.is_trailer() {
            data[..KEY_LEN].fill(0);
        }
        let mut response = data.to_vec();
        response.extend_from_slice(&SW_SUCCESS);
        Ok(response)
    }
}

impl Transceiver for VirtualCard {
    fn transceive(&mut self, command: &[u8]) -> Result<Vec<u8>, TransceiveError> {
        self.commands += 1;
        if command.len() < 4 || command[0] != CLA_READER {
            return Ok(SW_UNKNOWN_INS.to_vec());
        }
        let (ins, p2) = (command[1], command[3]);
        let data = match command.get(4) {
            Some(&lc) if command.len() > 5 => &command[5..(5 + lc as usize).min(command.len())],
            _ => &[][..],
        };

        match ins {
            INS_GET_DATA => {
                let mut response = self.uid.clone();
                response.extend_from_slice(&SW_SUCCESS);
                Ok(response)
            }
            INS_LOAD_KEY => Ok(self.load_key(p2, data)),
            INS_GENERAL_AUTHENTICATE => self.authenticate(data),
            INS_READ_BINARY if (p2 as usize) < self.total_blocks() => self.read_binary(p2),
            INS_READ_BINARY => Ok(SW_NOT_ALLOWED.to_vec()),
            _ => Ok(SW_UNKNOWN_INS.to_vec()),
        }
    }
}

impl VirtualCard {
    fn total_blocks(&self) -> usize {
        self.sectors.iter().map(|s| s.blocks.len()).sum()
    }
}
