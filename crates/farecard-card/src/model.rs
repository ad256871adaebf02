//! Card, sector and block data as read from the card

use chrono::{DateTime, Utc};
use farecard_keys::Key;
use serde::{Deserialize, Serialize};

/// Bytes in one data block
pub const BLOCK_SIZE: usize = 16;

/// Memory layout family of a sector-based card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CardType {
    ClassicMini,
    Classic1K,
    Classic2K,
    Classic4K,
    Unknown,
}

impl CardType {
    /// Number of sectors to read; unknown cards are read as 1K
    pub fn sector_count(self) -> usize {
        match self {
            CardType::ClassicMini => 5,
            CardType::Classic1K | CardType::Unknown => 16,
            CardType::Classic2K => 32,
            CardType::Classic4K => 40,
        }
    }

    /// Identify the card from a PC/SC part 3 ATR.
    ///
    /// Storage-card ATRs carry the card name in bytes 13..15.
    pub fn from_atr(atr: &[u8]) -> Self {
        if atr.len() < 15 || atr[4] != 0x80 || atr[5] != 0x4F {
            return CardType::Unknown;
        }
        match (atr[13], atr[14]) {
            (0x00, 0x01) => CardType::Classic1K,
            (0x00, 0x02) => CardType::Classic4K,
            (0x00, 0x26) => CardType::ClassicMini,
            (0x00, 0x36) => CardType::Classic2K,
            _ => CardType::Unknown,
        }
    }
}

/// Blocks in `sector`: 4 in the first 32 sectors, 16 after that
pub fn blocks_in_sector(sector: u8) -> usize {
    if sector < 32 {
        4
    } else {
        16
    }
}

/// Absolute number of the first block of `sector`
pub fn first_block(sector: u8) -> usize {
    let sector = sector as usize;
    if sector < 32 {
        sector * 4
    } else {
        128 + (sector - 32) * 16
    }
}

/// Absolute number of the sector trailer
pub fn trailer_block(sector: u8) -> usize {
    first_block(sector) + blocks_in_sector(sector) - 1
}

/// Sector and in-sector index of an absolute block number
pub fn address_of(block: usize) -> BlockAddress {
    if block < 128 {
        BlockAddress::new((block / 4) as u8, (block % 4) as u8)
    } else {
        BlockAddress::new((32 + (block - 128) / 16) as u8, ((block - 128) % 16) as u8)
    }
}

/// Position of a block on the card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockAddress {
    pub sector: u8,
    /// Index inside the sector
    pub block: u8,
}

impl BlockAddress {
    pub fn new(sector: u8, block: u8) -> Self {
        Self { sector, block }
    }

    /// Whether this is the key/access-bits trailer of its sector
    pub fn is_trailer(&self) -> bool {
        self.block as usize == blocks_in_sector(self.sector) - 1
    }
}

impl std::fmt::Display for BlockAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.sector, self.block)
    }
}

/// One raw block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    index: u8,
    #[serde(with = "hex")]
    data: [u8; BLOCK_SIZE],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
}

impl Block {
    pub fn new(index: u8, data: [u8; BLOCK_SIZE]) -> Self {
        Self {
            index,
            data,
            kind: None,
        }
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn data(&self) -> &[u8; BLOCK_SIZE] {
        &self.data
    }

    /// Decoded-type tag, if one was attached
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    /// Copy of this block tagged with a decoded type
    pub fn with_kind(&self, kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            ..self.clone()
        }
    }

    /// All bytes zero
    pub fn is_blank(&self) -> bool {
        self.data.iter().all(|&b| b == 0)
    }
}

/// Terminal outcome of reading one sector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SectorState {
    Authorized { blocks: Vec<Block> },
    Unauthorized,
    Invalid { reason: String },
}

/// One sector and how reading it went
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sector {
    index: u8,
    // Dumps never carry key secrets.
    #[serde(skip)]
    key: Option<Key>,
    #[serde(flatten)]
    state: SectorState,
}

impl Sector {
    pub fn authorized(index: u8, key: Key, blocks: Vec<Block>) -> Self {
        Self {
            index,
            key: Some(key),
            state: SectorState::Authorized { blocks },
        }
    }

    pub fn unauthorized(index: u8) -> Self {
        Self {
            index,
            key: None,
            state: SectorState::Unauthorized,
        }
    }

    /// Authentication worked (when `key` is set) but reading did not
    pub fn invalid(index: u8, key: Option<Key>, reason: impl Into<String>) -> Self {
        Self {
            index,
            key,
            state: SectorState::Invalid {
                reason: reason.into(),
            },
        }
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    /// The key that opened this sector
    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    pub fn state(&self) -> &SectorState {
        &self.state
    }

    /// Blocks of an authorized sector, otherwise empty
    pub fn blocks(&self) -> &[Block] {
        match &self.state {
            SectorState::Authorized { blocks } => blocks,
            _ => &[],
        }
    }

    pub fn block(&self, index: u8) -> Option<&Block> {
        self.blocks().iter().find(|b| b.index == index)
    }

    pub fn is_authorized(&self) -> bool {
        matches!(self.state, SectorState::Authorized { .. })
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self.state, SectorState::Unauthorized)
    }
}

/// Everything read from one card during one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    #[serde(with = "hex")]
    tag_id: Vec<u8>,
    card_type: CardType,
    scanned_at: DateTime<Utc>,
    sectors: Vec<Sector>,
}

impl Card {
    pub fn new(
        tag_id: Vec<u8>,
        card_type: CardType,
        scanned_at: DateTime<Utc>,
        sectors: Vec<Sector>,
    ) -> Self {
        Self {
            tag_id,
            card_type,
            scanned_at,
            sectors,
        }
    }

    pub fn tag_id(&self) -> &[u8] {
        &self.tag_id
    }

    /// Tag identifier as upper-case hex
    pub fn tag_id_hex(&self) -> String {
        hex::encode_upper(&self.tag_id)
    }

    pub fn card_type(&self) -> CardType {
        self.card_type
    }

    pub fn scanned_at(&self) -> DateTime<Utc> {
        self.scanned_at
    }

    pub fn sectors(&self) -> &[Sector] {
        &self.sectors
    }

    pub fn sector(&self, index: u8) -> Option<&Sector> {
        self.sectors.iter().find(|s| s.index == index)
    }

    pub fn has_unauthorized(&self) -> bool {
        self.sectors.iter().any(Sector::is_unauthorized)
    }

    /// Every readable block with its address, in card order
    pub fn blocks(&self) -> impl Iterator<Item = (BlockAddress, &Block)> {
        self.sectors.iter().flat_map(|sector| {
            sector
                .blocks()
                .iter()
                .map(move |block| (BlockAddress::new(sector.index, block.index), block))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use farecard_keys::{KeyType, FACTORY_KEY};

    #[test]
    fn test_sector_geometry() {
        assert_eq!(blocks_in_sector(0), 4);
        assert_eq!(blocks_in_sector(31), 4);
        assert_eq!(blocks_in_sector(32), 16);
        assert_eq!(first_block(1), 4);
        assert_eq!(trailer_block(1), 7);
        assert_eq!(first_block(32), 128);
        assert_eq!(trailer_block(39), 255);
        assert!(BlockAddress::new(2, 3).is_trailer());
        assert!(!BlockAddress::new(33, 3).is_trailer());
        assert_eq!(address_of(7), BlockAddress::new(1, 3));
        assert_eq!(address_of(143), BlockAddress::new(32, 15));
        assert_eq!(address_of(255), BlockAddress::new(39, 15));
    }

    #[test]
    fn test_sector_counts() {
        assert_eq!(CardType::ClassicMini.sector_count(), 5);
        assert_eq!(CardType::Classic1K.sector_count(), 16);
        assert_eq!(CardType::Classic2K.sector_count(), 32);
        assert_eq!(CardType::Classic4K.sector_count(), 40);
    }

    #[test]
    fn test_card_type_from_atr() {
        let atr = [
            0x3B, 0x8F, 0x80, 0x01, 0x80, 0x4F, 0x0C, 0xA0, 0x00, 0x00, 0x03, 0x06, 0x03, 0x00,
            0x01, 0x00, 0x00, 0x00, 0x00, 0x6A,
        ];
        assert_eq!(CardType::from_atr(&atr), CardType::Classic1K);
        assert_eq!(CardType::from_atr(&[0x3B, 0x00]), CardType::Unknown);
    }

    #[test]
    fn test_block_kind_tags_a_copy() {
        let block = Block::new(1, [0u8; BLOCK_SIZE]);
        let tagged = block.with_kind("purse");
        assert_eq!(block.kind(), None);
        assert_eq!(tagged.kind(), Some("purse"));
        assert!(tagged.is_blank());
    }

    #[test]
    fn test_card_blocks_skip_unreadable_sectors() {
        let key = Key::new(KeyType::A, FACTORY_KEY);
        let card = Card::new(
            vec![0x01, 0x02, 0x03, 0x04],
            CardType::ClassicMini,
            Utc::now(),
            vec![
                Sector::authorized(0, key, vec![Block::new(0, [1; 16]), Block::new(1, [2; 16])]),
                Sector::unauthorized(1),
                Sector::invalid(2, Some(key), "read failed"),
            ],
        );

        let addresses: Vec<_> = card.blocks().map(|(a, _)| a).collect();
        assert_eq!(addresses, vec![BlockAddress::new(0, 0), BlockAddress::new(0, 1)]);
        assert!(card.has_unauthorized());
        assert_eq!(card.tag_id_hex(), "01020304");
        assert!(card.sector(1).unwrap().blocks().is_empty());
    }
}
