//! Sector reading against an emulated card

use farecard_card::{
    read_card, read_uid, AccessOptions, CardType, Fault, ReadError, ReadObserver, Sector,
    SectorAccessor, SectorState, TransceiveError, VirtualCard,
};
use farecard_keys::{CardKeys, Key, KeyType, NoKeys};

const UID: [u8; 4] = [0x04, 0xA1, 0xB2, 0xC3];

fn mini_card() -> VirtualCard {
    let mut card = VirtualCard::new(UID.to_vec(), CardType::ClassicMini);
    for sector in 0..5u8 {
        card.set_block(sector, 0, [sector + 1; 16]);
    }
    card
}

#[derive(Default)]
struct Recorder {
    progress: Vec<(usize, usize)>,
    seen: Vec<usize>,
}

impl ReadObserver for Recorder {
    fn on_progress(&mut self, current: usize, total: usize) {
        self.progress.push((current, total));
    }

    fn on_sectors(&mut self, sectors: &[Sector]) {
        self.seen.push(sectors.len());
    }
}

#[test]
fn test_factory_card_reads_every_sector() {
    let mut card = mini_card();
    let result = read_card(&mut card, &UID, CardType::ClassicMini, &NoKeys, 3).unwrap();

    assert_eq!(result.sectors().len(), 5);
    assert!(result.sectors().iter().all(Sector::is_authorized));
    assert_eq!(result.sector(3).unwrap().block(0).unwrap().data(), &[4u8; 16]);
    assert_eq!(result.sector(0).unwrap().blocks().len(), 4);
    assert_eq!(result.tag_id(), &UID);
}

#[test]
fn test_locked_sector_is_unauthorized_after_every_key() {
    let mut card = mini_card();
    card.lock_sector(2);

    let result = read_card(&mut card, &UID, CardType::ClassicMini, &NoKeys, 2).unwrap();

    assert!(result.sector(2).unwrap().is_unauthorized());
    assert!(result.sector(3).unwrap().is_authorized());
    // four built-in keys, two tries each
    assert_eq!(card.auth_attempts(2), 8);
    assert!(result.has_unauthorized());
}

#[test]
fn test_resolver_key_opens_sector() {
    let secret = Key::new(KeyType::B, [0x10, 0x20, 0x30, 0x40, 0x50, 0x60]);
    let mut card = mini_card();
    card.lock_sector(1);
    card.set_key(1, secret);

    let mut keys = CardKeys::new();
    keys.push(Some(1), secret);
    let result = read_card(&mut card, &UID, CardType::ClassicMini, &keys, 3).unwrap();

    let sector = result.sector(1).unwrap();
    assert!(sector.is_authorized());
    assert_eq!(sector.key(), Some(&secret));
    assert_eq!(card.auth_attempts(1), 1);
}

#[test]
fn test_shared_key_tried_for_other_sectors() {
    let shared = Key::new(KeyType::A, [0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5]);
    let mut card = mini_card();
    card.lock_sector(4);
    card.set_key(4, shared);

    let mut keys = CardKeys::new();
    keys.push(Some(0), shared);
    let result = read_card(&mut card, &UID, CardType::ClassicMini, &keys, 1).unwrap();

    assert_eq!(result.sector(4).unwrap().key(), Some(&shared));
}

#[test]
fn test_transient_auth_errors_are_retried() {
    let mut card = mini_card();
    card.inject(Fault::FlakyAuth { sector: 0, count: 2 });

    let result = read_card(&mut card, &UID, CardType::ClassicMini, &NoKeys, 3).unwrap();
    assert!(result.sector(0).unwrap().is_authorized());
    // zero key A: two timeouts then refused; zero key B refused three times;
    // factory key A succeeds first time
    assert_eq!(card.auth_attempts(0), 7);
}

#[test]
fn test_retry_limit_below_one_still_tries_once() {
    let mut card = mini_card();
    card.lock_sector(0);
    read_card(&mut card, &UID, CardType::ClassicMini, &NoKeys, 0).unwrap();
    assert_eq!(card.auth_attempts(0), 4);
}

#[test]
fn test_read_failure_marks_sector_invalid() {
    let mut card = mini_card();
    card.inject(Fault::BrokenReads { sector: 3 });

    let result = read_card(&mut card, &UID, CardType::ClassicMini, &NoKeys, 3).unwrap();

    match result.sector(3).unwrap().state() {
        SectorState::Invalid { reason } => assert!(reason.contains("CRC")),
        other => panic!("expected invalid sector, got {:?}", other),
    }
    assert!(result.sector(3).unwrap().key().is_some());
    assert!(result.sector(4).unwrap().is_authorized());
}

#[test]
fn test_tag_lost_aborts_session() {
    let mut card = mini_card();
    card.inject(Fault::TagLostAt { sector: 2 });

    let err = read_card(&mut card, &UID, CardType::ClassicMini, &NoKeys, 3).unwrap_err();
    assert!(matches!(err, ReadError::Communication(TransceiveError::TagLost)));
}

#[test]
fn test_observer_sees_each_sector() {
    let mut card = mini_card();
    let mut recorder = Recorder::default();

    SectorAccessor::new(&mut card, &NoKeys, AccessOptions::default())
        .read_card(&UID, CardType::ClassicMini, &mut recorder)
        .unwrap();

    assert_eq!(recorder.progress, vec![(1, 5), (2, 5), (3, 5), (4, 5), (5, 5)]);
    assert_eq!(recorder.seen, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_read_uid() {
    let mut card = mini_card();
    assert_eq!(read_uid(&mut card).unwrap(), UID.to_vec());
}

#[test]
fn test_replay_from_card() {
    let mut original = mini_card();
    original.lock_sector(1);
    let first = read_card(&mut original, &UID, CardType::ClassicMini, &NoKeys, 1).unwrap();

    let mut replay = VirtualCard::from_card(&first);
    let second = read_card(&mut replay, &UID, CardType::ClassicMini, &NoKeys, 1).unwrap();

    assert_eq!(first.sectors(), second.sectors());
}
