//! Farecard Transit - From card blocks to travel history
//!
//! This crate takes a [`farecard_card::Card`], recognizes its format,
//! classifies its blocks into typed [`Record`]s and reconciles them into
//! trips, top-ups, a balance and active passes.
//!
//! ```no_run
//! use farecard_card::{CardReader, NoopObserver, SectorAccessor};
//! use farecard_keys::NoKeys;
//! use farecard_transit::{formats, identify, ReadConfig};
//!
//! let config = ReadConfig::default();
//! let reader = CardReader::new().unwrap();
//! let (mut transceiver, _name) = reader.connect_first().unwrap();
//! let uid = farecard_card::read_uid(&mut transceiver).unwrap();
//! let card_type = transceiver.card_type();
//! let card = SectorAccessor::new(&mut transceiver, &NoKeys, config.access_options())
//!     .read_card(&uid, card_type, &mut NoopObserver)
//!     .unwrap();
//!
//! if let Some(format) = identify(&card, &formats::all()).format() {
//!     let history = format.analyse(&card);
//!     println!("{} trips", history.reconciliation.trips.len());
//! }
//! ```

pub mod classifier;
pub mod config;
pub mod decorate;
pub mod format;
pub mod formats;
pub mod lookup;
pub mod pipeline;
pub mod reconcile;
pub mod record;
pub mod service_day;
pub mod trip;

pub use classifier::{classify, Classified, Dropped, RecordError};
pub use config::{ConfigError, ObfuscationConfig, ReadConfig};
pub use decorate::{ObfuscatedTrip, Obfuscator, TripDisplay};
pub use format::{identify, guess_early, CardFormat, CardIdentity, History};
pub use lookup::{Currency, Epoch, Lookup, StaticLookup};
pub use pipeline::{ReadEvent, ReadOutcome, ReadTask};
pub use reconcile::{reconcile, Balance, ReconcileOptions, Reconciliation, Subscription, Topup};
pub use record::{Record, RecordKind};
pub use service_day::{same_service_day, ServiceDayRule};
pub use trip::{TransportMode, Trip, TripKind, TripView};
