//! Built-in card formats

pub mod nextfare;

pub use nextfare::nextfare;

use crate::format::CardFormat;

/// Every format tried when identifying a card, in order
pub fn all() -> Vec<&'static CardFormat> {
    vec![nextfare()]
}
