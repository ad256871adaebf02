//! PC/SC card reader management

use pcsc::{Attribute, Card, Context, Protocols, Scope, ShareMode, MAX_BUFFER_SIZE};
use tracing::debug;

use crate::model::CardType;
use crate::transceiver::{TransceiveError, Transceiver};

/// Card reader wrapper for managing PC/SC connections
pub struct CardReader {
    context: Context,
}

impl CardReader {
    /// Create a new CardReader by establishing a PC/SC context
    pub fn new() -> Result<Self, pcsc::Error> {
        let context = Context::establish(Scope::User)?;
        Ok(Self { context })
    }

    /// List all available card readers
    pub fn list_readers(&self) -> Result<Vec<String>, pcsc::Error> {
        let mut readers_buf = [0; 2048];
        let readers = self.context.list_readers(&mut readers_buf)?;

        Ok(readers
            .map(|r| r.to_str().unwrap_or("Unknown").to_string())
            .collect())
    }

    /// Connect to the card on the first available reader
    pub fn connect_first(&self) -> Result<(PcscTransceiver, String), pcsc::Error> {
        let mut readers_buf = [0; 2048];
        let mut readers = self.context.list_readers(&mut readers_buf)?;

        if let Some(reader) = readers.next() {
            let reader_name = reader.to_str().unwrap_or("Unknown").to_string();
            let card = self.context.connect(reader, ShareMode::Shared, Protocols::ANY)?;
            debug!(reader = %reader_name, "Connected to card");
            Ok((PcscTransceiver::new(card), reader_name))
        } else {
            Err(pcsc::Error::NoReadersAvailable)
        }
    }

    /// Connect to a specific reader by name (CStr)
    pub fn connect(&self, reader_name: &std::ffi::CStr) -> Result<PcscTransceiver, pcsc::Error> {
        let card = self
            .context
            .connect(reader_name, ShareMode::Shared, Protocols::ANY)?;
        Ok(PcscTransceiver::new(card))
    }
}

/// [`Transceiver`] over a connected PC/SC card
pub struct PcscTransceiver {
    card: Card,
}

impl PcscTransceiver {
    pub fn new(card: Card) -> Self {
        Self { card }
    }

    /// Answer-to-reset reported by the reader
    pub fn atr(&self) -> Result<Vec<u8>, pcsc::Error> {
        self.card.get_attribute_owned(Attribute::AtrString)
    }

    /// Card type guessed from the ATR, `Unknown` when the reader will not say
    pub fn card_type(&self) -> CardType {
        self.atr()
            .map(|atr| CardType::from_atr(&atr))
            .unwrap_or(CardType::Unknown)
    }
}

impl Transceiver for PcscTransceiver {
    fn transceive(&mut self, command: &[u8]) -> Result<Vec<u8>, TransceiveError> {
        let mut rapdu_buf = [0; MAX_BUFFER_SIZE];
        let rapdu = self.card.transmit(command, &mut rapdu_buf)?;
        Ok(rapdu.to_vec())
    }
}
