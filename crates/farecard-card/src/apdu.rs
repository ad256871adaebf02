//! APDU (Application Protocol Data Unit) command handling

use tracing::trace;

use crate::transceiver::{TransceiveError, Transceiver};

/// APDU response containing data and status word
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduResponse {
    /// Response data (without status word)
    pub data: Vec<u8>,
    /// Status word SW1
    pub sw1: u8,
    /// Status word SW2
    pub sw2: u8,
}

impl ApduResponse {
    /// Split a raw answer into data and status word
    pub fn parse(raw: &[u8]) -> Result<Self, TransceiveError> {
        if raw.len() < 2 {
            return Err(TransceiveError::Io(format!(
                "response too short: {} bytes",
                raw.len()
            )));
        }

        let sw1 = raw[raw.len() - 2];
        let sw2 = raw[raw.len() - 1];
        let data = raw[..raw.len() - 2].to_vec();

        Ok(Self { data, sw1, sw2 })
    }

    /// Check if the response indicates success (9000)
    pub fn is_success(&self) -> bool {
        self.sw1 == 0x90 && self.sw2 == 0x00
    }

    /// Get the full status word as a 16-bit value
    pub fn status_word(&self) -> u16 {
        ((self.sw1 as u16) << 8) | (self.sw2 as u16)
    }

    /// Get status word as hex string (e.g., "9000")
    pub fn status_string(&self) -> String {
        format!("{:02X}{:02X}", self.sw1, self.sw2)
    }
}

/// Send raw APDU bytes and parse the response
pub fn send_apdu<T: Transceiver + ?Sized>(
    transceiver: &mut T,
    apdu: &[u8],
) -> Result<ApduResponse, TransceiveError> {
    let raw = transceiver.transceive(apdu)?;
    ApduResponse::parse(&raw)
}

/// APDU command builder
#[derive(Clone, PartialEq, Eq)]
pub struct ApduCommand {
    cla: u8,
    ins: u8,
    p1: u8,
    p2: u8,
    data: Vec<u8>,
    le: Option<u8>,
}

impl ApduCommand {
    /// Create a new APDU command
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Vec::new(),
            le: None,
        }
    }

    /// Set command data
    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// Set expected response length
    pub fn le(mut self, le: u8) -> Self {
        self.le = Some(le);
        self
    }

    pub fn ins(&self) -> u8 {
        self.ins
    }

    /// Build the APDU command bytes
    pub fn build(&self) -> Vec<u8> {
        let mut apdu = vec![self.cla, self.ins, self.p1, self.p2];

        if !self.data.is_empty() {
            apdu.push(self.data.len() as u8);
            apdu.extend_from_slice(&self.data);
        }

        if let Some(le) = self.le {
            apdu.push(le);
        }

        apdu
    }

    /// Send this command to the card
    pub fn send<T: Transceiver + ?Sized>(
        &self,
        transceiver: &mut T,
    ) -> Result<ApduResponse, TransceiveError> {
        let response = send_apdu(transceiver, &self.build());
        if let Ok(r) = &response {
            trace!(ins = %format!("{:02X}", self.ins), sw = %r.status_string(), "APDU");
        }
        response
    }
}

// Command data may hold key bytes.
impl std::fmt::Debug for ApduCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApduCommand")
            .field("cla", &format_args!("{:02X}", self.cla))
            .field("ins", &format_args!("{:02X}", self.ins))
            .field("p1", &format_args!("{:02X}", self.p1))
            .field("p2", &format_args!("{:02X}", self.p2))
            .field("data_len", &self.data.len())
            .field("le", &self.le)
            .finish()
    }
}

/// PC/SC pseudo-APDUs for contactless storage cards
pub mod commands {
    use super::ApduCommand;
    use farecard_keys::Key;

    /// Class byte reserved for reader-handled commands
    pub const CLA_READER: u8 = 0xFF;

    pub const INS_LOAD_KEY: u8 = 0x82;
    pub const INS_GENERAL_AUTHENTICATE: u8 = 0x86;
    pub const INS_READ_BINARY: u8 = 0xB0;
    pub const INS_GET_DATA: u8 = 0xCA;

    /// Bytes in one data block
    pub const BLOCK_LEN: u8 = 0x10;

    /// GET DATA for the card's UID
    pub fn get_uid() -> ApduCommand {
        ApduCommand::new(CLA_READER, INS_GET_DATA, 0x00, 0x00).le(0x00)
    }

    /// LOAD KEY into the reader's volatile key slot
    pub fn load_key(slot: u8, key: &Key) -> ApduCommand {
        ApduCommand::new(CLA_READER, INS_LOAD_KEY, 0x00, slot).data(key.bytes().to_vec())
    }

    /// GENERAL AUTHENTICATE a block with the key held in `slot`
    pub fn general_authenticate(block: u8, key: &Key, slot: u8) -> ApduCommand {
        ApduCommand::new(CLA_READER, INS_GENERAL_AUTHENTICATE, 0x00, 0x00).data(vec![
            0x01,
            0x00,
            block,
            key.key_type().auth_code(),
            slot,
        ])
    }

    /// READ BINARY of one 16-byte block
    pub fn read_binary(block: u8) -> ApduCommand {
        ApduCommand::new(CLA_READER, INS_READ_BINARY, 0x00, block).le(BLOCK_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use farecard_keys::{Key, KeyType};

    #[test]
    fn test_apdu_command_build() {
        let cmd = ApduCommand::new(0x00, 0xA4, 0x04, 0x00)
            .data(vec![0xA0, 0x00, 0x00, 0x00, 0x03])
            .le(0x00);

        let apdu = cmd.build();
        assert_eq!(apdu, vec![0x00, 0xA4, 0x04, 0x00, 0x05, 0xA0, 0x00, 0x00, 0x00, 0x03, 0x00]);
    }

    #[test]
    fn test_classic_command_bytes() {
        let key = Key::new(KeyType::B, [0xFF; 6]);
        assert_eq!(commands::get_uid().build(), vec![0xFF, 0xCA, 0x00, 0x00, 0x00]);
        assert_eq!(
            commands::load_key(0x00, &key).build(),
            vec![0xFF, 0x82, 0x00, 0x00, 0x06, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]
        );
        assert_eq!(
            commands::general_authenticate(7, &key, 0x00).build(),
            vec![0xFF, 0x86, 0x00, 0x00, 0x05, 0x01, 0x00, 0x07, 0x61, 0x00]
        );
        assert_eq!(commands::read_binary(4).build(), vec![0xFF, 0xB0, 0x00, 0x04, 0x10]);
    }

    #[test]
    fn test_debug_hides_command_data() {
        let key = Key::new(KeyType::A, [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC]);
        let debug = format!("{:?}", commands::load_key(0, &key));
        assert!(!debug.contains("9A"));
        assert!(debug.contains("data_len: 6"));
    }

    #[test]
    fn test_response_parse() {
        let response = ApduResponse::parse(&[0x01, 0x02, 0x90, 0x00]).unwrap();
        assert_eq!(response.data, vec![0x01, 0x02]);
        assert!(response.is_success());
        assert_eq!(response.status_word(), 0x9000);

        let refused = ApduResponse::parse(&[0x63, 0x00]).unwrap();
        assert!(!refused.is_success());
        assert_eq!(refused.status_string(), "6300");

        assert!(matches!(ApduResponse::parse(&[0x90]), Err(TransceiveError::Io(_))));
    }
}
