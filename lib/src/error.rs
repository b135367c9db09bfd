#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Not enough bytes: have {actual}, need {minimum}")]
    NotEnoughData { actual: usize, minimum: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("unsupported spacecraft id {0}, only COMS-1 (195) is supported")]
    UnsupportedSpacecraft(u8),

    #[error("CRC-16 mismatch on cp_pdu: expected {expected:04x}, computed {computed:04x}")]
    CrcMismatch { expected: u16, computed: u16 },

    #[error("cp_pdu length mismatch: header declared {declared}, got {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("tp_file length mismatch: header declared {declared} bytes, assembled {actual}")]
    TpFileLengthMismatch { declared: u64, actual: u64 },

    #[error("no key in key store for index {0:#x}")]
    UnknownKey(u64),

    #[error("DES decrypt failure: {0}")]
    DecryptFailure(String),

    #[error("goesrecv handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("xRIT header parse error: {0}")]
    InvalidHeader(String),
}

pub type Result<T> = std::result::Result<T, Error>;
