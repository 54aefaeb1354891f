use thiserror::Error;

/// Everything that can go wrong between reading a provisioning url and
/// printing a passcode.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not an OTP url")]
    NotOtpUrl,
    #[error("bad type: {0}")]
    BadType(String),
    #[error("empty secret")]
    EmptySecret,
    #[error("bad key: {0}")]
    BadKey(String),
    #[error("bad algorithm: {0}")]
    BadAlgorithm(String),
    #[error("bad digits: {0}")]
    BadDigits(String),
    #[error("bad period: {0}")]
    BadPeriod(String),
    #[error("bad counter: {0}")]
    BadCounter(String),
    #[error("bad url encoding in {0}")]
    BadEncoding(String),
    #[error("OTP calculation error: {0}")]
    Crypto(String),
    #[error("failed to open image: {0}")]
    Image(#[from] image::ImageError),
    #[error("no OTP url found in the image")]
    NoQrCode,
}

impl Error {
    /// Only computation failures may succeed on a second attempt; a url or
    /// secret that failed to parse will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Crypto(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
