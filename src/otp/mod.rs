mod clock;
mod hmac;

use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

use log::{debug, error};

use crate::base32;
use crate::error::{Error, Result};

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::hmac::{HmacProvider, Ring};

pub const DEFAULT_PERIOD: u32 = 30;

/// Issuer whose codes use the Steam Guard alphabet instead of decimals.
pub const STEAM_ISSUER: &str = "Steam";
const STEAM_CHARS: &[u8] = b"23456789BCDFGHJKMNPQRTVWXY";
const STEAM_CODE_LEN: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OtpType {
    Totp,
    Hotp,
}

impl OtpType {
    pub fn as_str(self) -> &'static str {
        match self {
            OtpType::Totp => "totp",
            OtpType::Hotp => "hotp",
        }
    }
}

impl FromStr for OtpType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "totp" => Ok(OtpType::Totp),
            "hotp" => Ok(OtpType::Hotp),
            other => Err(Error::BadType(other.to_string())),
        }
    }
}

impl fmt::Display for OtpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    Sha1,
    Sha256,
    Sha512,
}

impl Default for Algorithm {
    fn default() -> Self {
        Algorithm::Sha1
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "SHA1" => Ok(Algorithm::Sha1),
            "SHA256" => Ok(Algorithm::Sha256),
            "SHA512" => Ok(Algorithm::Sha512),
            other => Err(Error::BadAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Algorithm::Sha1 => "SHA1",
            Algorithm::Sha256 => "SHA256",
            Algorithm::Sha512 => "SHA512",
        })
    }
}

/// Length of a decimal passcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Digits {
    Six,
    Seven,
    Eight,
}

impl Digits {
    pub fn len(self) -> usize {
        match self {
            Digits::Six => 6,
            Digits::Seven => 7,
            Digits::Eight => 8,
        }
    }
}

impl Default for Digits {
    fn default() -> Self {
        Digits::Six
    }
}

impl TryFrom<u8> for Digits {
    type Error = Error;

    fn try_from(n: u8) -> Result<Self> {
        match n {
            6 => Ok(Digits::Six),
            7 => Ok(Digits::Seven),
            8 => Ok(Digits::Eight),
            other => Err(Error::BadDigits(other.to_string())),
        }
    }
}

impl FromStr for Digits {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let n: u8 = s.parse().map_err(|_| Error::BadDigits(s.to_string()))?;
        Digits::try_from(n)
    }
}

impl fmt::Display for Digits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.len())
    }
}

/// Structured input for [`Otp::new`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OtpParams {
    pub otp_type: OtpType,
    pub secret: String,
    pub account: Option<String>,
    pub issuer: Option<String>,
    pub digits: Digits,
    pub algorithm: Algorithm,
    pub period: u32,
    pub counter: Option<u64>,
}

impl OtpParams {
    /// TOTP parameters with the usual defaults: SHA1, six digits, 30s.
    pub fn totp<S: Into<String>>(secret: S) -> Self {
        OtpParams {
            otp_type: OtpType::Totp,
            secret: secret.into(),
            account: None,
            issuer: None,
            digits: Digits::default(),
            algorithm: Algorithm::default(),
            period: DEFAULT_PERIOD,
            counter: None,
        }
    }

    pub fn hotp<S: Into<String>>(secret: S, counter: u64) -> Self {
        OtpParams {
            otp_type: OtpType::Hotp,
            counter: Some(counter),
            ..OtpParams::totp(secret)
        }
    }
}

/// A passcode and, for TOTP, the milliseconds until it rotates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Code {
    pub passcode: String,
    pub time_left: Option<u64>,
}

/// An OTP account: everything needed to compute its codes. Immutable once
/// built; computing a code never advances the HOTP counter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Otp {
    url: Option<String>,
    otp_type: OtpType,
    secret: String,
    key: Vec<u8>,
    account: Option<String>,
    issuer: Option<String>,
    digits: Digits,
    algorithm: Algorithm,
    period: u32,
    counter: Option<u64>,
}

/// The moving factor as the 8 byte big endian message that gets signed.
/// Only the low 32 bits are carried, the high 4 bytes stay zero.
/// Eg: 1337 -> [0, 0, 0, 0, 0, 0, 0x05, 0x39]
struct Bytes([u8; 8]);

impl From<u64> for Bytes {
    fn from(v: u64) -> Bytes {
        let mut x = [0u8; 8];
        x[4..].copy_from_slice(&(v as u32).to_be_bytes());
        Bytes(x)
    }
}

impl Otp {
    /// Build a descriptor from structured parameters. Fails if the secret
    /// does not decode to a key, on a zero TOTP period, and on a missing or
    /// zero HOTP counter.
    pub fn new(params: OtpParams) -> Result<Otp> {
        Otp::build(None, params)
    }

    pub(crate) fn build(url: Option<String>, params: OtpParams) -> Result<Otp> {
        let key = base32::decode(&params.secret)?;
        if key.is_empty() {
            return Err(Error::BadKey(String::from("secret decodes to an empty key")));
        }
        if params.otp_type == OtpType::Totp && params.period < 1 {
            return Err(Error::BadPeriod(params.period.to_string()));
        }
        match params.counter {
            Some(0) => return Err(Error::BadCounter(String::from("0"))),
            None if params.otp_type == OtpType::Hotp => {
                return Err(Error::BadCounter(String::from("missing")))
            }
            _ => {}
        }

        Ok(Otp {
            url,
            otp_type: params.otp_type,
            secret: params.secret,
            key,
            account: params.account,
            issuer: params.issuer,
            digits: params.digits,
            algorithm: params.algorithm,
            period: params.period,
            counter: params.counter,
        })
    }

    /// The url this descriptor was parsed from, if any.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn otp_type(&self) -> OtpType {
        self.otp_type
    }

    /// The secret exactly as it was given, still base32.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Raw key bytes decoded from the secret.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    pub fn digits(&self) -> Digits {
        self.digits
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn period(&self) -> u32 {
        self.period
    }

    pub fn counter(&self) -> Option<u64> {
        self.counter
    }

    pub fn is_steam(&self) -> bool {
        self.issuer() == Some(STEAM_ISSUER)
    }

    /// Current code by the system clock.
    pub fn next(&self) -> Result<Code> {
        self.next_with(&SystemClock, &Ring)
    }

    /// Code at `now_ms` milliseconds since the unix epoch.
    pub fn next_at(&self, now_ms: u64) -> Result<Code> {
        self.next_with(&FixedClock(now_ms), &Ring)
    }

    /// Compute the code with an explicit clock and HMAC provider. Provider
    /// failures come back as [`Error::Crypto`]; the descriptor is still
    /// good and the call may be repeated.
    pub fn next_with<C, P>(&self, clock: &C, provider: &P) -> Result<Code>
    where
        C: Clock,
        P: HmacProvider,
    {
        let (moving_factor, time_left) = match self.otp_type {
            OtpType::Totp => {
                let now = clock.now_millis();
                let period = u64::from(self.period);
                // whole seconds, rounded to the nearest
                let epoch = now / 1000 + u64::from(now % 1000 >= 500);
                let period_ms = period * 1000;
                (epoch / period, Some(period_ms - now % period_ms))
            }
            OtpType::Hotp => {
                let counter = self
                    .counter
                    .ok_or_else(|| Error::BadCounter(String::from("missing")))?;
                (counter, None)
            }
        };

        let signature = self.sign(provider, moving_factor).map_err(|e| {
            error!("OTP calculation error: {}", e);
            e
        })?;
        let code = truncate(&signature)?;
        let passcode = if self.is_steam() {
            steam_code(code)
        } else {
            decimal_code(code, self.digits)
        };
        debug!("{} code computed for moving factor {}", self.otp_type, moving_factor);

        Ok(Code {
            passcode,
            time_left,
        })
    }

    fn sign<P: HmacProvider>(&self, provider: &P, moving_factor: u64) -> Result<Vec<u8>> {
        let key = provider.import_key(self.algorithm, &self.key)?;
        provider.sign(&key, &Bytes::from(moving_factor).0)
    }
}

/// Dynamic truncation: the low nibble of the last byte picks a 4 byte
/// window, read big endian with the sign bit cleared.
fn truncate(signature: &[u8]) -> Result<u32> {
    let last = signature
        .last()
        .ok_or_else(|| Error::Crypto(String::from("empty signature")))?;
    let offset = (last & 0x0f) as usize;
    let window = signature.get(offset..offset + 4).ok_or_else(|| {
        Error::Crypto(format!("signature too short: {} bytes", signature.len()))
    })?;

    let mut word = [0u8; 4];
    word.copy_from_slice(window);
    Ok(u32::from_be_bytes(word) & 0x7fff_ffff)
}

/// Last `digits` decimal characters of the code, zero padded.
///
/// A code with fewer decimal characters than `digits` keeps only its last
/// `2 * len - digits` characters before padding. Codes already handed out
/// by other clients depend on this, so it must not be "fixed" to a plain
/// modulo.
fn decimal_code(code: u32, digits: Digits) -> String {
    let text = code.to_string();
    let (len, width) = (text.len(), digits.len());
    let start = if len >= width {
        len - width
    } else {
        (2 * len).saturating_sub(width)
    };
    format!("{:0>w$}", &text[start..], w = width)
}

/// Five characters of the Steam alphabet, least significant first.
fn steam_code(mut code: u32) -> String {
    let base = STEAM_CHARS.len() as u32;
    let mut out = String::with_capacity(STEAM_CODE_LEN);
    for _ in 0..STEAM_CODE_LEN {
        out.push(STEAM_CHARS[(code % base) as usize] as char);
        code /= base;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    // "12345678901234567890", the RFC 4226 test key
    const RFC_SHA1: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";
    const RFC_SHA256: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZA";
    const RFC_SHA512: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNA";

    fn hotp(counter: u64) -> Otp {
        Otp::new(OtpParams::hotp(RFC_SHA1, counter)).unwrap()
    }

    fn rfc6238(secret: &str, algorithm: Algorithm) -> Otp {
        Otp::new(OtpParams {
            digits: Digits::Eight,
            algorithm,
            ..OtpParams::totp(secret)
        })
        .unwrap()
    }

    struct Failing;

    impl HmacProvider for Failing {
        type Key = ();

        fn import_key(&self, _: Algorithm, _: &[u8]) -> Result<()> {
            Ok(())
        }

        fn sign(&self, _: &(), _: &[u8]) -> Result<Vec<u8>> {
            Err(Error::Crypto(String::from("provider busy")))
        }
    }

    struct Short;

    impl HmacProvider for Short {
        type Key = ();

        fn import_key(&self, _: Algorithm, _: &[u8]) -> Result<()> {
            Ok(())
        }

        fn sign(&self, _: &(), _: &[u8]) -> Result<Vec<u8>> {
            Ok(vec![0, 0, 0x0f])
        }
    }

    #[test]
    fn rfc4226_test_counter_1() {
        let code = hotp(1).next_at(0).unwrap();
        assert_eq!(code.passcode, "287082");
        assert_eq!(code.time_left, None);
    }

    #[test]
    fn rfc4226_test_counter_9() {
        assert_eq!(hotp(9).next().unwrap().passcode, "520489");
    }

    #[test]
    fn rfc4226_more_counters() {
        assert_eq!(hotp(2).next().unwrap().passcode, "359152");
        assert_eq!(hotp(5).next().unwrap().passcode, "254676");
    }

    #[test]
    fn hotp_is_a_pure_function_of_the_counter() {
        let otp = hotp(7);
        let first = otp.next_at(0).unwrap();
        let second = otp.next_at(99_999_999).unwrap();
        assert_eq!(first, second);
        assert_eq!(otp.counter(), Some(7));
        assert_ne!(first.passcode, hotp(8).next().unwrap().passcode);
    }

    #[test]
    fn rfc6238_vectors() {
        let code = rfc6238(RFC_SHA1, Algorithm::Sha1).next_at(59_000).unwrap();
        assert_eq!(code.passcode, "94287082");
        assert_eq!(code.time_left, Some(1_000));

        let code = rfc6238(RFC_SHA256, Algorithm::Sha256).next_at(59_000).unwrap();
        assert_eq!(code.passcode, "46119246");

        let code = rfc6238(RFC_SHA512, Algorithm::Sha512).next_at(59_000).unwrap();
        assert_eq!(code.passcode, "90693936");

        let code = rfc6238(RFC_SHA1, Algorithm::Sha1)
            .next_at(1_111_111_109_000)
            .unwrap();
        assert_eq!(code.passcode, "07081804");
    }

    #[test]
    fn totp_rounds_to_the_nearest_second() {
        let otp = rfc6238(RFC_SHA1, Algorithm::Sha1);
        // 29.6s rounds up into the second step
        let code = otp.next_at(29_600).unwrap();
        assert_eq!(code.passcode, "94287082");
        assert_eq!(code.time_left, Some(400));
        assert_ne!(otp.next_at(29_400).unwrap().passcode, "94287082");
    }

    #[test]
    fn far_future_clock_still_yields_a_code() {
        let otp = rfc6238(RFC_SHA1, Algorithm::Sha1);
        let code = otp.next_at(u64::MAX).unwrap();
        assert_eq!(code.passcode.len(), 8);
        assert_eq!(code.time_left, Some(30_000 - u64::MAX % 30_000));
        // rounding at the top of the range stays in the same step
        assert_eq!(
            otp.next_at(u64::MAX - 499).unwrap().passcode,
            code.passcode
        );
    }

    #[test]
    fn same_instant_same_code() {
        let otp = rfc6238(RFC_SHA1, Algorithm::Sha1);
        let clock = FixedClock(1620941762428);
        assert_eq!(
            otp.next_with(&clock, &Ring).unwrap(),
            otp.next_with(&clock, &Ring).unwrap()
        );
    }

    #[test]
    fn steam_codes_use_their_own_alphabet() {
        let otp = Otp::new(OtpParams {
            issuer: Some(String::from(STEAM_ISSUER)),
            digits: Digits::Eight,
            ..OtpParams::totp(RFC_SHA1)
        })
        .unwrap();
        let code = otp.next_at(59_000).unwrap();
        assert_eq!(code.passcode, "PV9M4");

        for now in (0..20).map(|i| 1620941762428 + i * 30_000) {
            let passcode = otp.next_at(now).unwrap().passcode;
            assert_eq!(passcode.len(), STEAM_CODE_LEN);
            assert!(passcode.bytes().all(|c| STEAM_CHARS.contains(&c)));
        }
    }

    #[test]
    fn steam_code_is_base_26_low_digit_first() {
        assert_eq!(steam_code(0), "22222");
        assert_eq!(steam_code(1), "32222");
        assert_eq!(steam_code(26), "23222");
        assert_eq!(steam_code(1094287082), "PV9M4");
    }

    #[test]
    fn decimal_code_padding() {
        assert_eq!(decimal_code(1094287082, Digits::Six), "287082");
        assert_eq!(decimal_code(1094287082, Digits::Eight), "94287082");
        assert_eq!(decimal_code(42, Digits::Six), "000042");
        assert_eq!(decimal_code(123456, Digits::Six), "123456");
        // shorter than the requested width
        assert_eq!(decimal_code(7128456, Digits::Eight), "00000006");
        assert_eq!(decimal_code(12345, Digits::Six), "000005");
    }

    #[test]
    fn moving_factor_bytes() {
        let mut v = [0u8; 8];
        v[7] = 0x39;
        v[6] = 0x5;
        assert_eq!(Bytes::from(1337).0, v);
        // only the low 32 bits are hashed
        assert_eq!(Bytes::from(0x1_0000_0001).0, Bytes::from(1).0);
    }

    #[test]
    fn truncation_window() {
        let mut sig = [0u8; 20];
        sig[19] = 0x0a;
        sig[10..14].copy_from_slice(&[0xff, 0x12, 0x34, 0x56]);
        assert_eq!(truncate(&sig).unwrap(), 0x7f12_3456);
    }

    #[test]
    fn provider_failures_surface_and_are_retryable() {
        let err = hotp(1).next_with(&SystemClock, &Failing).unwrap_err();
        assert!(matches!(err, Error::Crypto(_)));
        assert!(err.is_retryable());

        let err = hotp(1).next_with(&SystemClock, &Short).unwrap_err();
        assert!(matches!(err, Error::Crypto(_)));
    }

    #[test]
    fn construction_checks_invariants() {
        assert!(matches!(
            Otp::new(OtpParams::totp("A")),
            Err(Error::BadKey(_))
        ));
        assert!(matches!(
            Otp::new(OtpParams::totp("not base32!")),
            Err(Error::BadKey(_))
        ));
        assert!(matches!(
            Otp::new(OtpParams {
                period: 0,
                ..OtpParams::totp(RFC_SHA1)
            }),
            Err(Error::BadPeriod(_))
        ));
        assert!(matches!(
            Otp::new(OtpParams::hotp(RFC_SHA1, 0)),
            Err(Error::BadCounter(_))
        ));
        assert!(matches!(
            Otp::new(OtpParams {
                otp_type: OtpType::Hotp,
                ..OtpParams::totp(RFC_SHA1)
            }),
            Err(Error::BadCounter(_))
        ));
    }

    #[test]
    fn concurrent_computation_needs_no_locking() {
        let otp = Arc::new(rfc6238(RFC_SHA1, Algorithm::Sha1));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let otp = Arc::clone(&otp);
                thread::spawn(move || otp.next_at(59_000).unwrap().passcode)
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), "94287082");
        }
    }

    #[test]
    fn enum_parsing() {
        assert_eq!("TOTP".parse::<OtpType>().unwrap(), OtpType::Totp);
        assert!(matches!("motp".parse::<OtpType>(), Err(Error::BadType(_))));
        assert_eq!("sha256".parse::<Algorithm>().unwrap(), Algorithm::Sha256);
        assert!(matches!("MD5".parse::<Algorithm>(), Err(Error::BadAlgorithm(_))));
        assert_eq!("7".parse::<Digits>().unwrap(), Digits::Seven);
        assert!(matches!("9".parse::<Digits>(), Err(Error::BadDigits(_))));
        assert!(matches!("six".parse::<Digits>(), Err(Error::BadDigits(_))));
    }
}
