//! One-time passcodes from `otpauth://` provisioning urls.
//!
//! A url is parsed into an immutable [`Otp`] descriptor, which then computes
//! TOTP or HOTP codes on demand:
//!
//! ```no_run
//! let otp = otp_engine::parse_url(
//!     "otpauth://totp/Example:alice@google.com?secret=JBSWY3DPEHPK3PXP",
//! )?;
//! let code = otp.next()?;
//! println!("{} ({} ms left)", code.passcode, code.time_left.unwrap_or(0));
//! # Ok::<(), otp_engine::Error>(())
//! ```

pub mod base32;
pub mod error;
pub mod otp;
pub mod otpauth;
pub mod qrcode;

pub use crate::base32::is_secret;
pub use crate::error::{Error, Result};
pub use crate::otp::{Algorithm, Code, Digits, Otp, OtpParams, OtpType};
pub use crate::otpauth::{make_url, parse_url};
