use std::collections::HashMap;

use log::debug;
use percent_encoding::percent_decode_str;

use crate::error::{Error, Result};
use crate::otp::{Algorithm, Digits, Otp, OtpParams, OtpType, DEFAULT_PERIOD};

const SCHEME: &str = "otpauth://";

/// Percent-decode one url component. `+` is left alone, only `%XX`
/// escapes are decoded.
fn decode_component(raw: &str, what: &str) -> Result<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| Error::BadEncoding(what.to_string()))
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Split a decoded label into issuer and account. Without a colon the
/// whole label is the issuer, not the account.
fn split_label(label: &str) -> (Option<String>, Option<String>) {
    match label.split_once(':') {
        Some((issuer, account)) => (non_empty(issuer.trim()), non_empty(account.trim())),
        None => (non_empty(label.trim()), None),
    }
}

/// Query parameters keyed by lowercased name, values decoded. A later
/// duplicate replaces an earlier one and empty values count as absent.
fn query_params(query: &str) -> Result<HashMap<String, String>> {
    let mut params = HashMap::new();
    for part in query.split('&') {
        let (key, value) = part.split_once('=').unwrap_or((part, ""));
        let key = key.to_lowercase();
        let value = decode_component(value, &key)?;
        if value.is_empty() {
            params.remove(&key);
        } else {
            params.insert(key, value);
        }
    }
    Ok(params)
}

/// Cut `otpauth://{type}/{label}?{query}` into its raw parts. The type is
/// word characters up to the first `/`, the label runs to the first `?`
/// and the query is everything after it, `#` included. Nothing is
/// normalized, so `.` and `..` segments stay part of the label.
fn split_url(input: &str) -> Result<(&str, &str, &str)> {
    let rest = match input.get(..SCHEME.len()) {
        Some(head) if head.eq_ignore_ascii_case(SCHEME) => &input[SCHEME.len()..],
        _ => return Err(Error::NotOtpUrl),
    };
    let (kind, rest) = rest.split_once('/').ok_or(Error::NotOtpUrl)?;
    if kind.is_empty() || !kind.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::NotOtpUrl);
    }
    let (label, query) = rest.split_once('?').ok_or(Error::NotOtpUrl)?;
    if label.is_empty() {
        return Err(Error::NotOtpUrl);
    }
    Ok((kind, label, query))
}

/// Parse an `otpauth://{totp|hotp}/{label}?{query}` provisioning url.
///
/// Sample url
/// otpauth://totp/ACME%20Co:john.doe@email.com?
/// secret=HXDMVJECJJWSRB3HWIZR4IFUGFTMXBOZ&issuer=ACME%20Co
/// &algorithm=SHA256&digits=8&period=40
pub fn parse_url(input: &str) -> Result<Otp> {
    let (kind, label, query) = split_url(input.trim())?;
    let label = decode_component(label, "label")?;
    let (label_issuer, account) = split_label(&label);
    let otp_type: OtpType = kind.parse()?;
    let mut params = query_params(query)?;

    let secret = params.remove("secret").ok_or(Error::EmptySecret)?;
    let algorithm = match params.get("algorithm") {
        Some(v) => v.parse()?,
        None => Algorithm::default(),
    };
    let digits = match params.get("digits") {
        Some(v) => v.parse()?,
        None => Digits::default(),
    };
    let counter = match params.get("counter") {
        Some(v) => match v.parse::<u64>() {
            Ok(n) if n >= 1 => Some(n),
            _ => return Err(Error::BadCounter(v.clone())),
        },
        None => None,
    };
    if otp_type == OtpType::Hotp && counter.is_none() {
        return Err(Error::BadCounter(String::from("missing")));
    }
    let period = match params.get("period") {
        Some(v) => match v.parse::<u32>() {
            Ok(n) if n >= 1 => n,
            _ => return Err(Error::BadPeriod(v.clone())),
        },
        None => DEFAULT_PERIOD,
    };
    let issuer = label_issuer.or_else(|| params.remove("issuer"));

    debug!(
        "parsed {} url for issuer {:?}, account {:?}",
        otp_type, issuer, account
    );

    Otp::build(
        Some(input.to_string()),
        OtpParams {
            otp_type,
            secret,
            account,
            issuer,
            digits,
            algorithm,
            period,
            counter,
        },
    )
}

/// Build a TOTP url around a bare secret, eg. one typed in by hand.
/// Absent parameters are left out of the query.
pub fn make_url(secret: &str, period: Option<u32>, digits: Option<Digits>) -> String {
    let mut url = format!("otpauth://totp/default?secret={}", secret);
    if let Some(period) = period {
        url.push_str(&format!("&period={}", period));
    }
    if let Some(digits) = digits {
        url.push_str(&format!("&digits={}", digits));
    }
    url
}
