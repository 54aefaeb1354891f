use std::path::Path;

use image::DynamicImage;
use log::{debug, info};

use crate::error::{Error, Result};

/// Read the first QR code in the image file at `path` and return the text
/// it carries, normally an `otpauth://` provisioning url.
pub fn read_url<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let img = image::open(path)?;
    debug!("image loaded from {}", path.display());
    decode_url(&img)
}

/// Decode an already loaded image. Codes that fail to decode are skipped;
/// an image without any readable code is an error.
pub fn decode_url(img: &DynamicImage) -> Result<String> {
    let decoder = bardecoder::default_decoder();
    let url = decoder
        .decode(img)
        .into_iter()
        .filter_map(|res| match res {
            Ok(text) => Some(text),
            Err(e) => {
                debug!("skipping unreadable QR code: {}", e);
                None
            }
        })
        .find(|text| !text.is_empty())
        .ok_or(Error::NoQrCode)?;

    info!("QR code read");
    Ok(url)
}
