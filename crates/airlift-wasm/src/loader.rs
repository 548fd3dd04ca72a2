//! Flight loading from local paths and http(s) URLs

use sha1::{Digest, Sha1};
use url::Url;

use crate::error::{Result, WasmError};

/// A loaded flight: the raw wasm plus the provenance recorded in revisions.
#[derive(Debug, Clone)]
pub struct FlightBinary {
    pub bytes: Vec<u8>,

    /// The path or URL the flight was loaded from, verbatim.
    pub ref_: String,

    /// SHA-1 of the flight bytes, hex-encoded.
    pub checksum: String,
}

/// Load a flight from `source`.
///
/// A source that parses as an http(s) URL is fetched over the network;
/// `file://` URLs and plain paths read the filesystem; any other scheme is
/// rejected.
pub async fn load_flight(source: &str) -> Result<FlightBinary> {
    let bytes = match Url::parse(source) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => fetch(url).await?,
        Ok(url) if url.scheme() == "file" => std::fs::read(url.path())?,
        // Single-letter schemes are Windows drive letters, not protocols.
        Ok(url) if url.scheme().len() > 1 => {
            return Err(WasmError::UnsupportedScheme {
                scheme: url.scheme().to_string(),
            });
        }
        _ => std::fs::read(source)?,
    };

    let checksum = hex::encode(Sha1::digest(&bytes));

    Ok(FlightBinary {
        bytes,
        ref_: source.to_string(),
        checksum,
    })
}

async fn fetch(url: Url) -> Result<Vec<u8>> {
    let response = reqwest::get(url.clone()).await?;
    let status = response.status();
    if status.as_u16() >= 400 {
        return Err(WasmError::FetchStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response.bytes().await?.to_vec())
}
