use flate2::write::{DeflateEncoder, GzEncoder};
use flate2::Compression as Flate2Level;
use hearth_config::Compression;
use std::io::Write;
use tracing::warn;

/// Compresses a line-protocol body per the configured algorithm, returning
/// the payload bytes and the `Content-Encoding` value to send with it.
/// Falls back to uncompressed data on any encoder error rather than
/// failing the write outright (§4.3 "compression never blocks a write").
pub fn compress(data: &str, algorithm: Compression, level: u32) -> (Vec<u8>, &'static str) {
    match algorithm {
        Compression::None => (data.as_bytes().to_vec(), "identity"),
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Flate2Level::new(level.clamp(1, 9)));
            match encoder.write_all(data.as_bytes()).and_then(|_| encoder.finish()) {
                Ok(bytes) => (bytes, "gzip"),
                Err(e) => {
                    warn!(error = %e, "gzip compression failed, sending uncompressed");
                    (data.as_bytes().to_vec(), "identity")
                }
            }
        }
        Compression::Deflate => {
            let mut encoder = DeflateEncoder::new(Vec::new(), Flate2Level::new(level.clamp(1, 9)));
            match encoder.write_all(data.as_bytes()).and_then(|_| encoder.finish()) {
                Ok(bytes) => (bytes, "deflate"),
                Err(e) => {
                    warn!(error = %e, "deflate compression failed, sending uncompressed");
                    (data.as_bytes().to_vec(), "identity")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_returns_identity_bytes_unchanged() {
        let (bytes, encoding) = compress("hello", Compression::None, 6);
        assert_eq!(bytes, b"hello");
        assert_eq!(encoding, "identity");
    }

    #[test]
    fn gzip_produces_smaller_output_for_repetitive_data() {
        let data = "a=1i\n".repeat(200);
        let (bytes, encoding) = compress(&data, Compression::Gzip, 6);
        assert_eq!(encoding, "gzip");
        assert!(bytes.len() < data.len());
    }

    #[test]
    fn deflate_round_trips_through_flate2() {
        let data = "measurement field=1i 0";
        let (bytes, encoding) = compress(data, Compression::Deflate, 6);
        assert_eq!(encoding, "deflate");

        let mut decoder = flate2::read::DeflateDecoder::new(&bytes[..]);
        let mut out = String::new();
        std::io::Read::read_to_string(&mut decoder, &mut out).unwrap();
        assert_eq!(out, data);
    }
}
