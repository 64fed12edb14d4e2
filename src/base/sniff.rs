//! Content-type detection from leading bytes.
//!
//! Server-declared headers are never trusted for attachments; the type sent to the
//! model is derived from the payload itself.

/// Known signatures, checked in order.
const SIGNATURES: &[(&[u8], &str)] = &[
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"BM", "image/bmp"),
    (b"%PDF-", "application/pdf"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1f\x8b\x08", "application/x-gzip"),
    (b"ID3", "audio/mpeg"),
    (b"OggS", "application/ogg"),
    (b"fLaC", "audio/flac"),
    (b"\x1aE\xdf\xa3", "video/webm"),
    (b"\x00\x00\x01\x00", "image/x-icon"),
];

/// Detect the MIME type of `data`.
///
/// Falls back to `text/plain; charset=utf-8` for printable UTF-8 and
/// `application/octet-stream` for anything else.
pub fn detect_content_type(data: &[u8]) -> &'static str {
    // Byte-order marks win over every binary signature.
    if data.starts_with(b"\xfe\xff") {
        return "text/plain; charset=utf-16be";
    }
    if data.starts_with(b"\xff\xfe") {
        return "text/plain; charset=utf-16le";
    }
    if data.starts_with(b"\xef\xbb\xbf") {
        return "text/plain; charset=utf-8";
    }

    if let Some((_, mime)) = SIGNATURES.iter().find(|(magic, _)| data.starts_with(magic)) {
        return *mime;
    }

    // RIFF containers and ISO base media carry the brand at an offset.
    if data.len() >= 12 && &data[..4] == b"RIFF" {
        match &data[8..12] {
            b"WEBP" => return "image/webp",
            b"WAVE" => return "audio/wave",
            b"AVI " => return "video/avi",
            _ => {}
        }
    }

    if data.len() >= 12 && &data[4..8] == b"ftyp" {
        return match &data[8..12] {
            b"heic" | b"heix" => "image/heic",
            b"M4A " => "audio/mp4",
            _ => "video/mp4",
        };
    }

    if is_mpeg_frame_header(data) {
        return "audio/mpeg";
    }

    match std::str::from_utf8(data) {
        Ok(text) if !text.chars().any(|c| c.is_control() && !c.is_whitespace()) => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// A bare MPEG audio frame: sync bits plus a version, layer, bitrate and
/// sample rate that are not reserved.
fn is_mpeg_frame_header(data: &[u8]) -> bool {
    let [first, second, third, ..] = data else {
        return false;
    };

    let version = (second >> 3) & 0b11;
    let layer = (second >> 1) & 0b11;
    let bitrate = third >> 4;
    let sample_rate = (third >> 2) & 0b11;

    *first == 0xff && (second & 0xe0) == 0xe0 && version != 0b01 && layer != 0b00 && bitrate != 0b1111 && sample_rate != 0b11
}

// Tests.
