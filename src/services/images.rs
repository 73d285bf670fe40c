use crate::error::ApiError;

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Sniff the image format from magic bytes and enforce the size cap. The
/// client-declared content type is ignored; the stored MIME always matches
/// the bytes actually served back.
pub fn validate_image(data: &[u8]) -> Result<&'static str, ApiError> {
    if data.len() > MAX_IMAGE_BYTES {
        return Err(ApiError::InvalidInput(
            "Image must be 5 MiB or smaller".into(),
        ));
    }

    sniff_mime(data).ok_or_else(|| {
        ApiError::InvalidInput("Image must be PNG, JPEG, GIF, or WebP".into())
    })
}

fn sniff_mime(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if data.starts_with(b"\xff\xd8\xff") {
        Some("image/jpeg")
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_the_accepted_formats() {
        assert_eq!(sniff_mime(b"\x89PNG\r\n\x1a\nrest"), Some("image/png"));
        assert_eq!(sniff_mime(b"\xff\xd8\xff\xe0rest"), Some("image/jpeg"));
        assert_eq!(sniff_mime(b"GIF89a;"), Some("image/gif"));
        assert_eq!(sniff_mime(b"RIFF\x00\x00\x00\x00WEBPVP8 "), Some("image/webp"));
    }

    #[test]
    fn rejects_unknown_bytes_and_oversized_payloads() {
        assert!(sniff_mime(b"<svg></svg>").is_none());
        assert!(validate_image(b"not an image").is_err());

        let mut big = vec![0u8; MAX_IMAGE_BYTES + 1];
        big[..8].copy_from_slice(b"\x89PNG\r\n\x1a\n");
        assert!(validate_image(&big).is_err());
    }
}
