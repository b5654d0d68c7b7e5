//! Image format and dimension sniffing from the first bytes of a file.
//!
//! Headers are parsed by hand for the common web formats; anything else is
//! handed to the `image` crate's format guesser.

use std::io::Cursor;

use lazy_static::lazy_static;
use regex::bytes::Regex;

use crate::error::{SniffError, SniffResult};

lazy_static! {
    static ref SVG_TAG: Regex = Regex::new(r"(?is)<svg\s[^>]*>").unwrap();
    static ref SVG_WIDTH: Regex =
        Regex::new(r#"(?i)\swidth\s*=\s*(["'])(\d*\.?\d+)(?:px)?["']"#).unwrap();
    static ref SVG_HEIGHT: Regex =
        Regex::new(r#"(?i)\sheight\s*=\s*(["'])(\d*\.?\d+)(?:px)?["']"#).unwrap();
    static ref PNM: Regex = Regex::new(r"^(P[1-6])\s+(\d+)\s+(\d+)").unwrap();
}

/// Image formats the sniffer recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SniffedFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Tiff,
    WebP,
    Svg,
    Psd,
    Mng,
    Pcx,
    SunRaster,
    Pnm,
    /// Recognised only by the general-purpose decoder.
    Decoded(image::ImageFormat),
}

impl SniffedFormat {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Jpeg => "JPEG",
            Self::Png => "PNG",
            Self::Gif => "GIF",
            Self::Bmp => "BMP",
            Self::Tiff => "TIFF",
            Self::WebP => "WEBP",
            Self::Svg => "SVG",
            Self::Psd => "PSD",
            Self::Mng => "MNG",
            Self::Pcx => "PCX",
            Self::SunRaster => "RAS",
            Self::Pnm => "PPM",
            Self::Decoded(_) => "OTHER",
        }
    }

    /// File extension including the leading dot.
    pub fn extension(&self) -> String {
        let ext = match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
            Self::WebP => "webp",
            Self::Svg => "svg",
            Self::Psd => "psd",
            Self::Mng => "mng",
            Self::Pcx => "pcx",
            Self::SunRaster => "ras",
            Self::Pnm => "ppm",
            Self::Decoded(fmt) => fmt.extensions_str().first().copied().unwrap_or("img"),
        };
        format!(".{}", ext)
    }
}

/// Format and pixel dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: SniffedFormat,
    pub width: u32,
    pub height: u32,
}

/// Identify an image and read its dimensions without decoding pixels.
pub fn sniff(data: &[u8]) -> SniffResult<ImageInfo> {
    let (format, (width, height)) = if data.starts_with(b"\xFF\xD8") {
        (SniffedFormat::Jpeg, jpeg_size(data)?)
    } else if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        (SniffedFormat::Png, chunk_header_size(data, b"IHDR", "PNG")?)
    } else if data.starts_with(b"\x8aMNG\r\n\x1a\n") {
        (SniffedFormat::Mng, chunk_header_size(data, b"MHDR", "MNG")?)
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        (SniffedFormat::Gif, gif_size(data)?)
    } else if data.starts_with(b"BM") {
        (SniffedFormat::Bmp, bmp_size(data)?)
    } else if data.starts_with(b"II\x2a\x00") || data.starts_with(b"MM\x00\x2a") {
        (SniffedFormat::Tiff, tiff_size(data)?)
    } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        (SniffedFormat::WebP, webp_size(data)?)
    } else if data.starts_with(b"8BPS") {
        (SniffedFormat::Psd, psd_size(data)?)
    } else if data.starts_with(b"\x59\xA6\x6A\x95") {
        (SniffedFormat::SunRaster, sun_raster_size(data)?)
    } else if data.len() >= 3 && data[0] == 0x0A && data[2] == 0x01 {
        (SniffedFormat::Pcx, pcx_size(data)?)
    } else if PNM.is_match(data) {
        (SniffedFormat::Pnm, pnm_size(data)?)
    } else if SVG_TAG.is_match(data) {
        (SniffedFormat::Svg, svg_size(data)?)
    } else {
        return decoder_fallback(data);
    };

    if width == 0 || height == 0 {
        return Err(SniffError::Corrupt {
            format: format.name(),
        });
    }
    Ok(ImageInfo {
        format,
        width,
        height,
    })
}

fn corrupt(format: &'static str) -> SniffError {
    SniffError::Corrupt { format }
}

fn be16(data: &[u8], at: usize) -> Option<u32> {
    let b = data.get(at..at + 2)?;
    Some(u16::from_be_bytes([b[0], b[1]]) as u32)
}

fn le16(data: &[u8], at: usize) -> Option<u32> {
    let b = data.get(at..at + 2)?;
    Some(u16::from_le_bytes([b[0], b[1]]) as u32)
}

fn be32(data: &[u8], at: usize) -> Option<u32> {
    let b = data.get(at..at + 4)?;
    Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn le32(data: &[u8], at: usize) -> Option<u32> {
    let b = data.get(at..at + 4)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn le24(data: &[u8], at: usize) -> Option<u32> {
    let b = data.get(at..at + 3)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], 0]))
}

fn jpeg_size(data: &[u8]) -> SniffResult<(u32, u32)> {
    let mut pos = 2;
    loop {
        // Markers may be padded with any number of 0xFF fill bytes.
        while data.get(pos) == Some(&0xFF) && data.get(pos + 1) == Some(&0xFF) {
            pos += 1;
        }
        if data.get(pos) != Some(&0xFF) {
            return Err(corrupt("JPEG"));
        }
        let code = *data.get(pos + 1).ok_or_else(|| corrupt("JPEG"))?;
        pos += 2;
        match code {
            // Standalone markers carry no length.
            0x01 | 0xD0..=0xD7 => continue,
            0xD9 | 0xDA => return Err(corrupt("JPEG")),
            // Start-of-frame: precision byte, then height and width.
            0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF => {
                let height = be16(data, pos + 3).ok_or_else(|| corrupt("JPEG"))?;
                let width = be16(data, pos + 5).ok_or_else(|| corrupt("JPEG"))?;
                return Ok((width, height));
            }
            _ => {
                let len = be16(data, pos).ok_or_else(|| corrupt("JPEG"))? as usize;
                if len < 2 {
                    return Err(corrupt("JPEG"));
                }
                pos += len;
            }
        }
    }
}

fn chunk_header_size(data: &[u8], chunk: &[u8], format: &'static str) -> SniffResult<(u32, u32)> {
    if data.get(12..16) != Some(chunk) {
        return Err(corrupt(format));
    }
    let width = be32(data, 16).ok_or_else(|| corrupt(format))?;
    let height = be32(data, 20).ok_or_else(|| corrupt(format))?;
    Ok((width, height))
}

fn gif_size(data: &[u8]) -> SniffResult<(u32, u32)> {
    let width = le16(data, 6).ok_or_else(|| corrupt("GIF"))?;
    let height = le16(data, 8).ok_or_else(|| corrupt("GIF"))?;
    Ok((width, height))
}

fn bmp_size(data: &[u8]) -> SniffResult<(u32, u32)> {
    let width = le32(data, 18).ok_or_else(|| corrupt("BMP"))?;
    // Negative heights mark top-down bitmaps.
    let height = le32(data, 22).ok_or_else(|| corrupt("BMP"))? as i32;
    Ok((width, height.unsigned_abs()))
}

fn tiff_size(data: &[u8]) -> SniffResult<(u32, u32)> {
    let little = data.starts_with(b"II");
    let u16_at = |at| if little { le16(data, at) } else { be16(data, at) };
    let u32_at = |at| if little { le32(data, at) } else { be32(data, at) };

    let ifd = u32_at(4).ok_or_else(|| corrupt("TIFF"))? as usize;
    let entries = u16_at(ifd).ok_or_else(|| corrupt("TIFF"))? as usize;
    let (mut width, mut height) = (0, 0);
    for i in 0..entries {
        let entry = ifd + 2 + i * 12;
        let (Some(tag), Some(kind)) = (u16_at(entry), u16_at(entry + 2)) else {
            break;
        };
        let value = match kind {
            1 => data.get(entry + 8).map(|b| *b as u32),
            3 | 8 => u16_at(entry + 8),
            4 | 9 => u32_at(entry + 8),
            _ => None,
        };
        match (tag, value) {
            (0x0100, Some(v)) => width = v,
            (0x0101, Some(v)) => height = v,
            _ => {}
        }
        if width > 0 && height > 0 {
            break;
        }
    }
    Ok((width, height))
}

fn webp_size(data: &[u8]) -> SniffResult<(u32, u32)> {
    match data.get(12..16) {
        Some(b"VP8 ") => {
            if data.get(23..26) != Some(&b"\x9d\x01\x2a"[..]) {
                return Err(corrupt("WEBP"));
            }
            let width = le16(data, 26).ok_or_else(|| corrupt("WEBP"))? & 0x3FFF;
            let height = le16(data, 28).ok_or_else(|| corrupt("WEBP"))? & 0x3FFF;
            Ok((width, height))
        }
        Some(b"VP8L") => {
            if data.get(20) != Some(&0x2F) {
                return Err(corrupt("WEBP"));
            }
            let bits = le32(data, 21).ok_or_else(|| corrupt("WEBP"))?;
            Ok(((bits & 0x3FFF) + 1, ((bits >> 14) & 0x3FFF) + 1))
        }
        Some(b"VP8X") => {
            let width = le24(data, 24).ok_or_else(|| corrupt("WEBP"))? + 1;
            let height = le24(data, 27).ok_or_else(|| corrupt("WEBP"))? + 1;
            Ok((width, height))
        }
        _ => Err(corrupt("WEBP")),
    }
}

fn psd_size(data: &[u8]) -> SniffResult<(u32, u32)> {
    let height = be32(data, 14).ok_or_else(|| corrupt("PSD"))?;
    let width = be32(data, 18).ok_or_else(|| corrupt("PSD"))?;
    Ok((width, height))
}

fn sun_raster_size(data: &[u8]) -> SniffResult<(u32, u32)> {
    let width = be32(data, 4).ok_or_else(|| corrupt("RAS"))?;
    let height = be32(data, 8).ok_or_else(|| corrupt("RAS"))?;
    Ok((width, height))
}

fn pcx_size(data: &[u8]) -> SniffResult<(u32, u32)> {
    let read = |at| le16(data, at).ok_or_else(|| corrupt("PCX"));
    let (xmin, ymin, xmax, ymax) = (read(4)?, read(6)?, read(8)?, read(10)?);
    if xmax < xmin || ymax < ymin {
        return Err(corrupt("PCX"));
    }
    Ok((xmax - xmin + 1, ymax - ymin + 1))
}

fn pnm_size(data: &[u8]) -> SniffResult<(u32, u32)> {
    let caps = PNM.captures(data).ok_or_else(|| corrupt("PPM"))?;
    let number = |i| {
        std::str::from_utf8(&caps[i])
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or_else(|| corrupt("PPM"))
    };
    Ok((number(2)?, number(3)?))
}

fn svg_size(data: &[u8]) -> SniffResult<(u32, u32)> {
    let tag = SVG_TAG.find(data).ok_or_else(|| corrupt("SVG"))?.as_bytes();
    let dimension = |re: &Regex| -> Option<u32> {
        let caps = re.captures(tag)?;
        let value = std::str::from_utf8(&caps[2]).ok()?;
        let whole = value.split('.').next().unwrap_or("");
        if whole.is_empty() {
            Some(0)
        } else {
            whole.parse().ok()
        }
    };
    match (dimension(&SVG_WIDTH), dimension(&SVG_HEIGHT)) {
        (Some(width), Some(height)) => Ok((width, height)),
        _ => Err(corrupt("SVG")),
    }
}

fn decoder_fallback(data: &[u8]) -> SniffResult<ImageInfo> {
    let reader = image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|_| SniffError::UnknownFormat)?;
    let format = reader.format().ok_or(SniffError::UnknownFormat)?;
    let (width, height) = reader
        .into_dimensions()
        .map_err(|_| corrupt("OTHER"))?;
    Ok(ImageInfo {
        format: SniffedFormat::Decoded(format),
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn encode(width: u32, height: u32, format: image::ImageFormat) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(width, height, Rgb([10u8, 120, 200]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_png() {
        let info = sniff(&encode(300, 200, image::ImageFormat::Png)).unwrap();
        assert_eq!(info.format, SniffedFormat::Png);
        assert_eq!((info.width, info.height), (300, 200));
    }

    #[test]
    fn test_jpeg() {
        let info = sniff(&encode(64, 48, image::ImageFormat::Jpeg)).unwrap();
        assert_eq!(info.format, SniffedFormat::Jpeg);
        assert_eq!((info.width, info.height), (64, 48));
    }

    #[test]
    fn test_gif_and_bmp() {
        let gif = sniff(&encode(17, 9, image::ImageFormat::Gif)).unwrap();
        assert_eq!((gif.format, gif.width, gif.height), (SniffedFormat::Gif, 17, 9));

        let bmp = sniff(&encode(33, 21, image::ImageFormat::Bmp)).unwrap();
        assert_eq!((bmp.format, bmp.width, bmp.height), (SniffedFormat::Bmp, 33, 21));
    }

    #[test]
    fn test_tiff() {
        let info = sniff(&encode(120, 80, image::ImageFormat::Tiff)).unwrap();
        assert_eq!(info.format, SniffedFormat::Tiff);
        assert_eq!((info.width, info.height), (120, 80));
    }

    #[test]
    fn test_webp_lossless() {
        let info = sniff(&encode(40, 30, image::ImageFormat::WebP)).unwrap();
        assert_eq!(info.format, SniffedFormat::WebP);
        assert_eq!((info.width, info.height), (40, 30));
    }

    #[test]
    fn test_svg_floating_point_without_unit() {
        let svg = br#"<?xml version="1.0"?>
<svg xmlns="http://www.w3.org/2000/svg" width="90.5" height='20px' viewBox="0 0 90 20">
<rect stroke-width="3" width="1" height="1"/></svg>"#;
        let info = sniff(svg).unwrap();
        assert_eq!(info.format, SniffedFormat::Svg);
        assert_eq!((info.width, info.height), (90, 20));
    }

    #[test]
    fn test_svg_without_size_is_corrupt() {
        let err = sniff(br#"<svg viewBox="0 0 10 10"></svg>"#).unwrap_err();
        assert!(matches!(err, SniffError::Corrupt { format: "SVG" }));
    }

    #[test]
    fn test_pnm() {
        let info = sniff(b"P6\n# comment\n").map(|i| i.width);
        assert!(info.is_err());
        let info = sniff(b"P6 640 480\n255\n").unwrap();
        assert_eq!((info.format, info.width, info.height), (SniffedFormat::Pnm, 640, 480));
    }

    #[test]
    fn test_truncated_and_unknown() {
        assert!(matches!(
            sniff(b"\x89PNG\r\n\x1a\n\0\0"),
            Err(SniffError::Corrupt { format: "PNG" })
        ));
        assert!(matches!(sniff(b"hello world"), Err(SniffError::UnknownFormat)));
        assert!(sniff(b"").is_err());
    }
}
