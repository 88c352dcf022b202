//! Program image format (`.hex`).
//!
//! A simple text format:
//! - One 16-bit word per line, as four hex digits
//! - An optional `@XXXX` line before the first word sets the load address
//! - Lines starting with `;` are comments, trailing `;` comments are allowed
//! - Blank lines are ignored

use super::builder::Program;
use super::disasm::disassemble_word;
use std::fmt::Write as _;
use std::path::Path;
use thiserror::Error;

/// A loadable program image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Image {
    /// Load address of the first word.
    pub origin: u16,
    pub words: Vec<u16>,
}

impl Image {
    pub fn new(origin: u16, words: Vec<u16>) -> Self {
        Self { origin, words }
    }

    /// Get the number of words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl From<&Program> for Image {
    fn from(program: &Program) -> Self {
        Self::new(program.origin(), program.words().to_vec())
    }
}

/// Parse image text.
pub fn parse_image(text: &str) -> Result<Image, ImageError> {
    parse_image_at(text, 0)
}

/// Parse image text, loading at `origin` unless the image sets its own.
pub fn parse_image_at(text: &str, origin: u16) -> Result<Image, ImageError> {
    let mut image = Image::new(origin, Vec::new());
    let mut origin_seen = false;

    for (line_num, line) in text.lines().enumerate() {
        let line_num = line_num + 1;
        let content = line.split(';').next().unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }

        if let Some(origin) = content.strip_prefix('@') {
            if origin_seen || !image.words.is_empty() {
                return Err(ImageError::ParseError {
                    line: line_num,
                    message: "origin must come once, before the first word".into(),
                });
            }
            image.origin = parse_hex(origin, line_num)?;
            origin_seen = true;
            continue;
        }

        image.words.push(parse_hex(content, line_num)?);
    }

    if image.origin as usize + image.words.len() > 0x1_0000 {
        return Err(ImageError::ParseError {
            line: text.lines().count(),
            message: "image runs past the end of memory".into(),
        });
    }
    Ok(image)
}

fn parse_hex(digits: &str, line_num: usize) -> Result<u16, ImageError> {
    if digits.len() != 4 {
        return Err(ImageError::ParseError {
            line: line_num,
            message: format!("expected 4 hex digits, found '{}'", digits),
        });
    }
    u16::from_str_radix(digits, 16).map_err(|e| ImageError::ParseError {
        line: line_num,
        message: format!("{}", e),
    })
}

/// Render an image as text, with a disassembly comment on every word.
pub fn format_image(image: &Image) -> String {
    let mut out = String::new();
    out.push_str("; micro16 program image\n");
    let _ = writeln!(out, "; {} words", image.len());
    let _ = writeln!(out, "@{:04X}", image.origin);

    for (i, word) in image.words.iter().enumerate() {
        let addr = image.origin.wrapping_add(i as u16);
        let _ = writeln!(out, "{:04X} ; {:04X} {}", word, addr, disassemble_word(*word));
    }
    out
}

/// Load an image file from disk.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<Image, ImageError> {
    load_image_at(path, 0)
}

/// Load an image file, with a default origin.
pub fn load_image_at<P: AsRef<Path>>(path: P, origin: u16) -> Result<Image, ImageError> {
    let text = std::fs::read_to_string(path.as_ref())
        .map_err(|e| ImageError::IoError(e.to_string()))?;
    parse_image_at(&text, origin)
}

/// Save an image file to disk.
pub fn save_image<P: AsRef<Path>>(path: P, image: &Image) -> Result<(), ImageError> {
    std::fs::write(path.as_ref(), format_image(image))
        .map_err(|e| ImageError::IoError(e.to_string()))
}

/// Errors that can occur while reading or writing images.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("parse error on line {line}: {message}")]
    ParseError { line: usize, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_image() {
        let text = "; demo\n@0010\n\nD348 ; SET R3, 0x48\n1000\n";
        let image = parse_image(text).unwrap();
        assert_eq!(image, Image::new(0x10, vec![0xD348, 0x1000]));
    }

    #[test]
    fn test_default_origin() {
        assert_eq!(parse_image_at("1000", 0x40).unwrap().origin, 0x40);
        assert_eq!(parse_image_at("@0008\n1000", 0x40).unwrap().origin, 8);
    }

    #[test]
    fn test_format_parses_back() {
        let image = Image::new(0x200, vec![0xD0FF, 0xE000, 0x1000]);
        let text = format_image(&image);
        assert!(text.contains("D0FF ; 0200 SET R0, 0xff"));
        assert_eq!(parse_image(&text).unwrap(), image);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_image("12345"), Err(ImageError::ParseError { line: 1, .. })));
        assert!(matches!(parse_image("00G0"), Err(ImageError::ParseError { line: 1, .. })));
        assert!(matches!(parse_image("1000\n@0010"), Err(ImageError::ParseError { line: 2, .. })));
        assert!(matches!(parse_image("@FFFF\n0000\n0000"), Err(ImageError::ParseError { .. })));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("micro16-image-{}.hex", std::process::id()));
        let image = Image::new(0, vec![0x0000, 0x1000]);
        save_image(&path, &image).unwrap();
        let loaded = load_image(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, image);
    }
}
