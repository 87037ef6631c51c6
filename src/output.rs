//! File naming and image saving.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use starrysky::{ClientError, PngImage};

/// `<prompt-slug>-<unix seconds>.png`, with the slug limited to 50 bytes.
#[must_use]
pub fn auto_filename(prompt: &str) -> String {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs());
    format!("{}-{secs}.png", sanitize_for_filename(prompt, 50))
}

/// Kebab-case slug of the words in a prompt, at most `max_len` bytes.
///
/// Words are runs of ASCII alphanumerics. Bare numbers are dropped so
/// attention weights like `(masterpiece:1.2)` leave no trace. The slug is
/// cut at a word boundary unless the first word alone is too long. Falls
/// back to `image` when no word survives.
#[must_use]
pub fn sanitize_for_filename(input: &str, max_len: usize) -> String {
    let mut slug = String::new();
    let words = input
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty() && !w.bytes().all(|b| b.is_ascii_digit()));

    for word in words {
        let word = word.to_ascii_lowercase();
        let needed = if slug.is_empty() { word.len() } else { word.len() + 1 };
        if slug.len() + needed > max_len {
            if slug.is_empty() {
                slug.push_str(&word[..max_len]);
            }
            break;
        }
        if !slug.is_empty() {
            slug.push('-');
        }
        slug.push_str(&word);
    }

    if slug.is_empty() {
        "image".to_string()
    } else {
        slug
    }
}

/// Resolve the output path: use explicit path or auto-generate from the prompt.
#[must_use]
pub fn resolve_output_path(explicit: Option<&str>, prompt: &str) -> PathBuf {
    match explicit {
        Some(p) => PathBuf::from(p),
        None => PathBuf::from(auto_filename(prompt)),
    }
}

/// Path for image `index` of `count`: `base` itself for a single image,
/// otherwise `stem-N.ext` counting from 1.
#[must_use]
pub fn numbered_path(base: &Path, index: usize, count: usize) -> PathBuf {
    if count <= 1 {
        return base.to_path_buf();
    }
    let stem = base.file_stem().unwrap_or_default().to_string_lossy();
    let ext = base.extension().map_or_else(|| "png".into(), |e| e.to_string_lossy());
    base.with_file_name(format!("{stem}-{}.{ext}", index + 1))
}

/// Save every image under `base`, numbering them when there is more than one.
/// Text metadata on the images is kept.
///
/// # Errors
///
/// Returns an error if an image cannot be encoded or written.
pub fn save_images(images: &[PngImage], base: &Path) -> Result<Vec<PathBuf>, ClientError> {
    images
        .iter()
        .enumerate()
        .map(|(i, image)| {
            let path = numbered_path(base, i, images.len());
            image.save(&path)?;
            Ok(path)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    #[test]
    fn slug_joins_words() {
        assert_eq!(sanitize_for_filename("A cat!! sitting on a mat...", 50), "a-cat-sitting-on-a-mat");
    }

    #[test]
    fn slug_drops_attention_weights() {
        assert_eq!(
            sanitize_for_filename("(masterpiece:1.2), best quality, 4k photo", 50),
            "masterpiece-best-quality-4k-photo"
        );
    }

    #[test]
    fn slug_cuts_at_word_boundary() {
        assert_eq!(sanitize_for_filename("castle on a hill", 12), "castle-on-a");
        assert_eq!(sanitize_for_filename("abcd efgh", 5), "abcd");
        assert_eq!(sanitize_for_filename(&"a".repeat(100), 10).len(), 10);
    }

    #[test]
    fn slug_falls_back_to_image() {
        assert_eq!(sanitize_for_filename("", 50), "image");
        assert_eq!(sanitize_for_filename("(1.5) !!!", 50), "image");
    }

    #[test]
    fn auto_filename_is_png() {
        let name = auto_filename("a cat");
        assert!(name.starts_with("a-cat-"));
        assert_eq!(Path::new(&name).extension().unwrap(), "png");
    }

    #[test]
    fn explicit_output_wins() {
        assert_eq!(resolve_output_path(Some("out/cat.png"), "a dog"), PathBuf::from("out/cat.png"));
        assert!(resolve_output_path(None, "a dog").to_string_lossy().starts_with("a-dog-"));
    }

    #[test]
    fn numbered_paths() {
        let base = Path::new("out/cat.png");
        assert_eq!(numbered_path(base, 0, 1), PathBuf::from("out/cat.png"));
        assert_eq!(numbered_path(base, 0, 3), PathBuf::from("out/cat-1.png"));
        assert_eq!(numbered_path(base, 2, 3), PathBuf::from("out/cat-3.png"));
    }

    #[test]
    fn saves_numbered_images_with_metadata() {
        let dir = std::env::temp_dir().join("starrysky_output_test");
        std::fs::create_dir_all(&dir).unwrap();
        let image = PngImage::new(DynamicImage::ImageRgb8(RgbImage::new(2, 2)))
            .with_text("parameters", "a cat, Steps: 20");

        let paths = save_images(&[image.clone(), image], &dir.join("cat.png")).unwrap();
        assert_eq!(paths.len(), 2);
        let reloaded = PngImage::open(&paths[1]).unwrap();
        assert_eq!(reloaded.text().get("parameters").map(String::as_str), Some("a cat, Steps: 20"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
