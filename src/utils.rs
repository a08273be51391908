use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, ImageFormat};

/// Largest thumbnail edge, in pixels, for inline display in search results
pub const THUMBNAIL_MAX_SIZE: u32 = 800;

/// Similarity score shown next to a match: `1 / (1 + distance)`.
///
/// Strictly decreasing in the distance and equal to 1.0 at distance zero.
/// Display sugar only, not a calibrated probability.
pub fn similarity_score(distance: f32) -> f32 {
    1. / (1. + distance)
}

pub fn read_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    std::io::stdout().flush()?;
    let v = std::io::stdin()
        .bytes()
        .take_while(|c| c.as_ref().ok() != Some(&b'\n'))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(String::from_utf8(v)?.trim().to_owned())
}

/// Reduce an untrusted upload filename to a safe final path component.
///
/// Directory parts are stripped and anything outside `[A-Za-z0-9._-]`
/// becomes an underscore.
pub fn sanitize_filename(name: &str) -> String {
    let name = name.replace('\\', "/");
    let name = name.rsplit('/').next().unwrap_or("");
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect()
}

/// Pick a destination under `dir` that does not collide with an existing
/// file, by suffixing `_1`, `_2`, ... before the extension.
pub fn unique_destination(dir: &Path, filename: &str) -> PathBuf {
    let mut path = dir.join(filename);
    if !path.exists() {
        return path;
    }
    let stem = Path::new(filename).file_stem().unwrap_or_default().to_string_lossy();
    let ext = Path::new(filename).extension().map(|e| e.to_string_lossy());
    for counter in 1.. {
        let candidate = match &ext {
            Some(ext) => format!("{}_{}.{}", stem, counter, ext),
            None => format!("{}_{}", stem, counter),
        };
        path = dir.join(candidate);
        if !path.exists() {
            return path;
        }
    }
    unreachable!()
}

/// Encode a bounded, aspect-preserving PNG thumbnail of `path` as a
/// `data:image/png;base64,...` URI.
pub fn thumbnail_data_uri(path: &Path) -> Result<String> {
    let image = image::open(path)?;
    let thumbnail = image.thumbnail(THUMBNAIL_MAX_SIZE, THUMBNAIL_MAX_SIZE);
    let mut buf = Cursor::new(Vec::new());
    thumbnail.write_to(&mut buf, ImageFormat::Png)?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(buf.get_ref())))
}

/// Render a downscaled image as truecolor half-block characters so a match
/// can be shown inline in the terminal.
pub fn render_preview(image: &DynamicImage, max_cols: u32) -> String {
    let preview = image.thumbnail(max_cols, max_cols).to_rgb8();
    let mut out = String::new();
    for y in (0..preview.height()).step_by(2) {
        for x in 0..preview.width() {
            let top = preview.get_pixel(x, y);
            // odd-height images fall back to black for the bottom half
            let bottom =
                if y + 1 < preview.height() { *preview.get_pixel(x, y + 1) } else { image::Rgb([0, 0, 0]) };
            out.push_str(&format!(
                "\x1b[38;2;{};{};{}m\x1b[48;2;{};{};{}m\u{2580}",
                top[0], top[1], top[2], bottom[0], bottom[1], bottom[2]
            ));
        }
        out.push_str("\x1b[0m\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn score_decreases_with_distance() {
        assert_eq!(similarity_score(0.), 1.0);
        let distances = [0., 0.5, 1., 10., 1000.];
        for pair in distances.windows(2) {
            assert!(similarity_score(pair[0]) > similarity_score(pair[1]));
        }
    }

    #[test]
    fn sanitize_strips_directories_and_odd_chars() {
        assert_eq!(sanitize_filename("cat.jpg"), "cat.jpg");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("dir\\evil.png"), "evil.png");
        assert_eq!(sanitize_filename("my photo (1).png"), "my_photo__1_.png");
    }

    #[test]
    fn unique_destination_appends_counter() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(unique_destination(dir.path(), "cat.jpg"), dir.path().join("cat.jpg"));

        std::fs::write(dir.path().join("cat.jpg"), b"x").unwrap();
        assert_eq!(unique_destination(dir.path(), "cat.jpg"), dir.path().join("cat_1.jpg"));

        std::fs::write(dir.path().join("cat_1.jpg"), b"x").unwrap();
        assert_eq!(unique_destination(dir.path(), "cat.jpg"), dir.path().join("cat_2.jpg"));
    }

    #[test]
    fn thumbnail_uri_has_png_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.png");
        RgbImage::new(4, 4).save(&path).unwrap();

        let uri = thumbnail_data_uri(&path).unwrap();
        assert!(uri.starts_with("data:image/png;base64,"));
        assert!(uri.len() > "data:image/png;base64,".len());
    }

    #[test]
    fn preview_bounds_output_width() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(100, 100));
        let preview = render_preview(&image, 10);
        for line in preview.lines() {
            assert_eq!(line.matches('\u{2580}').count(), 10);
        }
    }
}
