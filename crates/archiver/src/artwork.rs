use std::time::Duration;

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use metadata::{guess_mime, CoverArt};
use reqwest::Client;
use tracing::debug;

use crate::pipeline::ArtworkSource;

const THUMBNAIL_BASE: &str = "https://i.ytimg.com/vi";
const THUMBNAIL_NAMES: [&str; 2] = ["maxresdefault.jpg", "hqdefault.jpg"];
const JPEG_QUALITY: u8 = 90;

/// Video thumbnails from the image CDN, largest variant first.
pub struct ThumbnailSource {
    client: Client,
    timeout: Duration,
}

impl ThumbnailSource {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn download(&self, id: &str) -> Result<Vec<u8>, String> {
        let mut last_error = String::from("no thumbnail variants");
        for name in THUMBNAIL_NAMES {
            let url = format!("{}/{}/{}", THUMBNAIL_BASE, id, name);
            let response = match self.client.get(&url).timeout(self.timeout).send().await {
                Ok(response) => response,
                Err(err) => {
                    last_error = err.to_string();
                    continue;
                }
            };
            if !response.status().is_success() {
                debug!("Thumbnail {} answered {}", url, response.status());
                last_error = format!("http {}", response.status());
                continue;
            }
            let bytes = response.bytes().await.map_err(|err| err.to_string())?;
            return Ok(bytes.to_vec());
        }
        Err(last_error)
    }
}

#[async_trait]
impl ArtworkSource for ThumbnailSource {
    async fn thumbnail(&self, id: &str, square: bool) -> Result<CoverArt, String> {
        let data = self.download(id).await?;
        if !square {
            let mime = guess_mime(&data).map(|mime| mime.to_string());
            return Ok(CoverArt { data, mime });
        }
        let cropped = tokio::task::spawn_blocking(move || crop_square(&data))
            .await
            .map_err(|err| err.to_string())??;
        Ok(CoverArt {
            data: cropped,
            mime: Some("image/jpeg".to_string()),
        })
    }
}

/// Largest centered square of the image, re-encoded as JPEG.
pub fn crop_square(bytes: &[u8]) -> Result<Vec<u8>, String> {
    let decoded = image::load_from_memory(bytes).map_err(|err| err.to_string())?;
    let (width, height) = (decoded.width(), decoded.height());
    let side = width.min(height);
    if side == 0 {
        return Err("empty image".to_string());
    }
    let x = (width - side) / 2;
    let y = (height - side) / 2;
    let square = decoded.crop_imm(x, y, side, side).into_rgb8();

    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    encoder
        .encode(square.as_raw(), side, side, ExtendedColorType::Rgb8)
        .map_err(|err| err.to_string())?;
    drop(encoder);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_fn(width, height, |x, _| {
            if x < width / 4 || x >= width - width / 4 {
                Rgb([0, 0, 0])
            } else {
                Rgb([250, 250, 250])
            }
        });
        let mut out = Vec::new();
        image.write_to(&mut Cursor::new(&mut out), ImageFormat::Png).unwrap();
        out
    }

    #[test]
    fn crops_wide_image_to_center_square() {
        let cropped = crop_square(&png(160, 90)).unwrap();
        assert_eq!(guess_mime(&cropped), Some("image/jpeg"));
        let decoded = image::load_from_memory(&cropped).unwrap().into_rgb8();
        assert_eq!(decoded.dimensions(), (90, 90));
        let center = decoded.get_pixel(45, 45);
        assert!(center[0] > 200);
    }

    #[test]
    fn square_input_keeps_its_size() {
        let cropped = crop_square(&png(64, 64)).unwrap();
        let decoded = image::load_from_memory(&cropped).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 64));
    }

    #[test]
    fn rejects_undecodable_bytes() {
        assert!(crop_square(b"not an image").is_err());
    }
}
