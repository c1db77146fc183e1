//! Artwork decoding off the engine thread.
//!
//! Each accepted artwork transfer gets its own short-lived worker thread
//! that decodes the image, computes its average colour and sends the result
//! back to the engine over a channel.  The engine never joins workers; it
//! picks results up on its next tick.

use std::panic::{self, AssertUnwindSafe};

use image::{ImageFormat, RgbaImage};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::event::Color;
use crate::request::RequestId;

/// Outcome of one decode worker.
#[derive(Debug)]
pub struct Decoded {
    pub id: RequestId,
    pub artwork: Option<(RgbaImage, Color)>,
}

/// Formats the engine accepts, keyed by the `type` the server reports.
pub fn image_format(mime: &str) -> Option<ImageFormat> {
    match mime {
        "image/png" => Some(ImageFormat::Png),
        "image/jpeg" => Some(ImageFormat::Jpeg),
        "image/webp" => Some(ImageFormat::WebP),
        "image/bmp" => Some(ImageFormat::Bmp),
        "image/gif" => Some(ImageFormat::Gif),
        _ => None,
    }
}

pub fn decode(data: &[u8], format: ImageFormat) -> Option<(RgbaImage, Color)> {
    let image = match image::load_from_memory_with_format(data, format) {
        Ok(img) => img.to_rgba8(),
        Err(e) => {
            debug!("artwork decode failed: {}", e);
            return None;
        }
    };
    let color = average_color(&image);
    Some((image, color))
}

/// Perceptual average colour.
///
/// Plain averaging washes out towards grey, so only vivid pixels count
/// fully (saturation >= 0.5 and lightness > 0.3) and light pixels add a
/// fifth of their weight.  Channels are floored at 50 and the result is
/// lightened by 40%.
pub fn average_color(image: &RgbaImage) -> Color {
    let (mut cr, mut cg, mut cb) = (0.0f32, 0.0f32, 0.0f32);
    let mut n = 1.0f32;

    for pixel in image.pixels() {
        let [r, g, b, _] = pixel.0;
        let max = r.max(g).max(b) as f32;
        let min = r.min(g).min(b) as f32;
        let lightness = (max + min) / 2.0 / 255.0;
        let saturation = if max > 0.0 { (max - min) / max } else { 0.0 };

        if saturation >= 0.5 && lightness > 0.3 {
            n += 1.0;
            cr += r as f32;
            cg += g as f32;
            cb += b as f32;
        }
        if lightness >= 0.6 {
            n += 0.2;
            cr += (r / 5) as f32;
            cg += (g / 5) as f32;
            cb += (b / 5) as f32;
        }
    }

    let channel = |sum: f32| brighten((sum / n).max(50.0) as u8, 0.4);
    Color::rgb(channel(cr), channel(cg), channel(cb))
}

fn brighten(c: u8, factor: f32) -> u8 {
    let c = c as f32;
    (c + (255.0 - c) * factor) as u8
}

/// Start a detached decode worker.
pub fn spawn_decode(
    id: RequestId,
    data: Vec<u8>,
    format: ImageFormat,
    results: UnboundedSender<Decoded>,
) -> std::io::Result<()> {
    spawn_worker(id, results, move || decode(&data, format))
}

/// Run `job` on a named thread and send its outcome back.  A panicking job
/// still reports, with no artwork, so its request is always retired.
fn spawn_worker<F>(id: RequestId, results: UnboundedSender<Decoded>, job: F) -> std::io::Result<()>
where
    F: FnOnce() -> Option<(RgbaImage, Color)> + Send + 'static,
{
    std::thread::Builder::new()
        .name(format!("mupwit-decode-{}", id.get()))
        .spawn(move || {
            let artwork = match panic::catch_unwind(AssertUnwindSafe(job)) {
                Ok(artwork) => artwork,
                Err(_) => {
                    warn!("artwork {} decoder panicked", id);
                    None
                }
            };
            debug!(
                "artwork {} decoded: {}",
                id,
                if artwork.is_some() { "ok" } else { "failed" }
            );
            // Engine gone means the client is shutting down
            let _ = results.send(Decoded { id, artwork });
        })?;
    Ok(())
}
