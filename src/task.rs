use std::sync::Arc;
use std::sync::mpsc;
use std::sync::mpsc::TryRecvError;
use std::thread;

use image::imageops::FilterType;
use parking_lot::RwLock;
use reqwest::blocking::Client;
use tokio::runtime::Runtime;
use tracing::debug;
use tracing::error;

use crate::api::TourBackend;
use crate::api::TourResponse;
use crate::error::TourError;
use crate::tour::manager::OutboundRequest;
use crate::tour::manager::Ticket;
use crate::tour::manager::TourManager;
use crate::tour::model::PanoramaImage;

/// Widest texture most GPUs accept.
const MAX_TEXTURE_WIDTH: u32 = 8192;

pub type Completion = (Ticket, Result<TourResponse, TourError>);

/// Runs tour requests on the tokio blocking pool and hands results back to the UI thread.
pub struct RequestDispatcher {
    runtime: Arc<Runtime>,
    backend: Arc<RwLock<Arc<dyn TourBackend>>>,
    sender: mpsc::Sender<Completion>,
    receiver: mpsc::Receiver<Completion>,
}

impl RequestDispatcher {
    pub fn new(runtime: Arc<Runtime>, backend: Arc<dyn TourBackend>) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { runtime, backend: Arc::new(RwLock::new(backend)), sender, receiver }
    }

    /// Requests already running keep the backend they started with.
    pub fn set_backend(&self, backend: Arc<dyn TourBackend>) {
        *self.backend.write() = backend;
    }

    pub fn dispatch(&self, requests: Vec<OutboundRequest>, ctx: &egui::Context) {
        for OutboundRequest { ticket, request } in requests {
            let backend = Arc::clone(&self.backend.read());
            let sender = self.sender.clone();
            let ctx = ctx.clone();
            self.runtime.spawn_blocking(move || {
                let what = request.describe();
                debug!("{what}");
                let result = request.execute(backend.as_ref());
                if let Err(err) = &result {
                    error!("{what} failed: {err}");
                }
                let _ = sender.send((ticket, result));
                ctx.request_repaint();
            });
        }
    }

    pub fn completions(&self) -> Vec<Completion> {
        let mut completions = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(completion) => completions.push(completion),
                Err(TryRecvError::Empty) => break,
                // We hold a sender ourselves, so this cannot happen while `self` is alive
                Err(TryRecvError::Disconnected) => break,
            }
        }
        completions
    }

    /// Feeds finished requests into `manager` and starts whatever it queued.
    pub fn pump(&self, manager: &mut TourManager, ctx: &egui::Context) {
        for (ticket, result) in self.completions() {
            manager.complete(ticket, result);
        }
        let requests = manager.take_requests();
        if !requests.is_empty() {
            self.dispatch(requests, ctx);
        }
    }
}

/// Fetches and decodes a panorama on its own thread.
pub fn spawn_image_load(image: PanoramaImage, client: Client) -> mpsc::Receiver<Result<egui::ColorImage, TourError>> {
    let (tx, rx) = mpsc::channel();
    let _join_handle = thread::spawn(move || {
        let _ = tx.send(load_panorama_image(&image, &client));
    });
    rx
}

fn load_panorama_image(image: &PanoramaImage, client: &Client) -> Result<egui::ColorImage, TourError> {
    let bytes: Arc<[u8]> = match image {
        PanoramaImage::None => return Err(TourError::EmptyResponse("panorama image")),
        PanoramaImage::Remote(url) => {
            debug!("fetching panorama {url}");
            client.get(url).send()?.error_for_status()?.bytes()?.to_vec().into()
        }
        PanoramaImage::Local { bytes, .. } => Arc::clone(bytes),
    };

    decode_panorama(&bytes)
}

fn decode_panorama(bytes: &[u8]) -> Result<egui::ColorImage, TourError> {
    let mut decoded = image::load_from_memory(bytes)?;
    if decoded.width() > MAX_TEXTURE_WIDTH {
        debug!("downscaling {}x{} panorama", decoded.width(), decoded.height());
        decoded = decoded.resize(MAX_TEXTURE_WIDTH, MAX_TEXTURE_WIDTH, FilterType::Triangle);
    }

    let rgba = decoded.to_rgba8();
    let size = [rgba.width() as usize, rgba.height() as usize];
    Ok(egui::ColorImage::from_rgba_unmultiplied(size, rgba.as_raw()))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    #[test]
    fn decodes_local_images() {
        let decoded = decode_panorama(&png(8, 4)).unwrap();
        assert_eq!(decoded.size, [8, 4]);
    }

    #[test]
    fn oversized_panoramas_are_downscaled() {
        let decoded = decode_panorama(&png(MAX_TEXTURE_WIDTH * 2, 4)).unwrap();
        assert_eq!(decoded.size[0], MAX_TEXTURE_WIDTH as usize);
    }

    #[test]
    fn garbage_is_an_image_error() {
        assert!(matches!(decode_panorama(b"not an image"), Err(TourError::Image(_))));
    }

    #[test]
    fn load_reports_failures_through_the_channel() {
        let receiver = spawn_image_load(PanoramaImage::local("broken.jpg", b"nope".to_vec()), Client::new());
        assert!(matches!(receiver.recv().unwrap(), Err(TourError::Image(_))));
    }
}
