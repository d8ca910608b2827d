//! Display backend façade (spec §6, external interface): `init`,
//! `update_rect`, `blit`, `fill_rect`, `put_pixel` under `lock`/`unlock`,
//! `write_png`. Out of scope per spec §1 ("the window-system / pixel
//! backend"); this module supplies one concrete implementation (egui
//! texture-backed) so the crate runs end-to-end, reusing the teacher's
//! `eframe::App` plumbing (`plot.rs`) repurposed from bar-chart drawing to
//! a raw pixel framebuffer blitter.

use std::sync::Mutex;

use anyhow::Result;

/// A locked view onto the backend's pixel surface (spec §6 `lock/unlock`
/// around direct pixel writes, modelled as a closure-scoped borrow instead
/// of an explicit lock/unlock pair).
pub trait PixelSurface {
    fn width(&self) -> usize;
    fn height(&self) -> usize;
    fn put_pixel(&mut self, x: i32, y: i32, rgb: [u8; 3]);
    fn fill_rect(&mut self, x: i32, y: i32, w: usize, h: usize, rgb: [u8; 3]);
    /// Overlapping blit within the same surface (spec §6: "overlapping,
    /// same surface").
    fn blit(&mut self, src_x: i32, w: usize, dst_x: i32);
}

pub trait VideoBackend: Send + Sync {
    fn init(&self, w: usize, h: usize, fullscreen: bool) -> Result<()>;
    fn with_surface(&self, f: &mut dyn FnMut(&mut dyn PixelSurface));
    fn update_rect(&self, x: i32, y: i32, w: usize, h: usize);
    fn write_png(&self, path: &str) -> Result<()>;
}

/// In-memory RGB8 surface, row-major (`y * width + x`), shared behind one
/// mutex the way the teacher guards `CircularBuffer`/`SpectrumApp` state.
struct Surface {
    width: usize,
    height: usize,
    pixels: Vec<[u8; 3]>,
}

impl Surface {
    fn new(w: usize, h: usize) -> Self {
        Self { width: w, height: h, pixels: vec![[0, 0, 0]; w * h] }
    }
}

impl PixelSurface for Surface {
    fn width(&self) -> usize {
        self.width
    }
    fn height(&self) -> usize {
        self.height
    }
    fn put_pixel(&mut self, x: i32, y: i32, rgb: [u8; 3]) {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return;
        }
        self.pixels[y as usize * self.width + x as usize] = rgb;
    }
    fn fill_rect(&mut self, x: i32, y: i32, w: usize, h: usize, rgb: [u8; 3]) {
        for row in y.max(0)..(y + h as i32).min(self.height as i32) {
            for col in x.max(0)..(x + w as i32).min(self.width as i32) {
                self.pixels[row as usize * self.width + col as usize] = rgb;
            }
        }
    }
    fn blit(&mut self, src_x: i32, w: usize, dst_x: i32) {
        if src_x == dst_x {
            return;
        }
        for row in 0..self.height {
            let base = row * self.width;
            let src_range: Vec<[u8; 3]> = (0..w)
                .map(|i| {
                    let sx = src_x + i as i32;
                    if sx < 0 || sx as usize >= self.width {
                        [0, 0, 0]
                    } else {
                        self.pixels[base + sx as usize]
                    }
                })
                .collect();
            for (i, px) in src_range.into_iter().enumerate() {
                let dx = dst_x + i as i32;
                if dx >= 0 && (dx as usize) < self.width {
                    self.pixels[base + dx as usize] = px;
                }
            }
        }
    }
}

/// egui/eframe-backed `VideoBackend`: the surface is painted each frame
/// into an `egui::TextureHandle` by the `eframe::App` wrapper in `app.rs`;
/// this struct just owns the pixel data and answers backend calls.
pub struct EguiVideoBackend {
    surface: Mutex<Surface>,
}

impl EguiVideoBackend {
    pub fn new(w: usize, h: usize) -> Self {
        Self { surface: Mutex::new(Surface::new(w, h)) }
    }

    /// Snapshot the current surface as flat RGBA8 for upload to an egui
    /// texture (`app.rs`'s `update` calls this once per repaint).
    pub fn snapshot_rgba(&self) -> (usize, usize, Vec<u8>) {
        let surf = self.surface.lock().unwrap();
        let mut out = Vec::with_capacity(surf.pixels.len() * 4);
        for px in &surf.pixels {
            out.extend_from_slice(&[px[0], px[1], px[2], 255]);
        }
        (surf.width, surf.height, out)
    }
}

impl VideoBackend for EguiVideoBackend {
    fn init(&self, w: usize, h: usize, _fullscreen: bool) -> Result<()> {
        let mut surf = self.surface.lock().unwrap();
        *surf = Surface::new(w, h);
        Ok(())
    }

    fn with_surface(&self, f: &mut dyn FnMut(&mut dyn PixelSurface)) {
        let mut surf = self.surface.lock().unwrap();
        f(&mut *surf);
    }

    fn update_rect(&self, _x: i32, _y: i32, _w: usize, _h: usize) {
        // The egui wrapper repaints the whole texture every frame; a
        // partial-update hint has no separate effect here.
    }

    fn write_png(&self, path: &str) -> Result<()> {
        let (w, h, rgba) = self.snapshot_rgba();
        image::save_buffer(path, &rgba, w as u32, h as u32, image::ColorType::Rgba8)
            .map_err(|e| anyhow::anyhow!("write_png: failed to encode {path}: {e}"))
    }
}
