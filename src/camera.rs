// Opens a webcam and converts frames into a buffer suitable for the window.
// Frames come back mirrored (selfie view) so a hand moving right on screen
// moves right on the canvas too.

use crate::error::Error;
use crate::types::FrameBuffer;

// Bring in nokhwa types for camera control.
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    utils::{
        CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
    },
};

// A small wrapper around nokhwa::Camera so our main loop stays clean.
pub struct CameraCapture {
    cam: Camera,
    index: u32,
    width: u32,
    height: u32,
}

impl CameraCapture {
    /// Try to open camera `index` at a target resolution (falls back if not exact).
    pub fn new(index: u32, width: u32, height: u32) -> Result<Self, Error> {
        let idx = CameraIndex::Index(index);

        let fmt = CameraFormat::new(
            Resolution::new(width, height),
            FrameFormat::YUYV, // uncompressed; cheap to convert to RGB
            30,                // target FPS
        );

        // Ask for RGB frames, prioritizing the closest format to our request.
        let req = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(fmt));

        let mut cam = Camera::new(idx, req)
            .map_err(|e| Error::CameraInit(format!("Create camera {index}: {e}")))?;

        cam.open_stream()
            .map_err(|e| Error::CameraInit(format!("Open stream {index}: {e}")))?;

        // The actual stream might choose a slightly different resolution.
        let actual = cam.resolution();
        log::info!("Camera {index} streaming at {}x{}", actual.width(), actual.height());

        Ok(Self {
            cam,
            index,
            width: actual.width(),
            height: actual.height(),
        })
    }

    /// Grab one frame, mirror it, and pack it as 0x00RRGGBB pixels.
    pub fn next_frame(&mut self) -> Result<FrameBuffer, Error> {
        // Blocks until a new frame is ready.
        let frame = self
            .cam
            .frame()
            .map_err(|e| Error::CameraFrame(format!("Fetch frame: {e}")))?;

        let rgb_img = frame
            .decode_image::<RgbFormat>()
            .map_err(|e| Error::CameraFrame(format!("Decode RGB: {e}")))?;

        let (w, h) = rgb_img.dimensions();
        let mut out = Vec::with_capacity((w as usize) * (h as usize));
        for y in 0..h {
            for x in (0..w).rev() {
                let pixel = rgb_img.get_pixel(x, y);
                let r = pixel[0] as u32;
                let g = pixel[1] as u32;
                let b = pixel[2] as u32;
                out.push((r << 16) | (g << 8) | b);
            }
        }

        Ok(FrameBuffer {
            width: w as usize,
            height: h as usize,
            pixels: out,
        })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Report the actual resolution the camera is delivering.
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for CameraCapture {
    fn drop(&mut self) {
        if let Err(e) = self.cam.stop_stream() {
            log::warn!("Stopping camera {}: {e}", self.index);
        }
    }
}

/// Open the first working camera: `preferred` first, then 0..=max_index.
pub fn find_available_camera(preferred: Option<u32>, max_index: u32, width: u32, height: u32) -> Option<CameraCapture> {
    let candidates = preferred.into_iter().chain((0..=max_index).filter(move |&i| Some(i) != preferred));
    for index in candidates {
        match CameraCapture::new(index, width, height) {
            Ok(cam) => return Some(cam),
            Err(e) => log::debug!("Camera {index} unavailable: {e}"),
        }
    }
    log::warn!("No camera found");
    None
}

/// Scale `src` into a `width`×`height` buffer (nearest neighbour).
/// Used when the camera picks a resolution other than the canvas size.
pub fn fit_frame(src: &FrameBuffer, width: usize, height: usize) -> FrameBuffer {
    if src.width == width && src.height == height {
        return src.clone();
    }
    let mut pixels = Vec::with_capacity(width * height);
    for y in 0..height {
        let sy = if src.height == 0 { 0 } else { y * src.height / height };
        for x in 0..width {
            let sx = if src.width == 0 { 0 } else { x * src.width / width };
            pixels.push(src.pixels.get(sy * src.width + sx).copied().unwrap_or(0));
        }
    }
    FrameBuffer { width, height, pixels }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_frame_scales_nearest() {
        let src = FrameBuffer { width: 2, height: 1, pixels: vec![1, 2] };
        let out = fit_frame(&src, 4, 2);
        assert_eq!(out.pixels, vec![1, 1, 2, 2, 1, 1, 2, 2]);
    }

    #[test]
    fn fit_frame_same_size_is_copy() {
        let src = FrameBuffer { width: 2, height: 2, pixels: vec![1, 2, 3, 4] };
        assert_eq!(fit_frame(&src, 2, 2), src);
    }
}
