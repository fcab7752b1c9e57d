//! Per-frame compositing: fit-scale the segment's visual into the output
//! canvas, center it, then overlay the subtitle block.

use std::sync::Arc;

use kurbo::Affine;

use crate::assets::decode::premultiply_rgba8_in_place;
use crate::compose::subtitle::{SubtitleBlock, SubtitleEngine, SubtitleStyle};
use crate::foundation::core::Canvas;
use crate::foundation::error::{TalkieError, TalkieResult};

/// One rasterized output frame, row-major RGBA8 (fully opaque).
#[derive(Clone, Debug)]
pub(crate) struct FrameRGBA {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) data: Vec<u8>,
}

/// A drawable image paint plus its intrinsic dimensions.
#[derive(Clone)]
pub(crate) struct ImagePaint {
    pub(crate) paint: vello_cpu::Image,
    pub(crate) w: u32,
    pub(crate) h: u32,
}

/// Uniform fit-inside placement of a `sw`x`sh` source in `canvas`.
///
/// Returns `(scale, x, y)` with `scale = min(Tw/Sw, Th/Sh)` and the scaled
/// image centered on both axes; nothing is ever cropped.
pub(crate) fn fit_placement(sw: u32, sh: u32, canvas: Canvas) -> (f64, f64, f64) {
    if sw == 0 || sh == 0 {
        return (0.0, canvas.width as f64 / 2.0, canvas.height as f64 / 2.0);
    }
    let scale = f64::min(
        canvas.width as f64 / sw as f64,
        canvas.height as f64 / sh as f64,
    );
    let x = (canvas.width as f64 - sw as f64 * scale) / 2.0;
    let y = (canvas.height as f64 - sh as f64 * scale) / 2.0;
    (scale, x, y)
}

/// Renders output frames into a single reused pixmap.
///
/// The pixmap is an arena: it is fully cleared before every draw so no state
/// bleeds from the previous frame, and the returned [`FrameRGBA`] is a copy
/// the caller may hand off to the encoder.
pub(crate) struct Compositor {
    canvas: Canvas,
    style: SubtitleStyle,
    ctx: Option<vello_cpu::RenderContext>,
    pixmap: vello_cpu::Pixmap,
    text: SubtitleEngine,
}

impl Compositor {
    pub(crate) fn new(canvas: Canvas, style: SubtitleStyle) -> TalkieResult<Self> {
        let w: u16 = canvas
            .width
            .try_into()
            .map_err(|_| TalkieError::input("canvas width exceeds u16"))?;
        let h: u16 = canvas
            .height
            .try_into()
            .map_err(|_| TalkieError::input("canvas height exceeds u16"))?;
        let text = SubtitleEngine::new(style.font_path.as_deref())?;
        Ok(Self {
            canvas,
            style,
            ctx: None,
            pixmap: vello_cpu::Pixmap::new(w, h),
            text,
        })
    }

    /// Lay out a segment's subtitle once; the block is reused for every
    /// frame of that segment.
    pub(crate) fn prepare_subtitle(&mut self, text: &str) -> TalkieResult<SubtitleBlock> {
        self.text.layout_block(text, self.canvas, &self.style)
    }

    /// Render one frame: clear, fit-scale + center the source, draw the
    /// subtitle. Deterministic for identical inputs.
    pub(crate) fn render(
        &mut self,
        source: &ImagePaint,
        subtitle: &SubtitleBlock,
    ) -> TalkieResult<FrameRGBA> {
        let canvas = self.canvas;
        let style = self.style.clone();
        let (scale, x, y) = fit_placement(source.w, source.h, canvas);

        self.pixmap.data_as_u8_slice_mut().fill(0);

        let width_u16 = self.pixmap.width();
        let height_u16 = self.pixmap.height();
        let mut ctx = match self.ctx.take() {
            Some(ctx) if ctx.width() == width_u16 && ctx.height() == height_u16 => ctx,
            _ => vello_cpu::RenderContext::new(width_u16, height_u16),
        };
        ctx.reset();
        ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);

        // Opaque background; letterbox/pillarbox bars stay black.
        ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(0, 0, 0, 255));
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
            0.0,
            0.0,
            canvas.width as f64,
            canvas.height as f64,
        ));

        if source.w > 0 && source.h > 0 {
            let tr = Affine::translate((x, y)) * Affine::scale(scale);
            ctx.set_transform(affine_to_cpu(tr));
            ctx.set_paint(source.paint.clone());
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                0.0,
                0.0,
                source.w as f64,
                source.h as f64,
            ));
        }

        subtitle.draw(&mut ctx, canvas, &style);

        ctx.flush();
        ctx.render_to_pixmap(&mut self.pixmap);
        self.ctx = Some(ctx);

        Ok(FrameRGBA {
            width: canvas.width,
            height: canvas.height,
            data: self.pixmap.data_as_u8_slice().to_vec(),
        })
    }
}

pub(crate) fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn pixmap_from_premul_bytes(bytes: &[u8], width: u32, height: u32) -> TalkieResult<vello_cpu::Pixmap> {
    let w: u16 = width
        .try_into()
        .map_err(|_| TalkieError::media_load("pixmap width exceeds u16"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| TalkieError::media_load("pixmap height exceeds u16"))?;
    if bytes.len()
        != (width as usize)
            .saturating_mul(height as usize)
            .saturating_mul(4)
    {
        return Err(TalkieError::media_load("pixmap byte len mismatch"));
    }
    let mut pixels = Vec::<vello_cpu::peniko::color::PremulRgba8>::with_capacity(
        (width as usize) * (height as usize),
    );
    for px in bytes.chunks_exact(4) {
        pixels.push(vello_cpu::peniko::color::PremulRgba8::from_u8_array([
            px[0], px[1], px[2], px[3],
        ]));
    }
    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels, w, h, true,
    ))
}

/// Build an image paint from premultiplied RGBA8 bytes.
pub(crate) fn image_paint_from_premul(
    bytes_premul: &[u8],
    width: u32,
    height: u32,
) -> TalkieResult<ImagePaint> {
    let pixmap = pixmap_from_premul_bytes(bytes_premul, width, height)?;
    Ok(ImagePaint {
        paint: vello_cpu::Image {
            image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
            sampler: vello_cpu::peniko::ImageSampler::default(),
        },
        w: width,
        h: height,
    })
}

/// Build an image paint from straight-alpha RGBA8 bytes (decoded video).
pub(crate) fn image_paint_from_straight(
    bytes_rgba: &[u8],
    width: u32,
    height: u32,
) -> TalkieResult<ImagePaint> {
    let mut tmp = bytes_rgba.to_vec();
    premultiply_rgba8_in_place(&mut tmp);
    image_paint_from_premul(&tmp, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_placement_landscape_source_in_landscape_canvas() {
        let canvas = Canvas {
            width: 1280,
            height: 720,
        };
        // Wider-than-canvas source: width-bound, pillarbox-free, letterboxed.
        let (k, x, y) = fit_placement(1920, 800, canvas);
        assert!((k - 1280.0 / 1920.0).abs() < 1e-12);
        assert!((x - 0.0).abs() < 1e-9);
        let scaled_h = 800.0 * k;
        assert!((y - (720.0 - scaled_h) / 2.0).abs() < 1e-9);
        // Nothing cropped.
        assert!(1920.0 * k <= 1280.0 + 1e-9);
        assert!(scaled_h <= 720.0 + 1e-9);
    }

    #[test]
    fn fit_placement_portrait_source_in_landscape_canvas_is_pillarboxed() {
        let canvas = Canvas {
            width: 1280,
            height: 720,
        };
        let (k, x, y) = fit_placement(600, 1200, canvas);
        assert!((k - 720.0 / 1200.0).abs() < 1e-12);
        assert!((y - 0.0).abs() < 1e-9);
        assert!((x - (1280.0 - 600.0 * k) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn fit_placement_exact_fit_is_identity() {
        let canvas = Canvas {
            width: 720,
            height: 1280,
        };
        let (k, x, y) = fit_placement(720, 1280, canvas);
        assert!((k - 1.0).abs() < 1e-12);
        assert_eq!((x, y), (0.0, 0.0));
    }

    #[test]
    fn render_is_deterministic_and_fills_background() {
        let canvas = Canvas {
            width: 64,
            height: 36,
        };
        let style = SubtitleStyle::for_canvas(canvas);
        let mut comp = Compositor::new(canvas, style).unwrap();
        let block = comp.prepare_subtitle("hi").unwrap();

        // 2x2 solid red source.
        let src = image_paint_from_straight(
            &[255, 0, 0, 255].repeat(4),
            2,
            2,
        )
        .unwrap();

        let a = comp.render(&src, &block).unwrap();
        let b = comp.render(&src, &block).unwrap();
        assert_eq!(a.data, b.data);
        assert_eq!((a.width, a.height), (64, 36));
        // Every pixel is opaque after the background fill.
        assert!(a.data.chunks_exact(4).all(|px| px[3] == 255));
        // The centered source shows up red somewhere.
        assert!(a.data.chunks_exact(4).any(|px| px[0] > 200 && px[1] < 50));
    }
}
