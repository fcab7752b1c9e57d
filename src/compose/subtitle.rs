//! Subtitle layout and rendering.
//!
//! Text is word-wrapped to 90% of the canvas width, laid out with a fixed
//! line height, vertically centered as a block, and drawn with an
//! outlined-then-filled glyph pass so it stays legible over arbitrary
//! footage.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use kurbo::Affine;

use crate::compose::frame::affine_to_cpu;
use crate::foundation::core::Canvas;
use crate::foundation::error::{TalkieError, TalkieResult};

/// Subtitle appearance for one export run.
#[derive(Clone, Debug)]
pub(crate) struct SubtitleStyle {
    pub(crate) font_size: f32,
    pub(crate) line_height: f64,
    pub(crate) stroke_width: f64,
    pub(crate) max_width_frac: f64,
    /// Optional font file; when absent the system sans-serif stack is used.
    pub(crate) font_path: Option<PathBuf>,
}

impl SubtitleStyle {
    /// Orientation-tiered defaults: portrait output gets larger type.
    pub(crate) fn for_canvas(canvas: Canvas) -> Self {
        let portrait = canvas.is_portrait();
        Self {
            font_size: if portrait { 52.0 } else { 42.0 },
            line_height: if portrait { 60.0 } else { 50.0 },
            stroke_width: 2.5,
            max_width_frac: 0.9,
            font_path: None,
        }
    }

    pub(crate) fn with_font(mut self, font_path: Option<PathBuf>) -> Self {
        self.font_path = font_path;
        self
    }
}

/// RGBA8 brush color used by Parley text layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct TextBrushRgba8 {
    pub(crate) r: u8,
    pub(crate) g: u8,
    pub(crate) b: u8,
    pub(crate) a: u8,
}

struct GlyphRunRender {
    font: vello_cpu::peniko::FontData,
    font_size: f32,
    glyphs: Vec<vello_cpu::Glyph>,
}

struct LineRender {
    runs: Vec<GlyphRunRender>,
    width: f64,
}

/// A segment's subtitle, shaped once and drawn onto every frame.
pub(crate) struct SubtitleBlock {
    lines: Vec<LineRender>,
}

impl SubtitleBlock {
    pub(crate) fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub(crate) fn draw(
        &self,
        ctx: &mut vello_cpu::RenderContext,
        canvas: Canvas,
        style: &SubtitleStyle,
    ) {
        if self.lines.is_empty() {
            return;
        }

        let total_height = self.lines.len() as f64 * style.line_height;
        let mut top = (canvas.height as f64 - total_height) / 2.0;

        for line in &self.lines {
            let dx = (canvas.width as f64 - line.width) / 2.0;
            ctx.set_transform(affine_to_cpu(Affine::translate((dx, top))));
            ctx.set_stroke(vello_cpu::kurbo::Stroke::new(style.stroke_width));
            for run in &line.runs {
                // Stroke first, fill second, so the outline sits behind the
                // glyph body exactly like strokeText-then-fillText.
                ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(0, 0, 0, 255));
                ctx.glyph_run(&run.font)
                    .font_size(run.font_size)
                    .stroke_glyphs(run.glyphs.iter().copied());
                ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(255, 255, 255, 255));
                ctx.glyph_run(&run.font)
                    .font_size(run.font_size)
                    .fill_glyphs(run.glyphs.iter().copied());
            }
            top += style.line_height;
        }
    }
}

/// Greedy word wrap against a caller-supplied width measure.
///
/// Mirrors canvas-style wrapping: words accumulate until the candidate line
/// overflows `max_width`; a single overlong word is never split. Lines that
/// are empty after trimming are dropped.
pub(crate) fn wrap_words(
    text: &str,
    max_width: f64,
    mut measure: impl FnMut(&str) -> f64,
) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();

    for (n, word) in text.split_whitespace().enumerate() {
        let candidate = format!("{line}{word} ");
        if n > 0 && !line.is_empty() && measure(&candidate) > max_width {
            let done = line.trim_end().to_string();
            if !done.is_empty() {
                lines.push(done);
            }
            line = format!("{word} ");
        } else {
            line = candidate;
        }
    }

    let last = line.trim_end().to_string();
    if !last.is_empty() {
        lines.push(last);
    }
    lines
}

/// Stateful helper owning the Parley font/layout contexts.
pub(crate) struct SubtitleEngine {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrushRgba8>,
    font_stack: String,
    font_cache: HashMap<(u64, u32), vello_cpu::peniko::FontData>,
}

impl SubtitleEngine {
    /// Construct an engine, registering `font_path` when provided; otherwise
    /// text resolves through the system sans-serif stack.
    pub(crate) fn new(font_path: Option<&Path>) -> TalkieResult<Self> {
        let mut font_ctx = parley::FontContext::default();

        let font_stack = match font_path {
            None => "sans-serif".to_string(),
            Some(path) => {
                let bytes = std::fs::read(path).map_err(|e| {
                    TalkieError::input(format!(
                        "failed to read subtitle font '{}': {e}",
                        path.display()
                    ))
                })?;
                let families = font_ctx
                    .collection
                    .register_fonts(parley::fontique::Blob::from(bytes), None);
                let family_id = families.first().map(|(id, _)| *id).ok_or_else(|| {
                    TalkieError::input(format!(
                        "no font families registered from '{}'",
                        path.display()
                    ))
                })?;
                font_ctx
                    .collection
                    .family_name(family_id)
                    .ok_or_else(|| {
                        TalkieError::input("registered subtitle font family has no name")
                    })?
                    .to_string()
            }
        };

        Ok(Self {
            font_ctx,
            layout_ctx: parley::LayoutContext::new(),
            font_stack,
            font_cache: HashMap::new(),
        })
    }

    fn layout_line(&mut self, text: &str, font_size: f32) -> parley::Layout<TextBrushRgba8> {
        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(self.font_stack.clone())),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(font_size));
        builder.push_default(parley::style::StyleProperty::FontWeight(
            parley::style::FontWeight::BOLD,
        ));
        builder.push_default(parley::style::StyleProperty::Brush(TextBrushRgba8 {
            r: 255,
            g: 255,
            b: 255,
            a: 255,
        }));

        let mut layout: parley::Layout<TextBrushRgba8> = builder.build(text);
        layout.break_all_lines(None);
        layout
    }

    fn measure(&mut self, text: &str, font_size: f32) -> f64 {
        f64::from(self.layout_line(text, font_size).width())
    }

    /// Wrap and shape `text` for `canvas`, producing a reusable block.
    pub(crate) fn layout_block(
        &mut self,
        text: &str,
        canvas: Canvas,
        style: &SubtitleStyle,
    ) -> TalkieResult<SubtitleBlock> {
        if !style.font_size.is_finite() || style.font_size <= 0.0 {
            return Err(TalkieError::input("subtitle font size must be > 0"));
        }

        let max_width = canvas.width as f64 * style.max_width_frac;
        let font_size = style.font_size;
        let wrapped = wrap_words(text, max_width, |candidate| {
            self.measure(candidate, font_size)
        });

        let mut lines = Vec::with_capacity(wrapped.len());
        for line_text in &wrapped {
            let layout = self.layout_line(line_text, font_size);
            let width = f64::from(layout.width());
            let mut runs = Vec::new();
            for line in layout.lines() {
                for item in line.items() {
                    let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                        continue;
                    };
                    let source_font = run.run().font();
                    let key = (source_font.data.id(), source_font.index);
                    let font = match self.font_cache.get(&key) {
                        Some(f) => f.clone(),
                        None => {
                            let f = vello_cpu::peniko::FontData::new(
                                vello_cpu::peniko::Blob::from(source_font.data.as_ref().to_vec()),
                                source_font.index,
                            );
                            self.font_cache.insert(key, f.clone());
                            f
                        }
                    };
                    let glyphs = run
                        .glyphs()
                        .map(|g| vello_cpu::Glyph {
                            id: g.id,
                            x: g.x,
                            y: g.y,
                        })
                        .collect();
                    runs.push(GlyphRunRender {
                        font,
                        font_size: run.run().font_size(),
                        glyphs,
                    });
                }
            }
            lines.push(LineRender { runs, width });
        }

        Ok(SubtitleBlock { lines })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn char_measure(s: &str) -> f64 {
        s.chars().count() as f64
    }

    #[test]
    fn wrap_words_greedy_accumulation() {
        let lines = wrap_words("aaa bbb ccc", 8.0, char_measure);
        assert_eq!(lines, vec!["aaa bbb".to_string(), "ccc".to_string()]);
    }

    #[test]
    fn wrap_words_never_splits_a_single_long_word() {
        let lines = wrap_words("supercalifragilistic", 5.0, char_measure);
        assert_eq!(lines, vec!["supercalifragilistic".to_string()]);

        let lines = wrap_words("tiny supercalifragilistic end", 10.0, char_measure);
        assert_eq!(
            lines,
            vec![
                "tiny".to_string(),
                "supercalifragilistic".to_string(),
                "end".to_string()
            ]
        );
    }

    #[test]
    fn wrap_words_drops_whitespace_only_input() {
        assert!(wrap_words("   \t  ", 10.0, char_measure).is_empty());
    }

    #[test]
    fn wrap_words_fits_everything_under_wide_limit() {
        let lines = wrap_words("one two three", 1000.0, char_measure);
        assert_eq!(lines, vec!["one two three".to_string()]);
    }

    #[test]
    fn style_defaults_are_orientation_tiered() {
        let land = SubtitleStyle::for_canvas(Canvas {
            width: 1280,
            height: 720,
        });
        assert_eq!(land.font_size, 42.0);
        assert_eq!(land.line_height, 50.0);

        let port = SubtitleStyle::for_canvas(Canvas {
            width: 720,
            height: 1280,
        });
        assert_eq!(port.font_size, 52.0);
        assert_eq!(port.line_height, 60.0);
    }

    #[test]
    fn layout_block_produces_at_least_one_line_for_nonempty_text() {
        let canvas = Canvas {
            width: 1280,
            height: 720,
        };
        let style = SubtitleStyle::for_canvas(canvas);
        let mut engine = SubtitleEngine::new(None).unwrap();
        let block = engine.layout_block("hello world", canvas, &style).unwrap();
        assert!(block.line_count() >= 1);
    }

    #[test]
    fn layout_block_rejects_bad_font_size() {
        let canvas = Canvas {
            width: 1280,
            height: 720,
        };
        let mut style = SubtitleStyle::for_canvas(canvas);
        style.font_size = 0.0;
        let mut engine = SubtitleEngine::new(None).unwrap();
        assert!(engine.layout_block("x", canvas, &style).is_err());
    }
}
