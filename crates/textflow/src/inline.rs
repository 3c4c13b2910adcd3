//! The inline formatting context.
//!
//! A block that contains inline content creates one `InlineContext`, feeds
//! it text, replaced boxes and nested inline borders, and then repeatedly
//! extracts line boxes until the context is drained:
//!
//! ```text
//!     push_border( <border-1> )
//!     add_text( <box-1> )
//!     push_border( <border-2> )
//!     add_text( <box-2> )
//!     pop_border( <border-2> )
//!     pop_border( <border-1> )
//!     while let Line(l) = get_line_box(width, FORCE_LINE) { ... }
//! ```
//!
//! The context is transient; it borrows the text measurer and owns nothing
//! of the document tree.

use crate::canvas::Canvas;
use crate::compat::CompatMode;
use crate::dom::{NodeRef, TextFragment};
use crate::style::{
    ComputedValues, EdgeQuad, Font, TextAlign, TextDecoration, TextMeasure, VerticalAlign,
    WhiteSpace,
};

/// Accept a partial final line (the last line of a paragraph).
pub const FORCE_LINE: u8 = 0x01;
/// Emit at least one box even if it overflows the available width.
pub const FORCE_BOX: u8 = 0x02;

/// Vertical box-size metrics of a non-replaced inline element, all relative
/// to the top of the element's logical box. Larger values are further down
/// the page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InlineMetrics {
    pub font_top: i32,
    pub baseline: i32,
    pub font_bottom: i32,
    pub logical: i32,
}

impl InlineMetrics {
    /// Metrics for a node with the given computed style.
    pub fn from_values(values: &ComputedValues) -> Self {
        let font = &values.font;
        let line_height = values.line_height.resolve(font);
        let content_height = font.content_height();
        let bottom_leading = (line_height - content_height) / 2;

        let logical = line_height;
        let font_bottom = logical - bottom_leading;
        let baseline = font_bottom - font.descent;
        let font_top = font_bottom - content_height;
        Self {
            font_top,
            baseline,
            font_bottom,
            logical,
        }
    }
}

/// How a border is positioned vertically within its line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BorderAlign {
    /// Fixed pixel delta from the parent border, resolved at push time.
    ParentOffset,
    /// Pinned to the top of each line box it appears on.
    Top,
    /// Pinned to the bottom of each line box it appears on.
    Bottom,
}

/// Index of a border within its context. Valid for the lifetime of the
/// context that returned it.
pub type BorderId = usize;

const NO_BOX: isize = -1;

/// The margin/padding/border and vertical-alignment contribution of one
/// nested inline element. Construct with [`InlineBorder::new`] and hand to
/// [`InlineContext::push_border`].
#[derive(Debug, Clone)]
pub struct InlineBorder {
    margin: EdgeQuad,
    box_quad: EdgeQuad,
    metrics: InlineMetrics,
    font: Font,
    decoration: TextDecoration,
    vertical_align: VerticalAlign,

    align: BorderAlign,
    /// Pixel delta from the parent border's logical top to this one's. For
    /// `Top`/`Bottom` alignment this holds the most recent per-line
    /// resolution (seeded with the baseline-equivalent value).
    delta: i32,

    /// Leftmost inline-box this border covers on the current line, or
    /// [`NO_BOX`] when the border flowed in from a previous line (in which
    /// case it draws no left margin or edge).
    start_box: isize,
    start_pixel: i32,

    node: Option<NodeRef>,
    is_root: bool,
    is_replaced: bool,
    parent: Option<BorderId>,
}

impl InlineBorder {
    pub fn new(node: Option<NodeRef>, values: &ComputedValues) -> Self {
        Self {
            margin: values.margin,
            box_quad: values.border_padding,
            metrics: InlineMetrics::from_values(values),
            font: values.font,
            decoration: values.text_decoration,
            vertical_align: values.vertical_align,
            align: BorderAlign::ParentOffset,
            delta: 0,
            start_box: NO_BOX,
            start_pixel: 0,
            node,
            is_root: false,
            is_replaced: false,
            parent: None,
        }
    }

    fn replaced(node: Option<NodeRef>, height: i32) -> Self {
        let mut border = Self::new(node, &ComputedValues::default());
        border.margin = EdgeQuad::default();
        border.box_quad = EdgeQuad::default();
        border.decoration = TextDecoration::None;
        border.is_replaced = true;
        border.metrics = InlineMetrics {
            font_top: 0,
            baseline: height,
            font_bottom: height,
            logical: height,
        };
        border
    }

    fn left_width(&self) -> i32 {
        self.margin.left + self.box_quad.left
    }

    fn right_width(&self) -> i32 {
        self.margin.right + self.box_quad.right
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoxKind {
    Text,
    Replaced,
    Newline,
}

/// One horizontally-stacked unit: a text fragment, a replaced object, or an
/// explicit newline.
struct InlineBox {
    canvas: Canvas,
    kind: BoxKind,
    node: Option<NodeRef>,
    font: Option<Font>,

    /// Trailing space between this box and the next, in pixels.
    space: i32,

    /// Borders opening at this box, outermost first.
    border_start: Vec<BorderId>,
    /// Number of borders ending right after this box.
    border_end: usize,

    left_pixels: i32,
    right_pixels: i32,
    content: i32,
    ascent: i32,
    descent: i32,
    em: i32,
}

impl InlineBox {
    fn outer_width(&self) -> i32 {
        self.content + self.left_pixels + self.right_pixels
    }
}

/// A finished line: a paint-ordered canvas plus its total height and the
/// distance from its top to the baseline.
#[derive(Debug)]
pub struct LineBox {
    pub canvas: Canvas,
    pub height: i32,
    pub ascent: i32,
}

/// Outcome of a [`InlineContext::get_line_box`] call.
#[derive(Debug)]
pub enum LineBoxResult {
    Line(LineBox),
    /// Not enough content to fill the requested width; feed more inline
    /// boxes or retry with `FORCE_LINE`.
    NeedMoreInput,
    /// The first box alone is wider than the available width; retry with at
    /// least this many pixels or set `FORCE_BOX`.
    NeedsWidth(i32),
}

enum Fit {
    NeedMoreInput,
    NeedsWidth(i32),
    Line {
        count: usize,
        width: i32,
        has_text: bool,
    },
}

pub struct InlineContext<'a> {
    measure: &'a dyn TextMeasure,
    mode: CompatMode,
    size_only: bool,

    node: Option<NodeRef>,
    text_align: TextAlign,
    white_space: WhiteSpace,
    text_indent: i32,

    /// Lines without text skip the line-height computation outside of
    /// no-quirks mode; table cells latch the quirk until text arrives.
    ignore_line_height: bool,

    boxes: Vec<InlineBox>,
    borders: Vec<InlineBorder>,

    /// Active borders, innermost last. Borders enter when the box they
    /// start at is laid out and leave when their last box is consumed.
    active: Vec<BorderId>,
    /// Borders pushed but not yet attached to a box, innermost last.
    pending: Vec<BorderId>,

    /// Most recently pushed, not yet popped border.
    current: Option<BorderId>,
    root: Option<BorderId>,

    /// Running vertical offset of the innermost active border relative to
    /// the root border's logical top.
    v_align: i32,
}

impl<'a> InlineContext<'a> {
    /// Creates the context for one block. `values` are the block's computed
    /// values; `text_indent` is the used value for the first line, resolved
    /// by the caller because it may be percentage-based.
    pub fn new(
        measure: &'a dyn TextMeasure,
        node: Option<NodeRef>,
        values: &ComputedValues,
        mode: CompatMode,
        size_only: bool,
        text_indent: i32,
        in_table_cell: bool,
    ) -> Self {
        /*
         * The whole context shares the block's 'text-align'. Size-only
         * probes and non-normal white-space handling both force left
         * alignment; justification needs collapsible spaces to distribute
         * slack into.
         */
        let mut text_align = values.text_align;
        if size_only
            || (values.white_space != WhiteSpace::Normal && text_align == TextAlign::Justify)
        {
            text_align = TextAlign::Left;
        }

        log::debug!(
            "new inline context: white-space {:?}, text-align {:?}, text-indent {}px",
            values.white_space,
            text_align,
            text_indent
        );

        Self {
            measure,
            mode,
            size_only,
            node,
            text_align,
            white_space: values.white_space,
            text_indent,
            ignore_line_height: mode != CompatMode::NoQuirks && in_table_cell,
            boxes: Vec::new(),
            borders: Vec::new(),
            active: Vec::new(),
            pending: Vec::new(),
            current: None,
            root: None,
            v_align: 0,
        }
    }

    /// The block node that generated this context.
    pub fn creator(&self) -> Option<NodeRef> {
        self.node
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn set_text_indent(&mut self, text_indent: i32) {
        self.text_indent = text_indent;
    }

    /// Opens an inline border around the boxes added until the matching
    /// [`pop_border`](Self::pop_border). The first border pushed becomes the
    /// synthetic root carrying the block's own baseline; it contributes no
    /// margins and draws no edges.
    pub fn push_border(&mut self, mut border: InlineBorder) -> BorderId {
        let id = self.borders.len();
        border.parent = self.current;

        match self.current {
            None => {
                border.is_root = true;
                border.margin = EdgeQuad::default();
                border.box_quad = EdgeQuad::default();
                border.align = BorderAlign::ParentOffset;
                border.delta = 0;
                self.root = Some(id);
            }
            Some(parent_id) => {
                let parent = &self.borders[parent_id];
                let pm = parent.metrics;
                let parent_font = parent.font;
                let m = border.metrics;

                // Vertical alignment resolves against the parent at push
                // time; only top/bottom wait for the line box.
                let baseline_delta = pm.baseline - m.baseline;
                let (align, delta) = match border.vertical_align {
                    VerticalAlign::Baseline => (BorderAlign::ParentOffset, baseline_delta),
                    VerticalAlign::Sub => {
                        (BorderAlign::ParentOffset, baseline_delta + parent_font.ex_pixels)
                    }
                    VerticalAlign::Super => {
                        (BorderAlign::ParentOffset, baseline_delta - border.font.ex_pixels)
                    }
                    VerticalAlign::TextTop => (BorderAlign::ParentOffset, pm.font_top),
                    VerticalAlign::TextBottom => {
                        (BorderAlign::ParentOffset, pm.font_bottom - m.logical)
                    }
                    VerticalAlign::Middle => (
                        BorderAlign::ParentOffset,
                        pm.baseline - m.logical / 2 - parent_font.ex_pixels / 2,
                    ),
                    VerticalAlign::Length(px) => (BorderAlign::ParentOffset, baseline_delta - px),
                    VerticalAlign::Top => (BorderAlign::Top, baseline_delta),
                    VerticalAlign::Bottom => (BorderAlign::Bottom, baseline_delta),
                };
                border.align = align;
                border.delta = delta;
                log::debug!("push_border: vertical offset {delta}px");
            }
        }

        self.borders.push(border);
        self.pending.push(id);
        self.current = Some(id);
        id
    }

    /// Closes a border: the most recently added box is the last one it
    /// covers. A border popped before any box was added vanishes; an empty
    /// inline element produces nothing drawable.
    pub fn pop_border(&mut self, id: BorderId) {
        debug_assert_eq!(self.current, Some(id));
        self.current = self.borders[id].parent;

        if let Some(pending) = self.pending.pop() {
            debug_assert_eq!(pending, id);
            return;
        }

        if let Some(last) = self.boxes.last_mut() {
            last.border_end += 1;
            last.right_pixels += self.borders[id].right_width();
        } else {
            // The border came in from a previous line and covered nothing
            // on this one.
            let popped = self.active.pop();
            debug_assert_eq!(popped, Some(id));
            self.v_align -= self.borders[id].delta;
        }
    }

    fn add_inline_box(&mut self, kind: BoxKind, node: Option<NodeRef>) -> &mut InlineBox {
        let border_start: Vec<BorderId> = std::mem::take(&mut self.pending);
        let left_pixels = border_start
            .iter()
            .map(|&id| self.borders[id].left_width())
            .sum();
        self.boxes.push(InlineBox {
            canvas: Canvas::new(),
            kind,
            node,
            font: None,
            space: 0,
            border_start,
            border_end: 0,
            left_pixels,
            right_pixels: 0,
            content: 0,
            ascent: 0,
            descent: 0,
            em: 0,
        });
        self.boxes.last_mut().expect("box was just pushed")
    }

    fn add_space(&mut self, pixels: i32) {
        if let Some(last) = self.boxes.last_mut() {
            if self.white_space == WhiteSpace::Normal {
                last.space = last.space.max(pixels);
            } else {
                last.space += pixels;
            }
        }
    }

    fn add_newline(&mut self, height: i32) {
        let newline = self.add_inline_box(BoxKind::Newline, None);
        newline.em = height;
        // Trailing spaces after the line break accumulate on this box.
        self.add_inline_box(BoxKind::Text, None);
    }

    /// Appends one inline box per word of the node's text, with whitespace
    /// handling governed by the context's effective 'white-space'.
    pub fn add_text(
        &mut self,
        node: Option<NodeRef>,
        fragments: &[TextFragment],
        values: &ComputedValues,
    ) {
        let font = values.font;
        let space_width = font.space_pixels;
        let newline_height = font.content_height();

        let baseline = self
            .current
            .map(|id| self.borders[id].metrics.baseline)
            .unwrap_or_else(|| InlineMetrics::from_values(values).baseline);

        for fragment in fragments {
            match fragment {
                TextFragment::Word(text) => {
                    let width = self.measure.text_width(&font, text);
                    let size_only = self.size_only;
                    let color = values.color;
                    let inline_box = self.add_inline_box(BoxKind::Text, node);
                    inline_box.content = width;
                    inline_box.ascent = font.ascent;
                    inline_box.descent = font.descent;
                    inline_box.em = font.em_pixels;
                    inline_box.font = Some(font);
                    if !size_only {
                        inline_box
                            .canvas
                            .draw_text(0, baseline, text, width, font, color, node);
                    }
                    self.ignore_line_height = false;
                }

                TextFragment::Whitespace(bytes) => {
                    let mut at = 0;
                    while at < bytes.len() {
                        // CR and CRLF count as newlines without being
                        // rewritten in the buffer.
                        let is_newline = matches!(bytes[at], b'\n' | b'\r');
                        if bytes[at] == b'\r' && bytes.get(at + 1) == Some(&b'\n') {
                            at += 1;
                        }
                        at += 1;

                        if is_newline && self.white_space == WhiteSpace::Pre {
                            self.add_newline(newline_height);
                            continue;
                        }

                        /*
                         * Leading spaces on a preformatted line need a box
                         * to hang off; everywhere else space before any
                         * content simply vanishes.
                         */
                        if self.white_space == WhiteSpace::Pre && self.boxes.is_empty() {
                            self.add_inline_box(BoxKind::Text, None);
                        }
                        self.add_space(space_width);
                    }
                }
            }
        }
    }

    /// Appends a pre-rendered replaced box (image, inline-block). The
    /// canvas origin is the top-left of the margin box; `offset` is the
    /// distance from the baseline to the canvas top (typically negative).
    pub fn add_box(
        &mut self,
        node: Option<NodeRef>,
        values: &ComputedValues,
        canvas: Canvas,
        width: i32,
        height: i32,
        offset: i32,
    ) {
        if width == 0 {
            return;
        }

        let mut border = InlineBorder::replaced(node, height);
        border.vertical_align = values.vertical_align;
        border.font = values.font;
        let id = self.push_border(border);

        let inline_box = self.add_inline_box(BoxKind::Replaced, node);
        inline_box.canvas = canvas;
        inline_box.content = width;
        inline_box.ascent = -offset;
        inline_box.descent = height + offset;

        self.pop_border(id);
    }

    /// Sum of vertical deltas from the root border down to `id`.
    fn chain_offset(&self, id: BorderId) -> i32 {
        let mut offset = 0;
        let mut walk = Some(id);
        while let Some(at) = walk {
            offset += self.borders[at].delta;
            walk = self.borders[at].parent;
        }
        offset
    }

    /// Greedy fit: how many boxes make the next line and how wide they are.
    fn calculate_width(&self, flags: u8, available: i32) -> Fit {
        let force_line = flags & FORCE_LINE != 0;
        let force_box = flags & FORCE_BOX != 0;

        let mut width = 0;
        let mut count = 0;
        let mut has_text = false;

        for (ii, inline_box) in self.boxes.iter().enumerate() {
            let mut box_width = inline_box.outer_width();
            if ii > 0 {
                box_width += self.boxes[ii - 1].space;
            }
            if width + box_width > available && self.white_space != WhiteSpace::NoWrap {
                break;
            }
            width += box_width;
            count = ii + 1;
            if matches!(inline_box.kind, BoxKind::Text | BoxKind::Newline) {
                has_text = true;
            }
            if inline_box.kind == BoxKind::Newline {
                break;
            }
        }

        if self.boxes.is_empty() || (!force_line && count == self.boxes.len()) {
            // Not enough content to fill the line (this also catches
            // 'nowrap' without FORCE_LINE, which never stops early).
            return Fit::NeedMoreInput;
        }

        if count == 0 {
            let first_width = self.boxes[0].outer_width();
            if !force_box {
                return Fit::NeedsWidth(first_width);
            }
            /*
             * The first box is too wide but FORCE_BOX is set, so emit it
             * alone. Hold back the very last box of the context unless
             * FORCE_LINE also allows finishing: it may still be needed to
             * close an inline border.
             */
            if self.boxes.len() > 1 || force_line {
                let mut count = 1;
                if self.boxes.len() > 1 && self.boxes[1].kind == BoxKind::Newline {
                    count = 2;
                }
                let has_text = self.boxes[..count]
                    .iter()
                    .any(|b| matches!(b.kind, BoxKind::Text | BoxKind::Newline));
                return Fit::Line {
                    count,
                    width: first_width,
                    has_text,
                };
            }
            return Fit::NeedMoreInput;
        }

        if self.white_space == WhiteSpace::NoWrap && width > available && !force_box {
            // Give the caller the chance to try again with more room.
            return Fit::NeedsWidth(width);
        }

        Fit::Line {
            count,
            width,
            has_text,
        }
    }

    /// Line-box vertical extent. `top` and `bottom` are relative to the
    /// logical top of the root border; `top <= 0 <= bottom` always holds.
    fn calculate_height(&mut self, count: usize, has_text: bool) -> (i32, i32) {
        let quirk = (!has_text && self.mode != CompatMode::NoQuirks) || self.ignore_line_height;

        let mut top = 0;
        let mut bottom = 0;

        if !quirk {
            // Borders flowing in from previous lines.
            for &id in &self.active {
                let offset = self.chain_offset(id);
                top = top.min(offset);
                bottom = bottom.max(offset + self.borders[id].metrics.logical);
            }
        }

        // Borders opening on this line.
        for inline_box in &self.boxes[..count] {
            for &id in &inline_box.border_start {
                let border = &self.borders[id];
                if quirk {
                    if border.is_replaced {
                        bottom = bottom.max(border.metrics.logical);
                    }
                    continue;
                }
                if border.align == BorderAlign::ParentOffset {
                    let offset = self.chain_offset(id);
                    top = top.min(offset);
                    bottom = bottom.max(offset + border.metrics.logical);
                }
            }
        }

        if !quirk {
            /*
             * Line-relative alignment resolves only now: pin to the extent
             * computed from the offset-aligned boxes, growing the line
             * downward when a pinned box is taller than it.
             */
            for align in [BorderAlign::Top, BorderAlign::Bottom] {
                for inline_box in &self.boxes[..count] {
                    for &id in &inline_box.border_start {
                        if self.borders[id].align != align {
                            continue;
                        }
                        let logical = self.borders[id].metrics.logical;
                        bottom = bottom.max(top + logical);
                        let parent_offset = self.borders[id]
                            .parent
                            .map(|p| self.chain_offset(p))
                            .unwrap_or(0);
                        self.borders[id].delta = match align {
                            BorderAlign::Top => top - parent_offset,
                            _ => bottom - logical - parent_offset,
                        };
                    }
                }
            }
        }

        debug_assert!(top <= 0);
        debug_assert!(bottom >= 0);
        (top, bottom)
    }

    /// Draws one border's box edges and decoration into `canvas`.
    ///
    /// `replaced_x` lists the horizontal extents of replaced boxes on this
    /// line; decoration segments skip over them so images do not get
    /// underlined.
    #[allow(clippy::too_many_arguments)]
    fn draw_border(
        &self,
        canvas: &mut Canvas,
        id: BorderId,
        x1: i32,
        x2: i32,
        vertical_offset: i32,
        draw_right: bool,
        replaced_x: &[(i32, i32)],
    ) {
        let border = &self.borders[id];
        let draw_left = border.start_box >= 0;

        let mut x1 = x1 + if draw_left { border.margin.left } else { 0 };
        let mut x2 = x2 - if draw_right { border.margin.right } else { 0 };

        let box_top = vertical_offset + border.metrics.font_top - border.box_quad.top - 1;
        let box_height = (border.metrics.font_bottom - border.metrics.font_top)
            + border.box_quad.top
            + border.box_quad.bottom
            + 1;

        if !border.is_root {
            canvas.draw_box(
                x1,
                box_top,
                x2 - x1,
                box_height,
                border.node,
                !draw_left,
                !draw_right,
            );
        }

        x1 += if draw_left { border.box_quad.left } else { 0 };
        x2 -= if draw_right { border.box_quad.right } else { 0 };

        let y_over = vertical_offset - 1;
        let y_under = vertical_offset + border.metrics.baseline + 1;
        let y_through = vertical_offset + border.metrics.baseline - border.font.ex_pixels / 2;

        let mut segment = |from: i32, to: i32| {
            canvas.draw_line(
                from,
                to - from,
                y_over,
                y_through,
                y_under,
                border.decoration,
                border.node,
            );
        };

        if replaced_x.is_empty() {
            segment(x1, x2);
            return;
        }

        let mut xa = x1;
        for &(xs, xe) in replaced_x {
            if xe <= xs {
                continue;
            }
            if xs > xa {
                segment(xa, xs.min(x2));
            }
            if xe > xa {
                xa = xe;
            }
        }
        if xa < x2 {
            segment(xa, x2);
        }
    }

    /// Extracts the next line box, laying out as many queued boxes as fit
    /// in `available` pixels.
    pub fn get_line_box(&mut self, available: i32, flags: u8) -> LineBoxResult {
        let requested = available - self.text_indent;

        let (count, line_width, has_text) = match self.calculate_width(flags, requested) {
            Fit::NeedMoreInput => return LineBoxResult::NeedMoreInput,
            Fit::NeedsWidth(min) => return LineBoxResult::NeedsWidth(min),
            Fit::Line {
                count,
                width,
                has_text,
            } => (count, width, has_text),
        };

        let (top, bottom) = self.calculate_height(count, has_text);
        let height = bottom - top;
        let root_baseline = self
            .root
            .map(|id| self.borders[id].metrics.baseline)
            .unwrap_or(0);
        let ascent = root_baseline - top;

        /*
         * 'text-align' turns into an initial left offset, or for justified
         * text a fractional pixel count distributed into each inter-box
         * gap. The last box takes the exact remainder so the right margins
         * of adjacent lines land on the same pixel.
         */
        let mut left = match self.text_align {
            TextAlign::Center => (requested - line_width) / 2,
            TextAlign::Right => requested - line_width,
            _ => 0,
        };
        let justify_extra: Option<f64> = if self.text_align == TextAlign::Justify
            && count > 1
            && requested > line_width
            && count < self.boxes.len()
        {
            Some(f64::from(requested - line_width) / (count - 1) as f64)
        } else {
            None
        };
        left += self.text_indent;

        let mut content = Canvas::new();
        let mut border_canvas = Canvas::new();
        let mut replaced_x: Vec<(i32, i32)> = Vec::new();
        let mut x = left;

        for i in 0..count {
            let extra_pixels = match justify_extra {
                Some(per_gap) if i < count - 1 => (per_gap * i as f64) as i32,
                Some(_) => requested - line_width,
                None => 0,
            };

            let mut merged = false;
            if !self.size_only && i > 0 && self.boxes[i].kind == BoxKind::Text {
                let (previous, this) = {
                    let (a, b) = self.boxes.split_at(i);
                    (&a[i - 1], &b[0])
                };
                if previous.kind == BoxKind::Text && this.node.is_some() && previous.node.is_some()
                {
                    let space_width = this.font.map(|f| f.space_pixels).unwrap_or(-1);
                    if this.node == previous.node
                        && justify_extra.is_none()
                        && previous.space == space_width
                    {
                        /*
                         * Successive tokens of one text node separated by
                         * exactly one space collapse into one primitive, so
                         * selection highlighting stays contiguous.
                         */
                        let mut word = Vec::with_capacity(1 + this.content as usize);
                        word.push(b' ');
                        for item in this.canvas.items() {
                            if let crate::canvas::Primitive::Text { text, .. } = &item.primitive {
                                word.extend_from_slice(text);
                            }
                        }
                        merged = content.text_extend(&word, previous.space + this.content);
                    } else if this.left_pixels == 0 && previous.right_pixels == 0 {
                        // No borders between the boxes: stretch the earlier
                        // primitive across the gap instead.
                        let gap_extra = match justify_extra {
                            Some(per_gap) => extra_pixels - (per_gap * (i - 1) as f64) as i32,
                            None => 0,
                        };
                        content.text_extend(&[], previous.space + gap_extra);
                    }
                }
            }

            // Borders starting at this box join the active stack; their
            // start pixel nests outward from the content edge.
            let content_left = x + extra_pixels + self.boxes[i].left_pixels;
            let starts = self.boxes[i].border_start.clone();
            let mut suffix: i32 = starts
                .iter()
                .map(|&id| self.borders[id].left_width())
                .sum();
            for &id in &starts {
                let x1 = content_left - suffix;
                suffix -= self.borders[id].left_width();
                self.borders[id].start_box = i as isize;
                self.borders[id].start_pixel = x1;
                self.v_align += self.borders[id].delta;
                self.active.push(id);
            }

            let x1 = content_left;
            let box_width = self.boxes[i].content;
            if self.boxes[i].kind == BoxKind::Replaced {
                replaced_x.push((x1, x1 + box_width));
            }

            if !merged {
                let y = if has_text || self.mode == CompatMode::NoQuirks {
                    self.v_align
                } else {
                    0
                };
                let box_canvas = std::mem::take(&mut self.boxes[i].canvas);
                content.draw_canvas(box_canvas, x1, y);
            }
            x += self.boxes[i].outer_width();

            /*
             * Borders ending at this box (and, on the final box, every
             * border still active) get their edges drawn now. Each newly
             * drawn border slides underneath everything drawn before it so
             * inner backgrounds stay on top of outer ones.
             */
            let ends_here = self.boxes[i].border_end;
            let draw_count = if i == count - 1 {
                self.active.len()
            } else {
                ends_here
            };
            let mut x2 = x + extra_pixels - self.boxes[i].right_pixels;
            for j in 0..draw_count {
                let id = self.active[self.active.len() - 1 - j];
                let closes = j < ends_here;
                if closes {
                    x2 += self.borders[id].right_width();
                }
                if self.borders[id].is_replaced {
                    continue;
                }
                let vertical_offset = self.chain_offset(id);
                let x1 = if self.borders[id].start_box >= 0 {
                    self.borders[id].start_pixel
                } else {
                    left
                };
                let mut drawn = Canvas::new();
                self.draw_border(&mut drawn, id, x1, x2, vertical_offset, closes, &replaced_x);
                drawn.draw_canvas(std::mem::take(&mut border_canvas), 0, 0);
                border_canvas = drawn;
            }

            for _ in 0..ends_here {
                if let Some(id) = self.active.pop() {
                    self.v_align -= self.borders[id].delta;
                }
            }

            x += self.boxes[i].space;
        }

        // Borders continuing onto the next line draw no left margin there.
        for &id in &self.active {
            self.borders[id].start_box = NO_BOX;
        }

        let mut canvas = Canvas::new();
        canvas.draw_canvas(border_canvas, 0, -top);
        canvas.draw_canvas(content, 0, -top);

        self.boxes.drain(..count);
        self.text_indent = 0;

        log::debug!(
            "line box: {count} boxes, width {line_width}px, height {height}px, ascent {ascent}px"
        );

        LineBoxResult::Line(LineBox {
            canvas,
            height,
            ascent,
        })
    }
}
