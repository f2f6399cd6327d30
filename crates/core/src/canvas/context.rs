use std::{
    cell::{Ref, RefCell, RefMut},
    f64::consts::TAU,
    rc::Rc,
};

use super::{parse_css_color, CanvasHandle, Rgba};

/// One observable drawing call made during the current frame.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    FillRect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        style: Rgba,
    },
    ClearRect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    StrokeRect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        style: Rgba,
    },
    Fill {
        style: Rgba,
        vertices: usize,
    },
    Stroke {
        style: Rgba,
        line_width: f64,
        vertices: usize,
    },
    FillText {
        text: String,
        x: f64,
        y: f64,
        style: Rgba,
    },
}

#[derive(Debug, Clone)]
struct DrawState {
    fill_style: Rgba,
    fill_source: String,
    stroke_style: Rgba,
    stroke_source: String,
    line_width: f64,
    global_alpha: f64,
    font: String,
    text_align: String,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            fill_style: Rgba::BLACK,
            fill_source: "#000000".to_string(),
            stroke_style: Rgba::BLACK,
            stroke_source: "#000000".to_string(),
            line_width: 1.0,
            global_alpha: 1.0,
            font: "10px sans-serif".to_string(),
            text_align: "start".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct SubPath {
    points: Vec<(f64, f64)>,
    closed: bool,
}

/// Software 2D drawing context bound to a canvas.
///
/// Every call is rasterised into the surface and appended to a draw log the
/// host clears once per frame.
#[derive(Debug)]
pub struct Context2d {
    canvas: CanvasHandle,
    state: DrawState,
    saved: Vec<DrawState>,
    path: Vec<SubPath>,
    log: Vec<DrawCommand>,
}

impl Context2d {
    pub fn new(canvas: CanvasHandle) -> Self {
        Self {
            canvas,
            state: DrawState::default(),
            saved: Vec::new(),
            path: Vec::new(),
            log: Vec::new(),
        }
    }

    pub fn canvas(&self) -> &CanvasHandle {
        &self.canvas
    }

    pub fn draw_log(&self) -> &[DrawCommand] {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    pub fn fill_style(&self) -> &str {
        &self.state.fill_source
    }

    /// Unparseable colours leave the current style untouched.
    pub fn set_fill_style(&mut self, value: &str) {
        if let Some(color) = parse_css_color(value) {
            self.state.fill_style = color;
            self.state.fill_source = value.to_string();
        }
    }

    pub fn stroke_style(&self) -> &str {
        &self.state.stroke_source
    }

    pub fn set_stroke_style(&mut self, value: &str) {
        if let Some(color) = parse_css_color(value) {
            self.state.stroke_style = color;
            self.state.stroke_source = value.to_string();
        }
    }

    pub fn line_width(&self) -> f64 {
        self.state.line_width
    }

    pub fn set_line_width(&mut self, value: f64) {
        if value.is_finite() && value > 0.0 {
            self.state.line_width = value;
        }
    }

    pub fn global_alpha(&self) -> f64 {
        self.state.global_alpha
    }

    pub fn set_global_alpha(&mut self, value: f64) {
        if (0.0..=1.0).contains(&value) {
            self.state.global_alpha = value;
        }
    }

    pub fn font(&self) -> &str {
        &self.state.font
    }

    pub fn set_font(&mut self, value: &str) {
        self.state.font = value.to_string();
    }

    pub fn text_align(&self) -> &str {
        &self.state.text_align
    }

    pub fn set_text_align(&mut self, value: &str) {
        self.state.text_align = value.to_string();
    }

    pub fn save(&mut self) {
        self.saved.push(self.state.clone());
    }

    pub fn restore(&mut self) {
        if let Some(state) = self.saved.pop() {
            self.state = state;
        }
    }

    /// Resets styles, the state stack and the current path. Called when the
    /// surface is resized, as a browser does.
    pub fn reset(&mut self) {
        self.state = DrawState::default();
        self.saved.clear();
        self.path.clear();
    }

    fn effective(&self, color: Rgba) -> Rgba {
        color.with_alpha(color.a * self.state.global_alpha as f32)
    }

    pub fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64) {
        let style = self.effective(self.state.fill_style);
        self.canvas
            .surface_mut()
            .fill_rect(x, y, width, height, style);
        self.log.push(DrawCommand::FillRect {
            x,
            y,
            width,
            height,
            style,
        });
    }

    pub fn clear_rect(&mut self, x: f64, y: f64, width: f64, height: f64) {
        self.canvas.surface_mut().clear_rect(x, y, width, height);
        self.log.push(DrawCommand::ClearRect {
            x,
            y,
            width,
            height,
        });
    }

    pub fn stroke_rect(&mut self, x: f64, y: f64, width: f64, height: f64) {
        let style = self.effective(self.state.stroke_style);
        let corners = [
            (x, y),
            (x + width, y),
            (x + width, y + height),
            (x, y + height),
        ];
        {
            let mut surface = self.canvas.surface_mut();
            for i in 0..corners.len() {
                surface.draw_line(
                    corners[i],
                    corners[(i + 1) % corners.len()],
                    self.state.line_width,
                    style,
                );
            }
        }
        self.log.push(DrawCommand::StrokeRect {
            x,
            y,
            width,
            height,
            style,
        });
    }

    pub fn begin_path(&mut self) {
        self.path.clear();
    }

    pub fn close_path(&mut self) {
        let start = match self.path.last_mut() {
            Some(sub) => {
                sub.closed = true;
                sub.points.first().copied()
            }
            None => None,
        };
        // Drawing continues from the start of the closed subpath.
        if let Some(start) = start {
            self.path.push(SubPath {
                points: vec![start],
                closed: false,
            });
        }
    }

    pub fn move_to(&mut self, x: f64, y: f64) {
        self.path.push(SubPath {
            points: vec![(x, y)],
            closed: false,
        });
    }

    pub fn line_to(&mut self, x: f64, y: f64) {
        match self.path.last_mut() {
            Some(sub) if !sub.closed => sub.points.push((x, y)),
            _ => self.move_to(x, y),
        }
    }

    pub fn rect(&mut self, x: f64, y: f64, width: f64, height: f64) {
        self.path.push(SubPath {
            points: vec![
                (x, y),
                (x + width, y),
                (x + width, y + height),
                (x, y + height),
            ],
            closed: true,
        });
    }

    /// Appends a circular arc. A current point, if any, is joined to the
    /// arc's start by a straight segment.
    pub fn arc(
        &mut self,
        x: f64,
        y: f64,
        radius: f64,
        start_angle: f64,
        end_angle: f64,
        counterclockwise: bool,
    ) {
        if !(radius.is_finite() && radius >= 0.0) {
            return;
        }
        let mut sweep = end_angle - start_angle;
        if counterclockwise {
            if sweep > 0.0 {
                sweep = (sweep % TAU) - TAU;
            }
            sweep = sweep.max(-TAU);
        } else {
            if sweep < 0.0 {
                sweep = (sweep % TAU) + TAU;
            }
            sweep = sweep.min(TAU);
        }
        let segments = ((sweep.abs() / TAU) * 64.0).ceil().max(1.0) as usize;
        let points = (0..=segments).map(|i| {
            let angle = start_angle + sweep * i as f64 / segments as f64;
            (x + radius * angle.cos(), y + radius * angle.sin())
        });
        match self.path.last_mut() {
            Some(sub) if !sub.closed => sub.points.extend(points),
            _ => self.path.push(SubPath {
                points: points.collect(),
                closed: false,
            }),
        }
    }

    pub fn fill(&mut self) {
        let style = self.effective(self.state.fill_style);
        let mut vertices = 0;
        {
            let mut surface = self.canvas.surface_mut();
            for sub in &self.path {
                vertices += sub.points.len();
                surface.fill_polygon(&sub.points, style);
            }
        }
        self.log.push(DrawCommand::Fill { style, vertices });
    }

    pub fn stroke(&mut self) {
        let style = self.effective(self.state.stroke_style);
        let line_width = self.state.line_width;
        let mut vertices = 0;
        {
            let mut surface = self.canvas.surface_mut();
            for sub in &self.path {
                vertices += sub.points.len();
                for pair in sub.points.windows(2) {
                    surface.draw_line(pair[0], pair[1], line_width, style);
                }
                if sub.closed && sub.points.len() > 2 {
                    let first = sub.points[0];
                    let last = sub.points[sub.points.len() - 1];
                    surface.draw_line(last, first, line_width, style);
                }
            }
        }
        self.log.push(DrawCommand::Stroke {
            style,
            line_width,
            vertices,
        });
    }

    /// Text is recorded but not rasterised; there is no font engine.
    pub fn fill_text(&mut self, text: &str, x: f64, y: f64) {
        let style = self.effective(self.state.fill_style);
        self.log.push(DrawCommand::FillText {
            text: text.to_string(),
            x,
            y,
            style,
        });
    }
}

/// Shared handle to a [`Context2d`]; scripts receive it as `ctx`.
#[derive(Clone, Debug)]
pub struct Context2dHandle {
    inner: Rc<RefCell<Context2d>>,
}

impl Context2dHandle {
    pub fn new(context: Context2d) -> Self {
        Self {
            inner: Rc::new(RefCell::new(context)),
        }
    }

    pub fn borrow(&self) -> Ref<'_, Context2d> {
        self.inner.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Context2d> {
        self.inner.borrow_mut()
    }
}
