//! `canvas` and `ctx` as seen from scripts, named after their browser
//! counterparts.

use rhai::{Dynamic, Engine, ImmutableString, FLOAT, INT};

use super::{as_number, numbers, ScriptResult};
use crate::canvas::{CanvasHandle, Context2dHandle};

pub(super) fn register(engine: &mut Engine) {
    engine
        .register_type_with_name::<CanvasHandle>("HTMLCanvasElement")
        .register_get("width", |canvas: &mut CanvasHandle| canvas.width() as INT)
        .register_get("height", |canvas: &mut CanvasHandle| canvas.height() as INT);

    engine
        .register_type_with_name::<Context2dHandle>("CanvasRenderingContext2D")
        .register_get("canvas", |ctx: &mut Context2dHandle| {
            ctx.borrow().canvas().clone()
        })
        .register_get_set(
            "fillStyle",
            |ctx: &mut Context2dHandle| -> ImmutableString { ctx.borrow().fill_style().into() },
            |ctx: &mut Context2dHandle, value: ImmutableString| {
                ctx.borrow_mut().set_fill_style(value.as_str())
            },
        )
        .register_get_set(
            "strokeStyle",
            |ctx: &mut Context2dHandle| -> ImmutableString { ctx.borrow().stroke_style().into() },
            |ctx: &mut Context2dHandle, value: ImmutableString| {
                ctx.borrow_mut().set_stroke_style(value.as_str())
            },
        )
        .register_get_set(
            "font",
            |ctx: &mut Context2dHandle| -> ImmutableString { ctx.borrow().font().into() },
            |ctx: &mut Context2dHandle, value: ImmutableString| {
                ctx.borrow_mut().set_font(value.as_str())
            },
        )
        .register_get_set(
            "textAlign",
            |ctx: &mut Context2dHandle| -> ImmutableString { ctx.borrow().text_align().into() },
            |ctx: &mut Context2dHandle, value: ImmutableString| {
                ctx.borrow_mut().set_text_align(value.as_str())
            },
        )
        // Non-numeric assignments are ignored, as in the browser.
        .register_get("lineWidth", |ctx: &mut Context2dHandle| -> FLOAT { ctx.borrow().line_width() })
        .register_set(
            "lineWidth",
            |ctx: &mut Context2dHandle, value: Dynamic| {
                if let Some(width) = as_number(&value) {
                    ctx.borrow_mut().set_line_width(width);
                }
            },
        )
        .register_get("globalAlpha", |ctx: &mut Context2dHandle| -> FLOAT { ctx.borrow().global_alpha() })
        .register_set(
            "globalAlpha",
            |ctx: &mut Context2dHandle, value: Dynamic| {
                if let Some(alpha) = as_number(&value) {
                    ctx.borrow_mut().set_global_alpha(alpha);
                }
            },
        );

    engine
        .register_fn(
            "fillRect",
            |ctx: &mut Context2dHandle, x: Dynamic, y: Dynamic, w: Dynamic, h: Dynamic| -> ScriptResult<()> {
                let [x, y, w, h] = numbers("fillRect", [&x, &y, &w, &h])?;
                ctx.borrow_mut().fill_rect(x, y, w, h);
                Ok(())
            },
        )
        .register_fn(
            "clearRect",
            |ctx: &mut Context2dHandle, x: Dynamic, y: Dynamic, w: Dynamic, h: Dynamic| -> ScriptResult<()> {
                let [x, y, w, h] = numbers("clearRect", [&x, &y, &w, &h])?;
                ctx.borrow_mut().clear_rect(x, y, w, h);
                Ok(())
            },
        )
        .register_fn(
            "strokeRect",
            |ctx: &mut Context2dHandle, x: Dynamic, y: Dynamic, w: Dynamic, h: Dynamic| -> ScriptResult<()> {
                let [x, y, w, h] = numbers("strokeRect", [&x, &y, &w, &h])?;
                ctx.borrow_mut().stroke_rect(x, y, w, h);
                Ok(())
            },
        )
        .register_fn(
            "rect",
            |ctx: &mut Context2dHandle, x: Dynamic, y: Dynamic, w: Dynamic, h: Dynamic| -> ScriptResult<()> {
                let [x, y, w, h] = numbers("rect", [&x, &y, &w, &h])?;
                ctx.borrow_mut().rect(x, y, w, h);
                Ok(())
            },
        )
        .register_fn("beginPath", |ctx: &mut Context2dHandle| {
            ctx.borrow_mut().begin_path()
        })
        .register_fn("closePath", |ctx: &mut Context2dHandle| {
            ctx.borrow_mut().close_path()
        })
        .register_fn(
            "moveTo",
            |ctx: &mut Context2dHandle, x: Dynamic, y: Dynamic| -> ScriptResult<()> {
                let [x, y] = numbers("moveTo", [&x, &y])?;
                ctx.borrow_mut().move_to(x, y);
                Ok(())
            },
        )
        .register_fn(
            "lineTo",
            |ctx: &mut Context2dHandle, x: Dynamic, y: Dynamic| -> ScriptResult<()> {
                let [x, y] = numbers("lineTo", [&x, &y])?;
                ctx.borrow_mut().line_to(x, y);
                Ok(())
            },
        )
        .register_fn(
            "arc",
            |ctx: &mut Context2dHandle, x: Dynamic, y: Dynamic, r: Dynamic, start: Dynamic, end: Dynamic| -> ScriptResult<()> {
                let [x, y, r, start, end] = numbers("arc", [&x, &y, &r, &start, &end])?;
                ctx.borrow_mut().arc(x, y, r, start, end, false);
                Ok(())
            },
        )
        .register_fn(
            "arc",
            |ctx: &mut Context2dHandle,
             x: Dynamic,
             y: Dynamic,
             r: Dynamic,
             start: Dynamic,
             end: Dynamic,
             counterclockwise: bool|
             -> ScriptResult<()> {
                let [x, y, r, start, end] = numbers("arc", [&x, &y, &r, &start, &end])?;
                ctx.borrow_mut().arc(x, y, r, start, end, counterclockwise);
                Ok(())
            },
        )
        .register_fn("fill", |ctx: &mut Context2dHandle| ctx.borrow_mut().fill())
        .register_fn("stroke", |ctx: &mut Context2dHandle| ctx.borrow_mut().stroke())
        .register_fn(
            "fillText",
            |ctx: &mut Context2dHandle, text: Dynamic, x: Dynamic, y: Dynamic| -> ScriptResult<()> {
                let [x, y] = numbers("fillText", [&x, &y])?;
                ctx.borrow_mut().fill_text(&text.to_string(), x, y);
                Ok(())
            },
        )
        .register_fn("save", |ctx: &mut Context2dHandle| ctx.borrow_mut().save())
        .register_fn("restore", |ctx: &mut Context2dHandle| {
            ctx.borrow_mut().restore()
        });
}
