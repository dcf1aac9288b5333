use crossterm::event::Event;
use std::io::{BufWriter, Stdout, Write};

pub mod fireworks;
pub mod hearts;
pub mod valentine;

pub trait Effect {
    fn new(width: usize, height: usize) -> Self
    where
        Self: Sized;
    fn update(&mut self, dt: f32);
    fn render(&mut self, stdout: &mut BufWriter<Stdout>) -> std::io::Result<()>;
    fn resize(&mut self, width: usize, height: usize);
    fn handle_event(&mut self, _event: &Event) {}
}

// One cell column holds two stacked half-block pixels; at a typical terminal
// cell aspect that makes each pixel close to square, 8px on a side in the
// simulation's viewport coordinates.
pub const CELL_PX: f32 = 8.0;

// Backdrop when no --bg-color is given: dark plum fading to wine.
const GRADIENT_TOP: (u8, u8, u8) = (24, 7, 26);
const GRADIENT_BOTTOM: (u8, u8, u8) = (62, 13, 36);

// Session background: a flat user-chosen color, or the default vertical
// gradient when none was set.
pub fn fill_background(frame: &mut [(f32, f32, f32)], width: usize, height: usize) {
    let bg = crate::get_bg_color();
    if bg != (0, 0, 0) {
        frame.fill((bg.0 as f32, bg.1 as f32, bg.2 as f32));
        return;
    }
    for y in 0..height {
        let t = if height > 1 {
            y as f32 / (height - 1) as f32
        } else {
            0.0
        };
        let row = (
            GRADIENT_TOP.0 as f32 + (GRADIENT_BOTTOM.0 as f32 - GRADIENT_TOP.0 as f32) * t,
            GRADIENT_TOP.1 as f32 + (GRADIENT_BOTTOM.1 as f32 - GRADIENT_TOP.1 as f32) * t,
            GRADIENT_TOP.2 as f32 + (GRADIENT_BOTTOM.2 as f32 - GRADIENT_TOP.2 as f32) * t,
        );
        frame[y * width..(y + 1) * width].fill(row);
    }
}

// Emit an RGB frame as truecolor half-block cells into the reused output
// buffer. Escape codes are only written when a color changes.
pub fn emit_frame(
    frame: &[(f32, f32, f32)],
    width: usize,
    height: usize,
    out: &mut Vec<u8>,
) -> std::io::Result<()> {
    out.clear();
    out.extend_from_slice(b"\x1b[H");

    let mut prev_top_color: (u8, u8, u8) = (255, 255, 255);
    let mut prev_bot_color: (u8, u8, u8) = (255, 255, 255);

    for y in (0..height).step_by(2) {
        for x in 0..width {
            let top_idx = y * width + x;
            let bot_idx = if y + 1 < height {
                (y + 1) * width + x
            } else {
                top_idx
            };

            let top_color = (
                frame[top_idx].0.round().clamp(0.0, 255.0) as u8,
                frame[top_idx].1.round().clamp(0.0, 255.0) as u8,
                frame[top_idx].2.round().clamp(0.0, 255.0) as u8,
            );
            let bot_color = (
                frame[bot_idx].0.round().clamp(0.0, 255.0) as u8,
                frame[bot_idx].1.round().clamp(0.0, 255.0) as u8,
                frame[bot_idx].2.round().clamp(0.0, 255.0) as u8,
            );

            if top_color != prev_top_color {
                write!(
                    out,
                    "\x1b[48;2;{};{};{}m",
                    top_color.0, top_color.1, top_color.2
                )?;
                prev_top_color = top_color;
            }
            if bot_color != prev_bot_color {
                write!(
                    out,
                    "\x1b[38;2;{};{};{}m",
                    bot_color.0, bot_color.1, bot_color.2
                )?;
                prev_bot_color = bot_color;
            }

            out.extend_from_slice("▄".as_bytes());
        }
        out.extend_from_slice(b"\x1b[0m");
        prev_top_color = (255, 255, 255);
        prev_bot_color = (255, 255, 255);
        if y + 2 < height {
            out.extend_from_slice(b"\r\n");
        }
    }

    Ok(())
}

pub fn write_frame(
    stdout: &mut BufWriter<Stdout>,
    frame: &[(f32, f32, f32)],
    width: usize,
    height: usize,
    out: &mut Vec<u8>,
) -> std::io::Result<()> {
    emit_frame(frame, width, height, out)?;
    stdout.write_all(out)?;
    stdout.flush()?;
    Ok(())
}
