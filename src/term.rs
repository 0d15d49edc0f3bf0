use crossterm::{
    cursor, execute,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{self, ClearType, EnterAlternateScreen, LeaveAlternateScreen},
    Command,
};
use std::io::{self, BufWriter, Write};
use std::panic;

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

pub const HALF_BLOCK: char = '\u{2584}';

// --- Colors ---

pub fn rgb_to_ansi256(r: u8, g: u8, b: u8) -> u8 {
    if r == g && g == b {
        // Grayscale ramp, with the cube corners for the extremes.
        return match r {
            0..=7 => 16,
            249..=255 => 231,
            _ => 232 + ((r as f32 - 8.0) / 247.0 * 24.0) as u8,
        };
    }
    let ri = (r as f32 / 255.0 * 5.0 + 0.5) as u8;
    let gi = (g as f32 / 255.0 * 5.0 + 0.5) as u8;
    let bi = (b as f32 / 255.0 * 5.0 + 0.5) as u8;
    16 + 36 * ri + 6 * gi + bi
}

pub fn make_color(rgb: [u8; 3], use_truecolor: bool) -> Color {
    let [r, g, b] = rgb;
    if use_truecolor {
        Color::Rgb { r, g, b }
    } else {
        Color::AnsiValue(rgb_to_ansi256(r, g, b))
    }
}

pub fn detect_truecolor() -> bool {
    std::env::var("COLORTERM")
        .map(|v| v.contains("truecolor") || v.contains("24bit"))
        .unwrap_or(false)
}

// --- Terminal lifecycle ---

pub fn install_panic_hook() {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let _ = terminal::disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = execute!(
            stdout,
            ResetColor,
            cursor::Show,
            LeaveAlternateScreen,
            terminal::Clear(ClearType::All)
        );
        default_hook(panic_info);
    }));
}

pub fn setup_terminal(stdout: &mut BufWriter<io::Stdout>) -> AppResult<()> {
    terminal::enable_raw_mode()?;
    execute!(
        stdout,
        EnterAlternateScreen,
        cursor::Hide,
        terminal::Clear(ClearType::All)
    )?;
    stdout.flush()?;
    Ok(())
}

pub fn cleanup_terminal(stdout: &mut BufWriter<io::Stdout>) -> AppResult<()> {
    execute!(
        stdout,
        ResetColor,
        cursor::Show,
        LeaveAlternateScreen,
        terminal::Clear(ClearType::All)
    )?;
    stdout.flush()?;
    terminal::disable_raw_mode()?;
    Ok(())
}

// --- Presentation ---

fn write_ansi_command(buf: &mut String, command: impl Command) -> io::Result<()> {
    command
        .write_ansi(buf)
        .map_err(|_| io::Error::other("failed to encode ANSI command"))
}

/// Draws a resolved RGBA image as half-block cells: each terminal cell
/// shows two vertically stacked pixels, background for the top one and
/// foreground (the lower-half-block glyph) for the bottom one. The image
/// height must be twice the row count.
pub fn present_image(
    image: &[u8],
    width: usize,
    term_rows: usize,
    use_truecolor: bool,
    frame_buf: &mut String,
    stdout: &mut impl Write,
) -> io::Result<()> {
    frame_buf.clear();

    for term_row in 0..term_rows {
        write_ansi_command(frame_buf, cursor::MoveTo(0, term_row as u16))?;
        let top_row = term_row * 2;
        let bottom_row = top_row + 1;
        for col in 0..width {
            let top = pixel_rgb(image, width, col, top_row);
            let bottom = pixel_rgb(image, width, col, bottom_row);
            write_ansi_command(frame_buf, SetBackgroundColor(make_color(top, use_truecolor)))?;
            write_ansi_command(
                frame_buf,
                SetForegroundColor(make_color(bottom, use_truecolor)),
            )?;
            frame_buf.push(HALF_BLOCK);
        }
    }

    stdout.write_all(frame_buf.as_bytes())
}

fn pixel_rgb(image: &[u8], width: usize, x: usize, y: usize) -> [u8; 3] {
    let start = (y * width + x) * 4;
    [image[start], image[start + 1], image[start + 2]]
}

/// One status line over the top of the frame, truncated or padded to the
/// terminal width.
pub fn draw_status_line(
    text: &mut String,
    cols: usize,
    use_truecolor: bool,
    stdout: &mut impl Write,
) -> io::Result<()> {
    let char_count = text.chars().count();
    if char_count > cols {
        if let Some((idx, _)) = text.char_indices().nth(cols) {
            text.truncate(idx);
        }
    } else {
        for _ in char_count..cols {
            text.push(' ');
        }
    }

    crossterm::queue!(
        stdout,
        cursor::MoveTo(0, 0),
        SetBackgroundColor(make_color([0, 0, 0], use_truecolor)),
        SetForegroundColor(make_color([240, 240, 240], use_truecolor)),
        Print(text.as_str())
    )
}
