use std::io::{self, BufWriter, Write};
use std::fmt::Write as _;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::style::ResetColor;
use crossterm::terminal;
use glam::Vec3;

mod camera;
mod demo;
mod math;
mod render;
mod scene;
mod term;

use camera::Camera;
use render::{DebugVis, Pipeline, RenderConfig, Supersampling};

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

const FRAME_TARGET: Duration = Duration::from_millis(33);

struct App {
    camera: Camera,
    pipeline: Pipeline,
    image: Vec<u8>,
    status_buf: String,
    frame_buf: String,
    use_truecolor: bool,
    show_status: bool,
    auto_orbit: bool,
    orbit_angle: f32,
    orbit_radius: f32,
    orbit_height: f32,
    fps: f32,
    last_frame_time: Instant,
}

fn parse_config(args: &[String]) -> RenderConfig {
    let has = |flag: &str| args.iter().any(|arg| arg == flag);
    RenderConfig {
        supersampling: if has("--ssaa4") {
            Supersampling::X4
        } else if has("--ssaa2") {
            Supersampling::X2
        } else {
            Supersampling::Off
        },
        texturing: !has("--no-texture"),
        bilinear: has("--bilinear"),
        perspective_correct: !has("--affine"),
        debug: if has("--debug-z") {
            DebugVis::Depth
        } else if has("--debug-normals") {
            DebugVis::Normals
        } else {
            DebugVis::Off
        },
        tolerate_invalid_groups: false,
    }
}

/// Returns true when the app should quit. Config toggles rebuild buffers
/// only when the supersampling factor changes.
fn handle_key(app: &mut App, code: KeyCode) -> AppResult<bool> {
    let mut config = *app.pipeline.config();
    match code {
        KeyCode::Char('q') | KeyCode::Esc => return Ok(true),
        KeyCode::Char(' ') => {
            app.auto_orbit = !app.auto_orbit;
            return Ok(false);
        }
        KeyCode::Tab => {
            app.show_status = !app.show_status;
            return Ok(false);
        }
        KeyCode::Up => {
            app.orbit_height = (app.orbit_height + 0.3).min(6.0);
            return Ok(false);
        }
        KeyCode::Down => {
            app.orbit_height = (app.orbit_height - 0.3).max(-2.0);
            return Ok(false);
        }
        KeyCode::Char('+') | KeyCode::Char('=') => {
            app.orbit_radius = (app.orbit_radius - 0.4).max(2.0);
            return Ok(false);
        }
        KeyCode::Char('-') => {
            app.orbit_radius = (app.orbit_radius + 0.4).min(14.0);
            return Ok(false);
        }
        KeyCode::Char('s') => config.supersampling = config.supersampling.next(),
        KeyCode::Char('b') => config.bilinear = !config.bilinear,
        KeyCode::Char('t') => config.texturing = !config.texturing,
        KeyCode::Char('p') => config.perspective_correct = !config.perspective_correct,
        KeyCode::Char('d') => config.debug = config.debug.next(),
        _ => return Ok(false),
    }
    app.pipeline.set_config(config)?;
    Ok(false)
}

fn drain_input(app: &mut App) -> AppResult<bool> {
    while event::poll(Duration::ZERO)? {
        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                if handle_key(app, key.code)? {
                    return Ok(true);
                }
            }
            Event::Resize(cols, rows) => {
                let width = cols.max(1) as usize;
                let height = rows.max(1) as usize * 2;
                app.pipeline.resize(width, height)?;
                app.image.resize(width * height * 4, 0);
            }
            _ => {}
        }
    }
    Ok(false)
}

fn update_orbit(app: &mut App, delta_time: f32) {
    if app.auto_orbit {
        app.orbit_angle += 0.5 * delta_time;
    }
    app.camera.position = Vec3::new(
        app.orbit_radius * app.orbit_angle.cos(),
        app.orbit_height,
        app.orbit_radius * app.orbit_angle.sin(),
    );
    camera::look_at_origin(&mut app.camera);
}

fn render_frame(app: &mut App, stdout: &mut BufWriter<io::Stdout>) -> AppResult<()> {
    let width = app.pipeline.output_width();
    let height = app.pipeline.output_height();
    let view = app.camera.view();
    let view_proj = app.camera.view_proj(width, height);

    match app.pipeline.rasterize(&mut app.image, view_proj, view) {
        Ok(()) => {}
        Err(err) if err.frame_recoverable() => {
            // Frame discarded; the next one starts from cleared buffers.
            log::error!("{err}");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    }

    term::present_image(
        &app.image,
        width,
        height / 2,
        app.use_truecolor,
        &mut app.frame_buf,
        stdout,
    )?;

    if app.show_status {
        let config = *app.pipeline.config();
        let cols = width;
        app.status_buf.clear();
        write!(
            app.status_buf,
            "FPS:{:>5.1}  {}x{}  SSAA:{}  Filter:{}  Texture:{}  Interp:{}  View:{}  Cores:{}  \
             Space:Orbit S:SSAA B:Filter T:Texture P:Interp D:View Q:Quit",
            app.fps,
            width,
            height,
            config.supersampling.name(),
            if config.bilinear { "bilinear" } else { "nearest" },
            if config.texturing { "on" } else { "off" },
            if config.perspective_correct { "persp" } else { "affine" },
            config.debug.name(),
            rayon::current_num_threads(),
        )?;
        term::draw_status_line(&mut app.status_buf, cols, app.use_truecolor, stdout)?;
    }

    crossterm::queue!(stdout, ResetColor)?;
    stdout.flush()?;
    Ok(())
}

fn run_app_loop(app: &mut App, stdout: &mut BufWriter<io::Stdout>) -> AppResult<()> {
    loop {
        let frame_start = Instant::now();

        if drain_input(app)? {
            break;
        }

        let now = Instant::now();
        let delta_time = now
            .duration_since(app.last_frame_time)
            .as_secs_f32()
            .max(1e-6);
        app.last_frame_time = now;

        update_orbit(app, delta_time);
        render_frame(app, stdout)?;

        let instant_fps = 1.0 / delta_time;
        app.fps = if app.fps <= 0.01 {
            instant_fps
        } else {
            0.90 * app.fps + 0.10 * instant_fps
        };

        let spent = frame_start.elapsed();
        if spent < FRAME_TARGET {
            std::thread::sleep(FRAME_TARGET - spent);
        }
    }
    Ok(())
}

fn main() -> AppResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    term::install_panic_hook();

    let args: Vec<String> = std::env::args().collect();
    let config = parse_config(&args);

    let (cols, rows) = terminal::size().unwrap_or((120, 40));
    let width = cols.max(1) as usize;
    let height = rows.max(1) as usize * 2;

    let mut pipeline = Pipeline::new(width, height, config)?;
    let scene = demo::generate_demo_scene();
    log::info!(
        "demo scene: {} groups, {} triangles",
        scene.groups.len(),
        scene.triangle_count()
    );
    pipeline.upload_scene(&scene)?;

    let mut camera = Camera::new(Vec3::new(0.0, 1.2, 6.0), -std::f32::consts::FRAC_PI_2, 0.0);
    camera::look_at_origin(&mut camera);

    let mut app = App {
        camera,
        pipeline,
        image: vec![0; width * height * 4],
        status_buf: String::new(),
        frame_buf: String::with_capacity(width * height * 24),
        use_truecolor: term::detect_truecolor() || args.iter().any(|a| a == "--truecolor"),
        show_status: true,
        auto_orbit: true,
        orbit_angle: std::f32::consts::FRAC_PI_2,
        orbit_radius: 6.0,
        orbit_height: 1.2,
        fps: 0.0,
        last_frame_time: Instant::now(),
    };

    let mut stdout = BufWriter::with_capacity(1024 * 1024, io::stdout());
    term::setup_terminal(&mut stdout)?;

    let run_result = run_app_loop(&mut app, &mut stdout);
    let cleanup_result = term::cleanup_terminal(&mut stdout);

    run_result?;
    cleanup_result
}
