use clap::Parser;
use client::connection::{Connector, WebSocketConnector};
use client::game::Session;
use client::input::InputManager;
use client::rendering::Renderer;
use client::sync::Synchronizer;
use log::info;
use macroquad::prelude::{get_frame_time, is_key_pressed, next_frame, Conf, KeyCode};
use physics::collision::CollisionWorld;
use physics::controller::ControllerSettings;
use physics::level::Level;
use physics::service::{PhysicsHandle, PhysicsWorld};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket URL of the relay server
    #[arg(short = 's', long, default_value = "ws://localhost:3000")]
    server: String,

    /// JSON level file; the built-in demo level when omitted
    #[arg(short = 'l', long)]
    level: Option<PathBuf>,

    /// Window width
    #[arg(short = 'w', long, default_value = "1280")]
    width: usize,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "720")]
    height: usize,

    /// Draw collider wireframes
    #[arg(long)]
    debug_physics: bool,
}

fn window_conf(args: &Args) -> Conf {
    Conf {
        window_title: "Characters".to_string(),
        window_width: args.width as i32,
        window_height: args.height as i32,
        ..Default::default()
    }
}

async fn run<C: Connector>(mut session: Session<C>, mut renderer: Renderer) {
    let mut input = InputManager::new();

    loop {
        if is_key_pressed(KeyCode::Escape) {
            break;
        }

        let now = Instant::now();
        let frame = input.update(now);
        session.frame(&frame, get_frame_time(), now);
        renderer.render(&session);

        next_frame().await;
    }

    info!("Shutting down");
    session.shutdown();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let level = match &args.level {
        Some(path) => {
            info!("Loading level from {}", path.display());
            Level::load(path)?
        }
        None => Level::demo(),
    };

    let collision = CollisionWorld::build(&level.meshes, shared::GRAVITY)?;
    info!("Built {} static colliders", collision.static_collider_count());
    let physics = PhysicsHandle::spawn(PhysicsWorld::new(
        collision,
        &ControllerSettings::default(),
    ))?;

    // The socket task runs here; macroquad owns the main thread.
    let runtime = tokio::runtime::Runtime::new()?;
    let connector = WebSocketConnector::new(runtime.handle().clone(), args.server.clone());

    let mut session = Session::new(connector, physics, Synchronizer::default());
    session.set_debug_physics(args.debug_physics);
    let renderer = Renderer::new(args.width, args.height, &level);

    info!("Controls: WASD/arrows to move, Space to jump, Shift toggles run");
    info!("1/2/3 for Yes/No/Wave, Enter toggles holding, V/X switches view");

    macroquad::Window::from_config(window_conf(&args), run(session, renderer));

    Ok(())
}
