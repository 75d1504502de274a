use std::path::Path;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;
use winit::event_loop::{ControlFlow, EventLoop};

use sparkfield::config::{SimConfig, CONFIG_FILE};
use sparkfield::error::{Error, SetupError};
use sparkfield::window::App;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Error> {
    let config = SimConfig::load_or_default(Path::new(CONFIG_FILE))?;

    let event_loop = EventLoop::new().map_err(SetupError::from)?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app).map_err(SetupError::from)?;
    app.into_result()
}
