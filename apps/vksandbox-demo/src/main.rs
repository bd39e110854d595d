//! vksandbox demo
//!
//! Opens a maximized window titled "sandbox" and presents a cleared frame
//! every iteration. Resizing, minimizing and restoring the window exercise
//! swapchain recreation.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p vksandbox-demo -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--no-vsync`: Present with the lowest-latency mode the surface offers
//! - `--validation`: Enable Vulkan validation layers in release builds
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

use tracing::trace;
use vksandbox_app::{run_app, AppConfig, ClearColor, DrawHook, FrameContext};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

/// Draws nothing; the render pass clear is the whole frame.
struct Sandbox;

impl DrawHook for Sandbox {
    fn draw(&mut self, frame: &FrameContext) -> anyhow::Result<()> {
        trace!(
            frame = frame.frame_number,
            image = frame.image_index,
            "{}x{}",
            frame.extent.width,
            frame.extent.height
        );
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    // Check for help flag before starting the app
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    let no_vsync = std::env::args().any(|arg| arg == "--no-vsync");
    let validation = std::env::args().any(|arg| arg == "--validation");

    run_app(
        AppConfig::new("sandbox")
            .with_size(WIDTH, HEIGHT)
            .with_vsync(!no_vsync)
            .with_validation(validation || cfg!(debug_assertions))
            .with_clear_color(ClearColor::rgba(0.02, 0.02, 0.03, 1.0)),
        Sandbox,
    )
}

fn print_help() {
    eprintln!(
        "vksandbox demo

USAGE:
    cargo run -p vksandbox-demo -- [OPTIONS]

OPTIONS:
    --no-vsync              Present with the lowest-latency mode available
    --validation            Enable Vulkan validation layers (always on in debug builds)
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}
