//! Stardust demo application.
//!
//! Owns the window and input; everything Vulkan lives in the engine crate.
//! Escape quits, space pauses and resumes the animation.

mod metrics;
mod window;

use metrics::ProcStatSampler;
use stardust_engine::foundation::logging;
use stardust_engine::render::vulkan::context::VulkanContext;
use stardust_engine::render::RunState;
use stardust_engine::{DemoConfig, FrameEvents, StardustRenderer};
use window::Window;

const APP_NAME: &str = "Stardust";
const CONFIG_FILE: &str = "stardust.toml";

fn main() {
    logging::init();
    if let Err(e) = run() {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = DemoConfig::load_or_default(CONFIG_FILE);
    config.validate()?;

    let mut window = Window::new(APP_NAME, config.width, config.height, config.windowed)?;
    let extensions = window.get_required_instance_extensions()?;

    let ctx = VulkanContext::new(APP_NAME, &extensions, |_entry, instance| {
        window
            .create_vulkan_surface(instance.handle())
            .map_err(|e| stardust_engine::VulkanError::InitializationFailed(e.to_string()))
    })?;

    let mut renderer = StardustRenderer::new(ctx, config)?;
    log::info!("Rendering on {}", renderer.device_name());

    let mut cpu = ProcStatSampler::new();
    loop {
        window.poll_events();
        let mut events = FrameEvents::default();
        let flushed: Vec<_> = window.flush_events().collect();
        for (_, event) in flushed {
            match event {
                glfw::WindowEvent::Key(glfw::Key::Escape, _, glfw::Action::Press, _) => {
                    window.set_should_close(true);
                }
                glfw::WindowEvent::Key(glfw::Key::Space, _, glfw::Action::Press, _) => {
                    events.toggle_animation = true;
                }
                glfw::WindowEvent::Close => {
                    window.set_should_close(true);
                }
                _ => {}
            }
        }
        events.quit = window.should_close();

        if renderer.render_frame(events, &mut cpu)? == RunState::Quit {
            break;
        }
    }

    Ok(())
}
