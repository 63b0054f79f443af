mod input_state;
mod camera_controller;

use super::renderer::Renderer;
use color_eyre::{Report, Result};
use std::sync::Arc;
use std::time::Instant;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, StartCause, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};
use crate::app::camera_controller::CameraController;
use crate::app::input_state::InputState;
use crate::renderer::camera::Camera;
use crate::renderer::config::RenderConfig;
use crate::renderer::overlay::NullOverlay;

pub struct App {
    config: RenderConfig,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    camera_controller: CameraController,

    // State
    input_state: InputState,
    prev_frame_time: Instant,
    delta_time_secs: f32,
    close_requested: bool,
    error: Option<Report>,
}

impl App {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            window: None,
            renderer: None,
            camera_controller: CameraController::new(Camera::new()),

            input_state: InputState::default(),
            prev_frame_time: Instant::now(),
            delta_time_secs: 0.0,
            close_requested: false,
            error: None,
        }
    }

    /// Runs until the window closes. The first error raised inside the loop ends it and is returned.
    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        event_loop.run_app(&mut self)?;

        // GPU teardown before the window goes away
        self.renderer = None;
        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        if self.window.is_none() {
            let (width, height) = self.config.window_extent;
            let attributes = Window::default_attributes()
                .with_title("lilac")
                .with_inner_size(PhysicalSize::new(width, height));
            self.window = Some(Arc::new(event_loop.create_window(attributes)?));
        }

        if self.renderer.is_none() {
            if let Some(window) = &self.window {
                let renderer = Renderer::new(window.clone(), &self.config, Box::new(NullOverlay))?;
                self.renderer = Some(renderer);
            }
        }
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };
        self.camera_controller.process_input(&self.input_state, self.delta_time_secs);
        self.input_state.reset_frame();

        renderer.begin_ui_frame();
        renderer.draw(self.camera_controller.get_camera())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: Report) {
        log::error!("{:?}", err);
        if self.error.is_none() {
            self.error = Some(err);
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn new_events(&mut self, _event_loop: &ActiveEventLoop, _cause: StartCause) {
        let curr_frame_time = Instant::now();
        self.delta_time_secs = curr_frame_time.duration_since(self.prev_frame_time).as_secs_f32();
        self.prev_frame_time = curr_frame_time;
    }

    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(err) = self.init(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent
    ) {
        if self.window.as_ref().map(|window| window.id()) != Some(window_id) {
            return;
        }

        self.input_state.process_window_events(&event);

        match event {
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.request_resize();
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.redraw() {
                    self.fail(event_loop, err);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                KeyEvent {
                    logical_key: key,
                    state: ElementState::Pressed,
                    repeat: false,
                    ..
                },
                ..
            } => match key.as_ref() {
                Key::Named(NamedKey::Space) => {
                    if let Some(renderer) = self.renderer.as_mut() {
                        let effect = renderer.next_effect();
                        log::info!("Background effect: {}", effect);
                    }
                }
                Key::Named(NamedKey::Escape) => {
                    self.close_requested = true;
                }
                _ => {}
            },
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }

        if self.close_requested {
            event_loop.exit();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(renderer) = &self.renderer {
            log::info!("Exiting after {} frames", renderer.frame_number());
        }
    }
}
