//! Window management using winit

use std::sync::Arc;

use glam::Vec2;
use winit::{
    dpi::PhysicalSize,
    error::OsError,
    event::{ElementState, MouseButton, WindowEvent},
    event_loop::EventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::{Window as WinitWindow, WindowBuilder},
};

use crate::pipeline::RenderMode;
use crate::scene::CameraInput;

/// One-shot commands triggered by key presses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SetMode(RenderMode),
    ToggleGizmos,
    ToggleSkybox,
    ToggleRelief,
    Exit,
}

impl Action {
    pub fn for_key(key: KeyCode) -> Option<Self> {
        match key {
            KeyCode::Digit1 => Some(Action::SetMode(RenderMode::TexturedQuad)),
            KeyCode::Digit2 => Some(Action::SetMode(RenderMode::Deferred)),
            KeyCode::Digit3 => Some(Action::SetMode(RenderMode::Forward)),
            KeyCode::KeyG => Some(Action::ToggleGizmos),
            KeyCode::KeyK => Some(Action::ToggleSkybox),
            KeyCode::KeyN => Some(Action::ToggleRelief),
            KeyCode::Escape => Some(Action::Exit),
            _ => None,
        }
    }
}

/// Keyboard and mouse state accumulated between frames
#[derive(Debug, Default)]
pub struct InputState {
    camera: CameraInput,
    last_cursor: Option<Vec2>,
    actions: Vec<Action>,
}

impl InputState {
    pub fn key(&mut self, key: KeyCode, pressed: bool) {
        match key {
            KeyCode::KeyW => self.camera.forward = pressed,
            KeyCode::KeyS => self.camera.backward = pressed,
            KeyCode::KeyA => self.camera.left = pressed,
            KeyCode::KeyD => self.camera.right = pressed,
            KeyCode::KeyR => self.camera.up = pressed,
            KeyCode::KeyF => self.camera.down = pressed,
            _ if pressed => self.actions.extend(Action::for_key(key)),
            _ => {}
        }
    }

    pub fn mouse_button(&mut self, button: MouseButton, pressed: bool) {
        if button == MouseButton::Left {
            self.camera.mouse_look_active = pressed;
        }
    }

    /// Accumulate cursor motion. Deltas are only kept while looking.
    pub fn cursor_moved(&mut self, position: Vec2) {
        if let Some(last) = self.last_cursor {
            if self.camera.mouse_look_active {
                self.camera.mouse_delta += position - last;
            }
        }
        self.last_cursor = Some(position);
    }

    pub fn camera(&self) -> &CameraInput {
        &self.camera
    }

    pub fn take_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.actions)
    }

    /// Clear per-frame deltas after the camera consumed them
    pub fn end_frame(&mut self) {
        self.camera.reset_deltas();
    }
}

/// Wrapper around winit window with additional state
pub struct Window {
    window: Arc<WinitWindow>,
    width: u32,
    height: u32,
    resized: bool,
    close_requested: bool,
    input: InputState,
}

impl Window {
    /// Create a new window with the given title and dimensions
    pub fn new(event_loop: &EventLoop<()>, title: &str, width: u32, height: u32) -> Result<Self, OsError> {
        let window = Arc::new(
            WindowBuilder::new()
                .with_title(title)
                .with_inner_size(PhysicalSize::new(width, height))
                .build(event_loop)?,
        );

        Ok(Self {
            window,
            width,
            height,
            resized: false,
            close_requested: false,
            input: InputState::default(),
        })
    }

    /// Get arc reference to window
    pub fn window_arc(&self) -> Arc<WinitWindow> {
        Arc::clone(&self.window)
    }

    /// Get current window dimensions
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Take the resize flag, returning whether a resize happened
    pub fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }

    pub fn should_close(&self) -> bool {
        self.close_requested
    }

    pub fn input(&self) -> &InputState {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut InputState {
        &mut self.input
    }

    /// Handle window events
    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::Resized(size) => {
                self.width = size.width;
                self.height = size.height;
                self.resized = true;
            }
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    if !event.repeat {
                        self.input.key(code, event.state == ElementState::Pressed);
                    }
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                self.input.mouse_button(*button, *state == ElementState::Pressed);
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.input
                    .cursor_moved(Vec2::new(position.x as f32, position.y as f32));
            }
            _ => {}
        }
    }

    /// Request a redraw
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    pub fn set_title(&self, title: &str) {
        self.window.set_title(title);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movement_keys_track_held_state() {
        let mut input = InputState::default();
        input.key(KeyCode::KeyW, true);
        input.key(KeyCode::KeyR, true);
        assert!(input.camera().forward);
        assert!(input.camera().up);
        input.key(KeyCode::KeyW, false);
        assert!(!input.camera().forward);
        assert!(input.take_actions().is_empty());
    }

    #[test]
    fn test_mode_keys_queue_actions_once() {
        let mut input = InputState::default();
        input.key(KeyCode::Digit3, true);
        input.key(KeyCode::Digit3, false);
        input.key(KeyCode::KeyG, true);
        assert_eq!(
            input.take_actions(),
            vec![Action::SetMode(RenderMode::Forward), Action::ToggleGizmos]
        );
        assert!(input.take_actions().is_empty());
    }

    #[test]
    fn test_cursor_delta_only_while_looking() {
        let mut input = InputState::default();
        input.cursor_moved(Vec2::new(10.0, 10.0));
        input.cursor_moved(Vec2::new(20.0, 10.0));
        assert_eq!(input.camera().mouse_delta, Vec2::ZERO);

        input.mouse_button(MouseButton::Left, true);
        input.cursor_moved(Vec2::new(25.0, 4.0));
        assert_eq!(input.camera().mouse_delta, Vec2::new(5.0, -6.0));

        input.end_frame();
        assert_eq!(input.camera().mouse_delta, Vec2::ZERO);
    }
}
