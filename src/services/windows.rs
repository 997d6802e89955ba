//! Floating chat window manager.
//!
//! Pure state machine: per-conversation lifecycle, stacking order, and
//! draggable geometry, independent of message content. The z allocator is
//! monotonic for the lifetime of the manager, so "most recently focused"
//! is always the max z among open windows.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{ChatError, Result};

pub const MIN_WINDOW_WIDTH: f64 = 300.0;
pub const MIN_WINDOW_HEIGHT: f64 = 400.0;

pub const DEFAULT_WINDOW_WIDTH: f64 = 340.0;
pub const DEFAULT_WINDOW_HEIGHT: f64 = 460.0;

/// New windows cascade from this corner offset, stepped per live window
/// so they never fully overlap.
const CASCADE_BASE_X: f64 = 24.0;
const CASCADE_BASE_Y: f64 = 24.0;
const CASCADE_STEP: f64 = 28.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowPosition {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSize {
    pub width: f64,
    pub height: f64,
}

/// Default viewport until the UI reports its real size.
pub const DEFAULT_VIEWPORT: WindowSize = WindowSize {
    width: 1280.0,
    height: 720.0,
};

/// Lifecycle of a live window. A closed window has no state at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WindowLifecycle {
    Open,
    Minimized,
}

/// Per-conversation window state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatWindow {
    pub conversation_id: String,
    pub lifecycle: WindowLifecycle,
    pub position: WindowPosition,
    pub size: WindowSize,
    pub z_index: u64,
}

/// Tracks zero or more conversation windows, their stacking order, and
/// the chat-heads list of minimized conversations.
pub struct ChatWindowManager {
    windows: HashMap<String, ChatWindow>,
    /// Minimized conversation ids, in the order they were minimized.
    heads: Vec<String>,
    next_z: u64,
    viewport: WindowSize,
}

impl ChatWindowManager {
    pub fn new(viewport: WindowSize) -> Self {
        Self {
            windows: HashMap::new(),
            heads: Vec::new(),
            next_z: 0,
            viewport,
        }
    }

    // ── Lifecycle transitions ──────────────────────────────────

    /// Open a conversation window. Creates it at the next cascade slot,
    /// restores it if minimized, or just refocuses it if already open.
    pub fn open(&mut self, conversation_id: &str) -> ChatWindow {
        if let Some(window) = self.windows.get_mut(conversation_id) {
            window.lifecycle = WindowLifecycle::Open;
            self.heads.retain(|id| id != conversation_id);
            return self.raise(conversation_id);
        }

        let size = WindowSize {
            width: DEFAULT_WINDOW_WIDTH,
            height: DEFAULT_WINDOW_HEIGHT,
        };
        let slot = self.windows.len() as f64;
        let position = self.clamp(
            WindowPosition {
                x: CASCADE_BASE_X + CASCADE_STEP * slot,
                y: CASCADE_BASE_Y + CASCADE_STEP * slot,
            },
            size,
        );
        self.next_z += 1;
        let window = ChatWindow {
            conversation_id: conversation_id.to_string(),
            lifecycle: WindowLifecycle::Open,
            position,
            size,
            z_index: self.next_z,
        };
        self.windows
            .insert(conversation_id.to_string(), window.clone());
        window
    }

    /// Hide an open window into the chat-heads list.
    pub fn minimize(&mut self, conversation_id: &str) -> Result<()> {
        let window = self
            .windows
            .get_mut(conversation_id)
            .ok_or_else(|| ChatError::UnknownConversation(conversation_id.to_string()))?;
        if window.lifecycle == WindowLifecycle::Open {
            window.lifecycle = WindowLifecycle::Minimized;
            self.heads.push(conversation_id.to_string());
        }
        Ok(())
    }

    /// Discard a window's state entirely.
    pub fn close(&mut self, conversation_id: &str) {
        self.windows.remove(conversation_id);
        self.heads.retain(|id| id != conversation_id);
    }

    /// Bring a window to the front without changing its lifecycle.
    pub fn focus(&mut self, conversation_id: &str) -> Result<ChatWindow> {
        if !self.windows.contains_key(conversation_id) {
            return Err(ChatError::UnknownConversation(conversation_id.to_string()));
        }
        Ok(self.raise(conversation_id))
    }

    // ── Geometry ───────────────────────────────────────────────

    /// Move a window, clamped so its bounding box stays in the viewport.
    pub fn move_to(&mut self, conversation_id: &str, x: f64, y: f64) -> Result<ChatWindow> {
        let viewport = self.viewport;
        let window = self
            .windows
            .get_mut(conversation_id)
            .ok_or_else(|| ChatError::UnknownConversation(conversation_id.to_string()))?;
        window.position = clamp_position(WindowPosition { x, y }, window.size, viewport);
        Ok(window.clone())
    }

    /// Resize a window. Minimum size wins first; the position is then
    /// re-clamped against the viewport for the new box.
    pub fn resize(&mut self, conversation_id: &str, width: f64, height: f64) -> Result<ChatWindow> {
        let viewport = self.viewport;
        let window = self
            .windows
            .get_mut(conversation_id)
            .ok_or_else(|| ChatError::UnknownConversation(conversation_id.to_string()))?;
        window.size = WindowSize {
            width: width.max(MIN_WINDOW_WIDTH),
            height: height.max(MIN_WINDOW_HEIGHT),
        };
        window.position = clamp_position(window.position, window.size, viewport);
        Ok(window.clone())
    }

    /// The UI viewport changed; every live window is re-clamped.
    pub fn set_viewport(&mut self, width: f64, height: f64) {
        self.viewport = WindowSize { width, height };
        let viewport = self.viewport;
        for window in self.windows.values_mut() {
            window.position = clamp_position(window.position, window.size, viewport);
        }
    }

    // ── Reads ──────────────────────────────────────────────────

    pub fn window(&self, conversation_id: &str) -> Option<ChatWindow> {
        self.windows.get(conversation_id).cloned()
    }

    /// Open windows, back to front.
    pub fn open_windows(&self) -> Vec<ChatWindow> {
        let mut open: Vec<ChatWindow> = self
            .windows
            .values()
            .filter(|w| w.lifecycle == WindowLifecycle::Open)
            .cloned()
            .collect();
        open.sort_by_key(|w| w.z_index);
        open
    }

    /// Minimized conversations, oldest minimize first.
    pub fn chat_heads(&self) -> Vec<String> {
        self.heads.clone()
    }

    /// The frontmost open window.
    pub fn top_window(&self) -> Option<ChatWindow> {
        self.open_windows().into_iter().last()
    }

    pub fn viewport(&self) -> WindowSize {
        self.viewport
    }

    fn raise(&mut self, conversation_id: &str) -> ChatWindow {
        self.next_z += 1;
        let window = self
            .windows
            .get_mut(conversation_id)
            .expect("raise() is only called for live windows");
        window.z_index = self.next_z;
        window.clone()
    }

    fn clamp(&self, position: WindowPosition, size: WindowSize) -> WindowPosition {
        clamp_position(position, size, self.viewport)
    }
}

fn clamp_position(position: WindowPosition, size: WindowSize, viewport: WindowSize) -> WindowPosition {
    let max_x = (viewport.width - size.width).max(0.0);
    let max_y = (viewport.height - size.height).max(0.0);
    WindowPosition {
        x: position.x.min(max_x).max(0.0),
        y: position.y.min(max_y).max(0.0),
    }
}
