use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualizationFlags {
    pub pose: bool,
    pub hands: bool,
    pub face: bool,
}

impl Default for VisualizationFlags {
    fn default() -> Self {
        Self {
            pose: true,
            hands: true,
            face: true,
        }
    }
}

/// Value copy of the observable state; holds no reference to the lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub is_running: bool,
    pub selected_camera_index: u32,
    pub preview_enabled: bool,
    pub visualization: VisualizationFlags,
}

/// Requests raised by the control plane and not yet acknowledged by the main loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PendingRequests {
    pub start: bool,
    pub stop: bool,
    pub camera_change: Option<u32>,
}

#[derive(Debug)]
struct Inner {
    is_running: bool,
    selected_camera_index: u32,
    preview_enabled: bool,
    visualization: VisualizationFlags,
    start_requested: bool,
    stop_requested: bool,
    camera_change_requested: bool,
}

/// Shared between the control servicer and the main loop. Request flags are
/// level-triggered and only cleared by the main loop once it has acted on them.
#[derive(Debug)]
pub struct RuntimeState {
    inner: Mutex<Inner>,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self::new(0, false)
    }
}

impl RuntimeState {
    pub fn new(camera_index: u32, preview_enabled: bool) -> Self {
        Self {
            inner: Mutex::new(Inner {
                is_running: false,
                selected_camera_index: camera_index,
                preview_enabled,
                visualization: VisualizationFlags::default(),
                start_requested: false,
                stop_requested: false,
                camera_change_requested: false,
            }),
        }
    }

    /// Returns false if already running.
    pub fn request_start(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.is_running {
            return false;
        }
        inner.start_requested = true;
        true
    }

    /// Returns false if not running.
    pub fn request_stop(&self) -> bool {
        let mut inner = self.inner.lock();
        if !inner.is_running {
            return false;
        }
        inner.stop_requested = true;
        true
    }

    /// Acknowledges the matching start or stop request.
    pub fn set_running(&self, running: bool) {
        let mut inner = self.inner.lock();
        inner.is_running = running;
        if running {
            inner.start_requested = false;
        } else {
            inner.stop_requested = false;
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().is_running
    }

    pub fn set_camera(&self, index: u32) {
        let mut inner = self.inner.lock();
        if inner.selected_camera_index != index {
            inner.selected_camera_index = index;
            inner.camera_change_requested = true;
        }
    }

    pub fn camera_index(&self) -> u32 {
        self.inner.lock().selected_camera_index
    }

    /// Called by the main loop after the capture device has been reopened.
    pub fn acknowledge_camera_change(&self) {
        self.inner.lock().camera_change_requested = false;
    }

    /// Called by the main loop when `failed` could not be opened. Restores
    /// `previous` unless a newer selection arrived in the meantime.
    pub fn reject_camera_change(&self, failed: u32, previous: u32) {
        let mut inner = self.inner.lock();
        if inner.selected_camera_index == failed {
            inner.selected_camera_index = previous;
            inner.camera_change_requested = false;
        }
    }

    pub fn set_preview_enabled(&self, enabled: bool) {
        self.inner.lock().preview_enabled = enabled;
    }

    pub fn preview_enabled(&self) -> bool {
        self.inner.lock().preview_enabled
    }

    pub fn set_visualization(&self, flags: VisualizationFlags) {
        self.inner.lock().visualization = flags;
    }

    pub fn visualization(&self) -> VisualizationFlags {
        self.inner.lock().visualization
    }

    pub fn pending(&self) -> PendingRequests {
        let inner = self.inner.lock();
        PendingRequests {
            start: inner.start_requested,
            stop: inner.stop_requested,
            camera_change: inner
                .camera_change_requested
                .then_some(inner.selected_camera_index),
        }
    }

    pub fn get_status(&self) -> StatusSnapshot {
        let inner = self.inner.lock();
        StatusSnapshot {
            is_running: inner.is_running,
            selected_camera_index: inner.selected_camera_index,
            preview_enabled: inner.preview_enabled,
            visualization: inner.visualization,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn start_request_handshake() {
        let state = RuntimeState::default();
        assert!(state.request_start());
        assert!(state.pending().start);
        assert!(!state.is_running());

        // Still pending until the main loop acknowledges.
        assert!(state.request_start());
        assert!(state.pending().start);

        state.set_running(true);
        assert!(state.is_running());
        assert!(!state.pending().start);
        assert!(!state.request_start());
        assert!(state.is_running());
    }

    #[test]
    fn stop_requires_running() {
        let state = RuntimeState::default();
        assert!(!state.request_stop());
        assert!(!state.pending().stop);

        state.set_running(true);
        assert!(state.request_stop());
        assert!(state.pending().stop);
        state.set_running(false);
        assert!(!state.pending().stop);
        assert!(!state.is_running());
    }

    #[test]
    fn camera_change_needs_acknowledge() {
        let state = RuntimeState::new(0, false);
        state.set_camera(0);
        assert_eq!(state.pending().camera_change, None);

        state.set_camera(2);
        assert_eq!(state.camera_index(), 2);
        assert_eq!(state.pending().camera_change, Some(2));
        assert_eq!(state.pending().camera_change, Some(2));

        state.acknowledge_camera_change();
        assert_eq!(state.pending().camera_change, None);
        assert_eq!(state.camera_index(), 2);
    }

    #[test]
    fn rejected_camera_change_restores_previous() {
        let state = RuntimeState::new(1, false);
        state.set_camera(9);
        state.reject_camera_change(9, 1);
        assert_eq!(state.camera_index(), 1);
        assert_eq!(state.pending().camera_change, None);

        // A newer selection is left for the next tick.
        state.set_camera(9);
        state.set_camera(4);
        state.reject_camera_change(9, 1);
        assert_eq!(state.pending().camera_change, Some(4));
    }

    #[test]
    fn status_is_a_copy() {
        let state = RuntimeState::new(1, true);
        let before = state.get_status();
        state.set_visualization(VisualizationFlags {
            pose: false,
            hands: true,
            face: false,
        });
        state.set_preview_enabled(false);
        assert!(before.preview_enabled);
        assert!(before.visualization.pose);

        let after = state.get_status();
        assert!(!after.preview_enabled);
        assert!(!after.visualization.pose);
        assert_eq!(after.selected_camera_index, 1);
    }

    #[test]
    fn requests_from_other_threads_are_seen() {
        let state = Arc::new(RuntimeState::default());
        let remote = state.clone();
        thread::spawn(move || {
            remote.request_start();
            remote.set_camera(3);
        })
        .join()
        .unwrap();

        let pending = state.pending();
        assert!(pending.start);
        assert_eq!(pending.camera_change, Some(3));
    }
}
