#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DragState {
    #[default]
    Idle,
    Dragging,
}

/// The single global drag gesture plus whether the root drag handlers are installed.
#[derive(Debug, Default)]
pub struct DragTracker {
    state: DragState,
    root_attached: bool,
}

impl DragTracker {
    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn is_dragging(&self) -> bool {
        self.state == DragState::Dragging
    }

    /// Install the root handlers; repeated calls are no-ops.
    pub fn attach_root(&mut self) -> bool {
        let first = !self.root_attached;
        self.root_attached = true;
        first
    }

    pub fn root_attached(&self) -> bool {
        self.root_attached
    }

    pub fn begin(&mut self) {
        self.state = DragState::Dragging;
    }

    pub fn finish(&mut self) {
        self.state = DragState::Idle;
    }

    pub fn reset(&mut self) {
        self.state = DragState::Idle;
        self.root_attached = false;
    }
}
