/// Host capabilities granted to the current session.
///
/// The host hands a fresh value to the session whenever a permission or
/// subsystem changes state; nothing is probed at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityContext {
    /// The camera may be read.
    pub camera_permitted: bool,
    /// The persistent anchor subsystem is up.
    pub spatial_anchors_ready: bool,
    /// A compute device is available for frame conditioning.
    pub compute_available: bool,
}

impl CapabilityContext {
    /// Every capability granted.
    pub fn granted() -> Self {
        Self {
            camera_permitted: true,
            spatial_anchors_ready: true,
            compute_available: true,
        }
    }

    /// Nothing granted yet.
    pub fn denied() -> Self {
        Self {
            camera_permitted: false,
            spatial_anchors_ready: false,
            compute_available: false,
        }
    }
}

impl Default for CapabilityContext {
    fn default() -> Self {
        Self::denied()
    }
}
