use hearttrack_types::{DeviceState, ScheduleConfig, StatusPattern, Timestamp};

/// Notifications for the status renderer and the host.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    StateChanged {
        from: DeviceState,
        to: DeviceState,
    },
    /// Nobody engaged before the engagement timeout.
    UserTimeout,
    Delivered {
        taken_at: Timestamp,
    },
    Stored {
        taken_at: Timestamp,
        evicted: Option<Timestamp>,
    },
    SendFailed {
        attempts: u32,
    },
    Replayed {
        taken_at: Timestamp,
        remaining: usize,
    },
    ConfigApplied(ScheduleConfig),
}

impl DeviceEvent {
    /// Pattern the renderer should show, if any. Delivery outcomes are
    /// short flashes over the state pattern.
    pub fn pattern(&self) -> Option<StatusPattern> {
        match self {
            Self::StateChanged { to, .. } => Some((*to).into()),
            Self::Delivered { .. } => Some(StatusPattern::FlashGreen),
            Self::Stored { .. } => Some(StatusPattern::FlashYellow),
            Self::SendFailed { .. } => Some(StatusPattern::FlashRed),
            Self::UserTimeout | Self::Replayed { .. } | Self::ConfigApplied(_) => None,
        }
    }
}
