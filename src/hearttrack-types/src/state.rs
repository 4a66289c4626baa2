use strum::{Display, EnumIter};

/// Lifecycle state of the device. Exactly one is active at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumIter)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceState {
    #[default]
    Idle,
    AwaitingEngagement,
    Acquiring,
    Stabilizing,
    Transmitting,
}

impl DeviceState {
    /// States in which an acquisition session is running.
    pub fn is_measuring(self) -> bool {
        matches!(self, Self::Acquiring | Self::Stabilizing)
    }
}

/// Status indication rendered by the feedback LED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum StatusPattern {
    Off,
    BlinkBlue,
    SolidBlue,
    PulseBlue,
    SolidCyan,
    /// Fatal hardware fault, the device is halted.
    BlinkRed,
    FlashGreen,
    FlashYellow,
    FlashRed,
}

impl From<DeviceState> for StatusPattern {
    fn from(state: DeviceState) -> Self {
        match state {
            DeviceState::Idle => Self::Off,
            DeviceState::AwaitingEngagement => Self::BlinkBlue,
            DeviceState::Acquiring => Self::SolidBlue,
            DeviceState::Stabilizing => Self::PulseBlue,
            DeviceState::Transmitting => Self::SolidCyan,
        }
    }
}
