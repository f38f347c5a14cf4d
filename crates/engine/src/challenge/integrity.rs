use serde::Serialize;

const CAUTION_FLOOR: f32 = 0.1;
const WARNING_FLOOR: f32 = 0.4;
const CRITICAL_FLOOR: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityStatus {
    Ok,
    /// `crossed` is true only for the call that moved the meter from below
    /// max to max. Later calls at max report `crossed: false`.
    Breached { crossed: bool },
}

impl IntegrityStatus {
    pub fn is_breached(self) -> bool {
        matches!(self, Self::Breached { .. })
    }

    pub fn crossed(self) -> bool {
        matches!(self, Self::Breached { crossed: true })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityTier {
    Nominal,
    Caution,
    Warning,
    Critical,
}

impl IntegrityTier {
    pub fn from_percent(percent: f32) -> Self {
        if percent >= CRITICAL_FLOOR {
            Self::Critical
        } else if percent >= WARNING_FLOOR {
            Self::Warning
        } else if percent >= CAUTION_FLOOR {
            Self::Caution
        } else {
            Self::Nominal
        }
    }

    pub fn as_token(self) -> &'static str {
        match self {
            Self::Nominal => "nominal",
            Self::Caution => "caution",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityMeter {
    value: u32,
    max: u32,
}

impl IntegrityMeter {
    /// A zero ceiling is raised to one so the meter is never born breached.
    pub fn new(max: u32) -> Self {
        Self {
            value: 0,
            max: max.max(1),
        }
    }

    pub fn increase(&mut self, amount: u32) -> IntegrityStatus {
        let was_breached = self.is_breached();
        self.value = self.value.saturating_add(amount).min(self.max);
        if self.is_breached() {
            IntegrityStatus::Breached {
                crossed: !was_breached,
            }
        } else {
            IntegrityStatus::Ok
        }
    }

    pub fn reset(&mut self) {
        self.value = 0;
    }

    pub fn percent(&self) -> f32 {
        self.value as f32 / self.max as f32
    }

    pub fn tier(&self) -> IntegrityTier {
        IntegrityTier::from_percent(self.percent())
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn remaining(&self) -> u32 {
        self.max - self.value
    }

    pub fn is_breached(&self) -> bool {
        self.value >= self.max
    }
}
