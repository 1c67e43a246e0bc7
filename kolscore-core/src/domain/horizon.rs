//! Forward-return horizons.

use serde::{Deserialize, Serialize};

/// A fixed forward offset, in trading bars, at which a return is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Horizon {
    OneDay,
    ThreeDay,
    TenDay,
}

impl Horizon {
    pub const ALL: [Horizon; 3] = [Horizon::OneDay, Horizon::ThreeDay, Horizon::TenDay];

    /// Bar index into a series whose index 0 is the first bar on or after
    /// the prediction date.
    pub fn offset(self) -> usize {
        match self {
            Horizon::OneDay => 1,
            Horizon::ThreeDay => 3,
            Horizon::TenDay => 10,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Horizon::OneDay => "1d",
            Horizon::ThreeDay => "3d",
            Horizon::TenDay => "10d",
        }
    }
}

impl std::fmt::Display for Horizon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Forward returns for the three horizons; a horizon is `None` when the
/// series did not extend that far.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HorizonReturns {
    pub return_1d: Option<f64>,
    pub return_3d: Option<f64>,
    pub return_10d: Option<f64>,
}

impl HorizonReturns {
    pub fn get(&self, horizon: Horizon) -> Option<f64> {
        match horizon {
            Horizon::OneDay => self.return_1d,
            Horizon::ThreeDay => self.return_3d,
            Horizon::TenDay => self.return_10d,
        }
    }

    pub fn set(&mut self, horizon: Horizon, value: Option<f64>) {
        match horizon {
            Horizon::OneDay => self.return_1d = value,
            Horizon::ThreeDay => self.return_3d = value,
            Horizon::TenDay => self.return_10d = value,
        }
    }

    pub fn is_empty(&self) -> bool {
        Horizon::ALL.iter().all(|h| self.get(*h).is_none())
    }

    pub fn is_complete(&self) -> bool {
        Horizon::ALL.iter().all(|h| self.get(*h).is_some())
    }

    /// `self`, with gaps filled from `earlier`.
    pub fn filled_from(self, earlier: HorizonReturns) -> HorizonReturns {
        let mut merged = self;
        for h in Horizon::ALL {
            if merged.get(h).is_none() {
                merged.set(h, earlier.get(h));
            }
        }
        merged
    }
}
