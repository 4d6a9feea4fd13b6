use serde::{Deserialize, Serialize};

use crate::maze::State;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// One input per grid cell, set to 1 at the agent's position.
    #[default]
    OneHotCell,
    /// Two inputs, x and y scaled to [0, 1].
    Coordinates,
}

/// Turns a state into the network's input features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateEncoder {
    encoding: Encoding,
    width: usize,
    height: usize,
}

impl StateEncoder {
    pub fn new(encoding: Encoding, (width, height): (usize, usize)) -> Self {
        Self {
            encoding,
            width,
            height,
        }
    }

    pub fn len(&self) -> usize {
        match self.encoding {
            Encoding::OneHotCell => self.width * self.height,
            Encoding::Coordinates => 2,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn encode(&self, state: &State) -> Vec<f64> {
        let (x, y) = state.position();
        assert!(
            x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height,
            "state {} outside {}x{} grid", state, self.width, self.height
        );

        match self.encoding {
            Encoding::OneHotCell => {
                let mut features = vec![0.0; self.len()];
                features[y as usize * self.width + x as usize] = 1.0;
                features
            }
            Encoding::Coordinates => {
                let scale = |v: i32, extent: usize| {
                    if extent > 1 { v as f64 / (extent - 1) as f64 } else { 0.0 }
                };
                vec![scale(x, self.width), scale(y, self.height)]
            }
        }
    }
}
