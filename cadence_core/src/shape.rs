use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Waveform shape selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveShape {
    #[default]
    Sine,
    Square,
    Triangle,
    Sawtooth,
}

impl WaveShape {
    pub const ALL: [WaveShape; 4] = [Self::Sine, Self::Square, Self::Triangle, Self::Sawtooth];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Sine => "sine",
            Self::Square => "square",
            Self::Triangle => "triangle",
            Self::Sawtooth => "sawtooth",
        }
    }
}

impl fmt::Display for WaveShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WaveShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sine" | "sin" => Ok(Self::Sine),
            "square" => Ok(Self::Square),
            "triangle" => Ok(Self::Triangle),
            "sawtooth" | "saw" => Ok(Self::Sawtooth),
            other => Err(format!(
                "unknown waveform '{other}' (expected sine, square, triangle or sawtooth)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_names() {
        for shape in WaveShape::ALL {
            assert_eq!(shape.name().parse::<WaveShape>(), Ok(shape));
        }
    }

    #[test]
    fn test_parse_aliases_and_case() {
        assert_eq!("SAW".parse::<WaveShape>(), Ok(WaveShape::Sawtooth));
        assert_eq!("Sin".parse::<WaveShape>(), Ok(WaveShape::Sine));
        assert!("noise".parse::<WaveShape>().is_err());
    }
}
