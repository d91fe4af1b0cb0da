//! Weather lookup tool
//!
//! Returns simulated current conditions for a location. There is no
//! upstream weather provider; values are plausible random readings.

use super::{Tool, ToolOutput};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const CONDITIONS: &[&str] = &["sunny", "cloudy", "rainy", "snowy", "windy", "foggy"];

/// Weather tool
pub struct WeatherTool;

#[derive(Debug, Deserialize)]
struct WeatherInput {
    location: String,
}

/// Reading returned to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherResult {
    pub location: String,
    /// Degrees Celsius
    pub temperature: i32,
    pub condition: String,
    /// Relative humidity in percent
    pub humidity: u8,
}

impl WeatherTool {
    fn reading(location: &str) -> WeatherResult {
        let mut rng = rand::thread_rng();
        WeatherResult {
            location: location.to_string(),
            temperature: rng.gen_range(-5..=35),
            condition: CONDITIONS
                .choose(&mut rng)
                .copied()
                .unwrap_or("sunny")
                .to_string(),
            humidity: rng.gen_range(20..=95),
        }
    }
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &'static str {
        "get_weather"
    }

    fn description(&self) -> String {
        "Get the current weather for a location. Use when the person mentions or asks about the weather somewhere.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["location"],
            "properties": {
                "location": {
                    "type": "string",
                    "description": "City or place name, e.g. \"Lisbon\""
                }
            }
        })
    }

    async fn run(&self, input: Value) -> ToolOutput {
        let input: WeatherInput = match serde_json::from_value(input) {
            Ok(input) => input,
            Err(e) => return ToolOutput::error(format!("Invalid input: {e}")),
        };

        let location = input.location.trim();
        if location.is_empty() {
            return ToolOutput::error("Location must not be empty");
        }

        let reading = Self::reading(location);
        tracing::debug!(location = %reading.location, condition = %reading.condition, "Weather lookup");

        match serde_json::to_value(&reading) {
            Ok(value) => ToolOutput::success(value),
            Err(e) => ToolOutput::error(format!("Failed to encode result: {e}")),
        }
    }
}
