use crate::errors::{Error, Result};
use crate::model::IngestMessage;

const BATTERY_MIN: f64 = 0.0;
const BATTERY_MAX: f64 = 100.0;
const WIND_DIRECTION_MIN: f64 = 0.0;
const WIND_DIRECTION_MAX: f64 = 360.0;

/// Range-checks every field the message actually carries. Absent fields are
/// not defaulted and not checked.
pub fn validate(message: &IngestMessage) -> Result<()> {
    if let Some(battery) = message.battery_level {
        if !battery.is_finite() || !(BATTERY_MIN..=BATTERY_MAX).contains(&battery) {
            return Err(Error::Validation(format!(
                "battery level {} out of range [{}, {}]",
                battery, BATTERY_MIN, BATTERY_MAX
            )));
        }
    }

    if let Some(direction) = message.wind_direction {
        if !direction.is_finite()
            || !(WIND_DIRECTION_MIN..WIND_DIRECTION_MAX).contains(&direction)
        {
            return Err(Error::Validation(format!(
                "wind direction {} out of range [{}, {})",
                direction, WIND_DIRECTION_MIN, WIND_DIRECTION_MAX
            )));
        }
    }

    non_negative("pressure level", message.pressure_level)?;
    non_negative("CO2 level", message.co2_level)?;
    non_negative("particulate matter", message.particulate_matter)?;
    non_negative("wind speed", message.wind_speed)?;

    Ok(())
}

fn non_negative(field: &str, value: Option<f64>) -> Result<()> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(Error::Validation(format!(
            "{} {} must be non-negative",
            field, v
        ))),
        _ => Ok(()),
    }
}
