use rand::Rng;
use serde::Serialize;

/// One partial telemetry report. Absent fields mean "no change", matching
/// what real turrets publish.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub thing_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressure_level: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub co2_level: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_direction: Option<f64>,
}

/// Simulated device state that drifts between readings.
pub struct Turret {
    pub thing_name: String,
    status: &'static str,
    battery: f64,
    pressure: f64,
    co2: f64,
    wind_speed: f64,
    wind_direction: f64,
}

impl Turret {
    pub fn new(index: usize) -> Self {
        Self {
            thing_name: format!("turret-{}", index),
            status: "online",
            battery: 100.0,
            pressure: 100.0,
            co2: 450.0,
            wind_speed: 5.0,
            wind_direction: 180.0,
        }
    }

    pub fn next_reading(&mut self, rng: &mut impl Rng) -> Reading {
        self.battery = (self.battery - rng.gen_range(0.0..0.1)).max(0.0);
        self.pressure = drift(rng, self.pressure, 90.0, 110.0);
        self.co2 = drift(rng, self.co2, 400.0, 500.0);
        self.wind_speed = drift(rng, self.wind_speed, 0.0, 15.0);
        self.wind_direction = (self.wind_direction + rng.gen_range(-10.0..10.0)).rem_euclid(360.0);

        let status = self.next_status(rng);
        Reading {
            thing_name: self.thing_name.clone(),
            status,
            battery_level: Some(round1(self.battery)),
            pressure_level: Some(round1(self.pressure)),
            co2_level: Some(round1(self.co2)),
            wind_speed: Some(round1(self.wind_speed)),
            wind_direction: Some(round1(self.wind_direction)),
        }
    }

    fn next_status(&mut self, rng: &mut impl Rng) -> Option<&'static str> {
        let roll: f64 = rng.gen();
        let next = match self.status {
            "online" if roll > 0.997 => "emergency",
            "online" if roll > 0.99 => "warning",
            "warning" | "emergency" if roll > 0.95 => "online",
            _ => return None,
        };
        self.status = next;
        Some(next)
    }
}

/// Varies the value by up to 5% and clamps it to the given bounds.
fn drift(rng: &mut impl Rng, current: f64, min: f64, max: f64) -> f64 {
    let change = current * 0.05 * (rng.gen::<f64>() - 0.5);
    (current + change).clamp(min, max)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
