use energy_domain::domain::WeatherSample;

/// Sum+count pair; the mean is only materialized when read.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningMean {
    sum: f64,
    count: u64,
}

impl RunningMean {
    pub fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn merge(&mut self, other: &RunningMean) {
        self.sum += other.sum;
        self.count += other.count;
    }
}

/// Accumulator behind every hour, day and building-day key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bucket {
    pub energy: f64,
    pub rows: u64,
    pub temperature: RunningMean,
    pub precipitation: RunningMean,
    pub wind_speed: RunningMean,
}

impl Bucket {
    pub fn add(&mut self, energy: f64, weather: Option<&WeatherSample>) {
        self.energy += energy;
        self.rows += 1;
        if let Some(w) = weather {
            self.temperature.push(w.temperature);
            self.precipitation.push(w.precipitation);
            self.wind_speed.push(w.wind_speed);
        }
    }

    /// Fold another bucket for the same key into this one.
    pub fn merge(&mut self, other: &Bucket) {
        self.energy += other.energy;
        self.rows += other.rows;
        self.temperature.merge(&other.temperature);
        self.precipitation.merge(&other.precipitation);
        self.wind_speed.merge(&other.wind_speed);
    }

    /// Mean weather over the rows that carried it; `None` when none did.
    pub fn weather(&self) -> Option<WeatherSample> {
        Some(WeatherSample {
            temperature: self.temperature.mean()?,
            precipitation: self.precipitation.mean()?,
            wind_speed: self.wind_speed.mean()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn means_are_computed_on_read() {
        let mut b = Bucket::default();
        b.add(10.0, Some(&WeatherSample { temperature: 30.0, precipitation: 0.0, wind_speed: 2.0 }));
        b.add(5.0, None);
        b.add(1.0, Some(&WeatherSample { temperature: 40.0, precipitation: 1.0, wind_speed: 4.0 }));

        assert_eq!(b.energy, 16.0);
        assert_eq!(b.rows, 3);
        assert_eq!(b.temperature.count(), 2);
        let w = b.weather().unwrap();
        assert_eq!(w.temperature, 35.0);
        assert_eq!(w.precipitation, 0.5);
        assert_eq!(w.wind_speed, 3.0);
    }

    #[test]
    fn merged_bucket_matches_single_pass() {
        let w = WeatherSample { temperature: 20.0, precipitation: 0.0, wind_speed: 6.0 };
        let mut a = Bucket::default();
        a.add(4.0, Some(&w));
        let mut b = Bucket::default();
        b.add(6.0, None);
        b.add(1.0, Some(&WeatherSample { temperature: 40.0, ..w }));
        a.merge(&b);

        assert_eq!(a.energy, 11.0);
        assert_eq!(a.rows, 3);
        assert_eq!(a.weather().unwrap().temperature, 30.0);
    }

    #[test]
    fn no_weather_without_samples() {
        let mut b = Bucket::default();
        b.add(3.0, None);
        assert!(b.weather().is_none());
        assert_eq!(RunningMean::default().mean(), None);
    }
}
